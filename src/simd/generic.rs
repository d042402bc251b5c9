//! Portable kernels. Reference behavior for every other level.

use super::{regions, DeltaOp};

/// Shared by every delta implementation: the bytes past the end of `prev`
/// are copied unchanged.
#[inline(always)]
pub(super) fn copy_tail(cur: &[u8], prev: &[u8], out: &mut [u8]) -> usize {
    let n = cur.len().min(prev.len());
    out[n..cur.len()].copy_from_slice(&cur[n..]);
    n
}

pub(super) fn delta_encode(cur: &[u8], prev: &[u8], out: &mut [u8]) {
    let n = copy_tail(cur, prev, out);
    for (start, end, op) in regions(n) {
        let (c, p, o) = (&cur[start..end], &prev[start..end], &mut out[start..end]);
        match op {
            DeltaOp::Xor => xor(c, p, o),
            DeltaOp::Sub => sub(c, p, o),
        }
    }
}

pub(super) fn delta_decode(residual: &[u8], prev: &[u8], out: &mut [u8]) {
    let n = copy_tail(residual, prev, out);
    for (start, end, op) in regions(n) {
        let (r, p, o) = (&residual[start..end], &prev[start..end], &mut out[start..end]);
        match op {
            DeltaOp::Xor => xor(r, p, o),
            DeltaOp::Sub => add(r, p, o),
        }
    }
}

#[inline(always)]
pub(super) fn xor(a: &[u8], b: &[u8], out: &mut [u8]) {
    for ((o, &x), &y) in out.iter_mut().zip(a).zip(b) {
        *o = x ^ y;
    }
}

#[inline(always)]
pub(super) fn sub(a: &[u8], b: &[u8], out: &mut [u8]) {
    for ((o, &x), &y) in out.iter_mut().zip(a).zip(b) {
        *o = x.wrapping_sub(y);
    }
}

#[inline(always)]
pub(super) fn add(a: &[u8], b: &[u8], out: &mut [u8]) {
    for ((o, &x), &y) in out.iter_mut().zip(a).zip(b) {
        *o = x.wrapping_add(y);
    }
}

/// Byte counts spread over four banks so consecutive equal bytes do not
/// serialize on one counter.
#[inline(always)]
pub(super) fn count_banks(data: &[u8]) -> [[u32; 256]; 4] {
    let mut banks = [[0u32; 256]; 4];
    let chunks = data.chunks_exact(8);
    let tail = chunks.remainder();
    for chunk in chunks {
        banks[0][chunk[0] as usize] += 1;
        banks[1][chunk[1] as usize] += 1;
        banks[2][chunk[2] as usize] += 1;
        banks[3][chunk[3] as usize] += 1;
        banks[0][chunk[4] as usize] += 1;
        banks[1][chunk[5] as usize] += 1;
        banks[2][chunk[6] as usize] += 1;
        banks[3][chunk[7] as usize] += 1;
    }
    for &b in tail {
        banks[0][b as usize] += 1;
    }
    banks
}

pub(super) fn histogram(data: &[u8], hist: &mut [u32; 256]) {
    let banks = count_banks(data);
    for (i, slot) in hist.iter_mut().enumerate() {
        *slot += banks[0][i] + banks[1][i] + banks[2][i] + banks[3][i];
    }
}
