//! aarch64 kernels, 16-byte lanes.

use core::arch::aarch64::{
    vaddq_u32, vaddq_u8, veorq_u8, vld1q_u32, vld1q_u8, vst1q_u32, vst1q_u8, vsubq_u8,
};

use super::generic;
use super::{regions, DeltaOp};

macro_rules! lanes {
    ($name:ident, $op:ident, $tail:path) => {
        #[target_feature(enable = "neon")]
        unsafe fn $name(a: &[u8], b: &[u8], out: &mut [u8]) {
            let len = out.len().min(a.len()).min(b.len());
            let mut i = 0;
            // SAFETY: each access covers [i, i + 16) and len bounds all three slices.
            while i + 16 <= len {
                let va = vld1q_u8(a.as_ptr().add(i));
                let vb = vld1q_u8(b.as_ptr().add(i));
                vst1q_u8(out.as_mut_ptr().add(i), $op(va, vb));
                i += 16;
            }
            $tail(&a[i..len], &b[i..len], &mut out[i..len]);
        }
    };
}

lanes!(xor16, veorq_u8, generic::xor);
lanes!(sub16, vsubq_u8, generic::sub);
lanes!(add16, vaddq_u8, generic::add);

#[target_feature(enable = "neon")]
pub(super) unsafe fn delta_encode(cur: &[u8], prev: &[u8], out: &mut [u8]) {
    // SAFETY: callers enable the same feature as the lane helpers.
    let n = generic::copy_tail(cur, prev, out);
    for (start, end, op) in regions(n) {
        let (c, p, o) = (&cur[start..end], &prev[start..end], &mut out[start..end]);
        match op {
            DeltaOp::Xor => xor16(c, p, o),
            DeltaOp::Sub => sub16(c, p, o),
        }
    }
}

#[target_feature(enable = "neon")]
pub(super) unsafe fn delta_decode(residual: &[u8], prev: &[u8], out: &mut [u8]) {
    let n = generic::copy_tail(residual, prev, out);
    for (start, end, op) in regions(n) {
        let (r, p, o) = (&residual[start..end], &prev[start..end], &mut out[start..end]);
        match op {
            DeltaOp::Xor => xor16(r, p, o),
            DeltaOp::Sub => add16(r, p, o),
        }
    }
}

#[target_feature(enable = "neon")]
pub(super) unsafe fn histogram(data: &[u8], hist: &mut [u32; 256]) {
    let [b0, b1, b2, b3] = generic::count_banks(data);
    for i in (0..256).step_by(4) {
        // SAFETY: i + 4 <= 256 for every array read and written.
        let sum01 = vaddq_u32(vld1q_u32(b0.as_ptr().add(i)), vld1q_u32(b1.as_ptr().add(i)));
        let sum23 = vaddq_u32(vld1q_u32(b2.as_ptr().add(i)), vld1q_u32(b3.as_ptr().add(i)));
        let dst = hist.as_mut_ptr().add(i);
        vst1q_u32(dst, vaddq_u32(vld1q_u32(dst), vaddq_u32(sum01, sum23)));
    }
}
