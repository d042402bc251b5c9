//! x86_64 kernels: 16-byte lanes under SSE4.2, 32-byte lanes under AVX2.
//!
//! Loads and stores are unaligned; the bytes after the last full vector go
//! through the scalar code.

use core::arch::x86_64::{
    __m128i, __m256i, _mm256_add_epi32, _mm256_add_epi8, _mm256_loadu_si256, _mm256_storeu_si256,
    _mm256_sub_epi8, _mm256_xor_si256, _mm_add_epi32, _mm_add_epi8, _mm_loadu_si128,
    _mm_storeu_si128, _mm_sub_epi8, _mm_xor_si128,
};

use super::generic;
use super::{regions, DeltaOp};

macro_rules! lanes {
    ($name:ident, $feature:literal, $width:literal, $vec:ty, $load:ident, $store:ident, $op:ident, $tail:path) => {
        #[target_feature(enable = $feature)]
        unsafe fn $name(a: &[u8], b: &[u8], out: &mut [u8]) {
            let len = out.len().min(a.len()).min(b.len());
            let mut i = 0;
            // SAFETY: each access covers [i, i + $width) and len bounds all three slices.
            while i + $width <= len {
                let va = $load(a.as_ptr().add(i).cast::<$vec>());
                let vb = $load(b.as_ptr().add(i).cast::<$vec>());
                $store(out.as_mut_ptr().add(i).cast::<$vec>(), $op(va, vb));
                i += $width;
            }
            $tail(&a[i..len], &b[i..len], &mut out[i..len]);
        }
    };
}

lanes!(xor16, "sse4.2", 16, __m128i, _mm_loadu_si128, _mm_storeu_si128, _mm_xor_si128, generic::xor);
lanes!(sub16, "sse4.2", 16, __m128i, _mm_loadu_si128, _mm_storeu_si128, _mm_sub_epi8, generic::sub);
lanes!(add16, "sse4.2", 16, __m128i, _mm_loadu_si128, _mm_storeu_si128, _mm_add_epi8, generic::add);
lanes!(xor32, "avx2", 32, __m256i, _mm256_loadu_si256, _mm256_storeu_si256, _mm256_xor_si256, generic::xor);
lanes!(sub32, "avx2", 32, __m256i, _mm256_loadu_si256, _mm256_storeu_si256, _mm256_sub_epi8, generic::sub);
lanes!(add32, "avx2", 32, __m256i, _mm256_loadu_si256, _mm256_storeu_si256, _mm256_add_epi8, generic::add);

#[target_feature(enable = "sse4.2")]
pub(super) unsafe fn sse42_delta_encode(cur: &[u8], prev: &[u8], out: &mut [u8]) {
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

#[target_feature(enable = "sse4.2")]
pub(super) unsafe fn sse42_delta_decode(residual: &[u8], prev: &[u8], out: &mut [u8]) {
    let n = generic::copy_tail(residual, prev, out);
    for (start, end, op) in regions(n) {
        let (r, p, o) = (&residual[start..end], &prev[start..end], &mut out[start..end]);
        match op {
            DeltaOp::Xor => xor16(r, p, o),
            DeltaOp::Sub => add16(r, p, o),
        }
    }
}

#[target_feature(enable = "avx2")]
pub(super) unsafe fn avx2_delta_encode(cur: &[u8], prev: &[u8], out: &mut [u8]) {
    let n = generic::copy_tail(cur, prev, out);
    for (start, end, op) in regions(n) {
        let (c, p, o) = (&cur[start..end], &prev[start..end], &mut out[start..end]);
        match op {
            DeltaOp::Xor => xor32(c, p, o),
            DeltaOp::Sub => sub32(c, p, o),
        }
    }
}

#[target_feature(enable = "avx2")]
pub(super) unsafe fn avx2_delta_decode(residual: &[u8], prev: &[u8], out: &mut [u8]) {
    let n = generic::copy_tail(residual, prev, out);
    for (start, end, op) in regions(n) {
        let (r, p, o) = (&residual[start..end], &prev[start..end], &mut out[start..end]);
        match op {
            DeltaOp::Xor => xor32(r, p, o),
            DeltaOp::Sub => add32(r, p, o),
        }
    }
}

// Counting stays scalar over four banks; the merge into `hist` runs on
// whole vectors of counters.

#[target_feature(enable = "sse4.2")]
pub(super) unsafe fn sse42_histogram(data: &[u8], hist: &mut [u32; 256]) {
    let [b0, b1, b2, b3] = generic::count_banks(data);
    for i in (0..256).step_by(4) {
        // SAFETY: i + 4 <= 256 for every array read and written.
        let sum01 = _mm_add_epi32(
            _mm_loadu_si128(b0.as_ptr().add(i).cast::<__m128i>()),
            _mm_loadu_si128(b1.as_ptr().add(i).cast::<__m128i>()),
        );
        let sum23 = _mm_add_epi32(
            _mm_loadu_si128(b2.as_ptr().add(i).cast::<__m128i>()),
            _mm_loadu_si128(b3.as_ptr().add(i).cast::<__m128i>()),
        );
        let dst = hist.as_mut_ptr().add(i).cast::<__m128i>();
        _mm_storeu_si128(dst, _mm_add_epi32(_mm_loadu_si128(dst), _mm_add_epi32(sum01, sum23)));
    }
}

#[target_feature(enable = "avx2")]
pub(super) unsafe fn avx2_histogram(data: &[u8], hist: &mut [u32; 256]) {
    let [b0, b1, b2, b3] = generic::count_banks(data);
    for i in (0..256).step_by(8) {
        // SAFETY: i + 8 <= 256 for every array read and written.
        let sum01 = _mm256_add_epi32(
            _mm256_loadu_si256(b0.as_ptr().add(i).cast::<__m256i>()),
            _mm256_loadu_si256(b1.as_ptr().add(i).cast::<__m256i>()),
        );
        let sum23 = _mm256_add_epi32(
            _mm256_loadu_si256(b2.as_ptr().add(i).cast::<__m256i>()),
            _mm256_loadu_si256(b3.as_ptr().add(i).cast::<__m256i>()),
        );
        let dst = hist.as_mut_ptr().add(i).cast::<__m256i>();
        _mm256_storeu_si256(dst, _mm256_add_epi32(_mm256_loadu_si256(dst), _mm256_add_epi32(sum01, sum23)));
    }
}
