//! Bulk byte transforms with runtime CPU dispatch.
//!
//! Three operations run on every packet: positional delta against the
//! previous packet, byte histograms during training, and running CRC32
//! updates. Each has a portable implementation and vector implementations
//! per architecture. A [`Kernels`] value picks one implementation per
//! operation when a compressor is created; every level produces output
//! byte-identical to [`SimdLevel::Generic`].
//!
//! ## Delta regions
//!
//! | Offsets | Encode | Decode |
//! |---------|--------|--------|
//! | `[0, 16)` | XOR | XOR |
//! | `[16, 64)` | SUB | ADD |
//! | `[64, 256)` | XOR | XOR |
//! | `[256, ..)` | SUB | ADD |
//!
//! Offsets past the end of the previous packet are delta'd against 0, which
//! leaves the byte unchanged under both operations.

mod generic;
#[cfg(target_arch = "aarch64")]
mod neon;
#[cfg(target_arch = "x86_64")]
mod x86;

use std::sync::OnceLock;

/// Combining operation of one delta region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeltaOp {
    Xor,
    Sub,
}

/// `(start, end, op)` for every delta region, ascending.
pub const DELTA_REGIONS: [(usize, usize, DeltaOp); 4] = [
    (0, 16, DeltaOp::Xor),
    (16, 64, DeltaOp::Sub),
    (64, 256, DeltaOp::Xor),
    (256, usize::MAX, DeltaOp::Sub),
];

/// Implementation tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SimdLevel {
    /// Portable scalar code.
    #[default]
    Generic,
    /// 16-byte vectors (x86_64, SSE4.2).
    Sse42,
    /// 32-byte vectors (x86_64, AVX2).
    Avx2,
    /// 16-byte vectors (aarch64).
    Neon,
}

impl SimdLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            SimdLevel::Generic => "generic",
            SimdLevel::Sse42 => "sse4.2",
            SimdLevel::Avx2 => "avx2",
            SimdLevel::Neon => "neon",
        }
    }

    /// Map a harness integer to a level. `0` and unknown codes mean "auto".
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            1 => Some(SimdLevel::Generic),
            2 => Some(SimdLevel::Sse42),
            3 => Some(SimdLevel::Avx2),
            4 => Some(SimdLevel::Neon),
            _ => None,
        }
    }

    /// Next tier down when this one is unavailable.
    fn fallback(self) -> Option<Self> {
        match self {
            SimdLevel::Avx2 => Some(SimdLevel::Sse42),
            SimdLevel::Sse42 | SimdLevel::Neon => Some(SimdLevel::Generic),
            SimdLevel::Generic => None,
        }
    }

    /// Every level this build knows about.
    pub const ALL: [SimdLevel; 4] = [
        SimdLevel::Generic,
        SimdLevel::Sse42,
        SimdLevel::Avx2,
        SimdLevel::Neon,
    ];
}

impl std::fmt::Display for SimdLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// CPU features relevant to dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Capabilities {
    pub sse42: bool,
    pub avx2: bool,
    pub neon: bool,
}

impl Capabilities {
    fn probe() -> Self {
        #[allow(unused_mut)]
        let mut caps = Capabilities::default();
        #[cfg(target_arch = "x86_64")]
        {
            caps.sse42 = is_x86_feature_detected!("sse4.2");
            caps.avx2 = caps.sse42 && is_x86_feature_detected!("avx2");
        }
        #[cfg(target_arch = "aarch64")]
        {
            caps.neon = std::arch::is_aarch64_feature_detected!("neon");
        }
        caps
    }

    /// Whether kernels for `level` may run on this CPU.
    pub fn supports(self, level: SimdLevel) -> bool {
        match level {
            SimdLevel::Generic => true,
            SimdLevel::Sse42 => self.sse42,
            SimdLevel::Avx2 => self.avx2,
            SimdLevel::Neon => self.neon,
        }
    }

    /// Best level this CPU supports.
    pub fn best(self) -> SimdLevel {
        if self.avx2 {
            SimdLevel::Avx2
        } else if self.sse42 {
            SimdLevel::Sse42
        } else if self.neon {
            SimdLevel::Neon
        } else {
            SimdLevel::Generic
        }
    }
}

static CAPABILITIES: OnceLock<Capabilities> = OnceLock::new();

/// CPU capabilities (probed once per process).
pub fn capabilities() -> Capabilities {
    *CAPABILITIES.get_or_init(Capabilities::probe)
}

/// Level that will actually run for `requested` (`None` = best available).
///
/// Unsupported requests fall back `Avx2 -> Sse42 -> Generic` and
/// `Neon -> Generic`.
pub fn resolve(requested: Option<SimdLevel>) -> SimdLevel {
    let caps = capabilities();
    let mut level = match requested {
        Some(level) => level,
        None => return caps.best(),
    };
    while !caps.supports(level) {
        match level.fallback() {
            Some(next) => level = next,
            None => break,
        }
    }
    level
}

type DeltaFn = unsafe fn(&[u8], &[u8], &mut [u8]);
type HistogramFn = unsafe fn(&[u8], &mut [u32; 256]);
type Crc32Fn = unsafe fn(u32, &[u8]) -> u32;

/// Resolved implementation of every bulk operation.
///
/// Only constructed for levels the CPU supports, which is what makes the
/// safe wrappers below sound.
#[derive(Clone, Copy)]
pub struct Kernels {
    level: SimdLevel,
    delta_encode: DeltaFn,
    delta_decode: DeltaFn,
    histogram: HistogramFn,
    crc32: Crc32Fn,
}

impl Kernels {
    /// Kernels for `requested`, falling back as [`resolve`] does.
    pub fn new(requested: Option<SimdLevel>) -> Self {
        Self::for_supported(resolve(requested))
    }

    /// Best kernels for this CPU.
    pub fn detect() -> Self {
        Self::new(None)
    }

    fn generic() -> Self {
        Self {
            level: SimdLevel::Generic,
            delta_encode: generic::delta_encode,
            delta_decode: generic::delta_decode,
            histogram: generic::histogram,
            crc32: crate::crc32::crc32_update,
        }
    }

    fn for_supported(level: SimdLevel) -> Self {
        match level {
            #[cfg(target_arch = "x86_64")]
            SimdLevel::Sse42 => Self {
                level,
                delta_encode: x86::sse42_delta_encode,
                delta_decode: x86::sse42_delta_decode,
                histogram: x86::sse42_histogram,
                crc32: crate::crc32::crc32_update_slice8,
            },
            #[cfg(target_arch = "x86_64")]
            SimdLevel::Avx2 => Self {
                level,
                delta_encode: x86::avx2_delta_encode,
                delta_decode: x86::avx2_delta_decode,
                histogram: x86::avx2_histogram,
                crc32: crate::crc32::crc32_update_slice8,
            },
            #[cfg(target_arch = "aarch64")]
            SimdLevel::Neon => Self {
                level,
                delta_encode: neon::delta_encode,
                delta_decode: neon::delta_decode,
                histogram: neon::histogram,
                crc32: crate::crc32::crc32_update_slice8,
            },
            _ => Self::generic(),
        }
    }

    /// Level these kernels run at.
    pub fn level(&self) -> SimdLevel {
        self.level
    }

    /// Delta `cur` against `prev` into `out[..cur.len()]`.
    #[inline]
    pub fn delta_encode(&self, cur: &[u8], prev: &[u8], out: &mut [u8]) {
        assert!(out.len() >= cur.len());
        // SAFETY: `self.level` was checked against the CPU in `resolve`.
        unsafe { (self.delta_encode)(cur, prev, &mut out[..cur.len()]) }
    }

    /// Inverse of [`delta_encode`](Self::delta_encode).
    #[inline]
    pub fn delta_decode(&self, residual: &[u8], prev: &[u8], out: &mut [u8]) {
        assert!(out.len() >= residual.len());
        // SAFETY: see `delta_encode`.
        unsafe { (self.delta_decode)(residual, prev, &mut out[..residual.len()]) }
    }

    /// Add the byte counts of `data` to `hist`.
    #[inline]
    pub fn histogram(&self, data: &[u8], hist: &mut [u32; 256]) {
        // SAFETY: see `delta_encode`.
        unsafe { (self.histogram)(data, hist) }
    }

    /// Continue a finalized CRC32 over `data`. Blob checksums use this.
    #[inline]
    pub fn crc32_update(&self, crc: u32, data: &[u8]) -> u32 {
        // SAFETY: see `delta_encode`.
        unsafe { (self.crc32)(crc, data) }
    }
}

impl Default for Kernels {
    fn default() -> Self {
        Self::detect()
    }
}

impl std::fmt::Debug for Kernels {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Kernels").field("level", &self.level).finish()
    }
}

/// Split `0..len` into the delta regions, as `(start, end, op)`.
#[inline]
fn regions(len: usize) -> impl Iterator<Item = (usize, usize, DeltaOp)> {
    DELTA_REGIONS
        .iter()
        .filter(move |&&(start, _, _)| start < len)
        .map(move |&(start, end, op)| (start, end.min(len), op))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pattern(len: usize, seed: u32) -> Vec<u8> {
        (0..len as u32)
            .map(|i| (i.wrapping_mul(2654435761).wrapping_add(seed) >> 11) as u8)
            .collect()
    }

    fn reference_delta(cur: &[u8], prev: &[u8]) -> Vec<u8> {
        cur.iter()
            .enumerate()
            .map(|(i, &c)| {
                let p = prev.get(i).copied().unwrap_or(0);
                if i < 16 || (64..256).contains(&i) {
                    c ^ p
                } else {
                    c.wrapping_sub(p)
                }
            })
            .collect()
    }

    fn available_levels() -> Vec<Kernels> {
        SimdLevel::ALL
            .iter()
            .filter(|&&l| capabilities().supports(l))
            .map(|&l| Kernels::new(Some(l)))
            .collect()
    }

    #[test]
    fn test_from_code() {
        assert_eq!(SimdLevel::from_code(0), None);
        assert_eq!(SimdLevel::from_code(1), Some(SimdLevel::Generic));
        assert_eq!(SimdLevel::from_code(3), Some(SimdLevel::Avx2));
        assert_eq!(SimdLevel::from_code(200), None);
    }

    #[test]
    fn test_resolve_never_fails() {
        let caps = capabilities();
        for level in SimdLevel::ALL {
            let got = resolve(Some(level));
            assert!(caps.supports(got));
            if caps.supports(level) {
                assert_eq!(got, level);
            }
        }
        assert_eq!(resolve(Some(SimdLevel::Generic)), SimdLevel::Generic);
        assert_eq!(resolve(None), caps.best());
    }

    #[test]
    fn test_fallback_chain() {
        assert_eq!(SimdLevel::Avx2.fallback(), Some(SimdLevel::Sse42));
        assert_eq!(SimdLevel::Sse42.fallback(), Some(SimdLevel::Generic));
        assert_eq!(SimdLevel::Neon.fallback(), Some(SimdLevel::Generic));
        assert_eq!(SimdLevel::Generic.fallback(), None);
    }

    #[test]
    fn test_generic_delta_matches_reference() {
        let k = Kernels::new(Some(SimdLevel::Generic));
        for len in [0usize, 1, 17, 65, 257, 1500] {
            let cur = pattern(len, 1);
            for prev_len in [0usize, 10, 100, len] {
                let prev = pattern(prev_len, 99);
                let mut out = vec![0u8; len];
                k.delta_encode(&cur, &prev, &mut out);
                assert_eq!(out, reference_delta(&cur, &prev), "len {len} prev {prev_len}");
            }
        }
    }

    #[test]
    fn test_levels_identical_with_offsets() {
        let generic = Kernels::new(Some(SimdLevel::Generic));
        let base_cur = pattern(400, 5);
        let base_prev = pattern(400, 77);
        for k in available_levels() {
            for len in [17usize, 65, 257, 300] {
                for align in 0..8 {
                    let cur = &base_cur[align..align + len];
                    let prev = &base_prev[align * 2 % 7..][..len.min(390)];

                    let mut want = vec![0u8; len];
                    let mut got = vec![0u8; len + align];
                    generic.delta_encode(cur, prev, &mut want);
                    k.delta_encode(cur, prev, &mut got[align..]);
                    assert_eq!(&got[align..], &want[..], "{} encode len {len}", k.level());

                    let mut back = vec![0u8; len];
                    k.delta_decode(&got[align..], prev, &mut back);
                    assert_eq!(back, cur, "{} decode len {len}", k.level());

                    let mut h_want = [0u32; 256];
                    let mut h_got = [0u32; 256];
                    generic.histogram(cur, &mut h_want);
                    k.histogram(cur, &mut h_got);
                    assert_eq!(h_got, h_want, "{} histogram", k.level());

                    assert_eq!(k.crc32_update(7, cur), generic.crc32_update(7, cur));
                }
            }
        }
    }

    #[test]
    fn test_short_prev_passes_tail_through() {
        for k in available_levels() {
            let cur = pattern(300, 3);
            let prev = pattern(40, 4);
            let mut out = vec![0u8; 300];
            k.delta_encode(&cur, &prev, &mut out);
            assert_eq!(&out[40..], &cur[40..]);
        }
    }

    #[test]
    fn test_histogram_accumulates() {
        for k in available_levels() {
            let mut hist = [0u32; 256];
            k.histogram(&[1, 1, 2], &mut hist);
            k.histogram(&[1; 100], &mut hist);
            k.histogram(&pattern(259, 11), &mut hist);
            let mut want = [0u32; 256];
            want[1] += 102;
            want[2] += 1;
            for b in pattern(259, 11) {
                want[b as usize] += 1;
            }
            assert_eq!(hist, want, "{}", k.level());
        }
    }
}
