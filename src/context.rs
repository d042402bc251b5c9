//! Positional context buckets.
//!
//! Byte offsets inside a packet are grouped into 16 contiguous ranges. Early
//! header bytes get narrow buckets of their own, payload bytes share wide ones.

use std::ops::Range;

/// Number of positional contexts.
pub const NUM_CONTEXTS: usize = 16;

/// Exclusive upper bound of each bucket, ascending.
pub const CONTEXT_THRESHOLDS: [usize; NUM_CONTEXTS] = [
    8, 16, 24, 32, 48, 64, 96, 128, 192, 256, 384, 512, 1024, 4096, 16384, 65536,
];

/// Bucket index for a byte offset. Offsets past the last threshold stay in
/// the last bucket.
#[inline]
pub fn context_bucket(offset: usize) -> usize {
    CONTEXT_THRESHOLDS
        .iter()
        .position(|&limit| offset < limit)
        .unwrap_or(NUM_CONTEXTS - 1)
}

/// Offset range covered by `bucket`.
#[inline]
pub fn bucket_range(bucket: usize) -> Range<usize> {
    let start = if bucket == 0 { 0 } else { CONTEXT_THRESHOLDS[bucket - 1] };
    start..CONTEXT_THRESHOLDS[bucket]
}

/// Non-empty `(bucket, range)` spans covering `0..len`, in offset order.
///
/// Iterating spans instead of calling [`context_bucket`] per byte keeps the
/// coding loops free of the threshold search.
pub fn context_spans(len: usize) -> ContextSpans {
    ContextSpans {
        len,
        front: 0,
        back: NUM_CONTEXTS,
    }
}

/// Iterator returned by [`context_spans`].
#[derive(Debug, Clone)]
pub struct ContextSpans {
    len: usize,
    front: usize,
    back: usize,
}

impl ContextSpans {
    fn span(&self, bucket: usize) -> Option<(usize, Range<usize>)> {
        let range = bucket_range(bucket);
        if range.start >= self.len {
            return None;
        }
        let end = if bucket == NUM_CONTEXTS - 1 {
            self.len
        } else {
            range.end.min(self.len)
        };
        Some((bucket, range.start..end))
    }
}

impl Iterator for ContextSpans {
    type Item = (usize, Range<usize>);

    fn next(&mut self) -> Option<Self::Item> {
        while self.front < self.back {
            let bucket = self.front;
            self.front += 1;
            if let Some(span) = self.span(bucket) {
                return Some(span);
            }
            // Buckets are ascending, nothing further can start before len.
            self.front = self.back;
        }
        None
    }
}

impl DoubleEndedIterator for ContextSpans {
    fn next_back(&mut self) -> Option<Self::Item> {
        while self.back > self.front {
            self.back -= 1;
            if let Some(span) = self.span(self.back) {
                return Some(span);
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bucket_boundaries() {
        assert_eq!(context_bucket(0), 0);
        assert_eq!(context_bucket(7), 0);
        assert_eq!(context_bucket(8), 1);
        assert_eq!(context_bucket(63), 5);
        assert_eq!(context_bucket(64), 6);
        assert_eq!(context_bucket(255), 9);
        assert_eq!(context_bucket(256), 10);
        assert_eq!(context_bucket(65535), 15);
        assert_eq!(context_bucket(65536), 15);
        assert_eq!(context_bucket(1 << 20), 15);
    }

    #[test]
    fn test_buckets_contiguous_and_exhaustive() {
        let mut expected_start = 0;
        for bucket in 0..NUM_CONTEXTS {
            let range = bucket_range(bucket);
            assert_eq!(range.start, expected_start);
            assert!(range.end > range.start);
            for offset in [range.start, range.end - 1] {
                assert_eq!(context_bucket(offset), bucket);
            }
            expected_start = range.end;
        }
        assert_eq!(expected_start, 65536);
    }

    #[test]
    fn test_spans_cover_len() {
        for len in [0usize, 1, 8, 17, 65, 257, 1500, 65535, 70000] {
            let mut next = 0;
            for (bucket, range) in context_spans(len) {
                assert_eq!(range.start, next);
                assert_eq!(context_bucket(range.start), bucket);
                next = range.end;
            }
            assert_eq!(next, len);
        }
    }

    #[test]
    fn test_spans_reverse() {
        let forward: Vec<_> = context_spans(300).collect();
        let mut backward: Vec<_> = context_spans(300).rev().collect();
        backward.reverse();
        assert_eq!(forward, backward);
        assert_eq!(forward.last(), Some(&(10, 256..300)));
    }
}
