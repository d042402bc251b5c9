//! Bigram class model.
//!
//! The 256 possible previous-byte values are clustered into a handful of
//! classes so a bigram model needs `classes` tables per context instead of 256.
//! Clustering is a single deterministic pass: previous bytes are ordered by
//! their most frequent successor and the order is cut into equal groups.

use crate::error::{try_vec, PktzError, Result};
use crate::freq::NUM_SYMBOLS;

/// Classes in the current format.
pub const BIGRAM_CLASSES: usize = 8;

/// Classes in format versions 3 and 4.
pub const LEGACY_BIGRAM_CLASSES: usize = 4;

/// Mapping from previous byte to bigram class.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BigramClassMap {
    classes: [u8; NUM_SYMBOLS],
    num_classes: usize,
}

impl BigramClassMap {
    /// Fixed map used by legacy blobs: the top two bits of the previous byte.
    pub fn legacy() -> Self {
        let mut classes = [0u8; NUM_SYMBOLS];
        for (prev, class) in classes.iter_mut().enumerate() {
            *class = (prev >> 6) as u8;
        }
        Self {
            classes,
            num_classes: LEGACY_BIGRAM_CLASSES,
        }
    }

    /// Accept a stored map, checking every class index is in range.
    pub fn from_bytes(classes: [u8; NUM_SYMBOLS], num_classes: usize) -> Result<Self> {
        if classes.iter().any(|&c| usize::from(c) >= num_classes) {
            return Err(PktzError::MalformedBlob("bigram class index out of range"));
        }
        Ok(Self {
            classes,
            num_classes,
        })
    }

    /// Class of previous byte `prev`.
    #[inline]
    pub fn class_of(&self, prev: u8) -> usize {
        usize::from(self.classes[prev as usize])
    }

    pub fn num_classes(&self) -> usize {
        self.num_classes
    }

    pub fn as_bytes(&self) -> &[u8; NUM_SYMBOLS] {
        &self.classes
    }

    /// True when this is the map legacy blobs synthesize.
    pub fn is_legacy(&self) -> bool {
        *self == Self::legacy()
    }
}

/// Successor counts for every (previous byte, byte) pair.
pub struct BigramCounter {
    matrix: Vec<u64>,
}

impl BigramCounter {
    pub fn new() -> Result<Self> {
        Ok(Self {
            matrix: try_vec(NUM_SYMBOLS * NUM_SYMBOLS)?,
        })
    }

    /// Count every adjacent pair in `packet`; offset 0 pairs with 0x00.
    pub fn observe(&mut self, packet: &[u8]) {
        let mut prev = 0u8;
        for &byte in packet {
            self.matrix[(prev as usize) * NUM_SYMBOLS + byte as usize] += 1;
            prev = byte;
        }
    }

    /// Most frequent successor of `prev` (lowest symbol on ties, 0 if unseen).
    pub fn peak_successor(&self, prev: u8) -> u8 {
        let row = &self.matrix[(prev as usize) * NUM_SYMBOLS..][..NUM_SYMBOLS];
        let mut best = 0usize;
        for (symbol, &count) in row.iter().enumerate() {
            if count > row[best] {
                best = symbol;
            }
        }
        best as u8
    }

    /// Cluster previous bytes into `num_classes` equal groups.
    pub fn cluster(&self, num_classes: usize) -> BigramClassMap {
        debug_assert!(num_classes > 0 && NUM_SYMBOLS % num_classes == 0);
        let mut peaks = [0u8; NUM_SYMBOLS];
        for (prev, peak) in peaks.iter_mut().enumerate() {
            *peak = self.peak_successor(prev as u8);
        }

        let mut order: Vec<u8> = (0..=255).collect();
        // Stable: equal peaks keep ascending previous-byte order.
        order.sort_by_key(|&prev| peaks[prev as usize]);

        let group = NUM_SYMBOLS / num_classes;
        let mut classes = [0u8; NUM_SYMBOLS];
        for (rank, &prev) in order.iter().enumerate() {
            classes[prev as usize] = (rank / group) as u8;
        }
        BigramClassMap {
            classes,
            num_classes,
        }
    }
}
