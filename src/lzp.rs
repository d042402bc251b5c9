//! LZP byte prediction.
//!
//! Each `(previous byte, offset)` context hashes to one of [`LZP_TABLE_SIZE`]
//! slots holding a predicted byte. Filtering XORs a byte with its slot's
//! prediction, so correctly predicted bytes collapse to `0x00` before entropy
//! coding. Slots without a trustworthy prediction are left invalid and never
//! touch the data.
//!
//! Training is two passes over the corpus: a Boyer-Moore majority vote per
//! slot, then a verification replay that measures each candidate's hit rate.

use crate::error::{try_vec, PktzError, Result};

/// Hash width in bits.
pub const LZP_TABLE_BITS: u32 = 17;

/// Slots in the prediction table.
pub const LZP_TABLE_SIZE: usize = 1 << LZP_TABLE_BITS;

/// Observations a slot needs before it may predict.
pub const LZP_MIN_SAMPLES: u32 = 2;

/// Slot for the byte at `offset` following `prev`.
#[inline]
pub fn lzp_hash(prev: u8, offset: usize) -> usize {
    let key = u32::from(prev) | ((offset as u32) << 8);
    (key.wrapping_mul(0x9E37_79B1) >> (32 - LZP_TABLE_BITS)) as usize
}

/// Whether a slot with `hits` correct predictions out of `total` observations
/// is kept: at least two samples and a hit rate of 40% or more.
#[inline]
pub fn is_accepted(hits: u32, total: u32) -> bool {
    total >= LZP_MIN_SAMPLES && u64::from(hits) * 10 >= u64::from(total) * 4
}

/// One prediction slot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LzpEntry {
    pub value: u8,
    pub valid: bool,
}

/// Trained prediction table.
#[derive(Clone, PartialEq, Eq)]
pub struct LzpTable {
    entries: Box<[LzpEntry]>,
}

impl LzpTable {
    /// Table of [`LZP_TABLE_SIZE`] entries, as read back from a blob.
    pub fn from_entries(entries: Vec<LzpEntry>) -> Result<Self> {
        if entries.len() != LZP_TABLE_SIZE {
            return Err(PktzError::MalformedBlob("unsupported LZP table size"));
        }
        Ok(Self {
            entries: entries.into_boxed_slice(),
        })
    }

    pub fn entries(&self) -> &[LzpEntry] {
        &self.entries
    }

    /// Number of slots that predict.
    pub fn valid_count(&self) -> usize {
        self.entries.iter().filter(|e| e.valid).count()
    }

    /// Prediction for the byte at `offset` following `prev`.
    #[inline]
    pub fn predict(&self, prev: u8, offset: usize) -> Option<u8> {
        let entry = self.entries[lzp_hash(prev, offset)];
        entry.valid.then_some(entry.value)
    }

    /// XOR every predicted byte of `input` with its prediction.
    ///
    /// The hash context is the previous *unfiltered* byte.
    pub fn filter(&self, input: &[u8], out: &mut [u8]) {
        let mut prev = 0u8;
        for (i, (&byte, slot)) in input.iter().zip(out.iter_mut()).enumerate() {
            *slot = match self.predict(prev, i) {
                Some(p) => byte ^ p,
                None => byte,
            };
            prev = byte;
        }
    }

    /// Inverse of [`filter`](Self::filter).
    pub fn unfilter(&self, filtered: &[u8], out: &mut [u8]) {
        let mut prev = 0u8;
        for (i, (&byte, slot)) in filtered.iter().zip(out.iter_mut()).enumerate() {
            let restored = match self.predict(prev, i) {
                Some(p) => byte ^ p,
                None => byte,
            };
            *slot = restored;
            prev = restored;
        }
    }

    /// Teach slots that `base` leaves invalid the bytes seen in `data`.
    ///
    /// Used by stateful compressors to adapt a private copy of the dictionary
    /// table; encoder and decoder apply the same updates.
    pub fn learn(&mut self, base: &LzpTable, data: &[u8]) {
        let mut prev = 0u8;
        for (i, &byte) in data.iter().enumerate() {
            let slot = lzp_hash(prev, i);
            if !base.entries[slot].valid {
                self.entries[slot] = LzpEntry {
                    value: byte,
                    valid: true,
                };
            }
            prev = byte;
        }
    }

    /// Restore every slot from `base`.
    pub fn reset_from(&mut self, base: &LzpTable) {
        self.entries.copy_from_slice(&base.entries);
    }
}

impl std::fmt::Debug for LzpTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LzpTable")
            .field("slots", &self.entries.len())
            .field("valid", &self.valid_count())
            .finish()
    }
}

/// Two-pass majority-vote trainer.
pub struct LzpTrainer {
    candidate: Vec<u8>,
    votes: Vec<u32>,
    hits: Vec<u32>,
    totals: Vec<u32>,
}

impl LzpTrainer {
    pub fn new() -> Result<Self> {
        Ok(Self {
            candidate: try_vec(LZP_TABLE_SIZE)?,
            votes: try_vec(LZP_TABLE_SIZE)?,
            hits: try_vec(LZP_TABLE_SIZE)?,
            totals: try_vec(LZP_TABLE_SIZE)?,
        })
    }

    /// Pass 1: Boyer-Moore vote for every byte of `packet`.
    pub fn vote(&mut self, packet: &[u8]) {
        let mut prev = 0u8;
        for (i, &byte) in packet.iter().enumerate() {
            let slot = lzp_hash(prev, i);
            if self.votes[slot] == 0 {
                self.candidate[slot] = byte;
                self.votes[slot] = 1;
            } else if self.candidate[slot] == byte {
                self.votes[slot] += 1;
            } else {
                self.votes[slot] -= 1;
            }
            prev = byte;
        }
    }

    /// Pass 2: count how often each slot's candidate is right.
    pub fn verify(&mut self, packet: &[u8]) {
        let mut prev = 0u8;
        for (i, &byte) in packet.iter().enumerate() {
            let slot = lzp_hash(prev, i);
            self.totals[slot] = self.totals[slot].saturating_add(1);
            if self.candidate[slot] == byte {
                self.hits[slot] = self.hits[slot].saturating_add(1);
            }
            prev = byte;
        }
    }

    /// Hits and observations recorded for `slot`.
    pub fn slot_stats(&self, slot: usize) -> (u32, u32) {
        (self.hits[slot], self.totals[slot])
    }

    /// Apply the acceptance rule to every slot.
    pub fn finish(self) -> Result<LzpTable> {
        let mut entries: Vec<LzpEntry> = try_vec(LZP_TABLE_SIZE)?;
        for (slot, entry) in entries.iter_mut().enumerate() {
            if is_accepted(self.hits[slot], self.totals[slot]) {
                *entry = LzpEntry {
                    value: self.candidate[slot],
                    valid: true,
                };
            }
        }
        LzpTable::from_entries(entries)
    }
}
