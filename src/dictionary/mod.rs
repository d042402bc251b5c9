//! Trained dictionaries.
//!
//! A [`Dictionary`] holds everything a compressor needs to code packets of
//! one traffic class: per-context unigram tables, per-context bigram tables
//! keyed by the class of the previous byte, the class map, and an optional
//! LZP prediction table. Dictionaries are immutable once trained or loaded
//! and are shared between compressors through `Arc`.
//!
//! ## Formats
//!
//! | Version | Bigram classes | Class map | Notes |
//! |---------|----------------|-----------|-------|
//! | 3, 4 | 4 | `prev >> 6` (not stored) | Load only, or write via [`Dictionary::save_as`] |
//! | 5 | 8 | stored, trained | Current |
//!
//! ## Example
//!
//! ```rust
//! use pktz::Dictionary;
//!
//! let packets: Vec<Vec<u8>> = (0..8u8).map(|i| vec![i; 128]).collect();
//! let refs: Vec<&[u8]> = packets.iter().map(Vec::as_slice).collect();
//!
//! let dict = Dictionary::train(&refs, 7)?;
//! let blob = dict.save()?;
//! let loaded = Dictionary::load(&blob)?;
//! assert_eq!(loaded.model_id(), 7);
//! # Ok::<(), pktz::PktzError>(())
//! ```

pub mod blob;
mod trainer;

#[cfg(test)]
mod tests;

pub use blob::{blob_size, BlobLayout, BLOB_MAGIC, MIN_BLOB_SIZE};
pub use trainer::{TrainOptions, TrainState, Trainer};

use crate::bigram::BigramClassMap;
use crate::context::NUM_CONTEXTS;
use crate::error::{PktzError, Result};
use crate::freq::FrequencyTable;
use crate::lzp::LzpTable;
use crate::tans::TansTable;

/// Current blob format version.
pub const FORMAT_VERSION: u8 = 5;

/// Oldest blob format version this build loads.
pub const MIN_FORMAT_VERSION: u8 = 3;

/// Dictionary flag: an LZP section follows the bigram tables.
pub const DICT_FLAG_LZP: u8 = 0x01;

/// Flag bits this build understands.
pub const DICT_FLAGS_KNOWN: u8 = DICT_FLAG_LZP;

/// Check a caller-supplied model id. 0 and 255 are reserved.
pub fn check_model_id(model_id: u8) -> Result<u8> {
    match model_id {
        0 | 255 => Err(PktzError::InvalidModelId(model_id)),
        id => Ok(id),
    }
}

/// Frequency and coding tables for every context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ModelSet {
    pub class_map: BigramClassMap,
    /// One per context
    pub unigram_freq: Vec<FrequencyTable>,
    /// `ctx * classes + class`
    pub bigram_freq: Vec<FrequencyTable>,
    pub unigram: Vec<TansTable>,
    pub bigram: Vec<TansTable>,
}

impl ModelSet {
    /// Build coding tables for the given frequencies.
    pub fn build(
        class_map: BigramClassMap,
        unigram_freq: Vec<FrequencyTable>,
        bigram_freq: Vec<FrequencyTable>,
    ) -> Result<Self> {
        debug_assert_eq!(unigram_freq.len(), NUM_CONTEXTS);
        debug_assert_eq!(bigram_freq.len(), NUM_CONTEXTS * class_map.num_classes());
        let unigram = build_tables(&unigram_freq)?;
        let bigram = build_tables(&bigram_freq)?;
        Ok(Self {
            class_map,
            unigram_freq,
            bigram_freq,
            unigram,
            bigram,
        })
    }
}

fn build_tables(freqs: &[FrequencyTable]) -> Result<Vec<TansTable>> {
    let mut tables = Vec::new();
    tables.try_reserve_exact(freqs.len())?;
    for freq in freqs {
        tables.push(TansTable::build(freq)?);
    }
    Ok(tables)
}

/// Trained or loaded statistical model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dictionary {
    model_id: u8,
    version: u8,
    models: ModelSet,
    lzp: Option<LzpTable>,
    checksum: u32,
}

impl Dictionary {
    pub(crate) fn from_parts(
        model_id: u8,
        version: u8,
        models: ModelSet,
        lzp: Option<LzpTable>,
        checksum: u32,
    ) -> Self {
        Self {
            model_id,
            version,
            models,
            lzp,
            checksum,
        }
    }

    /// Train a dictionary in the current format with LZP enabled.
    pub fn train(packets: &[&[u8]], model_id: u8) -> Result<Self> {
        Trainer::new(packets, model_id)?.train()
    }

    /// Train with explicit [`TrainOptions`].
    pub fn train_with_options(packets: &[&[u8]], model_id: u8, options: TrainOptions) -> Result<Self> {
        Trainer::with_options(packets, model_id, options)?.train()
    }

    /// Train from packets laid end to end in `data`, `sizes[i]` bytes each.
    pub fn train_concatenated(data: &[u8], sizes: &[usize], model_id: u8) -> Result<Self> {
        let declared = sizes
            .iter()
            .try_fold(0usize, |acc, &s| acc.checked_add(s))
            .unwrap_or(usize::MAX);
        if declared != data.len() {
            return Err(PktzError::PacketSizeMismatch {
                declared,
                actual: data.len(),
            });
        }
        let mut packets: Vec<&[u8]> = Vec::new();
        packets.try_reserve_exact(sizes.len())?;
        let mut rest = data;
        for &size in sizes {
            let (packet, tail) = rest.split_at(size);
            packets.push(packet);
            rest = tail;
        }
        Self::train(&packets, model_id)
    }

    /// Serialize in this dictionary's own format version.
    pub fn save(&self) -> Result<Vec<u8>> {
        self.save_as(self.version)
    }

    /// Serialize in format `version`.
    ///
    /// Legacy dictionaries upgrade to the current layout losslessly. A
    /// dictionary with trained classes cannot be written as version 3 or 4.
    pub fn save_as(&self, version: u8) -> Result<Vec<u8>> {
        blob::encode(self, BlobLayout::for_version(version)?)
    }

    /// Parse and validate a serialized dictionary.
    pub fn load(data: &[u8]) -> Result<Self> {
        blob::decode(data)
    }

    /// Model id chosen at training time.
    pub fn model_id(&self) -> u8 {
        self.model_id
    }

    /// Format version this dictionary was trained for or loaded from.
    pub fn version(&self) -> u8 {
        self.version
    }

    /// Flag byte as written to the blob header.
    pub fn flags(&self) -> u8 {
        if self.lzp.is_some() {
            DICT_FLAG_LZP
        } else {
            0
        }
    }

    /// CRC32 stored at the end of this dictionary's blob.
    pub fn checksum(&self) -> u32 {
        self.checksum
    }

    pub fn class_map(&self) -> &BigramClassMap {
        &self.models.class_map
    }

    pub fn num_classes(&self) -> usize {
        self.models.class_map.num_classes()
    }

    pub fn lzp(&self) -> Option<&LzpTable> {
        self.lzp.as_ref()
    }

    pub fn has_lzp(&self) -> bool {
        self.lzp.is_some()
    }

    pub fn unigram_freq(&self, ctx: usize) -> &FrequencyTable {
        &self.models.unigram_freq[ctx]
    }

    pub fn bigram_freq(&self, ctx: usize, class: usize) -> &FrequencyTable {
        &self.models.bigram_freq[ctx * self.num_classes() + class]
    }

    /// Unigram coding table for context `ctx`.
    #[inline]
    pub fn unigram_table(&self, ctx: usize) -> &TansTable {
        &self.models.unigram[ctx]
    }

    /// Bigram coding table for context `ctx` and previous-byte class `class`.
    #[inline]
    pub fn bigram_table(&self, ctx: usize, class: usize) -> &TansTable {
        &self.models.bigram[ctx * self.num_classes() + class]
    }
}
