//! Dictionary training.
//!
//! Training walks a fixed sequence of states. Every stage owns its scratch
//! buffers, so a failure at any point drops all partial state and returns
//! the error; nothing half-built escapes.
//!
//! ```text
//! Created -> UnigramAccumulated -> BigramClustered -> BigramAccumulated
//!         -> TablesBuilt -> LzpTrained -> RefilteredAndRebuilt
//!         -> Checksummed -> Ready
//! ```

use super::{blob, check_model_id, BlobLayout, Dictionary, ModelSet, FORMAT_VERSION};
use crate::bigram::{BigramClassMap, BigramCounter, BIGRAM_CLASSES};
use crate::compressor::MAX_PACKET_SIZE;
use crate::context::{context_spans, NUM_CONTEXTS};
use crate::error::{try_filled, PktzError, Result};
use crate::freq::{FrequencyTable, NUM_SYMBOLS};
use crate::lzp::{LzpTable, LzpTrainer};
use crate::simd::Kernels;

/// Training stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrainState {
    Created,
    UnigramAccumulated,
    BigramClustered,
    BigramAccumulated,
    TablesBuilt,
    LzpTrained,
    RefilteredAndRebuilt,
    Checksummed,
    Ready,
}

/// Training options.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrainOptions {
    /// Blob format version to train for. Versions 3 and 4 use the fixed
    /// 4-class map instead of clustering.
    pub version: u8,
    /// Train an LZP table.
    pub lzp: bool,
}

impl Default for TrainOptions {
    fn default() -> Self {
        Self {
            version: FORMAT_VERSION,
            lzp: true,
        }
    }
}

type Counts = [u64; NUM_SYMBOLS];

/// Single-use dictionary trainer.
pub struct Trainer<'a> {
    packets: &'a [&'a [u8]],
    model_id: u8,
    layout: BlobLayout,
    options: TrainOptions,
    kernels: Kernels,
    state: TrainState,
}

impl<'a> Trainer<'a> {
    pub fn new(packets: &'a [&'a [u8]], model_id: u8) -> Result<Self> {
        Self::with_options(packets, model_id, TrainOptions::default())
    }

    pub fn with_options(packets: &'a [&'a [u8]], model_id: u8, options: TrainOptions) -> Result<Self> {
        let model_id = check_model_id(model_id)?;
        let layout = BlobLayout::for_version(options.version)?;
        if let Some(p) = packets.iter().find(|p| p.len() > MAX_PACKET_SIZE) {
            return Err(PktzError::PacketTooLarge {
                len: p.len(),
                max: MAX_PACKET_SIZE,
            });
        }
        Ok(Self {
            packets,
            model_id,
            layout,
            options,
            kernels: Kernels::detect(),
            state: TrainState::Created,
        })
    }

    /// Current stage.
    pub fn state(&self) -> TrainState {
        self.state
    }

    fn advance(&mut self, next: TrainState) {
        tracing::debug!(from = ?self.state, to = ?next, "dictionary trainer transition");
        self.state = next;
    }

    /// Run every stage and return the finished dictionary.
    pub fn train(mut self) -> Result<Dictionary> {
        let total: usize = self.packets.iter().map(|p| p.len()).sum();
        tracing::debug!(
            packets = self.packets.len(),
            bytes = total,
            model_id = self.model_id,
            version = self.layout.version(),
            "training dictionary"
        );

        let unigram_counts = self.accumulate_unigram()?;
        let class_map = self.cluster()?;
        let bigram_counts = self.accumulate_bigram(&class_map)?;
        let models = self.build_tables(class_map, &unigram_counts, &bigram_counts)?;
        let lzp = self.train_lzp()?;
        let models = self.refilter(models, lzp.as_ref())?;
        let dict = self.checksum(models, lzp)?;
        self.advance(TrainState::Ready);
        Ok(dict)
    }

    fn accumulate_unigram(&mut self) -> Result<Vec<Counts>> {
        let mut counts: Vec<Counts> = try_filled(NUM_CONTEXTS, [0; NUM_SYMBOLS])?;
        for packet in self.packets {
            count_unigram(&self.kernels, packet, &mut counts);
        }
        self.advance(TrainState::UnigramAccumulated);
        Ok(counts)
    }

    fn cluster(&mut self) -> Result<BigramClassMap> {
        let map = match self.layout {
            BlobLayout::Legacy { .. } => BigramClassMap::legacy(),
            BlobLayout::Current => {
                let mut counter = BigramCounter::new()?;
                for packet in self.packets {
                    counter.observe(packet);
                }
                counter.cluster(BIGRAM_CLASSES)
            }
        };
        self.advance(TrainState::BigramClustered);
        Ok(map)
    }

    fn accumulate_bigram(&mut self, class_map: &BigramClassMap) -> Result<Vec<Counts>> {
        let mut counts: Vec<Counts> = try_filled(NUM_CONTEXTS * class_map.num_classes(), [0; NUM_SYMBOLS])?;
        for packet in self.packets {
            count_bigram(class_map, packet, &mut counts);
        }
        self.advance(TrainState::BigramAccumulated);
        Ok(counts)
    }

    fn build_tables(
        &mut self,
        class_map: BigramClassMap,
        unigram_counts: &[Counts],
        bigram_counts: &[Counts],
    ) -> Result<ModelSet> {
        let models = ModelSet::build(class_map, normalize_all(unigram_counts)?, normalize_all(bigram_counts)?)?;
        self.advance(TrainState::TablesBuilt);
        Ok(models)
    }

    fn train_lzp(&mut self) -> Result<Option<LzpTable>> {
        let table = if self.options.lzp {
            let mut trainer = LzpTrainer::new()?;
            for packet in self.packets {
                trainer.vote(packet);
            }
            for packet in self.packets {
                trainer.verify(packet);
            }
            let table = trainer.finish()?;
            let valid = table.valid_count();
            tracing::debug!(valid_slots = valid, "LZP table trained");
            (valid > 0).then_some(table)
        } else {
            None
        };
        self.advance(TrainState::LzpTrained);
        Ok(table)
    }

    /// Re-derive every frequency table from LZP-filtered packets so the
    /// tables match what the coder sees at runtime.
    fn refilter(&mut self, models: ModelSet, lzp: Option<&LzpTable>) -> Result<ModelSet> {
        let models = match lzp {
            None => models,
            Some(lzp) => {
                let class_map = models.class_map;
                let mut unigram: Vec<Counts> = try_filled(NUM_CONTEXTS, [0; NUM_SYMBOLS])?;
                let mut bigram: Vec<Counts> = try_filled(NUM_CONTEXTS * class_map.num_classes(), [0; NUM_SYMBOLS])?;
                let mut filtered: Vec<u8> = Vec::new();
                for packet in self.packets {
                    filtered.clear();
                    filtered.try_reserve(packet.len())?;
                    filtered.resize(packet.len(), 0);
                    lzp.filter(packet, &mut filtered);
                    count_unigram(&self.kernels, &filtered, &mut unigram);
                    count_bigram(&class_map, &filtered, &mut bigram);
                }
                ModelSet::build(class_map, normalize_all(&unigram)?, normalize_all(&bigram)?)?
            }
        };
        self.advance(TrainState::RefilteredAndRebuilt);
        Ok(models)
    }

    fn checksum(&mut self, models: ModelSet, lzp: Option<LzpTable>) -> Result<Dictionary> {
        let mut dict = Dictionary::from_parts(self.model_id, self.layout.version(), models, lzp, 0);
        let encoded = blob::encode(&dict, self.layout)?;
        let tail = &encoded[encoded.len() - blob::CHECKSUM_SIZE..];
        dict.checksum = u32::from_le_bytes([tail[0], tail[1], tail[2], tail[3]]);
        self.advance(TrainState::Checksummed);
        Ok(dict)
    }
}

/// Add each context span's byte counts of `packet` to `counts[ctx]`.
fn count_unigram(kernels: &Kernels, packet: &[u8], counts: &mut [Counts]) {
    for (ctx, range) in context_spans(packet.len()) {
        let mut hist = [0u32; NUM_SYMBOLS];
        kernels.histogram(&packet[range], &mut hist);
        for (c, &h) in counts[ctx].iter_mut().zip(hist.iter()) {
            *c += u64::from(h);
        }
    }
}

/// Add every byte of `packet` to `counts[ctx * classes + class(prev)]`.
fn count_bigram(class_map: &BigramClassMap, packet: &[u8], counts: &mut [Counts]) {
    let classes = class_map.num_classes();
    let mut prev = 0u8;
    for (ctx, range) in context_spans(packet.len()) {
        for &byte in &packet[range] {
            counts[ctx * classes + class_map.class_of(prev)][byte as usize] += 1;
            prev = byte;
        }
    }
}

fn normalize_all(counts: &[Counts]) -> Result<Vec<FrequencyTable>> {
    let mut tables = Vec::new();
    tables.try_reserve_exact(counts.len())?;
    for c in counts {
        let total = c.iter().sum();
        tables.push(FrequencyTable::normalize(c, total));
    }
    Ok(tables)
}
