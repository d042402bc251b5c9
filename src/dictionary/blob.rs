//! Dictionary blob serialization.
//!
//! ## Layout (little-endian)
//!
//! | Offset | Field | Size |
//! |--------|-------|------|
//! | 0 | magic `"PKTZ"` | 4 |
//! | 4 | version | 1 |
//! | 5 | model id | 1 |
//! | 6 | context count (16) | 1 |
//! | 7 | flags (bit 0: LZP) | 1 |
//! | 8 | class map (version 5 only) | 256 |
//! | .. | unigram tables, 16 x 256 x u16 | 8192 |
//! | .. | bigram tables, 16 x classes x 256 x u16, context-major | 32768 or 65536 |
//! | .. | LZP: slot count u32, then (value, valid) per slot | optional |
//! | end | CRC32 of all preceding bytes | 4 |
//!
//! The loader checks, in order: minimum size, magic, version, context count,
//! exact size, checksum. Field contents are only trusted after all of those
//! pass.

use super::{
    check_model_id, Dictionary, ModelSet, DICT_FLAGS_KNOWN, DICT_FLAG_LZP, FORMAT_VERSION,
    MIN_FORMAT_VERSION,
};
use crate::bigram::{BigramClassMap, BIGRAM_CLASSES, LEGACY_BIGRAM_CLASSES};
use crate::context::NUM_CONTEXTS;
use crate::error::{try_vec, PktzError, Result};
use crate::freq::{FrequencyTable, NUM_SYMBOLS};
use crate::lzp::{LzpEntry, LzpTable, LZP_TABLE_SIZE};
use crate::simd::Kernels;

/// `"PKTZ"` read as a little-endian u32.
pub const BLOB_MAGIC: u32 = u32::from_le_bytes(*b"PKTZ");

pub const HEADER_SIZE: usize = 8;
pub const CLASS_MAP_SIZE: usize = NUM_SYMBOLS;
pub const CHECKSUM_SIZE: usize = 4;
const TABLE_BYTES: usize = NUM_SYMBOLS * 2;
const LZP_COUNT_SIZE: usize = 4;
const LZP_ENTRY_SIZE: usize = 2;

/// Smallest blob any supported version can produce: a legacy blob without LZP.
pub const MIN_BLOB_SIZE: usize = BlobLayout::Legacy { version: 4 }.base_size() + CHECKSUM_SIZE;

/// Version-dependent shape of a blob.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlobLayout {
    /// Versions 3 and 4: fixed `prev >> 6` class map, 4 classes.
    Legacy { version: u8 },
    /// Version 5: stored class map, 8 classes.
    Current,
}

impl BlobLayout {
    pub fn for_version(version: u8) -> Result<Self> {
        match version {
            FORMAT_VERSION => Ok(BlobLayout::Current),
            v if (MIN_FORMAT_VERSION..FORMAT_VERSION).contains(&v) => {
                Ok(BlobLayout::Legacy { version: v })
            }
            v => Err(PktzError::UnsupportedVersion(v)),
        }
    }

    pub const fn version(self) -> u8 {
        match self {
            BlobLayout::Legacy { version } => version,
            BlobLayout::Current => FORMAT_VERSION,
        }
    }

    pub const fn bigram_classes(self) -> usize {
        match self {
            BlobLayout::Legacy { .. } => LEGACY_BIGRAM_CLASSES,
            BlobLayout::Current => BIGRAM_CLASSES,
        }
    }

    pub const fn class_map_size(self) -> usize {
        match self {
            BlobLayout::Legacy { .. } => 0,
            BlobLayout::Current => CLASS_MAP_SIZE,
        }
    }

    const fn unigram_offset(self) -> usize {
        HEADER_SIZE + self.class_map_size()
    }

    const fn bigram_offset(self) -> usize {
        self.unigram_offset() + NUM_CONTEXTS * TABLE_BYTES
    }

    /// Bytes before the optional LZP section.
    pub const fn base_size(self) -> usize {
        self.bigram_offset() + NUM_CONTEXTS * self.bigram_classes() * TABLE_BYTES
    }
}

/// Total blob size for `version` and header `flags`, with the LZP section at
/// its standard slot count.
pub fn blob_size(version: u8, flags: u8) -> Result<usize> {
    let layout = BlobLayout::for_version(version)?;
    Ok(sized(layout, flags, LZP_TABLE_SIZE))
}

fn sized(layout: BlobLayout, flags: u8, lzp_slots: usize) -> usize {
    let lzp = if flags & DICT_FLAG_LZP != 0 {
        LZP_COUNT_SIZE + lzp_slots * LZP_ENTRY_SIZE
    } else {
        0
    };
    layout.base_size() + lzp + CHECKSUM_SIZE
}

/// Little-endian cursor over a blob whose size is already validated.
struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(data: &'a [u8], pos: usize) -> Self {
        Self { data, pos }
    }

    fn bytes(&mut self, n: usize) -> &'a [u8] {
        let out = &self.data[self.pos..self.pos + n];
        self.pos += n;
        out
    }

    fn u8(&mut self) -> u8 {
        self.bytes(1)[0]
    }

    fn u32(&mut self) -> u32 {
        let b = self.bytes(4);
        u32::from_le_bytes([b[0], b[1], b[2], b[3]])
    }

    fn freq_table(&mut self) -> Result<FrequencyTable> {
        let raw = self.bytes(TABLE_BYTES);
        let mut freq = [0u16; NUM_SYMBOLS];
        for (f, pair) in freq.iter_mut().zip(raw.chunks_exact(2)) {
            *f = u16::from_le_bytes([pair[0], pair[1]]);
        }
        FrequencyTable::from_entries(freq)
    }
}

fn push_freq(out: &mut Vec<u8>, table: &FrequencyTable) {
    for &f in table.as_array() {
        out.extend_from_slice(&f.to_le_bytes());
    }
}

/// Serialize `dict` in `layout`.
pub(crate) fn encode(dict: &Dictionary, layout: BlobLayout) -> Result<Vec<u8>> {
    let classes = dict.num_classes();
    if let BlobLayout::Legacy { version } = layout {
        if classes != LEGACY_BIGRAM_CLASSES || !dict.class_map().is_legacy() {
            return Err(PktzError::IncompatibleLayout { version, classes });
        }
    }
    let target_classes = layout.bigram_classes();
    debug_assert!(classes <= target_classes);

    let flags = dict.flags();
    let size = sized(layout, flags, LZP_TABLE_SIZE);
    let mut out = Vec::new();
    out.try_reserve_exact(size)?;

    out.extend_from_slice(&BLOB_MAGIC.to_le_bytes());
    out.push(layout.version());
    out.push(dict.model_id());
    out.push(NUM_CONTEXTS as u8);
    out.push(flags);

    if layout == BlobLayout::Current {
        out.extend_from_slice(dict.class_map().as_bytes());
    }
    for ctx in 0..NUM_CONTEXTS {
        push_freq(&mut out, dict.unigram_freq(ctx));
    }
    // Classes a legacy dictionary never had are padded with uniform tables.
    let uniform = FrequencyTable::uniform();
    for ctx in 0..NUM_CONTEXTS {
        for class in 0..target_classes {
            let table = if class < classes {
                dict.bigram_freq(ctx, class)
            } else {
                &uniform
            };
            push_freq(&mut out, table);
        }
    }

    if let Some(lzp) = dict.lzp() {
        out.extend_from_slice(&(LZP_TABLE_SIZE as u32).to_le_bytes());
        for entry in lzp.entries() {
            let value = if entry.valid { entry.value } else { 0 };
            out.push(value);
            out.push(u8::from(entry.valid));
        }
    }

    let crc = checksum(&out);
    out.extend_from_slice(&crc.to_le_bytes());
    debug_assert_eq!(out.len(), size);
    Ok(out)
}

/// CRC32 of a blob body on the best kernel level.
fn checksum(body: &[u8]) -> u32 {
    Kernels::detect().crc32_update(0, body)
}

/// Parse and validate a blob.
pub(crate) fn decode(data: &[u8]) -> Result<Dictionary> {
    let result = decode_inner(data);
    if let Err(e) = &result {
        tracing::warn!(len = data.len(), error = %e, "rejected dictionary blob");
    }
    result
}

fn decode_inner(data: &[u8]) -> Result<Dictionary> {
    if data.len() < MIN_BLOB_SIZE {
        return Err(PktzError::BlobTooShort {
            len: data.len(),
            min: MIN_BLOB_SIZE,
        });
    }
    let mut header = Reader::new(data, 0);
    let magic = header.u32();
    if magic != BLOB_MAGIC {
        return Err(PktzError::BadMagic(magic));
    }
    let layout = BlobLayout::for_version(header.u8())?;
    let model_id = header.u8();
    let ctx_count = header.u8();
    if usize::from(ctx_count) != NUM_CONTEXTS {
        return Err(PktzError::ContextCountMismatch {
            found: ctx_count,
            expected: NUM_CONTEXTS as u8,
        });
    }
    let flags = header.u8();

    let base = layout.base_size();
    let has_lzp = flags & DICT_FLAG_LZP != 0;
    let lzp_slots = if has_lzp {
        if data.len() < base + LZP_COUNT_SIZE + CHECKSUM_SIZE {
            return Err(PktzError::BlobSizeMismatch {
                declared: sized(layout, flags, LZP_TABLE_SIZE),
                actual: data.len(),
            });
        }
        Reader::new(data, base).u32() as usize
    } else {
        0
    };
    let declared = if has_lzp {
        lzp_slots
            .checked_mul(LZP_ENTRY_SIZE)
            .and_then(|n| n.checked_add(base + LZP_COUNT_SIZE + CHECKSUM_SIZE))
            .unwrap_or(usize::MAX)
    } else {
        base + CHECKSUM_SIZE
    };
    if declared != data.len() {
        return Err(PktzError::BlobSizeMismatch {
            declared,
            actual: data.len(),
        });
    }

    let (body, trailer) = data.split_at(data.len() - CHECKSUM_SIZE);
    let stored = u32::from_le_bytes([trailer[0], trailer[1], trailer[2], trailer[3]]);
    let computed = checksum(body);
    if stored != computed {
        return Err(PktzError::ChecksumMismatch { stored, computed });
    }

    if check_model_id(model_id).is_err() {
        return Err(PktzError::MalformedBlob("reserved model id"));
    }
    if flags & !DICT_FLAGS_KNOWN != 0 {
        return Err(PktzError::MalformedBlob("unknown dictionary flags"));
    }

    let mut reader = Reader::new(data, HEADER_SIZE);
    let class_map = match layout {
        BlobLayout::Legacy { .. } => BigramClassMap::legacy(),
        BlobLayout::Current => {
            let mut map = [0u8; NUM_SYMBOLS];
            map.copy_from_slice(reader.bytes(CLASS_MAP_SIZE));
            BigramClassMap::from_bytes(map, BIGRAM_CLASSES)?
        }
    };

    let mut unigram_freq = Vec::new();
    unigram_freq.try_reserve_exact(NUM_CONTEXTS)?;
    for _ in 0..NUM_CONTEXTS {
        unigram_freq.push(reader.freq_table()?);
    }
    let bigram_count = NUM_CONTEXTS * layout.bigram_classes();
    let mut bigram_freq = Vec::new();
    bigram_freq.try_reserve_exact(bigram_count)?;
    for _ in 0..bigram_count {
        bigram_freq.push(reader.freq_table()?);
    }

    let lzp = if has_lzp {
        if lzp_slots != LZP_TABLE_SIZE {
            return Err(PktzError::MalformedBlob("unsupported LZP table size"));
        }
        reader.u32();
        let raw = reader.bytes(lzp_slots * LZP_ENTRY_SIZE);
        let mut entries: Vec<LzpEntry> = try_vec(lzp_slots)?;
        for (entry, pair) in entries.iter_mut().zip(raw.chunks_exact(LZP_ENTRY_SIZE)) {
            let valid = match pair[1] {
                0 => false,
                1 => true,
                _ => return Err(PktzError::MalformedBlob("LZP valid flag not 0 or 1")),
            };
            *entry = LzpEntry {
                value: pair[0],
                valid,
            };
        }
        Some(LzpTable::from_entries(entries)?)
    } else {
        None
    };

    let models = ModelSet::build(class_map, unigram_freq, bigram_freq)?;
    Ok(Dictionary::from_parts(
        model_id,
        layout.version(),
        models,
        lzp,
        stored,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_sizes() {
        assert_eq!(BlobLayout::Current.base_size(), 8 + 256 + 8192 + 65536);
        assert_eq!(BlobLayout::Legacy { version: 4 }.base_size(), 40968);
        assert_eq!(MIN_BLOB_SIZE, 40972);
        assert_eq!(blob_size(5, 0).unwrap(), 73992 + 4);
        assert_eq!(blob_size(5, DICT_FLAG_LZP).unwrap(), 73992 + 4 + 262144 + 4);
        assert_eq!(blob_size(3, 0).unwrap(), blob_size(4, 0).unwrap());
        assert_eq!(blob_size(6, 0), Err(PktzError::UnsupportedVersion(6)));
    }

    #[test]
    fn test_layout_offsets() {
        assert_eq!(BlobLayout::Current.unigram_offset(), 264);
        assert_eq!(BlobLayout::Current.bigram_offset(), 8456);
        assert_eq!(BlobLayout::Legacy { version: 3 }.unigram_offset(), 8);
    }

    #[test]
    fn test_magic() {
        assert_eq!(BLOB_MAGIC, 0x5A54_4B50);
    }

    #[test]
    fn test_for_version() {
        assert_eq!(BlobLayout::for_version(5).unwrap(), BlobLayout::Current);
        assert_eq!(
            BlobLayout::for_version(3).unwrap(),
            BlobLayout::Legacy { version: 3 }
        );
        assert!(BlobLayout::for_version(2).is_err());
        assert!(BlobLayout::for_version(0).is_err());
    }
}
