//! Dictionary training and blob round-trip tests.

use super::*;
use crate::error::ErrorKind;
use crate::freq::TABLE_SIZE;
use crate::lzp::LZP_TABLE_SIZE;
use crate::simd::{Kernels, SimdLevel};

/// Header-like prefix that varies per packet, payload that repeats.
fn corpus() -> Vec<Vec<u8>> {
    (0..16u32)
        .map(|i| {
            let mut p = Vec::with_capacity(300);
            p.extend_from_slice(&[0x45, 0x00, (i >> 8) as u8, i as u8]);
            p.extend((0..296u32).map(|j| ((j * 13) % 97) as u8));
            p
        })
        .collect()
}

fn train(options: TrainOptions) -> Dictionary {
    let packets = corpus();
    let refs: Vec<&[u8]> = packets.iter().map(Vec::as_slice).collect();
    Dictionary::train_with_options(&refs, 42, options).unwrap()
}

fn set_crc(blob: &mut [u8]) {
    let body = blob.len() - 4;
    let crc = crate::crc32::crc32(&blob[..body]);
    blob[body..].copy_from_slice(&crc.to_le_bytes());
}

#[test]
fn test_save_load_roundtrip() {
    let dict = train(TrainOptions::default());
    assert_eq!(dict.model_id(), 42);
    assert_eq!(dict.version(), FORMAT_VERSION);
    assert!(dict.has_lzp());

    let blob = dict.save().unwrap();
    assert_eq!(blob.len(), blob_size(FORMAT_VERSION, DICT_FLAG_LZP).unwrap());
    assert_eq!(&blob[..4], b"PKTZ");

    let loaded = Dictionary::load(&blob).unwrap();
    assert_eq!(loaded, dict);
    assert_eq!(loaded.checksum(), dict.checksum());
    assert_eq!(loaded.save().unwrap(), blob);
}

#[test]
fn test_trained_tables_are_normalized() {
    let dict = train(TrainOptions::default());
    for ctx in 0..NUM_CONTEXTS {
        assert_eq!(dict.unigram_freq(ctx).sum(), TABLE_SIZE as u32);
        for class in 0..dict.num_classes() {
            let f = dict.bigram_freq(ctx, class);
            assert_eq!(f.sum(), TABLE_SIZE as u32);
            assert!(f.as_array().iter().all(|&x| x >= 1));
        }
    }
}

#[test]
fn test_training_is_deterministic() {
    let a = train(TrainOptions::default()).save().unwrap();
    let b = train(TrainOptions::default()).save().unwrap();
    assert_eq!(a, b);
}

#[test]
fn test_zero_packets() {
    let dict = Dictionary::train(&[], 1).unwrap();
    assert!(!dict.has_lzp());
    assert_eq!(dict.unigram_freq(0), &FrequencyTable::uniform());
    let blob = dict.save().unwrap();
    assert_eq!(blob.len(), blob_size(FORMAT_VERSION, 0).unwrap());
    assert_eq!(Dictionary::load(&blob).unwrap(), dict);
}

#[test]
fn test_model_id_validation() {
    let packets: [&[u8]; 1] = [b"payload"];
    for id in [0u8, 255] {
        let err = Dictionary::train(&packets, id).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }
    assert!(Dictionary::train(&packets, 254).is_ok());
}

#[test]
fn test_train_concatenated() {
    let packets = corpus();
    let data: Vec<u8> = packets.concat();
    let sizes: Vec<usize> = packets.iter().map(Vec::len).collect();
    let a = Dictionary::train_concatenated(&data, &sizes, 42).unwrap();
    assert_eq!(a, train(TrainOptions::default()));

    let err = Dictionary::train_concatenated(&data, &sizes[1..], 42).unwrap_err();
    assert!(matches!(err, PktzError::PacketSizeMismatch { .. }));
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);

    let overflow = [usize::MAX, 2];
    assert!(Dictionary::train_concatenated(&data, &overflow, 42).is_err());
}

#[test]
fn test_checksum_agrees_across_levels() {
    let blob = train(TrainOptions::default()).save().unwrap();
    let (body, trailer) = blob.split_at(blob.len() - 4);
    let stored = u32::from_le_bytes(trailer.try_into().unwrap());
    assert_eq!(stored, crate::crc32::crc32(body));
    for level in SimdLevel::ALL {
        let kernels = Kernels::new(Some(level));
        assert_eq!(kernels.crc32_update(0, body), stored, "{level}");
    }
}

#[test]
fn test_corrupted_byte_is_rejected() {
    let blob = train(TrainOptions::default()).save().unwrap();
    let step = blob.len() / 509;
    for offset in (0..blob.len()).step_by(step).chain([4, 5, 6, 7, blob.len() - 1]) {
        let mut bad = blob.clone();
        bad[offset] ^= 0x5A;
        let err = Dictionary::load(&bad).unwrap_err();
        if offset >= blob::HEADER_SIZE {
            assert_eq!(err.kind(), ErrorKind::DictionaryInvalid, "offset {offset}: {err}");
        }
    }
}

#[test]
fn test_distinct_structural_errors() {
    let blob = train(TrainOptions::default()).save().unwrap();

    let err = Dictionary::load(&blob[..MIN_BLOB_SIZE - 1]).unwrap_err();
    assert!(matches!(err, PktzError::BlobTooShort { .. }));

    let mut bad = blob.clone();
    bad[0] = b'X';
    assert!(matches!(Dictionary::load(&bad).unwrap_err(), PktzError::BadMagic(_)));

    let mut bad = blob.clone();
    bad[4] = 9;
    assert_eq!(Dictionary::load(&bad).unwrap_err(), PktzError::UnsupportedVersion(9));

    let mut bad = blob.clone();
    bad[6] = 8;
    let err = Dictionary::load(&bad).unwrap_err();
    assert_eq!(err, PktzError::ContextCountMismatch { found: 8, expected: 16 });
    assert_eq!(err.kind(), ErrorKind::VersionUnsupported);

    let err = Dictionary::load(&blob[..blob.len() - 1]).unwrap_err();
    assert!(matches!(err, PktzError::BlobSizeMismatch { .. }));

    let mut bad = blob.clone();
    let mid = bad.len() / 2;
    bad[mid] ^= 1;
    assert!(matches!(
        Dictionary::load(&bad).unwrap_err(),
        PktzError::ChecksumMismatch { .. }
    ));
}

#[test]
fn test_semantic_errors_after_checksum() {
    let blob = train(TrainOptions::default()).save().unwrap();

    let mut bad = blob.clone();
    bad[5] = 0;
    set_crc(&mut bad);
    assert_eq!(
        Dictionary::load(&bad).unwrap_err(),
        PktzError::MalformedBlob("reserved model id")
    );

    let mut bad = blob.clone();
    bad[7] |= 0x80;
    set_crc(&mut bad);
    assert!(matches!(Dictionary::load(&bad).unwrap_err(), PktzError::MalformedBlob(_)));

    let mut bad = blob.clone();
    bad[blob::HEADER_SIZE] = 8;
    set_crc(&mut bad);
    assert!(matches!(Dictionary::load(&bad).unwrap_err(), PktzError::MalformedBlob(_)));

    // First unigram entry bumped: the table no longer sums to 4096.
    let mut bad = blob.clone();
    bad[264] = bad[264].wrapping_add(1);
    set_crc(&mut bad);
    assert!(matches!(Dictionary::load(&bad).unwrap_err(), PktzError::MalformedBlob(_)));

    // First LZP valid byte set to 2.
    let mut bad = blob.clone();
    let lzp_start = BlobLayout::Current.base_size() + 4;
    bad[lzp_start + 1] = 2;
    set_crc(&mut bad);
    assert!(matches!(Dictionary::load(&bad).unwrap_err(), PktzError::MalformedBlob(_)));
}

#[test]
fn test_lzp_slot_count_checked() {
    // A blob claiming a smaller LZP table, consistently sized and checksummed.
    let dict = train(TrainOptions::default());
    let blob = dict.save().unwrap();
    let base = BlobLayout::Current.base_size();
    let slots = 16usize;
    let mut bad = blob[..base].to_vec();
    bad.extend_from_slice(&(slots as u32).to_le_bytes());
    bad.extend(std::iter::repeat(0u8).take(slots * 2));
    bad.extend_from_slice(&[0; 4]);
    set_crc(&mut bad);
    assert_eq!(
        Dictionary::load(&bad).unwrap_err(),
        PktzError::MalformedBlob("unsupported LZP table size")
    );
}

#[test]
fn test_invalid_lzp_slots_written_as_zero() {
    let dict = train(TrainOptions::default());
    let lzp = dict.lzp().unwrap();
    let blob = dict.save().unwrap();
    let start = BlobLayout::Current.base_size();
    assert_eq!(
        u32::from_le_bytes(blob[start..start + 4].try_into().unwrap()) as usize,
        LZP_TABLE_SIZE
    );
    for (slot, entry) in lzp.entries().iter().enumerate() {
        let at = start + 4 + slot * 2;
        assert_eq!(blob[at + 1], u8::from(entry.valid));
        if !entry.valid {
            assert_eq!(blob[at], 0);
        }
    }
}

#[test]
fn test_legacy_version_loads_with_fixed_classes() {
    let dict = train(TrainOptions {
        version: 4,
        lzp: true,
    });
    assert_eq!(dict.num_classes(), 4);
    let blob = dict.save().unwrap();
    assert_eq!(blob[4], 4);
    assert_eq!(blob.len(), blob_size(4, DICT_FLAG_LZP).unwrap());

    let loaded = Dictionary::load(&blob).unwrap();
    assert_eq!(loaded.version(), 4);
    for prev in 0..=255u8 {
        assert_eq!(loaded.class_map().class_of(prev), usize::from(prev >> 6));
    }
    assert_eq!(loaded, dict);
}

#[test]
fn test_legacy_without_lzp_is_minimum_size() {
    let dict = train(TrainOptions { version: 3, lzp: false });
    let blob = dict.save().unwrap();
    assert_eq!(blob.len(), MIN_BLOB_SIZE);
    assert_eq!(Dictionary::load(&blob).unwrap().version(), 3);
}

#[test]
fn test_save_as_conversions() {
    let legacy = train(TrainOptions {
        version: 4,
        lzp: true,
    });
    let upgraded = Dictionary::load(&legacy.save_as(5).unwrap()).unwrap();
    assert_eq!(upgraded.version(), 5);
    assert_eq!(upgraded.num_classes(), 8);
    for ctx in 0..NUM_CONTEXTS {
        for class in 0..4 {
            assert_eq!(upgraded.bigram_freq(ctx, class), legacy.bigram_freq(ctx, class));
        }
        assert_eq!(upgraded.bigram_freq(ctx, 7), &FrequencyTable::uniform());
    }

    let current = train(TrainOptions::default());
    let err = current.save_as(4).unwrap_err();
    assert_eq!(err, PktzError::IncompatibleLayout { version: 4, classes: 8 });
    assert_eq!(current.save_as(6).unwrap_err(), PktzError::UnsupportedVersion(6));
}

#[test]
fn test_without_lzp_option() {
    let dict = train(TrainOptions {
        lzp: false,
        ..TrainOptions::default()
    });
    assert!(!dict.has_lzp());
    assert_eq!(dict.flags(), 0);
    let blob = dict.save().unwrap();
    assert_eq!(blob[7], 0);
}
