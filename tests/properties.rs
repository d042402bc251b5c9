//! Property-based tests for the codec building blocks.
//!
//! - Frequency normalization always yields a valid table
//! - Delta kernels invert and agree across SIMD levels
//! - CRC32 updates chain
//! - Compressed packets decode to their input
//!
//! Run with: cargo test --test properties

use std::sync::{Arc, OnceLock};

use proptest::prelude::*;

use pktz::crc32::{crc32, crc32_update, crc32_update_slice8};
use pktz::freq::{FrequencyTable, NUM_SYMBOLS, TABLE_SIZE};
use pktz::simd::capabilities;
use pktz::{
    Compressor, Config, Dictionary, EntropyModel, Kernels, SimdLevel, TrainOptions, MAX_PACKET_SIZE,
};

fn train(lzp: bool) -> Arc<Dictionary> {
    let packets: Vec<Vec<u8>> = (0..32u32)
        .map(|i| {
            (0..200u32)
                .map(|j| if j < 6 { (i * 3 + j) as u8 } else { (j % 50) as u8 })
                .collect()
        })
        .collect();
    let refs: Vec<&[u8]> = packets.iter().map(Vec::as_slice).collect();
    let options = TrainOptions {
        lzp,
        ..TrainOptions::default()
    };
    Arc::new(Dictionary::train_with_options(&refs, 9, options).expect("training failed"))
}

/// Dictionary matching the config's LZP setting.
fn dictionary(lzp: bool) -> Arc<Dictionary> {
    static WITH_LZP: OnceLock<Arc<Dictionary>> = OnceLock::new();
    static PLAIN: OnceLock<Arc<Dictionary>> = OnceLock::new();
    let cell = if lzp { &WITH_LZP } else { &PLAIN };
    cell.get_or_init(|| train(lzp)).clone()
}

fn supported_levels() -> Vec<SimdLevel> {
    SimdLevel::ALL
        .into_iter()
        .filter(|&l| capabilities().supports(l))
        .collect()
}

/// Packets that look like the training corpus with random edits.
fn packet_strategy() -> impl Strategy<Value = Vec<u8>> {
    (
        1usize..400,
        prop::collection::vec((0usize..400, any::<u8>()), 0..20),
    )
        .prop_map(|(len, edits)| {
            let mut p: Vec<u8> = (0..len as u32).map(|j| (j % 50) as u8).collect();
            for (at, value) in edits {
                if at < len {
                    p[at] = value;
                }
            }
            p
        })
}

fn config_strategy() -> impl Strategy<Value = Config> {
    (any::<bool>(), any::<bool>(), any::<bool>(), any::<bool>()).prop_map(
        |(stateful, delta, lzp, bigram)| Config {
            stateful,
            delta,
            lzp,
            model: if bigram {
                EntropyModel::Bigram
            } else {
                EntropyModel::Unigram
            },
            ..Config::default()
        },
    )
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 64,
        max_shrink_iters: 200,
        ..ProptestConfig::default()
    })]

    /// Property: normalized tables sum to TABLE_SIZE with every entry >= 1.
    #[test]
    fn prop_normalize_valid(counts in prop::collection::vec(0u64..1_000_000_000_000, NUM_SYMBOLS)) {
        let mut arr = [0u64; NUM_SYMBOLS];
        arr.copy_from_slice(&counts);
        let total = counts.iter().sum();
        let table = FrequencyTable::normalize(&arr, total);
        prop_assert_eq!(table.sum(), TABLE_SIZE as u32);
        prop_assert!(table.as_array().iter().all(|&f| f >= 1));
    }

    /// Property: delta decode inverts delta encode at every level.
    #[test]
    fn prop_delta_roundtrip(
        cur in prop::collection::vec(any::<u8>(), 0..600),
        prev in prop::collection::vec(any::<u8>(), 0..600),
    ) {
        for level in supported_levels() {
            let k = Kernels::new(Some(level));
            let mut residual = vec![0u8; cur.len()];
            let mut back = vec![0u8; cur.len()];
            k.delta_encode(&cur, &prev, &mut residual);
            k.delta_decode(&residual, &prev, &mut back);
            prop_assert_eq!(&back, &cur, "level {}", level);
        }
    }

    /// Property: every level matches Generic, at any alignment.
    #[test]
    fn prop_delta_levels_agree(
        data in prop::collection::vec(any::<u8>(), 64..700),
        offset in 0usize..32,
        len in 0usize..32,
    ) {
        let generic = Kernels::new(Some(SimdLevel::Generic));
        let cur = &data[offset..];
        let prev = &data[..data.len() - len];
        let mut want = vec![0u8; cur.len()];
        generic.delta_encode(cur, prev, &mut want);
        let mut want_hist = [0u32; 256];
        generic.histogram(cur, &mut want_hist);
        for level in supported_levels() {
            let k = Kernels::new(Some(level));
            let mut got = vec![0u8; cur.len()];
            k.delta_encode(cur, prev, &mut got);
            prop_assert_eq!(&got, &want, "level {}", level);
            let mut hist = [0u32; 256];
            k.histogram(cur, &mut hist);
            prop_assert_eq!(hist, want_hist);
        }
    }

    /// Property: CRC32 over a split buffer equals CRC32 of the whole.
    #[test]
    fn prop_crc_chains(data in prop::collection::vec(any::<u8>(), 0..300), split in 0usize..300) {
        let split = split.min(data.len());
        let (a, b) = data.split_at(split);
        let whole = crc32(&data);
        prop_assert_eq!(crc32_update(crc32_update(0, a), b), whole);
        prop_assert_eq!(crc32_update_slice8(crc32_update_slice8(0, a), b), whole);
    }

    /// Property: a sequence of packets decodes exactly, for any configuration.
    #[test]
    fn prop_compress_roundtrip(
        config in config_strategy(),
        packets in prop::collection::vec(packet_strategy(), 1..6),
    ) {
        let dict = dictionary(config.lzp);
        let mut enc = Compressor::new(dict.clone(), config.clone()).unwrap();
        let mut dec = Compressor::new(dict, config).unwrap();
        let mut frame = vec![0u8; MAX_PACKET_SIZE];
        let mut out = vec![0u8; MAX_PACKET_SIZE];
        for packet in &packets {
            let n = enc.compress(packet, &mut frame).unwrap();
            prop_assert!(n < packet.len() || n == 0);
            if n > 0 {
                let m = dec.decompress(&frame[..n], &mut out).unwrap();
                prop_assert_eq!(&out[..m], packet.as_slice());
            }
        }
    }

    /// Property: decoding arbitrary bytes fails cleanly or yields a bounded packet.
    #[test]
    fn prop_decompress_garbage(frame in prop::collection::vec(any::<u8>(), 0..64)) {
        let mut dec = Compressor::new(dictionary(true), Config::stateless()).unwrap();
        let mut out = vec![0u8; MAX_PACKET_SIZE];
        if let Ok(n) = dec.decompress(&frame, &mut out) {
            prop_assert!(n <= MAX_PACKET_SIZE);
        }
    }
}
