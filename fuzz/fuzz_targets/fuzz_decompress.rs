#![no_main]
use std::sync::{Arc, OnceLock};

use libfuzzer_sys::fuzz_target;
use pktz::{Compressor, Config, Dictionary, MAX_PACKET_SIZE};

fn dictionary() -> Arc<Dictionary> {
    static DICT: OnceLock<Arc<Dictionary>> = OnceLock::new();
    DICT.get_or_init(|| {
        let packets: Vec<Vec<u8>> = (0..16u8)
            .map(|i| (0..300u32).map(|j| if j < 4 { i } else { (j % 37) as u8 }).collect())
            .collect();
        let refs: Vec<&[u8]> = packets.iter().map(Vec::as_slice).collect();
        Arc::new(Dictionary::train(&refs, 1).expect("training failed"))
    })
    .clone()
}

fuzz_target!(|data: &[u8]| {
    let mut out = vec![0u8; MAX_PACKET_SIZE];

    // First frame primes a stateful context; the rest decode against it.
    let mut stateful = Compressor::new(dictionary(), Config::default()).expect("context");
    for frame in data.split(|&b| b == 0xFF) {
        let _ = stateful.decompress(frame, &mut out);
    }

    let mut stateless = Compressor::new(dictionary(), Config::stateless()).expect("context");
    let _ = stateless.decompress(data, &mut out);
});
