#![no_main]
use std::sync::Arc;

use libfuzzer_sys::fuzz_target;
use pktz::{Compressor, Config, Dictionary};

fuzz_target!(|data: &[u8]| {
    if data.len() < 2 || data.len() > 4096 {
        return;
    }
    // Split the input into packets at every 0x00 byte.
    let packets: Vec<&[u8]> = data.split(|&b| b == 0).filter(|p| !p.is_empty()).collect();
    let dict = Dictionary::train(&packets, 1).expect("training accepts any packets");
    let blob = dict.save().expect("save");
    let dict = Arc::new(Dictionary::load(&blob).expect("saved blob must load"));

    let mut enc = Compressor::new(dict.clone(), Config::default()).expect("context");
    let mut dec = Compressor::new(dict, Config::default()).expect("context");
    let mut frame = vec![0u8; 8192];
    let mut out = vec![0u8; 8192];
    for packet in &packets {
        let n = enc.compress(packet, &mut frame).expect("compress");
        if n > 0 {
            let m = dec.decompress(&frame[..n], &mut out).expect("decompress");
            assert_eq!(&out[..m], *packet);
        }
    }
});
