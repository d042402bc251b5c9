#![no_main]
use libfuzzer_sys::fuzz_target;
use pktz::{Dictionary, MIN_BLOB_SIZE};

fuzz_target!(|data: &[u8]| {
    let _ = Dictionary::load(data);

    // Pad short inputs so the header checks past the size gate get exercised.
    if data.len() < MIN_BLOB_SIZE {
        let mut padded = data.to_vec();
        padded.resize(MIN_BLOB_SIZE, 0);
        let _ = Dictionary::load(&padded);
    }
});
