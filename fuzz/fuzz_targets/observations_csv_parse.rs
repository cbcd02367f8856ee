//! Fuzz target for observations CSV parsing.
//!
//! This fuzzer feeds arbitrary byte sequences to the observations parser,
//! checking for panics, crashes, or hangs.

#![no_main]

use chamberlab::dataset::Observations;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if data.len() > 10 * 1024 * 1024 {
        return;
    }

    let _ = Observations::from_csv_slice(data);
});
