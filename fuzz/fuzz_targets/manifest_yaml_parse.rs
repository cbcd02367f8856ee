//! Fuzz target for dataset manifest parsing.
//!
//! This fuzzer feeds arbitrary UTF-8 strings to the manifest parser,
//! checking for panics, crashes, or hangs.

#![no_main]

use std::path::Path;

use chamberlab::dataset::Manifest;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if data.len() > 1024 * 1024 {
        return;
    }

    if let Ok(yaml) = std::str::from_utf8(data) {
        let _ = Manifest::from_yaml_str(yaml, Path::new("manifest.yaml"));
    }
});
