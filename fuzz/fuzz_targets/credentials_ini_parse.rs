//! Fuzz target for credentials file parsing.

#![no_main]

use chamberlab::api::credentials::fuzz_parse_credentials;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if data.len() > 1024 * 1024 {
        return;
    }

    if let Ok(contents) = std::str::from_utf8(data) {
        let _ = fuzz_parse_credentials(contents);
    }
});
