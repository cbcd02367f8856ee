#![allow(dead_code)]

use chamberlab::retrieval::ChecksumAlgorithm;
use proptest::prelude::*;
use proptest::test_runner::{Config as ProptestConfig, FileFailurePersistence};

pub fn proptest_config() -> ProptestConfig {
    let cases = std::env::var("PROPTEST_CASES")
        .ok()
        .and_then(|v| v.parse::<u32>().ok())
        .unwrap_or(64);

    let mut config = ProptestConfig::with_failure_persistence(FileFailurePersistence::WithSource(
        "proptest-regressions",
    ));
    config.cases = cases;
    config.max_shrink_iters = 1024;
    config
}

pub fn arb_algorithm() -> impl Strategy<Value = ChecksumAlgorithm> {
    prop_oneof![Just(ChecksumAlgorithm::Md5), Just(ChecksumAlgorithm::Sha256)]
}

/// Non-empty payload plus a byte index inside it.
pub fn arb_payload_and_index(max_len: usize) -> impl Strategy<Value = (Vec<u8>, usize)> {
    prop::collection::vec(any::<u8>(), 1..max_len).prop_flat_map(|payload| {
        let len = payload.len();
        (Just(payload), 0..len)
    })
}

/// Rows of integers, all with the same number of columns.
pub fn arb_numeric_table(
    max_rows: usize,
    max_cols: usize,
) -> impl Strategy<Value = Vec<Vec<i64>>> {
    (1..=max_cols).prop_flat_map(move |cols| {
        prop::collection::vec(
            prop::collection::vec(-1_000_000i64..1_000_000, cols),
            0..max_rows,
        )
    })
}
