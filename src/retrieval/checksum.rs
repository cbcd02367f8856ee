//! File digests for archive integrity checks.
//!
//! Digests are computed by streaming the file through the hasher, so large
//! archives are never loaded into memory. Output is always lowercase hex.

use std::fmt;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;
use std::str::FromStr;

use md5::Md5;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::LabError;

const READ_BUFFER_SIZE: usize = 64 * 1024;

/// Hash algorithm used for an archive checksum.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChecksumAlgorithm {
    #[default]
    Md5,
    Sha256,
}

impl ChecksumAlgorithm {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChecksumAlgorithm::Md5 => "md5",
            ChecksumAlgorithm::Sha256 => "sha256",
        }
    }
}

impl fmt::Display for ChecksumAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChecksumAlgorithm {
    type Err = LabError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "md5" => Ok(ChecksumAlgorithm::Md5),
            "sha256" | "sha-256" => Ok(ChecksumAlgorithm::Sha256),
            other => Err(LabError::UnsupportedAlgorithm(other.to_string())),
        }
    }
}

/// Compute the digest of the file at `path` as lowercase hex.
pub fn compute_digest(path: &Path, algorithm: ChecksumAlgorithm) -> Result<String, LabError> {
    let file = File::open(path).map_err(|source| missing_or_io(path, source))?;
    let reader = BufReader::new(file);

    match algorithm {
        ChecksumAlgorithm::Md5 => hash_reader::<Md5, _>(reader),
        ChecksumAlgorithm::Sha256 => hash_reader::<Sha256, _>(reader),
    }
}

/// Compute the digest of an in-memory buffer as lowercase hex.
pub fn digest_bytes(bytes: &[u8], algorithm: ChecksumAlgorithm) -> String {
    match algorithm {
        ChecksumAlgorithm::Md5 => format!("{:x}", Md5::digest(bytes)),
        ChecksumAlgorithm::Sha256 => format!("{:x}", Sha256::digest(bytes)),
    }
}

/// Verify the file at `path` against `expected`.
///
/// Returns `Ok(None)` without reading the file when `expected` is `None`.
/// Otherwise returns the computed digest, or [`LabError::Integrity`] when it
/// differs from `expected`. Hex comparison ignores ASCII case.
pub fn verify_file(
    path: &Path,
    algorithm: ChecksumAlgorithm,
    expected: Option<&str>,
) -> Result<Option<String>, LabError> {
    let Some(expected) = expected else {
        log::debug!("no checksum supplied for {}, skipping verification", path.display());
        return Ok(None);
    };

    let computed = compute_digest(path, algorithm)?;
    if !computed.eq_ignore_ascii_case(expected.trim()) {
        return Err(LabError::Integrity {
            expected: expected.to_string(),
            computed,
        });
    }

    log::debug!("{} checksum verified for {}", algorithm, path.display());
    Ok(Some(computed))
}

fn hash_reader<D: Digest, R: Read>(mut reader: R) -> Result<String, LabError> {
    let mut hasher = D::new();
    let mut buffer = vec![0u8; READ_BUFFER_SIZE];

    loop {
        let n = reader.read(&mut buffer)?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }

    Ok(hasher
        .finalize()
        .iter()
        .map(|byte| format!("{byte:02x}"))
        .collect())
}

fn missing_or_io(path: &Path, source: std::io::Error) -> LabError {
    if source.kind() == std::io::ErrorKind::NotFound {
        LabError::MissingResource {
            what: "file",
            path: path.to_path_buf(),
        }
    } else {
        LabError::Io(source)
    }
}
