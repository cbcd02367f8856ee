use std::path::PathBuf;
use thiserror::Error;

/// The main error type for chamberlab operations.
///
/// Each failure mode of the retrieval pipeline has its own variant so callers
/// can branch on recoverability instead of matching on messages.
#[derive(Debug, Error)]
pub enum LabError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Transport error while fetching {url}: {message}")]
    Transport { url: String, message: String },

    #[error("Corrupted download from {url}: expected {expected} bytes, received {actual}")]
    CorruptedDownload {
        url: String,
        expected: u64,
        actual: u64,
    },

    #[error("Download from {url} was cancelled")]
    Cancelled { url: String },

    #[error("Checksum does not match!\n  expected: \"{expected}\"\n  computed: \"{computed}\"")]
    Integrity { expected: String, computed: String },

    #[error("Corrupt archive {path}: {message}")]
    CorruptArchive { path: PathBuf, message: String },

    #[error("Missing {what}: {path}")]
    MissingResource { what: &'static str, path: PathBuf },

    #[error("Invalid manifest {path}: {message}")]
    ManifestInvalid { path: PathBuf, message: String },

    #[error("Failed to parse observations from {path}: {source}")]
    ObservationsParse {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("Failed to read image {path}: {message}")]
    ImageRead { path: PathBuf, message: String },

    #[error("Invalid image entry '{value}' in {path}: must be a path inside the image directory")]
    InvalidImageEntry { path: PathBuf, value: String },

    #[error("Dataset path {path} exists and is not a directory")]
    DatasetPathOccupied { path: PathBuf },

    #[error("{operation} is not implemented for non-image datasets")]
    NotSupported { operation: &'static str },

    #[error("Experiment {experiment_id} has status {status}; data can only be downloaded once it is DONE")]
    ExperimentNotReady {
        experiment_id: String,
        status: String,
    },

    #[error("Experiment {experiment_id} did not finish within {waited_secs}s (last status: {status})")]
    PollTimeout {
        experiment_id: String,
        status: String,
        waited_secs: u64,
    },

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Credentials error: {0}")]
    Credentials(String),

    #[error("Invalid dataset identifier '{0}': must be a single non-empty path component")]
    InvalidDatasetId(String),

    #[error("Invalid API endpoint '{endpoint}': {message}")]
    InvalidEndpoint { endpoint: String, message: String },

    #[error("Invalid instruction: {0}")]
    InvalidInstruction(String),

    #[error("Unsupported checksum algorithm '{0}' (supported: md5, sha256)")]
    UnsupportedAlgorithm(String),

    #[error("Malformed JSON response from {context}: {message}")]
    Json { context: String, message: String },
}

impl LabError {
    /// Whether a caller may reasonably retry the failed operation as-is.
    ///
    /// The pipeline itself never retries; this only informs caller policy.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            LabError::Transport { .. } | LabError::CorruptedDownload { .. }
        ) || matches!(self, LabError::Api { status, .. } if *status >= 500)
    }

    /// Errors caused by the request itself (bad credentials, unknown chamber,
    /// invalid instruction parameters).
    pub fn is_user_error(&self) -> bool {
        match self {
            LabError::Api { status, .. } => (400..500).contains(status),
            LabError::Credentials(_)
            | LabError::InvalidInstruction(_)
            | LabError::UnsupportedAlgorithm(_)
            | LabError::ExperimentNotReady { .. }
            | LabError::NotSupported { .. } => true,
            _ => false,
        }
    }
}
