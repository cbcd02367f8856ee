//! Dataset retrieval pipeline.
//!
//! Turns a [`RemoteArchiveDescriptor`] into an opened [`Dataset`] under a
//! caller-chosen root directory:
//!
//! 1. cache check (`<root>/<dataset_id>/` with a loadable manifest)
//! 2. download to `<root>/causal_chamber_<md5(url)>.zip`
//! 3. checksum verification (when a checksum is given)
//! 4. extraction into a hidden staging directory
//! 5. manifest validation, then an atomic rename into `<root>/<dataset_id>/`
//!
//! The stages always run in this order. A failure at any stage removes the
//! archive and the staging directory, so the root never holds a
//! half-populated dataset.
//!
//! Two concurrent retrievals into the same `<root>/<dataset_id>/` are not
//! coordinated; callers must serialize them.

pub mod checksum;
pub mod extract;
pub mod fetch;

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

pub use checksum::{compute_digest, digest_bytes, verify_file, ChecksumAlgorithm};
pub use extract::{extract_archive, ExtractSummary};
pub use fetch::{
    fetch_to_path, ArchiveSource, AutoSource, CancelToken, FileSource, HttpSource, LogProgress,
    NoProgress, ProgressSink, RemoteBody,
};

use crate::dataset::{find_manifest, Dataset};
use crate::error::LabError;

/// Where to download an archive from and how to check it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteArchiveDescriptor {
    pub download_url: String,
    /// Expected digest. `None` skips verification.
    pub checksum: Option<String>,
    #[serde(default)]
    pub algorithm: ChecksumAlgorithm,
}

impl RemoteArchiveDescriptor {
    /// A descriptor without checksum verification.
    pub fn new(download_url: impl Into<String>) -> Self {
        Self {
            download_url: download_url.into(),
            checksum: None,
            algorithm: ChecksumAlgorithm::default(),
        }
    }

    pub fn with_checksum(mut self, checksum: impl Into<String>, algorithm: ChecksumAlgorithm) -> Self {
        self.checksum = Some(checksum.into());
        self.algorithm = algorithm;
        self
    }
}

/// What to do when the dataset directory already exists.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CachePolicy {
    /// Reuse a directory whose manifest loads; no network access.
    #[default]
    ReuseExisting,
    /// Always download and replace the directory.
    ForceRefresh,
}

/// Per-call knobs for [`Retriever::retrieve`].
#[derive(Default)]
pub struct RetrievalOptions {
    pub cache_policy: CachePolicy,
    pub cancel: CancelToken,
    /// Keep the downloaded zip next to the dataset directory.
    pub keep_archive: bool,
    pub progress: Option<Box<dyn ProgressSink>>,
}

impl RetrievalOptions {
    pub fn force_refresh(mut self) -> Self {
        self.cache_policy = CachePolicy::ForceRefresh;
        self
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_progress(mut self, progress: impl ProgressSink + 'static) -> Self {
        self.progress = Some(Box::new(progress));
        self
    }

    pub fn keep_archive(mut self, keep: bool) -> Self {
        self.keep_archive = keep;
        self
    }
}

/// Runs the retrieval pipeline against an [`ArchiveSource`].
#[derive(Clone, Default)]
pub struct Retriever<S = AutoSource> {
    source: S,
}

impl Retriever<AutoSource> {
    pub fn new() -> Self {
        Self::default()
    }
}

impl<S: ArchiveSource> Retriever<S> {
    pub fn with_source(source: S) -> Self {
        Self { source }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    /// Make the dataset `dataset_id` available under `root` and open it.
    pub fn retrieve(
        &self,
        descriptor: &RemoteArchiveDescriptor,
        root: &Path,
        dataset_id: &str,
        options: RetrievalOptions,
    ) -> Result<Dataset, LabError> {
        if !root.is_dir() {
            return Err(LabError::MissingResource {
                what: "root directory",
                path: root.to_path_buf(),
            });
        }
        validate_dataset_id(dataset_id)?;

        let dataset_dir = root.join(dataset_id);
        if dataset_dir.exists() && !dataset_dir.is_dir() {
            return Err(LabError::DatasetPathOccupied { path: dataset_dir });
        }
        if options.cache_policy == CachePolicy::ReuseExisting && dataset_dir.is_dir() {
            match Dataset::open(&dataset_dir) {
                Ok(dataset) => {
                    log::info!("using cached dataset at \"{}\"", dataset_dir.display());
                    return Ok(dataset);
                }
                Err(err) => log::warn!(
                    "cached dataset at \"{}\" is unusable ({err}); downloading again",
                    dataset_dir.display()
                ),
            }
        }

        let archive_path = root.join(archive_file_name(&descriptor.download_url));
        let staging_dir = root.join(format!(".{dataset_id}.staging"));
        let keep_archive = options.keep_archive;

        let result = self.download_into(
            descriptor,
            &archive_path,
            &staging_dir,
            &dataset_dir,
            options,
        );

        remove_dir_if_present(&staging_dir);
        if result.is_err() || !keep_archive {
            remove_file_if_present(&archive_path);
        }
        result
    }

    fn download_into(
        &self,
        descriptor: &RemoteArchiveDescriptor,
        archive_path: &Path,
        staging_dir: &Path,
        dataset_dir: &Path,
        options: RetrievalOptions,
    ) -> Result<Dataset, LabError> {
        let RetrievalOptions {
            cancel, progress, ..
        } = options;
        let mut progress = progress.unwrap_or_else(|| Box::new(NoProgress));

        fetch_to_path(
            &self.source,
            &descriptor.download_url,
            archive_path,
            progress.as_mut(),
            &cancel,
        )?;

        if descriptor.checksum.is_some() {
            log::info!("verifying {} checksum", descriptor.algorithm);
        }
        verify_file(
            archive_path,
            descriptor.algorithm,
            descriptor.checksum.as_deref(),
        )?;

        remove_dir_if_present(staging_dir);
        log::info!("extracting zip-file contents to \"{}\"", dataset_dir.display());
        extract_archive(archive_path, staging_dir)?;

        let content_root = locate_content_root(staging_dir)?;
        Dataset::open(&content_root)?;

        if dataset_dir.exists() {
            fs::remove_dir_all(dataset_dir)?;
        }
        fs::rename(&content_root, dataset_dir)?;

        Dataset::open(dataset_dir)
    }
}

/// Retrieve with the default [`AutoSource`].
pub fn retrieve(
    descriptor: &RemoteArchiveDescriptor,
    root: &Path,
    dataset_id: &str,
    options: RetrievalOptions,
) -> Result<Dataset, LabError> {
    Retriever::new().retrieve(descriptor, root, dataset_id, options)
}

/// Local file name for the archive downloaded from `url`.
pub fn archive_file_name(url: &str) -> String {
    format!(
        "causal_chamber_{}.zip",
        digest_bytes(url.as_bytes(), ChecksumAlgorithm::Md5)
    )
}

fn validate_dataset_id(dataset_id: &str) -> Result<(), LabError> {
    let invalid = dataset_id.is_empty()
        || dataset_id == "."
        || dataset_id == ".."
        || dataset_id.starts_with('.')
        || dataset_id.contains(['/', '\\']);
    if invalid {
        return Err(LabError::InvalidDatasetId(dataset_id.to_string()));
    }
    Ok(())
}

/// The directory holding the manifest: the staging directory itself, or its
/// single top-level subdirectory when the archive wraps everything in one.
fn locate_content_root(staging_dir: &Path) -> Result<PathBuf, LabError> {
    if find_manifest(staging_dir).is_some() {
        return Ok(staging_dir.to_path_buf());
    }

    let mut subdirs = Vec::new();
    for entry in fs::read_dir(staging_dir)? {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            subdirs.push(entry.path());
        }
    }

    match subdirs.as_slice() {
        [only] if find_manifest(only).is_some() => Ok(only.clone()),
        _ => Err(LabError::MissingResource {
            what: "manifest",
            path: staging_dir.join(crate::dataset::MANIFEST_FILE_NAME),
        }),
    }
}

fn remove_dir_if_present(path: &Path) {
    if let Err(err) = fs::remove_dir_all(path) {
        if err.kind() != std::io::ErrorKind::NotFound {
            log::warn!("could not remove {}: {err}", path.display());
        }
    }
}

fn remove_file_if_present(path: &Path) {
    if let Err(err) = fs::remove_file(path) {
        if err.kind() != std::io::ErrorKind::NotFound {
            log::warn!("could not remove {}: {err}", path.display());
        }
    }
}
