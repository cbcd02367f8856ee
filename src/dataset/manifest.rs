//! Dataset manifest (`manifest.yaml`).
//!
//! ```yaml
//! observations_file: observations.csv   # required, relative to the dataset dir
//! image_directory: images               # optional; absent or null means no images
//! image_column: image_file              # optional; column naming each row's image
//! ```
//!
//! Unknown keys are ignored so newer manifests stay readable.

use std::fs;
use std::path::{Component, Path, PathBuf};

use serde::Deserialize;

use crate::error::LabError;

pub const MANIFEST_FILE_NAME: &str = "manifest.yaml";
const MANIFEST_FALLBACK_NAME: &str = "manifest.yml";
pub const DEFAULT_IMAGE_COLUMN: &str = "image_file";

/// Parsed manifest contents. Paths are relative to the dataset directory.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Manifest {
    pub observations_file: PathBuf,
    pub image_directory: Option<PathBuf>,
    pub image_column: String,
}

#[derive(Debug, Deserialize)]
struct RawManifest {
    observations_file: Option<String>,
    image_directory: Option<String>,
    image_column: Option<String>,
}

impl Manifest {
    /// Parse manifest YAML. `path` is only used in error messages.
    pub fn from_yaml_str(yaml: &str, path: &Path) -> Result<Self, LabError> {
        let raw: RawManifest =
            serde_yaml::from_str(yaml).map_err(|source| LabError::ManifestInvalid {
                path: path.to_path_buf(),
                message: source.to_string(),
            })?;

        let observations_file = match raw.observations_file {
            Some(value) if !value.trim().is_empty() => relative_path(&value, path)?,
            _ => {
                return Err(LabError::ManifestInvalid {
                    path: path.to_path_buf(),
                    message: "missing required key 'observations_file'".to_string(),
                })
            }
        };

        let image_directory = match raw.image_directory {
            None => None,
            Some(value) if value.trim().is_empty() => {
                return Err(LabError::ManifestInvalid {
                    path: path.to_path_buf(),
                    message: "'image_directory' is empty; use null for datasets without images"
                        .to_string(),
                })
            }
            Some(value) => Some(relative_path(&value, path)?),
        };

        let image_column = raw
            .image_column
            .map(|column| column.trim().to_string())
            .filter(|column| !column.is_empty())
            .unwrap_or_else(|| DEFAULT_IMAGE_COLUMN.to_string());

        Ok(Self {
            observations_file,
            image_directory,
            image_column,
        })
    }

    /// Read and parse the manifest inside `dataset_dir`.
    pub fn load(dataset_dir: &Path) -> Result<Self, LabError> {
        let path = find_manifest(dataset_dir).ok_or_else(|| LabError::MissingResource {
            what: "manifest",
            path: dataset_dir.join(MANIFEST_FILE_NAME),
        })?;
        let yaml = fs::read_to_string(&path)?;
        Self::from_yaml_str(&yaml, &path)
    }

    pub fn has_images(&self) -> bool {
        self.image_directory.is_some()
    }
}

/// Path of the manifest file in `dataset_dir`, if there is one.
pub fn find_manifest(dataset_dir: &Path) -> Option<PathBuf> {
    [MANIFEST_FILE_NAME, MANIFEST_FALLBACK_NAME]
        .iter()
        .map(|name| dataset_dir.join(name))
        .find(|candidate| candidate.is_file())
}

/// Whether `path` stays below the directory it is joined to.
pub(crate) fn stays_inside(path: &Path) -> bool {
    !path.components().any(|component| {
        matches!(
            component,
            Component::RootDir | Component::Prefix(_) | Component::ParentDir
        )
    })
}

fn relative_path(value: &str, manifest_path: &Path) -> Result<PathBuf, LabError> {
    let path = PathBuf::from(value.trim());
    if !stays_inside(&path) {
        return Err(LabError::ManifestInvalid {
            path: manifest_path.to_path_buf(),
            message: format!("'{value}' must be a path inside the dataset directory"),
        });
    }
    Ok(path)
}
