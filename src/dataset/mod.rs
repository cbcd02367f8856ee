//! Extracted experiment datasets.
//!
//! A dataset directory holds a manifest, an observations CSV and, for
//! camera configurations, a directory of images. [`Dataset::open`] only
//! validates the layout; tables and images are read when asked for.
//!
//! # Example
//!
//! ```no_run
//! use std::path::Path;
//! use chamberlab::dataset::Dataset;
//!
//! let dataset = Dataset::open(Path::new("/tmp/27d733f7-bec1-4202-8179-253dd63fef66"))?;
//! let observations = dataset.observations()?;
//! println!("{} rows", observations.len());
//! if dataset.has_images() {
//!     for image in dataset.images()? {
//!         let image = image?;
//!         println!("{} ({}x{})", image.path.display(), image.width, image.height);
//!     }
//! }
//! # Ok::<(), chamberlab::LabError>(())
//! ```

pub mod images;
pub mod manifest;
pub mod observations;

use std::path::{Path, PathBuf};

pub use images::{read_image, ChamberImage, ImageIter};
pub use manifest::{find_manifest, Manifest, DEFAULT_IMAGE_COLUMN, MANIFEST_FILE_NAME};
pub use observations::{Cell, Column, ColumnKind, Observations};

use crate::error::LabError;

/// Handle to an extracted dataset directory.
#[derive(Clone, Debug)]
pub struct Dataset {
    root: PathBuf,
    manifest: Manifest,
    observations_path: PathBuf,
    image_dir: Option<PathBuf>,
}

impl Dataset {
    /// Load the manifest in `dir` and check that the files it names exist.
    pub fn open(dir: &Path) -> Result<Self, LabError> {
        if !dir.is_dir() {
            return Err(LabError::MissingResource {
                what: "dataset directory",
                path: dir.to_path_buf(),
            });
        }

        let manifest = Manifest::load(dir)?;

        let observations_path = dir.join(&manifest.observations_file);
        if !observations_path.is_file() {
            return Err(LabError::MissingResource {
                what: "observations file",
                path: observations_path,
            });
        }

        let image_dir = match &manifest.image_directory {
            Some(relative) => {
                let path = dir.join(relative);
                if !path.is_dir() {
                    return Err(LabError::MissingResource {
                        what: "image directory",
                        path,
                    });
                }
                Some(path)
            }
            None => None,
        };

        Ok(Self {
            root: dir.to_path_buf(),
            manifest,
            observations_path,
            image_dir,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    pub fn observations_path(&self) -> &Path {
        &self.observations_path
    }

    pub fn has_images(&self) -> bool {
        self.image_dir.is_some()
    }

    /// Parse the observations table.
    ///
    /// The file is read on every call and each call returns an independent
    /// copy, so callers may mutate the result freely. For image datasets the
    /// image column is kept as text.
    pub fn observations(&self) -> Result<Observations, LabError> {
        if self.has_images() {
            Observations::read_csv_with_text_columns(
                &self.observations_path,
                &[self.manifest.image_column.as_str()],
            )
        } else {
            Observations::read_csv(&self.observations_path)
        }
    }

    pub fn image_directory(&self) -> Result<&Path, LabError> {
        self.image_dir
            .as_deref()
            .ok_or(LabError::NotSupported {
                operation: "image access",
            })
    }

    /// Image paths in observation row order.
    ///
    /// Uses the manifest's image column (default `image_file`); rows with an
    /// empty value there have no image and are skipped. When the table has
    /// no such column, every image file in the image directory is returned,
    /// sorted by name. Entries that leave the image directory are rejected
    /// with [`LabError::InvalidImageEntry`].
    pub fn image_paths(&self) -> Result<Vec<PathBuf>, LabError> {
        let image_dir = self.image_directory()?;
        let observations = self.observations()?;

        let Some(cells) = observations.column(&self.manifest.image_column) else {
            return images::list_image_files(image_dir);
        };

        cells
            .into_iter()
            .filter(|cell| !cell.is_missing())
            .map(|cell| {
                let value = cell.to_string();
                let relative = Path::new(&value);
                if !manifest::stays_inside(relative) {
                    return Err(LabError::InvalidImageEntry {
                        path: self.observations_path.clone(),
                        value,
                    });
                }
                Ok(image_dir.join(relative))
            })
            .collect()
    }

    pub fn image_count(&self) -> Result<usize, LabError> {
        self.image_paths().map(|paths| paths.len())
    }

    /// Iterate over the images, reading each file only when reached.
    pub fn images(&self) -> Result<ImageIter, LabError> {
        Ok(ImageIter::new(self.image_paths()?))
    }

    /// Read every image eagerly.
    pub fn load_images(&self) -> Result<Vec<ChamberImage>, LabError> {
        self.images()?.collect()
    }
}
