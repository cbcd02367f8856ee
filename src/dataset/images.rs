//! Lazy access to dataset images.

use std::fs;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::error::LabError;

const IMAGE_EXTENSIONS: [&str; 8] = ["jpg", "jpeg", "png", "bmp", "webp", "gif", "tif", "tiff"];

/// One image file, read fully into memory.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChamberImage {
    pub path: PathBuf,
    pub bytes: Vec<u8>,
    pub width: usize,
    pub height: usize,
}

/// Reads images one at a time, in the order the paths were given.
#[derive(Clone, Debug)]
pub struct ImageIter {
    paths: std::vec::IntoIter<PathBuf>,
}

impl ImageIter {
    pub(crate) fn new(paths: Vec<PathBuf>) -> Self {
        Self {
            paths: paths.into_iter(),
        }
    }
}

impl Iterator for ImageIter {
    type Item = Result<ChamberImage, LabError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.paths.next().map(|path| read_image(&path))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.paths.size_hint()
    }
}

impl ExactSizeIterator for ImageIter {}

/// Read `path` and decode its dimensions from the header.
pub fn read_image(path: &Path) -> Result<ChamberImage, LabError> {
    let bytes = fs::read(path).map_err(|source| {
        if source.kind() == std::io::ErrorKind::NotFound {
            LabError::MissingResource {
                what: "image file",
                path: path.to_path_buf(),
            }
        } else {
            LabError::Io(source)
        }
    })?;

    let size = imagesize::blob_size(&bytes).map_err(|source| LabError::ImageRead {
        path: path.to_path_buf(),
        message: source.to_string(),
    })?;

    Ok(ChamberImage {
        path: path.to_path_buf(),
        width: size.width,
        height: size.height,
        bytes,
    })
}

/// Image files directly inside `dir`, sorted by file name.
pub(crate) fn list_image_files(dir: &Path) -> Result<Vec<PathBuf>, LabError> {
    let mut files = Vec::new();

    for entry in WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
    {
        let entry = entry.map_err(|source| LabError::ImageRead {
            path: dir.to_path_buf(),
            message: format!("failed while listing directory: {source}"),
        })?;

        if entry.file_type().is_file() && has_image_extension(entry.path()) {
            files.push(entry.into_path());
        }
    }

    Ok(files)
}

fn has_image_extension(path: &Path) -> bool {
    let Some(ext) = path.extension().and_then(|ext| ext.to_str()) else {
        return false;
    };

    IMAGE_EXTENSIONS
        .iter()
        .any(|allowed| ext.eq_ignore_ascii_case(allowed))
}
