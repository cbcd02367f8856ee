//! Zip extraction.

use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Write};
use std::path::Path;

use crate::error::LabError;

/// Counts of what an extraction wrote.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ExtractSummary {
    pub files: usize,
    pub directories: usize,
    pub bytes: u64,
}

/// Extract every entry of the zip archive at `archive` into `target`.
///
/// `target` is created if absent. Entries are written in archive order and
/// existing files are overwritten, so extracting the same archive into an
/// empty directory always yields identical contents. Entry names that would
/// escape `target` make the archive count as corrupt.
pub fn extract_archive(archive: &Path, target: &Path) -> Result<ExtractSummary, LabError> {
    let file = File::open(archive).map_err(|source| {
        if source.kind() == io::ErrorKind::NotFound {
            LabError::MissingResource {
                what: "archive",
                path: archive.to_path_buf(),
            }
        } else {
            LabError::Io(source)
        }
    })?;

    let mut zip = zip::ZipArchive::new(BufReader::new(file)).map_err(|source| {
        LabError::CorruptArchive {
            path: archive.to_path_buf(),
            message: source.to_string(),
        }
    })?;

    fs::create_dir_all(target)?;
    let mut summary = ExtractSummary::default();

    for index in 0..zip.len() {
        let mut entry = zip
            .by_index(index)
            .map_err(|source| LabError::CorruptArchive {
                path: archive.to_path_buf(),
                message: format!("entry {index}: {source}"),
            })?;

        let Some(relative) = entry.enclosed_name() else {
            return Err(LabError::CorruptArchive {
                path: archive.to_path_buf(),
                message: format!("entry '{}' escapes the extraction directory", entry.name()),
            });
        };
        let out_path = target.join(relative);

        if entry.is_dir() {
            fs::create_dir_all(&out_path)?;
            summary.directories += 1;
            continue;
        }

        if let Some(parent) = out_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut writer = BufWriter::new(File::create(&out_path)?);
        let copied = io::copy(&mut entry, &mut writer).map_err(|source| match source.kind() {
            io::ErrorKind::InvalidData | io::ErrorKind::UnexpectedEof => {
                LabError::CorruptArchive {
                    path: archive.to_path_buf(),
                    message: format!("entry '{}': {source}", entry.name()),
                }
            }
            _ => LabError::Io(source),
        })?;
        writer.flush()?;

        summary.files += 1;
        summary.bytes += copied;
    }

    log::debug!(
        "extracted {} file(s), {} dir(s) from {} into {}",
        summary.files,
        summary.directories,
        archive.display(),
        target.display()
    );
    Ok(summary)
}
