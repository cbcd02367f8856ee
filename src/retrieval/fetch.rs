//! Streaming archive download.
//!
//! Bytes are copied from an [`ArchiveSource`] to `<dest>.part` in fixed-size
//! chunks and the file is renamed to `dest` only once the transfer completed
//! with the declared length. Any failure removes the partial file.

use std::fs::{self, File};
use std::io::{BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::error::LabError;

const CHUNK_SIZE: usize = 64 * 1024;
const DEADLINE_SLACK: Duration = Duration::from_millis(50);

/// An opened remote resource.
pub struct RemoteBody {
    /// Length declared by the server, if any.
    pub content_length: Option<u64>,
    pub reader: Box<dyn Read>,
}

/// Something that can open a download URL for streaming.
pub trait ArchiveSource {
    fn open(&self, url: &str) -> Result<RemoteBody, LabError>;

    /// Like [`open`](Self::open), but blocking reads on the returned body
    /// must fail once `deadline` has passed.
    ///
    /// Sources whose reads never stall can keep the default.
    fn open_until(&self, url: &str, deadline: Option<Instant>) -> Result<RemoteBody, LabError> {
        let _ = deadline;
        self.open(url)
    }
}

/// HTTP(S) downloads through a `ureq` agent.
#[derive(Clone)]
pub struct HttpSource {
    agent: ureq::Agent,
    timeout: Option<Duration>,
}

impl HttpSource {
    /// `timeout` bounds the whole request, body included. `None` waits forever.
    pub fn new(timeout: Option<Duration>) -> Self {
        let config = ureq::Agent::config_builder()
            .timeout_global(timeout)
            .build();
        Self {
            agent: config.into(),
            timeout,
        }
    }
}

impl Default for HttpSource {
    fn default() -> Self {
        Self::new(None)
    }
}

impl ArchiveSource for HttpSource {
    fn open(&self, url: &str) -> Result<RemoteBody, LabError> {
        self.open_until(url, None)
    }

    fn open_until(&self, url: &str, deadline: Option<Instant>) -> Result<RemoteBody, LabError> {
        let request = self.agent.get(url);
        let request = match deadline {
            Some(deadline) => {
                // Expire just after the deadline so the failure reads as a cancellation.
                let remaining =
                    deadline.saturating_duration_since(Instant::now()) + DEADLINE_SLACK;
                let bound = match self.timeout {
                    Some(timeout) => timeout.min(remaining),
                    None => remaining,
                };
                request.config().timeout_global(Some(bound)).build()
            }
            None => request,
        };
        let response = request
            .call()
            .map_err(|source| LabError::Transport {
                url: url.to_string(),
                message: source.to_string(),
            })?;

        // A content-encoded body is decoded on the fly, so its declared
        // length does not match the bytes we read.
        let headers = response.headers();
        let content_length = if headers.contains_key("content-encoding") {
            None
        } else {
            headers
                .get("content-length")
                .and_then(|value| value.to_str().ok())
                .and_then(|value| value.trim().parse::<u64>().ok())
        };

        Ok(RemoteBody {
            content_length,
            reader: Box::new(response.into_body().into_reader()),
        })
    }
}

/// Local files, addressed by `file://` URL or plain path.
#[derive(Clone, Copy, Debug, Default)]
pub struct FileSource;

impl FileSource {
    fn resolve(url: &str) -> Result<PathBuf, LabError> {
        if url.starts_with("file:") {
            let parsed = url::Url::parse(url).map_err(|source| LabError::Transport {
                url: url.to_string(),
                message: format!("invalid file URL: {source}"),
            })?;
            parsed.to_file_path().map_err(|_| LabError::Transport {
                url: url.to_string(),
                message: "file URL does not name a local path".to_string(),
            })
        } else {
            Ok(PathBuf::from(url))
        }
    }
}

impl ArchiveSource for FileSource {
    fn open(&self, url: &str) -> Result<RemoteBody, LabError> {
        let path = Self::resolve(url)?;
        let file = File::open(&path).map_err(|source| LabError::Transport {
            url: url.to_string(),
            message: source.to_string(),
        })?;
        let content_length = file.metadata().ok().map(|meta| meta.len());

        Ok(RemoteBody {
            content_length,
            reader: Box::new(file),
        })
    }
}

/// Picks [`HttpSource`] or [`FileSource`] from the URL scheme.
#[derive(Clone, Default)]
pub struct AutoSource {
    http: HttpSource,
    file: FileSource,
}

impl AutoSource {
    pub fn with_timeout(timeout: Option<Duration>) -> Self {
        Self {
            http: HttpSource::new(timeout),
            file: FileSource,
        }
    }
}

impl ArchiveSource for AutoSource {
    fn open(&self, url: &str) -> Result<RemoteBody, LabError> {
        self.open_until(url, None)
    }

    fn open_until(&self, url: &str, deadline: Option<Instant>) -> Result<RemoteBody, LabError> {
        let lower = url.to_ascii_lowercase();
        if lower.starts_with("http://") || lower.starts_with("https://") {
            self.http.open_until(url, deadline)
        } else {
            self.file.open_until(url, deadline)
        }
    }
}

impl<S: ArchiveSource + ?Sized> ArchiveSource for &S {
    fn open(&self, url: &str) -> Result<RemoteBody, LabError> {
        (**self).open(url)
    }

    fn open_until(&self, url: &str, deadline: Option<Instant>) -> Result<RemoteBody, LabError> {
        (**self).open_until(url, deadline)
    }
}

/// Receives byte-level progress of a transfer.
pub trait ProgressSink {
    fn on_start(&mut self, _total: Option<u64>) {}
    fn on_progress(&mut self, transferred: u64, total: Option<u64>);
    fn on_finish(&mut self, _transferred: u64) {}
}

impl<F: FnMut(u64, Option<u64>)> ProgressSink for F {
    fn on_progress(&mut self, transferred: u64, total: Option<u64>) {
        self(transferred, total)
    }
}

/// Discards progress events.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn on_progress(&mut self, _transferred: u64, _total: Option<u64>) {}
}

/// Logs progress at `info` level every `step_percent` percent
/// (or every 10 MiB when the total is unknown).
#[derive(Clone, Debug)]
pub struct LogProgress {
    step_percent: u64,
    next_report: u64,
}

impl LogProgress {
    pub fn new(step_percent: u64) -> Self {
        Self {
            step_percent: step_percent.clamp(1, 100),
            next_report: 0,
        }
    }
}

impl Default for LogProgress {
    fn default() -> Self {
        Self::new(10)
    }
}

impl ProgressSink for LogProgress {
    fn on_start(&mut self, total: Option<u64>) {
        match total {
            Some(total) => log::info!("downloading {total} bytes"),
            None => log::info!("downloading (size unknown)"),
        }
        self.next_report = 0;
    }

    fn on_progress(&mut self, transferred: u64, total: Option<u64>) {
        match total {
            Some(total) if total > 0 => {
                let percent = transferred.saturating_mul(100) / total;
                if percent >= self.next_report {
                    log::info!("  {percent:>3}% ({transferred}/{total} bytes)");
                    self.next_report = percent + self.step_percent;
                }
            }
            _ => {
                const STEP: u64 = 10 * 1024 * 1024;
                if transferred >= self.next_report {
                    log::info!("  {transferred} bytes");
                    self.next_report = transferred + STEP;
                }
            }
        }
    }

    fn on_finish(&mut self, transferred: u64) {
        log::info!("download finished ({transferred} bytes)");
    }
}

/// Cooperative cancellation for in-flight downloads.
///
/// Clones share the same flag, so one clone can be handed to another thread
/// and cancelled from there. The flag is checked between chunks. An optional
/// deadline cancels automatically and also bounds each blocking read, so a
/// stalled server cannot hold the download past it.
#[derive(Clone, Debug, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
    deadline: Option<Instant>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// A token that reports cancellation once `timeout` has elapsed.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            flag: Arc::new(AtomicBool::new(false)),
            deadline: Some(Instant::now() + timeout),
        }
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
            || self
                .deadline
                .map(|deadline| Instant::now() >= deadline)
                .unwrap_or(false)
    }
}

/// Path of the in-progress file for `dest`.
pub fn part_path(dest: &Path) -> PathBuf {
    let mut name = dest.as_os_str().to_owned();
    name.push(".part");
    PathBuf::from(name)
}

/// Stream `url` into `dest` and return the number of bytes written.
///
/// The parent directory of `dest` must already exist. On success `dest` holds
/// exactly the transferred bytes; on any error neither `dest` nor the
/// `.part` file is left behind by this call.
pub fn fetch_to_path(
    source: &dyn ArchiveSource,
    url: &str,
    dest: &Path,
    progress: &mut dyn ProgressSink,
    cancel: &CancelToken,
) -> Result<u64, LabError> {
    let parent = dest
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    if !parent.is_dir() {
        return Err(LabError::MissingResource {
            what: "download directory",
            path: parent.to_path_buf(),
        });
    }

    if cancel.is_cancelled() {
        return Err(LabError::Cancelled {
            url: url.to_string(),
        });
    }

    log::info!("Downloading \"{}\" into \"{}\"", url, dest.display());
    let body = source
        .open_until(url, cancel.deadline())
        .map_err(|err| cancelled_or(err, url, cancel))?;
    let partial = part_path(dest);

    match stream_body(body, url, &partial, progress, cancel) {
        Ok(written) => {
            fs::rename(&partial, dest)?;
            Ok(written)
        }
        Err(err) => {
            discard(&partial);
            Err(err)
        }
    }
}

fn stream_body(
    body: RemoteBody,
    url: &str,
    partial: &Path,
    progress: &mut dyn ProgressSink,
    cancel: &CancelToken,
) -> Result<u64, LabError> {
    let RemoteBody {
        content_length,
        mut reader,
    } = body;

    let mut writer = BufWriter::new(File::create(partial)?);
    let mut buffer = vec![0u8; CHUNK_SIZE];
    let mut written: u64 = 0;

    progress.on_start(content_length);
    loop {
        if cancel.is_cancelled() {
            log::warn!("download of {url} cancelled after {written} bytes");
            return Err(LabError::Cancelled {
                url: url.to_string(),
            });
        }

        let n = match reader.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => n,
            Err(err) if err.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(err) => {
                let err = LabError::Transport {
                    url: url.to_string(),
                    message: err.to_string(),
                };
                return Err(cancelled_or(err, url, cancel));
            }
        };

        writer.write_all(&buffer[..n])?;
        written += n as u64;
        progress.on_progress(written, content_length);
    }

    writer.flush()?;
    writer
        .into_inner()
        .map_err(|err| LabError::Io(err.into_error()))?
        .sync_all()?;

    if let Some(expected) = content_length {
        if expected != written {
            return Err(LabError::CorruptedDownload {
                url: url.to_string(),
                expected,
                actual: written,
            });
        }
    }

    progress.on_finish(written);
    Ok(written)
}

/// A transport failure after the deadline is reported as cancellation.
fn cancelled_or(err: LabError, url: &str, cancel: &CancelToken) -> LabError {
    match err {
        LabError::Transport { .. } if cancel.is_cancelled() => {
            log::warn!("download of {url} timed out");
            LabError::Cancelled {
                url: url.to_string(),
            }
        }
        other => other,
    }
}

fn discard(path: &Path) {
    match fs::remove_file(path) {
        Ok(()) => log::warn!("discarded partial download {}", path.display()),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
        Err(err) => log::warn!("could not remove {}: {err}", path.display()),
    }
}
