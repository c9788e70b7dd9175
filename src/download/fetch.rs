use std::fs::{self, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

use reqwest::blocking::Client;
use reqwest::{header, StatusCode};

use crate::error::FetchError;
use crate::metadata::compute_sha256;

const CHUNK_SIZE: usize = 32 * 1024;
const LOCK_SUFFIX: &str = "lock";
const PARTIAL_SUFFIX: &str = "partial";

/// Retry tuning for a single download invocation.
#[derive(Debug, Clone)]
pub struct FetchOptions {
    /// Connection attempts before giving up.
    pub max_retries: u32,
    /// Pause between attempts after a connection loss.
    pub retry_delay: Duration,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            max_retries: 5,
            retry_delay: Duration::from_secs(10),
        }
    }
}

#[derive(Debug)]
pub enum FetchOutcome {
    /// The file was downloaded and moved into place.
    Completed(FetchReport),
    /// The destination already holds a finished file; nothing was fetched.
    AlreadyDownloaded,
    /// A lock marker signals another in-flight download for this destination.
    LockedByOther,
}

#[derive(Debug, Clone)]
pub struct FetchReport {
    pub destination: PathBuf,
    /// Bytes written by this invocation, summed across resumed attempts.
    pub bytes_downloaded: u64,
    /// Size of the finished file.
    pub total_bytes: u64,
    pub sha256: String,
    pub elapsed: Duration,
}

/// Sentinel file signaling an in-progress download for `destination`.
///
/// Purely advisory: the existence check and the creation are two separate
/// filesystem operations, so two processes racing through the window can both
/// proceed. Callers treat it as a cooperative guard, not a mutex.
#[must_use]
pub fn lock_marker_path(destination: &Path) -> PathBuf {
    sibling_with_suffix(destination, LOCK_SUFFIX)
}

/// Private buffer accumulating downloaded bytes; its size is the resume
/// offset of the next attempt. Sibling of the destination, keeping the final
/// rename on a single filesystem.
#[must_use]
pub fn partial_path(destination: &Path) -> PathBuf {
    sibling_with_suffix(destination, PARTIAL_SUFFIX)
}

fn sibling_with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".");
    name.push(suffix);
    path.with_file_name(name)
}

/// Download `url` to `destination`, resuming over transient connection
/// losses with ranged requests.
///
/// The destination only ever receives a complete file: bytes stream into a
/// `.partial` sibling which is renamed into place once its size reaches the
/// expected total. Every terminal exit removes the lock marker; terminal
/// failures also delete the partial file.
pub fn fetch<F>(
    client: &Client,
    url: &str,
    destination: &Path,
    options: &FetchOptions,
    mut progress: F,
) -> Result<FetchOutcome, FetchError>
where
    F: FnMut(u64, Option<u64>),
{
    if destination.is_file() {
        return Ok(FetchOutcome::AlreadyDownloaded);
    }
    let marker = lock_marker_path(destination);
    if marker.exists() {
        return Ok(FetchOutcome::LockedByOther);
    }

    if let Some(parent) = nonempty_parent(destination) {
        fs::create_dir_all(parent).map_err(|source| FetchError::Io {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    fs::write(&marker, b"").map_err(|source| FetchError::Io {
        path: marker.clone(),
        source,
    })?;

    let partial = partial_path(destination);
    let started = Instant::now();
    let result = run_attempts(client, url, destination, &partial, options, &mut progress);

    if result.is_err() {
        let _ = fs::remove_file(&partial);
    }
    let _ = fs::remove_file(&marker);
    if let Some(parent) = nonempty_parent(destination) {
        prune_empty_dirs(parent);
    }

    result.map(|mut report| {
        report.elapsed = started.elapsed();
        FetchOutcome::Completed(report)
    })
}

fn run_attempts<F>(
    client: &Client,
    url: &str,
    destination: &Path,
    partial: &Path,
    options: &FetchOptions,
    progress: &mut F,
) -> Result<FetchReport, FetchError>
where
    F: FnMut(u64, Option<u64>),
{
    let attempts = options.max_retries.max(1);
    let mut budget = attempts;
    let mut bytes_downloaded = 0u64;

    loop {
        let offset = fs::metadata(partial).map(|meta| meta.len()).unwrap_or(0);
        match run_attempt(client, url, partial, offset, progress, &mut bytes_downloaded) {
            Ok(expected) => {
                let size = fs::metadata(partial).map(|meta| meta.len()).unwrap_or(0);
                if size >= expected {
                    fs::rename(partial, destination).map_err(|source| FetchError::Io {
                        path: destination.to_path_buf(),
                        source,
                    })?;
                    let sha256 =
                        compute_sha256(destination).map_err(|source| FetchError::Io {
                            path: destination.to_path_buf(),
                            source,
                        })?;
                    return Ok(FetchReport {
                        destination: destination.to_path_buf(),
                        bytes_downloaded,
                        total_bytes: size,
                        sha256,
                        elapsed: Duration::ZERO,
                    });
                }
                // The server ended the body early without a transport error.
                // Restart without consuming the retry budget.
                tracing::warn!(
                    "short response from {url}: {size} of {expected} bytes, restarting"
                );
            }
            Err(AttemptError::Transport(source)) => {
                budget -= 1;
                if budget == 0 {
                    return Err(FetchError::RetriesExhausted {
                        url: url.to_string(),
                        attempts,
                        source,
                    });
                }
                tracing::warn!(
                    "connection to {url} lost, retrying in {:?} ({budget} attempts left)",
                    options.retry_delay
                );
                thread::sleep(options.retry_delay);
            }
            Err(AttemptError::Fatal(error)) => return Err(error),
        }
    }
}

enum AttemptError {
    /// Connection-level failure; retried against the budget.
    Transport(Box<dyn std::error::Error + Send + Sync>),
    /// Everything else; propagates immediately.
    Fatal(FetchError),
}

/// One request/stream cycle. Returns the expected total size of the file.
fn run_attempt<F>(
    client: &Client,
    url: &str,
    partial: &Path,
    offset: u64,
    progress: &mut F,
    bytes_downloaded: &mut u64,
) -> Result<u64, AttemptError>
where
    F: FnMut(u64, Option<u64>),
{
    let mut request = client.get(url);
    if offset > 0 {
        request = request.header(header::RANGE, format!("bytes={offset}-"));
    }
    let mut response = request
        .send()
        .map_err(|error| AttemptError::Transport(error.into()))?;

    let status = response.status();
    if !status.is_success() {
        return Err(AttemptError::Fatal(FetchError::Status {
            url: url.to_string(),
            status,
        }));
    }

    // A 200 to a ranged request means the server ignored the range; the
    // partial file is reset instead of appended to.
    let resume_from = if offset > 0 && status == StatusCode::PARTIAL_CONTENT {
        offset
    } else {
        0
    };

    let expected = response
        .content_length()
        .filter(|len| *len > 0)
        .map(|len| resume_from + len);

    let mut open = OpenOptions::new();
    if resume_from > 0 {
        open.append(true);
    } else {
        open.write(true).truncate(true).create(true);
    }
    let mut file = open.open(partial).map_err(|source| {
        AttemptError::Fatal(FetchError::Io {
            path: partial.to_path_buf(),
            source,
        })
    })?;

    let mut buffer = vec![0u8; CHUNK_SIZE];
    let mut streamed = resume_from;
    loop {
        let read = match response.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => n,
            Err(error) => return Err(AttemptError::Transport(error.into())),
        };
        file.write_all(&buffer[..read]).map_err(|source| {
            AttemptError::Fatal(FetchError::Io {
                path: partial.to_path_buf(),
                source,
            })
        })?;
        *bytes_downloaded += read as u64;
        streamed += read as u64;
        progress(streamed, expected);
    }

    // Without a length header, whatever arrived beyond the offset counts as
    // the whole file.
    Ok(expected.unwrap_or(streamed))
}

/// Remove empty directories walking up from `start`, stopping at the first
/// ancestor that still has entries.
pub fn prune_empty_dirs(start: &Path) {
    let mut current = Some(start.to_path_buf());
    while let Some(dir) = current {
        let is_empty = fs::read_dir(&dir)
            .map(|mut entries| entries.next().is_none())
            .unwrap_or(false);
        if !is_empty || fs::remove_dir(&dir).is_err() {
            break;
        }
        tracing::debug!("removed empty directory {}", dir.display());
        current = dir.parent().map(Path::to_path_buf);
    }
}

fn nonempty_parent(path: &Path) -> Option<&Path> {
    path.parent().filter(|parent| !parent.as_os_str().is_empty())
}
