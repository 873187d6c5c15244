use std::path::{Path, PathBuf};

use futures::StreamExt;
use log::{debug, warn};
use tokio::fs::{self, File};
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;

use crate::error::{DownloadError, PageFailure};

/// Characters rejected in a path segment by at least one common filesystem
const INVALID_CHARS: [char; 9] = ['<', '>', ':', '"', '/', '\\', '|', '?', '*'];

const RESERVED_NAMES: [&str; 22] = [
    "CON", "PRN", "AUX", "NUL",
    "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7", "COM8", "COM9",
    "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
];

const MAX_SEGMENT_BYTES: usize = 255;

/// Stands in for a title that sanitizes to nothing
pub const PLACEHOLDER_SEGMENT: &str = "untitled";

/// Turns an untrusted title into a single path segment that is valid on every platform.
///
/// Case and inner spaces are kept, so `Naruto: Shippuden?` becomes `Naruto Shippuden`.
/// The result is never empty and `sanitize_filename(sanitize_filename(x)) == sanitize_filename(x)`.
pub fn sanitize_filename(input: &str) -> String {
    let mut result: String = input
        .chars()
        .filter(|c| !INVALID_CHARS.contains(c) && !c.is_control())
        .collect();

    if result.len() > MAX_SEGMENT_BYTES {
        let mut end = MAX_SEGMENT_BYTES;
        while !result.is_char_boundary(end) {
            end -= 1;
        }
        result.truncate(end);
    }

    // Trailing dots are dropped by Windows, and "." / ".." would escape the chapter tree
    let mut result = result
        .trim()
        .trim_end_matches(|c: char| c == '.' || c.is_whitespace())
        .to_string();

    if RESERVED_NAMES.iter().any(|&name| result.eq_ignore_ascii_case(name)) {
        result = format!("_{}", result);
    }

    if result.is_empty() {
        return PLACEHOLDER_SEGMENT.to_string();
    }

    result
}

/// `<root>/<sanitized manga title>/<sanitized chapter title>`
pub fn build_chapter_path(root: &Path, manga_title: &str, chapter_title: &str) -> PathBuf {
    root.join(sanitize_filename(manga_title))
        .join(sanitize_filename(chapter_title))
}

/// Destination of the page at 0-based `index`: `1.jpg`, `2.jpg`, ...
pub fn page_path(chapter_dir: &Path, index: usize) -> PathBuf {
    chapter_dir.join(format!("{}.jpg", index + 1))
}

/// Creates a directory and its missing ancestors. An existing directory is fine,
/// including one created concurrently by another download.
pub async fn ensure_dir_exists(path: &Path) -> Result<(), DownloadError> {
    fs::create_dir_all(path).await?;
    Ok(())
}

fn partial_path(destination: &Path) -> PathBuf {
    let mut name = destination.as_os_str().to_os_string();
    name.push(".part");
    PathBuf::from(name)
}

fn page_error(url: &str, cause: PageFailure) -> DownloadError {
    DownloadError::PageFetchFailed { url: url.to_string(), cause }
}

async fn discard_file(path: &Path) {
    match fs::remove_file(path).await {
        Ok(()) => debug!("Removed {}", path.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!("Could not remove {}: {}", path.display(), e),
    }
}

async fn stream_to_file(response: reqwest::Response, path: &Path) -> Result<u64, PageFailure> {
    let mut file = File::create(path).await.map_err(PageFailure::Write)?;
    let mut stream = response.bytes_stream();
    let mut written = 0u64;

    // Copy chunk by chunk, a cut-off body surfaces here as a transport error
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(PageFailure::Transport)?;
        file.write_all(&chunk).await.map_err(PageFailure::Write)?;
        written += chunk.len() as u64;
    }

    // Ensure all data is written before the handle is dropped
    file.flush().await.map_err(PageFailure::Write)?;
    Ok(written)
}

async fn download_to(
    client: &reqwest::Client,
    url: &str,
    part: &Path,
    destination: &Path,
    cancel: &CancellationToken,
) -> Result<u64, DownloadError> {
    let response = tokio::select! {
        _ = cancel.cancelled() => return Err(DownloadError::Cancelled { completed_pages: 0 }),
        response = client.get(url).send() => {
            response.map_err(|e| page_error(url, PageFailure::Transport(e)))?
        }
    };

    // Check the status before any file is opened
    let status = response.status();
    if !status.is_success() {
        return Err(page_error(url, PageFailure::Status(status.as_u16())));
    }

    // Dropping the stream future on cancellation closes the file handle
    let written = tokio::select! {
        _ = cancel.cancelled() => return Err(DownloadError::Cancelled { completed_pages: 0 }),
        written = stream_to_file(response, part) => written.map_err(|cause| page_error(url, cause))?,
    };

    // Only a complete body ever lands under the final name
    fs::rename(part, destination)
        .await
        .map_err(|e| page_error(url, PageFailure::Write(e)))?;

    Ok(written)
}

/// Streams one page image to `destination`, returning the number of bytes written.
///
/// The body goes to `<destination>.part` first and is renamed into place only once the
/// stream has ended cleanly. On failure or cancellation both the partial file and any
/// `destination` left by an earlier run are removed, so a failed page never has a file.
pub async fn fetch_page(
    client: &reqwest::Client,
    url: &str,
    destination: &Path,
    cancel: &CancellationToken,
) -> Result<u64, DownloadError> {
    let part = partial_path(destination);

    match download_to(client, url, &part, destination, cancel).await {
        Ok(written) => {
            debug!("Saved {} ({} bytes)", destination.display(), written);
            Ok(written)
        }
        Err(e) => {
            discard_file(&part).await;
            discard_file(destination).await;
            Err(e)
        }
    }
}
