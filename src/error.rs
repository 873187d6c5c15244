use std::error::Error;
use std::fmt;

/// Why a single page could not be written to disk.
#[derive(Debug)]
pub enum PageFailure {
    Status(u16),
    Transport(reqwest::Error),
    Write(std::io::Error),
}

impl fmt::Display for PageFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PageFailure::Status(code) => write!(f, "HTTP error {}", code),
            PageFailure::Transport(e) => write!(f, "transport error: {}", e),
            PageFailure::Write(e) => write!(f, "write error: {}", e),
        }
    }
}

#[derive(Debug)]
pub enum DownloadError {
    /// The manifest endpoint could not be reached or answered with a non-success status.
    ManifestUnavailable { status: Option<u16>, message: String },
    /// The manifest endpoint answered, but without a usable base URL, hash or page list.
    ManifestMalformed(String),
    PageFetchFailed { url: String, cause: PageFailure },
    /// A page failed mid-chapter. `page_index` is 0-based.
    ChapterDownloadFailed { page_index: usize, page_count: usize, cause: Box<DownloadError> },
    Cancelled { completed_pages: usize },
    RequestFailed(reqwest::Error),
    IoError(std::io::Error),
    ParsingError(String),
}

impl DownloadError {
    /// 0-based index of the failing page, if the failure happened while fetching pages.
    pub fn page_index(&self) -> Option<usize> {
        match self {
            DownloadError::ChapterDownloadFailed { page_index, .. } => Some(*page_index),
            _ => None,
        }
    }
}

impl fmt::Display for DownloadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DownloadError::ManifestUnavailable { status: Some(code), message } => {
                write!(f, "Chapter manifest unavailable (HTTP {}): {}", code, message)
            }
            DownloadError::ManifestUnavailable { status: None, message } => {
                write!(f, "Chapter manifest unavailable: {}", message)
            }
            DownloadError::ManifestMalformed(msg) => write!(f, "Malformed chapter manifest: {}", msg),
            DownloadError::PageFetchFailed { url, cause } => {
                write!(f, "Failed to fetch page {}: {}", url, cause)
            }
            DownloadError::ChapterDownloadFailed { page_index, page_count, cause } => write!(
                f,
                "Chapter download failed at page {} of {}: {}",
                page_index + 1,
                page_count,
                cause
            ),
            DownloadError::Cancelled { completed_pages } => {
                write!(f, "Download cancelled after {} pages", completed_pages)
            }
            DownloadError::RequestFailed(e) => write!(f, "Failed to make HTTP request: {}", e),
            DownloadError::IoError(e) => write!(f, "IO operation failed: {}", e),
            DownloadError::ParsingError(msg) => write!(f, "Failed to parse response: {}", msg),
        }
    }
}

impl Error for DownloadError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            DownloadError::ChapterDownloadFailed { cause, .. } => Some(cause.as_ref()),
            DownloadError::PageFetchFailed { cause: PageFailure::Transport(e), .. } => Some(e),
            DownloadError::PageFetchFailed { cause: PageFailure::Write(e), .. } => Some(e),
            DownloadError::RequestFailed(e) => Some(e),
            DownloadError::IoError(e) => Some(e),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for DownloadError {
    fn from(err: reqwest::Error) -> Self {
        DownloadError::RequestFailed(err)
    }
}

impl From<std::io::Error> for DownloadError {
    fn from(err: std::io::Error) -> Self {
        DownloadError::IoError(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chapter_failure_reports_one_based_page() {
        let err = DownloadError::ChapterDownloadFailed {
            page_index: 1,
            page_count: 3,
            cause: Box::new(DownloadError::PageFetchFailed {
                url: "https://img.example/x/data/T/b.png".to_string(),
                cause: PageFailure::Status(500),
            }),
        };

        assert_eq!(err.page_index(), Some(1));
        let msg = err.to_string();
        assert!(msg.contains("page 2 of 3"));
        assert!(msg.contains("HTTP error 500"));
        assert!(err.source().is_some());
    }

    #[test]
    fn manifest_unavailable_mentions_status() {
        let err = DownloadError::ManifestUnavailable {
            status: Some(404),
            message: "not found".to_string(),
        };
        assert_eq!(err.to_string(), "Chapter manifest unavailable (HTTP 404): not found");
        assert_eq!(err.page_index(), None);
    }
}
