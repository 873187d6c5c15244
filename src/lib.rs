// Expose modules for integration testing
pub mod chapter_download;
pub mod chapter_manifest;
pub mod config;
pub mod downloader;
pub mod error;
pub mod manga_catalog;

// Re-export important types for easier use in tests
pub use chapter_download::{ChapterDownloader, DownloadRequest, DownloadResult, DownloadStage};
pub use chapter_manifest::ChapterManifest;
pub use config::DownloaderConfig;
pub use error::{DownloadError, PageFailure};
pub use manga_catalog::{ChapterInfo, MangaCatalog, MangaSummary};
