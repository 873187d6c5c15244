use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::{info, warn};
use tokio_util::sync::CancellationToken;

use crate::chapter_manifest::ChapterManifest;
use crate::config::DownloaderConfig;
use crate::downloader::{build_chapter_path, ensure_dir_exists, fetch_page, page_path};
use crate::error::DownloadError;

/// One chapter to persist. Titles are untrusted and only used after sanitization.
#[derive(Debug, Clone)]
pub struct DownloadRequest {
    pub chapter_id: String,
    pub manga_title: String,
    pub chapter_title: String,
}

impl DownloadRequest {
    pub fn new(
        chapter_id: impl Into<String>,
        manga_title: impl Into<String>,
        chapter_title: impl Into<String>,
    ) -> Self {
        Self {
            chapter_id: chapter_id.into(),
            manga_title: manga_title.into(),
            chapter_title: chapter_title.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadResult {
    pub directory_path: PathBuf,
    pub page_count: usize,
}

/// Where a download currently is. Reported to the observer as the download advances.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadStage {
    Resolving,
    Preparing { directory: PathBuf },
    /// `index` is 0-based
    FetchingPage { index: usize, total: usize },
    Done { directory: PathBuf },
    Failed { page_index: Option<usize> },
    Cancelled { completed_pages: usize },
}

pub type StageObserver = Arc<dyn Fn(&DownloadStage) + Send + Sync>;

/// Runs chapter downloads against one download root.
///
/// Pages of a chapter are fetched strictly one after another, with the configured
/// courtesy delay between them. Separate downloaders (or clones) may run concurrently;
/// they share nothing but the filesystem.
#[derive(Clone)]
pub struct ChapterDownloader {
    config: DownloaderConfig,
    client: reqwest::Client,
    observer: Option<StageObserver>,
}

fn final_stage(error: &DownloadError) -> DownloadStage {
    match error {
        DownloadError::Cancelled { completed_pages } => DownloadStage::Cancelled { completed_pages: *completed_pages },
        _ => DownloadStage::Failed { page_index: error.page_index() },
    }
}

impl ChapterDownloader {
    pub fn new(config: DownloaderConfig) -> Result<Self, DownloadError> {
        let client = config.http_client()?;
        Ok(Self { config, client, observer: None })
    }

    pub fn with_observer(mut self, observer: impl Fn(&DownloadStage) + Send + Sync + 'static) -> Self {
        self.observer = Some(Arc::new(observer));
        self
    }

    pub fn config(&self) -> &DownloaderConfig {
        &self.config
    }

    fn report(&self, stage: DownloadStage) {
        if let Some(observer) = &self.observer {
            observer(&stage);
        }
    }

    /// Downloads a chapter to `<root>/<manga>/<chapter>/<n>.jpg` and returns its directory.
    pub async fn download(&self, request: &DownloadRequest) -> Result<DownloadResult, DownloadError> {
        self.download_with_cancel(request, &CancellationToken::new()).await
    }

    /// Like [`download`](Self::download), stopping with `Cancelled` once `cancel` fires.
    pub async fn download_with_cancel(
        &self,
        request: &DownloadRequest,
        cancel: &CancellationToken,
    ) -> Result<DownloadResult, DownloadError> {
        info!("Starting download for: {} - {}", request.manga_title, request.chapter_title);

        self.report(DownloadStage::Resolving);
        let resolved = tokio::select! {
            _ = cancel.cancelled() => Err(DownloadError::Cancelled { completed_pages: 0 }),
            manifest = ChapterManifest::resolve(&self.client, &self.config.api_base_url, &request.chapter_id) => manifest,
        };
        let manifest = match resolved {
            Ok(manifest) => manifest,
            Err(e) => {
                warn!("Could not resolve chapter {}: {}", request.chapter_id, e);
                self.report(final_stage(&e));
                return Err(e);
            }
        };

        self.download_manifest(request, &manifest, cancel).await
    }

    /// Persists the pages of an already resolved manifest.
    pub async fn download_manifest(
        &self,
        request: &DownloadRequest,
        manifest: &ChapterManifest,
        cancel: &CancellationToken,
    ) -> Result<DownloadResult, DownloadError> {
        let chapter_dir = build_chapter_path(
            &self.config.download_root,
            &request.manga_title,
            &request.chapter_title,
        );

        self.report(DownloadStage::Preparing { directory: chapter_dir.clone() });
        if let Err(e) = ensure_dir_exists(&chapter_dir).await {
            warn!("Could not create {}: {}", chapter_dir.display(), e);
            self.report(DownloadStage::Failed { page_index: None });
            return Err(e);
        }

        match self.fetch_pages(manifest, &chapter_dir, cancel).await {
            Ok(()) => {
                info!("Download complete: {} -> {}", request.chapter_title, chapter_dir.display());
                self.report(DownloadStage::Done { directory: chapter_dir.clone() });
                Ok(DownloadResult { directory_path: chapter_dir, page_count: manifest.page_count() })
            }
            Err(e) => {
                warn!("Download of {} stopped: {}", request.chapter_title, e);
                self.report(final_stage(&e));
                Err(e)
            }
        }
    }

    async fn fetch_pages(
        &self,
        manifest: &ChapterManifest,
        chapter_dir: &Path,
        cancel: &CancellationToken,
    ) -> Result<(), DownloadError> {
        let total = manifest.page_count();

        for index in 0..total {
            let Some(url) = manifest.page_url(index) else { break };

            // Stop before starting a new page once cancelled
            if cancel.is_cancelled() {
                return Err(DownloadError::Cancelled { completed_pages: index });
            }

            self.report(DownloadStage::FetchingPage { index, total });
            let destination = page_path(chapter_dir, index);
            info!("Downloading image {}/{}: {}", index + 1, total, url);

            // A failed page ends the chapter; earlier pages stay on disk
            match fetch_page(&self.client, &url, &destination, cancel).await {
                Ok(_) => {}
                Err(DownloadError::Cancelled { .. }) => {
                    return Err(DownloadError::Cancelled { completed_pages: index });
                }
                Err(e) => {
                    return Err(DownloadError::ChapterDownloadFailed {
                        page_index: index,
                        page_count: total,
                        cause: Box::new(e),
                    });
                }
            }

            // Courtesy pause between pages, none after the last one
            if index + 1 < total {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        return Err(DownloadError::Cancelled { completed_pages: index + 1 });
                    }
                    _ = tokio::time::sleep(self.config.page_delay) => {}
                }
            }
        }

        Ok(())
    }
}
