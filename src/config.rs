use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::DownloadError;

pub const DEFAULT_API_BASE_URL: &str = "https://api.mangadex.org";
pub const DEFAULT_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

/// Courtesy delay between two page requests to the image host
pub const DEFAULT_PAGE_DELAY: Duration = Duration::from_millis(200);
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Settings shared by the manifest resolver, the page fetcher and the catalog client.
#[derive(Debug, Clone)]
pub struct DownloaderConfig {
    /// Root of the `<manga>/<chapter>/<n>.jpg` layout
    pub download_root: PathBuf,
    pub api_base_url: String,
    /// Sent on every upstream request
    pub user_agent: String,
    pub page_delay: Duration,
    /// Applies to the whole request, body included
    pub request_timeout: Duration,
    pub connect_timeout: Duration,
}

impl DownloaderConfig {
    pub fn new(download_root: impl AsRef<Path>) -> Self {
        Self {
            download_root: download_root.as_ref().to_path_buf(),
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            page_delay: DEFAULT_PAGE_DELAY,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }

    pub fn with_api_base_url(mut self, url: impl Into<String>) -> Self {
        self.api_base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    pub fn with_page_delay(mut self, delay: Duration) -> Self {
        self.page_delay = delay;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Builds the HTTP client every upstream call goes through
    pub fn http_client(&self) -> Result<reqwest::Client, DownloadError> {
        let client = reqwest::Client::builder()
            .user_agent(self.user_agent.as_str())
            .timeout(self.request_timeout)
            .connect_timeout(self.connect_timeout)
            .build()?;
        Ok(client)
    }
}

/// Joins path segments onto an API base URL, keeping any path prefix the base carries.
pub(crate) fn api_endpoint(api_base_url: &str, segments: &[&str]) -> Result<reqwest::Url, String> {
    let mut url = reqwest::Url::parse(api_base_url)
        .map_err(|e| format!("invalid API base URL {}: {}", api_base_url, e))?;
    url.path_segments_mut()
        .map_err(|_| format!("API base URL {} cannot take a path", api_base_url))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

/// Download root used when none is given: `<downloads>/manga-downloader`, or `./downloads`.
pub fn default_download_root() -> PathBuf {
    dirs::download_dir()
        .map(|dir| dir.join("manga-downloader"))
        .unwrap_or_else(|| PathBuf::from("downloads"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_fills_defaults() {
        let config = DownloaderConfig::new("/tmp/manga");
        assert_eq!(config.download_root, PathBuf::from("/tmp/manga"));
        assert_eq!(config.api_base_url, DEFAULT_API_BASE_URL);
        assert_eq!(config.page_delay, Duration::from_millis(200));
        assert!(config.user_agent.starts_with("manga-downloader/"));
    }

    #[test]
    fn api_endpoint_keeps_prefix() {
        let url = api_endpoint("http://127.0.0.1:9000/api/", &["manga", "abc"]).unwrap();
        assert_eq!(url.as_str(), "http://127.0.0.1:9000/api/manga/abc");
        assert!(api_endpoint("not a url", &["manga"]).is_err());
    }

    #[test]
    fn api_base_url_drops_trailing_slash() {
        let config = DownloaderConfig::new("out").with_api_base_url("http://127.0.0.1:1234/");
        assert_eq!(config.api_base_url, "http://127.0.0.1:1234");
    }
}
