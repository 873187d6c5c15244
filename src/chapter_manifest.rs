use log::{debug, info};
use serde::Deserialize;

use crate::config::api_endpoint;
use crate::error::DownloadError;

/// Everything needed to build the page URLs of one chapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChapterManifest {
    base_url: String,
    session_token: String,
    page_filenames: Vec<String>,
}

#[derive(Deserialize)]
struct AtHomeResponse {
    #[serde(rename = "baseUrl")]
    base_url: Option<String>,
    chapter: Option<AtHomeChapter>,
}

#[derive(Deserialize)]
struct AtHomeChapter {
    hash: Option<String>,
    data: Option<serde_json::Value>,
}

#[derive(Deserialize)]
struct UpstreamErrors {
    errors: Vec<UpstreamError>,
}

#[derive(Deserialize)]
struct UpstreamError {
    title: Option<String>,
    detail: Option<String>,
}

impl ChapterManifest {
    pub fn new(base_url: impl Into<String>, session_token: impl Into<String>, page_filenames: Vec<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { base_url, session_token: session_token.into(), page_filenames }
    }

    /// Fetches `GET {api_base_url}/at-home/server/{chapter_id}` and validates the answer.
    ///
    /// Transport failures and non-success statuses are `ManifestUnavailable`; a response
    /// without a base URL, hash or non-empty page list is `ManifestMalformed`. Never retries.
    pub async fn resolve(
        client: &reqwest::Client,
        api_base_url: &str,
        chapter_id: &str,
    ) -> Result<Self, DownloadError> {
        let url = manifest_url(api_base_url, chapter_id)?;
        debug!("Resolving chapter manifest from {}", url);

        let response = client.get(url).send().await.map_err(|e| DownloadError::ManifestUnavailable {
            status: e.status().map(|s| s.as_u16()),
            message: e.to_string(),
        })?;

        let status = response.status();
        let body = response.text().await.map_err(|e| DownloadError::ManifestUnavailable {
            status: Some(status.as_u16()),
            message: e.to_string(),
        })?;

        if !status.is_success() {
            return Err(DownloadError::ManifestUnavailable {
                status: Some(status.as_u16()),
                message: upstream_message(&body)
                    .unwrap_or_else(|| status.canonical_reason().unwrap_or("request failed").to_string()),
            });
        }

        let manifest = Self::from_json(&body)?;
        info!("Chapter {} has {} pages", chapter_id, manifest.page_count());
        Ok(manifest)
    }

    /// Parses an at-home server response body.
    pub fn from_json(body: &str) -> Result<Self, DownloadError> {
        let parsed: AtHomeResponse = serde_json::from_str(body)
            .map_err(|e| DownloadError::ManifestMalformed(format!("invalid JSON: {}", e)))?;

        let base_url = parsed.base_url
            .filter(|url| !url.is_empty())
            .ok_or_else(|| DownloadError::ManifestMalformed(String::from("missing baseUrl")))?;

        let chapter = parsed.chapter
            .ok_or_else(|| DownloadError::ManifestMalformed(String::from("missing chapter")))?;

        let hash = chapter.hash
            .filter(|hash| !hash.is_empty())
            .ok_or_else(|| DownloadError::ManifestMalformed(String::from("missing chapter.hash")))?;

        let data = chapter.data
            .ok_or_else(|| DownloadError::ManifestMalformed(String::from("missing chapter.data")))?;

        let entries = data.as_array()
            .ok_or_else(|| DownloadError::ManifestMalformed(String::from("chapter.data is not an array")))?;

        let pages = entries.iter()
            .map(|entry| entry.as_str().map(str::to_string))
            .collect::<Option<Vec<_>>>()
            .ok_or_else(|| DownloadError::ManifestMalformed(String::from("chapter.data contains a non-string entry")))?;

        if pages.is_empty() {
            return Err(DownloadError::ManifestMalformed(String::from("chapter.data is empty")));
        }

        Ok(Self::new(base_url, hash, pages))
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn session_token(&self) -> &str {
        &self.session_token
    }

    pub fn page_filenames(&self) -> &[String] {
        &self.page_filenames
    }

    pub fn page_count(&self) -> usize {
        self.page_filenames.len()
    }

    /// `baseUrl/data/sessionToken/filename` for the page at 0-based `index`
    pub fn page_url(&self, index: usize) -> Option<String> {
        self.page_filenames
            .get(index)
            .map(|filename| format!("{}/data/{}/{}", self.base_url, self.session_token, filename))
    }
}

fn manifest_url(api_base_url: &str, chapter_id: &str) -> Result<reqwest::Url, DownloadError> {
    api_endpoint(api_base_url, &["at-home", "server", chapter_id])
        .map_err(|message| DownloadError::ManifestUnavailable { status: None, message })
}

// MangaDex error bodies look like {"result":"error","errors":[{"title":..,"detail":..}]}
fn upstream_message(body: &str) -> Option<String> {
    if let Ok(parsed) = serde_json::from_str::<UpstreamErrors>(body) {
        if let Some(first) = parsed.errors.into_iter().next() {
            return first.detail.or(first.title);
        }
    }
    let trimmed = body.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "result": "ok",
        "baseUrl": "https://img.example/x",
        "chapter": {
            "hash": "T",
            "data": ["a.png", "b.png", "c.png"],
            "dataSaver": ["a.jpg", "b.jpg", "c.jpg"]
        }
    }"#;

    fn assert_malformed(body: &str) {
        match ChapterManifest::from_json(body) {
            Err(DownloadError::ManifestMalformed(_)) => {}
            other => panic!("expected ManifestMalformed, got {:?}", other),
        }
    }

    #[test]
    fn parses_at_home_response() {
        let manifest = ChapterManifest::from_json(SAMPLE).unwrap();
        assert_eq!(manifest.base_url(), "https://img.example/x");
        assert_eq!(manifest.session_token(), "T");
        assert_eq!(manifest.page_filenames(), ["a.png", "b.png", "c.png"]);
    }

    #[test]
    fn builds_page_urls_in_order() {
        let manifest = ChapterManifest::from_json(SAMPLE).unwrap();
        assert_eq!(manifest.page_url(0).as_deref(), Some("https://img.example/x/data/T/a.png"));
        assert_eq!(manifest.page_url(2).as_deref(), Some("https://img.example/x/data/T/c.png"));
        assert_eq!(manifest.page_url(3), None);
    }

    #[test]
    fn trailing_slash_on_base_url_is_ignored() {
        let manifest = ChapterManifest::new("https://img.example/x/", "T", vec!["a.png".to_string()]);
        assert_eq!(manifest.page_url(0).as_deref(), Some("https://img.example/x/data/T/a.png"));
    }

    #[test]
    fn rejects_missing_or_mistyped_fields() {
        assert_malformed("not json");
        assert_malformed(r#"{"chapter": {"hash": "T", "data": ["a.png"]}}"#);
        assert_malformed(r#"{"baseUrl": "https://img.example", "chapter": {"data": ["a.png"]}}"#);
        assert_malformed(r#"{"baseUrl": "https://img.example", "chapter": {"hash": "T"}}"#);
        assert_malformed(r#"{"baseUrl": "https://img.example", "chapter": {"hash": "T", "data": "a.png"}}"#);
        assert_malformed(r#"{"baseUrl": "https://img.example", "chapter": {"hash": "T", "data": [1, 2]}}"#);
        assert_malformed(r#"{"baseUrl": "https://img.example", "chapter": {"hash": "T", "data": []}}"#);
    }

    #[test]
    fn manifest_url_keeps_api_prefix() {
        let url = manifest_url("http://127.0.0.1:9000/api/", "abc-123").unwrap();
        assert_eq!(url.as_str(), "http://127.0.0.1:9000/api/at-home/server/abc-123");
    }

    #[test]
    fn upstream_message_prefers_detail() {
        let body = r#"{"result":"error","errors":[{"title":"Not found","detail":"Chapter abc could not be found"}]}"#;
        assert_eq!(upstream_message(body).as_deref(), Some("Chapter abc could not be found"));
        assert_eq!(upstream_message("   "), None);
        assert_eq!(upstream_message("gateway down").as_deref(), Some("gateway down"));
    }
}
