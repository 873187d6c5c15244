use std::fmt;

use log::{debug, info};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::config::{DownloaderConfig, api_endpoint};
use crate::error::DownloadError;

const SEARCH_LIMIT: u32 = 20;
const COVER_BASE_URL: &str = "https://uploads.mangadex.org/covers";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MangaSummary {
    pub id: String,
    pub title: String,
    pub description: Option<String>,
    pub status: Option<String>,
    pub year: Option<u32>,
    pub cover_file_name: Option<String>,
}

impl MangaSummary {
    pub fn cover_url(&self) -> Option<String> {
        self.cover_file_name
            .as_ref()
            .map(|file| format!("{}/{}/{}", COVER_BASE_URL, self.id, file))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChapterInfo {
    /// Position in the whole feed, offset included
    pub index: usize,
    pub id: String,
    pub chapter: Option<String>,
    pub volume: Option<String>,
    pub title: Option<String>,
    pub pages: u32,
}

impl ChapterInfo {
    /// Human readable title, used as the chapter directory name when downloading
    pub fn display_title(&self) -> String {
        let title = self.title.as_deref().map(str::trim).filter(|t| !t.is_empty());
        match (self.chapter.as_deref(), title) {
            (Some(number), Some(title)) => format!("Chapter {}: {}", number, title),
            (Some(number), None) => format!("Chapter {}", number),
            (None, Some(title)) => title.to_string(),
            (None, None) => String::from("Oneshot"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FeedOrder {
    Asc,
    #[default]
    Desc,
}

impl fmt::Display for FeedOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FeedOrder::Asc => write!(f, "asc"),
            FeedOrder::Desc => write!(f, "desc"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeedQuery {
    pub limit: u32,
    pub offset: u32,
    pub order: FeedOrder,
}

impl Default for FeedQuery {
    fn default() -> Self {
        Self { limit: 100, offset: 0, order: FeedOrder::Desc }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChapterFeed {
    pub chapters: Vec<ChapterInfo>,
    pub total: u32,
}

#[derive(Deserialize)]
struct Collection<T> {
    data: Vec<T>,
    #[serde(default)]
    total: u32,
}

#[derive(Deserialize)]
struct Entity<T> {
    data: T,
}

#[derive(Deserialize)]
struct MangaData {
    id: String,
    attributes: MangaAttributes,
    #[serde(default)]
    relationships: Vec<Relationship>,
}

#[derive(Deserialize)]
struct MangaAttributes {
    #[serde(default)]
    title: Value,
    #[serde(default, rename = "altTitles")]
    alt_titles: Vec<Value>,
    #[serde(default)]
    description: Value,
    status: Option<String>,
    year: Option<u32>,
}

#[derive(Deserialize)]
struct Relationship {
    #[serde(rename = "type")]
    kind: String,
    attributes: Option<Value>,
}

#[derive(Deserialize)]
struct ChapterData {
    id: String,
    attributes: ChapterAttributes,
}

#[derive(Deserialize)]
struct ChapterAttributes {
    chapter: Option<String>,
    volume: Option<String>,
    title: Option<String>,
    #[serde(default)]
    pages: u32,
}

/// Picks the English entry of a localized string map, else any entry
fn localized(value: &Value) -> Option<String> {
    let map = value.as_object()?;
    map.get("en")
        .and_then(Value::as_str)
        .or_else(|| map.values().find_map(Value::as_str))
        .map(str::to_string)
}

impl From<MangaData> for MangaSummary {
    fn from(data: MangaData) -> Self {
        let attributes = data.attributes;
        let title = localized(&attributes.title)
            .or_else(|| attributes.alt_titles.iter().find_map(localized))
            .unwrap_or_else(|| data.id.clone());

        let cover_file_name = data.relationships.iter()
            .filter(|rel| rel.kind == "cover_art")
            .find_map(|rel| rel.attributes.as_ref()?.get("fileName")?.as_str().map(str::to_string));

        Self {
            id: data.id,
            title,
            description: localized(&attributes.description),
            status: attributes.status,
            year: attributes.year,
            cover_file_name,
        }
    }
}

/// Client for the catalog side of the API: search, details and chapter feeds.
#[derive(Debug, Clone)]
pub struct MangaCatalog {
    client: reqwest::Client,
    api_base_url: String,
}

impl MangaCatalog {
    pub fn new(config: &DownloaderConfig) -> Result<Self, DownloadError> {
        Ok(Self { client: config.http_client()?, api_base_url: config.api_base_url.clone() })
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        segments: &[&str],
        query: &[(&str, String)],
    ) -> Result<T, DownloadError> {
        let url = api_endpoint(&self.api_base_url, segments).map_err(DownloadError::ParsingError)?;
        debug!("GET {}", url);

        let body = self.client.get(url)
            .query(query)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;

        serde_json::from_str(&body)
            .map_err(|e| DownloadError::ParsingError(format!("unexpected response from {}: {}", segments.join("/"), e)))
    }

    /// Searches titles, most relevant first.
    pub async fn search(&self, title: &str) -> Result<Vec<MangaSummary>, DownloadError> {
        let query = [
            ("title", title.to_string()),
            ("limit", SEARCH_LIMIT.to_string()),
            ("order[relevance]", String::from("desc")),
            ("includes[]", String::from("cover_art")),
        ];
        let results: Collection<MangaData> = self.get_json(&["manga"], &query).await?;
        info!("Search for {:?} matched {} titles", title, results.total);
        Ok(results.data.into_iter().map(MangaSummary::from).collect())
    }

    pub async fn manga(&self, id: &str) -> Result<MangaSummary, DownloadError> {
        let query = [("includes[]", String::from("cover_art"))];
        let entity: Entity<MangaData> = self.get_json(&["manga", id], &query).await?;
        Ok(entity.data.into())
    }

    /// One page of a title's English chapters, ordered by chapter number.
    pub async fn chapter_feed(&self, manga_id: &str, feed: &FeedQuery) -> Result<ChapterFeed, DownloadError> {
        let query = [
            ("translatedLanguage[]", String::from("en")),
            ("order[chapter]", feed.order.to_string()),
            ("limit", feed.limit.to_string()),
            ("offset", feed.offset.to_string()),
        ];
        let results: Collection<ChapterData> = self.get_json(&["manga", manga_id, "feed"], &query).await?;
        info!("Feed for {}: {} chapters (of {})", manga_id, results.data.len(), results.total);

        let chapters = results.data
            .into_iter()
            .enumerate()
            .map(|(i, data)| ChapterInfo {
                index: feed.offset as usize + i,
                id: data.id,
                chapter: data.attributes.chapter,
                volume: data.attributes.volume,
                title: data.attributes.title,
                pages: data.attributes.pages,
            })
            .collect();

        Ok(ChapterFeed { chapters, total: results.total })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chapter(number: Option<&str>, title: Option<&str>) -> ChapterInfo {
        ChapterInfo {
            index: 0,
            id: "c1".to_string(),
            chapter: number.map(str::to_string),
            volume: None,
            title: title.map(str::to_string),
            pages: 10,
        }
    }

    #[test]
    fn display_title_combines_number_and_title() {
        assert_eq!(chapter(Some("12"), Some("The Test")).display_title(), "Chapter 12: The Test");
        assert_eq!(chapter(Some("12"), Some("  ")).display_title(), "Chapter 12");
        assert_eq!(chapter(None, Some("Extra")).display_title(), "Extra");
        assert_eq!(chapter(None, None).display_title(), "Oneshot");
    }

    #[test]
    fn summary_prefers_english_title_and_reads_cover() {
        let data: MangaData = serde_json::from_str(r#"{
            "id": "m1",
            "type": "manga",
            "attributes": {
                "title": {"ja-ro": "Naruto (romaji)", "en": "Naruto"},
                "altTitles": [],
                "description": [],
                "status": "completed",
                "year": 1999
            },
            "relationships": [
                {"id": "a1", "type": "author"},
                {"id": "c1", "type": "cover_art", "attributes": {"fileName": "cover.jpg"}}
            ]
        }"#).unwrap();

        let summary = MangaSummary::from(data);
        assert_eq!(summary.title, "Naruto");
        assert_eq!(summary.description, None);
        assert_eq!(summary.year, Some(1999));
        assert_eq!(summary.cover_url().as_deref(), Some("https://uploads.mangadex.org/covers/m1/cover.jpg"));
    }

    #[test]
    fn summary_falls_back_to_alt_title_then_id() {
        let data: MangaData = serde_json::from_str(r#"{
            "id": "m2",
            "attributes": {"title": {}, "altTitles": [{"ja": "ナルト"}]}
        }"#).unwrap();
        assert_eq!(MangaSummary::from(data).title, "ナルト");

        let data: MangaData = serde_json::from_str(r#"{"id": "m3", "attributes": {}}"#).unwrap();
        assert_eq!(MangaSummary::from(data).title, "m3");
    }
}
