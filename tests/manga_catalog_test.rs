use mockito::Matcher;
use serde_json::json;

use manga_downloader::manga_catalog::{FeedOrder, FeedQuery};
use manga_downloader::{DownloadError, DownloaderConfig, MangaCatalog};

fn catalog_for(server: &mockito::ServerGuard) -> MangaCatalog {
    let config = DownloaderConfig::new("unused").with_api_base_url(server.url());
    MangaCatalog::new(&config).unwrap()
}

fn manga_json(id: &str, title: &str) -> serde_json::Value {
    json!({
        "id": id,
        "type": "manga",
        "attributes": {
            "title": { "en": title },
            "altTitles": [],
            "description": { "en": format!("About {}", title) },
            "status": "ongoing",
            "year": 2002
        },
        "relationships": [
            { "id": "cover-1", "type": "cover_art", "attributes": { "fileName": "cover.jpg" } }
        ]
    })
}

#[tokio::test]
async fn search_sends_relevance_query() {
    let mut server = mockito::Server::new_async().await;
    let mock = server.mock("GET", "/manga")
        .match_query(Matcher::AllOf(vec![
            Matcher::UrlEncoded("title".into(), "naruto".into()),
            Matcher::UrlEncoded("limit".into(), "20".into()),
            Matcher::UrlEncoded("order[relevance]".into(), "desc".into()),
            Matcher::UrlEncoded("includes[]".into(), "cover_art".into()),
        ]))
        .with_status(200)
        .with_body(json!({
            "result": "ok",
            "data": [manga_json("m1", "Naruto"), manga_json("m2", "Boruto")],
            "limit": 20,
            "offset": 0,
            "total": 2
        }).to_string())
        .create_async()
        .await;

    let results = catalog_for(&server).search("naruto").await.unwrap();

    assert_eq!(results.len(), 2);
    assert_eq!(results[0].id, "m1");
    assert_eq!(results[0].title, "Naruto");
    assert_eq!(results[0].description.as_deref(), Some("About Naruto"));
    assert_eq!(results[0].cover_file_name.as_deref(), Some("cover.jpg"));
    assert_eq!(results[1].title, "Boruto");
    mock.assert_async().await;
}

#[tokio::test]
async fn manga_details_are_read_from_entity() {
    let mut server = mockito::Server::new_async().await;
    server.mock("GET", "/manga/m1")
        .match_query(Matcher::UrlEncoded("includes[]".into(), "cover_art".into()))
        .with_status(200)
        .with_body(json!({ "result": "ok", "data": manga_json("m1", "Naruto") }).to_string())
        .create_async()
        .await;

    let manga = catalog_for(&server).manga("m1").await.unwrap();
    assert_eq!(manga.title, "Naruto");
    assert_eq!(manga.year, Some(2002));
    assert_eq!(manga.status.as_deref(), Some("ongoing"));
}

#[tokio::test]
async fn chapter_feed_numbers_chapters_from_offset() {
    let mut server = mockito::Server::new_async().await;
    let mock = server.mock("GET", "/manga/m1/feed")
        .match_query(Matcher::AllOf(vec![
            Matcher::UrlEncoded("translatedLanguage[]".into(), "en".into()),
            Matcher::UrlEncoded("order[chapter]".into(), "asc".into()),
            Matcher::UrlEncoded("limit".into(), "2".into()),
            Matcher::UrlEncoded("offset".into(), "10".into()),
        ]))
        .with_status(200)
        .with_body(json!({
            "result": "ok",
            "data": [
                { "id": "c11", "type": "chapter", "attributes": { "chapter": "11", "volume": "2", "title": "Start", "pages": 18 } },
                { "id": "c12", "type": "chapter", "attributes": { "chapter": "12", "volume": null, "title": null, "pages": 20 } }
            ],
            "limit": 2,
            "offset": 10,
            "total": 40
        }).to_string())
        .create_async()
        .await;

    let query = FeedQuery { limit: 2, offset: 10, order: FeedOrder::Asc };
    let feed = catalog_for(&server).chapter_feed("m1", &query).await.unwrap();

    assert_eq!(feed.total, 40);
    assert_eq!(feed.chapters.len(), 2);
    assert_eq!(feed.chapters[0].index, 10);
    assert_eq!(feed.chapters[0].display_title(), "Chapter 11: Start");
    assert_eq!(feed.chapters[1].index, 11);
    assert_eq!(feed.chapters[1].volume, None);
    assert_eq!(feed.chapters[1].display_title(), "Chapter 12");
    assert_eq!(feed.chapters[1].pages, 20);
    mock.assert_async().await;
}

#[tokio::test]
async fn upstream_error_status_is_request_failure() {
    let mut server = mockito::Server::new_async().await;
    server.mock("GET", "/manga/missing")
        .match_query(Matcher::Any)
        .with_status(404)
        .create_async()
        .await;

    let err = catalog_for(&server).manga("missing").await.unwrap_err();
    assert!(matches!(err, DownloadError::RequestFailed(_)), "got {:?}", err);
}

#[tokio::test]
async fn unexpected_payload_is_parsing_error() {
    let mut server = mockito::Server::new_async().await;
    server.mock("GET", "/manga")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_body(r#"{"result":"ok","data":"nope"}"#)
        .create_async()
        .await;

    let err = catalog_for(&server).search("x").await.unwrap_err();
    assert!(matches!(err, DownloadError::ParsingError(_)), "got {:?}", err);
}
