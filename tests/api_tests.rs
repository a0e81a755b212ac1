use axum::http::StatusCode;
use axum_test::TestServer;
use chrono::NaiveDate;
use serde_json::{json, Value};
use std::sync::Arc;

use marquee::{
    clock::SystemClock,
    config::Config,
    db::MemoryStorage,
    error::{AppError, AppResult},
    models::{ContentMetadata, MediaType, Title},
    routes::{create_router, AppState},
    services::providers::MetadataProvider,
};

/// Canned provider: every title is a drama, and everything is similar to
/// titles 123 and 124
struct FakeProvider;

fn fake_metadata(id: u64) -> ContentMetadata {
    ContentMetadata {
        title: format!("Title {}", id),
        poster_path: None,
        genre_ids: vec![18],
        popularity: 42.0,
        vote_average: 7.1,
        release_date: NaiveDate::from_ymd_opt(2015, 6, 1),
        runtime: Some(110),
    }
}

#[async_trait::async_trait]
impl MetadataProvider for FakeProvider {
    async fn fetch_metadata(&self, id: u64, _media_type: MediaType) -> AppResult<ContentMetadata> {
        if id == 404 {
            return Err(AppError::NotFound("no such title".to_string()));
        }
        Ok(fake_metadata(id))
    }

    async fn fetch_similar(&self, _id: u64, media_type: MediaType) -> AppResult<Vec<Title>> {
        Ok([123, 124]
            .into_iter()
            .map(|id| Title {
                id,
                media_type,
                metadata: fake_metadata(id),
            })
            .collect())
    }

    async fn fetch_providers(&self, _id: u64, _media_type: MediaType) -> AppResult<Vec<String>> {
        Ok(vec!["Netflix".to_string(), "Hulu".to_string()])
    }

    fn name(&self) -> &'static str {
        "fake"
    }
}

async fn create_test_server() -> TestServer {
    let state = AppState::build(
        &Config::default(),
        Arc::new(MemoryStorage::new()),
        Arc::new(FakeProvider),
        Arc::new(SystemClock),
    )
    .await
    .unwrap();
    TestServer::new(create_router(state)).unwrap()
}

async fn add_fight_club(server: &TestServer, status: &str) -> Value {
    let response = server
        .post("/api/v1/watchlist")
        .json(&json!({
            "id": 550,
            "mediaType": "movie",
            "status": status,
            "metadata": { "title": "Fight Club", "genreIds": [18, 53] }
        }))
        .await;
    response.assert_status(StatusCode::CREATED);
    response.json()
}

#[tokio::test]
async fn test_health_check() {
    let server = create_test_server().await;
    let response = server.get("/health").await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["status"], "healthy");
}

#[tokio::test]
async fn test_add_to_watchlist() {
    let server = create_test_server().await;
    let item = add_fight_club(&server, "want_to_watch").await;

    assert_eq!(item["id"], 550);
    assert_eq!(item["mediaType"], "movie");
    assert_eq!(item["status"], "want_to_watch");
    assert_eq!(item["rating"], 0);
    assert_eq!(item["version"], 1);
    assert_eq!(item["syncStatus"], "pending_sync");
    assert!(item["watchedAt"].is_null());
}

#[tokio::test]
async fn test_add_twice_updates() {
    let server = create_test_server().await;
    add_fight_club(&server, "want_to_watch").await;
    let item = add_fight_club(&server, "watched").await;

    assert_eq!(item["version"], 2);
    assert!(!item["watchedAt"].is_null());

    let items: Vec<Value> = server.get("/api/v1/watchlist").await.json();
    assert_eq!(items.len(), 1);
}

#[tokio::test]
async fn test_add_without_metadata_uses_provider() {
    let server = create_test_server().await;
    let response = server
        .post("/api/v1/watchlist")
        .json(&json!({ "id": 77, "mediaType": "series" }))
        .await;

    response.assert_status(StatusCode::CREATED);
    let item: Value = response.json();
    assert_eq!(item["mediaType"], "series");
    assert_eq!(item["metadata"]["title"], "Title 77");
    assert_eq!(item["status"], "want_to_watch");
}

#[tokio::test]
async fn test_add_unknown_title_is_not_found() {
    let server = create_test_server().await;
    let response = server
        .post("/api/v1/watchlist")
        .json(&json!({ "id": 404, "mediaType": "movie" }))
        .await;
    response.assert_status(StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_add_rejects_invalid_input() {
    let server = create_test_server().await;

    let response = server
        .post("/api/v1/watchlist")
        .json(&json!({
            "id": 0,
            "mediaType": "movie",
            "metadata": { "title": "Nothing" }
        }))
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);
    let body: Value = response.json();
    assert!(body["error"].is_string());

    let response = server
        .post("/api/v1/watchlist")
        .json(&json!({
            "id": 1,
            "mediaType": "movie",
            "status": "abandoned",
            "metadata": { "title": "Nothing" }
        }))
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_status_transitions_stamp_watched_at() {
    let server = create_test_server().await;
    add_fight_club(&server, "want_to_watch").await;

    let watched: Value = server
        .patch("/api/v1/watchlist/movie/550")
        .json(&json!({ "status": "watched" }))
        .await
        .json();
    assert!(!watched["watchedAt"].is_null());

    let unwatched: Value = server
        .patch("/api/v1/watchlist/movie/550")
        .json(&json!({ "status": "want_to_watch" }))
        .await
        .json();
    assert!(unwatched["watchedAt"].is_null());
    assert_eq!(unwatched["version"], 3);
}

#[tokio::test]
async fn test_patch_rejects_bad_rating() {
    let server = create_test_server().await;
    add_fight_club(&server, "watched").await;

    let response = server
        .patch("/api/v1/watchlist/movie/550")
        .json(&json!({ "rating": 5 }))
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_patch_missing_item_is_not_found() {
    let server = create_test_server().await;
    let response = server
        .patch("/api/v1/watchlist/movie/1")
        .json(&json!({ "rating": 1 }))
        .await;
    response.assert_status(StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_unknown_media_type_is_bad_request() {
    let server = create_test_server().await;
    let response = server.delete("/api/v1/watchlist/podcast/550").await;
    response.assert_status(StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_list_filters_by_status() {
    let server = create_test_server().await;
    add_fight_club(&server, "watched").await;
    server
        .post("/api/v1/watchlist")
        .json(&json!({ "id": 13, "mediaType": "movie" }))
        .await
        .assert_status(StatusCode::CREATED);

    let watched: Vec<Value> = server
        .get("/api/v1/watchlist")
        .add_query_param("status", "watched")
        .await
        .json();
    assert_eq!(watched.len(), 1);
    assert_eq!(watched[0]["id"], 550);

    let stats: Value = server.get("/api/v1/watchlist/stats").await.json();
    assert_eq!(stats["total"], 2);
    assert_eq!(stats["watched"], 1);
    assert_eq!(stats["wantToWatch"], 1);
    assert_eq!(stats["pendingSync"], 2);
}

#[tokio::test]
async fn test_remove_from_watchlist() {
    let server = create_test_server().await;
    add_fight_club(&server, "want_to_watch").await;

    server
        .delete("/api/v1/watchlist/movie/550")
        .await
        .assert_status(StatusCode::NO_CONTENT);
    server
        .delete("/api/v1/watchlist/movie/550")
        .await
        .assert_status(StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_mark_synced_keeps_version() {
    let server = create_test_server().await;
    add_fight_club(&server, "want_to_watch").await;

    let response = server.post("/api/v1/watchlist/movie/550/synced").await;
    response.assert_status_ok();
    let item: Value = response.json();
    assert_eq!(item["syncStatus"], "synced");
    assert_eq!(item["version"], 1);
    assert!(!item["lastSyncedAt"].is_null());
}

#[tokio::test]
async fn test_recommendations_and_dismissal() {
    let server = create_test_server().await;
    add_fight_club(&server, "watched").await;
    server
        .patch("/api/v1/watchlist/movie/550")
        .json(&json!({ "rating": 1 }))
        .await
        .assert_status_ok();

    let entry: Value = server.get("/api/v1/recommendations").await.json();
    let ids: Vec<u64> = entry["items"]
        .as_array()
        .unwrap()
        .iter()
        .map(|item| item["id"].as_u64().unwrap())
        .collect();
    assert_eq!(ids.len(), 2);
    assert!(ids.contains(&123));
    assert_eq!(entry["items"][0]["source"], "similar");
    assert_eq!(entry["items"][0]["reason"], "Similar to Fight Club");
    assert_eq!(entry["basedOn"]["likedIds"][0]["id"], 550);

    server
        .post("/api/v1/recommendations/dismiss")
        .json(&json!({ "id": 123, "mediaType": "movie" }))
        .await
        .assert_status_ok();

    let entry: Value = server.get("/api/v1/recommendations").await.json();
    let ids: Vec<u64> = entry["items"]
        .as_array()
        .unwrap()
        .iter()
        .map(|item| item["id"].as_u64().unwrap())
        .collect();
    assert_eq!(ids, vec![124]);
}

#[tokio::test]
async fn test_empty_watchlist_has_no_recommendations() {
    let server = create_test_server().await;
    let entry: Value = server.get("/api/v1/recommendations").await.json();
    assert!(entry["items"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_title_providers_are_cached() {
    let server = create_test_server().await;

    let body: Value = server.get("/api/v1/titles/tv/1399/providers").await.json();
    assert_eq!(body["mediaType"], "series");
    assert_eq!(body["services"], json!(["Netflix", "Hulu"]));

    let stats: Value = server.get("/api/v1/cache/stats").await.json();
    assert_eq!(stats["count"], 1);
    assert!(stats["approxSizeBytes"].as_u64().unwrap() > 0);
}
