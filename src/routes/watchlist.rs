use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;

use crate::{
    error::{AppError, AppResult},
    models::{ContentMetadata, MediaType, WatchStatus, WatchlistItem, WatchlistPatch, WatchlistStats},
};

use super::{json_body, media_type, AppState};

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    status: Option<WatchStatus>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddRequest {
    pub id: u64,
    pub media_type: MediaType,
    /// Looked up from the metadata provider when omitted
    #[serde(default)]
    pub metadata: Option<ContentMetadata>,
    #[serde(default = "default_status")]
    pub status: WatchStatus,
}

fn default_status() -> WatchStatus {
    WatchStatus::WantToWatch
}

fn not_found(media_type: MediaType, id: u64) -> AppError {
    AppError::NotFound(format!("{}:{} is not on the watchlist", media_type, id))
}

/// Lists saved titles, optionally filtered by status
pub async fn list(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Json<Vec<WatchlistItem>> {
    let items = match query.status {
        Some(status) => state.watchlist.list_by_status(status).await,
        None => state.watchlist.all().await,
    };
    Json(items)
}

/// Saves a title; saving an already saved title updates it
pub async fn add(
    State(state): State<AppState>,
    payload: Result<Json<AddRequest>, JsonRejection>,
) -> AppResult<(StatusCode, Json<WatchlistItem>)> {
    let request = json_body(payload)?;
    let metadata = match request.metadata {
        Some(metadata) => metadata,
        None => {
            state
                .provider
                .fetch_metadata(request.id, request.media_type)
                .await?
        }
    };

    let item = state
        .watchlist
        .add(request.id, request.media_type, metadata, request.status)
        .await?;
    Ok((StatusCode::CREATED, Json(item)))
}

pub async fn stats(State(state): State<AppState>) -> Json<WatchlistStats> {
    Json(state.watchlist.stats().await)
}

/// Changes status, rating or metadata of a saved title
pub async fn update(
    State(state): State<AppState>,
    Path((segment, id)): Path<(String, u64)>,
    payload: Result<Json<WatchlistPatch>, JsonRejection>,
) -> AppResult<Json<WatchlistItem>> {
    let media_type = media_type(&segment)?;
    let patch = json_body(payload)?;
    state
        .watchlist
        .update(id, media_type, patch)
        .await?
        .map(Json)
        .ok_or_else(|| not_found(media_type, id))
}

pub async fn remove(
    State(state): State<AppState>,
    Path((segment, id)): Path<(String, u64)>,
) -> AppResult<StatusCode> {
    let media_type = media_type(&segment)?;
    if state.watchlist.remove(id, media_type).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(not_found(media_type, id))
    }
}

/// Acknowledges that a sync server has stored the current version
pub async fn mark_synced(
    State(state): State<AppState>,
    Path((segment, id)): Path<(String, u64)>,
) -> AppResult<Json<WatchlistItem>> {
    let media_type = media_type(&segment)?;
    state
        .watchlist
        .mark_synced(id, media_type)
        .await?
        .map(Json)
        .ok_or_else(|| not_found(media_type, id))
}
