use axum::{
    extract::{rejection::JsonRejection, State},
    Json,
};
use serde::Deserialize;

use crate::{
    error::AppResult,
    models::{DismissedItem, MediaType, RecommendationCacheEntry},
};

use super::{json_body, AppState};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DismissRequest {
    pub id: u64,
    pub media_type: MediaType,
}

/// Handler for recommendations endpoint
pub async fn get_recommendations(State(state): State<AppState>) -> Json<RecommendationCacheEntry> {
    let entry = state
        .recommendations
        .get_or_generate(state.provider.as_ref())
        .await;
    Json(entry)
}

/// Hides a title from recommendations
pub async fn dismiss(
    State(state): State<AppState>,
    payload: Result<Json<DismissRequest>, JsonRejection>,
) -> AppResult<Json<DismissedItem>> {
    let request = json_body(payload)?;
    let dismissed = state
        .recommendations
        .dismiss(request.id, request.media_type)
        .await?;
    Ok(Json(dismissed))
}
