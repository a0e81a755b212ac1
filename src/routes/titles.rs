use axum::{
    extract::{Path, State},
    Json,
};
use serde::Serialize;

use crate::{error::AppResult, models::MediaType};

use super::{media_type, AppState};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProvidersResponse {
    pub id: u64,
    pub media_type: MediaType,
    pub services: Vec<String>,
}

/// Streaming services a title is available on
pub async fn providers(
    State(state): State<AppState>,
    Path((segment, id)): Path<(String, u64)>,
) -> AppResult<Json<ProvidersResponse>> {
    let media_type = media_type(&segment)?;
    let services = state.provider.fetch_providers(id, media_type).await?;
    Ok(Json(ProvidersResponse {
        id,
        media_type,
        services,
    }))
}
