use axum::{extract::State, Json};
use serde::Serialize;

use crate::db::CacheStats;

use super::AppState;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStatsResponse {
    #[serde(flatten)]
    pub cache: CacheStats,
    pub indexed_titles: usize,
    pub watchlist_revision: u64,
}

pub async fn stats(State(state): State<AppState>) -> Json<CacheStatsResponse> {
    Json(CacheStatsResponse {
        cache: state.cache.stats(),
        indexed_titles: state.index.len(),
        watchlist_revision: state.watchlist.revision(),
    })
}
