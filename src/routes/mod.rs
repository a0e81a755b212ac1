use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};

use crate::{error::AppError, models::MediaType};

pub mod cache;
pub mod recommendations;
mod state;
pub mod titles;
pub mod watchlist;

pub use state::AppState;

/// Creates the application router with all routes
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .nest("/api/v1", api_routes())
        .with_state(state)
}

/// API routes under /api/v1
fn api_routes() -> Router<AppState> {
    Router::new()
        // Watchlist
        .route("/watchlist", get(watchlist::list).post(watchlist::add))
        .route("/watchlist/stats", get(watchlist::stats))
        .route(
            "/watchlist/:media_type/:id",
            axum::routing::patch(watchlist::update).delete(watchlist::remove),
        )
        .route("/watchlist/:media_type/:id/synced", post(watchlist::mark_synced))
        // Recommendations
        .route("/recommendations", get(recommendations::get_recommendations))
        .route("/recommendations/dismiss", post(recommendations::dismiss))
        // Titles
        .route("/titles/:media_type/:id/providers", get(titles::providers))
        // Cache
        .route("/cache/stats", get(cache::stats))
}

/// Health check endpoint
async fn health_check() -> (StatusCode, Json<Value>) {
    (StatusCode::OK, Json(json!({ "status": "healthy" })))
}

/// Unwraps a JSON body, reporting malformed input as a validation error
pub(crate) fn json_body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, AppError> {
    payload
        .map(|Json(body)| body)
        .map_err(|rejection| AppError::Validation(rejection.body_text()))
}

/// Parses the `:media_type` path segment
pub(crate) fn media_type(segment: &str) -> Result<MediaType, AppError> {
    segment.parse()
}
