use axum::{
    routing::{delete, get, post},
    Router,
};
use tower_http::trace::TraceLayer;

use crate::handlers::{create_episode, create_season, create_series, delete_video, healthz, readyz};
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/api/series", post(create_series))
        .route("/api/seasons", post(create_season))
        .route("/api/episodes", post(create_episode))
        .route("/api/videos/:id", delete(delete_video))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
