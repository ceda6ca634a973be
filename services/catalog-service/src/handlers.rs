use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};

use crate::models::{CreateEpisodeRequest, CreateSeasonRequest, CreateSeriesRequest};
use crate::service::{self, ServiceError};
use crate::state::AppState;

pub async fn healthz() -> StatusCode {
    StatusCode::OK
}

pub async fn readyz() -> StatusCode {
    StatusCode::OK
}

// Bodies are extracted as `Result` so the bearer check answers before any
// body rejection does.
fn read_body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, ServiceError> {
    payload
        .map(|Json(body)| body)
        .map_err(ServiceError::invalid_body)
}

pub async fn create_series(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<CreateSeriesRequest>, JsonRejection>,
) -> impl IntoResponse {
    let caller = match service::authenticate(&state, &headers).await {
        Ok(caller) => caller,
        Err(err) => return (err.status, Json(err.body)).into_response(),
    };
    let payload = match read_body(payload) {
        Ok(payload) => payload,
        Err(err) => return (err.status, Json(err.body)).into_response(),
    };
    match service::create_series(&state, caller, payload).await {
        Ok(response) => (StatusCode::OK, Json(response)).into_response(),
        Err(err) => (err.status, Json(err.body)).into_response(),
    }
}

pub async fn create_season(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<CreateSeasonRequest>, JsonRejection>,
) -> impl IntoResponse {
    let caller = match service::authenticate(&state, &headers).await {
        Ok(caller) => caller,
        Err(err) => return (err.status, Json(err.body)).into_response(),
    };
    let payload = match read_body(payload) {
        Ok(payload) => payload,
        Err(err) => return (err.status, Json(err.body)).into_response(),
    };
    match service::create_season(&state, caller, payload).await {
        Ok(response) => (StatusCode::CREATED, Json(response)).into_response(),
        Err(err) => (err.status, Json(err.body)).into_response(),
    }
}

pub async fn create_episode(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<CreateEpisodeRequest>, JsonRejection>,
) -> impl IntoResponse {
    let caller = match service::authenticate(&state, &headers).await {
        Ok(caller) => caller,
        Err(err) => return (err.status, Json(err.body)).into_response(),
    };
    let payload = match read_body(payload) {
        Ok(payload) => payload,
        Err(err) => return (err.status, Json(err.body)).into_response(),
    };
    match service::create_episode(&state, caller, payload).await {
        Ok(response) => (StatusCode::CREATED, Json(response)).into_response(),
        Err(err) => (err.status, Json(err.body)).into_response(),
    }
}

pub async fn delete_video(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(video_id): Path<String>,
) -> impl IntoResponse {
    let caller = match service::authenticate(&state, &headers).await {
        Ok(caller) => caller,
        Err(err) => return (err.status, Json(err.body)).into_response(),
    };
    match service::delete_video(&state, caller, video_id).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => (err.status, Json(err.body)).into_response(),
    }
}
