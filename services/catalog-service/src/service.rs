use axum::extract::rejection::JsonRejection;
use axum::http::{HeaderMap, StatusCode};
use serde_json::{Map, Value};

use crate::auth::{
    bearer_token, ensure_owner, OwnershipError, Resource, EPISODES_TABLE, SEASONS_TABLE,
};
use crate::backend::DriverError;
use crate::models::{
    CreateEpisodeRequest, CreateEpisodeResponse, CreateSeasonRequest, CreateSeasonResponse,
    CreateSeriesRequest, CreateSeriesResponse, EpisodeSummary, ErrorResponse, SeasonSummary,
    SeriesSummary,
};
use crate::series::{insert_series, InsertFailure, NewSeries};
use crate::slug::{generate_series_slug, slugify};
use crate::state::AppState;

pub struct ServiceError {
    pub status: StatusCode,
    pub body: ErrorResponse,
}

impl ServiceError {
    pub fn new(status: StatusCode, code: &str, message: impl Into<String>) -> Self {
        Self {
            status,
            body: ErrorResponse {
                message: message.into(),
                code: Some(code.to_string()),
                details: None,
            },
        }
    }

    fn with_details(mut self, details: impl Into<String>) -> Self {
        self.body.details = Some(details.into());
        self
    }

    fn driver(err: DriverError) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            body: ErrorResponse {
                message: err
                    .message
                    .unwrap_or_else(|| "database request failed".to_string()),
                code: err.code,
                details: err.details,
            },
        }
    }

    /// Request body that could not be read as the expected JSON shape.
    pub fn invalid_body(rejection: JsonRejection) -> Self {
        tracing::warn!(error = %rejection.body_text(), "request body rejected");
        Self::new(StatusCode::BAD_REQUEST, "invalid_body", rejection.body_text())
    }

    fn missing_fields(fields: &[&str]) -> Self {
        Self::new(
            StatusCode::BAD_REQUEST,
            "missing_fields",
            format!("{} required", fields.join(", ")),
        )
    }
}

impl From<InsertFailure> for ServiceError {
    fn from(failure: InsertFailure) -> Self {
        let message = failure.to_string();
        match failure {
            InsertFailure::Driver(err) => ServiceError::driver(err),
            InsertFailure::MaxAttempts { missing } => ServiceError::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                "max_attempts",
                "series insert did not converge",
            )
            .with_details(format!("missing columns: {}", missing.join(", "))),
            InsertFailure::OwnerColumnUnresolved => ServiceError::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                "owner_column_unresolved",
                message,
            ),
            InsertFailure::IdUnrecoverable => {
                ServiceError::new(StatusCode::INTERNAL_SERVER_ERROR, "id_unrecoverable", message)
            }
        }
    }
}

impl From<OwnershipError> for ServiceError {
    fn from(err: OwnershipError) -> Self {
        match err {
            OwnershipError::NotFound(table) => ServiceError::new(
                StatusCode::NOT_FOUND,
                "not_found",
                format!("{table} entry not found"),
            ),
            OwnershipError::Forbidden => ServiceError::new(
                StatusCode::FORBIDDEN,
                "forbidden",
                "caller does not own this resource",
            ),
            OwnershipError::Driver(err) => {
                tracing::error!(error = %err, "ownership lookup failed");
                ServiceError::driver(err)
            }
        }
    }
}

/// Resolves the caller from the bearer token before any table is touched.
pub async fn authenticate(state: &AppState, headers: &HeaderMap) -> Result<String, ServiceError> {
    let Some(token) = bearer_token(headers) else {
        tracing::warn!("request without bearer token rejected");
        return Err(ServiceError::new(
            StatusCode::UNAUTHORIZED,
            "auth_required",
            "authentication required",
        ));
    };

    match state.identity.resolve(token).await {
        Ok(Some(user_id)) => Ok(user_id),
        Ok(None) => {
            tracing::warn!("bearer token rejected");
            Err(ServiceError::new(
                StatusCode::UNAUTHORIZED,
                "invalid_token",
                "invalid or expired token",
            ))
        }
        Err(err) => {
            tracing::error!(error = %err, "identity lookup failed");
            Err(ServiceError::new(
                StatusCode::UNAUTHORIZED,
                "invalid_token",
                "could not verify token",
            ))
        }
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

pub async fn create_series(
    state: &AppState,
    caller: String,
    payload: CreateSeriesRequest,
) -> Result<CreateSeriesResponse, ServiceError> {
    let CreateSeriesRequest {
        title_raw,
        title_clean,
        slug,
        description,
    } = payload;
    let (Some(title_raw), Some(title_clean)) = (non_blank(title_raw), non_blank(title_clean))
    else {
        return Err(ServiceError::missing_fields(&["title_raw", "title_clean"]));
    };

    let slug = slug
        .map(|requested| slugify(&requested))
        .filter(|requested| !requested.is_empty())
        .unwrap_or_else(|| generate_series_slug(&title_clean));

    let new_series = NewSeries {
        owner: caller,
        title_raw,
        title_clean,
        slug,
        description,
    };
    let created = insert_series(state.backend.as_ref(), &new_series).await?;

    tracing::info!(
        series_id = created.id.as_str(),
        slug = created.slug.as_str(),
        owner = new_series.owner.as_str(),
        "series created"
    );
    Ok(CreateSeriesResponse {
        series: SeriesSummary {
            id: created.id,
            title_clean: created.title_clean,
            slug: created.slug,
        },
    })
}

async fn insert_child(
    state: &AppState,
    table: &str,
    row: Map<String, Value>,
) -> Result<String, ServiceError> {
    match state.backend.insert_returning_id(table, &row).await {
        Ok(Some(id)) => Ok(id),
        Ok(None) => Err(ServiceError::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "id_unrecoverable",
            format!("{table} insert returned no id"),
        )),
        Err(err) => {
            tracing::error!(table, error = %err, "insert failed");
            Err(ServiceError::driver(err))
        }
    }
}

pub async fn create_season(
    state: &AppState,
    caller: String,
    payload: CreateSeasonRequest,
) -> Result<CreateSeasonResponse, ServiceError> {
    let Some(series_id) = non_blank(payload.series_id) else {
        return Err(ServiceError::missing_fields(&["series_id"]));
    };
    ensure_owner(
        state.backend.as_ref(),
        Resource::Series(series_id.clone()),
        &caller,
    )
    .await?;

    let mut row = Map::new();
    row.insert("series_id".to_string(), Value::String(series_id.clone()));
    if let Some(number) = payload.season_number {
        row.insert("season_number".to_string(), Value::from(number));
    }
    if let Some(title) = non_blank(payload.title) {
        row.insert("title".to_string(), Value::String(title));
    }

    let id = insert_child(state, SEASONS_TABLE, row).await?;
    tracing::info!(season_id = id.as_str(), series_id = series_id.as_str(), "season created");
    Ok(CreateSeasonResponse {
        season: SeasonSummary { id, series_id },
    })
}

pub async fn create_episode(
    state: &AppState,
    caller: String,
    payload: CreateEpisodeRequest,
) -> Result<CreateEpisodeResponse, ServiceError> {
    let Some(season_id) = non_blank(payload.season_id) else {
        return Err(ServiceError::missing_fields(&["season_id"]));
    };
    ensure_owner(
        state.backend.as_ref(),
        Resource::Season(season_id.clone()),
        &caller,
    )
    .await?;

    let mut row = Map::new();
    row.insert("season_id".to_string(), Value::String(season_id.clone()));
    if let Some(number) = payload.episode_number {
        row.insert("episode_number".to_string(), Value::from(number));
    }
    if let Some(title) = non_blank(payload.title) {
        row.insert("title".to_string(), Value::String(title));
    }

    let id = insert_child(state, EPISODES_TABLE, row).await?;
    tracing::info!(episode_id = id.as_str(), season_id = season_id.as_str(), "episode created");
    Ok(CreateEpisodeResponse {
        episode: EpisodeSummary { id, season_id },
    })
}

pub async fn delete_video(
    state: &AppState,
    caller: String,
    video_id: String,
) -> Result<(), ServiceError> {
    let video = Resource::Video(video_id.clone());
    let table = video.table();
    ensure_owner(state.backend.as_ref(), video, &caller).await?;

    let removed = state
        .backend
        .delete_row(table, &video_id)
        .await
        .map_err(|err| {
            tracing::error!(error = %err, "delete video failed");
            ServiceError::driver(err)
        })?;
    if !removed {
        return Err(ServiceError::new(
            StatusCode::NOT_FOUND,
            "not_found",
            "videos entry not found",
        ));
    }

    tracing::info!(video_id = video_id.as_str(), "video deleted");
    Ok(())
}
