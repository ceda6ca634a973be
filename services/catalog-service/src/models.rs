use serde::{Deserialize, Serialize};

#[derive(Deserialize)]
pub struct CreateSeriesRequest {
    pub title_raw: Option<String>,
    pub title_clean: Option<String>,
    pub slug: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SeriesSummary {
    pub id: String,
    pub title_clean: String,
    pub slug: String,
}

#[derive(Debug, Serialize)]
pub struct CreateSeriesResponse {
    pub series: SeriesSummary,
}

#[derive(Deserialize)]
pub struct CreateSeasonRequest {
    pub series_id: Option<String>,
    pub season_number: Option<i64>,
    pub title: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SeasonSummary {
    pub id: String,
    pub series_id: String,
}

#[derive(Debug, Serialize)]
pub struct CreateSeasonResponse {
    pub season: SeasonSummary,
}

#[derive(Deserialize)]
pub struct CreateEpisodeRequest {
    pub season_id: Option<String>,
    pub episode_number: Option<i64>,
    pub title: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct EpisodeSummary {
    pub id: String,
    pub season_id: String,
}

#[derive(Debug, Serialize)]
pub struct CreateEpisodeResponse {
    pub episode: EpisodeSummary,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}
