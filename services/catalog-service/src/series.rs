//! Series creation against a table whose column set is only known at runtime.
//!
//! Each failed insert teaches the loop something about the deployed schema:
//! unknown columns are dropped from the payload, a NOT NULL violation puts a
//! dropped column back, and a slug collision rerolls the slug suffix. The loop
//! gives up after [`MAX_INSERT_ATTEMPTS`].

use rand::Rng;
use serde_json::{Map, Value};
use std::{collections::BTreeSet, fmt};
use tokio_postgres::error::SqlState;

use crate::backend::{Backend, DriverError, Row, SCHEMA_CACHE_MISS};
use crate::classify::extract_missing_column;
use crate::slug;

pub const SERIES_TABLE: &str = "series";
pub const MAX_INSERT_ATTEMPTS: usize = 12;
/// Owner reference column candidates, in the order they are tried.
pub const OWNER_COLUMNS: [&str; 3] = ["owner_id", "user_id", "creator_id"];
const TITLE_COLUMNS: [&str; 2] = ["title", "name"];
const SLUG_SUFFIX_MAX: u32 = 9999;

pub struct NewSeries {
    pub owner: String,
    pub title_raw: String,
    pub title_clean: String,
    pub slug: String,
    pub description: Option<String>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct CreatedSeries {
    pub id: String,
    pub title_clean: String,
    pub slug: String,
}

#[derive(Debug)]
pub enum InsertFailure {
    /// The driver reported something the loop cannot adapt to.
    Driver(DriverError),
    MaxAttempts { missing: Vec<String> },
    OwnerColumnUnresolved,
    /// The insert succeeded without an id and the follow-up lookup found nothing.
    IdUnrecoverable,
}

impl fmt::Display for InsertFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InsertFailure::Driver(err) => write!(f, "series insert failed: {err}"),
            InsertFailure::MaxAttempts { missing } => write!(
                f,
                "series insert gave up after {MAX_INSERT_ATTEMPTS} attempts (missing columns: {})",
                missing.join(", ")
            ),
            InsertFailure::OwnerColumnUnresolved => {
                write!(f, "series table has none of {}", OWNER_COLUMNS.join(", "))
            }
            InsertFailure::IdUnrecoverable => write!(f, "series inserted but id was not returned"),
        }
    }
}

enum Adjustment {
    Retry,
    Abort,
}

/// What the loop currently believes about the deployed `series` table.
struct SchemaGuess {
    missing: BTreeSet<String>,
    slug: String,
    slug_dropped: bool,
}

impl SchemaGuess {
    fn new(slug: &str) -> Self {
        Self {
            missing: BTreeSet::new(),
            slug: slug.to_string(),
            slug_dropped: false,
        }
    }

    fn has(&self, column: &str) -> bool {
        !self.missing.contains(column)
    }

    fn owner_column(&self) -> Option<&'static str> {
        OWNER_COLUMNS.into_iter().find(|column| self.has(column))
    }

    fn title_column(&self) -> Option<&'static str> {
        TITLE_COLUMNS.into_iter().find(|column| self.has(column))
    }

    fn payload(&self, series: &NewSeries, owner_column: &str) -> Row {
        let mut row = Map::new();
        let mut put = |column: &str, value: &str| {
            if self.has(column) {
                row.insert(column.to_string(), Value::String(value.to_string()));
            }
        };

        if let Some(description) = series.description.as_deref().map(str::trim) {
            if !description.is_empty() {
                put("description", description);
            }
        }
        put(owner_column, series.owner.as_str());
        put("slug", self.slug.as_str());
        put("title_clean", series.title_clean.as_str());
        put("title_raw", series.title_raw.as_str());
        if let Some(column) = self.title_column() {
            put(column, series.title_clean.as_str());
        }
        row
    }

    fn mark_missing(&mut self, column: String) {
        if column == "slug" {
            self.slug_dropped = true;
        }
        self.missing.insert(column);
    }

    fn adjust(&mut self, err: &DriverError, base_slug: &str) -> Adjustment {
        let Some(code) = err.code() else {
            return Adjustment::Abort;
        };

        if code == SqlState::UNIQUE_VIOLATION.code() {
            if !self.has("slug") || !err.mentions("slug") {
                return Adjustment::Abort;
            }
            let suffix = rand::thread_rng().gen_range(0..=SLUG_SUFFIX_MAX);
            self.slug = slug::with_suffix(base_slug, suffix);
            return Adjustment::Retry;
        }

        if code == SCHEMA_CACHE_MISS || code == SqlState::UNDEFINED_COLUMN.code() {
            return match extract_missing_column(err) {
                Some(column) => {
                    self.mark_missing(column);
                    Adjustment::Retry
                }
                None => Adjustment::Abort,
            };
        }

        if code == SqlState::NOT_NULL_VIOLATION.code() {
            // Only a column we dropped earlier can be put back.
            return match extract_missing_column(err) {
                Some(column) if self.missing.remove(&column) => Adjustment::Retry,
                _ => Adjustment::Abort,
            };
        }

        Adjustment::Abort
    }

    fn reported_slug(&self, intended: &str) -> String {
        if self.slug_dropped {
            intended.to_string()
        } else {
            self.slug.clone()
        }
    }

    fn missing_list(&self) -> Vec<String> {
        self.missing.iter().cloned().collect()
    }

    fn created(&self, id: String, series: &NewSeries) -> CreatedSeries {
        CreatedSeries {
            id,
            title_clean: series.title_clean.clone(),
            slug: self.reported_slug(&series.slug),
        }
    }
}

pub async fn insert_series(
    backend: &dyn Backend,
    series: &NewSeries,
) -> Result<CreatedSeries, InsertFailure> {
    let mut guess = SchemaGuess::new(&series.slug);

    for attempt in 1..=MAX_INSERT_ATTEMPTS {
        let Some(owner_column) = guess.owner_column() else {
            tracing::error!(missing = ?guess.missing, "no owner column left to try");
            return Err(InsertFailure::OwnerColumnUnresolved);
        };
        let row = guess.payload(series, owner_column);
        tracing::debug!(
            attempt,
            columns = ?row.keys().collect::<Vec<_>>(),
            "series insert attempt"
        );

        let err = match backend.insert_returning_id(SERIES_TABLE, &row).await {
            Ok(Some(id)) => return Ok(guess.created(id, series)),
            Ok(None) => {
                let id = recover_id(backend, &row, owner_column).await?;
                return Ok(guess.created(id, series));
            }
            Err(err) => err,
        };

        match guess.adjust(&err, &series.slug) {
            Adjustment::Retry => {
                tracing::info!(
                    attempt,
                    code = err.code().unwrap_or(""),
                    missing = ?guess.missing,
                    slug = guess.slug.as_str(),
                    "series insert adapting to schema"
                );
            }
            Adjustment::Abort => {
                tracing::warn!(attempt, error = %err, "series insert failed");
                return Err(InsertFailure::Driver(err));
            }
        }
    }

    tracing::error!(
        attempts = MAX_INSERT_ATTEMPTS,
        missing = ?guess.missing,
        "series insert did not converge"
    );
    Err(InsertFailure::MaxAttempts {
        missing: guess.missing_list(),
    })
}

/// Finds the row just inserted by the first filter the table is known to
/// accept, newest first.
async fn recover_id(
    backend: &dyn Backend,
    row: &Row,
    owner_column: &str,
) -> Result<String, InsertFailure> {
    let preference = [
        owner_column,
        "slug",
        "title_clean",
        "title_raw",
        "title",
        "name",
    ];
    let (column, value) = preference
        .into_iter()
        .find_map(|column| {
            row.get(column)
                .and_then(Value::as_str)
                .map(|value| (column, value))
        })
        .ok_or(InsertFailure::IdUnrecoverable)?;

    tracing::info!(column, "insert returned no id, looking the row up");
    backend
        .latest_id_where(SERIES_TABLE, column, value)
        .await
        .map_err(InsertFailure::Driver)?
        .ok_or(InsertFailure::IdUnrecoverable)
}
