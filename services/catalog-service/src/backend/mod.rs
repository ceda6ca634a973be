//! Table access against the hosted database, either through PostgREST or a
//! direct Postgres connection. Both report failures as [`DriverError`] so the
//! callers never care which one is wired in.

mod postgres;
mod rest;

#[cfg(test)]
pub mod mock;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::fmt;

pub use postgres::PostgresBackend;
pub use rest::{RestBackend, RestConfig};

pub type Row = Map<String, Value>;

/// PostgREST's "column not in schema cache" error.
pub const SCHEMA_CACHE_MISS: &str = "PGRST204";

/// Error as reported by the database driver. Transport failures carry no code.
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
pub struct DriverError {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub details: Option<String>,
    #[serde(default)]
    pub hint: Option<String>,
}

impl DriverError {
    pub fn coded(code: &str, message: impl Into<String>) -> Self {
        Self {
            code: Some(code.to_string()),
            message: Some(message.into()),
            ..Self::default()
        }
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
            ..Self::default()
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn code(&self) -> Option<&str> {
        self.code.as_deref()
    }

    /// True when any text field mentions `needle`.
    pub fn mentions(&self, needle: &str) -> bool {
        [&self.message, &self.details, &self.hint]
            .into_iter()
            .flatten()
            .any(|text| text.contains(needle))
    }
}

impl fmt::Display for DriverError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(code) = &self.code {
            write!(f, "[{code}] ")?;
        }
        write!(f, "{}", self.message.as_deref().unwrap_or("unknown driver error"))?;
        if let Some(details) = &self.details {
            write!(f, " ({details})")?;
        }
        Ok(())
    }
}

impl std::error::Error for DriverError {}

#[async_trait]
pub trait Backend: Send + Sync {
    /// Inserts one row; `Ok(None)` when the insert went through but no id came
    /// back.
    async fn insert_returning_id(&self, table: &str, row: &Row)
        -> Result<Option<String>, DriverError>;

    /// Id of the newest row (by `created_at`) whose `column` equals `value`.
    async fn latest_id_where(
        &self,
        table: &str,
        column: &str,
        value: &str,
    ) -> Result<Option<String>, DriverError>;

    async fn fetch_row(&self, table: &str, id: &str) -> Result<Option<Row>, DriverError>;

    /// Returns whether a row was removed.
    async fn delete_row(&self, table: &str, id: &str) -> Result<bool, DriverError>;
}

/// Ids come back as text, numbers or uuids depending on the table.
pub(crate) fn id_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(text) if !text.is_empty() => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        _ => None,
    }
}
