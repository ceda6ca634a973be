use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Mutex;
use tokio_postgres::Client;

use super::{Backend, DriverError, Row};

/// Direct Postgres access. Inserts go through `json_populate_record` so the
/// row can stay a JSON object while unknown columns still fail with `42703`.
pub struct PostgresBackend {
    db: Mutex<Client>,
}

impl PostgresBackend {
    pub fn new(client: Client) -> Self {
        Self {
            db: Mutex::new(client),
        }
    }
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

pub fn insert_sql(table: &str, columns: &[&str]) -> String {
    let table = quote_ident(table);
    if columns.is_empty() {
        return format!("INSERT INTO {table} DEFAULT VALUES RETURNING id::text AS id");
    }
    let columns = columns
        .iter()
        .map(|column| quote_ident(column))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "INSERT INTO {table} ({columns}) \
SELECT {columns} FROM json_populate_record(NULL::{table}, $1::json) \
RETURNING id::text AS id"
    )
}

pub fn latest_id_sql(table: &str, column: &str) -> String {
    format!(
        "SELECT id::text AS id FROM {} WHERE {}::text = $1 ORDER BY created_at DESC LIMIT 1",
        quote_ident(table),
        quote_ident(column)
    )
}

pub fn fetch_row_sql(table: &str) -> String {
    format!(
        "SELECT to_jsonb(t) AS row FROM {} t WHERE t.id::text = $1",
        quote_ident(table)
    )
}

pub fn delete_row_sql(table: &str) -> String {
    format!("DELETE FROM {} WHERE id::text = $1", quote_ident(table))
}

fn driver_error(err: tokio_postgres::Error) -> DriverError {
    match err.as_db_error() {
        Some(db_err) => DriverError {
            details: db_err.detail().map(str::to_string),
            hint: db_err.hint().map(str::to_string),
            ..DriverError::coded(db_err.code().code(), db_err.message())
        },
        None => DriverError::transport(err.to_string()),
    }
}

#[async_trait]
impl Backend for PostgresBackend {
    async fn insert_returning_id(
        &self,
        table: &str,
        row: &Row,
    ) -> Result<Option<String>, DriverError> {
        let columns: Vec<&str> = row.keys().map(String::as_str).collect();
        let sql = insert_sql(table, &columns);
        let payload = Value::Object(row.clone());

        let db = self.db.lock().await;
        let inserted = if columns.is_empty() {
            db.query_opt(sql.as_str(), &[]).await
        } else {
            db.query_opt(sql.as_str(), &[&payload]).await
        }
        .map_err(driver_error)?;

        Ok(inserted.and_then(|row| row.try_get::<_, Option<String>>("id").ok().flatten()))
    }

    async fn latest_id_where(
        &self,
        table: &str,
        column: &str,
        value: &str,
    ) -> Result<Option<String>, DriverError> {
        let sql = latest_id_sql(table, column);
        let db = self.db.lock().await;
        let row = db
            .query_opt(sql.as_str(), &[&value])
            .await
            .map_err(driver_error)?;
        Ok(row.and_then(|row| row.try_get::<_, Option<String>>("id").ok().flatten()))
    }

    async fn fetch_row(&self, table: &str, id: &str) -> Result<Option<Row>, DriverError> {
        let sql = fetch_row_sql(table);
        let db = self.db.lock().await;
        let row = db
            .query_opt(sql.as_str(), &[&id])
            .await
            .map_err(driver_error)?;
        Ok(row
            .and_then(|row| row.try_get::<_, Value>("row").ok())
            .and_then(|value| match value {
                Value::Object(map) => Some(map),
                _ => None,
            }))
    }

    async fn delete_row(&self, table: &str, id: &str) -> Result<bool, DriverError> {
        let sql = delete_row_sql(table);
        let db = self.db.lock().await;
        let removed = db
            .execute(sql.as_str(), &[&id])
            .await
            .map_err(driver_error)?;
        Ok(removed > 0)
    }
}
