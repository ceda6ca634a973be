use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use serde_json::Value;
use std::time::Duration;

use super::{id_to_string, Backend, DriverError, Row};

#[derive(Clone)]
pub struct RestConfig {
    pub base_url: String,
    pub api_key: String,
    pub timeout: Duration,
}

/// PostgREST client for the Supabase `rest/v1` endpoint.
#[derive(Clone)]
pub struct RestBackend {
    client: Client,
    base_url: String,
    api_key: String,
}

impl RestBackend {
    pub fn new(config: RestConfig) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(config.timeout).build()?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key,
        })
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.base_url, table)
    }

    fn authorized(&self, builder: RequestBuilder) -> RequestBuilder {
        builder
            .header("apikey", self.api_key.as_str())
            .bearer_auth(self.api_key.as_str())
    }

    async fn send(&self, builder: RequestBuilder) -> Result<String, DriverError> {
        let response = self
            .authorized(builder)
            .send()
            .await
            .map_err(|err| DriverError::transport(format!("postgrest request failed: {err}")))?;
        if !response.status().is_success() {
            return Err(failure(response).await);
        }
        response
            .text()
            .await
            .map_err(|err| DriverError::transport(format!("postgrest body read failed: {err}")))
    }
}

async fn failure(response: Response) -> DriverError {
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    parse_error_body(status, &body)
}

/// PostgREST reports `{code, message, details, hint}`; anything else becomes a
/// codeless transport error.
pub fn parse_error_body(status: u16, body: &str) -> DriverError {
    match serde_json::from_str::<DriverError>(body) {
        Ok(err) if err.code.is_some() || err.message.is_some() => err,
        _ => {
            let err = DriverError::transport(format!("postgrest returned status {status}"));
            if body.trim().is_empty() {
                err
            } else {
                err.with_details(body.trim())
            }
        }
    }
}

fn rows(body: &str) -> Vec<Row> {
    match serde_json::from_str::<Value>(body) {
        Ok(Value::Array(items)) => items
            .into_iter()
            .filter_map(|item| match item {
                Value::Object(map) => Some(map),
                _ => None,
            })
            .collect(),
        Ok(Value::Object(map)) => vec![map],
        _ => Vec::new(),
    }
}

/// Id of the first returned row, if the body carried one.
pub fn first_id(body: &str) -> Option<String> {
    rows(body)
        .first()
        .and_then(|row| row.get("id"))
        .and_then(id_to_string)
}

fn eq(value: &str) -> String {
    format!("eq.{value}")
}

#[async_trait]
impl Backend for RestBackend {
    async fn insert_returning_id(
        &self,
        table: &str,
        row: &Row,
    ) -> Result<Option<String>, DriverError> {
        let builder = self
            .client
            .post(self.table_url(table))
            .query(&[("select", "id")])
            .header("Prefer", "return=representation")
            .json(row);
        let body = self.send(builder).await?;
        Ok(first_id(&body))
    }

    async fn latest_id_where(
        &self,
        table: &str,
        column: &str,
        value: &str,
    ) -> Result<Option<String>, DriverError> {
        let filter = eq(value);
        let builder = self.client.get(self.table_url(table)).query(&[
            ("select", "id"),
            (column, filter.as_str()),
            ("order", "created_at.desc"),
            ("limit", "1"),
        ]);
        let body = self.send(builder).await?;
        Ok(first_id(&body))
    }

    async fn fetch_row(&self, table: &str, id: &str) -> Result<Option<Row>, DriverError> {
        let filter = eq(id);
        let builder = self.client.get(self.table_url(table)).query(&[
            ("select", "*"),
            ("id", filter.as_str()),
            ("limit", "1"),
        ]);
        let body = self.send(builder).await?;
        Ok(rows(&body).into_iter().next())
    }

    async fn delete_row(&self, table: &str, id: &str) -> Result<bool, DriverError> {
        let filter = eq(id);
        let builder = self
            .client
            .delete(self.table_url(table))
            .query(&[("id", filter.as_str()), ("select", "id")])
            .header("Prefer", "return=representation");
        let body = self.send(builder).await?;
        Ok(!rows(&body).is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_postgrest_error_body() {
        let body = r#"{"code":"PGRST204","details":null,"hint":null,"message":"Could not find the 'owner_id' column of 'series' in the schema cache"}"#;
        let err = parse_error_body(400, body);
        assert_eq!(err.code(), Some("PGRST204"));
        assert!(err.mentions("'owner_id'"));
        assert_eq!(err.details, None);
    }

    #[test]
    fn non_json_error_keeps_body_as_details() {
        let err = parse_error_body(502, "bad gateway");
        assert_eq!(err.code(), None);
        assert_eq!(err.message.as_deref(), Some("postgrest returned status 502"));
        assert_eq!(err.details.as_deref(), Some("bad gateway"));
    }

    #[test]
    fn first_id_reads_representation() {
        assert_eq!(first_id(r#"[{"id":"abc"}]"#), Some("abc".to_string()));
        assert_eq!(first_id(r#"[{"id":7}]"#), Some("7".to_string()));
        assert_eq!(first_id("[]"), None);
        assert_eq!(first_id(""), None);
    }
}
