use async_trait::async_trait;
use axum::http::{header::AUTHORIZATION, HeaderMap};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::{fmt, time::Duration};

use crate::backend::{id_to_string, Backend, DriverError, Row};
use crate::series::{OWNER_COLUMNS, SERIES_TABLE};

const SUPABASE_AUDIENCE: &str = "authenticated";
pub const VIDEOS_TABLE: &str = "videos";
pub const EPISODES_TABLE: &str = "episodes";
pub const SEASONS_TABLE: &str = "seasons";

pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?.trim();
    let (scheme, token) = value.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then_some(token)
}

#[derive(Debug)]
pub struct IdentityError(pub String);

impl fmt::Display for IdentityError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "identity lookup failed: {}", self.0)
    }
}

/// Maps a bearer token to the caller's user id. `Ok(None)` means the token was
/// rejected; `Err` means the auth service could not answer.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn resolve(&self, token: &str) -> Result<Option<String>, IdentityError>;
}

/// Asks Supabase auth who the token belongs to.
pub struct SupabaseIdentity {
    client: Client,
    user_url: String,
    anon_key: String,
}

#[derive(Deserialize)]
struct AuthUser {
    id: String,
}

impl SupabaseIdentity {
    pub fn new(base_url: &str, anon_key: String, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            user_url: format!("{}/auth/v1/user", base_url.trim_end_matches('/')),
            anon_key,
        })
    }
}

#[async_trait]
impl IdentityProvider for SupabaseIdentity {
    async fn resolve(&self, token: &str) -> Result<Option<String>, IdentityError> {
        let response = self
            .client
            .get(self.user_url.as_str())
            .header("apikey", self.anon_key.as_str())
            .bearer_auth(token)
            .send()
            .await
            .map_err(|err| IdentityError(err.to_string()))?;

        match response.status() {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => return Ok(None),
            status if !status.is_success() => {
                return Err(IdentityError(format!("auth returned status {status}")));
            }
            _ => {}
        }

        let user: AuthUser = response
            .json()
            .await
            .map_err(|err| IdentityError(format!("decode user failed: {err}")))?;
        Ok(Some(user.id).filter(|id| !id.is_empty()))
    }
}

/// Verifies Supabase access tokens locally with the project's JWT secret.
pub struct JwtIdentity {
    key: DecodingKey,
    validation: Validation,
}

#[derive(Deserialize)]
struct Claims {
    sub: String,
}

impl JwtIdentity {
    pub fn new(secret: &str) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_audience(&[SUPABASE_AUDIENCE]);
        Self {
            key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
        }
    }
}

#[async_trait]
impl IdentityProvider for JwtIdentity {
    async fn resolve(&self, token: &str) -> Result<Option<String>, IdentityError> {
        match decode::<Claims>(token, &self.key, &self.validation) {
            Ok(data) => Ok(Some(data.claims.sub).filter(|sub| !sub.is_empty())),
            Err(err) => {
                tracing::debug!(error = %err, "jwt rejected");
                Ok(None)
            }
        }
    }
}

/// A node in the ownership chain video -> episode -> season -> series.
#[derive(Clone, Debug, PartialEq)]
pub enum Resource {
    Video(String),
    Episode(String),
    Season(String),
    Series(String),
}

enum Step {
    Parent(Resource),
    Owner(String),
}

impl Resource {
    pub fn table(&self) -> &'static str {
        match self {
            Resource::Video(_) => VIDEOS_TABLE,
            Resource::Episode(_) => EPISODES_TABLE,
            Resource::Season(_) => SEASONS_TABLE,
            Resource::Series(_) => SERIES_TABLE,
        }
    }

    fn id(&self) -> &str {
        match self {
            Resource::Video(id)
            | Resource::Episode(id)
            | Resource::Season(id)
            | Resource::Series(id) => id,
        }
    }

    fn step(&self, row: &Row) -> Option<Step> {
        let link = |column: &str| row.get(column).and_then(id_to_string);
        match self {
            Resource::Video(_) => link("episode_id").map(|id| Step::Parent(Resource::Episode(id))),
            Resource::Episode(_) => link("season_id").map(|id| Step::Parent(Resource::Season(id))),
            Resource::Season(_) => link("series_id").map(|id| Step::Parent(Resource::Series(id))),
            Resource::Series(_) => OWNER_COLUMNS.into_iter().find_map(link).map(Step::Owner),
        }
    }
}

#[derive(Debug)]
pub enum OwnershipError {
    NotFound(&'static str),
    Forbidden,
    Driver(DriverError),
}

pub async fn owner_of(backend: &dyn Backend, resource: Resource) -> Result<String, OwnershipError> {
    let mut current = resource;
    loop {
        let table = current.table();
        let row = backend
            .fetch_row(table, current.id())
            .await
            .map_err(OwnershipError::Driver)?
            .ok_or(OwnershipError::NotFound(table))?;
        match current.step(&row) {
            Some(Step::Parent(parent)) => current = parent,
            Some(Step::Owner(owner)) => return Ok(owner),
            None => {
                tracing::warn!(table, id = current.id(), "ownership chain is broken");
                return Err(OwnershipError::NotFound(table));
            }
        }
    }
}

pub async fn ensure_owner(
    backend: &dyn Backend,
    resource: Resource,
    caller: &str,
) -> Result<(), OwnershipError> {
    let owner = owner_of(backend, resource).await?;
    if owner == caller {
        Ok(())
    } else {
        Err(OwnershipError::Forbidden)
    }
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use crate::backend::mock::MockBackend;
    use axum::http::HeaderValue;
    use jsonwebtoken::{encode, EncodingKey, Header};
    use serde_json::json;
    use std::collections::HashMap;
    use std::time::{SystemTime, UNIX_EPOCH};

    /// Token-to-user table standing in for Supabase auth.
    pub struct StaticIdentity(pub HashMap<String, String>);

    impl StaticIdentity {
        pub fn single(token: &str, user: &str) -> Self {
            Self(HashMap::from([(token.to_string(), user.to_string())]))
        }
    }

    #[async_trait]
    impl IdentityProvider for StaticIdentity {
        async fn resolve(&self, token: &str) -> Result<Option<String>, IdentityError> {
            Ok(self.0.get(token).cloned())
        }
    }

    fn row(value: serde_json::Value) -> Row {
        value.as_object().cloned().expect("object")
    }

    fn chain(owner_column: &str, owner: &str) -> MockBackend {
        let backend = MockBackend::new();
        backend.put_row("videos", "v1", row(json!({"id": "v1", "episode_id": "e1"})));
        backend.put_row("episodes", "e1", row(json!({"id": "e1", "season_id": 3})));
        backend.put_row("seasons", "3", row(json!({"id": 3, "series_id": "s1"})));
        let mut series = row(json!({"id": "s1"}));
        series.insert(owner_column.to_string(), json!(owner));
        backend.put_row("series", "s1", series);
        backend
    }

    #[test]
    fn bearer_token_parsing() {
        let mut headers = HeaderMap::new();
        assert_eq!(bearer_token(&headers), None);
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer abc"));
        assert_eq!(bearer_token(&headers), Some("abc"));
        headers.insert(AUTHORIZATION, HeaderValue::from_static("bearer   xyz "));
        assert_eq!(bearer_token(&headers), Some("xyz"));
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Basic abc"));
        assert_eq!(bearer_token(&headers), None);
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer "));
        assert_eq!(bearer_token(&headers), None);
    }

    #[tokio::test]
    async fn walks_video_chain_to_owner() {
        let backend = chain("creator_id", "user-1");
        let owner = owner_of(&backend, Resource::Video("v1".to_string()))
            .await
            .expect("owner");
        assert_eq!(owner, "user-1");
        assert!(ensure_owner(&backend, Resource::Video("v1".to_string()), "user-1")
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn other_callers_are_forbidden() {
        let backend = chain("owner_id", "user-1");
        let err = ensure_owner(&backend, Resource::Episode("e1".to_string()), "user-2")
            .await
            .expect_err("forbidden");
        assert!(matches!(err, OwnershipError::Forbidden));
    }

    #[tokio::test]
    async fn missing_links_are_not_found() {
        let backend = chain("owner_id", "user-1");
        let err = owner_of(&backend, Resource::Season("404".to_string()))
            .await
            .expect_err("missing");
        assert!(matches!(err, OwnershipError::NotFound("seasons")));

        backend.put_row("videos", "orphan", row(json!({"id": "orphan"})));
        let err = owner_of(&backend, Resource::Video("orphan".to_string()))
            .await
            .expect_err("broken");
        assert!(matches!(err, OwnershipError::NotFound("videos")));
    }

    #[derive(serde::Serialize)]
    struct TestClaims<'a> {
        sub: &'a str,
        aud: &'a str,
        exp: u64,
    }

    fn token(secret: &str, aud: &str) -> String {
        let exp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_secs()
            + 3600;
        encode(
            &Header::default(),
            &TestClaims {
                sub: "user-1",
                aud,
                exp,
            },
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .expect("token")
    }

    #[tokio::test]
    async fn jwt_identity_checks_signature_and_audience() {
        let identity = JwtIdentity::new("top-secret");
        let resolved = identity
            .resolve(&token("top-secret", "authenticated"))
            .await
            .expect("resolve");
        assert_eq!(resolved.as_deref(), Some("user-1"));

        let wrong_key = identity
            .resolve(&token("other-secret", "authenticated"))
            .await
            .expect("resolve");
        assert_eq!(wrong_key, None);

        let wrong_aud = identity
            .resolve(&token("top-secret", "anon"))
            .await
            .expect("resolve");
        assert_eq!(wrong_aud, None);

        assert_eq!(identity.resolve("garbage").await.expect("resolve"), None);
    }
}
