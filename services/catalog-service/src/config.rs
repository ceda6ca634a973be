use std::time::Duration;
use xanime_common::env_opt;

use crate::backend::RestConfig;

pub enum BackendConfig {
    Postgres { database_url: String },
    Rest(RestConfig),
}

pub enum IdentityConfig {
    Jwt { secret: String },
    Supabase { base_url: String, anon_key: String },
}

pub struct ServiceConfig {
    pub port: u16,
    pub http_timeout: Duration,
    pub backend: BackendConfig,
    pub identity: IdentityConfig,
}

impl ServiceConfig {
    pub fn from_env() -> Result<Self, String> {
        Self::from_lookup(env_opt)
    }

    /// A direct `DATABASE_URL` wins over PostgREST, and a JWT secret wins over
    /// remote token checks; Supabase URL is needed for whichever remains.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, String> {
        let port = lookup("PORT")
            .and_then(|value| value.parse::<u16>().ok())
            .unwrap_or(8080);
        let http_timeout = Duration::from_secs(
            lookup("HTTP_TIMEOUT_SECS")
                .and_then(|value| value.parse::<u64>().ok())
                .unwrap_or(10),
        );
        let supabase_url = lookup("SUPABASE_URL");
        let anon_key = lookup("SUPABASE_ANON_KEY").unwrap_or_default();

        let backend = match lookup("DATABASE_URL") {
            Some(database_url) => BackendConfig::Postgres { database_url },
            None => {
                let base_url = supabase_url
                    .clone()
                    .ok_or("SUPABASE_URL or DATABASE_URL is required")?;
                let api_key = lookup("SUPABASE_SERVICE_ROLE_KEY").unwrap_or_else(|| anon_key.clone());
                BackendConfig::Rest(RestConfig {
                    base_url,
                    api_key,
                    timeout: http_timeout,
                })
            }
        };

        let identity = match lookup("SUPABASE_JWT_SECRET") {
            Some(secret) => IdentityConfig::Jwt { secret },
            None => IdentityConfig::Supabase {
                base_url: supabase_url.ok_or("SUPABASE_URL or SUPABASE_JWT_SECRET is required")?,
                anon_key,
            },
        };

        Ok(Self {
            port,
            http_timeout,
            backend,
            identity,
        })
    }
}
