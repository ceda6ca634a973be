mod app;
mod auth;
mod backend;
mod classify;
mod config;
mod handlers;
mod models;
mod series;
mod service;
mod slug;
mod state;

use std::sync::Arc;
use tokio_postgres::NoTls;
use xanime_common::{bind_listener, init_tracing, shutdown_signal};

use crate::auth::{IdentityProvider, JwtIdentity, SupabaseIdentity};
use crate::backend::{Backend, PostgresBackend, RestBackend};
use crate::config::{BackendConfig, IdentityConfig, ServiceConfig};
use crate::state::AppState;

#[tokio::main]
async fn main() {
    let _guards = init_tracing("catalog-service");

    let config = ServiceConfig::from_env().expect("catalog-service configuration");
    let backend = build_backend(config.backend).await;
    let identity = build_identity(config.identity, config.http_timeout);

    let state = AppState { backend, identity };
    let app = app::build_router(state);
    let listener = bind_listener(config.port).await.expect("bind listener");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("serve");
}

async fn build_backend(config: BackendConfig) -> Arc<dyn Backend> {
    match config {
        BackendConfig::Postgres { database_url } => {
            let (db, connection) = tokio_postgres::connect(&database_url, NoTls)
                .await
                .expect("connect db");
            tokio::spawn(async move {
                // Drive the connection in the background.
                if let Err(err) = connection.await {
                    tracing::error!(error = %err, "database connection error");
                }
            });
            tracing::info!("using direct postgres backend");
            Arc::new(PostgresBackend::new(db))
        }
        BackendConfig::Rest(rest) => {
            tracing::info!(base_url = rest.base_url.as_str(), "using postgrest backend");
            Arc::new(RestBackend::new(rest).expect("postgrest client"))
        }
    }
}

fn build_identity(
    config: IdentityConfig,
    timeout: std::time::Duration,
) -> Arc<dyn IdentityProvider> {
    match config {
        IdentityConfig::Jwt { secret } => {
            tracing::info!("verifying access tokens locally");
            Arc::new(JwtIdentity::new(&secret))
        }
        IdentityConfig::Supabase { base_url, anon_key } => Arc::new(
            SupabaseIdentity::new(&base_url, anon_key, timeout).expect("supabase auth client"),
        ),
    }
}
