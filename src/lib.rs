//! Taco Reviews - a taqueria directory with user reviews
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      HTTP Layer (Axum)                       │
//! │  - JSON API: taquerias, reviews                             │
//! │  - Auth pages: sign-in, OAuth callback, sign-out, reset     │
//! │  - Protected area behind the session guard                  │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Data Layer                              │
//! │  - SQLite (sqlx) with migrations                            │
//! │  - Users, OAuth accounts, sessions, taquerias, reviews      │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - `api`: JSON handlers and the metrics endpoint
//! - `auth`: OAuth sign-in, sessions and the protected-area guard
//! - `data`: Database access and models
//! - `config`: Configuration management
//! - `error`: Error types
//! - `metrics`: Prometheus collectors
//! - `response`: Explicit redirect/render outcomes

pub mod api;
pub mod auth;
pub mod config;
pub mod data;
pub mod error;
pub mod metrics;
pub mod response;

use std::sync::Arc;

/// Application state shared across all handlers
///
/// Cloned for each request; every field is behind an `Arc`.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration
    pub config: Arc<config::AppConfig>,

    /// Database connection pool
    pub db: Arc<data::Database>,

    /// OAuth providers available for sign-in
    pub providers: Arc<auth::ProviderRegistry>,
}

impl AppState {
    /// Initialize application state
    ///
    /// # Steps
    /// 1. Connect to SQLite and run migrations
    /// 2. Purge expired session rows
    /// 3. Build the HTTP client and OAuth provider registry
    ///
    /// # Errors
    /// Returns error if any initialization step fails
    pub async fn new(config: config::AppConfig) -> Result<Self, error::AppError> {
        tracing::info!("Initializing application state...");

        // 1. Connect to SQLite database
        let db =
            data::Database::connect(&config.database.url, config.database.max_connections).await?;
        tracing::info!("Database connected");

        // 2. Drop sessions that can no longer be used
        let purged = db.delete_expired_sessions().await?;
        if purged > 0 {
            tracing::info!(purged, "Expired sessions removed");
        }

        // 3. Initialize HTTP client for provider calls
        let http_client = reqwest::Client::builder()
            .user_agent(concat!("TacoReviews/", env!("CARGO_PKG_VERSION")))
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .map_err(|e| error::AppError::Internal(e.into()))?;
        let providers = auth::ProviderRegistry::from_config(&config.auth, http_client);

        tracing::info!("Application state initialized successfully");

        Ok(Self::from_parts(config, db, providers))
    }

    /// Assemble state from already-built parts
    pub fn from_parts(
        config: config::AppConfig,
        db: data::Database,
        providers: auth::ProviderRegistry,
    ) -> Self {
        Self {
            config: Arc::new(config),
            db: Arc::new(db),
            providers: Arc::new(providers),
        }
    }
}

/// Largest accepted request body; forms and JSON payloads are small
const MAX_REQUEST_BODY_BYTES: usize = 64 * 1024;

/// Build the Axum router with all routes.
///
/// This is shared by the binary and integration tests to keep route
/// composition consistent across environments.
pub fn build_router(state: AppState) -> axum::Router {
    use axum::{Router, middleware};
    use tower_http::{
        compression::CompressionLayer, limit::RequestBodyLimitLayer, trace::TraceLayer,
    };

    let cors_layer = build_cors_layer(&state.config.server);

    let protected_routes = api::account_router().route_layer(middleware::from_fn_with_state(
        state.clone(),
        auth::require_session,
    ));

    let mut router = Router::new()
        .route("/health", axum::routing::get(health_check))
        .nest("/api", api::api_router())
        .merge(auth::auth_router())
        .merge(protected_routes);

    if state.config.metrics.enabled {
        router = router.merge(api::metrics_router());
    }

    router
        .route_layer(middleware::from_fn(api::track_http_metrics))
        .layer(RequestBodyLimitLayer::new(MAX_REQUEST_BODY_BYTES))
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer)
        .with_state(state)
}

fn build_cors_layer(server: &config::ServerConfig) -> tower_http::cors::CorsLayer {
    use axum::http::HeaderValue;
    use tower_http::cors::{Any, CorsLayer};

    if !server.protocol.eq_ignore_ascii_case("https") {
        return CorsLayer::permissive();
    }

    let allowed_origin = server.base_url();
    match HeaderValue::from_str(&allowed_origin) {
        Ok(origin) => CorsLayer::new()
            .allow_origin([origin])
            .allow_methods(Any)
            .allow_headers(Any),
        Err(error) => {
            tracing::error!(
                %error,
                origin = %allowed_origin,
                "Failed to parse CORS origin from server base URL; denying cross-origin requests"
            );
            CorsLayer::new().allow_methods(Any).allow_headers(Any)
        }
    }
}

async fn health_check() -> &'static str {
    "OK"
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::config::*;

    pub(crate) fn test_config(database_url: String) -> AppConfig {
        AppConfig {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 0,
                domain: "localhost:8080".to_string(),
                protocol: "http".to_string(),
            },
            database: DatabaseConfig {
                url: database_url,
                max_connections: 5,
            },
            auth: AuthConfig {
                session_secret: "test-secret-key-32-bytes-long!!!".to_string(),
                session_max_age: 3600,
                github: OAuthClientConfig {
                    client_id: "github-client-id".to_string(),
                    client_secret: "github-client-secret".to_string(),
                },
                google: OAuthClientConfig {
                    client_id: "google-client-id".to_string(),
                    client_secret: "google-client-secret".to_string(),
                },
            },
            listings: ListingsConfig {
                require_auth_for_submissions: false,
            },
            metrics: MetricsConfig { enabled: false },
            logging: LoggingConfig {
                level: "debug".to_string(),
                format: "pretty".to_string(),
            },
        }
    }

    /// State over a fresh SQLite file; keep the `TempDir` alive for the test
    pub(crate) async fn test_state() -> (AppState, tempfile::TempDir) {
        let dir = tempfile::TempDir::new().unwrap();
        let url = format!("sqlite:{}", dir.path().join("test.db").display());
        let config = test_config(url);

        let db = data::Database::connect(&config.database.url, 5)
            .await
            .unwrap();
        let providers =
            auth::ProviderRegistry::from_config(&config.auth, reqwest::Client::new());

        (AppState::from_parts(config, db, providers), dir)
    }
}
