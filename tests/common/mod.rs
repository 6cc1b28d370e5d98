//! Common test utilities for E2E tests

#![allow(dead_code)]

use std::sync::Arc;

use axum::async_trait;
use tacoreviews::auth::{
    AuthorizationRequest, OAuthProvider, ProviderRegistry, Session, create_session_token,
};
use tacoreviews::data::{Database, OAuthIdentity, User};
use tacoreviews::error::AppError;
use tacoreviews::{AppState, config};
use tempfile::TempDir;
use tokio::net::TcpListener;

/// Authorization code the fake provider accepts
pub const GOOD_CODE: &str = "good-code";

/// PKCE verifier the fake provider hands out and expects back
pub const GOOD_VERIFIER: &str = "fake-pkce-verifier";

/// Email of the account the fake provider signs in
pub const PROVIDER_EMAIL: &str = "provider-user@example.com";

/// Stand-in for GitHub that never leaves the process
pub struct FakeProvider;

#[async_trait]
impl OAuthProvider for FakeProvider {
    fn name(&self) -> &'static str {
        "github"
    }

    fn display_name(&self) -> &'static str {
        "GitHub"
    }

    fn authorize(&self, redirect_uri: &str) -> Result<AuthorizationRequest, AppError> {
        let state = ulid::Ulid::new().to_string();
        Ok(AuthorizationRequest {
            url: format!(
                "https://provider.test/authorize?redirect_uri={}&state={state}",
                urlencoding::encode(redirect_uri)
            ),
            csrf_state: state,
            pkce_verifier: GOOD_VERIFIER.to_string(),
        })
    }

    async fn exchange_code(
        &self,
        code: &str,
        _redirect_uri: &str,
        pkce_verifier: &str,
    ) -> Result<String, AppError> {
        if code == GOOD_CODE && pkce_verifier == GOOD_VERIFIER {
            Ok("fake-access-token".to_string())
        } else {
            Err(AppError::OAuth("bad_verification_code".to_string()))
        }
    }

    async fn fetch_identity(&self, _access_token: &str) -> Result<OAuthIdentity, AppError> {
        Ok(OAuthIdentity {
            provider: "github".to_string(),
            provider_account_id: "4242".to_string(),
            email: PROVIDER_EMAIL.to_string(),
            name: Some("Provider User".to_string()),
            image: Some("https://example.com/avatar.png".to_string()),
        })
    }
}

/// Test server instance
pub struct TestServer {
    pub addr: String,
    pub state: AppState,
    pub _temp_dir: TempDir,
    pub client: reqwest::Client,
}

impl TestServer {
    /// Create a new test server instance
    pub async fn new() -> Self {
        Self::with_config(|_| {}).await
    }

    /// Create a test server after adjusting the default test configuration
    pub async fn with_config(adjust: impl FnOnce(&mut config::AppConfig)) -> Self {
        // Create temporary directory for test database
        let temp_dir = TempDir::new().unwrap();
        let db_url = format!("sqlite:{}", temp_dir.path().join("test.db").display());

        // Create test configuration
        let mut config = config::AppConfig {
            server: config::ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 0, // Let OS assign port
                domain: "localhost:8080".to_string(),
                protocol: "http".to_string(),
            },
            database: config::DatabaseConfig {
                url: db_url,
                max_connections: 5,
            },
            auth: config::AuthConfig {
                session_secret: "test-secret-key-32-bytes-long!!!".to_string(),
                session_max_age: 604800,
                github: config::OAuthClientConfig {
                    client_id: "test-github-id".to_string(),
                    client_secret: "test-github-secret".to_string(),
                },
                google: config::OAuthClientConfig {
                    client_id: "test-google-id".to_string(),
                    client_secret: "test-google-secret".to_string(),
                },
            },
            listings: config::ListingsConfig {
                require_auth_for_submissions: false,
            },
            metrics: config::MetricsConfig { enabled: true },
            logging: config::LoggingConfig {
                level: "info".to_string(),
                format: "pretty".to_string(),
            },
        };
        adjust(&mut config);

        // Real Google provider (never called), fake GitHub provider
        let db = Database::connect(&config.database.url, config.database.max_connections)
            .await
            .unwrap();
        let providers = ProviderRegistry::from_config(&config.auth, reqwest::Client::new())
            .with(Arc::new(FakeProvider));
        let state = AppState::from_parts(config, db, providers);

        // Redirects are asserted on, never followed
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .unwrap();

        // Bind to random port
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let addr_str = format!("http://{}", addr);

        let app = tacoreviews::build_router(state.clone());

        // Spawn server in background
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            addr: addr_str,
            state,
            _temp_dir: temp_dir,
            client,
        }
    }

    /// Get base URL for API requests
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.addr, path)
    }

    /// Create a user linked to a GitHub account
    pub async fn create_test_user(&self, email: &str) -> User {
        self.state
            .db
            .link_oauth_account(&OAuthIdentity {
                provider: "github".to_string(),
                provider_account_id: format!("id-{email}"),
                email: email.to_string(),
                name: Some("Test User".to_string()),
                image: Some("https://example.com/test.png".to_string()),
            })
            .await
            .unwrap()
    }

    /// Create a persisted session for `user` and return its signed token
    pub async fn create_session_token(&self, user: &User) -> String {
        let session = Session::for_user(user, self.state.config.auth.session_max_age);
        self.state
            .db
            .insert_session(&session.record())
            .await
            .unwrap();

        create_session_token(&session, &self.state.config.auth.session_secret)
            .expect("Failed to create test token")
    }

    /// Create a user and return a `Cookie` header value carrying its session
    pub async fn signed_in_cookie(&self, email: &str) -> (User, String) {
        let user = self.create_test_user(email).await;
        let token = self.create_session_token(&user).await;
        (user, format!("session={token}"))
    }
}

/// Value of a cookie set by `response`, if any
pub fn set_cookie_value(response: &reqwest::Response, name: &str) -> Option<String> {
    response
        .headers()
        .get_all(reqwest::header::SET_COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .filter_map(|value| value.split(';').next())
        .filter_map(|pair| pair.split_once('='))
        .find(|(cookie_name, _)| cookie_name.trim() == name)
        .map(|(_, value)| value.to_string())
}

/// `Location` header of a redirect response
pub fn location(response: &reqwest::Response) -> String {
    response
        .headers()
        .get(reqwest::header::LOCATION)
        .expect("redirect must carry a Location header")
        .to_str()
        .unwrap()
        .to_string()
}
