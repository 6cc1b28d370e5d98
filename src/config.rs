//! Configuration management
//!
//! Loads configuration from:
//! 1. Default values (and the legacy `DATABASE_URL`/`AUTH_SECRET`/... variables)
//! 2. Configuration files (config/default.toml, config/local.toml)
//! 3. Environment variables (override)

use serde::Deserialize;
use std::net::IpAddr;

/// Main application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub auth: AuthConfig,
    pub listings: ListingsConfig,
    pub metrics: MetricsConfig,
    pub logging: LoggingConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Bind address (e.g., "0.0.0.0")
    pub host: String,
    /// Port number (e.g., 8080)
    pub port: u16,
    /// Public domain (e.g., "tacos.example.com")
    pub domain: String,
    /// Protocol ("http" or "https")
    pub protocol: String,
}

impl ServerConfig {
    /// Get the public base URL
    ///
    /// # Returns
    /// Full URL like "https://tacos.example.com"
    pub fn base_url(&self) -> String {
        format!("{}://{}", self.protocol, self.domain)
    }
}

/// Database configuration (SQLite only)
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// SQLx connection string, e.g. "sqlite:data/tacos.db"
    pub url: String,
    /// Connection pool size
    pub max_connections: u32,
}

/// Authentication configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    /// Session signing secret (32+ bytes)
    pub session_secret: String,
    /// Session max age in seconds (default: 2592000 = 30 days)
    pub session_max_age: i64,
    pub github: OAuthClientConfig,
    pub google: OAuthClientConfig,
}

/// OAuth client credentials for one provider
#[derive(Debug, Clone, Deserialize)]
pub struct OAuthClientConfig {
    pub client_id: String,
    pub client_secret: String,
}

/// Listing submission policy
#[derive(Debug, Clone, Deserialize)]
pub struct ListingsConfig {
    /// Require a signed-in user to create taquerias
    pub require_auth_for_submissions: bool,
}

/// Metrics configuration
#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    /// Expose GET /metrics
    pub enabled: bool,
}

/// Logging configuration
///
/// `RUST_LOG`, when set, replaces the filter built from `level`.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    pub level: String,
    /// Log format: "pretty" or "json"
    pub format: String,
}

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];
const LOG_FORMATS: &[&str] = &["pretty", "json"];

impl LoggingConfig {
    /// `EnvFilter` directives for this crate and the HTTP trace layer
    pub fn filter_directives(&self) -> String {
        let level = self.level.trim().to_ascii_lowercase();
        format!("tacoreviews={level},tower_http={level}")
    }

    pub fn is_json(&self) -> bool {
        self.format.trim().eq_ignore_ascii_case("json")
    }
}

/// Unprefixed variables accepted as low-priority fallbacks
const LEGACY_ENV_ALIASES: &[(&str, &str)] = &[
    ("DATABASE_URL", "database.url"),
    ("AUTH_SECRET", "auth.session_secret"),
    ("GITHUB_ID", "auth.github.client_id"),
    ("GITHUB_SECRET", "auth.github.client_secret"),
    ("GOOGLE_ID", "auth.google.client_id"),
    ("GOOGLE_SECRET", "auth.google.client_secret"),
];

impl AppConfig {
    /// Load configuration from file and environment
    ///
    /// # Loading Order
    /// 1. Default values and legacy environment aliases
    /// 2. config/default.toml (if exists)
    /// 3. config/local.toml (if exists)
    /// 4. Environment variables (TACOREVIEWS__*)
    ///
    /// Database URL, session secret and both OAuth client pairs have no
    /// default; loading fails when any of them is missing.
    ///
    /// # Errors
    /// Returns error if configuration is missing or invalid
    pub fn load() -> Result<Self, crate::error::AppError> {
        use config::{Config, Environment, File};

        let mut builder = Config::builder()
            // Start with default values
            .set_default("server.host", "127.0.0.1")?
            .set_default("server.port", 8080)?
            .set_default("server.domain", "localhost")?
            .set_default("server.protocol", "http")?
            .set_default("database.max_connections", 5)?
            .set_default("auth.session_max_age", 2_592_000)?
            .set_default("listings.require_auth_for_submissions", false)?
            .set_default("metrics.enabled", true)?
            .set_default("logging.level", "info")?
            .set_default("logging.format", "pretty")?;

        for (variable, key) in LEGACY_ENV_ALIASES {
            if let Ok(value) = std::env::var(variable) {
                builder = builder.set_default(*key, value)?;
            }
        }

        let config = builder
            // Load from config/default.toml if it exists
            .add_source(File::with_name("config/default").required(false))
            // Load from config/local.toml if it exists (overrides default)
            .add_source(File::with_name("config/local").required(false))
            // Load from environment variables (TACOREVIEWS__*)
            .add_source(
                Environment::with_prefix("TACOREVIEWS")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| crate::error::AppError::Config(e.to_string()))?;

        let app_config: Self = config
            .try_deserialize()
            .map_err(|e| crate::error::AppError::Config(e.to_string()))?;
        app_config.validate()?;
        Ok(app_config)
    }

    pub fn should_use_secure_cookies(&self) -> bool {
        self.server.protocol.eq_ignore_ascii_case("https")
            || !is_local_server_domain(&self.server.domain)
    }

    pub(crate) fn validate(&self) -> Result<(), crate::error::AppError> {
        const MIN_SESSION_SECRET_BYTES: usize = 32;

        if self.database.url.trim().is_empty() {
            return Err(crate::error::AppError::Config(
                "database.url must not be empty".to_string(),
            ));
        }

        if self.auth.session_secret.len() < MIN_SESSION_SECRET_BYTES {
            return Err(crate::error::AppError::Config(format!(
                "auth.session_secret must be at least {} bytes",
                MIN_SESSION_SECRET_BYTES
            )));
        }

        if self.auth.session_max_age <= 0 {
            return Err(crate::error::AppError::Config(
                "auth.session_max_age must be greater than 0".to_string(),
            ));
        }

        for (name, client) in [("github", &self.auth.github), ("google", &self.auth.google)] {
            if client.client_id.trim().is_empty() || client.client_secret.trim().is_empty() {
                return Err(crate::error::AppError::Config(format!(
                    "auth.{name}.client_id and auth.{name}.client_secret are required"
                )));
            }
        }

        let level = self.logging.level.trim().to_ascii_lowercase();
        if !LOG_LEVELS.contains(&level.as_str()) {
            return Err(crate::error::AppError::Config(format!(
                "logging.level must be one of {}",
                LOG_LEVELS.join(", ")
            )));
        }

        let format = self.logging.format.trim().to_ascii_lowercase();
        if !LOG_FORMATS.contains(&format.as_str()) {
            return Err(crate::error::AppError::Config(format!(
                "logging.format must be one of {}",
                LOG_FORMATS.join(", ")
            )));
        }

        if self.should_use_secure_cookies() && !self.server.protocol.eq_ignore_ascii_case("https") {
            return Err(crate::error::AppError::Config(
                "server.protocol must be https for non-local server domains".to_string(),
            ));
        }

        Ok(())
    }
}

/// Host part of the public domain, lowercased
pub fn normalized_server_host(domain: &str) -> String {
    let trimmed = domain.trim();
    let parsed_host = url::Url::parse(&format!("http://{trimmed}"))
        .ok()
        .and_then(|url| url.host_str().map(|host| host.to_string()));
    let host = parsed_host.unwrap_or_else(|| trimmed.to_string());
    host.trim_end_matches('.').to_ascii_lowercase()
}

fn is_local_server_domain(domain: &str) -> bool {
    let host = normalized_server_host(domain);
    if host == "localhost" || host.ends_with(".localhost") {
        return true;
    }

    if let Ok(ip) = host.trim_matches(|c| c == '[' || c == ']').parse::<IpAddr>() {
        return ip.is_loopback() || ip.is_unspecified();
    }

    false
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_config() -> AppConfig {
        AppConfig {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 8080,
                domain: "localhost:8080".to_string(),
                protocol: "http".to_string(),
            },
            database: DatabaseConfig {
                url: "sqlite:/tmp/tacoreviews-test.db".to_string(),
                max_connections: 5,
            },
            auth: AuthConfig {
                session_secret: "x".repeat(32),
                session_max_age: 2_592_000,
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
            metrics: MetricsConfig { enabled: true },
            logging: LoggingConfig {
                level: "info".to_string(),
                format: "pretty".to_string(),
            },
        }
    }

    #[test]
    fn validate_accepts_http_on_localhost() {
        let config = valid_config();
        assert!(config.validate().is_ok());
        assert!(!config.should_use_secure_cookies());
    }

    #[test]
    fn validate_rejects_short_session_secret() {
        let mut config = valid_config();
        config.auth.session_secret = "short-secret".to_string();

        let error = config
            .validate()
            .expect_err("session secret shorter than 32 bytes must fail");
        assert!(matches!(
            error,
            crate::error::AppError::Config(message)
                if message.contains("auth.session_secret")
        ));
    }

    #[test]
    fn validate_rejects_missing_oauth_credentials() {
        let mut config = valid_config();
        config.auth.google.client_secret = String::new();

        let error = config
            .validate()
            .expect_err("empty google secret must fail");
        assert!(matches!(
            error,
            crate::error::AppError::Config(message) if message.contains("auth.google")
        ));
    }

    #[test]
    fn validate_rejects_empty_database_url() {
        let mut config = valid_config();
        config.database.url = "  ".to_string();

        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_http_for_non_local_domain() {
        let mut config = valid_config();
        config.server.domain = "tacos.example.com".to_string();
        config.server.protocol = "http".to_string();

        let error = config
            .validate()
            .expect_err("public domains must require https");
        assert!(matches!(
            error,
            crate::error::AppError::Config(message)
                if message.contains("server.protocol must be https")
        ));
    }

    #[test]
    fn logging_level_feeds_filter_directives() {
        let mut config = valid_config();
        config.logging.level = "DEBUG".to_string();

        assert!(config.validate().is_ok());
        let directives = config.logging.filter_directives();
        assert_eq!(directives, "tacoreviews=debug,tower_http=debug");
        assert!(tracing_subscriber::EnvFilter::try_new(&directives).is_ok());
    }

    #[test]
    fn logging_format_selects_json() {
        let mut config = valid_config();
        assert!(!config.logging.is_json());

        config.logging.format = "json".to_string();
        assert!(config.validate().is_ok());
        assert!(config.logging.is_json());
    }

    #[test]
    fn validate_rejects_unknown_logging_settings() {
        let mut config = valid_config();
        config.logging.level = "loud".to_string();
        assert!(matches!(
            config.validate(),
            Err(crate::error::AppError::Config(message)) if message.contains("logging.level")
        ));

        let mut config = valid_config();
        config.logging.format = "xml".to_string();
        assert!(matches!(
            config.validate(),
            Err(crate::error::AppError::Config(message)) if message.contains("logging.format")
        ));
    }

    #[test]
    fn base_url_joins_protocol_and_domain() {
        let config = valid_config();
        assert_eq!(config.server.base_url(), "http://localhost:8080");
    }
}
