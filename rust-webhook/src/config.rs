//! Configuration module for environment variable parsing.
//!
//! Reads all configuration from environment variables.

use std::env;

use tracing::warn;

/// Default certificate cache TTL: 24 hours.
pub const DEFAULT_CERT_CACHE_TTL_SECS: u64 = 86_400;

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Port for the web server to listen on
    pub port: u16,

    /// Postgres connection URL
    pub database_url: String,

    /// Deployment environment name ("production" enforces full validation)
    pub environment: String,

    /// Exact-match allow-list of authorized topic ARNs.
    /// Empty means every topic is rejected (fail closed).
    pub topic_allowlist: Vec<String>,

    /// Skip topic ARN validation (honored outside production only)
    pub skip_topic_validation: bool,

    /// Skip signature verification (honored outside production only)
    pub skip_signature_validation: bool,

    /// TTL for cached signing certificates, in seconds
    pub cert_cache_ttl_secs: u64,

    /// HTTP request timeout in milliseconds
    pub request_timeout_ms: u64,

    // =========================================================================
    // Notification sender (Mailgun HTTP API)
    // =========================================================================

    /// Mailgun API key
    pub mailgun_api_key: Option<String>,

    /// Mailgun sending domain
    pub mailgun_domain: Option<String>,

    /// Mailgun API base URL
    pub mailgun_base_url: String,

    /// From address for completion notifications
    pub mail_from: String,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        Config {
            port: env::var("PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(8080),

            database_url: env::var("DATABASE_URL")
                .unwrap_or_else(|_| "postgres://localhost/vaultwatch".to_string()),

            environment: env::var("APP_ENV").unwrap_or_else(|_| "production".to_string()),

            topic_allowlist: parse_csv("SNS_TOPIC_ALLOWLIST"),

            skip_topic_validation: parse_bool("SKIP_TOPIC_VALIDATION"),

            skip_signature_validation: parse_bool("SKIP_SIGNATURE_VALIDATION"),

            cert_cache_ttl_secs: env::var("CERT_CACHE_TTL_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_CERT_CACHE_TTL_SECS),

            request_timeout_ms: env::var("REQUEST_TIMEOUT_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(8000),

            mailgun_api_key: env::var("MAILGUN_API_KEY").ok(),

            mailgun_domain: env::var("MAILGUN_DOMAIN").ok(),

            mailgun_base_url: env::var("MAILGUN_BASE_URL")
                .unwrap_or_else(|_| "https://api.mailgun.net".to_string()),

            mail_from: env::var("MAIL_FROM")
                .unwrap_or_else(|_| "archive@vaultwatch.io".to_string()),
        }
    }

    /// Validation bypass flags are ignored in production.
    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }

    /// Whether topic ARN validation should be skipped for this deployment.
    pub fn topic_validation_bypassed(&self) -> bool {
        self.skip_topic_validation && !self.is_production()
    }

    /// Whether signature verification should be skipped for this deployment.
    pub fn signature_validation_bypassed(&self) -> bool {
        self.skip_signature_validation && !self.is_production()
    }
}

/// Parse a comma-separated list of strings. Missing or empty yields an
/// empty list.
fn parse_csv(name: &str) -> Vec<String> {
    match env::var(name) {
        Ok(raw) => raw
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect(),
        Err(_) => Vec::new(),
    }
}

/// Parse a boolean flag. Accepts "true"/"1"/"yes" case-insensitively.
fn parse_bool(name: &str) -> bool {
    match env::var(name) {
        Ok(raw) => {
            let normalized = raw.trim().to_ascii_lowercase();
            match normalized.as_str() {
                "true" | "1" | "yes" => true,
                "false" | "0" | "no" | "" => false,
                other => {
                    warn!(env_var = name, value = other, "Invalid boolean value, using false");
                    false
                }
            }
        }
        Err(_) => false,
    }
}
