//! Application configuration loaded from environment variables.
//!
//! Fail-fast loading with validation: required variables must be present and
//! valid, or the application exits with a clear error message. Production
//! mode refuses to start with insecure default key material.

use std::env;
use std::time::Duration;

use thiserror::Error;

/// Default NOTIFY_ENCRYPTION_KEY: 64 hex '4' characters (development only).
pub const INSECURE_NOTIFY_KEY: [u8; 32] = [0x44u8; 32];

/// Application environment mode.
///
/// Controls security enforcement:
/// - `Development`: insecure defaults are allowed with WARN-level logging.
/// - `Production`: insecure defaults cause the application to refuse startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnvironment {
    Development,
    Production,
}

impl AppEnvironment {
    /// Parse from the `APP_ENV` environment variable value.
    /// Defaults to `Development` if unset or unrecognized.
    pub fn from_env_str(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "production" | "prod" => Self::Production,
            "development" | "dev" => Self::Development,
            other => {
                tracing::warn!(
                    value = other,
                    "Unrecognized APP_ENV value, defaulting to Development"
                );
                Self::Development
            }
        }
    }

    #[must_use]
    pub fn is_production(&self) -> bool {
        *self == Self::Production
    }
}

impl std::fmt::Display for AppEnvironment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Development => write!(f, "development"),
            Self::Production => write!(f, "production"),
        }
    }
}

/// Configuration errors that can occur during environment loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingVar(String),

    #[error("Invalid value for {var}: {message}")]
    InvalidValue { var: String, message: String },

    #[error("Failed to parse port: {0}")]
    InvalidPort(#[from] std::num::ParseIntError),
}

/// Application configuration loaded from environment variables.
#[derive(Clone)]
pub struct Config {
    /// Application environment (development or production).
    pub app_env: AppEnvironment,

    /// PostgreSQL connection string.
    pub database_url: String,

    /// Tracing filter directive (e.g., "info,notification_delivery=debug").
    pub rust_log: String,

    /// Server bind address.
    pub host: String,

    /// Server listen port.
    pub port: u16,

    /// Encryption key (32 bytes, hex-encoded) for subscription signing
    /// secrets at rest.
    pub notify_encryption_key: [u8; 32],

    /// Accept plain-HTTP and internal-host destination URLs (dev/test only).
    pub allow_insecure_urls: bool,

    /// Delivery attempt ceiling.
    pub max_attempts: i32,

    /// Outbound delivery request timeout.
    pub request_timeout: Duration,

    /// Cooldown between a failed attempt and its retry.
    pub retry_cooldown: chrono::Duration,

    /// Interval between scheduler sweeps.
    pub sweep_interval: Duration,

    /// Age after which a pending operation is expired to `timed_out`.
    pub operation_ttl: chrono::Duration,

    /// In-process delivery queue capacity.
    pub queue_capacity: usize,

    /// Cap on concurrently in-flight deliveries.
    pub max_concurrent: usize,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("app_env", &self.app_env)
            .field("database_url", &"[redacted]")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("allow_insecure_urls", &self.allow_insecure_urls)
            .field("max_attempts", &self.max_attempts)
            .finish_non_exhaustive()
    }
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing or values are
    /// invalid.
    ///
    /// # Required Variables
    ///
    /// - `DATABASE_URL` - PostgreSQL connection string
    ///
    /// # Optional Variables
    ///
    /// - `RUST_LOG` - log filter (default: "info")
    /// - `HOST` - bind address (default: "0.0.0.0")
    /// - `PORT` - listen port (default: 8080)
    /// - `NOTIFY_ENCRYPTION_KEY` - 64 hex chars (insecure default in dev)
    /// - `NOTIFY_ALLOW_INSECURE_URLS` - accept http/internal URLs (default: false)
    /// - `NOTIFY_MAX_ATTEMPTS` - delivery ceiling (default: 5)
    /// - `NOTIFY_REQUEST_TIMEOUT_SECS` - per-request timeout (default: 10)
    /// - `NOTIFY_RETRY_COOLDOWN_SECS` - retry cooldown (default: 300)
    /// - `NOTIFY_SWEEP_INTERVAL_SECS` - scheduler interval (default: 30)
    /// - `NOTIFY_OPERATION_TTL_SECS` - pending operation TTL (default: 3600)
    /// - `NOTIFY_QUEUE_CAPACITY` - dispatch queue size (default: 1024)
    /// - `NOTIFY_MAX_CONCURRENT` - in-flight delivery cap (default: 16)
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (development only)
        let _ = dotenvy::dotenv();

        let app_env = AppEnvironment::from_env_str(
            &env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
        );

        let database_url = env::var("DATABASE_URL")
            .map_err(|_| ConfigError::MissingVar("DATABASE_URL".to_string()))?;

        let rust_log = env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());

        let host = env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());

        let port: u16 = env::var("PORT")
            .unwrap_or_else(|_| "8080".to_string())
            .parse()?;
        if port == 0 {
            return Err(ConfigError::InvalidValue {
                var: "PORT".to_string(),
                message: "Port must be between 1 and 65535".to_string(),
            });
        }

        let notify_encryption_key = parse_hex_encryption_key(
            "NOTIFY_ENCRYPTION_KEY",
            &env::var("NOTIFY_ENCRYPTION_KEY").unwrap_or_else(|_| {
                // Default for development only - must be changed in production
                "4444444444444444444444444444444444444444444444444444444444444444".to_string()
            }),
        )?;

        let allow_insecure_urls = env::var("NOTIFY_ALLOW_INSECURE_URLS")
            .map(|s| matches!(s.to_lowercase().as_str(), "true" | "1" | "yes"))
            .unwrap_or(false);

        let max_attempts = parse_env_or("NOTIFY_MAX_ATTEMPTS", 5).max(1);
        let request_timeout = Duration::from_secs(positive_secs(
            parse_env_or("NOTIFY_REQUEST_TIMEOUT_SECS", 10),
            10,
        ));
        let retry_cooldown =
            chrono::Duration::seconds(parse_env_or("NOTIFY_RETRY_COOLDOWN_SECS", 300).max(1));
        let sweep_interval = Duration::from_secs(positive_secs(
            parse_env_or("NOTIFY_SWEEP_INTERVAL_SECS", 30),
            30,
        ));
        let operation_ttl =
            chrono::Duration::seconds(parse_env_or("NOTIFY_OPERATION_TTL_SECS", 3600).max(60));
        let queue_capacity = parse_env_or("NOTIFY_QUEUE_CAPACITY", 1024).max(1) as usize;
        let max_concurrent = parse_env_or("NOTIFY_MAX_CONCURRENT", 16).max(1) as usize;

        Ok(Config {
            app_env,
            database_url,
            rust_log,
            host,
            port,
            notify_encryption_key,
            allow_insecure_urls,
            max_attempts: max_attempts as i32,
            request_timeout,
            retry_cooldown,
            sweep_interval,
            operation_ttl,
            queue_capacity,
            max_concurrent,
        })
    }

    /// Get the server bind address as a socket address string.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Validate security configuration based on the application environment.
    ///
    /// In **production** mode: returns `Err(errors)` listing all insecure
    /// settings found. In **development** mode: returns `Ok(warnings)`.
    pub fn validate_security_config(&self) -> Result<Vec<String>, Vec<String>> {
        let mut issues = Vec::new();

        if self.notify_encryption_key == INSECURE_NOTIFY_KEY {
            issues.push("NOTIFY_ENCRYPTION_KEY is using the default insecure value".to_string());
        }

        if self.allow_insecure_urls {
            issues.push(
                "NOTIFY_ALLOW_INSECURE_URLS is enabled; destination URL validation is relaxed"
                    .to_string(),
            );
        }

        if issues.is_empty() {
            return Ok(Vec::new());
        }

        if self.app_env.is_production() {
            Err(issues)
        } else {
            Ok(issues)
        }
    }
}

fn parse_env_or(var: &str, default: i64) -> i64 {
    env::var(var)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

/// Narrow a signed seconds value to the `u64` that `Duration::from_secs`
/// takes; zero and negative values fall back to the default.
fn positive_secs(value: i64, fallback: u64) -> u64 {
    u64::try_from(value).ok().filter(|v| *v > 0).unwrap_or(fallback)
}

/// Parse hex-encoded 32-byte encryption key.
fn parse_hex_encryption_key(var_name: &str, hex_str: &str) -> Result<[u8; 32], ConfigError> {
    let bytes = hex::decode(hex_str).map_err(|_| ConfigError::InvalidValue {
        var: var_name.to_string(),
        message: "Must be 64 hex characters (32 bytes)".to_string(),
    })?;

    if bytes.len() != 32 {
        return Err(ConfigError::InvalidValue {
            var: var_name.to_string(),
            message: format!("Expected 32 bytes, got {}", bytes.len()),
        });
    }

    let mut key = [0u8; 32];
    key.copy_from_slice(&bytes);
    Ok(key)
}
