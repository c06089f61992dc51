//! Configuration settings for the admission gate.

use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::error::GateError;
use crate::limiter::RateLimitPolicy;

/// Upper bound for lifetimes and cleanup intervals: ten years.
pub const MAX_LIFETIME_SECONDS: u64 = 10 * 365 * 24 * 60 * 60;

/// Upper bound for store and lookup timeouts.
pub const MAX_TIMEOUT_MS: u64 = 60_000;

/// Main configuration structure.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub auth: AuthConfig,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Credential configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    /// Path to the HMAC secret file.
    pub secret_path: PathBuf,
    /// Lifetime of access tokens in seconds.
    #[serde(default = "default_access_ttl")]
    pub access_token_ttl_seconds: u64,
    /// Lifetime of refresh tokens in seconds.
    #[serde(default = "default_refresh_ttl")]
    pub refresh_token_ttl_seconds: u64,
    /// Check session liveness for tokens that carry a session id.
    #[serde(default = "default_true")]
    pub verify_sessions: bool,
    /// How long identity lookups are cached (0 disables caching).
    #[serde(default = "default_principal_cache_ttl")]
    pub principal_cache_ttl_seconds: u64,
    /// Interval for purging expired identity cache entries.
    #[serde(default = "default_cleanup_interval")]
    pub principal_cache_cleanup_interval_seconds: u64,
    /// Timeout for session and identity lookups in milliseconds.
    #[serde(default = "default_lookup_timeout")]
    pub lookup_timeout_ms: u64,
}

/// What to do when the counter store cannot be reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// Admit the request.
    Open,
    /// Reject the request with a 503.
    #[default]
    Closed,
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitConfig {
    /// Counter store timeout in milliseconds.
    #[serde(default = "default_store_timeout")]
    pub store_timeout_ms: u64,
    #[serde(default)]
    pub failure_policy: FailurePolicy,
    /// Admit requests without a credential, rate limited by client IP.
    #[serde(default = "default_true")]
    pub allow_anonymous: bool,
    /// Budget per authenticated subject.
    #[serde(default = "default_user_budget")]
    pub user: BudgetConfig,
    /// Budget per client IP for anonymous requests.
    #[serde(default = "default_ip_budget")]
    pub ip: BudgetConfig,
    /// Interval for purging expired counters from the in-memory store.
    #[serde(default = "default_cleanup_interval")]
    pub cleanup_interval_seconds: u64,
}

/// A request budget as written in the configuration file.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct BudgetConfig {
    /// Maximum requests per window.
    pub requests: u64,
    /// Window length in seconds.
    pub window_seconds: u64,
}

impl BudgetConfig {
    pub fn policy(&self) -> Result<RateLimitPolicy, GateError> {
        RateLimitPolicy::new(self.requests, self.window_seconds)
    }
}

/// Session store configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    /// Session lifetime in seconds.
    #[serde(default = "default_refresh_ttl")]
    pub ttl_seconds: u64,
    /// Interval for purging expired sessions.
    #[serde(default = "default_cleanup_interval")]
    pub cleanup_interval_seconds: u64,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Log format ("pretty" or "json").
    #[serde(default = "default_log_format")]
    pub format: String,
}

// Default value functions
fn default_true() -> bool {
    true
}

fn default_access_ttl() -> u64 {
    30 * 60
}

fn default_refresh_ttl() -> u64 {
    7 * 24 * 60 * 60
}

fn default_principal_cache_ttl() -> u64 {
    30
}

fn default_lookup_timeout() -> u64 {
    50
}

fn default_store_timeout() -> u64 {
    50
}

fn default_user_budget() -> BudgetConfig {
    BudgetConfig {
        requests: 100,
        window_seconds: 60,
    }
}

fn default_ip_budget() -> BudgetConfig {
    BudgetConfig {
        requests: 60,
        window_seconds: 60,
    }
}

fn default_cleanup_interval() -> u64 {
    60
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            store_timeout_ms: default_store_timeout(),
            failure_policy: FailurePolicy::default(),
            allow_anonymous: default_true(),
            user: default_user_budget(),
            ip: default_ip_budget(),
            cleanup_interval_seconds: default_cleanup_interval(),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            ttl_seconds: default_refresh_ttl(),
            cleanup_interval_seconds: default_cleanup_interval(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl Settings {
    /// Load settings from a TOML configuration file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, GateError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            GateError::config(format!(
                "Failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;

        Self::from_toml_str(&content).map_err(|e| match e {
            GateError::Config { message } => GateError::config(format!(
                "Invalid config file '{}': {}",
                path.display(),
                message
            )),
            other => other,
        })
    }

    /// Parse and validate settings from TOML text.
    pub fn from_toml_str(content: &str) -> Result<Self, GateError> {
        let settings: Settings =
            toml::from_str(content).map_err(|e| GateError::config(e.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }

    /// Validate the settings.
    pub fn validate(&self) -> Result<(), GateError> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.to_lowercase().as_str()) {
            return Err(GateError::config(format!(
                "Invalid log level '{}'. Valid levels: {:?}",
                self.logging.level, valid_levels
            )));
        }

        let valid_formats = ["pretty", "json"];
        if !valid_formats.contains(&self.logging.format.to_lowercase().as_str()) {
            return Err(GateError::config(format!(
                "Invalid log format '{}'. Valid formats: {:?}",
                self.logging.format, valid_formats
            )));
        }

        check_bounds(
            "auth.access_token_ttl_seconds",
            self.auth.access_token_ttl_seconds,
            MAX_LIFETIME_SECONDS,
        )?;
        check_bounds(
            "auth.refresh_token_ttl_seconds",
            self.auth.refresh_token_ttl_seconds,
            MAX_LIFETIME_SECONDS,
        )?;
        check_bounds("session.ttl_seconds", self.session.ttl_seconds, MAX_LIFETIME_SECONDS)?;

        // Zero disables the identity cache
        if self.auth.principal_cache_ttl_seconds > MAX_LIFETIME_SECONDS {
            return Err(GateError::config(format!(
                "auth.principal_cache_ttl_seconds must be at most {}, got {}",
                MAX_LIFETIME_SECONDS, self.auth.principal_cache_ttl_seconds
            )));
        }

        check_bounds("auth.lookup_timeout_ms", self.auth.lookup_timeout_ms, MAX_TIMEOUT_MS)?;
        check_bounds(
            "rate_limit.store_timeout_ms",
            self.rate_limit.store_timeout_ms,
            MAX_TIMEOUT_MS,
        )?;

        check_bounds(
            "auth.principal_cache_cleanup_interval_seconds",
            self.auth.principal_cache_cleanup_interval_seconds,
            MAX_LIFETIME_SECONDS,
        )?;
        check_bounds(
            "rate_limit.cleanup_interval_seconds",
            self.rate_limit.cleanup_interval_seconds,
            MAX_LIFETIME_SECONDS,
        )?;
        check_bounds(
            "session.cleanup_interval_seconds",
            self.session.cleanup_interval_seconds,
            MAX_LIFETIME_SECONDS,
        )?;

        self.rate_limit.user.policy()?;
        self.rate_limit.ip.policy()?;

        Ok(())
    }
}

fn check_bounds(name: &str, value: u64, max: u64) -> Result<(), GateError> {
    if value == 0 || value > max {
        return Err(GateError::config(format!(
            "{} must be between 1 and {}, got {}",
            name, max, value
        )));
    }
    Ok(())
}
