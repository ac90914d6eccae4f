// src/config.rs

use std::{env, net::SocketAddr};

use dotenvy::dotenv;
use url::Url;

/// Score (percentage) at or above which a completion counts as passed
/// when the fixed threshold is in effect.
pub const PASSING_SCORE_PERCENTAGE: f64 = 70.0;

/// Where progress and badge data lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    Postgres,
    Memory,
}

/// Which threshold decides pass/fail on completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassThresholdMode {
    /// Always `PASSING_SCORE_PERCENTAGE`, regardless of the scenario.
    Fixed,
    /// The scenario's own `passing_score`.
    Scenario,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: Option<String>,
    pub storage_backend: StorageBackend,
    pub jwt_secret: String,
    pub jwt_expiration: u64,
    pub rust_log: String,
    pub log_dir: String,
    pub bind_addr: SocketAddr,
    pub badge_webhook_url: Option<Url>,
    pub pass_threshold_mode: PassThresholdMode,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("invalid value for {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the config from any key lookup; `from_env` passes the process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let storage_backend = match lookup("STORAGE_BACKEND").as_deref() {
            None | Some("postgres") => StorageBackend::Postgres,
            Some("memory") => StorageBackend::Memory,
            Some(other) => {
                return Err(ConfigError::Invalid {
                    key: "STORAGE_BACKEND",
                    reason: format!("expected 'postgres' or 'memory', got '{}'", other),
                });
            }
        };

        let database_url = lookup("DATABASE_URL");
        if storage_backend == StorageBackend::Postgres && database_url.is_none() {
            return Err(ConfigError::Missing("DATABASE_URL"));
        }

        let jwt_secret = lookup("JWT_SECRET").ok_or(ConfigError::Missing("JWT_SECRET"))?;

        let jwt_expiration = match lookup("JWT_EXPIRATION") {
            Some(raw) => raw.parse::<u64>().map_err(|e| ConfigError::Invalid {
                key: "JWT_EXPIRATION",
                reason: e.to_string(),
            })?,
            None => 86_400,
        };

        let rust_log = lookup("RUST_LOG").unwrap_or_else(|| "info".to_string());
        let log_dir = lookup("LOG_DIR").unwrap_or_else(|| "logs".to_string());

        let bind_addr = lookup("BIND_ADDR")
            .unwrap_or_else(|| "0.0.0.0:3000".to_string())
            .parse::<SocketAddr>()
            .map_err(|e| ConfigError::Invalid {
                key: "BIND_ADDR",
                reason: e.to_string(),
            })?;

        let badge_webhook_url = match lookup("BADGE_WEBHOOK_URL") {
            Some(raw) if !raw.trim().is_empty() => {
                let url = Url::parse(raw.trim()).map_err(|e| ConfigError::Invalid {
                    key: "BADGE_WEBHOOK_URL",
                    reason: e.to_string(),
                })?;
                if url.scheme() != "http" && url.scheme() != "https" {
                    return Err(ConfigError::Invalid {
                        key: "BADGE_WEBHOOK_URL",
                        reason: "scheme must be http or https".to_string(),
                    });
                }
                Some(url)
            }
            _ => None,
        };

        let pass_threshold_mode = match lookup("PASS_THRESHOLD_MODE").as_deref() {
            None | Some("fixed") => PassThresholdMode::Fixed,
            Some("scenario") => PassThresholdMode::Scenario,
            Some(other) => {
                return Err(ConfigError::Invalid {
                    key: "PASS_THRESHOLD_MODE",
                    reason: format!("expected 'fixed' or 'scenario', got '{}'", other),
                });
            }
        };

        Ok(Self {
            database_url,
            storage_backend,
            jwt_secret,
            jwt_expiration,
            rust_log,
            log_dir,
            bind_addr,
            badge_webhook_url,
            pass_threshold_mode,
        })
    }
}
