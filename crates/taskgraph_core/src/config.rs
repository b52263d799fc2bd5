//! Runtime configuration for core callers.
//!
//! # Responsibility
//! - Collect database, logging, and retry settings in one value.
//! - Load overrides from `TASKGRAPH_*` environment variables.
//!
//! # Invariants
//! - Missing settings fall back to defaults; malformed ones are errors.

use crate::db::DbOptions;
use crate::logging::default_log_level;
use crate::service::task_service::{RetryPolicy, DEFAULT_MAX_ATTEMPTS};
use serde::Deserialize;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::PathBuf;
use std::time::Duration;

pub const ENV_DATABASE_PATH: &str = "TASKGRAPH_DATABASE_PATH";
pub const ENV_DATABASE_RESET: &str = "TASKGRAPH_DATABASE_RESET";
pub const ENV_BUSY_TIMEOUT_MS: &str = "TASKGRAPH_BUSY_TIMEOUT_MS";
pub const ENV_LOG_LEVEL: &str = "TASKGRAPH_LOG_LEVEL";
pub const ENV_LOG_DIR: &str = "TASKGRAPH_LOG_DIR";
pub const ENV_MAX_CONFLICT_ATTEMPTS: &str = "TASKGRAPH_MAX_CONFLICT_ATTEMPTS";

const DEFAULT_DATABASE_PATH: &str = "taskgraph.sqlite3";
const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

/// Malformed configuration value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    InvalidValue {
        key: &'static str,
        value: String,
        expected: &'static str,
    },
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidValue {
                key,
                value,
                expected,
            } => write!(f, "invalid {key} `{value}`; expected {expected}"),
        }
    }
}

impl Error for ConfigError {}

/// Core settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    /// SQLite file path.
    pub database_path: PathBuf,
    /// Drop and recreate the schema on open.
    pub database_reset: bool,
    /// Wait for a competing writer before reporting a conflict.
    pub busy_timeout_ms: u64,
    pub log_level: String,
    /// Absolute directory for rotating log files; logging stays off when unset.
    pub log_dir: Option<PathBuf>,
    /// Attempts per mutation when the write lock is contended.
    pub max_conflict_attempts: u32,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from(DEFAULT_DATABASE_PATH),
            database_reset: false,
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
            log_level: default_log_level().to_string(),
            log_dir: None,
            max_conflict_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }
}

impl CoreConfig {
    /// Defaults overridden by process environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults overridden by `lookup`, which maps variable names to values.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(path) = non_blank(lookup(ENV_DATABASE_PATH)) {
            config.database_path = PathBuf::from(path);
        }
        if let Some(value) = non_blank(lookup(ENV_DATABASE_RESET)) {
            config.database_reset = parse_bool(ENV_DATABASE_RESET, &value)?;
        }
        if let Some(value) = non_blank(lookup(ENV_BUSY_TIMEOUT_MS)) {
            config.busy_timeout_ms = value.parse().map_err(|_| ConfigError::InvalidValue {
                key: ENV_BUSY_TIMEOUT_MS,
                value: value.clone(),
                expected: "milliseconds as a non-negative integer",
            })?;
        }
        if let Some(level) = non_blank(lookup(ENV_LOG_LEVEL)) {
            config.log_level = level;
        }
        if let Some(dir) = non_blank(lookup(ENV_LOG_DIR)) {
            config.log_dir = Some(PathBuf::from(dir));
        }
        if let Some(value) = non_blank(lookup(ENV_MAX_CONFLICT_ATTEMPTS)) {
            config.max_conflict_attempts = match value.parse::<u32>() {
                Ok(attempts) if attempts > 0 => attempts,
                _ => {
                    return Err(ConfigError::InvalidValue {
                        key: ENV_MAX_CONFLICT_ATTEMPTS,
                        value,
                        expected: "a positive integer",
                    })
                }
            };
        }

        Ok(config)
    }

    pub fn db_options(&self) -> DbOptions {
        DbOptions {
            busy_timeout: Duration::from_millis(self.busy_timeout_ms),
            reset: self.database_reset,
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_conflict_attempts,
        }
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|raw| raw.trim().to_string())
        .filter(|raw| !raw.is_empty())
}

fn parse_bool(key: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            key,
            value: value.to_string(),
            expected: "true|false",
        }),
    }
}
