//! Ledger configuration, loaded from the environment.
//!
//! Everything is passed around as an explicit [`LedgerConfig`] value; nothing
//! is cached process-wide.

use std::time::Duration;

use thiserror::Error;

use crate::ledger::RetryPolicy;

pub const DATABASE_URL: &str = "DATABASE_URL";
pub const DB_MAX_CONNECTIONS: &str = "STOCKLEDGER_DB_MAX_CONNECTIONS";
pub const DB_MIN_CONNECTIONS: &str = "STOCKLEDGER_DB_MIN_CONNECTIONS";
pub const DB_ACQUIRE_TIMEOUT_SECS: &str = "STOCKLEDGER_DB_ACQUIRE_TIMEOUT_SECS";
pub const DB_IDLE_TIMEOUT_SECS: &str = "STOCKLEDGER_DB_IDLE_TIMEOUT_SECS";
pub const MAX_ATTEMPTS: &str = "STOCKLEDGER_MAX_ATTEMPTS";
pub const RETRY_BACKOFF_MS: &str = "STOCKLEDGER_RETRY_BACKOFF_MS";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{var} is not set")]
    Missing { var: &'static str },

    #[error("invalid value {value:?} for {var}: {reason}")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },
}

/// Connection pool settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolConfig {
    pub max_connections: u32,
    pub min_connections: u32,
    pub acquire_timeout: Duration,
    pub idle_timeout: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_connections: 10,
            min_connections: 0,
            acquire_timeout: Duration::from_secs(30),
            idle_timeout: Duration::from_secs(600),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LedgerConfig {
    /// Postgres connection string. Only needed by the Postgres backend.
    pub database_url: Option<String>,
    pub pool: PoolConfig,
    pub retry: RetryPolicy,
}

impl LedgerConfig {
    /// Load from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Load using `lookup` to resolve variables. Unset variables fall back to
    /// their defaults; set but malformed ones are an error.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = PoolConfig::default();
        let retry_defaults = RetryPolicy::default();

        let database_url = lookup(DATABASE_URL).filter(|url| !url.trim().is_empty());

        let pool = PoolConfig {
            max_connections: parse_or(&lookup, DB_MAX_CONNECTIONS, defaults.max_connections)?,
            min_connections: parse_or(&lookup, DB_MIN_CONNECTIONS, defaults.min_connections)?,
            acquire_timeout: parse_or(&lookup, DB_ACQUIRE_TIMEOUT_SECS, defaults.acquire_timeout.as_secs())
                .map(Duration::from_secs)?,
            idle_timeout: parse_or(&lookup, DB_IDLE_TIMEOUT_SECS, defaults.idle_timeout.as_secs())
                .map(Duration::from_secs)?,
        };

        if pool.max_connections == 0 {
            return Err(invalid(DB_MAX_CONNECTIONS, "0", "must be at least 1"));
        }
        if pool.min_connections > pool.max_connections {
            return Err(invalid(
                DB_MIN_CONNECTIONS,
                &pool.min_connections.to_string(),
                "exceeds the maximum pool size",
            ));
        }

        let max_attempts: u32 = parse_or(&lookup, MAX_ATTEMPTS, retry_defaults.max_attempts)?;
        if max_attempts == 0 {
            return Err(invalid(MAX_ATTEMPTS, "0", "must be at least 1"));
        }
        let backoff_ms: u64 = parse_or(
            &lookup,
            RETRY_BACKOFF_MS,
            u64::try_from(retry_defaults.backoff.as_millis()).unwrap_or(u64::MAX),
        )?;

        Ok(Self {
            database_url,
            pool,
            retry: RetryPolicy::new(max_attempts, Duration::from_millis(backoff_ms)),
        })
    }

    pub fn require_database_url(&self) -> Result<&str, ConfigError> {
        self.database_url
            .as_deref()
            .ok_or(ConfigError::Missing { var: DATABASE_URL })
    }
}

fn invalid(var: &'static str, value: &str, reason: &str) -> ConfigError {
    ConfigError::Invalid {
        var,
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

fn parse_or<F, T>(lookup: &F, var: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(var) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e: T::Err| invalid(var, &raw, &e.to_string())),
    }
}
