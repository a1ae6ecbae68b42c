//! Environment-driven configuration.
//!
//! Every option has a default; malformed values are a hard
//! configuration error rather than a silent fallback. Defaults match
//! the deployment the API has always run with:
//!
//!   DB_HOST=localhost DB_PORT=5432 DB_POOL_SIZE_MAX=30
//!   DB_POOL_SIZE_MIN=5 DB_CONNECT_TIMEOUT_MS=2000 ...
//!
//! `DATABASE_URL`, when set, supplies host/credentials wholesale and
//! the individual `DB_*` connection fields are ignored (pool sizing
//! and timeouts still apply).

use std::env;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{BooklibError, Result};

/// Read an environment variable, falling back to `default` when unset.
///
/// A present-but-unparseable value is a [`BooklibError::Config`], not a
/// fallback to the default.
pub fn env_or<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|err| BooklibError::config(format!("invalid value for {key}: {err}"))),
        Err(env::VarError::NotPresent) => Ok(default),
        Err(err) => Err(BooklibError::config(format!(
            "could not read {key}: {err}"
        ))),
    }
}

/// Read a millisecond-valued variable as a [`Duration`]
fn env_millis(key: &str, default: Duration) -> Result<Duration> {
    Ok(Duration::from_millis(env_or(
        key,
        default.as_millis() as u64,
    )?))
}

/// Connection and pool settings for the Postgres database
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// Full connection string; overrides host/port/credentials when set
    pub url: Option<String>,
    pub host: String,
    pub port: u16,
    pub user: Option<String>,
    pub password: Option<String>,
    pub database: Option<String>,
    /// Reported to Postgres as `application_name`
    pub application_name: String,
    pub pool_max: u32,
    pub pool_min: u32,
    /// How long `acquire` waits for a free slot or a fresh session
    pub connect_timeout: Duration,
    /// Server-side `statement_timeout` for every pooled session
    pub statement_timeout: Duration,
    /// Client-side bound on a single query round trip (health probe)
    pub query_timeout: Duration,
    /// Idle connections are destroyed after this long
    pub idle_timeout: Duration,
    /// Connections are destroyed on release once this old, healthy or
    /// not, so a failed-over database does not keep stale sessions
    pub max_lifetime: Duration,
    /// Delay before the first TCP keepalive probe on an idle socket
    pub keepalive_delay: Duration,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            host: "localhost".to_string(),
            port: 5432,
            user: None,
            password: None,
            database: None,
            application_name: "booklib".to_string(),
            pool_max: 30,
            pool_min: 5,
            connect_timeout: Duration::from_millis(2_000),
            statement_timeout: Duration::from_millis(60_000),
            query_timeout: Duration::from_millis(30_000),
            idle_timeout: Duration::from_millis(10_000),
            max_lifetime: Duration::from_secs(60),
            keepalive_delay: Duration::from_millis(10_000),
        }
    }
}

impl DatabaseConfig {
    /// Load from the environment, validating as we go
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();
        let cfg = Self {
            url: env::var("DATABASE_URL").ok(),
            host: env_or("DB_HOST", defaults.host)?,
            port: env_or("DB_PORT", defaults.port)?,
            user: env::var("DB_USER").ok(),
            password: env::var("DB_PASSWORD").ok(),
            database: env::var("DB_DATABASE").ok(),
            application_name: env_or("APP_NAME", defaults.application_name)?,
            pool_max: env_or("DB_POOL_SIZE_MAX", defaults.pool_max)?,
            pool_min: env_or("DB_POOL_SIZE_MIN", defaults.pool_min)?,
            connect_timeout: env_millis("DB_CONNECT_TIMEOUT_MS", defaults.connect_timeout)?,
            statement_timeout: env_millis("DB_STATEMENT_TIMEOUT_MS", defaults.statement_timeout)?,
            query_timeout: env_millis("DB_QUERY_TIMEOUT_MS", defaults.query_timeout)?,
            idle_timeout: env_millis("DB_IDLE_TIMEOUT_MS", defaults.idle_timeout)?,
            max_lifetime: Duration::from_secs(env_or(
                "DB_MAX_LIFETIME_SECS",
                defaults.max_lifetime.as_secs(),
            )?),
            keepalive_delay: env_millis("DB_KEEPALIVE_DELAY_MS", defaults.keepalive_delay)?,
        };
        cfg.validate()?;
        Ok(cfg)
    }

    /// Check the pool bounds are coherent
    pub fn validate(&self) -> Result<()> {
        if self.pool_max == 0 {
            return Err(BooklibError::config("DB_POOL_SIZE_MAX must be at least 1"));
        }
        if self.pool_min > self.pool_max {
            return Err(BooklibError::config(format!(
                "DB_POOL_SIZE_MIN ({}) exceeds DB_POOL_SIZE_MAX ({})",
                self.pool_min, self.pool_max
            )));
        }
        Ok(())
    }
}
