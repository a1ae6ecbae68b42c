//! Bounded Postgres connection pool with an explicit lifecycle.
//!
//! Wraps `sqlx::PgPool`: sizing and per-connection lifetimes come from
//! [`DatabaseConfig`], acquisition failures are mapped onto the
//! [`BooklibError`] taxonomy, and release is RAII (dropping the
//! checked-out connection returns it; sqlx destroys it instead when it
//! is broken or past its lifetime).

use std::time::Duration;

use sqlx::pool::PoolConnection;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::{PgPool, Postgres};

use crate::config::DatabaseConfig;
use crate::error::{BooklibError, Result};

/// Shared handle to the connection pool.
///
/// Cheap to clone; all clones refer to the same pool. The server keeps
/// one for shutdown, the HTTP state another, and the query engine
/// borrows connections per request through [`DbPool::acquire`].
#[derive(Debug, Clone)]
pub struct DbPool {
    inner: PgPool,
    acquire_timeout: Duration,
    query_timeout: Duration,
}

impl DbPool {
    /// Connect eagerly, failing fast when the database is unreachable
    pub async fn connect(cfg: &DatabaseConfig) -> Result<Self> {
        cfg.validate()?;
        let pool = pool_options(cfg)
            .connect_with(connect_options(cfg)?)
            .await
            .map_err(|source| BooklibError::Connection { source })?;
        Ok(Self::wrap(pool, cfg))
    }

    /// Build the pool without touching the network.
    ///
    /// Sessions are established on first acquire, so a database that is
    /// down at boot shows up as an unhealthy probe rather than a
    /// startup failure.
    pub fn connect_lazy(cfg: &DatabaseConfig) -> Result<Self> {
        cfg.validate()?;
        let pool = pool_options(cfg).connect_lazy_with(connect_options(cfg)?);
        Ok(Self::wrap(pool, cfg))
    }

    fn wrap(pool: PgPool, cfg: &DatabaseConfig) -> Self {
        Self {
            inner: pool,
            acquire_timeout: cfg.connect_timeout,
            query_timeout: cfg.query_timeout,
        }
    }

    /// Check out a connection.
    ///
    /// Fails with [`BooklibError::PoolExhausted`] when every slot is
    /// checked out for the whole acquire timeout, with
    /// [`BooklibError::Connection`] when a fresh session cannot be
    /// established, and with [`BooklibError::PoolClosed`] after
    /// [`DbPool::close`]. Nothing is retried here.
    pub async fn acquire(&self) -> Result<PoolConnection<Postgres>> {
        self.inner
            .acquire()
            .await
            .map_err(|err| map_acquire_err(err, self.acquire_timeout))
    }

    /// Round-trip a trivial query and report liveness.
    ///
    /// Never returns an error: acquisition failures, query failures and
    /// the client-side query timeout all collapse to `false`. Both the
    /// liveness and readiness endpoints report this signal.
    pub async fn ping(&self) -> bool {
        let probe = async {
            let mut conn = self.acquire().await?;
            sqlx::query("SELECT 1")
                .execute(&mut *conn)
                .await
                .map_err(|source| BooklibError::Query { source })?;
            Ok::<(), BooklibError>(())
        };
        match tokio::time::timeout(self.query_timeout, probe).await {
            Ok(Ok(())) => true,
            Ok(Err(err)) => {
                tracing::warn!(error = %err, "database health probe failed");
                false
            }
            Err(_) => {
                tracing::warn!(
                    timeout_ms = self.query_timeout.as_millis() as u64,
                    "database health probe timed out"
                );
                false
            }
        }
    }

    /// Wait for checked-out connections to come back, then close the
    /// pool. Idempotent; acquiring afterwards fails with `PoolClosed`.
    pub async fn close(&self) {
        if self.inner.is_closed() {
            return;
        }
        tracing::info!(
            size = self.size(),
            idle = self.num_idle(),
            "closing database pool"
        );
        self.inner.close().await;
    }

    pub fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }

    /// Live connections, checked out or idle
    pub fn size(&self) -> u32 {
        self.inner.size()
    }

    /// Connections currently sitting idle in the pool
    pub fn num_idle(&self) -> usize {
        self.inner.num_idle()
    }
}

fn pool_options(cfg: &DatabaseConfig) -> PgPoolOptions {
    PgPoolOptions::new()
        .max_connections(cfg.pool_max)
        .min_connections(cfg.pool_min)
        .acquire_timeout(cfg.connect_timeout)
        .idle_timeout(cfg.idle_timeout)
        .max_lifetime(cfg.max_lifetime)
}

fn connect_options(cfg: &DatabaseConfig) -> Result<PgConnectOptions> {
    let mut opts = match &cfg.url {
        Some(url) => url
            .parse::<PgConnectOptions>()
            .map_err(|err| BooklibError::config(format!("invalid DATABASE_URL: {err}")))?,
        None => {
            let mut opts = PgConnectOptions::new().host(&cfg.host).port(cfg.port);
            if let Some(user) = &cfg.user {
                opts = opts.username(user);
            }
            if let Some(password) = &cfg.password {
                opts = opts.password(password);
            }
            if let Some(database) = &cfg.database {
                opts = opts.database(database);
            }
            opts
        }
    };
    // statement_timeout is in milliseconds, tcp_keepalives_idle in
    // seconds; both are server-side session settings.
    opts = opts.application_name(&cfg.application_name).options([
        (
            "statement_timeout",
            cfg.statement_timeout.as_millis().to_string(),
        ),
        (
            "tcp_keepalives_idle",
            cfg.keepalive_delay.as_secs().max(1).to_string(),
        ),
    ]);
    Ok(opts)
}

fn map_acquire_err(err: sqlx::Error, acquire_timeout: Duration) -> BooklibError {
    match err {
        sqlx::Error::PoolTimedOut => BooklibError::PoolExhausted {
            timeout: acquire_timeout,
        },
        sqlx::Error::PoolClosed => BooklibError::PoolClosed,
        source => BooklibError::Connection { source },
    }
}
