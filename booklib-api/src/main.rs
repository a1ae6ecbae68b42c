//! booklib-api: HTTP entry point for the book library API
//!
//! Wires the environment configuration, the database pool and the
//! server lifecycle together. The query engine mounts its own routes;
//! this binary only starts and stops the core around it.
//!
//! Exit codes: 0 after a clean drain, 1 for startup failures and for
//! a drain that blew its deadline.

use anyhow::{Context, Result};
use booklib_core::{DatabaseConfig, DbPool};
use booklib_server::{ApiServer, ServerConfig};
use clap::Parser;

mod tracing_setup;

#[derive(Parser, Debug)]
#[command(
    name = "booklib-api",
    version,
    about = "API server for the book library"
)]
struct Cli {
    /// Listen host (overrides HOST)
    #[arg(long)]
    host: Option<String>,

    /// Listen port (overrides PORT)
    #[arg(long)]
    port: Option<u16>,

    /// Enable debug logging (RUST_LOG takes precedence)
    #[arg(long, short = 'd')]
    debug: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    tracing_setup::init(cli.debug)?;

    let db_config = DatabaseConfig::from_env().context("loading database configuration")?;
    let mut server_config = ServerConfig::from_env().context("loading server configuration")?;
    if let Some(host) = cli.host {
        server_config.host = host;
    }
    if let Some(port) = cli.port {
        server_config.port = port;
    }

    // Lazy pool: a database that is down at boot surfaces as an
    // unhealthy probe, not a startup failure.
    let pool = DbPool::connect_lazy(&db_config).context("building connection pool")?;

    tracing::info!(
        host = %server_config.host,
        port = server_config.port,
        pool_min = db_config.pool_min,
        pool_max = db_config.pool_max,
        "starting booklib API"
    );

    ApiServer::new(pool, server_config)
        .run()
        .await
        .context("server terminated")?;

    Ok(())
}
