//! Server lifecycle: bind, serve, drain, stop.
//!
//! The controller is an explicit state machine published on a watch
//! channel (readiness observes it) rather than nested shutdown
//! callbacks:
//!
//!   Starting → Listening → Draining → Stopped
//!
//! A termination signal moves the server to Draining: the listener
//! stops accepting, in-flight requests get to finish, and a drain
//! deadline bounds the wait. A drain that blows the deadline closes
//! the pool best-effort and surfaces [`ServeError::DrainTimeout`],
//! which the binary maps to a non-zero exit.

use std::future::{Future, IntoFuture};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use booklib_core::{config::env_or, BooklibError, DbPool};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::error::ServeError;
use crate::routes;
use crate::state::AppState;

/// How long a forced shutdown still waits for the pool to close after
/// the drain deadline has already expired. Keeps the forced path from
/// leaking database sessions without making it unbounded again.
const POOL_CLOSE_GRACE: Duration = Duration::from_secs(2);

/// Lifecycle states, in the order the server moves through them.
/// Stopped is terminal; a bind failure skips straight to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    Starting,
    Listening,
    Draining,
    Stopped,
}

/// Listen address and drain policy
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Upper bound on the Draining state (default 10s)
    pub drain_deadline: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 3000,
            drain_deadline: Duration::from_secs(10),
        }
    }
}

impl ServerConfig {
    /// Load from `HOST`, `PORT` and `SHUTDOWN_DRAIN_SECS`
    pub fn from_env() -> Result<Self, BooklibError> {
        let defaults = Self::default();
        Ok(Self {
            host: env_or("HOST", defaults.host)?,
            port: env_or("PORT", defaults.port)?,
            drain_deadline: Duration::from_secs(env_or("SHUTDOWN_DRAIN_SECS", 10u64)?),
        })
    }
}

/// Build the application router: probe routes plus whatever the query
/// engine mounts, sharing one [`AppState`].
pub fn build_router(state: AppState, engine: Router<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .merge(routes::router())
        .merge(engine)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Unbound server: owns the pool handle and the lifecycle channel
pub struct ApiServer {
    pool: DbPool,
    config: ServerConfig,
    engine: Router<AppState>,
    lifecycle: Arc<watch::Sender<Lifecycle>>,
}

impl ApiServer {
    pub fn new(pool: DbPool, config: ServerConfig) -> Self {
        let (tx, _rx) = watch::channel(Lifecycle::Starting);
        Self {
            pool,
            config,
            engine: Router::new(),
            lifecycle: Arc::new(tx),
        }
    }

    /// Mount the external query engine's routes.
    ///
    /// Engine handlers receive the pool capability through
    /// [`AppState::pool`] and return borrowed connections by dropping
    /// them; the core never interprets the queries they issue.
    pub fn with_engine(mut self, engine: Router<AppState>) -> Self {
        self.engine = engine;
        self
    }

    /// Observe lifecycle transitions (used by probes and tests)
    pub fn lifecycle(&self) -> watch::Receiver<Lifecycle> {
        self.lifecycle.subscribe()
    }

    /// Bind the listen socket. A bind failure is fatal: the lifecycle
    /// jumps to Stopped and the error propagates to the process
    /// boundary.
    pub async fn bind(self) -> Result<BoundServer, ServeError> {
        let state = AppState::new(self.pool.clone(), self.lifecycle.subscribe());
        let app = build_router(state, self.engine);

        let listener = match TcpListener::bind((self.config.host.as_str(), self.config.port)).await
        {
            Ok(listener) => listener,
            Err(source) => {
                self.lifecycle.send_replace(Lifecycle::Stopped);
                return Err(ServeError::Bind {
                    addr: format!("{}:{}", self.config.host, self.config.port),
                    source,
                });
            }
        };

        Ok(BoundServer {
            listener,
            app,
            pool: self.pool,
            lifecycle: self.lifecycle,
            drain_deadline: self.config.drain_deadline,
        })
    }

    /// Bind and serve until SIGTERM or Ctrl+C
    pub async fn run(self) -> Result<(), ServeError> {
        self.bind().await?.run_until(shutdown_signal()).await
    }
}

/// Server with its socket bound, ready to serve
#[derive(Debug)]
pub struct BoundServer {
    listener: TcpListener,
    app: Router,
    pool: DbPool,
    lifecycle: Arc<watch::Sender<Lifecycle>>,
    drain_deadline: Duration,
}

impl BoundServer {
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Serve until `shutdown` resolves, then drain within the deadline.
    ///
    /// Returns `Ok(())` after a clean drain (pool closed, state
    /// Stopped) and [`ServeError::DrainTimeout`] when in-flight
    /// requests outlive the deadline.
    pub async fn run_until(
        self,
        shutdown: impl Future<Output = ()> + Send + 'static,
    ) -> Result<(), ServeError> {
        let BoundServer {
            listener,
            app,
            pool,
            lifecycle,
            drain_deadline,
        } = self;

        if let Ok(addr) = listener.local_addr() {
            tracing::info!(%addr, "server listening");
        }
        lifecycle.send_replace(Lifecycle::Listening);

        let drain_trigger = Arc::clone(&lifecycle);
        let mut server = tokio::spawn(
            axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    shutdown.await;
                    tracing::info!("termination signal received, draining in-flight requests");
                    drain_trigger.send_replace(Lifecycle::Draining);
                })
                .into_future(),
        );

        let mut draining = lifecycle.subscribe();
        let ended = tokio::select! {
            // Accept loop ended on its own (I/O failure).
            res = &mut server => Some(res),
            _ = draining.wait_for(|s| *s == Lifecycle::Draining) => None,
        };

        let result = match ended {
            Some(res) => join_result(res),
            // Draining: wait out the in-flight requests, bounded.
            None => match tokio::time::timeout(drain_deadline, &mut server).await {
                Ok(res) => join_result(res),
                Err(_) => {
                    tracing::error!(
                        deadline_secs = drain_deadline.as_secs(),
                        "drain deadline expired, forcing shutdown"
                    );
                    let _ = tokio::time::timeout(POOL_CLOSE_GRACE, pool.close()).await;
                    server.abort();
                    Err(ServeError::DrainTimeout {
                        deadline: drain_deadline,
                    })
                }
            },
        };

        if !matches!(result, Err(ServeError::DrainTimeout { .. })) {
            pool.close().await;
        }
        lifecycle.send_replace(Lifecycle::Stopped);
        if result.is_ok() {
            tracing::info!("server stopped cleanly");
        }
        result
    }
}

fn join_result(
    res: Result<std::io::Result<()>, tokio::task::JoinError>,
) -> Result<(), ServeError> {
    match res {
        Ok(io_res) => io_res.map_err(ServeError::Io),
        Err(err) => Err(ServeError::Io(std::io::Error::other(err))),
    }
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("received Ctrl+C, starting shutdown");
        }
        _ = terminate => {
            tracing::info!("received SIGTERM, starting shutdown");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use axum::routing::get;
    use booklib_core::DatabaseConfig;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;
    use tokio::sync::oneshot;

    fn test_pool() -> DbPool {
        let cfg = DatabaseConfig {
            host: "127.0.0.1".to_string(),
            port: 1,
            pool_min: 0,
            connect_timeout: Duration::from_millis(300),
            query_timeout: Duration::from_millis(300),
            ..DatabaseConfig::default()
        };
        DbPool::connect_lazy(&cfg).expect("lazy pool")
    }

    fn test_config(port: u16, drain: Duration) -> ServerConfig {
        ServerConfig {
            host: "127.0.0.1".to_string(),
            port,
            drain_deadline: drain,
        }
    }

    /// Routes standing in for the query engine in lifecycle tests
    fn engine_router() -> Router<AppState> {
        Router::new()
            .route(
                "/slow",
                get(|| async {
                    tokio::time::sleep(Duration::from_millis(300)).await;
                    "done"
                }),
            )
            .route(
                "/hang",
                get(|| async {
                    tokio::time::sleep(Duration::from_secs(60)).await;
                    "late"
                }),
            )
    }

    async fn http_get(addr: SocketAddr, path: &str) -> String {
        let mut stream = TcpStream::connect(addr).await.expect("connect");
        let request = format!("GET {path} HTTP/1.1\r\nhost: localhost\r\nconnection: close\r\n\r\n");
        stream.write_all(request.as_bytes()).await.expect("write");
        let mut response = String::new();
        stream.read_to_string(&mut response).await.expect("read");
        response
    }

    #[tokio::test]
    async fn bind_failure_is_fatal_and_stops_the_lifecycle() {
        let blocker = std::net::TcpListener::bind("127.0.0.1:0").expect("blocker");
        let port = blocker.local_addr().expect("addr").port();

        let server = ApiServer::new(test_pool(), test_config(port, Duration::from_secs(1)));
        let lifecycle = server.lifecycle();

        let err = server.bind().await.expect_err("port is taken");
        assert!(matches!(err, ServeError::Bind { .. }));
        assert_eq!(*lifecycle.borrow(), Lifecycle::Stopped);
    }

    #[tokio::test]
    async fn clean_shutdown_walks_the_state_machine() {
        let pool = test_pool();
        let server = ApiServer::new(pool.clone(), test_config(0, Duration::from_secs(10)));
        let mut lifecycle = server.lifecycle();
        assert_eq!(*lifecycle.borrow(), Lifecycle::Starting);

        let bound = server.bind().await.expect("bind");
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let task = tokio::spawn(bound.run_until(async move {
            let _ = shutdown_rx.await;
        }));

        lifecycle
            .wait_for(|s| *s == Lifecycle::Listening)
            .await
            .expect("listening");
        shutdown_tx.send(()).expect("signal");

        task.await.expect("join").expect("clean shutdown");
        assert_eq!(*lifecycle.borrow(), Lifecycle::Stopped);
        assert!(pool.is_closed());
    }

    #[tokio::test]
    async fn in_flight_request_completes_before_shutdown() {
        let server = ApiServer::new(test_pool(), test_config(0, Duration::from_secs(10)))
            .with_engine(engine_router());
        let mut lifecycle = server.lifecycle();
        let bound = server.bind().await.expect("bind");
        let addr = bound.local_addr().expect("addr");

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let task = tokio::spawn(bound.run_until(async move {
            let _ = shutdown_rx.await;
        }));
        lifecycle
            .wait_for(|s| *s == Lifecycle::Listening)
            .await
            .expect("listening");

        // Start a request that outlives the signal but not the deadline.
        let request = tokio::spawn(async move { http_get(addr, "/slow").await });
        tokio::time::sleep(Duration::from_millis(100)).await;
        shutdown_tx.send(()).expect("signal");

        let response = request.await.expect("request task");
        assert!(response.starts_with("HTTP/1.1 200"), "got: {response}");
        assert!(response.ends_with("done"), "got: {response}");

        task.await.expect("join").expect("drained cleanly");
        assert_eq!(*lifecycle.borrow(), Lifecycle::Stopped);
    }

    #[tokio::test]
    async fn hung_request_trips_the_drain_deadline() {
        let pool = test_pool();
        let server = ApiServer::new(pool.clone(), test_config(0, Duration::from_millis(500)))
            .with_engine(engine_router());
        let mut lifecycle = server.lifecycle();
        let bound = server.bind().await.expect("bind");
        let addr = bound.local_addr().expect("addr");

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let task = tokio::spawn(bound.run_until(async move {
            let _ = shutdown_rx.await;
        }));
        lifecycle
            .wait_for(|s| *s == Lifecycle::Listening)
            .await
            .expect("listening");

        let request = tokio::spawn(async move { http_get(addr, "/hang").await });
        tokio::time::sleep(Duration::from_millis(150)).await;
        shutdown_tx.send(()).expect("signal");

        let err = task.await.expect("join").expect_err("deadline must trip");
        assert!(matches!(err, ServeError::DrainTimeout { .. }));
        assert_eq!(*lifecycle.borrow(), Lifecycle::Stopped);
        // Forced path still closed the pool best-effort.
        assert!(pool.is_closed());

        request.abort();
    }

    #[test]
    fn default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.port, 3000);
        assert_eq!(config.drain_deadline, Duration::from_secs(10));
    }
}
