//! booklib-server: HTTP surface and lifecycle for the book library API
//!
//! Exposes the liveness and readiness probes, carries the shared
//! [`AppState`] (the pool capability the query engine borrows per
//! request), and drives the Starting → Listening → Draining → Stopped
//! lifecycle with a bounded drain on shutdown.

pub mod error;
pub mod routes;
pub mod server;
pub mod state;

pub use error::ServeError;
pub use server::{build_router, ApiServer, BoundServer, Lifecycle, ServerConfig};
pub use state::AppState;
