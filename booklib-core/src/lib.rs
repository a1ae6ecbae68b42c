//! booklib-core: database lifecycle for the book library API
//!
//! Owns the environment-driven configuration, the bounded Postgres
//! connection pool, and the health probe the HTTP layer reports on.
//! The GraphQL engine borrows connections through [`DbPool::acquire`]
//! and returns them on drop; nothing here interprets its queries.

pub mod config;
pub mod error;
pub mod pool;

pub use config::DatabaseConfig;
pub use error::{BooklibError, Result};
pub use pool::DbPool;
