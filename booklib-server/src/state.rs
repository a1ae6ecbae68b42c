//! Application state shared across handlers
//!
//! The pool is the only shared mutable resource; handlers otherwise
//! share nothing. The query engine reaches the database exclusively
//! through [`AppState::pool`].

use std::sync::Arc;

use booklib_core::DbPool;
use tokio::sync::watch;

use crate::server::Lifecycle;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    pool: DbPool,
    lifecycle: watch::Receiver<Lifecycle>,
}

impl AppState {
    pub fn new(pool: DbPool, lifecycle: watch::Receiver<Lifecycle>) -> Self {
        Self {
            inner: Arc::new(AppStateInner { pool, lifecycle }),
        }
    }

    /// The pool capability; borrowed connections are returned on drop
    pub fn pool(&self) -> &DbPool {
        &self.inner.pool
    }

    /// Current lifecycle state as last published by the controller
    pub fn lifecycle(&self) -> Lifecycle {
        *self.inner.lifecycle.borrow()
    }
}
