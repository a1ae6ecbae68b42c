//! Error types for booklib-server

use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ServeError {
    /// The listen socket could not be bound; fatal at startup
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// The accept loop failed while serving
    #[error("server I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// In-flight requests did not finish before the drain deadline;
    /// the process exits non-zero instead of waiting indefinitely
    #[error("drain deadline of {deadline:?} expired with requests still in flight")]
    DrainTimeout { deadline: Duration },
}
