//! Server startup errors.

use thiserror::Error;

/// Failure to bring the HTTP listener up.
#[derive(Debug, Error)]
pub enum ServerError {
    /// The listen address could not be bound.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        /// Address that was requested.
        addr: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Other listener I/O failure.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
