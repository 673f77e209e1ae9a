//! Error types for the JSON language server.

use thiserror::Error;

/// Errors from running the server.
#[derive(Debug, Error)]
pub enum Error {
    /// Runtime error
    #[error("Server error: {0}")]
    Server(#[from] ferrule::Error),

    /// The TCP listener could not be bound
    #[error("Failed to listen on {address}: {source}")]
    Bind {
        /// Requested address
        address: String,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for the JSON language server.
pub type Result<T> = std::result::Result<T, Error>;
