//! Error types for the ferrule runtime.
//!
//! Every error raised inside a handler is converted into a JSON-RPC
//! [`ResponseError`] at the dispatch boundary by
//! [`Error::to_response_error`]; nothing below the transport is fatal to the
//! session.

use std::time::Duration;

use ferrule_wire::{RequestId, ResponseError};
use thiserror::Error;

use crate::text::EditError;

/// Errors that can occur in the ferrule runtime.
#[derive(Debug, Error)]
pub enum Error {
    /// An I/O error on the transport or a configuration file.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A framing or message-shape error.
    #[error("Wire error: {0}")]
    Wire(#[from] ferrule_wire::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Misuse of the document store.
    #[error("Document error: {0}")]
    Document(#[from] DocumentError),

    /// Parameters did not match what the handler expects.
    #[error("Invalid params: {0}")]
    InvalidParams(String),

    /// A JSON-RPC error, either returned by the peer or raised by a handler.
    #[error("{0}")]
    Response(#[from] ResponseError),

    /// An outgoing request received no response in time.
    #[error("Request '{method}' timed out after {after:?}")]
    Timeout {
        /// Method of the timed out request.
        method: String,
        /// The timeout that elapsed.
        after: Duration,
    },

    /// An outgoing request was cancelled before its response arrived.
    #[error("Request {id} was cancelled")]
    Cancelled {
        /// Id of the cancelled request.
        id: RequestId,
    },

    /// The connection closed while a request was outstanding.
    #[error("Connection closed")]
    Disconnected,

    /// A handler panicked.
    #[error("Handler panicked: {0}")]
    HandlerPanicked(String),

    /// Invalid configuration.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Convert into the error object sent back to the client.
    #[must_use]
    pub fn to_response_error(&self) -> ResponseError {
        match self {
            Self::Response(error) => error.clone(),
            Self::InvalidParams(_) | Self::Json(_) => ResponseError::invalid_params(self.to_string()),
            Self::Document(_) => ResponseError::request_failed(self.to_string()),
            Self::Cancelled { .. } => ResponseError::request_cancelled(),
            _ => ResponseError::internal_error(self.to_string()),
        }
    }
}

/// Misuse of the document store.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DocumentError {
    /// `open` for a URI that is already open.
    #[error("document already open: {uri}")]
    AlreadyOpen {
        /// The document URI.
        uri: String,
    },

    /// Operation on a URI that is not open.
    #[error("unknown document: {uri}")]
    UnknownDocument {
        /// The document URI.
        uri: String,
    },

    /// A change whose version does not increase the current version.
    #[error("stale version {received} for {uri} (current version is {current})")]
    StaleVersion {
        /// The document URI.
        uri: String,
        /// Version held by the store.
        current: i32,
        /// Version carried by the rejected change.
        received: i32,
    },

    /// An edit range whose start lies after its end.
    #[error("invalid range {range} in change for {uri}")]
    InvalidRange {
        /// The document URI.
        uri: String,
        /// The offending range, as `line:character-line:character`.
        range: String,
    },

    /// Two ranges in the same edit batch overlap.
    #[error("overlapping edits in change for {uri}")]
    OverlappingEdits {
        /// The document URI.
        uri: String,
    },
}

impl DocumentError {
    pub(crate) fn from_edit(uri: &str, error: EditError) -> Self {
        let uri = uri.to_owned();
        match error {
            EditError::InvalidRange(range) => Self::InvalidRange {
                uri,
                range: format!(
                    "{}:{}-{}:{}",
                    range.start.line, range.start.character, range.end.line, range.end.character
                ),
            },
            EditError::Overlapping => Self::OverlappingEdits { uri },
        }
    }
}

/// Result type for ferrule operations.
pub type Result<T> = std::result::Result<T, Error>;
