//! Error types for ferrule-wire operations.

use std::io;
use thiserror::Error;

use crate::message::RequestId;

/// The error type for framing and message parsing.
#[derive(Debug, Error)]
pub enum Error {
    /// IO error occurred while reading or writing the stream.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// A header block ended without a `Content-Length` field.
    #[error("missing Content-Length header")]
    MissingContentLength,

    /// A header line could not be understood.
    #[error("invalid header: {0}")]
    InvalidHeader(String),

    /// The frame body is not valid JSON.
    #[error("failed to parse message body: {source}")]
    Parse {
        /// The underlying JSON error.
        #[source]
        source: serde_json::Error,
    },

    /// The body is JSON but not a valid JSON-RPC message.
    #[error("invalid message: {reason}")]
    InvalidMessage {
        /// The request id, when one could be recovered from the body.
        id: Option<RequestId>,
        /// What was wrong with the message.
        reason: String,
    },
}

impl Error {
    /// Builds an [`Error::InvalidMessage`].
    pub(crate) fn invalid(id: Option<RequestId>, reason: impl Into<String>) -> Self {
        Self::InvalidMessage {
            id,
            reason: reason.into(),
        }
    }

    /// Returns the request id recovered from a malformed message, if any.
    #[must_use]
    pub fn recovered_id(&self) -> Option<&RequestId> {
        match self {
            Self::InvalidMessage { id, .. } => id.as_ref(),
            _ => None,
        }
    }

    /// Returns `true` if this error is a protocol violation rather than a
    /// transport failure.
    ///
    /// Protocol errors leave the stream usable: the offending frame has been
    /// consumed and the next frame can be read.
    #[must_use]
    pub fn is_protocol(&self) -> bool {
        !matches!(self, Self::Io(_))
    }
}

/// A specialized Result type for ferrule-wire operations.
pub type Result<T> = std::result::Result<T, Error>;
