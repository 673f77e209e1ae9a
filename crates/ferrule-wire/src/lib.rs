//! JSON-RPC message model and framing for the Language Server Protocol.
//!
//! This crate provides the wire layer of the ferrule runtime: the
//! [`Message`] model (requests, notifications and responses), the
//! `Content-Length` frame codec, and async reader/writer wrappers that move
//! messages over any byte stream.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod codec;
pub mod error;
pub mod message;
pub mod reader;
pub mod writer;

pub use codec::{Decoded, FrameDecoder, encode};
pub use error::{Error, Result};
pub use message::{Message, Notification, Request, RequestId, Response, ResponseError, error_code};
pub use reader::MessageReader;
pub use writer::MessageWriter;
