//! Async message writing.

use tokio::io::{AsyncWrite, AsyncWriteExt, BufWriter};
use tracing::trace;

use crate::codec::encode;
use crate::error::Result;
use crate::message::Message;

/// Async writer for framed JSON-RPC messages.
///
/// Each message is written as one complete frame and flushed immediately, so
/// a peer never observes half a frame.
pub struct MessageWriter<W> {
    /// Buffered writer wrapping the underlying async writer.
    writer: BufWriter<W>,
}

impl<W: AsyncWrite + Unpin> MessageWriter<W> {
    /// Creates a new `MessageWriter` wrapping the given async writer.
    #[must_use]
    pub fn new(writer: W) -> Self {
        Self {
            writer: BufWriter::new(writer),
        }
    }

    /// Writes one message as a frame and flushes it.
    ///
    /// # Errors
    ///
    /// Returns an IO error if the underlying stream fails.
    pub async fn write_message(&mut self, message: &Message) -> Result<()> {
        let frame = encode(message);
        trace!(len = frame.len(), method = ?message.method(), "Writing frame");
        self.writer.write_all(&frame).await?;
        self.writer.flush().await?;
        Ok(())
    }

    /// Flushes and shuts down the underlying writer.
    ///
    /// # Errors
    ///
    /// Returns an IO error if the underlying stream fails.
    pub async fn shutdown(&mut self) -> Result<()> {
        self.writer.shutdown().await?;
        Ok(())
    }

    /// Returns a reference to the underlying buffered writer.
    #[must_use]
    pub fn get_ref(&self) -> &BufWriter<W> {
        &self.writer
    }

    /// Consumes the writer, returning the underlying buffered writer.
    #[must_use]
    pub fn into_inner(self) -> BufWriter<W> {
        self.writer
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{RequestId, Response, ResponseError};
    use serde_json::json;
    use std::io::Cursor;

    #[tokio::test]
    async fn write_message_produces_one_frame() {
        let mut writer = MessageWriter::new(Cursor::new(Vec::new()));
        let message = Message::Response(Response::ok(1, json!(null)));
        writer.write_message(&message).await.unwrap();

        let bytes = writer.into_inner().into_inner().into_inner();
        assert_eq!(bytes, encode(&message));
    }

    #[tokio::test]
    async fn messages_are_flushed_individually() {
        let mut writer = MessageWriter::new(Cursor::new(Vec::new()));
        let first = Message::Response(Response::ok(1, json!(1)));
        let second = Message::Response(Response::err(
            Some(RequestId::from(2)),
            ResponseError::internal_error("boom"),
        ));
        writer.write_message(&first).await.unwrap();
        assert_eq!(writer.get_ref().get_ref().get_ref().len(), encode(&first).len());

        writer.write_message(&second).await.unwrap();
        let mut expected = encode(&first);
        expected.extend(encode(&second));
        assert_eq!(writer.into_inner().into_inner().into_inner(), expected);
    }
}
