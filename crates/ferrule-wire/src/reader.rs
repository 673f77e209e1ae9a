//! Async message reading.
//!
//! This module provides [`MessageReader`], which pulls bytes from any async
//! reader, feeds them through a [`FrameDecoder`] and yields whole messages.

use std::io;

use tokio::io::{AsyncRead, AsyncReadExt};

use crate::codec::{Decoded, FrameDecoder};
use crate::error::{Error, Result};
use crate::message::Message;

/// Default size of the read chunk in bytes.
const DEFAULT_CHUNK_SIZE: usize = 8 * 1024;

/// Async reader for framed JSON-RPC messages.
///
/// Protocol errors (malformed headers, unparsable bodies) are returned to the
/// caller without poisoning the reader: the next call to
/// [`read_message`](Self::read_message) continues with the following frame.
///
/// # Examples
///
/// ```no_run
/// use ferrule_wire::MessageReader;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let mut reader = MessageReader::new(tokio::io::stdin());
/// while let Some(message) = reader.read_message().await? {
///     println!("{:?}", message.method());
/// }
/// # Ok(())
/// # }
/// ```
pub struct MessageReader<R> {
    /// The underlying byte source.
    reader: R,
    /// Resumable frame decoder holding partial data between reads.
    decoder: FrameDecoder,
    /// Scratch buffer for a single read.
    chunk: Vec<u8>,
}

impl<R: AsyncRead + Unpin> MessageReader<R> {
    /// Creates a new `MessageReader` with the default chunk size.
    #[must_use]
    pub fn new(reader: R) -> Self {
        Self::with_capacity(reader, DEFAULT_CHUNK_SIZE)
    }

    /// Creates a new `MessageReader` that reads up to `capacity` bytes at a time.
    #[must_use]
    pub fn with_capacity(reader: R, capacity: usize) -> Self {
        Self {
            reader,
            decoder: FrameDecoder::new(),
            chunk: vec![0; capacity.max(1)],
        }
    }

    /// Reads the next message.
    ///
    /// Returns `Ok(None)` when the stream ends cleanly between frames.
    ///
    /// # Errors
    ///
    /// Returns a protocol error for a malformed frame (the reader stays
    /// usable), or [`Error::Io`] when the stream fails or closes in the middle
    /// of a frame.
    pub async fn read_message(&mut self) -> Result<Option<Message>> {
        loop {
            if let Decoded::Message(message) = self.decoder.decode()? {
                return Ok(Some(message));
            }

            let read = self.reader.read(&mut self.chunk).await?;
            if read == 0 {
                if self.decoder.is_idle() {
                    return Ok(None);
                }
                return Err(Error::Io(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "stream closed in the middle of a frame",
                )));
            }
            self.decoder.extend(&self.chunk[..read]);
        }
    }

    /// Returns a reference to the underlying reader.
    #[must_use]
    pub fn get_ref(&self) -> &R {
        &self.reader
    }

    /// Consumes the reader, returning the underlying reader.
    ///
    /// Any partially buffered frame is discarded.
    #[must_use]
    pub fn into_inner(self) -> R {
        self.reader
    }
}
