//! `Content-Length` framing.
//!
//! A frame is a block of `Name: value\r\n` header lines, a blank line, and a
//! body of exactly `Content-Length` bytes:
//!
//! ```text
//! Content-Length: 52\r\n
//! \r\n
//! {"jsonrpc":"2.0","id":1,"method":"shutdown"}
//! ```
//!
//! [`FrameDecoder`] is resumable: bytes can be fed in arbitrary chunks and a
//! message is produced once a complete frame is buffered. After a malformed
//! header the decoder skips ahead to the next `Content-Length:` marker (in
//! any letter case), so a single bad frame never desynchronises the stream.

use serde_json::Value;
use tracing::{trace, warn};

use crate::error::{Error, Result};
use crate::message::Message;

/// Name of the mandatory length header.
pub const CONTENT_LENGTH: &str = "Content-Length";

/// Upper bound for a header block that has not been terminated yet.
pub const MAX_HEADER_BYTES: usize = 8 * 1024;

const HEADER_TERMINATOR: &[u8] = b"\r\n\r\n";
const RESYNC_MARKER: &[u8] = b"Content-Length:";

/// Serialize a message into a complete frame.
#[must_use]
pub fn encode(message: &Message) -> Vec<u8> {
    let body = message.to_value().to_string();
    let mut frame = format!("{CONTENT_LENGTH}: {}\r\n\r\n", body.len()).into_bytes();
    frame.extend_from_slice(body.as_bytes());
    frame
}

/// Outcome of a successful [`FrameDecoder::decode`] call.
#[derive(Debug, Clone, PartialEq)]
pub enum Decoded {
    /// A complete message was decoded.
    Message(Message),
    /// The buffer does not hold a complete frame yet.
    NeedMoreData,
}

/// Incremental frame decoder.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    /// Bytes received but not yet consumed.
    buffer: Vec<u8>,
    /// Body length of a frame whose header has already been consumed.
    pending_body: Option<usize>,
    /// Set after a header error until the next frame start is found.
    resyncing: bool,
}

impl FrameDecoder {
    /// Creates an empty decoder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends received bytes to the internal buffer.
    pub fn extend(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    /// Number of buffered bytes not yet consumed by a decoded frame.
    #[must_use]
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Returns `true` when no partial frame is held.
    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.pending_body.is_none() && self.buffer.iter().all(u8::is_ascii_whitespace)
    }

    /// Tries to decode the next message from the buffered bytes.
    ///
    /// # Errors
    ///
    /// Returns a protocol error for a malformed header, a body that is not
    /// JSON, or a body that is not a JSON-RPC message. In every case the bad
    /// frame has been consumed and calling `decode` again continues with the
    /// following bytes.
    pub fn decode(&mut self) -> Result<Decoded> {
        if self.resyncing && !self.resync() {
            return Ok(Decoded::NeedMoreData);
        }

        let content_length = match self.pending_body {
            Some(len) => len,
            None => {
                let Some(header_end) = find(&self.buffer, HEADER_TERMINATOR) else {
                    if self.buffer.len() > MAX_HEADER_BYTES {
                        self.buffer.clear();
                        return Err(Error::InvalidHeader(format!(
                            "header block exceeds {MAX_HEADER_BYTES} bytes"
                        )));
                    }
                    return Ok(Decoded::NeedMoreData);
                };
                let header: Vec<u8> = self
                    .buffer
                    .drain(..header_end + HEADER_TERMINATOR.len())
                    .collect();
                match parse_header(&header[..header_end]) {
                    Ok(len) => {
                        self.pending_body = Some(len);
                        len
                    }
                    Err(err) => {
                        warn!(error = %err, "Discarding malformed frame header");
                        self.resyncing = true;
                        return Err(err);
                    }
                }
            }
        };

        if self.buffer.len() < content_length {
            trace!(
                have = self.buffer.len(),
                need = content_length,
                "Waiting for frame body"
            );
            return Ok(Decoded::NeedMoreData);
        }

        self.pending_body = None;
        let body: Vec<u8> = self.buffer.drain(..content_length).collect();
        let value: Value =
            serde_json::from_slice(&body).map_err(|source| Error::Parse { source })?;
        Message::from_value(value).map(Decoded::Message)
    }

    /// Drops bytes up to the next frame marker. Returns `false` if the marker
    /// has not arrived yet.
    fn resync(&mut self) -> bool {
        if let Some(start) = find_marker(&self.buffer) {
            self.buffer.drain(..start);
            self.resyncing = false;
            return true;
        }
        // keep a tail that could be the beginning of a split marker
        let keep = RESYNC_MARKER.len() - 1;
        if self.buffer.len() > keep {
            let cut = self.buffer.len() - keep;
            self.buffer.drain(..cut);
        }
        false
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

/// Header names are case-insensitive, so the marker is too.
fn find_marker(haystack: &[u8]) -> Option<usize> {
    haystack
        .windows(RESYNC_MARKER.len())
        .position(|window| window.eq_ignore_ascii_case(RESYNC_MARKER))
}

/// Parses a header block (without its terminating blank line) and returns
/// the body length.
fn parse_header(block: &[u8]) -> Result<usize> {
    let text = std::str::from_utf8(block)
        .map_err(|_| Error::InvalidHeader("header is not valid UTF-8".to_string()))?;

    let mut content_length = None;
    for line in text.split("\r\n").filter(|line| !line.trim().is_empty()) {
        let (name, value) = line
            .split_once(':')
            .ok_or_else(|| Error::InvalidHeader(format!("malformed header line: {line:?}")))?;
        if name.trim().eq_ignore_ascii_case(CONTENT_LENGTH) {
            let value = value.trim();
            let len = value
                .parse::<usize>()
                .map_err(|_| Error::InvalidHeader(format!("invalid Content-Length: {value}")))?;
            content_length = Some(len);
        }
    }

    content_length.ok_or(Error::MissingContentLength)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{Notification, Request, RequestId, Response, ResponseError};
    use proptest::prelude::*;
    use rstest::rstest;
    use serde_json::json;

    fn frame(body: &str) -> Vec<u8> {
        format!("Content-Length: {}\r\n\r\n{body}", body.len()).into_bytes()
    }

    fn decode_all(bytes: &[u8]) -> Vec<Result<Decoded>> {
        let mut decoder = FrameDecoder::new();
        decoder.extend(bytes);
        let mut out = Vec::new();
        loop {
            match decoder.decode() {
                Ok(Decoded::NeedMoreData) => break,
                other => out.push(other),
            }
        }
        out
    }

    fn shutdown_request() -> Message {
        Message::Request(Request::new(1, "shutdown", Value::Null))
    }

    #[test]
    fn encode_writes_exact_content_length() {
        let bytes = encode(&shutdown_request());
        let text = String::from_utf8(bytes).unwrap();
        let (header, body) = text.split_once("\r\n\r\n").unwrap();
        assert_eq!(header, format!("Content-Length: {}", body.len()));
        let value: Value = serde_json::from_str(body).unwrap();
        assert_eq!(value, json!({"jsonrpc": "2.0", "id": 1, "method": "shutdown"}));
    }

    #[test]
    fn encode_counts_bytes_not_chars() {
        let msg = Message::Notification(Notification::new(
            "window/showMessage",
            json!({"type": 3, "message": "h\u{e9}llo \u{1F600}"}),
        ));
        let bytes = encode(&msg);
        let mut decoder = FrameDecoder::new();
        decoder.extend(&bytes);
        assert_eq!(decoder.decode().unwrap(), Decoded::Message(msg));
        assert_eq!(decoder.buffered(), 0);
    }

    #[test]
    fn short_body_needs_more_data_then_completes() {
        let bytes = encode(&shutdown_request());
        let split = bytes.len() - 5;

        let mut decoder = FrameDecoder::new();
        decoder.extend(&bytes[..split]);
        assert_eq!(decoder.decode().unwrap(), Decoded::NeedMoreData);
        assert!(!decoder.is_idle());

        decoder.extend(&bytes[split..]);
        assert_eq!(
            decoder.decode().unwrap(),
            Decoded::Message(shutdown_request())
        );
        assert!(decoder.is_idle());
    }

    #[test]
    fn partial_header_needs_more_data() {
        let mut decoder = FrameDecoder::new();
        decoder.extend(b"Content-Len");
        assert_eq!(decoder.decode().unwrap(), Decoded::NeedMoreData);
        decoder.extend(b"gth: 2\r\n\r\n{}");
        // `{}` is JSON but not a JSON-RPC message
        assert!(matches!(
            decoder.decode(),
            Err(Error::InvalidMessage { id: None, .. })
        ));
    }

    #[test]
    fn two_frames_in_one_chunk() {
        let mut bytes = encode(&shutdown_request());
        bytes.extend(encode(&Message::Response(Response::ok(7, json!(true)))));
        let decoded = decode_all(&bytes);
        assert_eq!(decoded.len(), 2);
        assert!(matches!(&decoded[1], Ok(Decoded::Message(Message::Response(_)))));
    }

    #[rstest]
    #[case::lowercase_name("content-length: {len}\r\n\r\n{body}")]
    #[case::extra_whitespace("Content-Length:    {len}  \r\n\r\n{body}")]
    #[case::content_type_first("Content-Type: application/vscode-jsonrpc; charset=utf-8\r\nContent-Length: {len}\r\n\r\n{body}")]
    #[case::content_type_last("Content-Length: {len}\r\nContent-Type: application/vscode-jsonrpc\r\n\r\n{body}")]
    fn accepted_header_variants(#[case] template: &str) {
        let body = r#"{"jsonrpc":"2.0","method":"initialized","params":{}}"#;
        let raw = template
            .replace("{len}", &body.len().to_string())
            .replace("{body}", body);
        let decoded = decode_all(raw.as_bytes());
        assert_eq!(decoded.len(), 1);
        assert!(matches!(
            &decoded[0],
            Ok(Decoded::Message(Message::Notification(n))) if n.method == "initialized"
        ));
    }

    #[rstest]
    #[case::missing_length("Content-Type: application/json\r\n\r\n{}", "missing Content-Length")]
    #[case::non_numeric("Content-Length: ten\r\n\r\n{}", "invalid Content-Length")]
    #[case::no_colon("garbage line\r\n\r\n{}", "malformed header line")]
    fn malformed_headers_are_reported(#[case] raw: &str, #[case] expected: &str) {
        let mut decoder = FrameDecoder::new();
        decoder.extend(raw.as_bytes());
        let err = decoder.decode().unwrap_err();
        assert!(err.is_protocol());
        assert!(
            err.to_string().contains(expected),
            "expected '{expected}', got '{err}'"
        );
    }

    fn lowercase_frame(message: &Message) -> Vec<u8> {
        let body = message.to_value().to_string();
        format!("content-length: {}\r\n\r\n{body}", body.len()).into_bytes()
    }

    #[rstest]
    #[case::misspelled_name(b"Content-Lenght: 12\r\n\r\n{\"junk\":true}".as_slice(), false)]
    #[case::lowercase_headers(b"content-length: ten\r\n\r\n{}".as_slice(), true)]
    fn decoder_resyncs_after_bad_header(#[case] bad: &[u8], #[case] lowercase: bool) {
        let good = shutdown_request();
        let frame = if lowercase {
            lowercase_frame(&good)
        } else {
            encode(&good)
        };
        let mut bytes = bad.to_vec();
        bytes.extend(&frame);
        bytes.extend(&frame);

        let decoded = decode_all(&bytes);
        assert_eq!(decoded.len(), 3, "{decoded:?}");
        assert!(decoded[0].is_err());
        for result in &decoded[1..] {
            assert_eq!(result.as_ref().unwrap(), &Decoded::Message(good.clone()));
        }
    }

    #[test]
    fn marker_search_ignores_case() {
        assert_eq!(find_marker(b"xx content-LENGTH: 4"), Some(3));
        assert_eq!(find_marker(b"Content-Type: a"), None);
    }

    #[test]
    fn resync_waits_for_marker_split_across_chunks() {
        let good = encode(&shutdown_request());
        let mut decoder = FrameDecoder::new();
        decoder.extend(b"bogus\r\n\r\nnoise noise ");
        assert!(decoder.decode().is_err());

        decoder.extend(&good[..8]);
        assert_eq!(decoder.decode().unwrap(), Decoded::NeedMoreData);
        decoder.extend(&good[8..]);
        assert_eq!(
            decoder.decode().unwrap(),
            Decoded::Message(shutdown_request())
        );
    }

    #[test]
    fn invalid_json_body_is_consumed() {
        let mut bytes = frame("{not json");
        bytes.extend(encode(&shutdown_request()));
        let decoded = decode_all(&bytes);
        assert_eq!(decoded.len(), 2);
        assert!(matches!(decoded[0], Err(Error::Parse { .. })));
        assert!(decoded[1].is_ok());
    }

    #[test]
    fn structurally_invalid_body_keeps_id() {
        let decoded = decode_all(&frame(r#"{"jsonrpc":"2.0","id":5,"method":42}"#));
        let Err(err) = &decoded[0] else {
            panic!("expected an error");
        };
        assert_eq!(err.recovered_id(), Some(&RequestId::from(5)));
    }

    #[test]
    fn oversized_header_is_rejected() {
        let mut decoder = FrameDecoder::new();
        decoder.extend(&vec![b'x'; MAX_HEADER_BYTES + 1]);
        assert!(matches!(decoder.decode(), Err(Error::InvalidHeader(_))));
        assert_eq!(decoder.buffered(), 0);
    }

    #[test]
    fn error_response_survives_framing() {
        let msg = Message::Response(Response::err(
            Some(RequestId::from("x")),
            ResponseError::method_not_found("foo/bar").with_data(json!({"hint": 1})),
        ));
        let decoded = decode_all(&encode(&msg));
        assert_eq!(decoded[0].as_ref().unwrap(), &Decoded::Message(msg));
    }

    proptest! {
        #[test]
        fn any_split_point_decodes_identically(split in 0usize..200, text in "\\PC{0,40}") {
            let msg = Message::Notification(Notification::new(
                "textDocument/didChange",
                json!({"text": text}),
            ));
            let bytes = encode(&msg);
            let split = split.min(bytes.len());

            let mut decoder = FrameDecoder::new();
            decoder.extend(&bytes[..split]);
            let first = decoder.decode().unwrap();
            if split < bytes.len() {
                prop_assert_eq!(first, Decoded::NeedMoreData);
                decoder.extend(&bytes[split..]);
                prop_assert_eq!(decoder.decode().unwrap(), Decoded::Message(msg));
            } else {
                prop_assert_eq!(first, Decoded::Message(msg));
            }
            prop_assert_eq!(decoder.buffered(), 0);
        }
    }
}
