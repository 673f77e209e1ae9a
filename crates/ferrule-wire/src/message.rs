//! JSON-RPC 2.0 message model.
//!
//! Every frame body is classified into one of three shapes:
//!
//! - **Request**: has `method` and `id`, expects a response
//! - **Notification**: has `method` but no `id`
//! - **Response**: has `id` (possibly `null`) and exactly one of `result` / `error`
//!
//! Absent `params` are represented as [`Value::Null`] and omitted again when
//! the message is serialized.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::error::{Error, Result};

/// The only protocol version accepted on the wire.
pub const JSONRPC_VERSION: &str = "2.0";

/// Standard JSON-RPC and LSP error codes.
pub mod error_code {
    /// Invalid JSON was received.
    pub const PARSE_ERROR: i64 = -32700;
    /// The JSON sent is not a valid request object.
    pub const INVALID_REQUEST: i64 = -32600;
    /// The method does not exist or is not available.
    pub const METHOD_NOT_FOUND: i64 = -32601;
    /// Invalid method parameters.
    pub const INVALID_PARAMS: i64 = -32602;
    /// Internal error while handling the request.
    pub const INTERNAL_ERROR: i64 = -32603;
    /// A request arrived before `initialize` was handled.
    pub const SERVER_NOT_INITIALIZED: i64 = -32002;
    /// Error code without a more specific meaning.
    pub const UNKNOWN_ERROR_CODE: i64 = -32001;
    /// The request was cancelled by the peer.
    pub const REQUEST_CANCELLED: i64 = -32800;
    /// The document changed while the request was being handled.
    pub const CONTENT_MODIFIED: i64 = -32801;
    /// The request was understood but failed.
    pub const REQUEST_FAILED: i64 = -32803;
}

/// Identifier correlating a request with its response.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    /// Integer identifier.
    Number(i64),
    /// String identifier.
    String(String),
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::String(s) => write!(f, "{s:?}"),
        }
    }
}

impl From<i32> for RequestId {
    fn from(value: i32) -> Self {
        Self::Number(i64::from(value))
    }
}

impl From<i64> for RequestId {
    fn from(value: i64) -> Self {
        Self::Number(value)
    }
}

impl From<String> for RequestId {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<&str> for RequestId {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

/// The `error` member of a failed response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Error)]
#[error("{message} (code {code})")]
pub struct ResponseError {
    /// Numeric error code, see [`error_code`].
    pub code: i64,
    /// Human readable description.
    pub message: String,
    /// Optional structured detail.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl ResponseError {
    /// Create an error with the given code and message.
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    /// Attach structured data to the error.
    #[must_use]
    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    /// `-32700` for a body that could not be parsed.
    pub fn parse_error(message: impl Into<String>) -> Self {
        Self::new(error_code::PARSE_ERROR, message)
    }

    /// `-32600` for a structurally invalid or out-of-place request.
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(error_code::INVALID_REQUEST, message)
    }

    /// `-32601` for a method without a handler.
    #[must_use]
    pub fn method_not_found(method: &str) -> Self {
        Self::new(
            error_code::METHOD_NOT_FOUND,
            format!("method not found: {method}"),
        )
    }

    /// `-32602` for parameters the handler could not accept.
    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::new(error_code::INVALID_PARAMS, message)
    }

    /// `-32603` for failures inside the server.
    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::new(error_code::INTERNAL_ERROR, message)
    }

    /// `-32002` for requests that arrive before `initialize`.
    #[must_use]
    pub fn server_not_initialized() -> Self {
        Self::new(error_code::SERVER_NOT_INITIALIZED, "server not initialized")
    }

    /// `-32800` for requests cancelled by the peer.
    #[must_use]
    pub fn request_cancelled() -> Self {
        Self::new(error_code::REQUEST_CANCELLED, "request cancelled")
    }

    /// `-32803` for requests that were understood but failed.
    pub fn request_failed(message: impl Into<String>) -> Self {
        Self::new(error_code::REQUEST_FAILED, message)
    }
}

/// A call that expects a response.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    /// Correlation id.
    pub id: RequestId,
    /// Method name.
    pub method: String,
    /// Parameters: an object, an array, or `Null` when absent.
    pub params: Value,
}

impl Request {
    /// Create a request. A scalar `params` is sent as a one-element array.
    pub fn new(id: impl Into<RequestId>, method: impl Into<String>, params: Value) -> Self {
        Self {
            id: id.into(),
            method: method.into(),
            params: structured_params(params),
        }
    }
}

/// A one-way message.
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    /// Method name.
    pub method: String,
    /// Parameters: an object, an array, or `Null` when absent.
    pub params: Value,
}

impl Notification {
    /// Create a notification. A scalar `params` is sent as a one-element array.
    pub fn new(method: impl Into<String>, params: Value) -> Self {
        Self {
            method: method.into(),
            params: structured_params(params),
        }
    }
}

/// JSON-RPC params are by-name or by-position; wrap anything else.
fn structured_params(params: Value) -> Value {
    match params {
        Value::Null | Value::Object(_) | Value::Array(_) => params,
        scalar => Value::Array(vec![scalar]),
    }
}

/// The reply to a [`Request`].
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    /// Id of the request being answered; `None` serializes as `null` and is
    /// only used when the request id could not be recovered.
    pub id: Option<RequestId>,
    /// The result or error payload.
    pub result: std::result::Result<Value, ResponseError>,
}

impl Response {
    /// A successful response.
    pub fn ok(id: impl Into<RequestId>, result: Value) -> Self {
        Self {
            id: Some(id.into()),
            result: Ok(result),
        }
    }

    /// A failed response.
    pub fn err(id: Option<RequestId>, error: ResponseError) -> Self {
        Self {
            id,
            result: Err(error),
        }
    }
}

/// Any JSON-RPC message.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    /// An incoming or outgoing request.
    Request(Request),
    /// An incoming or outgoing notification.
    Notification(Notification),
    /// An incoming or outgoing response.
    Response(Response),
}

impl From<Request> for Message {
    fn from(value: Request) -> Self {
        Self::Request(value)
    }
}

impl From<Notification> for Message {
    fn from(value: Notification) -> Self {
        Self::Notification(value)
    }
}

impl From<Response> for Message {
    fn from(value: Response) -> Self {
        Self::Response(value)
    }
}

impl Message {
    /// Returns the method name for requests and notifications.
    #[must_use]
    pub fn method(&self) -> Option<&str> {
        match self {
            Self::Request(req) => Some(&req.method),
            Self::Notification(notif) => Some(&notif.method),
            Self::Response(_) => None,
        }
    }

    /// Classify a parsed JSON body.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidMessage`] if the value is not a JSON-RPC 2.0
    /// message. When the value is shaped like a request (it has a `method`
    /// member) the error carries its id, so the caller can still answer it.
    /// A malformed response never carries an id: responses are not answered.
    pub fn from_value(value: Value) -> Result<Self> {
        let Value::Object(mut obj) = value else {
            return Err(Error::invalid(None, "message is not a JSON object"));
        };

        // None: absent, Some(None): explicit null
        let id = match obj.remove("id") {
            None => None,
            Some(Value::Null) => Some(None),
            Some(raw) => match serde_json::from_value::<RequestId>(raw) {
                Ok(id) => Some(Some(id)),
                Err(_) => {
                    return Err(Error::invalid(None, "id must be an integer or a string"));
                }
            },
        };
        let recovered = if obj.contains_key("method") {
            id.clone().flatten()
        } else {
            None
        };

        match obj.get("jsonrpc") {
            Some(Value::String(version)) if version == JSONRPC_VERSION => {}
            _ => {
                return Err(Error::invalid(
                    recovered,
                    "missing or unsupported jsonrpc version",
                ));
            }
        }

        match obj.remove("method") {
            Some(Value::String(method)) => {
                let params = obj.remove("params").unwrap_or(Value::Null);
                if !matches!(params, Value::Null | Value::Object(_) | Value::Array(_)) {
                    return Err(Error::invalid(
                        recovered,
                        "params must be an object or an array",
                    ));
                }
                match id {
                    None => Ok(Self::Notification(Notification { method, params })),
                    Some(Some(id)) => Ok(Self::Request(Request { id, method, params })),
                    Some(None) => Err(Error::invalid(None, "request id must not be null")),
                }
            }
            Some(_) => Err(Error::invalid(recovered, "method must be a string")),
            None => {
                let Some(id) = id else {
                    return Err(Error::invalid(None, "message has neither method nor id"));
                };
                let result = match (obj.remove("result"), obj.remove("error")) {
                    (Some(result), None) => Ok(result),
                    (None, Some(error)) => Err(serde_json::from_value::<ResponseError>(error)
                        .map_err(|e| {
                            Error::invalid(None, format!("malformed error object: {e}"))
                        })?),
                    (Some(_), Some(_)) => {
                        return Err(Error::invalid(None, "response has both result and error"));
                    }
                    (None, None) => {
                        return Err(Error::invalid(None, "response has neither result nor error"));
                    }
                };
                Ok(Self::Response(Response { id, result }))
            }
        }
    }

    /// Render the message as a JSON-RPC 2.0 object.
    #[must_use]
    pub fn to_value(&self) -> Value {
        let mut obj = Map::new();
        obj.insert("jsonrpc".into(), Value::from(JSONRPC_VERSION));
        match self {
            Self::Request(req) => {
                obj.insert("id".into(), id_value(Some(&req.id)));
                obj.insert("method".into(), Value::from(req.method.as_str()));
                if !req.params.is_null() {
                    obj.insert("params".into(), structured_params(req.params.clone()));
                }
            }
            Self::Notification(notif) => {
                obj.insert("method".into(), Value::from(notif.method.as_str()));
                if !notif.params.is_null() {
                    obj.insert("params".into(), structured_params(notif.params.clone()));
                }
            }
            Self::Response(resp) => {
                obj.insert("id".into(), id_value(resp.id.as_ref()));
                match &resp.result {
                    Ok(result) => {
                        obj.insert("result".into(), result.clone());
                    }
                    Err(error) => {
                        obj.insert(
                            "error".into(),
                            serde_json::to_value(error).unwrap_or(Value::Null),
                        );
                    }
                }
            }
        }
        Value::Object(obj)
    }
}

fn id_value(id: Option<&RequestId>) -> Value {
    match id {
        Some(RequestId::Number(n)) => Value::from(*n),
        Some(RequestId::String(s)) => Value::from(s.as_str()),
        None => Value::Null,
    }
}

impl Serialize for Message {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.to_value().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Message {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Self::from_value(value).map_err(serde::de::Error::custom)
    }
}
