//! Common test utilities shared across integration tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::time::Duration;

use ferrule::wire::{Message, MessageReader, MessageWriter, Notification, Request, RequestId, Response};
use ferrule::{Engine, ExitStatus};
use serde_json::{Value, json};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::task::JoinHandle;

/// How long to wait for the server before failing a test
pub const RECV_TIMEOUT: Duration = Duration::from_secs(5);

type Input = Box<dyn AsyncRead + Unpin + Send>;
type Output = Box<dyn AsyncWrite + Unpin + Send>;

/// An editor stand-in talking to a running server
pub struct Editor<S> {
    reader: MessageReader<Input>,
    writer: MessageWriter<Output>,
    server: JoinHandle<S>,
    stash: VecDeque<Message>,
    next_id: i64,
}

impl Editor<ferrule::Result<ExitStatus>> {
    /// Serve `engine` over an in-memory pipe
    pub fn start(engine: Engine) -> Self {
        let (editor_side, server_side) = tokio::io::duplex(64 * 1024);
        let (server_read, server_write) = tokio::io::split(server_side);
        let server = tokio::spawn(engine.serve(server_read, server_write));

        let (read, write) = tokio::io::split(editor_side);
        Self::connect(Box::new(read), Box::new(write), server)
    }
}

impl<S: Send + 'static> Editor<S> {
    /// Wrap an existing connection to `server`
    pub fn connect(read: Input, write: Output, server: JoinHandle<S>) -> Self {
        Self {
            reader: MessageReader::new(read),
            writer: MessageWriter::new(write),
            server,
            stash: VecDeque::new(),
            next_id: 1,
        }
    }

    /// Send a message
    pub async fn send(&mut self, message: impl Into<Message>) {
        self.writer.write_message(&message.into()).await.unwrap();
    }

    /// Send a request and wait for its response
    pub async fn call(&mut self, method: &str, params: Value) -> Response {
        let id = self.request(method, params).await;
        self.response_to(&id).await
    }

    /// Send a request and return its id
    pub async fn request(&mut self, method: &str, params: Value) -> RequestId {
        let id = RequestId::from(self.next_id);
        self.next_id += 1;
        self.send(Request::new(id.clone(), method, params)).await;
        id
    }

    /// Send a notification
    pub async fn notify(&mut self, method: &str, params: Value) {
        self.send(Notification::new(method, params)).await;
    }

    async fn read(&mut self) -> Message {
        tokio::time::timeout(RECV_TIMEOUT, self.reader.read_message())
            .await
            .expect("timed out waiting for the server")
            .expect("failed to read from the server")
            .expect("server closed the connection")
    }

    async fn next_matching<T>(&mut self, mut pick: impl FnMut(&Message) -> Option<T>) -> T {
        if let Some(index) = self.stash.iter().position(|m| pick(m).is_some()) {
            let message = self.stash.remove(index).unwrap();
            return pick(&message).unwrap();
        }
        loop {
            let message = self.read().await;
            if let Some(found) = pick(&message) {
                return found;
            }
            self.stash.push_back(message);
        }
    }

    /// The response to request `id`
    pub async fn response_to(&mut self, id: &RequestId) -> Response {
        self.next_matching(|m| match m {
            Message::Response(r) if r.id.as_ref() == Some(id) => Some(r.clone()),
            _ => None,
        })
        .await
    }

    /// Params of the next notification with `method`
    pub async fn notification(&mut self, method: &str) -> Value {
        self.next_matching(|m| match m {
            Message::Notification(n) if n.method == method => Some(n.params.clone()),
            _ => None,
        })
        .await
    }

    /// Next server-initiated request
    pub async fn server_request(&mut self) -> Request {
        self.next_matching(|m| match m {
            Message::Request(r) => Some(r.clone()),
            _ => None,
        })
        .await
    }

    /// Run the handshake and return the `initialize` result
    pub async fn initialize(&mut self) -> Value {
        let response = self
            .call("initialize", json!({"processId": null, "rootUri": null, "capabilities": {}}))
            .await;
        let result = response.result.expect("initialize failed");
        self.notify("initialized", json!({})).await;
        result
    }

    /// Send `shutdown` and `exit` and wait for the server to stop
    pub async fn shutdown_and_exit(mut self) -> S {
        let response = self.call("shutdown", Value::Null).await;
        assert_eq!(response.result, Ok(Value::Null));
        self.notify("exit", Value::Null).await;
        tokio::time::timeout(RECV_TIMEOUT, self.server)
            .await
            .expect("server did not stop")
            .expect("server task panicked")
    }
}

/// `didOpen` params for a JSON document
pub fn open_params(uri: &str, version: i32, text: &str) -> Value {
    json!({
        "textDocument": {"uri": uri, "languageId": "json", "version": version, "text": text}
    })
}
