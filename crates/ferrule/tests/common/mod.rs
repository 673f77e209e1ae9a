//! Common test utilities shared across integration tests.
//!
//! [`TestClient`] plays the editor: it drives an [`Engine`] over an in-memory
//! duplex pipe and reads back everything the server writes.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::time::Duration;

use ferrule::wire::{
    Message, MessageReader, Notification, Request, RequestId, Response, encode,
};
use ferrule::{Engine, ExitStatus};
use serde_json::{Value, json};
use tokio::io::{AsyncWriteExt, DuplexStream, ReadHalf, WriteHalf};
use tokio::task::JoinHandle;

/// How long to wait for the server before failing a test
pub const RECV_TIMEOUT: Duration = Duration::from_secs(5);

/// Route engine logs to the test harness when `RUST_LOG` is set
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// An in-process LSP client connected to a running engine
pub struct TestClient {
    reader: MessageReader<ReadHalf<DuplexStream>>,
    writer: WriteHalf<DuplexStream>,
    server: JoinHandle<ferrule::Result<ExitStatus>>,
    stash: VecDeque<Message>,
    next_id: i64,
}

impl TestClient {
    /// Start serving `engine` and connect to it
    pub fn start(engine: Engine) -> Self {
        init_tracing();
        let (client_side, server_side) = tokio::io::duplex(64 * 1024);
        let (server_read, server_write) = tokio::io::split(server_side);
        let server = tokio::spawn(engine.serve(server_read, server_write));

        let (read, writer) = tokio::io::split(client_side);
        Self {
            reader: MessageReader::new(read),
            writer,
            server,
            stash: VecDeque::new(),
            next_id: 1,
        }
    }

    /// Write raw bytes to the server
    pub async fn send_raw(&mut self, bytes: &[u8]) {
        self.writer.write_all(bytes).await.unwrap();
        self.writer.flush().await.unwrap();
    }

    /// Frame and send a message
    pub async fn send(&mut self, message: impl Into<Message>) {
        let bytes = encode(&message.into());
        self.send_raw(&bytes).await;
    }

    /// Send a request and return its id
    pub async fn request(&mut self, method: &str, params: Value) -> RequestId {
        let id = RequestId::from(self.next_id);
        self.next_id += 1;
        self.send(Request::new(id.clone(), method, params)).await;
        id
    }

    /// Send a request and wait for its response
    pub async fn call(&mut self, method: &str, params: Value) -> Response {
        let id = self.request(method, params).await;
        self.response_to(&id).await
    }

    /// Send a notification
    pub async fn notify(&mut self, method: &str, params: Value) {
        self.send(Notification::new(method, params)).await;
    }

    /// Next message from the server, in arrival order
    pub async fn recv(&mut self) -> Message {
        if let Some(message) = self.stash.pop_front() {
            return message;
        }
        self.read().await
    }

    async fn read(&mut self) -> Message {
        tokio::time::timeout(RECV_TIMEOUT, self.reader.read_message())
            .await
            .expect("timed out waiting for the server")
            .expect("failed to read from the server")
            .expect("server closed the connection")
    }

    /// Next message matching `pick`, keeping the others for later
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

    /// Next response, whatever its id
    pub async fn next_response(&mut self) -> Response {
        self.next_matching(|m| match m {
            Message::Response(r) => Some(r.clone()),
            _ => None,
        })
        .await
    }

    /// The response to request `id`
    pub async fn response_to(&mut self, id: &RequestId) -> Response {
        self.next_matching(|m| match m {
            Message::Response(r) if r.id.as_ref() == Some(id) => Some(r.clone()),
            _ => None,
        })
        .await
    }

    /// Next notification with `method`
    pub async fn notification(&mut self, method: &str) -> Notification {
        self.next_matching(|m| match m {
            Message::Notification(n) if n.method == method => Some(n.clone()),
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

    /// Run the `initialize` / `initialized` handshake and return the result
    pub async fn initialize(&mut self) -> Value {
        let response = self
            .call("initialize", json!({"processId": null, "rootUri": null, "capabilities": {}}))
            .await;
        let result = response.result.expect("initialize failed");
        self.notify("initialized", json!({})).await;
        result
    }

    /// Send `shutdown` and `exit` and wait for the server to stop
    pub async fn shutdown_and_exit(mut self) -> ExitStatus {
        let response = self.call("shutdown", Value::Null).await;
        assert_eq!(response.result, Ok(Value::Null));
        self.notify("exit", Value::Null).await;
        self.join().await
    }

    /// Close the client side and wait for the server to stop
    pub async fn disconnect(mut self) -> ExitStatus {
        self.writer.shutdown().await.unwrap();
        self.join().await
    }

    /// Wait for the server task to return
    pub async fn join(self) -> ExitStatus {
        tokio::time::timeout(RECV_TIMEOUT, self.server)
            .await
            .expect("server did not stop")
            .expect("server task panicked")
            .expect("server returned an error")
    }

    /// Assert the server has closed its output
    pub async fn expect_eof(&mut self) {
        let read = tokio::time::timeout(RECV_TIMEOUT, self.reader.read_message())
            .await
            .expect("timed out waiting for end of stream")
            .expect("failed to read from the server");
        assert!(read.is_none(), "expected end of stream, got {read:?}");
    }
}

/// Error code of a failed response
pub fn error_code(response: &Response) -> i64 {
    match &response.result {
        Err(error) => error.code,
        Ok(value) => panic!("expected an error, got {value}"),
    }
}
