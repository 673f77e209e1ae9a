//! The protocol engine.
//!
//! One task reads frames, classifies them, applies the lifecycle gate and
//! dispatches. Inline handlers are awaited on that task, so the messages
//! after them wait; background handlers run on a [`JoinSet`] and report back
//! when done. Every outgoing message goes through a single writer task.
//!
//! # Handler rules
//!
//! An inline handler must not wait for a client response (for example via
//! [`Client::get_configuration`]): the response cannot be read until the
//! handler returns. Register such handlers with [`RunMode::Background`].

mod capabilities;
mod lifecycle;

use std::any::Any;
use std::collections::HashMap;
use std::ops::ControlFlow;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use ferrule_wire::{
    Message, MessageReader, MessageWriter, Notification, Request, RequestId, Response,
    ResponseError,
};
use futures::FutureExt;
use lsp_types::{
    DidChangeTextDocumentParams, DidCloseTextDocumentParams, DidOpenTextDocumentParams,
    ExecuteCommandParams,
};
use serde::Deserialize;
use serde_json::Value;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{mpsc, oneshot};
use tokio::task::{JoinError, JoinSet};
use tracing::{debug, error, info, trace, warn};

pub use lifecycle::{ExitStatus, LifecycleState};

use crate::client::Client;
use crate::config::ServerConfig;
use crate::context::Context;
use crate::correlator::Correlator;
use crate::dispatch::{DispatchTable, Handler, Registration, RunMode};
use crate::document::{DocumentStore, TextDocument};
use crate::error::{Error, Result};
use crate::text::TextEdit;
use lifecycle::Lifecycle;

/// A language server ready to be attached to a transport.
pub struct Engine {
    config: ServerConfig,
    table: Arc<DispatchTable>,
    documents: Arc<DocumentStore>,
    client: Client,
    outgoing: mpsc::UnboundedSender<Message>,
    queue: mpsc::UnboundedReceiver<Message>,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("config", &self.config)
            .field("table", &self.table)
            .field("documents", &self.documents)
            .finish_non_exhaustive()
    }
}

impl Engine {
    /// Create an engine serving the handlers in `table`.
    #[must_use]
    pub fn new(config: ServerConfig, table: DispatchTable) -> Self {
        let (outgoing, queue) = mpsc::unbounded_channel();
        let correlator = Correlator::new(outgoing.clone());
        let client = Client::new(outgoing.clone(), correlator, config.request_timeout());
        Self {
            config,
            table: Arc::new(table),
            documents: Arc::new(DocumentStore::new()),
            client,
            outgoing,
            queue,
        }
    }

    /// Handle for messages to the client. Usable before [`serve`](Self::serve);
    /// messages are queued until the writer starts.
    #[must_use]
    pub fn client(&self) -> Client {
        self.client.clone()
    }

    /// The document store.
    #[must_use]
    pub fn documents(&self) -> Arc<DocumentStore> {
        Arc::clone(&self.documents)
    }

    /// The configuration the engine was created with.
    #[must_use]
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Run `callback` after every successful `textDocument/didChange`.
    ///
    /// It runs on the read loop before the `didChange` handler, so it should
    /// be quick and must not wait for the client.
    pub fn on_document_change<F>(&self, callback: F)
    where
        F: Fn(&Client, &TextDocument) + Send + Sync + 'static,
    {
        let client = self.client.clone();
        self.documents
            .set_on_change(move |document| callback(&client, document));
    }

    /// Serve one client until `exit` or end of input.
    ///
    /// # Errors
    ///
    /// Returns an error only if reading the transport fails. Protocol errors
    /// are answered or logged and the session continues.
    pub async fn serve<R, W>(self, input: R, output: W) -> Result<ExitStatus>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let Self {
            config,
            table,
            documents,
            client,
            outgoing,
            queue,
        } = self;

        let (stop, stopped) = oneshot::channel();
        let writer = tokio::spawn(write_loop(MessageWriter::new(output), queue, stopped));

        let mut session = Session {
            config,
            table,
            documents,
            client,
            outgoing,
            lifecycle: Lifecycle::default(),
            tasks: JoinSet::new(),
            inflight: HashMap::new(),
        };
        info!(name = %session.config.server_name, "Serving");
        let outcome = session.run(MessageReader::new(input)).await;

        session.lifecycle.close();
        session.tasks.abort_all();
        session.client.correlator().disconnect_all();
        let status = session.lifecycle.exit_status();
        drop(session);

        let _ = stop.send(());
        if let Err(error) = writer.await {
            error!(%error, "Writer task failed");
        }
        info!(?status, "Session ended");
        outcome.map(|()| status)
    }
}

struct Completion {
    id: Option<RequestId>,
    method: String,
    outcome: Result<Value>,
}

struct Session {
    config: ServerConfig,
    table: Arc<DispatchTable>,
    documents: Arc<DocumentStore>,
    client: Client,
    outgoing: mpsc::UnboundedSender<Message>,
    lifecycle: Lifecycle,
    tasks: JoinSet<Completion>,
    inflight: HashMap<RequestId, Arc<AtomicBool>>,
}

impl Session {
    async fn run<R: AsyncRead + Unpin>(&mut self, mut reader: MessageReader<R>) -> Result<()> {
        loop {
            tokio::select! {
                read = reader.read_message() => match read {
                    Ok(Some(message)) => {
                        if self.handle_message(message).await.is_break() {
                            return Ok(());
                        }
                    }
                    Ok(None) => {
                        info!("Client closed the connection");
                        return Ok(());
                    }
                    Err(error) if error.is_protocol() => self.handle_malformed(&error),
                    Err(error) => {
                        error!(%error, "Transport failure");
                        return Err(error.into());
                    }
                },
                Some(joined) = self.tasks.join_next(), if !self.tasks.is_empty() => {
                    self.finish_task(joined);
                }
            }
        }
    }

    async fn handle_message(&mut self, message: Message) -> ControlFlow<()> {
        match message {
            Message::Request(request) => {
                self.handle_request(request).await;
                ControlFlow::Continue(())
            }
            Message::Notification(notification) => self.handle_notification(notification).await,
            Message::Response(response) => {
                self.client.correlator().on_response(response);
                ControlFlow::Continue(())
            }
        }
    }

    async fn handle_request(&mut self, request: Request) {
        debug!(id = %request.id, method = %request.method, "Request");
        if let Err(rejection) = self.lifecycle.admit_request(&request.method) {
            debug!(
                id = %request.id,
                method = %request.method,
                state = ?self.lifecycle.state(),
                "Rejecting request"
            );
            self.respond(Response::err(Some(request.id), rejection));
            return;
        }

        match request.method.as_str() {
            "initialize" => self.initialize(request).await,
            "shutdown" => self.shutdown(request).await,
            "workspace/executeCommand" => self.execute_command(request).await,
            _ => match self.table.lookup(&request.method).cloned() {
                Some(registration) => {
                    self.dispatch(Some(request.id), request.method, request.params, &registration)
                        .await;
                }
                None => self.respond(Response::err(
                    Some(request.id),
                    ResponseError::method_not_found(&request.method),
                )),
            },
        }
    }

    async fn handle_notification(&mut self, notification: Notification) -> ControlFlow<()> {
        let Notification { method, params } = notification;
        trace!(%method, "Notification");

        if method == "exit" {
            info!("Exit requested");
            return ControlFlow::Break(());
        }
        if !self.lifecycle.admit_notification(&method) {
            debug!(%method, state = ?self.lifecycle.state(), "Dropping notification");
            return ControlFlow::Continue(());
        }

        match method.as_str() {
            "initialized" => self.lifecycle.initialized(),
            "$/cancelRequest" => self.cancel_request(&params),
            "textDocument/didOpen" | "textDocument/didChange" | "textDocument/didClose" => {
                if let Err(error) = self.sync_document(&method, &params) {
                    warn!(%method, %error, "Document sync failed");
                    return ControlFlow::Continue(());
                }
            }
            _ => {}
        }

        match self.table.lookup(&method).cloned() {
            Some(registration) => self.dispatch(None, method, params, &registration).await,
            None if method.starts_with("$/") || is_builtin(&method) => {}
            None => debug!(%method, "No handler for notification"),
        }
        ControlFlow::Continue(())
    }

    async fn initialize(&mut self, request: Request) {
        self.lifecycle.begin_initialize();
        let mut result = capabilities::initialize_result(&self.table, &self.config);

        if let Some(hook) = self.table.lookup("initialize").cloned() {
            let cx = self.context(Some(request.id.clone()), "initialize");
            match invoke(hook.handler(), cx, request.params).await {
                Ok(extra) => capabilities::merge(&mut result, extra),
                Err(error) => {
                    warn!(%error, "Initialize hook failed");
                    self.lifecycle.reset();
                    self.respond(Response::err(Some(request.id), error.to_response_error()));
                    return;
                }
            }
        }

        info!("Initialized");
        self.respond(Response::ok(request.id, result));
    }

    async fn shutdown(&mut self, request: Request) {
        self.lifecycle.begin_shutdown();

        if let Some(hook) = self.table.lookup("shutdown").cloned() {
            let cx = self.context(Some(request.id.clone()), "shutdown");
            if let Err(error) = invoke(hook.handler(), cx, request.params).await {
                warn!(%error, "Shutdown hook failed");
            }
        }

        info!("Shutdown requested");
        self.respond(Response::ok(request.id, Value::Null));
    }

    async fn execute_command(&mut self, request: Request) {
        let params = match ExecuteCommandParams::deserialize(&request.params) {
            Ok(params) => params,
            Err(error) => {
                self.respond(Response::err(
                    Some(request.id),
                    ResponseError::invalid_params(error.to_string()),
                ));
                return;
            }
        };

        if let Some(registration) = self.table.command(&params.command).cloned() {
            debug!(command = %params.command, "Executing command");
            let arguments = Value::Array(params.arguments);
            self.dispatch(Some(request.id), request.method, arguments, &registration)
                .await;
        } else if let Some(registration) = self.table.lookup(&request.method).cloned() {
            self.dispatch(Some(request.id), request.method, request.params, &registration)
                .await;
        } else {
            self.respond(Response::err(
                Some(request.id),
                ResponseError::invalid_params(format!("unknown command: {}", params.command)),
            ));
        }
    }

    async fn dispatch(
        &mut self,
        id: Option<RequestId>,
        method: String,
        params: Value,
        registration: &Registration,
    ) {
        let cx = self.context(id.clone(), &method);
        if let Some(id) = &id {
            self.inflight.insert(id.clone(), cx.cancellation());
        }

        let handler = registration.handler();
        match registration.options().run_mode {
            RunMode::Inline => {
                let outcome = invoke(handler, cx, params).await;
                self.complete(Completion {
                    id,
                    method,
                    outcome,
                });
            }
            RunMode::Background => {
                self.tasks.spawn(async move {
                    let outcome = invoke(handler, cx, params).await;
                    Completion {
                        id,
                        method,
                        outcome,
                    }
                });
            }
        }
    }

    fn complete(&mut self, completion: Completion) {
        let Completion {
            id,
            method,
            outcome,
        } = completion;

        let Some(id) = id else {
            if let Err(error) = outcome {
                error!(%method, %error, "Notification handler failed");
            }
            return;
        };

        let cancelled = self
            .inflight
            .remove(&id)
            .is_some_and(|flag| flag.load(Ordering::Acquire));
        let response = if cancelled {
            debug!(%id, %method, "Request cancelled");
            Response::err(Some(id), ResponseError::request_cancelled())
        } else {
            match outcome {
                Ok(result) => Response::ok(id, result),
                Err(error) => {
                    warn!(%id, %method, %error, "Request failed");
                    Response::err(Some(id), error.to_response_error())
                }
            }
        };
        self.respond(response);
    }

    fn finish_task(&mut self, joined: std::result::Result<Completion, JoinError>) {
        match joined {
            Ok(completion) => self.complete(completion),
            Err(error) if error.is_cancelled() => {}
            Err(error) => error!(%error, "Background task failed"),
        }
    }

    fn cancel_request(&self, params: &Value) {
        let Some(id) = params
            .get("id")
            .and_then(|id| RequestId::deserialize(id).ok())
        else {
            debug!(%params, "Ignoring malformed cancellation");
            return;
        };

        match self.inflight.get(&id) {
            Some(flag) => {
                flag.store(true, Ordering::Release);
                debug!(%id, "Cancellation requested");
            }
            None => trace!(%id, "Cancellation for request not in flight"),
        }
    }

    fn sync_document(&self, method: &str, params: &Value) -> Result<()> {
        match method {
            "textDocument/didOpen" => {
                let params = DidOpenTextDocumentParams::deserialize(params)?;
                let document = params.text_document;
                self.documents.open(
                    document.uri,
                    document.language_id,
                    document.version,
                    document.text,
                )?;
            }
            "textDocument/didChange" => {
                let params = DidChangeTextDocumentParams::deserialize(params)?;
                let edits: Vec<TextEdit> = params
                    .content_changes
                    .into_iter()
                    .map(TextEdit::from)
                    .collect();
                self.documents.change(
                    &params.text_document.uri,
                    params.text_document.version,
                    &edits,
                )?;
            }
            _ => {
                let params = DidCloseTextDocumentParams::deserialize(params)?;
                self.documents.close(&params.text_document.uri)?;
            }
        }
        Ok(())
    }

    fn handle_malformed(&self, error: &ferrule_wire::Error) {
        match error.recovered_id() {
            Some(id) => {
                warn!(%id, %error, "Malformed message");
                self.respond(Response::err(
                    Some(id.clone()),
                    ResponseError::parse_error(error.to_string()),
                ));
            }
            None => warn!(%error, "Dropping malformed frame"),
        }
    }

    fn context(&self, id: Option<RequestId>, method: &str) -> Context {
        Context::new(self.client.clone(), Arc::clone(&self.documents), id, method)
    }

    fn respond(&self, response: Response) {
        if self.outgoing.send(response.into()).is_err() {
            debug!("Writer closed, dropping response");
        }
    }
}

fn is_builtin(method: &str) -> bool {
    matches!(
        method,
        "initialized" | "textDocument/didOpen" | "textDocument/didChange" | "textDocument/didClose"
    )
}

async fn invoke(handler: Arc<dyn Handler>, cx: Context, params: Value) -> Result<Value> {
    match AssertUnwindSafe(handler.call(cx, params)).catch_unwind().await {
        Ok(outcome) => outcome,
        Err(payload) => Err(Error::HandlerPanicked(panic_message(payload.as_ref()))),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

async fn write_loop<W>(
    mut writer: MessageWriter<W>,
    mut queue: mpsc::UnboundedReceiver<Message>,
    mut stop: oneshot::Receiver<()>,
) where
    W: AsyncWrite + Unpin,
{
    loop {
        tokio::select! {
            biased;
            Some(message) = queue.recv() => {
                if let Err(error) = writer.write_message(&message).await {
                    error!(%error, "Failed to write message");
                    return;
                }
            }
            _ = &mut stop => break,
        }
    }

    // the session has ended; flush what it queued before stopping
    while let Ok(message) = queue.try_recv() {
        if let Err(error) = writer.write_message(&message).await {
            error!(%error, "Failed to write message");
            return;
        }
    }
    if let Err(error) = writer.shutdown().await {
        debug!(%error, "Failed to shut down output");
    }
}
