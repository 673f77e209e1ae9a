//! Per-invocation handler context.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use ferrule_wire::RequestId;

use crate::client::Client;
use crate::document::DocumentStore;

/// Everything a handler can reach while it runs.
#[derive(Debug, Clone)]
pub struct Context {
    client: Client,
    documents: Arc<DocumentStore>,
    request_id: Option<RequestId>,
    method: String,
    cancelled: Arc<AtomicBool>,
}

impl Context {
    pub(crate) fn new(
        client: Client,
        documents: Arc<DocumentStore>,
        request_id: Option<RequestId>,
        method: impl Into<String>,
    ) -> Self {
        Self {
            client,
            documents,
            request_id,
            method: method.into(),
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Handle for messages to the editor.
    #[must_use]
    pub fn client(&self) -> &Client {
        &self.client
    }

    /// The open documents.
    #[must_use]
    pub fn documents(&self) -> &Arc<DocumentStore> {
        &self.documents
    }

    /// Id of the request being handled, `None` for notifications.
    #[must_use]
    pub fn request_id(&self) -> Option<&RequestId> {
        self.request_id.as_ref()
    }

    /// Method being handled.
    #[must_use]
    pub fn method(&self) -> &str {
        &self.method
    }

    /// Whether the client has sent `$/cancelRequest` for this request.
    ///
    /// Long-running handlers may poll this and return early; the engine
    /// replies with `RequestCancelled` either way.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    pub(crate) fn cancellation(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancelled)
    }
}
