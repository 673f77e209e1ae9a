//! Matching responses to the requests the server sends.
//!
//! Each outgoing request gets an id from a counter starting at 1 and a
//! one-shot slot the caller waits on. Only the waiting task is suspended;
//! the read loop keeps running and feeds responses in through
//! [`Correlator::on_response`].
//!
//! An entry lives only as long as its [`PendingCall`]: answering, cancelling,
//! timing out or dropping the handle removes it, and a response arriving
//! afterwards is discarded as unknown.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::{Duration, Instant};

use ferrule_wire::{Message, Notification, Request, RequestId, Response};
use parking_lot::Mutex;
use serde_json::{Value, json};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, trace, warn};

use crate::error::{Error, Result};

type Slot = oneshot::Sender<Result<Value>>;

struct PendingRequest {
    method: String,
    created: Instant,
    slot: Slot,
}

struct Inner {
    next_id: AtomicI64,
    pending: Mutex<HashMap<RequestId, PendingRequest>>,
    outgoing: mpsc::UnboundedSender<Message>,
}

/// Tracks outstanding server-to-client requests.
#[derive(Clone)]
pub struct Correlator {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for Correlator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Correlator")
            .field("pending", &self.pending_count())
            .finish_non_exhaustive()
    }
}

/// A request that has been sent and is awaiting its response.
#[derive(Debug)]
pub struct PendingCall {
    id: RequestId,
    method: String,
    receiver: oneshot::Receiver<Result<Value>>,
    correlator: Correlator,
}

impl PendingCall {
    /// The id the request was sent with.
    #[must_use]
    pub fn id(&self) -> &RequestId {
        &self.id
    }

    /// Wait for the response, failing with [`Error::Timeout`] once `timeout`
    /// elapses. A timed out request is forgotten; a late response is dropped.
    pub async fn wait(mut self, timeout: Duration) -> Result<Value> {
        match tokio::time::timeout(timeout, &mut self.receiver).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(Error::Disconnected),
            Err(_) => {
                warn!(id = %self.id, method = %self.method, ?timeout, "Request timed out");
                Err(Error::Timeout {
                    method: std::mem::take(&mut self.method),
                    after: timeout,
                })
            }
        }
    }
}

impl Drop for PendingCall {
    fn drop(&mut self) {
        self.correlator.forget(&self.id);
    }
}

impl Correlator {
    /// Create a correlator that sends requests into `outgoing`.
    #[must_use]
    pub fn new(outgoing: mpsc::UnboundedSender<Message>) -> Self {
        Self {
            inner: Arc::new(Inner {
                next_id: AtomicI64::new(1),
                pending: Mutex::new(HashMap::new()),
                outgoing,
            }),
        }
    }

    /// Send a request and return a handle to wait on.
    pub fn start_request(&self, method: impl Into<String>, params: Value) -> Result<PendingCall> {
        let method = method.into();
        let id = RequestId::Number(self.inner.next_id.fetch_add(1, Ordering::Relaxed));
        let (slot, receiver) = oneshot::channel();

        self.inner.pending.lock().insert(
            id.clone(),
            PendingRequest {
                method: method.clone(),
                created: Instant::now(),
                slot,
            },
        );

        let call = PendingCall {
            id: id.clone(),
            method: method.clone(),
            receiver,
            correlator: self.clone(),
        };
        let request = Request::new(id.clone(), method.clone(), params);
        if self.inner.outgoing.send(request.into()).is_err() {
            return Err(Error::Disconnected);
        }
        trace!(%id, %method, "Sent request");
        Ok(call)
    }

    /// Send a request and wait up to `timeout` for its result.
    pub async fn send_request(
        &self,
        method: impl Into<String>,
        params: Value,
        timeout: Duration,
    ) -> Result<Value> {
        self.start_request(method, params)?.wait(timeout).await
    }

    /// Resolve the request a response belongs to.
    pub fn on_response(&self, response: Response) {
        let Some(id) = response.id else {
            debug!("Dropping response without id");
            return;
        };

        let entry = self.inner.pending.lock().remove(&id);
        match entry {
            None => debug!(%id, "Dropping response for unknown or abandoned request"),
            Some(PendingRequest {
                method,
                created,
                slot,
            }) => {
                trace!(%id, %method, elapsed = ?created.elapsed(), "Received response");
                // the waiter may have given up already
                let _ = slot.send(response.result.map_err(Error::Response));
            }
        }
    }

    /// Cancel an outstanding request.
    ///
    /// The waiter fails with [`Error::Cancelled`] and the peer is sent
    /// `$/cancelRequest`. Returns `false` if the id is not outstanding.
    pub fn cancel(&self, id: &RequestId) -> bool {
        let Some(entry) = self.inner.pending.lock().remove(id) else {
            return false;
        };

        let _ = entry.slot.send(Err(Error::Cancelled { id: id.clone() }));
        let notice = Notification::new("$/cancelRequest", json!({ "id": id }));
        if self.inner.outgoing.send(notice.into()).is_err() {
            debug!(%id, "Connection closed before cancellation was sent");
        }
        true
    }

    /// Fail every waiter with [`Error::Disconnected`].
    pub fn disconnect_all(&self) {
        let drained: Vec<_> = self.inner.pending.lock().drain().collect();
        for (id, entry) in drained {
            debug!(%id, method = %entry.method, "Failing request on disconnect");
            let _ = entry.slot.send(Err(Error::Disconnected));
        }
    }

    /// Number of requests still waiting for a response.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.inner.pending.lock().len()
    }

    fn forget(&self, id: &RequestId) {
        self.inner.pending.lock().remove(id);
    }
}
