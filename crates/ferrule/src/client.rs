//! The handle handlers use to talk to the editor.

use std::time::Duration;

use ferrule_wire::{Message, Notification};
use lsp_types::notification::{
    LogMessage, Notification as LspNotification, PublishDiagnostics, ShowMessage,
};
use lsp_types::request::{Request as LspRequest, WorkspaceConfiguration};
use lsp_types::{
    ConfigurationItem, ConfigurationParams, Diagnostic, LogMessageParams, MessageType,
    PublishDiagnosticsParams, ShowMessageParams, Uri,
};
use serde_json::Value;
use tokio::sync::mpsc;

use crate::correlator::Correlator;
use crate::error::{Error, Result};

/// Sends notifications and requests to the client.
///
/// Cheap to clone. Notifications are queued for the writer task and never
/// block; requests suspend only the calling task until the response arrives.
#[derive(Debug, Clone)]
pub struct Client {
    outgoing: mpsc::UnboundedSender<Message>,
    correlator: Correlator,
    default_timeout: Duration,
}

impl Client {
    pub(crate) fn new(
        outgoing: mpsc::UnboundedSender<Message>,
        correlator: Correlator,
        default_timeout: Duration,
    ) -> Self {
        Self {
            outgoing,
            correlator,
            default_timeout,
        }
    }

    /// The correlator tracking this client's outstanding requests.
    #[must_use]
    pub fn correlator(&self) -> &Correlator {
        &self.correlator
    }

    /// Timeout used by [`request`](Self::request).
    #[must_use]
    pub fn default_timeout(&self) -> Duration {
        self.default_timeout
    }

    /// Send a notification with raw params.
    pub fn send_notification(&self, method: impl Into<String>, params: Value) -> Result<()> {
        self.outgoing
            .send(Notification::new(method, params).into())
            .map_err(|_| Error::Disconnected)
    }

    /// Send a typed notification.
    pub fn notify<N: LspNotification>(&self, params: N::Params) -> Result<()> {
        self.send_notification(N::METHOD, serde_json::to_value(params)?)
    }

    /// Send a request with raw params and wait up to `timeout` for the result.
    pub async fn send_request(
        &self,
        method: impl Into<String>,
        params: Value,
        timeout: Duration,
    ) -> Result<Value> {
        self.correlator.send_request(method, params, timeout).await
    }

    /// Send a typed request using the configured default timeout.
    pub async fn request<R: LspRequest>(&self, params: R::Params) -> Result<R::Result> {
        self.request_with_timeout::<R>(params, self.default_timeout)
            .await
    }

    /// Send a typed request with an explicit timeout.
    pub async fn request_with_timeout<R: LspRequest>(
        &self,
        params: R::Params,
        timeout: Duration,
    ) -> Result<R::Result> {
        let params = serde_json::to_value(params)?;
        let result = self.send_request(R::METHOD, params, timeout).await?;
        Ok(serde_json::from_value(result)?)
    }

    /// Replace the diagnostics shown for `uri`.
    pub fn publish_diagnostics(
        &self,
        uri: Uri,
        diagnostics: Vec<Diagnostic>,
        version: Option<i32>,
    ) -> Result<()> {
        self.notify::<PublishDiagnostics>(PublishDiagnosticsParams::new(uri, diagnostics, version))
    }

    /// Show a message in the editor UI.
    pub fn show_message(&self, typ: MessageType, message: impl Into<String>) -> Result<()> {
        self.notify::<ShowMessage>(ShowMessageParams {
            typ,
            message: message.into(),
        })
    }

    /// Write a message to the editor's log.
    pub fn log_message(&self, typ: MessageType, message: impl Into<String>) -> Result<()> {
        self.notify::<LogMessage>(LogMessageParams {
            typ,
            message: message.into(),
        })
    }

    /// Fetch configuration sections from the client.
    ///
    /// Returns one value per item, in order.
    pub async fn get_configuration(&self, items: Vec<ConfigurationItem>) -> Result<Vec<Value>> {
        self.get_configuration_with_timeout(items, self.default_timeout)
            .await
    }

    /// [`get_configuration`](Self::get_configuration) with an explicit timeout.
    pub async fn get_configuration_with_timeout(
        &self,
        items: Vec<ConfigurationItem>,
        timeout: Duration,
    ) -> Result<Vec<Value>> {
        self.request_with_timeout::<WorkspaceConfiguration>(ConfigurationParams { items }, timeout)
            .await
    }
}
