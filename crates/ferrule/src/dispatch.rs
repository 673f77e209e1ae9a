//! Mapping from method names to handlers.
//!
//! Handlers are registered explicitly, together with [`HandlerOptions`]
//! describing how the engine runs them and what they advertise during
//! `initialize`.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use lsp_types::notification::Notification as LspNotification;
use lsp_types::request::Request as LspRequest;
use serde_json::Value;
use tracing::warn;

use crate::context::Context;
use crate::error::{Error, Result};

/// Where a handler runs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RunMode {
    /// Awaited on the read loop; later messages wait for it.
    #[default]
    Inline,
    /// Spawned on its own task; the read loop moves on immediately.
    Background,
}

/// Registration metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HandlerOptions {
    /// Where the handler runs.
    pub run_mode: RunMode,
    /// Characters that trigger the feature, advertised in capabilities.
    pub trigger_characters: Vec<String>,
}

impl HandlerOptions {
    /// Options for a handler awaited on the read loop.
    #[must_use]
    pub fn inline() -> Self {
        Self::default()
    }

    /// Options for a handler spawned on its own task.
    #[must_use]
    pub fn background() -> Self {
        Self {
            run_mode: RunMode::Background,
            ..Self::default()
        }
    }

    /// Set the trigger characters.
    #[must_use]
    pub fn with_trigger_characters<I, S>(mut self, characters: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.trigger_characters = characters.into_iter().map(Into::into).collect();
        self
    }
}

/// A request, notification or command handler.
///
/// Implemented for every `Fn(Context, Value) -> impl Future<Output = Result<Value>>`
/// closure. Notification handlers' results are discarded.
#[async_trait]
pub trait Handler: Send + Sync + 'static {
    /// Handle one message.
    async fn call(&self, cx: Context, params: Value) -> Result<Value>;
}

#[async_trait]
impl<F, Fut> Handler for F
where
    F: Fn(Context, Value) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value>> + Send + 'static,
{
    async fn call(&self, cx: Context, params: Value) -> Result<Value> {
        (self)(cx, params).await
    }
}

/// A handler together with its options.
#[derive(Clone)]
pub struct Registration {
    handler: Arc<dyn Handler>,
    options: HandlerOptions,
}

impl std::fmt::Debug for Registration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registration")
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl Registration {
    /// The handler.
    #[must_use]
    pub fn handler(&self) -> Arc<dyn Handler> {
        Arc::clone(&self.handler)
    }

    /// The options it was registered with.
    #[must_use]
    pub fn options(&self) -> &HandlerOptions {
        &self.options
    }
}

/// Method and command registrations.
#[derive(Debug, Default, Clone)]
pub struct DispatchTable {
    handlers: HashMap<String, Registration>,
    commands: HashMap<String, Registration>,
}

impl DispatchTable {
    /// An empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for `method`, replacing any earlier registration.
    pub fn register<H: Handler>(
        &mut self,
        method: impl Into<String>,
        handler: H,
        options: HandlerOptions,
    ) -> &mut Self {
        let method = method.into();
        let registration = Registration {
            handler: Arc::new(handler),
            options,
        };
        if self.handlers.insert(method.clone(), registration).is_some() {
            warn!(%method, "Replacing existing handler");
        }
        self
    }

    /// The registration for `method`.
    #[must_use]
    pub fn lookup(&self, method: &str) -> Option<&Registration> {
        self.handlers.get(method)
    }

    /// Whether a handler is registered for `method`.
    #[must_use]
    pub fn contains(&self, method: &str) -> bool {
        self.handlers.contains_key(method)
    }

    /// Register a `workspace/executeCommand` command.
    ///
    /// The handler receives the command's `arguments` as a JSON array.
    pub fn register_command<H: Handler>(
        &mut self,
        name: impl Into<String>,
        handler: H,
        options: HandlerOptions,
    ) -> &mut Self {
        let name = name.into();
        let registration = Registration {
            handler: Arc::new(handler),
            options,
        };
        if self.commands.insert(name.clone(), registration).is_some() {
            warn!(command = %name, "Replacing existing command");
        }
        self
    }

    /// The registration for command `name`.
    #[must_use]
    pub fn command(&self, name: &str) -> Option<&Registration> {
        self.commands.get(name)
    }

    /// Registered command names, sorted.
    #[must_use]
    pub fn command_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.commands.keys().cloned().collect();
        names.sort();
        names
    }

    /// Register a typed request handler.
    ///
    /// Params that do not deserialize into `R::Params` fail with
    /// [`Error::InvalidParams`].
    pub fn request<R, F, Fut>(&mut self, handler: F, options: HandlerOptions) -> &mut Self
    where
        R: LspRequest + 'static,
        F: Fn(Context, R::Params) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R::Result>> + Send + 'static,
    {
        let handler = Arc::new(handler);
        self.register(
            R::METHOD,
            move |cx: Context, params: Value| {
                let handler = Arc::clone(&handler);
                async move { call_request::<R, F, Fut>(handler.as_ref(), cx, params).await }
            },
            options,
        )
    }

    /// Register a typed notification handler.
    pub fn notification<N, F, Fut>(&mut self, handler: F, options: HandlerOptions) -> &mut Self
    where
        N: LspNotification + 'static,
        F: Fn(Context, N::Params) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        let handler = Arc::new(handler);
        self.register(
            N::METHOD,
            move |cx: Context, params: Value| {
                let handler = Arc::clone(&handler);
                async move { call_notification::<N, F, Fut>(handler.as_ref(), cx, params).await }
            },
            options,
        )
    }
}

async fn call_request<R, F, Fut>(handler: &F, cx: Context, params: Value) -> Result<Value>
where
    R: LspRequest,
    F: Fn(Context, R::Params) -> Fut,
    Fut: Future<Output = Result<R::Result>>,
{
    let params = parse_params::<R::Params>(params)?;
    let result = handler(cx, params).await?;
    Ok(serde_json::to_value(result)?)
}

async fn call_notification<N, F, Fut>(handler: &F, cx: Context, params: Value) -> Result<Value>
where
    N: LspNotification,
    F: Fn(Context, N::Params) -> Fut,
    Fut: Future<Output = Result<()>>,
{
    let params = parse_params::<N::Params>(params)?;
    handler(cx, params).await?;
    Ok(Value::Null)
}

fn parse_params<T: serde::de::DeserializeOwned>(params: Value) -> Result<T> {
    serde_json::from_value(params).map_err(|e| Error::InvalidParams(e.to_string()))
}
