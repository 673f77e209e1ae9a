//! Ferrule - the core of a Language Server Protocol runtime.
//!
//! This crate turns a duplex byte stream into a running language server:
//! it decodes framed JSON-RPC messages, drives the connection lifecycle,
//! dispatches requests and notifications to registered handlers, keeps the
//! client's open documents in sync, and correlates server-initiated requests
//! with their responses.
//!
//! # Architecture
//!
//! - [`document`]: open text documents and incremental edit application
//! - [`dispatch`]: method name to handler mapping with run-mode metadata
//! - [`correlator`]: ids, pending results and timeouts for outgoing requests
//! - [`engine`]: the read loop, lifecycle state machine and worker policy
//! - [`client`]: the handle handlers use to talk back to the editor
//!
//! # Example
//!
//! ```no_run
//! use ferrule::{Context, DispatchTable, Engine, HandlerOptions, ServerConfig};
//! use lsp_types::request::Completion;
//! use lsp_types::{CompletionItem, CompletionParams, CompletionResponse};
//!
//! async fn complete(_cx: Context, _params: CompletionParams) -> ferrule::Result<Option<CompletionResponse>> {
//!     Ok(Some(CompletionResponse::Array(vec![CompletionItem::new_simple(
//!         "{".to_string(),
//!         String::new(),
//!     )])))
//! }
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> anyhow::Result<()> {
//!     let mut table = DispatchTable::new();
//!     table.request::<Completion, _, _>(
//!         complete,
//!         HandlerOptions::inline().with_trigger_characters([","]),
//!     );
//!
//!     let engine = Engine::new(ServerConfig::default(), table);
//!     engine.serve(tokio::io::stdin(), tokio::io::stdout()).await?;
//!     Ok(())
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod client;
pub mod config;
pub mod context;
pub mod correlator;
pub mod dispatch;
pub mod document;
pub mod engine;
pub mod error;
pub mod text;

pub use client::Client;
pub use config::ServerConfig;
pub use context::Context;
pub use correlator::{Correlator, PendingCall};
pub use dispatch::{DispatchTable, Handler, HandlerOptions, Registration, RunMode};
pub use document::{DocumentStore, TextDocument};
pub use engine::{Engine, ExitStatus, LifecycleState};
pub use error::{DocumentError, Error, Result};
pub use text::TextEdit;

pub use ferrule_wire as wire;
