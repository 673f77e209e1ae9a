//! ferrule-json: a JSON language server.
//!
//! A small language server built on the [`ferrule`] runtime. It checks JSON
//! documents as they change and reports the first syntax error as a
//! diagnostic.
//!
//! # Architecture
//!
//! - [`validate`]: JSON syntax checking and diagnostics
//! - [`server`]: handler table and document-change wiring
//! - [`transport`]: stdio and TCP connections
//! - [`cli`]: command-line arguments
//! - [`error`]: error types
//!
//! # Features
//!
//! - Diagnostics on open and on every change
//! - Completion of brackets and quotes, triggered by `,`
//! - `showPythonPath`: shows the client's `python.pythonPath` setting

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod cli;
pub mod error;
pub mod server;
pub mod transport;
pub mod validate;

pub use cli::{Cli, Transport};
pub use error::{Error, Result};
pub use server::{build, dispatch_table};
