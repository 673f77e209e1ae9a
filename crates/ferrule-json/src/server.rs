//! Handlers and wiring for the JSON language server.

use std::time::Duration;

use ferrule::{
    Client, Context, DispatchTable, Engine, HandlerOptions, Result, ServerConfig, TextDocument,
};
use lsp_types::notification::{DidCloseTextDocument, DidOpenTextDocument};
use lsp_types::request::Completion;
use lsp_types::{
    CompletionItem, CompletionList, CompletionParams, CompletionResponse, ConfigurationItem,
    DidCloseTextDocumentParams, DidOpenTextDocumentParams, MessageType,
};
use serde_json::Value;
use tracing::debug;

use crate::validate;

/// Command that shows the client's configured Python interpreter.
pub const SHOW_PYTHON_PATH: &str = "showPythonPath";

/// How long [`SHOW_PYTHON_PATH`] waits for the client's configuration.
pub const CONFIGURATION_TIMEOUT: Duration = Duration::from_secs(1);

/// Labels offered by completion.
pub const COMPLETION_LABELS: [&str; 5] = ["\"", "[", "]", "{", "}"];

/// Build the handler table.
#[must_use]
pub fn dispatch_table() -> DispatchTable {
    let mut table = DispatchTable::new();
    table
        .request::<Completion, _, _>(
            complete,
            HandlerOptions::inline().with_trigger_characters([","]),
        )
        .notification::<DidOpenTextDocument, _, _>(did_open, HandlerOptions::inline())
        .notification::<DidCloseTextDocument, _, _>(did_close, HandlerOptions::inline())
        .register_command(
            SHOW_PYTHON_PATH,
            show_python_path,
            HandlerOptions::background(),
        );
    table
}

/// An engine serving the JSON handlers, revalidating on every change.
#[must_use]
pub fn build(config: ServerConfig) -> Engine {
    let engine = Engine::new(config, dispatch_table());
    engine.on_document_change(|client, document| {
        if let Err(error) = publish_validation(client, document) {
            debug!(uri = document.uri.as_str(), %error, "Failed to publish diagnostics");
        }
    });
    engine
}

/// Validate `document` and publish the result, clearing old diagnostics
/// when it is valid.
pub fn publish_validation(client: &Client, document: &TextDocument) -> Result<()> {
    let diagnostics = validate::diagnostics(&document.text);
    debug!(
        uri = document.uri.as_str(),
        count = diagnostics.len(),
        "Publishing diagnostics"
    );
    client.publish_diagnostics(document.uri.clone(), diagnostics, Some(document.version))
}

async fn complete(_cx: Context, _params: CompletionParams) -> Result<Option<CompletionResponse>> {
    let items = COMPLETION_LABELS
        .iter()
        .map(|label| CompletionItem {
            label: (*label).to_string(),
            ..CompletionItem::default()
        })
        .collect();

    Ok(Some(CompletionResponse::List(CompletionList {
        is_incomplete: false,
        items,
    })))
}

async fn did_open(cx: Context, params: DidOpenTextDocumentParams) -> Result<()> {
    let client = cx.client();
    client.show_message(MessageType::INFO, "Text Document Did Open")?;
    client.log_message(MessageType::LOG, "Validating json...")?;

    let document = cx.documents().get(&params.text_document.uri)?;
    publish_validation(client, &document)
}

async fn did_close(cx: Context, _params: DidCloseTextDocumentParams) -> Result<()> {
    cx.client()
        .show_message(MessageType::INFO, "Text Document Did Close")
}

async fn show_python_path(cx: Context, _arguments: Value) -> Result<Value> {
    let items = vec![ConfigurationItem {
        scope_uri: None,
        section: Some("python".to_string()),
    }];
    let configs = cx
        .client()
        .get_configuration_with_timeout(items, CONFIGURATION_TIMEOUT)
        .await?;

    let python_path = match configs.first().and_then(|config| config.get("pythonPath")) {
        None | Some(Value::Null) => "None".to_string(),
        Some(Value::String(path)) => path.clone(),
        Some(other) => other.to_string(),
    };
    cx.client()
        .show_message(MessageType::INFO, format!("Python path: {python_path}"))?;
    Ok(Value::Null)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ferrule::RunMode;

    #[test]
    fn table_registers_json_features() {
        let table = dispatch_table();

        let completion = table.lookup("textDocument/completion").unwrap();
        assert_eq!(completion.options().trigger_characters, vec![",".to_string()]);
        assert_eq!(completion.options().run_mode, RunMode::Inline);

        assert!(table.contains("textDocument/didOpen"));
        assert!(table.contains("textDocument/didClose"));
        assert!(!table.contains("textDocument/didChange"));

        let command = table.command(SHOW_PYTHON_PATH).unwrap();
        assert_eq!(command.options().run_mode, RunMode::Background);
        assert_eq!(table.command_names(), vec![SHOW_PYTHON_PATH.to_string()]);
    }
}
