//! The `initialize` result, derived from what is registered.

use lsp_types::{
    CompletionOptions, ExecuteCommandOptions, HoverProviderCapability, OneOf, ServerCapabilities,
    TextDocumentSyncCapability, TextDocumentSyncKind, TextDocumentSyncOptions,
    WorkDoneProgressOptions,
};
use serde_json::{Map, Value, json};

use crate::config::ServerConfig;
use crate::dispatch::DispatchTable;

/// Capabilities advertised for the registered handlers.
///
/// Text synchronisation is always incremental with open/close
/// notifications, since the engine maintains documents itself.
pub(crate) fn server_capabilities(table: &DispatchTable) -> ServerCapabilities {
    let completion_provider = table.lookup("textDocument/completion").map(|registration| {
        let triggers = &registration.options().trigger_characters;
        CompletionOptions {
            trigger_characters: (!triggers.is_empty()).then(|| triggers.clone()),
            resolve_provider: table.contains("completionItem/resolve").then_some(true),
            ..CompletionOptions::default()
        }
    });

    let commands = table.command_names();
    let execute_command_provider = (!commands.is_empty()).then(|| ExecuteCommandOptions {
        commands,
        work_done_progress_options: WorkDoneProgressOptions::default(),
    });

    ServerCapabilities {
        text_document_sync: Some(TextDocumentSyncCapability::Options(
            TextDocumentSyncOptions {
                open_close: Some(true),
                change: Some(TextDocumentSyncKind::INCREMENTAL),
                ..TextDocumentSyncOptions::default()
            },
        )),
        completion_provider,
        execute_command_provider,
        hover_provider: table
            .contains("textDocument/hover")
            .then_some(HoverProviderCapability::Simple(true)),
        definition_provider: provides(table, "textDocument/definition"),
        references_provider: provides(table, "textDocument/references"),
        document_symbol_provider: provides(table, "textDocument/documentSymbol"),
        document_formatting_provider: provides(table, "textDocument/formatting"),
        ..ServerCapabilities::default()
    }
}

fn provides<T>(table: &DispatchTable, method: &str) -> Option<OneOf<bool, T>> {
    table.contains(method).then_some(OneOf::Left(true))
}

/// The full `InitializeResult` as JSON.
pub(crate) fn initialize_result(table: &DispatchTable, config: &ServerConfig) -> Value {
    json!({
        "capabilities": server_capabilities(table),
        "serverInfo": {
            "name": config.server_name,
            "version": config.server_version,
        },
    })
}

/// Merge a hook's result over the computed one.
///
/// Top-level keys replace, except `capabilities`, whose keys are merged
/// individually. Anything other than an object is ignored.
pub(crate) fn merge(base: &mut Value, overlay: Value) {
    let (Value::Object(base), Value::Object(overlay)) = (base, overlay) else {
        return;
    };

    for (key, value) in overlay {
        if key == "capabilities" {
            if let (Some(Value::Object(existing)), Value::Object(extra)) = (base.get_mut(&key), &value) {
                merge_shallow(existing, extra);
                continue;
            }
        }
        base.insert(key, value);
    }
}

fn merge_shallow(base: &mut Map<String, Value>, overlay: &Map<String, Value>) {
    for (key, value) in overlay {
        base.insert(key.clone(), value.clone());
    }
}
