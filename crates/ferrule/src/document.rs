//! The store of documents the client has open.
//!
//! The map of documents sits behind a read-mostly lock and every document has
//! its own mutex, so edits to different URIs never wait on each other.
//! Readers always receive a cloned snapshot.

use std::collections::HashMap;
use std::sync::Arc;

use lsp_types::Uri;
use parking_lot::{Mutex, RwLock};
use tracing::{debug, trace};

use crate::error::DocumentError;
use crate::text::{self, TextEdit};

/// An open text document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextDocument {
    /// The document URI.
    pub uri: Uri,
    /// Language identifier sent by the client, such as `json`.
    pub language_id: String,
    /// Version number, strictly increasing with every change.
    pub version: i32,
    /// Full text content.
    pub text: String,
}

impl TextDocument {
    /// Create a document snapshot.
    pub fn new(uri: Uri, language_id: impl Into<String>, version: i32, text: impl Into<String>) -> Self {
        Self {
            uri,
            language_id: language_id.into(),
            version,
            text: text.into(),
        }
    }
}

type ChangeCallback = Arc<dyn Fn(&TextDocument) + Send + Sync>;

/// Thread-safe store of open documents.
#[derive(Default)]
pub struct DocumentStore {
    documents: RwLock<HashMap<String, Arc<Mutex<TextDocument>>>>,
    on_change: RwLock<Option<ChangeCallback>>,
}

impl std::fmt::Debug for DocumentStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocumentStore")
            .field("documents", &self.len())
            .field("on_change", &self.on_change.read().is_some())
            .finish()
    }
}

impl DocumentStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the callback run after every successful [`change`](Self::change).
    ///
    /// The callback receives the new snapshot and runs on the caller's task
    /// after all store locks are released. A later call replaces it.
    pub fn set_on_change<F>(&self, callback: F)
    where
        F: Fn(&TextDocument) + Send + Sync + 'static,
    {
        *self.on_change.write() = Some(Arc::new(callback));
    }

    /// Start tracking a document.
    pub fn open(
        &self,
        uri: Uri,
        language_id: impl Into<String>,
        version: i32,
        text: impl Into<String>,
    ) -> Result<(), DocumentError> {
        let key = uri.as_str().to_owned();
        let mut documents = self.documents.write();
        if documents.contains_key(&key) {
            return Err(DocumentError::AlreadyOpen { uri: key });
        }

        let document = TextDocument::new(uri, language_id, version, text);
        debug!(uri = %key, version, "Opened document");
        documents.insert(key, Arc::new(Mutex::new(document)));
        Ok(())
    }

    /// Apply a batch of edits and move the document to `version`.
    ///
    /// `version` must be greater than the current version. Stale changes and
    /// invalid batches leave the document untouched. Returns the new snapshot.
    pub fn change(
        &self,
        uri: &Uri,
        version: i32,
        edits: &[TextEdit],
    ) -> Result<TextDocument, DocumentError> {
        let entry = self.entry(uri)?;
        let snapshot = {
            let mut document = entry.lock();
            if version <= document.version {
                return Err(DocumentError::StaleVersion {
                    uri: uri.as_str().to_owned(),
                    current: document.version,
                    received: version,
                });
            }

            let updated = text::apply_edits(&document.text, edits)
                .map_err(|e| DocumentError::from_edit(uri.as_str(), e))?;
            document.text = updated;
            document.version = version;
            trace!(uri = %uri.as_str(), version, edits = edits.len(), "Applied changes");
            document.clone()
        };

        let callback = self.on_change.read().clone();
        if let Some(callback) = callback {
            callback(&snapshot);
        }
        Ok(snapshot)
    }

    /// Stop tracking a document.
    pub fn close(&self, uri: &Uri) -> Result<(), DocumentError> {
        match self.documents.write().remove(uri.as_str()) {
            Some(_) => {
                debug!(uri = %uri.as_str(), "Closed document");
                Ok(())
            }
            None => Err(unknown(uri)),
        }
    }

    /// Snapshot of an open document.
    pub fn get(&self, uri: &Uri) -> Result<TextDocument, DocumentError> {
        Ok(self.entry(uri)?.lock().clone())
    }

    /// Whether `uri` is open.
    #[must_use]
    pub fn contains(&self, uri: &Uri) -> bool {
        self.documents.read().contains_key(uri.as_str())
    }

    /// URIs of all open documents, sorted.
    #[must_use]
    pub fn uris(&self) -> Vec<Uri> {
        let entries: Vec<_> = self.documents.read().values().cloned().collect();
        let mut uris: Vec<Uri> = entries.iter().map(|entry| entry.lock().uri.clone()).collect();
        uris.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        uris
    }

    /// Number of open documents.
    #[must_use]
    pub fn len(&self) -> usize {
        self.documents.read().len()
    }

    /// Whether no documents are open.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.documents.read().is_empty()
    }

    fn entry(&self, uri: &Uri) -> Result<Arc<Mutex<TextDocument>>, DocumentError> {
        self.documents
            .read()
            .get(uri.as_str())
            .cloned()
            .ok_or_else(|| unknown(uri))
    }
}

fn unknown(uri: &Uri) -> DocumentError {
    DocumentError::UnknownDocument {
        uri: uri.as_str().to_owned(),
    }
}
