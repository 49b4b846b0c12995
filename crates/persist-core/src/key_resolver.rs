//! KeyResolver: derives the active DocumentId from the page address.

use crate::document_id::{DocumentId, GENERATED_LEN};
use crate::location::LocationStore;
use std::sync::RwLock;
use tracing::{debug, info, warn};

/// Query parameter carrying the document ID.
pub const DEFAULT_KEY_PARAM: &str = "key";

/// Keeps the active document ID in sync with the address bar.
///
/// An address without an ID gets a freshly generated one written into it
/// (without a reload), so a reload lands on the same document.
pub struct KeyResolver<L> {
    location: L,
    param: String,
    id_len: usize,
    current: RwLock<Option<DocumentId>>,
}

impl<L: LocationStore> KeyResolver<L> {
    pub fn new(location: L) -> Self {
        Self {
            location,
            param: DEFAULT_KEY_PARAM.to_string(),
            id_len: GENERATED_LEN,
            current: RwLock::new(None),
        }
    }

    /// Use a different query parameter name.
    pub fn with_param(mut self, param: impl Into<String>) -> Self {
        self.param = param.into();
        self
    }

    /// Length of generated IDs.
    pub fn with_id_length(mut self, len: usize) -> Self {
        self.id_len = len;
        self
    }

    /// Resolve the document ID from the current address.
    ///
    /// A missing or malformed ID is replaced by a new one, and the address is
    /// rewritten to carry it.
    pub fn resolve(&self) -> DocumentId {
        let id = match self.location.query_param(&self.param) {
            Some(raw) => match raw.parse::<DocumentId>() {
                Ok(id) => id,
                Err(e) => {
                    warn!("Ignoring malformed document ID {:?} in address: {}", raw, e);
                    self.assign_new()
                }
            },
            None => self.assign_new(),
        };

        debug!("Resolved document ID: {}", id);
        *self.current.write().unwrap_or_else(|e| e.into_inner()) = Some(id.clone());
        id
    }

    /// Re-resolve after a back/forward navigation.
    ///
    /// Returns the new ID only when it differs from the previous one.
    pub fn on_navigation(&self) -> Option<DocumentId> {
        let previous = self.current();
        let id = self.resolve();
        if previous.as_ref() == Some(&id) {
            None
        } else {
            info!("Document ID changed by navigation: {}", id);
            Some(id)
        }
    }

    /// The last resolved ID, if `resolve` has run.
    pub fn current(&self) -> Option<DocumentId> {
        self.current
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn location(&self) -> &L {
        &self.location
    }

    fn assign_new(&self) -> DocumentId {
        let id = DocumentId::generate_with_len(self.id_len);
        self.location.set_query_param(&self.param, id.as_str());
        info!("Generated new document ID: {}", id);
        id
    }
}
