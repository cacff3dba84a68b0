//! Per-document suspension of change handling while the engine edits.
//!
//! When the engine rewrites a buffer, the host reports that rewrite back as
//! an ordinary change. The engine takes a token for the document before the
//! edit and drops it afterwards; changes arriving for a suspended document
//! are the engine's own and are ignored. Other documents keep flowing.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use crate::host::DocumentId;

type SuspendedSet = Arc<Mutex<HashSet<DocumentId>>>;

/// Set of documents with a self-edit in flight.
#[derive(Clone, Default)]
pub struct EditSuspension {
    suspended: SuspendedSet,
}

impl EditSuspension {
    pub fn new() -> Self {
        Self::default()
    }

    /// Suspend `doc` until the returned token is dropped.
    ///
    /// Returns `None` if the document is already suspended.
    pub fn suspend(&self, doc: &DocumentId) -> Option<SuspensionToken> {
        let inserted = self
            .suspended
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(doc.clone());
        inserted.then(|| SuspensionToken {
            suspended: Arc::clone(&self.suspended),
            doc: doc.clone(),
        })
    }

    pub fn is_suspended(&self, doc: &DocumentId) -> bool {
        self.suspended
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains(doc)
    }
}

/// Held for the duration of one self-edit. Releases on drop, on every exit
/// path.
pub struct SuspensionToken {
    suspended: SuspendedSet,
    doc: DocumentId,
}

impl SuspensionToken {
    pub fn document(&self) -> &DocumentId {
        &self.doc
    }
}

impl Drop for SuspensionToken {
    fn drop(&mut self) {
        self.suspended
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&self.doc);
    }
}
