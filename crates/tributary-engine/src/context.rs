//! Per-run context handed to every stage call.

use std::sync::Arc;

use tributary_state::RecordStore;
use tributary_types::{ConnectionId, Params};

/// Connection, scope and storage session of one subtask run.
///
/// The store is owned by the caller; stages read and write through it.
#[derive(Clone)]
pub struct Context {
    connection_id: ConnectionId,
    scope_id: String,
    store: Arc<dyn RecordStore>,
}

impl Context {
    pub fn new(
        connection_id: ConnectionId,
        scope_id: impl Into<String>,
        store: Arc<dyn RecordStore>,
    ) -> Self {
        Self {
            connection_id,
            scope_id: scope_id.into(),
            store,
        }
    }

    #[must_use]
    pub fn connection_id(&self) -> ConnectionId {
        self.connection_id
    }

    #[must_use]
    pub fn scope_id(&self) -> &str {
        &self.scope_id
    }

    #[must_use]
    pub fn store(&self) -> &dyn RecordStore {
        self.store.as_ref()
    }

    /// Fingerprint tagging raw payloads collected in this context.
    #[must_use]
    pub fn params(&self) -> Params {
        Params::new(self.connection_id, self.scope_id.clone())
    }
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("connection_id", &self.connection_id)
            .field("scope_id", &self.scope_id)
            .finish_non_exhaustive()
    }
}
