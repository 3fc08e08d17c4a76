//! Registry of open documents, one actor each.

use crate::actor::{self, ActorContext, DocumentHandle, DocumentSnapshot, SharedPriority};
use crate::config::SessionConfig;
use crate::errors::{SessionError, SessionResult};
use crate::store::DocumentStore;
use inkwell_ot::{
    AuthorPriority, ConflictResolution, ConflictResolver, DocumentId, DocumentState, NoPriority,
    Operation,
};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{debug, info};

pub struct SessionManager {
    config: Arc<SessionConfig>,
    store: Arc<dyn DocumentStore>,
    priorities: SharedPriority,
    sessions: RwLock<HashMap<DocumentId, DocumentHandle>>,
}

impl SessionManager {
    pub fn new(config: SessionConfig, store: Arc<dyn DocumentStore>) -> Self {
        Self {
            config: Arc::new(config),
            store,
            priorities: SharedPriority::new(NoPriority),
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Builder: author ranking for `user_priority` ordering
    pub fn with_priorities(mut self, priorities: impl AuthorPriority + Send + Sync + 'static) -> Self {
        self.priorities = SharedPriority::new(priorities);
        self
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Handle for a document, starting its actor from the store if needed.
    ///
    /// Must be called inside a tokio runtime.
    pub fn open(&self, document_id: &str) -> SessionResult<DocumentHandle> {
        self.open_with_content(document_id, "")
    }

    /// Like [`open`](Self::open), seeding `initial` when the store has nothing
    pub fn open_with_content(&self, document_id: &str, initial: &str) -> SessionResult<DocumentHandle> {
        if let Some(handle) = self.handle(document_id) {
            return Ok(handle);
        }

        let mut sessions = self.sessions.write().unwrap_or_else(PoisonError::into_inner);

        // Someone may have opened it while we waited for the lock
        if let Some(handle) = sessions.get(document_id).filter(|h| h.is_running()) {
            return Ok(handle.clone());
        }

        let state = match self.store.load(document_id)? {
            Some(stored) => {
                debug!(document_id, version = stored.version, "Loaded document");
                DocumentState::new(document_id, stored.content).with_version(stored.version)
            }
            None => DocumentState::new(document_id, initial),
        };

        let handle = actor::spawn(
            state,
            ActorContext {
                config: self.config.clone(),
                store: self.store.clone(),
                priorities: self.priorities.clone(),
            },
        );
        sessions.insert(document_id.to_string(), handle.clone());
        info!(document_id, "Opened document");
        Ok(handle)
    }

    /// Handle for an already running document
    pub fn handle(&self, document_id: &str) -> Option<DocumentHandle> {
        self.sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(document_id)
            .filter(|handle| handle.is_running())
            .cloned()
    }

    /// Flush, persist and stop a document's actor
    pub async fn close(&self, document_id: &str) -> SessionResult<DocumentSnapshot> {
        let handle = self
            .sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(document_id)
            .ok_or_else(|| SessionError::NotOpen(document_id.to_string()))?;

        let snapshot = handle.shutdown().await?;
        info!(document_id, version = snapshot.version, "Closed document");
        Ok(snapshot)
    }

    /// Close every open document
    pub async fn close_all(&self) -> SessionResult<Vec<DocumentSnapshot>> {
        let mut snapshots = Vec::new();
        for document_id in self.open_documents() {
            snapshots.push(self.close(&document_id).await?);
        }
        Ok(snapshots)
    }

    pub async fn verify_consistency(&self, document_id: &str, actual: &str) -> SessionResult<bool> {
        let handle = self
            .handle(document_id)
            .ok_or_else(|| SessionError::NotOpen(document_id.to_string()))?;
        handle.verify_consistency(actual).await
    }

    /// Resolve a pair written against `base` with the configured strategy and
    /// author ranking. Positions are clamped to `base` first.
    pub fn resolve(&self, base: &str, a: &Operation, b: &Operation) -> ConflictResolution {
        ConflictResolver::new()
            .with_priorities(self.priorities.clone())
            .with_default_strategy(self.config.default_strategy)
            .resolve_on(base, a, b)
    }

    /// Ids of running documents, sorted
    pub fn open_documents(&self) -> Vec<DocumentId> {
        let mut ids: Vec<DocumentId> = self
            .sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|(_, handle)| handle.is_running())
            .map(|(id, _)| id.clone())
            .collect();
        ids.sort();
        ids
    }
}
