//! Fan-out of applied operations to the clients of a document

use inkwell_ot::{DocumentId, Operation};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, warn};

/// Sent to every subscriber except the author after an operation lands
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentUpdate {
    pub document_id: DocumentId,
    /// The operation as it was applied, in server coordinates
    pub operations: Vec<Operation>,
    pub origin_author: String,
    /// Content right after these operations
    pub content: String,
    pub version: u64,
    /// Lamport time of the document actor when the update was sent
    pub clock: u64,
}

/// A connected client. `client_id` is the author id the client submits with.
#[derive(Debug, Clone)]
pub struct Subscriber {
    pub client_id: String,
    pub sender: mpsc::Sender<DocumentUpdate>,
}

#[derive(Debug, Default)]
pub(crate) struct Subscribers {
    clients: Vec<Subscriber>,
}

impl Subscribers {
    /// Add a client, replacing any previous subscription with the same id
    pub fn add(&mut self, subscriber: Subscriber) {
        self.remove(&subscriber.client_id);
        debug!(client_id = %subscriber.client_id, "Subscriber added");
        self.clients.push(subscriber);
    }

    pub fn remove(&mut self, client_id: &str) -> bool {
        let before = self.clients.len();
        self.clients.retain(|c| c.client_id != client_id);
        before != self.clients.len()
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    /// Send to everyone but `origin` without waiting. A client whose buffer
    /// is full has fallen behind and is dropped like one that disconnected.
    pub fn broadcast(&mut self, update: &DocumentUpdate, origin: &str) {
        let mut dropped = Vec::new();

        for client in &self.clients {
            if client.client_id == origin {
                continue;
            }
            match client.sender.try_send(update.clone()) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    dropped.push((client.client_id.clone(), "lagging"));
                }
                Err(TrySendError::Closed(_)) => {
                    dropped.push((client.client_id.clone(), "disconnected"));
                }
            }
        }

        for (client_id, reason) in dropped {
            warn!(client_id = %client_id, reason, "Dropping subscriber");
            self.remove(&client_id);
        }
    }
}
