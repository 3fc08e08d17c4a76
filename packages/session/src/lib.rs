//! # Inkwell Session
//!
//! Async hosting for [`inkwell_ot`] documents.
//!
//! - [`SessionManager`]: opens documents from a [`DocumentStore`] and keeps one
//!   actor per document
//! - [`DocumentHandle`]: submit, flush, subscribe and verify against that actor
//! - [`SessionConfig`]: strategy, batching and buffer sizes from
//!   `inkwell.config.json`
//!
//! ```rust,no_run
//! use inkwell_ot::Operation;
//! use inkwell_session::{MemoryStore, SessionConfig, SessionManager};
//! use std::sync::Arc;
//!
//! # async fn run() -> Result<(), inkwell_session::SessionError> {
//! let store = Arc::new(MemoryStore::new().with_document("notes", "Hello world"));
//! let manager = SessionManager::new(SessionConfig::default(), store);
//!
//! let doc = manager.open("notes")?;
//! let receipt = doc
//!     .submit(Operation::insert(5, ",").by("alice").on("notes"))
//!     .await?;
//! assert_eq!(receipt.flush.unwrap().content, "Hello, world");
//! # Ok(())
//! # }
//! ```

mod actor;
mod broadcast;
mod config;
mod errors;
mod history;
mod manager;
mod store;

pub use actor::{DocumentHandle, DocumentSnapshot, FlushOutcome, SharedPriority, SubmitReceipt};
pub use broadcast::{DocumentUpdate, Subscriber};
pub use config::{SessionConfig, DEFAULT_CONFIG_NAME};
pub use errors::{SessionError, SessionResult};
pub use manager::SessionManager;
pub use store::{DocumentStore, MemoryStore, StoreError, StoredDocument};
