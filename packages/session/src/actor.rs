//! # Document Actor
//!
//! One task per open document owns its [`DocumentState`], pending queue,
//! Lamport clock and subscribers. Everything else talks to it through a
//! [`DocumentHandle`], so operations on one document are serialized without
//! locks while different documents proceed in parallel.
//!
//! With `batchWindowMs = 0` every submit folds immediately. Otherwise
//! submissions collect in the queue and fold together when the window ticks,
//! on an explicit flush, or on shutdown.
//!
//! Each folded operation is rebased over everything applied since its
//! `base_version`, so concurrent edits converge whatever order they arrive
//! in. Operations without a base are taken to be written against the
//! version current when the fold starts. A fold is built on a copy of the
//! state and only replaces it once the store has accepted the result.

use crate::broadcast::{DocumentUpdate, Subscriber, Subscribers};
use crate::config::SessionConfig;
use crate::errors::{SessionError, SessionResult};
use crate::history::History;
use crate::store::{DocumentStore, StoredDocument};
use inkwell_ot::{
    rebase_on, AppliedOperation, AuthorPriority, ConflictResolver, ConsistencyReport, DocumentId,
    DocumentState, LamportClock, Operation, OperationQueue,
};
use serde::{Deserialize, Serialize};
use std::ops::ControlFlow;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, info, instrument, warn};

/// Author ranking shared by every actor of a manager
#[derive(Clone)]
pub struct SharedPriority(Arc<dyn AuthorPriority + Send + Sync>);

impl SharedPriority {
    pub fn new(priorities: impl AuthorPriority + Send + Sync + 'static) -> Self {
        Self(Arc::new(priorities))
    }
}

impl AuthorPriority for SharedPriority {
    fn priority(&self, author_id: &str) -> i64 {
        self.0.priority(author_id)
    }
}

/// Returned by [`DocumentHandle::submit`]
#[derive(Debug, Clone, PartialEq)]
pub struct SubmitReceipt {
    /// Operations waiting for the next flush
    pub pending: usize,
    /// Set when the submit folded immediately
    pub flush: Option<FlushOutcome>,
}

/// Result of folding the pending queue
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlushOutcome {
    pub base_version: u64,
    pub version: u64,
    pub content: String,
    /// Every applied operation in server coordinates, in application order
    pub operations: Vec<Operation>,
    /// `None` unless an expectation was recorded for exactly `version`
    pub consistent: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentSnapshot {
    pub document_id: DocumentId,
    pub content: String,
    pub version: u64,
    pub pending: usize,
    pub subscribers: usize,
    pub clock: u64,
}

enum Command {
    Submit {
        operation: Operation,
        reply: oneshot::Sender<SessionResult<SubmitReceipt>>,
    },
    Flush {
        reply: oneshot::Sender<SessionResult<FlushOutcome>>,
    },
    Snapshot {
        reply: oneshot::Sender<DocumentSnapshot>,
    },
    RecordExpected {
        content: String,
        version: Option<u64>,
        reply: oneshot::Sender<()>,
    },
    VerifyConsistency {
        actual: String,
        reply: oneshot::Sender<ConsistencyReport>,
    },
    Subscribe {
        subscriber: Subscriber,
    },
    Unsubscribe {
        client_id: String,
        reply: oneshot::Sender<bool>,
    },
    Shutdown {
        reply: oneshot::Sender<SessionResult<DocumentSnapshot>>,
    },
}

/// Shared services handed to every actor
#[derive(Clone)]
pub(crate) struct ActorContext {
    pub config: Arc<SessionConfig>,
    pub store: Arc<dyn DocumentStore>,
    pub priorities: SharedPriority,
}

struct DocumentActor {
    state: DocumentState,
    history: History,
    queue: OperationQueue,
    clock: LamportClock,
    subscribers: Subscribers,
    resolver: ConflictResolver<SharedPriority>,
    config: Arc<SessionConfig>,
    store: Arc<dyn DocumentStore>,
}

/// Start an actor for `state`. Must be called inside a tokio runtime.
pub(crate) fn spawn(state: DocumentState, context: ActorContext) -> DocumentHandle {
    let (sender, receiver) = mpsc::channel(context.config.channel_capacity.max(1));
    let document_id = state.document_id.clone();

    let actor = DocumentActor {
        queue: OperationQueue::new(document_id.clone()),
        history: History::new(context.config.history_limit),
        clock: LamportClock::new(),
        subscribers: Subscribers::default(),
        resolver: ConflictResolver::new()
            .with_priorities(context.priorities)
            .with_default_strategy(context.config.default_strategy),
        config: context.config.clone(),
        store: context.store,
        state,
    };
    tokio::spawn(actor.run(receiver));

    DocumentHandle {
        document_id,
        subscriber_capacity: context.config.subscriber_capacity.max(1),
        sender,
    }
}

async fn next_tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}

impl DocumentActor {
    async fn run(mut self, mut receiver: mpsc::Receiver<Command>) {
        info!(
            document_id = %self.state.document_id,
            version = self.state.version,
            "Document actor started"
        );

        let mut ticker = self.config.batch_window().map(|window| {
            let mut interval = tokio::time::interval_at(Instant::now() + window, window);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            interval
        });

        loop {
            tokio::select! {
                command = receiver.recv() => {
                    let Some(command) = command else {
                        // Every handle dropped
                        if let Err(e) = self.flush().await {
                            warn!(document_id = %self.state.document_id, error = %e, "Final flush failed");
                        }
                        break;
                    };
                    if self.handle(command).await.is_break() {
                        break;
                    }
                }
                _ = next_tick(&mut ticker) => {
                    if !self.queue.is_empty() {
                        if let Err(e) = self.flush().await {
                            warn!(document_id = %self.state.document_id, error = %e, "Scheduled flush failed");
                        }
                    }
                }
            }
        }

        info!(
            document_id = %self.state.document_id,
            version = self.state.version,
            "Document actor stopped"
        );
    }

    async fn handle(&mut self, command: Command) -> ControlFlow<()> {
        match command {
            Command::Submit { operation, reply } => {
                let result = self.submit(operation).await;
                let _ = reply.send(result);
            }
            Command::Flush { reply } => {
                let result = self.flush().await;
                let _ = reply.send(result);
            }
            Command::Snapshot { reply } => {
                let _ = reply.send(self.snapshot());
            }
            Command::RecordExpected {
                content,
                version,
                reply,
            } => {
                let version = version.unwrap_or(self.state.version);
                self.state.record_expected(content, version);
                let _ = reply.send(());
            }
            Command::VerifyConsistency { actual, reply } => {
                let report = self.state.consistency_report(&actual);
                if !report.is_consistent() {
                    warn!(document_id = %self.state.document_id, report = ?report, "Consistency check failed");
                }
                let _ = reply.send(report);
            }
            Command::Subscribe { subscriber } => {
                self.subscribers.add(subscriber);
            }
            Command::Unsubscribe { client_id, reply } => {
                let _ = reply.send(self.subscribers.remove(&client_id));
            }
            Command::Shutdown { reply } => {
                let result = self.flush().await.map(|_| self.snapshot());
                let _ = reply.send(result);
                return ControlFlow::Break(());
            }
        }
        ControlFlow::Continue(())
    }

    async fn submit(&mut self, operation: Operation) -> SessionResult<SubmitReceipt> {
        if let Some(base_version) = operation.base_version {
            let oldest = self.history.oldest(self.state.version);
            if base_version < oldest || base_version > self.state.version {
                return Err(SessionError::UnknownBase {
                    document_id: self.state.document_id.clone(),
                    base_version,
                    oldest,
                    version: self.state.version,
                });
            }
        }

        self.clock.observe(operation.clock);
        self.clock.tick();

        let pending = self.queue.enqueue(operation)?;
        debug!(document_id = %self.state.document_id, pending, "Operation queued");

        if self.config.batch_window().is_some() {
            return Ok(SubmitReceipt {
                pending,
                flush: None,
            });
        }

        let flush = self.flush().await?;
        Ok(SubmitReceipt {
            pending: 0,
            flush: Some(flush),
        })
    }

    #[instrument(skip(self), fields(document_id = %self.state.document_id, pending = self.queue.len()))]
    async fn flush(&mut self) -> SessionResult<FlushOutcome> {
        let mut operations = self.queue.drain_sorted();
        if operations.is_empty() {
            return Ok(FlushOutcome {
                base_version: self.state.version,
                version: self.state.version,
                content: self.state.content.clone(),
                operations: Vec::new(),
                consistent: None,
            });
        }

        let strategy = self.resolver.default_strategy();
        self.resolver.order(&mut operations, strategy);

        let mut working = self.state.clone();
        let base_version = working.version;
        let mark = self.history.len();
        let mut applied: Vec<(u64, AppliedOperation)> = Vec::with_capacity(operations.len());

        for operation in &operations {
            let len = working.content.chars().count();
            let based_on = operation.base_version.unwrap_or(base_version);
            let Some((len_at_base, since)) = self.history.since(based_on, working.version, len)
            else {
                warn!(
                    author_id = %operation.author_id,
                    base_version = based_on,
                    "Dropping operation with unknown base"
                );
                continue;
            };

            let steps: Vec<Operation> = rebase_on(len_at_base, operation, &since)
                .into_iter()
                .map(|step| step.based_on(working.version))
                .collect();
            let batch = working.apply_steps(operation, steps.clone());
            self.history.record(len, steps);
            applied.extend(batch.versioned().map(|(v, op)| (v, op.clone())));
        }

        let saved = self.store.save(
            &working.document_id,
            StoredDocument {
                content: working.content.clone(),
                version: working.version,
            },
        );
        if let Err(e) = saved {
            self.history.truncate(mark);
            self.queue.requeue(operations);
            warn!(error = %e, pending = self.queue.len(), "Store rejected flush, operations requeued");
            return Err(e.into());
        }

        self.history.trim();
        self.state = working;

        let clock = self.clock.current();
        for (version, op) in &applied {
            let update = DocumentUpdate {
                document_id: self.state.document_id.clone(),
                operations: op.transformed.clone(),
                origin_author: op.operation.author_id.clone(),
                content: op.content.clone(),
                version: *version,
                clock,
            };
            self.subscribers.broadcast(&update, &op.operation.author_id);
        }

        let consistent = self.check_expected();
        info!(
            base_version,
            version = self.state.version,
            strategy = %strategy,
            "Flushed operations"
        );

        Ok(FlushOutcome {
            base_version,
            version: self.state.version,
            operations: applied
                .into_iter()
                .flat_map(|(_, op)| op.transformed)
                .collect(),
            content: self.state.content.clone(),
            consistent,
        })
    }

    fn check_expected(&self) -> Option<bool> {
        if !self.config.verify_after_flush {
            return None;
        }
        let expected = self.state.expected_state()?;
        if expected.version != self.state.version {
            return None;
        }

        let consistent = expected.verify(&self.state.content);
        if !consistent {
            warn!(
                document_id = %self.state.document_id,
                version = self.state.version,
                "Document diverged from expected state"
            );
        }
        Some(consistent)
    }

    fn snapshot(&self) -> DocumentSnapshot {
        DocumentSnapshot {
            document_id: self.state.document_id.clone(),
            content: self.state.content.clone(),
            version: self.state.version,
            pending: self.queue.len(),
            subscribers: self.subscribers.len(),
            clock: self.clock.current(),
        }
    }
}

/// Cloneable address of a running document actor
#[derive(Debug, Clone)]
pub struct DocumentHandle {
    document_id: DocumentId,
    subscriber_capacity: usize,
    sender: mpsc::Sender<Command>,
}

impl DocumentHandle {
    pub fn document_id(&self) -> &str {
        &self.document_id
    }

    /// False once the actor has shut down
    pub fn is_running(&self) -> bool {
        !self.sender.is_closed()
    }

    async fn request<T>(
        &self,
        command: impl FnOnce(oneshot::Sender<T>) -> Command,
    ) -> SessionResult<T> {
        let (reply, response) = oneshot::channel();
        self.sender
            .send(command(reply))
            .await
            .map_err(|_| self.stopped())?;
        response.await.map_err(|_| self.stopped())
    }

    fn stopped(&self) -> SessionError {
        SessionError::ActorStopped(self.document_id.clone())
    }

    /// Queue an operation for this document
    pub async fn submit(&self, operation: Operation) -> SessionResult<SubmitReceipt> {
        self.request(|reply| Command::Submit { operation, reply })
            .await?
    }

    /// Validate a wire payload and submit it
    pub async fn submit_json(&self, json: &str) -> SessionResult<SubmitReceipt> {
        let operation = Operation::from_json(json)?;
        self.submit(operation).await
    }

    /// Fold everything pending now
    pub async fn flush(&self) -> SessionResult<FlushOutcome> {
        self.request(|reply| Command::Flush { reply }).await?
    }

    pub async fn snapshot(&self) -> SessionResult<DocumentSnapshot> {
        self.request(|reply| Command::Snapshot { reply }).await
    }

    /// Record what clients should hold at `version` (current version if `None`)
    pub async fn record_expected(
        &self,
        content: impl Into<String>,
        version: Option<u64>,
    ) -> SessionResult<()> {
        let content = content.into();
        self.request(|reply| Command::RecordExpected {
            content,
            version,
            reply,
        })
        .await
    }

    pub async fn consistency_report(
        &self,
        actual: impl Into<String>,
    ) -> SessionResult<ConsistencyReport> {
        let actual = actual.into();
        self.request(|reply| Command::VerifyConsistency { actual, reply })
            .await
    }

    /// False when nothing was recorded or `actual` differs from it
    pub async fn verify_consistency(&self, actual: impl Into<String>) -> SessionResult<bool> {
        Ok(self.consistency_report(actual).await?.is_consistent())
    }

    /// Receive updates for operations authored by anyone but `client_id`
    pub async fn subscribe(
        &self,
        client_id: impl Into<String>,
    ) -> SessionResult<ReceiverStream<DocumentUpdate>> {
        let (sender, receiver) = mpsc::channel(self.subscriber_capacity);
        let subscriber = Subscriber {
            client_id: client_id.into(),
            sender,
        };
        self.sender
            .send(Command::Subscribe { subscriber })
            .await
            .map_err(|_| self.stopped())?;
        Ok(ReceiverStream::new(receiver))
    }

    pub async fn unsubscribe(&self, client_id: impl Into<String>) -> SessionResult<bool> {
        let client_id = client_id.into();
        self.request(|reply| Command::Unsubscribe { client_id, reply })
            .await
    }

    /// Flush, stop the actor and return the final state
    pub async fn shutdown(&self) -> SessionResult<DocumentSnapshot> {
        self.request(|reply| Command::Shutdown { reply }).await?
    }
}
