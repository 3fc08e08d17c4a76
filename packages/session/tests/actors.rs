use inkwell_ot::{ConsistencyReport, EngineError, Operation, ResolutionStrategy};
use inkwell_session::{
    DocumentStore, MemoryStore, SessionConfig, SessionError, SessionManager, StoreError,
    StoredDocument,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_stream::StreamExt;

fn manager_with(config: SessionConfig, base: &str) -> (SessionManager, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new().with_document("doc", base));
    (SessionManager::new(config, store.clone()), store)
}

fn batched(window_ms: u64) -> SessionConfig {
    SessionConfig {
        batch_window_ms: window_ms,
        ..SessionConfig::default()
    }
}

// ============================================================================
// Immediate mode
// ============================================================================

#[tokio::test]
async fn test_submit_applies_and_persists() {
    let (manager, store) = manager_with(SessionConfig::default(), "Hello world");
    let doc = manager.open("doc").unwrap();

    let receipt = doc
        .submit(Operation::insert(5, ",").by("alice").on("doc").at(1.0))
        .await
        .unwrap();

    assert_eq!(receipt.pending, 0);
    let flush = receipt.flush.unwrap();
    assert_eq!(flush.content, "Hello, world");
    assert_eq!((flush.base_version, flush.version), (0, 1));
    assert_eq!(flush.operations.len(), 1);

    assert_eq!(
        store.get("doc").unwrap(),
        StoredDocument {
            content: "Hello, world".to_string(),
            version: 1,
        }
    );
}

#[tokio::test]
async fn test_submit_json_validates() {
    let (manager, _) = manager_with(SessionConfig::default(), "abc");
    let doc = manager.open("doc").unwrap();

    let ok = r#"{"type":"delete","position":1,"length":1,"user_id":"a","document_id":"doc","timestamp":1.0}"#;
    let receipt = doc.submit_json(ok).await.unwrap();
    assert_eq!(receipt.flush.unwrap().content, "ac");

    let missing = r#"{"type":"insert","position":0,"user_id":"a","document_id":"doc","timestamp":2.0}"#;
    let err = doc.submit_json(missing).await.unwrap_err();
    assert!(matches!(err, SessionError::Engine(EngineError::InvalidOperation(_))));
    assert_eq!(doc.snapshot().await.unwrap().version, 1);
}

#[tokio::test]
async fn test_wrong_document_is_rejected() {
    let (manager, _) = manager_with(SessionConfig::default(), "abc");
    let doc = manager.open("doc").unwrap();

    let err = doc
        .submit(Operation::insert(0, "x").by("alice").on("elsewhere"))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        SessionError::Engine(EngineError::DocumentMismatch { .. })
    ));
}

#[tokio::test]
async fn test_clock_observes_remote_time() {
    let (manager, _) = manager_with(SessionConfig::default(), "");
    let doc = manager.open("doc").unwrap();

    doc.submit(Operation::insert(0, "a").by("alice").on("doc").with_clock(7))
        .await
        .unwrap();
    assert_eq!(doc.snapshot().await.unwrap().clock, 8);

    doc.submit(Operation::insert(0, "b").by("bob").on("doc").with_clock(2))
        .await
        .unwrap();
    assert_eq!(doc.snapshot().await.unwrap().clock, 9);
}

// ============================================================================
// Concurrent edits
// ============================================================================

/// Submit two operations one after the other in immediate mode
async fn submit_in_order(base: &str, first: &Operation, second: &Operation) -> String {
    let (manager, _) = manager_with(SessionConfig::default(), base);
    let doc = manager.open("doc").unwrap();
    doc.submit(first.clone()).await.unwrap();
    let flush = doc.submit(second.clone()).await.unwrap().flush.unwrap();
    assert_eq!(flush.version, 2);
    flush.content
}

#[tokio::test]
async fn test_concurrent_submits_converge_in_either_order() {
    let insert = Operation::insert(0, "XX").by("alice").on("doc").at(1.0).based_on(0);
    let delete = Operation::delete(5, 1).by("bob").on("doc").at(2.0).based_on(0);

    assert_eq!(submit_in_order("Hello world", &insert, &delete).await, "XXHelloworld");
    assert_eq!(submit_in_order("Hello world", &delete, &insert).await, "XXHelloworld");

    // Same position: the earlier timestamp goes first both ways
    let a = Operation::insert(5, "A").by("alice").on("doc").at(1.0).based_on(0);
    let b = Operation::insert(5, "B").by("bob").on("doc").at(2.0).based_on(0);
    assert_eq!(submit_in_order("Hello world", &a, &b).await, "HelloAB world");
    assert_eq!(submit_in_order("Hello world", &b, &a).await, "HelloAB world");
}

#[tokio::test]
async fn test_bases_outside_history_are_rejected() {
    let config = SessionConfig {
        history_limit: 1,
        ..SessionConfig::default()
    };
    let (manager, _) = manager_with(config, "abc");
    let doc = manager.open("doc").unwrap();

    doc.submit(Operation::insert(3, "d").by("alice").on("doc").based_on(0))
        .await
        .unwrap();
    doc.submit(Operation::insert(0, ">").by("alice").on("doc").based_on(1))
        .await
        .unwrap();

    let err = doc
        .submit(Operation::delete(0, 1).by("bob").on("doc").based_on(0))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        SessionError::UnknownBase {
            base_version: 0,
            oldest: 1,
            version: 2,
            ..
        }
    ));
    let err = doc
        .submit(Operation::delete(0, 1).by("bob").on("doc").based_on(3))
        .await
        .unwrap_err();
    assert!(matches!(err, SessionError::UnknownBase { .. }));
    assert_eq!(doc.snapshot().await.unwrap().pending, 0);

    // Still within reach: bob deletes the "d" he saw at version 1
    let flush = doc
        .submit(Operation::delete(3, 1).by("bob").on("doc").based_on(1))
        .await
        .unwrap()
        .flush
        .unwrap();
    assert_eq!(flush.content, ">abc");
    assert_eq!(flush.version, 3);
    assert_eq!(flush.operations[0].position(), 4);
    assert_eq!(flush.operations[0].base_version, Some(2));
}

#[tokio::test]
async fn test_batch_rebases_over_earlier_flush() {
    let (manager, _) = manager_with(batched(60_000), "Hello world");
    let doc = manager.open("doc").unwrap();

    doc.submit(Operation::insert(0, "XX").by("alice").on("doc").at(1.0).based_on(0))
        .await
        .unwrap();
    assert_eq!(doc.flush().await.unwrap().content, "XXHello world");

    // bob still saw version 0; carol's edit has no base and uses version 1
    doc.submit(Operation::delete(5, 1).by("bob").on("doc").at(2.0).based_on(0))
        .await
        .unwrap();
    doc.submit(Operation::insert(13, "!").by("carol").on("doc").at(3.0))
        .await
        .unwrap();

    let flush = doc.flush().await.unwrap();
    assert_eq!(flush.content, "XXHelloworld!");
    assert_eq!((flush.base_version, flush.version), (1, 3));
}

// ============================================================================
// Storage failures
// ============================================================================

struct FlakyStore {
    inner: MemoryStore,
    down: AtomicBool,
}

impl DocumentStore for FlakyStore {
    fn load(&self, document_id: &str) -> Result<Option<StoredDocument>, StoreError> {
        self.inner.load(document_id)
    }

    fn save(&self, document_id: &str, document: StoredDocument) -> Result<(), StoreError> {
        if self.down.load(Ordering::SeqCst) {
            return Err(StoreError::Backend("down".to_string()));
        }
        self.inner.save(document_id, document)
    }
}

#[tokio::test]
async fn test_failed_save_leaves_state_untouched() {
    let store = Arc::new(FlakyStore {
        inner: MemoryStore::new().with_document("doc", "abc"),
        down: AtomicBool::new(true),
    });
    let manager = SessionManager::new(SessionConfig::default(), store.clone());
    let doc = manager.open("doc").unwrap();
    let mut bob = doc.subscribe("bob").await.unwrap();

    let err = doc
        .submit(Operation::insert(3, "!").by("alice").on("doc"))
        .await
        .unwrap_err();
    assert!(matches!(err, SessionError::Store(StoreError::Backend(_))));

    let snapshot = doc.snapshot().await.unwrap();
    assert_eq!(snapshot.content, "abc");
    assert_eq!(snapshot.version, 0);
    assert_eq!(snapshot.pending, 1);
    let nothing = tokio::time::timeout(Duration::from_millis(50), bob.next()).await;
    assert!(nothing.is_err());

    // The operation waits in the queue until the store is back
    store.down.store(false, Ordering::SeqCst);
    let flush = doc.flush().await.unwrap();
    assert_eq!(flush.content, "abc!");
    assert_eq!((flush.base_version, flush.version), (0, 1));
    assert_eq!(store.inner.get("doc").unwrap().version, 1);
    assert_eq!(bob.next().await.unwrap().version, 1);
}

// ============================================================================
// Broadcast
// ============================================================================

#[tokio::test]
async fn test_broadcast_excludes_origin() {
    let (manager, _) = manager_with(SessionConfig::default(), "Hello world");
    let doc = manager.open("doc").unwrap();

    let mut alice = doc.subscribe("alice").await.unwrap();
    let mut bob = doc.subscribe("bob").await.unwrap();

    doc.submit(Operation::insert(11, "!").by("alice").on("doc").at(1.0))
        .await
        .unwrap();

    let update = tokio::time::timeout(Duration::from_secs(1), bob.next())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(update.origin_author, "alice");
    assert_eq!(update.content, "Hello world!");
    assert_eq!(update.version, 1);
    assert_eq!(update.operations[0].position(), 11);

    let nothing = tokio::time::timeout(Duration::from_millis(50), alice.next()).await;
    assert!(nothing.is_err());
}

#[tokio::test]
async fn test_unsubscribe_stops_updates() {
    let (manager, _) = manager_with(SessionConfig::default(), "");
    let doc = manager.open("doc").unwrap();

    let mut bob = doc.subscribe("bob").await.unwrap();
    assert_eq!(doc.snapshot().await.unwrap().subscribers, 1);
    assert!(doc.unsubscribe("bob").await.unwrap());
    assert!(!doc.unsubscribe("bob").await.unwrap());

    doc.submit(Operation::insert(0, "x").by("alice").on("doc"))
        .await
        .unwrap();
    // The sender was dropped with the subscription
    assert!(bob.next().await.is_none());
}

#[tokio::test]
async fn test_lagging_subscriber_does_not_block_actor() {
    let config = SessionConfig {
        subscriber_capacity: 1,
        ..SessionConfig::default()
    };
    let (manager, _) = manager_with(config, "");
    let doc = manager.open("doc").unwrap();
    let mut bob = doc.subscribe("bob").await.unwrap();

    for i in 0..3 {
        let op = Operation::insert(0, "x").by("alice").on("doc").at(f64::from(i));
        tokio::time::timeout(Duration::from_secs(1), doc.submit(op))
            .await
            .unwrap()
            .unwrap();
    }

    let snapshot = doc.snapshot().await.unwrap();
    assert_eq!(snapshot.version, 3);
    assert_eq!(snapshot.subscribers, 0);

    // bob got what fit in his buffer, then was cut off
    assert_eq!(bob.next().await.unwrap().version, 1);
    assert!(bob.next().await.is_none());
}

// ============================================================================
// Batching
// ============================================================================

#[tokio::test]
async fn test_batch_window_flushes_on_timer() {
    let (manager, _) = manager_with(batched(20), "Hello world");
    let doc = manager.open("doc").unwrap();
    let mut carol = doc.subscribe("carol").await.unwrap();

    let first = doc
        .submit(Operation::insert(5, ",").by("alice").on("doc").at(1.0))
        .await
        .unwrap();
    let second = doc
        .submit(Operation::insert(11, "!").by("bob").on("doc").at(2.0))
        .await
        .unwrap();
    assert!(first.flush.is_none());
    assert_eq!((first.pending, second.pending), (1, 2));

    let mut last = None;
    for _ in 0..2 {
        last = tokio::time::timeout(Duration::from_secs(2), carol.next())
            .await
            .unwrap();
    }
    let last = last.unwrap();
    assert_eq!(last.content, "Hello, world!");
    assert_eq!(last.version, 2);
    assert_eq!(last.origin_author, "bob");
}

#[tokio::test]
async fn test_explicit_flush_folds_concurrent_batch() {
    let (manager, _) = manager_with(batched(60_000), "Hello world");
    let doc = manager.open("doc").unwrap();

    // Submitted out of order; folded by timestamp
    for op in [
        Operation::replace(6, 3, "WO").by("carol").on("doc").at(3.0),
        Operation::insert(11, "!").by("bob").on("doc").at(2.0),
        Operation::insert(5, ",").by("alice").on("doc").at(1.0),
    ] {
        doc.submit(op).await.unwrap();
    }
    assert_eq!(doc.snapshot().await.unwrap().pending, 3);

    let flush = doc.flush().await.unwrap();
    assert_eq!(flush.content, "Hello, WOld!");
    assert_eq!(flush.version, 3);
    let authors: Vec<&str> = flush.operations.iter().map(|op| op.author_id.as_str()).collect();
    assert_eq!(authors, vec!["alice", "bob", "carol"]);

    // Nothing left to fold
    let again = doc.flush().await.unwrap();
    assert!(again.operations.is_empty());
    assert_eq!(again.version, 3);
}

#[tokio::test]
async fn test_user_priority_orders_batch() {
    let config = SessionConfig {
        default_strategy: ResolutionStrategy::UserPriority,
        ..batched(60_000)
    };
    let mut roles = HashMap::new();
    roles.insert("owner".to_string(), 5_i64);
    let store = Arc::new(MemoryStore::new().with_document("doc", "Hello world"));
    let manager = SessionManager::new(config, store).with_priorities(roles);
    let doc = manager.open("doc").unwrap();

    doc.submit(Operation::delete(0, 5).by("guest").on("doc").at(1.0))
        .await
        .unwrap();
    doc.submit(Operation::insert(11, "!").by("owner").on("doc").at(2.0))
        .await
        .unwrap();

    let flush = doc.flush().await.unwrap();
    assert_eq!(flush.operations[0].author_id, "owner");
    assert_eq!(flush.content, " world!");
}

// ============================================================================
// Lifecycle and consistency
// ============================================================================

#[tokio::test]
async fn test_close_flushes_and_reopen_loads() {
    let (manager, store) = manager_with(batched(60_000), "abc");
    let doc = manager.open("doc").unwrap();
    doc.submit(Operation::insert(3, "d").by("alice").on("doc"))
        .await
        .unwrap();

    let snapshot = manager.close("doc").await.unwrap();
    assert_eq!(snapshot.content, "abcd");
    assert_eq!(snapshot.version, 1);
    assert_eq!(store.load("doc").unwrap().unwrap().version, 1);
    assert!(manager.handle("doc").is_none());
    assert!(manager.open_documents().is_empty());

    let err = doc.snapshot().await.unwrap_err();
    assert!(matches!(err, SessionError::ActorStopped(_)));
    assert!(matches!(
        manager.close("doc").await,
        Err(SessionError::NotOpen(_))
    ));

    let reopened = manager.open("doc").unwrap();
    let snapshot = reopened.snapshot().await.unwrap();
    assert_eq!((snapshot.content.as_str(), snapshot.version), ("abcd", 1));
}

#[tokio::test]
async fn test_open_is_shared_and_seeds_new_documents() {
    let (manager, _) = manager_with(SessionConfig::default(), "stored");
    let a = manager.open("doc").unwrap();
    let b = manager.open_with_content("doc", "ignored").unwrap();
    a.submit(Operation::insert(0, ">").by("x").on("doc"))
        .await
        .unwrap();
    assert_eq!(b.snapshot().await.unwrap().content, ">stored");

    let fresh = manager.open_with_content("new", "seed").unwrap();
    assert_eq!(fresh.snapshot().await.unwrap().content, "seed");
    assert_eq!(manager.open_documents(), vec!["doc".to_string(), "new".to_string()]);

    let closed = manager.close_all().await.unwrap();
    assert_eq!(closed.len(), 2);
}

#[tokio::test]
async fn test_consistency_checks() {
    let (manager, _) = manager_with(SessionConfig::default(), "Hello world");
    let doc = manager.open("doc").unwrap();

    // Nothing recorded yet
    assert!(!manager.verify_consistency("doc", "Hello world").await.unwrap());
    assert_eq!(
        doc.consistency_report("Hello world").await.unwrap(),
        ConsistencyReport::Unrecorded
    );

    doc.record_expected("Hello, world", Some(1)).await.unwrap();
    let flush = doc
        .submit(Operation::insert(5, ",").by("alice").on("doc"))
        .await
        .unwrap()
        .flush
        .unwrap();
    assert_eq!(flush.consistent, Some(true));

    assert!(doc.verify_consistency("Hello, world").await.unwrap());
    assert!(!doc.verify_consistency("Hello world").await.unwrap());
    assert!(matches!(
        manager.verify_consistency("missing", "").await,
        Err(SessionError::NotOpen(_))
    ));
}

#[tokio::test]
async fn test_divergence_reported_after_flush() {
    let (manager, _) = manager_with(SessionConfig::default(), "abc");
    let doc = manager.open("doc").unwrap();

    doc.record_expected("xyz!", Some(1)).await.unwrap();
    let flush = doc
        .submit(Operation::insert(3, "!").by("alice").on("doc"))
        .await
        .unwrap()
        .flush
        .unwrap();
    assert_eq!(flush.consistent, Some(false));
}

#[tokio::test]
async fn test_resolve_uses_configured_strategy() {
    let config = SessionConfig {
        default_strategy: ResolutionStrategy::UserPriority,
        ..SessionConfig::default()
    };
    let store = Arc::new(MemoryStore::new());
    let manager = SessionManager::new(config, store)
        .with_priorities(|author: &str| -> i64 { if author == "admin" { 1 } else { 0 } });

    let early = Operation::insert(0, "a").by("guest").at(1.0);
    let late = Operation::insert(0, "b").by("admin").at(2.0);
    let resolution = manager.resolve("", &early, &late);
    assert_eq!(resolution.strategy, ResolutionStrategy::UserPriority);
    assert_eq!(resolution.winning_operation, late);

    // Out of range positions are compared where they would land
    let far = Operation::insert(10, "X").by("guest").at(1.0);
    let wipe = Operation::delete(1, 100).by("admin").at(2.0);
    let resolution = manager.resolve("abc", &far, &wipe);
    assert_eq!(resolution.winning_operation.length(), 2);
    let merged = resolution
        .transformed_operations
        .iter()
        .fold(resolution.winning_operation.apply("abc"), |content, op| op.apply(&content));
    assert_eq!(merged, "aX");
}
