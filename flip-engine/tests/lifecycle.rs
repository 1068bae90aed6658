//! End-to-end lifecycle tests: draft CRUD, submission, reconciliation,
//! deletion, archival and restart recovery, driven through a programmable
//! mock node and an in-memory redb store.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use flip_engine::{
    EngineConfig, EpochObserver, EpochState, FlipEngine, FlipError, FlipRecord, FlipResult,
    FlipStore, FlipSubmitResult, FlipType, HASH_IN_MEMPOOL, Hint, NodeClient, RedbFlipStore,
    SubmitFlipParams, SubmitFlipRequest, Transaction, start_background_tasks,
};

// ============================================================================
// Test doubles
// ============================================================================

#[derive(Default)]
struct MockNode {
    /// Chain view: tx hash -> transaction. Missing entries are "dropped".
    txs: Mutex<HashMap<String, Transaction>>,
    /// Lookups for these tx hashes fail with a node error
    failing_lookups: Mutex<HashSet<String>>,
    fail_submit: AtomicBool,
    fail_delete: AtomicBool,
    submit_count: AtomicUsize,
    delete_count: AtomicUsize,
    next_tx: AtomicUsize,
}

impl MockNode {
    fn confirm(&self, tx_hash: &str) {
        self.txs.lock().insert(
            tx_hash.to_string(),
            Transaction {
                hash: tx_hash.to_string(),
                block_hash: "0xblock1".to_string(),
            },
        );
    }

    fn mempool(&self, tx_hash: &str) {
        self.txs.lock().insert(
            tx_hash.to_string(),
            Transaction {
                hash: tx_hash.to_string(),
                block_hash: HASH_IN_MEMPOOL.to_string(),
            },
        );
    }

    fn fail_lookup(&self, tx_hash: &str) {
        self.failing_lookups.lock().insert(tx_hash.to_string());
    }

    fn heal_lookup(&self, tx_hash: &str) {
        self.failing_lookups.lock().remove(tx_hash);
    }
}

#[async_trait]
impl NodeClient for MockNode {
    async fn submit_flip(&self, _req: SubmitFlipRequest) -> FlipResult<FlipSubmitResult> {
        if self.fail_submit.load(Ordering::SeqCst) {
            return Err(FlipError::Node("node is syncing".to_string()));
        }
        let n = self.next_tx.fetch_add(1, Ordering::SeqCst);
        self.submit_count.fetch_add(1, Ordering::SeqCst);
        Ok(FlipSubmitResult {
            tx_hash: format!("0xtx{n}"),
            hash: format!("0xflip{n}"),
        })
    }

    async fn delete_flip(&self, _hash: &str) -> FlipResult<String> {
        if self.fail_delete.load(Ordering::SeqCst) {
            return Err(FlipError::Node("node is syncing".to_string()));
        }
        let n = self.next_tx.fetch_add(1, Ordering::SeqCst);
        self.delete_count.fetch_add(1, Ordering::SeqCst);
        Ok(format!("0xdel{n}"))
    }

    async fn transaction(&self, tx_hash: &str) -> FlipResult<Option<Transaction>> {
        if self.failing_lookups.lock().contains(tx_hash) {
            return Err(FlipError::Node("request timed out".to_string()));
        }
        Ok(self.txs.lock().get(tx_hash).cloned())
    }
}

struct StubObserver {
    state: Mutex<EpochState>,
}

impl StubObserver {
    fn new(epoch: u64, validation_done: bool) -> Self {
        Self {
            state: Mutex::new(EpochState {
                epoch,
                validation_done,
            }),
        }
    }

    fn set(&self, state: EpochState) {
        *self.state.lock() = state;
    }
}

#[async_trait]
impl EpochObserver for StubObserver {
    async fn current(&self) -> FlipResult<EpochState> {
        Ok(*self.state.lock())
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn test_config() -> EngineConfig {
    EngineConfig {
        node_url: "http://localhost:9009".to_string(),
        node_api_key: None,
        flip_max_size: 1024 * 1024,
        reconcile_interval: Duration::from_millis(10),
        epoch_check_interval: Duration::from_millis(10),
    }
}

fn new_engine(node: Arc<MockNode>) -> (Arc<FlipEngine>, Arc<RedbFlipStore>) {
    let store = Arc::new(RedbFlipStore::open_in_memory().unwrap());
    let engine = Arc::new(FlipEngine::new(test_config(), store.clone(), node));
    engine.bootstrap().unwrap();
    (engine, store)
}

fn test_draft(seed: u8, order: Vec<usize>) -> FlipRecord {
    FlipRecord::new_draft(
        vec![vec![seed; 8]; 4],
        vec![vec![seed.wrapping_add(1); 8]; 4],
        order,
        Some(Hint {
            id: 7,
            words: vec!["cat".to_string(), "boat".to_string()],
        }),
    )
}

fn submit_params(flip: &FlipRecord) -> SubmitFlipParams {
    SubmitFlipParams {
        id: flip.id.clone(),
        pics: flip.pics.clone(),
        compressed_pics: flip.compressed_pics.clone(),
        order: flip.order.clone(),
        hint: flip.hint.clone(),
    }
}

/// Seed a Published flip directly into the store and reload the engine.
fn seed_published(engine: &FlipEngine, store: &RedbFlipStore, seed: u8) -> FlipRecord {
    let mut flip = test_draft(seed, vec![2, 0, 3, 1]);
    flip.flip_type = FlipType::Published;
    flip.tx_hash = Some(format!("0xseed{seed}"));
    flip.hash = Some(format!("0xflipseed{seed}"));
    flip.mined = true;
    store.put_all(std::slice::from_ref(&flip)).unwrap();
    engine.bootstrap().unwrap();
    flip
}

async fn wait_for<F: Fn() -> bool>(cond: F) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !cond() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

// ============================================================================
// Draft CRUD
// ============================================================================

#[tokio::test]
async fn save_then_get_returns_equal_draft() {
    let (engine, _store) = new_engine(Arc::new(MockNode::default()));

    let draft = test_draft(1, vec![2, 0, 3, 1]);
    let saved = engine.save_draft(draft.clone()).unwrap();

    let loaded = engine.get_draft(&draft.id).unwrap();
    assert_eq!(loaded, saved);
    assert_eq!(loaded.id, draft.id);
    assert_eq!(loaded.flip_type, FlipType::Draft);
    assert_eq!(loaded.pics, draft.pics);
    assert_eq!(loaded.compressed_pics, draft.compressed_pics);
    assert_eq!(loaded.order, draft.order);
    assert_eq!(loaded.hint, draft.hint);
    assert!(loaded.modified_at >= draft.created_at);
}

#[tokio::test]
async fn update_preserves_created_at() {
    let (engine, _store) = new_engine(Arc::new(MockNode::default()));

    let draft = test_draft(1, vec![2, 0, 3, 1]);
    let first = engine.save_draft(draft.clone()).unwrap();

    let mut edited = draft.clone();
    edited.order = vec![3, 1, 0, 2];
    let second = engine.save_draft(edited).unwrap();

    assert_eq!(second.created_at, first.created_at);
    assert_eq!(second.order, vec![3, 1, 0, 2]);
    assert!(second.modified_at >= first.modified_at);
    assert_eq!(engine.list_flips().len(), 1);
}

#[tokio::test]
async fn get_draft_falls_back_to_store() {
    let (engine, store) = new_engine(Arc::new(MockNode::default()));

    // Written behind the engine's back, never loaded into memory
    let flip = test_draft(9, vec![1, 0, 3, 2]);
    store.put_all(std::slice::from_ref(&flip)).unwrap();

    assert!(engine.list_flips().is_empty());
    let loaded = engine.get_draft(&flip.id).unwrap();
    assert_eq!(loaded, flip);

    assert!(matches!(
        engine.get_draft("nonexistent"),
        Err(FlipError::NotFound(_))
    ));
}

// ============================================================================
// Submission validation
// ============================================================================

#[tokio::test]
async fn submit_rejects_unshuffled_order() {
    let node = Arc::new(MockNode::default());
    let (engine, _store) = new_engine(node.clone());

    let draft = test_draft(1, vec![0, 1, 2, 3]);
    engine.save_draft(draft.clone()).unwrap();
    let before = engine.list_flips();

    let err = engine.submit_flip(submit_params(&draft)).await.unwrap_err();
    assert!(matches!(err, FlipError::UnshuffledOrder));
    assert_eq!(err.to_string(), "You must shuffle flip before submit");

    // No network call, no mutation
    assert_eq!(node.submit_count.load(Ordering::SeqCst), 0);
    assert_eq!(engine.list_flips(), before);
}

#[tokio::test]
async fn submit_rejects_missing_or_invalid_keywords() {
    let node = Arc::new(MockNode::default());
    let (engine, _store) = new_engine(node.clone());

    let mut draft = test_draft(1, vec![2, 0, 3, 1]);
    draft.hint = None;
    engine.save_draft(draft.clone()).unwrap();
    assert!(matches!(
        engine.submit_flip(submit_params(&draft)).await,
        Err(FlipError::MissingKeywords)
    ));

    draft.hint = Some(Hint {
        id: -1,
        words: vec![],
    });
    assert!(matches!(
        engine.submit_flip(submit_params(&draft)).await,
        Err(FlipError::InvalidKeywords)
    ));

    assert_eq!(node.submit_count.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn submit_rejects_duplicate_of_published_flip() {
    let node = Arc::new(MockNode::default());
    let (engine, store) = new_engine(node.clone());
    let published = seed_published(&engine, &store, 1);

    // Same compressed content, fresh draft id
    let mut draft = test_draft(1, vec![3, 1, 0, 2]);
    draft.compressed_pics = published.compressed_pics.clone();

    let err = engine.submit_flip(submit_params(&draft)).await.unwrap_err();
    assert!(matches!(err, FlipError::AlreadySubmitted));
    assert_eq!(err.to_string(), "You already submitted this flip");
    assert_eq!(node.submit_count.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn submit_rejects_oversized_payload() {
    let node = Arc::new(MockNode::default());
    let store = Arc::new(RedbFlipStore::open_in_memory().unwrap());
    let mut config = test_config();
    config.flip_max_size = 16; // hex chars
    let engine = FlipEngine::new(config, store, node.clone());
    engine.bootstrap().unwrap();

    let draft = test_draft(1, vec![2, 0, 3, 1]);
    engine.save_draft(draft.clone()).unwrap();

    assert!(matches!(
        engine.submit_flip(submit_params(&draft)).await,
        Err(FlipError::FlipTooLarge)
    ));
    assert_eq!(node.submit_count.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn submit_failure_leaves_draft_untouched() {
    let node = Arc::new(MockNode::default());
    node.fail_submit.store(true, Ordering::SeqCst);
    let (engine, store) = new_engine(node.clone());

    let draft = test_draft(1, vec![2, 0, 3, 1]);
    engine.save_draft(draft.clone()).unwrap();

    assert!(matches!(
        engine.submit_flip(submit_params(&draft)).await,
        Err(FlipError::Node(_))
    ));

    let flip = engine.get_draft(&draft.id).unwrap();
    assert_eq!(flip.flip_type, FlipType::Draft);
    assert_eq!(flip.tx_hash, None);
    assert_eq!(store.get(&draft.id).unwrap().unwrap().flip_type, FlipType::Draft);
}

// ============================================================================
// Submission + reconciliation
// ============================================================================

#[tokio::test]
async fn submit_then_confirm_reaches_published() {
    let node = Arc::new(MockNode::default());
    let (engine, store) = new_engine(node.clone());

    let draft = test_draft(1, vec![2, 0, 3, 1]);
    engine.save_draft(draft.clone()).unwrap();

    let submitted = engine.submit_flip(submit_params(&draft)).await.unwrap();
    assert_eq!(submitted.flip_type, FlipType::Publishing);
    assert_eq!(submitted.tx_hash.as_deref(), Some("0xtx0"));
    assert_eq!(submitted.hash.as_deref(), Some("0xflip0"));
    assert_eq!(submitted.id, draft.id);
    assert!(engine.has_pending());

    // Still in mempool: no transition
    node.mempool("0xtx0");
    assert_eq!(engine.reconcile_once().await.unwrap(), 0);
    assert_eq!(
        engine.get_draft(&draft.id).unwrap().flip_type,
        FlipType::Publishing
    );

    // Mined: Publishing -> Published, mined flag set, store in sync
    node.confirm("0xtx0");
    assert_eq!(engine.reconcile_once().await.unwrap(), 1);
    let flip = engine.get_draft(&draft.id).unwrap();
    assert_eq!(flip.flip_type, FlipType::Published);
    assert!(flip.mined);
    assert!(!engine.has_pending());
    assert_eq!(store.get(&draft.id).unwrap().unwrap(), flip);
}

#[tokio::test]
async fn publishing_reverts_to_draft_when_tx_dropped() {
    let node = Arc::new(MockNode::default());
    let (engine, _store) = new_engine(node.clone());

    let draft = test_draft(1, vec![2, 0, 3, 1]);
    engine.save_draft(draft.clone()).unwrap();
    engine.submit_flip(submit_params(&draft)).await.unwrap();

    // Lookup returns absent: the submission never made it
    assert_eq!(engine.reconcile_once().await.unwrap(), 1);
    let flip = engine.get_draft(&draft.id).unwrap();
    assert_eq!(flip.flip_type, FlipType::Draft);
    assert!(!flip.mined);
}

#[tokio::test]
async fn lookup_failure_is_fail_soft() {
    let node = Arc::new(MockNode::default());
    let (engine, _store) = new_engine(node.clone());

    let draft = test_draft(1, vec![2, 0, 3, 1]);
    engine.save_draft(draft.clone()).unwrap();
    engine.submit_flip(submit_params(&draft)).await.unwrap();

    // A failing lookup must not abort the pass or touch the record
    node.fail_lookup("0xtx0");
    assert_eq!(engine.reconcile_once().await.unwrap(), 0);
    assert_eq!(
        engine.get_draft(&draft.id).unwrap().flip_type,
        FlipType::Publishing
    );

    // Next tick succeeds
    node.heal_lookup("0xtx0");
    node.confirm("0xtx0");
    assert_eq!(engine.reconcile_once().await.unwrap(), 1);
    assert_eq!(
        engine.get_draft(&draft.id).unwrap().flip_type,
        FlipType::Published
    );
}

// ============================================================================
// Deletion
// ============================================================================

#[tokio::test]
async fn delete_draft_is_local_only() {
    let node = Arc::new(MockNode::default());
    let (engine, store) = new_engine(node.clone());

    let draft = test_draft(1, vec![2, 0, 3, 1]);
    engine.save_draft(draft.clone()).unwrap();

    let tx = engine.delete_flip(&draft.id).await.unwrap();
    assert_eq!(tx, None);
    assert_eq!(node.delete_count.load(Ordering::SeqCst), 0);
    assert!(engine.list_flips().is_empty());
    assert_eq!(store.get(&draft.id).unwrap(), None);
}

#[tokio::test]
async fn delete_published_goes_through_the_chain() {
    let node = Arc::new(MockNode::default());
    let (engine, store) = new_engine(node.clone());
    let published = seed_published(&engine, &store, 1);

    let tx = engine.delete_flip(&published.id).await.unwrap();
    assert_eq!(tx.as_deref(), Some("0xdel0"));
    assert_eq!(node.delete_count.load(Ordering::SeqCst), 1);

    let flip = engine.get_draft(&published.id).unwrap();
    assert_eq!(flip.flip_type, FlipType::Deleting);
    assert_eq!(flip.delete_tx_hash.as_deref(), Some("0xdel0"));
    assert!(engine.has_pending());

    // Delete tx mined: record reverts to Draft (re-publication allowed)
    node.confirm("0xdel0");
    assert_eq!(engine.reconcile_once().await.unwrap(), 1);
    let flip = engine.get_draft(&published.id).unwrap();
    assert_eq!(flip.flip_type, FlipType::Draft);
    assert!(!flip.mined);
}

#[tokio::test]
async fn deleting_reverts_to_published_when_tx_dropped() {
    let node = Arc::new(MockNode::default());
    let (engine, store) = new_engine(node.clone());
    let published = seed_published(&engine, &store, 1);

    engine.delete_flip(&published.id).await.unwrap();

    // Delete tx vanished: the flip is still on chain
    assert_eq!(engine.reconcile_once().await.unwrap(), 1);
    let flip = engine.get_draft(&published.id).unwrap();
    assert_eq!(flip.flip_type, FlipType::Published);
    assert!(flip.mined);
}

#[tokio::test]
async fn delete_failure_keeps_published_state() {
    let node = Arc::new(MockNode::default());
    node.fail_delete.store(true, Ordering::SeqCst);
    let (engine, store) = new_engine(node.clone());
    let published = seed_published(&engine, &store, 1);

    assert!(matches!(
        engine.delete_flip(&published.id).await,
        Err(FlipError::Node(_))
    ));

    let flip = engine.get_draft(&published.id).unwrap();
    assert_eq!(flip.flip_type, FlipType::Published);
    assert_eq!(flip.delete_tx_hash, None);
}

// ============================================================================
// Archival
// ============================================================================

#[tokio::test]
async fn archive_is_idempotent_per_epoch() {
    let node = Arc::new(MockNode::default());
    let (engine, store) = new_engine(node.clone());

    engine.save_draft(test_draft(1, vec![2, 0, 3, 1])).unwrap();
    seed_published(&engine, &store, 3);
    engine.save_draft(test_draft(5, vec![1, 0, 3, 2])).unwrap();

    // Validation not finished yet: nothing happens
    let epoch = EpochState {
        epoch: 42,
        validation_done: false,
    };
    assert!(!engine.maybe_archive(&epoch).unwrap());

    let epoch = EpochState {
        epoch: 42,
        validation_done: true,
    };
    assert!(engine.maybe_archive(&epoch).unwrap());
    let after_first = engine.list_flips();
    assert!(after_first.iter().all(|f| f.flip_type == FlipType::Archived));
    assert!(store.is_archived(42).unwrap());

    // Second run for the same epoch is a no-op
    assert!(!engine.maybe_archive(&epoch).unwrap());
    assert_eq!(engine.list_flips(), after_first);

    // A later epoch archives again
    let next = EpochState {
        epoch: 43,
        validation_done: true,
    };
    assert!(engine.maybe_archive(&next).unwrap());
}

// ============================================================================
// Restart recovery
// ============================================================================

#[tokio::test]
async fn restart_restores_state_from_store() {
    let node = Arc::new(MockNode::default());
    let (engine, store) = new_engine(node.clone());

    let draft = test_draft(1, vec![2, 0, 3, 1]);
    engine.save_draft(draft.clone()).unwrap();
    engine.submit_flip(submit_params(&draft)).await.unwrap();
    engine.save_draft(test_draft(5, vec![1, 3, 0, 2])).unwrap();

    let before = engine.list_flips();
    assert_eq!(before.len(), 2);

    // "Restart": a fresh engine over the same store
    let engine2 = Arc::new(FlipEngine::new(test_config(), store, node.clone()));
    engine2.bootstrap().unwrap();

    let mut after = engine2.list_flips();
    let mut expected = before.clone();
    after.sort_by(|a, b| a.id.cmp(&b.id));
    expected.sort_by(|a, b| a.id.cmp(&b.id));
    assert_eq!(after, expected);
    assert!(engine2.has_pending());

    // The restarted engine picks up reconciliation where it left off
    node.confirm("0xtx0");
    assert_eq!(engine2.reconcile_once().await.unwrap(), 1);
    assert_eq!(
        engine2.get_draft(&draft.id).unwrap().flip_type,
        FlipType::Published
    );
}

// ============================================================================
// Background workers
// ============================================================================

#[tokio::test]
async fn reconcile_worker_drives_flip_to_published() {
    let node = Arc::new(MockNode::default());
    let (engine, _store) = new_engine(node.clone());
    let observer = Arc::new(StubObserver::new(1, false));

    let tasks = start_background_tasks(engine.clone(), observer);

    let draft = test_draft(1, vec![2, 0, 3, 1]);
    engine.save_draft(draft.clone()).unwrap();
    engine.submit_flip(submit_params(&draft)).await.unwrap();
    node.confirm("0xtx0");

    let engine_ref = engine.clone();
    let id = draft.id.clone();
    wait_for(move || {
        engine_ref
            .get_draft(&id)
            .map(|f| f.flip_type == FlipType::Published && f.mined)
            .unwrap_or(false)
    })
    .await;

    assert!(!engine.has_pending());
    tasks.shutdown().await;
}

#[tokio::test]
async fn epoch_watcher_triggers_archival_once() {
    let node = Arc::new(MockNode::default());
    let (engine, store) = new_engine(node.clone());
    engine.save_draft(test_draft(1, vec![2, 0, 3, 1])).unwrap();

    let observer = Arc::new(StubObserver::new(7, false));
    let tasks = start_background_tasks(engine.clone(), observer.clone());

    // Validation completes mid-run
    observer.set(EpochState {
        epoch: 7,
        validation_done: true,
    });

    let store_ref = store.clone();
    wait_for(move || store_ref.is_archived(7).unwrap()).await;

    assert!(
        engine
            .list_flips()
            .iter()
            .all(|f| f.flip_type == FlipType::Archived)
    );
    tasks.shutdown().await;
}
