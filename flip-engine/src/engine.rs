//! FlipEngine - flip collection owner and lifecycle state machine
//!
//! The engine owns the in-memory flip collection and is the only component
//! that mutates it. Every mutation writes through to the [`FlipStore`] so a
//! restart reloads the exact pre-crash state.
//!
//! # Operation flow
//!
//! ```text
//! save_draft / submit_flip / delete_flip / archive_flips
//!     ├─ 1. Validate locally (no network, no mutation on failure)
//!     ├─ 2. Optional node call (submit / delete), lock-free
//!     ├─ 3. Apply under the collection write lock
//!     └─ 4. Write-through to the store, wake the reconcile worker
//! ```
//!
//! Reconciliation (`reconcile_once`) looks up every pending transaction
//! concurrently, then applies all resolutions as one batch under the write
//! lock. A record that was edited or resolved while its lookup was in flight
//! fails the stale re-check and is skipped.
//!
//! One deliberate quirk inherited from the original client: when a delete
//! transaction is confirmed the record reverts to `Draft` instead of being
//! removed, which lets the author re-publish the same flip later.

use parking_lot::RwLock;
use std::sync::Arc;
use tokio::sync::Notify;

use crate::config::EngineConfig;
use crate::epoch::EpochState;
use crate::error::{FlipError, FlipResult};
use crate::model::{FlipRecord, FlipType, Hint, is_default_order};
use crate::node::{NodeClient, SubmitFlipRequest, Transaction};
use crate::payload;
use crate::store::FlipStore;
use crate::util::now_millis;

/// Everything `submit_flip` needs. Taken by value so the submitted record is
/// rewritten from the call's view of the flip, not a stale in-memory copy.
#[derive(Debug, Clone)]
pub struct SubmitFlipParams {
    pub id: String,
    pub pics: Vec<Vec<u8>>,
    pub compressed_pics: Vec<Vec<u8>>,
    pub order: Vec<usize>,
    pub hint: Option<Hint>,
}

/// Flip lifecycle engine.
///
/// Collaborators are injected; the engine never constructs its own store or
/// node client. The collection lock is never held across an await.
pub struct FlipEngine {
    config: EngineConfig,
    store: Arc<dyn FlipStore>,
    node: Arc<dyn NodeClient>,
    flips: RwLock<Vec<FlipRecord>>,
    /// Woken whenever a record enters a pending state, so the reconcile
    /// worker can leave its idle park without polling
    pub(crate) pending_changed: Notify,
}

impl FlipEngine {
    pub fn new(config: EngineConfig, store: Arc<dyn FlipStore>, node: Arc<dyn NodeClient>) -> Self {
        Self {
            config,
            store,
            node,
            flips: RwLock::new(Vec::new()),
            pending_changed: Notify::new(),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    // ========== Bootstrap ==========

    /// Load all persisted flips into memory in one batch. An empty store
    /// leaves memory empty.
    pub fn bootstrap(&self) -> FlipResult<()> {
        let saved = self.store.list_all()?;
        let count = saved.len();
        let pending = saved.iter().filter(|f| f.is_pending()).count();
        *self.flips.write() = saved;
        if pending > 0 {
            self.pending_changed.notify_one();
        }
        tracing::info!(count, pending, "Flip engine bootstrapped");
        Ok(())
    }

    // ========== Draft access ==========

    /// Snapshot of the whole collection.
    pub fn list_flips(&self) -> Vec<FlipRecord> {
        self.flips.read().clone()
    }

    /// True while any record has a transaction in flight.
    pub fn has_pending(&self) -> bool {
        self.flips.read().iter().any(|f| f.is_pending())
    }

    /// Fetch a flip by id: memory first, then a direct store lookup for
    /// drafts not yet loaded (first access after restart).
    pub fn get_draft(&self, id: &str) -> FlipResult<FlipRecord> {
        if let Some(flip) = self.flips.read().iter().find(|f| f.id == id) {
            return Ok(flip.clone());
        }
        self.store
            .get(id)?
            .ok_or_else(|| FlipError::NotFound(id.to_string()))
    }

    /// Upsert a draft by id.
    ///
    /// Updating preserves `created_at` and refreshes `modified_at`; a first
    /// insert stamps both. The stored type is always `Draft`. A record that
    /// already moved past `Draft` cannot be edited this way.
    pub fn save_draft(&self, draft: FlipRecord) -> FlipResult<FlipRecord> {
        let mut flips = self.flips.write();

        let saved = match flips.iter_mut().find(|f| f.id == draft.id) {
            Some(existing) if existing.flip_type == FlipType::Draft => {
                let created_at = existing.created_at;
                *existing = FlipRecord {
                    flip_type: FlipType::Draft,
                    created_at,
                    modified_at: now_millis(),
                    ..draft
                };
                existing.clone()
            }
            Some(_) => return Err(FlipError::AlreadySubmitted),
            None => {
                let now = now_millis();
                let record = FlipRecord {
                    flip_type: FlipType::Draft,
                    created_at: now,
                    modified_at: now,
                    ..draft
                };
                flips.push(record.clone());
                record
            }
        };

        self.store.put_all(&flips)?;
        Ok(saved)
    }

    // ========== Submission ==========

    /// Validate and submit a flip.
    ///
    /// All validation happens before the node call; a validation failure
    /// leaves the collection untouched. On node acceptance the record is
    /// rewritten in place from `params` (the call's current view) with the
    /// returned transaction and type `Publishing`.
    pub async fn submit_flip(&self, params: SubmitFlipParams) -> FlipResult<FlipRecord> {
        {
            let flips = self.flips.read();
            let duplicate = flips.iter().any(|f| {
                f.flip_type == FlipType::Published
                    && !f.compressed_pics.is_empty()
                    && f.compressed_pics == params.compressed_pics
            });
            if duplicate {
                return Err(FlipError::AlreadySubmitted);
            }
        }

        if is_default_order(&params.order) {
            return Err(FlipError::UnshuffledOrder);
        }

        let hint = params.hint.as_ref().ok_or(FlipError::MissingKeywords)?;
        if hint.id < 0 {
            return Err(FlipError::InvalidKeywords);
        }

        let encoded = payload::flip_to_hex(&params.compressed_pics, &params.order)?;
        if encoded.transmitted_len() > 2 * self.config.flip_max_size {
            return Err(FlipError::FlipTooLarge);
        }

        let result = self
            .node
            .submit_flip(SubmitFlipRequest {
                hex: encoded.hex,
                public_hex: encoded.public_hex,
                private_hex: encoded.private_hex,
                pair_id: hint.id.max(0),
            })
            .await?;

        tracing::info!(id = %params.id, tx = %result.tx_hash, "Flip submitted");

        let mut flips = self.flips.write();
        let record = match flips.iter_mut().find(|f| f.id == params.id) {
            Some(existing) => {
                let created_at = existing.created_at;
                *existing = FlipRecord {
                    id: params.id,
                    flip_type: FlipType::Publishing,
                    pics: params.pics,
                    compressed_pics: params.compressed_pics,
                    order: params.order,
                    hint: params.hint,
                    tx_hash: Some(result.tx_hash),
                    delete_tx_hash: None,
                    hash: Some(result.hash),
                    created_at,
                    modified_at: now_millis(),
                    mined: false,
                };
                existing.clone()
            }
            None => {
                // The draft was removed while the node call was in flight;
                // the submission still happened, so materialize the record
                let now = now_millis();
                let record = FlipRecord {
                    id: params.id,
                    flip_type: FlipType::Publishing,
                    pics: params.pics,
                    compressed_pics: params.compressed_pics,
                    order: params.order,
                    hint: params.hint,
                    tx_hash: Some(result.tx_hash),
                    delete_tx_hash: None,
                    hash: Some(result.hash),
                    created_at: now,
                    modified_at: now,
                    mined: false,
                };
                flips.push(record.clone());
                record
            }
        };

        self.store.put_all(&flips)?;
        drop(flips);
        self.pending_changed.notify_one();
        Ok(record)
    }

    // ========== Deletion ==========

    /// Delete a flip.
    ///
    /// A `Published` flip needs an on-chain retraction: the node call must
    /// succeed before the record transitions to `Deleting` with the returned
    /// transaction. Anything else is local-only and is removed from memory
    /// and store outright. Returns the delete transaction hash, if any.
    pub async fn delete_flip(&self, id: &str) -> FlipResult<Option<String>> {
        let flip = self.get_draft(id)?;

        if flip.flip_type != FlipType::Published {
            let mut flips = self.flips.write();
            flips.retain(|f| f.id != id);
            self.store.delete(id)?;
            tracing::info!(id = %id, "Flip removed locally");
            return Ok(None);
        }

        let hash = flip
            .hash
            .ok_or_else(|| FlipError::NotFound(format!("no on-chain hash for flip {id}")))?;

        let delete_tx = self.node.delete_flip(&hash).await?;
        tracing::info!(id = %id, tx = %delete_tx, "Flip deletion requested");

        let mut flips = self.flips.write();
        if let Some(record) = flips.iter_mut().find(|f| f.id == id) {
            record.flip_type = FlipType::Deleting;
            record.delete_tx_hash = Some(delete_tx.clone());
            record.modified_at = now_millis();
        }
        self.store.put_all(&flips)?;
        drop(flips);
        self.pending_changed.notify_one();
        Ok(Some(delete_tx))
    }

    // ========== Archival ==========

    /// Move every record to `Archived` and persist the epoch marker.
    pub fn archive_flips(&self, epoch: u64) -> FlipResult<usize> {
        let mut flips = self.flips.write();
        for flip in flips.iter_mut() {
            flip.flip_type = FlipType::Archived;
        }
        self.store.put_all(&flips)?;
        self.store.mark_archived(epoch)?;
        tracing::info!(epoch, count = flips.len(), "Flips archived");
        Ok(flips.len())
    }

    /// Archive once per epoch: runs only when validation for the epoch has
    /// finished and the store's marker says archival has not happened yet.
    /// Returns whether archival ran.
    pub fn maybe_archive(&self, epoch: &EpochState) -> FlipResult<bool> {
        if !epoch.validation_done || self.store.is_archived(epoch.epoch)? {
            return Ok(false);
        }
        self.archive_flips(epoch.epoch)?;
        Ok(true)
    }

    // ========== Reconciliation ==========

    /// One reconciliation pass over all pending records.
    ///
    /// Lookups run concurrently; an individual lookup failure only logs and
    /// leaves that record for the next tick. Returns the number of state
    /// transitions applied.
    pub async fn reconcile_once(&self) -> FlipResult<usize> {
        let pending: Vec<(String, String)> = {
            let flips = self.flips.read();
            flips
                .iter()
                .filter_map(|f| f.watched_tx().map(|tx| (f.id.clone(), tx.to_string())))
                .collect()
        };
        if pending.is_empty() {
            return Ok(0);
        }

        let lookups = pending.iter().map(|(_, tx)| self.node.transaction(tx));
        let results = futures::future::join_all(lookups).await;

        let mut resolved = 0usize;
        let mut transitions = 0usize;
        let mut flips = self.flips.write();
        for ((id, tx), outcome) in pending.iter().zip(results) {
            let tx_view = match outcome {
                Ok(view) => view,
                Err(e) => {
                    tracing::warn!(tx = %tx, error = %e, "Transaction lookup failed, retrying next tick");
                    continue;
                }
            };

            let Some(flip) = flips.iter_mut().find(|f| &f.id == id) else {
                continue;
            };
            // Stale re-check: skip records edited or resolved while the
            // lookup was in flight
            if flip.watched_tx() != Some(tx.as_str()) {
                continue;
            }

            let next = resolve_pending(flip.flip_type, tx_view.as_ref());
            if next != flip.flip_type {
                tracing::info!(id = %flip.id, from = ?flip.flip_type, to = ?next, "Flip state resolved");
                flip.flip_type = next;
                flip.modified_at = now_millis();
                transitions += 1;
            }
            flip.mined = next == FlipType::Published;
            resolved += 1;
        }

        if resolved > 0 {
            self.store.put_all(&flips)?;
        }
        Ok(transitions)
    }
}

/// Resolution table for pending records.
///
/// | state | tx absent | tx in mempool | tx mined |
/// |-------|-----------|---------------|----------|
/// | Publishing | Draft | Publishing | Published |
/// | Deleting | Published | Deleting | Draft |
fn resolve_pending(current: FlipType, tx: Option<&Transaction>) -> FlipType {
    match current {
        FlipType::Publishing => match tx {
            None => FlipType::Draft,
            Some(t) if t.is_mined() => FlipType::Published,
            Some(_) => FlipType::Publishing,
        },
        FlipType::Deleting => match tx {
            None => FlipType::Published,
            Some(t) if t.is_mined() => FlipType::Draft,
            Some(_) => FlipType::Deleting,
        },
        other => other,
    }
}
