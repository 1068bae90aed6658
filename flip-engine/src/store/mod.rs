//! Persistence seam
//!
//! The engine only ever talks to [`FlipStore`]; [`RedbFlipStore`] is the
//! adapter shipped with the crate. The store is the durable mirror of the
//! in-memory collection: every engine mutation writes through so a restart
//! reloads the exact pre-crash state.

mod redb_store;

pub use redb_store::RedbFlipStore;

use thiserror::Error;

use crate::model::FlipRecord;

/// Storage errors
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] redb::DatabaseError),

    #[error("Transaction error: {0}")]
    Transaction(#[from] redb::TransactionError),

    #[error("Table error: {0}")]
    Table(#[from] redb::TableError),

    #[error("Storage error: {0}")]
    Storage(#[from] redb::StorageError),

    #[error("Commit error: {0}")]
    Commit(#[from] redb::CommitError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Durable keyed storage for flip records plus the epoch archival marker.
///
/// `put_all` upserts; record removal goes through `delete`. The archival
/// marker makes `archive_flips` idempotent across restarts.
pub trait FlipStore: Send + Sync {
    /// Load every persisted record (bootstrap).
    fn list_all(&self) -> StoreResult<Vec<FlipRecord>>;

    /// Direct lookup by id, for drafts not yet loaded into memory.
    fn get(&self, id: &str) -> StoreResult<Option<FlipRecord>>;

    /// Upsert the given records in one batch.
    fn put_all(&self, flips: &[FlipRecord]) -> StoreResult<()>;

    /// Remove a record entirely.
    fn delete(&self, id: &str) -> StoreResult<()>;

    /// Whether archival already ran for this epoch.
    fn is_archived(&self, epoch: u64) -> StoreResult<bool>;

    /// Record that archival ran for this epoch.
    fn mark_archived(&self, epoch: u64) -> StoreResult<()>;
}
