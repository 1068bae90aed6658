//! redb-based flip store
//!
//! # Tables
//!
//! | Table | Key | Value | Purpose |
//! |-------|-----|-------|---------|
//! | `flips` | `flip_id` | `FlipRecord` (JSON) | One row per flip |
//! | `archived_epochs` | `epoch` | `()` | Archival idempotency marker |
//!
//! # Durability
//!
//! redb commits are persistent as soon as `commit()` returns and the file is
//! always in a consistent state (copy-on-write with atomic pointer swap).
//! Flips survive power loss on desktop machines that are closed mid-submit.

use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};
use std::path::Path;
use std::sync::Arc;

use super::{FlipStore, StoreResult};
use crate::model::FlipRecord;

/// Flip records: key = flip id, value = JSON-serialized FlipRecord
const FLIPS_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("flips");

/// Archived epochs: key = epoch, value = empty (existence check)
const ARCHIVED_EPOCHS_TABLE: TableDefinition<u64, ()> = TableDefinition::new("archived_epochs");

/// Flip store backed by redb
#[derive(Clone)]
pub struct RedbFlipStore {
    db: Arc<Database>,
}

impl RedbFlipStore {
    /// Open or create the database at the given path.
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let db = Database::create(path)?;
        Self::init(db)
    }

    /// Open an in-memory database. Used by tests and by callers that want a
    /// throwaway store.
    pub fn open_in_memory() -> StoreResult<Self> {
        let db = Database::builder().create_with_backend(redb::backends::InMemoryBackend::new())?;
        Self::init(db)
    }

    fn init(db: Database) -> StoreResult<Self> {
        // Create tables up front so reads never hit a missing table
        let write_txn = db.begin_write()?;
        {
            let _ = write_txn.open_table(FLIPS_TABLE)?;
            let _ = write_txn.open_table(ARCHIVED_EPOCHS_TABLE)?;
        }
        write_txn.commit()?;

        Ok(Self { db: Arc::new(db) })
    }
}

impl FlipStore for RedbFlipStore {
    fn list_all(&self) -> StoreResult<Vec<FlipRecord>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(FLIPS_TABLE)?;

        let mut flips = Vec::new();
        for result in table.iter()? {
            let (_key, value) = result?;
            let flip: FlipRecord = serde_json::from_slice(value.value())?;
            flips.push(flip);
        }

        // redb iterates in key order; callers expect creation order
        flips.sort_by_key(|f| f.created_at);
        Ok(flips)
    }

    fn get(&self, id: &str) -> StoreResult<Option<FlipRecord>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(FLIPS_TABLE)?;

        match table.get(id)? {
            Some(value) => {
                let flip: FlipRecord = serde_json::from_slice(value.value())?;
                Ok(Some(flip))
            }
            None => Ok(None),
        }
    }

    fn put_all(&self, flips: &[FlipRecord]) -> StoreResult<()> {
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(FLIPS_TABLE)?;
            for flip in flips {
                let value = serde_json::to_vec(flip)?;
                table.insert(flip.id.as_str(), value.as_slice())?;
            }
        }
        write_txn.commit()?;
        Ok(())
    }

    fn delete(&self, id: &str) -> StoreResult<()> {
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(FLIPS_TABLE)?;
            table.remove(id)?;
        }
        write_txn.commit()?;
        Ok(())
    }

    fn is_archived(&self, epoch: u64) -> StoreResult<bool> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(ARCHIVED_EPOCHS_TABLE)?;
        Ok(table.get(epoch)?.is_some())
    }

    fn mark_archived(&self, epoch: u64) -> StoreResult<()> {
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(ARCHIVED_EPOCHS_TABLE)?;
            table.insert(epoch, ())?;
        }
        write_txn.commit()?;
        Ok(())
    }
}
