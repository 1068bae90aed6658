//! Flip Engine - offline-first lifecycle manager for chain-published flips
//!
//! # Overview
//!
//! Flips are user-authored multi-image puzzles that get submitted to the
//! chain, confirmed asynchronously, occasionally deleted, and frozen at
//! epoch boundaries. This crate owns that lifecycle: a per-flip state
//! machine reconciled against transaction lookups, with write-through
//! persistence so everything survives restarts and stays usable offline.
//!
//! The engine takes its collaborators (store, node client, epoch observer)
//! as injected trait objects; default adapters for redb storage and the
//! node's JSON-RPC API ship with the crate.
//!
//! # Module structure
//!
//! ```text
//! flip-engine/src/
//! ├── config    # EngineConfig
//! ├── model     # FlipRecord, FlipType, Hint
//! ├── engine    # FlipEngine: operations + reconciliation
//! ├── reconcile # pending-gated polling worker
//! ├── epoch     # EpochObserver, archival trigger
//! ├── store/    # FlipStore trait + redb adapter
//! ├── node      # NodeClient trait + JSON-RPC adapter
//! ├── payload   # flip hex encoding
//! └── tasks     # background task registry
//! ```
//!
//! # Example
//!
//! ```ignore
//! let store = Arc::new(RedbFlipStore::open("flips.db")?);
//! let node = Arc::new(HttpNodeClient::new(&config.node_url, config.node_api_key.clone())?);
//! let engine = Arc::new(FlipEngine::new(config, store, node));
//! engine.bootstrap()?;
//! let tasks = start_background_tasks(engine.clone(), observer);
//! ```

pub mod config;
pub mod engine;
pub mod epoch;
pub mod error;
pub mod logger;
pub mod model;
pub mod node;
pub mod payload;
pub mod reconcile;
pub mod store;
pub mod tasks;
pub mod util;

pub use config::EngineConfig;
pub use engine::{FlipEngine, SubmitFlipParams};
pub use epoch::{EpochObserver, EpochState, EpochWatcher};
pub use error::{FlipError, FlipResult};
pub use model::{FLIP_LENGTH, FlipRecord, FlipType, Hint, is_default_order};
pub use node::{
    FlipSubmitResult, HASH_IN_MEMPOOL, HttpNodeClient, NodeClient, SubmitFlipRequest, Transaction,
};
pub use reconcile::ReconcileWorker;
pub use store::{FlipStore, RedbFlipStore, StoreError, StoreResult};
pub use tasks::{BackgroundTasks, TaskKind, start_background_tasks};
