//! Flip data model
//!
//! A flip is a multi-image puzzle authored by the user. Each flip moves
//! through a small state machine as it is submitted to and confirmed by the
//! chain:
//!
//! ```text
//! Draft ──submit──▶ Publishing ──tx mined──▶ Published ──delete──▶ Deleting
//!   ▲                   │                        ▲                     │
//!   └────tx dropped─────┘                        └────tx dropped───────┘
//!   ◀──────────────────────delete tx mined───────────────────────────-─┘
//! ```
//!
//! Every state eventually collapses to `Archived` at the epoch boundary.
//!
//! Serialized field names stay camelCase for compatibility with flip stores
//! written by earlier client versions.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::util::now_millis;

/// Number of images in a flip.
pub const FLIP_LENGTH: usize = 4;

/// Lifecycle state of a flip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlipType {
    /// Local-only, editable, nothing on chain
    Draft,
    /// Submission accepted by the node, tx not yet mined
    Publishing,
    /// Submission tx mined, flip lives on chain
    Published,
    /// Delete accepted by the node, delete tx not yet mined
    Deleting,
    /// Frozen at an epoch boundary after validation
    Archived,
}

impl FlipType {
    /// A pending flip has a transaction in flight and needs reconciliation.
    pub fn is_pending(self) -> bool {
        matches!(self, FlipType::Publishing | FlipType::Deleting)
    }
}

/// Keyword pair chosen by the author for the flip.
///
/// `id` is the keyword-pair identifier handed out by the node; negative ids
/// mark pairs that were never assigned and cannot be submitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hint {
    pub id: i64,
    #[serde(default)]
    pub words: Vec<String>,
}

/// A single flip record, the unit the engine tracks and persists.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlipRecord {
    /// Stable identifier assigned at draft creation, never changes
    pub id: String,
    /// Lifecycle state
    #[serde(rename = "type")]
    pub flip_type: FlipType,
    /// Raw images as captured by the editor
    #[serde(default)]
    pub pics: Vec<Vec<u8>>,
    /// Compressed images; this is the content fingerprint used for
    /// duplicate-submission detection
    #[serde(default)]
    pub compressed_pics: Vec<Vec<u8>>,
    /// Author-chosen permutation of image indices
    #[serde(default)]
    pub order: Vec<usize>,
    /// Keyword pair
    #[serde(default)]
    pub hint: Option<Hint>,
    /// Submission transaction, present once submitted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tx_hash: Option<String>,
    /// Deletion transaction, present once a delete was requested
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delete_tx_hash: Option<String>,
    /// Canonical on-chain content hash, populated from the submission result
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,
    /// Unix millis
    pub created_at: i64,
    /// Unix millis, refreshed on every mutation
    pub modified_at: i64,
    /// True once the submission tx left the mempool
    #[serde(default)]
    pub mined: bool,
}

impl FlipRecord {
    /// Create a fresh draft with a generated id and current timestamps.
    pub fn new_draft(
        pics: Vec<Vec<u8>>,
        compressed_pics: Vec<Vec<u8>>,
        order: Vec<usize>,
        hint: Option<Hint>,
    ) -> Self {
        let now = now_millis();
        Self {
            id: Uuid::new_v4().to_string(),
            flip_type: FlipType::Draft,
            pics,
            compressed_pics,
            order,
            hint,
            tx_hash: None,
            delete_tx_hash: None,
            hash: None,
            created_at: now,
            modified_at: now,
            mined: false,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.flip_type.is_pending()
    }

    /// The transaction the reconcile loop should watch for this record, if any.
    pub fn watched_tx(&self) -> Option<&str> {
        match self.flip_type {
            FlipType::Publishing => self.tx_hash.as_deref(),
            FlipType::Deleting => self.delete_tx_hash.as_deref(),
            _ => None,
        }
    }
}

/// True when `order` is the identity permutation, i.e. the author never
/// shuffled the flip. Unshuffled flips are rejected at submission.
pub fn is_default_order(order: &[usize]) -> bool {
    order.iter().copied().eq(0..order.len())
}
