//! Unified error handling
//!
//! [`FlipError`] covers every failure the engine can report. Validation
//! errors are raised locally before any network call; node failures are
//! propagated unchanged and never mutate local state.

use thiserror::Error;

use crate::store::StoreError;

/// Engine errors
///
/// The submit-path validation variants keep the exact messages the desktop
/// client has always shown, so the UI layer can surface them verbatim.
#[derive(Debug, Error)]
pub enum FlipError {
    // ========== Submit validation ==========
    #[error("You already submitted this flip")]
    AlreadySubmitted,

    #[error("You must shuffle flip before submit")]
    UnshuffledOrder,

    #[error("Keywords for flip are not specified")]
    MissingKeywords,

    #[error("Keywords for flip are not allowed")]
    InvalidKeywords,

    #[error("Flip is too large")]
    FlipTooLarge,

    // ========== Lookup / state ==========
    #[error("Flip not found: {0}")]
    NotFound(String),

    // ========== Collaborators ==========
    #[error("Node error: {0}")]
    Node(String),

    #[error("Storage error: {0}")]
    Store(#[from] StoreError),
}

impl FlipError {
    /// True for errors detected locally before any network call.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            FlipError::AlreadySubmitted
                | FlipError::UnshuffledOrder
                | FlipError::MissingKeywords
                | FlipError::InvalidKeywords
                | FlipError::FlipTooLarge
        )
    }
}

pub type FlipResult<T> = Result<T, FlipError>;
