//! Error types surfaced by every operation in this crate.
//!
//! Mirrors the shape of [`crate::store::BlockStore`]'s associated error: callers get one
//! enum back regardless of which collaborator (store, codec, hasher) failed, with the
//! store's own error type threaded through transparently rather than boxed away.

use thiserror::Error;

/// Errors produced while reading or mutating a collection.
///
/// `SE` is the [`crate::store::BlockStore::Error`] of whatever store the caller is using. A
/// missing block is not a distinct variant here: it is the store's own failure to resolve a
/// `get`, and surfaces through `Store(SE)` like any other collaborator error (see
/// `mocks::MemoryStoreError::Miss`).
#[derive(Debug, Error)]
pub enum Error<SE> {
    #[error("index {index} out of bounds for size {size}")]
    OutOfBounds { index: u64, size: u64 },

    #[error("invalid node: {reason}")]
    InvalidNode { reason: String },

    #[error("codec error: {0}")]
    Codec(String),

    #[error("hasher error: {0}")]
    Hasher(String),

    #[error(transparent)]
    Store(SE),
}

pub type Result<T, SE> = std::result::Result<T, Error<SE>>;
