//! `prollytree`: canonical, functionally persistent, content-addressed collections over an
//! opaque content-addressed block store.
//!
//! Two collections are provided: [`IndexedList`], an ordered, rank-addressed sequence, and
//! [`OrderedMap`], a key-ordered associative map. Both persist as a DAG of immutable nodes
//! keyed by content hash ([`node`]); mutation ([`engine`]) produces a new root handle while old
//! roots remain valid and readable. Node boundaries are chosen by a content-defined chunking
//! function ([`chunker`]), so two collections built from equal content always produce
//! byte-identical nodes and an identical root [`Cid`], regardless of the edit history that
//! produced them; that canonicalization guarantee is this crate's entire reason to exist.
//!
//! The block store, hasher and codec a collection runs on are supplied by the caller through
//! the traits in [`store`]; `feature = "mocks"` ships an in-memory store for tests and quick
//! experiments.
//!
//! ```
//! # #[cfg(feature = "mocks")]
//! # fn main() -> Result<(), prollytree::Error<std::convert::Infallible>> {
//! use prollytree::store::mocks::MemoryBlockStore;
//! use prollytree::{IndexedList, ListScanOptions};
//!
//! let list = IndexedList::new(MemoryBlockStore::new(), Default::default(), Default::default());
//! # Ok(())
//! # }
//! # #[cfg(not(feature = "mocks"))]
//! # fn main() {}
//! ```

pub mod builder;
pub mod chunker;
pub mod cursor;
pub mod engine;
pub mod error;
pub mod list;
pub mod map;
pub mod node;
pub mod reader;
pub mod store;

pub use cid::Cid;
pub use cursor::{RangeCursor, ScanOptions};
pub use error::Error;
pub use list::{IndexedList, ListRoot, ListScanOptions};
pub use map::{MapRoot, OrderedMap};
pub use store::{Block, BlockStore, Codec, Hasher};

#[cfg(test)]
mod tests;
