//! Collaborator interfaces: the opaque block store, hash function and codec this crate is
//! built over. None of these are provided as a network service here; callers bring their
//! own `BlockStore`; this module only supplies the trait contracts plus a couple of concrete,
//! feature-gated implementations useful for tests and small programs.

use cid::Cid;
use multihash::Multihash;
use serde::{de::DeserializeOwned, Serialize};

/// Max digest size carried in a [`Multihash`]; 64 bytes covers every hash this crate ships
/// (sha2-256 and blake3-256 both produce 32-byte digests) with room to spare.
pub const MAX_MULTIHASH_SIZE: usize = 64;

/// A content-addressed byte blob together with the [`Cid`] that names it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    pub cid: Cid,
    pub bytes: Vec<u8>,
}

/// An opaque, content-addressed store of immutable blocks.
///
/// Implementations are free to be backed by disk, a network service, or memory; this crate
/// never assumes anything beyond "put is idempotent" and "get of a cid that was put returns
/// the same bytes back". No locking or async machinery is imposed; every suspension point
/// in the tree logic (every `get`/`put`) is just a regular call into this trait.
pub trait BlockStore {
    type Error: std::error::Error + Send + Sync + 'static;

    fn put(&self, block: Block) -> Result<(), Self::Error>;
    fn get(&self, cid: &Cid) -> Result<Block, Self::Error>;
}

/// A hash function usable to name blocks.
///
/// `code` is the multicodec code recorded in the block's [`Cid`] (sha2-256 is `0x12`,
/// blake3 is `0x1e`); `digest` computes the raw hash bytes.
pub trait Hasher {
    fn code(&self) -> u64;
    fn digest(&self, bytes: &[u8]) -> Vec<u8>;
}

/// sha2-256, the default hasher (multicodec `0x12`).
#[derive(Debug, Default, Clone, Copy)]
pub struct Sha256Hasher;

#[cfg(feature = "sha2")]
impl Hasher for Sha256Hasher {
    fn code(&self) -> u64 {
        0x12
    }

    fn digest(&self, bytes: &[u8]) -> Vec<u8> {
        use sha2::{Digest, Sha256};
        Sha256::digest(bytes).to_vec()
    }
}

/// blake3, gated behind `feature = "blake3"` (multicodec `0x1e`).
#[derive(Debug, Default, Clone, Copy)]
pub struct Blake3Hasher;

#[cfg(feature = "blake3")]
impl Hasher for Blake3Hasher {
    fn code(&self) -> u64 {
        0x1e
    }

    fn digest(&self, bytes: &[u8]) -> Vec<u8> {
        blake3::hash(bytes).as_bytes().to_vec()
    }
}

/// A block codec: how node structs turn into bytes and back.
///
/// `code` is the multicodec recorded in the block's [`Cid`] (DAG-CBOR is `0x71`).
pub trait Codec {
    fn code(&self) -> u64;
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, String>;
    fn decode<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T, String>;
}

/// DAG-CBOR, the default codec, matching the IPLD-flavored convention used throughout the
/// content-addressed examples this crate's design is grounded on.
#[derive(Debug, Default, Clone, Copy)]
pub struct DagCborCodec;

#[cfg(feature = "dagcbor")]
impl Codec for DagCborCodec {
    fn code(&self) -> u64 {
        0x71
    }

    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, String> {
        serde_ipld_dagcbor::to_vec(value).map_err(|e| e.to_string())
    }

    fn decode<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T, String> {
        serde_ipld_dagcbor::from_slice(bytes).map_err(|e| e.to_string())
    }
}

/// Wraps a digest and codec code into a [`Cid`], the way every node gets its identity.
pub fn cid_for(hasher: &impl Hasher, codec_code: u64, bytes: &[u8]) -> Result<Cid, String> {
    let digest = hasher.digest(bytes);
    let mh = Multihash::<MAX_MULTIHASH_SIZE>::wrap(hasher.code(), &digest)
        .map_err(|e| e.to_string())?;
    Ok(Cid::new_v1(codec_code, mh))
}

/// An in-memory [`BlockStore`], for tests, doc examples and quick experiments.
#[cfg(feature = "mocks")]
pub mod mocks {
    use super::{Block, BlockStore};
    use cid::Cid;
    use parking_lot::RwLock;
    use std::collections::HashMap;
    use thiserror::Error;

    #[derive(Debug, Error)]
    pub enum MemoryStoreError {
        #[error("no block for cid {0}")]
        Miss(Cid),
    }

    /// A `parking_lot`-backed in-process block store. Never evicts; intended for tests and
    /// small programs, not as a production cache.
    #[derive(Debug, Default)]
    pub struct MemoryBlockStore {
        blocks: RwLock<HashMap<Cid, Vec<u8>>>,
    }

    impl MemoryBlockStore {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn len(&self) -> usize {
            self.blocks.read().len()
        }

        pub fn is_empty(&self) -> bool {
            self.blocks.read().is_empty()
        }
    }

    impl BlockStore for MemoryBlockStore {
        type Error = MemoryStoreError;

        fn put(&self, block: Block) -> Result<(), Self::Error> {
            self.blocks.write().entry(block.cid).or_insert(block.bytes);
            Ok(())
        }

        fn get(&self, cid: &Cid) -> Result<Block, Self::Error> {
            self.blocks
                .read()
                .get(cid)
                .map(|bytes| Block {
                    cid: *cid,
                    bytes: bytes.clone(),
                })
                .ok_or(MemoryStoreError::Miss(*cid))
        }
    }
}
