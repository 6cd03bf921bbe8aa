//! Point access by rank, point access by key, and size (§4.4).
//!
//! Everything here is read-only tree descent: no node is ever mutated, so every function is a
//! handful of `get`s bounded by the tree's depth.

use cid::Cid;
use serde::{de::DeserializeOwned, Serialize};

use crate::error::Error;
use crate::node::{get_node, Node};
use crate::store::{BlockStore, Codec};

/// The largest index `i` such that `keys[i] <= key`, or `None` if every key is strictly
/// greater than `key` (the `findPred == -1` case).
pub fn find_pred<K: Ord>(keys: &[K], key: &K) -> Option<usize> {
    match keys.binary_search(key) {
        Ok(i) => Some(i),
        Err(0) => None,
        Err(i) => Some(i - 1),
    }
}

/// Total logical element count of the collection rooted at `root`. A single `get`.
pub fn size<S, C, K>(store: &S, codec: &C, root: &Cid) -> Result<u64, Error<S::Error>>
where
    S: BlockStore,
    C: Codec,
    K: Serialize + DeserializeOwned + 'static,
{
    let node: Node<K> = get_node(store, codec, root)?;
    Ok(node.size())
}

/// Descends to the element at `rank`, returning its key (for keyed collections) and value CID.
pub fn at<S, C, K>(
    store: &S,
    codec: &C,
    root: &Cid,
    rank: u64,
) -> Result<(Option<K>, Cid), Error<S::Error>>
where
    S: BlockStore,
    C: Codec,
    K: Clone + Serialize + DeserializeOwned + 'static,
{
    let mut cid = *root;
    let mut remaining = rank;
    loop {
        let node: Node<K> = get_node(store, codec, &cid)?;
        if node.children.is_empty() {
            return Err(Error::OutOfBounds { index: rank, size: 0 });
        }

        let mut acc = 0u64;
        let mut found = None;
        for (i, &c) in node.counts.iter().enumerate() {
            if remaining < acc + c as u64 {
                found = Some(i);
                break;
            }
            acc += c as u64;
        }
        let i = found.ok_or(Error::OutOfBounds {
            index: rank,
            size: node.size(),
        })?;

        if node.leaf {
            return Ok((node.keys.get(i).cloned(), node.children[i]));
        }
        remaining -= acc;
        cid = node.children[i];
    }
}

/// Point lookup by key (map only): descends via [`find_pred`], returning the value CID for an
/// exact match or `None`.
pub fn eq<S, C, K>(store: &S, codec: &C, root: &Cid, key: &K) -> Result<Option<Cid>, Error<S::Error>>
where
    S: BlockStore,
    C: Codec,
    K: Ord + Clone + Serialize + DeserializeOwned + 'static,
{
    let mut cid = *root;
    loop {
        let node: Node<K> = get_node(store, codec, &cid)?;
        if node.children.is_empty() {
            return Ok(None);
        }
        let i = match find_pred(&node.keys, key) {
            Some(i) => i,
            None => return Ok(None),
        };
        if node.leaf {
            return Ok(if node.keys[i] == *key {
                Some(node.children[i])
            } else {
                None
            });
        }
        cid = node.children[i];
    }
}
