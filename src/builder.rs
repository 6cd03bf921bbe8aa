//! Bottom-up canonical construction (§4.3 of the design), generic over unkeyed collections
//! (`IndexedList`, `K = `[`NoKey`](crate::node::NoKey)) and keyed ones (`OrderedMap`).
//!
//! `create` is also what the mutator falls back to whenever a splice/upsert lands against the
//! canonical empty root, and what the final collapse step implicitly matches: a node built by
//! `create` and a node arrived at by repeated edits are required to be byte-identical, which is
//! exactly the property the chunker buys us.

use cid::Cid;
use serde::{de::DeserializeOwned, Serialize};

use crate::chunker::{next_boundary, ChunkerConfig};
use crate::error::Error;
use crate::node::{put_node, Node};
use crate::store::{BlockStore, Codec, Hasher};

/// Builds a canonical tree bottom-up from `items` (leaf value CIDs) and, for keyed
/// collections, their parallel sorted `keys`. Returns the resulting root CID.
///
/// Callers are responsible for sorting `items`/`keys` by the collection's comparator first;
/// `create` itself only chunks and serializes, it never reorders.
pub fn create<S, H, C, K>(
    store: &S,
    hasher: &H,
    codec: &C,
    config: &ChunkerConfig,
    items: Vec<Cid>,
    keys: Option<Vec<K>>,
) -> Result<Cid, Error<S::Error>>
where
    S: BlockStore,
    H: Hasher,
    C: Codec,
    K: Clone + Serialize + DeserializeOwned + 'static,
{
    if items.is_empty() {
        return put_node(store, hasher, codec, &Node::<K>::empty_leaf());
    }

    let mut counts: Vec<u32> = vec![1; items.len()];
    let mut cur_keys = keys;
    let mut cur_children = items;
    let mut leaf = true;

    loop {
        let mut new_counts = Vec::new();
        let mut new_keys = cur_keys.as_ref().map(|_| Vec::new());
        let mut new_children = Vec::new();

        let mut from = 0usize;
        while from < cur_children.len() {
            let hi = next_boundary(&cur_children, from, config).hi();

            let chunk_counts = counts[from..hi].to_vec();
            let sum: u32 = chunk_counts.iter().map(|&c| c as u64).sum::<u64>() as u32;
            let chunk_keys = match &cur_keys {
                Some(k) => k[from..hi].to_vec(),
                None => Vec::new(),
            };
            let chunk_children = cur_children[from..hi].to_vec();

            let node = Node {
                leaf,
                counts: chunk_counts,
                keys: chunk_keys,
                children: chunk_children,
            };
            let cid = put_node(store, hasher, codec, &node)?;

            new_counts.push(sum);
            if let (Some(nk), Some(ck)) = (new_keys.as_mut(), cur_keys.as_ref()) {
                nk.push(ck[from].clone());
            }
            new_children.push(cid);

            from = hi;
        }

        counts = new_counts;
        cur_keys = new_keys;
        cur_children = new_children;
        leaf = false;

        if cur_children.len() == 1 {
            break;
        }
    }

    Ok(cur_children[0])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::NoKey;
    use crate::store::mocks::MemoryBlockStore;
    use crate::store::{DagCborCodec, Sha256Hasher};

    fn fake_item(seed: u64) -> Cid {
        use multihash::Multihash;
        let digest = seed.to_le_bytes();
        let mh = Multihash::<64>::wrap(0x12, &digest).unwrap();
        Cid::new_v1(0x55, mh)
    }

    #[test]
    fn empty_input_is_canonical_empty_leaf() {
        let store = MemoryBlockStore::new();
        let cid = create::<_, _, _, NoKey>(
            &store,
            &Sha256Hasher,
            &DagCborCodec,
            &ChunkerConfig::default(),
            vec![],
            None,
        )
        .unwrap();
        let node: Node<NoKey> = crate::node::get_node(&store, &DagCborCodec, &cid).unwrap();
        assert!(node.leaf);
        assert!(node.children.is_empty());
    }

    #[test]
    fn single_item_collapses_to_one_leaf() {
        let store = MemoryBlockStore::new();
        let items = vec![fake_item(1)];
        let cid = create::<_, _, _, NoKey>(
            &store,
            &Sha256Hasher,
            &DagCborCodec,
            &ChunkerConfig::default(),
            items,
            None,
        )
        .unwrap();
        let node: Node<NoKey> = crate::node::get_node(&store, &DagCborCodec, &cid).unwrap();
        assert!(node.leaf);
        assert_eq!(node.children.len(), 1);
    }

    #[test]
    fn same_content_yields_same_root_regardless_of_batching() {
        let store = MemoryBlockStore::new();
        let items: Vec<Cid> = (0..5000).map(fake_item).collect();
        let whole = create::<_, _, _, NoKey>(
            &store,
            &Sha256Hasher,
            &DagCborCodec,
            &ChunkerConfig::default(),
            items.clone(),
            None,
        )
        .unwrap();
        let again = create::<_, _, _, NoKey>(
            &store,
            &Sha256Hasher,
            &DagCborCodec,
            &ChunkerConfig::default(),
            items,
            None,
        )
        .unwrap();
        assert_eq!(whole, again);
    }
}
