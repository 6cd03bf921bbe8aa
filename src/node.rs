//! The single node shape shared by `IndexedList` and `OrderedMap`.
//!
//! A node is either a leaf (children are opaque value CIDs) or internal (children are CIDs
//! of other nodes), always carrying a parallel `counts` array (logical element count of the
//! subtree rooted at each child) and, for keyed collections, a parallel `keys` array (the
//! minimum key of the subtree rooted at each child). Lists use the zero-sized [`NoKey`]
//! marker so the `keys` column is absent from the wire form entirely.
//!
//! On the wire (§6), a node is a positional array, not a named-field map: `[leaf, counts,
//! children]` for an unkeyed node, `[leaf, counts, keys, children]` for a keyed one, with
//! `children` written as an array of CIDs in their canonical *string* form for portability
//! across codecs. Which shape applies is a property of `K` (`NoKey` vs. a real key type), not
//! of any particular node's contents, so the arity check uses `TypeId` rather than checking
//! whether `keys` happens to be empty (a keyed collection's canonical empty root legitimately
//! has an empty `keys` array too).

use std::any::TypeId;
use std::fmt;

use cid::Cid;
use serde::de::{self, DeserializeOwned, Deserializer, SeqAccess, Visitor};
use serde::ser::SerializeSeq;
use serde::{Deserialize, Serialize, Serializer};

use crate::error::Error;
use crate::store::{cid_for, Block, BlockStore, Codec, Hasher};

/// Marker key type for collections with no key column (`IndexedList`).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NoKey;

fn is_keyed<K: 'static>() -> bool {
    TypeId::of::<K>() != TypeId::of::<NoKey>()
}

/// A node: either a leaf over opaque value CIDs, or internal over child-node CIDs.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Node<K> {
    pub leaf: bool,
    pub counts: Vec<u32>,
    pub keys: Vec<K>,
    pub children: Vec<Cid>,
}

impl<K: Serialize + 'static> Serialize for Node<K> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let keyed = is_keyed::<K>();
        let children: Vec<String> = self.children.iter().map(Cid::to_string).collect();

        let mut seq = serializer.serialize_seq(Some(if keyed { 4 } else { 3 }))?;
        seq.serialize_element(&self.leaf)?;
        seq.serialize_element(&self.counts)?;
        if keyed {
            seq.serialize_element(&self.keys)?;
        }
        seq.serialize_element(&children)?;
        seq.end()
    }
}

impl<'de, K: Deserialize<'de> + 'static> Deserialize<'de> for Node<K> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct NodeVisitor<K>(std::marker::PhantomData<K>);

        impl<'de, K: Deserialize<'de> + 'static> Visitor<'de> for NodeVisitor<K> {
            type Value = Node<K>;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "a node array [leaf, counts, keys?, children]")
            }

            fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Node<K>, A::Error> {
                let leaf: bool = seq
                    .next_element()?
                    .ok_or_else(|| de::Error::invalid_length(0, &self))?;
                let counts: Vec<u32> = seq
                    .next_element()?
                    .ok_or_else(|| de::Error::invalid_length(1, &self))?;
                let keys: Vec<K> = if is_keyed::<K>() {
                    seq.next_element()?
                        .ok_or_else(|| de::Error::invalid_length(2, &self))?
                } else {
                    Vec::new()
                };
                let children_strs: Vec<String> = seq
                    .next_element()?
                    .ok_or_else(|| de::Error::invalid_length(if is_keyed::<K>() { 3 } else { 2 }, &self))?;
                let children = children_strs
                    .iter()
                    .map(|s| s.parse::<Cid>().map_err(de::Error::custom))
                    .collect::<Result<Vec<_>, _>>()?;

                Ok(Node { leaf, counts, keys, children })
            }
        }

        deserializer.deserialize_seq(NodeVisitor(std::marker::PhantomData))
    }
}

impl<K> Node<K> {
    pub fn empty_leaf() -> Self {
        Node {
            leaf: true,
            counts: Vec::new(),
            keys: Vec::new(),
            children: Vec::new(),
        }
    }

    /// Total logical element count of the subtree rooted at this node.
    pub fn size(&self) -> u64 {
        self.counts.iter().map(|&c| c as u64).sum()
    }

    fn validate(&self) -> Result<(), String> {
        if self.counts.len() != self.children.len() {
            return Err(format!(
                "counts/children length mismatch: {} vs {}",
                self.counts.len(),
                self.children.len()
            ));
        }
        if !self.keys.is_empty() && self.keys.len() != self.children.len() {
            return Err(format!(
                "keys/children length mismatch: {} vs {}",
                self.keys.len(),
                self.children.len()
            ));
        }
        if self.leaf {
            if self.counts.iter().any(|&c| c != 1) {
                return Err("leaf node counts must all be 1".to_string());
            }
        } else if self.children.is_empty() {
            return Err("internal node must have at least one child".to_string());
        }
        Ok(())
    }
}

/// Serializes, hashes and stores `node`, returning its CID.
pub fn put_node<S, H, C, K>(
    store: &S,
    hasher: &H,
    codec: &C,
    node: &Node<K>,
) -> Result<Cid, Error<S::Error>>
where
    S: BlockStore,
    H: Hasher,
    C: Codec,
    K: Serialize + DeserializeOwned + 'static,
{
    let bytes = codec
        .encode(node)
        .map_err(Error::Codec)?;
    let cid = cid_for(hasher, codec.code(), &bytes).map_err(Error::Hasher)?;
    tracing::trace!(cid = %cid, children = node.children.len(), leaf = node.leaf, "put node");
    store.put(Block { cid, bytes }).map_err(Error::Store)?;
    Ok(cid)
}

/// Fetches and parses the node at `cid`, validating its shape.
pub fn get_node<S, C, K>(store: &S, codec: &C, cid: &Cid) -> Result<Node<K>, Error<S::Error>>
where
    S: BlockStore,
    C: Codec,
    K: Serialize + DeserializeOwned + 'static,
{
    let block = store.get(cid).map_err(Error::Store)?;
    tracing::trace!(cid = %cid, "get node");
    let node: Node<K> = codec.decode(&block.bytes).map_err(Error::Codec)?;
    node.validate()
        .map_err(|reason| Error::InvalidNode { reason })?;
    Ok(node)
}
