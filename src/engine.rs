//! Shared splice/upsert/remove machinery (§4.5): level staging, cross-sibling extension,
//! chunked rebuild, and singleton collapse. `IndexedList`/`OrderedMap` contribute only the
//! descend step (§4.5.2/§4.5.3) that produces the initial [`Level`] stack; everything from the
//! rebuild onward, including the part that makes two edit histories converge on the same
//! bytes, is identical for both collections.

use cid::Cid;
use serde::{de::DeserializeOwned, Serialize};

use crate::builder;
use crate::chunker::{next_boundary, Boundary, ChunkerConfig};
use crate::error::Error;
use crate::node::{get_node, put_node, Node};
use crate::store::{BlockStore, Codec, Hasher};

/// A working copy of one depth of the tree, plus the `[start, end)` window within it that the
/// level below is replacing.
///
/// Levels are ordered leaf-first: `levels[0]` is the working copy of the node nearest the
/// edited leaves (the original leaf itself), and the last entry is the working copy of the
/// original root. This is the reverse of how descent visits them (root to leaf) because
/// rebuild needs to walk bottom-up.
pub struct Level<K> {
    pub start: usize,
    pub end: usize,
    pub counts: Vec<u32>,
    pub keys: Vec<K>,
    pub children: Vec<Cid>,
}

/// Pulls one more sibling's contents into `levels[i]` from `levels[i + 1]`'s next unconsumed
/// child, recursing upward when that parent is itself exhausted (§4.5.4). Returns `false` once
/// there is nothing left anywhere above `i` to extend from.
pub(crate) fn extend_level<S, C, K>(
    store: &S,
    codec: &C,
    levels: &mut Vec<Level<K>>,
    i: usize,
) -> Result<bool, Error<S::Error>>
where
    S: BlockStore,
    C: Codec,
    K: Clone + Serialize + DeserializeOwned + 'static,
{
    if i + 1 >= levels.len() {
        return Ok(false);
    }
    if levels[i + 1].end >= levels[i + 1].children.len() {
        if !extend_level(store, codec, levels, i + 1)? {
            return Ok(false);
        }
    }
    if levels[i + 1].end >= levels[i + 1].children.len() {
        return Ok(false);
    }

    let child_cid = levels[i + 1].children[levels[i + 1].end];
    let node: Node<K> = get_node(store, codec, &child_cid)?;
    levels[i + 1].end += 1;

    let lvl = &mut levels[i];
    lvl.counts.extend(node.counts);
    lvl.keys.extend(node.keys);
    lvl.children.extend(node.children);
    Ok(true)
}

#[allow(clippy::too_many_arguments)]
fn emit_chunk<S, H, C, K>(
    store: &S,
    hasher: &H,
    codec: &C,
    lvl: &Level<K>,
    from: usize,
    hi: usize,
    leaf: bool,
    out_counts: &mut Vec<u32>,
    out_keys: &mut Vec<K>,
    out_children: &mut Vec<Cid>,
) -> Result<(), Error<S::Error>>
where
    S: BlockStore,
    H: Hasher,
    C: Codec,
    K: Clone + Serialize + DeserializeOwned + 'static,
{
    let chunk_counts = lvl.counts[from..hi].to_vec();
    let sum: u32 = chunk_counts.iter().map(|&c| c as u64).sum::<u64>() as u32;
    let chunk_keys = if lvl.keys.is_empty() {
        Vec::new()
    } else {
        lvl.keys[from..hi].to_vec()
    };
    let chunk_children = lvl.children[from..hi].to_vec();

    let node = Node {
        leaf,
        counts: chunk_counts,
        keys: chunk_keys,
        children: chunk_children,
    };
    let cid = put_node(store, hasher, codec, &node)?;

    out_counts.push(sum);
    if !lvl.keys.is_empty() {
        out_keys.push(lvl.keys[from].clone());
    }
    out_children.push(cid);
    Ok(())
}

/// Re-chunks `levels[i].children` (after the level below has been spliced into its window),
/// emitting nodes for each chunk boundary and returning the `(counts, keys, children)` triple
/// the caller splices into the next level up. Extends across sibling boundaries via
/// [`extend_level`] whenever the chunker reports a tentative (non-final) tail.
fn rechunk<S, H, C, K>(
    store: &S,
    hasher: &H,
    codec: &C,
    config: &ChunkerConfig,
    levels: &mut Vec<Level<K>>,
    i: usize,
    leaf: bool,
) -> Result<(Vec<u32>, Vec<K>, Vec<Cid>), Error<S::Error>>
where
    S: BlockStore,
    H: Hasher,
    C: Codec,
    K: Clone + Serialize + DeserializeOwned + 'static,
{
    let mut out_counts = Vec::new();
    let mut out_keys = Vec::new();
    let mut out_children = Vec::new();

    let mut from = 0usize;
    let mut hops = 0u32;
    loop {
        let len = levels[i].children.len();
        if from >= len {
            break;
        }
        match next_boundary(&levels[i].children, from, config) {
            Boundary::Definite(hi) => {
                emit_chunk(
                    store, hasher, codec, &levels[i], from, hi, leaf, &mut out_counts,
                    &mut out_keys, &mut out_children,
                )?;
                from = hi;
            }
            Boundary::Tentative(hi) => {
                if extend_level(store, codec, levels, i)? {
                    hops += 1;
                    if hops == 16 {
                        tracing::warn!(
                            level = i,
                            hops,
                            "rebuild crossed many sibling extensions while re-chunking; \
                             this is a cheap signal of many small edits against a wide node"
                        );
                    }
                    continue;
                }
                emit_chunk(
                    store, hasher, codec, &levels[i], from, hi, leaf, &mut out_counts,
                    &mut out_keys, &mut out_children,
                )?;
                from = hi;
            }
        }
    }

    Ok((out_counts, out_keys, out_children))
}

/// Splices the staged edit payload (`frontier_*`) through `levels` bottom-up, re-chunking each
/// touched level, growing a new root above when the rebuilt root still has more than one child,
/// and finally collapsing any redundant singleton chain (§4.5.5, §4.5.6).
///
/// `keyed` selects whether the `keys` column is meaningful (`OrderedMap`) or always empty
/// (`IndexedList`), kept separate from "is `frontier_keys` empty" because a map's payload for
/// `remove` is legitimately empty too.
#[allow(clippy::too_many_arguments)]
pub fn rebuild<S, H, C, K>(
    store: &S,
    hasher: &H,
    codec: &C,
    config: &ChunkerConfig,
    mut levels: Vec<Level<K>>,
    mut frontier_counts: Vec<u32>,
    mut frontier_keys: Vec<K>,
    mut frontier_children: Vec<Cid>,
    keyed: bool,
) -> Result<Cid, Error<S::Error>>
where
    S: BlockStore,
    H: Hasher,
    C: Codec,
    K: Clone + Serialize + DeserializeOwned + 'static,
{
    if levels.is_empty() {
        return builder::create(
            store,
            hasher,
            codec,
            config,
            frontier_children,
            if keyed { Some(frontier_keys) } else { None },
        );
    }

    let mut i = 0usize;
    loop {
        {
            let lvl = &mut levels[i];
            lvl.counts.splice(lvl.start..lvl.end, frontier_counts.iter().cloned());
            if keyed {
                lvl.keys.splice(lvl.start..lvl.end, frontier_keys.iter().cloned());
            }
            lvl.children.splice(lvl.start..lvl.end, frontier_children.iter().cloned());
        }

        let leaf = i == 0;
        let (nc, nk, nchildren) = rechunk(store, hasher, codec, config, &mut levels, i, leaf)?;
        frontier_counts = nc;
        frontier_keys = nk;
        frontier_children = nchildren;

        let is_root_level = i == levels.len() - 1;
        if is_root_level {
            if frontier_children.len() <= 1 {
                break;
            }
            levels.push(Level {
                start: 0,
                end: 0,
                counts: Vec::new(),
                keys: Vec::new(),
                children: Vec::new(),
            });
        }
        i += 1;
    }

    match frontier_children.into_iter().next() {
        Some(cid) => collapse(store, codec, cid),
        None => put_node(store, hasher, codec, &Node::<K>::empty_leaf()),
    }
}

/// Follows a chain of singleton internal nodes down to the first real branch point or leaf
/// (§4.5.6), so a rebuilt tree has the same depth `create` would have produced for the same
/// content.
pub fn collapse<S, C, K>(store: &S, codec: &C, mut cid: Cid) -> Result<Cid, Error<S::Error>>
where
    S: BlockStore,
    C: Codec,
    K: Serialize + DeserializeOwned + 'static,
{
    loop {
        let node: Node<K> = get_node(store, codec, &cid)?;
        if node.leaf || node.children.len() != 1 {
            return Ok(cid);
        }
        cid = node.children[0];
    }
}
