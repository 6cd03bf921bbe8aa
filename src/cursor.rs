//! Range-scan cursor (§4.6): a lazy, stateful forward traversal shared by both collections.
//!
//! `IndexedList::scan` only ever sets `lo`/`hi`/`limit`; `OrderedMap::scan` additionally
//! supports key bounds. The cursor reads each node it visits exactly once and holds no more
//! than `O(depth)` of them at a time, giving the promised `O(k + log n)` I/O for `k` yielded
//! items.

use cid::Cid;
use serde::{de::DeserializeOwned, Serialize};

use crate::error::Error;
use crate::node::{get_node, Node};
use crate::reader::find_pred;
use crate::store::{BlockStore, Codec};

/// Bounds for a range scan. Rank bounds (`lo`/`hi`) are half-open `[lo, hi)` and always
/// available; key bounds (`lt`/`le` for the start, `gt`/`ge` for the end) are meaningful only
/// for keyed collections. `limit` caps the number of items yielded regardless of the other
/// bounds.
#[derive(Debug, Clone)]
pub struct ScanOptions<K> {
    pub lo: Option<u64>,
    pub hi: Option<u64>,
    pub lt: Option<K>,
    pub le: Option<K>,
    pub gt: Option<K>,
    pub ge: Option<K>,
    pub limit: Option<u64>,
}

impl<K> Default for ScanOptions<K> {
    fn default() -> Self {
        Self {
            lo: None,
            hi: None,
            lt: None,
            le: None,
            gt: None,
            ge: None,
            limit: None,
        }
    }
}

struct Frame<K> {
    index: usize,
    keys: Vec<K>,
    children: Vec<Cid>,
}

enum EndBound<K> {
    None,
    Gt(K),
    Ge(K),
}

/// A lazy forward cursor yielding `(key, value)` pairs (key is `None` for `IndexedList`) in
/// ascending rank order.
pub struct RangeCursor<'a, S, C, K> {
    store: &'a S,
    codec: &'a C,
    stack: Vec<Frame<K>>,
    remaining: u64,
    end: EndBound<K>,
}

/// Opens a cursor over `root` per `opts`. A single `get` of the root plus one `get` per level
/// descended establishes the starting position; no further I/O happens until the first
/// [`Iterator::next`] call pulls past what's already buffered.
pub fn open<'a, S, C, K>(
    store: &'a S,
    codec: &'a C,
    root: &Cid,
    opts: ScanOptions<K>,
) -> Result<RangeCursor<'a, S, C, K>, Error<S::Error>>
where
    S: BlockStore,
    C: Codec,
    K: Ord + Clone + Serialize + DeserializeOwned + 'static,
{
    let root_node: Node<K> = get_node(store, codec, root)?;
    let size = root_node.size();

    let end = match (&opts.gt, &opts.ge) {
        (Some(g), _) => EndBound::Gt(g.clone()),
        (None, Some(g)) => EndBound::Ge(g.clone()),
        (None, None) => EndBound::None,
    };

    let mut cursor = RangeCursor {
        store,
        codec,
        stack: Vec::new(),
        remaining: 0,
        end,
    };

    if root_node.children.is_empty() {
        cursor.stack.push(Frame {
            index: 0,
            keys: root_node.keys,
            children: root_node.children,
        });
        return Ok(cursor);
    }

    let start_key = opts.le.clone().or_else(|| opts.lt.clone());
    let lt_exact_exclude = if opts.le.is_none() { opts.lt.clone() } else { None };

    if let Some(ref key) = start_key {
        let mut node = root_node;
        loop {
            let idx = find_pred(&node.keys, key).unwrap_or(0);
            let leaf = node.leaf;
            cursor.stack.push(Frame {
                index: idx,
                keys: node.keys.clone(),
                children: node.children.clone(),
            });
            if leaf {
                if let Some(ref ltk) = lt_exact_exclude {
                    let top = cursor.stack.last_mut().unwrap();
                    if top.index < top.keys.len() && top.keys[top.index] == *ltk {
                        top.index += 1;
                    }
                }
                break;
            }
            let cid = node.children[idx];
            node = get_node(store, codec, &cid)?;
        }

        let exhausted = {
            let top = cursor.stack.last().unwrap();
            top.index >= top.children.len()
        };
        if exhausted {
            cursor.climb_to_next_leaf()?;
        }
        cursor.remaining = size;
    } else {
        let lo = opts.lo.unwrap_or(0).min(size);
        let hi = opts.hi.unwrap_or(size).min(size);
        cursor.remaining = hi.saturating_sub(lo);

        let mut node = root_node;
        let mut remaining_rank = lo;
        loop {
            let mut acc = 0u64;
            let mut chosen = node.counts.len().saturating_sub(1);
            for (i, &c) in node.counts.iter().enumerate() {
                if remaining_rank < acc + c as u64 {
                    chosen = i;
                    break;
                }
                acc += c as u64;
            }
            let leaf = node.leaf;
            cursor.stack.push(Frame {
                index: chosen,
                keys: node.keys.clone(),
                children: node.children.clone(),
            });
            if leaf {
                break;
            }
            remaining_rank -= acc;
            let cid = node.children[chosen];
            node = get_node(store, codec, &cid)?;
        }
    }

    if let Some(limit) = opts.limit {
        cursor.remaining = cursor.remaining.min(limit);
    }

    Ok(cursor)
}

impl<'a, S, C, K> RangeCursor<'a, S, C, K>
where
    S: BlockStore,
    C: Codec,
    K: Ord + Clone + Serialize + DeserializeOwned + 'static,
{
    /// Pops the exhausted top leaf frame, walks up until it finds an ancestor with an
    /// unvisited next child, then descends that child to its leftmost leaf. Returns `false`
    /// once the whole stack is exhausted.
    fn climb_to_next_leaf(&mut self) -> Result<bool, Error<S::Error>> {
        self.stack.pop();
        loop {
            let parent = match self.stack.last_mut() {
                Some(p) => p,
                None => return Ok(false),
            };
            parent.index += 1;
            if parent.index < parent.children.len() {
                let mut cid = parent.children[parent.index];
                loop {
                    let node: Node<K> = get_node(self.store, self.codec, &cid)?;
                    let leaf = node.leaf;
                    let next_cid = if leaf { None } else { Some(node.children[0]) };
                    self.stack.push(Frame {
                        index: 0,
                        keys: node.keys,
                        children: node.children,
                    });
                    if leaf {
                        break;
                    }
                    cid = next_cid.unwrap();
                }
                return Ok(true);
            }
            self.stack.pop();
        }
    }
}

impl<'a, S, C, K> Iterator for RangeCursor<'a, S, C, K>
where
    S: BlockStore,
    C: Codec,
    K: Ord + Clone + Serialize + DeserializeOwned + 'static,
{
    type Item = Result<(Option<K>, Cid), Error<S::Error>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        loop {
            let exhausted = match self.stack.last() {
                Some(top) => top.index >= top.children.len(),
                None => {
                    self.remaining = 0;
                    return None;
                }
            };
            if exhausted {
                match self.climb_to_next_leaf() {
                    Ok(true) => continue,
                    Ok(false) => {
                        self.remaining = 0;
                        return None;
                    }
                    Err(e) => {
                        self.remaining = 0;
                        return Some(Err(e));
                    }
                }
            }

            let top = self.stack.last().unwrap();
            let key = if top.keys.is_empty() {
                None
            } else {
                Some(top.keys[top.index].clone())
            };
            let child = top.children[top.index];

            let stop = match &self.end {
                EndBound::None => false,
                EndBound::Gt(bound) => key.as_ref().is_some_and(|k| k >= bound),
                EndBound::Ge(bound) => key.as_ref().is_some_and(|k| k > bound),
            };
            if stop {
                self.remaining = 0;
                return None;
            }

            self.stack.last_mut().unwrap().index += 1;
            self.remaining -= 1;
            return Some(Ok((key, child)));
        }
    }
}
