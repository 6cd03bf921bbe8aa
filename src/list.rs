//! `IndexedList`: an ordered sequence addressed by position (§6).

use cid::Cid;

use crate::builder;
use crate::chunker::ChunkerConfig;
use crate::cursor::{self, RangeCursor, ScanOptions};
use crate::engine::{self, Level};
use crate::error::Error;
use crate::node::{get_node, NoKey, Node};
use crate::reader;
use crate::store::{BlockStore, Codec, DagCborCodec, Hasher, Sha256Hasher};

/// A root handle for an [`IndexedList`]. Plain content-addressed value: two lists with equal
/// contents always carry the same `ListRoot`, regardless of how each was built (§8 property 4).
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListRoot(pub Cid);

impl ListRoot {
    pub fn cid(&self) -> Cid {
        self.0
    }
}

impl std::fmt::Debug for ListRoot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ListRoot({})", self.0)
    }
}

impl std::fmt::Display for ListRoot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Bounds for [`IndexedList::scan`]: rank-only, half-open `[lo, hi)`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ListScanOptions {
    pub lo: Option<u64>,
    pub hi: Option<u64>,
    pub limit: Option<u64>,
}

/// An ordered, rank-addressed sequence over a content-addressed block store.
pub struct IndexedList<S, H = Sha256Hasher, C = DagCborCodec> {
    pub store: S,
    pub hasher: H,
    pub codec: C,
    pub config: ChunkerConfig,
}

impl<S, H, C> IndexedList<S, H, C>
where
    S: BlockStore,
    H: Hasher,
    C: Codec,
{
    pub fn new(store: S, hasher: H, codec: C) -> Self {
        Self {
            store,
            hasher,
            codec,
            config: ChunkerConfig::default(),
        }
    }

    pub fn with_config(mut self, config: ChunkerConfig) -> Self {
        self.config = config;
        self
    }

    /// Builds a canonical list from `items` in order. §4.3.
    pub fn create(&self, items: impl IntoIterator<Item = Cid>) -> Result<ListRoot, Error<S::Error>> {
        let items: Vec<Cid> = items.into_iter().collect();
        let _span = tracing::debug_span!("list_create", len = items.len()).entered();
        let cid = builder::create::<_, _, _, NoKey>(
            &self.store,
            &self.hasher,
            &self.codec,
            &self.config,
            items,
            None,
        )?;
        Ok(ListRoot(cid))
    }

    /// `root_cid_of`: the string form callers persisting roots elsewhere (a manifest, a
    /// pointer file) need alongside the `Cid` itself.
    pub fn root_cid_of(root: &ListRoot) -> (Cid, String) {
        (root.0, root.0.to_string())
    }

    pub fn size(&self, root: &ListRoot) -> Result<u64, Error<S::Error>> {
        reader::size::<_, _, NoKey>(&self.store, &self.codec, &root.0)
    }

    pub fn len(&self, root: &ListRoot) -> Result<u64, Error<S::Error>> {
        self.size(root)
    }

    pub fn is_empty(&self, root: &ListRoot) -> Result<bool, Error<S::Error>> {
        Ok(self.size(root)? == 0)
    }

    /// Point access by rank (§4.4). Out-of-range indices fail with [`Error::OutOfBounds`].
    pub fn at(&self, root: &ListRoot, index: u64) -> Result<Cid, Error<S::Error>> {
        let (_key, cid) = reader::at::<_, _, NoKey>(&self.store, &self.codec, &root.0, index)?;
        Ok(cid)
    }

    /// Opens a lazy range-scan cursor (§4.6).
    pub fn scan(
        &self,
        root: &ListRoot,
        opts: ListScanOptions,
    ) -> Result<RangeCursor<'_, S, C, NoKey>, Error<S::Error>> {
        let scan_opts = ScanOptions {
            lo: opts.lo,
            hi: opts.hi,
            lt: None,
            le: None,
            gt: None,
            ge: None,
            limit: opts.limit,
        };
        cursor::open(&self.store, &self.codec, &root.0, scan_opts)
    }

    /// Removes `delete_count` items starting at `start` and inserts `items` in their place
    /// (§4.5.2, §4.5.4). `splice(root, start, 0, [])` is a no-op; the empty-root case
    /// degenerates directly to [`Self::create`].
    pub fn splice(
        &self,
        root: &ListRoot,
        start: u64,
        delete_count: u64,
        items: impl IntoIterator<Item = Cid>,
    ) -> Result<ListRoot, Error<S::Error>> {
        let items: Vec<Cid> = items.into_iter().collect();
        let _span =
            tracing::debug_span!("list_splice", start, delete_count, inserted = items.len())
                .entered();

        let root_node: Node<NoKey> = get_node(&self.store, &self.codec, &root.0)?;
        if root_node.children.is_empty() {
            let cid = builder::create::<_, _, _, NoKey>(
                &self.store,
                &self.hasher,
                &self.codec,
                &self.config,
                items,
                None,
            )?;
            return Ok(ListRoot(cid));
        }

        let size = root_node.size();
        if start > size {
            return Err(Error::OutOfBounds { index: start, size });
        }

        let mut levels_root_first: Vec<Level<NoKey>> = Vec::new();
        let mut cid = root.0;
        let mut node = root_node;
        let mut remaining = start;

        loop {
            if node.leaf {
                let insert_at = remaining as usize;
                levels_root_first.push(Level {
                    start: insert_at,
                    end: insert_at,
                    counts: node.counts,
                    keys: Vec::new(),
                    children: node.children,
                });
                break;
            }

            let mut acc = 0u64;
            let mut chosen = node.counts.len() - 1;
            let mut landed = false;
            for (idx, &c) in node.counts.iter().enumerate() {
                if remaining < acc + c as u64 {
                    chosen = idx;
                    landed = true;
                    break;
                }
                acc += c as u64;
            }
            // `remaining` reached the subtree's total size without landing inside a child
            // (start == size): descend into the last child with `remaining` reset to its
            // count, i.e. the prefix sum excluding that child rather than including it.
            let prefix = if landed {
                acc
            } else {
                acc - *node.counts.last().expect("internal node has at least one child") as u64
            };
            levels_root_first.push(Level {
                start: chosen,
                end: chosen + 1,
                counts: node.counts.clone(),
                keys: Vec::new(),
                children: node.children.clone(),
            });
            remaining -= prefix;
            cid = node.children[chosen];
            node = get_node(&self.store, &self.codec, &cid)?;
        }

        let mut levels = levels_root_first;
        levels.reverse();

        // Deletion range extension (§4.5.4): widen the leaf window to cover `delete_count`,
        // pulling sibling leaves in via `extend_level` when the current one runs out; clamp
        // if the tree is exhausted first.
        if delete_count > 0 {
            levels[0].end = levels[0].start + delete_count as usize;
            loop {
                if levels[0].end <= levels[0].counts.len() {
                    break;
                }
                if !engine::extend_level(&self.store, &self.codec, &mut levels, 0)? {
                    levels[0].end = levels[0].counts.len();
                    break;
                }
            }
        }

        let frontier_counts = vec![1u32; items.len()];
        let new_root = engine::rebuild::<_, _, _, NoKey>(
            &self.store,
            &self.hasher,
            &self.codec,
            &self.config,
            levels,
            frontier_counts,
            Vec::new(),
            items,
            false,
        )?;
        Ok(ListRoot(new_root))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::mocks::MemoryBlockStore;
    use multihash::Multihash;

    fn fake_item(seed: u64) -> Cid {
        let digest = seed.to_le_bytes();
        let mh = Multihash::<64>::wrap(0x12, &digest).unwrap();
        Cid::new_v1(0x55, mh)
    }

    fn list() -> IndexedList<MemoryBlockStore> {
        IndexedList::new(MemoryBlockStore::new(), Sha256Hasher, DagCborCodec)
    }

    #[test]
    fn empty_round_trip() {
        let l = list();
        let root = l.create(vec![]).unwrap();
        assert_eq!(l.size(&root).unwrap(), 0);
        assert!(l.scan(&root, ListScanOptions::default()).unwrap().next().is_none());

        let spliced = l.splice(&root, 0, 0, vec![fake_item(1), fake_item(2)]).unwrap();
        let direct = l.create(vec![fake_item(1), fake_item(2)]).unwrap();
        assert_eq!(spliced.0, direct.0);
    }

    #[test]
    fn no_op_splice_preserves_root() {
        let l = list();
        let items: Vec<Cid> = (0..200).map(fake_item).collect();
        let root = l.create(items).unwrap();
        let same = l.splice(&root, 10, 0, vec![]).unwrap();
        assert_eq!(root.0, same.0);
    }

    #[test]
    fn delete_all_is_canonical_empty() {
        let l = list();
        let items: Vec<Cid> = (0..3000).map(fake_item).collect();
        let root = l.create(items).unwrap();
        let size = l.size(&root).unwrap();
        let emptied = l.splice(&root, 0, size, vec![]).unwrap();
        let empty = l.create(vec![]).unwrap();
        assert_eq!(emptied.0, empty.0);
    }

    #[test]
    fn splice_equivalence_with_direct_build() {
        let l = list();
        let xs: Vec<Cid> = (0..4000u64).map(fake_item).collect();
        let ys: Vec<Cid> = (100_000..100_500u64).map(fake_item).collect();

        let root = l.create(xs.clone()).unwrap();
        let spliced = l.splice(&root, 1000, 50, ys.clone()).unwrap();

        let mut expected = xs[..1000].to_vec();
        expected.extend(ys);
        expected.extend(xs[1050..].to_vec());
        let direct = l.create(expected).unwrap();

        assert_eq!(spliced.0, direct.0);
    }

    #[test]
    fn at_and_scan_agree_with_input_order() {
        let l = list();
        let items: Vec<Cid> = (0..1500u64).map(fake_item).collect();
        let root = l.create(items.clone()).unwrap();

        for i in [0usize, 1, 700, 1499] {
            assert_eq!(l.at(&root, i as u64).unwrap(), items[i]);
        }

        let scanned: Vec<Cid> = l
            .scan(&root, ListScanOptions::default())
            .unwrap()
            .map(|r| r.unwrap().1)
            .collect();
        assert_eq!(scanned, items);

        let windowed: Vec<Cid> = l
            .scan(
                &root,
                ListScanOptions {
                    lo: Some(500),
                    hi: Some(510),
                    limit: None,
                },
            )
            .unwrap()
            .map(|r| r.unwrap().1)
            .collect();
        assert_eq!(windowed, items[500..510]);
    }

    #[test]
    fn splice_at_start_and_end_boundaries() {
        let l = list();
        let xs: Vec<Cid> = (0..500u64).map(fake_item).collect();
        let root = l.create(xs.clone()).unwrap();
        let extra = vec![fake_item(99_999)];

        let prepended = l.splice(&root, 0, 0, extra.clone()).unwrap();
        let mut expect_pre = extra.clone();
        expect_pre.extend(xs.clone());
        assert_eq!(prepended.0, l.create(expect_pre).unwrap().0);

        let appended = l.splice(&root, 500, 0, extra.clone()).unwrap();
        let mut expect_post = xs.clone();
        expect_post.extend(extra);
        assert_eq!(appended.0, l.create(expect_post).unwrap().0);
    }

    /// §8's "splice at start = size" boundary, on a list large enough (> 1024 items, the
    /// chunker's max) that its root has more than one child. Checked by CID equality against
    /// `create` of the expected sequence, and by scanned order, so a misplaced append (landing
    /// at the *start* of the last child instead of after it) cannot pass silently.
    #[test]
    fn splice_append_at_size_on_multi_node_list() {
        let l = list();
        let xs: Vec<Cid> = (0..5000u64).map(fake_item).collect();
        let root = l.create(xs.clone()).unwrap();
        let size = l.size(&root).unwrap();
        assert_eq!(size, xs.len() as u64);

        let tail = vec![fake_item(999_999)];
        let appended = l.splice(&root, size, 0, tail.clone()).unwrap();

        let mut expected = xs;
        expected.extend(tail);
        let direct = l.create(expected.clone()).unwrap();
        assert_eq!(appended.0, direct.0);

        let scanned: Vec<Cid> = l
            .scan(&appended, ListScanOptions::default())
            .unwrap()
            .map(|r| r.unwrap().1)
            .collect();
        assert_eq!(scanned, expected);
    }

    #[test]
    fn delete_count_clamps_past_end() {
        let l = list();
        let xs: Vec<Cid> = (0..50u64).map(fake_item).collect();
        let root = l.create(xs.clone()).unwrap();
        let trimmed = l.splice(&root, 40, 1000, vec![]).unwrap();
        let direct = l.create(xs[..40].to_vec()).unwrap();
        assert_eq!(trimmed.0, direct.0);
    }
}
