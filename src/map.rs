//! `OrderedMap`: a key-ordered associative map from comparable keys to opaque value handles
//! (§6).

use cid::Cid;
use serde::{de::DeserializeOwned, Serialize};

use crate::builder;
use crate::chunker::ChunkerConfig;
use crate::cursor::{self, RangeCursor, ScanOptions};
use crate::engine::{self, Level};
use crate::error::Error;
use crate::node::{get_node, Node};
use crate::reader::{self, find_pred};
use crate::store::{BlockStore, Codec, DagCborCodec, Hasher, Sha256Hasher};

/// A root handle for an [`OrderedMap`]. Plain content-addressed value.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct MapRoot(pub Cid);

impl MapRoot {
    pub fn cid(&self) -> Cid {
        self.0
    }
}

impl std::fmt::Debug for MapRoot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "MapRoot({})", self.0)
    }
}

impl std::fmt::Display for MapRoot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A key-ordered associative map over a content-addressed block store.
pub struct OrderedMap<K, S, H = Sha256Hasher, C = DagCborCodec> {
    pub store: S,
    pub hasher: H,
    pub codec: C,
    pub config: ChunkerConfig,
    _key: std::marker::PhantomData<K>,
}

impl<K, S, H, C> OrderedMap<K, S, H, C>
where
    K: Ord + Clone + Serialize + DeserializeOwned + 'static,
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
            _key: std::marker::PhantomData,
        }
    }

    pub fn with_config(mut self, config: ChunkerConfig) -> Self {
        self.config = config;
        self
    }

    /// Builds a canonical map from `entries`, sorting by the comparator first. §4.3.
    pub fn create(&self, entries: impl IntoIterator<Item = (K, Cid)>) -> Result<MapRoot, Error<S::Error>> {
        let mut entries: Vec<(K, Cid)> = entries.into_iter().collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        let _span = tracing::debug_span!("map_create", len = entries.len()).entered();
        let (keys, children): (Vec<K>, Vec<Cid>) = entries.into_iter().unzip();
        let cid = builder::create(&self.store, &self.hasher, &self.codec, &self.config, children, Some(keys))?;
        Ok(MapRoot(cid))
    }

    pub fn root_cid_of(root: &MapRoot) -> (Cid, String) {
        (root.0, root.0.to_string())
    }

    pub fn size(&self, root: &MapRoot) -> Result<u64, Error<S::Error>> {
        reader::size::<_, _, K>(&self.store, &self.codec, &root.0)
    }

    pub fn len(&self, root: &MapRoot) -> Result<u64, Error<S::Error>> {
        self.size(root)
    }

    pub fn is_empty(&self, root: &MapRoot) -> Result<bool, Error<S::Error>> {
        Ok(self.size(root)? == 0)
    }

    /// Point access by rank (§4.4). `None` for an out-of-range index.
    pub fn at(&self, root: &MapRoot, index: u64) -> Result<Option<(K, Cid)>, Error<S::Error>> {
        match reader::at::<_, _, K>(&self.store, &self.codec, &root.0, index) {
            Ok((Some(key), cid)) => Ok(Some((key, cid))),
            Ok((None, _)) => Ok(None),
            Err(Error::OutOfBounds { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Point access by key (§4.4).
    pub fn eq(&self, root: &MapRoot, key: &K) -> Result<Option<Cid>, Error<S::Error>> {
        reader::eq(&self.store, &self.codec, &root.0, key)
    }

    /// Opens a lazy range-scan cursor (§4.6), accepting rank and/or key bounds.
    pub fn scan(&self, root: &MapRoot, opts: ScanOptions<K>) -> Result<RangeCursor<'_, S, C, K>, Error<S::Error>> {
        cursor::open(&self.store, &self.codec, &root.0, opts)
    }

    /// Descends to the slot `key` belongs in (§4.5.3), returning the leaf-first `Level` stack
    /// and whether that slot already holds an equal key.
    fn descend(&self, root: &MapRoot, key: &K) -> Result<(Vec<Level<K>>, bool), Error<S::Error>> {
        let mut levels_root_first: Vec<Level<K>> = Vec::new();
        let mut cid = root.0;
        let mut node: Node<K> = get_node(&self.store, &self.codec, &cid)?;
        let matched;

        loop {
            let pred = find_pred(&node.keys, key);
            if node.leaf {
                let (start, end, m) = match pred {
                    Some(i) if node.keys[i] == *key => (i, i + 1, true),
                    Some(i) => (i + 1, i + 1, false),
                    None => (0, 0, false),
                };
                matched = m;
                levels_root_first.push(Level {
                    start,
                    end,
                    counts: node.counts,
                    keys: node.keys,
                    children: node.children,
                });
                break;
            }

            let i = pred.unwrap_or(0);
            levels_root_first.push(Level {
                start: i,
                end: i + 1,
                counts: node.counts.clone(),
                keys: node.keys.clone(),
                children: node.children.clone(),
            });
            cid = node.children[i];
            node = get_node(&self.store, &self.codec, &cid)?;
        }

        let mut levels = levels_root_first;
        levels.reverse();
        Ok((levels, matched))
    }

    /// Inserts or overwrites the value at `key` (§4.5.3). `upsert(upsert(r, k, v1), k, v2)`
    /// equals `upsert(r, k, v2)` by root CID.
    pub fn upsert(&self, root: &MapRoot, key: K, value: Cid) -> Result<MapRoot, Error<S::Error>> {
        let _span = tracing::debug_span!("map_upsert").entered();
        let root_node: Node<K> = get_node(&self.store, &self.codec, &root.0)?;
        if root_node.children.is_empty() {
            let cid = builder::create(
                &self.store,
                &self.hasher,
                &self.codec,
                &self.config,
                vec![value],
                Some(vec![key]),
            )?;
            return Ok(MapRoot(cid));
        }

        let (levels, _matched) = self.descend(root, &key)?;
        let new_root = engine::rebuild(
            &self.store,
            &self.hasher,
            &self.codec,
            &self.config,
            levels,
            vec![1],
            vec![key],
            vec![value],
            true,
        )?;
        Ok(MapRoot(new_root))
    }

    /// Removes `key` if present (§4.5.3). A no-op (returns the original root unchanged) if
    /// `key` is absent.
    pub fn remove(&self, root: &MapRoot, key: &K) -> Result<MapRoot, Error<S::Error>> {
        let _span = tracing::debug_span!("map_remove").entered();
        let root_node: Node<K> = get_node(&self.store, &self.codec, &root.0)?;
        if root_node.children.is_empty() {
            return Ok(*root);
        }

        let (levels, matched) = self.descend(root, key)?;
        if !matched {
            return Ok(*root);
        }

        let new_root = engine::rebuild(
            &self.store,
            &self.hasher,
            &self.codec,
            &self.config,
            levels,
            Vec::new(),
            Vec::new(),
            Vec::new(),
            true,
        )?;
        Ok(MapRoot(new_root))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::mocks::MemoryBlockStore;
    use multihash::Multihash;

    fn fake_value(seed: u64) -> Cid {
        let digest = seed.to_le_bytes();
        let mh = Multihash::<64>::wrap(0x12, &digest).unwrap();
        Cid::new_v1(0x55, mh)
    }

    fn map() -> OrderedMap<String, MemoryBlockStore> {
        OrderedMap::new(MemoryBlockStore::new(), Sha256Hasher, DagCborCodec)
    }

    #[test]
    fn lookup_after_bulk_create() {
        let m = map();
        let entries: Vec<(String, Cid)> = (0..2000)
            .map(|i| (format!("key:{i:05}"), fake_value(i as u64)))
            .collect();
        let root = m.create(entries.clone()).unwrap();

        for i in [0usize, 1, 999, 1999] {
            let (k, v) = &entries[i];
            assert_eq!(m.eq(&root, k).unwrap(), Some(*v));
        }
        assert_eq!(m.eq(&root, &"missing".to_string()).unwrap(), None);
    }

    #[test]
    fn upsert_sequence_matches_direct_build() {
        let m = map();
        let mut root = m.create(Vec::<(String, Cid)>::new()).unwrap();
        let mut accum: Vec<(String, Cid)> = Vec::new();

        for i in 0..300u64 {
            let key = format!("k{i:04}");
            let value = fake_value(i);
            root = m.upsert(&root, key.clone(), value).unwrap();
            accum.retain(|(k, _)| k != &key);
            accum.push((key, value));

            let direct = m.create(accum.clone()).unwrap();
            assert_eq!(root.0, direct.0);
        }
    }

    #[test]
    fn upsert_is_idempotent_on_overwrite() {
        let m = map();
        let root = m.create(Vec::<(String, Cid)>::new()).unwrap();
        let k = "dup".to_string();
        let r1 = m.upsert(&root, k.clone(), fake_value(1)).unwrap();
        let r2 = m.upsert(&r1, k.clone(), fake_value(2)).unwrap();

        let direct = m.create(vec![(k, fake_value(2))]).unwrap();
        assert_eq!(r2.0, direct.0);
    }

    #[test]
    fn remove_absent_key_is_noop() {
        let m = map();
        let entries: Vec<(String, Cid)> =
            (0..50).map(|i| (format!("k{i:03}"), fake_value(i as u64))).collect();
        let root = m.create(entries).unwrap();
        let same = m.remove(&root, &"zzz-absent".to_string()).unwrap();
        assert_eq!(root.0, same.0);
    }

    #[test]
    fn remove_then_upsert_equals_remove_of_original() {
        let m = map();
        let entries: Vec<(String, Cid)> =
            (0..500).map(|i| (format!("k{i:04}"), fake_value(i as u64))).collect();
        let root = m.create(entries).unwrap();

        let absent_key = "zzzzz".to_string();
        let with_upsert = m.upsert(&root, absent_key.clone(), fake_value(999)).unwrap();
        let round_tripped = m.remove(&with_upsert, &absent_key).unwrap();
        let removed_baseline = m.remove(&root, &absent_key).unwrap();
        assert_eq!(round_tripped.0, removed_baseline.0);
        assert_eq!(removed_baseline.0, root.0);
    }

    #[test]
    fn scan_with_key_bounds_yields_half_open_range() {
        let m = map();
        let entries: Vec<(String, Cid)> = (0..10_000)
            .map(|i| (format!("ppp{i}"), fake_value(i as u64)))
            .collect();
        let root = m.create(entries.clone()).unwrap();

        let opts = ScanOptions {
            lo: None,
            hi: None,
            lt: None,
            le: Some("ppp500".to_string()),
            gt: Some("ppp600".to_string()),
            ge: None,
            limit: None,
        };
        let keys: Vec<String> = m
            .scan(&root, opts)
            .unwrap()
            .map(|r| r.unwrap().0.unwrap())
            .collect();

        assert!(keys.first().map(|k| k.as_str() >= "ppp500").unwrap_or(false));
        assert!(keys.iter().all(|k| k.as_str() < "ppp600"));
        assert!(keys.windows(2).all(|w| w[0] < w[1]));
    }
}
