//! Content-defined chunking over a node's child CIDs.
//!
//! Boundaries are picked by a gear-hash style rolling fingerprint over the last bytes of
//! each child's digest, so the same logical sequence of children always splits at the same
//! points regardless of how it was assembled (inserted all at once, built up incrementally,
//! edited in the middle: the decision only ever looks at the bytes of the children
//! themselves). This is what makes two trees holding equal content produce byte-identical
//! nodes and therefore an identical root CID.

use cid::Cid;

/// Default/minimum lower bound on children per node, in the absence of a natural boundary.
pub const MIN_CHUNK: usize = 64;
/// Hard upper bound on children per node.
pub const MAX_CHUNK: usize = 1024;

const HI_MASK: u32 = 0x8800_0000;
const LO_MASK: u32 = 0x0300_0000;

/// Tunable chunker bounds. `Default` matches the literal constants above.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkerConfig {
    pub min: usize,
    pub max: usize,
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self {
            min: MIN_CHUNK,
            max: MAX_CHUNK,
        }
    }
}

/// The outcome of scanning for the next chunk boundary starting at `from`.
///
/// `Definite` boundaries are final regardless of what children might still be appended past
/// `children.len()`, when either a gear-hash match was found or the hard `max` cap was hit.
/// `Tentative` means the scan ran off the end of the slice before either of those happened;
/// the caller may still have more children to append (from a sibling node) and should retry
/// once it does. Only once no more children are available does a `Tentative` boundary become
/// final.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Boundary {
    Definite(usize),
    Tentative(usize),
}

impl Boundary {
    pub fn hi(self) -> usize {
        match self {
            Boundary::Definite(hi) | Boundary::Tentative(hi) => hi,
        }
    }

    pub fn is_tentative(self) -> bool {
        matches!(self, Boundary::Tentative(_))
    }
}

/// Last 4 bytes of a child's digest, read little-endian. Digests shorter than 4 bytes are
/// zero-padded on the left (never the case for the hashers this crate ships, but the chunker
/// has no business assuming a particular digest width).
fn gear(cid: &Cid) -> u32 {
    let digest = cid.hash().digest();
    let n = digest.len();
    let mut buf = [0u8; 4];
    let take = n.min(4);
    buf[4 - take..].copy_from_slice(&digest[n - take..]);
    u32::from_le_bytes(buf)
}

/// One rolling-hash step: `flo = (flo << 1) + g` (mod 2^32), carrying the overflow bit into
/// `fhi = (fhi << 1) + carry` (mod 2^32).
fn roll(fhi: u32, flo: u32, g: u32) -> (u32, u32) {
    let wide = ((flo as u64) << 1) + g as u64;
    let carry = (wide > 0xFFFF_FFFF) as u32;
    let new_flo = wide as u32;
    let new_fhi = fhi.wrapping_shl(1).wrapping_add(carry);
    (new_fhi, new_flo)
}

/// Scans `children[from..]` for the next chunk boundary.
pub fn next_boundary(children: &[Cid], from: usize, config: &ChunkerConfig) -> Boundary {
    let len = children.len();
    let remaining = len - from;
    let capped = remaining >= config.max;
    let available = remaining.min(config.max);

    if available < config.min {
        return Boundary::Tentative(len);
    }

    let mut fhi: u32 = 0;
    let mut flo: u32 = 0;

    for child in &children[from..from + config.min] {
        let (new_fhi, new_flo) = roll(fhi, flo, gear(child));
        fhi = new_fhi;
        flo = new_flo;
    }

    for i in config.min..available {
        let (new_fhi, new_flo) = roll(fhi, flo, gear(&children[from + i]));
        fhi = new_fhi;
        flo = new_flo;
        if fhi & HI_MASK == 0 && flo & LO_MASK == 0 {
            return Boundary::Definite(from + i + 1);
        }
    }

    if capped {
        Boundary::Definite(from + available)
    } else {
        Boundary::Tentative(from + available)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use multihash::Multihash;

    fn fake_cid(seed: u64) -> Cid {
        let digest = seed.to_le_bytes();
        let mh = Multihash::<64>::wrap(0x12, &digest).unwrap();
        Cid::new_v1(0x71, mh)
    }

    #[test]
    fn short_runs_are_tentative_not_definite() {
        let children: Vec<Cid> = (0..10).map(fake_cid).collect();
        let config = ChunkerConfig::default();
        let boundary = next_boundary(&children, 0, &config);
        assert_eq!(boundary, Boundary::Tentative(10));
    }

    #[test]
    fn hard_cap_is_definite() {
        let config = ChunkerConfig { min: 2, max: 4 };
        // craft children whose gear fingerprint never matches the mask by using a fixed
        // seed pattern; with min=2 max=4 the scan can only run i in 2..4 so two checks.
        let children: Vec<Cid> = (0..4).map(fake_cid).collect();
        let boundary = next_boundary(&children, 0, &config);
        // whatever the content-derived boundary is, it must be <= 4 and, if it runs to
        // exactly the cap, it must be reported as Definite.
        if let Boundary::Definite(hi) = boundary {
            assert!(hi <= 4);
        }
    }

    #[test]
    fn boundary_depends_only_on_slice_from_start() {
        let children: Vec<Cid> = (0..200).map(fake_cid).collect();
        let config = ChunkerConfig::default();
        let full = next_boundary(&children, 0, &config);
        // A boundary found strictly inside a prefix must be reported identically when the
        // scan is handed only that prefix: it never depends on what comes after it.
        if let Boundary::Definite(hi) = full {
            if hi < 150 {
                let prefix: Vec<Cid> = children[0..150].to_vec();
                let truncated = next_boundary(&prefix, 0, &config);
                assert_eq!(full, truncated);
            }
        }
    }
}
