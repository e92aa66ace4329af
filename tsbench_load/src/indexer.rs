//! Assignment of decoded points to output lanes.

use twox_hash::XxHash64;

/// Determines the lane (and so the [`Link`](crate::Link)) that a point is dispatched on.
///
/// Implementations must return an index in `[0, lanes)`. The dispatcher treats anything else as
/// a programming error and panics.
pub trait PointIndexer<P> {
    fn index(&self, point: &P) -> usize;
}

/// Puts every point on lane 0.
///
/// This is the typical use case where all workers share a single link.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConstantIndexer;

impl<P> PointIndexer<P> for ConstantIndexer {
    fn index(&self, _point: &P) -> usize {
        0
    }
}

/// Seed for [`HashIndexer`], fixed so that lane assignment is stable across runs
const HASH_SEED: u64 = 0;

/// Maps a key to one of a fixed number of lanes using a stable hash.
///
/// All points sharing a key land on the same lane for the whole run, which lets a worker keep
/// state (such as a tag id cache) local to the keys it sees. Adapters wrap this with a
/// [`PointIndexer`] that extracts the key from their point type.
#[derive(Debug, Clone, Copy)]
pub struct HashIndexer {
    partitions: usize,
}

impl HashIndexer {
    /// Create a [`HashIndexer`] over `partitions` lanes
    ///
    /// # Panics
    ///
    /// If `partitions` is zero.
    pub fn new(partitions: usize) -> Self {
        assert!(partitions > 0, "hash indexer requires at least one partition");
        Self { partitions }
    }

    pub fn partitions(&self) -> usize {
        self.partitions
    }

    /// Lane for the given key
    pub fn index_for_key(&self, key: &[u8]) -> usize {
        let hash = XxHash64::oneshot(HASH_SEED, key);
        (hash % self.partitions as u64) as usize
    }
}
