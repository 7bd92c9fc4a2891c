//! Identity model for sections and items.
//!
//! Callers identify sections and items with their own hashable values. The
//! list core never stores item values directly: every item is reduced to an
//! [`ItemUniqueId`], the pair of its section hash and item hash. Two items with
//! equal item IDs in different sections therefore never collide.

use std::fmt;
use std::hash::{BuildHasher, Hash};

// Fixed seeds keep identities stable for the lifetime of the process, which
// is all the diff engine and the caches require.
const IDENTITY_SEEDS: [u64; 4] = [
    0x243f_6a88_85a3_08d3,
    0x1319_8a2e_0370_7344,
    0xa409_3822_299f_31d0,
    0x082e_fa98_ec4e_6c89,
];

fn identity_hasher() -> ahash::RandomState {
    let [k0, k1, k2, k3] = IDENTITY_SEEDS;
    ahash::RandomState::with_seeds(k0, k1, k2, k3)
}

/// Hashes a caller-supplied identifier into the 64-bit space used by
/// [`ItemUniqueId`].
pub fn identity_hash<T: Hash + ?Sized>(value: &T) -> u64 {
    BuildHasher::hash_one(&identity_hasher(), value)
}

/// Bounds required of caller-supplied section identifiers.
pub trait SectionId: Hash + Eq + Clone + fmt::Debug {}

impl<T: Hash + Eq + Clone + fmt::Debug> SectionId for T {}

/// Globally unique identity of one item: `{section_hash, item_hash}`.
///
/// This is the only key used by the diff engine, the view cache and the
/// prefetch tracker.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ItemUniqueId {
    section_hash: u64,
    item_hash: u64,
}

impl ItemUniqueId {
    /// Derives the identity of `item` inside `section`.
    pub fn new<S, I>(section: &S, item: &I) -> Self
    where
        S: Hash + ?Sized,
        I: Hash + ?Sized,
    {
        Self {
            section_hash: identity_hash(section),
            item_hash: identity_hash(item),
        }
    }

    /// Builds an identity from precomputed hashes.
    pub const fn from_hashes(section_hash: u64, item_hash: u64) -> Self {
        Self {
            section_hash,
            item_hash,
        }
    }

    pub const fn section_hash(&self) -> u64 {
        self.section_hash
    }

    pub const fn item_hash(&self) -> u64 {
        self.item_hash
    }
}

impl fmt::Debug for ItemUniqueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:016x}:{:016x}", self.section_hash, self.item_hash)
    }
}

/// Position of an item: section index and offset within the section.
///
/// Ordered section-major, matching visual order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct IndexPath {
    pub section: usize,
    pub item: usize,
}

impl IndexPath {
    pub const fn new(section: usize, item: usize) -> Self {
        Self { section, item }
    }
}

impl From<(usize, usize)> for IndexPath {
    fn from((section, item): (usize, usize)) -> Self {
        Self { section, item }
    }
}

impl fmt::Display for IndexPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.section, self.item)
    }
}

/// Read access to the ordered item identities of each section.
///
/// Implemented by [`Snapshot`](crate::Snapshot); prefetch window clamping and
/// in-flight reconciliation only need this view of the list.
pub trait ItemIdentifierProvider {
    /// Number of sections.
    fn section_count(&self) -> usize;

    /// Item identities of the section at `section_index`, or `None` when the
    /// index is out of range.
    fn item_identifiers(&self, section_index: usize) -> Option<&[ItemUniqueId]>;

    /// Identity at `path`, if any.
    fn item_at(&self, path: IndexPath) -> Option<ItemUniqueId> {
        self.item_identifiers(path.section)
            .and_then(|items| items.get(path.item))
            .copied()
    }

    /// Item count of every section, in order.
    fn section_lengths(&self) -> Vec<usize> {
        (0..self.section_count())
            .map(|index| self.item_identifiers(index).map_or(0, <[_]>::len))
            .collect()
    }
}
