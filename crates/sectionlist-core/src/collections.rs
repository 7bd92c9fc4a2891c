//! Hash collection aliases used throughout the workspace.
//!
//! Identity keys are already well-mixed 64-bit hashes, so the fast Fx hasher
//! is the default. Enable the `std-hash` feature to fall back to SipHash.

#[cfg(feature = "std-hash")]
pub mod map {
    pub use std::collections::hash_map::Entry;
    pub use std::collections::{HashMap, HashSet};

    pub type BuildHasher = std::collections::hash_map::RandomState;
}

#[cfg(not(feature = "std-hash"))]
pub mod map {
    pub use rustc_hash::{FxHashMap as HashMap, FxHashSet as HashSet};
    pub use std::collections::hash_map::Entry;

    pub type BuildHasher = rustc_hash::FxBuildHasher;
}

/// Insertion-ordered map keyed with the workspace hasher.
pub type IndexMap<K, V> = indexmap::IndexMap<K, V, map::BuildHasher>;
