//! Shared collection aliases.
//!
//! Every hashed map in the VM uses FxHasher; property tables additionally
//! preserve insertion order.

pub use rustc_hash::{FxHashMap, FxHashSet};

// ═══════════════════════════════════════════════════════════════════════════════
// IndexMap - insertion ordered, FxHasher
// ═══════════════════════════════════════════════════════════════════════════════

pub type FxBuildHasher = core::hash::BuildHasherDefault<rustc_hash::FxHasher>;

pub type IndexMap<K, V> = indexmap::IndexMap<K, V, FxBuildHasher>;

/// Create an empty IndexMap
#[inline]
pub fn index_map_new<K, V>() -> IndexMap<K, V> {
    IndexMap::with_hasher(FxBuildHasher::default())
}
