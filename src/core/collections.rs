//! Collection aliases used across the triangulation and the numerical operators.
//!
//! Hash maps and sets use the `FxHash` family from `rustc_hash`: keys are
//! slotmap keys or small integers, never attacker controlled. Small, bounded
//! buffers (a vertex link, the triangles touched by one insertion) stay on the
//! stack through `SmallVec`.

use rustc_hash::{FxHashMap, FxHashSet};
use slotmap::SparseSecondaryMap;
use smallvec::SmallVec;

use crate::core::triangulation_data_structure::TriangleKey;

/// Fast non-cryptographic hash map.
///
/// # Examples
///
/// ```rust
/// use trisurf::core::collections::FastHashMap;
///
/// let mut map: FastHashMap<usize, f64> = FastHashMap::default();
/// map.insert(3, 0.5);
/// assert_eq!(map.get(&3), Some(&0.5));
/// ```
pub type FastHashMap<K, V> = FxHashMap<K, V>;

/// Fast non-cryptographic hash set.
pub type FastHashSet<T> = FxHashSet<T>;

/// Stack-first buffer that spills to the heap beyond `N` elements.
pub type SmallBuffer<T, const N: usize> = SmallVec<[T; N]>;

/// Typical vertex degree in a Delaunay triangulation is six; the buffer covers
/// almost all links without allocating.
pub const LINK_BUFFER_SIZE: usize = 16;

/// Buffer size for the triangles touched by one insertion (flip stack,
/// cavity).
pub const TRIANGLE_BUFFER_SIZE: usize = 32;

/// Buffer of triangle keys.
pub type TriangleKeyBuffer = SmallBuffer<TriangleKey, TRIANGLE_BUFFER_SIZE>;

/// Sparse per-triangle side table, for visited marks during traversals.
pub type TriangleSecondaryMap<V> = SparseSecondaryMap<TriangleKey, V>;

/// Creates a [`FastHashMap`] with pre-allocated capacity.
#[must_use]
pub fn fast_hash_map_with_capacity<K, V>(capacity: usize) -> FastHashMap<K, V> {
    FastHashMap::with_capacity_and_hasher(capacity, rustc_hash::FxBuildHasher)
}

/// Creates a [`FastHashSet`] with pre-allocated capacity.
#[must_use]
pub fn fast_hash_set_with_capacity<T>(capacity: usize) -> FastHashSet<T> {
    FastHashSet::with_capacity_and_hasher(capacity, rustc_hash::FxBuildHasher)
}
