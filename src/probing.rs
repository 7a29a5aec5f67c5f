//! Probing-sequence generation over window indices.
//!
//! A probing scheme maps `(key, attempt)` to a window index such that the
//! first `num_windows` attempts visit every window exactly once. The probe
//! loops rely on that permutation property for termination: a full scan
//! with no empty slot means the table is out of capacity.

use core::marker::PhantomData;

use crate::hash::KeyHash;

/// Iterator over the window indices of one probe sequence.
///
/// The iterator advances by a fixed step modulo the window count;
/// wrap-around is detected by the caller counting attempts against the
/// window count.
#[repr(C)]
#[derive(Clone, Copy, Debug)]
pub struct ProbingIter {
    curr_index: usize,
    step_size: usize,
    num_windows: usize,
}

impl ProbingIter {
    /// Creates an iterator starting at `start`, stepping by `step_size`
    /// modulo `num_windows`.
    pub const fn new(start: usize, step_size: usize, num_windows: usize) -> Self {
        Self {
            curr_index: start,
            step_size,
            num_windows,
        }
    }

    /// Current window index.
    pub const fn current(&self) -> usize {
        self.curr_index
    }

    /// Advances to the next window in the sequence.
    pub fn next(&mut self) {
        self.curr_index = (self.curr_index + self.step_size) % self.num_windows;
    }
}

/// Collision-resolution strategy for the probe loops.
///
/// Schemes are stateless apart from their hash functors and carry the
/// cooperative group cardinality as a compile-time constant.
pub trait ProbingScheme<Key>: Copy + Send + Sync + 'static {
    /// Number of lanes teaming up on one logical query.
    const CG_SIZE: usize;

    /// Whether the window count must be prime for the full-permutation
    /// property to hold (true for double hashing).
    const NEEDS_PRIME_EXTENT: bool = false;

    /// Builds the window-index iterator for a key. `num_windows` must be
    /// non-zero.
    fn make_iter(&self, key: &Key, num_windows: usize) -> ProbingIter;
}

/// Linear probing: `window(i) = (hash(key) + i) mod num_windows`.
///
/// Cheap and cache-friendly at low occupancy; prone to clustering as the
/// table fills.
#[repr(C)]
#[derive(Debug)]
pub struct LinearProbing<Key, Hasher, const CG_SIZE: usize = 1> {
    hasher: Hasher,
    _marker: PhantomData<Key>,
}

impl<Key, Hasher: Clone, const CG_SIZE: usize> Clone for LinearProbing<Key, Hasher, CG_SIZE> {
    fn clone(&self) -> Self {
        Self {
            hasher: self.hasher.clone(),
            _marker: PhantomData,
        }
    }
}

impl<Key, Hasher: Copy, const CG_SIZE: usize> Copy for LinearProbing<Key, Hasher, CG_SIZE> {}

impl<Key, Hasher, const CG_SIZE: usize> LinearProbing<Key, Hasher, CG_SIZE> {
    /// Creates a linear probing scheme with the given hash functor.
    pub const fn new(hasher: Hasher) -> Self {
        Self {
            hasher,
            _marker: PhantomData,
        }
    }
}

impl<Key, Hasher, const CG: usize> ProbingScheme<Key> for LinearProbing<Key, Hasher, CG>
where
    Key: Send + Sync + 'static,
    Hasher: KeyHash<Key>,
{
    const CG_SIZE: usize = CG;

    fn make_iter(&self, key: &Key, num_windows: usize) -> ProbingIter {
        let start = (self.hasher.hash(key) % num_windows as u64) as usize;
        ProbingIter::new(start, 1, num_windows)
    }
}

/// Double hashing: the start comes from the first hash, the stride from
/// the second.
///
/// `window(i) = (h1 + i * (1 + h2 mod (M - 1))) mod M`, with `M` prime so
/// every stride is coprime with the window count. Reduces clustering and is
/// the better choice at high occupancy.
#[repr(C)]
#[derive(Debug)]
pub struct DoubleHashing<Key, Hasher1, Hasher2, const CG_SIZE: usize = 1> {
    hasher1: Hasher1,
    hasher2: Hasher2,
    _marker: PhantomData<Key>,
}

impl<Key, Hasher1: Clone, Hasher2: Clone, const CG_SIZE: usize> Clone
    for DoubleHashing<Key, Hasher1, Hasher2, CG_SIZE>
{
    fn clone(&self) -> Self {
        Self {
            hasher1: self.hasher1.clone(),
            hasher2: self.hasher2.clone(),
            _marker: PhantomData,
        }
    }
}

impl<Key, Hasher1: Copy, Hasher2: Copy, const CG_SIZE: usize> Copy
    for DoubleHashing<Key, Hasher1, Hasher2, CG_SIZE>
{
}

impl<Key, Hasher1, Hasher2, const CG_SIZE: usize> DoubleHashing<Key, Hasher1, Hasher2, CG_SIZE> {
    /// Creates a double-hashing scheme from two hash functors.
    ///
    /// The functors should come from independent families (for the default
    /// hasher, two different seeds suffice).
    pub const fn new(hasher1: Hasher1, hasher2: Hasher2) -> Self {
        Self {
            hasher1,
            hasher2,
            _marker: PhantomData,
        }
    }
}

impl<Key, Hasher1, Hasher2, const CG: usize> ProbingScheme<Key>
    for DoubleHashing<Key, Hasher1, Hasher2, CG>
where
    Key: Send + Sync + 'static,
    Hasher1: KeyHash<Key>,
    Hasher2: KeyHash<Key>,
{
    const CG_SIZE: usize = CG;
    const NEEDS_PRIME_EXTENT: bool = true;

    fn make_iter(&self, key: &Key, num_windows: usize) -> ProbingIter {
        let start = (self.hasher1.hash(key) % num_windows as u64) as usize;
        // Stride in [1, num_windows); coprime with a prime window count.
        let step = if num_windows > 1 {
            1 + (self.hasher2.hash(key) % (num_windows as u64 - 1)) as usize
        } else {
            1
        };
        ProbingIter::new(start, step, num_windows)
    }
}
