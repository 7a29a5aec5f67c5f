//! Fixed-capacity, data-parallel set of unique keys.

use crate::device::{DeviceBuffer, Stream};
use crate::error::Result;
use crate::open_addressing::{DefaultKeyEqual, KeyEqual, OpenAddressingImpl, OpenAddressingRef};
use crate::probing::ProbingScheme;
use crate::slot::{Bits, KeySlot};
use crate::storage::WindowStorageRef;

/// A fixed-capacity, unordered set of unique keys.
///
/// Set-mode slots pack the whole entry into a single atomic word, so every
/// state transition is one compare-and-swap. Everything else matches
/// [`StaticMap`](crate::StaticMap): bulk operations are stream commands
/// fanned out across the lane pool, capacity is fixed per storage, and the
/// empty (and optional erased) key values are reserved.
pub struct StaticSet<Key, Scheme, const WINDOW_SIZE: usize = 1, KE = DefaultKeyEqual>
where
    Key: Bits,
{
    impl_: OpenAddressingImpl<KeySlot<Key>, Scheme, KE, WINDOW_SIZE, false>,
}

impl<Key, Scheme, const W: usize, KE> StaticSet<Key, Scheme, W, KE>
where
    Key: Bits,
    Scheme: ProbingScheme<Key>,
    KE: KeyEqual<Key>,
{
    /// Constructs a set with at least `capacity` slots. Erase is disabled;
    /// use [`Self::with_erased_sentinel`] to enable it.
    pub fn new(
        capacity: usize,
        empty_key_sentinel: Key,
        key_equal: KE,
        probing_scheme: Scheme,
        stream: &Stream,
    ) -> Result<Self> {
        Ok(Self {
            impl_: OpenAddressingImpl::new(
                capacity,
                empty_key_sentinel,
                key_equal,
                probing_scheme,
                stream,
            )?,
        })
    }

    /// Constructs a set with a distinct erased key sentinel, enabling
    /// [`Self::erase`].
    pub fn with_erased_sentinel(
        capacity: usize,
        empty_key_sentinel: Key,
        erased_key_sentinel: Key,
        key_equal: KE,
        probing_scheme: Scheme,
        stream: &Stream,
    ) -> Result<Self> {
        Ok(Self {
            impl_: OpenAddressingImpl::with_erased_sentinel(
                capacity,
                empty_key_sentinel,
                erased_key_sentinel,
                key_equal,
                probing_scheme,
                stream,
            )?,
        })
    }

    /// Constructs a set sized for `n` keys at the desired load factor,
    /// which must lie in `(0, 1]`.
    pub fn with_load_factor(
        n: usize,
        desired_load_factor: f64,
        empty_key_sentinel: Key,
        key_equal: KE,
        probing_scheme: Scheme,
        stream: &Stream,
    ) -> Result<Self> {
        Ok(Self {
            impl_: OpenAddressingImpl::with_load_factor(
                n,
                desired_load_factor,
                empty_key_sentinel,
                key_equal,
                probing_scheme,
                stream,
            )?,
        })
    }

    /// Empties the set and blocks until done.
    pub fn clear(&mut self, stream: &Stream) -> Result<()> {
        self.impl_.clear(stream)
    }

    /// Empties the set in stream order, without blocking.
    pub fn clear_async(&mut self, stream: &Stream) -> Result<()> {
        self.impl_.clear_async(stream)
    }

    /// Bulk-inserts `keys` and returns how many were newly inserted.
    pub fn insert(&mut self, keys: &[Key], stream: &Stream) -> Result<u64> {
        self.impl_.insert(keys, stream)
    }

    /// Bulk-inserts `keys` without blocking or counting.
    pub fn insert_async(&mut self, keys: &[Key], stream: &Stream) -> Result<()> {
        self.impl_.insert_async(keys, stream)
    }

    /// Bulk-inserts the keys whose stencil element satisfies `predicate`;
    /// returns how many were newly inserted.
    pub fn insert_if<T, P>(
        &mut self,
        keys: &[Key],
        stencil: &[T],
        predicate: P,
        stream: &Stream,
    ) -> Result<u64>
    where
        T: Copy + Send + Sync + 'static,
        P: Fn(&T) -> bool + Send + Sync + 'static,
    {
        self.impl_.insert_if(keys, stencil, predicate, stream)
    }

    /// Stencil-filtered bulk insert without blocking or counting.
    pub fn insert_if_async<T, P>(
        &mut self,
        keys: &[Key],
        stencil: &[T],
        predicate: P,
        stream: &Stream,
    ) -> Result<()>
    where
        T: Copy + Send + Sync + 'static,
        P: Fn(&T) -> bool + Send + Sync + 'static,
    {
        self.impl_.insert_if_async(keys, stencil, predicate, stream)
    }

    /// Bulk insert-or-find: for each input key, writes the key that settled
    /// the query and whether this call inserted it.
    pub fn insert_and_find_async(
        &mut self,
        keys: &[Key],
        out_keys: &DeviceBuffer<Key>,
        out_inserted: &DeviceBuffer<bool>,
        stream: &Stream,
    ) -> Result<()> {
        self.impl_
            .insert_and_find_async(keys, out_keys, out_inserted, stream)
    }

    /// Bulk-erases `keys` and returns how many entries were removed.
    ///
    /// Requires a set constructed with [`Self::with_erased_sentinel`].
    pub fn erase(&mut self, keys: &[Key], stream: &Stream) -> Result<u64> {
        self.impl_.erase(keys, stream)
    }

    /// Bulk-erases `keys` without blocking or counting.
    pub fn erase_async(&mut self, keys: &[Key], stream: &Stream) -> Result<()> {
        self.impl_.erase_async(keys, stream)
    }

    /// Bulk membership query; blocks and fills `output`.
    pub fn contains(&self, keys: &[Key], output: &mut [bool], stream: &Stream) -> Result<()> {
        self.impl_.contains(keys, output, stream)
    }

    /// Bulk membership query into a device buffer, without blocking.
    pub fn contains_async(
        &self,
        keys: &[Key],
        output: &DeviceBuffer<bool>,
        stream: &Stream,
    ) -> Result<()> {
        self.impl_.contains_async(keys, output, stream)
    }

    /// Stencil-filtered membership query; filtered-out inputs report
    /// `false`.
    pub fn contains_if<T, P>(
        &self,
        keys: &[Key],
        stencil: &[T],
        predicate: P,
        output: &mut [bool],
        stream: &Stream,
    ) -> Result<()>
    where
        T: Copy + Send + Sync + 'static,
        P: Fn(&T) -> bool + Send + Sync + 'static,
    {
        self.impl_.contains_if(keys, stencil, predicate, output, stream)
    }

    /// Stencil-filtered membership query into a device buffer, without
    /// blocking.
    pub fn contains_if_async<T, P>(
        &self,
        keys: &[Key],
        stencil: &[T],
        predicate: P,
        output: &DeviceBuffer<bool>,
        stream: &Stream,
    ) -> Result<()>
    where
        T: Copy + Send + Sync + 'static,
        P: Fn(&T) -> bool + Send + Sync + 'static,
    {
        self.impl_
            .contains_if_async(keys, stencil, predicate, output, stream)
    }

    /// Bulk lookup; blocks and fills `output` with the stored key for each
    /// query, or the empty key sentinel for misses.
    pub fn find(&self, keys: &[Key], output: &mut [Key], stream: &Stream) -> Result<()> {
        self.impl_.find(keys, output, stream)
    }

    /// Bulk lookup into a device buffer, without blocking.
    pub fn find_async(
        &self,
        keys: &[Key],
        output: &DeviceBuffer<Key>,
        stream: &Stream,
    ) -> Result<()> {
        self.impl_.find_async(keys, output, stream)
    }

    /// Total number of matches for `keys`.
    pub fn count(&self, keys: &[Key], stream: &Stream) -> Result<u64> {
        self.impl_.count(keys, stream)
    }

    /// Like [`Self::count`], but keys with no match contribute one each.
    pub fn count_outer(&self, keys: &[Key], stream: &Stream) -> Result<u64> {
        self.impl_.count_outer(keys, stream)
    }

    /// Number of live keys, observed after a stream wait.
    pub fn size(&self, stream: &Stream) -> Result<usize> {
        self.impl_.size(stream)
    }

    /// Total slot capacity.
    pub fn capacity(&self) -> usize {
        self.impl_.capacity()
    }

    /// Copies every live key into `output`, in no particular order, and
    /// returns how many were written.
    pub fn retrieve_all(&self, output: &mut [Key], stream: &Stream) -> Result<usize> {
        self.impl_.retrieve_all(output, stream)
    }

    /// Relocates every live key into a fresh storage sized for
    /// `new_capacity` (or the current capacity when `None`), then blocks.
    pub fn rehash(&mut self, new_capacity: Option<usize>, stream: &Stream) -> Result<()> {
        self.impl_.rehash(new_capacity, stream)
    }

    /// Stream-ordered rehash without blocking.
    pub fn rehash_async(&mut self, new_capacity: Option<usize>, stream: &Stream) -> Result<()> {
        self.impl_.rehash_async(new_capacity, stream)
    }

    /// The reserved empty key.
    pub fn empty_key_sentinel(&self) -> Key {
        self.impl_.empty_key_sentinel()
    }

    /// The reserved erased key. Equals the empty key when erase is
    /// disabled.
    pub fn erased_key_sentinel(&self) -> Key {
        self.impl_.erased_key_sentinel()
    }

    /// The key equality predicate.
    pub fn key_eq(&self) -> KE {
        self.impl_.key_eq()
    }

    /// The probing scheme.
    pub fn probing_scheme(&self) -> &Scheme {
        self.impl_.probing_scheme()
    }

    /// Non-owning handle to the current storage.
    pub fn storage_ref(&self) -> WindowStorageRef<KeySlot<Key>, W> {
        self.impl_.storage_ref()
    }

    /// Device-side handle for custom kernels.
    pub fn device_ref(&self) -> OpenAddressingRef<KeySlot<Key>, Scheme, KE, W, false> {
        self.impl_.device_ref()
    }
}
