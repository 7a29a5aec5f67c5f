//! Fixed-capacity, data-parallel map of key/payload pairs with unique keys.

use crate::device::{DeviceBuffer, Stream};
use crate::error::Result;
use crate::open_addressing::{DefaultKeyEqual, KeyEqual, OpenAddressingImpl, OpenAddressingRef};
use crate::pair::Pair;
use crate::probing::ProbingScheme;
use crate::slot::{Bits, PairSlot};
use crate::storage::WindowStorageRef;

/// A fixed-capacity, unordered, associative container of key/payload pairs
/// with unique keys.
///
/// `StaticMap` is a thin typed surface over the open-addressing engine:
/// construction picks the storage extent, and every bulk operation is a
/// stream command that fans its input range out across the lane pool. The
/// capacity is immutable for the lifetime of one storage; [`rehash`]
/// replaces the storage with a freshly sized one.
///
/// Key widths up to 8 bytes and payload widths up to 8 bytes are supported;
/// both are enforced through the [`Bits`] bound. The empty key, empty
/// payload, and (when erase is enabled) erased key values are reserved:
/// inserting them is undefined.
///
/// # Type parameters
///
/// * `Key` - key type
/// * `Value` - payload type
/// * `Scheme` - probing scheme (for example linear probing)
/// * `WINDOW_SIZE` - slots examined per probing attempt (1, 2, 4, or 8)
/// * `KE` - key equality predicate
///
/// [`rehash`]: StaticMap::rehash
pub struct StaticMap<Key, Value, Scheme, const WINDOW_SIZE: usize = 1, KE = DefaultKeyEqual>
where
    Key: Bits,
    Value: Bits,
{
    impl_: OpenAddressingImpl<PairSlot<Key, Value>, Scheme, KE, WINDOW_SIZE, false>,
}

impl<Key, Value, Scheme, const W: usize, KE> StaticMap<Key, Value, Scheme, W, KE>
where
    Key: Bits,
    Value: Bits,
    Scheme: ProbingScheme<Key>,
    KE: KeyEqual<Key>,
{
    /// Constructs a map with at least `capacity` slots.
    ///
    /// The storage is stamped with the empty sentinel in stream order, so
    /// operations issued afterwards on `stream` observe an empty map.
    /// Erase is disabled; use [`Self::with_erased_sentinel`] to enable it.
    pub fn new(
        capacity: usize,
        empty_key_sentinel: Key,
        empty_value_sentinel: Value,
        key_equal: KE,
        probing_scheme: Scheme,
        stream: &Stream,
    ) -> Result<Self> {
        let empty = Pair::new(empty_key_sentinel, empty_value_sentinel);
        Ok(Self {
            impl_: OpenAddressingImpl::new(capacity, empty, key_equal, probing_scheme, stream)?,
        })
    }

    /// Constructs a map with a distinct erased key sentinel, enabling
    /// [`Self::erase`]. The two key sentinels must differ.
    pub fn with_erased_sentinel(
        capacity: usize,
        empty_key_sentinel: Key,
        empty_value_sentinel: Value,
        erased_key_sentinel: Key,
        key_equal: KE,
        probing_scheme: Scheme,
        stream: &Stream,
    ) -> Result<Self> {
        let empty = Pair::new(empty_key_sentinel, empty_value_sentinel);
        Ok(Self {
            impl_: OpenAddressingImpl::with_erased_sentinel(
                capacity,
                empty,
                erased_key_sentinel,
                key_equal,
                probing_scheme,
                stream,
            )?,
        })
    }

    /// Constructs a map sized for `n` entries at the desired load factor,
    /// which must lie in `(0, 1]`.
    pub fn with_load_factor(
        n: usize,
        desired_load_factor: f64,
        empty_key_sentinel: Key,
        empty_value_sentinel: Value,
        key_equal: KE,
        probing_scheme: Scheme,
        stream: &Stream,
    ) -> Result<Self> {
        let empty = Pair::new(empty_key_sentinel, empty_value_sentinel);
        Ok(Self {
            impl_: OpenAddressingImpl::with_load_factor(
                n,
                desired_load_factor,
                empty,
                key_equal,
                probing_scheme,
                stream,
            )?,
        })
    }

    /// Empties the map and blocks until done.
    pub fn clear(&mut self, stream: &Stream) -> Result<()> {
        self.impl_.clear(stream)
    }

    /// Empties the map in stream order, without blocking.
    pub fn clear_async(&mut self, stream: &Stream) -> Result<()> {
        self.impl_.clear_async(stream)
    }

    /// Bulk-inserts `pairs` and returns how many keys were newly inserted.
    /// Pairs whose key is already present leave the stored payload
    /// untouched.
    pub fn insert(&mut self, pairs: &[Pair<Key, Value>], stream: &Stream) -> Result<u64> {
        self.impl_.insert(pairs, stream)
    }

    /// Bulk-inserts `pairs` without blocking or counting.
    pub fn insert_async(&mut self, pairs: &[Pair<Key, Value>], stream: &Stream) -> Result<()> {
        self.impl_.insert_async(pairs, stream)
    }

    /// Bulk-inserts the pairs whose stencil element satisfies `predicate`;
    /// returns how many keys were newly inserted.
    pub fn insert_if<T, P>(
        &mut self,
        pairs: &[Pair<Key, Value>],
        stencil: &[T],
        predicate: P,
        stream: &Stream,
    ) -> Result<u64>
    where
        T: Copy + Send + Sync + 'static,
        P: Fn(&T) -> bool + Send + Sync + 'static,
    {
        self.impl_.insert_if(pairs, stencil, predicate, stream)
    }

    /// Stencil-filtered bulk insert without blocking or counting.
    pub fn insert_if_async<T, P>(
        &mut self,
        pairs: &[Pair<Key, Value>],
        stencil: &[T],
        predicate: P,
        stream: &Stream,
    ) -> Result<()>
    where
        T: Copy + Send + Sync + 'static,
        P: Fn(&T) -> bool + Send + Sync + 'static,
    {
        self.impl_.insert_if_async(pairs, stencil, predicate, stream)
    }

    /// Bulk insert-or-find: for each input pair, writes the pair that
    /// settled the query (the pre-existing one, or the input) and whether
    /// this call inserted it.
    pub fn insert_and_find_async(
        &mut self,
        pairs: &[Pair<Key, Value>],
        out_pairs: &DeviceBuffer<Pair<Key, Value>>,
        out_inserted: &DeviceBuffer<bool>,
        stream: &Stream,
    ) -> Result<()> {
        self.impl_
            .insert_and_find_async(pairs, out_pairs, out_inserted, stream)
    }

    /// Bulk-erases `keys` and returns how many entries were removed.
    ///
    /// Requires a map constructed with [`Self::with_erased_sentinel`].
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

    /// Bulk lookup; blocks and fills `output` with the payload of each key,
    /// or the empty payload sentinel for misses.
    pub fn find(&self, keys: &[Key], output: &mut [Value], stream: &Stream) -> Result<()> {
        let empty_value = self.empty_value_sentinel();
        let buffer = DeviceBuffer::filled(empty_value, keys.len());
        self.impl_.find_async_with(
            keys,
            &buffer,
            move |found| found.map(|pair| pair.second).unwrap_or(empty_value),
            stream,
        )?;
        buffer.copy_to_host(output, stream)
    }

    /// Bulk lookup into a device buffer, without blocking. Misses report
    /// the empty payload sentinel.
    pub fn find_async(
        &self,
        keys: &[Key],
        output: &DeviceBuffer<Value>,
        stream: &Stream,
    ) -> Result<()> {
        let empty_value = self.empty_value_sentinel();
        self.impl_.find_async_with(
            keys,
            output,
            move |found| found.map(|pair| pair.second).unwrap_or(empty_value),
            stream,
        )
    }

    /// Total number of matches for `keys`.
    pub fn count(&self, keys: &[Key], stream: &Stream) -> Result<u64> {
        self.impl_.count(keys, stream)
    }

    /// Like [`Self::count`], but keys with no match contribute one each.
    pub fn count_outer(&self, keys: &[Key], stream: &Stream) -> Result<u64> {
        self.impl_.count_outer(keys, stream)
    }

    /// Number of live entries, observed after a stream wait.
    pub fn size(&self, stream: &Stream) -> Result<usize> {
        self.impl_.size(stream)
    }

    /// Total slot capacity.
    pub fn capacity(&self) -> usize {
        self.impl_.capacity()
    }

    /// Copies every live pair into `output`, in no particular order, and
    /// returns how many were written. Outputs shorter than the live size
    /// truncate the result set.
    pub fn retrieve_all(
        &self,
        output: &mut [Pair<Key, Value>],
        stream: &Stream,
    ) -> Result<usize> {
        self.impl_.retrieve_all(output, stream)
    }

    /// Relocates every live entry into a fresh storage sized for
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

    /// The reserved empty payload.
    pub fn empty_value_sentinel(&self) -> Value {
        self.impl_.empty_slot_sentinel().second
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
    pub fn storage_ref(&self) -> WindowStorageRef<PairSlot<Key, Value>, W> {
        self.impl_.storage_ref()
    }

    /// Device-side handle for custom kernels.
    pub fn device_ref(&self) -> OpenAddressingRef<PairSlot<Key, Value>, Scheme, KE, W, false> {
        self.impl_.device_ref()
    }
}
