//! Open-addressing engine: key equality, cooperative-group probe loops,
//! and the host-side bulk dispatcher.
//!
//! [`OpenAddressingRef`] is the device-side handle: cheap to clone, passed
//! by value into kernels, one method call per logical query. Each query is
//! executed by one cooperative group; the group gathers its lane views of a
//! window, performs the ballot reductions, and elects the lowest lane to
//! perform the atomic transition.
//!
//! [`OpenAddressingImpl`] is the host-side layer: it owns the storage,
//! validates configuration, and dispatches bulk operations as stream
//! commands that fan out across the lane pool.

use core::marker::PhantomData;
use std::sync::Arc;

use rayon::prelude::*;

use crate::device::{DeviceBuffer, Stream};
use crate::error::{Error, Result};
use crate::probing::ProbingScheme;
use crate::slot::{classify, Bits, Slot, SlotState};
use crate::storage::{
    make_window_extent, CounterRef, CounterStorage, Extent, WindowStorage, WindowStorageRef,
};

/// Result of comparing a probe key against an observed slot.
#[repr(i8)]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum EqualResult {
    /// Keys differ; the probe continues.
    Unequal = 0,
    /// Keys are equivalent.
    Equal = 1,
    /// The slot is empty; queries stop here.
    Empty = 2,
    /// The slot is empty or erased; inserts may claim it.
    Available = 3,
}

/// User-supplied key equivalence.
///
/// Sentinel detection is bitwise and happens before this predicate runs;
/// implementations never see sentinel-valued slot keys. The probe key is
/// always the left-hand side and the slot key the right-hand side.
pub trait KeyEqual<Key>: Copy + Send + Sync + 'static {
    /// Whether `probe_key` and `slot_key` are equivalent.
    fn eq(&self, probe_key: &Key, slot_key: &Key) -> bool;
}

/// Bitwise key equality via `Eq`.
#[derive(Copy, Clone, Debug, Default)]
pub struct DefaultKeyEqual;

impl<Key: Bits> KeyEqual<Key> for DefaultKeyEqual {
    #[inline]
    fn eq(&self, probe_key: &Key, slot_key: &Key) -> bool {
        probe_key == slot_key
    }
}

/// Sentinel-aware equality used inside the probe loops.
///
/// Wraps the user predicate with the bitwise sentinel checks that define
/// slot states, so the loops only ever branch on an [`EqualResult`].
#[derive(Copy, Clone)]
pub struct EqualWrapper<Key, KE> {
    empty_key: u64,
    erased_key: u64,
    key_equal: KE,
    _marker: PhantomData<Key>,
}

impl<Key: Bits, KE: KeyEqual<Key>> EqualWrapper<Key, KE> {
    /// Builds a wrapper from the reserved key sentinels and the user
    /// predicate.
    pub fn new(empty_key: Key, erased_key: Key, key_equal: KE) -> Self {
        Self {
            empty_key: empty_key.to_bits(),
            erased_key: erased_key.to_bits(),
            key_equal,
            _marker: PhantomData,
        }
    }

    /// Classification for queries: empty stops the probe, erased is
    /// transparent.
    #[inline]
    pub fn equal_for_find(&self, probe_key: &Key, slot_bits: u64) -> EqualResult {
        if slot_bits == self.empty_key {
            return EqualResult::Empty;
        }
        if slot_bits == self.erased_key {
            return EqualResult::Unequal;
        }
        if self.key_equal.eq(probe_key, &Key::from_bits(slot_bits)) {
            EqualResult::Equal
        } else {
            EqualResult::Unequal
        }
    }

    /// Classification for insertion: empty and erased slots are both
    /// reusable. Containers that permit duplicates skip the equality check,
    /// since they insert regardless of existing matches.
    #[inline]
    pub fn equal_for_insert(
        &self,
        probe_key: &Key,
        slot_bits: u64,
        allows_duplicates: bool,
    ) -> EqualResult {
        if slot_bits == self.empty_key || slot_bits == self.erased_key {
            return EqualResult::Available;
        }
        if allows_duplicates {
            return EqualResult::Unequal;
        }
        if self.key_equal.eq(probe_key, &Key::from_bits(slot_bits)) {
            EqualResult::Equal
        } else {
            EqualResult::Unequal
        }
    }

    /// Slot-state classification against the sentinels.
    #[inline]
    pub fn state_of(&self, slot_bits: u64) -> SlotState {
        classify(slot_bits, self.empty_key, self.erased_key)
    }
}

/// Decisive result of one insert query.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum InsertOutcome {
    /// The key was newly inserted.
    Inserted,
    /// An equivalent key already occupies a slot on the probe sequence.
    Present,
    /// Every window was visited without finding a reusable slot. The
    /// capacity precondition was violated; the entry was not stored.
    Full,
}

/// Device-side engine handle, passed by value into kernels.
pub struct OpenAddressingRef<
    S: Slot,
    Scheme,
    KE,
    const WINDOW_SIZE: usize,
    const ALLOWS_DUPLICATES: bool,
> {
    storage: WindowStorageRef<S, WINDOW_SIZE>,
    empty_slot_sentinel: S::Value,
    erased_key_sentinel: S::Key,
    predicate: EqualWrapper<S::Key, KE>,
    probing_scheme: Scheme,
}

impl<S, Scheme, KE, const W: usize, const DUP: bool> Clone
    for OpenAddressingRef<S, Scheme, KE, W, DUP>
where
    S: Slot,
    Scheme: Copy,
    KE: Copy,
{
    fn clone(&self) -> Self {
        Self {
            storage: self.storage.clone(),
            empty_slot_sentinel: self.empty_slot_sentinel,
            erased_key_sentinel: self.erased_key_sentinel,
            predicate: self.predicate,
            probing_scheme: self.probing_scheme,
        }
    }
}

impl<S, Scheme, KE, const W: usize, const DUP: bool> OpenAddressingRef<S, Scheme, KE, W, DUP>
where
    S: Slot,
    Scheme: ProbingScheme<S::Key>,
    KE: KeyEqual<S::Key>,
{
    /// Builds a handle from storage and configuration.
    pub fn new(
        storage: WindowStorageRef<S, W>,
        empty_slot_sentinel: S::Value,
        erased_key_sentinel: S::Key,
        predicate: EqualWrapper<S::Key, KE>,
        probing_scheme: Scheme,
    ) -> Self {
        Self {
            storage,
            empty_slot_sentinel,
            erased_key_sentinel,
            predicate,
            probing_scheme,
        }
    }

    /// Total slot capacity.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.storage.capacity()
    }

    /// Number of windows.
    #[inline]
    pub fn num_windows(&self) -> usize {
        self.storage.num_windows()
    }

    /// The sentinel stored in empty slots.
    #[inline]
    pub fn empty_slot_sentinel(&self) -> S::Value {
        self.empty_slot_sentinel
    }

    /// The reserved erased key.
    #[inline]
    pub fn erased_key_sentinel(&self) -> S::Key {
        self.erased_key_sentinel
    }

    /// The non-owning storage handle.
    #[inline]
    pub fn storage_ref(&self) -> WindowStorageRef<S, W> {
        self.storage.clone()
    }

    /// Inserts a slot value, racing other groups through the slot protocol.
    ///
    /// One probing attempt examines all `W` slots of a window: the lane
    /// views are gathered in lane-major order, so the first reusable hit is
    /// the lowest-lane election and ties under contention resolve
    /// deterministically. A lost CAS re-ballots the same window.
    pub fn insert(&self, value: S::Value) -> InsertOutcome {
        let key = S::key_of(&value);
        let num_windows = self.storage.num_windows();
        let mut iter = self.probing_scheme.make_iter(&key, num_windows);
        let mut attempts = 0;
        while attempts < num_windows {
            let window = self.storage.window(iter.current());
            let mut reusable: Option<(usize, u64)> = None;
            let mut matched = false;
            for (lane, slot) in window.iter().enumerate() {
                let bits = slot.load_key();
                match self.predicate.equal_for_insert(&key, bits, DUP) {
                    EqualResult::Equal => {
                        matched = true;
                        break;
                    }
                    EqualResult::Available if reusable.is_none() => reusable = Some((lane, bits)),
                    _ => {}
                }
            }
            if matched {
                return InsertOutcome::Present;
            }
            if let Some((lane, observed)) = reusable {
                if window[lane].try_insert(observed, &value) {
                    return InsertOutcome::Inserted;
                }
                // Lost the word; re-ballot the same window.
                continue;
            }
            iter.next();
            attempts += 1;
        }
        InsertOutcome::Full
    }

    /// Inserts a value and reports the slot content that settled the query:
    /// the existing value for `(_, false)`, the inserted one for
    /// `(_, true)`.
    pub fn insert_and_find(&self, value: S::Value) -> (S::Value, bool) {
        let key = S::key_of(&value);
        let num_windows = self.storage.num_windows();
        let mut iter = self.probing_scheme.make_iter(&key, num_windows);
        let mut attempts = 0;
        while attempts < num_windows {
            let window = self.storage.window(iter.current());
            let mut reusable: Option<(usize, u64)> = None;
            let mut matched: Option<(usize, u64)> = None;
            for (lane, slot) in window.iter().enumerate() {
                let bits = slot.load_key();
                match self.predicate.equal_for_insert(&key, bits, DUP) {
                    EqualResult::Equal => {
                        matched = Some((lane, bits));
                        break;
                    }
                    EqualResult::Available if reusable.is_none() => reusable = Some((lane, bits)),
                    _ => {}
                }
            }
            if let Some((lane, observed)) = matched {
                return (
                    window[lane].read_value(observed, &self.empty_slot_sentinel),
                    false,
                );
            }
            if let Some((lane, observed)) = reusable {
                if window[lane].try_insert(observed, &value) {
                    return (value, true);
                }
                // The winner may have carried our key; re-ballot to find out.
                continue;
            }
            iter.next();
            attempts += 1;
        }
        (value, false)
    }

    /// Looks a key up.
    ///
    /// An empty slot anywhere in a window ends the probe; erased slots are
    /// transparent, so tombstones never change a query's decision.
    pub fn find(&self, key: &S::Key) -> Option<S::Value> {
        let num_windows = self.storage.num_windows();
        let mut iter = self.probing_scheme.make_iter(key, num_windows);
        let mut attempts = 0;
        while attempts < num_windows {
            let window = self.storage.window(iter.current());
            let mut found: Option<(usize, u64)> = None;
            let mut saw_empty = false;
            for (lane, slot) in window.iter().enumerate() {
                let bits = slot.load_key();
                match self.predicate.equal_for_find(key, bits) {
                    EqualResult::Equal => {
                        found = Some((lane, bits));
                        break;
                    }
                    EqualResult::Empty => saw_empty = true,
                    _ => {}
                }
            }
            if let Some((lane, observed)) = found {
                return Some(window[lane].read_value(observed, &self.empty_slot_sentinel));
            }
            if saw_empty {
                return None;
            }
            iter.next();
            attempts += 1;
        }
        None
    }

    /// Whether an equivalent key is present.
    #[inline]
    pub fn contains(&self, key: &S::Key) -> bool {
        self.find(key).is_some()
    }

    /// Tombstones one matching slot. Returns `false` when no match exists.
    pub fn erase(&self, key: &S::Key) -> bool {
        let num_windows = self.storage.num_windows();
        let mut iter = self.probing_scheme.make_iter(key, num_windows);
        let mut attempts = 0;
        while attempts < num_windows {
            let window = self.storage.window(iter.current());
            let mut found: Option<(usize, u64)> = None;
            let mut saw_empty = false;
            for (lane, slot) in window.iter().enumerate() {
                let bits = slot.load_key();
                match self.predicate.equal_for_find(key, bits) {
                    EqualResult::Equal => {
                        found = Some((lane, bits));
                        break;
                    }
                    EqualResult::Empty => saw_empty = true,
                    _ => {}
                }
            }
            if let Some((lane, observed)) = found {
                if window[lane].try_erase(
                    observed,
                    self.erased_key_sentinel,
                    &self.empty_slot_sentinel,
                ) {
                    return true;
                }
                // Another group touched the slot; re-ballot the same window.
                continue;
            }
            if saw_empty {
                return false;
            }
            iter.next();
            attempts += 1;
        }
        false
    }

    /// Number of slots matching `key` along the probe sequence.
    ///
    /// Scans past matches rather than stopping at the first, so containers
    /// that permit duplicates report true multiplicities.
    pub fn count(&self, key: &S::Key) -> u64 {
        let num_windows = self.storage.num_windows();
        let mut iter = self.probing_scheme.make_iter(key, num_windows);
        let mut attempts = 0;
        let mut matches = 0;
        while attempts < num_windows {
            let window = self.storage.window(iter.current());
            let mut saw_empty = false;
            for slot in window.iter() {
                let bits = slot.load_key();
                match self.predicate.equal_for_find(key, bits) {
                    EqualResult::Equal => matches += 1,
                    EqualResult::Empty => saw_empty = true,
                    _ => {}
                }
            }
            if saw_empty {
                return matches;
            }
            iter.next();
            attempts += 1;
        }
        matches
    }

    /// Visits the live contents of one window.
    pub fn for_each_filled_in_window(&self, window_index: usize, mut f: impl FnMut(S::Value)) {
        for slot in self.storage.window(window_index) {
            let bits = slot.load_key();
            if self.predicate.state_of(bits) == SlotState::Filled {
                f(slot.read_value(bits, &self.empty_slot_sentinel));
            }
        }
    }
}

/// Host-side engine: owns the storage, validates configuration, and
/// dispatches bulk operations onto streams.
///
/// Bulk mutators take `&mut self`: one bulk call is homogeneous (all
/// inserts or all erases), and mixing mutation kinds concurrently on one
/// container is undefined. Queries take `&self`.
pub struct OpenAddressingImpl<
    S: Slot,
    Scheme,
    KE,
    const WINDOW_SIZE: usize,
    const ALLOWS_DUPLICATES: bool = false,
> {
    storage: Arc<WindowStorage<S, WINDOW_SIZE>>,
    empty_slot_sentinel: S::Value,
    erased_key_sentinel: S::Key,
    predicate: KE,
    probing_scheme: Scheme,
}

impl<S, Scheme, KE, const W: usize, const DUP: bool> OpenAddressingImpl<S, Scheme, KE, W, DUP>
where
    S: Slot,
    Scheme: ProbingScheme<S::Key>,
    KE: KeyEqual<S::Key>,
{
    /// Constructs an engine whose erased sentinel equals the empty key
    /// sentinel. Erase is disabled for such containers.
    pub fn new(
        capacity: usize,
        empty_slot_sentinel: S::Value,
        predicate: KE,
        probing_scheme: Scheme,
        stream: &Stream,
    ) -> Result<Self> {
        let erased_key_sentinel = S::key_of(&empty_slot_sentinel);
        Self::new_internal(
            capacity,
            empty_slot_sentinel,
            erased_key_sentinel,
            predicate,
            probing_scheme,
            stream,
        )
    }

    /// Constructs an engine with a distinct erased key sentinel, enabling
    /// erase.
    pub fn with_erased_sentinel(
        capacity: usize,
        empty_slot_sentinel: S::Value,
        erased_key_sentinel: S::Key,
        predicate: KE,
        probing_scheme: Scheme,
        stream: &Stream,
    ) -> Result<Self> {
        if erased_key_sentinel.to_bits() == S::key_of(&empty_slot_sentinel).to_bits() {
            return Err(Error::EqualSentinels);
        }
        Self::new_internal(
            capacity,
            empty_slot_sentinel,
            erased_key_sentinel,
            predicate,
            probing_scheme,
            stream,
        )
    }

    /// Constructs an engine sized for `n` entries at the desired load
    /// factor.
    pub fn with_load_factor(
        n: usize,
        desired_load_factor: f64,
        empty_slot_sentinel: S::Value,
        predicate: KE,
        probing_scheme: Scheme,
        stream: &Stream,
    ) -> Result<Self> {
        if !(desired_load_factor > 0.0 && desired_load_factor <= 1.0) {
            return Err(Error::InvalidLoadFactor(desired_load_factor));
        }
        let requested = (n as f64 / desired_load_factor).ceil() as usize;
        let erased_key_sentinel = S::key_of(&empty_slot_sentinel);
        Self::new_internal(
            requested.max(1),
            empty_slot_sentinel,
            erased_key_sentinel,
            predicate,
            probing_scheme,
            stream,
        )
    }

    fn new_internal(
        capacity: usize,
        empty_slot_sentinel: S::Value,
        erased_key_sentinel: S::Key,
        predicate: KE,
        probing_scheme: Scheme,
        stream: &Stream,
    ) -> Result<Self> {
        let extent = make_window_extent(capacity, Scheme::CG_SIZE, W, Scheme::NEEDS_PRIME_EXTENT)?;
        let storage = Arc::new(WindowStorage::new(extent));
        let this = Self {
            storage,
            empty_slot_sentinel,
            erased_key_sentinel,
            predicate,
            probing_scheme,
        };
        // Sentinel initialization happens in stream order, before any probe
        // issued on the same stream can observe the storage.
        this.submit_fill(stream)?;
        Ok(this)
    }

    fn submit_fill(&self, stream: &Stream) -> Result<()> {
        self.storage_ref()
            .initialize_async(self.empty_slot_sentinel, stream)
    }

    /// Total slot capacity.
    pub fn capacity(&self) -> usize {
        self.storage.capacity()
    }

    /// The extent backing the current storage.
    pub fn extent(&self) -> Extent {
        self.storage.extent()
    }

    /// The sentinel stored in empty slots.
    pub fn empty_slot_sentinel(&self) -> S::Value {
        self.empty_slot_sentinel
    }

    /// The key half of the empty slot sentinel.
    pub fn empty_key_sentinel(&self) -> S::Key {
        S::key_of(&self.empty_slot_sentinel)
    }

    /// The reserved erased key.
    pub fn erased_key_sentinel(&self) -> S::Key {
        self.erased_key_sentinel
    }

    /// The user key-equality predicate.
    pub fn key_eq(&self) -> KE {
        self.predicate
    }

    /// The probing scheme.
    pub fn probing_scheme(&self) -> &Scheme {
        &self.probing_scheme
    }

    /// Non-owning handle to the current storage.
    pub fn storage_ref(&self) -> WindowStorageRef<S, W> {
        WindowStorageRef::new(Arc::clone(&self.storage))
    }

    /// Device-side handle for use in custom kernels.
    pub fn device_ref(&self) -> OpenAddressingRef<S, Scheme, KE, W, DUP> {
        OpenAddressingRef::new(
            self.storage_ref(),
            self.empty_slot_sentinel,
            self.erased_key_sentinel,
            EqualWrapper::new(
                self.empty_key_sentinel(),
                self.erased_key_sentinel,
                self.predicate,
            ),
            self.probing_scheme,
        )
    }

    /// Resets every slot to empty and blocks until done.
    pub fn clear(&mut self, stream: &Stream) -> Result<()> {
        self.clear_async(stream)?;
        stream.wait()
    }

    /// Resets every slot to empty in stream order, without blocking.
    pub fn clear_async(&mut self, stream: &Stream) -> Result<()> {
        self.submit_fill(stream)
    }

    fn insert_inner(
        &self,
        values: Arc<[S::Value]>,
        counter: Option<CounterRef>,
        stream: &Stream,
    ) -> Result<()> {
        let engine = self.device_ref();
        stream.submit(move || {
            (0..values.len()).into_par_iter().for_each(|i| {
                if engine.insert(values[i]) == InsertOutcome::Inserted {
                    if let Some(counter) = &counter {
                        counter.increment();
                    }
                }
            });
        })
    }

    /// Bulk-inserts `values` and returns how many were newly inserted.
    pub fn insert(&mut self, values: &[S::Value], stream: &Stream) -> Result<u64> {
        if values.is_empty() {
            return Ok(0);
        }
        let counter = CounterStorage::new();
        counter.reset(stream)?;
        self.insert_inner(Arc::from(values), Some(counter.counter_ref()), stream)?;
        counter.load_to_host(stream)
    }

    /// Bulk-inserts `values` without blocking or counting.
    pub fn insert_async(&mut self, values: &[S::Value], stream: &Stream) -> Result<()> {
        self.insert_inner(Arc::from(values), None, stream)
    }

    fn insert_if_inner<T, P>(
        &self,
        values: Arc<[S::Value]>,
        stencil: Arc<[T]>,
        predicate: P,
        counter: Option<CounterRef>,
        stream: &Stream,
    ) -> Result<()>
    where
        T: Copy + Send + Sync + 'static,
        P: Fn(&T) -> bool + Send + Sync + 'static,
    {
        if values.len() != stencil.len() {
            return Err(Error::LengthMismatch {
                input: values.len(),
                output: stencil.len(),
            });
        }
        let engine = self.device_ref();
        stream.submit(move || {
            (0..values.len()).into_par_iter().for_each(|i| {
                if predicate(&stencil[i]) && engine.insert(values[i]) == InsertOutcome::Inserted {
                    if let Some(counter) = &counter {
                        counter.increment();
                    }
                }
            });
        })
    }

    /// Bulk-inserts the values whose stencil element satisfies `predicate`;
    /// returns how many were newly inserted.
    pub fn insert_if<T, P>(
        &mut self,
        values: &[S::Value],
        stencil: &[T],
        predicate: P,
        stream: &Stream,
    ) -> Result<u64>
    where
        T: Copy + Send + Sync + 'static,
        P: Fn(&T) -> bool + Send + Sync + 'static,
    {
        if values.len() != stencil.len() {
            return Err(Error::LengthMismatch {
                input: values.len(),
                output: stencil.len(),
            });
        }
        if values.is_empty() {
            return Ok(0);
        }
        let counter = CounterStorage::new();
        counter.reset(stream)?;
        self.insert_if_inner(
            Arc::from(values),
            Arc::from(stencil),
            predicate,
            Some(counter.counter_ref()),
            stream,
        )?;
        counter.load_to_host(stream)
    }

    /// Stencil-filtered bulk insert without blocking or counting.
    pub fn insert_if_async<T, P>(
        &mut self,
        values: &[S::Value],
        stencil: &[T],
        predicate: P,
        stream: &Stream,
    ) -> Result<()>
    where
        T: Copy + Send + Sync + 'static,
        P: Fn(&T) -> bool + Send + Sync + 'static,
    {
        self.insert_if_inner(Arc::from(values), Arc::from(stencil), predicate, None, stream)
    }

    /// Bulk insert-or-find: for each input, writes the slot content that
    /// settled the query and whether this call inserted it.
    pub fn insert_and_find_async(
        &mut self,
        values: &[S::Value],
        out_values: &DeviceBuffer<S::Value>,
        out_inserted: &DeviceBuffer<bool>,
        stream: &Stream,
    ) -> Result<()> {
        if values.len() != out_values.len() {
            return Err(Error::LengthMismatch {
                input: values.len(),
                output: out_values.len(),
            });
        }
        if values.len() != out_inserted.len() {
            return Err(Error::LengthMismatch {
                input: values.len(),
                output: out_inserted.len(),
            });
        }
        let values: Arc<[S::Value]> = Arc::from(values);
        let engine = self.device_ref();
        let out_values = out_values.clone();
        let out_inserted = out_inserted.clone();
        stream.submit(move || {
            (0..values.len()).into_par_iter().for_each(|i| {
                let (value, inserted) = engine.insert_and_find(values[i]);
                // SAFETY: each task owns output index `i`; the host reads
                // only after a stream wait.
                unsafe {
                    out_values.write(i, value);
                    out_inserted.write(i, inserted);
                }
            });
        })
    }

    fn ensure_erase_enabled(&self) -> Result<()> {
        if self.erased_key_sentinel.to_bits() == self.empty_key_sentinel().to_bits() {
            return Err(Error::EraseDisabled);
        }
        Ok(())
    }

    fn erase_inner(
        &self,
        keys: Arc<[S::Key]>,
        counter: Option<CounterRef>,
        stream: &Stream,
    ) -> Result<()> {
        self.ensure_erase_enabled()?;
        let engine = self.device_ref();
        stream.submit(move || {
            (0..keys.len()).into_par_iter().for_each(|i| {
                if engine.erase(&keys[i]) {
                    if let Some(counter) = &counter {
                        counter.increment();
                    }
                }
            });
        })
    }

    /// Bulk-erases `keys` and returns how many entries were tombstoned.
    ///
    /// Requires a container constructed with a distinct erased sentinel.
    pub fn erase(&mut self, keys: &[S::Key], stream: &Stream) -> Result<u64> {
        self.ensure_erase_enabled()?;
        if keys.is_empty() {
            return Ok(0);
        }
        let counter = CounterStorage::new();
        counter.reset(stream)?;
        self.erase_inner(Arc::from(keys), Some(counter.counter_ref()), stream)?;
        counter.load_to_host(stream)
    }

    /// Bulk-erases `keys` without blocking or counting.
    pub fn erase_async(&mut self, keys: &[S::Key], stream: &Stream) -> Result<()> {
        self.erase_inner(Arc::from(keys), None, stream)
    }

    /// Bulk membership query into a device buffer, without blocking.
    pub fn contains_async(
        &self,
        keys: &[S::Key],
        output: &DeviceBuffer<bool>,
        stream: &Stream,
    ) -> Result<()> {
        if keys.len() != output.len() {
            return Err(Error::LengthMismatch {
                input: keys.len(),
                output: output.len(),
            });
        }
        let keys: Arc<[S::Key]> = Arc::from(keys);
        let engine = self.device_ref();
        let output = output.clone();
        stream.submit(move || {
            (0..keys.len()).into_par_iter().for_each(|i| {
                let hit = engine.contains(&keys[i]);
                // SAFETY: each task owns output index `i`; the host reads
                // only after a stream wait.
                unsafe { output.write(i, hit) };
            });
        })
    }

    /// Bulk membership query; blocks and fills `output`.
    pub fn contains(&self, keys: &[S::Key], output: &mut [bool], stream: &Stream) -> Result<()> {
        if keys.len() != output.len() {
            return Err(Error::LengthMismatch {
                input: keys.len(),
                output: output.len(),
            });
        }
        let buffer = DeviceBuffer::filled(false, keys.len());
        self.contains_async(keys, &buffer, stream)?;
        buffer.copy_to_host(output, stream)
    }

    /// Stencil-filtered membership query, without blocking. Filtered-out
    /// inputs report `false`.
    pub fn contains_if_async<T, P>(
        &self,
        keys: &[S::Key],
        stencil: &[T],
        predicate: P,
        output: &DeviceBuffer<bool>,
        stream: &Stream,
    ) -> Result<()>
    where
        T: Copy + Send + Sync + 'static,
        P: Fn(&T) -> bool + Send + Sync + 'static,
    {
        if keys.len() != stencil.len() {
            return Err(Error::LengthMismatch {
                input: keys.len(),
                output: stencil.len(),
            });
        }
        if keys.len() != output.len() {
            return Err(Error::LengthMismatch {
                input: keys.len(),
                output: output.len(),
            });
        }
        let keys: Arc<[S::Key]> = Arc::from(keys);
        let stencil: Arc<[T]> = Arc::from(stencil);
        let engine = self.device_ref();
        let output = output.clone();
        stream.submit(move || {
            (0..keys.len()).into_par_iter().for_each(|i| {
                let hit = predicate(&stencil[i]) && engine.contains(&keys[i]);
                // SAFETY: each task owns output index `i`.
                unsafe { output.write(i, hit) };
            });
        })
    }

    /// Stencil-filtered membership query; blocks and fills `output`.
    pub fn contains_if<T, P>(
        &self,
        keys: &[S::Key],
        stencil: &[T],
        predicate: P,
        output: &mut [bool],
        stream: &Stream,
    ) -> Result<()>
    where
        T: Copy + Send + Sync + 'static,
        P: Fn(&T) -> bool + Send + Sync + 'static,
    {
        if keys.len() != output.len() {
            return Err(Error::LengthMismatch {
                input: keys.len(),
                output: output.len(),
            });
        }
        let buffer = DeviceBuffer::filled(false, keys.len());
        self.contains_if_async(keys, stencil, predicate, &buffer, stream)?;
        buffer.copy_to_host(output, stream)
    }

    /// Bulk lookup with a projection applied to each query result before it
    /// is written to the output buffer.
    ///
    /// This is the primitive behind the typed `find` surfaces: the wrappers
    /// project a whole-slot result down to the shape their callers want.
    pub fn find_async_with<U, F>(
        &self,
        keys: &[S::Key],
        output: &DeviceBuffer<U>,
        project: F,
        stream: &Stream,
    ) -> Result<()>
    where
        U: Copy + Send + Sync + 'static,
        F: Fn(Option<S::Value>) -> U + Send + Sync + 'static,
    {
        if keys.len() != output.len() {
            return Err(Error::LengthMismatch {
                input: keys.len(),
                output: output.len(),
            });
        }
        let keys: Arc<[S::Key]> = Arc::from(keys);
        let engine = self.device_ref();
        let output = output.clone();
        stream.submit(move || {
            (0..keys.len()).into_par_iter().for_each(|i| {
                let result = project(engine.find(&keys[i]));
                // SAFETY: each task owns output index `i`.
                unsafe { output.write(i, result) };
            });
        })
    }

    /// Bulk lookup; misses report the empty slot sentinel.
    pub fn find_async(
        &self,
        keys: &[S::Key],
        output: &DeviceBuffer<S::Value>,
        stream: &Stream,
    ) -> Result<()> {
        let empty = self.empty_slot_sentinel;
        self.find_async_with(keys, output, move |found| found.unwrap_or(empty), stream)
    }

    /// Bulk lookup; blocks and fills `output`, with misses reporting the
    /// empty slot sentinel.
    pub fn find(&self, keys: &[S::Key], output: &mut [S::Value], stream: &Stream) -> Result<()> {
        if keys.len() != output.len() {
            return Err(Error::LengthMismatch {
                input: keys.len(),
                output: output.len(),
            });
        }
        let buffer = DeviceBuffer::filled(self.empty_slot_sentinel, keys.len());
        self.find_async(keys, &buffer, stream)?;
        buffer.copy_to_host(output, stream)
    }

    /// Total number of matches for `keys`.
    pub fn count(&self, keys: &[S::Key], stream: &Stream) -> Result<u64> {
        self.count_inner(keys, false, stream)
    }

    /// Like [`Self::count`], but inputs with no match contribute one each,
    /// the convention outer joins build on.
    pub fn count_outer(&self, keys: &[S::Key], stream: &Stream) -> Result<u64> {
        self.count_inner(keys, true, stream)
    }

    fn count_inner(&self, keys: &[S::Key], outer: bool, stream: &Stream) -> Result<u64> {
        if keys.is_empty() {
            return Ok(0);
        }
        let counter = CounterStorage::new();
        counter.reset(stream)?;
        let keys: Arc<[S::Key]> = Arc::from(keys);
        let engine = self.device_ref();
        let tally = counter.counter_ref();
        stream.submit(move || {
            (0..keys.len()).into_par_iter().for_each(|i| {
                let matches = engine.count(&keys[i]);
                if matches > 0 {
                    tally.add(matches);
                } else if outer {
                    tally.add(1);
                }
            });
        })?;
        counter.load_to_host(stream)
    }

    /// Number of filled slots, observed after a stream wait.
    pub fn size(&self, stream: &Stream) -> Result<usize> {
        let counter = CounterStorage::new();
        counter.reset(stream)?;
        let engine = self.device_ref();
        let tally = counter.counter_ref();
        stream.submit(move || {
            (0..engine.num_windows()).into_par_iter().for_each(|w| {
                let mut filled = 0;
                engine.for_each_filled_in_window(w, |_| filled += 1);
                if filled > 0 {
                    tally.add(filled);
                }
            });
        })?;
        Ok(counter.load_to_host(stream)? as usize)
    }

    /// Stream-compacts every filled slot into `output`, in no particular
    /// order, and returns how many elements were written.
    ///
    /// An output shorter than the live size truncates the result set.
    pub fn retrieve_all(&self, output: &mut [S::Value], stream: &Stream) -> Result<usize> {
        let cursor = CounterStorage::new();
        cursor.reset(stream)?;
        let buffer = DeviceBuffer::filled(self.empty_slot_sentinel, output.len());
        let engine = self.device_ref();
        let reserve = cursor.counter_ref();
        let sink = buffer.clone();
        let limit = output.len();
        stream.submit(move || {
            (0..engine.num_windows()).into_par_iter().for_each(|w| {
                engine.for_each_filled_in_window(w, |value| {
                    let at = reserve.add(1) as usize;
                    if at < limit {
                        // SAFETY: the cursor hands each task a distinct
                        // index; the host reads after a stream wait.
                        unsafe { sink.write(at, value) };
                    }
                });
            });
        })?;
        let written = (cursor.load_to_host(stream)? as usize).min(limit);
        let host = buffer.to_vec(stream)?;
        output[..written].copy_from_slice(&host[..written]);
        Ok(written)
    }

    /// Relocates every live entry into a fresh storage sized for
    /// `new_capacity` (or the current capacity when `None`), then blocks.
    ///
    /// The new capacity must accommodate all live entries.
    pub fn rehash(&mut self, new_capacity: Option<usize>, stream: &Stream) -> Result<()> {
        self.rehash_async(new_capacity, stream)?;
        stream.wait()
    }

    /// Relocates every live entry into a fresh storage in stream order,
    /// without blocking.
    ///
    /// The storage swap is immediate from the host's perspective; commands
    /// issued on `stream` afterwards observe the rehashed content, and the
    /// old storage stays alive until the relocation command retires.
    pub fn rehash_async(&mut self, new_capacity: Option<usize>, stream: &Stream) -> Result<()> {
        let requested = new_capacity.unwrap_or_else(|| self.capacity());
        let extent = make_window_extent(requested, Scheme::CG_SIZE, W, Scheme::NEEDS_PRIME_EXTENT)?;
        let new_storage = Arc::new(WindowStorage::new(extent));
        let old_storage = std::mem::replace(&mut self.storage, new_storage);

        let target = self.device_ref();
        let source = OpenAddressingRef::<S, Scheme, KE, W, DUP>::new(
            WindowStorageRef::new(old_storage),
            self.empty_slot_sentinel,
            self.erased_key_sentinel,
            EqualWrapper::new(
                self.empty_key_sentinel(),
                self.erased_key_sentinel,
                self.predicate,
            ),
            self.probing_scheme,
        );
        let empty = self.empty_slot_sentinel;
        stream.submit(move || {
            target.storage_ref().fill(&empty);
            (0..source.num_windows()).into_par_iter().for_each(|w| {
                source.for_each_filled_in_window(w, |value| {
                    let _ = target.insert(value);
                });
            });
        })
    }
}
