//! Window storage and the extent policy.
//!
//! Storage is an array of windows, each `WINDOW_SIZE` contiguous slots; one
//! probing attempt examines one whole window. The host side owns the array
//! through [`WindowStorage`]; device tasks receive the non-owning
//! [`WindowStorageRef`], whose reference count keeps a replaced storage
//! alive until in-flight commands retire.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use rayon::prelude::*;

use crate::device::Stream;
use crate::error::{Error, Result};
use crate::slot::Slot;

/// Window sizes the probe loops are generated for.
pub const SUPPORTED_WINDOW_SIZES: &[usize] = &[1, 2, 4, 8];

/// Storage capacity in slots, always a whole number of windows.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Extent {
    value: usize,
}

impl Extent {
    /// Creates an extent with the given slot count.
    pub const fn new(value: usize) -> Self {
        Self { value }
    }

    /// Slot count.
    pub const fn value(&self) -> usize {
        self.value
    }
}

fn is_prime(n: usize) -> bool {
    if n < 2 {
        return false;
    }
    if n % 2 == 0 {
        return n == 2;
    }
    if n % 3 == 0 {
        return n == 3;
    }
    let mut d = 5;
    while d * d <= n {
        if n % d == 0 || n % (d + 2) == 0 {
            return false;
        }
        d += 6;
    }
    true
}

/// Smallest prime greater than or equal to `n`.
fn next_prime_at_least(n: usize) -> usize {
    let mut candidate = n.max(2);
    while !is_prime(candidate) {
        candidate += 1;
    }
    candidate
}

/// Computes the storage extent for a requested lower-bound capacity.
///
/// The window count is rounded up to a multiple of the cooperative group
/// size. Schemes that need it instead get a prime window count, so that
/// every double-hashing stride in `[1, windows)` is coprime with the extent
/// and the probe sequence is a full permutation.
pub fn make_window_extent(
    requested: usize,
    cg_size: usize,
    window_size: usize,
    needs_prime: bool,
) -> Result<Extent> {
    if !SUPPORTED_WINDOW_SIZES.contains(&window_size) {
        return Err(Error::InvalidWindowSize(window_size));
    }
    if requested == 0 {
        return Err(Error::ZeroCapacity);
    }
    let num_windows = requested.div_ceil(window_size);
    let num_windows = if needs_prime {
        next_prime_at_least(num_windows)
    } else {
        let cg = cg_size.max(1);
        num_windows.div_ceil(cg) * cg
    };
    Ok(Extent::new(num_windows * window_size))
}

/// Owned slot array: `num_windows()` windows of `WINDOW_SIZE` slots each.
pub struct WindowStorage<S, const WINDOW_SIZE: usize> {
    extent: Extent,
    slots: Box<[S]>,
}

impl<S: Slot, const WINDOW_SIZE: usize> WindowStorage<S, WINDOW_SIZE> {
    /// Allocates vacant (all-zero) cells for `extent` slots.
    ///
    /// The cells hold the zero bit pattern, not the empty sentinel, until
    /// [`WindowStorage::fill`] runs; constructors stamp the sentinel in
    /// stream order before any probe is issued.
    pub fn new(extent: Extent) -> Self {
        let slots = (0..extent.value()).map(|_| S::vacant()).collect();
        Self { extent, slots }
    }

    /// Total slot capacity.
    pub const fn capacity(&self) -> usize {
        self.extent.value()
    }

    /// The extent backing this storage.
    pub const fn extent(&self) -> Extent {
        self.extent
    }

    /// Number of windows.
    pub const fn num_windows(&self) -> usize {
        self.extent.value() / WINDOW_SIZE
    }

    /// The slots of one window.
    pub fn window(&self, window_index: usize) -> &[S] {
        &self.slots[window_index * WINDOW_SIZE..window_index * WINDOW_SIZE + WINDOW_SIZE]
    }

    /// All slots in storage order.
    pub fn slots(&self) -> &[S] {
        &self.slots
    }

    /// Rewrites every slot with the empty sentinel, fanning the writes out
    /// across the lane pool. Callers serialize this against probes through
    /// stream ordering.
    pub fn fill(&self, empty: &S::Value) {
        self.slots.par_iter().for_each(|slot| slot.reset(empty));
    }
}

/// Non-owning storage handle passed by value into device tasks.
pub struct WindowStorageRef<S, const WINDOW_SIZE: usize> {
    storage: Arc<WindowStorage<S, WINDOW_SIZE>>,
}

impl<S, const WINDOW_SIZE: usize> Clone for WindowStorageRef<S, WINDOW_SIZE> {
    fn clone(&self) -> Self {
        Self {
            storage: Arc::clone(&self.storage),
        }
    }
}

impl<S: Slot, const WINDOW_SIZE: usize> WindowStorageRef<S, WINDOW_SIZE> {
    /// Wraps a shared storage handle.
    pub fn new(storage: Arc<WindowStorage<S, WINDOW_SIZE>>) -> Self {
        Self { storage }
    }

    /// Total slot capacity.
    pub fn capacity(&self) -> usize {
        self.storage.capacity()
    }

    /// The extent backing this storage.
    pub fn extent(&self) -> Extent {
        self.storage.extent()
    }

    /// Number of windows.
    pub fn num_windows(&self) -> usize {
        self.storage.num_windows()
    }

    /// The slots of one window.
    pub fn window(&self, window_index: usize) -> &[S] {
        self.storage.window(window_index)
    }

    /// Rewrites every slot with the empty sentinel.
    pub fn fill(&self, empty: &S::Value) {
        self.storage.fill(empty);
    }

    /// Stamps the empty sentinel over every slot in stream order.
    ///
    /// Commands issued afterwards on `stream` observe fully initialized
    /// storage; other streams must synchronize explicitly.
    pub fn initialize_async(&self, empty: S::Value, stream: &Stream) -> Result<()> {
        let storage = self.clone();
        stream.submit(move || storage.fill(&empty))
    }
}

/// Device-resident 64-bit counter for bulk-operation tallies.
///
/// A fresh counter reads zero. `reset` re-zeroes it in stream order;
/// `load_to_host` performs the stream-synchronizing read the synchronous
/// bulk operations return their counts through.
#[derive(Default)]
pub struct CounterStorage {
    cell: Arc<AtomicU64>,
}

impl CounterStorage {
    /// Allocates a zeroed counter.
    pub fn new() -> Self {
        Self::default()
    }

    /// Zeroes the counter in stream order.
    pub fn reset(&self, stream: &Stream) -> Result<()> {
        let cell = self.counter_ref();
        stream.submit(move || cell.set(0))
    }

    /// Stream-synchronizing read of the tally.
    pub fn load_to_host(&self, stream: &Stream) -> Result<u64> {
        stream.wait()?;
        Ok(self.cell.load(Ordering::Acquire))
    }

    /// Handle usable from device tasks.
    pub fn counter_ref(&self) -> CounterRef {
        CounterRef {
            cell: Arc::clone(&self.cell),
        }
    }
}

/// Device-side counter handle.
#[derive(Clone)]
pub struct CounterRef {
    cell: Arc<AtomicU64>,
}

impl CounterRef {
    /// Adds `n` and returns the previous value. Relaxed ordering: the host
    /// reads the tally only after a stream wait.
    #[inline]
    pub fn add(&self, n: u64) -> u64 {
        self.cell.fetch_add(n, Ordering::Relaxed)
    }

    /// Increments by one.
    #[inline]
    pub fn increment(&self) {
        self.add(1);
    }

    /// Overwrites the tally.
    #[inline]
    pub fn set(&self, value: u64) {
        self.cell.store(value, Ordering::Release);
    }
}
