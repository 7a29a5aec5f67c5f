//! Slot storage cells and the single-slot atomic protocol.
//!
//! A slot holds either a key alone (set mode, [`KeySlot`]) or a key/payload
//! pair (map mode, [`PairSlot`]). Every cell is built from 64-bit atomic
//! words. `KeySlot` packs the whole slot into one word and resolves insert
//! races with a single compare-and-swap. `PairSlot` splits the slot into a
//! key word and a payload word; the key word is the synchronization word:
//! it is claimed by CAS on insert, cleared first on erase, and a reader
//! that has observed a filled key is guaranteed to observe its payload.

use core::fmt;
use core::marker::PhantomData;
use core::sync::atomic::{AtomicU64, Ordering};

use crate::pair::Pair;

/// Conversion between a key or payload and the 64-bit word that stores it.
///
/// Implementations must be injective: distinct values produce distinct
/// words. Only types at most 8 bytes wide can satisfy this, which is how
/// the key-width and payload-width preconditions are enforced at the type
/// level.
pub trait Bits: Copy + Eq + fmt::Debug + Send + Sync + 'static {
    /// The stored word for this value.
    fn to_bits(self) -> u64;
    /// Reconstructs a value from its stored word.
    fn from_bits(bits: u64) -> Self;
}

macro_rules! impl_bits {
    ($($t:ty),* $(,)?) => {
        $(
            impl Bits for $t {
                #[inline]
                fn to_bits(self) -> u64 {
                    self as u64
                }

                #[inline]
                fn from_bits(bits: u64) -> Self {
                    bits as $t
                }
            }
        )*
    };
}

impl_bits!(u8, u16, u32, u64, usize, i8, i16, i32, i64, isize);

/// Classification of a slot against the reserved sentinels.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SlotState {
    /// Never written, or reset by clear/rehash. Terminates query probes.
    Empty,
    /// Tombstoned by an erase. Transparent to queries, reusable by inserts.
    Erased,
    /// Holds a live entry.
    Filled,
}

/// Classifies an observed key word against the reserved sentinel words.
///
/// Sentinel comparison is strictly bitwise; user key equality never applies
/// to sentinels.
#[inline]
pub fn classify(bits: u64, empty_key: u64, erased_key: u64) -> SlotState {
    if bits == empty_key {
        SlotState::Empty
    } else if bits == erased_key {
        SlotState::Erased
    } else {
        SlotState::Filled
    }
}

/// A storage cell holding one slot, with the atomic transitions the probe
/// loops rely on.
///
/// The legal transitions are `Empty -> Filled` (insert), `Erased -> Filled`
/// (insert reusing a tombstone), and `Filled -> Erased` (erase). A filled
/// slot is never overwritten in place; the only way back to `Empty` is
/// [`Slot::reset`], used by clear and by storage initialization.
pub trait Slot: Send + Sync + 'static {
    /// Key portion type.
    type Key: Bits;
    /// Full slot content: the key alone, or a key/payload pair.
    type Value: Copy + PartialEq + fmt::Debug + Send + Sync + 'static;

    /// A cell with an all-zero bit pattern. Storage allocates vacant cells
    /// and stamps the empty sentinel over them in stream order.
    fn vacant() -> Self;

    /// Extracts the key portion of a slot value.
    fn key_of(value: &Self::Value) -> Self::Key;

    /// Atomically loads the key word (acquire).
    fn load_key(&self) -> u64;

    /// Reconstructs the slot value behind an observed filled key word.
    fn read_value(&self, observed_key: u64, empty: &Self::Value) -> Self::Value;

    /// Attempts to claim the slot: CAS the key word from `expected` (an
    /// empty or erased observation) to the key of `value`, then publish
    /// the payload. Returns `false` when another lane won the word.
    fn try_insert(&self, expected: u64, value: &Self::Value) -> bool;

    /// Attempts to tombstone the slot: CAS the key word from `expected` to
    /// the erased sentinel, then retire the payload.
    fn try_erase(&self, expected: u64, erased_key: Self::Key, empty: &Self::Value) -> bool;

    /// Unconditionally rewrites the cell with the empty sentinel.
    ///
    /// Only valid when no probe can race the write, which bulk dispatch
    /// guarantees through stream ordering.
    fn reset(&self, empty: &Self::Value);
}

/// Set-mode cell: the entire slot is one atomic word.
#[repr(C)]
pub struct KeySlot<K> {
    word: AtomicU64,
    _marker: PhantomData<K>,
}

impl<K: Bits> Slot for KeySlot<K> {
    type Key = K;
    type Value = K;

    fn vacant() -> Self {
        Self {
            word: AtomicU64::new(0),
            _marker: PhantomData,
        }
    }

    #[inline]
    fn key_of(value: &K) -> K {
        *value
    }

    #[inline]
    fn load_key(&self) -> u64 {
        self.word.load(Ordering::Acquire)
    }

    #[inline]
    fn read_value(&self, observed_key: u64, _empty: &K) -> K {
        K::from_bits(observed_key)
    }

    #[inline]
    fn try_insert(&self, expected: u64, value: &K) -> bool {
        self.word
            .compare_exchange(expected, value.to_bits(), Ordering::AcqRel, Ordering::Relaxed)
            .is_ok()
    }

    #[inline]
    fn try_erase(&self, expected: u64, erased_key: K, _empty: &K) -> bool {
        self.word
            .compare_exchange(expected, erased_key.to_bits(), Ordering::AcqRel, Ordering::Relaxed)
            .is_ok()
    }

    #[inline]
    fn reset(&self, empty: &K) {
        self.word.store(empty.to_bits(), Ordering::Release);
    }
}

/// Map-mode cell: a key word plus a payload word.
///
/// The key word is the synchronization word. Insert claims it with a CAS
/// and then publishes the payload with release ordering; erase rewrites the
/// key word to the erased sentinel first and resets the payload afterwards.
/// The payload half of the empty slot sentinel is reserved: a reader that
/// sees a filled key but a still-empty payload knows the publishing store
/// is in flight and spins it out.
#[repr(C)]
pub struct PairSlot<K, V> {
    key: AtomicU64,
    payload: AtomicU64,
    _marker: PhantomData<(K, V)>,
}

impl<K: Bits, V: Bits> Slot for PairSlot<K, V> {
    type Key = K;
    type Value = Pair<K, V>;

    fn vacant() -> Self {
        Self {
            key: AtomicU64::new(0),
            payload: AtomicU64::new(0),
            _marker: PhantomData,
        }
    }

    #[inline]
    fn key_of(value: &Pair<K, V>) -> K {
        value.first
    }

    #[inline]
    fn load_key(&self) -> u64 {
        self.key.load(Ordering::Acquire)
    }

    #[inline]
    fn read_value(&self, observed_key: u64, empty: &Pair<K, V>) -> Pair<K, V> {
        let empty_payload = empty.second.to_bits();
        let mut payload = self.payload.load(Ordering::Acquire);
        while payload == empty_payload {
            // The claiming lane publishes the payload right after winning
            // the key word; an empty payload here means that store is still
            // in flight. A changed key word means the slot was republished
            // underneath us, in which case the caller's regime is already
            // outside the supported ordering and we stop spinning.
            if self.key.load(Ordering::Acquire) != observed_key {
                break;
            }
            core::hint::spin_loop();
            payload = self.payload.load(Ordering::Acquire);
        }
        Pair::new(K::from_bits(observed_key), V::from_bits(payload))
    }

    #[inline]
    fn try_insert(&self, expected: u64, value: &Pair<K, V>) -> bool {
        if self
            .key
            .compare_exchange(
                expected,
                value.first.to_bits(),
                Ordering::AcqRel,
                Ordering::Relaxed,
            )
            .is_err()
        {
            return false;
        }
        self.payload.store(value.second.to_bits(), Ordering::Release);
        true
    }

    #[inline]
    fn try_erase(&self, expected: u64, erased_key: K, empty: &Pair<K, V>) -> bool {
        if self
            .key
            .compare_exchange(
                expected,
                erased_key.to_bits(),
                Ordering::AcqRel,
                Ordering::Relaxed,
            )
            .is_err()
        {
            return false;
        }
        self.payload.store(empty.second.to_bits(), Ordering::Release);
        true
    }

    #[inline]
    fn reset(&self, empty: &Pair<K, V>) {
        self.payload.store(empty.second.to_bits(), Ordering::Relaxed);
        self.key.store(empty.first.to_bits(), Ordering::Release);
    }
}
