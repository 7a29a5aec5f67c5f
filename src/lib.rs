//! Massively parallel, fixed-capacity open-addressing containers.
//!
//! `lanemap` provides [`StaticMap`] and [`StaticSet`]: associative
//! containers built for bulk operation over large key or key/payload
//! ranges. Work is issued as commands on a FIFO [`Stream`] and executed by
//! a pool of lanes; each logical query runs as one cooperative group that
//! examines a whole window of slots per probing attempt and elects a lane
//! to perform the atomic transition. All synchronization happens through
//! per-slot atomic words, so queries and same-kind mutations are lock-free
//! under arbitrary contention.
//!
//! Capacity is fixed at construction; callers pre-size (optionally through
//! a load factor) or relocate explicitly with `rehash`. Deletion uses
//! sentinel tombstones: erased slots are transparent to queries and
//! reusable by inserts, so no entry ever shifts.
//!
//! # Ordering model
//!
//! Commands on one stream execute in issue order, and a reader issued
//! after a writer on the same stream sees the writer's effects. Distinct
//! streams are unordered until explicitly synchronized with
//! [`Stream::wait`]. Within a single bulk call the only guarantee is the
//! insertion race itself: of two concurrent inserts of the same new key,
//! exactly one reports it as inserted. Mixing inserts and erases in one
//! bulk call is undefined.
//!
//! # Example
//!
//! ```
//! use lanemap::hash::IdentityHash;
//! use lanemap::open_addressing::DefaultKeyEqual;
//! use lanemap::probing::LinearProbing;
//! use lanemap::{Pair, StaticMap, Stream};
//!
//! # fn main() -> lanemap::Result<()> {
//! let stream = Stream::new()?;
//! let probing = LinearProbing::<u64, IdentityHash<u64>>::new(IdentityHash::new());
//! let mut map: StaticMap<u64, u64, _> =
//!     StaticMap::new(1024, u64::MAX, u64::MAX, DefaultKeyEqual, probing, &stream)?;
//!
//! let pairs: Vec<Pair<u64, u64>> = (0..100).map(|k| Pair::new(k, k * 10)).collect();
//! assert_eq!(map.insert(&pairs, &stream)?, 100);
//!
//! let mut found = vec![0u64; 2];
//! map.find(&[42, 1000], &mut found, &stream)?;
//! assert_eq!(found, [420, u64::MAX]);
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

pub mod device;
pub mod error;
pub mod hash;
pub mod open_addressing;
pub mod pair;
pub mod probing;
pub mod slot;
pub mod static_map;
pub mod static_set;
pub mod storage;

pub use device::{DeviceBuffer, Stream};
pub use error::{Error, Result};
pub use pair::Pair;
pub use static_map::StaticMap;
pub use static_set::StaticSet;
