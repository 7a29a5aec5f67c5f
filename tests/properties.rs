//! Property tests over randomized key sets.
//!
//! Keys are drawn below `u32::MAX` so they can never collide with the
//! reserved sentinel values.

use proptest::collection::hash_set;
use proptest::prelude::*;

use lanemap::hash::FoldHash;
use lanemap::open_addressing::DefaultKeyEqual;
use lanemap::probing::LinearProbing;
use lanemap::{Pair, StaticMap, StaticSet, Stream};

const EMPTY_KEY: u64 = u64::MAX;
const EMPTY_VALUE: u64 = u64::MAX;
const ERASED_KEY: u64 = u64::MAX - 1;

type Probing = LinearProbing<u64, FoldHash<u64>>;

fn probing() -> Probing {
    LinearProbing::new(FoldHash::default())
}

fn new_set(capacity: usize, stream: &Stream) -> StaticSet<u64, Probing> {
    StaticSet::with_erased_sentinel(
        capacity,
        EMPTY_KEY,
        ERASED_KEY,
        DefaultKeyEqual,
        probing(),
        stream,
    )
    .unwrap()
}

fn new_map(capacity: usize, stream: &Stream) -> StaticMap<u64, u64, Probing> {
    StaticMap::with_erased_sentinel(
        capacity,
        EMPTY_KEY,
        EMPTY_VALUE,
        ERASED_KEY,
        DefaultKeyEqual,
        probing(),
        stream,
    )
    .unwrap()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// Inserting a set of distinct keys makes exactly those keys visible.
    #[test]
    fn insert_then_contains(keys in hash_set(0u64..u32::MAX as u64, 1..200)) {
        let stream = Stream::new().unwrap();
        let keys: Vec<u64> = keys.into_iter().collect();
        let mut set = new_set(keys.len() * 2, &stream);

        prop_assert_eq!(set.insert(&keys, &stream).unwrap(), keys.len() as u64);
        prop_assert_eq!(set.size(&stream).unwrap(), keys.len());

        let mut hits = vec![false; keys.len()];
        set.contains(&keys, &mut hits, &stream).unwrap();
        prop_assert!(hits.iter().all(|&hit| hit));

        // Keys shifted out of the inserted range are absent.
        let absent: Vec<u64> = keys.iter().map(|k| k + u32::MAX as u64).collect();
        let mut misses = vec![true; absent.len()];
        set.contains(&absent, &mut misses, &stream).unwrap();
        prop_assert!(misses.iter().all(|&hit| !hit));
    }

    /// Erasing half the keys removes exactly that half; re-inserting a
    /// fresh payload restores membership with the new value.
    #[test]
    fn erase_then_reinsert(keys in hash_set(0u64..u32::MAX as u64, 2..150)) {
        let stream = Stream::new().unwrap();
        let keys: Vec<u64> = keys.into_iter().collect();
        let mut map = new_map(keys.len() * 2, &stream);

        let pairs: Vec<Pair<u64, u64>> = keys.iter().map(|&k| Pair::new(k, k)).collect();
        map.insert(&pairs, &stream).unwrap();

        let half = keys.len() / 2;
        let erased = map.erase(&keys[..half], &stream).unwrap();
        prop_assert_eq!(erased, half as u64);
        prop_assert_eq!(map.size(&stream).unwrap(), keys.len() - half);

        let mut hits = vec![false; keys.len()];
        map.contains(&keys, &mut hits, &stream).unwrap();
        for (i, hit) in hits.iter().enumerate() {
            prop_assert_eq!(*hit, i >= half);
        }

        let reinsert: Vec<Pair<u64, u64>> =
            keys[..half].iter().map(|&k| Pair::new(k, k + 1)).collect();
        prop_assert_eq!(map.insert(&reinsert, &stream).unwrap(), half as u64);

        let mut values = vec![0u64; half];
        map.find(&keys[..half], &mut values, &stream).unwrap();
        for (i, &value) in values.iter().enumerate() {
            prop_assert_eq!(value, keys[i] + 1);
        }
    }

    /// The retrieved multiset equals the inserted multiset, and survives a
    /// rehash to any larger capacity.
    #[test]
    fn retrieve_all_and_rehash_round_trip(
        keys in hash_set(0u64..u32::MAX as u64, 1..150),
        grow in 1usize..4,
    ) {
        let stream = Stream::new().unwrap();
        let keys: Vec<u64> = keys.into_iter().collect();
        let mut set = new_set(keys.len() * 2, &stream);
        set.insert(&keys, &stream).unwrap();

        set.rehash(Some(keys.len() * 2 * grow), &stream).unwrap();
        prop_assert_eq!(set.size(&stream).unwrap(), keys.len());

        let mut output = vec![0u64; keys.len()];
        let written = set.retrieve_all(&mut output, &stream).unwrap();
        prop_assert_eq!(written, keys.len());

        let mut got = output;
        got.sort_unstable();
        let mut expected = keys.clone();
        expected.sort_unstable();
        prop_assert_eq!(got, expected);
    }

    /// `count` over a query range equals the sum of `contains` outcomes.
    #[test]
    fn count_matches_contains(
        keys in hash_set(0u64..u32::MAX as u64, 1..100),
        queries in proptest::collection::vec(0u64..u32::MAX as u64, 1..100),
    ) {
        let stream = Stream::new().unwrap();
        let keys: Vec<u64> = keys.into_iter().collect();
        let mut set = new_set(keys.len() * 2, &stream);
        set.insert(&keys, &stream).unwrap();

        let mut hits = vec![false; queries.len()];
        set.contains(&queries, &mut hits, &stream).unwrap();
        let expected: u64 = hits.iter().map(|&hit| hit as u64).sum();

        prop_assert_eq!(set.count(&queries, &stream).unwrap(), expected);
        prop_assert_eq!(
            set.count_outer(&queries, &stream).unwrap(),
            expected + hits.iter().filter(|&&hit| !hit).count() as u64
        );
    }
}
