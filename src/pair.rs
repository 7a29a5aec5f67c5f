//! Key/payload pair stored in map-mode slots.

/// A trivially copyable key/payload pair.
///
/// The layout matches a plain two-field C struct, so a pair can be viewed
/// as a key half followed by a payload half by the slot protocol.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct Pair<First, Second> {
    /// First element, the key half in map mode.
    pub first: First,
    /// Second element, the payload half in map mode.
    pub second: Second,
}

impl<First, Second> Pair<First, Second> {
    /// Constructs a pair from its two elements.
    pub const fn new(first: First, second: Second) -> Self {
        Self { first, second }
    }
}

impl<First, Second> From<(First, Second)> for Pair<First, Second> {
    fn from((first, second): (First, Second)) -> Self {
        Self { first, second }
    }
}

impl<First, Second> From<Pair<First, Second>> for (First, Second) {
    fn from(pair: Pair<First, Second>) -> Self {
        (pair.first, pair.second)
    }
}
