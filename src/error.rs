//! Error taxonomy for host-facing operations.
//!
//! Configuration errors are returned synchronously by the offending call.
//! Backend errors surface at the next command submission or stream wait.
//! Nothing is absorbed silently; retries happen only inside the per-slot
//! CAS loops and are invisible to callers.

use thiserror::Error;

/// Errors reported by container construction and bulk dispatch.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
    /// The desired load factor is outside `(0, 1]`.
    #[error("load factor must be in (0, 1], got {0}")]
    InvalidLoadFactor(f64),

    /// The empty key sentinel and the erased key sentinel are the same
    /// value, which makes tombstones indistinguishable from free slots.
    #[error("the empty key sentinel and erased key sentinel cannot be the same value")]
    EqualSentinels,

    /// The window size is not one of the supported values.
    #[error("window size must be one of 1, 2, 4, 8, got {0}")]
    InvalidWindowSize(usize),

    /// A container cannot be built with zero capacity.
    #[error("requested capacity must be non-zero")]
    ZeroCapacity,

    /// An erase was requested on a container constructed without a
    /// distinct erased key sentinel.
    #[error("erase requires a container constructed with a distinct erased key sentinel")]
    EraseDisabled,

    /// Paired input and output ranges disagree in length.
    #[error("input length {input} does not match output length {output}")]
    LengthMismatch {
        /// Number of input elements.
        input: usize,
        /// Number of output elements.
        output: usize,
    },

    /// The stream worker is no longer running, typically because an
    /// earlier command panicked.
    #[error("stream worker is no longer running")]
    StreamClosed,

    /// Failure reported by the execution backend, with the underlying
    /// cause preserved.
    #[error("device backend failure: {0}")]
    Backend(String),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = core::result::Result<T, Error>;
