//! Error types for the ordered set and the workload harness.
//!
//! The lock itself has no error type: acquiring it either succeeds or blocks.

use std::io;

use thiserror::Error;

/// Errors returned by [`OrderedSet`] operations.
///
/// [`OrderedSet`]: ../set/struct.OrderedSet.html
#[derive(Error, Debug, Copy, Clone, PartialEq, Eq)]
pub enum SetError {
    /// The allocator couldn't provide memory for a new node.
    #[error("failed to allocate a {size}-byte set node")]
    Alloc {
        /// Size of the node allocation that failed.
        size: usize,
    },
}

/// Invalid workload or demo configuration, rejected before anything runs.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// A thread count is outside `1..=MAX_THREADS`.
    #[error("thread count must be between 1 and {max}, got {got}")]
    ThreadCount {
        /// The rejected thread count.
        got: usize,
        /// The largest accepted thread count.
        max: usize,
    },

    /// A demo batch has neither readers nor writers.
    #[error("demo needs at least one reader or writer per iteration")]
    EmptyBatch,

    /// The key space is empty.
    #[error("key space must contain at least one key, got {0}")]
    EmptyKeySpace(i64),

    /// More distinct keys were requested up front than the key space holds.
    #[error("cannot seed {initial_size} distinct keys from a key space of {key_space}")]
    SeedTooLarge {
        /// Requested number of initial keys.
        initial_size: usize,
        /// Size of the key space.
        key_space: i64,
    },

    /// An operation mix fraction is outside `[0, 1]`, or the fractions don't add up to one.
    #[error("operation mix must be three fractions in [0, 1] summing to 1, got {contains}/{insert}/{remove}")]
    Mix {
        /// Fraction of membership tests.
        contains: f64,
        /// Fraction of inserts.
        insert: f64,
        /// Fraction of removals.
        remove: f64,
    },
}

/// Errors that abort a workload run.
#[derive(Error, Debug)]
pub enum WorkloadError {
    /// The configuration was rejected before the run started.
    #[error("invalid configuration")]
    Config(#[from] ConfigError),

    /// The OS refused to start a worker thread.
    #[error("failed to spawn worker thread {index}")]
    Spawn {
        /// Index of the worker that couldn't be started.
        index: usize,
        /// The underlying OS error.
        source: io::Error,
    },

    /// A set operation failed, either while seeding or inside a worker.
    #[error("set operation failed")]
    Set(#[from] SetError),

    /// Seeding ran out of draws before finding enough distinct keys.
    #[error("seeding gave up after inserting {inserted} of {wanted} keys")]
    SeedExhausted {
        /// Number of distinct keys inserted before giving up.
        inserted: usize,
        /// Number of distinct keys requested.
        wanted: usize,
    },

    /// A worker thread panicked.
    #[error("worker thread {index} panicked")]
    WorkerPanicked {
        /// Index of the worker that panicked.
        index: usize,
    },
}
