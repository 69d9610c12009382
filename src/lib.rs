//! A reader-writer lock with a selectable fairness policy, and a contention benchmark built on
//! top of it.
//!
//! This library contains the following pieces:
//!
//! * [`RawRwLock`], a reader-writer lock made from a `Mutex` and two `Condvar`s, which either lets
//!   readers in whenever no writer is active ([`Policy::ReaderPreference`]) or holds new readers
//!   back as soon as a writer is waiting ([`Policy::WriterPreference`]). [`RwLock`] wraps one
//!   around a value and hands out scope-based guards.
//! * [`OrderedSet`], a sorted singly linked set of integer keys with no synchronization of its
//!   own, meant to be shared through an `RwLock`.
//! * [`Workload`], a harness that seeds an `OrderedSet`, runs a pool of threads doing a random
//!   mix of membership tests, inserts and removals against it, and counts what they did.
//! * [`run_demo`], a bare reader/writer demo that measures how long each side waits for the lock
//!   under either policy.
//!
//! [`RawRwLock`]: rwlock/struct.RawRwLock.html
//! [`Policy::ReaderPreference`]: rwlock/enum.Policy.html#variant.ReaderPreference
//! [`Policy::WriterPreference`]: rwlock/enum.Policy.html#variant.WriterPreference
//! [`RwLock`]: rwlock/struct.RwLock.html
//! [`OrderedSet`]: set/struct.OrderedSet.html
//! [`Workload`]: workload/struct.Workload.html
//! [`run_demo`]: demo/fn.run_demo.html

#![deny(missing_docs)]

pub mod demo;
pub mod error;
pub mod rwlock;
pub mod set;
pub mod workload;

mod util;

pub use crate::demo::{run_demo, DemoConfig, DemoReport, WaitStats};
pub use crate::error::{ConfigError, SetError, WorkloadError};
pub use crate::rwlock::{LockState, Policy, RawRwLock, RwLock, RwLockReadGuard, RwLockWriteGuard};
pub use crate::set::OrderedSet;
pub use crate::workload::{
    OpCounts, OpKind, OpMix, Workload, WorkloadConfig, WorkloadReport, MAX_THREADS,
};
