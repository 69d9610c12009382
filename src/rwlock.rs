//! A reader-writer lock built from a `Mutex` and a pair of `Condvar`s, with a fairness policy
//! chosen at construction.
//!
//! The primary types in this module are [`RawRwLock`], which is the bare lock state machine with
//! explicit acquire/release pairs, and [`RwLock`], which pairs a `RawRwLock` with the data it
//! protects and hands out scope-based guards. See the documentation on those types for further
//! information.
//!
//! [`RawRwLock`]: struct.RawRwLock.html
//! [`RwLock`]: struct.RwLock.html

use std::cell::UnsafeCell;
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::{Condvar, Mutex};

use crate::util;

/// Determines which side of a [`RawRwLock`] gets let in first when both readers and writers are
/// lined up.
///
/// [`RawRwLock`]: struct.RawRwLock.html
#[derive(Debug, PartialEq, Eq, Copy, Clone, Default)]
pub enum Policy {
    /// New readers are only turned away by an *active* writer.
    ///
    /// This allows the most read concurrency, but a steady stream of readers can keep a waiting
    /// writer out forever.
    ReaderPreference,
    /// New readers are turned away as soon as any writer is waiting.
    ///
    /// A writer only has to wait for the readers that were already inside when it arrived, at
    /// the cost of some reader throughput.
    #[default]
    WriterPreference,
}

impl Policy {
    /// Returns whether this policy holds back new readers while a writer is waiting.
    pub fn prefers_writers(self) -> bool {
        self == Policy::WriterPreference
    }
}

impl fmt::Display for Policy {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Policy::ReaderPreference => f.write_str("reader-preference"),
            Policy::WriterPreference => f.write_str("writer-preference"),
        }
    }
}

/// A snapshot of the bookkeeping inside a [`RawRwLock`].
///
/// The only reachable shapes are idle (no readers, no writer), reading (one or more readers, no
/// writer) and writing (no readers, one writer). Any number of writers may be waiting in any of
/// them.
///
/// [`RawRwLock`]: struct.RawRwLock.html
#[derive(Debug, PartialEq, Eq, Copy, Clone, Default)]
pub struct LockState {
    /// Number of readers currently inside the lock.
    pub readers: usize,
    /// Whether a writer is currently inside the lock.
    pub writer: bool,
    /// Number of writers blocked in `acquire_write`.
    pub waiting_writers: usize,
}

impl LockState {
    /// Returns whether nobody holds the lock.
    pub fn is_idle(&self) -> bool {
        self.readers == 0 && !self.writer
    }

    fn admits_reader(&self, policy: Policy) -> bool {
        !self.writer && !(policy.prefers_writers() && self.waiting_writers > 0)
    }

    fn admits_writer(&self) -> bool {
        !self.writer && self.readers == 0
    }
}

/// A reader-writer lock that admits many concurrent readers or a single writer, never both.
///
/// `RawRwLock` doesn't own the data it protects. It is the state machine alone: an active reader
/// count, an active writer flag and a waiting writer count, all kept behind one `std::sync::Mutex`,
/// with one `Condvar` for blocked readers and another for blocked writers. Callers pair every
/// `acquire_read` with a `release_read` and every `acquire_write` with a `release_write`. For
/// guard-based access to a protected value, use [`RwLock`] instead.
///
/// The [`Policy`] given to `new` decides what a new reader has to wait for:
///
/// * With `Policy::ReaderPreference` (or `RawRwLock::reader_preference()`), a reader only waits
///   while a writer is active.
/// * With `Policy::WriterPreference` (or `RawRwLock::writer_preference()`), a reader also waits
///   while any writer is waiting, so a writer is only ever held up by the readers that were
///   already inside when it showed up.
///
/// Every wait is indefinite. There is no timeout, and acquiring the lock can't fail.
///
/// [`RwLock`]: struct.RwLock.html
/// [`Policy`]: enum.Policy.html
///
/// # Example
///
/// ```
/// use rwfair::RawRwLock;
/// use std::sync::Arc;
/// use std::thread;
///
/// let lock = Arc::new(RawRwLock::writer_preference());
///
/// lock.acquire_read();
/// lock.acquire_read();
/// assert_eq!(lock.state().readers, 2);
///
/// let writer = {
///     let lock = lock.clone();
///     thread::spawn(move || {
///         // blocks until both readers are gone
///         lock.acquire_write();
///         lock.release_write();
///     })
/// };
///
/// lock.release_read();
/// lock.release_read();
/// writer.join().unwrap();
///
/// assert!(lock.state().is_idle());
/// ```
#[derive(Debug)]
pub struct RawRwLock {
    policy: Policy,
    state: Mutex<LockState>,
    read_cond: Condvar,
    write_cond: Condvar,
}

impl RawRwLock {
    /// Creates a new, idle `RawRwLock` with the given fairness policy.
    pub fn new(policy: Policy) -> RawRwLock {
        RawRwLock {
            policy: policy,
            state: Mutex::new(LockState::default()),
            read_cond: Condvar::new(),
            write_cond: Condvar::new(),
        }
    }

    /// Creates a new `RawRwLock` that lets readers in whenever no writer is active.
    pub fn reader_preference() -> RawRwLock {
        RawRwLock::new(Policy::ReaderPreference)
    }

    /// Creates a new `RawRwLock` that holds back new readers while a writer is waiting.
    pub fn writer_preference() -> RawRwLock {
        RawRwLock::new(Policy::WriterPreference)
    }

    /// Returns the fairness policy this lock was created with.
    pub fn policy(&self) -> Policy {
        self.policy
    }

    /// Returns a copy of the lock's current bookkeeping.
    ///
    /// The snapshot may be stale as soon as this returns, so it's only useful for
    /// instrumentation and tests.
    pub fn state(&self) -> LockState {
        *util::guts(self.state.lock())
    }

    /// Blocks the current thread until it can enter the lock as a reader.
    ///
    /// A reader is held back while a writer is active. Under `Policy::WriterPreference` it is
    /// also held back while any writer is waiting.
    pub fn acquire_read(&self) {
        let policy = self.policy;
        let state = util::guts(self.state.lock());
        let mut state = util::wait_while(&self.read_cond, state, |s| !s.admits_reader(policy));

        state.readers += 1;
    }

    /// Leaves the lock as a reader. The last reader out wakes up one waiting writer.
    ///
    /// # Panics
    ///
    /// Panics if no reader is currently inside the lock.
    pub fn release_read(&self) {
        let mut state = util::guts(self.state.lock());

        assert!(state.readers > 0, "release_read called with no active readers");
        state.readers -= 1;

        if state.readers == 0 {
            self.write_cond.notify_one();
        }
    }

    /// Blocks the current thread until it can enter the lock as the only writer.
    ///
    /// The writer is counted as waiting for as long as it is blocked here, which is what
    /// `Policy::WriterPreference` uses to hold back new readers.
    pub fn acquire_write(&self) {
        let mut state = util::guts(self.state.lock());
        state.waiting_writers += 1;

        let mut state = util::wait_while(&self.write_cond, state, |s| !s.admits_writer());

        state.waiting_writers -= 1;
        state.writer = true;
    }

    /// Leaves the lock as the writer.
    ///
    /// If another writer is waiting, exactly one of them is woken. Otherwise every waiting reader
    /// is woken. Under `Policy::ReaderPreference` the waiting readers are woken either way, since
    /// a waiting writer doesn't hold them back under that policy.
    ///
    /// # Panics
    ///
    /// Panics if no writer is currently inside the lock.
    pub fn release_write(&self) {
        let mut state = util::guts(self.state.lock());

        assert!(state.writer, "release_write called with no active writer");
        state.writer = false;

        if state.waiting_writers > 0 {
            self.write_cond.notify_one();
            if !self.policy.prefers_writers() {
                self.read_cond.notify_all();
            }
        } else {
            self.read_cond.notify_all();
        }
    }
}

impl Default for RawRwLock {
    fn default() -> RawRwLock {
        RawRwLock::new(Policy::default())
    }
}

/// A [`RawRwLock`] bundled with the value it protects.
///
/// The value itself doesn't need to do any synchronization of its own. `read` hands out a guard
/// that dereferences to `&T` and `write` hands out one that dereferences to `&mut T`, so the only
/// way to reach the value from several threads is while holding the lock in the matching mode.
/// The lock is released when the guard drops.
///
/// [`RawRwLock`]: struct.RawRwLock.html
///
/// # Example
///
/// ```
/// use rwfair::{Policy, RwLock};
/// use std::thread;
///
/// let lock = RwLock::new(Vec::new(), Policy::ReaderPreference);
///
/// thread::scope(|s| {
///     for i in 0..4 {
///         let lock = &lock;
///         s.spawn(move || lock.write().push(i));
///     }
/// });
///
/// let mut values = lock.read().clone();
/// values.sort();
/// assert_eq!(values, vec![0, 1, 2, 3]);
/// ```
pub struct RwLock<T> {
    raw: RawRwLock,
    data: UnsafeCell<T>,
}

// Access to `data` is only handed out through the guards below, which hold `raw` in the matching
// mode for their whole lifetime.
unsafe impl<T: Send> Send for RwLock<T> {}
unsafe impl<T: Send + Sync> Sync for RwLock<T> {}

impl<T> RwLock<T> {
    /// Creates a new `RwLock` around the given value, using the given fairness policy.
    pub fn new(value: T, policy: Policy) -> RwLock<T> {
        RwLock {
            raw: RawRwLock::new(policy),
            data: UnsafeCell::new(value),
        }
    }

    /// Blocks until the lock can be held as a reader, then returns a guard that gives shared
    /// access to the value and releases the read lock on drop.
    pub fn read(&self) -> RwLockReadGuard<'_, T> {
        self.raw.acquire_read();
        RwLockReadGuard { lock: self }
    }

    /// Blocks until the lock can be held as the writer, then returns a guard that gives
    /// exclusive access to the value and releases the write lock on drop.
    pub fn write(&self) -> RwLockWriteGuard<'_, T> {
        self.raw.acquire_write();
        RwLockWriteGuard { lock: self }
    }

    /// Returns the underlying lock, for inspecting its policy or state.
    pub fn raw(&self) -> &RawRwLock {
        &self.raw
    }

    /// Returns a mutable reference to the value.
    ///
    /// This function is safe because the `&mut self` enforces that no guards or other references
    /// exist.
    pub fn get_mut(&mut self) -> &mut T {
        self.data.get_mut()
    }

    /// Consumes the lock and returns the value.
    pub fn into_inner(self) -> T {
        self.data.into_inner()
    }
}

impl<T> fmt::Debug for RwLock<T> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("RwLock")
            .field("policy", &self.raw.policy())
            .field("state", &self.raw.state())
            .finish_non_exhaustive()
    }
}

/// Guard struct giving shared access to the value in an [`RwLock`].
///
/// The read lock is released when this guard drops.
///
/// [`RwLock`]: struct.RwLock.html
pub struct RwLockReadGuard<'a, T> {
    lock: &'a RwLock<T>,
}

impl<'a, T> Deref for RwLockReadGuard<'a, T> {
    type Target = T;

    fn deref(&self) -> &T {
        // the read lock is held for as long as this guard lives
        unsafe { &*self.lock.data.get() }
    }
}

impl<'a, T> Drop for RwLockReadGuard<'a, T> {
    fn drop(&mut self) {
        self.lock.raw.release_read();
    }
}

/// Guard struct giving exclusive access to the value in an [`RwLock`].
///
/// The write lock is released when this guard drops.
///
/// [`RwLock`]: struct.RwLock.html
pub struct RwLockWriteGuard<'a, T> {
    lock: &'a RwLock<T>,
}

impl<'a, T> Deref for RwLockWriteGuard<'a, T> {
    type Target = T;

    fn deref(&self) -> &T {
        unsafe { &*self.lock.data.get() }
    }
}

impl<'a, T> DerefMut for RwLockWriteGuard<'a, T> {
    fn deref_mut(&mut self) -> &mut T {
        // the write lock is exclusive, so nobody else can be looking
        unsafe { &mut *self.lock.data.get() }
    }
}

impl<'a, T> Drop for RwLockWriteGuard<'a, T> {
    fn drop(&mut self) {
        self.lock.raw.release_write();
    }
}
