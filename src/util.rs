//! Small helpers shared by the lock and the workload harness that don't need to be public.

use std::sync::{Condvar, LockResult, MutexGuard};

// Take the guard out of a LockResult whether or not the mutex was poisoned.
//
// Everything this crate keeps behind a std Mutex is a handful of plain counters that are updated
// in single statements, so a panic on another thread can't leave them half-written. Carrying on
// with the inner value is the right call; propagating the poison would just turn one panic into
// a cascade of them.
//
// Source for the name: http://bulbapedia.bulbagarden.net/wiki/Guts_(Ability)
pub fn guts<T>(res: LockResult<T>) -> T {
    match res {
        Ok(guard) => guard,
        Err(poison) => poison.into_inner(),
    }
}

// Block on `cond` for as long as `blocked` says so, re-checking after every wakeup (spurious or
// not). Returns the re-acquired guard once the predicate clears.
pub fn wait_while<'a, T, F>(
    cond: &Condvar,
    mut guard: MutexGuard<'a, T>,
    mut blocked: F,
) -> MutexGuard<'a, T>
where
    F: FnMut(&T) -> bool,
{
    while blocked(&*guard) {
        guard = guts(cond.wait(guard));
    }
    guard
}
