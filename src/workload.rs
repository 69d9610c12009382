//! The mixed read/write workload: a shared [`OrderedSet`] behind an [`RwLock`], hammered by a
//! fixed pool of worker threads.
//!
//! A run goes through four phases:
//!
//! 1. **Seed.** A single thread fills the set with `initial_size` distinct random keys. This
//!    happens before the lock exists, so there's nothing to contend on.
//! 2. **Run.** `threads` workers each perform their share of `total_ops` operations. Every
//!    operation picks a kind according to the [`OpMix`], picks a random key, takes the lock in
//!    the matching mode, performs the operation and releases the lock.
//! 3. **Join and merge.** Each worker merges its private counts into the global counts under a
//!    separate counting mutex, and the harness joins every worker.
//! 4. **Report.** The elapsed time of the run phase and the per-kind totals come back in a
//!    [`WorkloadReport`].
//!
//! [`OrderedSet`]: ../set/struct.OrderedSet.html
//! [`RwLock`]: ../rwlock/struct.RwLock.html
//! [`OpMix`]: struct.OpMix.html
//! [`WorkloadReport`]: struct.WorkloadReport.html

use std::ops::AddAssign;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, info, trace};

use crate::error::{ConfigError, SetError, WorkloadError};
use crate::rwlock::{Policy, RwLock};
use crate::set::OrderedSet;
use crate::util;

/// The largest number of worker threads a run accepts.
pub const MAX_THREADS: usize = 1024;
/// Number of keys put in the set before the run starts, unless configured otherwise.
pub const DEFAULT_INITIAL_SIZE: usize = 1000;
/// Number of operations performed across all workers, unless configured otherwise.
pub const DEFAULT_TOTAL_OPS: u64 = 10_000;
/// Keys are drawn from `0..DEFAULT_KEY_SPACE`, unless configured otherwise.
pub const DEFAULT_KEY_SPACE: i64 = 65_536;

// seeding gives up after this many draws per wanted key, plus one pass over the key space
const SEED_DRAWS_PER_KEY: usize = 64;

/// The three operations a worker can perform on the set.
#[derive(Debug, PartialEq, Eq, Copy, Clone, Hash)]
pub enum OpKind {
    /// Membership test, under the read lock.
    Contains,
    /// Insertion, under the write lock.
    Insert,
    /// Removal, under the write lock.
    Remove,
}

/// The fraction of operations of each kind. The three fractions add up to one.
#[derive(Debug, PartialEq, Copy, Clone)]
pub struct OpMix {
    /// Fraction of membership tests.
    pub contains: f64,
    /// Fraction of inserts.
    pub insert: f64,
    /// Fraction of removals.
    pub remove: f64,
}

impl OpMix {
    /// Creates a new `OpMix` from the given fractions.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Mix` if a fraction is outside `[0, 1]` or the three don't add up to
    /// one.
    pub fn new(contains: f64, insert: f64, remove: f64) -> Result<OpMix, ConfigError> {
        let mix = OpMix {
            contains: contains,
            insert: insert,
            remove: remove,
        };
        mix.validate()?;
        Ok(mix)
    }

    /// Checks that every fraction is in `[0, 1]` and that they add up to one.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let fractions = [self.contains, self.insert, self.remove];
        let in_range = fractions.iter().all(|f| (0.0..=1.0).contains(f));
        let sum: f64 = fractions.iter().sum();

        if in_range && (sum - 1.0).abs() <= 1e-9 {
            Ok(())
        } else {
            Err(ConfigError::Mix {
                contains: self.contains,
                insert: self.insert,
                remove: self.remove,
            })
        }
    }

    /// Maps a uniform draw from `[0, 1)` to an operation kind, using the cumulative fractions.
    pub fn choose(&self, draw: f64) -> OpKind {
        if draw < self.contains {
            OpKind::Contains
        } else if draw < self.contains + self.insert {
            OpKind::Insert
        } else {
            OpKind::Remove
        }
    }
}

/// 50% membership tests, 25% inserts, 25% removals.
impl Default for OpMix {
    fn default() -> OpMix {
        OpMix {
            contains: 0.5,
            insert: 0.25,
            remove: 0.25,
        }
    }
}

/// A count per operation kind.
#[derive(Debug, PartialEq, Eq, Copy, Clone, Default)]
pub struct OpCounts {
    /// Number of membership tests.
    pub contains: u64,
    /// Number of inserts.
    pub insert: u64,
    /// Number of removals.
    pub remove: u64,
}

impl OpCounts {
    /// Returns the count for one operation kind.
    pub fn get(&self, kind: OpKind) -> u64 {
        match kind {
            OpKind::Contains => self.contains,
            OpKind::Insert => self.insert,
            OpKind::Remove => self.remove,
        }
    }

    /// Adds one to the count for the given kind.
    pub fn record(&mut self, kind: OpKind) {
        match kind {
            OpKind::Contains => self.contains += 1,
            OpKind::Insert => self.insert += 1,
            OpKind::Remove => self.remove += 1,
        }
    }

    /// Returns the sum over all kinds.
    pub fn total(&self) -> u64 {
        self.contains + self.insert + self.remove
    }
}

impl AddAssign for OpCounts {
    fn add_assign(&mut self, other: OpCounts) {
        self.contains += other.contains;
        self.insert += other.insert;
        self.remove += other.remove;
    }
}

// Operations performed, and how many of them came back `true`.
#[derive(Debug, Copy, Clone, Default)]
struct Tally {
    counts: OpCounts,
    hits: OpCounts,
}

impl Tally {
    fn record(&mut self, kind: OpKind, hit: bool) {
        self.counts.record(kind);
        if hit {
            self.hits.record(kind);
        }
    }

    fn merge(&mut self, other: &Tally) {
        self.counts += other.counts;
        self.hits += other.hits;
    }
}

/// Everything a workload run needs, fixed before the run starts.
#[derive(Debug, PartialEq, Clone)]
pub struct WorkloadConfig {
    /// Number of worker threads, between 1 and `MAX_THREADS`.
    pub threads: usize,
    /// Number of distinct keys put in the set before the run.
    pub initial_size: usize,
    /// Number of operations across all workers.
    pub total_ops: u64,
    /// How the operations are split between kinds.
    pub mix: OpMix,
    /// Keys are drawn uniformly from `0..key_space`.
    pub key_space: i64,
    /// Fairness policy of the lock guarding the set.
    pub policy: Policy,
    /// Seed for the random sources. Each worker gets its own source derived from this seed and
    /// its index. When `None`, every source is seeded randomly.
    pub seed: Option<u64>,
}

impl WorkloadConfig {
    /// Creates a configuration with the default parameters and the given number of threads.
    pub fn with_threads(threads: usize) -> WorkloadConfig {
        WorkloadConfig {
            threads: threads,
            ..WorkloadConfig::default()
        }
    }

    /// Checks the configuration, returning the first problem found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_threads(self.threads)?;

        if self.key_space <= 0 {
            return Err(ConfigError::EmptyKeySpace(self.key_space));
        }

        if i64::try_from(self.initial_size).map_or(true, |n| n > self.key_space) {
            return Err(ConfigError::SeedTooLarge {
                initial_size: self.initial_size,
                key_space: self.key_space,
            });
        }

        self.mix.validate()
    }

    /// The number of operations worker `index` performs.
    ///
    /// Operations are spread as evenly as possible: no worker does more than
    /// `ceil(total_ops / threads)`, and the shares add up to exactly `total_ops`.
    pub fn ops_for_worker(&self, index: usize) -> u64 {
        let threads = self.threads as u64;
        let base = self.total_ops / threads;
        let extra = self.total_ops % threads;

        if (index as u64) < extra {
            base + 1
        } else {
            base
        }
    }

    fn rng(&self, stream: u64) -> fastrand::Rng {
        match self.seed {
            Some(seed) => fastrand::Rng::with_seed(seed.wrapping_add(stream)),
            None => fastrand::Rng::new(),
        }
    }
}

/// One thread, 1000 initial keys, 10000 operations, keys from `0..65536`, a 50/25/25 mix and a
/// writer-preference lock.
impl Default for WorkloadConfig {
    fn default() -> WorkloadConfig {
        WorkloadConfig {
            threads: 1,
            initial_size: DEFAULT_INITIAL_SIZE,
            total_ops: DEFAULT_TOTAL_OPS,
            mix: OpMix::default(),
            key_space: DEFAULT_KEY_SPACE,
            policy: Policy::default(),
            seed: None,
        }
    }
}

fn check_threads(threads: usize) -> Result<(), ConfigError> {
    if threads == 0 || threads > MAX_THREADS {
        Err(ConfigError::ThreadCount {
            got: threads,
            max: MAX_THREADS,
        })
    } else {
        Ok(())
    }
}

/// The outcome of a workload run.
#[derive(Debug)]
pub struct WorkloadReport {
    /// Number of worker threads.
    pub threads: usize,
    /// Fairness policy of the lock.
    pub policy: Policy,
    /// Wall-clock time of the run phase, from the first spawn to the last join.
    pub elapsed: Duration,
    /// Operations performed, per kind.
    pub counts: OpCounts,
    /// Operations that returned `true` (key found, inserted, or removed), per kind.
    pub hits: OpCounts,
    /// The set as the run left it.
    pub set: OrderedSet,
}

impl WorkloadReport {
    /// The elapsed time in milliseconds.
    pub fn elapsed_ms(&self) -> f64 {
        self.elapsed.as_secs_f64() * 1000.0
    }
}

/// A seeded set, the lock guarding it and the shared counters, ready to run.
///
/// # Example
///
/// ```
/// use rwfair::{Workload, WorkloadConfig};
///
/// let config = WorkloadConfig {
///     initial_size: 100,
///     total_ops: 1000,
///     seed: Some(7),
///     ..WorkloadConfig::with_threads(4)
/// };
///
/// let workload = Workload::new(config).unwrap();
/// let report = workload.run().unwrap();
///
/// assert_eq!(report.counts.total(), 1000);
/// ```
pub struct Workload {
    config: WorkloadConfig,
    set: RwLock<OrderedSet>,
    tally: Mutex<Tally>,
    aborted: AtomicBool,
}

impl Workload {
    /// Validates the configuration and seeds the set.
    ///
    /// # Errors
    ///
    /// Returns `WorkloadError::Config` if the configuration is invalid,
    /// `WorkloadError::SeedExhausted` if enough distinct keys couldn't be drawn, and
    /// `WorkloadError::Set` if a node couldn't be allocated.
    pub fn new(config: WorkloadConfig) -> Result<Workload, WorkloadError> {
        config.validate()?;

        let mut set = OrderedSet::new();
        seed(&mut set, &mut config.rng(0), config.initial_size, config.key_space)?;
        debug!(keys = set.len(), key_space = config.key_space, "seeded set");

        Ok(Workload {
            set: RwLock::new(set, config.policy),
            config: config,
            tally: Mutex::new(Tally::default()),
            aborted: AtomicBool::new(false),
        })
    }

    /// Returns the configuration this workload was built from.
    pub fn config(&self) -> &WorkloadConfig {
        &self.config
    }

    /// Returns the number of keys currently in the set.
    pub fn len(&self) -> usize {
        self.set.read().len()
    }

    /// Returns whether the set is currently empty.
    pub fn is_empty(&self) -> bool {
        self.set.read().is_empty()
    }

    /// Runs the workers to completion and reports the results.
    ///
    /// # Errors
    ///
    /// Returns `WorkloadError::Spawn` if a worker thread couldn't be started,
    /// `WorkloadError::Set` if a worker failed to allocate a node, and
    /// `WorkloadError::WorkerPanicked` if a worker panicked. Any of these stops the remaining
    /// workers at their next operation.
    pub fn run(self) -> Result<WorkloadReport, WorkloadError> {
        let threads = self.config.threads;
        debug!(
            threads,
            ops = self.config.total_ops,
            policy = %self.config.policy,
            "starting workers"
        );

        let started = Instant::now();
        run_workers(threads, "rwfair-worker", &self.aborted, |index| {
            self.work(index, self.config.ops_for_worker(index))
        })?;
        let elapsed = started.elapsed();

        let Workload {
            config, set, tally, ..
        } = self;
        let tally = util::guts(tally.into_inner());

        let report = WorkloadReport {
            threads: threads,
            policy: config.policy,
            elapsed: elapsed,
            counts: tally.counts,
            hits: tally.hits,
            set: set.into_inner(),
        };

        info!(
            elapsed_ms = report.elapsed_ms(),
            contains = report.counts.contains,
            insert = report.counts.insert,
            remove = report.counts.remove,
            final_len = report.set.len(),
            "workload finished"
        );

        Ok(report)
    }

    fn work(&self, index: usize, ops: u64) -> Result<(), SetError> {
        // stream 0 went to seeding
        let mut rng = self.config.rng(index as u64 + 1);
        let mut local = Tally::default();

        for _ in 0..ops {
            if self.aborted.load(Ordering::Relaxed) {
                trace!(index, "worker stopping early");
                return Ok(());
            }

            let kind = self.config.mix.choose(rng.f64());
            let key = rng.i64(0..self.config.key_space);

            let hit = match kind {
                OpKind::Contains => self.set.read().contains(key),
                OpKind::Insert => self.set.write().insert(key)?,
                OpKind::Remove => self.set.write().remove(key),
            };

            local.record(kind, hit);
        }

        util::guts(self.tally.lock()).merge(&local);
        trace!(index, ops, "worker done");

        Ok(())
    }
}

// Fill `set` with `wanted` distinct keys from `0..key_space`, re-drawing duplicates.
fn seed(
    set: &mut OrderedSet,
    rng: &mut fastrand::Rng,
    wanted: usize,
    key_space: i64,
) -> Result<(), WorkloadError> {
    let space = usize::try_from(key_space).unwrap_or(usize::MAX);
    let max_draws = wanted.saturating_mul(SEED_DRAWS_PER_KEY).saturating_add(space);

    let mut inserted = 0;
    for _ in 0..max_draws {
        if inserted == wanted {
            break;
        }
        if set.insert(rng.i64(0..key_space))? {
            inserted += 1;
        }
    }

    if inserted < wanted {
        return Err(WorkloadError::SeedExhausted {
            inserted: inserted,
            wanted: wanted,
        });
    }

    Ok(())
}

/// Shorthand for `Workload::new(config)?.run()`.
pub fn run(config: WorkloadConfig) -> Result<WorkloadReport, WorkloadError> {
    Workload::new(config)?.run()
}

// Spawn `threads` named scoped threads running `work(index)` and join all of them.
//
// A spawn failure stops spawning. A spawn failure or a failed worker sets `abort`, which workers
// are expected to poll. Whatever was spawned is always joined before this returns, and the first
// error seen is the one returned.
pub(crate) fn run_workers<F>(
    threads: usize,
    name: &str,
    abort: &AtomicBool,
    work: F,
) -> Result<(), WorkloadError>
where
    F: Fn(usize) -> Result<(), SetError> + Sync,
{
    let work = &work;

    thread::scope(|s| {
        let mut handles = Vec::with_capacity(threads);
        let mut failure = None;

        for index in 0..threads {
            let spawned = thread::Builder::new()
                .name(format!("{}-{}", name, index))
                .spawn_scoped(s, move || {
                    let result = work(index);
                    if result.is_err() {
                        abort.store(true, Ordering::Relaxed);
                    }
                    result
                });

            match spawned {
                Ok(handle) => handles.push(handle),
                Err(source) => {
                    abort.store(true, Ordering::Relaxed);
                    failure = Some(WorkloadError::Spawn {
                        index: index,
                        source: source,
                    });
                    break;
                }
            }
        }

        debug!(spawned = handles.len(), "{} threads running", name);

        for (index, handle) in handles.into_iter().enumerate() {
            let outcome = match handle.join() {
                Ok(result) => result.map_err(WorkloadError::from),
                Err(_) => {
                    abort.store(true, Ordering::Relaxed);
                    Err(WorkloadError::WorkerPanicked { index: index })
                }
            };

            if let Err(err) = outcome {
                failure.get_or_insert(err);
            }
        }

        match failure {
            Some(err) => Err(err),
            None => Ok(()),
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mix_picks_by_cumulative_fraction() {
        let mix = OpMix::default();

        assert_eq!(mix.choose(0.0), OpKind::Contains);
        assert_eq!(mix.choose(0.49), OpKind::Contains);
        assert_eq!(mix.choose(0.5), OpKind::Insert);
        assert_eq!(mix.choose(0.74), OpKind::Insert);
        assert_eq!(mix.choose(0.75), OpKind::Remove);
        assert_eq!(mix.choose(0.999), OpKind::Remove);

        let writes_only = OpMix::new(0.0, 1.0, 0.0).unwrap();
        assert_eq!(writes_only.choose(0.0), OpKind::Insert);
        assert_eq!(writes_only.choose(0.99), OpKind::Insert);
    }

    #[test]
    fn bad_mixes_are_rejected() {
        assert!(OpMix::new(0.5, 0.5, 0.5).is_err());
        assert!(OpMix::new(1.5, -0.25, -0.25).is_err());
        assert!(OpMix::new(f64::NAN, 0.5, 0.5).is_err());
        assert!(OpMix::new(0.8, 0.1, 0.1).is_ok());
    }

    #[test]
    fn config_validation() {
        assert!(WorkloadConfig::with_threads(1).validate().is_ok());
        assert!(WorkloadConfig::with_threads(MAX_THREADS).validate().is_ok());

        assert_eq!(
            WorkloadConfig::with_threads(0).validate(),
            Err(ConfigError::ThreadCount { got: 0, max: MAX_THREADS })
        );
        assert_eq!(
            WorkloadConfig::with_threads(MAX_THREADS + 1).validate(),
            Err(ConfigError::ThreadCount { got: MAX_THREADS + 1, max: MAX_THREADS })
        );

        let empty = WorkloadConfig {
            key_space: 0,
            ..WorkloadConfig::default()
        };
        assert_eq!(empty.validate(), Err(ConfigError::EmptyKeySpace(0)));

        let crowded = WorkloadConfig {
            initial_size: 11,
            key_space: 10,
            ..WorkloadConfig::default()
        };
        assert!(matches!(crowded.validate(), Err(ConfigError::SeedTooLarge { .. })));
    }

    #[test]
    fn ops_are_split_exactly() {
        let even = WorkloadConfig::with_threads(4);
        assert!((0..4).all(|i| even.ops_for_worker(i) == 2500));

        let uneven = WorkloadConfig::with_threads(3);
        let shares: Vec<u64> = (0..3).map(|i| uneven.ops_for_worker(i)).collect();
        assert_eq!(shares, vec![3334, 3333, 3333]);
        assert_eq!(shares.iter().sum::<u64>(), DEFAULT_TOTAL_OPS);

        let sparse = WorkloadConfig {
            total_ops: 2,
            ..WorkloadConfig::with_threads(5)
        };
        let shares: Vec<u64> = (0..5).map(|i| sparse.ops_for_worker(i)).collect();
        assert_eq!(shares, vec![1, 1, 0, 0, 0]);
    }

    #[test]
    fn seeding_fills_the_whole_key_space() {
        let mut set = OrderedSet::new();
        let mut rng = fastrand::Rng::with_seed(1);

        seed(&mut set, &mut rng, 64, 64).unwrap();

        assert_eq!(set.iter().collect::<Vec<_>>(), (0..64).collect::<Vec<_>>());
    }

    #[test]
    fn counts_merge() {
        let mut total = Tally::default();
        let mut local = Tally::default();
        local.record(OpKind::Contains, true);
        local.record(OpKind::Insert, false);
        local.record(OpKind::Remove, true);

        total.merge(&local);
        total.merge(&local);

        assert_eq!(total.counts, OpCounts { contains: 2, insert: 2, remove: 2 });
        assert_eq!(total.hits, OpCounts { contains: 2, insert: 0, remove: 2 });
        assert_eq!(total.counts.total(), 6);
        assert_eq!(total.counts.get(OpKind::Insert), 2);
    }

    #[test]
    fn seeded_runs_are_reproducible_single_threaded() {
        let config = WorkloadConfig {
            initial_size: 50,
            total_ops: 500,
            key_space: 200,
            seed: Some(42),
            ..WorkloadConfig::with_threads(1)
        };

        let first = run(config.clone()).unwrap();
        let second = run(config).unwrap();

        assert_eq!(first.counts, second.counts);
        assert_eq!(first.hits, second.hits);
        assert_eq!(
            first.set.iter().collect::<Vec<_>>(),
            second.set.iter().collect::<Vec<_>>()
        );
    }

    #[test]
    fn failing_worker_is_reported() {
        let abort = AtomicBool::new(false);
        let result = run_workers(3, "test-worker", &abort, |index| {
            if index == 1 {
                Err(SetError::Alloc { size: 16 })
            } else {
                Ok(())
            }
        });

        assert!(matches!(result, Err(WorkloadError::Set(SetError::Alloc { size: 16 }))));
        assert!(abort.load(Ordering::Relaxed));
    }
}
