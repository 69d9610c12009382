//! A bare reader/writer contention demo for comparing the two lock policies.
//!
//! Every iteration spawns a batch of reader threads and writer threads that each take the lock
//! once, hold it briefly, and let go. The time each thread spent blocked in `acquire_read` or
//! `acquire_write` is pushed onto a lock-free queue per role, so the cost of each policy shows up
//! in the per-role wait times as well as the total.

use std::sync::atomic::AtomicBool;
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_queue::SegQueue;
use tracing::{debug, info};

use crate::error::{ConfigError, WorkloadError};
use crate::rwlock::{Policy, RawRwLock};
use crate::workload;

/// How long each demo thread holds the lock, unless configured otherwise.
pub const DEFAULT_HOLD: Duration = Duration::from_micros(100);

/// Parameters for [`run_demo`].
///
/// [`run_demo`]: fn.run_demo.html
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct DemoConfig {
    /// Reader threads spawned per iteration.
    pub readers: usize,
    /// Writer threads spawned per iteration.
    pub writers: usize,
    /// Fairness policy of the lock.
    pub policy: Policy,
    /// Number of spawn/join rounds.
    pub iterations: usize,
    /// How long each thread holds the lock once it gets in.
    pub hold: Duration,
}

impl DemoConfig {
    /// Checks that each batch spawns at least one thread.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.readers == 0 && self.writers == 0 {
            Err(ConfigError::EmptyBatch)
        } else {
            Ok(())
        }
    }
}

impl Default for DemoConfig {
    fn default() -> DemoConfig {
        DemoConfig {
            readers: 4,
            writers: 2,
            policy: Policy::default(),
            iterations: 10,
            hold: DEFAULT_HOLD,
        }
    }
}

/// Summary of the time threads of one role spent waiting for the lock.
#[derive(Debug, PartialEq, Eq, Copy, Clone, Default)]
pub struct WaitStats {
    /// Number of acquisitions measured.
    pub samples: usize,
    /// Mean wait, or zero without samples.
    pub mean: Duration,
    /// Longest wait.
    pub max: Duration,
}

impl WaitStats {
    fn drain(queue: &SegQueue<Duration>) -> WaitStats {
        let mut samples = 0u32;
        let mut total = Duration::default();
        let mut max = Duration::default();

        while let Some(wait) = queue.pop() {
            samples += 1;
            total += wait;
            max = max.max(wait);
        }

        WaitStats {
            samples: samples as usize,
            mean: total.checked_div(samples).unwrap_or_default(),
            max: max,
        }
    }
}

/// The outcome of a demo run.
#[derive(Debug, Clone)]
pub struct DemoReport {
    /// Fairness policy of the lock.
    pub policy: Policy,
    /// Wall-clock time across all iterations.
    pub elapsed: Duration,
    /// Wait times of reader threads.
    pub reader_waits: WaitStats,
    /// Wait times of writer threads.
    pub writer_waits: WaitStats,
}

impl DemoReport {
    /// The elapsed time in milliseconds.
    pub fn elapsed_ms(&self) -> f64 {
        self.elapsed.as_secs_f64() * 1000.0
    }
}

/// Runs the reader/writer demo.
///
/// # Errors
///
/// Returns `WorkloadError::Config` for an invalid configuration, `WorkloadError::Spawn` if a
/// thread couldn't be started and `WorkloadError::WorkerPanicked` if one panicked. The
/// remaining iterations are skipped after an error.
///
/// # Example
///
/// ```
/// use rwfair::{run_demo, DemoConfig, Policy};
/// use std::time::Duration;
///
/// let config = DemoConfig {
///     readers: 3,
///     writers: 1,
///     policy: Policy::ReaderPreference,
///     iterations: 2,
///     hold: Duration::from_micros(10),
/// };
///
/// let report = run_demo(&config).unwrap();
/// assert_eq!(report.reader_waits.samples, 6);
/// assert_eq!(report.writer_waits.samples, 2);
/// ```
pub fn run_demo(config: &DemoConfig) -> Result<DemoReport, WorkloadError> {
    config.validate()?;

    let lock = RawRwLock::new(config.policy);
    let reader_waits = SegQueue::new();
    let writer_waits = SegQueue::new();
    let abort = AtomicBool::new(false);
    let batch = config.readers + config.writers;

    debug!(
        readers = config.readers,
        writers = config.writers,
        iterations = config.iterations,
        policy = %config.policy,
        "starting demo"
    );

    let started = Instant::now();
    for _ in 0..config.iterations {
        workload::run_workers(batch, "rwfair-demo", &abort, |index| {
            let asked = Instant::now();

            if index < config.readers {
                lock.acquire_read();
                reader_waits.push(asked.elapsed());
                thread::sleep(config.hold);
                lock.release_read();
            } else {
                lock.acquire_write();
                writer_waits.push(asked.elapsed());
                thread::sleep(config.hold);
                lock.release_write();
            }

            Ok(())
        })?;
    }
    let elapsed = started.elapsed();

    let report = DemoReport {
        policy: config.policy,
        elapsed: elapsed,
        reader_waits: WaitStats::drain(&reader_waits),
        writer_waits: WaitStats::drain(&writer_waits),
    };

    info!(
        elapsed_ms = report.elapsed_ms(),
        reader_mean_us = report.reader_waits.mean.as_micros() as u64,
        writer_mean_us = report.writer_waits.mean.as_micros() as u64,
        "demo finished"
    );

    Ok(report)
}
