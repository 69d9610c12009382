//! rwfair - run the mixed read/write workload against a shared ordered set.
//!
//! Takes the number of worker threads as its only required argument. The rest of the workload
//! is fixed: 1000 initial keys, 10000 operations, keys from 0..65536 and a 50/25/25 mix of
//! membership tests, inserts and removals.

use anyhow::Result;
use clap::{Parser, ValueEnum};
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use rwfair::{Policy, WorkloadConfig, MAX_THREADS};

/// Benchmark a fairness-selectable reader-writer lock guarding a linked ordered set
#[derive(Parser, Debug)]
#[command(name = "rwfair", version, about, long_about = None)]
struct CliArgs {
    /// Number of worker threads
    #[arg(value_parser = clap::value_parser!(u16).range(1..=MAX_THREADS as i64))]
    threads: u16,

    /// Which side of the lock gets priority
    #[arg(long, value_enum, default_value_t = PolicyArg::Writer)]
    policy: PolicyArg,

    /// Seed for the random sources, for reproducible runs
    #[arg(long)]
    seed: Option<u64>,

    /// Log debug output
    #[arg(short, long)]
    verbose: bool,

    /// Only log errors
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum PolicyArg {
    Reader,
    Writer,
}

impl From<PolicyArg> for Policy {
    fn from(arg: PolicyArg) -> Policy {
        match arg {
            PolicyArg::Reader => Policy::ReaderPreference,
            PolicyArg::Writer => Policy::WriterPreference,
        }
    }
}

fn setup_logging(verbose: bool, quiet: bool) {
    let level = if quiet {
        Level::ERROR
    } else if verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();

    // only fails if a subscriber is already installed, which leaves logging working anyway
    let _ = tracing::subscriber::set_global_default(subscriber);
}

fn run(args: CliArgs) -> Result<()> {
    let config = WorkloadConfig {
        policy: args.policy.into(),
        seed: args.seed,
        ..WorkloadConfig::with_threads(usize::from(args.threads))
    };

    let report = rwfair::workload::run(config)?;

    println!("Threads: {} ({})", report.threads, report.policy);
    println!("Elapsed time: {:.3} ms", report.elapsed_ms());
    println!(
        "Operations: {} member, {} insert, {} delete ({} total)",
        report.counts.contains,
        report.counts.insert,
        report.counts.remove,
        report.counts.total()
    );
    println!("Final set size: {}", report.set.len());

    Ok(())
}

fn main() {
    let args = CliArgs::parse();
    setup_logging(args.verbose, args.quiet);

    if let Err(e) = run(args) {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn thread_count_bounds() {
        assert!(CliArgs::try_parse_from(["rwfair", "0"]).is_err());
        assert!(CliArgs::try_parse_from(["rwfair", "1025"]).is_err());
        assert!(CliArgs::try_parse_from(["rwfair", "-3"]).is_err());
        assert!(CliArgs::try_parse_from(["rwfair", "four"]).is_err());

        let args = CliArgs::try_parse_from(["rwfair", "1"]).unwrap();
        assert_eq!(args.threads, 1);

        let args = CliArgs::try_parse_from(["rwfair", "1024"]).unwrap();
        assert_eq!(usize::from(args.threads), MAX_THREADS);
    }

    #[test]
    fn thread_count_is_required() {
        assert!(CliArgs::try_parse_from(["rwfair"]).is_err());
    }

    #[test]
    fn defaults() {
        let args = CliArgs::try_parse_from(["rwfair", "4"]).unwrap();
        assert_eq!(Policy::from(args.policy), Policy::WriterPreference);
        assert_eq!(args.seed, None);
        assert!(!args.verbose);
        assert!(!args.quiet);
    }

    #[test]
    fn policy_and_seed_flags() {
        let args =
            CliArgs::try_parse_from(["rwfair", "8", "--policy", "reader", "--seed", "42"]).unwrap();
        assert_eq!(Policy::from(args.policy), Policy::ReaderPreference);
        assert_eq!(args.seed, Some(42));

        assert!(CliArgs::try_parse_from(["rwfair", "8", "--policy", "fair"]).is_err());
    }

    #[test]
    fn verbose_conflicts_with_quiet() {
        assert!(CliArgs::try_parse_from(["rwfair", "2", "-v", "-q"]).is_err());
    }
}
