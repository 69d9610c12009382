//! rwfair-demo - spawn batches of readers and writers against a bare lock and time them.

use anyhow::Result;
use clap::Parser;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use rwfair::{run_demo, DemoConfig, Policy, WaitStats};

/// Time repeated batches of lock-and-release readers and writers
#[derive(Parser, Debug)]
#[command(name = "rwfair-demo", version, about, long_about = None)]
struct DemoArgs {
    /// Reader threads per iteration
    readers: usize,

    /// Writer threads per iteration
    writers: usize,

    /// 1 to hold back new readers while a writer waits, 0 to let them in
    #[arg(value_parser = clap::value_parser!(u8).range(0..=1))]
    prefer_writers: u8,

    /// Number of spawn/join rounds
    iterations: usize,

    /// Log debug output
    #[arg(short, long)]
    verbose: bool,
}

fn print_waits(role: &str, stats: &WaitStats) {
    println!(
        "{} wait: {} samples, mean {} us, max {} us",
        role,
        stats.samples,
        stats.mean.as_micros(),
        stats.max.as_micros()
    );
}

// PREFER_WRITERS is range-checked by clap, so anything but 1 means reader preference.
fn policy_from_flag(prefer_writers: u8) -> Policy {
    if prefer_writers == 1 {
        Policy::WriterPreference
    } else {
        Policy::ReaderPreference
    }
}

fn setup_logging(verbose: bool) {
    let level = if verbose { Level::DEBUG } else { Level::WARN };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();

    let _ = tracing::subscriber::set_global_default(subscriber);
}

fn run(args: DemoArgs) -> Result<()> {
    let config = DemoConfig {
        readers: args.readers,
        writers: args.writers,
        policy: policy_from_flag(args.prefer_writers),
        iterations: args.iterations,
        ..DemoConfig::default()
    };

    let report = run_demo(&config)?;

    println!("Total time: {:.2} ms", report.elapsed_ms());
    print_waits("Reader", &report.reader_waits);
    print_waits("Writer", &report.writer_waits);

    Ok(())
}

fn main() {
    let args = DemoArgs::parse();
    setup_logging(args.verbose);

    if let Err(e) = run(args) {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}
