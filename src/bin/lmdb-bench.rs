//! Workload benchmark for `signet-lmdb`.
//!
//! Usage:
//!   cargo run --release --features cli --bin lmdb-bench -- --workload write --path /tmp/bench
//!   cargo run --release --features cli --bin lmdb-bench -- --workload random_read --path /tmp/bench --reads 1000000
//!
//! Log verbosity follows `RUST_LOG`, defaulting to `info`.

use clap::Parser;
use signet_lmdb::harness::{self, BenchConfig, Workload};
use std::{path::PathBuf, process::ExitCode};
use tracing::error;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// LMDB workload benchmark.
#[derive(Parser, Debug)]
#[command(name = "lmdb-bench", about = "Measure LMDB workloads through signet-lmdb")]
struct Args {
    /// Workload: write | iterate | random_read | parallel_random_read | prefix_seek
    #[arg(long)]
    workload: Workload,

    /// Environment directory. Created if missing.
    #[arg(long)]
    path: PathBuf,

    /// Number of records written, or populated before a read workload.
    #[arg(long, default_value_t = 100_000)]
    records: u32,

    /// Number of point reads or prefix seeks.
    #[arg(long, default_value_t = 100_000)]
    reads: u32,

    /// Memory map size in bytes.
    #[arg(long, default_value_t = 1 << 30)]
    map_size: usize,

    /// Reader threads for parallel_random_read. Defaults to the core count.
    #[arg(long)]
    threads: Option<usize>,
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry().with(env_filter).with(fmt::layer().with_target(true)).init();
}

fn main() -> ExitCode {
    let args = Args::parse();
    init_tracing();

    let mut config = BenchConfig::new(args.workload, args.path);
    config.records = args.records;
    config.reads = args.reads;
    config.map_size = args.map_size;
    if let Some(threads) = args.threads {
        config.threads = threads;
    }

    match harness::run(&config) {
        Ok(report) => {
            println!("{report}");
            ExitCode::SUCCESS
        }
        Err(err) => {
            error!(%err, workload = %config.workload, "benchmark failed");
            ExitCode::FAILURE
        }
    }
}
