//! Sum of a random array, computed three ways on an in-process fleet
//!
//! ```text
//! RUST_LOG=scanreduce=debug cargo run --example tree_reduce -- --len 40 --processes 5
//! ```

use std::time::Duration;

use clap::Parser;
use scanreduce::environment::{Universe, UniverseConfig};
use scanreduce::input::{self, InputConfig};
use scanreduce::run::{self, COORDINATOR};
use scanreduce::traits::*;
use tracing_subscriber::EnvFilter;

/// Distributed sum reduction by collective, gather and binomial tree
#[derive(Parser)]
#[command(name = "tree_reduce", version, about)]
struct Args {
    /// Number of array elements; must be a multiple of the process count
    #[arg(long, default_value_t = input::DEFAULT_LEN)]
    len: usize,
    /// Number of processes; defaults to SCANREDUCE_PROCESSES or 4
    #[arg(long)]
    processes: Option<i32>,
    /// Seed of the input generator
    #[arg(long)]
    seed: Option<u64>,
    /// Largest value of an element
    #[arg(long, default_value_t = input::DEFAULT_MAX_VALUE)]
    max_value: i64,
    /// Give up on a receive after this many milliseconds
    #[arg(long)]
    timeout_ms: Option<u64>,
}

fn run(args: Args) -> scanreduce::Result<()> {
    let mut config = UniverseConfig::from_env()?;
    if let Some(processes) = args.processes {
        config = config.processes(processes);
    }
    if let Some(millis) = args.timeout_ms {
        config = config.receive_timeout(Duration::from_millis(millis));
    }
    let universe = Universe::with_config(config)?;

    let mut input_config = InputConfig::new(args.len).max_value(args.max_value);
    input_config.seed = args.seed;
    let array = input::random_array(&input_config)?;

    let reports = universe.run(|world| {
        let input = (world.rank() == COORDINATOR).then(|| array.clone());
        run::reduction_run(world, args.len, input)
    })?;

    if let Some(report) = reports.into_iter().flatten().next() {
        let report = report.verify()?;
        println!("input:      {:?}", report.input);
        println!("collective: {}", report.collective);
        println!("gathered:   {}", report.gathered);
        println!("tree:       {}", report.tree);
        println!("sequential: {}", report.sequential);
    }
    Ok(())
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    if let Err(e) = run(Args::parse()) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
