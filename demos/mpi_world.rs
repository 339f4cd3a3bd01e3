//! Both algorithms on the world communicator of an MPI job
//!
//! ```text
//! cargo build --example mpi_world --features mpi
//! mpiexec -n 4 target/debug/examples/mpi_world 16
//! ```

use scanreduce::input::{self, InputConfig};
use scanreduce::mpi_backend::MpiCommunicator;
use scanreduce::run::{self, COORDINATOR};
use scanreduce::traits::*;
use tracing_subscriber::EnvFilter;

fn run(world: &MpiCommunicator, len: usize) -> scanreduce::Result<()> {
    let array = if world.rank() == COORDINATOR {
        Some(input::random_array(&InputConfig::new(len).seed(1))?)
    } else {
        None
    };

    if let Some(report) = run::prefix_sum_run(world, len, array.clone())? {
        let report = report.verify()?;
        println!("input:      {:?}", report.input);
        println!("prefix sum: {:?}", report.parallel);
    }
    if let Some(report) = run::reduction_run(world, len, array)? {
        let report = report.verify()?;
        println!("sum:        {}", report.tree);
    }
    Ok(())
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let Some(universe) = mpi::initialize() else {
        eprintln!("Error: MPI is already initialized");
        std::process::exit(1);
    };
    let world = MpiCommunicator::world(&universe);
    let len = std::env::args()
        .nth(1)
        .and_then(|arg| arg.parse().ok())
        .unwrap_or_else(|| input::DEFAULT_LEN.max(world.size_usize()));

    if let Err(e) = run(&world, len) {
        eprintln!("Error on rank {}: {}", world.rank(), e);
        mpi::topology::Communicator::abort(world.raw(), 1);
    }
}
