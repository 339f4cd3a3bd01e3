//! Coordinated runs of the distributed algorithms
//!
//! A run starts with the global array owned by the coordinator, rank 0. Every rank first checks
//! that the array length splits evenly across the fleet, so a bad configuration is rejected
//! before anything is communicated. The coordinator then scatters the chunks, every rank runs
//! the distributed algorithm on its chunk, and the per-rank outputs are recombined at the
//! coordinator, where they are compared against a sequential computation over the whole array.

use std::fmt::Debug;

use tracing::info;

use crate::collective::CommunicatorCollectives;
use crate::datatype::Arithmetic;
use crate::error::{try_with_capacity, Error, Result};
use crate::partition::{GlobalArray, Partition};
use crate::prefix::{compute_local_prefix, local_sum, prefix_sequential};
use crate::reduce::{gather_reduce_sum, reference_reduce_sum, tree_reduce_sum};
use crate::topology::Rank;

/// The rank that owns the global array and receives the results
pub const COORDINATOR: Rank = 0;

/// Outcome of a prefix sum run, observed at the coordinator
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PrefixSumReport<T> {
    /// The global array
    pub input: Vec<T>,
    /// Exclusive prefix sums computed by the fleet, gathered in rank order
    pub parallel: Vec<T>,
    /// Exclusive prefix sums computed sequentially
    pub sequential: Vec<T>,
}

impl<T: Arithmetic> PrefixSumReport<T> {
    /// Whether the fleet agrees with the sequential computation
    pub fn is_consistent(&self) -> bool {
        self.parallel == self.sequential
    }

    /// Fail with `Error::Validation` unless the fleet agrees with the sequential computation
    pub fn verify(self) -> Result<Self> {
        if self.is_consistent() {
            Ok(self)
        } else {
            Err(mismatch("parallel prefix sum", &self.parallel, &self.sequential))
        }
    }
}

/// Outcome of a reduction run, observed at the coordinator
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReductionReport<T> {
    /// The global array
    pub input: Vec<T>,
    /// Sum computed by the reduce-to-one collective
    pub collective: T,
    /// Sum computed by gathering every chunk at the coordinator
    pub gathered: T,
    /// Sum computed by the binomial tree
    pub tree: T,
    /// Sum computed sequentially
    pub sequential: T,
}

impl<T: Arithmetic> ReductionReport<T> {
    /// Whether all distributed sums agree with the sequential one
    pub fn is_consistent(&self) -> bool {
        [self.collective, self.gathered, self.tree]
            .iter()
            .all(|&sum| sum == self.sequential)
    }

    /// Fail with `Error::Validation` naming the first distributed sum that disagrees
    pub fn verify(self) -> Result<Self> {
        for (algorithm, sum) in [
            ("collective reduction", self.collective),
            ("gather reduction", self.gathered),
            ("tree reduction", self.tree),
        ] {
            if sum != self.sequential {
                return Err(mismatch(algorithm, &sum, &self.sequential));
            }
        }
        Ok(self)
    }
}

fn mismatch<V: Debug + ?Sized>(algorithm: &'static str, actual: &V, expected: &V) -> Error {
    Error::Validation {
        algorithm,
        actual: format!("{:?}", actual),
        expected: format!("{:?}", expected),
    }
}

/// Validate the layout on every rank and hand each rank its chunk.
fn scatter<C, T>(comm: &C, len: usize, input: Option<&GlobalArray<T>>) -> Result<Vec<T>>
where
    C: CommunicatorCollectives,
    T: Arithmetic,
{
    let partition = Partition::new(len, comm.size())?;
    let mut chunk = try_with_capacity(partition.chunk_len())?;
    chunk.resize(partition.chunk_len(), T::ZERO);

    if comm.rank() == COORDINATOR {
        let input = input.ok_or(Error::MissingInput(COORDINATOR))?;
        if input.len() != len {
            return Err(Error::Count {
                expected: len,
                actual: input.len(),
            });
        }
        comm.scatter_into(COORDINATOR, Some(input.as_slice()), &mut chunk[..])?;
    } else {
        comm.scatter_into(COORDINATOR, None, &mut chunk[..])?;
    }
    Ok(chunk)
}

/// Run the distributed exclusive prefix sum over an array of `len` elements.
///
/// Every rank of `comm` must call this with the same `len`; the coordinator passes the array,
/// the other ranks pass `None`. The coordinator returns the report, the other ranks `None`.
pub fn prefix_sum_run<C, T>(
    comm: &C,
    len: usize,
    input: Option<GlobalArray<T>>,
) -> Result<Option<PrefixSumReport<T>>>
where
    C: CommunicatorCollectives,
    T: Arithmetic,
{
    let chunk = scatter(comm, len, input.as_ref())?;
    let local = compute_local_prefix(comm, &chunk, comm.size())?;

    let input = match input {
        Some(input) if comm.rank() == COORDINATOR => input.into_inner(),
        _ => {
            comm.gather_into(COORDINATOR, &local, None)?;
            return Ok(None);
        }
    };

    let mut parallel = try_with_capacity(len)?;
    parallel.resize(len, T::ZERO);
    comm.gather_into(COORDINATOR, &local, Some(&mut parallel[..]))?;
    let sequential = prefix_sequential(&input)?;

    let report = PrefixSumReport {
        input,
        parallel,
        sequential,
    };
    info!(
        len,
        processes = comm.size(),
        consistent = report.is_consistent(),
        "prefix sum finished"
    );
    Ok(Some(report))
}

/// Run the three distributed sum reductions over an array of `len` elements.
///
/// Every rank of `comm` must call this with the same `len`; the coordinator passes the array,
/// the other ranks pass `None`. The coordinator returns the report, the other ranks `None`.
pub fn reduction_run<C, T>(
    comm: &C,
    len: usize,
    input: Option<GlobalArray<T>>,
) -> Result<Option<ReductionReport<T>>>
where
    C: CommunicatorCollectives,
    T: Arithmetic,
{
    let chunk = scatter(comm, len, input.as_ref())?;
    let size = comm.size();

    let collective = reference_reduce_sum(comm, &chunk, size)?;
    let gathered = gather_reduce_sum(comm, &chunk, size)?;
    let tree = tree_reduce_sum(comm, &chunk, size)?;

    let (input, collective, gathered, tree) = match (input, collective, gathered, tree) {
        (Some(input), Some(collective), Some(gathered), Some(tree)) => {
            (input.into_inner(), collective, gathered, tree)
        }
        _ => return Ok(None),
    };

    let report = ReductionReport {
        sequential: local_sum(&input),
        input,
        collective,
        gathered,
        tree,
    };
    info!(
        len,
        processes = size,
        sum = ?report.tree,
        consistent = report.is_consistent(),
        "reduction finished"
    );
    Ok(Some(report))
}
