//! Distributed exclusive prefix sum
//!
//! Each process holds one chunk of the global array. It sums its chunk, learns the sum of all
//! preceding chunks from an inclusive scan over the per-chunk sums, and walks its chunk once
//! with that offset as the starting value. Concatenating the per-process results in rank order
//! yields the exclusive prefix sum of the global array: element `k` is the sum of elements
//! `0..k`, element 0 is zero.

use tracing::debug;

use crate::collective::{CommunicatorCollectives, SystemOperation};
use crate::datatype::Arithmetic;
use crate::error::{try_with_capacity, Error, Result};
use crate::topology::Rank;

/// Sum of all elements of `chunk`
pub fn local_sum<T: Arithmetic>(chunk: &[T]) -> T {
    SystemOperation::sum().fold(chunk)
}

/// Exclusive prefix sums of `chunk`, seeded with `offset`.
///
/// `result[0] = offset` and `result[i] = result[i - 1] + chunk[i - 1]`.
pub fn exclusive_prefix_from<T: Arithmetic>(chunk: &[T], offset: T) -> Result<Vec<T>> {
    let mut result = try_with_capacity(chunk.len())?;
    let mut running = offset;
    for &x in chunk {
        result.push(running);
        running = running.wrapping_add(x);
    }
    Ok(result)
}

/// Sequential exclusive prefix sum of a whole array, used as the reference
pub fn prefix_sequential<T: Arithmetic>(array: &[T]) -> Result<Vec<T>> {
    exclusive_prefix_from(array, T::ZERO)
}

/// The part of the global exclusive prefix sum that belongs to this process's chunk.
///
/// This is a collective operation: every process of `comm` must call it, in the same order
/// relative to other collectives. `process_count` is the fleet size the caller partitioned the
/// array for; it must match the communicator.
///
/// An empty chunk still takes part in the scan and yields an empty result.
pub fn compute_local_prefix<C, T>(comm: &C, chunk: &[T], process_count: Rank) -> Result<Vec<T>>
where
    C: CommunicatorCollectives,
    T: Arithmetic,
{
    if process_count != comm.size() {
        return Err(Error::NotSame {
            expected: process_count,
            actual: comm.size(),
        });
    }

    let sum = local_sum(chunk);
    let mut inclusive = [T::ZERO];
    comm.scan_into(&[sum], &mut inclusive, SystemOperation::sum())?;
    let offset = inclusive[0].wrapping_sub(sum);
    debug!(rank = comm.rank(), ?sum, ?offset, "prefix offset");

    exclusive_prefix_from(chunk, offset)
}
