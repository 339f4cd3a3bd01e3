//! Collective communication
//!
//! Collectives are default methods on `CommunicatorCollectives`. The defaults are linear
//! algorithms built on the communicator's point to point primitives, which every substrate has;
//! a substrate with native collectives overrides them. Rooted collectives are also available on
//! a `Process` through the `Root` trait.
//!
//! All processes of a communicator must call the same collectives in the same order with
//! matching arguments. A collective is complete on a process once its own contribution has been
//! handed off and the result it needs has arrived.

use tracing::debug;

use crate::datatype::{Arithmetic, Equivalence};
use crate::error::{try_with_capacity, Error, Failure, Result};
use crate::topology::{Communicator, Process, Rank};
use crate::Tag;

/// Collective communication traits
pub mod traits {
    pub use super::{CommunicatorCollectives, Root};
}

// Tags reserved for the default implementations. User messages use non-negative tags.
const BARRIER_TAG: Tag = -1;
const BROADCAST_TAG: Tag = -2;
const SCATTER_TAG: Tag = -3;
const GATHER_TAG: Tag = -4;
const REDUCE_TAG: Tag = -5;
const SCAN_TAG: Tag = -6;
const EXCLUSIVE_SCAN_TAG: Tag = -7;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum Op {
    Sum,
    Product,
    Max,
    Min,
}

/// A built-in operation like `MPI_SUM`
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct SystemOperation(Op);

macro_rules! system_operation_constructors {
    ($($ctor:ident => $val:expr),*) => (
        $(pub fn $ctor() -> SystemOperation {
            //! A built-in operation
            SystemOperation($val)
        })*
    )
}

impl SystemOperation {
    system_operation_constructors! {
        max => Op::Max,
        min => Op::Min,
        sum => Op::Sum,
        product => Op::Product
    }

    /// Combine two values. Sums and products wrap around on overflow.
    pub fn apply<T: Arithmetic>(&self, a: T, b: T) -> T {
        match self.0 {
            Op::Sum => a.wrapping_add(b),
            Op::Product => a.wrapping_mul(b),
            Op::Max => a.max(b),
            Op::Min => a.min(b),
        }
    }

    /// The value `x` for which `apply(x, y) == y` for all `y`
    pub fn identity<T: Arithmetic>(&self) -> T {
        match self.0 {
            Op::Sum => T::ZERO,
            Op::Product => T::ONE,
            Op::Max => T::MIN,
            Op::Min => T::MAX,
        }
    }

    /// Fold a sequence of values, starting from the identity
    pub fn fold<T: Arithmetic>(&self, values: &[T]) -> T {
        values
            .iter()
            .fold(self.identity(), |acc, &x| self.apply(acc, x))
    }

    /// The equivalent operation of the `mpi` crate
    #[cfg(feature = "mpi")]
    pub fn to_mpi(&self) -> mpi::collective::SystemOperation {
        match self.0 {
            Op::Sum => mpi::collective::SystemOperation::sum(),
            Op::Product => mpi::collective::SystemOperation::product(),
            Op::Max => mpi::collective::SystemOperation::max(),
            Op::Min => mpi::collective::SystemOperation::min(),
        }
    }
}

fn collective_send<C: Communicator, T: Equivalence>(
    comm: &C,
    operation: &'static str,
    buf: &[T],
    destination: Rank,
    tag: Tag,
) -> Result<()> {
    comm.send_with_tag(buf, destination, tag)
        .map_err(|cause| Error::Collective { operation, cause })
}

fn collective_receive<C: Communicator, T: Equivalence>(
    comm: &C,
    operation: &'static str,
    buf: &mut [T],
    source: Rank,
    tag: Tag,
) -> Result<()> {
    let status = comm
        .receive_into_with_tag(buf, source, tag)
        .map_err(|cause| Error::Collective { operation, cause })?;
    if status.count() != buf.len() {
        return Err(Error::Collective {
            operation,
            cause: Failure::Count {
                expected: buf.len(),
                actual: status.count(),
            },
        });
    }
    Ok(())
}

fn check_root<C: Communicator>(comm: &C, operation: &'static str, root: Rank) -> Result<()> {
    if (0..comm.size()).contains(&root) {
        Ok(())
    } else {
        Err(Error::Collective {
            operation,
            cause: Failure::Rank {
                rank: root,
                size: comm.size(),
            },
        })
    }
}

fn check_count(operation: &'static str, expected: usize, actual: usize) -> Result<()> {
    if expected == actual {
        Ok(())
    } else {
        Err(Error::Collective {
            operation,
            cause: Failure::Count { expected, actual },
        })
    }
}

/// Collective operations over all processes of a communicator
pub trait CommunicatorCollectives: Communicator + Sized {
    /// Block until every process of the communicator has entered the barrier.
    fn barrier(&self) -> Result<()> {
        let token = [0u8];
        let mut incoming = [0u8];
        if self.rank() == 0 {
            for rank in 1..self.size() {
                collective_receive(self, "barrier", &mut incoming, rank, BARRIER_TAG)?;
            }
            for rank in 1..self.size() {
                collective_send(self, "barrier", &token, rank, BARRIER_TAG)?;
            }
        } else {
            collective_send(self, "barrier", &token, 0, BARRIER_TAG)?;
            collective_receive(self, "barrier", &mut incoming, 0, BARRIER_TAG)?;
        }
        Ok(())
    }

    /// Broadcast the contents of `buf` on `root` to the `buf`s of all other processes.
    fn broadcast_into<T: Equivalence>(&self, root: Rank, buf: &mut [T]) -> Result<()> {
        check_root(self, "broadcast", root)?;
        if self.rank() == root {
            for rank in (0..self.size()).filter(|&r| r != root) {
                collective_send(self, "broadcast", buf, rank, BROADCAST_TAG)?;
            }
            Ok(())
        } else {
            collective_receive(self, "broadcast", buf, root, BROADCAST_TAG)
        }
    }

    /// Scatter `sendbuf`, present only on `root`, in equal contiguous parts: process `i`
    /// receives part `i` into `recvbuf`.
    fn scatter_into<T: Equivalence>(
        &self,
        root: Rank,
        sendbuf: Option<&[T]>,
        recvbuf: &mut [T],
    ) -> Result<()> {
        check_root(self, "scatter", root)?;
        if self.rank() != root {
            return collective_receive(self, "scatter", recvbuf, root, SCATTER_TAG);
        }

        let sendbuf = sendbuf.ok_or(Error::MissingInput(root))?;
        let part = recvbuf.len();
        check_count("scatter", part * self.size_usize(), sendbuf.len())?;
        debug!(root, part, "scatter");
        for (i, rank) in (0..self.size()).enumerate() {
            let chunk = &sendbuf[i * part..(i + 1) * part];
            if rank == root {
                recvbuf.copy_from_slice(chunk);
            } else {
                collective_send(self, "scatter", chunk, rank, SCATTER_TAG)?;
            }
        }
        Ok(())
    }

    /// Gather the `sendbuf`s of all processes, concatenated in rank order, into `recvbuf` on
    /// `root`. Other processes pass `None`.
    fn gather_into<T: Equivalence>(
        &self,
        root: Rank,
        sendbuf: &[T],
        recvbuf: Option<&mut [T]>,
    ) -> Result<()> {
        check_root(self, "gather", root)?;
        if self.rank() != root {
            return collective_send(self, "gather", sendbuf, root, GATHER_TAG);
        }

        let recvbuf = recvbuf.ok_or(Error::Count {
            expected: sendbuf.len() * self.size_usize(),
            actual: 0,
        })?;
        let part = sendbuf.len();
        check_count("gather", part * self.size_usize(), recvbuf.len())?;
        debug!(root, part, "gather");
        for (i, rank) in (0..self.size()).enumerate() {
            let chunk = &mut recvbuf[i * part..(i + 1) * part];
            if rank == root {
                chunk.copy_from_slice(sendbuf);
            } else {
                collective_receive(self, "gather", chunk, rank, GATHER_TAG)?;
            }
        }
        Ok(())
    }

    /// Combine the `sendbuf`s of all processes element-wise under `op` into `recvbuf` on `root`.
    /// Contributions are combined in rank order. Other processes pass `None`.
    fn reduce_into<T: Arithmetic>(
        &self,
        root: Rank,
        sendbuf: &[T],
        recvbuf: Option<&mut [T]>,
        op: SystemOperation,
    ) -> Result<()> {
        check_root(self, "reduce", root)?;
        if self.rank() != root {
            return collective_send(self, "reduce", sendbuf, root, REDUCE_TAG);
        }

        let recvbuf = recvbuf.ok_or(Error::Count {
            expected: sendbuf.len(),
            actual: 0,
        })?;
        check_count("reduce", sendbuf.len(), recvbuf.len())?;
        let mut incoming = try_with_capacity(sendbuf.len())?;
        incoming.extend_from_slice(sendbuf);
        recvbuf.fill(op.identity());
        for rank in 0..self.size() {
            if rank == root {
                incoming.copy_from_slice(sendbuf);
            } else {
                collective_receive(self, "reduce", &mut incoming[..], rank, REDUCE_TAG)?;
            }
            for (acc, &x) in recvbuf.iter_mut().zip(&incoming) {
                *acc = op.apply(*acc, x);
            }
        }
        debug!(root, count = sendbuf.len(), "reduce");
        Ok(())
    }

    /// Combine the `sendbuf`s of all processes element-wise under `op` into every `recvbuf`.
    fn all_reduce_into<T: Arithmetic>(
        &self,
        sendbuf: &[T],
        recvbuf: &mut [T],
        op: SystemOperation,
    ) -> Result<()> {
        if self.rank() == 0 {
            self.reduce_into(0, sendbuf, Some(&mut *recvbuf), op)?;
        } else {
            self.reduce_into(0, sendbuf, None, op)?;
        }
        self.broadcast_into(0, recvbuf)
    }

    /// Inclusive prefix reduction: process `r` receives the combination under `op` of the
    /// `sendbuf`s of processes `0..=r`.
    fn scan_into<T: Arithmetic>(
        &self,
        sendbuf: &[T],
        recvbuf: &mut [T],
        op: SystemOperation,
    ) -> Result<()> {
        check_count("scan", sendbuf.len(), recvbuf.len())?;
        let rank = self.rank();
        if rank > 0 {
            collective_receive(self, "scan", recvbuf, rank - 1, SCAN_TAG)?;
            for (acc, &x) in recvbuf.iter_mut().zip(sendbuf) {
                *acc = op.apply(*acc, x);
            }
        } else {
            recvbuf.copy_from_slice(sendbuf);
        }
        if rank + 1 < self.size() {
            collective_send(self, "scan", recvbuf, rank + 1, SCAN_TAG)?;
        }
        Ok(())
    }

    /// Exclusive prefix reduction: process `r` receives the combination under `op` of the
    /// `sendbuf`s of processes `0..r`. Process 0 receives the identity of `op`.
    fn exclusive_scan_into<T: Arithmetic>(
        &self,
        sendbuf: &[T],
        recvbuf: &mut [T],
        op: SystemOperation,
    ) -> Result<()> {
        check_count("exclusive scan", sendbuf.len(), recvbuf.len())?;
        let rank = self.rank();
        if rank > 0 {
            collective_receive(self, "exclusive scan", recvbuf, rank - 1, EXCLUSIVE_SCAN_TAG)?;
        } else {
            recvbuf.fill(op.identity());
        }
        if rank + 1 < self.size() {
            let mut inclusive = try_with_capacity(sendbuf.len())?;
            inclusive.extend(recvbuf.iter().zip(sendbuf).map(|(&p, &x)| op.apply(p, x)));
            collective_send(
                self,
                "exclusive scan",
                &inclusive[..],
                rank + 1,
                EXCLUSIVE_SCAN_TAG,
            )?;
        }
        Ok(())
    }
}

/// Something that can take the role of 'root' in a collective operation.
pub trait Root {
    /// The communicator the collective runs on
    type Comm: CommunicatorCollectives;

    /// The communicator the root belongs to
    fn root_communicator(&self) -> &Self::Comm;

    /// Rank of the root process
    fn root_rank(&self) -> Rank;

    /// Broadcast the contents of `buf` from the root to all other processes.
    fn broadcast_into<T: Equivalence>(&self, buf: &mut [T]) -> Result<()> {
        self.root_communicator()
            .broadcast_into(self.root_rank(), buf)
    }

    /// Receive this process's part of a scatter. Call on every non-root process.
    fn scatter_into<T: Equivalence>(&self, recvbuf: &mut [T]) -> Result<()> {
        self.root_communicator()
            .scatter_into(self.root_rank(), None, recvbuf)
    }

    /// Scatter `sendbuf`. Call on the root process.
    fn scatter_into_root<T: Equivalence>(&self, sendbuf: &[T], recvbuf: &mut [T]) -> Result<()> {
        self.root_communicator()
            .scatter_into(self.root_rank(), Some(sendbuf), recvbuf)
    }

    /// Contribute `sendbuf` to a gather. Call on every non-root process.
    fn gather_into<T: Equivalence>(&self, sendbuf: &[T]) -> Result<()> {
        self.root_communicator()
            .gather_into(self.root_rank(), sendbuf, None)
    }

    /// Gather all contributions into `recvbuf`. Call on the root process.
    fn gather_into_root<T: Equivalence>(&self, sendbuf: &[T], recvbuf: &mut [T]) -> Result<()> {
        self.root_communicator()
            .gather_into(self.root_rank(), sendbuf, Some(recvbuf))
    }

    /// Contribute `sendbuf` to a reduction. Call on every non-root process.
    fn reduce_into<T: Arithmetic>(&self, sendbuf: &[T], op: SystemOperation) -> Result<()> {
        self.root_communicator()
            .reduce_into(self.root_rank(), sendbuf, None, op)
    }

    /// Reduce all contributions into `recvbuf`. Call on the root process.
    fn reduce_into_root<T: Arithmetic>(
        &self,
        sendbuf: &[T],
        recvbuf: &mut [T],
        op: SystemOperation,
    ) -> Result<()> {
        self.root_communicator()
            .reduce_into(self.root_rank(), sendbuf, Some(recvbuf), op)
    }
}

impl<'a, C: 'a + CommunicatorCollectives> Root for Process<'a, C> {
    type Comm = C;

    fn root_communicator(&self) -> &C {
        crate::topology::AsCommunicator::as_communicator(self)
    }

    fn root_rank(&self) -> Rank {
        self.rank()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn operations_and_identities() {
        let sum = SystemOperation::sum();
        assert_eq!(sum.apply(3i32, 4), 7);
        assert_eq!(sum.identity::<i64>(), 0);
        assert_eq!(SystemOperation::product().identity::<u8>(), 1);
        assert_eq!(SystemOperation::max().apply(-3i16, 2), 2);
        assert_eq!(SystemOperation::min().identity::<u32>(), u32::MAX);
        assert_eq!(sum.fold(&[2i64, 5, 1, 4]), 12);
        assert_eq!(sum.fold::<i64>(&[]), 0);
    }

    #[test]
    fn sum_wraps_on_overflow() {
        assert_eq!(SystemOperation::sum().apply(i8::MAX, 1i8), i8::MIN);
    }
}
