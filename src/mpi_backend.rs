//! Running on an MPI library
//!
//! `MpiCommunicator` wraps a communicator of the `mpi` crate. Point to point operations map to
//! blocking `MPI_Send` and `MPI_Recv`, and every collective is delegated to its native MPI
//! counterpart instead of the linear default implementations.
//!
//! MPI reports communication errors through its error handler, which aborts the job by default,
//! so the operations here only fail on arguments they can check before calling into MPI.
//!
//! # Examples
//!
//! ```no_run
//! use scanreduce::mpi_backend::MpiCommunicator;
//! use scanreduce::traits::*;
//!
//! let universe = mpi::initialize().unwrap();
//! let world = MpiCommunicator::world(&universe);
//! println!("rank {} of {}", world.rank(), world.size());
//! ```

use conv::ConvUtil;
use mpi::collective::{CommunicatorCollectives as _, Root as _};
use mpi::datatype::Equivalence as MpiEquivalence;
use mpi::point_to_point::{Destination as _, Source as _};
use mpi::topology::{Communicator as _, SimpleCommunicator};

use crate::collective::{CommunicatorCollectives, SystemOperation};
use crate::datatype::{Arithmetic, Equivalence};
use crate::error::{Error, Failure, Result};
use crate::topology::{Communicator, Rank, Status};
use crate::Tag;

/// A communicator backed by an MPI library
pub struct MpiCommunicator {
    comm: SimpleCommunicator,
}

impl MpiCommunicator {
    /// The world communicator of an initialized MPI `universe`
    pub fn world(universe: &mpi::environment::Universe) -> MpiCommunicator {
        MpiCommunicator {
            comm: universe.world(),
        }
    }

    /// Wrap an existing MPI communicator
    pub fn new(comm: SimpleCommunicator) -> MpiCommunicator {
        MpiCommunicator { comm }
    }

    /// The wrapped MPI communicator
    pub fn raw(&self) -> &SimpleCommunicator {
        &self.comm
    }

    fn check_peer(&self, rank: Rank) -> std::result::Result<Rank, Failure> {
        if (0..self.comm.size()).contains(&rank) {
            Ok(rank)
        } else {
            Err(Failure::Rank {
                rank,
                size: self.comm.size(),
            })
        }
    }

    fn check_root(&self, operation: &'static str, root: Rank) -> Result<Rank> {
        self.check_peer(root)
            .map_err(|cause| Error::Collective { operation, cause })
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

impl Communicator for MpiCommunicator {
    fn size(&self) -> Rank {
        self.comm.size()
    }

    fn rank(&self) -> Rank {
        self.comm.rank()
    }

    fn send_with_tag<T: Equivalence>(
        &self,
        buf: &[T],
        destination: Rank,
        tag: Tag,
    ) -> std::result::Result<(), Failure> {
        let destination = self.check_peer(destination)?;
        self.comm
            .process_at_rank(destination)
            .send_with_tag(buf, tag);
        Ok(())
    }

    fn receive_into_with_tag<T: Equivalence>(
        &self,
        buf: &mut [T],
        source: Rank,
        tag: Tag,
    ) -> std::result::Result<Status, Failure> {
        let source = self.check_peer(source)?;
        let status = self
            .comm
            .process_at_rank(source)
            .receive_into_with_tag(buf, tag);
        let count = status
            .count(<T as MpiEquivalence>::equivalent_datatype())
            .value_as::<usize>()
            .unwrap_or(0);
        Ok(Status::new(status.source_rank(), status.tag(), count))
    }
}

impl CommunicatorCollectives for MpiCommunicator {
    fn barrier(&self) -> Result<()> {
        self.comm.barrier();
        Ok(())
    }

    fn broadcast_into<T: Equivalence>(&self, root: Rank, buf: &mut [T]) -> Result<()> {
        let root = self.check_root("broadcast", root)?;
        self.comm.process_at_rank(root).broadcast_into(buf);
        Ok(())
    }

    fn scatter_into<T: Equivalence>(
        &self,
        root: Rank,
        sendbuf: Option<&[T]>,
        recvbuf: &mut [T],
    ) -> Result<()> {
        let root = self.check_root("scatter", root)?;
        let root_process = self.comm.process_at_rank(root);
        if self.rank() == root {
            let sendbuf = sendbuf.ok_or(Error::MissingInput(root))?;
            check_count("scatter", recvbuf.len() * self.size_usize(), sendbuf.len())?;
            root_process.scatter_into_root(sendbuf, recvbuf);
        } else {
            root_process.scatter_into(recvbuf);
        }
        Ok(())
    }

    fn gather_into<T: Equivalence>(
        &self,
        root: Rank,
        sendbuf: &[T],
        recvbuf: Option<&mut [T]>,
    ) -> Result<()> {
        let root = self.check_root("gather", root)?;
        let root_process = self.comm.process_at_rank(root);
        match recvbuf {
            Some(recvbuf) if self.rank() == root => {
                check_count("gather", sendbuf.len() * self.size_usize(), recvbuf.len())?;
                root_process.gather_into_root(sendbuf, recvbuf);
            }
            None if self.rank() == root => {
                return Err(Error::Count {
                    expected: sendbuf.len() * self.size_usize(),
                    actual: 0,
                })
            }
            _ => root_process.gather_into(sendbuf),
        }
        Ok(())
    }

    fn reduce_into<T: Arithmetic>(
        &self,
        root: Rank,
        sendbuf: &[T],
        recvbuf: Option<&mut [T]>,
        op: SystemOperation,
    ) -> Result<()> {
        let root = self.check_root("reduce", root)?;
        let root_process = self.comm.process_at_rank(root);
        match recvbuf {
            Some(recvbuf) if self.rank() == root => {
                check_count("reduce", sendbuf.len(), recvbuf.len())?;
                root_process.reduce_into_root(sendbuf, recvbuf, op.to_mpi());
            }
            None if self.rank() == root => {
                return Err(Error::Count {
                    expected: sendbuf.len(),
                    actual: 0,
                })
            }
            _ => root_process.reduce_into(sendbuf, op.to_mpi()),
        }
        Ok(())
    }

    fn all_reduce_into<T: Arithmetic>(
        &self,
        sendbuf: &[T],
        recvbuf: &mut [T],
        op: SystemOperation,
    ) -> Result<()> {
        check_count("all reduce", sendbuf.len(), recvbuf.len())?;
        self.comm.all_reduce_into(sendbuf, recvbuf, op.to_mpi());
        Ok(())
    }

    fn scan_into<T: Arithmetic>(
        &self,
        sendbuf: &[T],
        recvbuf: &mut [T],
        op: SystemOperation,
    ) -> Result<()> {
        check_count("scan", sendbuf.len(), recvbuf.len())?;
        self.comm.scan_into(sendbuf, recvbuf, op.to_mpi());
        Ok(())
    }

    fn exclusive_scan_into<T: Arithmetic>(
        &self,
        sendbuf: &[T],
        recvbuf: &mut [T],
        op: SystemOperation,
    ) -> Result<()> {
        check_count("exclusive scan", sendbuf.len(), recvbuf.len())?;
        self.comm.exclusive_scan_into(sendbuf, recvbuf, op.to_mpi());
        // MPI leaves the result on rank 0 undefined.
        if self.rank() == 0 {
            recvbuf.fill(op.identity());
        }
        Ok(())
    }
}
