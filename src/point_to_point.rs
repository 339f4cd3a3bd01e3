//! Point to point communication
//!
//! Endpoints of communication are described by types that implement the `Source` and
//! `Destination` traits; a `Process` implements both. Communication operations are default
//! methods on those traits, built on the communicator's send and receive primitives.
//!
//! Every operation blocks. There is no cancellation: a send or receive whose partner never
//! shows up waits until the substrate reports a failure (peer gone, fleet aborted or, when
//! configured, a supervision timeout).

use tracing::trace;

use crate::datatype::Equivalence;
use crate::error::{try_with_capacity, Error, Result};
use crate::topology::{AsCommunicator, Communicator, Process, Rank, Status};
use crate::Tag;

/// Point to point communication traits
pub mod traits {
    pub use super::{Destination, Source};
}

/// Tag used when none is given
pub const DEFAULT_TAG: Tag = 0;

/// Something that can be used as the source in a point to point receive operation
pub trait Source: AsCommunicator {
    /// `Rank` that identifies the source
    fn source_rank(&self) -> Rank;

    /// Receive a message tagged `tag` into `buf`.
    fn receive_into_with_tag<T: Equivalence>(&self, buf: &mut [T], tag: Tag) -> Result<Status> {
        let source = self.source_rank();
        let status = self
            .as_communicator()
            .receive_into_with_tag(buf, source, tag)
            .map_err(|cause| Error::PointToPoint { peer: source, cause })?;
        trace!(source, tag, count = status.count(), "received");
        Ok(status)
    }

    /// Receive a message into `buf`.
    fn receive_into<T: Equivalence>(&self, buf: &mut [T]) -> Result<Status> {
        self.receive_into_with_tag(buf, DEFAULT_TAG)
    }

    /// Receive a message containing exactly one `T`, tagged `tag`.
    fn receive_with_tag<T: Equivalence>(&self, tag: Tag) -> Result<(T, Status)> {
        let mut value = [T::default()];
        let status = self.receive_into_with_tag(&mut value, tag)?;
        if status.count() != 1 {
            return Err(Error::Count {
                expected: 1,
                actual: status.count(),
            });
        }
        Ok((value[0], status))
    }

    /// Receive a message containing exactly one `T`.
    fn receive<T: Equivalence>(&self) -> Result<(T, Status)> {
        self.receive_with_tag(DEFAULT_TAG)
    }

    /// Receive a message of exactly `len` elements into a freshly allocated vector.
    fn receive_vec_with_tag<T: Equivalence>(
        &self,
        len: usize,
        tag: Tag,
    ) -> Result<(Vec<T>, Status)> {
        let mut buf = try_with_capacity(len)?;
        buf.resize(len, T::default());
        let status = self.receive_into_with_tag(&mut buf[..], tag)?;
        if status.count() != len {
            return Err(Error::Count {
                expected: len,
                actual: status.count(),
            });
        }
        Ok((buf, status))
    }

    /// Receive a message of exactly `len` elements into a freshly allocated vector.
    fn receive_vec<T: Equivalence>(&self, len: usize) -> Result<(Vec<T>, Status)> {
        self.receive_vec_with_tag(len, DEFAULT_TAG)
    }
}

/// Something that can be used as the destination in a point to point send operation
pub trait Destination: AsCommunicator {
    /// `Rank` that identifies the destination
    fn destination_rank(&self) -> Rank;

    /// Blocking standard mode send of `buf`, tagged `tag`.
    fn send_with_tag<T: Equivalence>(&self, buf: &[T], tag: Tag) -> Result<()> {
        let destination = self.destination_rank();
        trace!(destination, tag, count = buf.len(), "sending");
        self.as_communicator()
            .send_with_tag(buf, destination, tag)
            .map_err(|cause| Error::PointToPoint {
                peer: destination,
                cause,
            })
    }

    /// Blocking standard mode send of `buf`.
    fn send<T: Equivalence>(&self, buf: &[T]) -> Result<()> {
        self.send_with_tag(buf, DEFAULT_TAG)
    }

    /// Send a single value.
    fn send_value<T: Equivalence>(&self, value: T) -> Result<()> {
        self.send(&[value])
    }
}

impl<'a, C: 'a + Communicator> Source for Process<'a, C> {
    fn source_rank(&self) -> Rank {
        self.rank()
    }
}

impl<'a, C: 'a + Communicator> Destination for Process<'a, C> {
    fn destination_rank(&self) -> Rank {
        self.rank()
    }
}
