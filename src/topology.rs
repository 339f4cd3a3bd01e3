//! Organizing processes as communicators
//!
//! All processes partaking in a run are organized in a communicator. Processes are addressed via
//! their `Rank` within the communicator; a `Process` pairs a communicator with one rank and is
//! the endpoint of point to point operations and the root of rooted collectives.
//!
//! A communicator owns the two primitives every other operation in this crate is built from: a
//! blocking typed send and a blocking typed receive, both matched on the partner rank and a tag.
//! Messages between one pair of processes that carry the same tag are received in the order they
//! were sent.

use std::fmt;

use conv::ConvUtil;

use crate::datatype::Equivalence;
use crate::error::{Error, Failure, Result};
use crate::Tag;

/// Topology traits
pub mod traits {
    pub use super::{AsCommunicator, Communicator};
}

/// Identifies a certain process within a communicator.
pub type Rank = i32;

/// Something that has a communicator associated with it
pub trait AsCommunicator {
    /// The type of the associated communicator
    type Out: Communicator;
    /// Returns the associated communicator.
    fn as_communicator(&self) -> &Self::Out;
}

/// A fixed group of processes that exchange messages
///
/// Implementations must keep `rank()` and `size()` stable for the lifetime of the communicator.
pub trait Communicator {
    /// Number of processes in this communicator
    fn size(&self) -> Rank;

    /// The `Rank` that identifies the calling process within this communicator
    fn rank(&self) -> Rank;

    /// Send the contents of `buf` to the process at rank `destination`, tagged `tag`.
    ///
    /// Blocks until the buffer may be reused.
    fn send_with_tag<T: Equivalence>(
        &self,
        buf: &[T],
        destination: Rank,
        tag: Tag,
    ) -> std::result::Result<(), Failure>;

    /// Receive a message tagged `tag` from the process at rank `source` into `buf`.
    ///
    /// Blocks until a matching message has arrived. The message may be shorter than `buf`; the
    /// returned `Status` reports how many elements were written.
    fn receive_into_with_tag<T: Equivalence>(
        &self,
        buf: &mut [T],
        source: Rank,
        tag: Tag,
    ) -> std::result::Result<Status, Failure>;

    /// Number of processes as a `usize`
    fn size_usize(&self) -> usize {
        self.size().value_as().unwrap_or(0)
    }

    /// Check that `rank` names a process of this communicator
    fn check_rank(&self, rank: Rank) -> Result<Rank> {
        if (0..self.size()).contains(&rank) {
            Ok(rank)
        } else {
            Err(Error::Rank {
                rank,
                size: self.size(),
            })
        }
    }

    /// A `Process` for the calling process
    fn this_process(&self) -> Process<'_, Self>
    where
        Self: Sized,
    {
        Process {
            comm: self,
            rank: self.rank(),
        }
    }

    /// A `Process` for the process with rank `rank`
    fn process_at_rank(&self, rank: Rank) -> Result<Process<'_, Self>>
    where
        Self: Sized,
    {
        let rank = self.check_rank(rank)?;
        Ok(Process { comm: self, rank })
    }
}

impl<'a, C: Communicator> Communicator for &'a C {
    fn size(&self) -> Rank {
        (**self).size()
    }

    fn rank(&self) -> Rank {
        (**self).rank()
    }

    fn send_with_tag<T: Equivalence>(
        &self,
        buf: &[T],
        destination: Rank,
        tag: Tag,
    ) -> std::result::Result<(), Failure> {
        (**self).send_with_tag(buf, destination, tag)
    }

    fn receive_into_with_tag<T: Equivalence>(
        &self,
        buf: &mut [T],
        source: Rank,
        tag: Tag,
    ) -> std::result::Result<Status, Failure> {
        (**self).receive_into_with_tag(buf, source, tag)
    }
}

/// Identifies a process by its `Rank` within a certain communicator.
pub struct Process<'a, C: 'a + Communicator> {
    comm: &'a C,
    rank: Rank,
}

impl<'a, C: 'a + Communicator> Process<'a, C> {
    /// The process rank
    pub fn rank(&self) -> Rank {
        self.rank
    }

    /// Whether this is the calling process
    pub fn is_self(&self) -> bool {
        self.rank == self.comm.rank()
    }
}

impl<'a, C: 'a + Communicator> Clone for Process<'a, C> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<'a, C: 'a + Communicator> Copy for Process<'a, C> {}

impl<'a, C: 'a + Communicator> AsCommunicator for Process<'a, C> {
    type Out = C;
    fn as_communicator(&self) -> &Self::Out {
        self.comm
    }
}

impl<'a, C: 'a + Communicator> fmt::Debug for Process<'a, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Process")
            .field("rank", &self.rank)
            .field("size", &self.comm.size())
            .finish()
    }
}

/// Describes the result of a receive operation
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Status {
    source: Rank,
    tag: Tag,
    count: usize,
}

impl Status {
    /// Describe a received message
    pub fn new(source: Rank, tag: Tag, count: usize) -> Status {
        Status { source, tag, count }
    }

    /// The rank of the message source
    pub fn source_rank(&self) -> Rank {
        self.source
    }

    /// The message tag
    pub fn tag(&self) -> Tag {
        self.tag
    }

    /// Number of elements contained in the message
    pub fn count(&self) -> usize {
        self.count
    }
}
