//! Error handling
//!
//! Two layers of errors exist. A [`Failure`] is what a substrate reports when a single message
//! or collective step could not complete. An [`Error`] is what a run reports: it records the
//! operation that failed together with its `Failure`, or one of the argument and validation
//! errors detected before or after communication. Every error is fatal to the whole run.

use std::time::Duration;

use thiserror::Error;

use crate::topology::Rank;

/// Result type used throughout the crate
pub type Result<T> = std::result::Result<T, Error>;

/// Why a single communication step did not complete
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Failure {
    /// The peer has gone away; no message will ever arrive from or reach it
    #[error("rank {peer} is no longer reachable")]
    PeerLost {
        /// The unreachable peer
        peer: Rank,
    },
    /// Another member of the fleet aborted the run
    #[error("the run was aborted by another process")]
    Aborted,
    /// The supervision timeout elapsed while waiting on a peer
    #[error("timed out after {after:?} waiting on rank {peer}")]
    Timeout {
        /// The peer being waited on
        peer: Rank,
        /// The configured timeout
        after: Duration,
    },
    /// The receive buffer is too small for the message
    #[error("message of {received} elements truncated into a buffer of {capacity}")]
    Truncate {
        /// Number of elements sent
        received: usize,
        /// Capacity of the receive buffer
        capacity: usize,
    },
    /// The message carries a different element type than the receiver expects
    #[error("message from rank {peer} does not carry elements of type {expected}")]
    Type {
        /// The sender of the message
        peer: Rank,
        /// Name of the element type the receiver expects
        expected: &'static str,
    },
    /// The communicator has no process with this rank
    #[error("rank {rank} does not exist in a communicator of size {size}")]
    Rank {
        /// The offending rank
        rank: Rank,
        /// Size of the communicator
        size: Rank,
    },
    /// Buffers passed to a collective do not agree with the communicator size
    #[error("collective buffer holds {actual} elements where {expected} are required")]
    Count {
        /// Required number of elements
        expected: usize,
        /// Number of elements passed
        actual: usize,
    },
}

/// Errors reported by a run
#[derive(Debug, Error)]
pub enum Error {
    /// The process count is not usable
    #[error("a run needs at least one process, got {0}")]
    ProcessCount(Rank),
    /// The array cannot be split into equal chunks
    #[error("cannot partition {len} elements across {size} processes: length is not a multiple of the process count")]
    Partition {
        /// Length of the global array
        len: usize,
        /// Number of processes
        size: Rank,
    },
    /// The array holds no elements, so chunks would be empty
    #[error("cannot partition an empty array across {size} processes")]
    EmptyArray {
        /// Number of processes
        size: Rank,
    },
    /// A rank outside of `[0, size)` was named
    #[error("rank {rank} is out of range for {size} processes")]
    Rank {
        /// The offending rank
        rank: Rank,
        /// Number of processes
        size: Rank,
    },
    /// A buffer has the wrong number of elements
    #[error("expected {expected} elements, got {actual}")]
    Count {
        /// Required number of elements
        expected: usize,
        /// Number of elements present
        actual: usize,
    },
    /// The coordinator did not supply the global array
    #[error("the coordinator (rank {0}) must supply the global array")]
    MissingInput(Rank),
    /// The caller's process count disagrees with the communicator
    #[error("caller assumes {expected} processes but the communicator has {actual}")]
    NotSame {
        /// Process count passed by the caller
        expected: Rank,
        /// Size of the communicator
        actual: Rank,
    },
    /// A collective operation failed
    #[error("collective {operation} failed: {cause}")]
    Collective {
        /// Name of the collective
        operation: &'static str,
        /// What went wrong
        #[source]
        cause: Failure,
    },
    /// A point-to-point send or receive failed
    #[error("point-to-point exchange with rank {peer} failed: {cause}")]
    PointToPoint {
        /// The partner of the exchange
        peer: Rank,
        /// What went wrong
        #[source]
        cause: Failure,
    },
    /// A transient buffer could not be allocated
    #[error("failed to allocate a buffer of {0} elements")]
    Allocation(usize),
    /// A distributed result disagrees with its sequential reference
    #[error("{algorithm} produced {actual}, the sequential reference is {expected}")]
    Validation {
        /// The algorithm that disagreed
        algorithm: &'static str,
        /// What it produced
        actual: String,
        /// What the reference produced
        expected: String,
    },
    /// A configuration value could not be used
    #[error("invalid value {value:?} for {key}")]
    Config {
        /// The configuration key
        key: &'static str,
        /// The rejected value
        value: String,
    },
    /// A rank panicked; the whole fleet was torn down
    #[error("rank {0} panicked")]
    Panicked(Rank),
    /// A rank could not be started
    #[error("failed to start rank {rank}")]
    Spawn {
        /// The rank that did not start
        rank: Rank,
        /// The underlying I/O error
        #[source]
        source: std::io::Error,
    },
}

/// Classes of errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Invalid arguments handed to the crate
    Argument,
    /// The array cannot be partitioned
    Partition,
    /// A collective did not complete
    Collective,
    /// A point-to-point send or receive did not complete
    PointToPoint,
    /// Memory for a transient buffer was not available
    Allocation,
    /// Distributed and sequential results disagree
    Validation,
    /// A process died while executing its part of the run
    Process,
}

impl Error {
    /// The class of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::ProcessCount(_)
            | Error::Rank { .. }
            | Error::Count { .. }
            | Error::MissingInput(_)
            | Error::NotSame { .. }
            | Error::Config { .. } => ErrorKind::Argument,
            Error::Partition { .. } | Error::EmptyArray { .. } => ErrorKind::Partition,
            Error::Collective { .. } => ErrorKind::Collective,
            Error::PointToPoint { .. } => ErrorKind::PointToPoint,
            Error::Allocation(_) => ErrorKind::Allocation,
            Error::Validation { .. } => ErrorKind::Validation,
            Error::Panicked(_) | Error::Spawn { .. } => ErrorKind::Process,
        }
    }

    /// Whether this error only reflects another process having aborted the run
    pub fn is_secondary(&self) -> bool {
        matches!(
            self,
            Error::Collective {
                cause: Failure::Aborted,
                ..
            } | Error::PointToPoint {
                cause: Failure::Aborted,
                ..
            }
        )
    }
}

/// Reserve a vector for `len` elements, reporting exhaustion instead of aborting
pub(crate) fn try_with_capacity<T>(len: usize) -> Result<Vec<T>> {
    let mut v = Vec::new();
    v.try_reserve_exact(len).map_err(|_| Error::Allocation(len))?;
    Ok(v)
}
