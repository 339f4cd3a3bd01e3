//! Distributed exclusive prefix sums and binomial tree reductions
//!
//! This crate implements two classic distributed array algorithms that run cooperatively across
//! a fixed set of processes which communicate only by explicit message passing:
//!
//! - a distributed **exclusive prefix sum** over an array partitioned into equal contiguous
//!   chunks, one per process (see [`prefix`]), and
//! - a distributed **sum reduction**, computed through the reduce-to-one collective, through a
//!   gather to the coordinator and through a hand-scheduled binomial tree of point-to-point
//!   messages (see [`reduce`]).
//!
//! The message passing substrate is described by the traits in [`topology`],
//! [`point_to_point`] and [`collective`]. Two substrates ship with the crate: the in-process
//! [`environment::Universe`], which hosts every rank on its own thread, and, behind the `mpi`
//! cargo feature, a backend built on the `mpi` crate.
//!
//! # Usage
//!
//! ```no_run
//! use scanreduce::environment::Universe;
//! use scanreduce::partition::GlobalArray;
//! use scanreduce::run::{self, COORDINATOR};
//! use scanreduce::traits::*;
//!
//! let universe = Universe::new(4).unwrap();
//! let reports = universe
//!     .run(|world| {
//!         let input = if world.rank() == COORDINATOR {
//!             Some(GlobalArray::new(vec![2i64, 5, 1, 4, 3, 0, 6, 2]))
//!         } else {
//!             None
//!         };
//!         run::prefix_sum_run(world, 8, input)
//!     })
//!     .unwrap();
//!
//! let report = reports[0].as_ref().unwrap();
//! assert_eq!(report.parallel, vec![0, 2, 7, 8, 12, 15, 15, 21]);
//! ```
//!
//! # Liveness
//!
//! Every communication operation blocks until its local part completes. The algorithms assume
//! a fixed, trusted, always-responsive set of cooperating processes: callers must keep every
//! participant alive for the duration of a call, or bound receives with
//! [`environment::UniverseConfig::receive_timeout`] (or an equivalent supervision layer of their
//! own substrate).

#![warn(missing_docs)]
#![warn(missing_copy_implementations)]

pub mod collective;
pub mod datatype;
pub mod environment;
mod error;
pub mod input;
#[cfg(feature = "mpi")]
pub mod mpi_backend;
pub mod partition;
pub mod point_to_point;
pub mod prefix;
pub mod reduce;
pub mod run;
pub mod topology;

pub use error::{Error, ErrorKind, Failure, Result};

/// Re-exports all traits.
pub mod traits {
    pub use crate::collective::traits::*;
    pub use crate::datatype::traits::*;
    pub use crate::point_to_point::traits::*;
    pub use crate::topology::traits::*;
}

/// Encodes number of values in multi-value messages.
pub type Count = i32;
/// Can be used to tag messages on the sender side and match on the receiver side.
pub type Tag = i32;
