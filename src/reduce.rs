//! Distributed sum reduction
//!
//! The sum of a distributed array is computed three independent ways, all delivering the total
//! at rank 0:
//!
//! - `reference_reduce_sum` hands the per-chunk sums to the reduce-to-one collective,
//! - `gather_reduce_sum` gathers every chunk at rank 0 and sums it there sequentially,
//! - `tree_reduce_sum` schedules a binomial tree of point to point messages by hand.
//!
//! # The binomial tree
//!
//! Every process starts in the `Receiving` state with `step = 1`. In each round while
//! `step < size`, a rank that is a multiple of `2 * step` receives the partial sum of
//! `rank + step` (if that rank exists) and doubles `step`. Any other rank sends its partial sum to
//! `rank - step` and moves to `Sent`, taking no further part. The tree has depth
//! `ceil(log2(size))`, every rank but 0 sends exactly once, and rank 0 ends up with the total.
//!
//! ```text
//! step 1:  0 <- 1   2 <- 3   4 <- 5   6 <- 7
//! step 2:  0 <- 2            4 <- 6
//! step 4:  0 <- 4
//! ```

use smallvec::SmallVec;
use tracing::debug;

use crate::collective::{CommunicatorCollectives, SystemOperation};
use crate::datatype::Arithmetic;
use crate::error::{try_with_capacity, Error, Result};
use crate::point_to_point::{Destination, Source};
use crate::prefix::local_sum;
use crate::topology::{Communicator, Rank};
use crate::Tag;

/// Rank that holds the result of every reduction
pub const TREE_ROOT: Rank = 0;

/// Tag of the messages along the edges of the tree
pub const TREE_TAG: Tag = 0;

/// Where a rank stands in the tree protocol
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum TreeState {
    /// Still collecting partial sums; `step` is the distance to the next potential child
    Receiving {
        /// Current step size, a power of two
        step: Rank,
    },
    /// The partial sum has been handed to the parent
    Sent,
}

/// What a rank does in one round of the tree protocol
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum TreeAction {
    /// Receive a partial sum from child `from` and add it in
    Receive {
        /// The child
        from: Rank,
    },
    /// Send the partial sum to parent `to`
    Send {
        /// The parent
        to: Rank,
    },
    /// No child exists at this distance; move on to the next round
    Skip,
}

/// The per-rank state machine of the binomial tree reduction
///
/// Iterating yields the action of each round in order; iteration ends when the rank has sent
/// its partial sum or, for rank 0, when the tree is complete.
#[derive(Clone, Debug)]
pub struct TreeReduction {
    rank: Rank,
    size: Rank,
    state: TreeState,
}

impl TreeReduction {
    /// The schedule of `rank` in a tree over `size` processes
    pub fn new(rank: Rank, size: Rank) -> Result<TreeReduction> {
        if size < 1 {
            return Err(Error::ProcessCount(size));
        }
        if !(0..size).contains(&rank) {
            return Err(Error::Rank { rank, size });
        }
        Ok(TreeReduction {
            rank,
            size,
            state: TreeState::Receiving { step: 1 },
        })
    }

    /// The current state
    pub fn state(&self) -> TreeState {
        self.state
    }

    /// Whether no rounds remain
    pub fn is_finished(&self) -> bool {
        match self.state {
            TreeState::Sent => true,
            TreeState::Receiving { step } => step >= self.size,
        }
    }

    /// All remaining actions, in order
    pub fn schedule(self) -> SmallVec<[TreeAction; 8]> {
        self.collect()
    }
}

impl Iterator for TreeReduction {
    type Item = TreeAction;

    fn next(&mut self) -> Option<TreeAction> {
        let step = match self.state {
            TreeState::Receiving { step } if step < self.size => step,
            _ => return None,
        };

        // Saturating keeps sizes near `Rank::MAX` terminating.
        let span = step.saturating_mul(2);
        if self.rank % span == 0 {
            self.state = TreeState::Receiving { step: span };
            let child = self.rank.checked_add(step).filter(|&c| c < self.size);
            Some(match child {
                Some(from) => TreeAction::Receive { from },
                None => TreeAction::Skip,
            })
        } else {
            self.state = TreeState::Sent;
            Some(TreeAction::Send {
                to: self.rank - step,
            })
        }
    }
}

fn check_process_count<C: Communicator>(comm: &C, process_count: Rank) -> Result<()> {
    if process_count == comm.size() {
        Ok(())
    } else {
        Err(Error::NotSame {
            expected: process_count,
            actual: comm.size(),
        })
    }
}

/// Sum of the distributed array by a binomial tree of point to point messages.
///
/// Every process of `comm` must call this with its own chunk. Returns `Some(total)` on rank 0
/// and `None` on every other rank.
pub fn tree_reduce_sum<C, T>(comm: &C, chunk: &[T], process_count: Rank) -> Result<Option<T>>
where
    C: Communicator,
    T: Arithmetic,
{
    check_process_count(comm, process_count)?;
    let rank = comm.rank();
    let mut partial = local_sum(chunk);

    let mut tree = TreeReduction::new(rank, comm.size())?;
    for action in &mut tree {
        match action {
            TreeAction::Receive { from } => {
                let (child, _) = comm.process_at_rank(from)?.receive_with_tag::<T>(TREE_TAG)?;
                partial = partial.wrapping_add(child);
                debug!(rank, from, ?partial, "tree receive");
            }
            TreeAction::Send { to } => {
                comm.process_at_rank(to)?.send_with_tag(&[partial], TREE_TAG)?;
                debug!(rank, to, ?partial, "tree send");
            }
            TreeAction::Skip => {}
        }
    }

    Ok(match tree.state() {
        TreeState::Receiving { .. } if rank == TREE_ROOT => Some(partial),
        _ => None,
    })
}

/// Sum of the distributed array by the reduce-to-one collective.
///
/// Returns `Some(total)` on rank 0 and `None` on every other rank.
pub fn reference_reduce_sum<C, T>(comm: &C, chunk: &[T], process_count: Rank) -> Result<Option<T>>
where
    C: CommunicatorCollectives,
    T: Arithmetic,
{
    check_process_count(comm, process_count)?;
    let sum = [local_sum(chunk)];
    if comm.rank() == TREE_ROOT {
        let mut total = [T::ZERO];
        comm.reduce_into(TREE_ROOT, &sum, Some(&mut total[..]), SystemOperation::sum())?;
        Ok(Some(total[0]))
    } else {
        comm.reduce_into(TREE_ROOT, &sum, None, SystemOperation::sum())?;
        Ok(None)
    }
}

/// Sum of the distributed array by gathering every chunk at rank 0 and summing there.
///
/// All chunks must have the same length. Returns `Some(total)` on rank 0 and `None` on every
/// other rank.
pub fn gather_reduce_sum<C, T>(comm: &C, chunk: &[T], process_count: Rank) -> Result<Option<T>>
where
    C: CommunicatorCollectives,
    T: Arithmetic,
{
    check_process_count(comm, process_count)?;
    if comm.rank() != TREE_ROOT {
        comm.gather_into(TREE_ROOT, chunk, None)?;
        return Ok(None);
    }

    let len = chunk.len() * comm.size_usize();
    let mut gathered = try_with_capacity(len)?;
    gathered.resize(len, T::ZERO);
    comm.gather_into(TREE_ROOT, chunk, Some(&mut gathered[..]))?;
    Ok(Some(local_sum(&gathered)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::environment::Universe;
    use crate::partition::Partition;

    use TreeAction::*;

    fn schedule(rank: Rank, size: Rank) -> Vec<TreeAction> {
        TreeReduction::new(rank, size).unwrap().schedule().to_vec()
    }

    #[test]
    fn schedules_of_eight() {
        assert_eq!(
            schedule(0, 8),
            vec![Receive { from: 1 }, Receive { from: 2 }, Receive { from: 4 }]
        );
        assert_eq!(schedule(1, 8), vec![Send { to: 0 }]);
        assert_eq!(schedule(2, 8), vec![Receive { from: 3 }, Send { to: 0 }]);
        assert_eq!(
            schedule(4, 8),
            vec![Receive { from: 5 }, Receive { from: 6 }, Send { to: 0 }]
        );
        assert_eq!(schedule(6, 8), vec![Receive { from: 7 }, Send { to: 4 }]);
        assert_eq!(schedule(7, 8), vec![Send { to: 6 }]);
    }

    #[test]
    fn missing_children_are_skipped() {
        // Rank 4 of 5 has no child at distance 1 or 2 and waits until step 4 to send.
        assert_eq!(schedule(4, 5), vec![Skip, Skip, Send { to: 0 }]);
        assert_eq!(
            schedule(0, 5),
            vec![Receive { from: 1 }, Receive { from: 2 }, Receive { from: 4 }]
        );
        assert_eq!(schedule(2, 3), vec![Skip, Send { to: 0 }]);
    }

    #[test]
    fn single_process_does_nothing() {
        let tree = TreeReduction::new(0, 1).unwrap();
        assert!(tree.is_finished());
        assert!(tree.schedule().is_empty());
    }

    #[test]
    fn states() {
        let mut tree = TreeReduction::new(2, 8).unwrap();
        assert_eq!(tree.state(), TreeState::Receiving { step: 1 });
        tree.next();
        assert_eq!(tree.state(), TreeState::Receiving { step: 2 });
        tree.next();
        assert_eq!(tree.state(), TreeState::Sent);
        assert!(tree.is_finished());
        assert_eq!(tree.next(), None);
    }

    #[test]
    fn every_non_root_sends_once_to_a_lower_rank() {
        for size in 1..=33 {
            let mut sends = 0;
            let mut receives = 0;
            for rank in 0..size {
                let actions = schedule(rank, size);
                let own_sends: Vec<Rank> = actions
                    .iter()
                    .filter_map(|a| match a {
                        Send { to } => Some(*to),
                        _ => None,
                    })
                    .collect();
                if rank == 0 {
                    assert!(own_sends.is_empty());
                } else {
                    assert_eq!(own_sends.len(), 1);
                    assert!(own_sends[0] < rank);
                    assert_eq!(actions.last(), Some(&Send { to: own_sends[0] }));
                }
                sends += own_sends.len();
                receives += actions
                    .iter()
                    .filter(|a| matches!(a, Receive { .. }))
                    .count();
            }
            assert_eq!(sends, size as usize - 1);
            assert_eq!(receives, sends);
        }
    }

    #[test]
    fn invalid_schedules() {
        assert!(matches!(TreeReduction::new(0, 0), Err(Error::ProcessCount(0))));
        assert!(matches!(
            TreeReduction::new(3, 3),
            Err(Error::Rank { rank: 3, size: 3 })
        ));
    }

    #[test]
    fn three_ways_agree() {
        let global = [2i64, 5, 1, 4, 3, 0, 6, 2];
        for size in [1, 2, 4, 8] {
            let partition = Partition::new(global.len(), size).unwrap();
            let universe = Universe::new(size).unwrap();
            let sums = universe
                .run(|world| {
                    let chunk = partition.chunk(&global, world.rank())?;
                    Ok((
                        reference_reduce_sum(world, chunk, size)?,
                        gather_reduce_sum(world, chunk, size)?,
                        tree_reduce_sum(world, chunk, size)?,
                    ))
                })
                .unwrap();
            assert_eq!(sums[0], (Some(23), Some(23), Some(23)));
            assert!(sums[1..].iter().all(|s| *s == (None, None, None)));
        }
    }
}
