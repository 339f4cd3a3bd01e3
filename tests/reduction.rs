use std::cell::Cell;

use scanreduce::environment::{LocalCommunicator, Universe};
use scanreduce::input::{random_array, InputConfig};
use scanreduce::partition::{GlobalArray, Partition};
use scanreduce::prefix::local_sum;
use scanreduce::reduce::{gather_reduce_sum, reference_reduce_sum, tree_reduce_sum};
use scanreduce::run::{reduction_run, COORDINATOR};
use scanreduce::topology::{Rank, Status};
use scanreduce::traits::*;
use scanreduce::{Failure, Tag};

/// Counts the messages that leave through it
struct Counting<'a> {
    inner: &'a LocalCommunicator,
    sends: Cell<usize>,
}

impl<'a> Communicator for Counting<'a> {
    fn size(&self) -> Rank {
        self.inner.size()
    }

    fn rank(&self) -> Rank {
        self.inner.rank()
    }

    fn send_with_tag<T: Equivalence>(
        &self,
        buf: &[T],
        destination: Rank,
        tag: Tag,
    ) -> Result<(), Failure> {
        self.sends.set(self.sends.get() + 1);
        self.inner.send_with_tag(buf, destination, tag)
    }

    fn receive_into_with_tag<T: Equivalence>(
        &self,
        buf: &mut [T],
        source: Rank,
        tag: Tag,
    ) -> Result<Status, Failure> {
        self.inner.receive_into_with_tag(buf, source, tag)
    }
}

#[test]
fn tree_sends_one_message_per_non_root() {
    for size in 1..=17 {
        let global = vec![1i64; 2 * size as usize];
        let partition = Partition::new(global.len(), size).unwrap();
        let universe = Universe::new(size).unwrap();
        let outcomes = universe
            .run(|world| {
                let counting = Counting {
                    inner: world,
                    sends: Cell::new(0),
                };
                let chunk = partition.chunk(&global, world.rank())?;
                let total = tree_reduce_sum(&counting, chunk, size)?;
                Ok((total, counting.sends.get()))
            })
            .unwrap();

        assert_eq!(outcomes[0].0, Some(2 * size as i64));
        assert_eq!(outcomes[0].1, 0);
        for (total, sends) in &outcomes[1..] {
            assert_eq!(*total, None);
            assert_eq!(*sends, 1);
        }
        let messages: usize = outcomes.iter().map(|o| o.1).sum();
        assert_eq!(messages, size as usize - 1);
    }
}

#[test]
fn single_process_tree_is_silent() {
    let universe = Universe::new(1).unwrap();
    let outcomes = universe
        .run(|world| {
            let total = tree_reduce_sum(world, &[3i32, 4], 1)?;
            Ok((total, world.messages_sent()))
        })
        .unwrap();
    assert_eq!(outcomes, vec![(Some(7), 0)]);
}

#[test]
fn all_reductions_agree_with_the_sequential_sum() {
    for size in [1, 2, 3, 5, 6, 8, 13] {
        let len = 3 * size as usize;
        let global = random_array(&InputConfig::new(len).seed(size as u64))
            .unwrap()
            .into_inner();
        let expected = local_sum(&global);
        let partition = Partition::new(len, size).unwrap();
        let universe = Universe::new(size).unwrap();
        let sums = universe
            .run(|world| {
                let chunk = partition.chunk(&global, world.rank())?;
                Ok([
                    reference_reduce_sum(world, chunk, size)?,
                    gather_reduce_sum(world, chunk, size)?,
                    tree_reduce_sum(world, chunk, size)?,
                ])
            })
            .unwrap();
        assert_eq!(sums[0], [Some(expected); 3], "{} processes", size);
    }
}

#[test]
fn coordinated_reduction_run() {
    let array = GlobalArray::new(vec![2i64, 5, 1, 4, 3, 0, 6, 2]);
    for size in [1, 2, 4, 8] {
        let universe = Universe::new(size).unwrap();
        let reports = universe
            .run(|world| {
                let input = (world.rank() == COORDINATOR).then(|| array.clone());
                reduction_run(world, 8, input)
            })
            .unwrap();
        let report = reports[0].clone().unwrap().verify().unwrap();
        assert_eq!(report.tree, 23);
        assert_eq!(report.collective, 23);
        assert_eq!(report.gathered, 23);
        assert_eq!(report.sequential, 23);
    }
}

#[test]
fn mismatched_process_count() {
    let universe = Universe::new(2).unwrap();
    let err = universe
        .run(|world| tree_reduce_sum(world, &[1i64], 3))
        .unwrap_err();
    assert!(matches!(
        err,
        scanreduce::Error::NotSame {
            expected: 3,
            actual: 2
        }
    ));
}
