use scanreduce::environment::Universe;
use scanreduce::input::{random_array, InputConfig};
use scanreduce::partition::{GlobalArray, Partition};
use scanreduce::prefix::{compute_local_prefix, prefix_sequential};
use scanreduce::run::{prefix_sum_run, COORDINATOR};
use scanreduce::traits::*;
use scanreduce::Error;

fn distributed_prefix(global: &[i64], size: i32) -> Vec<i64> {
    let partition = Partition::new(global.len(), size).unwrap();
    let universe = Universe::new(size).unwrap();
    let parts = universe
        .run(|world| {
            let chunk = partition.chunk(global, world.rank())?;
            compute_local_prefix(world, chunk, size)
        })
        .unwrap();
    partition.assemble(&parts).unwrap()
}

#[test]
fn concrete_scenario() {
    let global = [2i64, 5, 1, 4, 3, 0, 6, 2];
    let universe = Universe::new(4).unwrap();
    let parts = universe
        .run(|world| {
            let partition = Partition::new(global.len(), world.size())?;
            compute_local_prefix(world, partition.chunk(&global, world.rank())?, 4)
        })
        .unwrap();
    assert_eq!(
        parts,
        vec![vec![0, 2], vec![7, 8], vec![12, 15], vec![15, 21]]
    );
}

#[test]
fn matches_sequential_for_many_layouts() {
    for size in 1..=8 {
        for chunk_len in [1usize, 2, 3, 7] {
            let len = chunk_len * size as usize;
            let global = random_array(&InputConfig::new(len).seed(len as u64 * 31 + 5))
                .unwrap()
                .into_inner();
            assert_eq!(
                distributed_prefix(&global, size),
                prefix_sequential(&global).unwrap(),
                "len {} on {} processes",
                len,
                size
            );
        }
    }
}

#[test]
fn single_process_has_zero_offset() {
    let global = [4i64, -1, 9];
    assert_eq!(distributed_prefix(&global, 1), vec![0, 4, 3]);
}

#[test]
fn coordinated_run_reports_consistency() {
    let array = GlobalArray::new(vec![2i64, 5, 1, 4, 3, 0, 6, 2]);
    let universe = Universe::new(4).unwrap();
    let reports = universe
        .run(|world| {
            let input = (world.rank() == COORDINATOR).then(|| array.clone());
            prefix_sum_run(world, 8, input)
        })
        .unwrap();

    assert!(reports[1..].iter().all(Option::is_none));
    let report = reports[0].clone().unwrap().verify().unwrap();
    assert_eq!(report.parallel, vec![0, 2, 7, 8, 12, 15, 15, 21]);
    assert_eq!(report.sequential, report.parallel);
    assert_eq!(report.input, array.into_inner());
}

#[test]
fn sums_wrap_around() {
    let global = [i32::MAX, 1, 1, 1];
    let universe = Universe::new(2).unwrap();
    let parts = universe
        .run(|world| {
            let partition = Partition::new(global.len(), world.size())?;
            compute_local_prefix(world, partition.chunk(&global, world.rank())?, 2)
        })
        .unwrap();
    assert_eq!(parts[1], vec![i32::MIN, i32::MIN + 1]);
}

#[test]
fn uneven_layout_is_rejected_before_communicating() {
    let universe = Universe::new(3).unwrap();
    let array = GlobalArray::new(vec![1i64; 8]);
    let outcomes = universe
        .run(|world| {
            let input = (world.rank() == COORDINATOR).then(|| array.clone());
            let outcome = prefix_sum_run(world, 8, input);
            Ok((outcome.err(), world.messages_sent()))
        })
        .unwrap();
    for (err, sent) in outcomes {
        assert!(matches!(err, Some(Error::Partition { len: 8, size: 3 })));
        assert_eq!(sent, 0);
    }
}

#[test]
fn empty_array_is_rejected() {
    let universe = Universe::new(2).unwrap();
    let err = universe
        .run(|world| {
            let input = (world.rank() == COORDINATOR).then(|| GlobalArray::new(vec![]));
            prefix_sum_run::<_, i64>(world, 0, input)
        })
        .unwrap_err();
    assert!(matches!(err, Error::EmptyArray { size: 2 }));
}

#[test]
fn coordinator_must_supply_the_array() {
    let universe = Universe::new(2).unwrap();
    let err = universe
        .run(|world| prefix_sum_run::<_, i64>(world, 4, None))
        .unwrap_err();
    assert!(matches!(err, Error::MissingInput(COORDINATOR)));
}
