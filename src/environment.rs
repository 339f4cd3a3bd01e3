//! In-process message passing environment
//!
//! A `Universe` hosts a fixed fleet of ranks inside the calling process, one thread per rank.
//! Ranks share no state: each one owns a `LocalCommunicator` whose only connection to its peers
//! is a mailbox per rank. Sends are eager and never block; receives block until a message with a
//! matching source and tag arrives. Messages between one pair of ranks that carry the same tag
//! are received in the order they were sent.
//!
//! A failing rank takes the whole fleet down. When a rank returns an error or panics, the fleet
//! is marked as aborted and every rank blocked in a receive gives up with `Failure::Aborted`.
//! Without a configured `receive_timeout`, a receive whose partner is alive but never sends
//! waits forever, exactly like a blocking receive on any other message passing substrate.

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::env;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use conv::ConvUtil;
use tracing::{debug, warn};

use crate::collective::CommunicatorCollectives;
use crate::datatype::Equivalence;
use crate::error::{Error, Failure, Result};
use crate::topology::{Communicator, Rank, Status};
use crate::Tag;

/// Environment variable holding the default fleet size
pub const PROCESSES_VAR: &str = "SCANREDUCE_PROCESSES";
/// Environment variable holding the receive timeout in milliseconds
pub const RECEIVE_TIMEOUT_VAR: &str = "SCANREDUCE_RECEIVE_TIMEOUT_MS";

const DEFAULT_PROCESSES: Rank = 4;
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Settings of a `Universe`
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct UniverseConfig {
    size: Rank,
    receive_timeout: Option<Duration>,
    poll_interval: Duration,
}

impl UniverseConfig {
    /// A fleet of `size` ranks whose receives block without a time limit
    pub fn new(size: Rank) -> UniverseConfig {
        UniverseConfig {
            size,
            receive_timeout: None,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    /// Read the configuration from `SCANREDUCE_PROCESSES` and `SCANREDUCE_RECEIVE_TIMEOUT_MS`.
    ///
    /// Unset variables fall back to 4 processes and no timeout.
    pub fn from_env() -> Result<UniverseConfig> {
        let size = match env::var(PROCESSES_VAR) {
            Ok(value) => value.trim().parse().map_err(|_| Error::Config {
                key: PROCESSES_VAR,
                value,
            })?,
            Err(_) => DEFAULT_PROCESSES,
        };
        let mut config = UniverseConfig::new(size);
        if let Ok(value) = env::var(RECEIVE_TIMEOUT_VAR) {
            let millis: u64 = value.trim().parse().map_err(|_| Error::Config {
                key: RECEIVE_TIMEOUT_VAR,
                value,
            })?;
            config = config.receive_timeout(Duration::from_millis(millis));
        }
        Ok(config)
    }

    /// Give up on a receive after waiting for `timeout`.
    ///
    /// This is a supervision layer on top of the blocking semantics: a receive that times out
    /// fails with `Failure::Timeout` and aborts the fleet.
    pub fn receive_timeout(mut self, timeout: Duration) -> UniverseConfig {
        self.receive_timeout = Some(timeout);
        self
    }

    /// Use a fleet of `size` ranks, keeping the other settings
    pub fn processes(mut self, size: Rank) -> UniverseConfig {
        self.size = size;
        self
    }

    /// How often a blocked receive checks whether the fleet was aborted
    pub fn poll_interval(mut self, interval: Duration) -> UniverseConfig {
        self.poll_interval = interval;
        self
    }

    /// Number of ranks
    pub fn size(&self) -> Rank {
        self.size
    }
}

/// A fixed fleet of ranks hosted on threads of the calling process
#[derive(Debug)]
pub struct Universe {
    config: UniverseConfig,
}

impl Universe {
    /// A fleet of `size` ranks with default settings
    pub fn new(size: Rank) -> Result<Universe> {
        Universe::with_config(UniverseConfig::new(size))
    }

    /// A fleet configured by `config`
    pub fn with_config(config: UniverseConfig) -> Result<Universe> {
        if config.size < 1 {
            return Err(Error::ProcessCount(config.size));
        }
        Ok(Universe { config })
    }

    /// Number of ranks
    pub fn size(&self) -> Rank {
        self.config.size
    }

    /// The settings of this universe
    pub fn config(&self) -> &UniverseConfig {
        &self.config
    }

    /// Run `f` once on every rank, concurrently, and collect the results in rank order.
    ///
    /// If any rank fails, the whole run fails: the fleet is aborted and the error of the rank
    /// that failed first in rank order is returned, preferring root causes over the aborts they
    /// triggered on other ranks.
    pub fn run<F, R>(&self, f: F) -> Result<Vec<R>>
    where
        F: Fn(&LocalCommunicator) -> Result<R> + Sync,
        R: Send,
    {
        let fleet = Arc::new(Fleet::default());
        let comms = self.connect(&fleet);
        debug!(size = self.config.size, "starting fleet");

        let outcomes: Vec<Result<R>> = thread::scope(|scope| {
            let mut handles = Vec::with_capacity(comms.len());
            for comm in comms {
                let rank = comm.rank;
                let f = &f;
                let spawned = thread::Builder::new()
                    .name(format!("rank-{}", rank))
                    .spawn_scoped(scope, move || {
                        let _guard = AbortOnPanic(&comm.fleet);
                        let result = f(&comm);
                        if let Err(ref err) = result {
                            if !err.is_secondary() {
                                warn!(rank, error = %err, "rank failed, aborting the fleet");
                            }
                            comm.abort();
                        }
                        result
                    });
                match spawned {
                    Ok(handle) => handles.push((rank, Ok(handle))),
                    Err(source) => {
                        fleet.abort();
                        handles.push((rank, Err(Error::Spawn { rank, source })));
                    }
                }
            }

            handles
                .into_iter()
                .map(|(rank, handle)| match handle {
                    Ok(handle) => handle.join().unwrap_or(Err(Error::Panicked(rank))),
                    Err(err) => Err(err),
                })
                .collect()
        });

        if outcomes.iter().all(|outcome| outcome.is_ok()) {
            return Ok(outcomes.into_iter().flatten().collect());
        }
        let mut errors: Vec<Error> = outcomes.into_iter().filter_map(|o| o.err()).collect();
        let root_cause = errors
            .iter()
            .position(|err| !err.is_secondary())
            .unwrap_or(0);
        Err(errors.swap_remove(root_cause))
    }

    fn connect(&self, fleet: &Arc<Fleet>) -> Vec<LocalCommunicator> {
        let (senders, receivers): (Vec<Sender<Envelope>>, Vec<Receiver<Envelope>>) =
            (0..self.config.size).map(|_| mpsc::channel()).unzip();

        (0..self.config.size)
            .zip(receivers)
            .map(|(rank, inbox)| LocalCommunicator {
                rank,
                size: self.config.size,
                outboxes: (0..self.config.size)
                    .zip(&senders)
                    .map(|(peer, tx)| if peer == rank { None } else { Some(tx.clone()) })
                    .collect(),
                inbox,
                pending: RefCell::new(VecDeque::new()),
                fleet: Arc::clone(fleet),
                receive_timeout: self.config.receive_timeout,
                poll_interval: self.config.poll_interval,
                sent: Cell::new(0),
            })
            .collect()
    }
}

#[derive(Debug, Default)]
struct Fleet {
    aborted: AtomicBool,
}

impl Fleet {
    fn abort(&self) {
        self.aborted.store(true, Ordering::SeqCst);
    }

    fn is_aborted(&self) -> bool {
        self.aborted.load(Ordering::SeqCst)
    }
}

struct AbortOnPanic<'a>(&'a Fleet);

impl<'a> Drop for AbortOnPanic<'a> {
    fn drop(&mut self) {
        if thread::panicking() {
            self.0.abort();
        }
    }
}

struct Envelope {
    source: Rank,
    tag: Tag,
    payload: Box<dyn Any + Send>,
}

/// The communicator of one rank of a `Universe`
///
/// It is owned by the thread running that rank and cannot be shared with other threads.
pub struct LocalCommunicator {
    rank: Rank,
    size: Rank,
    outboxes: Vec<Option<Sender<Envelope>>>,
    inbox: Receiver<Envelope>,
    pending: RefCell<VecDeque<Envelope>>,
    fleet: Arc<Fleet>,
    receive_timeout: Option<Duration>,
    poll_interval: Duration,
    sent: Cell<usize>,
}

impl LocalCommunicator {
    /// Abort the run on every rank of the fleet.
    pub fn abort(&self) {
        self.fleet.abort();
    }

    /// Whether any rank has aborted the run
    pub fn is_aborted(&self) -> bool {
        self.fleet.is_aborted()
    }

    /// Number of point to point messages this rank has sent so far, including those sent on
    /// behalf of collectives
    pub fn messages_sent(&self) -> usize {
        self.sent.get()
    }

    fn index(&self, rank: Rank) -> std::result::Result<usize, Failure> {
        let invalid = Failure::Rank {
            rank,
            size: self.size,
        };
        if rank >= self.size {
            return Err(invalid);
        }
        rank.value_as::<usize>().map_err(|_| invalid)
    }

    fn take_pending(&self, source: Rank, tag: Tag) -> Option<Envelope> {
        let mut pending = self.pending.borrow_mut();
        let position = pending
            .iter()
            .position(|e| e.source == source && e.tag == tag)?;
        pending.remove(position)
    }

    fn wait_for(&self, source: Rank, tag: Tag) -> std::result::Result<Envelope, Failure> {
        if let Some(envelope) = self.take_pending(source, tag) {
            return Ok(envelope);
        }
        let started = Instant::now();
        loop {
            match self.inbox.recv_timeout(self.poll_interval) {
                Ok(envelope) if envelope.source == source && envelope.tag == tag => {
                    return Ok(envelope)
                }
                Ok(envelope) => self.pending.borrow_mut().push_back(envelope),
                Err(RecvTimeoutError::Timeout) => {
                    if self.fleet.is_aborted() {
                        return Err(Failure::Aborted);
                    }
                    if let Some(after) = self.receive_timeout {
                        if started.elapsed() >= after {
                            return Err(Failure::Timeout { peer: source, after });
                        }
                    }
                }
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(if self.fleet.is_aborted() {
                        Failure::Aborted
                    } else {
                        Failure::PeerLost { peer: source }
                    })
                }
            }
        }
    }
}

impl Communicator for LocalCommunicator {
    fn size(&self) -> Rank {
        self.size
    }

    fn rank(&self) -> Rank {
        self.rank
    }

    fn send_with_tag<T: Equivalence>(
        &self,
        buf: &[T],
        destination: Rank,
        tag: Tag,
    ) -> std::result::Result<(), Failure> {
        let index = self.index(destination)?;
        if self.fleet.is_aborted() {
            return Err(Failure::Aborted);
        }
        let envelope = Envelope {
            source: self.rank,
            tag,
            payload: Box::new(buf.to_vec()),
        };
        match &self.outboxes[index] {
            None => self.pending.borrow_mut().push_back(envelope),
            Some(outbox) => outbox.send(envelope).map_err(|_| {
                if self.fleet.is_aborted() {
                    Failure::Aborted
                } else {
                    Failure::PeerLost { peer: destination }
                }
            })?,
        }
        self.sent.set(self.sent.get() + 1);
        Ok(())
    }

    fn receive_into_with_tag<T: Equivalence>(
        &self,
        buf: &mut [T],
        source: Rank,
        tag: Tag,
    ) -> std::result::Result<Status, Failure> {
        self.index(source)?;
        let envelope = self.wait_for(source, tag)?;
        let payload = envelope
            .payload
            .downcast::<Vec<T>>()
            .map_err(|_| Failure::Type {
                peer: source,
                expected: T::NAME,
            })?;
        if payload.len() > buf.len() {
            return Err(Failure::Truncate {
                received: payload.len(),
                capacity: buf.len(),
            });
        }
        buf[..payload.len()].copy_from_slice(&payload);
        Ok(Status::new(source, tag, payload.len()))
    }
}

impl CommunicatorCollectives for LocalCommunicator {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collective::{Root, SystemOperation};
    use crate::point_to_point::{Destination, Source};

    #[test]
    fn rejects_empty_fleet() {
        assert!(matches!(Universe::new(0), Err(Error::ProcessCount(0))));
    }

    #[test]
    fn overriding_the_size_keeps_the_timeout() {
        let from_env = UniverseConfig::new(4).receive_timeout(Duration::from_millis(250));
        let config = from_env.processes(6);
        assert_eq!(config.size(), 6);
        assert_eq!(
            config,
            UniverseConfig::new(6).receive_timeout(Duration::from_millis(250))
        );
        assert_eq!(from_env.size(), 4);
    }

    #[test]
    fn results_in_rank_order() {
        let universe = Universe::new(5).unwrap();
        let ranks = universe.run(|world| Ok(world.rank())).unwrap();
        assert_eq!(ranks, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn ring() {
        let universe = Universe::new(4).unwrap();
        let received = universe
            .run(|world| {
                let size = world.size();
                let rank = world.rank();
                let next = world.process_at_rank((rank + 1) % size)?;
                let previous = world.process_at_rank((rank - 1 + size) % size)?;
                next.send_value(rank)?;
                let (msg, status) = previous.receive::<Rank>()?;
                assert_eq!(status.source_rank(), previous.rank());
                Ok(msg)
            })
            .unwrap();
        assert_eq!(received, vec![3, 0, 1, 2]);
    }

    #[test]
    fn tags_are_matched_out_of_order() {
        let universe = Universe::new(2).unwrap();
        let got = universe
            .run(|world| {
                let other = world.process_at_rank(1 - world.rank())?;
                if world.rank() == 0 {
                    other.send_with_tag(&[1i64], 1)?;
                    other.send_with_tag(&[2i64], 2)?;
                    Ok(vec![])
                } else {
                    let (second, _) = other.receive_vec_with_tag::<i64>(1, 2)?;
                    let (first, _) = other.receive_vec_with_tag::<i64>(1, 1)?;
                    Ok(vec![first[0], second[0]])
                }
            })
            .unwrap();
        assert_eq!(got[1], vec![1, 2]);
    }

    #[test]
    fn send_to_self() {
        let universe = Universe::new(1).unwrap();
        let got = universe
            .run(|world| {
                let me = world.this_process();
                me.send(&[7u32, 8])?;
                Ok(me.receive_vec::<u32>(2)?.0)
            })
            .unwrap();
        assert_eq!(got[0], vec![7, 8]);
    }

    #[test]
    fn truncation_and_type_mismatch() {
        let universe = Universe::new(2).unwrap();
        let err = universe
            .run(|world| {
                let other = world.process_at_rank(1 - world.rank())?;
                if world.rank() == 0 {
                    other.send(&[1i32, 2, 3])?;
                } else {
                    let mut buf = [0i32; 2];
                    other.receive_into(&mut buf)?;
                }
                Ok(())
            })
            .unwrap_err();
        assert!(matches!(
            err,
            Error::PointToPoint {
                peer: 0,
                cause: Failure::Truncate {
                    received: 3,
                    capacity: 2
                }
            }
        ));

        let err = universe
            .run(|world| {
                let other = world.process_at_rank(1 - world.rank())?;
                if world.rank() == 0 {
                    other.send_value(1u8)?;
                } else {
                    other.receive::<i64>()?;
                }
                Ok(())
            })
            .unwrap_err();
        assert!(matches!(
            err,
            Error::PointToPoint {
                cause: Failure::Type {
                    peer: 0,
                    expected: "i64"
                },
                ..
            }
        ));
    }

    #[test]
    fn invalid_rank() {
        let universe = Universe::new(2).unwrap();
        let err = universe
            .run(|world| world.process_at_rank(2).map(|_| ()))
            .unwrap_err();
        assert!(matches!(err, Error::Rank { rank: 2, size: 2 }));
    }

    #[test]
    fn failure_aborts_blocked_peers() {
        let universe = Universe::new(3).unwrap();
        let err = universe
            .run(|world| {
                if world.rank() == 2 {
                    return Err(Error::MissingInput(2));
                }
                // Never satisfied: rank 2 gives up before sending.
                world.process_at_rank(2)?.receive::<i32>()?;
                Ok(())
            })
            .unwrap_err();
        assert!(matches!(err, Error::MissingInput(2)));
    }

    #[test]
    fn panic_aborts_blocked_peers() {
        let universe = Universe::new(2).unwrap();
        let err = universe
            .run(|world| {
                if world.rank() == 1 {
                    panic!("rank 1 goes down");
                }
                world.process_at_rank(1)?.receive::<i32>()?;
                Ok(())
            })
            .unwrap_err();
        assert!(matches!(err, Error::Panicked(1)));
    }

    #[test]
    fn receive_timeout() {
        let config = UniverseConfig::new(2)
            .receive_timeout(Duration::from_millis(30))
            .poll_interval(Duration::from_millis(5));
        let universe = Universe::with_config(config).unwrap();
        let err = universe
            .run(|world| {
                if world.rank() == 0 {
                    world.process_at_rank(1)?.receive::<i32>()?;
                } else {
                    world.process_at_rank(0)?.receive::<i32>()?;
                }
                Ok(())
            })
            .unwrap_err();
        assert!(matches!(
            err,
            Error::PointToPoint {
                cause: Failure::Timeout { .. },
                ..
            }
        ));
    }

    #[test]
    fn default_collectives() {
        let universe = Universe::new(4).unwrap();
        let results = universe
            .run(|world| {
                let rank = world.rank();
                let root = world.process_at_rank(0)?;
                world.barrier()?;

                let mut value = if rank == 0 { [42i64] } else { [0] };
                root.broadcast_into(&mut value)?;
                assert_eq!(value, [42]);

                let mut part = [0i32; 2];
                if rank == 0 {
                    root.scatter_into_root(&[0, 1, 2, 3, 4, 5, 6, 7], &mut part)?;
                } else {
                    root.scatter_into(&mut part)?;
                }
                assert_eq!(part, [2 * rank, 2 * rank + 1]);

                let mut inclusive = [0i32];
                world.scan_into(&[rank + 1], &mut inclusive, SystemOperation::sum())?;
                let mut exclusive = [0i32];
                world.exclusive_scan_into(&[rank + 1], &mut exclusive, SystemOperation::sum())?;
                assert_eq!(inclusive[0] - exclusive[0], rank + 1);

                let mut max = [0i32];
                world.all_reduce_into(&[rank], &mut max, SystemOperation::max())?;
                assert_eq!(max, [3]);

                let mut sum = [0i32];
                if rank == 0 {
                    root.reduce_into_root(&[rank], &mut sum, SystemOperation::sum())?;
                    let mut all = [0i32; 8];
                    root.gather_into_root(&part, &mut all)?;
                    assert_eq!(all, [0, 1, 2, 3, 4, 5, 6, 7]);
                } else {
                    root.reduce_into(&[rank], SystemOperation::sum())?;
                    root.gather_into(&part)?;
                }
                Ok((inclusive[0], sum[0]))
            })
            .unwrap();
        assert_eq!(
            results.iter().map(|r| r.0).collect::<Vec<_>>(),
            vec![1, 3, 6, 10]
        );
        assert_eq!(results[0].1, 6);
    }
}
