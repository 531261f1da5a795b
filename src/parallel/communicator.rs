//! Rank-to-rank messaging
//!
//! Ranks exchange tagged point-to-point messages and take part in scalar
//! all-reduces. Distributed runs use the MPI backend (`mpi` feature).
//! `LocalCommunicator` connects ranks running as threads of one process
//! through unbounded channels, for tests and single-node runs: sends never
//! block, receives block until a message with the requested source and tag
//! arrives or another rank of the group fails.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{channel, Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::time::Duration;

use crate::error::{Error, Result};

/// Message body
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Indices(Vec<usize>),
    Values(Vec<f64>),
}

impl Payload {
    pub fn len(&self) -> usize {
        match self {
            Payload::Indices(v) => v.len(),
            Payload::Values(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReduceOp {
    Min,
    Max,
    Sum,
}

impl ReduceOp {
    fn apply(self, a: f64, b: f64) -> f64 {
        match self {
            ReduceOp::Min => a.min(b),
            ReduceOp::Max => a.max(b),
            ReduceOp::Sum => a + b,
        }
    }
}

const TAG_REDUCE_GATHER: u32 = u32::MAX - 1;
const TAG_REDUCE_BCAST: u32 = u32::MAX;

pub trait Communicator: Send {
    fn rank(&self) -> usize;
    fn size(&self) -> usize;
    fn send(&mut self, dest: usize, tag: u32, payload: Payload) -> Result<()>;
    fn recv(&mut self, source: usize, tag: u32) -> Result<Payload>;

    /// Combine one value from every rank; all ranks receive the result.
    ///
    /// Rank 0 gathers in rank order and broadcasts, so every rank sees the
    /// same bits regardless of message arrival order.
    fn all_reduce(&mut self, value: f64, op: ReduceOp) -> Result<f64> {
        let size = self.size();
        if size == 1 {
            return Ok(value);
        }
        if self.rank() == 0 {
            let mut acc = value;
            for source in 1..size {
                let v = expect_values(self.rank(), source, self.recv(source, TAG_REDUCE_GATHER)?)?;
                acc = op.apply(acc, scalar(self.rank(), source, &v)?);
            }
            for dest in 1..size {
                self.send(dest, TAG_REDUCE_BCAST, Payload::Values(vec![acc]))?;
            }
            Ok(acc)
        } else {
            self.send(0, TAG_REDUCE_GATHER, Payload::Values(vec![value]))?;
            let v = expect_values(self.rank(), 0, self.recv(0, TAG_REDUCE_BCAST)?)?;
            scalar(self.rank(), 0, &v)
        }
    }
}

pub(crate) fn expect_values(rank: usize, peer: usize, payload: Payload) -> Result<Vec<f64>> {
    match payload {
        Payload::Values(v) => Ok(v),
        Payload::Indices(_) => Err(Error::Comm {
            rank,
            detail: format!("expected values from rank {}, received indices", peer),
        }),
    }
}

pub(crate) fn expect_indices(rank: usize, peer: usize, payload: Payload) -> Result<Vec<usize>> {
    match payload {
        Payload::Indices(v) => Ok(v),
        Payload::Values(_) => Err(Error::Comm {
            rank,
            detail: format!("expected indices from rank {}, received values", peer),
        }),
    }
}

fn scalar(rank: usize, peer: usize, v: &[f64]) -> Result<f64> {
    match v {
        [x] => Ok(*x),
        _ => Err(Error::CommMismatch {
            rank,
            peer,
            expected: 1,
            received: v.len(),
        }),
    }
}

/// Single-rank communicator
#[derive(Debug, Default, Clone, Copy)]
pub struct SerialCommunicator;

impl Communicator for SerialCommunicator {
    fn rank(&self) -> usize {
        0
    }

    fn size(&self) -> usize {
        1
    }

    fn send(&mut self, dest: usize, _tag: u32, _payload: Payload) -> Result<()> {
        Err(Error::Comm {
            rank: 0,
            detail: format!("serial run has no rank {}", dest),
        })
    }

    fn recv(&mut self, source: usize, _tag: u32) -> Result<Payload> {
        Err(Error::Comm {
            rank: 0,
            detail: format!("serial run has no rank {}", source),
        })
    }
}

#[derive(Debug)]
struct Message {
    source: usize,
    tag: u32,
    payload: Payload,
}

/// How often a blocked receive checks whether the group was aborted
const ABORT_POLL: Duration = Duration::from_millis(20);

/// Failure flag shared by a group of local ranks
///
/// Raised once by whichever rank fails first. Ranks blocked in a receive
/// notice it within one poll interval and return [`Error::Aborted`].
#[derive(Debug, Clone, Default)]
pub struct AbortHandle(Arc<AtomicBool>);

impl AbortHandle {
    pub fn abort(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_aborted(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// One rank of a set of threads connected by channels
#[derive(Debug)]
pub struct LocalCommunicator {
    rank: usize,
    /// Sender to every other rank; `None` at our own index
    peers: Vec<Option<Sender<Message>>>,
    inbox: Receiver<Message>,
    /// Messages that arrived before anyone asked for them
    pending: VecDeque<Message>,
    abort: AbortHandle,
}

impl LocalCommunicator {
    /// Create `size` connected communicators, indexed by rank, sharing one
    /// abort flag.
    pub fn create(size: usize) -> Vec<LocalCommunicator> {
        let abort = AbortHandle::default();
        let (senders, receivers): (Vec<Sender<Message>>, Vec<Receiver<Message>>) =
            (0..size).map(|_| channel()).unzip();
        receivers
            .into_iter()
            .enumerate()
            .map(|(rank, inbox)| LocalCommunicator {
                rank,
                peers: senders
                    .iter()
                    .enumerate()
                    .map(|(r, s)| (r != rank).then(|| s.clone()))
                    .collect(),
                inbox,
                pending: VecDeque::new(),
                abort: abort.clone(),
            })
            .collect()
    }

    /// Flag shared with the other ranks of the group.
    pub fn abort_handle(&self) -> AbortHandle {
        self.abort.clone()
    }
}

impl Communicator for LocalCommunicator {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.peers.len()
    }

    fn send(&mut self, dest: usize, tag: u32, payload: Payload) -> Result<()> {
        let rank = self.rank;
        if self.abort.is_aborted() {
            return Err(Error::Aborted { rank, peer: dest });
        }
        let sender = self
            .peers
            .get(dest)
            .and_then(Option::as_ref)
            .ok_or_else(|| Error::Comm {
                rank,
                detail: format!("no channel to rank {}", dest),
            })?;
        sender
            .send(Message {
                source: rank,
                tag,
                payload,
            })
            .map_err(|_| Error::Comm {
                rank,
                detail: format!("rank {} hung up", dest),
            })
    }

    fn recv(&mut self, source: usize, tag: u32) -> Result<Payload> {
        if let Some(pos) = self
            .pending
            .iter()
            .position(|m| m.source == source && m.tag == tag)
        {
            if let Some(m) = self.pending.remove(pos) {
                return Ok(m.payload);
            }
        }
        loop {
            match self.inbox.recv_timeout(ABORT_POLL) {
                Ok(m) if m.source == source && m.tag == tag => return Ok(m.payload),
                Ok(m) => self.pending.push_back(m),
                Err(RecvTimeoutError::Timeout) => {
                    if self.abort.is_aborted() {
                        return Err(Error::Aborted {
                            rank: self.rank,
                            peer: source,
                        });
                    }
                }
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(Error::Comm {
                        rank: self.rank,
                        detail: format!("all peers hung up while waiting for rank {} tag {}", source, tag),
                    })
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parallel::run_ranks;

    #[test]
    fn test_serial_all_reduce_is_identity() {
        let mut c = SerialCommunicator;
        assert_eq!(c.all_reduce(3.5, ReduceOp::Max).unwrap(), 3.5);
        assert!(c.send(1, 0, Payload::Values(vec![])).is_err());
    }

    #[test]
    fn test_all_reduce_over_threads() {
        let results = run_ranks(4, |mut comm| {
            let r = comm.rank() as f64;
            let min = comm.all_reduce(r + 1.0, ReduceOp::Min)?;
            let max = comm.all_reduce(r + 1.0, ReduceOp::Max)?;
            let sum = comm.all_reduce(r + 1.0, ReduceOp::Sum)?;
            Ok((min, max, sum))
        })
        .unwrap();
        for r in results {
            assert_eq!(r, (1.0, 4.0, 10.0));
        }
    }

    #[test]
    fn test_out_of_order_tags_are_buffered() {
        let results = run_ranks(2, |mut comm| {
            if comm.rank() == 0 {
                comm.send(1, 7, Payload::Indices(vec![7]))?;
                comm.send(1, 3, Payload::Indices(vec![3]))?;
                Ok(vec![])
            } else {
                let a = comm.recv(0, 3)?;
                let b = comm.recv(0, 7)?;
                Ok(vec![a, b])
            }
        })
        .unwrap();
        assert_eq!(results[1], vec![Payload::Indices(vec![3]), Payload::Indices(vec![7])]);
    }

    #[test]
    fn test_aborted_group_unblocks_receivers() {
        let mut comms = LocalCommunicator::create(2);
        let mut waiting = comms.remove(0);
        waiting.abort_handle().abort();
        let err = waiting.recv(1, 5).unwrap_err();
        assert!(matches!(err, Error::Aborted { rank: 0, peer: 1 }));
        assert!(matches!(
            waiting.send(1, 5, Payload::Values(vec![1.0])),
            Err(Error::Aborted { .. })
        ));
    }
}
