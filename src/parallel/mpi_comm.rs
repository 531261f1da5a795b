//! MPI backend of the rank communicator
//!
//! One process per rank. Messages travel as `u64` words: a kind word
//! (indices or values) followed by the body, with `f64` values sent by
//! their bit patterns. Sends are buffered (`MPI_Bsend`) so a rank may post
//! every ghost message before receiving any, as with the threaded backend;
//! the caller attaches the buffer through
//! [`mpi::environment::Universe::set_buffer_size`].

use mpi::collective::SystemOperation;
use mpi::point_to_point::{Destination, Source};
use mpi::topology::SimpleCommunicator;
use mpi::traits::{Communicator as _, CommunicatorCollectives};
use mpi::Tag;

use super::communicator::{Communicator, Payload, ReduceOp};
use crate::error::{Error, Result};

const KIND_INDICES: u64 = 0;
const KIND_VALUES: u64 = 1;

/// Default size of the attached send buffer (bytes)
pub const DEFAULT_BUFFER_BYTES: usize = 64 << 20;

/// One MPI process of the run
pub struct MpiCommunicator {
    world: SimpleCommunicator,
    rank: usize,
    size: usize,
}

// SAFETY: the communicator handle is only ever used by the thread that owns
// the simulation context; it is moved, never shared.
unsafe impl Send for MpiCommunicator {}

impl MpiCommunicator {
    pub fn new(world: SimpleCommunicator) -> Self {
        let rank = world.rank() as usize;
        let size = world.size() as usize;
        Self { world, rank, size }
    }

    fn tag(&self, tag: u32) -> Result<Tag> {
        Tag::try_from(tag).map_err(|_| Error::Comm {
            rank: self.rank,
            detail: format!("tag {} exceeds the MPI tag range", tag),
        })
    }

    fn peer(&self, peer: usize) -> Result<i32> {
        if peer >= self.size || peer == self.rank {
            return Err(Error::Comm {
                rank: self.rank,
                detail: format!("no rank {} to talk to among {}", peer, self.size),
            });
        }
        Ok(peer as i32)
    }
}

impl std::fmt::Debug for MpiCommunicator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MpiCommunicator")
            .field("rank", &self.rank)
            .field("size", &self.size)
            .finish()
    }
}

fn encode(payload: Payload) -> Vec<u64> {
    match payload {
        Payload::Indices(v) => std::iter::once(KIND_INDICES).chain(v.into_iter().map(|i| i as u64)).collect(),
        Payload::Values(v) => std::iter::once(KIND_VALUES).chain(v.into_iter().map(f64::to_bits)).collect(),
    }
}

fn decode(rank: usize, peer: usize, words: Vec<u64>) -> Result<Payload> {
    match words.split_first() {
        Some((&KIND_INDICES, body)) => Ok(Payload::Indices(body.iter().map(|&w| w as usize).collect())),
        Some((&KIND_VALUES, body)) => Ok(Payload::Values(body.iter().map(|&w| f64::from_bits(w)).collect())),
        _ => Err(Error::Comm {
            rank,
            detail: format!("malformed message from rank {}", peer),
        }),
    }
}

impl Communicator for MpiCommunicator {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.size
    }

    fn send(&mut self, dest: usize, tag: u32, payload: Payload) -> Result<()> {
        let process = self.world.process_at_rank(self.peer(dest)?);
        let words = encode(payload);
        process.buffered_send_with_tag(&words[..], self.tag(tag)?);
        Ok(())
    }

    fn recv(&mut self, source: usize, tag: u32) -> Result<Payload> {
        let process = self.world.process_at_rank(self.peer(source)?);
        let (words, _status) = process.receive_vec_with_tag::<u64>(self.tag(tag)?);
        decode(self.rank, source, words)
    }

    /// Native reduction; every rank receives the same value.
    fn all_reduce(&mut self, value: f64, op: ReduceOp) -> Result<f64> {
        let mut result = 0.0_f64;
        let op = match op {
            ReduceOp::Min => SystemOperation::min(),
            ReduceOp::Max => SystemOperation::max(),
            ReduceOp::Sum => SystemOperation::sum(),
        };
        self.world.all_reduce_into(&value, &mut result, op);
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_words_keep_kind_and_bits() {
        let values = Payload::Values(vec![-0.0, 1.5e-300, f64::MAX]);
        assert_eq!(decode(0, 1, encode(values.clone())).unwrap(), values);
        let indices = Payload::Indices(vec![0, 7, 123_456]);
        assert_eq!(decode(0, 1, encode(indices.clone())).unwrap(), indices);
        assert!(decode(0, 1, vec![9, 1]).is_err());
        assert!(decode(0, 1, Vec::new()).is_err());
    }
}
