//! Shadow-entity synchronization
//!
//! A `GhostExchange` is negotiated once per entity kind (nodes or elements).
//! Each rank tells every neighbour which of the neighbour's entities it
//! shadows; the owner answers with the same ids in its own send order and
//! the requester builds a wire-to-domain remap from the answer. After that,
//! `exchange` moves owner values to shadows with one message per neighbour.

use std::collections::HashMap;

use super::communicator::{expect_indices, expect_values, Communicator, Payload};
use crate::error::{Error, Result};

#[derive(Debug, Clone, Default)]
struct Peer {
    rank: usize,
    /// Domain indices of owned entities, in send order
    send: Vec<usize>,
    /// Domain index of each received wire slot
    recv: Vec<usize>,
}

#[derive(Debug, Clone, Default)]
pub struct GhostExchange {
    tag: u32,
    peers: Vec<Peer>,
}

impl GhostExchange {
    /// Negotiate send and receive lists with every neighbour.
    ///
    /// # Arguments
    /// * `comm` - Communicator of this rank
    /// * `tag` - Base tag; the exchange uses `tag`, `tag + 1` and `tag + 2`
    /// * `neighbours` - Ranks that may own our shadows or shadow our entities
    /// * `shadows` - For each neighbour, the domain indices of the shadow
    ///   entities it owns
    /// * `global` - Domain → global id map
    /// * `local` - Global → domain map
    /// * `owned` - Number of locally owned entities (a domain prefix)
    pub fn negotiate(
        comm: &mut dyn Communicator,
        tag: u32,
        neighbours: &[usize],
        shadows: &[Vec<usize>],
        global: &[usize],
        local: &HashMap<usize, usize>,
        owned: usize,
    ) -> Result<Self> {
        let rank = comm.rank();

        for (&peer, wanted) in neighbours.iter().zip(shadows) {
            let ids = wanted.iter().map(|&d| global[d]).collect();
            comm.send(peer, tag, Payload::Indices(ids))?;
        }

        let mut peers = Vec::with_capacity(neighbours.len());
        for &peer in neighbours {
            let mut requested = expect_indices(rank, peer, comm.recv(peer, tag)?)?;
            requested.sort_unstable();
            let mut send = Vec::with_capacity(requested.len());
            for gid in &requested {
                match local.get(gid) {
                    Some(&d) if d < owned => send.push(d),
                    _ => {
                        return Err(Error::Comm {
                            rank,
                            detail: format!("rank {} asked for entity {} which is not owned here", peer, gid),
                        })
                    }
                }
            }
            comm.send(peer, tag + 1, Payload::Indices(requested))?;
            peers.push(Peer {
                rank: peer,
                send,
                recv: Vec::new(),
            });
        }

        for (p, wanted) in peers.iter_mut().zip(shadows) {
            let order = expect_indices(rank, p.rank, comm.recv(p.rank, tag + 1)?)?;
            if order.len() != wanted.len() {
                return Err(Error::CommMismatch {
                    rank,
                    peer: p.rank,
                    expected: wanted.len(),
                    received: order.len(),
                });
            }
            p.recv = order
                .iter()
                .map(|gid| {
                    local.get(gid).copied().ok_or_else(|| Error::Comm {
                        rank,
                        detail: format!("rank {} sent unknown entity {}", p.rank, gid),
                    })
                })
                .collect::<Result<Vec<_>>>()?;
        }

        Ok(Self { tag, peers })
    }

    /// Copy owner values of a domain-indexed field into the shadow slots.
    ///
    /// `field` holds `stride` values per domain entity.
    pub fn exchange(&self, comm: &mut dyn Communicator, field: &mut [f64], stride: usize) -> Result<()> {
        let rank = comm.rank();
        for p in &self.peers {
            let mut out = Vec::with_capacity(p.send.len() * stride);
            for &d in &p.send {
                out.extend_from_slice(&field[d * stride..(d + 1) * stride]);
            }
            comm.send(p.rank, self.tag + 2, Payload::Values(out))?;
        }
        for p in &self.peers {
            let values = expect_values(rank, p.rank, comm.recv(p.rank, self.tag + 2)?)?;
            if values.len() != p.recv.len() * stride {
                return Err(Error::CommMismatch {
                    rank,
                    peer: p.rank,
                    expected: p.recv.len() * stride,
                    received: values.len(),
                });
            }
            for (slot, &d) in p.recv.iter().enumerate() {
                field[d * stride..(d + 1) * stride].copy_from_slice(&values[slot * stride..(slot + 1) * stride]);
            }
        }
        Ok(())
    }

    /// Total number of shadow entities filled by `exchange`.
    pub fn shadow_count(&self) -> usize {
        self.peers.iter().map(|p| p.recv.len()).sum()
    }
}
