//! Domain-decomposed execution
//!
//! Every rank runs the same program on its slab of the mesh. The
//! communicator trait keeps the solver independent of how messages travel:
//! MPI processes with the `mpi` feature, or threads of one process.

pub mod communicator;
pub mod ghost;
#[cfg(feature = "mpi")]
pub mod mpi_comm;
pub mod sync;

pub use communicator::{AbortHandle, Communicator, LocalCommunicator, Payload, ReduceOp, SerialCommunicator};
pub use ghost::GhostExchange;
#[cfg(feature = "mpi")]
pub use mpi_comm::MpiCommunicator;
pub use sync::{exchange_points, exchange_rows, sync_elements, sync_nodes, SyncElements, SyncNodes};

use crate::error::{Error, Result};

/// Run `f` on `n` connected ranks and collect the per-rank results in rank
/// order.
///
/// A rank that fails or panics raises the group's abort flag, so peers
/// blocked waiting for it return [`Error::Aborted`] instead of hanging. The
/// error reported is that of the lowest rank that failed on its own; the
/// aborted peers only echo it.
pub fn run_ranks<T, F>(n: usize, f: F) -> Result<Vec<T>>
where
    T: Send,
    F: Fn(LocalCommunicator) -> Result<T> + Sync,
{
    let comms = LocalCommunicator::create(n);
    let f = &f;
    let outcomes: Vec<Result<T>> = std::thread::scope(|scope| {
        let handles: Vec<_> = comms
            .into_iter()
            .map(|comm| {
                let abort = comm.abort_handle();
                scope.spawn(move || {
                    let rank = comm.rank();
                    let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| f(comm)))
                        .unwrap_or_else(|_| {
                            Err(Error::Comm {
                                rank,
                                detail: "rank thread panicked".to_string(),
                            })
                        });
                    if let Err(e) = &outcome {
                        log::error!("rank {} failed: {}", rank, e);
                        abort.abort();
                    }
                    outcome
                })
            })
            .collect();
        handles
            .into_iter()
            .enumerate()
            .map(|(rank, h)| {
                h.join().unwrap_or_else(|_| {
                    Err(Error::Comm {
                        rank,
                        detail: "rank thread panicked".to_string(),
                    })
                })
            })
            .collect()
    });

    let mut results = Vec::with_capacity(n);
    let mut echoed = None;
    let mut root_cause = None;
    for outcome in outcomes {
        match outcome {
            Ok(v) => results.push(v),
            Err(e @ Error::Aborted { .. }) => {
                echoed.get_or_insert(e);
            }
            Err(e) => {
                root_cause.get_or_insert(e);
            }
        }
    }
    match root_cause.or(echoed) {
        Some(e) => Err(e),
        None => Ok(results),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use std::time::Duration;

    #[test]
    fn test_failing_rank_releases_peers_in_collectives() {
        let (done, finished) = mpsc::channel();
        std::thread::spawn(move || {
            let result = run_ranks(3, |mut comm| {
                if comm.rank() == 2 {
                    return Err(Error::config("bad input on rank 2"));
                }
                comm.all_reduce(1.0, ReduceOp::Sum)
            });
            let _ = done.send(result);
        });
        let result = finished
            .recv_timeout(Duration::from_secs(10))
            .expect("a failed rank left its peers blocked");
        match result {
            Err(Error::Config(msg)) => assert!(msg.contains("rank 2")),
            other => panic!("expected the failing rank's error, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_panicking_rank_is_reported() {
        let result = run_ranks(2, |mut comm| {
            if comm.rank() == 1 {
                panic!("rank 1 gives up");
            }
            comm.recv(1, 9).map(|_| ())
        });
        assert!(matches!(result, Err(Error::Comm { rank: 1, .. })));
    }
}
