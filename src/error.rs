//! Error types for the solver.
//!
//! Every variant is fatal for the run. Messages name the rank, timestep and
//! offending indices so a failed batch job can be diagnosed from its log.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using the solver error.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while building or advancing a simulation.
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed or missing configuration, including a non-positive timestep.
    #[error("configuration error: {0}")]
    Config(String),

    /// Degenerate or inverted tetrahedron, or a non-finite mechanical quantity.
    #[error("geometry error (rank {rank}, timestep {timestep}, element {element}, tetrahedron {tetra}): {detail}")]
    Geometry {
        rank: usize,
        timestep: u64,
        element: usize,
        tetra: usize,
        detail: String,
    },

    /// A remesh target point could not be located after tolerance relaxation.
    #[error("remesh error (rank {rank}, timestep {timestep}): {detail}")]
    Remesh {
        rank: usize,
        timestep: u64,
        detail: String,
    },

    /// Restart or checkpoint file could not be read or written.
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Ghost negotiation produced counts that disagree between two ranks.
    #[error("ghost exchange mismatch on rank {rank} with peer {peer}: expected {expected} entries, received {received}")]
    CommMismatch {
        rank: usize,
        peer: usize,
        expected: usize,
        received: usize,
    },

    /// A peer rank hung up or sent a message of the wrong kind.
    #[error("communication failure on rank {rank}: {detail}")]
    Comm { rank: usize, detail: String },

    /// Another rank failed while this one was waiting on it.
    #[error("rank {rank} aborted while waiting for rank {peer}: another rank failed")]
    Aborted { rank: usize, peer: usize },
}

impl Error {
    pub fn config(msg: impl Into<String>) -> Self {
        Error::Config(msg.into())
    }

    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Io {
            path: path.into(),
            source,
        }
    }
}
