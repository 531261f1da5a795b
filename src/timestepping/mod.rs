//! Time-stepping control for the explicit scheme
//!
//! This module derives a stable timestep each step from the mesh length
//! scale and the configured policy.

pub mod adaptive;

// Re-export commonly used items
pub use adaptive::{compute_timestep, AdvanceTime, DtPolicy, TimestepControl, TimestepReport};
