//! Simulation state shared by every stage of one rank

use crate::bc::{BoundaryConditions, ConditionRegistry};
use crate::config::SimulationConfig;
use crate::error::Error;
use crate::extensions::Extensions;
use crate::mechanics::material::Material;
use crate::mesh::Mesh;
use crate::parallel::{Communicator, GhostExchange};
use crate::pipeline::{Phase, Pipeline};

/// Explicitly passed simulation state
///
/// Created once when the simulation is built, mutated by every stage, and
/// dropped after the destroy hooks have run.
pub struct Context {
    /// Lifecycle phase the simulation is in
    pub phase: Phase,
    pub config: SimulationConfig,
    pub time: f64,
    pub timestep: u64,
    pub dt: f64,
    pub speed_of_sound: f64,
    /// Minimum element length scale over this rank's elements
    pub min_length_scale: f64,
    /// Minimum over all ranks from the last timestep control
    pub global_min_length_scale: f64,
    /// Global minimum length scale of the initial mesh
    pub init_min_length_scale: f64,
    pub restarting: bool,
    pub materials: Vec<Material>,
    pub mesh: Mesh,
    pub bcs: BoundaryConditions,
    pub conditions: ConditionRegistry,
    pub comm: Box<dyn Communicator>,
    pub node_exchange: GhostExchange,
    pub element_exchange: GhostExchange,
    pub extensions: Extensions,
    pub pipeline: Pipeline,
}

impl Context {
    pub fn rank(&self) -> usize {
        self.comm.rank()
    }

    /// Geometry error naming this rank, the current timestep and the
    /// offending element (by global id) and tetrahedron.
    pub fn geometry_error(&self, element: usize, tetra: usize, detail: impl Into<String>) -> Error {
        Error::Geometry {
            rank: self.rank(),
            timestep: self.timestep,
            element: self.mesh.decomposition.element_global[element],
            tetra,
            detail: detail.into(),
        }
    }
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("rank", &self.rank())
            .field("phase", &self.phase)
            .field("timestep", &self.timestep)
            .field("time", &self.time)
            .field("dt", &self.dt)
            .field("nodes", &self.mesh.num_nodes())
            .field("elements", &self.mesh.num_elements())
            .field("pipeline", &self.pipeline)
            .finish()
    }
}
