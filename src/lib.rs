pub mod error;
pub mod config;
pub mod mesh;
pub mod mechanics;
pub mod timestepping;
pub mod bc;     // Boundary conditions
pub mod ic;     // Initial conditions
pub mod parallel;
pub mod pipeline;
pub mod extensions;
pub mod context;
pub mod remesh;
pub mod restart;
pub mod simulation;
pub mod plugins;

pub use error::{Error, Result};
pub use config::SimulationConfig;
pub use mesh::{Decomposition, Element, GridDims, Mesh, MeshKind, MeshQuality, Node, Tetrahedron, assess_mesh_quality};
pub use mechanics::{Material, MohrCoulomb, Rheology, SymTensor, ViscosityLaw};
pub use bc::{BoundaryConditions, ConditionFunction, ConditionRegistry, Wall};
pub use context::Context;
pub use extensions::Extensions;
pub use pipeline::{HookPoint, Phase, Pipeline, Stage, StageList};
pub use parallel::{run_ranks, AbortHandle, Communicator, LocalCommunicator, ReduceOp, SerialCommunicator};
#[cfg(feature = "mpi")]
pub use parallel::MpiCommunicator;
pub use remesh::{RemeshCondition, RemeshReport, RemeshState, Remesher};
pub use simulation::{Construct, Simulation};
pub use timestepping::{DtPolicy, TimestepReport};
