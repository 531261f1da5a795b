pub mod hexahedron;
pub mod topology;
pub mod decomposition;
pub mod geometry;
pub mod state;
pub mod quality;

pub use topology::{GridDims, Topology};
pub use decomposition::Decomposition;
pub use geometry::{Mesh, MeshKind};
pub use state::{Element, Node, TetGeometry, Tetrahedron};
pub use quality::{MeshQuality, assess_mesh_quality};
