/// Solid mechanics of the explicit Lagrangian scheme
///
/// This module provides implementations for:
/// - Symmetric tensor helpers and objective rotation
/// - Elastic, Maxwell and Mohr-Coulomb constitutive updates
/// - The per-step stages: strain rate, stress, force and node update

pub mod tensor;
pub mod material;
pub mod constitutive;
pub mod plasticity;
pub mod rheology;
pub mod strain_rate;
pub mod stress;
pub mod force;
pub mod update_node;

pub use tensor::{SymTensor, Spin};
pub use material::{Material, MohrCoulomb, Rheology, ViscosityLaw};
pub use rheology::{BranchResult, RheologyUpdate};
pub use strain_rate::StrainRate;
pub use stress::Stress;
pub use force::{Force, NodalForce};
pub use update_node::UpdateNode;
