/// Rheology branch selection
///
/// Every enabled rheology evaluates its own candidate stress from the same
/// rotated prior stress. A candidate is tagged with the branch that
/// produced it; the winner is picked by an explicit comparator instead of
/// letting branches overwrite each other in place.

use super::constitutive::{elastic_update, maxwell_update};
use super::material::Material;
use super::plasticity::mohr_coulomb_update;
use super::tensor::{self, SymTensor};
use crate::context::Context;
use crate::error::Result;
use crate::mesh::state::Tetrahedron;
use crate::pipeline::Stage;

/// Candidate state produced by one rheology branch
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BranchResult {
    Elastic {
        stress: SymTensor,
    },
    Maxwell {
        stress: SymTensor,
        viscosity: f64,
    },
    Plastic {
        stress: SymTensor,
        plastic_strain_increment: f64,
    },
}

impl BranchResult {
    pub fn stress(&self) -> &SymTensor {
        match self {
            BranchResult::Elastic { stress }
            | BranchResult::Maxwell { stress, .. }
            | BranchResult::Plastic { stress, .. } => stress,
        }
    }

    /// Comparator key: the trace-based pseudo-invariant of the stress
    pub fn magnitude(&self) -> f64 {
        tensor::pseudo_invariant(self.stress())
    }
}

/// Pick between the Maxwell and plastic candidates.
///
/// * Both fired: the one with the lower pseudo-invariant; Maxwell wins a tie.
/// * One fired: that one.
/// * None fired: the elastic trial.
pub fn choose(elastic: BranchResult, maxwell: Option<BranchResult>, plastic: Option<BranchResult>) -> BranchResult {
    match (maxwell, plastic) {
        (Some(m), Some(p)) => {
            if p.magnitude() < m.magnitude() {
                p
            } else {
                m
            }
        }
        (Some(m), None) => m,
        (None, Some(p)) => p,
        (None, None) => elastic,
    }
}

/// Evaluate every branch enabled for the tet's material.
///
/// The plastic branch only fires when the trial state yields.
pub fn evaluate_branches(
    material: &Material,
    prior: &SymTensor,
    strain_increment: &SymTensor,
    temperature: f64,
    plastic_strain: f64,
    dt: f64,
) -> BranchResult {
    let elastic = BranchResult::Elastic {
        stress: elastic_update(material, prior, strain_increment),
    };

    let maxwell = material.rheology.maxwell.then(|| {
        let m = maxwell_update(material, prior, strain_increment, temperature, dt);
        BranchResult::Maxwell {
            stress: m.stress,
            viscosity: m.viscosity,
        }
    });

    let plastic = match (&material.plasticity, material.rheology.plastic) {
        (Some(surface), true) => {
            let p = mohr_coulomb_update(material, surface, prior, strain_increment, plastic_strain);
            p.yielded.then_some(BranchResult::Plastic {
                stress: p.stress,
                plastic_strain_increment: p.plastic_strain_increment,
            })
        }
        _ => None,
    };

    choose(elastic, maxwell, plastic)
}

/// Commit the chosen branch to a tetrahedron.
///
/// Plastic strain only grows when the plastic branch wins.
pub fn apply_branch(tet: &mut Tetrahedron, branch: BranchResult) {
    match branch {
        BranchResult::Elastic { stress } => tet.stress = stress,
        BranchResult::Maxwell { stress, viscosity } => {
            tet.stress = stress;
            tet.viscosity = viscosity;
        }
        BranchResult::Plastic {
            stress,
            plastic_strain_increment,
        } => {
            tet.stress = stress;
            tet.plastic_strain += plastic_strain_increment;
        }
    }
}

/// Default constitutive stage: rheology update of every local tetrahedron
///
/// Expects `strain_increment` filled and `stress` objectively rotated.
#[derive(Debug, Default)]
pub struct RheologyUpdate;

impl Stage for RheologyUpdate {
    fn name(&self) -> &str {
        "rheology"
    }

    fn run(&mut self, ctx: &mut Context) -> Result<()> {
        let dt = ctx.dt;
        let materials = &ctx.materials;
        let local = ctx.mesh.decomposition.local_elements;
        for element in ctx.mesh.elements[..local].iter_mut() {
            for tet in element.tetra.iter_mut() {
                let branch = evaluate_branches(
                    &materials[tet.material],
                    &tet.stress,
                    &tet.strain_increment,
                    tet.temperature,
                    tet.plastic_strain,
                    dt,
                );
                apply_branch(tet, branch);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mechanics::material::{MohrCoulomb, Rheology};
    use approx::assert_relative_eq;

    fn stress(xx: f64) -> SymTensor {
        SymTensor::from_column_slice(&[xx, 0.0, 0.0, 0.0, 0.0, 0.0])
    }

    #[test]
    fn test_none_fired_uses_elastic() {
        let e = BranchResult::Elastic { stress: stress(1.0) };
        assert_eq!(choose(e, None, None), e);
    }

    #[test]
    fn test_single_branch_adopted() {
        let e = BranchResult::Elastic { stress: stress(1.0) };
        let m = BranchResult::Maxwell { stress: stress(5.0), viscosity: 1e20 };
        assert_eq!(choose(e, Some(m), None), m);
    }

    #[test]
    fn test_lower_pseudo_invariant_wins() {
        let e = BranchResult::Elastic { stress: stress(0.0) };
        let m = BranchResult::Maxwell {
            stress: SymTensor::from_column_slice(&[0.0, 0.0, 0.0, 4.0, 0.0, 0.0]),
            viscosity: 1e20,
        };
        let p = BranchResult::Plastic {
            stress: SymTensor::from_column_slice(&[0.0, 0.0, 0.0, 1.0, 0.0, 0.0]),
            plastic_strain_increment: 0.1,
        };
        assert_eq!(choose(e, Some(m), Some(p)), p);
        assert!(p.magnitude() < m.magnitude());
    }

    #[test]
    fn test_plastic_strain_only_on_plastic_win() {
        let mut material = Material::elastic(3e10, 3e10, 2700.0);
        material.rheology = Rheology::VISCOPLASTIC;
        material.viscosity.vis_min = 1e18;
        material.viscosity.vis_max = 1e18;
        material.plasticity = Some(MohrCoulomb::constant(30.0, 0.0, 1e6));

        // Strong shortening: both branches fire
        let de = SymTensor::from_column_slice(&[-1e-3, 0.0, 0.0, 0.0, 0.0, 0.0]);
        let branch = evaluate_branches(&material, &SymTensor::zeros(), &de, 0.0, 0.0, 1.0);
        let mut tet = Tetrahedron::default();
        apply_branch(&mut tet, branch);
        match branch {
            BranchResult::Plastic { plastic_strain_increment, .. } => {
                assert_relative_eq!(tet.plastic_strain, plastic_strain_increment);
                assert!(tet.plastic_strain > 0.0);
            }
            BranchResult::Maxwell { viscosity, .. } => {
                assert_eq!(tet.plastic_strain, 0.0);
                assert_relative_eq!(tet.viscosity, viscosity);
            }
            BranchResult::Elastic { .. } => panic!("a branch should have fired"),
        }
    }

    #[test]
    fn test_elastic_material_ignores_other_branches() {
        let material = Material::elastic(3e10, 3e10, 2700.0);
        let de = SymTensor::from_column_slice(&[1e-6, 0.0, 0.0, 0.0, 0.0, 0.0]);
        let branch = evaluate_branches(&material, &SymTensor::zeros(), &de, 0.0, 0.0, 1.0);
        assert!(matches!(branch, BranchResult::Elastic { .. }));
    }
}
