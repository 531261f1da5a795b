/// Stress stage of the timestep pipeline
///
/// Prepares every local tetrahedron for the constitutive update (strain
/// increment, objective rotation), runs the constitutive hook, then
/// post-processes the element: volumetric mixing, scalar summaries,
/// pressure, density and accumulated strain.

use log::debug;

use super::strain_rate::mix_volumetric;
use super::tensor::{self, jaumann_rotate, SymTensor};
use crate::context::Context;
use crate::error::Result;
use crate::mesh::hexahedron::TETRA_PER_ELEMENT;
use crate::pipeline::{run_hook, HookPoint, Stage};

#[derive(Debug, Default)]
pub struct Stress;

impl Stress {
    fn prepare(ctx: &mut Context) {
        let dt = ctx.dt;
        let local = ctx.mesh.decomposition.local_elements;
        for element in ctx.mesh.elements[..local].iter_mut() {
            for tet in element.tetra.iter_mut() {
                tet.strain_increment = tet.strain_rate * dt;
                tet.stress = jaumann_rotate(&tet.stress, &tet.spin, dt);
                tet.strain = jaumann_rotate(&tet.strain, &tet.spin, dt);
            }
        }
    }

    fn finish_element(ctx: &mut Context, e: usize) -> Result<()> {
        let el = &ctx.mesh.elements[e];
        let mut stresses: [SymTensor; TETRA_PER_ELEMENT] = std::array::from_fn(|t| el.tetra[t].stress);
        let volumes: [f64; TETRA_PER_ELEMENT] = std::array::from_fn(|t| el.tetra[t].geometry.volume);

        let avg = mix_volumetric(&mut stresses, &volumes, el.volume);
        for (t, s) in stresses.iter().enumerate() {
            if !tensor::is_finite(s) {
                return Err(ctx.geometry_error(e, t, format!("non-finite stress {:?}", s.as_slice())));
            }
        }

        let n = TETRA_PER_ELEMENT as f64;
        let mut diag = 0.0;
        let mut off = 0.0;
        let mut mean_stress = 0.0;
        for s in &stresses {
            let mut shifted = *s;
            tensor::shift_diagonal(&mut shifted, -avg);
            diag += tensor::diagonal_products(&shifted);
            off += tensor::off_diagonal_squares(&shifted);
            mean_stress += tensor::trace(s) / 3.0;
        }
        mean_stress /= n;

        let materials = &ctx.materials;
        let el = &mut ctx.mesh.elements[e];
        el.stress = tensor::summary_invariant(diag / n, off / n);
        el.pressure = -mean_stress;

        let mut plastic = 0.0;
        let mut volume = 0.0;
        for (tet, s) in el.tetra.iter_mut().zip(stresses) {
            tet.stress = s;
            tet.density = materials[tet.material].density_at(tet.temperature, mean_stress);
            tet.strain += tet.strain_increment;
            plastic += tet.plastic_strain * tet.geometry.volume;
            volume += tet.geometry.volume;
        }
        el.aps = if volume > 0.0 { plastic / volume } else { 0.0 };
        Ok(())
    }
}

impl Stage for Stress {
    fn name(&self) -> &str {
        "stress"
    }

    fn run(&mut self, ctx: &mut Context) -> Result<()> {
        Self::prepare(ctx);
        run_hook(ctx, HookPoint::Constitutive)?;
        for e in 0..ctx.mesh.decomposition.local_elements {
            Self::finish_element(ctx, e)?;
        }
        debug!("rank {} step {}: stress updated", ctx.rank(), ctx.timestep);
        Ok(())
    }
}
