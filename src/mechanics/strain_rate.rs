/// Strain rate of constant-strain tetrahedra
///
/// With linear shape functions on a tetrahedron the velocity gradient is
/// constant: L = Σ_k v_k ⊗ ∇N_k with ∇N_k = −A_k n_k / (3V). The symmetric
/// part is the strain rate, the antisymmetric part the spin used to rotate
/// stress objectively.
///
/// Pure volumetric locking of the ten constant-strain tets is relieved by
/// replacing each tet's volumetric rate with the volume-weighted element
/// mean (mixed discretization).

use log::debug;
use nalgebra::{Matrix3, Vector3};

use super::tensor::{self, spin_from_gradient};
use crate::context::Context;
use crate::error::{Error, Result};
use crate::mesh::hexahedron::TETRA_PER_ELEMENT;
use crate::mesh::state::TetGeometry;
use crate::mesh::Mesh;
use crate::pipeline::Stage;

/// Velocity gradient L_ij = ∂v_i/∂x_j of a linear tetrahedron.
pub fn velocity_gradient(geometry: &TetGeometry, velocities: &[Vector3<f64>; 4]) -> Matrix3<f64> {
    let mut l = Matrix3::zeros();
    for (k, v) in velocities.iter().enumerate() {
        l += v * geometry.shape_gradient(k).transpose();
    }
    l
}

/// Replace each tet's mean diagonal with the element's volume-weighted mean.
///
/// `values[t]` is the per-tet tensor; `volumes[t]` its volume. Returns the
/// element mean that was applied.
pub fn mix_volumetric(values: &mut [tensor::SymTensor], volumes: &[f64], element_volume: f64) -> f64 {
    let weighted: f64 = values
        .iter()
        .zip(volumes)
        .map(|(t, v)| tensor::trace(t) / 3.0 * v)
        .sum();
    let avg = weighted / (2.0 * element_volume);
    for t in values.iter_mut() {
        let own = tensor::trace(t) / 3.0;
        tensor::shift_diagonal(t, -own + avg);
    }
    avg
}

/// Recompute geometry and strain rate of one element.
///
/// # Returns
/// The element's minimum length scale.
///
/// # Errors
/// `Geometry` on a non-positive or non-finite tet volume, or a non-finite
/// strain rate.
pub fn update_element_strain_rate(mesh: &mut Mesh, element: usize, timestep: u64) -> Result<f64> {
    let min_length = mesh.update_element_geometry(element, timestep)?;

    let mut rates = [tensor::SymTensor::zeros(); TETRA_PER_ELEMENT];
    let mut volumes = [0.0; TETRA_PER_ELEMENT];
    for t in 0..TETRA_PER_ELEMENT {
        let velocities = mesh.tet_nodes(element, t).map(|n| mesh.nodes[n].velocity);
        let tet = &mut mesh.elements[element].tetra[t];
        let l = velocity_gradient(&tet.geometry, &velocities);
        rates[t] = tensor::from_matrix(&l);
        tet.spin = spin_from_gradient(&l);
        volumes[t] = tet.geometry.volume;
    }

    let el = &mut mesh.elements[element];
    mix_volumetric(&mut rates, &volumes, el.volume);

    let mut diag = 0.0;
    let mut off = 0.0;
    for (t, rate) in rates.iter().enumerate() {
        if !tensor::is_finite(rate) {
            return Err(Error::Geometry {
                rank: mesh.decomposition.rank,
                timestep,
                element: mesh.decomposition.element_global[element],
                tetra: t,
                detail: format!("non-finite strain rate {:?}", rate.as_slice()),
            });
        }
        diag += tensor::diagonal_products(rate);
        off += tensor::off_diagonal_squares(rate);
        el.tetra[t].strain_rate = *rate;
    }
    let n = TETRA_PER_ELEMENT as f64;
    el.strain_rate = tensor::summary_invariant(diag / n, off / n);

    Ok(min_length)
}

/// Strain rate of every locally owned element
#[derive(Debug, Default)]
pub struct StrainRate;

impl Stage for StrainRate {
    fn name(&self) -> &str {
        "strain_rate"
    }

    fn run(&mut self, ctx: &mut Context) -> Result<()> {
        let mut min_length = 1e27_f64;
        for e in 0..ctx.mesh.decomposition.local_elements {
            min_length = min_length.min(update_element_strain_rate(&mut ctx.mesh, e, ctx.timestep)?);
        }
        ctx.min_length_scale = min_length;
        debug!("rank {} step {}: local min length scale {:.4e}", ctx.rank(), ctx.timestep, min_length);
        Ok(())
    }
}
