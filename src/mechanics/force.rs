/// Nodal force and mass assembly
///
/// Each node collects, from the five tetrahedra of every incident element
/// that contain it:
/// ```text
/// f   += σ n A / 6        (traction on the face opposite the node)
/// f   -= g ρ V / 8        (body force, along −y or towards the centre)
/// m   += ρ V / 8
/// m_I += inertial mass of the dt policy
/// ```
/// Elements are visited in ascending global id, so the floating point sum
/// does not depend on the partition.

use log::debug;
use nalgebra::{Point3, Vector3};

use super::material::Material;
use super::tensor;
use crate::context::Context;
use crate::error::{Error, Result};
use crate::mesh::hexahedron::NODE_TO_TETRA;
use crate::mesh::{Mesh, MeshKind};
use crate::pipeline::Stage;
use crate::timestepping::DtPolicy;

/// Aggregates of one node's force assembly
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NodalForce {
    pub mass: f64,
    pub inertial_mass: f64,
    pub force: Vector3<f64>,
    pub balance: Vector3<f64>,
}

/// Inputs of the force assembly that stay fixed during one step
#[derive(Debug, Clone, Copy)]
pub struct ForceParams {
    pub gravity: f64,
    pub policy: DtPolicy,
    pub speed_of_sound: f64,
    pub dt: f64,
}

/// Inertial mass contribution of one tet at one node.
fn inertial_contribution(
    material: &Material,
    params: &ForceParams,
    density: f64,
    volume: f64,
    normal: &Vector3<f64>,
    area: f64,
) -> f64 {
    match params.policy {
        DtPolicy::Dynamic => {
            let c2 = params.speed_of_sound * params.speed_of_sound;
            0.25 * material.p_modulus() / c2 * volume
        }
        DtPolicy::Wave => 0.25 * density * volume,
        DtPolicy::Constant => {
            let area_sum = normal.iter().map(|n| (n * area) * (n * area)).fold(0.0, f64::max);
            material.p_modulus() * area_sum / (9.0 * volume) * params.dt * params.dt
        }
    }
}

/// Direction gravity acts against: +y, or radially outward on a sphere.
fn up_direction(kind: MeshKind, position: &Point3<f64>) -> Vector3<f64> {
    match kind {
        MeshKind::Cartesian => Vector3::y(),
        MeshKind::Spherical => {
            let r = position.coords.norm();
            if r > 0.0 {
                position.coords / r
            } else {
                Vector3::zeros()
            }
        }
    }
}

/// Assemble the internal and body forces and the masses of one node.
///
/// # Errors
/// `Geometry` if the inertial mass becomes non-finite.
pub fn assemble_node(mesh: &Mesh, materials: &[Material], node: usize, params: &ForceParams, timestep: u64) -> Result<NodalForce> {
    let up = up_direction(mesh.kind, &mesh.coords[node]);
    let mut out = NodalForce {
        mass: 0.0,
        inertial_mass: 0.0,
        force: Vector3::zeros(),
        balance: Vector3::zeros(),
    };

    for &e in &mesh.topology.node_elements[node] {
        let hex = &mesh.topology.element_nodes[e];
        let Some(slot) = hex.iter().position(|&n| n == node) else {
            continue;
        };
        let element = &mesh.elements[e];
        for &(t, face) in &NODE_TO_TETRA[slot] {
            let tet = &element.tetra[t];
            let material = &materials[tet.material];
            let volume = tet.geometry.volume;
            let normal = tet.geometry.normals[face];
            let area = tet.geometry.areas[face];

            out.inertial_mass += inertial_contribution(material, params, tet.density, volume, &normal, area);
            if !out.inertial_mass.is_finite() {
                return Err(Error::Geometry {
                    rank: mesh.decomposition.rank,
                    timestep,
                    element: mesh.decomposition.element_global[e],
                    tetra: t,
                    detail: format!("non-finite inertial mass at node {}", mesh.decomposition.node_global[node]),
                });
            }

            out.force += tensor::to_matrix(&tet.stress) * normal * area / 6.0;
            out.force -= up * (params.gravity * tet.density * volume / 8.0);
            out.balance += out.force.abs();
            out.mass += tet.density * volume / 8.0;
        }
    }
    Ok(out)
}

/// Force assembly over the locally owned nodes
#[derive(Debug, Default)]
pub struct Force;

impl Stage for Force {
    fn name(&self) -> &str {
        "force"
    }

    fn run(&mut self, ctx: &mut Context) -> Result<()> {
        let params = ForceParams {
            gravity: ctx.config.time_stepping.gravity,
            policy: ctx.config.time_stepping.policy,
            speed_of_sound: ctx.speed_of_sound,
            dt: ctx.dt,
        };
        let with_traction = ctx.bcs.has_traction();
        for n in 0..ctx.mesh.decomposition.local_nodes {
            let mut f = assemble_node(&ctx.mesh, &ctx.materials, n, &params, ctx.timestep)?;
            if with_traction {
                f.force += ctx.bcs.traction_force(&ctx.mesh, n);
            }
            let node = &mut ctx.mesh.nodes[n];
            node.mass = f.mass;
            node.inertial_mass = f.inertial_mass;
            node.force = f.force;
            node.balance = f.balance;
        }
        debug!("rank {} step {}: forces assembled", ctx.rank(), ctx.timestep);
        Ok(())
    }
}
