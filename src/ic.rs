//! Initial Conditions Module
//!
//! Default stages of the two initial-condition hook points:
//! - Element conditions: material by depth layer, temperature, density and
//!   an optional lithostatic stress
//! - Node conditions: uniform initial velocity overwritten by the velocity
//!   boundary conditions at time zero, and the uniform initial temperature

use log::debug;
use nalgebra::{Point3, Vector3};

use crate::config::SimulationConfig;
use crate::context::Context;
use crate::error::Result;
use crate::mechanics::material::Material;
use crate::mechanics::tensor::{SymTensor, XX, YY, ZZ};
use crate::mechanics::update_node::apply_velocity_bcs;
use crate::mesh::hexahedron::TETRA_PER_ELEMENT;
use crate::mesh::state::Element;
use crate::mesh::{Mesh, MeshKind};
use crate::pipeline::Stage;

/// Depth of a point below the undeformed top surface.
///
/// On a spherical mesh depth is measured radially.
pub fn depth_below_top(config: &SimulationConfig, kind: MeshKind, p: &Point3<f64>) -> f64 {
    match kind {
        MeshKind::Cartesian => config.mesh.top() - p.y,
        MeshKind::Spherical => config.mesh.top() - p.coords.norm(),
    }
}

/// Isotropic lithostatic stress σ_ii = -ρ g depth
pub fn lithostatic_stress(density: f64, gravity: f64, depth: f64) -> SymTensor {
    let mut s = SymTensor::zeros();
    let p = density * gravity * depth.max(0.0);
    s[XX] = -p;
    s[YY] = -p;
    s[ZZ] = -p;
    s
}

/// Initial state of one element.
pub fn initial_element(config: &SimulationConfig, materials: &[Material], mesh: &Mesh, e: usize) -> Element {
    let ic = &config.initial_conditions;
    let depth = depth_below_top(config, mesh.kind, &mesh.element_center(e));
    let material = config.material_at_depth(depth);
    let density = materials[material].density_at(ic.temperature, 0.0);
    let mut el = Element::new(material, density, ic.temperature);

    if ic.lithostatic_stress {
        for t in 0..TETRA_PER_ELEMENT {
            let d = depth_below_top(config, mesh.kind, &mesh.tet_barycenter(e, t));
            el.tetra[t].stress = lithostatic_stress(density, config.time_stepping.gravity, d);
        }
        let mean: f64 = el.tetra.iter().map(|t| t.stress[XX]).sum::<f64>() / TETRA_PER_ELEMENT as f64;
        el.pressure = -mean;
    }
    el
}

/// Element initial-condition stage
#[derive(Debug, Default)]
pub struct ElementConditions;

impl Stage for ElementConditions {
    fn name(&self) -> &str {
        "element_conditions"
    }

    fn run(&mut self, ctx: &mut Context) -> Result<()> {
        for e in 0..ctx.mesh.num_elements() {
            ctx.mesh.elements[e] = initial_element(&ctx.config, &ctx.materials, &ctx.mesh, e);
        }
        debug!("rank {}: {} elements initialised", ctx.rank(), ctx.mesh.num_elements());
        Ok(())
    }
}

/// Node initial-condition stage
#[derive(Debug, Default)]
pub struct NodeConditions;

impl Stage for NodeConditions {
    fn name(&self) -> &str {
        "node_conditions"
    }

    fn run(&mut self, ctx: &mut Context) -> Result<()> {
        let ic = &ctx.config.initial_conditions;
        let v = Vector3::from(ic.velocity);
        for node in ctx.mesh.nodes.iter_mut() {
            node.velocity = v;
            node.temperature = ic.temperature;
        }
        apply_velocity_bcs(ctx, ctx.time);
        Ok(())
    }
}
