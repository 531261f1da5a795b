//! Explicit heat conduction on the Lagrangian mesh
//!
//! Temperature lives on the nodes. Each step the locally owned nodes are
//! advanced with the lumped heat balance
//! ```text
//! q    = -k ∇T                      (constant per tetrahedron)
//! E    = Σ q·n A / 6                (flux through the face opposite the node)
//! C    = Σ c_p ρ V / 8              (lumped heat capacity)
//! T   += -E dt / C
//! ```
//! summed over the five tetrahedra of every incident element, the same
//! doubled-cover weights as the force assembly. Nodes on the top (`j = ny`)
//! and bottom (`j = 0`) rows are then reset to their fixed temperatures.
//! Tetrahedron temperatures, which feed the density update, are the mean of
//! their four nodes and are refreshed once the nodes are synchronized.

use log::debug;
use nalgebra::Vector3;

use crate::config::{ThermalConfig, ThermalProfile};
use crate::context::Context;
use crate::error::{Error, Result};
use crate::mechanics::material::Material;
use crate::mesh::hexahedron::{NODE_TO_TETRA, TETRA_PER_ELEMENT};
use crate::mesh::Mesh;
use crate::pipeline::{HookPoint, Pipeline, Stage};

/// Largest κ dt / L² the explicit update accepts
pub const MAX_DIFFUSION_NUMBER: f64 = 1.0;

/// Heat flux -k ∇T of one tetrahedron from its nodal temperatures.
pub fn heat_flux(mesh: &Mesh, materials: &[Material], element: usize, tetra: usize) -> Vector3<f64> {
    let tet = &mesh.elements[element].tetra[tetra];
    let k = materials[tet.material].thermal_conductivity;
    let gradient: Vector3<f64> = mesh
        .tet_nodes(element, tetra)
        .iter()
        .enumerate()
        .map(|(slot, &n)| tet.geometry.shape_gradient(slot) * mesh.nodes[n].temperature)
        .sum();
    -gradient * k
}

/// dT/dt of one node from the conduction balance of its incident elements.
///
/// Elements are visited in ascending global id, so the sum does not depend
/// on the partition.
pub fn temperature_rate(mesh: &Mesh, materials: &[Material], node: usize) -> f64 {
    let mut energy = 0.0;
    let mut capacity = 0.0;
    for &e in &mesh.topology.node_elements[node] {
        let hex = &mesh.topology.element_nodes[e];
        let Some(slot) = hex.iter().position(|&n| n == node) else {
            continue;
        };
        for &(t, face) in &NODE_TO_TETRA[slot] {
            let tet = &mesh.elements[e].tetra[t];
            let q = heat_flux(mesh, materials, e, t);
            energy += q.dot(&tet.geometry.normals[face]) * tet.geometry.areas[face] / 6.0;
            capacity += materials[tet.material].heat_capacity * tet.density * tet.geometry.volume / 8.0;
        }
    }
    if capacity > 0.0 {
        -energy / capacity
    } else {
        0.0
    }
}

/// Fixed temperature of a node on the top or bottom row, if any.
fn fixed_temperature(thermal: &ThermalConfig, mesh: &Mesh, node: usize) -> Option<f64> {
    let [_, j, _] = mesh.grid.node_ijk(mesh.decomposition.node_global[node]);
    if j == mesh.grid.ny {
        thermal.top_temperature
    } else if j == 0 {
        thermal.bottom_temperature
    } else {
        None
    }
}

/// Reset the fixed-temperature rows among `nodes`.
pub fn apply_temperature_bcs(thermal: &ThermalConfig, mesh: &mut Mesh, nodes: std::ops::Range<usize>) {
    for n in nodes {
        if let Some(t) = fixed_temperature(thermal, mesh, n) {
            mesh.nodes[n].temperature = t;
        }
    }
}

/// Set every tetrahedron temperature of `elements` to its nodal mean.
pub fn average_tet_temperatures(mesh: &mut Mesh, elements: std::ops::Range<usize>) {
    for e in elements {
        for t in 0..TETRA_PER_ELEMENT {
            let mean = mesh
                .tet_nodes(e, t)
                .iter()
                .map(|&n| mesh.nodes[n].temperature)
                .sum::<f64>()
                / 4.0;
            mesh.elements[e].tetra[t].temperature = mean;
        }
    }
}

/// Largest thermal diffusivity over the materials of the local elements
fn local_max_diffusivity(ctx: &Context) -> f64 {
    ctx.mesh.elements[..ctx.mesh.decomposition.local_elements]
        .iter()
        .flat_map(|el| el.tetra.iter())
        .map(|tet| ctx.materials[tet.material].thermal_diffusivity())
        .fold(0.0, f64::max)
}

fn thermal_config(ctx: &Context) -> Result<ThermalConfig> {
    ctx.config
        .thermal
        .clone()
        .ok_or_else(|| Error::config("temperature stages need a [thermal] section"))
}

/// Node initial-condition stage: starting temperature profile
#[derive(Debug, Default)]
pub struct TemperatureConditions;

impl Stage for TemperatureConditions {
    fn name(&self) -> &str {
        "temperature_conditions"
    }

    fn run(&mut self, ctx: &mut Context) -> Result<()> {
        let thermal = thermal_config(ctx)?;
        let uniform = ctx.config.initial_conditions.temperature;
        let mesh = &mut ctx.mesh;
        let ny = mesh.grid.ny as f64;
        for n in 0..mesh.num_nodes() {
            let [_, j, _] = mesh.grid.node_ijk(mesh.decomposition.node_global[n]);
            mesh.nodes[n].temperature = match (thermal.initial_profile, thermal.top_temperature, thermal.bottom_temperature) {
                (ThermalProfile::Linear, Some(top), Some(bottom)) => bottom + (top - bottom) * j as f64 / ny,
                _ => uniform,
            };
        }
        let (nodes, elements) = (mesh.num_nodes(), mesh.num_elements());
        apply_temperature_bcs(&thermal, mesh, 0..nodes);
        average_tet_temperatures(mesh, 0..elements);
        for el in mesh.elements.iter_mut() {
            for tet in el.tetra.iter_mut() {
                tet.density = ctx.materials[tet.material].density_at(tet.temperature, 0.0);
            }
        }
        debug!("rank {}: initial temperature profile {:?}", ctx.rank(), thermal.initial_profile);
        Ok(())
    }
}

/// Solve stage: advance the temperature of the locally owned nodes
#[derive(Debug, Default)]
pub struct HeatConduction;

impl Stage for HeatConduction {
    fn name(&self) -> &str {
        "temperature"
    }

    fn run(&mut self, ctx: &mut Context) -> Result<()> {
        let thermal = thermal_config(ctx)?;
        let l = ctx.global_min_length_scale;
        let number = local_max_diffusivity(ctx) * ctx.dt / (l * l);
        if number > MAX_DIFFUSION_NUMBER {
            return Err(Error::config(format!(
                "rank {} step {}: thermal diffusion number κ dt / L² = {:.3e} exceeds {} (dt {:e}, L {:e})",
                ctx.rank(),
                ctx.timestep,
                number,
                MAX_DIFFUSION_NUMBER,
                ctx.dt,
                l
            )));
        }

        let local = ctx.mesh.decomposition.local_nodes;
        let rates: Vec<f64> = (0..local)
            .map(|n| temperature_rate(&ctx.mesh, &ctx.materials, n))
            .collect();
        for (node, rate) in ctx.mesh.nodes[..local].iter_mut().zip(rates) {
            node.temperature += rate * ctx.dt;
        }
        apply_temperature_bcs(&thermal, &mut ctx.mesh, 0..local);
        debug!("rank {} step {}: temperatures advanced (κ dt / L² = {:.3e})", ctx.rank(), ctx.timestep, number);
        Ok(())
    }
}

/// Solve stage: refresh tetrahedron temperatures from the synchronized nodes
#[derive(Debug, Default)]
pub struct AverageTemperature;

impl Stage for AverageTemperature {
    fn name(&self) -> &str {
        "average_temperature"
    }

    fn run(&mut self, ctx: &mut Context) -> Result<()> {
        let n = ctx.mesh.num_elements();
        average_tet_temperatures(&mut ctx.mesh, 0..n);
        Ok(())
    }
}

/// Splice the temperature stages into the default stage lists.
pub fn register(pipeline: &mut Pipeline) -> Result<()> {
    pipeline
        .list_mut(HookPoint::NodeInitialCondition)
        .insert_after("node_conditions", Box::new(TemperatureConditions))?;
    let solve = pipeline.list_mut(HookPoint::Solve);
    solve.insert_after("timestep", Box::new(HeatConduction))?;
    solve.insert_after("sync_nodes", Box::new(AverageTemperature))?;
    Ok(())
}
