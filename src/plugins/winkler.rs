//! Winkler foundation under the bottom surface
//!
//! Every node on the bottom row (`j = 0`) receives a quarter of the
//! pressure acting on each bottom quad it belongs to:
//! ```text
//! p = p_isos + ρ_sub g (h0 - h)      (h: mean height of the quad now, h0: initially)
//! f -= A p / 4                       (A: outward vector area of the quad)
//! ```
//! so a bottom pushed down is pushed back up, and vice versa. The vertical
//! force a bottom node carries on the first step is recorded as its
//! residual and subtracted on every later step, which starts the model in
//! equilibrium with its support. The residuals go into the checkpoint
//! directory with the other restart files.

use std::fs;

use log::{debug, info};
use nalgebra::Vector3;

use crate::config::WinklerConfig;
use crate::context::Context;
use crate::error::{Error, Result};
use crate::mesh::hexahedron::BOTTOM_FACE;
use crate::mesh::Mesh;
use crate::pipeline::{HookPoint, Pipeline, Stage};
use crate::restart::{read_values, restart_path, write_rows};

/// Restart quantity holding the per-node residual support force
pub const RESIDUAL: &str = "winklerResidual";

/// Support force on one bottom node; zero for any other node.
pub fn bottom_support(mesh: &Mesh, node: usize, config: &WinklerConfig, gravity: f64) -> Vector3<f64> {
    let mut f = Vector3::zeros();
    let [_, j, _] = mesh.grid.node_ijk(mesh.decomposition.node_global[node]);
    if j != 0 {
        return f;
    }
    for &e in &mesh.topology.node_elements[node] {
        let hex = &mesh.topology.element_nodes[e];
        let Some(slot) = hex.iter().position(|&n| n == node) else {
            continue;
        };
        if !BOTTOM_FACE.contains(&slot) {
            continue;
        }
        let [p0, p1, p5, p4] = BOTTOM_FACE.map(|s| mesh.coords[hex[s]]);
        let area = (p5 - p0).cross(&(p4 - p1)) * 0.5;
        let h = BOTTOM_FACE.iter().map(|&s| mesh.coords[hex[s]].y).sum::<f64>() / 4.0;
        let h0 = BOTTOM_FACE.iter().map(|&s| mesh.initial_coords[hex[s]].y).sum::<f64>() / 4.0;
        let pressure = config.isostatic_pressure + config.substratum_density * gravity * (h0 - h);
        f -= area * (pressure / 4.0);
    }
    f
}

/// Solve stage: add the bottom support to the assembled nodal forces
#[derive(Debug, Default)]
pub struct WinklerForce {
    /// Vertical residual per local node, fixed on the first step
    residual: Option<Vec<f64>>,
}

impl WinklerForce {
    pub fn new() -> Self {
        Self::default()
    }

    fn load_residual(ctx: &Context, timestep: u64) -> Result<Vec<f64>> {
        let path = restart_path(&ctx.config.restart.directory, RESIDUAL, ctx.rank(), timestep);
        let values = read_values(&path, ctx.mesh.decomposition.local_nodes)?;
        info!("rank {}: winkler residuals read from step {}", ctx.rank(), timestep);
        Ok(values)
    }

    fn write_residual(ctx: &Context, residual: &[f64]) -> Result<()> {
        let dir = &ctx.config.restart.directory;
        fs::create_dir_all(dir).map_err(|e| Error::io(dir, e))?;
        let path = restart_path(dir, RESIDUAL, ctx.rank(), ctx.timestep);
        write_rows(&path, residual.iter().map(std::slice::from_ref))
    }
}

impl Stage for WinklerForce {
    fn name(&self) -> &str {
        "winkler"
    }

    fn run(&mut self, ctx: &mut Context) -> Result<()> {
        let gravity = ctx.config.time_stepping.gravity;
        if gravity <= 0.0 {
            return Ok(());
        }
        let config = ctx
            .config
            .winkler
            .clone()
            .ok_or_else(|| Error::config("the winkler stage needs a [winkler] section"))?;
        let local = ctx.mesh.decomposition.local_nodes;

        for n in 0..local {
            let support = bottom_support(&ctx.mesh, n, &config, gravity);
            ctx.mesh.nodes[n].force += support;
        }

        let residual = match self.residual.take() {
            Some(r) => r,
            None => match (ctx.restarting, ctx.config.restart.restart_from) {
                (true, Some(ts)) => Self::load_residual(ctx, ts)?,
                _ => {
                    let grid = ctx.mesh.grid;
                    let d = &ctx.mesh.decomposition;
                    let captured: Vec<f64> = (0..local)
                        .map(|n| match grid.node_ijk(d.node_global[n]) {
                            [_, 0, _] => ctx.mesh.nodes[n].force.y,
                            _ => 0.0,
                        })
                        .collect();
                    debug!("rank {} step {}: winkler residuals captured", ctx.rank(), ctx.timestep);
                    captured
                }
            },
        };
        for (node, r) in ctx.mesh.nodes[..local].iter_mut().zip(&residual) {
            node.force.y -= r;
        }

        let interval = ctx.config.restart.checkpoint_interval;
        if interval > 0 && ctx.timestep % interval == 0 {
            Self::write_residual(ctx, &residual)?;
        }
        self.residual = Some(residual);
        Ok(())
    }
}

/// Splice the support force in right after the force assembly.
pub fn register(pipeline: &mut Pipeline) -> Result<()> {
    pipeline
        .list_mut(HookPoint::Solve)
        .insert_after("force", Box::new(WinklerForce::new()))
}
