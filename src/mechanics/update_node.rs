/// Explicit momentum update of the locally owned nodes
///
/// ```text
/// f  −= demf · sign(v) · |f|      (per component)
/// v  += Δt f / m_I
/// v_c = BC(x, t)                  (constrained components)
/// x  += Δt v
/// ```

use log::debug;
use nalgebra::Vector3;

use crate::context::Context;
use crate::error::{Error, Result};
use crate::pipeline::Stage;

fn sign(v: f64) -> f64 {
    if v < 0.0 {
        -1.0
    } else if v > 0.0 {
        1.0
    } else {
        0.0
    }
}

/// Damp a force against the current velocity.
pub fn damp_force(force: &Vector3<f64>, velocity: &Vector3<f64>, demf: f64) -> Vector3<f64> {
    Vector3::from_fn(|i, _| force[i] - demf * sign(velocity[i]) * force[i].abs())
}

/// Overwrite constrained velocity components of every locally owned node
/// with their boundary values at `time`.
pub fn apply_velocity_bcs(ctx: &mut Context, time: f64) {
    let grid = ctx.mesh.grid;
    for n in 0..ctx.mesh.decomposition.local_nodes {
        let global = ctx.mesh.decomposition.node_global[n];
        let prescribed = ctx.bcs.velocity(&grid, global, &ctx.mesh.coords[n], time);
        let velocity = &mut ctx.mesh.nodes[n].velocity;
        for (d, value) in prescribed.iter().enumerate() {
            if let Some(v) = value {
                velocity[d] = *v;
            }
        }
    }
}

#[derive(Debug, Default)]
pub struct UpdateNode;

impl Stage for UpdateNode {
    fn name(&self) -> &str {
        "update_node"
    }

    fn run(&mut self, ctx: &mut Context) -> Result<()> {
        let dt = ctx.dt;
        let demf = ctx.config.time_stepping.demf;
        for n in 0..ctx.mesh.decomposition.local_nodes {
            let node = &mut ctx.mesh.nodes[n];
            let force = damp_force(&node.force, &node.velocity, demf);
            if !(node.inertial_mass > 0.0) {
                return Err(Error::Geometry {
                    rank: ctx.mesh.decomposition.rank,
                    timestep: ctx.timestep,
                    element: ctx.mesh.topology.node_elements[n]
                        .first()
                        .map(|&e| ctx.mesh.decomposition.element_global[e])
                        .unwrap_or(0),
                    tetra: 0,
                    detail: format!(
                        "node {} has inertial mass {:e}",
                        ctx.mesh.decomposition.node_global[n], node.inertial_mass
                    ),
                });
            }
            node.velocity += force * (dt / node.inertial_mass);
        }

        apply_velocity_bcs(ctx, ctx.time);

        for n in 0..ctx.mesh.decomposition.local_nodes {
            let v = ctx.mesh.nodes[n].velocity;
            ctx.mesh.coords[n] += v * dt;
        }
        debug!("rank {} step {}: nodes advanced by dt {:.4e}", ctx.rank(), ctx.timestep, dt);
        Ok(())
    }
}
