//! Adaptive timestep control
//!
//! The explicit scheme is stable while a signal cannot cross the smallest
//! element in one step. The timestep is derived each step from the global
//! minimum element length scale and, depending on the policy, either the
//! fastest boundary velocity or the fastest P-wave speed.

use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::context::Context;
use crate::error::{Error, Result};
use crate::mechanics::material::Material;
use crate::parallel::ReduceOp;
use crate::pipeline::Stage;

/// Courant factor applied to the minimum length scale
pub const COURANT: f64 = 0.45;
/// Floor of the boundary velocity used by the dynamic policy (m/s)
pub const MIN_BOUNDARY_VELOCITY: f64 = 3e-11;

/// How the timestep is chosen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DtPolicy {
    /// Mass scaling: the timestep follows the boundary velocity and the
    /// inertial mass is scaled to a fictitious speed of sound
    #[default]
    Dynamic,
    /// Physical P-wave speed limits the timestep
    Wave,
    /// Fixed timestep from the configuration
    Constant,
}

/// Timestep and the quantities it was derived from
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimestepReport {
    /// Computed timestep (seconds)
    pub dt: f64,
    /// Speed of sound used by the inertial mass (m/s)
    pub speed_of_sound: f64,
    /// Global minimum element length scale (m)
    pub min_length_scale: f64,
    /// Largest boundary velocity magnitude after flooring (m/s)
    pub vmax: f64,
}

impl TimestepReport {
    /// Get timestep in years
    pub fn dt_years(&self) -> f64 {
        self.dt / (365.25 * 24.0 * 3600.0)
    }
}

/// Compute the timestep of one policy.
///
/// # Arguments
/// * `policy` - Timestep policy
/// * `min_length_scale` - Global minimum length scale L
/// * `vmax` - Global maximum boundary speed, already floored
/// * `max_p_wave_speed` - Largest P-wave speed of the materials in use
/// * `strain_inert` - Inertial scaling of the dynamic policy
/// * `fixed_dt` - Configured timestep of the constant policy
/// * `previous_speed` - Speed of sound to keep when the policy does not set one
///
/// # Errors
/// `Config` when the resulting timestep is non-positive or non-finite.
pub fn compute_timestep(
    policy: DtPolicy,
    min_length_scale: f64,
    vmax: f64,
    max_p_wave_speed: f64,
    strain_inert: f64,
    fixed_dt: Option<f64>,
    previous_speed: f64,
) -> Result<TimestepReport> {
    let l = min_length_scale;
    let (dt, speed_of_sound) = match policy {
        DtPolicy::Dynamic => {
            let dt = l * COURANT * strain_inert / vmax;
            (dt, l * 0.5 / dt)
        }
        DtPolicy::Wave => (COURANT * l / max_p_wave_speed, max_p_wave_speed),
        DtPolicy::Constant => (fixed_dt.unwrap_or(0.0), previous_speed),
    };

    if !(dt.is_finite() && dt > 0.0) {
        return Err(Error::config(format!(
            "timestep {:e} from {:?} policy is not positive (L = {:e}, vmax = {:e})",
            dt, policy, l, vmax
        )));
    }

    Ok(TimestepReport {
        dt,
        speed_of_sound,
        min_length_scale: l,
        vmax,
    })
}

/// Largest P-wave speed over the materials of the locally owned elements.
pub fn local_max_p_wave_speed(ctx: &Context) -> f64 {
    let mut used = vec![false; ctx.materials.len()];
    for el in &ctx.mesh.elements[..ctx.mesh.decomposition.local_elements] {
        for tet in &el.tetra {
            used[tet.material] = true;
        }
    }
    ctx.materials
        .iter()
        .zip(used)
        .filter(|(_, u)| *u)
        .map(|(m, _)| Material::p_wave_speed(m))
        .fold(0.0, f64::max)
}

/// Largest velocity magnitude over locally owned nodes with a velocity BC.
pub fn local_boundary_speed(ctx: &Context) -> f64 {
    let grid = ctx.mesh.grid;
    (0..ctx.mesh.decomposition.local_nodes)
        .filter(|&n| ctx.bcs.has_velocity_constraint(&grid, ctx.mesh.decomposition.node_global[n]))
        .map(|n| ctx.mesh.nodes[n].velocity.norm())
        .fold(0.0, f64::max)
}

/// Timestep control stage
///
/// Collective: every rank must run it each step.
#[derive(Debug, Default)]
pub struct TimestepControl;

impl TimestepControl {
    /// Reduce the minimum length scale over all ranks and store it.
    ///
    /// On the first step of a fresh run this also fixes L0.
    pub fn reduce_length_scale(ctx: &mut Context) -> Result<f64> {
        let local_length = ctx.min_length_scale;
        let l = ctx.comm.all_reduce(local_length, ReduceOp::Min)?;
        if !(l > 0.0) {
            return Err(Error::config(format!("minimum length scale {:e} must be positive", l)));
        }
        ctx.global_min_length_scale = l;
        if ctx.timestep == 0 && !ctx.restarting {
            ctx.init_min_length_scale = l;
        }
        Ok(l)
    }

    /// Reduce the global inputs, compute the timestep and store it.
    pub fn update(ctx: &mut Context) -> Result<TimestepReport> {
        let local_speed = local_boundary_speed(ctx);
        let vmax = ctx.comm.all_reduce(local_speed, ReduceOp::Max)?.max(MIN_BOUNDARY_VELOCITY);
        let l = Self::reduce_length_scale(ctx)?;

        let policy = ctx.config.time_stepping.policy;
        let vp = if policy == DtPolicy::Wave {
            let local_vp = local_max_p_wave_speed(ctx);
            ctx.comm.all_reduce(local_vp, ReduceOp::Max)?
        } else {
            0.0
        };

        let report = compute_timestep(
            policy,
            l,
            vmax,
            vp,
            ctx.config.time_stepping.strain_inert,
            ctx.config.time_stepping.dt,
            ctx.speed_of_sound,
        )?;
        ctx.dt = report.dt;
        ctx.speed_of_sound = report.speed_of_sound;
        debug!(
            "rank {} step {}: dt {:.4e} s ({:.3e} yr), c {:.4e}, L {:.4e}, vmax {:.4e}",
            ctx.rank(),
            ctx.timestep,
            report.dt,
            report.dt_years(),
            report.speed_of_sound,
            report.min_length_scale,
            report.vmax
        );
        if ctx.timestep == 0 && ctx.rank() == 0 {
            info!("initial timestep {:.4e} s, minimum length scale {:.4e}", report.dt, l);
        }
        Ok(report)
    }
}

impl Stage for TimestepControl {
    fn name(&self) -> &str {
        "timestep"
    }

    fn run(&mut self, ctx: &mut Context) -> Result<()> {
        Self::update(ctx).map(|_| ())
    }
}

/// Advances the simulation clock by the step's dt once the nodes have moved
#[derive(Debug, Default)]
pub struct AdvanceTime;

impl Stage for AdvanceTime {
    fn name(&self) -> &str {
        "advance_time"
    }

    fn run(&mut self, ctx: &mut Context) -> Result<()> {
        ctx.time += ctx.dt;
        Ok(())
    }
}
