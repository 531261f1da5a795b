//! Adaptive remeshing
//!
//! When the mesh has deformed enough, a fresh grid is generated that
//! follows the current top surface, and the state of the old mesh is
//! transferred to it:
//! - node velocity, temperature and SPR-recovered stress, strain and
//!   density are interpolated barycentrically at the new nodes
//! - each new tetrahedron averages its vertices' recovered fields and copies
//!   the history variables of the old tetrahedron holding its barycenter
//!
//! Points that fall outside the old mesh near its boundary keep their old
//! state and are reported as external.

pub mod trigger;
pub mod search;
pub mod coords;
pub mod recovery;
pub mod interpolate;

use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::context::Context;
use crate::error::Result;
use crate::mesh::quality::assess_mesh_quality;
use crate::parallel::{exchange_points, exchange_rows, sync_elements, sync_nodes};
use crate::pipeline::Stage;
use search::LocateSettings;

pub use trigger::should_remesh;

/// When the remesher fires
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemeshCondition {
    #[default]
    Off,
    /// Every n timesteps
    OnTimestep(u64),
    /// When L / L0 drops below the ratio
    OnMinLengthScale(f64),
    /// Whichever of the two comes first
    OnBoth { interval: u64, ratio: f64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RemeshState {
    #[default]
    Stable,
    Triggered,
    Regenerated,
    Resynchronized,
}

/// Bookkeeping of the remeshes done so far, kept in the context extensions
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RemeshReport {
    pub count: u64,
    pub last_timestep: Option<u64>,
    /// Global ids of the nodes left external by the last remesh
    pub external_nodes: Vec<usize>,
    /// (global element, tet) pairs left external by the last remesh
    pub external_tetrahedra: Vec<(usize, usize)>,
}

/// Remeshing stage of the timestep pipeline
#[derive(Debug, Default)]
pub struct Remesher {
    state: RemeshState,
}

impl Remesher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> RemeshState {
        self.state
    }

    /// Regenerate the mesh and transfer the state onto it.
    ///
    /// Collective: every rank must call it in the same step.
    ///
    /// # Errors
    /// `Remesh` when an interior point cannot be located, `Geometry` when
    /// the new mesh has an inverted tet, and any communication failure of
    /// the ghost exchanges.
    pub fn remesh(&mut self, ctx: &mut Context) -> Result<RemeshReport> {
        self.state = RemeshState::Triggered;
        let timestep = ctx.timestep;
        let settings = LocateSettings::from(&ctx.config.remesh);
        let local_nodes = ctx.mesh.decomposition.local_nodes;

        let mut new_coords = ctx.mesh.coords.clone();
        let owned = coords::new_coordinates(&ctx.mesh, &ctx.config.remesh);
        new_coords[..local_nodes].copy_from_slice(&owned);
        exchange_points(ctx.comm.as_mut(), &ctx.node_exchange, &mut new_coords)?;

        let old = ctx.mesh.clone();
        let mut recovered = recovery::recover_local(&old);
        exchange_rows(ctx.comm.as_mut(), &ctx.node_exchange, &mut recovered)?;

        let mut nodes = interpolate::transfer_nodes(&old, &recovered, &new_coords, &settings, timestep)?;
        exchange_rows(ctx.comm.as_mut(), &ctx.node_exchange, &mut nodes.values)?;
        ctx.mesh.coords = new_coords;
        for ((node, velocity), temperature) in ctx.mesh.nodes.iter_mut().zip(&nodes.velocity).zip(&nodes.temperature) {
            node.velocity = *velocity;
            node.temperature = *temperature;
        }

        let external_tets = interpolate::transfer_elements(&old, &mut ctx.mesh, &nodes.values, &settings, timestep)?;
        let mut min_length = 1e27_f64;
        for e in 0..ctx.mesh.decomposition.local_elements {
            min_length = min_length.min(ctx.mesh.update_element_geometry(e, timestep)?);
            let el = &mut ctx.mesh.elements[e];
            let weighted: f64 = el.tetra.iter().map(|t| t.plastic_strain * t.geometry.volume).sum();
            el.aps = weighted / el.doubled_volume();
        }
        ctx.min_length_scale = min_length;
        self.state = RemeshState::Regenerated;

        sync_nodes(ctx)?;
        sync_elements(ctx)?;
        self.state = RemeshState::Resynchronized;

        let quality = assess_mesh_quality(&ctx.mesh);
        info!("rank {} step {}: remeshed. {}", ctx.rank(), timestep, quality.report());
        if !nodes.external.is_empty() || !external_tets.is_empty() {
            warn!(
                "rank {} step {}: {} external node(s), {} external tetrahedra kept their old state",
                ctx.rank(),
                timestep,
                nodes.external.len(),
                external_tets.len()
            );
        }

        let decomposition = &ctx.mesh.decomposition;
        let previous = ctx.extensions.get::<RemeshReport>().map_or(0, |r| r.count);
        let report = RemeshReport {
            count: previous + 1,
            last_timestep: Some(timestep),
            external_nodes: nodes.external.iter().map(|&n| decomposition.node_global[n]).collect(),
            external_tetrahedra: external_tets
                .iter()
                .map(|&(e, t)| (decomposition.element_global[e], t))
                .collect(),
        };
        ctx.extensions.insert(report.clone());
        self.state = RemeshState::Stable;
        Ok(report)
    }
}

impl Stage for Remesher {
    fn name(&self) -> &str {
        "remesh"
    }

    fn run(&mut self, ctx: &mut Context) -> Result<()> {
        let fire = should_remesh(
            ctx.config.remesh.condition,
            ctx.timestep,
            ctx.global_min_length_scale,
            ctx.init_min_length_scale,
        );
        if fire {
            self.remesh(ctx)?;
        }
        Ok(())
    }
}
