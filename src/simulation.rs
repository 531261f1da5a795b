//! Simulation lifecycle
//!
//! A run goes through five phases:
//! ```text
//! Construct → Build → Initialise → Execute → Destroy
//! ```
//! During Construct the configuration, material table, condition-function
//! registry and stage lists can still be edited. Build partitions the mesh
//! for one rank, negotiates the ghost exchanges and runs the `Build` hooks.
//! Initialise runs the initial-condition hooks (or loads a checkpoint) and
//! computes the first timestep. Execute repeats the `Solve` stage list once
//! per step. Destroy runs the `Destroy` hooks. The current phase is kept in
//! [`Context::phase`] so stages can tell where in the lifecycle they run.
//!
//! Every rank runs the same sequence; the collective stages keep them in
//! lock step.

use log::{debug, info};

use crate::bc::{BoundaryConditions, ConditionRegistry};
use crate::config::SimulationConfig;
use crate::context::Context;
use crate::error::{Error, Result};
use crate::extensions::Extensions;
use crate::ic::{ElementConditions, NodeConditions};
use crate::mechanics::material::Material;
use crate::mechanics::{Force, RheologyUpdate, StrainRate, Stress, UpdateNode};
use crate::mesh::{Decomposition, Mesh};
use crate::parallel::{sync_elements, sync_nodes, Communicator, GhostExchange, SyncElements, SyncNodes};
use crate::pipeline::{run_hook, HookPoint, Phase, Pipeline};
use crate::plugins;
use crate::remesh::Remesher;
use crate::restart::{read_checkpoint, Checkpoint};
use crate::timestepping::{AdvanceTime, TimestepControl};

/// Base tags of the node and element ghost exchanges
pub const NODE_EXCHANGE_TAG: u32 = 100;
pub const ELEMENT_EXCHANGE_TAG: u32 = 200;

/// Default stage lists of every hook point
pub fn default_pipeline() -> Result<Pipeline> {
    let mut pipeline = Pipeline::new();
    pipeline
        .list_mut(HookPoint::ElementInitialCondition)
        .append(Box::new(ElementConditions))?;
    pipeline
        .list_mut(HookPoint::NodeInitialCondition)
        .append(Box::new(NodeConditions))?;
    pipeline
        .list_mut(HookPoint::Constitutive)
        .append(Box::new(RheologyUpdate))?;

    let solve = pipeline.list_mut(HookPoint::Solve);
    solve.append(Box::new(StrainRate))?;
    solve.append(Box::new(Stress))?;
    solve.append(Box::new(SyncElements))?;
    solve.append(Box::new(Force))?;
    solve.append(Box::new(TimestepControl))?;
    solve.append(Box::new(UpdateNode))?;
    solve.append(Box::new(SyncNodes))?;
    solve.append(Box::new(AdvanceTime))?;
    solve.append(Box::new(Remesher::new()))?;
    solve.append(Box::new(Checkpoint))?;
    Ok(pipeline)
}

/// Construct phase: everything that is shared by all ranks and may still
/// be customised by plugins
#[derive(Debug)]
pub struct Construct {
    pub config: SimulationConfig,
    pub materials: Vec<Material>,
    pub conditions: ConditionRegistry,
    pub pipeline: Pipeline,
    pub extensions: Extensions,
}

impl Construct {
    /// Validate the configuration and set up the default stage lists.
    ///
    /// # Errors
    /// `Config` if the configuration is inconsistent.
    pub fn new(config: SimulationConfig) -> Result<Self> {
        config.validate()?;
        let mut pipeline = default_pipeline()?;
        plugins::register(&config, &mut pipeline)?;
        Ok(Self {
            materials: config.materials.clone(),
            config,
            conditions: ConditionRegistry::new(),
            pipeline,
            extensions: Extensions::new(),
        })
    }

    pub fn phase(&self) -> Phase {
        Phase::Construct
    }

    /// Build phase: partition the mesh for the communicator's rank and
    /// negotiate the ghost exchanges.
    ///
    /// Collective: every rank must build with the same configuration.
    ///
    /// # Errors
    /// `Config` for an unusable partition, boundary condition or material;
    /// `CommMismatch`/`Comm` if the ghost negotiation fails; the first error
    /// of a `Build` hook.
    pub fn build(self, mut comm: Box<dyn Communicator>) -> Result<Simulation> {
        for (i, mat) in self.materials.iter().enumerate() {
            mat.validate().map_err(|e| Error::config(format!("material {}: {}", i, e)))?;
        }
        let grid = self.config.mesh.grid();
        let decomposition = Decomposition::new(&grid, comm.rank(), comm.size())?;
        let mesh = Mesh::regular(
            grid,
            self.config.mesh.origin(),
            self.config.mesh.size(),
            self.config.mesh.kind,
            decomposition,
        );

        let d = &mesh.decomposition;
        let node_shadows: Vec<Vec<usize>> = d.neighbours.iter().map(|&p| d.shadow_nodes_from(p)).collect();
        let node_exchange = GhostExchange::negotiate(
            comm.as_mut(),
            NODE_EXCHANGE_TAG,
            &d.neighbours,
            &node_shadows,
            &d.node_global,
            &d.node_local,
            d.local_nodes,
        )?;
        let element_shadows: Vec<Vec<usize>> = d.neighbours.iter().map(|&p| d.shadow_elements_from(p)).collect();
        let element_exchange = GhostExchange::negotiate(
            comm.as_mut(),
            ELEMENT_EXCHANGE_TAG,
            &d.neighbours,
            &element_shadows,
            &d.element_global,
            &d.element_local,
            d.local_elements,
        )?;

        let bcs = BoundaryConditions::new(&self.config.velocity_bc, &self.config.traction_bc, &self.conditions)?;
        debug!(
            "rank {}: {} local / {} domain nodes, {} local / {} domain elements",
            comm.rank(),
            d.local_nodes,
            d.domain_nodes(),
            d.local_elements,
            d.domain_elements()
        );

        let mut ctx = Context {
            phase: Phase::Build,
            config: self.config,
            time: 0.0,
            timestep: 0,
            dt: 0.0,
            speed_of_sound: 0.0,
            min_length_scale: 1e27,
            global_min_length_scale: 0.0,
            init_min_length_scale: 0.0,
            restarting: false,
            materials: self.materials,
            mesh,
            bcs,
            conditions: self.conditions,
            comm,
            node_exchange,
            element_exchange,
            extensions: self.extensions,
            pipeline: self.pipeline,
        };
        run_hook(&mut ctx, HookPoint::Build)?;
        Ok(Simulation { ctx })
    }
}

/// One rank's running simulation
#[derive(Debug)]
pub struct Simulation {
    ctx: Context,
}

impl Simulation {
    /// Start the Construct phase.
    pub fn construct(config: SimulationConfig) -> Result<Construct> {
        Construct::new(config)
    }

    pub fn context(&self) -> &Context {
        &self.ctx
    }

    pub fn context_mut(&mut self) -> &mut Context {
        &mut self.ctx
    }

    pub fn phase(&self) -> Phase {
        self.ctx.phase
    }

    fn expect_phase(&self, expected: Phase, action: &str) -> Result<()> {
        if self.ctx.phase != expected {
            return Err(Error::config(format!(
                "cannot {} in the {:?} phase (expected {:?})",
                action, self.ctx.phase, expected
            )));
        }
        Ok(())
    }

    /// Recompute the geometry of the local elements and return their
    /// minimum length scale.
    fn refresh_geometry(&mut self) -> Result<()> {
        let mut min_length = 1e27_f64;
        for e in 0..self.ctx.mesh.decomposition.local_elements {
            min_length = min_length.min(self.ctx.mesh.update_element_geometry(e, self.ctx.timestep)?);
        }
        self.ctx.min_length_scale = min_length;
        Ok(())
    }

    /// Initialise phase: initial conditions or checkpoint, then the first
    /// timestep.
    ///
    /// # Errors
    /// `Config` when called twice, `Geometry` for an inverted initial mesh,
    /// `Io` for an unreadable checkpoint, and any timestep error.
    pub fn initialise(&mut self) -> Result<()> {
        self.expect_phase(Phase::Build, "initialise")?;
        self.ctx.phase = Phase::Initialise;
        let ctx = &mut self.ctx;

        run_hook(ctx, HookPoint::ElementInitialCondition)?;
        run_hook(ctx, HookPoint::NodeInitialCondition)?;

        if let Some(ts) = ctx.config.restart.restart_from {
            read_checkpoint(ctx, ts)?;
        }
        self.refresh_geometry()?;
        let ctx = &mut self.ctx;
        sync_nodes(ctx)?;
        sync_elements(ctx)?;

        if ctx.restarting {
            TimestepControl::reduce_length_scale(ctx)?;
        } else {
            TimestepControl::update(ctx)?;
        }

        if ctx.rank() == 0 {
            info!("{}", ctx.config.summary());
        }
        ctx.phase = Phase::Execute;
        Ok(())
    }

    /// Advance one timestep through the `Solve` stage list.
    ///
    /// # Errors
    /// `Config` before [`Simulation::initialise`], otherwise the first error
    /// of any stage.
    pub fn step(&mut self) -> Result<()> {
        self.expect_phase(Phase::Execute, "step")?;
        let ctx = &mut self.ctx;
        ctx.timestep += 1;
        run_hook(ctx, HookPoint::Solve)?;
        if ctx.rank() == 0 {
            info!(
                "step {}: t = {:.6e} s, dt = {:.4e} s, L = {:.4e} m",
                ctx.timestep, ctx.time, ctx.dt, ctx.global_min_length_scale
            );
        }
        Ok(())
    }

    /// Run `steps` timesteps.
    pub fn run(&mut self, steps: u64) -> Result<()> {
        for _ in 0..steps {
            self.step()?;
        }
        Ok(())
    }

    /// Destroy phase: run the destroy hooks and hand back the final context.
    pub fn destroy(mut self) -> Result<Context> {
        self.ctx.phase = Phase::Destroy;
        run_hook(&mut self.ctx, HookPoint::Destroy)?;
        Ok(self.ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parallel::SerialCommunicator;

    #[test]
    fn test_default_solve_order() {
        let pipeline = default_pipeline().unwrap();
        assert_eq!(
            pipeline.list(HookPoint::Solve).names(),
            vec![
                "strain_rate",
                "stress",
                "sync_elements",
                "force",
                "timestep",
                "update_node",
                "sync_nodes",
                "advance_time",
                "remesh",
                "checkpoint"
            ]
        );
        assert_eq!(pipeline.list(HookPoint::Constitutive).names(), vec!["rheology"]);
    }

    #[test]
    fn test_phase_misuse_is_config_error() {
        let config = SimulationConfig::unit_box(2, 2, 2);
        let mut sim = Simulation::construct(config)
            .unwrap()
            .build(Box::new(SerialCommunicator))
            .unwrap();
        assert!(matches!(sim.step(), Err(Error::Config(_))));
        sim.initialise().unwrap();
        assert_eq!(sim.phase(), Phase::Execute);
        assert!(matches!(sim.initialise(), Err(Error::Config(_))));
        sim.step().unwrap();
        assert_eq!(sim.context().timestep, 1);
    }

    /// Appends the phase it runs in to a shared log
    struct RecordPhase(&'static str);

    impl crate::pipeline::Stage for RecordPhase {
        fn name(&self) -> &str {
            self.0
        }

        fn run(&mut self, ctx: &mut Context) -> Result<()> {
            let phase = ctx.phase;
            match ctx.extensions.get_mut::<Vec<Phase>>() {
                Some(log) => log.push(phase),
                None => {
                    ctx.extensions.insert(vec![phase]);
                }
            }
            Ok(())
        }
    }

    #[test]
    fn test_build_and_destroy_hooks_see_their_phase() {
        let mut construct = Simulation::construct(SimulationConfig::unit_box(2, 2, 2)).unwrap();
        assert_eq!(construct.phase(), Phase::Construct);
        for point in [HookPoint::Build, HookPoint::Destroy] {
            construct
                .pipeline
                .list_mut(point)
                .append(Box::new(RecordPhase("record")))
                .unwrap();
        }
        let mut sim = construct.build(Box::new(SerialCommunicator)).unwrap();
        assert_eq!(sim.phase(), Phase::Build);
        assert_eq!(sim.context().extensions.get::<Vec<Phase>>(), Some(&vec![Phase::Build]));

        sim.initialise().unwrap();
        sim.step().unwrap();
        let ctx = sim.destroy().unwrap();
        assert_eq!(ctx.phase, Phase::Destroy);
        assert_eq!(ctx.extensions.get::<Vec<Phase>>(), Some(&vec![Phase::Build, Phase::Destroy]));
        assert_eq!(HookPoint::Destroy.phase(), Phase::Destroy);
    }
}
