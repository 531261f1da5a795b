use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use log::info;

use geo_lagrangian::{Communicator, ReduceOp, RemeshReport, Simulation, SimulationConfig};

/// Explicit Lagrangian tectonics solver
#[derive(Parser, Debug)]
#[command(name = "geo_lagrangian")]
#[command(version, about = "Explicit Lagrangian FEM solver for elasto-visco-plastic tectonics", long_about = None)]
struct Args {
    /// TOML configuration file
    #[arg(short, long)]
    config: PathBuf,

    /// Number of ranks (threads) to partition the mesh over; an MPI build
    /// takes the rank count from the launcher instead
    #[arg(short, long, default_value = "1")]
    ranks: usize,

    /// Number of timesteps; defaults to time_stepping.max_steps
    #[arg(short, long)]
    steps: Option<u64>,
}

/// What each rank reports back at the end of the run
struct RankSummary {
    rank: usize,
    total_mass: f64,
    time: f64,
    remeshes: u64,
}

/// Run the full lifecycle on one rank.
fn run_rank(config: &SimulationConfig, comm: Box<dyn Communicator>, steps: u64) -> geo_lagrangian::Result<RankSummary> {
    let mut sim = Simulation::construct(config.clone())?.build(comm)?;
    sim.initialise()?;
    sim.run(steps)?;
    let mut ctx = sim.destroy()?;
    let local_mass = ctx.mesh.local_mass();
    Ok(RankSummary {
        rank: ctx.rank(),
        total_mass: ctx.comm.all_reduce(local_mass, ReduceOp::Sum)?,
        time: ctx.time,
        remeshes: ctx.extensions.get::<RemeshReport>().map_or(0, |r| r.count),
    })
}

#[cfg(feature = "mpi")]
fn run_all(config: &SimulationConfig, args: &Args, steps: u64) -> Result<Vec<RankSummary>> {
    use geo_lagrangian::parallel::mpi_comm::DEFAULT_BUFFER_BYTES;
    use geo_lagrangian::MpiCommunicator;

    let mut universe = mpi::initialize().context("MPI was already initialised")?;
    universe.set_buffer_size(DEFAULT_BUFFER_BYTES);
    let comm = MpiCommunicator::new(universe.world());
    if args.ranks != 1 && comm.size() != args.ranks {
        log::warn!("--ranks {} ignored: the launcher started {} process(es)", args.ranks, comm.size());
    }
    match run_rank(config, Box::new(comm), steps) {
        Ok(summary) => Ok(vec![summary]),
        Err(e) => {
            // Peers may be blocked on this rank; take the whole job down
            log::error!("simulation failed: {}", e);
            mpi::traits::Communicator::abort(&universe.world(), 1)
        }
    }
}

#[cfg(not(feature = "mpi"))]
fn run_all(config: &SimulationConfig, args: &Args, steps: u64) -> Result<Vec<RankSummary>> {
    geo_lagrangian::run_ranks(args.ranks, |comm| run_rank(config, Box::new(comm), steps)).context("simulation failed")
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let config = SimulationConfig::from_file(&args.config)
        .with_context(|| format!("loading {}", args.config.display()))?;
    let steps = args.steps.unwrap_or(config.time_stepping.max_steps);

    let summaries = run_all(&config, &args, steps)?;
    if let Some(root) = summaries.iter().find(|s| s.rank == 0) {
        info!(
            "done: {} step(s), t = {:.6e} s ({:.4e} yr), total mass {:.6e} kg, {} remesh(es)",
            steps,
            root.time,
            root.time / (365.25 * 24.0 * 3600.0),
            root.total_mass,
            root.remeshes
        );
    }
    Ok(())
}
