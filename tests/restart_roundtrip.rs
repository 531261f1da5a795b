use approx::assert_relative_eq;
use geo_lagrangian::bc::Axis;
use geo_lagrangian::config::{MaterialLayer, ThermalConfig, VelocityBcConfig, WinklerConfig};
use geo_lagrangian::plugins::winkler::RESIDUAL;
use geo_lagrangian::restart::{restart_path, QUANTITIES};
use geo_lagrangian::{
    run_ranks, Context, Error, Material, RemeshCondition, SerialCommunicator, Simulation, SimulationConfig, Wall,
};

fn pulled_box(dir: &std::path::Path) -> SimulationConfig {
    let mut config = SimulationConfig::unit_box(4, 2, 2);
    config.mesh.size = [4e3, 2e3, 2e3];
    config.velocity_bc = vec![
        VelocityBcConfig {
            wall: Wall::X0,
            component: Axis::X,
            function: "constant".to_string(),
            value: 0.0,
            ramp_time: 0.0,
        },
        VelocityBcConfig {
            wall: Wall::X1,
            component: Axis::X,
            function: "linear_ramp".to_string(),
            value: 1e-9,
            ramp_time: 1e6,
        },
    ];
    config.initial_conditions.lithostatic_stress = true;
    config.restart.directory = dir.to_path_buf();
    config
}

fn finish(config: SimulationConfig, steps: u64) -> Context {
    let mut sim = Simulation::construct(config)
        .unwrap()
        .build(Box::new(SerialCommunicator))
        .unwrap();
    sim.initialise().unwrap();
    sim.run(steps).unwrap();
    sim.destroy().unwrap()
}

fn assert_same_state(a: &Context, b: &Context) {
    assert_eq!(a.timestep, b.timestep);
    assert_relative_eq!(a.time, b.time, max_relative = 1e-14);
    assert_relative_eq!(a.dt, b.dt, max_relative = 1e-14);
    let local = a.mesh.decomposition.local_nodes;
    for n in 0..local {
        assert_relative_eq!(a.mesh.coords[n], b.mesh.coords[n], max_relative = 1e-14);
        assert_relative_eq!(a.mesh.nodes[n].velocity, b.mesh.nodes[n].velocity, epsilon = 1e-25, max_relative = 1e-12);
        assert_relative_eq!(a.mesh.nodes[n].temperature, b.mesh.nodes[n].temperature, epsilon = 1e-12);
    }
    for e in 0..a.mesh.decomposition.local_elements {
        assert_eq!(a.mesh.elements[e].material, b.mesh.elements[e].material);
        for (ta, tb) in a.mesh.elements[e].tetra.iter().zip(&b.mesh.elements[e].tetra) {
            assert_relative_eq!(ta.stress, tb.stress, epsilon = 1e-6, max_relative = 1e-12);
            assert_relative_eq!(ta.density, tb.density, max_relative = 1e-14);
            assert_eq!(ta.material, tb.material);
            assert_relative_eq!(ta.temperature, tb.temperature, epsilon = 1e-12);
            assert_relative_eq!(ta.viscosity, tb.viscosity, max_relative = 1e-14);
        }
    }
}

/// Two material layers, remeshed every other step
fn layered_box(dir: &std::path::Path) -> SimulationConfig {
    let mut config = pulled_box(dir);
    config.materials.push(Material::elastic(2e10, 2e10, 3100.0));
    config.material_layers = vec![
        MaterialLayer {
            depth_top: 0.0,
            depth_bottom: 1e3,
            material: 0,
        },
        MaterialLayer {
            depth_top: 1e3,
            depth_bottom: 2e3,
            material: 1,
        },
    ];
    config.remesh.condition = RemeshCondition::OnTimestep(2);
    config.restart.checkpoint_interval = 2;
    config
}

/// Swap the material of every other element and give each tet its own
/// temperature and viscosity.
fn mutate(ctx: &mut Context) {
    for e in 0..ctx.mesh.num_elements() {
        let global = ctx.mesh.decomposition.element_global[e];
        let el = &mut ctx.mesh.elements[e];
        if global % 2 == 0 {
            el.material = 1 - el.material;
        }
        let material = el.material;
        for (t, tet) in el.tetra.iter_mut().enumerate() {
            tet.material = material;
            tet.temperature = 200.0 + 10.0 * global as f64 + t as f64;
            tet.viscosity = 1e20 * (1.0 + global as f64);
        }
    }
}

#[test]
fn test_checkpoints_are_written_per_interval() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = pulled_box(dir.path());
    config.restart.checkpoint_interval = 2;
    finish(config, 5);

    for ts in [2, 4] {
        for q in QUANTITIES {
            assert!(restart_path(dir.path(), q, 0, ts).exists(), "{} at step {}", q, ts);
        }
    }
    assert!(!restart_path(dir.path(), QUANTITIES[0], 0, 3).exists());
    assert!(!restart_path(dir.path(), QUANTITIES[0], 0, 5).exists());
}

#[test]
fn test_restart_resumes_the_same_trajectory() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = pulled_box(dir.path());
    config.restart.checkpoint_interval = 2;
    let straight = finish(config.clone(), 4);

    config.restart.checkpoint_interval = 0;
    config.restart.restart_from = Some(2);
    let resumed = finish(config, 2);

    assert!(resumed.restarting);
    assert_relative_eq!(resumed.init_min_length_scale, straight.init_min_length_scale);
    assert_same_state(&straight, &resumed);
}

#[test]
fn test_restart_keeps_edited_and_remeshed_element_state() {
    let dir = tempfile::tempdir().unwrap();
    let config = layered_box(dir.path());

    let mut sim = Simulation::construct(config.clone())
        .unwrap()
        .build(Box::new(SerialCommunicator))
        .unwrap();
    sim.initialise().unwrap();
    sim.step().unwrap();
    mutate(sim.context_mut());
    sim.run(3).unwrap();
    let straight = sim.destroy().unwrap();
    assert!(straight.mesh.elements.iter().any(|el| el.material == 1));
    assert!(straight.mesh.elements.iter().any(|el| el.material == 0));

    let mut resumed_config = config;
    resumed_config.restart.checkpoint_interval = 0;
    resumed_config.restart.restart_from = Some(2);
    let resumed = finish(resumed_config, 2);
    assert_same_state(&straight, &resumed);
}

#[test]
fn test_restart_with_plugins() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = pulled_box(dir.path());
    config.restart.checkpoint_interval = 2;
    config.thermal = Some(ThermalConfig {
        top_temperature: Some(0.0),
        bottom_temperature: Some(1300.0),
        initial_profile: Default::default(),
    });
    config.winkler = Some(WinklerConfig::default());
    let straight = finish(config.clone(), 4);
    assert!(restart_path(dir.path(), RESIDUAL, 0, 2).exists());

    config.restart.checkpoint_interval = 0;
    config.restart.restart_from = Some(2);
    let resumed = finish(config, 2);
    assert_same_state(&straight, &resumed);
}

#[test]
fn test_restart_per_rank_files() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = pulled_box(dir.path());
    config.restart.checkpoint_interval = 1;
    run_ranks(2, |comm| {
        let mut sim = Simulation::construct(config.clone())?.build(Box::new(comm))?;
        sim.initialise()?;
        sim.run(1)?;
        sim.destroy().map(|_| ())
    })
    .unwrap();
    for rank in 0..2 {
        assert!(restart_path(dir.path(), "coord", rank, 1).exists());
    }
}

#[test]
fn test_missing_checkpoint_is_an_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = pulled_box(dir.path());
    config.restart.restart_from = Some(7);
    let mut sim = Simulation::construct(config)
        .unwrap()
        .build(Box::new(SerialCommunicator))
        .unwrap();
    assert!(matches!(sim.initialise(), Err(Error::Io { .. })));
}
