use approx::{assert_abs_diff_eq, assert_relative_eq};
use geo_lagrangian::bc::Axis;
use geo_lagrangian::config::VelocityBcConfig;
use geo_lagrangian::mechanics::tensor::{XX, YY, ZZ};
use geo_lagrangian::{Material, SerialCommunicator, Simulation, SimulationConfig, SymTensor, Wall};

fn pull_x(wall: Wall, value: f64) -> VelocityBcConfig {
    VelocityBcConfig {
        wall,
        component: Axis::X,
        function: "constant".to_string(),
        value,
        ramp_time: 0.0,
    }
}

fn shear_box() -> SimulationConfig {
    let mut config = SimulationConfig::unit_box(4, 4, 4);
    config.velocity_bc = vec![pull_x(Wall::X0, 0.0), pull_x(Wall::X1, 0.02)];
    config.time_stepping.gravity = 0.0;
    config
}

fn started(config: SimulationConfig) -> Simulation {
    let mut sim = Simulation::construct(config)
        .unwrap()
        .build(Box::new(SerialCommunicator))
        .unwrap();
    sim.initialise().unwrap();
    sim
}

#[test]
fn test_shear_strain_rate_after_one_step() {
    let mut sim = started(shear_box());
    sim.step().unwrap();

    let ctx = sim.context();
    let grid = ctx.mesh.grid;
    let mut right_wall = 0;
    for e in 0..ctx.mesh.decomposition.local_elements {
        let [i, _, _] = grid.element_ijk(ctx.mesh.decomposition.element_global[e]);
        for tet in &ctx.mesh.elements[e].tetra {
            if i < 3 {
                for c in 0..6 {
                    assert_abs_diff_eq!(tet.strain_rate[c], 0.0, epsilon = 1e-9);
                }
            } else {
                assert_abs_diff_eq!(tet.strain_rate[XX], 0.02, epsilon = 1e-9);
                for c in 1..6 {
                    assert_abs_diff_eq!(tet.strain_rate[c], 0.0, epsilon = 1e-9);
                }
                right_wall += 1;
            }
        }
    }
    assert_eq!(right_wall, 16 * 10);
}

#[test]
fn test_elastic_stress_of_the_stretched_column() {
    let mut sim = started(shear_box());
    let dt = sim.context().dt;
    sim.step().unwrap();

    let ctx = sim.context();
    let m = Material::default();
    let grid = ctx.mesh.grid;
    for e in 0..ctx.mesh.decomposition.local_elements {
        let [i, _, _] = grid.element_ijk(ctx.mesh.decomposition.element_global[e]);
        for tet in &ctx.mesh.elements[e].tetra {
            if i == 3 {
                assert_relative_eq!(tet.stress[XX], (m.lambda + 2.0 * m.mu) * 0.02 * dt, max_relative = 1e-9);
                assert_relative_eq!(tet.stress[YY], m.lambda * 0.02 * dt, max_relative = 1e-9);
                assert_relative_eq!(tet.stress[ZZ], m.lambda * 0.02 * dt, max_relative = 1e-9);
                assert_relative_eq!(tet.strain[XX], 0.02 * dt, max_relative = 1e-9);
            } else if i < 2 {
                assert_abs_diff_eq!(tet.stress.norm(), 0.0, epsilon = 1e-3);
            }
        }
    }
}

#[test]
fn test_zero_velocity_gives_zero_strain_rate() {
    let mut config = SimulationConfig::unit_box(3, 3, 3);
    config.time_stepping.gravity = 0.0;
    let mut sim = started(config);
    sim.run(2).unwrap();

    let ctx = sim.context();
    for el in &ctx.mesh.elements[..ctx.mesh.decomposition.local_elements] {
        assert_eq!(el.strain_rate, 0.0);
        for tet in &el.tetra {
            assert_eq!(tet.strain_rate, SymTensor::zeros());
            assert_eq!(tet.stress, SymTensor::zeros());
        }
    }
    for n in 0..ctx.mesh.num_nodes() {
        assert_eq!(ctx.mesh.coords[n], ctx.mesh.initial_coords[n]);
    }
}

#[test]
fn test_stress_and_strain_stay_symmetric_under_rotation() {
    // A rigid rotation superposed on the shear exercises the spin terms
    let mut config = shear_box();
    config.initial_conditions.velocity = [0.0, 0.0, 0.001];
    let mut sim = started(config);
    sim.run(3).unwrap();

    // Voigt storage keeps one value per mirrored pair; the full matrices
    // must come back symmetric and finite
    let ctx = sim.context();
    for el in &ctx.mesh.elements[..ctx.mesh.decomposition.local_elements] {
        for tet in &el.tetra {
            let s = geo_lagrangian::mechanics::tensor::to_matrix(&tet.stress);
            assert_relative_eq!(s, s.transpose());
            assert!(s.iter().all(|v| v.is_finite()));
        }
    }
}
