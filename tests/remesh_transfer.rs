use approx::assert_relative_eq;
use geo_lagrangian::mechanics::tensor::{XX, XY};
use geo_lagrangian::{
    run_ranks, Context, MeshKind, RemeshCondition, RemeshReport, Remesher, SerialCommunicator, Simulation,
    SimulationConfig,
};
use nalgebra::{Point3, Vector3};

fn linear_stress(p: &Point3<f64>) -> f64 {
    1e6 * (1.0 + 0.1 * p.x + 0.2 * p.y - 0.3 * p.z)
}

fn linear_density(p: &Point3<f64>) -> f64 {
    2700.0 * (1.0 + 0.01 * p.x - 0.02 * p.y + 0.015 * p.z)
}

fn linear_velocity(p: &Point3<f64>) -> Vector3<f64> {
    Vector3::new(1e-3 * p.y, -2e-3 * p.x, 5e-4 * p.z)
}

fn started(config: SimulationConfig) -> Simulation {
    let mut sim = Simulation::construct(config)
        .unwrap()
        .build(Box::new(SerialCommunicator))
        .unwrap();
    sim.initialise().unwrap();
    sim
}

/// Move every grid-interior node by a small deterministic offset and load
/// linear stress, density and velocity fields on the distorted mesh.
fn distort(ctx: &mut Context) {
    distort_by(ctx, 1.0);
}

fn distort_by(ctx: &mut Context, scale: f64) {
    let grid = ctx.mesh.grid;
    for n in 0..ctx.mesh.num_nodes() {
        let global = ctx.mesh.decomposition.node_global[n];
        if grid.is_boundary_node(global) {
            continue;
        }
        let s = global as f64;
        ctx.mesh.coords[n] += Vector3::new(0.08 * s.sin(), 0.1 * (1.3 * s).cos(), 0.06 * (0.7 * s).sin()) * scale;
    }
    for e in 0..ctx.mesh.num_elements() {
        ctx.mesh.update_element_geometry(e, 0).unwrap();
        for t in 0..ctx.mesh.elements[e].tetra.len() {
            let c = ctx.mesh.tet_barycenter(e, t);
            let tet = &mut ctx.mesh.elements[e].tetra[t];
            tet.stress[XX] = linear_stress(&c);
            tet.stress[XY] = 0.5 * linear_stress(&c);
            tet.density = linear_density(&c);
        }
    }
    for n in 0..ctx.mesh.num_nodes() {
        ctx.mesh.nodes[n].velocity = linear_velocity(&ctx.mesh.coords[n]);
    }
}

#[test]
fn test_remesh_conserves_mass() {
    let mut sim = started(SimulationConfig::unit_box(4, 4, 4));
    distort(sim.context_mut());
    let before = sim.context().mesh.local_mass();

    let report = Remesher::new().remesh(sim.context_mut()).unwrap();
    assert!(report.external_nodes.is_empty());
    assert!(report.external_tetrahedra.is_empty());
    assert_eq!(report.count, 1);

    let after = sim.context().mesh.local_mass();
    assert_relative_eq!(after, before, max_relative = 1e-10);
    // The density is not uniform, so the transfer had to place it
    let mesh = &sim.context().mesh;
    let c = mesh.tet_barycenter(0, 0);
    assert_relative_eq!(mesh.elements[0].tetra[0].density, linear_density(&c), max_relative = 1e-10);
}

#[test]
fn test_spherical_remesh_keeps_the_shell() {
    let r_top = 6.1e6;
    let mut config = SimulationConfig::unit_box(3, 2, 3);
    config.mesh.kind = MeshKind::Spherical;
    config.mesh.origin = [0.1, 6.0e6, 1.2];
    config.mesh.size = [0.2, 1.0e5, 0.2];
    let mut sim = started(config);
    // Interior offsets of about 5 km, and a density linear across the shell
    distort_by(sim.context_mut(), 5e4);
    let ctx = sim.context_mut();
    let reference = ctx.mesh.element_center(0);
    for e in 0..ctx.mesh.num_elements() {
        for t in 0..ctx.mesh.elements[e].tetra.len() {
            let d = ctx.mesh.tet_barycenter(e, t) - reference;
            ctx.mesh.elements[e].tetra[t].density = 3000.0 * (1.0 + 1e-7 * (d.x + 2.0 * d.y - d.z));
        }
    }
    let before = sim.context().mesh.local_mass();

    let report = Remesher::new().remesh(sim.context_mut()).unwrap();
    assert!(report.external_nodes.is_empty());
    assert!(report.external_tetrahedra.is_empty());

    let mesh = &sim.context().mesh;
    for n in 0..mesh.num_nodes() {
        assert_relative_eq!(mesh.coords[n], mesh.initial_coords[n], epsilon = 1e-5);
        if mesh.grid.node_ijk(mesh.decomposition.node_global[n])[1] == mesh.grid.ny {
            assert_relative_eq!(mesh.coords[n].coords.norm(), r_top, max_relative = 1e-12);
        }
    }
    assert_relative_eq!(mesh.local_mass(), before, max_relative = 1e-6);
}

/// What one rank kept at the points the remesh could not locate
#[derive(Debug)]
struct Kept {
    report: RemeshReport,
    /// (global i, velocity, distance from the initial position) per external node
    nodes: Vec<(usize, Vector3<f64>, f64)>,
    /// (global column, xy stress) per external tetrahedron
    tetrahedra: Vec<(usize, f64)>,
}

/// Pull the x = max wall of the last rank inward, mark its nodes and the
/// stress of the last element column, then remesh on every rank.
fn remesh_with_pulled_wall(comm: geo_lagrangian::LocalCommunicator) -> geo_lagrangian::Result<Kept> {
    let mut config = SimulationConfig::unit_box(4, 2, 2);
    config.remesh.max_relaxations = 0;
    let mut sim = Simulation::construct(config)?.build(Box::new(comm))?;
    sim.initialise()?;
    let ctx = sim.context_mut();
    let grid = ctx.mesh.grid;
    for n in 0..ctx.mesh.decomposition.local_nodes {
        if grid.node_ijk(ctx.mesh.decomposition.node_global[n])[0] == grid.nx {
            ctx.mesh.coords[n].x -= 0.3;
            ctx.mesh.nodes[n].velocity = Vector3::new(1.0, 2.0, 3.0);
        }
    }
    for e in 0..ctx.mesh.decomposition.local_elements {
        if grid.element_ijk(ctx.mesh.decomposition.element_global[e])[0] == grid.nx - 1 {
            ctx.mesh.update_element_geometry(e, 0)?;
            for tet in ctx.mesh.elements[e].tetra.iter_mut() {
                tet.stress[XY] = 7e6;
            }
        }
    }
    let report = Remesher::new().remesh(ctx)?;

    let d = &ctx.mesh.decomposition;
    let nodes = report
        .external_nodes
        .iter()
        .map(|g| {
            let n = d.node_local[g];
            let moved = (ctx.mesh.coords[n] - ctx.mesh.initial_coords[n]).norm();
            (grid.node_ijk(*g)[0], ctx.mesh.nodes[n].velocity, moved)
        })
        .collect();
    let tetrahedra = report
        .external_tetrahedra
        .iter()
        .map(|&(g, t)| (grid.element_ijk(g)[0], ctx.mesh.elements[d.element_local[&g]].tetra[t].stress[XY]))
        .collect();
    Ok(Kept {
        report,
        nodes,
        tetrahedra,
    })
}

#[test]
fn test_points_outside_the_old_mesh_keep_their_state() {
    let kept = run_ranks(2, remesh_with_pulled_wall).unwrap();

    assert!(kept[0].report.external_nodes.is_empty());
    assert!(kept[0].report.external_tetrahedra.is_empty());

    let last = &kept[1];
    assert!(!last.nodes.is_empty());
    assert!(!last.tetrahedra.is_empty());
    for &(i, velocity, moved) in &last.nodes {
        assert_eq!(i, 4);
        assert_eq!(velocity, Vector3::new(1.0, 2.0, 3.0));
        // Walls still go back to the regular grid
        assert!(moved < 1e-12);
    }
    for &(column, stress) in &last.tetrahedra {
        assert_eq!(column, 3);
        assert_eq!(stress, 7e6);
    }
}

#[test]
fn test_remesh_restores_the_regular_grid() {
    let mut sim = started(SimulationConfig::unit_box(4, 4, 4));
    distort(sim.context_mut());
    Remesher::new().remesh(sim.context_mut()).unwrap();

    let mesh = &sim.context().mesh;
    for n in 0..mesh.num_nodes() {
        assert_relative_eq!(mesh.coords[n], mesh.initial_coords[n], epsilon = 1e-12);
    }
}

#[test]
fn test_linear_fields_survive_remesh_exactly() {
    let mut sim = started(SimulationConfig::unit_box(4, 4, 4));
    distort(sim.context_mut());
    Remesher::new().remesh(sim.context_mut()).unwrap();

    let mesh = &sim.context().mesh;
    for e in 0..mesh.num_elements() {
        for t in 0..mesh.elements[e].tetra.len() {
            let c = mesh.tet_barycenter(e, t);
            let tet = &mesh.elements[e].tetra[t];
            assert_relative_eq!(tet.stress[XX], linear_stress(&c), max_relative = 1e-8);
            assert_relative_eq!(tet.stress[XY], 0.5 * linear_stress(&c), max_relative = 1e-8);
        }
    }
    for n in 0..mesh.num_nodes() {
        assert_relative_eq!(mesh.nodes[n].velocity, linear_velocity(&mesh.coords[n]), epsilon = 1e-12);
    }
}

#[test]
fn test_pipeline_fires_the_remesher_on_schedule() {
    let mut config = SimulationConfig::unit_box(3, 3, 3);
    config.remesh.condition = RemeshCondition::OnTimestep(2);
    let mut sim = started(config);

    sim.step().unwrap();
    assert!(sim.context().extensions.get::<RemeshReport>().is_none());
    sim.step().unwrap();
    let report = sim.context().extensions.get::<RemeshReport>().unwrap();
    assert_eq!(report.count, 1);
    assert_eq!(report.last_timestep, Some(2));

    sim.run(2).unwrap();
    assert_eq!(sim.context().extensions.get::<RemeshReport>().unwrap().count, 2);
}
