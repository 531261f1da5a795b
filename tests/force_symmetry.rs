use std::collections::BTreeMap;

use approx::assert_relative_eq;
use geo_lagrangian::mechanics::force::{assemble_node, ForceParams, NodalForce};
use geo_lagrangian::mechanics::tensor::{XX, YY, ZZ};
use geo_lagrangian::{Decomposition, DtPolicy, Element, GridDims, Material, Mesh, MeshKind};
use nalgebra::{Point3, Vector3};

/// Uniform cube of unit hexahedra under isotropic compression
fn loaded_cube(n: usize) -> Mesh {
    let grid = GridDims::new(n, n, n);
    let d = Decomposition::new(&grid, 0, 1).unwrap();
    let size = Vector3::new(n as f64, n as f64, n as f64);
    let mut mesh = Mesh::regular(grid, Point3::origin(), size, MeshKind::Cartesian, d);
    for e in 0..mesh.num_elements() {
        let mut el = Element::new(0, 3000.0, 0.0);
        for tet in el.tetra.iter_mut() {
            tet.stress[XX] = -1e6;
            tet.stress[YY] = -1e6;
            tet.stress[ZZ] = -1e6;
        }
        mesh.elements[e] = el;
        mesh.update_element_geometry(e, 0).unwrap();
    }
    mesh
}

/// Number of grid-boundary coordinates: 3 corner, 2 edge, 1 face, 0 interior
fn symmetry_class(grid: &GridDims, node: usize) -> usize {
    let ijk = grid.node_ijk(node);
    let counts = grid.node_counts();
    (0..3).filter(|&d| ijk[d] == 0 || ijk[d] + 1 == counts[d]).count()
}

fn classes(mesh: &Mesh, params: &ForceParams) -> BTreeMap<usize, Vec<NodalForce>> {
    let materials = vec![Material::default()];
    let mut out: BTreeMap<usize, Vec<NodalForce>> = BTreeMap::new();
    for n in 0..mesh.num_nodes() {
        let f = assemble_node(mesh, &materials, n, params, 0).unwrap();
        let class = symmetry_class(&mesh.grid, mesh.decomposition.node_global[n]);
        out.entry(class).or_default().push(f);
    }
    out
}

fn assert_equivalent(policy: DtPolicy) {
    let mesh = loaded_cube(3);
    let params = ForceParams {
        gravity: 0.0,
        policy,
        speed_of_sound: 2.0,
        dt: 0.5,
    };
    let classes = classes(&mesh, &params);
    assert_eq!(classes.len(), 4);
    assert_eq!(classes[&3].len(), 8);
    assert_eq!(classes[&0].len(), 8);

    for members in classes.values() {
        let first = members[0];
        for f in &members[1..] {
            assert_relative_eq!(f.inertial_mass, first.inertial_mass, max_relative = 1e-12);
            assert_relative_eq!(f.mass, first.mass, max_relative = 1e-12);
            assert_relative_eq!(f.force.norm(), first.force.norm(), epsilon = 1e-6, max_relative = 1e-12);
        }
    }
}

#[test]
fn test_wave_policy_symmetry_classes() {
    assert_equivalent(DtPolicy::Wave);
}

#[test]
fn test_dynamic_policy_symmetry_classes() {
    assert_equivalent(DtPolicy::Dynamic);
}

#[test]
fn test_constant_policy_symmetry_classes() {
    assert_equivalent(DtPolicy::Constant);
}

#[test]
fn test_interior_nodes_are_in_equilibrium() {
    let mesh = loaded_cube(3);
    let params = ForceParams {
        gravity: 0.0,
        policy: DtPolicy::Wave,
        speed_of_sound: 1.0,
        dt: 1.0,
    };
    let classes = classes(&mesh, &params);
    for f in &classes[&0] {
        assert!(f.force.norm() < 1e-6 * 1e6);
    }
    // Boundary nodes are pushed outward by the compression
    for f in &classes[&3] {
        assert!(f.force.norm() > 1e4);
    }
    // A unit corner node carries an eighth of one element's weight
    assert_relative_eq!(classes[&3][0].mass, 3000.0 / 8.0, max_relative = 1e-12);
}
