//! Superconvergent patch recovery of tetrahedral fields at the nodes
//!
//! Stress, strain and density are constant on each tetrahedron. Before the
//! mesh is replaced they are turned into nodal fields by fitting, per node,
//! the linear polynomial
//! ```text
//! u(x) = a0 + a1 (x - x_n) + a2 (y - y_n) + a3 (z - z_n)
//! ```
//! to the tet values sampled at the barycenters of the patch, in the least
//! squares sense. The recovered value is `a0`, the fit evaluated at the
//! node. Boundary nodes borrow the patch of the node one step inward.

use nalgebra::{Matrix4, SMatrix, Vector4};
use rayon::prelude::*;

use crate::mesh::hexahedron::NODE_TO_TETRA;
use crate::mesh::state::Tetrahedron;
use crate::mesh::Mesh;

/// Number of recovered scalars: six stress, six strain and density
pub const RECOVERED_FIELDS: usize = 13;
/// Offset of the strain components in a recovered row
pub const STRAIN_OFFSET: usize = 6;
/// Offset of the density in a recovered row
pub const DENSITY_OFFSET: usize = 12;

pub type Recovered = [f64; RECOVERED_FIELDS];

/// Values of one tetrahedron in recovered-row layout.
pub fn sample(tet: &Tetrahedron) -> Recovered {
    let mut row = [0.0; RECOVERED_FIELDS];
    row[..STRAIN_OFFSET].copy_from_slice(tet.stress.as_slice());
    row[STRAIN_OFFSET..DENSITY_OFFSET].copy_from_slice(tet.strain.as_slice());
    row[DENSITY_OFFSET] = tet.density;
    row
}

/// Push the (element, tet) pairs that contain `node`.
fn push_patch(mesh: &Mesh, node: usize, patch: &mut Vec<(usize, usize)>) {
    for &e in &mesh.topology.node_elements[node] {
        let Some(slot) = mesh.topology.element_nodes[e].iter().position(|&n| n == node) else {
            continue;
        };
        for &(t, _) in &NODE_TO_TETRA[slot] {
            if !patch.contains(&(e, t)) {
                patch.push((e, t));
            }
        }
    }
}

/// Tetrahedra sampled for the fit at `node`.
pub fn patch(mesh: &Mesh, node: usize) -> Vec<(usize, usize)> {
    let mut out = Vec::new();
    push_patch(mesh, node, &mut out);
    if mesh.is_boundary_node(node) {
        let inward = mesh
            .grid
            .inward_node(mesh.decomposition.node_global[node])
            .and_then(|g| mesh.decomposition.node_local.get(&g).copied());
        if let Some(inner) = inward {
            push_patch(mesh, inner, &mut out);
        }
    }
    out
}

/// Fit the recovered fields at one node.
///
/// Falls back to the patch mean when the normal equations are singular.
pub fn recover_node(mesh: &Mesh, node: usize) -> Recovered {
    let origin = mesh.coords[node];
    let samples = patch(mesh, node);

    let mut a = Matrix4::<f64>::zeros();
    let mut b = SMatrix::<f64, 4, RECOVERED_FIELDS>::zeros();
    let mut mean = [0.0; RECOVERED_FIELDS];
    for &(e, t) in &samples {
        let d = mesh.tet_barycenter(e, t) - origin;
        let p = Vector4::new(1.0, d.x, d.y, d.z);
        let values = sample(&mesh.elements[e].tetra[t]);
        a += p * p.transpose();
        for (f, v) in values.iter().enumerate() {
            for r in 0..4 {
                b[(r, f)] += p[r] * v;
            }
            mean[f] += v;
        }
    }
    if samples.is_empty() {
        return mean;
    }

    match a.lu().solve(&b) {
        Some(x) if x.iter().all(|v| v.is_finite()) => std::array::from_fn(|f| x[(0, f)]),
        _ => mean.map(|v| v / samples.len() as f64),
    }
}

/// Recover the fields at every locally owned node.
///
/// The result is domain-indexed; shadow rows are zero until exchanged.
/// Uses parallel computation for large meshes (>1000 nodes).
pub fn recover_local(mesh: &Mesh) -> Vec<Recovered> {
    let local = mesh.decomposition.local_nodes;
    let mut out: Vec<Recovered> = if local > 1000 {
        (0..local).into_par_iter().map(|n| recover_node(mesh, n)).collect()
    } else {
        (0..local).map(|n| recover_node(mesh, n)).collect()
    };
    out.resize(mesh.num_nodes(), [0.0; RECOVERED_FIELDS]);
    out
}
