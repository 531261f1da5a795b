//! Nearest-neighbour walks and barycentric point location on the old mesh
//!
//! A walk starts at the entity with the same domain index as the target
//! and repeatedly moves to the strictly closest neighbour, stopping at a
//! local minimum of the distance. On a mesh that was regular before it
//! deformed the walk ends after a handful of moves.

use log::warn;
use nalgebra::Point3;

use crate::config::RemeshConfig;
use crate::mesh::hexahedron::TETRA_PER_ELEMENT;
use crate::mesh::state::signed_volume;
use crate::mesh::Mesh;

/// Tolerance schedule of the barycentric containment test
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LocateSettings {
    /// Smallest barycentric weight still accepted, negated
    pub tolerance: f64,
    /// Number of tenfold relaxations before giving up
    pub max_relaxations: u32,
}

impl From<&RemeshConfig> for LocateSettings {
    fn from(config: &RemeshConfig) -> Self {
        Self {
            tolerance: config.tolerance,
            max_relaxations: config.max_relaxations,
        }
    }
}

impl LocateSettings {
    /// Tolerances to try in order, starting from the configured one.
    pub fn schedule(&self) -> impl Iterator<Item = f64> {
        let base = self.tolerance;
        (0..=self.max_relaxations).map(move |k| base * 10f64.powi(k as i32))
    }
}

/// Where a point lies in the old mesh
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Location {
    pub element: usize,
    pub tetra: usize,
    /// Barycentric weights of the tet's four vertices
    pub weights: [f64; 4],
}

/// Walk a neighbour graph towards the entity closest to `target`.
///
/// # Arguments
/// * `points` - Position of every entity
/// * `neighbours` - Adjacency of every entity
/// * `start` - Entity to start from
/// * `target` - Point to approach
pub fn nearest_by_walk(points: &[Point3<f64>], neighbours: &[Vec<usize>], start: usize, target: &Point3<f64>) -> usize {
    let mut current = start;
    let mut best = (points[current] - target).norm_squared();
    loop {
        let mut next = current;
        for &n in &neighbours[current] {
            let d = (points[n] - target).norm_squared();
            if d < best {
                best = d;
                next = n;
            }
        }
        if next == current {
            return current;
        }
        current = next;
    }
}

/// Nearest old node to `target`, starting from node `start`.
pub fn nearest_node(mesh: &Mesh, start: usize, target: &Point3<f64>) -> usize {
    nearest_by_walk(&mesh.coords, &mesh.topology.node_neighbors, start, target)
}

/// Nearest element by centre, starting from element `start`.
pub fn nearest_element(centers: &[Point3<f64>], mesh: &Mesh, start: usize, target: &Point3<f64>) -> usize {
    nearest_by_walk(centers, &mesh.topology.element_neighbors, start, target)
}


/// Barycentric weights of `p` in a positively oriented tetrahedron.
///
/// Returns `None` for a degenerate or inverted tet.
pub fn tet_weights(v: &[Point3<f64>; 4], p: &Point3<f64>) -> Option<[f64; 4]> {
    let volume = signed_volume(v);
    if !(volume > 0.0) {
        return None;
    }
    Some(std::array::from_fn(|k| {
        let mut w = *v;
        w[k] = *p;
        signed_volume(&w) / volume
    }))
}

/// First tet of `candidates` that contains `p` within `tolerance`.
pub fn locate_in(mesh: &Mesh, candidates: &[usize], p: &Point3<f64>, tolerance: f64) -> Option<Location> {
    for &element in candidates {
        for tetra in 0..TETRA_PER_ELEMENT {
            if let Some(weights) = tet_weights(&mesh.tet_vertices(element, tetra), p) {
                if weights.iter().all(|&w| w >= -tolerance) {
                    return Some(Location { element, tetra, weights });
                }
            }
        }
    }
    None
}

/// Candidate elements around a node: its incident elements first, then
/// their neighbours.
pub fn node_candidates(mesh: &Mesh, node: usize) -> Vec<usize> {
    element_candidates(mesh, &mesh.topology.node_elements[node])
}

/// `seeds` followed by every neighbour of a seed not already listed.
pub fn element_candidates(mesh: &Mesh, seeds: &[usize]) -> Vec<usize> {
    let mut out = seeds.to_vec();
    for &e in seeds {
        for &f in &mesh.topology.element_neighbors[e] {
            if !out.contains(&f) {
                out.push(f);
            }
        }
    }
    out
}

/// Locate `p` among `candidates`, relaxing the tolerance tenfold after
/// each miss.
///
/// `describe` names the point in the warning logged for every relaxation.
pub fn locate_with_relaxation<F>(
    mesh: &Mesh,
    candidates: &[usize],
    p: &Point3<f64>,
    settings: &LocateSettings,
    describe: F,
) -> Option<Location>
where
    F: Fn() -> String,
{
    for (attempt, tolerance) in settings.schedule().enumerate() {
        if attempt > 0 {
            warn!("relaxing location tolerance to {:e} for {}", tolerance, describe());
        }
        if let Some(found) = locate_in(mesh, candidates, p, tolerance) {
            return Some(found);
        }
    }
    None
}
