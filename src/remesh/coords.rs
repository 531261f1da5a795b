//! Coordinates of the regenerated mesh
//!
//! Only the top surface (and the bottom, unless it is restored) keeps the
//! shape the deformation gave it. Side-wall nodes go back to their initial
//! positions, surface nodes keep their initial horizontal position and take
//! the height of the current surface there, and interior nodes are spaced
//! uniformly between the two surfaces of their vertical grid line.
//!
//! A spherical mesh is handled in (θ, r, φ), where r plays the part of
//! the vertical coordinate.

use log::warn;
use nalgebra::Point3;

use crate::config::RemeshConfig;
use crate::mesh::geometry::{from_spherical, to_spherical};
use crate::mesh::hexahedron::{BOTTOM_FACE, TOP_FACE};
use crate::mesh::{Mesh, MeshKind};
use super::search::LocateSettings;

/// Which horizontal surface of the grid
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Surface {
    Top,
    Bottom,
}

/// Split each quad of a surface into two triangles.
///
/// Returns domain node triples of the current surface triangulation.
pub fn surface_triangles(mesh: &Mesh, surface: Surface) -> Vec<[usize; 3]> {
    let (layer, face) = match surface {
        Surface::Top => (mesh.grid.ny - 1, TOP_FACE),
        Surface::Bottom => (0, BOTTOM_FACE),
    };
    // Quad (a, b, c, d) splits along the b-d diagonal
    let [a, b, c, d] = face;
    let mut out = Vec::new();
    for (e, &g) in mesh.decomposition.element_global.iter().enumerate() {
        if mesh.grid.element_ijk(g)[1] != layer {
            continue;
        }
        let hex = &mesh.topology.element_nodes[e];
        out.push([hex[a], hex[d], hex[b]]);
        out.push([hex[b], hex[d], hex[c]]);
    }
    out
}

fn cross2(u: (f64, f64), v: (f64, f64)) -> f64 {
    u.0 * v.1 - u.1 * v.0
}

/// Barycentric weights of `p` in the projection of a triangle onto the
/// horizontal (x, z) plane.
///
/// Returns `None` when the projection is degenerate.
pub fn horizontal_weights(tri: &[Point3<f64>; 3], p: &Point3<f64>) -> Option<[f64; 3]> {
    let e1 = (tri[1].x - tri[0].x, tri[1].z - tri[0].z);
    let e2 = (tri[2].x - tri[0].x, tri[2].z - tri[0].z);
    let r = (p.x - tri[0].x, p.z - tri[0].z);
    let det = cross2(e1, e2);
    if det == 0.0 || !det.is_finite() {
        return None;
    }
    let u = cross2(r, e2) / det;
    let v = cross2(e1, r) / det;
    Some([1.0 - u - v, u, v])
}

/// Height of the triangulated surface above the horizontal position of `p`.
///
/// # Arguments
/// * `p` - Point whose x and z are used
/// * `triangles` - Surface triangulation over `coords`
/// * `coords` - Current coordinates in working space
/// * `settings` - Tolerance schedule
///
/// # Returns
/// `None` when no triangle covers `p` even at the loosest tolerance.
pub fn surface_height(
    p: &Point3<f64>,
    triangles: &[[usize; 3]],
    coords: &[Point3<f64>],
    settings: &LocateSettings,
) -> Option<f64> {
    for (attempt, tolerance) in settings.schedule().enumerate() {
        if attempt > 0 {
            warn!(
                "relaxing surface tolerance to {:e} at ({:.6e}, {:.6e})",
                tolerance, p.x, p.z
            );
        }
        for tri in triangles {
            let v = tri.map(|n| coords[n]);
            if let Some(w) = horizontal_weights(&v, p) {
                if w.iter().all(|&x| x >= -tolerance) {
                    return Some(w[0] * v[0].y + w[1] * v[1].y + w[2] * v[2].y);
                }
            }
        }
    }
    None
}

/// Compute the new coordinates of the locally owned nodes.
///
/// The returned vector is indexed like the local node prefix of the mesh.
pub fn new_coordinates(mesh: &Mesh, config: &RemeshConfig) -> Vec<Point3<f64>> {
    let to_work = |p: &Point3<f64>| match mesh.kind {
        MeshKind::Cartesian => *p,
        MeshKind::Spherical => to_spherical(p),
    };
    let current: Vec<Point3<f64>> = mesh.coords.iter().map(to_work).collect();
    let initial: Vec<Point3<f64>> = mesh.initial_coords.iter().map(to_work).collect();
    let settings = LocateSettings::from(config);
    let top = surface_triangles(mesh, Surface::Top);
    let bottom = if config.bottom_restore {
        Vec::new()
    } else {
        surface_triangles(mesh, Surface::Bottom)
    };

    let grid = mesh.grid;
    let local = mesh.decomposition.local_nodes;
    let mut out: Vec<Point3<f64>> = initial[..local].to_vec();

    let on_side_wall = |i: usize, k: usize| i == 0 || i == grid.nx || k == 0 || k == grid.nz;
    let remap = |n: usize, triangles: &[[usize; 3]]| {
        surface_height(&initial[n], triangles, &current, &settings).unwrap_or_else(|| {
            warn!(
                "node {} not on the current surface, keeping its height",
                mesh.decomposition.node_global[n]
            );
            current[n].y
        })
    };

    for n in 0..local {
        let [i, j, k] = grid.node_ijk(mesh.decomposition.node_global[n]);
        if on_side_wall(i, k) {
            continue;
        }
        if j == grid.ny {
            out[n].y = remap(n, &top);
        } else if j == 0 && !config.bottom_restore {
            out[n].y = remap(n, &bottom);
        }
    }

    // A vertical grid line is owned by a single rank
    let node_at = |i: usize, j: usize, k: usize| {
        mesh.decomposition
            .node_local
            .get(&grid.node_id(i, j, k))
            .copied()
            .filter(|&d| d < local)
    };
    for n in 0..local {
        let [i, j, k] = grid.node_ijk(mesh.decomposition.node_global[n]);
        if on_side_wall(i, k) || j == 0 || j == grid.ny {
            continue;
        }
        if let (Some(b), Some(t)) = (node_at(i, 0, k), node_at(i, grid.ny, k)) {
            let (bot, top) = (out[b].y, out[t].y);
            out[n].y = bot + (top - bot) / grid.ny as f64 * j as f64;
        }
    }

    match mesh.kind {
        MeshKind::Cartesian => out,
        MeshKind::Spherical => out.iter().map(from_spherical).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::{Decomposition, GridDims};
    use approx::assert_relative_eq;
    use nalgebra::Vector3;

    fn mesh(n: usize) -> Mesh {
        let grid = GridDims::new(n, n, n);
        let d = Decomposition::new(&grid, 0, 1).unwrap();
        Mesh::regular(grid, Point3::origin(), Vector3::new(n as f64, n as f64, n as f64), MeshKind::Cartesian, d)
    }

    #[test]
    fn test_undeformed_mesh_is_unchanged() {
        let m = mesh(3);
        let new = new_coordinates(&m, &RemeshConfig::default());
        for (a, b) in new.iter().zip(&m.coords) {
            assert_relative_eq!(a, b, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_interior_restored_and_surface_followed() {
        let mut m = mesh(4);
        let g = m.grid;
        // Uplift the whole top by 0.5 and shuffle an interior node
        for n in 0..m.num_nodes() {
            if g.node_ijk(n)[1] == g.ny {
                m.coords[n].y += 0.5;
            }
        }
        let inner = g.node_id(2, 2, 2);
        m.coords[inner] += Vector3::new(0.2, -0.1, 0.15);

        let new = new_coordinates(&m, &RemeshConfig::default());
        let top = g.node_id(2, 4, 1);
        assert_relative_eq!(new[top], Point3::new(2.0, 4.5, 1.0), epsilon = 1e-12);
        // Interior spacing over the uplifted column is 4.5 / 4
        assert_relative_eq!(new[inner], Point3::new(2.0, 2.25, 2.0), epsilon = 1e-12);
        // Side walls go back to the initial grid
        let wall = g.node_id(0, 4, 2);
        assert_relative_eq!(new[wall], m.initial_coords[wall]);
    }

    #[test]
    fn test_bottom_remap_when_not_restored() {
        let mut m = mesh(2);
        let g = m.grid;
        for n in 0..m.num_nodes() {
            if g.node_ijk(n)[1] == 0 {
                m.coords[n].y -= 0.25;
            }
        }
        let mut config = RemeshConfig::default();
        let bottom = g.node_id(1, 0, 1);
        assert_relative_eq!(new_coordinates(&m, &config)[bottom].y, 0.0);
        config.bottom_restore = false;
        assert_relative_eq!(new_coordinates(&m, &config)[bottom].y, -0.25, epsilon = 1e-12);
    }

    #[test]
    fn test_tilted_surface_is_interpolated() {
        let tri = [
            Point3::new(0.0, 1.0, 0.0),
            Point3::new(1.0, 2.0, 0.0),
            Point3::new(0.0, 3.0, 1.0),
        ];
        let w = horizontal_weights(&tri, &Point3::new(0.25, 0.0, 0.25)).unwrap();
        let y: f64 = w.iter().zip(&tri).map(|(w, v)| w * v.y).sum();
        assert_relative_eq!(y, 1.0 + 0.25 + 0.5, epsilon = 1e-14);
    }
}
