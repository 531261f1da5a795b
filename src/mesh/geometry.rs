use nalgebra::{Point3, Vector3};
use serde::{Deserialize, Serialize};

use super::decomposition::Decomposition;
use super::hexahedron::{TETRA_PER_ELEMENT, TETRA_TO_NODE};
use super::state::{Element, Node, TetGeometry};
use super::topology::{GridDims, Topology};
use crate::error::{Error, Result};

/// Coordinate system the grid is laid out in
///
/// A spherical mesh is generated in (θ, r, φ) parameter space, with r as
/// the vertical grid direction, and mapped to Cartesian coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MeshKind {
    #[default]
    Cartesian,
    Spherical,
}

/// Cartesian (x, y, z) to (θ, r, φ) with θ = atan2(y, x) and φ = acos(z / r).
pub fn to_spherical(p: &Point3<f64>) -> Point3<f64> {
    let r = p.coords.norm();
    let phi = if r > 0.0 { (p.z / r).clamp(-1.0, 1.0).acos() } else { 0.0 };
    Point3::new(p.y.atan2(p.x), r, phi)
}

/// (θ, r, φ) back to Cartesian.
pub fn from_spherical(q: &Point3<f64>) -> Point3<f64> {
    let (theta, r, phi) = (q.x, q.y, q.z);
    Point3::new(
        r * phi.sin() * theta.cos(),
        r * phi.sin() * theta.sin(),
        r * phi.cos(),
    )
}

/// Mesh of one rank: local and shadow nodes and elements
#[derive(Debug, Clone)]
pub struct Mesh {
    pub grid: GridDims,
    pub kind: MeshKind,
    pub decomposition: Decomposition,
    pub topology: Topology,
    /// Current node coordinates (domain order)
    pub coords: Vec<Point3<f64>>,
    /// Coordinates at construction, used to restore walls on remesh
    pub initial_coords: Vec<Point3<f64>>,
    pub nodes: Vec<Node>,
    pub elements: Vec<Element>,
}

impl Mesh {
    /// Build the domain mesh of one rank from a regular grid.
    ///
    /// # Arguments
    /// * `grid` - Global element counts
    /// * `origin` - Lower corner in grid parameter space
    /// * `size` - Extent in grid parameter space
    /// * `kind` - Cartesian, or spherical with parameters (θ, r, φ)
    /// * `decomposition` - Partition of the grid for this rank
    pub fn regular(
        grid: GridDims,
        origin: Point3<f64>,
        size: Vector3<f64>,
        kind: MeshKind,
        decomposition: Decomposition,
    ) -> Self {
        let topology = Topology::build(&grid, &decomposition);
        let coords: Vec<Point3<f64>> = decomposition
            .node_global
            .iter()
            .map(|&g| {
                let [i, j, k] = grid.node_ijk(g);
                let q = Point3::new(
                    origin.x + size.x * i as f64 / grid.nx as f64,
                    origin.y + size.y * j as f64 / grid.ny as f64,
                    origin.z + size.z * k as f64 / grid.nz as f64,
                );
                match kind {
                    MeshKind::Cartesian => q,
                    MeshKind::Spherical => from_spherical(&q),
                }
            })
            .collect();

        let nodes = vec![Node::default(); coords.len()];
        let elements = vec![Element::new(0, 0.0, 0.0); decomposition.domain_elements()];

        Self {
            grid,
            kind,
            decomposition,
            topology,
            initial_coords: coords.clone(),
            coords,
            nodes,
            elements,
        }
    }

    pub fn num_nodes(&self) -> usize {
        self.coords.len()
    }

    pub fn num_elements(&self) -> usize {
        self.elements.len()
    }

    pub fn tet_vertices(&self, element: usize, tetra: usize) -> [Point3<f64>; 4] {
        let nodes = &self.topology.element_nodes[element];
        TETRA_TO_NODE[tetra].map(|slot| self.coords[nodes[slot]])
    }

    /// Domain node indices of the four vertices of a tetrahedron.
    pub fn tet_nodes(&self, element: usize, tetra: usize) -> [usize; 4] {
        let nodes = &self.topology.element_nodes[element];
        TETRA_TO_NODE[tetra].map(|slot| nodes[slot])
    }

    pub fn tet_barycenter(&self, element: usize, tetra: usize) -> Point3<f64> {
        let v = self.tet_vertices(element, tetra);
        Point3::from((v[0].coords + v[1].coords + v[2].coords + v[3].coords) / 4.0)
    }

    pub fn element_center(&self, element: usize) -> Point3<f64> {
        let nodes = &self.topology.element_nodes[element];
        let sum: Vector3<f64> = nodes.iter().map(|&n| self.coords[n].coords).sum();
        Point3::from(sum / nodes.len() as f64)
    }

    pub fn is_boundary_node(&self, node: usize) -> bool {
        self.grid.is_boundary_node(self.decomposition.node_global[node])
    }

    pub fn is_boundary_element(&self, element: usize) -> bool {
        self.grid.is_boundary_element(self.decomposition.element_global[element])
    }

    /// Recompute volume, face areas and normals of every tet of an element.
    ///
    /// # Returns
    /// The element's minimum length scale `min |V / A|`, starting from 1e27.
    ///
    /// # Errors
    /// `Geometry` if any tet volume is non-positive or non-finite.
    pub fn update_element_geometry(&mut self, element: usize, timestep: u64) -> Result<f64> {
        let mut min_length = 1e27_f64;
        let mut doubled = 0.0;
        for t in 0..TETRA_PER_ELEMENT {
            let geometry = TetGeometry::from_vertices(&self.tet_vertices(element, t));
            if !(geometry.volume.is_finite() && geometry.volume > 0.0) {
                return Err(Error::Geometry {
                    rank: self.decomposition.rank,
                    timestep,
                    element: self.decomposition.element_global[element],
                    tetra: t,
                    detail: format!("tetrahedron volume {:e}", geometry.volume),
                });
            }
            min_length = min_length.min(geometry.min_length_scale());
            doubled += geometry.volume;
            self.elements[element].tetra[t].geometry = geometry;
        }
        self.elements[element].volume = 0.5 * doubled;
        Ok(min_length)
    }

    /// Total mass of the locally owned elements.
    pub fn local_mass(&self) -> f64 {
        self.elements[..self.decomposition.local_elements]
            .iter()
            .map(Element::mass)
            .sum()
    }

    /// Total volume of the locally owned elements.
    pub fn local_volume(&self) -> f64 {
        self.elements[..self.decomposition.local_elements]
            .iter()
            .map(|e| e.volume)
            .sum()
    }
}
