//! Transfer of node and element state from the old mesh to the new one

use nalgebra::{Point3, Vector3};

use super::recovery::{Recovered, DENSITY_OFFSET, RECOVERED_FIELDS, STRAIN_OFFSET};
use super::search::{
    element_candidates, locate_with_relaxation, nearest_element, nearest_node, node_candidates, LocateSettings,
};
use crate::error::{Error, Result};
use crate::mechanics::tensor::{self, SymTensor};
use crate::mesh::hexahedron::TETRA_PER_ELEMENT;
use crate::mesh::Mesh;

/// Elements around a grid-interior node, and around a grid-interior element
const FULL_NODE_INCIDENCE: usize = 8;
const FULL_ELEMENT_NEIGHBOURS: usize = 26;

/// A node on the grid boundary, or at the edge of this rank's domain where
/// some incident elements are missing.
pub fn node_on_domain_boundary(mesh: &Mesh, node: usize) -> bool {
    mesh.is_boundary_node(node) || mesh.topology.node_elements[node].len() < FULL_NODE_INCIDENCE
}

/// Element counterpart of [`node_on_domain_boundary`].
pub fn element_on_domain_boundary(mesh: &Mesh, element: usize) -> bool {
    mesh.is_boundary_element(element) || mesh.topology.element_neighbors[element].len() < FULL_ELEMENT_NEIGHBOURS
}

/// Node state interpolated onto the new coordinates
#[derive(Debug, Clone, Default)]
pub struct NodeTransfer {
    /// New velocity of each local node
    pub velocity: Vec<Vector3<f64>>,
    /// New temperature of each local node
    pub temperature: Vec<f64>,
    /// Recovered fields at each domain node; shadow rows are zero
    pub values: Vec<Recovered>,
    /// Local nodes that could not be located and kept their old state
    pub external: Vec<usize>,
}

/// Interpolate velocity, temperature and recovered fields at the new local
/// node positions.
///
/// # Arguments
/// * `old` - Mesh before regeneration
/// * `recovered` - Recovered fields at every old domain node
/// * `new_coords` - New coordinates of every domain node
/// * `settings` - Tolerance schedule of the point location
/// * `timestep` - Current timestep, for error reports
///
/// # Errors
/// `Remesh` when a node is not located and its nearest old node lies inside
/// the domain.
pub fn transfer_nodes(
    old: &Mesh,
    recovered: &[Recovered],
    new_coords: &[Point3<f64>],
    settings: &LocateSettings,
    timestep: u64,
) -> Result<NodeTransfer> {
    let local = old.decomposition.local_nodes;
    let mut out = NodeTransfer {
        velocity: Vec::with_capacity(local),
        temperature: Vec::with_capacity(local),
        values: vec![[0.0; RECOVERED_FIELDS]; old.num_nodes()],
        external: Vec::new(),
    };

    for n in 0..local {
        let p = new_coords[n];
        let nearest = nearest_node(old, n, &p);
        let global = old.decomposition.node_global[n];
        let found = locate_with_relaxation(old, &node_candidates(old, nearest), &p, settings, || format!("node {}", global));

        match found {
            Some(loc) => {
                let vertices = old.tet_nodes(loc.element, loc.tetra);
                let mut velocity = Vector3::zeros();
                let mut temperature = 0.0;
                let mut values = [0.0; RECOVERED_FIELDS];
                for (&v, w) in vertices.iter().zip(loc.weights) {
                    velocity += old.nodes[v].velocity * w;
                    temperature += old.nodes[v].temperature * w;
                    for (acc, x) in values.iter_mut().zip(&recovered[v]) {
                        *acc += w * x;
                    }
                }
                out.velocity.push(velocity);
                out.temperature.push(temperature);
                out.values[n] = values;
            }
            None if node_on_domain_boundary(old, nearest) => {
                out.velocity.push(old.nodes[n].velocity);
                out.temperature.push(old.nodes[n].temperature);
                out.values[n] = recovered[n];
                out.external.push(n);
            }
            None => {
                return Err(Error::Remesh {
                    rank: old.decomposition.rank,
                    timestep,
                    detail: format!(
                        "node {} at ({:.6e}, {:.6e}, {:.6e}) not located near interior node {}",
                        global, p.x, p.y, p.z, old.decomposition.node_global[nearest]
                    ),
                })
            }
        }
    }
    Ok(out)
}

/// Rebuild the tetrahedra of every local element of `mesh`, whose
/// coordinates are already the new ones.
///
/// Stress, strain and density are the mean of the four new vertices'
/// values. Material, temperature, plastic strain and viscosity come from
/// the old tet containing the new barycenter.
///
/// # Returns
/// (element, tet) pairs outside the old mesh, which kept their old state,
/// pressure included when every tet of the element is external.
///
/// # Errors
/// `Remesh` when a tet barycenter is not located and its nearest old
/// element lies inside the domain.
pub fn transfer_elements(
    old: &Mesh,
    mesh: &mut Mesh,
    node_values: &[Recovered],
    settings: &LocateSettings,
    timestep: u64,
) -> Result<Vec<(usize, usize)>> {
    let centers: Vec<Point3<f64>> = (0..old.num_elements()).map(|e| old.element_center(e)).collect();
    let mut external = Vec::new();

    for e in 0..mesh.decomposition.local_elements {
        let global = mesh.decomposition.element_global[e];
        let mut rebuilt = 0;
        for t in 0..TETRA_PER_ELEMENT {
            let c = mesh.tet_barycenter(e, t);
            let near = nearest_element(&centers, old, e, &c);
            let located = locate_with_relaxation(old, &element_candidates(old, &[near]), &c, settings, || {
                format!("element {} tetrahedron {}", global, t)
            });
            let Some(loc) = located else {
                if element_on_domain_boundary(old, near) {
                    external.push((e, t));
                    continue;
                }
                return Err(Error::Remesh {
                    rank: mesh.decomposition.rank,
                    timestep,
                    detail: format!(
                        "element {} tetrahedron {} not located near interior element {}",
                        global, t, old.decomposition.element_global[near]
                    ),
                });
            };

            let source = &old.elements[loc.element].tetra[loc.tetra];
            let mut mean = [0.0; RECOVERED_FIELDS];
            for v in mesh.tet_nodes(e, t) {
                for (acc, x) in mean.iter_mut().zip(&node_values[v]) {
                    *acc += 0.25 * x;
                }
            }

            let tet = &mut mesh.elements[e].tetra[t];
            tet.material = source.material;
            tet.temperature = source.temperature;
            tet.plastic_strain = source.plastic_strain;
            tet.viscosity = source.viscosity;
            tet.stress = SymTensor::from_column_slice(&mean[..STRAIN_OFFSET]);
            tet.strain = SymTensor::from_column_slice(&mean[STRAIN_OFFSET..DENSITY_OFFSET]);
            tet.density = mean[DENSITY_OFFSET];
            rebuilt += 1;
        }
        if rebuilt == 0 {
            continue;
        }

        let el = &mut mesh.elements[e];
        el.material = el.tetra[0].material;
        let mean_stress: f64 = el.tetra.iter().map(|t| tensor::trace(&t.stress) / 3.0).sum::<f64>() / TETRA_PER_ELEMENT as f64;
        el.pressure = -mean_stress;
    }
    Ok(external)
}

#[cfg(test)]
mod tests {
    use super::*;
    use super::super::search::tet_weights;
    use crate::mesh::state::Element;
    use crate::mesh::{Decomposition, GridDims, MeshKind};
    use approx::assert_relative_eq;

    fn settings() -> LocateSettings {
        LocateSettings {
            tolerance: 1e-8,
            max_relaxations: 8,
        }
    }

    fn cube_mesh(n: usize) -> Mesh {
        let grid = GridDims::new(n, n, n);
        let d = Decomposition::new(&grid, 0, 1).unwrap();
        let mut m = Mesh::regular(grid, Point3::origin(), Vector3::new(n as f64, n as f64, n as f64), MeshKind::Cartesian, d);
        for e in 0..m.num_elements() {
            m.elements[e] = Element::new(0, 2500.0, 0.0);
            m.update_element_geometry(e, 0).unwrap();
        }
        m
    }

    #[test]
    fn test_history_comes_from_the_containing_tet() {
        let mut old = cube_mesh(2);
        let centre = old.grid.node_id(1, 1, 1);
        old.coords[centre] += Vector3::new(0.2, 0.15, 0.1);
        for e in 0..old.num_elements() {
            old.update_element_geometry(e, 0).unwrap();
            for (t, tet) in old.elements[e].tetra.iter_mut().enumerate() {
                tet.plastic_strain = (10 * e + t) as f64;
            }
        }
        let mut new = old.clone();
        new.coords = old.initial_coords.clone();
        let values = vec![[0.0; RECOVERED_FIELDS]; new.num_nodes()];

        let external = transfer_elements(&old, &mut new, &values, &settings(), 0).unwrap();
        assert!(external.is_empty());
        for e in 0..new.num_elements() {
            for t in 0..TETRA_PER_ELEMENT {
                let id = new.elements[e].tetra[t].plastic_strain as usize;
                let (source_element, source_tetra) = (id / 10, id % 10);
                let w = tet_weights(&old.tet_vertices(source_element, source_tetra), &new.tet_barycenter(e, t)).unwrap();
                assert!(w.iter().all(|&x| x >= -1e-8), "element {} tet {} copied from a tet not holding it", e, t);
            }
        }
    }

    #[test]
    fn test_external_element_keeps_its_pressure() {
        let old = cube_mesh(1);
        let mut new = old.clone();
        for p in new.coords.iter_mut() {
            p.x += 5.0;
        }
        new.elements[0].pressure = 42.0;
        new.elements[0].tetra[3].plastic_strain = 0.7;
        let values = vec![[1.0; RECOVERED_FIELDS]; new.num_nodes()];

        let external = transfer_elements(&old, &mut new, &values, &settings(), 0).unwrap();
        assert_eq!(external.len(), TETRA_PER_ELEMENT);
        assert_eq!(new.elements[0].pressure, 42.0);
        assert_eq!(new.elements[0].tetra[3].plastic_strain, 0.7);
        assert_eq!(new.elements[0].tetra[3].density, 2500.0);
    }

    #[test]
    fn test_node_temperature_follows_a_linear_field() {
        let mut old = cube_mesh(2);
        let field = |p: &Point3<f64>| 100.0 * p.x + 5.0 * p.y - 20.0 * p.z;
        for n in 0..old.num_nodes() {
            old.nodes[n].temperature = field(&old.coords[n]);
        }
        let mut new_coords = old.coords.clone();
        let centre = old.grid.node_id(1, 1, 1);
        new_coords[centre] += Vector3::new(0.2, -0.1, 0.15);
        let recovered = vec![[0.0; RECOVERED_FIELDS]; old.num_nodes()];

        let out = transfer_nodes(&old, &recovered, &new_coords, &settings(), 0).unwrap();
        assert!(out.external.is_empty());
        for n in 0..old.num_nodes() {
            assert_relative_eq!(out.temperature[n], field(&new_coords[n]), epsilon = 1e-9);
        }
    }
}
