/// Structured hexahedral grid indexing and domain connectivity
///
/// Global node ids run i fastest, then j, then k:
/// `id = i + (nx+1) j + (nx+1)(ny+1) k`. Element ids follow the same
/// pattern over the `nx × ny × nz` cells.

use serde::{Deserialize, Serialize};

use super::decomposition::Decomposition;
use super::hexahedron::{NODES_PER_ELEMENT, NODE_OFFSETS};

/// Element counts of the global grid in each direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GridDims {
    pub nx: usize,
    pub ny: usize,
    pub nz: usize,
}

impl GridDims {
    pub fn new(nx: usize, ny: usize, nz: usize) -> Self {
        Self { nx, ny, nz }
    }

    pub fn num_nodes(&self) -> usize {
        (self.nx + 1) * (self.ny + 1) * (self.nz + 1)
    }

    pub fn num_elements(&self) -> usize {
        self.nx * self.ny * self.nz
    }

    pub fn node_id(&self, i: usize, j: usize, k: usize) -> usize {
        i + (self.nx + 1) * j + (self.nx + 1) * (self.ny + 1) * k
    }

    pub fn node_ijk(&self, id: usize) -> [usize; 3] {
        let sx = self.nx + 1;
        let sxy = sx * (self.ny + 1);
        [id % sx, (id % sxy) / sx, id / sxy]
    }

    pub fn element_id(&self, i: usize, j: usize, k: usize) -> usize {
        i + self.nx * j + self.nx * self.ny * k
    }

    pub fn element_ijk(&self, id: usize) -> [usize; 3] {
        let sxy = self.nx * self.ny;
        [id % self.nx, (id % sxy) / self.nx, id / sxy]
    }

    /// Global node ids of a global element, in hexahedron node order.
    pub fn element_nodes(&self, element: usize) -> [usize; NODES_PER_ELEMENT] {
        let [i, j, k] = self.element_ijk(element);
        let mut nodes = [0; NODES_PER_ELEMENT];
        for (slot, off) in NODE_OFFSETS.iter().enumerate() {
            nodes[slot] = self.node_id(i + off[0], j + off[1], k + off[2]);
        }
        nodes
    }

    /// Node counts per direction
    pub fn node_counts(&self) -> [usize; 3] {
        [self.nx + 1, self.ny + 1, self.nz + 1]
    }

    pub fn is_boundary_node(&self, id: usize) -> bool {
        let ijk = self.node_ijk(id);
        let counts = self.node_counts();
        (0..3).any(|d| ijk[d] == 0 || ijk[d] == counts[d] - 1)
    }

    /// An element is on the boundary when any of its nodes is.
    pub fn is_boundary_element(&self, id: usize) -> bool {
        let [i, j, k] = self.element_ijk(id);
        i == 0 || j == 0 || k == 0 || i + 1 == self.nx || j + 1 == self.ny || k + 1 == self.nz
    }

    /// The node one grid step inward from a boundary node, in every direction
    /// where it sits on the boundary and the grid has more than two nodes.
    ///
    /// Returns `None` for interior nodes or when no direction can be shifted.
    pub fn inward_node(&self, id: usize) -> Option<usize> {
        let mut ijk = self.node_ijk(id);
        let counts = self.node_counts();
        let mut shifted = false;
        for d in 0..3 {
            if counts[d] <= 2 {
                continue;
            }
            if ijk[d] == 0 {
                ijk[d] = 1;
                shifted = true;
            } else if ijk[d] == counts[d] - 1 {
                ijk[d] -= 1;
                shifted = true;
            }
        }
        shifted.then(|| self.node_id(ijk[0], ijk[1], ijk[2]))
    }
}

/// Connectivity of the domain (local + shadow) entities of one rank
///
/// All indices are domain indices. Incidence and neighbour lists are sorted
/// by global id so that every traversal is independent of the partition.
#[derive(Debug, Clone, Default)]
pub struct Topology {
    /// Domain node indices of each domain element
    pub element_nodes: Vec<[usize; NODES_PER_ELEMENT]>,
    /// Domain elements touching each domain node
    pub node_elements: Vec<Vec<usize>>,
    /// Domain nodes sharing an element with each node
    pub node_neighbors: Vec<Vec<usize>>,
    /// Domain elements sharing a node with each element
    pub element_neighbors: Vec<Vec<usize>>,
}

impl Topology {
    pub fn build(grid: &GridDims, decomp: &Decomposition) -> Self {
        let n_nodes = decomp.node_global.len();
        let n_elems = decomp.element_global.len();

        let mut element_nodes = Vec::with_capacity(n_elems);
        for &ge in &decomp.element_global {
            let global = grid.element_nodes(ge);
            let mut local = [0; NODES_PER_ELEMENT];
            for (slot, g) in global.iter().enumerate() {
                // Domain nodes are exactly the nodes of domain elements
                local[slot] = decomp.node_local[g];
            }
            element_nodes.push(local);
        }

        let mut node_elements: Vec<Vec<usize>> = vec![Vec::new(); n_nodes];
        for (e, nodes) in element_nodes.iter().enumerate() {
            for &n in nodes {
                node_elements[n].push(e);
            }
        }
        for list in node_elements.iter_mut() {
            list.sort_by_key(|&e| decomp.element_global[e]);
        }

        let mut node_neighbors: Vec<Vec<usize>> = vec![Vec::new(); n_nodes];
        for (n, elems) in node_elements.iter().enumerate() {
            let mut set: Vec<usize> = elems
                .iter()
                .flat_map(|&e| element_nodes[e].iter().copied())
                .filter(|&m| m != n)
                .collect();
            set.sort_by_key(|&m| decomp.node_global[m]);
            set.dedup();
            node_neighbors[n] = set;
        }

        let mut element_neighbors: Vec<Vec<usize>> = vec![Vec::new(); n_elems];
        for (e, nodes) in element_nodes.iter().enumerate() {
            let mut set: Vec<usize> = nodes
                .iter()
                .flat_map(|&n| node_elements[n].iter().copied())
                .filter(|&f| f != e)
                .collect();
            set.sort_by_key(|&f| decomp.element_global[f]);
            set.dedup();
            element_neighbors[e] = set;
        }

        Self {
            element_nodes,
            node_elements,
            node_neighbors,
            element_neighbors,
        }
    }
}
