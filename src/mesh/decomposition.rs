/// Slab partition of the structured grid across ranks
///
/// Rank r owns the element columns `[e_r, e_{r+1})` along x and the node
/// columns with the same bounds; the last rank also owns node column `nx`.
/// Each rank additionally holds one shadow element column on either side,
/// and every node of those elements. Local entities come first in domain
/// order, then shadows, each group ascending by global id.

use std::collections::HashMap;
use std::ops::Range;

use super::topology::GridDims;
use crate::error::{Error, Result};

#[derive(Debug, Clone)]
pub struct Decomposition {
    pub rank: usize,
    pub size: usize,
    /// Owned element (and node) columns along x
    pub columns: Range<usize>,
    pub local_elements: usize,
    pub local_nodes: usize,
    /// Domain → global maps
    pub element_global: Vec<usize>,
    pub node_global: Vec<usize>,
    /// Global → domain maps
    pub element_local: HashMap<usize, usize>,
    pub node_local: HashMap<usize, usize>,
    /// Owning rank of each domain entity
    pub element_owner: Vec<usize>,
    pub node_owner: Vec<usize>,
    /// Ranks holding a slab adjacent to this one
    pub neighbours: Vec<usize>,
}

/// First element column owned by `rank`.
fn column_start(nx: usize, size: usize, rank: usize) -> usize {
    rank * nx / size
}

impl Decomposition {
    /// Partition `grid` for `rank` out of `size` ranks.
    ///
    /// # Errors
    /// `Config` when there are no ranks or fewer element columns than ranks.
    pub fn new(grid: &GridDims, rank: usize, size: usize) -> Result<Self> {
        if size == 0 || rank >= size {
            return Err(Error::config(format!("invalid rank {} of {}", rank, size)));
        }
        if grid.nx < size {
            return Err(Error::config(format!(
                "{} element columns cannot be split over {} ranks",
                grid.nx, size
            )));
        }
        let nx = grid.nx;
        let start = column_start(nx, size, rank);
        let end = column_start(nx, size, rank + 1);

        let element_owner_of = |i: usize| (0..size).rev().find(|&r| column_start(nx, size, r) <= i).unwrap_or(0);
        let node_owner_of = |i: usize| if i == nx { size - 1 } else { element_owner_of(i) };

        let lo = start.saturating_sub(1);
        let hi = (end + 1).min(nx);

        let mut local_e = Vec::new();
        let mut shadow_e = Vec::new();
        for k in 0..grid.nz {
            for j in 0..grid.ny {
                for i in lo..hi {
                    let id = grid.element_id(i, j, k);
                    if (start..end).contains(&i) {
                        local_e.push(id);
                    } else {
                        shadow_e.push(id);
                    }
                }
            }
        }

        let owns_node_column = |i: usize| (start..end).contains(&i) || (i == nx && rank + 1 == size);
        let mut local_n = Vec::new();
        let mut shadow_n = Vec::new();
        for k in 0..=grid.nz {
            for j in 0..=grid.ny {
                for i in lo..=hi {
                    let id = grid.node_id(i, j, k);
                    if owns_node_column(i) {
                        local_n.push(id);
                    } else {
                        shadow_n.push(id);
                    }
                }
            }
        }

        let local_elements = local_e.len();
        let local_nodes = local_n.len();
        let element_global: Vec<usize> = local_e.into_iter().chain(shadow_e).collect();
        let node_global: Vec<usize> = local_n.into_iter().chain(shadow_n).collect();

        let element_local = element_global.iter().enumerate().map(|(l, &g)| (g, l)).collect();
        let node_local = node_global.iter().enumerate().map(|(l, &g)| (g, l)).collect();
        let element_owner = element_global
            .iter()
            .map(|&g| element_owner_of(grid.element_ijk(g)[0]))
            .collect();
        let node_owner = node_global
            .iter()
            .map(|&g| node_owner_of(grid.node_ijk(g)[0]))
            .collect();

        let mut neighbours = Vec::new();
        if rank > 0 {
            neighbours.push(rank - 1);
        }
        if rank + 1 < size {
            neighbours.push(rank + 1);
        }

        Ok(Self {
            rank,
            size,
            columns: start..end,
            local_elements,
            local_nodes,
            element_global,
            node_global,
            element_local,
            node_local,
            element_owner,
            node_owner,
            neighbours,
        })
    }

    pub fn domain_nodes(&self) -> usize {
        self.node_global.len()
    }

    pub fn domain_elements(&self) -> usize {
        self.element_global.len()
    }

    pub fn is_local_node(&self, n: usize) -> bool {
        n < self.local_nodes
    }

    pub fn is_local_element(&self, e: usize) -> bool {
        e < self.local_elements
    }

    /// Domain indices of shadow nodes owned by `peer`, ascending global id.
    pub fn shadow_nodes_from(&self, peer: usize) -> Vec<usize> {
        (self.local_nodes..self.domain_nodes())
            .filter(|&n| self.node_owner[n] == peer)
            .collect()
    }

    /// Domain indices of shadow elements owned by `peer`, ascending global id.
    pub fn shadow_elements_from(&self, peer: usize) -> Vec<usize> {
        (self.local_elements..self.domain_elements())
            .filter(|&e| self.element_owner[e] == peer)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_rank_owns_everything() {
        let g = GridDims::new(4, 3, 2);
        let d = Decomposition::new(&g, 0, 1).unwrap();
        assert_eq!(d.local_elements, g.num_elements());
        assert_eq!(d.local_nodes, g.num_nodes());
        assert_eq!(d.domain_nodes(), d.local_nodes);
        assert!(d.neighbours.is_empty());
        // Local ordering is ascending global id
        assert!(d.node_global.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_two_ranks_partition_nodes_exactly_once() {
        let g = GridDims::new(4, 2, 2);
        let d0 = Decomposition::new(&g, 0, 2).unwrap();
        let d1 = Decomposition::new(&g, 1, 2).unwrap();
        assert_eq!(d0.local_nodes + d1.local_nodes, g.num_nodes());
        assert_eq!(d0.local_elements + d1.local_elements, g.num_elements());

        // Node column 2 belongs to rank 1, column 4 to the last rank
        let n = g.node_id(2, 1, 1);
        assert_eq!(d0.node_owner[d0.node_local[&n]], 1);
        assert!(d1.is_local_node(d1.node_local[&n]));
        let last = g.node_id(4, 0, 0);
        assert!(d1.is_local_node(d1.node_local[&last]));

        // One shadow element column on the interior side
        assert_eq!(d0.domain_elements() - d0.local_elements, g.ny * g.nz);
        assert_eq!(d0.shadow_elements_from(1).len(), g.ny * g.nz);
    }

    #[test]
    fn test_every_local_element_node_is_in_domain() {
        let g = GridDims::new(6, 2, 2);
        for rank in 0..3 {
            let d = Decomposition::new(&g, rank, 3).unwrap();
            for &ge in &d.element_global {
                for n in g.element_nodes(ge) {
                    assert!(d.node_local.contains_key(&n));
                }
            }
        }
    }

    #[test]
    fn test_too_many_ranks_is_config_error() {
        let g = GridDims::new(2, 2, 2);
        assert!(matches!(Decomposition::new(&g, 0, 3), Err(Error::Config(_))));
    }
}
