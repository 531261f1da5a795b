/// Ten-tetrahedra decomposition of an 8-node hexahedron
///
/// Node numbering (x, y, z offsets from the element origin, y vertical):
/// ```text
///   0: (0,0,0)   1: (1,0,0)   2: (1,1,0)   3: (0,1,0)
///   4: (0,0,1)   5: (1,0,1)   6: (1,1,1)   7: (0,1,1)
/// ```
///
/// The hexahedron is covered twice, by two 5-tetrahedra decompositions. The
/// first is the central tetrahedron {0,2,5,7} plus the four corner tetrahedra
/// at nodes 1, 3, 4, 6. The second is the central tetrahedron {1,3,4,6} plus
/// the corners at 0, 2, 5, 7. Averaging both removes the orientation bias of
/// a single 5-split, so element volume is half the sum of the ten tet volumes.
///
/// Every tetrahedron is listed with positive orientation:
/// det(b-a, c-a, d-a) > 0 for an undeformed element.

pub const NODES_PER_ELEMENT: usize = 8;
pub const TETRA_PER_ELEMENT: usize = 10;
pub const FACES_PER_TETRA: usize = 4;
/// Each hexahedron node belongs to this many of the ten tetrahedra.
pub const TETRA_PER_NODE: usize = 5;

/// Element-local node indices of each tetrahedron.
pub const TETRA_TO_NODE: [[usize; 4]; TETRA_PER_ELEMENT] = [
    [0, 5, 2, 7],
    [1, 2, 0, 5],
    [3, 0, 2, 7],
    [4, 5, 0, 7],
    [6, 2, 5, 7],
    [1, 3, 4, 6],
    [0, 1, 3, 4],
    [2, 3, 1, 6],
    [5, 1, 4, 6],
    [7, 4, 3, 6],
];

/// Vertex triples of each tetrahedron face, wound so the right-hand normal
/// points outward. Face k is opposite vertex k.
pub const FACE_TO_VERTEX: [[usize; 3]; FACES_PER_TETRA] = [
    [1, 2, 3],
    [0, 3, 2],
    [0, 1, 3],
    [0, 2, 1],
];

/// For each element-local node: (tetrahedron, vertex slot within it) of the
/// five tetrahedra containing the node.
///
/// Since face k is opposite vertex k, the vertex slot is also the index of
/// the face whose traction loads this node.
pub const NODE_TO_TETRA: [[(usize, usize); TETRA_PER_NODE]; NODES_PER_ELEMENT] = [
    [(0, 0), (1, 2), (2, 1), (3, 2), (6, 0)],
    [(1, 0), (5, 0), (6, 1), (7, 2), (8, 1)],
    [(0, 2), (1, 1), (2, 2), (4, 1), (7, 0)],
    [(2, 0), (5, 1), (6, 2), (7, 1), (9, 2)],
    [(3, 0), (5, 2), (6, 3), (8, 2), (9, 1)],
    [(0, 1), (1, 3), (3, 1), (4, 2), (8, 0)],
    [(4, 0), (5, 3), (7, 3), (8, 3), (9, 3)],
    [(0, 3), (2, 3), (3, 3), (4, 3), (9, 0)],
];

/// Offsets (di, dj, dk) of each element-local node from the element origin.
pub const NODE_OFFSETS: [[usize; 3]; NODES_PER_ELEMENT] = [
    [0, 0, 0],
    [1, 0, 0],
    [1, 1, 0],
    [0, 1, 0],
    [0, 0, 1],
    [1, 0, 1],
    [1, 1, 1],
    [0, 1, 1],
];

/// Element-local nodes of the top (+y) quad, counter-clockwise seen from above.
pub const TOP_FACE: [usize; 4] = [3, 2, 6, 7];
/// Element-local nodes of the bottom (-y) quad.
pub const BOTTOM_FACE: [usize; 4] = [0, 1, 5, 4];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_to_tetra_consistent() {
        for (node, entries) in NODE_TO_TETRA.iter().enumerate() {
            for &(tet, slot) in entries {
                assert_eq!(TETRA_TO_NODE[tet][slot], node);
            }
        }
    }

    #[test]
    fn test_every_node_in_five_tetrahedra() {
        let mut count = [0usize; NODES_PER_ELEMENT];
        for tet in TETRA_TO_NODE.iter() {
            for &n in tet {
                count[n] += 1;
            }
        }
        assert!(count.iter().all(|&c| c == TETRA_PER_NODE));
    }

    #[test]
    fn test_faces_exclude_opposite_vertex() {
        for (k, face) in FACE_TO_VERTEX.iter().enumerate() {
            assert!(!face.contains(&k));
        }
    }
}
