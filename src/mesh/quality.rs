/// Mesh quality assessment
///
/// After a remesh the new grid should be free of inverted tetrahedra. The
/// report here is logged so that slowly degrading meshes show up in runs
/// long before a geometry error stops them.

use rayon::prelude::*;

use super::geometry::Mesh;
use super::hexahedron::TETRA_PER_ELEMENT;
use super::state::signed_volume;

/// Tetrahedron volume statistics over the local elements
#[derive(Debug, Clone, PartialEq)]
pub struct MeshQuality {
    pub min_volume: f64,
    pub max_volume: f64,
    /// Tetrahedra with non-positive volume
    pub num_inverted: usize,
    pub total_tetra: usize,
}

impl MeshQuality {
    pub fn is_acceptable(&self) -> bool {
        self.num_inverted == 0
    }

    /// Ratio of the smallest to the largest tet volume
    pub fn volume_ratio(&self) -> f64 {
        if self.max_volume > 0.0 {
            self.min_volume / self.max_volume
        } else {
            0.0
        }
    }

    pub fn report(&self) -> String {
        format!(
            "Mesh Quality: min_V={:.3e}, max_V={:.3e}, ratio={:.3}, inverted={}/{}",
            self.min_volume,
            self.max_volume,
            self.volume_ratio(),
            self.num_inverted,
            self.total_tetra
        )
    }
}

/// Assess tet volumes of the local elements from the current coordinates.
///
/// Uses parallel computation for large meshes (>1000 elements).
pub fn assess_mesh_quality(mesh: &Mesh) -> MeshQuality {
    let local = mesh.decomposition.local_elements;
    let volumes = |e: usize| -> [f64; TETRA_PER_ELEMENT] {
        std::array::from_fn(|t| signed_volume(&mesh.tet_vertices(e, t)))
    };

    let per_element: Vec<[f64; TETRA_PER_ELEMENT]> = if local > 1000 {
        (0..local).into_par_iter().map(volumes).collect()
    } else {
        (0..local).map(volumes).collect()
    };

    let mut min_volume = f64::INFINITY;
    let mut max_volume = f64::NEG_INFINITY;
    let mut num_inverted = 0;
    for v in per_element.iter().flatten() {
        min_volume = min_volume.min(*v);
        max_volume = max_volume.max(*v);
        if *v <= 0.0 {
            num_inverted += 1;
        }
    }

    MeshQuality {
        min_volume,
        max_volume,
        num_inverted,
        total_tetra: local * TETRA_PER_ELEMENT,
    }
}
