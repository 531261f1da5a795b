/// Per-node and per-element mechanical state
///
/// Nodes carry the kinematic state advanced by the explicit update. Elements
/// carry ten tetrahedra, each with its own stress history, so that strain and
/// stress are evaluated on constant-strain sub-elements.

use nalgebra::{Point3, Vector3};

use super::hexahedron::{FACES_PER_TETRA, TETRA_PER_ELEMENT};
use crate::mechanics::tensor::{Spin, SymTensor};

/// Kinematic state of a mesh node
///
/// Coordinates live in [`crate::mesh::Mesh::coords`] under the same index.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Node {
    pub velocity: Vector3<f64>,
    /// Lumped physical mass (kg)
    pub mass: f64,
    /// Mass scaled for explicit stability
    pub inertial_mass: f64,
    /// Net nodal force from the last force assembly (N)
    pub force: Vector3<f64>,
    /// Sum of absolute force contributions, per component
    pub balance: Vector3<f64>,
    /// Nodal temperature (°C), advanced by the heat conduction plugin
    pub temperature: f64,
}

/// Cached geometry of one tetrahedron
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TetGeometry {
    pub volume: f64,
    /// Area of the face opposite each vertex
    pub areas: [f64; FACES_PER_TETRA],
    /// Outward unit normal of the face opposite each vertex
    pub normals: [Vector3<f64>; FACES_PER_TETRA],
}

impl Default for TetGeometry {
    fn default() -> Self {
        Self {
            volume: 0.0,
            areas: [0.0; FACES_PER_TETRA],
            normals: [Vector3::zeros(); FACES_PER_TETRA],
        }
    }
}

impl TetGeometry {
    /// Compute volume, face areas and outward normals from vertex coordinates.
    ///
    /// The signed volume is kept as is. Callers reject non-positive volumes.
    pub fn from_vertices(v: &[Point3<f64>; 4]) -> Self {
        use super::hexahedron::FACE_TO_VERTEX;

        let volume = signed_volume(v);
        let mut areas = [0.0; FACES_PER_TETRA];
        let mut normals = [Vector3::zeros(); FACES_PER_TETRA];
        for (k, face) in FACE_TO_VERTEX.iter().enumerate() {
            let a = v[face[0]];
            let b = v[face[1]];
            let c = v[face[2]];
            let cross = (b - a).cross(&(c - a));
            let norm = cross.norm();
            areas[k] = 0.5 * norm;
            if norm > 0.0 {
                normals[k] = cross / norm;
            }
        }
        Self { volume, areas, normals }
    }

    /// Gradient of the linear shape function of vertex k: -A_k n_k / (3V).
    pub fn shape_gradient(&self, k: usize) -> Vector3<f64> {
        -self.normals[k] * self.areas[k] / (3.0 * self.volume)
    }

    /// Smallest |V / A| over the four faces.
    pub fn min_length_scale(&self) -> f64 {
        self.areas
            .iter()
            .filter(|&&a| a != 0.0)
            .map(|&a| (self.volume / a).abs())
            .fold(f64::INFINITY, f64::min)
    }
}

/// Signed volume det(b-a, c-a, d-a) / 6
pub fn signed_volume(v: &[Point3<f64>; 4]) -> f64 {
    let e1 = v[1] - v[0];
    let e2 = v[2] - v[0];
    let e3 = v[3] - v[0];
    e1.dot(&e2.cross(&e3)) / 6.0
}

/// Constant-strain sub-element of a hexahedron
#[derive(Debug, Clone, PartialEq)]
pub struct Tetrahedron {
    pub strain_rate: SymTensor,
    /// Rigid rotation rate, for objective stress rotation
    pub spin: Spin,
    /// Strain rate times dt for the current step
    pub strain_increment: SymTensor,
    /// Accumulated strain
    pub strain: SymTensor,
    pub stress: SymTensor,
    pub geometry: TetGeometry,
    pub density: f64,
    /// Average temperature of the four vertices (°C)
    pub temperature: f64,
    pub material: usize,
    /// Accumulated plastic strain
    pub plastic_strain: f64,
    /// Effective viscosity from the last Maxwell update (Pa·s)
    pub viscosity: f64,
}

impl Default for Tetrahedron {
    fn default() -> Self {
        Self {
            strain_rate: SymTensor::zeros(),
            spin: Spin::zeros(),
            strain_increment: SymTensor::zeros(),
            strain: SymTensor::zeros(),
            stress: SymTensor::zeros(),
            geometry: TetGeometry::default(),
            density: 0.0,
            temperature: 0.0,
            material: 0,
            plastic_strain: 0.0,
            viscosity: 0.0,
        }
    }
}

impl Tetrahedron {
    pub fn volume(&self) -> f64 {
        self.geometry.volume
    }
}

/// Hexahedral element made of ten tetrahedra
#[derive(Debug, Clone, PartialEq)]
pub struct Element {
    pub material: usize,
    pub tetra: [Tetrahedron; TETRA_PER_ELEMENT],
    /// Half the summed tet volume (the two decompositions overlap)
    pub volume: f64,
    /// Scalar stress summary
    pub stress: f64,
    /// Scalar strain-rate summary
    pub strain_rate: f64,
    pub pressure: f64,
    /// Volume-averaged accumulated plastic strain
    pub aps: f64,
}

impl Element {
    pub fn new(material: usize, density: f64, temperature: f64) -> Self {
        let mut tet = Tetrahedron::default();
        tet.material = material;
        tet.density = density;
        tet.temperature = temperature;
        Self {
            material,
            tetra: std::array::from_fn(|_| tet.clone()),
            volume: 0.0,
            stress: 0.0,
            strain_rate: 0.0,
            pressure: 0.0,
            aps: 0.0,
        }
    }

    /// Sum of the ten tet volumes (twice the element volume).
    pub fn doubled_volume(&self) -> f64 {
        self.tetra.iter().map(|t| t.geometry.volume).sum()
    }

    /// Mass of the element: half the density-weighted tet volume sum.
    pub fn mass(&self) -> f64 {
        0.5 * self
            .tetra
            .iter()
            .map(|t| t.density * t.geometry.volume)
            .sum::<f64>()
    }
}

/// Values per node on the wire: velocity, coordinates, mass, inertial
/// mass, force, force balance and temperature
pub const NODE_STRIDE: usize = 15;
/// Values per tetrahedron on the wire (geometry is recomputed locally)
pub const TETRA_STRIDE: usize = 32;
/// Values per element on the wire: five element scalars and ten tetrahedra
pub const ELEMENT_STRIDE: usize = 5 + TETRA_PER_ELEMENT * TETRA_STRIDE;

impl Node {
    pub fn pack(&self, coord: &Point3<f64>, out: &mut Vec<f64>) {
        out.extend_from_slice(self.velocity.as_slice());
        out.extend_from_slice(coord.coords.as_slice());
        out.push(self.mass);
        out.push(self.inertial_mass);
        out.extend_from_slice(self.force.as_slice());
        out.extend_from_slice(self.balance.as_slice());
        out.push(self.temperature);
    }

    /// Inverse of [`Node::pack`]. Returns the coordinates.
    pub fn unpack(&mut self, values: &[f64]) -> Point3<f64> {
        self.velocity = Vector3::from_column_slice(&values[0..3]);
        let coord = Point3::new(values[3], values[4], values[5]);
        self.mass = values[6];
        self.inertial_mass = values[7];
        self.force = Vector3::from_column_slice(&values[8..11]);
        self.balance = Vector3::from_column_slice(&values[11..14]);
        self.temperature = values[14];
        coord
    }
}

impl Tetrahedron {
    fn pack(&self, out: &mut Vec<f64>) {
        out.extend_from_slice(self.strain_rate.as_slice());
        out.extend_from_slice(self.spin.as_slice());
        out.extend_from_slice(self.strain_increment.as_slice());
        out.extend_from_slice(self.strain.as_slice());
        out.extend_from_slice(self.stress.as_slice());
        out.extend_from_slice(&[
            self.density,
            self.temperature,
            self.material as f64,
            self.plastic_strain,
            self.viscosity,
        ]);
    }

    fn unpack(&mut self, v: &[f64]) {
        self.strain_rate = SymTensor::from_column_slice(&v[0..6]);
        self.spin = Spin::from_column_slice(&v[6..9]);
        self.strain_increment = SymTensor::from_column_slice(&v[9..15]);
        self.strain = SymTensor::from_column_slice(&v[15..21]);
        self.stress = SymTensor::from_column_slice(&v[21..27]);
        self.density = v[27];
        self.temperature = v[28];
        self.material = v[29] as usize;
        self.plastic_strain = v[30];
        self.viscosity = v[31];
    }
}

impl Element {
    pub fn pack(&self, out: &mut Vec<f64>) {
        out.extend_from_slice(&[self.material as f64, self.stress, self.strain_rate, self.pressure, self.aps]);
        for tet in &self.tetra {
            tet.pack(out);
        }
    }

    pub fn unpack(&mut self, values: &[f64]) {
        self.material = values[0] as usize;
        self.stress = values[1];
        self.strain_rate = values[2];
        self.pressure = values[3];
        self.aps = values[4];
        for (t, tet) in self.tetra.iter_mut().enumerate() {
            let start = 5 + t * TETRA_STRIDE;
            tet.unpack(&values[start..start + TETRA_STRIDE]);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn unit_tet() -> [Point3<f64>; 4] {
        [
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
            Point3::new(0.0, 0.0, 1.0),
        ]
    }

    #[test]
    fn test_unit_tet_geometry() {
        let g = TetGeometry::from_vertices(&unit_tet());
        assert_relative_eq!(g.volume, 1.0 / 6.0, epsilon = 1e-15);
        assert_relative_eq!(g.areas[1], 0.5, epsilon = 1e-15);
        assert_relative_eq!(g.normals[1], Vector3::new(-1.0, 0.0, 0.0), epsilon = 1e-15);
        assert_relative_eq!(g.normals[0].norm(), 1.0, epsilon = 1e-15);
        assert!(g.normals[0].x > 0.0);
    }

    #[test]
    fn test_shape_gradients_sum_to_zero() {
        let g = TetGeometry::from_vertices(&unit_tet());
        let sum: Vector3<f64> = (0..4).map(|k| g.shape_gradient(k)).sum();
        assert_relative_eq!(sum, Vector3::zeros(), epsilon = 1e-14);
        // N_1 = x on the unit tet
        assert_relative_eq!(g.shape_gradient(1), Vector3::new(1.0, 0.0, 0.0), epsilon = 1e-14);
    }

    #[test]
    fn test_min_length_scale() {
        let g = TetGeometry::from_vertices(&unit_tet());
        // Largest face is the slanted one with area sqrt(3)/2
        assert_relative_eq!(g.min_length_scale(), (1.0 / 6.0) / (3.0f64.sqrt() / 2.0), epsilon = 1e-14);
    }

    #[test]
    fn test_element_pack_layout() {
        let mut el = Element::new(2, 2700.0, 500.0);
        el.tetra[9].stress[3] = -4.0e6;
        el.tetra[0].plastic_strain = 0.25;
        el.aps = 0.1;
        let mut buf = Vec::new();
        el.pack(&mut buf);
        assert_eq!(buf.len(), ELEMENT_STRIDE);

        let mut other = Element::new(0, 0.0, 0.0);
        other.unpack(&buf);
        assert_eq!(other, el);

        let mut node_buf = Vec::new();
        let node = Node {
            velocity: Vector3::new(1.0, 2.0, 3.0),
            mass: 5.0,
            temperature: 640.0,
            ..Node::default()
        };
        node.pack(&Point3::new(7.0, 8.0, 9.0), &mut node_buf);
        assert_eq!(node_buf.len(), NODE_STRIDE);
        let mut back = Node::default();
        assert_eq!(back.unpack(&node_buf), Point3::new(7.0, 8.0, 9.0));
        assert_eq!(back, node);
    }
}
