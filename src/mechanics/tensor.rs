/// Symmetric second-order tensors in Voigt storage
///
/// Component order: [xx, yy, zz, xy, yz, xz]. Only the six independent
/// components are stored, so symmetry holds by construction.

use nalgebra::{Matrix3, SMatrix, Vector3};

/// Symmetric 3×3 tensor stored as a 6×1 Voigt vector.
pub type SymTensor = SMatrix<f64, 6, 1>;

pub const XX: usize = 0;
pub const YY: usize = 1;
pub const ZZ: usize = 2;
pub const XY: usize = 3;
pub const YZ: usize = 4;
pub const XZ: usize = 5;

/// Expand Voigt storage to a full 3×3 matrix.
pub fn to_matrix(t: &SymTensor) -> Matrix3<f64> {
    Matrix3::new(
        t[XX], t[XY], t[XZ],
        t[XY], t[YY], t[YZ],
        t[XZ], t[YZ], t[ZZ],
    )
}

/// Collapse a 3×3 matrix to Voigt storage using its symmetric part.
pub fn from_matrix(m: &Matrix3<f64>) -> SymTensor {
    SymTensor::from_column_slice(&[
        m[(0, 0)],
        m[(1, 1)],
        m[(2, 2)],
        0.5 * (m[(0, 1)] + m[(1, 0)]),
        0.5 * (m[(1, 2)] + m[(2, 1)]),
        0.5 * (m[(0, 2)] + m[(2, 0)]),
    ])
}

pub fn trace(t: &SymTensor) -> f64 {
    t[XX] + t[YY] + t[ZZ]
}

/// Add `value` to each diagonal component.
pub fn shift_diagonal(t: &mut SymTensor, value: f64) {
    t[XX] += value;
    t[YY] += value;
    t[ZZ] += value;
}

/// Sum of the pairwise products of the diagonal: t11 t22 + t22 t00 + t00 t11.
pub fn diagonal_products(t: &SymTensor) -> f64 {
    t[YY] * t[ZZ] + t[ZZ] * t[XX] + t[XX] * t[YY]
}

/// Sum of squared off-diagonal components: t01² + t12² + t02².
pub fn off_diagonal_squares(t: &SymTensor) -> f64 {
    t[XY] * t[XY] + t[YZ] * t[YZ] + t[XZ] * t[XZ]
}

/// Trace-based second-invariant measure used for element summaries and for
/// choosing between rheology branches.
///
/// 0.5 * sqrt(0.5 * |-(t11 t22 + t22 t00 + t00 t11) + (t01² + t12² + t02²)|)
///
/// This is deliberately not the von Mises J2: the diagonal enters without
/// removing the mean, and the two measures rank tensors differently.
pub fn pseudo_invariant(t: &SymTensor) -> f64 {
    summary_invariant(diagonal_products(t), off_diagonal_squares(t))
}

/// Combine averaged diagonal products and off-diagonal squares into the
/// scalar summary 0.5 * sqrt(0.5 * |-vol + other|).
pub fn summary_invariant(vol: f64, other: f64) -> f64 {
    0.5 * (0.5 * (-vol + other).abs()).sqrt()
}

pub fn is_finite(t: &SymTensor) -> bool {
    t.iter().all(|v| v.is_finite())
}

/// Antisymmetric spin W = skew(∇v), stored as (w01, w12, w02).
pub type Spin = Vector3<f64>;

pub fn spin_from_gradient(l: &Matrix3<f64>) -> Spin {
    Spin::new(
        0.5 * (l[(0, 1)] - l[(1, 0)]),
        0.5 * (l[(1, 2)] - l[(2, 1)]),
        0.5 * (l[(0, 2)] - l[(2, 0)]),
    )
}

pub fn spin_matrix(w: &Spin) -> Matrix3<f64> {
    Matrix3::new(
        0.0, w[0], w[2],
        -w[0], 0.0, w[1],
        -w[2], -w[1], 0.0,
    )
}

/// Objective (Jaumann) rotation of a tensor over one step: t + (W t − t W) dt.
pub fn jaumann_rotate(t: &SymTensor, w: &Spin, dt: f64) -> SymTensor {
    let m = to_matrix(t);
    let wm = spin_matrix(w);
    t + from_matrix(&((wm * m - m * wm) * dt))
}

/// Deviatoric part: t − tr(t)/3 I.
pub fn deviatoric(t: &SymTensor) -> SymTensor {
    let mut d = *t;
    shift_diagonal(&mut d, -trace(t) / 3.0);
    d
}
