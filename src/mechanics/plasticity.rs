/// Mohr-Coulomb plasticity with a tension cutoff
///
/// The return mapping works in principal stress space. Principal stresses
/// are sorted ascending, so s0 is the most compressive (tension positive).
///
/// **Yield functions:**
/// ```text
/// N_φ = (1 + sin φ) / (1 − sin φ)
/// f_s = s0 − s2 N_φ + 2c √N_φ      (shear, yields when < 0)
/// f_t = s2 − σ_t                   (tension, yields when > 0)
/// ```
/// with σ_t the tension cutoff, capped at c / tan φ when φ > 0.
///
/// A yielding state is returned to the shear surface or to the tension
/// cutoff depending on which side of the bisector of the corner it lies.
/// The flow rule is non-associated through the dilation angle ψ.
///
/// # References
/// - Cundall & Board (1988), "A microcomputer program for modelling
///   large-strain plasticity problems"
/// - Poliakov et al. (1993), "An explicit inertial method for the
///   simulation of viscoelastic flow"

use nalgebra::{Matrix3, SymmetricEigen, Vector3};

use super::material::{Material, MohrCoulomb};
use super::tensor::{self, SymTensor};

/// Outcome of one plastic evaluation
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlasticUpdate {
    pub stress: SymTensor,
    /// Increment of the accumulated plastic strain
    pub plastic_strain_increment: f64,
    pub yielded: bool,
}

/// Principal values sorted ascending, with the matching unit eigenvectors
/// as columns.
pub fn principal_stresses(stress: &SymTensor) -> (Vector3<f64>, Matrix3<f64>) {
    let eig = SymmetricEigen::new(tensor::to_matrix(stress));
    let mut order = [0usize, 1, 2];
    order.sort_by(|&a, &b| eig.eigenvalues[a].total_cmp(&eig.eigenvalues[b]));
    let values = Vector3::new(
        eig.eigenvalues[order[0]],
        eig.eigenvalues[order[1]],
        eig.eigenvalues[order[2]],
    );
    let vectors = Matrix3::from_columns(&[
        eig.eigenvectors.column(order[0]).into_owned(),
        eig.eigenvectors.column(order[1]).into_owned(),
        eig.eigenvectors.column(order[2]).into_owned(),
    ]);
    (values, vectors)
}

/// Elastic trial followed by a Mohr-Coulomb return.
///
/// # Arguments
/// * `material` - Elastic moduli (a1 = λ + 2μ, a2 = λ in the return)
/// * `yield_surface` - Friction, dilation and cohesion with softening
/// * `stress` - Prior stress (Pa)
/// * `strain_increment` - Δε = ε̇ Δt
/// * `plastic_strain` - Accumulated plastic strain before this step
pub fn mohr_coulomb_update(
    material: &Material,
    yield_surface: &MohrCoulomb,
    stress: &SymTensor,
    strain_increment: &SymTensor,
    plastic_strain: f64,
) -> PlasticUpdate {
    let trial = super::constitutive::elastic_update(material, stress, strain_increment);
    let (mut s, vectors) = principal_stresses(&trial);

    let params = yield_surface.parameters_at(plastic_strain);
    let sphi = params.friction.sin();
    let spsi = params.dilation.sin();
    let anphi = (1.0 + sphi) / (1.0 - sphi);
    let anpsi = (1.0 + spsi) / (1.0 - spsi);
    let c = params.cohesion;

    let mut st = yield_surface.tension_cutoff;
    if params.friction > 0.0 {
        st = st.min(c / params.friction.tan());
    }

    let fs = s[0] - s[2] * anphi + 2.0 * c * anphi.sqrt();
    let ft = s[2] - st;
    if !(fs < 0.0 || ft > 0.0) {
        return PlasticUpdate {
            stress: trial,
            plastic_strain_increment: 0.0,
            yielded: false,
        };
    }

    let a1 = material.p_modulus();
    let a2 = material.lambda;
    let a_p = (1.0 + anphi * anphi).sqrt() + anphi;
    let s_p = st * anphi - 2.0 * c * anphi.sqrt();
    let h = s[2] - st + a_p * (s[0] - s_p);

    let dep = if h < 0.0 {
        // Shear failure
        let alam = fs / (a1 - a2 * anpsi + a1 * anphi * anpsi - a2 * anphi + params.hardening);
        s[0] -= alam * (a1 - a2 * anpsi);
        s[1] -= alam * a2 * (1.0 - anpsi);
        s[2] -= alam * (a2 - a1 * anpsi);
        Vector3::new(alam, 0.0, -alam * anpsi)
    } else {
        // Tensile failure
        let alam = ft / a1;
        s[0] -= alam * a2;
        s[1] -= alam * a2;
        s[2] -= alam * a1;
        Vector3::new(0.0, 0.0, alam)
    };

    let depm = dep.sum() / 3.0;
    let dev = dep.add_scalar(-depm);
    let increment = (0.5 * (dev.norm_squared() + depm * depm)).sqrt();

    let rotated = vectors * Matrix3::from_diagonal(&s) * vectors.transpose();

    PlasticUpdate {
        stress: tensor::from_matrix(&rotated),
        plastic_strain_increment: increment,
        yielded: true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mechanics::tensor::{XX, XY, YY, ZZ};
    use approx::assert_relative_eq;

    fn material() -> Material {
        Material::elastic(3e10, 3e10, 2700.0)
    }

    #[test]
    fn test_principal_stresses_sorted() {
        let t = SymTensor::from_column_slice(&[1.0, -3.0, 2.0, 0.0, 0.0, 0.0]);
        let (s, v) = principal_stresses(&t);
        assert_relative_eq!(s, Vector3::new(-3.0, 1.0, 2.0), epsilon = 1e-12);
        assert_relative_eq!(v.column(0).y.abs(), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_below_yield_is_elastic() {
        let m = material();
        let mc = MohrCoulomb::constant(30.0, 0.0, 4e7);
        let de = SymTensor::from_column_slice(&[-1e-5, 0.0, 0.0, 0.0, 0.0, 0.0]);
        let out = mohr_coulomb_update(&m, &mc, &SymTensor::zeros(), &de, 0.0);
        assert!(!out.yielded);
        assert_eq!(out.plastic_strain_increment, 0.0);
        assert_relative_eq!(out.stress[XX], -9e5, epsilon = 1e-6);
    }

    #[test]
    fn test_shear_return_lands_on_yield_surface() {
        let m = material();
        let mc = MohrCoulomb::constant(30.0, 0.0, 1e6);
        // Strong uniaxial shortening
        let de = SymTensor::from_column_slice(&[-1e-3, 0.0, 0.0, 0.0, 0.0, 0.0]);
        let out = mohr_coulomb_update(&m, &mc, &SymTensor::zeros(), &de, 0.0);
        assert!(out.yielded);
        assert!(out.plastic_strain_increment > 0.0);

        let (s, _) = principal_stresses(&out.stress);
        let sphi = 30.0_f64.to_radians().sin();
        let anphi = (1.0 + sphi) / (1.0 - sphi);
        let fs = s[0] - s[2] * anphi + 2.0 * 1e6 * anphi.sqrt();
        assert_relative_eq!(fs, 0.0, epsilon = 1e-3 * 1e6);
        // Axes are preserved for a coaxial load
        assert_relative_eq!(out.stress[XY], 0.0, epsilon = 1e-3);
        assert_relative_eq!(out.stress[YY], out.stress[ZZ], max_relative = 1e-9);
    }

    #[test]
    fn test_tension_cutoff() {
        let m = material();
        let mut mc = MohrCoulomb::constant(30.0, 0.0, 1e9);
        mc.tension_cutoff = 1e6;
        let de = SymTensor::from_column_slice(&[1e-4, 0.0, 0.0, 0.0, 0.0, 0.0]);
        let out = mohr_coulomb_update(&m, &mc, &SymTensor::zeros(), &de, 0.0);
        assert!(out.yielded);
        let (s, _) = principal_stresses(&out.stress);
        assert_relative_eq!(s[2], 1e6, max_relative = 1e-9);
    }
}
