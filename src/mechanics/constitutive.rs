/// Incremental elastic and Maxwell stress updates
///
/// Both updates take the rotated prior stress and the strain increment of
/// one tetrahedron and return the new stress. They never modify their
/// input, so the rheology tie-break can evaluate several branches from the
/// same prior state.

use super::material::Material;
use super::tensor::{self, SymTensor, XY, XZ, YZ};

/// Linear elastic (Hookean) increment
///
/// **Stress update:**
/// ```text
/// σ_{n+1} = σ_n + 2μ Δε + λ tr(Δε) I
/// ```
///
/// # Arguments
/// * `material` - Provides the Lamé parameters λ and μ
/// * `stress` - Prior stress (Pa)
/// * `strain_increment` - Δε = ε̇ Δt
pub fn elastic_update(material: &Material, stress: &SymTensor, strain_increment: &SymTensor) -> SymTensor {
    let mut out = stress + strain_increment * (2.0 * material.mu);
    tensor::shift_diagonal(&mut out, material.lambda * tensor::trace(strain_increment));
    out
}

/// Result of a Maxwell update
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MaxwellUpdate {
    pub stress: SymTensor,
    /// Effective viscosity used (Pa·s)
    pub viscosity: f64,
}

/// Second invariant of the deviatoric strain increment, as a rate.
///
/// sqrt(|e1 e2 + e2 e0 + e0 e1 − e01² − e02² − e12²|) / Δt
pub fn deviatoric_rate_invariant(strain_increment: &SymTensor, dt: f64) -> f64 {
    let dev = tensor::deviatoric(strain_increment);
    (tensor::diagonal_products(&dev) - tensor::off_diagonal_squares(&dev)).abs().sqrt() / dt
}

/// Maxwell viscoelastic increment
///
/// Splits stress into deviatoric and volumetric parts. The deviator relaxes
/// with a Crank-Nicolson-like factor, the volumetric part stays elastic:
/// ```text
/// θ   = μ Δt / (2η)
/// s'  = (s (1 − θ) + 2μ e) / (1 + θ)
/// p'  = tr(σ)/3 + K tr(Δε)
/// ```
/// where e is the deviatoric strain increment and K = λ + 2μ/3.
///
/// The viscosity comes from the material's power-law at the deviatoric
/// strain-rate invariant and the tetrahedron temperature.
///
/// # Arguments
/// * `material` - Elastic moduli and viscosity law
/// * `stress` - Prior stress (Pa)
/// * `strain_increment` - Δε = ε̇ Δt
/// * `temperature` - Tetrahedron temperature (°C)
/// * `dt` - Timestep (s)
pub fn maxwell_update(
    material: &Material,
    stress: &SymTensor,
    strain_increment: &SymTensor,
    temperature: f64,
    dt: f64,
) -> MaxwellUpdate {
    let rate = deviatoric_rate_invariant(strain_increment, dt);
    let viscosity = material
        .viscosity
        .viscosity(rate, temperature, material.reference_temperature);

    let theta = material.mu / (2.0 * viscosity) * dt;
    let vic1 = 1.0 - theta;
    let vic2 = 1.0 / (1.0 + theta);

    let mean_stress = tensor::trace(stress) / 3.0;
    let mean_strain = tensor::trace(strain_increment) / 3.0;
    let s_dev = tensor::deviatoric(stress);
    let e_dev = tensor::deviatoric(strain_increment);

    let mut out = (s_dev * vic1 + e_dev * (2.0 * material.mu)) * vic2;
    for c in [XY, YZ, XZ] {
        out[c] = (stress[c] * vic1 + 2.0 * material.mu * strain_increment[c]) * vic2;
    }
    tensor::shift_diagonal(&mut out, mean_stress + material.bulk_modulus() * 3.0 * mean_strain);

    MaxwellUpdate { stress: out, viscosity }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mechanics::tensor::{XX, YY, ZZ};
    use approx::assert_relative_eq;

    fn material() -> Material {
        Material::elastic(3e10, 3e10, 2700.0)
    }

    #[test]
    fn test_elastic_uniaxial_strain() {
        let m = material();
        let de = SymTensor::from_column_slice(&[1e-6, 0.0, 0.0, 0.0, 0.0, 0.0]);
        let s = elastic_update(&m, &SymTensor::zeros(), &de);
        assert_relative_eq!(s[XX], (m.lambda + 2.0 * m.mu) * 1e-6, epsilon = 1e-6);
        assert_relative_eq!(s[YY], m.lambda * 1e-6, epsilon = 1e-6);
        assert_relative_eq!(s[ZZ], m.lambda * 1e-6, epsilon = 1e-6);
    }

    #[test]
    fn test_maxwell_stiff_limit_is_elastic() {
        let mut m = material();
        m.viscosity.vis_min = 1e40;
        m.viscosity.vis_max = 1e40;
        let de = SymTensor::from_column_slice(&[1e-6, -2e-7, 0.0, 3e-7, 0.0, 0.0]);
        let prior = SymTensor::from_column_slice(&[1e6, 2e6, 3e6, 4e5, 0.0, 1e5]);
        let visco = maxwell_update(&m, &prior, &de, 0.0, 1.0).stress;
        let elastic = elastic_update(&m, &prior, &de);
        assert_relative_eq!(visco, elastic, max_relative = 1e-9);
    }

    #[test]
    fn test_maxwell_relaxes_deviator_and_keeps_pressure() {
        let mut m = material();
        m.viscosity.vis_min = 1e19;
        m.viscosity.vis_max = 1e19;
        let prior = SymTensor::from_column_slice(&[-2e7, -1e7, -1e7, 5e6, 0.0, 0.0]);
        // A tenth of the Maxwell time η/μ with no straining
        let dt = 1e19 / 3e10 * 0.1;
        let out = maxwell_update(&m, &prior, &SymTensor::zeros(), 0.0, dt);
        assert_relative_eq!(tensor::trace(&out.stress), tensor::trace(&prior), max_relative = 1e-12);
        let theta: f64 = 0.05;
        assert_relative_eq!(out.stress[XY], 5e6 * (1.0 - theta) / (1.0 + theta), max_relative = 1e-12);
        assert_relative_eq!(
            out.stress[XX] - out.stress[YY],
            (prior[XX] - prior[YY]) * (1.0 - theta) / (1.0 + theta),
            max_relative = 1e-9
        );
        assert_relative_eq!(out.viscosity, 1e19);
    }

    #[test]
    fn test_deviatoric_rate_invariant_ignores_pressure() {
        let de = SymTensor::from_column_slice(&[1e-3, 1e-3, 1e-3, 0.0, 0.0, 0.0]);
        assert_relative_eq!(deviatoric_rate_invariant(&de, 1.0), 0.0, epsilon = 1e-18);
        let shear = SymTensor::from_column_slice(&[0.0, 0.0, 0.0, 2e-3, 0.0, 0.0]);
        assert_relative_eq!(deviatoric_rate_invariant(&shear, 2.0), 1e-3, epsilon = 1e-15);
    }
}
