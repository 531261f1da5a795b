/// Material table entries for elasto-visco-plastic rock
///
/// A material combines linear elasticity (Lamé λ, μ) with an optional
/// power-law Maxwell viscosity and an optional Mohr-Coulomb yield surface
/// with piecewise-linear strain softening.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Universal gas constant (J / mol / K)
pub const GAS_CONSTANT: f64 = 8.31448;

/// One rheology that can be switched on for a material
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RheologyKind {
    Elastic,
    Maxwell,
    Plastic,
}

/// Set of active rheologies
///
/// Elasticity is always the trial state; the Maxwell and plastic branches
/// compete through the rheology tie-break when both are enabled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "Vec<RheologyKind>", into = "Vec<RheologyKind>")]
pub struct Rheology {
    pub maxwell: bool,
    pub plastic: bool,
}

impl Rheology {
    pub const ELASTIC: Rheology = Rheology { maxwell: false, plastic: false };
    pub const MAXWELL: Rheology = Rheology { maxwell: true, plastic: false };
    pub const PLASTIC: Rheology = Rheology { maxwell: false, plastic: true };
    pub const VISCOPLASTIC: Rheology = Rheology { maxwell: true, plastic: true };
}

impl From<Vec<RheologyKind>> for Rheology {
    fn from(kinds: Vec<RheologyKind>) -> Self {
        Rheology {
            maxwell: kinds.contains(&RheologyKind::Maxwell),
            plastic: kinds.contains(&RheologyKind::Plastic),
        }
    }
}

impl From<Rheology> for Vec<RheologyKind> {
    fn from(r: Rheology) -> Self {
        let mut kinds = vec![RheologyKind::Elastic];
        if r.maxwell {
            kinds.push(RheologyKind::Maxwell);
        }
        if r.plastic {
            kinds.push(RheologyKind::Plastic);
        }
        kinds
    }
}

/// Power-law, temperature-dependent viscosity
///
/// η = η_ref · (ε̇ / ε̇_ref)^(1/n − 1) · exp(H/R · (1/T − 1/T_ref)),
/// clamped to `[vis_min, vis_max]`. Temperatures are in °C.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ViscosityLaw {
    #[serde(default = "default_refvisc")]
    pub reference_viscosity: f64,
    #[serde(default = "default_refsrate")]
    pub reference_strain_rate: f64,
    #[serde(default = "default_srexponent")]
    pub stress_exponent: f64,
    /// Activation enthalpy (J/mol)
    #[serde(default)]
    pub activation_energy: f64,
    #[serde(default = "default_vis_min")]
    pub vis_min: f64,
    #[serde(default = "default_vis_max")]
    pub vis_max: f64,
}

fn default_refvisc() -> f64 { 1e19 }
fn default_refsrate() -> f64 { 1e-15 }
fn default_srexponent() -> f64 { 1.0 }
fn default_vis_min() -> f64 { 1e18 }
fn default_vis_max() -> f64 { 3e27 }

impl Default for ViscosityLaw {
    fn default() -> Self {
        Self {
            reference_viscosity: default_refvisc(),
            reference_strain_rate: default_refsrate(),
            stress_exponent: default_srexponent(),
            activation_energy: 0.0,
            vis_min: default_vis_min(),
            vis_max: default_vis_max(),
        }
    }
}

impl ViscosityLaw {
    /// Effective viscosity at a second-invariant strain rate and temperature.
    ///
    /// # Arguments
    /// * `strain_rate` - Deviatoric strain-rate invariant (1/s); zero falls
    ///   back to the reference strain rate
    /// * `temperature` - Temperature (°C)
    /// * `reference_temperature` - Temperature of the reference viscosity (°C)
    pub fn viscosity(&self, strain_rate: f64, temperature: f64, reference_temperature: f64) -> f64 {
        let rate = if strain_rate > 0.0 { strain_rate } else { self.reference_strain_rate };
        let power = (rate / self.reference_strain_rate).powf(1.0 / self.stress_exponent - 1.0);
        let arrhenius = (self.activation_energy / GAS_CONSTANT
            * (1.0 / (temperature + 273.15) - 1.0 / (reference_temperature + 273.15)))
            .exp();
        (self.reference_viscosity * power * arrhenius).clamp(self.vis_min, self.vis_max)
    }
}

/// Parameters of the yield surface at one plastic strain
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct YieldParameters {
    /// Friction angle (radians)
    pub friction: f64,
    /// Dilation angle (radians)
    pub dilation: f64,
    pub cohesion: f64,
    /// dc/dε_p of the active softening segment
    pub hardening: f64,
}

/// Mohr-Coulomb plasticity with piecewise-linear softening
///
/// `plastic_strain[i]` are the segment end points; the other vectors give the
/// parameter value at each of them. Angles are in degrees.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MohrCoulomb {
    pub plastic_strain: Vec<f64>,
    pub friction_angle: Vec<f64>,
    pub dilation_angle: Vec<f64>,
    pub cohesion: Vec<f64>,
    #[serde(default = "default_tension_cutoff")]
    pub tension_cutoff: f64,
}

fn default_tension_cutoff() -> f64 { 1e10 }

impl MohrCoulomb {
    /// Constant friction, dilation and cohesion
    pub fn constant(friction_deg: f64, dilation_deg: f64, cohesion: f64) -> Self {
        Self {
            plastic_strain: vec![0.0, 1.0],
            friction_angle: vec![friction_deg, friction_deg],
            dilation_angle: vec![dilation_deg, dilation_deg],
            cohesion: vec![cohesion, cohesion],
            tension_cutoff: default_tension_cutoff(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        let n = self.plastic_strain.len();
        if n < 2 {
            return Err(Error::config("softening needs at least two plastic strain points"));
        }
        if self.friction_angle.len() != n || self.dilation_angle.len() != n || self.cohesion.len() != n {
            return Err(Error::config("softening vectors must have equal lengths"));
        }
        if self.plastic_strain.windows(2).any(|w| w[1] <= w[0]) {
            return Err(Error::config("softening plastic strain points must increase"));
        }
        Ok(())
    }

    /// Interpolate friction, dilation and cohesion at an accumulated plastic
    /// strain.
    ///
    /// Beyond the last segment the parameters stay at the values of that
    /// segment's start, and its slope is kept as the hardening modulus.
    pub fn parameters_at(&self, plastic_strain: f64) -> YieldParameters {
        let eps = &self.plastic_strain;
        let last = eps.len() - 2;
        let mut seg = last;
        let mut beyond = true;
        // A strain on a shared end point takes the later segment
        for i in 0..=last {
            if plastic_strain >= eps[i] && plastic_strain <= eps[i + 1] {
                seg = i;
                beyond = false;
            }
        }
        if plastic_strain < eps[0] {
            seg = 0;
            beyond = false;
        }

        let span = eps[seg + 1] - eps[seg];
        let slope = |v: &[f64]| (v[seg + 1] - v[seg]) / span;
        let at = |v: &[f64]| {
            if beyond {
                v[seg]
            } else {
                v[seg] + slope(v) * (plastic_strain - eps[seg])
            }
        };

        YieldParameters {
            friction: at(&self.friction_angle).to_radians(),
            dilation: at(&self.dilation_angle).to_radians(),
            cohesion: at(&self.cohesion),
            hardening: slope(&self.cohesion),
        }
    }
}

/// Complete description of one material
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Material {
    #[serde(default = "default_lame")]
    pub lambda: f64,
    #[serde(default = "default_lame")]
    pub mu: f64,
    #[serde(default = "default_density")]
    pub density: f64,
    /// Thermal expansion coefficient (1/K)
    #[serde(default = "default_alpha")]
    pub alpha: f64,
    /// Compressibility scaling of density with mean stress (1/Pa)
    #[serde(default)]
    pub beta: f64,
    /// Reference temperature for density and viscosity (°C)
    #[serde(default = "default_reftemp")]
    pub reference_temperature: f64,
    /// Thermal conductivity k (W / m / K)
    #[serde(default = "default_conductivity")]
    pub thermal_conductivity: f64,
    /// Specific heat capacity c_p (J / kg / K)
    #[serde(default = "default_heat_capacity")]
    pub heat_capacity: f64,
    #[serde(default)]
    pub rheology: Rheology,
    #[serde(default)]
    pub viscosity: ViscosityLaw,
    #[serde(default)]
    pub plasticity: Option<MohrCoulomb>,
}

fn default_lame() -> f64 { 3e10 }
fn default_density() -> f64 { 2700.0 }
fn default_alpha() -> f64 { 3e-5 }
fn default_reftemp() -> f64 { 1400.0 }
fn default_conductivity() -> f64 { 3.3 }
fn default_heat_capacity() -> f64 { 1000.0 }

impl Default for Material {
    fn default() -> Self {
        Self {
            lambda: default_lame(),
            mu: default_lame(),
            density: default_density(),
            alpha: default_alpha(),
            beta: 0.0,
            reference_temperature: default_reftemp(),
            thermal_conductivity: default_conductivity(),
            heat_capacity: default_heat_capacity(),
            rheology: Rheology::ELASTIC,
            viscosity: ViscosityLaw::default(),
            plasticity: None,
        }
    }
}

impl Material {
    /// Elastic material with the given Lamé parameters and density
    pub fn elastic(lambda: f64, mu: f64, density: f64) -> Self {
        Self {
            lambda,
            mu,
            density,
            ..Self::default()
        }
    }

    /// P-wave modulus λ + 2μ
    pub fn p_modulus(&self) -> f64 {
        self.lambda + 2.0 * self.mu
    }

    pub fn bulk_modulus(&self) -> f64 {
        self.lambda + 2.0 * self.mu / 3.0
    }

    /// Thermal diffusivity κ = k / (ρ c_p) at the reference density
    pub fn thermal_diffusivity(&self) -> f64 {
        self.thermal_conductivity / (self.density * self.heat_capacity)
    }

    /// P-wave speed sqrt((λ + 2μ) / ρ)
    pub fn p_wave_speed(&self) -> f64 {
        (self.p_modulus() / self.density).sqrt()
    }

    /// Density after thermal expansion and pressure compaction.
    ///
    /// `mean_stress` is the element mean of tr(σ)/3.
    pub fn density_at(&self, temperature: f64, mean_stress: f64) -> f64 {
        self.density * (1.0 - self.alpha * (temperature - self.reference_temperature) + self.beta * mean_stress)
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.mu > 0.0) || !(self.p_modulus() > 0.0) {
            return Err(Error::config(format!(
                "material needs mu > 0 and lambda + 2 mu > 0 (lambda {:e}, mu {:e})",
                self.lambda, self.mu
            )));
        }
        if !(self.density > 0.0) {
            return Err(Error::config(format!("material density {} must be positive", self.density)));
        }
        if !(self.thermal_conductivity >= 0.0) || !(self.heat_capacity > 0.0) {
            return Err(Error::config(format!(
                "material needs conductivity >= 0 and heat capacity > 0 (k {:e}, c_p {:e})",
                self.thermal_conductivity, self.heat_capacity
            )));
        }
        if self.rheology.plastic {
            match &self.plasticity {
                Some(p) => p.validate()?,
                None => return Err(Error::config("plastic rheology requires [plasticity] parameters")),
            }
        }
        if self.rheology.maxwell && !(self.viscosity.stress_exponent > 0.0) {
            return Err(Error::config("viscosity stress exponent must be positive"));
        }
        Ok(())
    }
}
