//! Configuration management for tectonic simulations
//!
//! Reads TOML configuration files and provides structured data for the mesh,
//! materials, boundary and initial conditions, time stepping, remeshing and
//! restart.

use nalgebra::{Point3, Vector3};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::bc::{Axis, Wall};
use crate::error::{Error, Result};
use crate::mechanics::material::Material;
use crate::mesh::{GridDims, MeshKind};
use crate::remesh::RemeshCondition;
use crate::timestepping::DtPolicy;

/// Main simulation configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SimulationConfig {
    pub mesh: MeshConfig,
    #[serde(default = "default_materials")]
    pub materials: Vec<Material>,
    #[serde(default)]
    pub material_layers: Vec<MaterialLayer>,
    #[serde(default)]
    pub velocity_bc: Vec<VelocityBcConfig>,
    #[serde(default)]
    pub traction_bc: Vec<TractionBcConfig>,
    #[serde(default)]
    pub initial_conditions: InitialConditionsConfig,
    #[serde(default)]
    pub time_stepping: TimeSteppingConfig,
    #[serde(default)]
    pub remesh: RemeshConfig,
    #[serde(default)]
    pub restart: RestartConfig,
    /// Heat conduction plugin; off when absent
    #[serde(default)]
    pub thermal: Option<ThermalConfig>,
    /// Bottom support (Winkler foundation) plugin; off when absent
    #[serde(default)]
    pub winkler: Option<WinklerConfig>,
}

fn default_materials() -> Vec<Material> {
    vec![Material::default()]
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MeshConfig {
    pub nx: usize,
    pub ny: usize,
    pub nz: usize,
    /// Lower corner; (θ, r, φ) for a spherical mesh
    #[serde(default)]
    pub origin: [f64; 3],
    /// Extent in each grid direction
    pub size: [f64; 3],
    #[serde(default)]
    pub kind: MeshKind,
}

impl MeshConfig {
    pub fn grid(&self) -> GridDims {
        GridDims::new(self.nx, self.ny, self.nz)
    }

    pub fn origin(&self) -> Point3<f64> {
        Point3::from(self.origin)
    }

    pub fn size(&self) -> Vector3<f64> {
        Vector3::from(self.size)
    }

    /// Vertical coordinate of the undeformed top surface
    pub fn top(&self) -> f64 {
        self.origin[1] + self.size[1]
    }
}

/// Assigns a material to elements whose center lies in a depth band
/// measured down from the top surface.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MaterialLayer {
    pub depth_top: f64,
    pub depth_bottom: f64,
    pub material: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct VelocityBcConfig {
    pub wall: Wall,
    pub component: Axis,
    /// Name of a registered condition function
    #[serde(default = "default_condition")]
    pub function: String,
    pub value: f64,
    /// Ramp duration for `linear_ramp` (s)
    #[serde(default)]
    pub ramp_time: f64,
}

fn default_condition() -> String {
    "constant".to_string()
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TractionBcConfig {
    pub wall: Wall,
    /// Traction vector (Pa)
    pub traction: [f64; 3],
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct InitialConditionsConfig {
    /// Uniform initial temperature (°C)
    #[serde(default)]
    pub temperature: f64,
    /// Start from σ_ii = -ρ g depth
    #[serde(default)]
    pub lithostatic_stress: bool,
    /// Uniform initial velocity (m/s)
    #[serde(default)]
    pub velocity: [f64; 3],
}

impl Default for InitialConditionsConfig {
    fn default() -> Self {
        Self {
            temperature: 0.0,
            lithostatic_stress: false,
            velocity: [0.0; 3],
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TimeSteppingConfig {
    #[serde(default)]
    pub policy: DtPolicy,
    /// Fixed timestep for the constant policy (s)
    #[serde(default)]
    pub dt: Option<f64>,
    /// Inertial scaling of the dynamic policy
    #[serde(default = "default_strain_inert")]
    pub strain_inert: f64,
    /// Force damping coefficient
    #[serde(default = "default_demf")]
    pub demf: f64,
    #[serde(default = "default_gravity")]
    pub gravity: f64,
    #[serde(default = "default_max_steps")]
    pub max_steps: u64,
}

fn default_strain_inert() -> f64 { 1e-5 }
fn default_demf() -> f64 { 0.8 }
fn default_gravity() -> f64 { 9.81 }
fn default_max_steps() -> u64 { 100 }

impl Default for TimeSteppingConfig {
    fn default() -> Self {
        Self {
            policy: DtPolicy::default(),
            dt: None,
            strain_inert: default_strain_inert(),
            demf: default_demf(),
            gravity: default_gravity(),
            max_steps: default_max_steps(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RemeshConfig {
    #[serde(default)]
    pub condition: RemeshCondition,
    /// Restore the bottom surface to its initial height instead of following it
    #[serde(default = "default_true")]
    pub bottom_restore: bool,
    /// Initial barycentric tolerance for point location
    #[serde(default = "default_tolerance")]
    pub tolerance: f64,
    /// Number of tenfold tolerance relaxations before giving up
    #[serde(default = "default_relaxations")]
    pub max_relaxations: u32,
}

fn default_true() -> bool { true }
fn default_tolerance() -> f64 { 1e-8 }
fn default_relaxations() -> u32 { 8 }

impl Default for RemeshConfig {
    fn default() -> Self {
        Self {
            condition: RemeshCondition::default(),
            bottom_restore: true,
            tolerance: default_tolerance(),
            max_relaxations: default_relaxations(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RestartConfig {
    /// Timestep of the checkpoint to restart from
    #[serde(default)]
    pub restart_from: Option<u64>,
    /// Write a checkpoint every this many steps (0 disables)
    #[serde(default)]
    pub checkpoint_interval: u64,
    #[serde(default = "default_directory")]
    pub directory: PathBuf,
}

fn default_directory() -> PathBuf {
    PathBuf::from(".")
}

impl Default for RestartConfig {
    fn default() -> Self {
        Self {
            restart_from: None,
            checkpoint_interval: 0,
            directory: default_directory(),
        }
    }
}

/// Starting temperature field of the heat conduction plugin
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ThermalProfile {
    /// `initial_conditions.temperature` everywhere
    #[default]
    Uniform,
    /// Linear in the vertical grid index from the bottom to the top value
    Linear,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ThermalConfig {
    /// Fixed temperature of the top surface (°C); insulated when absent
    #[serde(default)]
    pub top_temperature: Option<f64>,
    /// Fixed temperature of the bottom surface (°C); insulated when absent
    #[serde(default)]
    pub bottom_temperature: Option<f64>,
    #[serde(default)]
    pub initial_profile: ThermalProfile,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WinklerConfig {
    /// Density of the substratum the bottom floats on (kg/m³)
    #[serde(default = "default_substratum_density")]
    pub substratum_density: f64,
    /// Support pressure at the reference bottom height (Pa)
    #[serde(default)]
    pub isostatic_pressure: f64,
}

fn default_substratum_density() -> f64 { 3300.0 }

impl Default for WinklerConfig {
    fn default() -> Self {
        Self {
            substratum_density: default_substratum_density(),
            isostatic_pressure: 0.0,
        }
    }
}

impl SimulationConfig {
    /// Load configuration from TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path.as_ref()).map_err(|e| Error::io(path.as_ref(), e))?;
        contents.parse()
    }

    /// Check cross-field consistency that serde cannot express.
    pub fn validate(&self) -> Result<()> {
        let m = &self.mesh;
        if m.nx == 0 || m.ny == 0 || m.nz == 0 {
            return Err(Error::config(format!("mesh needs at least one element per direction, got {}×{}×{}", m.nx, m.ny, m.nz)));
        }
        if m.size.iter().any(|&s| !(s > 0.0)) {
            return Err(Error::config(format!("mesh size {:?} must be positive", m.size)));
        }
        if self.materials.is_empty() {
            return Err(Error::config("at least one material is required"));
        }
        for (i, mat) in self.materials.iter().enumerate() {
            mat.validate().map_err(|e| Error::config(format!("material {}: {}", i, e)))?;
        }
        for layer in &self.material_layers {
            if layer.material >= self.materials.len() {
                return Err(Error::config(format!(
                    "material layer refers to material {} but only {} are defined",
                    layer.material,
                    self.materials.len()
                )));
            }
        }
        let ts = &self.time_stepping;
        if ts.policy == DtPolicy::Constant {
            match ts.dt {
                Some(dt) if dt > 0.0 && dt.is_finite() => {}
                other => return Err(Error::config(format!("constant timestep policy needs dt > 0, got {:?}", other))),
            }
        }
        if !(ts.strain_inert > 0.0) {
            return Err(Error::config("strain_inert must be positive"));
        }
        if let Some(thermal) = &self.thermal {
            let both = thermal.top_temperature.is_some() && thermal.bottom_temperature.is_some();
            if thermal.initial_profile == ThermalProfile::Linear && !both {
                return Err(Error::config("a linear initial temperature profile needs top and bottom temperatures"));
            }
        }
        if let Some(winkler) = &self.winkler {
            if m.kind != MeshKind::Cartesian {
                return Err(Error::config("the winkler bottom support needs a cartesian mesh"));
            }
            if !(winkler.substratum_density > 0.0) {
                return Err(Error::config("winkler substratum density must be positive"));
            }
        }
        Ok(())
    }

    /// Material index for an element center at the given depth below the top.
    pub fn material_at_depth(&self, depth: f64) -> usize {
        self.material_layers
            .iter()
            .find(|l| depth >= l.depth_top && depth <= l.depth_bottom)
            .map(|l| l.material)
            .unwrap_or(0)
    }

    /// Minimal configuration for a unit-spaced cartesian box
    pub fn unit_box(nx: usize, ny: usize, nz: usize) -> Self {
        Self {
            mesh: MeshConfig {
                nx,
                ny,
                nz,
                origin: [0.0; 3],
                size: [nx as f64, ny as f64, nz as f64],
                kind: MeshKind::Cartesian,
            },
            materials: default_materials(),
            material_layers: Vec::new(),
            velocity_bc: Vec::new(),
            traction_bc: Vec::new(),
            initial_conditions: InitialConditionsConfig::default(),
            time_stepping: TimeSteppingConfig::default(),
            remesh: RemeshConfig::default(),
            restart: RestartConfig::default(),
            thermal: None,
            winkler: None,
        }
    }

    /// One-paragraph summary for the run log
    pub fn summary(&self) -> String {
        let m = &self.mesh;
        format!(
            "mesh {}×{}×{} {:?} ({} elements), {} material(s), {} velocity BC(s), {} traction BC(s), dt policy {:?}, remesh {:?}, thermal {}, winkler {}",
            m.nx,
            m.ny,
            m.nz,
            m.kind,
            m.nx * m.ny * m.nz,
            self.materials.len(),
            self.velocity_bc.len(),
            self.traction_bc.len(),
            self.time_stepping.policy,
            self.remesh.condition,
            if self.thermal.is_some() { "on" } else { "off" },
            if self.winkler.is_some() { "on" } else { "off" }
        )
    }
}

impl std::str::FromStr for SimulationConfig {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let config: SimulationConfig =
            toml::from_str(s).map_err(|e| Error::config(format!("failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }
}
