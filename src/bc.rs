//! Boundary Condition Module
//!
//! This module handles all boundary condition logic including:
//! - Wall identification on the structured grid
//! - Named condition functions for prescribed velocities
//! - Constant tractions distributed to wall nodes

use nalgebra::{Point3, Vector3};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

use crate::config::{TractionBcConfig, VelocityBcConfig};
use crate::error::{Error, Result};
use crate::mesh::{GridDims, Mesh};

/// Face of the box-shaped grid
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Wall {
    /// i = 0
    X0,
    /// i = nx
    X1,
    /// j = 0 (bottom)
    Y0,
    /// j = ny (top)
    Y1,
    Z0,
    Z1,
}

impl Wall {
    pub const ALL: [Wall; 6] = [Wall::X0, Wall::X1, Wall::Y0, Wall::Y1, Wall::Z0, Wall::Z1];

    fn axis(self) -> usize {
        match self {
            Wall::X0 | Wall::X1 => 0,
            Wall::Y0 | Wall::Y1 => 1,
            Wall::Z0 | Wall::Z1 => 2,
        }
    }

    fn is_upper(self) -> bool {
        matches!(self, Wall::X1 | Wall::Y1 | Wall::Z1)
    }

    /// Whether a global node lies on this wall
    pub fn contains_node(self, grid: &GridDims, node: usize) -> bool {
        let ijk = grid.node_ijk(node);
        let d = self.axis();
        if self.is_upper() {
            ijk[d] == grid.node_counts()[d] - 1
        } else {
            ijk[d] == 0
        }
    }

    /// Whether a global element has a face on this wall
    pub fn contains_element(self, grid: &GridDims, element: usize) -> bool {
        let ijk = grid.element_ijk(element);
        let d = self.axis();
        if self.is_upper() {
            ijk[d] + 1 == grid.node_counts()[d] - 1
        } else {
            ijk[d] == 0
        }
    }

    /// Element-local nodes of the hexahedron face lying on this wall, wound
    /// counter-clockwise seen from outside.
    pub fn face_nodes(self) -> [usize; 4] {
        match self {
            Wall::X0 => [0, 4, 7, 3],
            Wall::X1 => [1, 2, 6, 5],
            Wall::Y0 => [0, 1, 5, 4],
            Wall::Y1 => [3, 7, 6, 2],
            Wall::Z0 => [0, 3, 2, 1],
            Wall::Z1 => [4, 5, 6, 7],
        }
    }
}

/// Velocity component
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Axis {
    X,
    Y,
    Z,
}

impl Axis {
    pub fn index(self) -> usize {
        match self {
            Axis::X => 0,
            Axis::Y => 1,
            Axis::Z => 2,
        }
    }
}

/// A prescribed scalar field of position and time
pub trait ConditionFunction: Send + Sync {
    fn value(&self, position: &Point3<f64>, time: f64) -> f64;
}

/// Same value everywhere, always
#[derive(Debug, Clone, Copy)]
pub struct Constant(pub f64);

impl ConditionFunction for Constant {
    fn value(&self, _position: &Point3<f64>, _time: f64) -> f64 {
        self.0
    }
}

/// Ramps linearly from zero to `value` over `ramp_time`, then holds
#[derive(Debug, Clone, Copy)]
pub struct LinearRamp {
    pub value: f64,
    pub ramp_time: f64,
}

impl ConditionFunction for LinearRamp {
    fn value(&self, _position: &Point3<f64>, time: f64) -> f64 {
        if self.ramp_time <= 0.0 || time >= self.ramp_time {
            self.value
        } else {
            self.value * time / self.ramp_time
        }
    }
}

/// Parameters handed to a condition function factory
#[derive(Debug, Clone, Copy)]
pub struct ConditionParams {
    pub value: f64,
    pub ramp_time: f64,
}

type ConditionFactory = Box<dyn Fn(ConditionParams) -> Arc<dyn ConditionFunction> + Send + Sync>;

/// Condition functions by name
pub struct ConditionRegistry {
    factories: HashMap<String, ConditionFactory>,
}

impl ConditionRegistry {
    /// Registry holding the built-in `constant` and `linear_ramp` functions
    pub fn new() -> Self {
        let mut registry = Self {
            factories: HashMap::new(),
        };
        registry.register("constant", |p| Arc::new(Constant(p.value)));
        registry.register("linear_ramp", |p| {
            Arc::new(LinearRamp {
                value: p.value,
                ramp_time: p.ramp_time,
            })
        });
        registry
    }

    /// Add or replace a named condition function.
    pub fn register<F>(&mut self, name: &str, factory: F)
    where
        F: Fn(ConditionParams) -> Arc<dyn ConditionFunction> + Send + Sync + 'static,
    {
        self.factories.insert(name.to_string(), Box::new(factory));
    }

    pub fn create(&self, name: &str, params: ConditionParams) -> Result<Arc<dyn ConditionFunction>> {
        let factory = self.factories.get(name).ok_or_else(|| {
            let mut known: Vec<&str> = self.factories.keys().map(String::as_str).collect();
            known.sort_unstable();
            Error::config(format!("unknown condition function '{}' (known: {})", name, known.join(", ")))
        })?;
        Ok(factory(params))
    }
}

impl Default for ConditionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ConditionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<&String> = self.factories.keys().collect();
        names.sort();
        f.debug_struct("ConditionRegistry").field("functions", &names).finish()
    }
}

struct VelocityCondition {
    wall: Wall,
    component: usize,
    function: Arc<dyn ConditionFunction>,
}

/// Resolved velocity and traction boundary conditions
pub struct BoundaryConditions {
    velocity: Vec<VelocityCondition>,
    traction: Vec<(Wall, Vector3<f64>)>,
}

impl std::fmt::Debug for BoundaryConditions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoundaryConditions")
            .field("velocity", &self.velocity.iter().map(|v| (v.wall, v.component)).collect::<Vec<_>>())
            .field("traction", &self.traction)
            .finish()
    }
}

impl BoundaryConditions {
    /// Resolve configured conditions against the function registry.
    ///
    /// # Errors
    /// `Config` for an unknown condition function name.
    pub fn new(
        velocity: &[VelocityBcConfig],
        traction: &[TractionBcConfig],
        registry: &ConditionRegistry,
    ) -> Result<Self> {
        let velocity = velocity
            .iter()
            .map(|bc| {
                Ok(VelocityCondition {
                    wall: bc.wall,
                    component: bc.component.index(),
                    function: registry.create(
                        &bc.function,
                        ConditionParams {
                            value: bc.value,
                            ramp_time: bc.ramp_time,
                        },
                    )?,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        let traction = traction.iter().map(|t| (t.wall, Vector3::from(t.traction))).collect();
        Ok(Self { velocity, traction })
    }

    pub fn none() -> Self {
        Self {
            velocity: Vec::new(),
            traction: Vec::new(),
        }
    }

    /// Prescribed velocity components of a node; `None` means unconstrained.
    ///
    /// When several walls constrain the same component (edges and corners),
    /// the condition listed last wins.
    pub fn velocity(&self, grid: &GridDims, node_global: usize, position: &Point3<f64>, time: f64) -> [Option<f64>; 3] {
        let mut out = [None; 3];
        for bc in &self.velocity {
            if bc.wall.contains_node(grid, node_global) {
                out[bc.component] = Some(bc.function.value(position, time));
            }
        }
        out
    }

    pub fn has_velocity_constraint(&self, grid: &GridDims, node_global: usize) -> bool {
        self.velocity.iter().any(|bc| bc.wall.contains_node(grid, node_global))
    }

    pub fn has_traction(&self) -> bool {
        !self.traction.is_empty()
    }

    /// External traction force on a domain node.
    ///
    /// Each wall face of an incident element contributes its quad area
    /// (two triangles) times the traction, shared equally by the face's
    /// four nodes.
    pub fn traction_force(&self, mesh: &Mesh, node: usize) -> Vector3<f64> {
        let mut force = Vector3::zeros();
        let grid = &mesh.grid;
        let global = mesh.decomposition.node_global[node];
        for &(wall, traction) in &self.traction {
            if !wall.contains_node(grid, global) {
                continue;
            }
            for &e in &mesh.topology.node_elements[node] {
                if !wall.contains_element(grid, mesh.decomposition.element_global[e]) {
                    continue;
                }
                let hex = &mesh.topology.element_nodes[e];
                let face = wall.face_nodes();
                if !face.iter().any(|&slot| hex[slot] == node) {
                    continue;
                }
                let p = face.map(|slot| mesh.coords[hex[slot]]);
                let area = 0.5 * (p[1] - p[0]).cross(&(p[2] - p[0])).norm()
                    + 0.5 * (p[2] - p[0]).cross(&(p[3] - p[0])).norm();
                force += traction * area / 4.0;
            }
        }
        force
    }
}
