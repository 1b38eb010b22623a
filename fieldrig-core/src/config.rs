//! Simulation settings.
//!
//! Every struct deserializes with defaults for missing keys, so a partial
//! JSON document only needs the values it changes:
//!
//! ```json
//! { "dt": 0.01, "newton": { "max_iter": 20 } }
//! ```

use crate::error::{Error, Result};
use crate::newmark::Newmark;
use crate::precond::PreconditionerConfig;
use crate::solver::SolverConfig;
use crate::types::Vec3;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Newton iteration limits of one time step.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NewtonConfig {
    pub max_iter: usize,
    /// Residual norm treated as converged outright.
    pub abs_tol: f64,
    /// Converged once the residual fell by this factor from the first iteration.
    pub rel_drop: f64,
}

impl Default for NewtonConfig {
    fn default() -> Self {
        Self {
            max_iter: 10,
            abs_tol: 1e-30,
            rel_drop: 1e-8,
        }
    }
}

/// Settings of a [`Simulation`](crate::simulation::Simulation).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    pub dt: f64,
    /// Newmark γ; β is derived as ¼(½ + γ)².
    pub gamma: f64,
    pub gravity: [f64; 3],
    pub newton: NewtonConfig,
    pub solver: SolverConfig,
    pub preconditioner: PreconditionerConfig,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            dt: 0.03,
            gamma: 0.6,
            gravity: [0.0, 0.0, -9.8],
            newton: NewtonConfig::default(),
            solver: SolverConfig::default(),
            preconditioner: PreconditionerConfig::default(),
        }
    }
}

impl SimulationConfig {
    pub fn from_json_str(s: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(s).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.dt > 0.0) {
            return Err(Error::Config(format!("time step must be positive, got {}", self.dt)));
        }
        if !(self.gamma >= 0.5) {
            return Err(Error::Config(format!("Newmark gamma must be at least 0.5, got {}", self.gamma)));
        }
        if self.newton.max_iter == 0 || self.solver.max_iter == 0 {
            return Err(Error::Config("iteration caps must be at least 1".into()));
        }
        if !(self.newton.abs_tol > 0.0 && self.newton.rel_drop > 0.0 && self.solver.conv_ratio > 0.0) {
            return Err(Error::Config("tolerances must be positive".into()));
        }
        Ok(())
    }

    pub fn newmark(&self) -> Newmark {
        Newmark::new(self.dt, self.gamma)
    }

    pub fn gravity(&self) -> Vec3 {
        Vec3::from(self.gravity)
    }
}
