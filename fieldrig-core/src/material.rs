//! Hyperelastic material parameters.
//!
//! The St. Venant–Kirchhoff model is fully described by the two Lamé
//! parameters and a mass density.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// Isotropic St. Venant–Kirchhoff material.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Material {
    /// Lamé's first parameter λ.
    pub lame_lambda: f64,
    /// Lamé's second parameter μ (shear modulus).
    pub lame_mu: f64,
    /// Mass density.
    pub density: f64,
}

impl Default for Material {
    /// Soft rubber-like solid of the rigid/elastic demo.
    fn default() -> Self {
        Self {
            lame_lambda: 0.0,
            lame_mu: 70.0,
            density: 0.1,
        }
    }
}

impl Material {
    /// Create a material from Lamé parameters.
    ///
    /// # Errors
    ///
    /// Returns error if the parameters are physically invalid.
    pub fn new(lame_lambda: f64, lame_mu: f64, density: f64) -> Result<Self> {
        let mat = Self {
            lame_lambda,
            lame_mu,
            density,
        };
        mat.validate()?;
        Ok(mat)
    }

    /// Create a material from Young's modulus and Poisson's ratio.
    ///
    /// # Arguments
    ///
    /// * `youngs_modulus` - Young's modulus E
    /// * `poissons_ratio` - Poisson's ratio ν (-1 < ν < 0.5)
    /// * `density` - mass density ρ
    pub fn from_young_poisson(youngs_modulus: f64, poissons_ratio: f64, density: f64) -> Result<Self> {
        if youngs_modulus <= 0.0 {
            return Err(Error::Config("Young's modulus must be positive".into()));
        }
        if poissons_ratio <= -1.0 || poissons_ratio >= 0.5 {
            return Err(Error::Config("Poisson's ratio must be in range (-1, 0.5)".into()));
        }
        let e = youngs_modulus;
        let nu = poissons_ratio;
        Self::new(
            e * nu / ((1.0 + nu) * (1.0 - 2.0 * nu)),
            e / (2.0 * (1.0 + nu)),
            density,
        )
    }

    pub fn validate(&self) -> Result<()> {
        if self.lame_mu <= 0.0 {
            return Err(Error::Config("shear modulus must be positive".into()));
        }
        // bulk modulus K = λ + 2μ/3
        if self.lame_lambda + 2.0 * self.lame_mu / 3.0 <= 0.0 {
            return Err(Error::Config("bulk modulus must be positive".into()));
        }
        if self.density <= 0.0 {
            return Err(Error::Config("density must be positive".into()));
        }
        Ok(())
    }

    /// Young's modulus E = μ(3λ + 2μ) / (λ + μ).
    pub fn youngs_modulus(&self) -> f64 {
        let (l, m) = (self.lame_lambda, self.lame_mu);
        m * (3.0 * l + 2.0 * m) / (l + m)
    }

    /// Poisson's ratio ν = λ / (2(λ + μ)).
    pub fn poissons_ratio(&self) -> f64 {
        self.lame_lambda / (2.0 * (self.lame_lambda + self.lame_mu))
    }
}
