//! Gauss quadrature rules for numerical integration.
//!
//! Only the tensor-product rules used by the hexahedral kernels live here;
//! linear triangles and tetrahedra are integrated exactly at the centroid.

use crate::error::{Error, Result};

/// A Gauss quadrature point with natural coordinates and weight.
#[derive(Debug, Clone, Copy)]
pub struct GaussPoint {
    /// Natural coordinates [ξ, η, ζ] in [-1, 1]³.
    pub coords: [f64; 3],
    /// Integration weight.
    pub weight: f64,
}

impl GaussPoint {
    /// Get ξ (first natural coordinate).
    #[inline]
    pub fn xi(&self) -> f64 {
        self.coords[0]
    }

    /// Get η (second natural coordinate).
    #[inline]
    pub fn eta(&self) -> f64 {
        self.coords[1]
    }

    /// Get ζ (third natural coordinate).
    #[inline]
    pub fn zeta(&self) -> f64 {
        self.coords[2]
    }
}

/// 1D Gauss-Legendre points and weights on [-1, 1].
///
/// # Arguments
///
/// * `n` - Number of integration points (1, 2 or 3)
pub fn gauss_1d(n: usize) -> Result<Vec<(f64, f64)>> {
    match n {
        1 => Ok(vec![(0.0, 2.0)]),
        2 => {
            let p = 1.0 / 3.0_f64.sqrt();
            Ok(vec![(-p, 1.0), (p, 1.0)])
        }
        3 => {
            let p = (3.0 / 5.0_f64).sqrt();
            Ok(vec![(-p, 5.0 / 9.0), (0.0, 8.0 / 9.0), (p, 5.0 / 9.0)])
        }
        _ => Err(Error::Unsupported(format!(
            "Gauss rule with {n} points per direction"
        ))),
    }
}

/// Hexahedral rule with `n` points per direction (n³ points total).
pub fn gauss_hex(n: usize) -> Result<Vec<GaussPoint>> {
    let rule_1d = gauss_1d(n)?;
    let mut points = Vec::with_capacity(n * n * n);

    for &(xi, w_xi) in &rule_1d {
        for &(eta, w_eta) in &rule_1d {
            for &(zeta, w_zeta) in &rule_1d {
                points.push(GaussPoint {
                    coords: [xi, eta, zeta],
                    weight: w_xi * w_eta * w_zeta,
                });
            }
        }
    }

    Ok(points)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_gauss_1d_integrates_cubic() {
        // ∫_{-1}^{1} (x³ + x² + 1) dx = 2/3 + 2
        let rule = gauss_1d(2).unwrap();
        let sum: f64 = rule.iter().map(|&(x, w)| w * (x * x * x + x * x + 1.0)).sum();
        assert_relative_eq!(sum, 2.0 / 3.0 + 2.0, epsilon = 1e-14);
    }

    #[test]
    fn test_gauss_hex_weights_sum() {
        for n in 1..=3 {
            let pts = gauss_hex(n).unwrap();
            assert_eq!(pts.len(), n * n * n);
            let total: f64 = pts.iter().map(|p| p.weight).sum();
            assert_relative_eq!(total, 8.0, epsilon = 1e-13);
        }
    }

    #[test]
    fn test_gauss_invalid_n() {
        assert!(gauss_1d(0).is_err());
        assert!(gauss_hex(4).is_err());
    }
}
