//! 8-node hexahedron (Hex8) kernels.
//!
//! # Shape Functions
//!
//! Trilinear shape functions in natural coordinates (ξ, η, ζ) ∈ [-1, 1]³:
//! ```text
//! N_i = (1 + ξ_i*ξ)(1 + η_i*η)(1 + ζ_i*ζ) / 8
//! ```
//! where (ξ_i, η_i, ζ_i) are ±1 for node i.
//!
//! # Node Numbering
//!
//! ```text
//!        7-------6
//!       /|      /|
//!      / |     / |
//!     4-------5  |
//!     |  3----|--2
//!     | /     | /
//!     |/      |/
//!     0-------1
//! ```

use crate::error::{Error, Result};
use crate::types::Point3;
use nalgebra::{Matrix3, Vector3};

/// Natural coordinates for each of the 8 nodes.
/// Node i has natural coordinates (XI[i], ETA[i], ZETA[i]).
const XI: [f64; 8] = [-1.0, 1.0, 1.0, -1.0, -1.0, 1.0, 1.0, -1.0];
const ETA: [f64; 8] = [-1.0, -1.0, 1.0, 1.0, -1.0, -1.0, 1.0, 1.0];
const ZETA: [f64; 8] = [-1.0, -1.0, -1.0, -1.0, 1.0, 1.0, 1.0, 1.0];

/// 8-node hexahedral element (trilinear brick).
#[derive(Debug, Clone, Copy, Default)]
pub struct Hex8;

impl Hex8 {
    /// Shape functions at a point in natural coordinates.
    pub fn shape_functions(xi: f64, eta: f64, zeta: f64) -> [f64; 8] {
        std::array::from_fn(|i| 0.125 * (1.0 + XI[i] * xi) * (1.0 + ETA[i] * eta) * (1.0 + ZETA[i] * zeta))
    }

    /// Shape function derivatives with respect to natural coordinates.
    ///
    /// Entry i is (dN_i/dξ, dN_i/dη, dN_i/dζ).
    fn shape_derivatives(xi: f64, eta: f64, zeta: f64) -> [Vector3<f64>; 8] {
        std::array::from_fn(|i| {
            let (a, b, c) = (1.0 + XI[i] * xi, 1.0 + ETA[i] * eta, 1.0 + ZETA[i] * zeta);
            Vector3::new(0.125 * XI[i] * b * c, 0.125 * a * ETA[i] * c, 0.125 * a * b * ZETA[i])
        })
    }

    /// Jacobian matrix at a point in natural coordinates.
    ///
    /// J = [∂x/∂ξ  ∂y/∂ξ  ∂z/∂ξ]
    ///     [∂x/∂η  ∂y/∂η  ∂z/∂η]
    ///     [∂x/∂ζ  ∂y/∂ζ  ∂z/∂ζ]
    fn jacobian(coords: &[Point3; 8], dn_dnat: &[Vector3<f64>; 8]) -> Matrix3<f64> {
        let mut j = Matrix3::zeros();
        for i in 0..8 {
            j += dn_dnat[i] * coords[i].transpose();
        }
        j
    }

    /// Physical gradients of the eight shape functions and det J at (ξ, η, ζ).
    pub fn shape_gradients(
        coords: &[Point3; 8],
        xi: f64,
        eta: f64,
        zeta: f64,
    ) -> Result<([Vector3<f64>; 8], f64)> {
        let dn_dnat = Self::shape_derivatives(xi, eta, zeta);
        let j = Self::jacobian(coords, &dn_dnat);

        let det_j = j.determinant();
        if det_j <= 0.0 {
            return Err(Error::Invariant(format!(
                "Non-positive Jacobian determinant ({det_j}) indicates inverted hexahedron"
            )));
        }
        let j_inv = j
            .try_inverse()
            .ok_or_else(|| Error::Invariant("hexahedron Jacobian is singular".into()))?;

        // [dN/dx, dN/dy, dN/dz]^T = J^(-1) * [dN/dξ, dN/dη, dN/dζ]^T
        Ok((dn_dnat.map(|d| j_inv * d), det_j))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn box_coords(a: f64, b: f64, c: f64) -> [Point3; 8] {
        std::array::from_fn(|i| Vector3::new(0.5 * a * (1.0 + XI[i]), 0.5 * b * (1.0 + ETA[i]), 0.5 * c * (1.0 + ZETA[i])))
    }

    #[test]
    fn test_partition_of_unity() {
        let n = Hex8::shape_functions(0.3, -0.2, 0.7);
        assert_relative_eq!(n.iter().sum::<f64>(), 1.0, epsilon = 1e-14);
        let n0 = Hex8::shape_functions(-1.0, -1.0, -1.0);
        assert_relative_eq!(n0[0], 1.0);
        assert_relative_eq!(n0[6], 0.0);
    }

    #[test]
    fn test_box_jacobian() {
        let coords = box_coords(2.0, 1.0, 0.5);
        let (_, det_j) = Hex8::shape_gradients(&coords, 0.0, 0.0, 0.0).unwrap();
        // Volume = 8 * det J for a parallelepiped
        assert_relative_eq!(8.0 * det_j, 1.0, epsilon = 1e-14);
    }

    #[test]
    fn test_reproduces_linear_field() {
        let mut coords = box_coords(1.0, 1.0, 1.0);
        coords[6] += Vector3::new(0.1, 0.05, -0.1);
        let grad = Vector3::new(1.0, -0.5, 2.0);
        for &(xi, eta, zeta) in &[(0.0, 0.0, 0.0), (0.5, -0.5, 0.2)] {
            let (g, _) = Hex8::shape_gradients(&coords, xi, eta, zeta).unwrap();
            let mut sum = Vector3::zeros();
            for i in 0..8 {
                sum += g[i] * grad.dot(&coords[i]);
            }
            assert_relative_eq!(sum, grad, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_inverted_element() {
        let mut coords = box_coords(1.0, 1.0, 1.0);
        coords.swap(0, 4);
        coords.swap(1, 5);
        coords.swap(2, 6);
        coords.swap(3, 7);
        assert!(Hex8::shape_gradients(&coords, 0.0, 0.0, 0.0).is_err());
    }
}
