//! 4-node tetrahedron (Tet4) kernels.
//!
//! Linear shape functions in terms of barycentric coordinates (L1, L2, L3, L4):
//! N_i = L_i with sum(L_i) = 1, so the gradients are constant in the element.
//!
//! # Shape Function Gradients
//!
//! With the parametric map x = x1 + J ξ, where
//!
//! ```text
//! J = [x2-x1  x3-x1  x4-x1]
//!     [y2-y1  y3-y1  y4-y1]
//!     [z2-z1  z3-z1  z4-z1]
//! ```
//!
//! the physical gradients are ∇N = J⁻ᵀ ∂N/∂ξ.

use crate::error::{Error, Result};
use crate::types::Point3;
use nalgebra::{Matrix3, Vector3};

/// 4-node tetrahedral element.
#[derive(Debug, Clone, Copy, Default)]
pub struct Tet4;

impl Tet4 {
    /// Signed volume; positive when (p1-p0, p2-p0, p3-p0) is right-handed.
    pub fn volume(coords: &[Point3; 4]) -> f64 {
        let v21 = coords[1] - coords[0];
        let v31 = coords[2] - coords[0];
        let v41 = coords[3] - coords[0];
        v21.dot(&v31.cross(&v41)) / 6.0
    }

    /// Gradients of the four shape functions and the signed volume.
    pub fn shape_gradients(coords: &[Point3; 4]) -> Result<([Vector3<f64>; 4], f64)> {
        let [p1, p2, p3, p4] = coords;

        let j = Matrix3::from_columns(&[p2 - p1, p3 - p1, p4 - p1]);
        let j_inv_t = j
            .try_inverse()
            .ok_or_else(|| Error::Invariant("degenerate tetrahedron: Jacobian is singular".into()))?
            .transpose();

        // dN/dξ for the reference vertices (0,0,0), (1,0,0), (0,1,0), (0,0,1)
        let dn_dxi = [
            Vector3::new(-1.0, -1.0, -1.0),
            Vector3::new(1.0, 0.0, 0.0),
            Vector3::new(0.0, 1.0, 0.0),
            Vector3::new(0.0, 0.0, 1.0),
        ];

        let grads = dn_dxi.map(|d| j_inv_t * d);
        Ok((grads, Self::volume(coords)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn unit_tet() -> [Point3; 4] {
        [
            Vector3::new(0.0, 0.0, 0.0),
            Vector3::new(1.0, 0.0, 0.0),
            Vector3::new(0.0, 1.0, 0.0),
            Vector3::new(0.0, 0.0, 1.0),
        ]
    }

    #[test]
    fn test_tet4_volume() {
        assert_relative_eq!(Tet4::volume(&unit_tet()), 1.0 / 6.0, epsilon = 1e-15);
    }

    #[test]
    fn test_tet4_gradients_unit() {
        let (g, vol) = Tet4::shape_gradients(&unit_tet()).unwrap();
        assert_relative_eq!(vol, 1.0 / 6.0, epsilon = 1e-15);
        assert_relative_eq!(g[0], Vector3::new(-1.0, -1.0, -1.0), epsilon = 1e-14);
        assert_relative_eq!(g[1], Vector3::new(1.0, 0.0, 0.0), epsilon = 1e-14);
        assert_relative_eq!(g[3], Vector3::new(0.0, 0.0, 1.0), epsilon = 1e-14);
    }

    #[test]
    fn test_tet4_reproduces_linear_field() {
        let coords = [
            Vector3::new(0.1, 0.0, 0.2),
            Vector3::new(1.3, 0.2, 0.0),
            Vector3::new(0.2, 0.9, 0.1),
            Vector3::new(0.3, 0.1, 1.4),
        ];
        let grad = Vector3::new(0.5, -2.0, 3.0);
        let (g, _) = Tet4::shape_gradients(&coords).unwrap();
        let mut sum = Vector3::zeros();
        for i in 0..4 {
            sum += g[i] * grad.dot(&coords[i]);
        }
        assert_relative_eq!(sum, grad, epsilon = 1e-12);
    }

    #[test]
    fn test_tet4_degenerate() {
        let mut coords = unit_tet();
        coords[3] = Vector3::new(0.5, 0.5, 0.0);
        assert!(Tet4::shape_gradients(&coords).is_err());
    }
}
