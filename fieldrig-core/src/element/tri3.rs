//! 3-node triangle (Tri3) kernels in the plane.
//!
//! Linear shape functions are the area coordinates L_i. Their gradients
//! are constant over the element:
//!
//! ```text
//! ∇L_0 = (y1 - y2, x2 - x1) / (2A)
//! ∇L_1 = (y2 - y0, x0 - x2) / (2A)
//! ∇L_2 = (y0 - y1, x1 - x0) / (2A)
//! ```

use crate::error::{Error, Result};

/// Signed area of the triangle (p0, p1, p2); positive when counterclockwise.
pub fn tri_area(p0: &[f64], p1: &[f64], p2: &[f64]) -> f64 {
    0.5 * ((p1[0] - p0[0]) * (p2[1] - p0[1]) - (p2[0] - p0[0]) * (p1[1] - p0[1]))
}

/// 3-node triangular element.
#[derive(Debug, Clone, Copy, Default)]
pub struct Tri3;

impl Tri3 {
    /// Gradients of the area coordinates and the signed area.
    pub fn shape_gradients(coords: &[[f64; 2]; 3]) -> Result<([[f64; 2]; 3], f64)> {
        let [p0, p1, p2] = coords;
        let area = tri_area(p0, p1, p2);
        if area.abs() < f64::EPSILON * 1e-3 {
            return Err(Error::Invariant("degenerate triangle: zero area".into()));
        }
        let tmp = 0.5 / area;
        let dldx = [
            [tmp * (p1[1] - p2[1]), tmp * (p2[0] - p1[0])],
            [tmp * (p2[1] - p0[1]), tmp * (p0[0] - p2[0])],
            [tmp * (p0[1] - p1[1]), tmp * (p1[0] - p0[0])],
        ];
        Ok((dldx, area))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_area_sign() {
        let (a, b, c) = ([0.0, 0.0], [1.0, 0.0], [0.0, 1.0]);
        assert_relative_eq!(tri_area(&a, &b, &c), 0.5);
        assert_relative_eq!(tri_area(&a, &c, &b), -0.5);
    }

    #[test]
    fn test_gradients_reproduce_linear_field() {
        // f = 2x - 3y + 1 has gradient (2, -3)
        let coords = [[0.2, 0.1], [1.5, 0.3], [0.4, 1.2]];
        let (dldx, _) = Tri3::shape_gradients(&coords).unwrap();
        let f: Vec<f64> = coords.iter().map(|p| 2.0 * p[0] - 3.0 * p[1] + 1.0).collect();
        for d in 0..2 {
            let g: f64 = (0..3).map(|i| f[i] * dldx[i][d]).sum();
            assert_relative_eq!(g, if d == 0 { 2.0 } else { -3.0 }, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_gradients_sum_to_zero() {
        let coords = [[0.0, 0.0], [2.0, 0.0], [0.0, 1.0]];
        let (dldx, area) = Tri3::shape_gradients(&coords).unwrap();
        assert_relative_eq!(area, 1.0);
        for d in 0..2 {
            assert_relative_eq!(dldx[0][d] + dldx[1][d] + dldx[2][d], 0.0, epsilon = 1e-14);
        }
    }

    #[test]
    fn test_degenerate() {
        let coords = [[0.0, 0.0], [1.0, 1.0], [2.0, 2.0]];
        assert!(Tri3::shape_gradients(&coords).is_err());
    }
}
