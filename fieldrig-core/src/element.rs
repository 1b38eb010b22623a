//! Shape-function kernels for linear elements.
//!
//! Each kernel returns the spatial gradients of the linear shape functions
//! of one element together with its measure (area, volume or Jacobian
//! determinant). Field gradients and the hyperelastic equation are built on
//! these.
//!
//! # Submodules
//!
//! - [`gauss`] - Gauss quadrature rules for numerical integration
//! - [`tri3`] - 3-node triangle (2D)
//! - [`tet4`] - 4-node tetrahedron
//! - [`hex8`] - 8-node hexahedron

pub mod gauss;
pub mod hex8;
pub mod tet4;
pub mod tri3;

pub use gauss::{gauss_1d, gauss_hex, GaussPoint};
pub use hex8::Hex8;
pub use tet4::Tet4;
pub use tri3::Tri3;
