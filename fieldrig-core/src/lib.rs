//! fieldrig core - finite element fields and rigid/elastic dynamics
//!
//! Simulation kernel with:
//! - A field data model over node arrays and element arrays (corner,
//!   bubble and partial fields, saved and expression-driven values)
//! - Segmented block-sparse linear systems fed by independent physics modules
//! - ILU(k)-preconditioned BiCGSTAB and a sparse LU fallback
//! - Newmark-beta time stepping of hyperelastic solids, rigid bodies,
//!   joints and contact
//!
//! # Architecture
//!
//! - [`FieldWorld`]: owner of every node array, element array and field
//! - [`LinearSystem`]: one segment per field, rigid bodies and constraint;
//!   physics modules merge into it between `initialize_marge` and
//!   `finalize_marge`
//! - [`equation`]: elastic, connection and contact contributions
//! - [`rigid`]: rigid bodies and their constraints
//! - [`Simulation`]: the Newton loop tying all of the above together

pub mod config;
pub mod elem_array;
pub mod element;
pub mod equation;
pub mod error;
pub mod export;
pub mod expr;
pub mod field;
pub mod linear_system;
pub mod material;
pub mod mesh;
pub mod newmark;
pub mod node_array;
pub mod precond;
pub mod rigid;
pub mod simulation;
pub mod solver;
pub mod sparse;
pub mod types;
pub mod world;

pub use config::{NewtonConfig, SimulationConfig};
pub use equation::{PlaneContact, RigidElasticConnection, StVenantKirchhoff3D};
pub use error::{Error, Result};
pub use export::{export_inp, write_inp, InpData};
pub use field::{Field, InterpolationType};
pub use linear_system::LinearSystem;
pub use material::Material;
pub use mesh::{ElementType, Mesh};
pub use newmark::Newmark;
pub use precond::IluPreconditioner;
pub use rigid::{Constraint, ConstraintKind, RigidBody};
pub use simulation::{Simulation, StepReport};
pub use solver::{solve_pbicgstab, FaerLuSolver, Solver};
pub use types::{Derivatives, EaId, ElSegRole, FieldId, FieldType, NaId, Point3, Vec3};
pub use world::FieldWorld;
