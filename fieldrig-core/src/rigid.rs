//! Rigid bodies in 3D.
//!
//! A body is tracked by the displacement of its centre of gravity (world
//! frame) and a rotation matrix from body to world frame. Angular velocity
//! and acceleration live in the body frame. Each body contributes 6
//! unknowns to the rigid segment of the linear system:
//!
//! ```text
//! [Δa_x Δa_y Δa_z | Δα_x Δα_y Δα_z]
//!  world frame      body frame
//! ```
//!
//! Positions are predicted once at the start of a step
//! ([`RigidBody::predict`]) and corrected after every solve
//! ([`RigidBody::apply_update`]); rotation updates go through the
//! exponential map.

pub mod constraint;

pub use constraint::{Constraint, ConstraintKind};

use crate::error::{Error, Result};
use crate::linear_system::LinearSystem;
use crate::newmark::Newmark;
use crate::types::{Point3, Vec3};
use nalgebra::{Matrix3, Matrix6, Rotation3, Vector6};

/// State of one rigid body.
#[derive(Debug, Clone, PartialEq)]
pub struct RigidBody {
    pub mass: f64,
    /// Inertia tensor about the centre of gravity, body frame.
    pub inertia: Matrix3<f64>,
    /// Centre of gravity in the initial configuration.
    pub ini_pos_cg: Point3,
    pub disp_cg: Vec3,
    pub velo_cg: Vec3,
    pub acc_cg: Vec3,
    /// Body-to-world rotation.
    pub rot: Matrix3<f64>,
    /// Angular velocity, body frame.
    pub omega: Vec3,
    /// Angular acceleration, body frame.
    pub d_omega: Vec3,
}

impl Default for RigidBody {
    fn default() -> Self {
        Self {
            mass: 1.0,
            inertia: Matrix3::identity(),
            ini_pos_cg: Point3::zeros(),
            disp_cg: Vec3::zeros(),
            velo_cg: Vec3::zeros(),
            acc_cg: Vec3::zeros(),
            rot: Matrix3::identity(),
            omega: Vec3::zeros(),
            d_omega: Vec3::zeros(),
        }
    }
}

impl RigidBody {
    pub fn new(mass: f64, ini_pos_cg: Point3) -> Self {
        Self {
            mass,
            ini_pos_cg,
            ..Self::default()
        }
    }

    pub fn with_inertia(mut self, inertia: Matrix3<f64>) -> Self {
        self.inertia = inertia;
        self
    }

    /// Current centre of gravity.
    pub fn pos_cg(&self) -> Point3 {
        self.ini_pos_cg + self.disp_cg
    }

    /// World position of a point given in body coordinates.
    pub fn point(&self, local: &Vec3) -> Point3 {
        self.pos_cg() + self.rot * local
    }

    /// Newmark predictor at the start of a step.
    pub fn predict(&mut self, nm: &Newmark) {
        let dt = nm.dt;
        self.disp_cg += self.velo_cg * dt + self.acc_cg * (0.5 * dt * dt);
        self.velo_cg += self.acc_cg * dt;
        let dtheta = self.omega * dt + self.d_omega * (0.5 * dt * dt);
        self.rot *= Rotation3::new(dtheta).into_inner();
        self.omega += self.d_omega * dt;
    }

    /// Newmark corrector with a solved 6-entry increment.
    pub fn apply_update(&mut self, delta: &[f64], nm: &Newmark) -> Result<()> {
        let &[ax, ay, az, rx, ry, rz] = delta else {
            return Err(Error::Invariant(format!(
                "rigid body increment has {} entries",
                delta.len()
            )));
        };
        let (da, dw) = (Vec3::new(ax, ay, az), Vec3::new(rx, ry, rz));
        self.disp_cg += da * nm.disp_factor();
        self.velo_cg += da * nm.velo_factor();
        self.acc_cg += da;
        self.rot *= Rotation3::new(dw * nm.disp_factor()).into_inner();
        self.omega += dw * nm.velo_factor();
        self.d_omega += dw;
        Ok(())
    }

    /// Residual of the equations of motion, without constraint forces.
    pub fn residual(&self, gravity: &Vec3) -> Vector6<f64> {
        let f = (gravity - self.acc_cg) * self.mass;
        let jw = self.inertia * self.omega;
        let m = -(self.inertia * self.d_omega) - self.omega.cross(&jw);
        Vector6::new(f.x, f.y, f.z, m.x, m.y, m.z)
    }

    /// Derivative of the negated residual by the increment.
    pub fn tangent(&self, nm: &Newmark) -> Matrix6<f64> {
        let mut k = Matrix6::zeros();
        k.fixed_view_mut::<3, 3>(0, 0).copy_from(&(Matrix3::identity() * self.mass));
        let jw = self.inertia * self.omega;
        let gyro = self.omega.cross_matrix() * self.inertia - jw.cross_matrix();
        k.fixed_view_mut::<3, 3>(3, 3)
            .copy_from(&(self.inertia + gyro * nm.velo_factor()));
        k
    }

    /// Merge this body's equations into the rigid segment at block `ibody`.
    pub fn add_linear_system(&self, ls: &mut LinearSystem, ibody: usize, gravity: &Vec3, nm: &Newmark) -> Result<()> {
        let irb = ls.rigid_segment()?;
        let k = self.tangent(nm);
        ls.mearge(irb, irb, &[ibody], &[ibody], k.transpose().as_slice())?;
        ls.add_residual_blocks(irb, &[ibody], self.residual(gravity).as_slice())
    }
}

/// Predict every body at the start of a step.
pub fn predict_rigid_system(bodies: &mut [RigidBody], nm: &Newmark) {
    bodies.iter_mut().for_each(|rb| rb.predict(nm));
}

/// Push the solved increments into bodies and constraint multipliers.
pub fn update_rigid_system(
    bodies: &mut [RigidBody],
    constraints: &mut [Constraint],
    ls: &LinearSystem,
    nm: &Newmark,
) -> Result<()> {
    if !bodies.is_empty() {
        let delta = ls.update(ls.rigid_segment()?)?;
        for (rb, d) in bodies.iter_mut().zip(delta.chunks_exact(6)) {
            rb.apply_update(d, nm)?;
        }
    }
    for (icst, cst) in constraints.iter_mut().enumerate() {
        let delta = ls.update(ls.constraint_segment(icst)?)?;
        cst.apply_update(delta, nm)?;
    }
    Ok(())
}
