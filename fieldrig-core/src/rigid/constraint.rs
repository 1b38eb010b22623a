//! Constraints between rigid bodies and the ground.
//!
//! Each constraint owns one Lagrange multiplier per scalar condition
//! `C(x, R) = 0` and contributes, per attached body `b`,
//!
//! ```text
//! constraint rows   G_b·βdt²     residual  -C
//! body rows         G_bᵀ·βdt²    residual  -G_bᵀλ
//! body/body         ∂(G_bᵀλ)/∂θ·βdt²
//! ```
//!
//! where `G_b = ∂C/∂(x_b, θ_b)` and `θ_b` is a body-frame rotation
//! increment. Multipliers are updated like positions: `λ += βdt²·Δλ`.
//!
//! Geometry (points, axes) is given in the initial configuration, where
//! every body rotation is the identity.

use super::RigidBody;
use crate::error::{Error, Result};
use crate::linear_system::LinearSystem;
use crate::newmark::Newmark;
use crate::types::{Point3, Vec3};
use nalgebra::{DMatrix, DVector, Matrix3, Matrix6};

/// Multiplier magnitude above which a range limit stays engaged.
const ACTIVE_EPS: f64 = 1e-10;

/// The closed set of supported constraints.
#[derive(Debug, Clone, PartialEq)]
pub enum ConstraintKind {
    /// Body point pinned to a fixed position.
    FixSpherical { body: usize, pos: Point3 },
    /// Body point pinned, rotation only about a fixed axis.
    FixHinge { body: usize, pos: Point3, axis: Vec3 },
    /// Fixed hinge with the rotation angle kept in `[min, max]` radians.
    FixHingeRange {
        body: usize,
        pos: Point3,
        axis: Vec3,
        min: f64,
        max: f64,
    },
    /// Two bodies sharing a point.
    JointSpherical { bodies: [usize; 2], pos: Point3 },
    /// Two bodies sharing a point and rotating relative to each other
    /// about one axis.
    JointHinge { bodies: [usize; 2], pos: Point3, axis: Vec3 },
    /// Joint hinge with the relative angle kept in `[min, max]` radians.
    JointHingeRange {
        bodies: [usize; 2],
        pos: Point3,
        axis: Vec3,
        min: f64,
        max: f64,
    },
}

/// A constraint and its current multipliers.
#[derive(Debug, Clone, PartialEq)]
pub struct Constraint {
    kind: ConstraintKind,
    lambda: Vec<f64>,
}

/// Linearized constraint at the current body state.
#[derive(Debug, Clone)]
struct Linearization {
    c: DVector<f64>,
    /// ∂C/∂(x, θ) per attached body.
    g: Vec<DMatrix<f64>>,
    /// ∂(Gᵀλ)/∂θ per (body, body) pair, row-major over attached bodies.
    k: Vec<Matrix6<f64>>,
    /// Rows whose multiplier is driven to zero.
    inactive: Vec<bool>,
}

impl Linearization {
    fn new(n: usize, n_bodies: usize) -> Self {
        Self {
            c: DVector::zeros(n),
            g: vec![DMatrix::zeros(n, 6); n_bodies],
            k: vec![Matrix6::zeros(); n_bodies * n_bodies],
            inactive: vec![false; n],
        }
    }

    fn n_bodies(&self) -> usize {
        self.g.len()
    }

    fn k_mut(&mut self, ib: usize, jb: usize) -> &mut Matrix6<f64> {
        let nb = self.n_bodies();
        &mut self.k[ib * nb + jb]
    }

    /// Translation of body `ib`'s centre of gravity entering rows `row..row+3`.
    fn translation(&mut self, row: usize, ib: usize, sign: f64, rb: &RigidBody) {
        for i in 0..3 {
            self.c[row + i] += sign * rb.pos_cg()[i];
            self.g[ib][(row + i, i)] += sign;
        }
    }

    /// Row `sign·w·(R l)` of body `ib` with a fixed world direction `w`
    /// and a body-frame vector `l`.
    fn direction(&mut self, row: usize, ib: usize, sign: f64, rb: &RigidBody, w: &Vec3, l: &Vec3, lambda: f64) {
        self.c[row] += sign * w.dot(&(rb.rot * l));
        let g = -(w.transpose() * rb.rot * l.cross_matrix()) * sign;
        for j in 0..3 {
            self.g[ib][(row, 3 + j)] += g[j];
        }
        let k = l.cross_matrix() * (rb.rot.transpose() * w).cross_matrix() * (sign * lambda);
        let mut blk = self.k_mut(ib, ib).fixed_view_mut::<3, 3>(3, 3);
        blk += k;
    }

    /// Point `pos_cg + R d` of body `ib` entering rows `row..row+3`.
    fn point(&mut self, row: usize, ib: usize, sign: f64, rb: &RigidBody, d: &Vec3, lambda: &[f64]) {
        self.translation(row, ib, sign, rb);
        for i in 0..3 {
            let w = Vec3::ith(i, 1.0);
            self.direction(row + i, ib, sign, rb, &w, d, lambda[i]);
        }
    }

    /// Subtract a fixed target from rows `row..row+3`.
    fn offset(&mut self, row: usize, target: &Point3) {
        for i in 0..3 {
            self.c[row + i] -= target[i];
        }
    }

    /// Row of an angle about the world direction `axis`, body `ib`.
    fn angle(&mut self, row: usize, ib: usize, sign: f64, rb: &RigidBody, axis: &Vec3) {
        let g = (rb.rot.transpose() * axis) * sign;
        for j in 0..3 {
            self.g[ib][(row, 3 + j)] += g[j];
        }
    }
}

/// Two unit vectors completing `axis` to a right-handed frame.
fn perpendicular_pair(axis: &Vec3) -> (Vec3, Vec3) {
    let trial = if axis.x.abs() < 0.9 { Vec3::x() } else { Vec3::y() };
    let t1 = (trial - axis * axis.dot(&trial)).normalize();
    let t2 = axis.cross(&t1);
    (t1, t2)
}

fn unit_axis(axis: Vec3) -> Result<Vec3> {
    axis.try_normalize(1e-12)
        .ok_or_else(|| Error::Invariant("hinge axis has zero length".into()))
}

fn distinct(bodies: [usize; 2]) -> Result<[usize; 2]> {
    if bodies[0] == bodies[1] {
        return Err(Error::Invariant(format!("joint connects body {} to itself", bodies[0])));
    }
    Ok(bodies)
}

fn check_range(min: f64, max: f64) -> Result<()> {
    if !(min <= max) {
        return Err(Error::Invariant(format!("hinge range [{min}, {max}] is empty")));
    }
    Ok(())
}

/// Engaged limit of a range row, if any.
fn active_limit(phi: f64, lambda: f64, min: f64, max: f64) -> Option<f64> {
    if phi > max || lambda > ACTIVE_EPS {
        Some(max)
    } else if phi < min || lambda < -ACTIVE_EPS {
        Some(min)
    } else {
        None
    }
}

impl Constraint {
    fn from_kind(kind: ConstraintKind) -> Self {
        let n = match kind {
            ConstraintKind::FixSpherical { .. } | ConstraintKind::JointSpherical { .. } => 3,
            ConstraintKind::FixHinge { .. } | ConstraintKind::JointHinge { .. } => 5,
            ConstraintKind::FixHingeRange { .. } | ConstraintKind::JointHingeRange { .. } => 6,
        };
        Self {
            kind,
            lambda: vec![0.0; n],
        }
    }

    pub fn fix_spherical(body: usize, pos: Point3) -> Self {
        Self::from_kind(ConstraintKind::FixSpherical { body, pos })
    }

    pub fn fix_hinge(body: usize, pos: Point3, axis: Vec3) -> Result<Self> {
        let axis = unit_axis(axis)?;
        Ok(Self::from_kind(ConstraintKind::FixHinge { body, pos, axis }))
    }

    pub fn fix_hinge_range(body: usize, pos: Point3, axis: Vec3, min: f64, max: f64) -> Result<Self> {
        let axis = unit_axis(axis)?;
        check_range(min, max)?;
        Ok(Self::from_kind(ConstraintKind::FixHingeRange {
            body,
            pos,
            axis,
            min,
            max,
        }))
    }

    pub fn joint_spherical(bodies: [usize; 2], pos: Point3) -> Result<Self> {
        let bodies = distinct(bodies)?;
        Ok(Self::from_kind(ConstraintKind::JointSpherical { bodies, pos }))
    }

    pub fn joint_hinge(bodies: [usize; 2], pos: Point3, axis: Vec3) -> Result<Self> {
        let bodies = distinct(bodies)?;
        let axis = unit_axis(axis)?;
        Ok(Self::from_kind(ConstraintKind::JointHinge { bodies, pos, axis }))
    }

    pub fn joint_hinge_range(bodies: [usize; 2], pos: Point3, axis: Vec3, min: f64, max: f64) -> Result<Self> {
        let bodies = distinct(bodies)?;
        let axis = unit_axis(axis)?;
        check_range(min, max)?;
        Ok(Self::from_kind(ConstraintKind::JointHingeRange {
            bodies,
            pos,
            axis,
            min,
            max,
        }))
    }

    pub fn kind(&self) -> &ConstraintKind {
        &self.kind
    }

    /// Bodies this constraint acts on.
    pub fn bodies(&self) -> &[usize] {
        match &self.kind {
            ConstraintKind::FixSpherical { body, .. }
            | ConstraintKind::FixHinge { body, .. }
            | ConstraintKind::FixHingeRange { body, .. } => std::slice::from_ref(body),
            ConstraintKind::JointSpherical { bodies, .. }
            | ConstraintKind::JointHinge { bodies, .. }
            | ConstraintKind::JointHingeRange { bodies, .. } => bodies,
        }
    }

    pub fn n_lambda(&self) -> usize {
        self.lambda.len()
    }

    /// Current multipliers (constraint forces and moments).
    pub fn lambda(&self) -> &[f64] {
        &self.lambda
    }

    fn body<'a>(&self, bodies: &'a [RigidBody], ib: usize) -> Result<&'a RigidBody> {
        let irb = self.bodies()[ib];
        bodies
            .get(irb)
            .ok_or_else(|| Error::NotFound(format!("rigid body {irb} (of {})", bodies.len())))
    }

    fn linearize(&self, bodies: &[RigidBody]) -> Result<Linearization> {
        let lam = &self.lambda;
        let mut lin = Linearization::new(self.n_lambda(), self.bodies().len());
        match &self.kind {
            ConstraintKind::FixSpherical { pos, .. } => {
                let rb = self.body(bodies, 0)?;
                lin.point(0, 0, 1.0, rb, &(pos - rb.ini_pos_cg), lam);
                lin.offset(0, pos);
            }
            ConstraintKind::FixHinge { pos, axis, .. } | ConstraintKind::FixHingeRange { pos, axis, .. } => {
                let rb = self.body(bodies, 0)?;
                lin.point(0, 0, 1.0, rb, &(pos - rb.ini_pos_cg), lam);
                lin.offset(0, pos);
                let (t1, t2) = perpendicular_pair(axis);
                lin.direction(3, 0, 1.0, rb, &t1, axis, lam[3]);
                lin.direction(4, 0, 1.0, rb, &t2, axis, lam[4]);
                if let ConstraintKind::FixHingeRange { min, max, .. } = self.kind {
                    let b = rb.rot * t1;
                    let phi = t2.dot(&b).atan2(t1.dot(&b));
                    match active_limit(phi, lam[5], min, max) {
                        Some(limit) => {
                            lin.c[5] = phi - limit;
                            lin.angle(5, 0, 1.0, rb, axis);
                        }
                        None => lin.inactive[5] = true,
                    }
                }
            }
            ConstraintKind::JointSpherical { pos, .. } => {
                let (rb0, rb1) = (self.body(bodies, 0)?, self.body(bodies, 1)?);
                lin.point(0, 0, 1.0, rb0, &(pos - rb0.ini_pos_cg), lam);
                lin.point(0, 1, -1.0, rb1, &(pos - rb1.ini_pos_cg), lam);
            }
            ConstraintKind::JointHinge { pos, axis, .. } | ConstraintKind::JointHingeRange { pos, axis, .. } => {
                let (rb0, rb1) = (self.body(bodies, 0)?, self.body(bodies, 1)?);
                lin.point(0, 0, 1.0, rb0, &(pos - rb0.ini_pos_cg), lam);
                lin.point(0, 1, -1.0, rb1, &(pos - rb1.ini_pos_cg), lam);
                let (t1, t2) = perpendicular_pair(axis);
                let v = rb1.rot * axis;
                for (k, t) in [t1, t2].iter().enumerate() {
                    let row = 3 + k;
                    let u = rb0.rot * t;
                    // t_k of body 0 stays perpendicular to the axis of body 1
                    lin.direction(row, 0, 1.0, rb0, &v, t, lam[row]);
                    let g1 = -(u.transpose() * rb1.rot * axis.cross_matrix());
                    for j in 0..3 {
                        lin.g[1][(row, 3 + j)] += g1[j];
                    }
                    let k11 = axis.cross_matrix() * (rb1.rot.transpose() * u).cross_matrix() * lam[row];
                    let k01 = -(t.cross_matrix() * rb0.rot.transpose() * rb1.rot * axis.cross_matrix()) * lam[row];
                    let k10 = -(axis.cross_matrix() * rb1.rot.transpose() * rb0.rot * t.cross_matrix()) * lam[row];
                    add_rot_block(lin.k_mut(1, 1), &k11);
                    add_rot_block(lin.k_mut(0, 1), &k01);
                    add_rot_block(lin.k_mut(1, 0), &k10);
                }
                if let ConstraintKind::JointHingeRange { min, max, .. } = self.kind {
                    let (u1, u2) = (rb0.rot * t1, rb0.rot * t2);
                    let b = rb1.rot * t1;
                    let phi = u2.dot(&b).atan2(u1.dot(&b));
                    match active_limit(phi, lam[5], min, max) {
                        Some(limit) => {
                            let a = rb0.rot * axis;
                            lin.c[5] = phi - limit;
                            lin.angle(5, 1, 1.0, rb1, &a);
                            lin.angle(5, 0, -1.0, rb0, &a);
                        }
                        None => lin.inactive[5] = true,
                    }
                }
            }
        }
        Ok(lin)
    }

    /// Norm of the violation of the engaged conditions.
    pub fn violation(&self, bodies: &[RigidBody]) -> Result<f64> {
        let lin = self.linearize(bodies)?;
        Ok(lin
            .c
            .iter()
            .zip(&lin.inactive)
            .filter(|(_, &off)| !off)
            .map(|(c, _)| c * c)
            .sum::<f64>()
            .sqrt())
    }

    /// Merge this constraint into its segment `icst` and the rigid segment.
    pub fn add_linear_system(
        &self,
        ls: &mut LinearSystem,
        icst: usize,
        bodies: &[RigidBody],
        nm: &Newmark,
    ) -> Result<()> {
        let dtmp = nm.disp_factor();
        let irb = ls.rigid_segment()?;
        let ic = ls.constraint_segment(icst)?;
        let lin = self.linearize(bodies)?;
        let lambda = DVector::from_column_slice(&self.lambda);
        let blist = self.bodies();

        for (ib, &bi) in blist.iter().enumerate() {
            let g = &lin.g[ib];
            let gs = g * dtmp;
            // row-major G and Gᵀ
            ls.mearge(ic, irb, &[0], &[bi], gs.transpose().as_slice())?;
            ls.mearge(irb, ic, &[bi], &[0], gs.as_slice())?;
            let force = -(g.transpose() * &lambda);
            ls.add_residual_blocks(irb, &[bi], force.as_slice())?;
            for (jb, &bj) in blist.iter().enumerate() {
                let k = lin.k[ib * blist.len() + jb] * dtmp;
                ls.mearge(irb, irb, &[bi], &[bj], k.transpose().as_slice())?;
            }
        }

        let n = self.n_lambda();
        let mut diag = DMatrix::zeros(n, n);
        let mut res = vec![0.0; n];
        for row in 0..n {
            if lin.inactive[row] {
                diag[(row, row)] = dtmp;
                res[row] = -self.lambda[row];
            } else {
                res[row] = -lin.c[row];
            }
        }
        ls.mearge(ic, ic, &[0], &[0], diag.transpose().as_slice())?;
        ls.add_residual_blocks(ic, &[0], &res)
    }

    /// Newmark update of the multipliers.
    pub fn apply_update(&mut self, delta: &[f64], nm: &Newmark) -> Result<()> {
        if delta.len() != self.lambda.len() {
            return Err(Error::Invariant(format!(
                "constraint increment has {} entries, expected {}",
                delta.len(),
                self.lambda.len()
            )));
        }
        let dtmp = nm.disp_factor();
        self.lambda.iter_mut().zip(delta).for_each(|(l, d)| *l += dtmp * d);
        Ok(())
    }
}

fn add_rot_block(k: &mut Matrix6<f64>, m: &Matrix3<f64>) {
    let mut blk = k.fixed_view_mut::<3, 3>(3, 3);
    blk += m;
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::Rotation3;

    fn two_bodies() -> Vec<RigidBody> {
        let mut b0 = RigidBody::new(1.0, Point3::new(0.0, 0.0, 0.0));
        b0.rot = Rotation3::new(Vec3::new(0.1, -0.3, 0.2)).into_inner();
        b0.disp_cg = Vec3::new(0.05, 0.0, -0.02);
        let mut b1 = RigidBody::new(1.0, Point3::new(1.0, 0.5, 0.0));
        b1.rot = Rotation3::new(Vec3::new(-0.2, 0.1, 0.4)).into_inner();
        vec![b0, b1]
    }

    /// Compare G with finite differences of C for every body dof.
    fn check_jacobian(cst: &Constraint, bodies: &[RigidBody]) {
        let lin = cst.linearize(bodies).unwrap();
        let eps = 1e-7;
        for (ib, &bi) in cst.bodies().iter().enumerate() {
            for j in 0..6 {
                let mut moved = bodies.to_vec();
                if j < 3 {
                    moved[bi].disp_cg[j] += eps;
                } else {
                    let w = Vec3::ith(j - 3, eps);
                    moved[bi].rot *= Rotation3::new(w).into_inner();
                }
                let lin2 = cst.linearize(&moved).unwrap();
                for row in 0..cst.n_lambda() {
                    let fd = (lin2.c[row] - lin.c[row]) / eps;
                    assert_relative_eq!(fd, lin.g[ib][(row, j)], epsilon = 1e-5);
                }
            }
        }
    }

    /// Compare ∂(Gᵀλ)/∂θ with finite differences.
    fn check_geometric_stiffness(cst: &Constraint, bodies: &[RigidBody]) {
        let lin = cst.linearize(bodies).unwrap();
        let lambda = DVector::from_column_slice(cst.lambda());
        let nb = cst.bodies().len();
        let eps = 1e-7;
        for (jb, &bj) in cst.bodies().iter().enumerate() {
            for j in 3..6 {
                let mut moved = bodies.to_vec();
                moved[bj].rot *= Rotation3::new(Vec3::ith(j - 3, eps)).into_inner();
                let lin2 = cst.linearize(&moved).unwrap();
                for ib in 0..nb {
                    let f0 = lin.g[ib].transpose() * &lambda;
                    let f1 = lin2.g[ib].transpose() * &lambda;
                    for i in 3..6 {
                        let fd = (f1[i] - f0[i]) / eps;
                        assert_relative_eq!(fd, lin.k[ib * nb + jb][(i, j)], epsilon = 1e-5);
                    }
                }
            }
        }
    }

    #[test]
    fn test_fix_spherical_at_rest_is_satisfied() {
        let bodies = vec![RigidBody::new(0.5, Point3::new(-1.0, 0.0, 0.0))];
        let cst = Constraint::fix_spherical(0, Point3::new(-2.0, 0.0, 0.0));
        assert_eq!(cst.n_lambda(), 3);
        assert_relative_eq!(cst.violation(&bodies).unwrap(), 0.0);
    }

    #[test]
    fn test_jacobians() {
        let bodies = two_bodies();
        let axis = Vec3::new(0.0, 1.0, 1.0);
        let mut csts = vec![
            Constraint::fix_spherical(0, Point3::new(-0.5, 0.2, 0.1)),
            Constraint::fix_hinge(1, Point3::new(1.5, 0.0, 0.0), axis).unwrap(),
            Constraint::joint_spherical([0, 1], Point3::new(0.5, 0.3, 0.0)).unwrap(),
            Constraint::joint_hinge([0, 1], Point3::new(0.5, 0.3, 0.0), axis).unwrap(),
        ];
        for cst in &mut csts {
            let n = cst.n_lambda();
            cst.lambda = (0..n).map(|i| 0.3 * i as f64 - 0.4).collect();
            check_jacobian(cst, &bodies);
            check_geometric_stiffness(cst, &bodies);
        }
    }

    #[test]
    fn test_range_row_jacobians() {
        // bodies turned about the hinge axis past the range
        let axis = Vec3::new(0.0, 1.0, 1.0).normalize();
        let mut bodies = two_bodies();
        bodies[0].rot = Rotation3::new(axis * 0.3).into_inner();
        bodies[1].rot = Rotation3::new(axis * -0.6).into_inner();
        let mut csts = vec![
            Constraint::fix_hinge_range(0, Point3::new(0.0, 0.0, 0.0), axis, -0.2, 0.2).unwrap(),
            Constraint::joint_hinge_range([0, 1], Point3::new(0.5, 0.3, 0.0), axis, -0.5, 0.5).unwrap(),
        ];
        for cst in &mut csts {
            let lin = cst.linearize(&bodies).unwrap();
            assert!(!lin.inactive[5]);
            assert!(lin.c[5].abs() > 0.05);
            // the angle row carries no geometric stiffness
            cst.lambda = vec![-0.4, -0.1, 0.2, 0.5, 0.8, 0.0];
            check_jacobian(cst, &bodies);
            check_geometric_stiffness(cst, &bodies);
        }
    }

    #[test]
    fn test_range_row_switches() {
        let mut bodies = vec![RigidBody::new(1.0, Point3::zeros())];
        let axis = Vec3::z();
        let mut cst = Constraint::fix_hinge_range(0, Point3::zeros(), axis, -0.5, 0.5).unwrap();
        assert_eq!(cst.n_lambda(), 6);
        assert!(cst.linearize(&bodies).unwrap().inactive[5]);

        bodies[0].rot = Rotation3::new(axis * 0.7).into_inner();
        let lin = cst.linearize(&bodies).unwrap();
        assert!(!lin.inactive[5]);
        assert_relative_eq!(lin.c[5], 0.2, epsilon = 1e-12);

        // a pushing multiplier keeps the limit engaged inside the range
        bodies[0].rot = Matrix3::identity();
        cst.lambda[5] = 1.0;
        let lin = cst.linearize(&bodies).unwrap();
        assert!(!lin.inactive[5]);
        assert_relative_eq!(lin.c[5], -0.5, epsilon = 1e-12);
    }

    #[test]
    fn test_inactive_row_releases_multiplier() {
        let nm = Newmark::new(0.1, 0.6);
        let bodies = vec![RigidBody::new(1.0, Point3::zeros())];
        let mut cst = Constraint::fix_hinge_range(0, Point3::zeros(), Vec3::z(), -0.5, 0.5).unwrap();
        cst.lambda[5] = -1e-12;

        let mut ls = LinearSystem::new();
        ls.add_pattern_rigid(1).unwrap();
        let ic = ls.add_pattern_constraint(0, 6, &[0]).unwrap();
        ls.initialize_marge();
        cst.add_linear_system(&mut ls, 0, &bodies, &nm).unwrap();
        let m = ls.matrix(ic, ic).unwrap();
        assert_relative_eq!(m.get(0, 0, 5, 5), nm.disp_factor());
        assert_relative_eq!(ls.segment(ic).unwrap().residual()[5], 1e-12);

        let delta = [0.0, 0.0, 0.0, 0.0, 0.0, 1e-12 / nm.disp_factor()];
        cst.apply_update(&delta, &nm).unwrap();
        assert_relative_eq!(cst.lambda()[5], 0.0, epsilon = 1e-20);
    }

    #[test]
    fn test_invalid_constructors() {
        let p = Point3::zeros();
        assert!(Constraint::joint_spherical([1, 1], p).is_err());
        assert!(Constraint::fix_hinge(0, p, Vec3::zeros()).is_err());
        assert!(Constraint::fix_hinge_range(0, p, Vec3::x(), 1.0, -1.0).is_err());
    }
}
