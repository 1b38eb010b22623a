//! Coupling of a solid's boundary nodes to a rigid body.
//!
//! For every multiplier node with reference position `X` the constraint
//!
//! ```text
//! f = (X + u) - (X_cg + d_cg) - R (X - X_cg) = 0
//! ```
//!
//! keeps the node glued to the body. With `D = X - X_cg` and multiplier
//! `L`, the blocks merged per node are
//!
//! ```text
//! dl = I            ld = I
//! lr = [-I | R[D]×] rl = lrᵀ
//! rr = -[D]×[RᵀL]×  (rotation part only)
//! ```
//!
//! all scaled by `βdt²`, with residuals `-L` (solid), `(L, [D]×RᵀL)` (body)
//! and `-f` (multiplier).

use super::{check_colocated, Kinematics};
use crate::error::{Error, Result};
use crate::linear_system::LinearSystem;
use crate::newmark::Newmark;
use crate::rigid::RigidBody;
use crate::types::{ElSegRole, FieldId, Point3, Vec3};
use crate::world::FieldWorld;
use nalgebra::{Matrix3, Matrix3x6, Matrix6};

/// Glue between a displacement field and one rigid body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RigidElasticConnection {
    pub irigid: usize,
    /// Multiplier field over the glued boundary.
    pub id_lambda: FieldId,
    pub id_disp: FieldId,
}

impl RigidElasticConnection {
    pub fn new(irigid: usize, id_lambda: FieldId, id_disp: FieldId) -> Self {
        Self {
            irigid,
            id_lambda,
            id_disp,
        }
    }

    /// Register the multiplier field and its coupling to the solid.
    pub fn add_pattern(&self, ls: &mut LinearSystem, world: &FieldWorld) -> Result<()> {
        check_colocated(self.id_disp, self.id_lambda, world)?;
        ls.add_pattern_field(self.id_lambda, world)?;
        ls.add_pattern_field_pair(self.id_disp, self.id_lambda, world)
    }

    /// Couple the multiplier field to the body; needs the rigid segment.
    pub fn add_pattern_rigid(&self, ls: &mut LinearSystem, world: &FieldWorld) -> Result<()> {
        ls.add_pattern_field_rigid(self.id_lambda, self.irigid, world)
    }

    pub fn add_linear_system(
        &self,
        ls: &mut LinearSystem,
        world: &FieldWorld,
        bodies: &[RigidBody],
        nm: &Newmark,
        is_initial: bool,
    ) -> Result<()> {
        check_colocated(self.id_disp, self.id_lambda, world)?;
        let rigid = bodies
            .get(self.irigid)
            .ok_or_else(|| Error::NotFound(format!("rigid body {}", self.irigid)))?;
        let ilss_d = ls.field_segment(self.id_disp, ElSegRole::Corner, world)?;
        let ilss_l = ls.field_segment(self.id_lambda, ElSegRole::Corner, world)?;
        let ilss_r = ls.rigid_segment()?;

        let field_lambda = world.field(self.id_lambda)?;
        let coords = field_lambda.coordinates(world)?;
        let disp = Kinematics::new(self.id_disp, world)?;
        let lambda = Kinematics::new(self.id_lambda, world)?;
        let nodes = field_lambda.element_nodes(ElSegRole::Corner, world)?;

        let dtmp = nm.disp_factor();
        let rot = rigid.rot;
        let irb = self.irigid;
        let eye = Matrix3::identity() * dtmp;

        for inode in nodes {
            let inode_co = field_lambda.map_val2co(inode);
            let co0 = Point3::from_column_slice(coords.node(inode_co));
            let co1 = co0 + disp.value(inode_co, nm, is_initial);
            let l1 = lambda.value(inode, nm, is_initial);

            let d1 = co0 - rigid.ini_pos_cg;
            let f = co1 - rigid.pos_cg() - rot * d1;
            let rtl = rot.transpose() * l1;
            let wd1 = d1.cross_matrix();

            let mut lr = Matrix3x6::zeros();
            lr.fixed_view_mut::<3, 3>(0, 0).copy_from(&(-Matrix3::identity()));
            lr.fixed_view_mut::<3, 3>(0, 3).copy_from(&(rot * wd1));
            let lr = lr * dtmp;
            let mut rr = Matrix6::zeros();
            rr.fixed_view_mut::<3, 3>(3, 3)
                .copy_from(&(-(wd1 * rtl.cross_matrix()) * dtmp));

            // blocks are row-major
            ls.mearge(ilss_d, ilss_l, &[inode_co], &[inode], eye.transpose().as_slice())?;
            ls.mearge(ilss_l, ilss_d, &[inode], &[inode_co], eye.transpose().as_slice())?;
            ls.mearge(ilss_l, ilss_r, &[inode], &[irb], lr.transpose().as_slice())?;
            ls.mearge(ilss_r, ilss_l, &[irb], &[inode], lr.as_slice())?;
            ls.mearge(ilss_r, ilss_r, &[irb], &[irb], rr.transpose().as_slice())?;

            let moment: Vec3 = wd1 * rtl;
            ls.add_residual_blocks(ilss_d, &[inode_co], &[-l1.x, -l1.y, -l1.z])?;
            ls.add_residual_blocks(ilss_r, &[irb], &[l1.x, l1.y, l1.z, moment.x, moment.y, moment.z])?;
            ls.add_residual_blocks(ilss_l, &[inode], &[-f.x, -f.y, -f.z])?;
        }
        Ok(())
    }
}
