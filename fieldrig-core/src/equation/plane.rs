//! Unilateral contact of a solid against a fixed plane.
//!
//! Each multiplier node carries one normal contact force `λ₀` (the other
//! two components are held at zero). With the gap function
//! `g = (X + u - p)·n`, where `n` points from the free side into the
//! obstacle, a node is in contact when it penetrates (`g > 0`) or is still
//! pushed (`λ₀ > 0`):
//!
//! ```text
//! active    dl = [n 0 0]  ld = [nᵀ; 0; 0]  ll = diag(0, 1, 1)
//!           r_d = -n λ₀   r_l = (-g, -λ₁, -λ₂)
//! released  ll = I        r_l = (-λ₀, -λ₁, -λ₂)
//! ```
//!
//! Matrices are scaled by `βdt²`.

use super::{check_colocated, Kinematics};
use crate::error::{Error, Result};
use crate::linear_system::LinearSystem;
use crate::newmark::Newmark;
use crate::types::{ElSegRole, FieldId, Point3, Vec3};
use crate::world::FieldWorld;
use nalgebra::Matrix3;

/// Contact force above which a node stays in contact.
const ACTIVE_FORCE: f64 = 1e-6;
/// Penetration above which a node enters contact.
const ACTIVE_GAP: f64 = 1e-7;

/// Contact between a displacement field and a plane.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlaneContact {
    pub id_disp: FieldId,
    /// Multiplier field over the contact candidates.
    pub id_lambda: FieldId,
    /// A point of the plane.
    pub origin: Point3,
    /// Unit normal pointing into the obstacle.
    pub normal: Vec3,
}

impl PlaneContact {
    pub fn new(id_disp: FieldId, id_lambda: FieldId, origin: Point3, normal: Vec3) -> Result<Self> {
        let normal = normal
            .try_normalize(1e-12)
            .ok_or_else(|| Error::Invariant("contact plane normal has zero length".into()))?;
        Ok(Self {
            id_disp,
            id_lambda,
            origin,
            normal,
        })
    }

    /// Register the multiplier field and its coupling to the solid.
    pub fn add_pattern(&self, ls: &mut LinearSystem, world: &FieldWorld) -> Result<()> {
        check_colocated(self.id_disp, self.id_lambda, world)?;
        ls.add_pattern_field(self.id_lambda, world)?;
        ls.add_pattern_field_pair(self.id_disp, self.id_lambda, world)
    }

    /// Penetration of a current position.
    pub fn gap(&self, x: &Point3) -> f64 {
        (x - self.origin).dot(&self.normal)
    }

    pub fn add_linear_system(
        &self,
        ls: &mut LinearSystem,
        world: &FieldWorld,
        nm: &Newmark,
        is_initial: bool,
    ) -> Result<()> {
        check_colocated(self.id_disp, self.id_lambda, world)?;
        let ilss_d = ls.field_segment(self.id_disp, ElSegRole::Corner, world)?;
        let ilss_l = ls.field_segment(self.id_lambda, ElSegRole::Corner, world)?;

        let field_lambda = world.field(self.id_lambda)?;
        let coords = field_lambda.coordinates(world)?;
        let disp = Kinematics::new(self.id_disp, world)?;
        let lambda = Kinematics::new(self.id_lambda, world)?;
        let dtmp = nm.disp_factor();
        let n = self.normal;

        for inode in field_lambda.element_nodes(ElSegRole::Corner, world)? {
            let inode_co = field_lambda.map_val2co(inode);
            let x = Point3::from_column_slice(coords.node(inode_co)) + disp.value(inode_co, nm, is_initial);
            let l = lambda.value(inode, nm, is_initial);
            let gap = self.gap(&x);

            let mut dl = Matrix3::zeros();
            let mut ld = Matrix3::zeros();
            let mut ll = Matrix3::identity();
            let mut eres_d = Vec3::zeros();
            let mut eres_l = -l;
            if l.x > ACTIVE_FORCE || gap > ACTIVE_GAP {
                dl.set_column(0, &n);
                ld.set_row(0, &n.transpose());
                ll[(0, 0)] = 0.0;
                eres_d = -n * l.x;
                eres_l.x = -gap;
            }

            // blocks are row-major
            ls.mearge(ilss_d, ilss_l, &[inode_co], &[inode], (dl * dtmp).transpose().as_slice())?;
            ls.mearge(ilss_l, ilss_d, &[inode], &[inode_co], (ld * dtmp).transpose().as_slice())?;
            ls.mearge(ilss_l, ilss_l, &[inode], &[inode], (ll * dtmp).transpose().as_slice())?;
            ls.add_residual_blocks(ilss_d, &[inode_co], eres_d.as_slice())?;
            ls.add_residual_blocks(ilss_l, &[inode], eres_l.as_slice())?;
        }
        Ok(())
    }
}
