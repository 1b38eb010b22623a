//! Physics modules contributing to the linear system.
//!
//! Each module reads the current state from the [`FieldWorld`], builds
//! element-local matrices and residuals and merges them into a
//! [`LinearSystem`](crate::linear_system::LinearSystem). Matrices are
//! derivatives of the negated residual by the acceleration increments, so
//! stiffness-like terms carry the factor `βdt²`.
//!
//! # Submodules
//!
//! - [`stvk`] - St. Venant–Kirchhoff hyperelastic solid (Tet4, Hex8)
//! - [`connect`] - Lagrange-multiplier coupling of a solid to a rigid body
//! - [`plane`] - unilateral contact of a solid against a plane

pub mod connect;
pub mod plane;
pub mod stvk;

pub use connect::RigidElasticConnection;
pub use plane::PlaneContact;
pub use stvk::StVenantKirchhoff3D;

use crate::error::{Error, Result};
use crate::field::Field;
use crate::newmark::Newmark;
use crate::node_array::NodeSegment;
use crate::types::{Derivatives, ElSegRole, FieldId, Vec3};
use crate::world::FieldWorld;

/// Value, velocity and acceleration of a 3-dof corner field.
pub(crate) struct Kinematics<'w> {
    u: &'w NodeSegment,
    v: &'w NodeSegment,
    a: &'w NodeSegment,
}

impl<'w> Kinematics<'w> {
    pub(crate) fn new(id_field: FieldId, world: &'w FieldWorld) -> Result<Self> {
        let field: &Field = world.field(id_field)?;
        if field.dof_count() != 3 {
            return Err(Error::Unsupported(format!(
                "{id_field} has {} dofs per node, expected a 3D vector",
                field.dof_count()
            )));
        }
        let idx = field.node_seg_index(ElSegRole::Corner);
        let segs = (
            idx.id_na_va,
            idx.value_segment(Derivatives::VALUE),
            idx.value_segment(Derivatives::VELOCITY),
            idx.value_segment(Derivatives::ACCELERATION),
        );
        let (Some(id_na), Some(id_u), Some(id_v), Some(id_a)) = segs else {
            return Err(Error::Unsupported(format!(
                "{id_field} needs value, velocity and acceleration segments"
            )));
        };
        let na = world.node_array(id_na)?;
        Ok(Self {
            u: na.segment(id_u)?,
            v: na.segment(id_v)?,
            a: na.segment(id_a)?,
        })
    }

    /// Value at the current Newton state.
    ///
    /// On the first iteration of a step the stored value is still the one
    /// of the previous step, so the Newmark predictor is applied.
    pub(crate) fn value(&self, inode: usize, nm: &Newmark, is_initial: bool) -> Vec3 {
        let u = Vec3::from_column_slice(self.u.node(inode));
        if !is_initial {
            return u;
        }
        let v = Vec3::from_column_slice(self.v.node(inode));
        let a = Vec3::from_column_slice(self.a.node(inode));
        u + v * nm.dt + a * (0.5 * nm.dt * nm.dt)
    }

    pub(crate) fn acceleration(&self, inode: usize) -> Vec3 {
        Vec3::from_column_slice(self.a.node(inode))
    }
}

/// Multiplier nodes of `id_lambda` must sit on the value nodes of `id_disp`.
pub(crate) fn check_colocated(id_disp: FieldId, id_lambda: FieldId, world: &FieldWorld) -> Result<()> {
    let disp = world.field(id_disp)?.node_seg_index(ElSegRole::Corner);
    let lambda = world.field(id_lambda)?.node_seg_index(ElSegRole::Corner);
    if disp.id_na_va.is_none() || disp.id_na_va != lambda.id_na_co {
        return Err(Error::Unsupported(format!(
            "multiplier field {id_lambda} does not map onto the nodes of {id_disp}"
        )));
    }
    Ok(())
}
