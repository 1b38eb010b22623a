//! Newmark-beta time integration.
//!
//! Every unknown solved for is an acceleration increment `Δa`. Positions
//! and velocities follow from
//!
//! ```text
//! u ← u + βdt²·Δa      v ← v + γdt·Δa      a ← a + Δa
//! ```
//!
//! and on the first update of a step the history terms `dt·v + ½dt²·a`
//! (position) and `dt·a` (velocity) are added first, using the state at
//! the start of the step.

use crate::error::{Error, Result};
use crate::types::{Derivatives, ElSegRole, FieldId};
use crate::world::FieldWorld;

/// Newmark parameters for one time step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Newmark {
    pub dt: f64,
    pub gamma: f64,
    pub beta: f64,
}

impl Newmark {
    /// Parameters with `beta = ¼(½ + γ)²`.
    pub fn new(dt: f64, gamma: f64) -> Self {
        Self {
            dt,
            gamma,
            beta: 0.25 * (0.5 + gamma) * (0.5 + gamma),
        }
    }

    /// Position change per unit acceleration increment, `βdt²`.
    pub fn disp_factor(&self) -> f64 {
        self.beta * self.dt * self.dt
    }

    /// Velocity change per unit acceleration increment, `γdt`.
    pub fn velo_factor(&self) -> f64 {
        self.gamma * self.dt
    }

    /// Predicted position `u + dt·v + ½dt²·a`.
    pub fn predict(&self, u: f64, v: f64, a: f64) -> f64 {
        u + self.dt * v + 0.5 * self.dt * self.dt * a
    }

    /// Apply an increment to one (u, v, a) triple.
    pub fn update(&self, u: &mut f64, v: &mut f64, a: &mut f64, delta: f64, is_initial: bool) {
        if is_initial {
            *u = self.predict(*u, *v, *a);
            *v += self.dt * *a;
        }
        *u += self.disp_factor() * delta;
        *v += self.velo_factor() * delta;
        *a += delta;
    }

    /// Push a solved increment into the value, velocity and acceleration
    /// segments of a field.
    ///
    /// `delta` covers every node of the field's value node array for
    /// `role`, `dof_count` entries per node.
    pub fn update_field(
        &self,
        world: &mut FieldWorld,
        id_field: FieldId,
        role: ElSegRole,
        delta: &[f64],
        is_initial: bool,
    ) -> Result<()> {
        let idx = world.field(id_field)?.node_seg_index(role).clone();
        let segs = (
            idx.id_na_va,
            idx.value_segment(Derivatives::VALUE),
            idx.value_segment(Derivatives::VELOCITY),
            idx.value_segment(Derivatives::ACCELERATION),
        );
        let (Some(id_na), Some(id_u), Some(id_v), Some(id_a)) = segs else {
            return Err(Error::Unsupported(format!(
                "Newmark update of {id_field} needs value, velocity and acceleration segments"
            )));
        };
        let na = world.node_array_mut(id_na)?;
        let mut u = na.segment(id_u)?.as_slice().to_vec();
        let mut v = na.segment(id_v)?.as_slice().to_vec();
        let mut a = na.segment(id_a)?.as_slice().to_vec();
        if delta.len() != u.len() || v.len() != u.len() || a.len() != u.len() {
            return Err(Error::Invariant(format!(
                "increment of {} entries for a field segment of {}",
                delta.len(),
                u.len()
            )));
        }
        for k in 0..delta.len() {
            self.update(&mut u[k], &mut v[k], &mut a[k], delta[k], is_initial);
        }
        na.segment_mut(id_u)?.as_mut_slice().copy_from_slice(&u);
        na.segment_mut(id_v)?.as_mut_slice().copy_from_slice(&v);
        na.segment_mut(id_a)?.as_mut_slice().copy_from_slice(&a);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_beta_from_gamma() {
        let nm = Newmark::new(0.1, 0.5);
        assert_relative_eq!(nm.beta, 0.25);
        let nm = Newmark::new(0.03, 0.6);
        assert_relative_eq!(nm.beta, 0.3025);
    }

    #[test]
    fn test_constant_acceleration_is_exact() {
        // with a = const the predictor alone integrates exactly
        let nm = Newmark::new(0.1, 0.6);
        let (mut u, mut v, mut a) = (0.0, 1.0, -2.0);
        for _ in 0..10 {
            nm.update(&mut u, &mut v, &mut a, 0.0, true);
        }
        assert_relative_eq!(u, 0.0, epsilon = 1e-12);
        assert_relative_eq!(v, -1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_increment_only_after_first_update() {
        let nm = Newmark::new(0.2, 0.5);
        let (mut u, mut v, mut a) = (1.0, 1.0, 1.0);
        nm.update(&mut u, &mut v, &mut a, 0.0, false);
        assert_eq!((u, v, a), (1.0, 1.0, 1.0));
        nm.update(&mut u, &mut v, &mut a, 4.0, false);
        assert_relative_eq!(u, 1.04, epsilon = 1e-12);
        assert_relative_eq!(v, 1.4, epsilon = 1e-12);
        assert_relative_eq!(a, 5.0);
    }
}
