//! Nonlinear dynamic driver.
//!
//! A [`Simulation`] owns the field world, the rigid bodies and every
//! equation. [`Simulation::build`] lays out the linear system once:
//!
//! ```text
//! elastic displacement fields
//! multiplier fields (connections, contacts)
//! rigid bodies
//! constraints
//! ```
//!
//! [`Simulation::step`] advances one time step with a Newton loop over the
//! acceleration increments.

use crate::config::SimulationConfig;
use crate::equation::{PlaneContact, RigidElasticConnection, StVenantKirchhoff3D};
use crate::error::{Error, Result};
use crate::linear_system::{LinearSystem, SegmentKind};
use crate::newmark::Newmark;
use crate::precond::IluPreconditioner;
use crate::rigid::{predict_rigid_system, update_rigid_system, Constraint, RigidBody};
use crate::solver::{solve_pbicgstab, FaerLuSolver, LinearSolverKind, SolveReport, Solver};
use crate::types::FieldId;
use crate::world::FieldWorld;
use serde::Serialize;

/// Outcome of one time step.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct StepReport {
    /// Newton iterations that assembled the system.
    pub iterations: usize,
    /// Residual norm of the last assembly, before its increment was applied.
    pub residual: f64,
    /// Residual norm of the first assembly.
    pub initial_residual: f64,
    pub converged: bool,
    /// Last iterative solve; `None` for direct solves or when no solve ran.
    pub last_solve: Option<SolveReport>,
}

/// Simulation session.
#[derive(Debug)]
pub struct Simulation {
    pub world: FieldWorld,
    pub bodies: Vec<RigidBody>,
    pub constraints: Vec<Constraint>,
    pub elastic: Vec<StVenantKirchhoff3D>,
    pub connections: Vec<RigidElasticConnection>,
    pub contacts: Vec<PlaneContact>,
    /// Fields whose dofs never move.
    pub fixed: Vec<FieldId>,
    config: SimulationConfig,
    ls: LinearSystem,
    precond: IluPreconditioner,
    time: f64,
    is_built: bool,
}

impl Simulation {
    pub fn new(world: FieldWorld, config: SimulationConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            world,
            bodies: Vec::new(),
            constraints: Vec::new(),
            elastic: Vec::new(),
            connections: Vec::new(),
            contacts: Vec::new(),
            fixed: Vec::new(),
            precond: IluPreconditioner::from_config(&config.preconditioner),
            config,
            ls: LinearSystem::new(),
            time: 0.0,
            is_built: false,
        })
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    pub fn time(&self) -> f64 {
        self.time
    }

    pub fn linear_system(&self) -> &LinearSystem {
        &self.ls
    }

    /// Lay out the linear system and the preconditioner pattern.
    ///
    /// Must be called again after adding bodies, constraints or equations.
    pub fn build(&mut self) -> Result<()> {
        let mut ls = LinearSystem::new();
        for eq in &self.elastic {
            eq.add_pattern(&mut ls, &self.world)?;
        }
        for conn in &self.connections {
            conn.add_pattern(&mut ls, &self.world)?;
        }
        for contact in &self.contacts {
            contact.add_pattern(&mut ls, &self.world)?;
        }
        if !self.bodies.is_empty() {
            ls.add_pattern_rigid(self.bodies.len())?;
        } else if !self.constraints.is_empty() || !self.connections.is_empty() {
            return Err(Error::Invariant("constraints and connections need rigid bodies".into()));
        }
        for (icst, cst) in self.constraints.iter().enumerate() {
            ls.add_pattern_constraint(icst, cst.n_lambda(), cst.bodies())?;
        }
        for conn in &self.connections {
            conn.add_pattern_rigid(&mut ls, &self.world)?;
        }
        for &id in &self.fixed {
            ls.set_fixed_field(id, &self.world)?;
        }
        self.precond = IluPreconditioner::from_config(&self.config.preconditioner);
        self.precond.set_linear_system(&ls)?;
        log::debug!(
            "linear system: {} segments, {} dofs, preconditioner nnz {}",
            ls.segments().len(),
            ls.n_dofs(),
            self.precond.nnz()
        );
        self.ls = ls;
        self.is_built = true;
        Ok(())
    }

    fn assemble(&mut self, nm: &Newmark, is_initial: bool) -> Result<f64> {
        let gravity = self.config.gravity();
        let ls = &mut self.ls;
        ls.initialize_marge();
        for (ibody, rb) in self.bodies.iter().enumerate() {
            rb.add_linear_system(ls, ibody, &gravity, nm)?;
        }
        for (icst, cst) in self.constraints.iter().enumerate() {
            cst.add_linear_system(ls, icst, &self.bodies, nm)?;
        }
        for eq in &self.elastic {
            eq.add_linear_system(ls, &self.world, &gravity, nm, is_initial)?;
        }
        for conn in &self.connections {
            conn.add_linear_system(ls, &self.world, &self.bodies, nm, is_initial)?;
        }
        for contact in &self.contacts {
            contact.add_linear_system(ls, &self.world, nm, is_initial)?;
        }
        Ok(ls.finalize_marge())
    }

    fn solve(&mut self) -> Result<Option<SolveReport>> {
        let rhs = self.ls.residual_vector();
        let (x, report) = match self.config.solver.kind {
            LinearSolverKind::Iterative => {
                self.precond.set_value(&self.ls)?;
                let mut x = vec![0.0; rhs.len()];
                let report = solve_pbicgstab(
                    &self.ls,
                    &self.precond,
                    &rhs,
                    &mut x,
                    self.config.solver.conv_ratio,
                    self.config.solver.max_iter,
                );
                log::debug!(
                    "  pbicgstab: {:?} after {} iterations, ratio {:.3e}",
                    report.status,
                    report.iterations,
                    report.ratio
                );
                (x, Some(report))
            }
            LinearSolverKind::Direct => (FaerLuSolver::new().solve(&self.ls.to_csr()?, &rhs)?, None),
        };
        self.ls.set_update(&x)?;
        Ok(report)
    }

    /// Move every field segment by its solved increment.
    fn update_fields(&mut self, nm: &Newmark, is_initial: bool) -> Result<()> {
        for seg in self.ls.segments() {
            if let SegmentKind::Field { field, role } = seg.kind() {
                nm.update_field(&mut self.world, field, role, seg.update(), is_initial)?;
            }
        }
        Ok(())
    }

    /// Advance one time step.
    pub fn step(&mut self) -> Result<StepReport> {
        if !self.is_built {
            self.build()?;
        }
        let nm = self.config.newmark();
        let newton = self.config.newton;
        self.world.execute_values(self.time + nm.dt)?;
        predict_rigid_system(&mut self.bodies, &nm);

        let mut report = StepReport {
            iterations: 0,
            residual: 0.0,
            initial_residual: 0.0,
            converged: false,
            last_solve: None,
        };
        let mut is_updated = false;
        for itr in 0..newton.max_iter {
            let norm = self.assemble(&nm, !is_updated)?;
            report.iterations = itr + 1;
            report.residual = norm;
            if itr == 0 {
                report.initial_residual = norm;
            }
            log::debug!("t={:.4} newton {itr}: |r| = {norm:.6e}", self.time + nm.dt);
            if !norm.is_finite() {
                return Err(Error::Solver(format!("residual diverged at newton iteration {itr}")));
            }
            if norm < newton.abs_tol {
                report.converged = true;
                break;
            }
            if let Some(solve) = self.solve()? {
                report.last_solve = Some(solve);
            }
            self.update_fields(&nm, !is_updated)?;
            update_rigid_system(&mut self.bodies, &mut self.constraints, &self.ls, &nm)?;
            is_updated = true;
            // relative drop is tested once the increment is applied
            if itr > 0 && norm < report.initial_residual * newton.rel_drop {
                report.converged = true;
                break;
            }
        }
        if !is_updated {
            // still at the previous step: apply the predictor alone
            for seg in self.ls.segments() {
                if let SegmentKind::Field { field, role } = seg.kind() {
                    let zero = vec![0.0; seg.nblk() * seg.len()];
                    nm.update_field(&mut self.world, field, role, &zero, true)?;
                }
            }
        }
        if !report.converged {
            log::warn!(
                "t={:.4}: newton stopped after {} iterations, |r| = {:.3e} (initial {:.3e})",
                self.time + nm.dt,
                report.iterations,
                report.residual,
                report.initial_residual
            );
        }
        self.time += nm.dt;
        Ok(report)
    }
}
