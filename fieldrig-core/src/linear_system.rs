//! Segmented block-sparse linear system.
//!
//! The unknown vector is split into segments: one per (field, role) pair,
//! one for all rigid bodies (6 dofs each) and one per constraint (its
//! multipliers). Every coupled pair of segments owns a [`BlockCrsMatrix`];
//! diagonal blocks of each segment are always in the pattern.
//!
//! # Assembly Cycle
//!
//! ```text
//! initialize_marge()            zero matrices and residuals
//! mearge(..) / add_residual(..) accumulate element contributions
//! finalize_marge() -> norm      eliminate fixed dofs, return ‖r‖₂
//! ```
//!
//! After a solve, [`LinearSystem::set_update`] scatters the solution back
//! into per-segment update vectors read by the physics modules.

use crate::error::{Error, Result};
use crate::sparse::{BcFlags, BlockCrsMatrix, BlockPattern, CsrMatrix, TripletMatrix};
use crate::types::{ElSegRole, FieldId};
use crate::world::FieldWorld;
use std::collections::BTreeMap;

/// What a segment of the unknown vector holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentKind {
    Field { field: FieldId, role: ElSegRole },
    /// Translation and rotation of every rigid body.
    Rigid,
    /// Multipliers of one constraint.
    Constraint(usize),
}

/// One block vector of the system.
#[derive(Debug, Clone)]
pub struct Segment {
    kind: SegmentKind,
    nblk: usize,
    len: usize,
    offset: usize,
    bc: BcFlags,
    residual: Vec<f64>,
    update: Vec<f64>,
}

impl Segment {
    fn new(kind: SegmentKind, nblk: usize, len: usize, offset: usize) -> Self {
        Self {
            kind,
            nblk,
            len,
            offset,
            bc: BcFlags::new(nblk, len),
            residual: vec![0.0; nblk * len],
            update: vec![0.0; nblk * len],
        }
    }

    pub fn kind(&self) -> SegmentKind {
        self.kind
    }

    /// Number of blocks (nodes, bodies).
    pub fn nblk(&self) -> usize {
        self.nblk
    }

    /// Dofs per block.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.nblk * self.len == 0
    }

    /// First dof of this segment in the flat unknown vector.
    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn bc_flags(&self) -> &BcFlags {
        &self.bc
    }

    pub fn residual(&self) -> &[f64] {
        &self.residual
    }

    /// Last solved increment.
    pub fn update(&self) -> &[f64] {
        &self.update
    }
}

/// Block-sparse system over segments.
#[derive(Debug, Clone, Default)]
pub struct LinearSystem {
    segments: Vec<Segment>,
    matrices: BTreeMap<(usize, usize), BlockCrsMatrix>,
}

impl LinearSystem {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn segment(&self, iseg: usize) -> Result<&Segment> {
        self.segments
            .get(iseg)
            .ok_or_else(|| Error::NotFound(format!("linear system segment {iseg}")))
    }

    fn segment_mut(&mut self, iseg: usize) -> Result<&mut Segment> {
        self.segments
            .get_mut(iseg)
            .ok_or_else(|| Error::NotFound(format!("linear system segment {iseg}")))
    }

    /// Total number of scalar unknowns.
    pub fn n_dofs(&self) -> usize {
        self.segments.last().map_or(0, |s| s.offset + s.nblk * s.len)
    }

    pub fn find_segment(&self, kind: SegmentKind) -> Option<usize> {
        self.segments.iter().position(|s| s.kind == kind)
    }

    fn add_segment(&mut self, kind: SegmentKind, nblk: usize, len: usize) -> Result<usize> {
        if let Some(iseg) = self.find_segment(kind) {
            return Ok(iseg);
        }
        let iseg = self.segments.len();
        self.segments.push(Segment::new(kind, nblk, len, self.n_dofs()));
        let mut pattern = BlockPattern::new(nblk);
        pattern.add_diagonal();
        self.add_pattern(iseg, iseg, &pattern)?;
        log::trace!("segment {iseg}: {kind:?}, {nblk} blocks of {len}");
        Ok(iseg)
    }

    fn add_pattern(&mut self, iseg: usize, jseg: usize, pattern: &BlockPattern) -> Result<()> {
        let (nr, lr) = {
            let s = self.segment(iseg)?;
            (s.nblk, s.len)
        };
        let (nc, lc) = {
            let s = self.segment(jseg)?;
            (s.nblk, s.len)
        };
        self.matrices
            .entry((iseg, jseg))
            .or_insert_with(|| BlockCrsMatrix::new(nr, nc, lr, lc))
            .add_pattern(pattern)
    }

    /// Segment holding the values of a field, keyed by its base field.
    pub fn field_segment(&self, id_field: FieldId, role: ElSegRole, world: &FieldWorld) -> Result<usize> {
        let root = world.root_field(id_field)?;
        self.find_segment(SegmentKind::Field { field: root, role })
            .ok_or_else(|| Error::NotFound(format!("no {role:?} segment for {root}")))
    }

    pub fn rigid_segment(&self) -> Result<usize> {
        self.find_segment(SegmentKind::Rigid)
            .ok_or_else(|| Error::NotFound("no rigid body segment".into()))
    }

    pub fn constraint_segment(&self, icst: usize) -> Result<usize> {
        self.find_segment(SegmentKind::Constraint(icst))
            .ok_or_else(|| Error::NotFound(format!("no segment for constraint {icst}")))
    }

    /// Register a field and couple the nodes of each of its elements.
    ///
    /// Returns the corner segment (the bubble segment for bubble-only fields).
    pub fn add_pattern_field(&mut self, id_field: FieldId, world: &FieldWorld) -> Result<usize> {
        let root = world.root_field(id_field)?;
        let field = world.field(id_field)?;
        let mut first = None;
        for role in [ElSegRole::Corner, ElSegRole::Bubble] {
            let Some(id_na) = field.node_seg_index(role).id_na_va else { continue };
            let nblk = world.node_array(id_na)?.size();
            let iseg = self.add_segment(SegmentKind::Field { field: root, role }, nblk, field.dof_count())?;
            let mut pattern = BlockPattern::new(nblk);
            for ei in field.interpolations() {
                let Some(id_es) = ei.segment(role, true) else { continue };
                let es = world.elem_array(ei.id_ea)?.segment(id_es)?;
                for ielem in 0..es.n_elements() {
                    pattern.add_element(es.nodes(ielem), es.nodes(ielem));
                }
            }
            self.add_pattern(iseg, iseg, &pattern)?;
            first.get_or_insert(iseg);
        }
        first.ok_or_else(|| Error::Invariant(format!("{id_field} has no value node array")))
    }

    /// Couple two registered corner fields through the elements of `id_col`.
    pub fn add_pattern_field_pair(&mut self, id_row: FieldId, id_col: FieldId, world: &FieldWorld) -> Result<()> {
        let iseg = self.field_segment(id_row, ElSegRole::Corner, world)?;
        let jseg = self.field_segment(id_col, ElSegRole::Corner, world)?;
        let (row, col) = (world.field(id_row)?, world.field(id_col)?);
        let mut pat_ij = BlockPattern::new(self.segment(iseg)?.nblk);
        let mut pat_ji = BlockPattern::new(self.segment(jseg)?.nblk);
        for ei in col.interpolations() {
            let es_col = col.elem_seg(ei.id_ea, ElSegRole::Corner, true, world)?;
            let es_row = row.elem_seg(ei.id_ea, ElSegRole::Corner, true, world)?;
            for ielem in 0..es_col.n_elements() {
                pat_ij.add_element(es_row.nodes(ielem), es_col.nodes(ielem));
                pat_ji.add_element(es_col.nodes(ielem), es_row.nodes(ielem));
            }
        }
        self.add_pattern(iseg, jseg, &pat_ij)?;
        self.add_pattern(jseg, iseg, &pat_ji)
    }

    /// Register the rigid body segment.
    pub fn add_pattern_rigid(&mut self, n_bodies: usize) -> Result<usize> {
        self.add_segment(SegmentKind::Rigid, n_bodies, 6)
    }

    /// Register a constraint with `n_lambda` multipliers acting on `bodies`.
    pub fn add_pattern_constraint(&mut self, icst: usize, n_lambda: usize, bodies: &[usize]) -> Result<usize> {
        let irb = self.rigid_segment()?;
        let n_bodies = self.segment(irb)?.nblk;
        if let Some(&b) = bodies.iter().find(|&&b| b >= n_bodies) {
            return Err(Error::NotFound(format!("rigid body {b} (of {n_bodies})")));
        }
        let icst_seg = self.add_segment(SegmentKind::Constraint(icst), 1, n_lambda)?;

        let mut pat_cr = BlockPattern::new(1);
        pat_cr.add_element(&[0], bodies);
        self.add_pattern(icst_seg, irb, &pat_cr)?;
        let mut pat_rc = BlockPattern::new(n_bodies);
        pat_rc.add_element(bodies, &[0]);
        self.add_pattern(irb, icst_seg, &pat_rc)?;
        let mut pat_rr = BlockPattern::new(n_bodies);
        pat_rr.add_element(bodies, bodies);
        self.add_pattern(irb, irb, &pat_rr)?;
        Ok(icst_seg)
    }

    /// Couple every node of a registered field with one rigid body.
    pub fn add_pattern_field_rigid(&mut self, id_field: FieldId, irigid: usize, world: &FieldWorld) -> Result<()> {
        let iseg = self.field_segment(id_field, ElSegRole::Corner, world)?;
        let irb = self.rigid_segment()?;
        let nodes = world.field(id_field)?.element_nodes(ElSegRole::Corner, world)?;
        let mut pat_fr = BlockPattern::new(self.segment(iseg)?.nblk);
        pat_fr.add_element(&nodes, &[irigid]);
        self.add_pattern(iseg, irb, &pat_fr)?;
        let mut pat_rf = BlockPattern::new(self.segment(irb)?.nblk);
        pat_rf.add_element(&[irigid], &nodes);
        self.add_pattern(irb, iseg, &pat_rf)
    }

    pub fn matrix(&self, iseg: usize, jseg: usize) -> Option<&BlockCrsMatrix> {
        self.matrices.get(&(iseg, jseg))
    }

    pub fn matrix_mut(&mut self, iseg: usize, jseg: usize) -> Result<&mut BlockCrsMatrix> {
        self.matrices
            .get_mut(&(iseg, jseg))
            .ok_or_else(|| Error::Assembly(format!("segments {iseg} and {jseg} are not coupled")))
    }

    /// Accumulate an element matrix into the (iseg, jseg) block matrix.
    pub fn mearge(&mut self, iseg: usize, jseg: usize, rows: &[usize], cols: &[usize], emat: &[f64]) -> Result<()> {
        self.matrix_mut(iseg, jseg)?.mearge(rows, cols, emat)
    }

    pub fn residual_mut(&mut self, iseg: usize) -> Result<&mut [f64]> {
        Ok(&mut self.segment_mut(iseg)?.residual)
    }

    /// Add to one residual entry.
    pub fn add_residual(&mut self, iseg: usize, iblk: usize, idof: usize, value: f64) -> Result<()> {
        let seg = self.segment_mut(iseg)?;
        if iblk >= seg.nblk || idof >= seg.len {
            return Err(Error::Assembly(format!(
                "residual entry ({iblk}, {idof}) outside segment {iseg}"
            )));
        }
        seg.residual[iblk * seg.len + idof] += value;
        Ok(())
    }

    /// Add an element residual block to the given blocks.
    pub fn add_residual_blocks(&mut self, iseg: usize, blocks: &[usize], eres: &[f64]) -> Result<()> {
        let len = self.segment(iseg)?.len;
        if eres.len() != blocks.len() * len {
            return Err(Error::Assembly(format!(
                "element residual has {} entries, expected {}",
                eres.len(),
                blocks.len() * len
            )));
        }
        for (k, &iblk) in blocks.iter().enumerate() {
            for idof in 0..len {
                self.add_residual(iseg, iblk, idof, eres[k * len + idof])?;
            }
        }
        Ok(())
    }

    pub fn update(&self, iseg: usize) -> Result<&[f64]> {
        Ok(&self.segment(iseg)?.update)
    }

    pub fn bc_flags_mut(&mut self, iseg: usize) -> Result<&mut BcFlags> {
        Ok(&mut self.segment_mut(iseg)?.bc)
    }

    /// Fix every dof of the nodes of a field's elements.
    pub fn set_fixed_field(&mut self, id_field: FieldId, world: &FieldWorld) -> Result<()> {
        self.set_fixed(id_field, None, world)
    }

    /// Fix one dof of the nodes of a field's elements.
    pub fn set_fixed_dof(&mut self, id_field: FieldId, idof: usize, world: &FieldWorld) -> Result<()> {
        self.set_fixed(id_field, Some(idof), world)
    }

    fn set_fixed(&mut self, id_field: FieldId, idof: Option<usize>, world: &FieldWorld) -> Result<()> {
        let iseg = self.field_segment(id_field, ElSegRole::Corner, world)?;
        let field = world.field(id_field)?;
        field.boundary_condition(ElSegRole::Corner, idof, self.bc_flags_mut(iseg)?, world, 0)
    }

    pub fn clear_fixed(&mut self) {
        self.segments.iter_mut().for_each(|s| s.bc.clear());
    }

    /// Zero every matrix and residual.
    pub fn initialize_marge(&mut self) {
        self.matrices.values_mut().for_each(BlockCrsMatrix::set_zero);
        for seg in &mut self.segments {
            seg.residual.iter_mut().for_each(|v| *v = 0.0);
        }
    }

    /// Eliminate fixed dofs and return the residual 2-norm.
    ///
    /// Rows and columns of a fixed dof are zeroed with a unit diagonal and
    /// a zero residual, so its increment solves to zero.
    pub fn finalize_marge(&mut self) -> f64 {
        for iseg in 0..self.segments.len() {
            let fixed: Vec<(usize, usize)> = self.segments[iseg].bc.fixed().collect();
            if fixed.is_empty() {
                continue;
            }
            for ((i, j), m) in self.matrices.iter_mut() {
                for &(iblk, idof) in &fixed {
                    if *i == iseg {
                        m.zero_row(iblk, idof);
                    }
                    if *j == iseg {
                        m.zero_col(iblk, idof);
                    }
                    if *i == iseg && *j == iseg {
                        m.set_unit_diag(iblk, idof);
                    }
                }
            }
            let seg = &mut self.segments[iseg];
            for &(iblk, idof) in &fixed {
                seg.residual[iblk * seg.len + idof] = 0.0;
            }
        }
        self.segments
            .iter()
            .flat_map(|s| s.residual.iter())
            .map(|v| v * v)
            .sum::<f64>()
            .sqrt()
    }

    /// y = beta * y + alpha * A * x on flat vectors.
    pub fn mat_vec(&self, alpha: f64, x: &[f64], beta: f64, y: &mut [f64]) {
        if beta == 0.0 {
            y.iter_mut().for_each(|v| *v = 0.0);
        } else {
            y.iter_mut().for_each(|v| *v *= beta);
        }
        for (&(i, j), m) in &self.matrices {
            let (si, sj) = (&self.segments[i], &self.segments[j]);
            let xj = &x[sj.offset..sj.offset + sj.nblk * sj.len];
            let yi = &mut y[si.offset..si.offset + si.nblk * si.len];
            m.mat_vec(alpha, xj, yi);
        }
    }

    /// Concatenated residual of all segments.
    pub fn residual_vector(&self) -> Vec<f64> {
        self.segments.iter().flat_map(|s| s.residual.iter().copied()).collect()
    }

    /// Scatter a flat solution into the segment update vectors.
    pub fn set_update(&mut self, x: &[f64]) -> Result<()> {
        if x.len() != self.n_dofs() {
            return Err(Error::Solver(format!(
                "update has {} entries, system has {}",
                x.len(),
                self.n_dofs()
            )));
        }
        for seg in &mut self.segments {
            let n = seg.nblk * seg.len;
            seg.update.copy_from_slice(&x[seg.offset..seg.offset + n]);
        }
        Ok(())
    }

    /// Flattened scalar matrix, keeping the full block pattern.
    pub fn to_csr(&self) -> Result<CsrMatrix> {
        let n = self.n_dofs();
        let nnz: usize = self
            .matrices
            .values()
            .map(|m| m.nnz_blocks() * m.len_row() * m.len_col())
            .sum();
        let mut triplet = TripletMatrix::with_capacity(n, n, nnz);
        for (&(i, j), m) in &self.matrices {
            let (oi, oj) = (self.segments[i].offset, self.segments[j].offset);
            m.for_each_entry(|r, c, v| triplet.add(oi + r, oj + c, v));
        }
        triplet.to_csr()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_rigid_and_constraint_segments() {
        let mut ls = LinearSystem::new();
        let irb = ls.add_pattern_rigid(2).unwrap();
        let ic = ls.add_pattern_constraint(0, 3, &[1]).unwrap();
        assert_eq!(ls.n_dofs(), 12 + 3);
        assert_eq!(ls.segment(ic).unwrap().offset(), 12);
        assert!(ls.matrix(ic, irb).is_some());
        assert!(ls.matrix(irb, ic).is_some());
        assert_eq!(ls.constraint_segment(0).unwrap(), ic);
        assert!(ls.add_pattern_constraint(1, 3, &[2]).is_err());

        // block (constraint, body 0) is not coupled
        assert!(ls.mearge(ic, irb, &[0], &[0], &[0.0; 18]).is_err());
        ls.mearge(ic, irb, &[0], &[1], &[1.0; 18]).unwrap();
    }

    #[test]
    fn test_finalize_eliminates_fixed_dofs() {
        let mut ls = LinearSystem::new();
        let irb = ls.add_pattern_rigid(1).unwrap();
        let mut k = [0.0; 36];
        for i in 0..6 {
            k[i * 6 + i] = 2.0;
            if i < 5 {
                k[i * 6 + i + 1] = -1.0;
                k[(i + 1) * 6 + i] = -1.0;
            }
        }
        ls.initialize_marge();
        ls.mearge(irb, irb, &[0], &[0], &k).unwrap();
        ls.add_residual_blocks(irb, &[0], &[1.0, 1.0, 1.0, 1.0, 1.0, 1.0]).unwrap();
        ls.bc_flags_mut(irb).unwrap().set(0, 2).unwrap();

        let norm = ls.finalize_marge();
        assert_relative_eq!(norm, 5f64.sqrt());
        let m = ls.matrix(irb, irb).unwrap();
        assert_relative_eq!(m.get(0, 0, 2, 2), 1.0);
        assert_relative_eq!(m.get(0, 0, 2, 1), 0.0);
        assert_relative_eq!(m.get(0, 0, 1, 2), 0.0);
        assert_relative_eq!(m.get(0, 0, 1, 1), 2.0);

        // a fresh assembly pass starts from zero
        ls.initialize_marge();
        assert_relative_eq!(ls.finalize_marge(), 0.0);
    }

    #[test]
    fn test_mat_vec_matches_csr() {
        let mut ls = LinearSystem::new();
        let irb = ls.add_pattern_rigid(2).unwrap();
        let ic = ls.add_pattern_constraint(0, 2, &[0, 1]).unwrap();
        let block: Vec<f64> = (0..12).map(|v| v as f64 * 0.5).collect();
        ls.mearge(ic, irb, &[0], &[1], &block).unwrap();
        ls.mearge(irb, irb, &[0, 1], &[0, 1], &[1.0; 144]).unwrap();

        let x: Vec<f64> = (0..ls.n_dofs()).map(|i| (i as f64).cos()).collect();
        let mut y = vec![1.0; ls.n_dofs()];
        ls.mat_vec(1.0, &x, 0.0, &mut y);

        let csr = ls.to_csr().unwrap();
        for (i, row) in csr.row_iter().enumerate() {
            let expected: f64 = row.col_indices().iter().zip(row.values()).map(|(&j, &v)| v * x[j]).sum();
            assert_relative_eq!(y[i], expected, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_set_update() {
        let mut ls = LinearSystem::new();
        let irb = ls.add_pattern_rigid(1).unwrap();
        let ic = ls.add_pattern_constraint(0, 1, &[0]).unwrap();
        let x: Vec<f64> = (0..7).map(|v| v as f64).collect();
        ls.set_update(&x).unwrap();
        assert_eq!(ls.update(irb).unwrap(), &x[..6]);
        assert_eq!(ls.update(ic).unwrap(), &[6.0]);
        assert!(ls.set_update(&x[..3]).is_err());
    }
}
