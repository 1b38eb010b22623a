//! Fields: degree-of-freedom views over node and element arrays.
//!
//! A [`Field`] owns no numeric data. It records which node segments hold
//! its coordinates and values for each topological role, and which element
//! segments interpolate them on each participating element array. All IDs
//! resolve through the [`FieldWorld`] that owns the field.
//!
//! Queries that only read live here and take `&FieldWorld`; operations that
//! write node data live on [`FieldWorld`].

use crate::elem_array::ElemSegment;
use crate::element::tri3::tri_area;
use crate::error::{Error, Result};
use crate::expr::Expression;
use crate::mesh::ElementType;
use crate::node_array::NodeSegment;
use crate::sparse::BcFlags;
use crate::types::{Derivatives, EaId, ElSegRole, FieldId, FieldType, NaId};
use crate::world::FieldWorld;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Interpolation of a field on one element array.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InterpolationType {
    LineLinear,
    TriLinear,
    TriConstant,
    TriLinearBubble,
    TetLinear,
    TetConstant,
    HexLinear,
    HexConstant,
    Unknown,
}

/// Node segments of one role.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NodeSegIndex {
    pub id_na_co: Option<NaId>,
    pub id_ns_co: Option<usize>,
    pub id_na_va: Option<NaId>,
    pub id_ns_va: Option<usize>,
    pub id_ns_ve: Option<usize>,
    pub id_ns_ac: Option<usize>,
}

impl NodeSegIndex {
    /// Segment for a single derivative.
    pub fn value_segment(&self, derivative: Derivatives) -> Option<usize> {
        if derivative == Derivatives::VALUE {
            self.id_ns_va
        } else if derivative == Derivatives::VELOCITY {
            self.id_ns_ve
        } else if derivative == Derivatives::ACCELERATION {
            self.id_ns_ac
        } else {
            None
        }
    }

    pub(crate) fn set_value_segment(&mut self, derivative: Derivatives, id_ns: Option<usize>) {
        if derivative == Derivatives::VALUE {
            self.id_ns_va = id_ns;
        } else if derivative == Derivatives::VELOCITY {
            self.id_ns_ve = id_ns;
        } else if derivative == Derivatives::ACCELERATION {
            self.id_ns_ac = id_ns;
        }
    }
}

/// Element segments a field uses on one element array.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElemInterpolation {
    pub id_ea: EaId,
    pub id_es_c_co: Option<usize>,
    pub id_es_c_va: Option<usize>,
    pub id_es_b_co: Option<usize>,
    pub id_es_b_va: Option<usize>,
    pub id_es_e_co: Option<usize>,
    pub id_es_e_va: Option<usize>,
    /// Drawing/coupling layer.
    pub layer: i32,
}

impl ElemInterpolation {
    pub fn new(id_ea: EaId) -> Self {
        Self {
            id_ea,
            id_es_c_co: None,
            id_es_c_va: None,
            id_es_b_co: None,
            id_es_b_va: None,
            id_es_e_co: None,
            id_es_e_va: None,
            layer: 0,
        }
    }

    /// Element segment for a role, coordinate or value side.
    pub fn segment(&self, role: ElSegRole, is_value: bool) -> Option<usize> {
        match (role, is_value) {
            (ElSegRole::Corner, false) => self.id_es_c_co,
            (ElSegRole::Corner, true) => self.id_es_c_va,
            (ElSegRole::Bubble, false) => self.id_es_b_co,
            (ElSegRole::Bubble, true) => self.id_es_b_va,
            (ElSegRole::Edge, false) => self.id_es_e_co,
            (ElSegRole::Edge, true) => self.id_es_e_va,
        }
    }
}

/// Saved prescription of one scalar degree of freedom.
#[derive(Debug, Clone, Default)]
pub enum ValueFieldDof {
    #[default]
    Unset,
    Constant(f64),
    Expression(Arc<dyn Expression>),
}

/// Result of [`Field::find_velocity_at_point`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VelocityAtPoint {
    pub velocity: [f64; 2],
    pub id_ea: EaId,
    pub ielem: usize,
    /// Barycentric weights of corners 1 and 2.
    pub r1: f64,
    pub r2: f64,
}

/// Degree-of-freedom view over node and element segments.
#[derive(Debug, Clone)]
pub struct Field {
    pub(crate) parent: Option<FieldId>,
    pub(crate) interpolations: Vec<ElemInterpolation>,
    pub(crate) corner: NodeSegIndex,
    pub(crate) bubble: NodeSegIndex,
    pub(crate) edge: NodeSegIndex,
    pub(crate) field_type: FieldType,
    pub(crate) derivatives: Derivatives,
    pub(crate) dof_count: usize,
    pub(crate) ndim_coord: usize,
    pub(crate) is_partial: bool,
    /// Value node -> coordinate node; identity when empty.
    pub(crate) map_val2co: Vec<usize>,
    pub(crate) dof_values: Vec<ValueFieldDof>,
    pub(crate) gradient_source: Option<FieldId>,
}

impl Field {
    pub(crate) fn new(ndim_coord: usize) -> Self {
        Self {
            parent: None,
            interpolations: Vec::new(),
            corner: NodeSegIndex::default(),
            bubble: NodeSegIndex::default(),
            edge: NodeSegIndex::default(),
            field_type: FieldType::NoValue,
            derivatives: Derivatives::empty(),
            dof_count: 0,
            ndim_coord,
            is_partial: false,
            map_val2co: Vec::new(),
            dof_values: Vec::new(),
            gradient_source: None,
        }
    }

    pub fn parent(&self) -> Option<FieldId> {
        self.parent
    }

    /// Whether this field owns its value layout.
    pub fn is_base(&self) -> bool {
        self.parent.is_none()
    }

    /// Whether this field covers only the nodes of its own elements.
    pub fn is_partial(&self) -> bool {
        self.is_partial
    }

    /// A field without element interpolations spans its whole node array.
    pub fn is_rigid(&self) -> bool {
        self.interpolations.is_empty()
    }

    pub fn field_type(&self) -> FieldType {
        self.field_type
    }

    pub fn derivatives(&self) -> Derivatives {
        self.derivatives
    }

    pub fn dof_count(&self) -> usize {
        self.dof_count
    }

    pub fn ndim_coord(&self) -> usize {
        self.ndim_coord
    }

    pub fn interpolations(&self) -> &[ElemInterpolation] {
        &self.interpolations
    }

    pub fn element_array_ids(&self) -> impl Iterator<Item = EaId> + '_ {
        self.interpolations.iter().map(|ei| ei.id_ea)
    }

    pub fn interpolation(&self, id_ea: EaId) -> Option<&ElemInterpolation> {
        self.interpolations.iter().find(|ei| ei.id_ea == id_ea)
    }

    pub fn node_seg_index(&self, role: ElSegRole) -> &NodeSegIndex {
        match role {
            ElSegRole::Corner => &self.corner,
            ElSegRole::Bubble => &self.bubble,
            ElSegRole::Edge => &self.edge,
        }
    }

    pub(crate) fn node_seg_index_mut(&mut self, role: ElSegRole) -> &mut NodeSegIndex {
        match role {
            ElSegRole::Corner => &mut self.corner,
            ElSegRole::Bubble => &mut self.bubble,
            ElSegRole::Edge => &mut self.edge,
        }
    }

    /// Field whose gradient this field holds.
    pub fn gradient_source(&self) -> Option<FieldId> {
        self.gradient_source
    }

    /// Saved prescription of a dof for one derivative.
    pub fn dof_value(&self, idof: usize, derivative: Derivatives) -> Option<&ValueFieldDof> {
        let slot = derivative.slot()?;
        self.dof_values.get(slot * self.dof_count + idof)
    }

    /// Coordinate node of a value node.
    pub fn map_val2co(&self, inode: usize) -> usize {
        self.map_val2co.get(inode).copied().unwrap_or(inode)
    }

    /// Node array and segment for a role.
    ///
    /// For values, the first derivative of `derivative` present in the field
    /// wins, in the order value, velocity, acceleration.
    pub fn node_seg_id(&self, role: ElSegRole, is_value: bool, derivative: Derivatives) -> Result<(NaId, usize)> {
        let idx = self.node_seg_index(role);
        if !is_value {
            return match (idx.id_na_co, idx.id_ns_co) {
                (Some(na), Some(ns)) => Ok((na, ns)),
                _ => Err(Error::NotFound(format!("{role:?} coordinate segment"))),
            };
        }
        let na = idx
            .id_na_va
            .ok_or_else(|| Error::NotFound(format!("{role:?} value node array")))?;
        Derivatives::PRIORITY
            .iter()
            .filter(|d| derivative.contains(**d))
            .find_map(|d| idx.value_segment(*d))
            .map(|ns| (na, ns))
            .ok_or_else(|| Error::NotFound(format!("{role:?} segment for {derivative:?}")))
    }

    /// Node segment for a role.
    pub fn node_seg<'w>(
        &self,
        role: ElSegRole,
        is_value: bool,
        world: &'w FieldWorld,
        derivative: Derivatives,
    ) -> Result<&'w NodeSegment> {
        let (na, ns) = self.node_seg_id(role, is_value, derivative)?;
        world.node_array(na)?.segment(ns)
    }

    /// Coordinates of the corner nodes.
    pub fn coordinates<'w>(&self, world: &'w FieldWorld) -> Result<&'w NodeSegment> {
        self.node_seg(ElSegRole::Corner, false, world, Derivatives::VALUE)
    }

    /// Element segment used for a role on one element array.
    ///
    /// Falls back to any segment of the array bound to the field's node
    /// array for that role.
    pub fn elem_seg_id(&self, id_ea: EaId, role: ElSegRole, is_value: bool, world: &FieldWorld) -> Result<usize> {
        if let Some(id_es) = self.interpolation(id_ea).and_then(|ei| ei.segment(role, is_value)) {
            return Ok(id_es);
        }
        let idx = self.node_seg_index(role);
        let target = if is_value { idx.id_na_va } else { idx.id_na_co };
        let ea = world.elem_array(id_ea)?;
        target
            .and_then(|na| {
                ea.segments()
                    .iter()
                    .position(|es| es.id_na() == na && es.role() == role)
            })
            .ok_or_else(|| Error::Invariant(format!("no {role:?} element segment of {id_ea} matches the field")))
    }

    pub fn elem_seg<'w>(
        &self,
        id_ea: EaId,
        role: ElSegRole,
        is_value: bool,
        world: &'w FieldWorld,
    ) -> Result<&'w ElemSegment> {
        let id_es = self.elem_seg_id(id_ea, role, is_value, world)?;
        world.elem_array(id_ea)?.segment(id_es)
    }

    /// Classify the interpolation on one element array.
    pub fn interpolation_type(&self, id_ea: EaId, world: &FieldWorld) -> Result<InterpolationType> {
        let ei = self
            .interpolation(id_ea)
            .ok_or_else(|| Error::NotFound(format!("{id_ea} is not interpolated by this field")))?;
        let elem_type = world.elem_array(id_ea)?.elem_type();
        let geometric = self.dof_count == 0;
        let corner = ei.id_es_c_va.is_some() || (geometric && ei.id_es_c_co.is_some());
        let bubble = ei.id_es_b_va.is_some();
        Ok(match (elem_type, corner, bubble) {
            (ElementType::Line2, true, false) => InterpolationType::LineLinear,
            (ElementType::Tri3, true, false) => InterpolationType::TriLinear,
            (ElementType::Tri3, false, true) => InterpolationType::TriConstant,
            (ElementType::Tri3, true, true) => InterpolationType::TriLinearBubble,
            (ElementType::Tet4, true, false) => InterpolationType::TetLinear,
            (ElementType::Tet4, false, true) => InterpolationType::TetConstant,
            (ElementType::Hex8, true, false) => InterpolationType::HexLinear,
            (ElementType::Hex8, false, true) => InterpolationType::HexConstant,
            _ => InterpolationType::Unknown,
        })
    }

    /// Value nodes referenced by this field's elements for a role.
    pub fn element_nodes(&self, role: ElSegRole, world: &FieldWorld) -> Result<Vec<usize>> {
        let mut nodes = Vec::new();
        for ei in &self.interpolations {
            if let Some(id_es) = ei.segment(role, true) {
                let ea = world.elem_array(ei.id_ea)?;
                nodes.extend(ea.unique_nodes(id_es)?);
            }
        }
        nodes.sort_unstable();
        nodes.dedup();
        Ok(nodes)
    }

    /// Value nodes a value assignment touches for a role.
    ///
    /// Partial fields only reach the nodes of their own elements.
    pub(crate) fn target_nodes(&self, role: ElSegRole, world: &FieldWorld) -> Result<Vec<usize>> {
        if self.is_partial {
            return self.element_nodes(role, world);
        }
        let na = self
            .node_seg_index(role)
            .id_na_va
            .ok_or_else(|| Error::NotFound(format!("{role:?} value node array")))?;
        Ok((0..world.node_array(na)?.size()).collect())
    }

    /// Smallest and largest value of one component over the corner and
    /// bubble nodes.
    pub fn min_max_value(&self, idof: usize, world: &FieldWorld, derivative: Derivatives) -> Result<(f64, f64)> {
        if idof >= self.dof_count {
            return Err(Error::NotFound(format!("dof {idof} of a {}-dof field", self.dof_count)));
        }
        let mut range: Option<(f64, f64)> = None;
        for role in [ElSegRole::Corner, ElSegRole::Bubble] {
            let seg = match self.node_seg(role, true, world, derivative) {
                Ok(seg) => seg,
                Err(Error::NotFound(_)) => continue,
                Err(e) => return Err(e),
            };
            for inode in self.target_nodes(role, world)? {
                let v = seg.value(inode, idof);
                range = Some(match range {
                    None => (v, v),
                    Some((lo, hi)) => (lo.min(v), hi.max(v)),
                });
            }
        }
        range.ok_or_else(|| Error::NotFound("field has no values".into()))
    }

    /// Mark fixed dofs in `flags`.
    ///
    /// `idof = None` fixes every dof of the field. Dof indices are shifted by
    /// `offset` within the block.
    pub fn boundary_condition(
        &self,
        role: ElSegRole,
        idof: Option<usize>,
        flags: &mut BcFlags,
        world: &FieldWorld,
        offset: usize,
    ) -> Result<()> {
        let dofs: Vec<usize> = match idof {
            Some(i) if i >= self.dof_count => {
                return Err(Error::NotFound(format!("dof {i} of a {}-dof field", self.dof_count)))
            }
            Some(i) => vec![offset + i],
            None => (offset..offset + self.dof_count).collect(),
        };
        let nodes: Vec<usize> = if self.is_rigid() {
            (0..flags.nblk()).collect()
        } else {
            self.element_nodes(role, world)?
        };
        for inode in nodes {
            for &d in &dofs {
                flags.set(inode, d)?;
            }
        }
        Ok(())
    }

    /// Velocity at a point of a 2D triangle field.
    ///
    /// Linear scan over the elements; returns `None` if no triangle contains
    /// the point.
    pub fn find_velocity_at_point(&self, co: [f64; 2], world: &FieldWorld) -> Result<Option<VelocityAtPoint>> {
        if self.ndim_coord != 2 || self.dof_count < 2 {
            return Err(Error::Unsupported(
                "velocity lookup needs a 2D field with at least two dofs".into(),
            ));
        }
        let coords = self.coordinates(world)?;
        let velo = self.node_seg(ElSegRole::Corner, true, world, Derivatives::VELOCITY)?;
        for ei in &self.interpolations {
            if world.elem_array(ei.id_ea)?.elem_type() != ElementType::Tri3 {
                continue;
            }
            let es_co = self.elem_seg(ei.id_ea, ElSegRole::Corner, false, world)?;
            let es_va = self.elem_seg(ei.id_ea, ElSegRole::Corner, true, world)?;
            for ielem in 0..es_co.n_elements() {
                let no_co = es_co.nodes(ielem);
                let (p0, p1, p2) = (coords.node(no_co[0]), coords.node(no_co[1]), coords.node(no_co[2]));
                let at = tri_area(p0, p1, p2);
                let a0 = tri_area(&co, p1, p2);
                if a0 < -at * 1e-3 {
                    continue;
                }
                let a1 = tri_area(&co, p2, p0);
                if a1 < -at * 1e-3 {
                    continue;
                }
                let a2 = tri_area(&co, p0, p1);
                if a2 < -at * 1e-3 {
                    continue;
                }
                let no_va = es_va.nodes(ielem);
                let (v0, v1, v2) = (velo.node(no_va[0]), velo.node(no_va[1]), velo.node(no_va[2]));
                let velocity = std::array::from_fn(|k| (a0 * v0[k] + a1 * v1[k] + a2 * v2[k]) / at);
                return Ok(Some(VelocityAtPoint {
                    velocity,
                    id_ea: ei.id_ea,
                    ielem,
                    r1: a1 / at,
                    r2: a2 / at,
                }));
            }
        }
        Ok(None)
    }

    /// Cross-reference checks against the owning world.
    pub(crate) fn check(&self, world: &FieldWorld) -> Result<()> {
        if let (Some(na), Some(ns)) = (self.corner.id_na_co, self.corner.id_ns_co) {
            let len = world.node_array(na)?.segment(ns)?.len();
            if len != self.ndim_coord {
                return Err(Error::Invariant(format!(
                    "coordinate segment has length {len}, field dimension is {}",
                    self.ndim_coord
                )));
            }
        }
        for role in [ElSegRole::Corner, ElSegRole::Bubble, ElSegRole::Edge] {
            let idx = self.node_seg_index(role);
            let Some(na) = idx.id_na_va else { continue };
            let na_ref = world.node_array(na)?;
            for d in Derivatives::PRIORITY {
                if let Some(ns) = idx.value_segment(d) {
                    let len = na_ref.segment(ns)?.len();
                    if len != self.dof_count {
                        return Err(Error::Invariant(format!(
                            "{role:?} {d:?} segment has length {len}, field has {} dofs",
                            self.dof_count
                        )));
                    }
                }
            }
        }
        for ei in &self.interpolations {
            let ea = world.elem_array(ei.id_ea)?;
            for role in [ElSegRole::Corner, ElSegRole::Bubble, ElSegRole::Edge] {
                for is_value in [false, true] {
                    let Some(id_es) = ei.segment(role, is_value) else { continue };
                    let es = ea.segment(id_es)?;
                    let idx = self.node_seg_index(role);
                    let expected = if is_value {
                        idx.id_na_va
                    } else if role == ElSegRole::Corner {
                        idx.id_na_co
                    } else {
                        Some(es.id_na())
                    };
                    if expected != Some(es.id_na()) {
                        return Err(Error::Invariant(format!(
                            "{role:?} segment {id_es} of {} references {}, field expects {:?}",
                            ei.id_ea,
                            es.id_na(),
                            expected
                        )));
                    }
                    let size = world.node_array(es.id_na())?.size();
                    if es.max_node_index().is_some_and(|m| m >= size) {
                        return Err(Error::Invariant(format!(
                            "segment {id_es} of {} indexes past {} (size {size})",
                            ei.id_ea,
                            es.id_na()
                        )));
                    }
                }
            }
        }
        if !self.map_val2co.is_empty() {
            if let (Some(na_va), Some(na_co)) = (self.corner.id_na_va, self.corner.id_na_co) {
                let n_co = world.node_array(na_co)?.size();
                if self.map_val2co.len() != world.node_array(na_va)?.size()
                    || self.map_val2co.iter().any(|&i| i >= n_co)
                {
                    return Err(Error::Invariant("value to coordinate node map is inconsistent".into()));
                }
            }
        }
        Ok(())
    }
}
