//! The field world: owner of every node array, element array and field.
//!
//! Entities are stored in dense arenas and referenced by ID
//! (`id = index + 1`). Nothing is deleted individually; [`FieldWorld::clear`]
//! drops everything at once, so an ID stays valid for the lifetime of the
//! world that issued it.
//!
//! # Submodules
//!
//! - [`value`] - value types and value assignment
//! - [`gradient`] - per-element gradient fields

pub mod gradient;
pub mod value;

use crate::elem_array::ElementArray;
use crate::error::{Error, Result};
use crate::field::{ElemInterpolation, Field};
use crate::mesh::{IdConverter, Mesh};
use crate::node_array::NodeArray;
use crate::types::{Derivatives, EaId, ElSegRole, FieldId, FieldType, NaId};
use std::collections::HashMap;

/// Registry of node arrays, element arrays and fields.
#[derive(Debug, Clone, Default)]
pub struct FieldWorld {
    node_arrays: Vec<NodeArray>,
    elem_arrays: Vec<ElementArray>,
    fields: Vec<Field>,
    converters: HashMap<FieldId, IdConverter>,
}

impl FieldWorld {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop every entity. All previously issued IDs become invalid.
    pub fn clear(&mut self) {
        self.node_arrays.clear();
        self.elem_arrays.clear();
        self.fields.clear();
        self.converters.clear();
    }

    pub fn is_node_array(&self, id: NaId) -> bool {
        id.index() < self.node_arrays.len()
    }

    pub fn is_elem_array(&self, id: EaId) -> bool {
        id.index() < self.elem_arrays.len()
    }

    pub fn is_field(&self, id: FieldId) -> bool {
        id.index() < self.fields.len()
    }

    pub fn node_array(&self, id: NaId) -> Result<&NodeArray> {
        self.node_arrays
            .get(id.index())
            .ok_or_else(|| Error::NotFound(id.to_string()))
    }

    pub fn node_array_mut(&mut self, id: NaId) -> Result<&mut NodeArray> {
        self.node_arrays
            .get_mut(id.index())
            .ok_or_else(|| Error::NotFound(id.to_string()))
    }

    pub fn elem_array(&self, id: EaId) -> Result<&ElementArray> {
        self.elem_arrays
            .get(id.index())
            .ok_or_else(|| Error::NotFound(id.to_string()))
    }

    /// Mutable element array; run [`validate`](Self::validate) after
    /// changing its topology.
    pub fn elem_array_mut(&mut self, id: EaId) -> Result<&mut ElementArray> {
        self.elem_arrays
            .get_mut(id.index())
            .ok_or_else(|| Error::NotFound(id.to_string()))
    }

    pub fn field(&self, id: FieldId) -> Result<&Field> {
        self.fields
            .get(id.index())
            .ok_or_else(|| Error::NotFound(id.to_string()))
    }

    pub(crate) fn field_mut(&mut self, id: FieldId) -> Result<&mut Field> {
        self.fields
            .get_mut(id.index())
            .ok_or_else(|| Error::NotFound(id.to_string()))
    }

    pub fn field_ids(&self) -> impl Iterator<Item = FieldId> {
        (0..self.fields.len()).map(FieldId::from_index)
    }

    pub fn add_node_array(&mut self, na: NodeArray) -> NaId {
        self.node_arrays.push(na);
        NaId::from_index(self.node_arrays.len() - 1)
    }

    pub fn add_elem_array(&mut self, ea: ElementArray) -> EaId {
        self.elem_arrays.push(ea);
        EaId::from_index(self.elem_arrays.len() - 1)
    }

    fn add_field(&mut self, field: Field) -> FieldId {
        self.fields.push(field);
        FieldId::from_index(self.fields.len() - 1)
    }

    /// Base field at the root of a field's parent chain.
    pub fn root_field(&self, id: FieldId) -> Result<FieldId> {
        let mut id = id;
        // a parent is always created before its children
        while let Some(parent) = self.field(id)?.parent() {
            if parent >= id {
                return Err(Error::Invariant(format!("{id} has a cyclic parent chain")));
            }
            id = parent;
        }
        Ok(id)
    }

    /// CAD entity mapping of a field created by [`add_mesh`](Self::add_mesh).
    pub fn id_converter(&self, base: FieldId) -> Option<&IdConverter> {
        self.converters.get(&base)
    }

    /// Import a mesh as one node array and one element array per group.
    ///
    /// Returns a geometry-only base field over every group.
    pub fn add_mesh(&mut self, mesh: &Mesh) -> Result<FieldId> {
        let dim = mesh.dim();
        let coords: Vec<f64> = mesh
            .nodes()
            .iter()
            .flat_map(|p| p.iter().take(dim).copied().collect::<Vec<_>>())
            .collect();
        let mut na = NodeArray::new(mesh.n_nodes());
        let id_ns_co = na.add_segment_with_values("COORD", dim, coords)?;
        let id_na = self.add_node_array(na);

        let mut field = Field::new(dim);
        field.corner.id_na_co = Some(id_na);
        field.corner.id_ns_co = Some(id_ns_co);

        let mut converter = IdConverter::default();
        for group in mesh.groups() {
            let mut ea = ElementArray::new(group.element_type, group.n_elements());
            let id_es = ea.add_segment(id_na, ElSegRole::Corner, group.connectivity.clone())?;
            let id_ea = self.add_elem_array(ea);
            let mut ei = ElemInterpolation::new(id_ea);
            ei.id_es_c_co = Some(id_es);
            field.interpolations.push(ei);
            if let Some(cad) = group.cad {
                converter.insert(cad, id_ea);
            }
        }
        let id = self.add_field(field);
        self.converters.insert(id, converter);
        log::trace!(
            "added mesh as {id}: {} nodes, {} element arrays",
            mesh.n_nodes(),
            mesh.groups().len()
        );
        Ok(id)
    }

    /// New base field over the element arrays of `base` with topological
    /// dimension `dim` (all arrays when `None`).
    ///
    /// Corner values live next to the coordinates; bubble values get one
    /// new node per element.
    pub fn make_field_elem_dim(
        &mut self,
        base: FieldId,
        dim: Option<usize>,
        field_type: FieldType,
        derivatives: Derivatives,
        role: ElSegRole,
    ) -> Result<FieldId> {
        let src = self.field(base)?;
        let mut selected = Vec::new();
        for ei in src.interpolations() {
            let ea = self.elem_array(ei.id_ea)?;
            if dim.map_or(true, |d| ea.elem_type().dimension() == d) {
                selected.push((ei.id_ea, ei.id_es_c_co, ea.size()));
            }
        }
        if selected.is_empty() {
            return Err(Error::NotFound(format!("no element arrays of dimension {dim:?} in {base}")));
        }
        let mut field = Field::new(src.ndim_coord());
        field.corner.id_na_co = src.corner.id_na_co;
        field.corner.id_ns_co = src.corner.id_ns_co;

        match role {
            ElSegRole::Corner => {
                field.corner.id_na_va = field.corner.id_na_co;
                for (id_ea, id_es_co, _) in selected {
                    let mut ei = ElemInterpolation::new(id_ea);
                    ei.id_es_c_co = id_es_co;
                    ei.id_es_c_va = id_es_co;
                    field.interpolations.push(ei);
                }
            }
            ElSegRole::Bubble => {
                let n_bubble: usize = selected.iter().map(|s| s.2).sum();
                let id_na = self.add_node_array(NodeArray::new(n_bubble));
                field.bubble.id_na_va = Some(id_na);
                let mut offset = 0;
                for (id_ea, id_es_co, size) in selected {
                    let nodes: Vec<usize> = (offset..offset + size).collect();
                    offset += size;
                    let id_es = self.elem_array_mut(id_ea)?.add_segment(id_na, ElSegRole::Bubble, nodes)?;
                    let mut ei = ElemInterpolation::new(id_ea);
                    ei.id_es_c_co = id_es_co;
                    ei.id_es_b_va = Some(id_es);
                    field.interpolations.push(ei);
                }
            }
            ElSegRole::Edge => {
                return Err(Error::Unsupported("edge-interpolated fields".into()));
            }
        }
        let id = self.add_field(field);
        self.set_value_type(id, field_type, derivatives)?;
        Ok(id)
    }

    /// New base corner field over the nodes touched by one element array.
    ///
    /// Values live in a compact node array; `map_val2co` leads back to the
    /// coordinate nodes.
    pub fn make_field_elem_array(
        &mut self,
        base: FieldId,
        id_ea: EaId,
        field_type: FieldType,
        derivatives: Derivatives,
    ) -> Result<FieldId> {
        let src = self.field(base)?;
        let id_es_co = src.elem_seg_id(id_ea, ElSegRole::Corner, false, self)?;
        let (ndim, id_na_co, id_ns_co) = (src.ndim_coord(), src.corner.id_na_co, src.corner.id_ns_co);

        let ea = self.elem_array(id_ea)?;
        let map_val2co = ea.unique_nodes(id_es_co)?;
        let mut co2va = HashMap::with_capacity(map_val2co.len());
        for (iva, &ico) in map_val2co.iter().enumerate() {
            co2va.insert(ico, iva);
        }
        let es_co = ea.segment(id_es_co)?;
        let mut nodes = Vec::with_capacity(es_co.n_elements() * es_co.npoel());
        for ielem in 0..es_co.n_elements() {
            for ico in es_co.nodes(ielem) {
                let iva = co2va
                    .get(ico)
                    .ok_or_else(|| Error::Invariant(format!("coordinate node {ico} has no value node")))?;
                nodes.push(*iva);
            }
        }

        let id_na = self.add_node_array(NodeArray::new(map_val2co.len()));
        let id_es_va = self.elem_array_mut(id_ea)?.add_segment(id_na, ElSegRole::Corner, nodes)?;

        let mut field = Field::new(ndim);
        field.corner.id_na_co = id_na_co;
        field.corner.id_ns_co = id_ns_co;
        field.corner.id_na_va = Some(id_na);
        field.map_val2co = map_val2co;
        let mut ei = ElemInterpolation::new(id_ea);
        ei.id_es_c_co = Some(id_es_co);
        ei.id_es_c_va = Some(id_es_va);
        field.interpolations.push(ei);

        let id = self.add_field(field);
        self.set_value_type(id, field_type, derivatives)?;
        Ok(id)
    }

    /// New base field of `size` nodes without elements.
    pub fn make_field_node_array(
        &mut self,
        size: usize,
        field_type: FieldType,
        derivatives: Derivatives,
    ) -> Result<FieldId> {
        let id_na = self.add_node_array(NodeArray::new(size));
        let mut field = Field::new(0);
        field.corner.id_na_va = Some(id_na);
        let id = self.add_field(field);
        self.set_value_type(id, field_type, derivatives)?;
        Ok(id)
    }

    /// Derived field restricted to some element arrays.
    ///
    /// Arrays the parent does not interpolate are bound through their
    /// segments on the parent's corner node arrays.
    pub fn partial_field(&mut self, id_field: FieldId, eas: &[EaId]) -> Result<FieldId> {
        let parent = self.field(id_field)?;
        let mut interpolations = Vec::with_capacity(eas.len());
        for &id_ea in eas {
            if let Some(ei) = parent.interpolation(id_ea) {
                interpolations.push(ei.clone());
                continue;
            }
            let mut ei = ElemInterpolation::new(id_ea);
            ei.id_es_c_co = parent.elem_seg_id(id_ea, ElSegRole::Corner, false, self).ok();
            if parent.corner.id_na_va.is_some() {
                ei.id_es_c_va = Some(parent.elem_seg_id(id_ea, ElSegRole::Corner, true, self)?);
            }
            interpolations.push(ei);
        }
        let mut field = parent.clone();
        field.parent = Some(id_field);
        field.interpolations = interpolations;
        field.is_partial = true;
        field.gradient_source = None;
        field.dof_values = vec![Default::default(); 3 * field.dof_count];
        Ok(self.add_field(field))
    }

    /// Re-check every field's cross-references.
    pub fn validate(&self) -> Result<()> {
        for (i, field) in self.fields.iter().enumerate() {
            field.check(self).map_err(|e| match e {
                Error::Invariant(msg) => Error::Invariant(format!("{}: {msg}", FieldId::from_index(i))),
                other => other,
            })?;
        }
        Ok(())
    }
}
