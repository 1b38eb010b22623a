//! Per-element connectivity storage.
//!
//! An [`ElementArray`] has a single element type and any number of
//! connectivity segments. Each segment maps every element to a fixed-size
//! tuple of node indices in one node array (its `id_na`).

use crate::error::{Error, Result};
use crate::mesh::ElementType;
use crate::types::{ElSegRole, NaId};

/// Connectivity of every element into one node array.
#[derive(Debug, Clone, PartialEq)]
pub struct ElemSegment {
    id_na: NaId,
    role: ElSegRole,
    npoel: usize,
    nodes: Vec<usize>,
}

impl ElemSegment {
    /// Node array the indices point into.
    pub fn id_na(&self) -> NaId {
        self.id_na
    }

    pub fn role(&self) -> ElSegRole {
        self.role
    }

    /// Nodes per element.
    pub fn npoel(&self) -> usize {
        self.npoel
    }

    /// Number of elements.
    pub fn n_elements(&self) -> usize {
        if self.npoel == 0 {
            0
        } else {
            self.nodes.len() / self.npoel
        }
    }

    /// Node indices of one element.
    pub fn nodes(&self, ielem: usize) -> &[usize] {
        &self.nodes[ielem * self.npoel..(ielem + 1) * self.npoel]
    }

    /// Largest node index referenced, if any element exists.
    pub fn max_node_index(&self) -> Option<usize> {
        self.nodes.iter().copied().max()
    }
}

/// Elements of one type with their connectivity segments.
#[derive(Debug, Clone)]
pub struct ElementArray {
    elem_type: ElementType,
    size: usize,
    segments: Vec<ElemSegment>,
}

impl ElementArray {
    /// Create an array of `size` elements with no segments.
    pub fn new(elem_type: ElementType, size: usize) -> Self {
        Self {
            elem_type,
            size,
            segments: Vec::new(),
        }
    }

    pub fn elem_type(&self) -> ElementType {
        self.elem_type
    }

    /// Number of elements.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Nodes per element expected for a role.
    pub fn npoel(&self, role: ElSegRole) -> usize {
        match role {
            ElSegRole::Corner => self.elem_type.n_nodes(),
            ElSegRole::Bubble => 1,
            ElSegRole::Edge => self.elem_type.n_edges(),
        }
    }

    /// Add a connectivity segment, returning its ID within this array.
    pub fn add_segment(&mut self, id_na: NaId, role: ElSegRole, nodes: Vec<usize>) -> Result<usize> {
        let npoel = self.npoel(role);
        if nodes.len() != npoel * self.size {
            return Err(Error::Invariant(format!(
                "{role:?} segment of {} {:?} elements needs {} indices, got {}",
                self.size,
                self.elem_type,
                npoel * self.size,
                nodes.len()
            )));
        }
        self.segments.push(ElemSegment {
            id_na,
            role,
            npoel,
            nodes,
        });
        Ok(self.segments.len() - 1)
    }

    pub fn is_segment(&self, id_es: usize) -> bool {
        id_es < self.segments.len()
    }

    pub fn segment(&self, id_es: usize) -> Result<&ElemSegment> {
        self.segments
            .get(id_es)
            .ok_or_else(|| Error::NotFound(format!("element segment {id_es}")))
    }

    /// All segments in creation order.
    pub fn segments(&self) -> &[ElemSegment] {
        &self.segments
    }

    /// Distinct node indices of a segment, sorted.
    pub fn unique_nodes(&self, id_es: usize) -> Result<Vec<usize>> {
        let seg = self.segment(id_es)?;
        let mut nodes = seg.nodes.clone();
        nodes.sort_unstable();
        nodes.dedup();
        Ok(nodes)
    }
}
