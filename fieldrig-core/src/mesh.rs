//! Mesh input for the field world.
//!
//! Stores nodal coordinates and groups of elements tagged with the CAD
//! entity they were generated from. The world turns each group into one
//! element array.

use crate::error::{Error, Result};
use crate::types::{EaId, Point3};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Supported element types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ElementType {
    /// 2-node line.
    Line2,
    /// 3-node triangle.
    Tri3,
    /// 4-node quadrilateral.
    Quad4,
    /// 4-node tetrahedron.
    Tet4,
    /// 8-node hexahedron.
    Hex8,
}

impl ElementType {
    /// Number of corner nodes for this element type.
    pub fn n_nodes(self) -> usize {
        match self {
            ElementType::Line2 => 2,
            ElementType::Tri3 => 3,
            ElementType::Quad4 => 4,
            ElementType::Tet4 => 4,
            ElementType::Hex8 => 8,
        }
    }

    /// Topological dimension.
    pub fn dimension(self) -> usize {
        match self {
            ElementType::Line2 => 1,
            ElementType::Tri3 | ElementType::Quad4 => 2,
            ElementType::Tet4 | ElementType::Hex8 => 3,
        }
    }

    /// Number of edges.
    pub fn n_edges(self) -> usize {
        match self {
            ElementType::Line2 => 1,
            ElementType::Tri3 => 3,
            ElementType::Quad4 => 4,
            ElementType::Tet4 => 6,
            ElementType::Hex8 => 12,
        }
    }
}

/// Topological CAD entity a group of elements was meshed from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CadEntity {
    Vertex(usize),
    Edge(usize),
    Face(usize),
    Solid(usize),
}

/// Elements of a single type generated from one CAD entity.
#[derive(Debug, Clone, PartialEq)]
pub struct ElementGroup {
    /// Element type identifier.
    pub element_type: ElementType,
    /// Source CAD entity, if any.
    pub cad: Option<CadEntity>,
    /// Node indices (0-based), `n_nodes()` per element.
    pub connectivity: Vec<usize>,
}

impl ElementGroup {
    /// Number of elements in this group.
    pub fn n_elements(&self) -> usize {
        self.connectivity.len() / self.element_type.n_nodes()
    }

    /// Node indices of one element.
    pub fn element(&self, ielem: usize) -> &[usize] {
        let n = self.element_type.n_nodes();
        &self.connectivity[ielem * n..(ielem + 1) * n]
    }
}

/// Finite element mesh.
#[derive(Debug, Clone)]
pub struct Mesh {
    /// Spatial dimension of the coordinates (2 or 3).
    dim: usize,
    /// Nodal coordinates; z is ignored for 2D meshes.
    nodes: Vec<Point3>,
    /// Element groups.
    groups: Vec<ElementGroup>,
}

impl Mesh {
    /// Create an empty mesh with 2D or 3D coordinates.
    pub fn new(dim: usize) -> Result<Self> {
        if dim != 2 && dim != 3 {
            return Err(Error::Mesh(format!("coordinate dimension must be 2 or 3, got {dim}")));
        }
        Ok(Self {
            dim,
            nodes: Vec::new(),
            groups: Vec::new(),
        })
    }

    /// Add a node to the mesh, returning its index.
    pub fn add_node(&mut self, point: Point3) -> usize {
        let idx = self.nodes.len();
        self.nodes.push(point);
        idx
    }

    /// Add multiple nodes at once.
    pub fn add_nodes(&mut self, points: impl IntoIterator<Item = Point3>) {
        self.nodes.extend(points);
    }

    /// Add an empty element group, returning its index.
    pub fn add_group(&mut self, element_type: ElementType, cad: Option<CadEntity>) -> usize {
        self.groups.push(ElementGroup {
            element_type,
            cad,
            connectivity: Vec::new(),
        });
        self.groups.len() - 1
    }

    /// Add an element to a group.
    pub fn add_element(&mut self, group: usize, nodes: &[usize]) -> Result<usize> {
        let n_nodes = self.nodes.len();
        let grp = self
            .groups
            .get_mut(group)
            .ok_or_else(|| Error::Mesh(format!("element group {group} does not exist")))?;

        // Validate node count
        if nodes.len() != grp.element_type.n_nodes() {
            return Err(Error::Mesh(format!(
                "Element type {:?} requires {} nodes, got {}",
                grp.element_type,
                grp.element_type.n_nodes(),
                nodes.len()
            )));
        }

        // Validate node indices
        for &node_idx in nodes {
            if node_idx >= n_nodes {
                return Err(Error::Mesh(format!(
                    "Node index {} out of bounds (mesh has {} nodes)",
                    node_idx, n_nodes
                )));
            }
        }

        let idx = grp.n_elements();
        grp.connectivity.extend_from_slice(nodes);
        Ok(idx)
    }

    /// Coordinate dimension.
    pub fn dim(&self) -> usize {
        self.dim
    }

    /// Number of nodes in the mesh.
    pub fn n_nodes(&self) -> usize {
        self.nodes.len()
    }

    /// Get nodal coordinates.
    pub fn nodes(&self) -> &[Point3] {
        &self.nodes
    }

    pub fn groups(&self) -> &[ElementGroup] {
        &self.groups
    }

    /// Compute mesh bounding box.
    pub fn bounds(&self) -> Option<(Point3, Point3)> {
        let first = self.nodes.first()?;
        let mut min = *first;
        let mut max = *first;

        for node in &self.nodes[1..] {
            for i in 0..3 {
                min[i] = min[i].min(node[i]);
                max[i] = max[i].max(node[i]);
            }
        }

        Some((min, max))
    }
}

/// Maps CAD entities to the element arrays created from them.
#[derive(Debug, Clone, Default)]
pub struct IdConverter {
    to_ea: HashMap<CadEntity, EaId>,
    to_cad: HashMap<EaId, CadEntity>,
}

impl IdConverter {
    pub(crate) fn insert(&mut self, cad: CadEntity, id_ea: EaId) {
        self.to_ea.insert(cad, id_ea);
        self.to_cad.insert(id_ea, cad);
    }

    /// Element array generated from a CAD entity.
    pub fn ea_id(&self, cad: CadEntity) -> Option<EaId> {
        self.to_ea.get(&cad).copied()
    }

    /// CAD entity an element array was generated from.
    pub fn cad_entity(&self, id_ea: EaId) -> Option<CadEntity> {
        self.to_cad.get(&id_ea).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::Vector3;

    #[test]
    fn test_mesh_creation() {
        let mut mesh = Mesh::new(3).unwrap();

        mesh.add_node(Vector3::new(0.0, 0.0, 0.0));
        mesh.add_node(Vector3::new(1.0, 0.0, 0.0));
        mesh.add_node(Vector3::new(0.0, 1.0, 0.0));
        mesh.add_node(Vector3::new(0.0, 0.0, 1.0));
        assert_eq!(mesh.n_nodes(), 4);

        let g = mesh.add_group(ElementType::Tet4, Some(CadEntity::Solid(1)));
        mesh.add_element(g, &[0, 1, 2, 3]).unwrap();
        assert_eq!(mesh.groups()[g].n_elements(), 1);
        assert_eq!(mesh.groups()[g].element(0), &[0, 1, 2, 3]);
    }

    #[test]
    fn test_invalid_element_node_count() {
        let mut mesh = Mesh::new(2).unwrap();
        mesh.add_node(Vector3::new(0.0, 0.0, 0.0));
        mesh.add_node(Vector3::new(1.0, 0.0, 0.0));
        mesh.add_node(Vector3::new(0.0, 1.0, 0.0));

        let g = mesh.add_group(ElementType::Tet4, None);
        assert!(mesh.add_element(g, &[0, 1, 2]).is_err());
    }

    #[test]
    fn test_invalid_node_index() {
        let mut mesh = Mesh::new(2).unwrap();
        mesh.add_node(Vector3::new(0.0, 0.0, 0.0));

        let g = mesh.add_group(ElementType::Tri3, None);
        assert!(mesh.add_element(g, &[0, 1, 2]).is_err());
        assert!(mesh.add_element(g + 1, &[0, 0, 0]).is_err());
    }

    #[test]
    fn test_invalid_dimension() {
        assert!(Mesh::new(1).is_err());
    }

    #[test]
    fn test_bounds() {
        let mut mesh = Mesh::new(3).unwrap();
        mesh.add_node(Vector3::new(-1.0, -2.0, -3.0));
        mesh.add_node(Vector3::new(1.0, 2.0, 3.0));
        mesh.add_node(Vector3::new(0.0, 0.0, 0.0));

        let (min, max) = mesh.bounds().unwrap();
        assert_eq!(min, Vector3::new(-1.0, -2.0, -3.0));
        assert_eq!(max, Vector3::new(1.0, 2.0, 3.0));
    }

    #[test]
    fn test_id_converter() {
        let mut conv = IdConverter::default();
        let ea = EaId::from_index(3);
        conv.insert(CadEntity::Face(2), ea);
        assert_eq!(conv.ea_id(CadEntity::Face(2)), Some(ea));
        assert_eq!(conv.cad_entity(ea), Some(CadEntity::Face(2)));
        assert_eq!(conv.ea_id(CadEntity::Edge(2)), None);
    }
}
