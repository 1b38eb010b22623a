//! Per-node storage.
//!
//! A [`NodeArray`] holds a fixed number of nodes and any number of named
//! segments. Each segment stores a fixed-width vector of doubles per node
//! (coordinates, values, velocities, accelerations).

use crate::error::{Error, Result};

/// One named per-node data table.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeSegment {
    name: String,
    len: usize,
    values: Vec<f64>,
}

impl NodeSegment {
    fn new(name: &str, len: usize, n_nodes: usize) -> Self {
        Self {
            name: name.to_string(),
            len,
            values: vec![0.0; len * n_nodes],
        }
    }

    /// Segment name, e.g. `VEC3_VAL`.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Doubles stored per node.
    pub fn len(&self) -> usize {
        self.len
    }

    /// True for zero-width segments.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of nodes in this segment.
    pub fn n_nodes(&self) -> usize {
        if self.len == 0 {
            0
        } else {
            self.values.len() / self.len
        }
    }

    /// Values of one node.
    pub fn node(&self, inode: usize) -> &[f64] {
        &self.values[inode * self.len..(inode + 1) * self.len]
    }

    /// Mutable values of one node.
    pub fn node_mut(&mut self, inode: usize) -> &mut [f64] {
        &mut self.values[inode * self.len..(inode + 1) * self.len]
    }

    pub fn value(&self, inode: usize, idof: usize) -> f64 {
        self.values[inode * self.len + idof]
    }

    pub fn set_value(&mut self, inode: usize, idof: usize, value: f64) {
        self.values[inode * self.len + idof] = value;
    }

    pub fn add_value(&mut self, inode: usize, idof: usize, value: f64) {
        self.values[inode * self.len + idof] += value;
    }

    /// Flat storage, node-major.
    pub fn as_slice(&self) -> &[f64] {
        &self.values
    }

    pub fn as_mut_slice(&mut self) -> &mut [f64] {
        &mut self.values
    }

    fn resize(&mut self, n_nodes: usize) {
        self.values.resize(self.len * n_nodes, 0.0);
    }
}

/// Table of nodes with any number of per-node segments.
#[derive(Debug, Clone, Default)]
pub struct NodeArray {
    size: usize,
    segments: Vec<NodeSegment>,
}

impl NodeArray {
    /// Create an array of `size` nodes with no segments.
    pub fn new(size: usize) -> Self {
        Self {
            size,
            segments: Vec::new(),
        }
    }

    /// Number of nodes.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Add a zero-initialized segment, returning its ID within this array.
    pub fn add_segment(&mut self, name: &str, len: usize) -> usize {
        self.segments.push(NodeSegment::new(name, len, self.size));
        self.segments.len() - 1
    }

    /// Add a segment initialized from node-major values.
    pub fn add_segment_with_values(&mut self, name: &str, len: usize, values: Vec<f64>) -> Result<usize> {
        if values.len() != len * self.size {
            return Err(Error::Invariant(format!(
                "segment {name} expects {} values, got {}",
                len * self.size,
                values.len()
            )));
        }
        self.segments.push(NodeSegment {
            name: name.to_string(),
            len,
            values,
        });
        Ok(self.segments.len() - 1)
    }

    pub fn is_segment(&self, id_ns: usize) -> bool {
        id_ns < self.segments.len()
    }

    pub fn segment(&self, id_ns: usize) -> Result<&NodeSegment> {
        self.segments
            .get(id_ns)
            .ok_or_else(|| Error::NotFound(format!("node segment {id_ns}")))
    }

    pub fn segment_mut(&mut self, id_ns: usize) -> Result<&mut NodeSegment> {
        self.segments
            .get_mut(id_ns)
            .ok_or_else(|| Error::NotFound(format!("node segment {id_ns}")))
    }

    /// First segment with the given name.
    pub fn find_segment(&self, name: &str) -> Option<usize> {
        self.segments.iter().position(|s| s.name == name)
    }

    pub fn n_segments(&self) -> usize {
        self.segments.len()
    }

    /// Change the node count; new nodes are zero in every segment.
    pub fn resize(&mut self, size: usize) {
        self.size = size;
        for seg in &mut self.segments {
            seg.resize(size);
        }
    }
}
