//! Per-element gradient fields.
//!
//! The gradient of the first component of a linear corner field is
//! evaluated once per element and stored in the element's bubble node of a
//! constant field on the same element array. The stored vector is the
//! direction of the gradient scaled to length 5.

use super::FieldWorld;
use crate::element::{Hex8, Tet4, Tri3};
use crate::error::{Error, Result};
use crate::field::InterpolationType;
use crate::types::{Derivatives, ElSegRole, FieldId, Point3};
use rayon::prelude::*;

/// Gradient magnitude divided by this factor is the normalizing length.
const GRADIENT_SCALE: f64 = 0.2;

impl FieldWorld {
    /// Compute the gradient of `source` into `target` and, if `save`, keep
    /// it up to date on every [`execute_value`](Self::execute_value).
    pub fn set_gradient(&mut self, target: FieldId, source: FieldId, save: bool) -> Result<()> {
        self.set_gradient_value(target, source)?;
        if save {
            self.field_mut(target)?.gradient_source = Some(source);
        }
        Ok(())
    }

    /// Compute the normalized gradient of `source` into `target`.
    ///
    /// Supported pairs are linear triangle, tetrahedron and hexahedron
    /// sources with a constant target, both on the same single element
    /// array.
    pub fn set_gradient_value(&mut self, target: FieldId, source: FieldId) -> Result<()> {
        let tgt = self.field(target)?;
        let src = self.field(source)?;
        let [ei] = tgt.interpolations() else {
            return Err(Error::Unsupported(format!(
                "gradient target {target} must interpolate exactly one element array"
            )));
        };
        let id_ea = ei.id_ea;
        if !matches!(src.interpolations(), [src_ei] if src_ei.id_ea == id_ea) {
            return Err(Error::Unsupported(format!(
                "gradient source {source} must interpolate exactly the element array {id_ea} of {target}"
            )));
        }
        let pair = (src.interpolation_type(id_ea, self)?, tgt.interpolation_type(id_ea, self)?);
        let (nnoes, ndim) = match pair {
            (InterpolationType::TriLinear, InterpolationType::TriConstant) => (3, 2),
            (InterpolationType::TetLinear, InterpolationType::TetConstant) => (4, 3),
            (InterpolationType::HexLinear, InterpolationType::HexConstant) => (8, 3),
            (from, to) => {
                return Err(Error::Unsupported(format!("gradient from {from:?} into {to:?}")));
            }
        };
        if src.ndim_coord() < ndim {
            return Err(Error::Invariant(format!(
                "{ndim}D gradient over {}D coordinates",
                src.ndim_coord()
            )));
        }

        let coords = src.coordinates(self)?;
        let values = src.node_seg(ElSegRole::Corner, true, self, Derivatives::VALUE)?;
        let es_co = src.elem_seg(id_ea, ElSegRole::Corner, false, self)?;
        let es_va = src.elem_seg(id_ea, ElSegRole::Corner, true, self)?;
        let es_b = tgt.elem_seg(id_ea, ElSegRole::Bubble, true, self)?;
        let (id_na_b, id_ns_b) = tgt.node_seg_id(ElSegRole::Bubble, true, Derivatives::VALUE)?;
        let ncomp = ndim.min(tgt.dof_count());

        let grads: Vec<(usize, [f64; 3])> = (0..es_co.n_elements())
            .into_par_iter()
            .map(|ielem| {
                let no_co = es_co.nodes(ielem);
                let value: Vec<f64> = es_va.nodes(ielem).iter().map(|&i| values.value(i, 0)).collect();
                let mut grad = [0.0; 3];
                match nnoes {
                    3 => {
                        let co: [[f64; 2]; 3] = std::array::from_fn(|k| {
                            let p = coords.node(no_co[k]);
                            [p[0], p[1]]
                        });
                        let (dldx, _) = Tri3::shape_gradients(&co)?;
                        for k in 0..3 {
                            grad[0] += value[k] * dldx[k][0];
                            grad[1] += value[k] * dldx[k][1];
                        }
                    }
                    4 => {
                        let co: [Point3; 4] = std::array::from_fn(|k| Point3::from_column_slice(coords.node(no_co[k])));
                        let (dndx, _) = Tet4::shape_gradients(&co)?;
                        for k in 0..4 {
                            for d in 0..3 {
                                grad[d] += value[k] * dndx[k][d];
                            }
                        }
                    }
                    _ => {
                        let co: [Point3; 8] = std::array::from_fn(|k| Point3::from_column_slice(coords.node(no_co[k])));
                        let (dndx, _) = Hex8::shape_gradients(&co, 0.0, 0.0, 0.0)?;
                        for k in 0..8 {
                            for d in 0..3 {
                                grad[d] += value[k] * dndx[k][d];
                            }
                        }
                    }
                }
                let norm = (grad[0] * grad[0] + grad[1] * grad[1] + grad[2] * grad[2]).sqrt() * GRADIENT_SCALE;
                if norm > 0.0 {
                    grad.iter_mut().for_each(|g| *g /= norm);
                }
                Ok((es_b.nodes(ielem)[0], grad))
            })
            .collect::<Result<_>>()?;

        let seg = self.node_array_mut(id_na_b)?.segment_mut(id_ns_b)?;
        for (inode, grad) in grads {
            for (d, g) in grad.iter().enumerate().take(ncomp) {
                seg.set_value(inode, d, *g);
            }
        }
        log::trace!("gradient of {source} written into {target} ({pair:?})");
        Ok(())
    }
}
