//! Value types and value assignment.
//!
//! A value can be written once or saved on the field as a
//! [`ValueFieldDof`] so that [`FieldWorld::execute_values`] re-applies it at
//! every new time.

use super::FieldWorld;
use crate::error::{Error, Result};
use crate::expr::{Env, Expression, ParsedExpression};
use crate::field::{Field, ValueFieldDof};
use crate::types::{Derivatives, ElSegRole, FieldId, FieldType, NaId};
use std::sync::Arc;

/// Nodes of one value segment that an assignment writes.
struct ValueTarget {
    id_na: NaId,
    id_ns: usize,
    nodes: Vec<usize>,
    /// Evaluation point per node; empty for constants.
    coords: Vec<[f64; 3]>,
}

fn pad3(co: &[f64]) -> [f64; 3] {
    std::array::from_fn(|k| co.get(k).copied().unwrap_or(0.0))
}

impl FieldWorld {
    /// Allocate value segments on a base field.
    ///
    /// One segment per requested derivative is added to each node array the
    /// field stores values in. Saved values are reset.
    pub fn set_value_type(&mut self, id_field: FieldId, field_type: FieldType, derivatives: Derivatives) -> Result<()> {
        let field = self.field(id_field)?;
        if !field.is_base() {
            return Err(Error::Unsupported(format!(
                "{id_field} is derived; its value type comes from its parent"
            )));
        }
        let roles: Vec<(ElSegRole, NaId)> = [ElSegRole::Corner, ElSegRole::Bubble, ElSegRole::Edge]
            .into_iter()
            .filter_map(|role| field.node_seg_index(role).id_na_va.map(|na| (role, na)))
            .collect();

        let dof = field_type.dof_count();
        let mut assigned = Vec::new();
        for (role, id_na) in roles {
            let na = self.node_array_mut(id_na)?;
            for d in Derivatives::PRIORITY {
                let id_ns = (dof > 0 && derivatives.contains(d)).then(|| na.add_segment(&field_type.segment_label(d), dof));
                assigned.push((role, d, id_ns));
            }
        }

        let field = self.field_mut(id_field)?;
        for (role, d, id_ns) in assigned {
            field.node_seg_index_mut(role).set_value_segment(d, id_ns);
        }
        field.field_type = field_type;
        field.derivatives = derivatives;
        field.dof_count = dof;
        field.dof_values = vec![ValueFieldDof::Unset; 3 * dof];
        field.gradient_source = None;
        Ok(())
    }

    /// Write a constant into one dof of every node the field reaches.
    pub fn set_value(
        &mut self,
        id_field: FieldId,
        value: f64,
        idof: usize,
        derivative: Derivatives,
        save: bool,
    ) -> Result<()> {
        let targets = self.value_targets(id_field, idof, derivative, false)?;
        for t in &targets {
            let seg = self.node_array_mut(t.id_na)?.segment_mut(t.id_ns)?;
            for &inode in &t.nodes {
                seg.set_value(inode, idof, value);
            }
        }
        if save {
            self.save_dof_value(id_field, idof, derivative, ValueFieldDof::Constant(value))?;
        }
        Ok(())
    }

    /// Parse `src` and assign it with [`set_value_with`](Self::set_value_with).
    pub fn set_value_expr(
        &mut self,
        id_field: FieldId,
        src: &str,
        idof: usize,
        derivative: Derivatives,
        t: f64,
        save: bool,
    ) -> Result<()> {
        let expr = ParsedExpression::parse(src)?;
        self.set_value_with(id_field, Arc::new(expr), idof, derivative, t, save)
    }

    /// Evaluate an expression of `x, y, z, t` into one dof.
    ///
    /// Corner nodes are evaluated at their coordinates, bubble nodes at the
    /// centroid of their element.
    pub fn set_value_with(
        &mut self,
        id_field: FieldId,
        expr: Arc<dyn Expression>,
        idof: usize,
        derivative: Derivatives,
        t: f64,
        save: bool,
    ) -> Result<()> {
        if expr.uses_position() {
            let targets = self.value_targets(id_field, idof, derivative, true)?;
            for tg in &targets {
                let seg = self.node_array_mut(tg.id_na)?.segment_mut(tg.id_ns)?;
                for (&inode, co) in tg.nodes.iter().zip(&tg.coords) {
                    seg.set_value(inode, idof, expr.eval(&Env::at(co, t)));
                }
            }
        } else {
            self.set_value(id_field, expr.eval(&Env::time(t)), idof, derivative, false)?;
        }
        if save {
            self.save_dof_value(id_field, idof, derivative, ValueFieldDof::Expression(expr))?;
        }
        Ok(())
    }

    /// Re-apply the saved values of one field at time `t`.
    ///
    /// Gradient fields are recomputed from their source instead.
    pub fn execute_value(&mut self, id_field: FieldId, t: f64) -> Result<()> {
        let field = self.field(id_field)?;
        if let Some(source) = field.gradient_source() {
            return self.set_gradient_value(id_field, source);
        }
        let dof = field.dof_count();
        let saved = field.dof_values.clone();
        for (k, v) in saved.into_iter().enumerate() {
            let derivative = Derivatives::PRIORITY[k / dof];
            match v {
                ValueFieldDof::Unset => {}
                ValueFieldDof::Constant(value) => self.set_value(id_field, value, k % dof, derivative, false)?,
                ValueFieldDof::Expression(expr) => {
                    self.set_value_with(id_field, expr, k % dof, derivative, t, false)?
                }
            }
        }
        Ok(())
    }

    /// Re-apply saved values of every field, in creation order.
    pub fn execute_values(&mut self, t: f64) -> Result<()> {
        let ids: Vec<FieldId> = self.field_ids().collect();
        for id in ids {
            self.execute_value(id, t)?;
        }
        Ok(())
    }

    fn save_dof_value(&mut self, id_field: FieldId, idof: usize, derivative: Derivatives, v: ValueFieldDof) -> Result<()> {
        let field = self.field_mut(id_field)?;
        let slot = derivative
            .slot()
            .ok_or_else(|| Error::Invariant(format!("{derivative:?} is not a single derivative")))?;
        let k = slot * field.dof_count + idof;
        field.dof_values[k] = v;
        Ok(())
    }

    fn value_targets(
        &self,
        id_field: FieldId,
        idof: usize,
        derivative: Derivatives,
        with_coords: bool,
    ) -> Result<Vec<ValueTarget>> {
        let field = self.field(id_field)?;
        if idof >= field.dof_count() {
            return Err(Error::NotFound(format!(
                "dof {idof} of {id_field} ({} dofs)",
                field.dof_count()
            )));
        }
        if derivative.slot().is_none() {
            return Err(Error::Invariant(format!("{derivative:?} is not a single derivative")));
        }
        let mut targets = Vec::new();
        for role in [ElSegRole::Corner, ElSegRole::Bubble] {
            let idx = field.node_seg_index(role);
            let (Some(id_na), Some(id_ns)) = (idx.id_na_va, idx.value_segment(derivative)) else {
                continue;
            };
            let (nodes, coords) = match (with_coords, role) {
                (false, _) => (field.target_nodes(role, self)?, Vec::new()),
                (true, ElSegRole::Corner) => self.corner_points(field, id_na)?,
                (true, _) => self.bubble_points(field)?,
            };
            targets.push(ValueTarget {
                id_na,
                id_ns,
                nodes,
                coords,
            });
        }
        if targets.is_empty() {
            return Err(Error::NotFound(format!("{id_field} stores no {derivative:?} values")));
        }
        Ok(targets)
    }

    fn corner_points(&self, field: &Field, id_na_va: NaId) -> Result<(Vec<usize>, Vec<[f64; 3]>)> {
        let coords = field
            .coordinates(self)
            .map_err(|_| Error::Unsupported("position expression on a field without coordinates".into()))?;
        if !field.is_partial() {
            let n = self.node_array(id_na_va)?.size();
            let points = (0..n).map(|i| pad3(coords.node(field.map_val2co(i)))).collect();
            return Ok(((0..n).collect(), points));
        }
        // only nodes reached through the field's own elements
        let mut seen = vec![false; self.node_array(id_na_va)?.size()];
        let (mut nodes, mut points) = (Vec::new(), Vec::new());
        for ei in field.interpolations() {
            let es_va = field.elem_seg(ei.id_ea, ElSegRole::Corner, true, self)?;
            let es_co = field.elem_seg(ei.id_ea, ElSegRole::Corner, false, self)?;
            for ielem in 0..es_va.n_elements() {
                for (&iva, &ico) in es_va.nodes(ielem).iter().zip(es_co.nodes(ielem)) {
                    if !seen[iva] {
                        seen[iva] = true;
                        nodes.push(iva);
                        points.push(pad3(coords.node(ico)));
                    }
                }
            }
        }
        Ok((nodes, points))
    }

    fn bubble_points(&self, field: &Field) -> Result<(Vec<usize>, Vec<[f64; 3]>)> {
        let coords = field.coordinates(self)?;
        let (mut nodes, mut points) = (Vec::new(), Vec::new());
        for ei in field.interpolations() {
            let Some(id_es_b) = ei.id_es_b_va else { continue };
            let es_b = self.elem_array(ei.id_ea)?.segment(id_es_b)?;
            let es_co = field.elem_seg(ei.id_ea, ElSegRole::Corner, false, self)?;
            for ielem in 0..es_b.n_elements() {
                let corners = es_co.nodes(ielem);
                let mut c = [0.0; 3];
                for &ico in corners {
                    let p = pad3(coords.node(ico));
                    for k in 0..3 {
                        c[k] += p[k] / corners.len() as f64;
                    }
                }
                nodes.push(es_b.nodes(ielem)[0]);
                points.push(c);
            }
        }
        Ok((nodes, points))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::{CadEntity, ElementType, Mesh};
    use approx::assert_relative_eq;
    use nalgebra::Vector3;

    /// Unit square of two triangles plus a bottom edge group.
    fn setup(role: ElSegRole) -> (FieldWorld, FieldId, FieldId) {
        let mut mesh = Mesh::new(2).unwrap();
        mesh.add_nodes([
            Vector3::new(0.0, 0.0, 0.0),
            Vector3::new(1.0, 0.0, 0.0),
            Vector3::new(1.0, 1.0, 0.0),
            Vector3::new(0.0, 1.0, 0.0),
        ]);
        let g = mesh.add_group(ElementType::Tri3, Some(CadEntity::Face(0)));
        mesh.add_element(g, &[0, 1, 2]).unwrap();
        mesh.add_element(g, &[0, 2, 3]).unwrap();
        let e = mesh.add_group(ElementType::Line2, Some(CadEntity::Edge(0)));
        mesh.add_element(e, &[0, 1]).unwrap();

        let mut world = FieldWorld::new();
        let base = world.add_mesh(&mesh).unwrap();
        let id = world
            .make_field_elem_dim(base, Some(2), FieldType::Vector2, Derivatives::DYNAMIC, role)
            .unwrap();
        (world, base, id)
    }

    fn values(world: &FieldWorld, id: FieldId, role: ElSegRole, derivative: Derivatives) -> Vec<f64> {
        let seg = world
            .field(id)
            .unwrap()
            .node_seg(role, true, world, derivative)
            .unwrap();
        (0..seg.n_nodes()).map(|i| seg.value(i, 1)).collect()
    }

    #[test]
    fn test_constant_on_every_node() {
        let (mut world, _, id) = setup(ElSegRole::Corner);
        world.set_value(id, 2.5, 1, Derivatives::VELOCITY, false).unwrap();
        assert_eq!(values(&world, id, ElSegRole::Corner, Derivatives::VELOCITY), vec![2.5; 4]);
        assert_eq!(values(&world, id, ElSegRole::Corner, Derivatives::VALUE), vec![0.0; 4]);
    }

    #[test]
    fn test_constant_on_partial_field() {
        let (mut world, base, id) = setup(ElSegRole::Corner);
        let id_edge = world.id_converter(base).unwrap().ea_id(CadEntity::Edge(0)).unwrap();
        let part = world.partial_field(id, &[id_edge]).unwrap();
        world.set_value(part, -1.0, 1, Derivatives::VALUE, false).unwrap();
        assert_eq!(values(&world, id, ElSegRole::Corner, Derivatives::VALUE), vec![-1.0, -1.0, 0.0, 0.0]);
    }

    #[test]
    fn test_position_expression() {
        let (mut world, base, id) = setup(ElSegRole::Corner);
        world
            .set_value_expr(id, "x + 2*y + t", 1, Derivatives::VALUE, 0.5, false)
            .unwrap();
        assert_eq!(values(&world, id, ElSegRole::Corner, Derivatives::VALUE), vec![0.5, 1.5, 3.5, 2.5]);

        let id_edge = world.id_converter(base).unwrap().ea_id(CadEntity::Edge(0)).unwrap();
        let part = world.partial_field(id, &[id_edge]).unwrap();
        world.set_value_expr(part, "10*x", 1, Derivatives::VALUE, 0.0, false).unwrap();
        assert_eq!(values(&world, id, ElSegRole::Corner, Derivatives::VALUE), vec![0.0, 10.0, 3.5, 2.5]);
    }

    #[test]
    fn test_bubble_expression_at_centroid() {
        let (mut world, _, id) = setup(ElSegRole::Bubble);
        world.set_value_expr(id, "3*x", 1, Derivatives::VALUE, 0.0, false).unwrap();
        let v = values(&world, id, ElSegRole::Bubble, Derivatives::VALUE);
        assert_relative_eq!(v[0], 2.0, epsilon = 1e-14);
        assert_relative_eq!(v[1], 1.0, epsilon = 1e-14);
    }

    #[test]
    fn test_saved_values_are_reexecuted() {
        let (mut world, _, id) = setup(ElSegRole::Corner);
        world.set_value_expr(id, "sin(t)", 1, Derivatives::VALUE, 0.0, true).unwrap();
        world.set_value(id, 4.0, 1, Derivatives::ACCELERATION, true).unwrap();
        world.set_value(id, 0.0, 1, Derivatives::ACCELERATION, false).unwrap();

        world.execute_values(std::f64::consts::FRAC_PI_2).unwrap();
        assert_eq!(values(&world, id, ElSegRole::Corner, Derivatives::VALUE), vec![1.0; 4]);
        assert_eq!(values(&world, id, ElSegRole::Corner, Derivatives::ACCELERATION), vec![4.0; 4]);
        assert!(matches!(
            world.field(id).unwrap().dof_value(1, Derivatives::VALUE),
            Some(ValueFieldDof::Expression(_))
        ));
    }

    #[test]
    fn test_assignment_errors() {
        let (mut world, base, id) = setup(ElSegRole::Corner);
        assert!(matches!(
            world.set_value_expr(id, "x +", 0, Derivatives::VALUE, 0.0, false),
            Err(Error::Expression(_))
        ));
        assert!(world.set_value(id, 1.0, 2, Derivatives::VALUE, false).is_err());
        assert!(world.set_value(id, 1.0, 0, Derivatives::DYNAMIC, false).is_err());

        let id_edge = world.id_converter(base).unwrap().ea_id(CadEntity::Edge(0)).unwrap();
        let part = world.partial_field(id, &[id_edge]).unwrap();
        assert!(matches!(
            world.set_value_type(part, FieldType::Scalar, Derivatives::VALUE),
            Err(Error::Unsupported(_))
        ));
    }

    #[test]
    fn test_missing_derivative() {
        let mut world = FieldWorld::new();
        let id = world
            .make_field_node_array(3, FieldType::Scalar, Derivatives::VALUE)
            .unwrap();
        assert!(matches!(
            world.set_value(id, 1.0, 0, Derivatives::VELOCITY, false),
            Err(Error::NotFound(_))
        ));
        world.set_value(id, 1.0, 0, Derivatives::VALUE, false).unwrap();
        let (lo, hi) = world
            .field(id)
            .unwrap()
            .min_max_value(0, &world, Derivatives::VALUE)
            .unwrap();
        assert_eq!((lo, hi), (1.0, 1.0));
    }
}
