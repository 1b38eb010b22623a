//! Field data model through the public API: value assignment, queries,
//! gradients and INP export.

use approx::assert_relative_eq;
use fieldrig_core::mesh::CadEntity;
use fieldrig_core::{
    write_inp, Derivatives, ElSegRole, ElementType, FieldId, FieldType, FieldWorld, InpData, Mesh, Point3,
};

/// Unit square split into two triangles, with the diagonal edge as a line group.
fn square_2d() -> (FieldWorld, FieldId) {
    let mut mesh = Mesh::new(2).unwrap();
    mesh.add_nodes([
        Point3::new(0.0, 0.0, 0.0),
        Point3::new(1.0, 0.0, 0.0),
        Point3::new(1.0, 1.0, 0.0),
        Point3::new(0.0, 1.0, 0.0),
    ]);
    let tri = mesh.add_group(ElementType::Tri3, Some(CadEntity::Face(1)));
    mesh.add_element(tri, &[0, 1, 2]).unwrap();
    mesh.add_element(tri, &[0, 2, 3]).unwrap();
    let bottom = mesh.add_group(ElementType::Line2, Some(CadEntity::Edge(1)));
    mesh.add_element(bottom, &[0, 1]).unwrap();
    let mut world = FieldWorld::new();
    let base = world.add_mesh(&mesh).unwrap();
    (world, base)
}

/// 2×1×1 block of two hexahedra.
fn two_hexes() -> (FieldWorld, FieldId) {
    let mut mesh = Mesh::new(3).unwrap();
    for z in [0.0, 1.0] {
        for y in [0.0, 1.0] {
            for x in [0.0, 1.0, 2.0] {
                mesh.add_node(Point3::new(x, y, z));
            }
        }
    }
    // node (ix, iy, iz) = ix + 3 iy + 6 iz
    let g = mesh.add_group(ElementType::Hex8, None);
    mesh.add_element(g, &[0, 1, 4, 3, 6, 7, 10, 9]).unwrap();
    mesh.add_element(g, &[1, 2, 5, 4, 7, 8, 11, 10]).unwrap();
    let mut world = FieldWorld::new();
    let base = world.add_mesh(&mesh).unwrap();
    (world, base)
}

#[test]
fn test_min_max_of_negative_field() {
    let (mut world, base) = square_2d();
    let id = world
        .make_field_elem_dim(base, Some(2), FieldType::Scalar, Derivatives::VALUE, ElSegRole::Corner)
        .unwrap();
    world.set_value_expr(id, "-1 - x - 2*y", 0, Derivatives::VALUE, 0.0, false).unwrap();
    let (lo, hi) = world.field(id).unwrap().min_max_value(0, &world, Derivatives::VALUE).unwrap();
    assert_relative_eq!(lo, -4.0);
    assert_relative_eq!(hi, -1.0);
}

#[test]
fn test_partial_field_through_id_converter() {
    let (mut world, base) = square_2d();
    let id = world
        .make_field_elem_dim(base, None, FieldType::Scalar, Derivatives::VALUE, ElSegRole::Corner)
        .unwrap();
    let edge = world
        .id_converter(base)
        .and_then(|c| c.ea_id(CadEntity::Edge(1)))
        .unwrap();
    let part = world.partial_field(id, &[edge]).unwrap();
    world.set_value(id, 1.0, 0, Derivatives::VALUE, false).unwrap();
    world.set_value(part, 5.0, 0, Derivatives::VALUE, false).unwrap();

    let field = world.field(id).unwrap();
    let seg = field.node_seg(ElSegRole::Corner, true, &world, Derivatives::VALUE).unwrap();
    let values: Vec<f64> = (0..4).map(|i| seg.value(i, 0)).collect();
    assert_eq!(values, vec![5.0, 5.0, 1.0, 1.0]);
    assert_eq!(world.root_field(part).unwrap(), id);
    assert!(world.validate().is_ok());
}

#[test]
fn test_velocity_at_centroid() {
    let (mut world, base) = square_2d();
    let id = world
        .make_field_elem_dim(
            base,
            Some(2),
            FieldType::Vector2,
            Derivatives::VALUE | Derivatives::VELOCITY,
            ElSegRole::Corner,
        )
        .unwrap();
    world.set_value_expr(id, "x", 0, Derivatives::VELOCITY, 0.0, false).unwrap();
    world.set_value_expr(id, "2*y - x", 1, Derivatives::VELOCITY, 0.0, false).unwrap();

    let field = world.field(id).unwrap();
    let c = [2.0 / 3.0, 1.0 / 3.0];
    let hit = field.find_velocity_at_point(c, &world).unwrap().unwrap();
    assert_eq!(hit.ielem, 0);
    assert_relative_eq!(hit.r1, 1.0 / 3.0, epsilon = 1e-12);
    assert_relative_eq!(hit.r2, 1.0 / 3.0, epsilon = 1e-12);
    // linear velocity is reproduced exactly
    assert_relative_eq!(hit.velocity[0], 2.0 / 3.0, epsilon = 1e-12);
    assert_relative_eq!(hit.velocity[1], 0.0, epsilon = 1e-12);

    assert!(field.find_velocity_at_point([2.0, 2.0], &world).unwrap().is_none());
}

#[test]
fn test_hex_gradient_export_round_trip() {
    let (mut world, base) = two_hexes();
    let scalar = world
        .make_field_elem_dim(base, Some(3), FieldType::Scalar, Derivatives::VALUE, ElSegRole::Corner)
        .unwrap();
    let grad = world
        .make_field_elem_dim(base, Some(3), FieldType::Vector3, Derivatives::VALUE, ElSegRole::Bubble)
        .unwrap();
    world.set_value_expr(scalar, "x*x + 3*z", 0, Derivatives::VALUE, 0.0, false).unwrap();
    world.set_gradient(grad, scalar, true).unwrap();

    let mut buf = Vec::new();
    write_inp(&world, grad, &mut buf).unwrap();
    let data = InpData::parse(&String::from_utf8(buf).unwrap()).unwrap();

    let field = world.field(grad).unwrap();
    let coords = field.coordinates(&world).unwrap();
    assert_eq!(data.nodes.len(), 12);
    for (i, node) in data.nodes.iter().enumerate() {
        assert_eq!(&node[..], coords.node(i));
    }
    assert_eq!(data.elements.len(), 2);
    assert_eq!(data.elements[1].0, "hex");
    assert_eq!(data.elements[1].1, vec![1, 2, 5, 4, 7, 8, 11, 10]);
    assert_eq!(data.labels, vec!["grad_x,", "grad_y,", "grad_z,"]);

    let values = field.node_seg(ElSegRole::Bubble, true, &world, Derivatives::VALUE).unwrap();
    for (ielem, v) in data.values.iter().enumerate() {
        assert_eq!(&v[..], values.node(ielem));
    }
    // scaled gradient has length 5
    for v in &data.values {
        assert_relative_eq!((v[0] * v[0] + v[1] * v[1] + v[2] * v[2]).sqrt(), 5.0, epsilon = 1e-12);
    }
    // x-slope 1 in the first element, 3 in the second, z-slope 3 in both
    assert_relative_eq!(data.values[0][0] / data.values[0][2], 1.0 / 3.0, epsilon = 1e-12);
    assert_relative_eq!(data.values[1][0] / data.values[1][2], 1.0, epsilon = 1e-12);
}
