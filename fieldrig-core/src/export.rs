//! Plain-text INP export of per-element vector fields.
//!
//! Layout:
//!
//! ```text
//! 1
//! data
//! step1
//! <nnode> <nelem>
//! <i> <x> <y> <z>                 one line per node, 1-based
//! <i> 0 hex|tet <n1> <n2> ...     one line per element, 1-based
//! 0 3
//! 3 1 1 1
//! grad_x,
//! grad_y,
//! grad_z,
//! <i> <v0> <v1> <v2>              one line per element
//! ```
//!
//! Only hexahedron and tetrahedron fields with constant (bubble)
//! interpolation over a single element array are written.

use crate::error::{Error, Result};
use crate::field::InterpolationType;
use crate::mesh::ElementType;
use crate::types::{Derivatives, ElSegRole, FieldId};
use crate::world::FieldWorld;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

const LABELS: [&str; 3] = ["grad_x,", "grad_y,", "grad_z,"];

fn elem_type_name(elem_type: ElementType) -> Result<&'static str> {
    match elem_type {
        ElementType::Hex8 => Ok("hex"),
        ElementType::Tet4 => Ok("tet"),
        other => Err(Error::Unsupported(format!("INP export of {other:?} elements"))),
    }
}

fn padded(values: &[f64]) -> [f64; 3] {
    std::array::from_fn(|k| values.get(k).copied().unwrap_or(0.0))
}

/// Write a constant-per-element vector field.
pub fn write_inp<W: Write>(world: &FieldWorld, id_field: FieldId, out: &mut W) -> Result<()> {
    let field = world.field(id_field)?;
    let [ei] = field.interpolations() else {
        return Err(Error::Unsupported(format!(
            "INP export needs exactly one element array, {id_field} has {}",
            field.interpolations().len()
        )));
    };
    let id_ea = ei.id_ea;
    let itype = field.interpolation_type(id_ea, world)?;
    if !matches!(itype, InterpolationType::HexConstant | InterpolationType::TetConstant) {
        return Err(Error::Unsupported(format!("INP export of {itype:?} interpolation")));
    }
    if field.dof_count() != 3 {
        return Err(Error::Unsupported(format!(
            "INP export needs a 3D vector field, {id_field} has {} dofs",
            field.dof_count()
        )));
    }
    let ea = world.elem_array(id_ea)?;
    let name = elem_type_name(ea.elem_type())?;
    let coords = field.coordinates(world)?;
    let es_co = field.elem_seg(id_ea, ElSegRole::Corner, false, world)?;
    let es_va = field.elem_seg(id_ea, ElSegRole::Bubble, true, world)?;
    let values = field.node_seg(ElSegRole::Bubble, true, world, Derivatives::VALUE)?;

    writeln!(out, "1\ndata\nstep1")?;
    writeln!(out, "{} {}", coords.n_nodes(), ea.size())?;
    for inode in 0..coords.n_nodes() {
        let [x, y, z] = padded(coords.node(inode));
        writeln!(out, "{} {x} {y} {z}", inode + 1)?;
    }
    for ielem in 0..ea.size() {
        write!(out, "{} 0 {name}", ielem + 1)?;
        for &ino in es_co.nodes(ielem) {
            write!(out, " {}", ino + 1)?;
        }
        writeln!(out)?;
    }
    writeln!(out, "0 3\n3 1 1 1")?;
    for label in LABELS {
        writeln!(out, "{label}")?;
    }
    for ielem in 0..ea.size() {
        let [v0, v1, v2] = padded(values.node(es_va.nodes(ielem)[0]));
        writeln!(out, "{} {v0} {v1} {v2}", ielem + 1)?;
    }
    Ok(())
}

/// Write a field to an INP file.
pub fn export_inp(world: &FieldWorld, id_field: FieldId, path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    let mut out = BufWriter::new(File::create(path)?);
    write_inp(world, id_field, &mut out)?;
    out.flush()?;
    log::debug!("exported {id_field} to {}", path.display());
    Ok(())
}

/// Contents of an INP file.
#[derive(Debug, Clone, PartialEq)]
pub struct InpData {
    pub nodes: Vec<[f64; 3]>,
    /// Element type name and 0-based connectivity.
    pub elements: Vec<(String, Vec<usize>)>,
    pub labels: Vec<String>,
    /// One vector per element.
    pub values: Vec<[f64; 3]>,
}

/// Line cursor with error context.
struct Lines<'a> {
    inner: std::iter::Enumerate<std::str::Lines<'a>>,
}

impl<'a> Lines<'a> {
    fn next(&mut self) -> Result<(usize, Vec<&'a str>)> {
        self.inner
            .next()
            .map(|(i, line)| (i + 1, line.split_whitespace().collect()))
            .ok_or_else(|| Error::Format("unexpected end of INP data".into()))
    }

    fn expect(&mut self, tokens: &[&str]) -> Result<()> {
        let (line, got) = self.next()?;
        if got != tokens {
            return Err(Error::Format(format!("line {line}: expected {tokens:?}, got {got:?}")));
        }
        Ok(())
    }
}

fn parse_num<T: std::str::FromStr>(line: usize, token: &str) -> Result<T> {
    token
        .parse()
        .map_err(|_| Error::Format(format!("line {line}: bad number {token:?}")))
}

/// Check the leading 1-based index and parse three floats after it.
fn parse_indexed_vec3(line: usize, tokens: &[&str], index: usize) -> Result<[f64; 3]> {
    let [i, x, y, z] = tokens else {
        return Err(Error::Format(format!("line {line}: expected an index and three values")));
    };
    if parse_num::<usize>(line, i)? != index {
        return Err(Error::Format(format!("line {line}: expected index {index}")));
    }
    Ok([parse_num(line, x)?, parse_num(line, y)?, parse_num(line, z)?])
}

impl InpData {
    pub fn parse(text: &str) -> Result<Self> {
        let mut lines = Lines {
            inner: text.lines().enumerate(),
        };
        lines.expect(&["1"])?;
        lines.expect(&["data"])?;
        lines.expect(&["step1"])?;
        let (line, counts) = lines.next()?;
        let [nnode, nelem] = counts[..] else {
            return Err(Error::Format(format!("line {line}: expected node and element counts")));
        };
        let (nnode, nelem): (usize, usize) = (parse_num(line, nnode)?, parse_num(line, nelem)?);

        let mut nodes = Vec::with_capacity(nnode);
        for inode in 0..nnode {
            let (line, tokens) = lines.next()?;
            nodes.push(parse_indexed_vec3(line, &tokens, inode + 1)?);
        }

        let mut elements = Vec::with_capacity(nelem);
        for ielem in 0..nelem {
            let (line, tokens) = lines.next()?;
            let [i, "0", name, conn @ ..] = &tokens[..] else {
                return Err(Error::Format(format!("line {line}: malformed element")));
            };
            if parse_num::<usize>(line, i)? != ielem + 1 {
                return Err(Error::Format(format!("line {line}: expected index {}", ielem + 1)));
            }
            let conn = conn
                .iter()
                .map(|t| match parse_num::<usize>(line, t)? {
                    0 => Err(Error::Format(format!("line {line}: node indices are 1-based"))),
                    n => Ok(n - 1),
                })
                .collect::<Result<Vec<_>>>()?;
            elements.push((name.to_string(), conn));
        }

        lines.expect(&["0", "3"])?;
        lines.expect(&["3", "1", "1", "1"])?;
        let mut labels = Vec::with_capacity(3);
        for _ in 0..3 {
            let (line, tokens) = lines.next()?;
            let [label] = tokens[..] else {
                return Err(Error::Format(format!("line {line}: expected a component label")));
            };
            labels.push(label.to_string());
        }

        let mut values = Vec::with_capacity(nelem);
        for ielem in 0..nelem {
            let (line, tokens) = lines.next()?;
            values.push(parse_indexed_vec3(line, &tokens, ielem + 1)?);
        }
        Ok(Self {
            nodes,
            elements,
            labels,
            values,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::Mesh;
    use crate::types::{FieldType, Point3};

    fn two_tets() -> (FieldWorld, FieldId) {
        let mut mesh = Mesh::new(3).unwrap();
        mesh.add_nodes([
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
            Point3::new(0.0, 0.0, 1.0),
            Point3::new(1.0, 1.0, 1.0),
        ]);
        let g = mesh.add_group(ElementType::Tet4, None);
        mesh.add_element(g, &[0, 1, 2, 3]).unwrap();
        mesh.add_element(g, &[1, 2, 3, 4]).unwrap();
        let mut world = FieldWorld::new();
        let base = world.add_mesh(&mesh).unwrap();
        (world, base)
    }

    #[test]
    fn test_write_tet_constant() {
        let (mut world, base) = two_tets();
        let id = world
            .make_field_elem_dim(base, Some(3), FieldType::Vector3, Derivatives::VALUE, ElSegRole::Bubble)
            .unwrap();
        world.set_value(id, 0.5, 0, Derivatives::VALUE, false).unwrap();
        world.set_value(id, -2.0, 2, Derivatives::VALUE, false).unwrap();

        let mut buf = Vec::new();
        write_inp(&world, id, &mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(&lines[..4], &["1", "data", "step1", "5 2"]);
        assert_eq!(lines[5], "2 1 0 0");
        assert_eq!(lines[9], "1 0 tet 1 2 3 4");
        assert_eq!(lines[10], "2 0 tet 2 3 4 5");
        assert_eq!(&lines[11..16], &["0 3", "3 1 1 1", "grad_x,", "grad_y,", "grad_z,"]);
        assert_eq!(lines[16], "1 0.5 0 -2");
        assert_eq!(lines.len(), 18);
    }

    #[test]
    fn test_corner_field_is_rejected() {
        let (mut world, base) = two_tets();
        let id = world
            .make_field_elem_dim(base, Some(3), FieldType::Vector3, Derivatives::VALUE, ElSegRole::Corner)
            .unwrap();
        let mut buf = Vec::new();
        assert!(matches!(write_inp(&world, id, &mut buf), Err(Error::Unsupported(_))));
    }

    #[test]
    fn test_parse_errors() {
        assert!(matches!(InpData::parse("1\ndata\n"), Err(Error::Format(_))));
        assert!(matches!(InpData::parse("2\ndata\nstep1\n0 0\n"), Err(Error::Format(_))));
        let bad_node = "1\ndata\nstep1\n1 0\n1 0.0 x 0.0\n0 3\n3 1 1 1\na,\nb,\nc,\n";
        assert!(matches!(InpData::parse(bad_node), Err(Error::Format(_))));
        let empty = "1\ndata\nstep1\n0 0\n0 3\n3 1 1 1\na,\nb,\nc,\n";
        let data = InpData::parse(empty).unwrap();
        assert!(data.nodes.is_empty());
        assert_eq!(data.labels, vec!["a,", "b,", "c,"]);
    }
}
