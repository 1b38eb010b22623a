//! St. Venant–Kirchhoff hyperelastic solid.
//!
//! Green–Lagrange strain with a linear stress law:
//!
//! ```text
//! F = I + Σ_a u_a ⊗ ∇N_a        E = ½(FᵀF - I)        S = λ tr(E) I + 2μ E
//! f_a = ∫ F S ∇N_a dV
//! ```
//!
//! Mass is lumped equally onto the element nodes. The nodal residual is
//! `m_a g - m_a a_a - f_a` and the block `(a, b)` of the matrix is
//! `m_a δ_ab I + βdt² K_ab` with the consistent tangent `K_ab = ∂f_a/∂u_b`.
//!
//! Tetrahedra use a single integration point, hexahedra 2×2×2 Gauss.

use super::Kinematics;
use crate::element::{gauss_hex, Hex8, Tet4};
use crate::error::{Error, Result};
use crate::linear_system::LinearSystem;
use crate::material::Material;
use crate::mesh::ElementType;
use crate::newmark::Newmark;
use crate::types::{ElSegRole, FieldId, Point3, Vec3};
use crate::world::FieldWorld;
use nalgebra::Matrix3;
use rayon::prelude::*;

/// Shape-function gradients and weight of one integration point.
type QuadraturePoint = (Vec<Vec3>, f64);

/// Hyperelastic equation on a 3D displacement field.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StVenantKirchhoff3D {
    pub id_disp: FieldId,
    pub material: Material,
}

/// Merge-ready contribution of one element.
struct ElementContribution {
    nodes: Vec<usize>,
    emat: Vec<f64>,
    eres: Vec<f64>,
}

fn quadrature(elem_type: ElementType, co: &[Point3]) -> Result<Vec<QuadraturePoint>> {
    if co.len() != elem_type.n_nodes() {
        return Err(Error::Invariant(format!(
            "{elem_type:?} element with {} nodes",
            co.len()
        )));
    }
    match elem_type {
        ElementType::Tet4 => {
            let co: [Point3; 4] = std::array::from_fn(|k| co[k]);
            let (grads, vol) = Tet4::shape_gradients(&co)?;
            Ok(vec![(grads.to_vec(), vol)])
        }
        ElementType::Hex8 => {
            let co: [Point3; 8] = std::array::from_fn(|k| co[k]);
            gauss_hex(2)?
                .iter()
                .map(|gp| {
                    let (grads, det_j) = Hex8::shape_gradients(&co, gp.xi(), gp.eta(), gp.zeta())?;
                    Ok((grads.to_vec(), gp.weight * det_j))
                })
                .collect()
        }
        other => Err(Error::Unsupported(format!("hyperelastic {other:?} element"))),
    }
}

/// Internal nodal forces and tangent blocks `K_ab` (row-major over a, b).
pub(crate) fn internal_force(material: &Material, u: &[Vec3], quad: &[QuadraturePoint]) -> (Vec<Vec3>, Vec<Matrix3<f64>>) {
    let n = u.len();
    let (lambda, mu) = (material.lame_lambda, material.lame_mu);
    let eye = Matrix3::identity();
    let mut force = vec![Vec3::zeros(); n];
    let mut k = vec![Matrix3::zeros(); n * n];
    for (g, w) in quad {
        let mut f = eye;
        for a in 0..n {
            f += u[a] * g[a].transpose();
        }
        let e = (f.transpose() * f - eye) * 0.5;
        let s = eye * (lambda * e.trace()) + e * (2.0 * mu);
        let fg: Vec<Vec3> = g.iter().map(|ga| f * ga).collect();
        let fft = f * f.transpose();
        for a in 0..n {
            force[a] += f * s * g[a] * *w;
            for b in 0..n {
                let kab = fg[a] * fg[b].transpose() * lambda
                    + fft * (mu * g[a].dot(&g[b]))
                    + fg[b] * fg[a].transpose() * mu
                    + eye * g[a].dot(&(s * g[b]));
                k[a * n + b] += kab * *w;
            }
        }
    }
    (force, k)
}

impl StVenantKirchhoff3D {
    pub fn new(id_disp: FieldId, material: Material) -> Self {
        Self { id_disp, material }
    }

    /// Register the displacement field in the linear system.
    pub fn add_pattern(&self, ls: &mut LinearSystem, world: &FieldWorld) -> Result<usize> {
        ls.add_pattern_field(self.id_disp, world)
    }

    fn element(
        &self,
        co: &[Point3],
        u: &[Vec3],
        acc: &[Vec3],
        elem_type: ElementType,
        gravity: &Vec3,
        nm: &Newmark,
    ) -> Result<(Vec<f64>, Vec<f64>)> {
        let n = co.len();
        let quad = quadrature(elem_type, co)?;
        let vol: f64 = quad.iter().map(|(_, w)| w).sum();
        let mass = self.material.density * vol / n as f64;
        let (force, k) = internal_force(&self.material, u, &quad);

        let dtmp = nm.disp_factor();
        let mut emat = vec![0.0; n * n * 9];
        for a in 0..n {
            for b in 0..n {
                for i in 0..3 {
                    for j in 0..3 {
                        let m = if a == b && i == j { mass } else { 0.0 };
                        emat[((a * n + b) * 3 + i) * 3 + j] = m + dtmp * k[a * n + b][(i, j)];
                    }
                }
            }
        }
        let eres = (0..n)
            .flat_map(|a| {
                let r = gravity * mass - acc[a] * mass - force[a];
                [r.x, r.y, r.z]
            })
            .collect();
        Ok((emat, eres))
    }

    /// Merge every element of the field.
    ///
    /// Element matrices are computed in parallel and merged in element
    /// order afterwards.
    pub fn add_linear_system(
        &self,
        ls: &mut LinearSystem,
        world: &FieldWorld,
        gravity: &Vec3,
        nm: &Newmark,
        is_initial: bool,
    ) -> Result<()> {
        let field = world.field(self.id_disp)?;
        if field.ndim_coord() != 3 {
            return Err(Error::Unsupported("hyperelastic solid needs 3D coordinates".into()));
        }
        let iseg = ls.field_segment(self.id_disp, ElSegRole::Corner, world)?;
        let kin = Kinematics::new(self.id_disp, world)?;
        let coords = field.coordinates(world)?;

        for ei in field.interpolations() {
            let elem_type = world.elem_array(ei.id_ea)?.elem_type();
            let es_co = field.elem_seg(ei.id_ea, ElSegRole::Corner, false, world)?;
            let es_va = field.elem_seg(ei.id_ea, ElSegRole::Corner, true, world)?;
            let contributions: Vec<ElementContribution> = (0..es_co.n_elements())
                .into_par_iter()
                .map(|ielem| {
                    let no_co = es_co.nodes(ielem);
                    let no_va = es_va.nodes(ielem);
                    let co: Vec<Point3> = no_co.iter().map(|&i| Point3::from_column_slice(coords.node(i))).collect();
                    let u: Vec<Vec3> = no_va.iter().map(|&i| kin.value(i, nm, is_initial)).collect();
                    let acc: Vec<Vec3> = no_va.iter().map(|&i| kin.acceleration(i)).collect();
                    let (emat, eres) = self.element(&co, &u, &acc, elem_type, gravity, nm)?;
                    Ok(ElementContribution {
                        nodes: no_va.to_vec(),
                        emat,
                        eres,
                    })
                })
                .collect::<Result<_>>()?;

            for c in &contributions {
                ls.mearge(iseg, iseg, &c.nodes, &c.nodes, &c.emat)?;
                ls.add_residual_blocks(iseg, &c.nodes, &c.eres)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn unit_tet() -> [Point3; 4] {
        [
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
            Point3::new(0.0, 0.0, 1.0),
        ]
    }

    fn unit_cube() -> [Point3; 8] {
        [
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(1.0, 1.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
            Point3::new(0.0, 0.0, 1.0),
            Point3::new(1.0, 0.0, 1.0),
            Point3::new(1.0, 1.0, 1.0),
            Point3::new(0.0, 1.0, 1.0),
        ]
    }

    fn material() -> Material {
        Material::new(30.0, 70.0, 0.1).unwrap()
    }

    #[test]
    fn test_rigid_translation_is_stress_free() {
        let co = unit_tet();
        let quad = quadrature(ElementType::Tet4, &co).unwrap();
        let u = vec![Vec3::new(0.3, -0.2, 0.1); 4];
        let (force, _) = internal_force(&material(), &u, &quad);
        for f in force {
            assert_relative_eq!(f.norm(), 0.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_rigid_rotation_is_stress_free() {
        // Green-Lagrange strain vanishes for finite rotations
        let co = unit_cube();
        let quad = quadrature(ElementType::Hex8, &co).unwrap();
        let rot = nalgebra::Rotation3::new(Vec3::new(0.4, -0.3, 0.8));
        let u: Vec<Vec3> = co.iter().map(|x| rot * x - x).collect();
        let (force, _) = internal_force(&material(), &u, &quad);
        for f in force {
            assert_relative_eq!(f.norm(), 0.0, epsilon = 1e-10);
        }
    }

    #[test]
    fn test_tangent_matches_finite_difference() {
        let co = unit_cube();
        let quad = quadrature(ElementType::Hex8, &co).unwrap();
        let u: Vec<Vec3> = (0..8)
            .map(|a| Vec3::new(0.05 * a as f64, -0.03 * (a % 3) as f64, 0.02 * (a % 2) as f64))
            .collect();
        let (f0, k) = internal_force(&material(), &u, &quad);
        let eps = 1e-7;
        for b in 0..8 {
            for j in 0..3 {
                let mut moved = u.clone();
                moved[b][j] += eps;
                let (f1, _) = internal_force(&material(), &moved, &quad);
                for a in 0..8 {
                    for i in 0..3 {
                        let fd = (f1[a][i] - f0[a][i]) / eps;
                        assert_relative_eq!(fd, k[a * 8 + b][(i, j)], epsilon = 1e-4, max_relative = 1e-5);
                    }
                }
            }
        }
    }

    #[test]
    fn test_lumped_mass_and_gravity() {
        let eq = StVenantKirchhoff3D::new(FieldId::from_index(0), material());
        let nm = Newmark::new(0.1, 0.6);
        let co = unit_cube();
        let zero = vec![Vec3::zeros(); 8];
        let g = Vec3::new(0.0, 0.0, -9.8);
        let (emat, eres) = eq.element(&co, &zero, &zero, ElementType::Hex8, &g, &nm).unwrap();
        // ρV/8 on every node
        let m = 0.1 / 8.0;
        for a in 0..8 {
            assert_relative_eq!(eres[a * 3 + 2], -9.8 * m, epsilon = 1e-12);
            assert_relative_eq!(eres[a * 3], 0.0, epsilon = 1e-12);
        }
        // unstressed: only the mass and the linear stiffness remain, and the
        // matrix stays symmetric
        for a in 0..8 {
            for b in 0..8 {
                for i in 0..3 {
                    for j in 0..3 {
                        let kij = emat[((a * 8 + b) * 3 + i) * 3 + j];
                        let kji = emat[((b * 8 + a) * 3 + j) * 3 + i];
                        assert_relative_eq!(kij, kji, epsilon = 1e-12);
                    }
                }
            }
        }
    }

    #[test]
    fn test_unsupported_element() {
        let co = [Point3::zeros(); 3];
        assert!(matches!(
            quadrature(ElementType::Tri3, &co),
            Err(Error::Unsupported(_))
        ));
    }
}
