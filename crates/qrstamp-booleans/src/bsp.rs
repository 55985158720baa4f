//! In-process BSP polygon-soup CSG.
//!
//! Each operand becomes a BSP tree over its faces. Trees clip each other's
//! polygons, and the surviving fragments form the result. The engine needs
//! closed input but tolerates T-junctions and coincident faces better than
//! edge-graph kernels, which makes it a good first rung for box-assembly
//! stamps.
//!
//! Trees live in an arena (`Vec<Node>`) and every traversal is iterative, so
//! deep trees cannot overflow the stack.

use std::mem;

use qrstamp_math::{Point3, Tolerance, Vec3};
use qrstamp_mesh::repair::{
    remove_degenerate_faces, remove_duplicate_faces, remove_unreferenced_vertices,
    split_t_junctions, weld_vertices,
};
use qrstamp_mesh::Solid;
use rayon::prelude::*;
use tracing::debug;

use crate::error::{BooleanError, Result};
use crate::{BooleanBackend, BooleanOp};

const PLANE_EPS: f64 = 1e-5;
const SNAPPED_PLANE_EPS: f64 = 1e-4;
const SNAP_GRID: f64 = 1e-4;

// =============================================================================
// Polygons and planes
// =============================================================================

#[derive(Debug, Clone, Copy)]
struct Plane {
    normal: Vec3,
    w: f64,
}

impl Plane {
    fn from_points(a: &Point3, b: &Point3, c: &Point3) -> Option<Self> {
        let n = (b - a).cross(&(c - a));
        let len = n.norm();
        if len < 1e-12 {
            return None;
        }
        let normal = n / len;
        Some(Self {
            normal,
            w: normal.dot(&a.coords),
        })
    }

    fn flip(&mut self) {
        self.normal = -self.normal;
        self.w = -self.w;
    }

    fn distance(&self, p: &Point3) -> f64 {
        self.normal.dot(&p.coords) - self.w
    }
}

/// A convex planar polygon. Fragments keep their parent's plane so splits
/// never drift.
#[derive(Debug, Clone)]
struct Polygon {
    vertices: Vec<Point3>,
    plane: Plane,
}

impl Polygon {
    fn flip(&mut self) {
        self.vertices.reverse();
        self.plane.flip();
    }
}

const COPLANAR: u8 = 0;
const FRONT: u8 = 1;
const BACK: u8 = 2;
const SPANNING: u8 = 3;

enum Split {
    CoplanarFront(Polygon),
    CoplanarBack(Polygon),
    Front(Polygon),
    Back(Polygon),
    Spanning(Option<Polygon>, Option<Polygon>),
}

fn split_polygon(plane: &Plane, polygon: Polygon, eps: f64) -> Split {
    let mut kind = COPLANAR;
    let types: Vec<u8> = polygon
        .vertices
        .iter()
        .map(|v| {
            let t = plane.distance(v);
            let ty = if t < -eps {
                BACK
            } else if t > eps {
                FRONT
            } else {
                COPLANAR
            };
            kind |= ty;
            ty
        })
        .collect();

    match kind {
        COPLANAR => {
            if plane.normal.dot(&polygon.plane.normal) > 0.0 {
                Split::CoplanarFront(polygon)
            } else {
                Split::CoplanarBack(polygon)
            }
        }
        FRONT => Split::Front(polygon),
        BACK => Split::Back(polygon),
        _ => {
            let n = polygon.vertices.len();
            let mut f = Vec::with_capacity(n + 1);
            let mut b = Vec::with_capacity(n + 1);
            for i in 0..n {
                let j = (i + 1) % n;
                let (ti, tj) = (types[i], types[j]);
                let (vi, vj) = (polygon.vertices[i], polygon.vertices[j]);
                if ti != BACK {
                    f.push(vi);
                }
                if ti != FRONT {
                    b.push(vi);
                }
                if ti | tj == SPANNING {
                    let t = (plane.w - plane.normal.dot(&vi.coords))
                        / plane.normal.dot(&(vj - vi));
                    let v = vi + (vj - vi) * t;
                    f.push(v);
                    b.push(v);
                }
            }
            let make = |vertices: Vec<Point3>| {
                (vertices.len() >= 3).then_some(Polygon {
                    vertices,
                    plane: polygon.plane,
                })
            };
            Split::Spanning(make(f), make(b))
        }
    }
}

// =============================================================================
// BSP tree
// =============================================================================

#[derive(Debug, Default)]
struct Node {
    plane: Option<Plane>,
    front: Option<usize>,
    back: Option<usize>,
    polygons: Vec<Polygon>,
}

#[derive(Debug)]
struct Tree {
    nodes: Vec<Node>,
    eps: f64,
}

impl Tree {
    fn new(polygons: Vec<Polygon>, eps: f64) -> Self {
        let mut tree = Self {
            nodes: vec![Node::default()],
            eps,
        };
        tree.build(polygons);
        tree
    }

    /// Insert polygons starting at the root, growing the tree as needed.
    fn build(&mut self, polygons: Vec<Polygon>) {
        let mut stack = vec![(0usize, polygons)];
        while let Some((idx, polys)) = stack.pop() {
            if polys.is_empty() {
                continue;
            }
            let plane = *self.nodes[idx].plane.get_or_insert(polys[0].plane);
            let mut front = Vec::new();
            let mut back = Vec::new();
            for p in polys {
                match split_polygon(&plane, p, self.eps) {
                    Split::CoplanarFront(p) | Split::CoplanarBack(p) => {
                        self.nodes[idx].polygons.push(p)
                    }
                    Split::Front(p) => front.push(p),
                    Split::Back(p) => back.push(p),
                    Split::Spanning(f, b) => {
                        front.extend(f);
                        back.extend(b);
                    }
                }
            }
            if !front.is_empty() {
                let child = self.child(idx, true);
                stack.push((child, front));
            }
            if !back.is_empty() {
                let child = self.child(idx, false);
                stack.push((child, back));
            }
        }
    }

    fn child(&mut self, idx: usize, front: bool) -> usize {
        let slot = if front {
            self.nodes[idx].front
        } else {
            self.nodes[idx].back
        };
        if let Some(c) = slot {
            return c;
        }
        self.nodes.push(Node::default());
        let c = self.nodes.len() - 1;
        if front {
            self.nodes[idx].front = Some(c);
        } else {
            self.nodes[idx].back = Some(c);
        }
        c
    }

    /// Remove the parts of `polygons` that lie inside this tree's solid.
    fn clip_polygons(&self, polygons: Vec<Polygon>) -> Vec<Polygon> {
        let mut out = Vec::new();
        let mut stack = vec![(0usize, polygons)];
        while let Some((idx, polys)) = stack.pop() {
            let node = &self.nodes[idx];
            let Some(plane) = node.plane else {
                out.extend(polys);
                continue;
            };
            let mut front = Vec::new();
            let mut back = Vec::new();
            for p in polys {
                match split_polygon(&plane, p, self.eps) {
                    Split::CoplanarFront(p) | Split::Front(p) => front.push(p),
                    Split::CoplanarBack(p) | Split::Back(p) => back.push(p),
                    Split::Spanning(f, b) => {
                        front.extend(f);
                        back.extend(b);
                    }
                }
            }
            match node.front {
                Some(c) => stack.push((c, front)),
                None => out.extend(front),
            }
            // Back polygons with no back subtree are inside: drop them.
            if let Some(c) = node.back {
                stack.push((c, back));
            }
        }
        out
    }

    /// Clip every polygon of this tree against `other`.
    fn clip_to(&mut self, other: &Tree) {
        self.nodes.par_iter_mut().for_each(|node| {
            let polys = mem::take(&mut node.polygons);
            node.polygons = other.clip_polygons(polys);
        });
    }

    /// Swap solid and empty space.
    fn invert(&mut self) {
        for node in &mut self.nodes {
            for p in &mut node.polygons {
                p.flip();
            }
            if let Some(plane) = &mut node.plane {
                plane.flip();
            }
            mem::swap(&mut node.front, &mut node.back);
        }
    }

    fn all_polygons(&self) -> Vec<Polygon> {
        self.nodes
            .iter()
            .flat_map(|n| n.polygons.iter().cloned())
            .collect()
    }

    fn into_polygons(self) -> Vec<Polygon> {
        self.nodes.into_iter().flat_map(|n| n.polygons).collect()
    }
}

fn union(a: Vec<Polygon>, b: Vec<Polygon>, eps: f64) -> Vec<Polygon> {
    let mut a = Tree::new(a, eps);
    let mut b = Tree::new(b, eps);
    a.clip_to(&b);
    b.clip_to(&a);
    b.invert();
    b.clip_to(&a);
    b.invert();
    a.build(b.into_polygons());
    a.into_polygons()
}

fn subtract(a: Vec<Polygon>, b: Vec<Polygon>, eps: f64) -> Vec<Polygon> {
    let mut a = Tree::new(a, eps);
    let mut b = Tree::new(b, eps);
    a.invert();
    a.clip_to(&b);
    b.clip_to(&a);
    b.invert();
    b.clip_to(&a);
    b.invert();
    a.build(b.into_polygons());
    a.invert();
    a.into_polygons()
}

fn intersect(a: Vec<Polygon>, b: Vec<Polygon>, eps: f64) -> Vec<Polygon> {
    let mut a = Tree::new(a, eps);
    let mut b = Tree::new(b, eps);
    a.invert();
    b.clip_to(&a);
    b.invert();
    a.clip_to(&b);
    b.clip_to(&a);
    a.build(b.all_polygons());
    a.invert();
    a.into_polygons()
}

// =============================================================================
// Mesh conversion
// =============================================================================

fn snap(p: &Point3, grid: f64) -> Point3 {
    Point3::new(
        (p.x / grid).round() * grid,
        (p.y / grid).round() * grid,
        (p.z / grid).round() * grid,
    )
}

fn to_polygons(solid: &Solid, snap_grid: Option<f64>) -> Vec<Polygon> {
    (0..solid.triangle_count())
        .filter_map(|i| {
            let mut tri = solid.triangle(i);
            if let Some(g) = snap_grid {
                tri = tri.map(|p| snap(&p, g));
            }
            let plane = Plane::from_points(&tri[0], &tri[1], &tri[2])?;
            Some(Polygon {
                vertices: tri.to_vec(),
                plane,
            })
        })
        .collect()
}

/// Ear-clip a convex polygon, skipping zero-area ears so collinear split
/// points stay on the boundary.
fn triangulate_into(poly: &Polygon, out: &mut Solid) {
    let base = out.vertices.len() as u32;
    out.vertices.extend_from_slice(&poly.vertices);
    let mut ring: Vec<u32> = (0..poly.vertices.len() as u32).collect();
    let area = |a: u32, b: u32, c: u32| {
        let (pa, pb, pc) = (
            poly.vertices[a as usize],
            poly.vertices[b as usize],
            poly.vertices[c as usize],
        );
        (pb - pa).cross(&(pc - pa)).dot(&poly.plane.normal)
    };

    while ring.len() > 3 {
        let n = ring.len();
        let ear = (0..n).find(|&i| area(ring[(i + n - 1) % n], ring[i], ring[(i + 1) % n]) > 1e-12);
        let Some(i) = ear else {
            break;
        };
        out.triangles.push([
            base + ring[(i + n - 1) % n],
            base + ring[i],
            base + ring[(i + 1) % n],
        ]);
        ring.remove(i);
    }
    if ring.len() == 3 {
        out.triangles
            .push([base + ring[0], base + ring[1], base + ring[2]]);
    }
}

fn to_solid(polygons: &[Polygon]) -> Solid {
    let mut raw = Solid::empty();
    for p in polygons {
        triangulate_into(p, &mut raw);
    }
    let tol = Tolerance::DEFAULT;
    let solid = weld_vertices(raw, &tol);
    let (solid, _) = remove_degenerate_faces(solid, &tol);
    let (solid, _) = split_t_junctions(solid, &tol);
    remove_unreferenced_vertices(solid)
}

/// Weld the operand and cancel coincident opposing faces, so a box
/// assembly enters the tree as one shell rather than many touching ones.
fn normalize_operand(solid: &Solid) -> Solid {
    let welded = weld_vertices(solid.clone(), &Tolerance::DEFAULT);
    remove_duplicate_faces(welded).0
}

// =============================================================================
// Backend
// =============================================================================

/// BSP boolean engine.
#[derive(Debug, Clone)]
pub struct BspBackend {
    name: &'static str,
    eps: f64,
    snap_grid: Option<f64>,
}

impl BspBackend {
    /// Engine with the fine plane tolerance.
    pub fn new() -> Self {
        Self {
            name: "bsp",
            eps: PLANE_EPS,
            snap_grid: None,
        }
    }

    /// Engine that snaps input to a 0.1 µm grid and classifies with a
    /// coarser plane tolerance. Gentler on nearly coincident faces.
    pub fn snapped() -> Self {
        Self {
            name: "bsp-snapped",
            eps: SNAPPED_PLANE_EPS,
            snap_grid: Some(SNAP_GRID),
        }
    }
}

impl Default for BspBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl BooleanBackend for BspBackend {
    fn name(&self) -> &str {
        self.name
    }

    fn apply(&self, a: &Solid, b: &Solid, op: BooleanOp) -> Result<Solid> {
        if a.is_empty() {
            return Err(BooleanError::EmptyOperand);
        }
        if b.is_empty() {
            return Ok(match op {
                BooleanOp::Union | BooleanOp::Difference => a.clone(),
                BooleanOp::Intersection => Solid::empty(),
            });
        }

        let pa = to_polygons(&normalize_operand(a), self.snap_grid);
        let pb = to_polygons(&normalize_operand(b), self.snap_grid);
        if pa.is_empty() {
            return Err(BooleanError::EngineFailed {
                engine: self.name.to_string(),
                reason: "left operand has no non-degenerate faces".into(),
            });
        }

        let polys = match op {
            BooleanOp::Union => union(pa, pb, self.eps),
            BooleanOp::Difference => subtract(pa, pb, self.eps),
            BooleanOp::Intersection => intersect(pa, pb, self.eps),
        };
        let result = to_solid(&polys);
        debug!(
            engine = self.name,
            %op,
            polygons = polys.len(),
            triangles = result.triangle_count(),
            "bsp boolean finished"
        );
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use qrstamp_mesh::primitives::cuboid;

    fn unit2(at: f64) -> Solid {
        cuboid(Point3::new(at, at, at), Point3::new(at + 2.0, at + 2.0, at + 2.0))
    }

    #[test]
    fn test_pocket_difference() {
        let base = cuboid(Point3::origin(), Point3::new(10.0, 10.0, 5.0));
        let tool = cuboid(Point3::new(4.0, 4.0, 4.0), Point3::new(6.0, 6.0, 6.0));
        let out = BspBackend::new().difference(&base, &tool).unwrap();
        assert_relative_eq!(out.volume(), 496.0, epsilon = 1e-6);
        assert!(out.is_watertight());
        assert_relative_eq!(out.bounds().max.z, 5.0, epsilon = 1e-9);
    }

    #[test]
    fn test_union_and_intersection_volumes() {
        let a = unit2(0.0);
        let b = unit2(1.0);
        let engine = BspBackend::new();
        assert_relative_eq!(engine.union(&a, &b).unwrap().volume(), 15.0, epsilon = 1e-6);
        assert_relative_eq!(
            engine.intersection(&a, &b).unwrap().volume(),
            1.0,
            epsilon = 1e-6
        );
    }

    #[test]
    fn test_disjoint_difference_keeps_base() {
        let a = unit2(0.0);
        let b = unit2(10.0);
        let out = BspBackend::new().difference(&a, &b).unwrap();
        assert_relative_eq!(out.volume(), 8.0, epsilon = 1e-9);
        assert!(BspBackend::new().intersection(&a, &b).unwrap().is_empty());
    }

    #[test]
    fn test_empty_operands() {
        let a = unit2(0.0);
        let engine = BspBackend::snapped();
        assert_eq!(engine.name(), "bsp-snapped");
        assert!(matches!(
            engine.difference(&Solid::empty(), &a),
            Err(BooleanError::EmptyOperand)
        ));
        assert_eq!(engine.difference(&a, &Solid::empty()).unwrap(), a);
        assert!(engine.intersection(&a, &Solid::empty()).unwrap().is_empty());
    }

    #[test]
    fn test_box_assembly_tool_enters_as_one_shell() {
        let base = cuboid(Point3::origin(), Point3::new(10.0, 10.0, 5.0));
        let mut tool = cuboid(Point3::new(2.0, 2.0, 4.0), Point3::new(3.0, 3.0, 6.0));
        tool.merge(&cuboid(Point3::new(3.0, 2.0, 4.0), Point3::new(4.0, 3.0, 6.0)));
        let out = BspBackend::snapped().difference(&base, &tool).unwrap();
        assert_relative_eq!(out.volume(), 498.0, epsilon = 1e-4);
    }

    #[test]
    fn test_split_keeps_parent_plane() {
        let poly = Polygon {
            vertices: vec![
                Point3::new(-1.0, 0.0, 0.0),
                Point3::new(1.0, 0.0, 0.0),
                Point3::new(1.0, 1.0, 0.0),
                Point3::new(-1.0, 1.0, 0.0),
            ],
            plane: Plane {
                normal: Vec3::z(),
                w: 0.0,
            },
        };
        let cut = Plane {
            normal: Vec3::x(),
            w: 0.0,
        };
        match split_polygon(&cut, poly, PLANE_EPS) {
            Split::Spanning(Some(f), Some(b)) => {
                assert_eq!(f.vertices.len(), 4);
                assert_eq!(b.vertices.len(), 4);
                assert_eq!(f.plane.normal, Vec3::z());
            }
            _ => panic!("expected a spanning split"),
        }
    }
}
