//! The indexed triangle-mesh solid.

use std::collections::HashMap;

use qrstamp_math::{Aabb3, Point3, Tolerance, Transform, Vec3};

/// A triangulated solid.
///
/// Triangles are counter-clockwise when viewed from outside. Every
/// operation that changes geometry consumes `self` and returns the result,
/// so a solid is only ever owned by the stage currently working on it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Solid {
    /// Vertex positions in mm.
    pub vertices: Vec<Point3>,
    /// Triangle vertex indices.
    pub triangles: Vec<[u32; 3]>,
}

/// Undirected edge between two welded vertex ids.
type EdgeKey = (u32, u32);

/// How often each undirected edge is used in each direction.
#[derive(Debug, Default, Clone, Copy)]
struct EdgeUse {
    forward: u32,
    backward: u32,
}

impl Solid {
    /// Create a solid from raw buffers.
    pub fn new(vertices: Vec<Point3>, triangles: Vec<[u32; 3]>) -> Self {
        Self {
            vertices,
            triangles,
        }
    }

    /// A solid with no geometry.
    pub fn empty() -> Self {
        Self::default()
    }

    /// True if the solid has no triangles.
    pub fn is_empty(&self) -> bool {
        self.triangles.is_empty()
    }

    /// Number of vertices.
    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    /// Number of triangles.
    pub fn triangle_count(&self) -> usize {
        self.triangles.len()
    }

    /// Corner positions of triangle `i`.
    pub fn triangle(&self, i: usize) -> [Point3; 3] {
        let [a, b, c] = self.triangles[i];
        [
            self.vertices[a as usize],
            self.vertices[b as usize],
            self.vertices[c as usize],
        ]
    }

    /// Unnormalized normal of triangle `i` (length = 2 * area).
    pub fn triangle_normal(&self, i: usize) -> Vec3 {
        let [a, b, c] = self.triangle(i);
        (b - a).cross(&(c - a))
    }

    /// Axis-aligned bounding box (empty box for an empty solid).
    pub fn bounds(&self) -> Aabb3 {
        Aabb3::from_points(self.vertices.iter())
    }

    /// Signed enclosed volume; positive when triangles face outward.
    pub fn signed_volume(&self) -> f64 {
        let mut vol = 0.0;
        for i in 0..self.triangles.len() {
            let [v0, v1, v2] = self.triangle(i);
            vol += v0.coords.dot(&v1.coords.cross(&v2.coords));
        }
        vol / 6.0
    }

    /// Enclosed volume in mm³.
    pub fn volume(&self) -> f64 {
        self.signed_volume().abs()
    }

    /// Total surface area in mm².
    pub fn surface_area(&self) -> f64 {
        (0..self.triangles.len())
            .map(|i| self.triangle_normal(i).norm() / 2.0)
            .sum()
    }

    /// Volume-weighted center of mass, assuming uniform density.
    ///
    /// Falls back to the vertex average when the mesh encloses no volume.
    pub fn centroid(&self) -> Point3 {
        let mut acc = Vec3::zeros();
        let mut total_vol = 0.0;
        for i in 0..self.triangles.len() {
            let [v0, v1, v2] = self.triangle(i);
            let vol = v0.coords.dot(&v1.coords.cross(&v2.coords));
            total_vol += vol;
            acc += vol * (v0.coords + v1.coords + v2.coords);
        }
        if total_vol.abs() < 1e-12 {
            if self.vertices.is_empty() {
                return Point3::origin();
            }
            let sum: Vec3 = self.vertices.iter().map(|p| p.coords).sum();
            return Point3::from(sum / self.vertices.len() as f64);
        }
        Point3::from(acc / (4.0 * total_vol))
    }

    /// Map every vertex to a canonical id shared by coincident positions.
    fn welded_ids(&self) -> Vec<u32> {
        let tol = Tolerance::DEFAULT;
        let mut ids: HashMap<[i64; 3], u32> = HashMap::with_capacity(self.vertices.len());
        self.vertices
            .iter()
            .map(|p| {
                let next = ids.len() as u32;
                *ids.entry(tol.weld_key(p)).or_insert(next)
            })
            .collect()
    }

    fn edge_uses(&self) -> HashMap<EdgeKey, EdgeUse> {
        let ids = self.welded_ids();
        let mut uses: HashMap<EdgeKey, EdgeUse> = HashMap::new();
        for tri in &self.triangles {
            let w = [
                ids[tri[0] as usize],
                ids[tri[1] as usize],
                ids[tri[2] as usize],
            ];
            // Collapsed triangles contribute no edges.
            if w[0] == w[1] || w[1] == w[2] || w[2] == w[0] {
                continue;
            }
            for k in 0..3 {
                let (a, b) = (w[k], w[(k + 1) % 3]);
                let entry = uses.entry((a.min(b), a.max(b))).or_default();
                if a < b {
                    entry.forward += 1;
                } else {
                    entry.backward += 1;
                }
            }
        }
        uses
    }

    /// Number of edges used by exactly one triangle.
    pub fn boundary_edge_count(&self) -> usize {
        self.edge_uses()
            .values()
            .filter(|u| u.forward + u.backward == 1)
            .count()
    }

    /// Closed 2-manifold test: every edge is shared by exactly two triangles.
    ///
    /// Positions are welded first, so unindexed triangle soup that is
    /// geometrically closed still counts as watertight.
    pub fn is_watertight(&self) -> bool {
        if self.triangles.is_empty() {
            return false;
        }
        let uses = self.edge_uses();
        !uses.is_empty() && uses.values().all(|u| u.forward + u.backward == 2)
    }

    /// Every shared edge is traversed once in each direction.
    pub fn is_winding_consistent(&self) -> bool {
        self.edge_uses()
            .values()
            .all(|u| u.forward + u.backward != 2 || (u.forward == 1 && u.backward == 1))
    }

    /// Apply a transform to every vertex.
    ///
    /// Mirroring transforms flip triangle winding so normals stay outward.
    pub fn transformed(mut self, t: &Transform) -> Self {
        for v in &mut self.vertices {
            *v = t.apply_point(v);
        }
        if t.reverses_orientation() {
            for tri in &mut self.triangles {
                tri.swap(1, 2);
            }
        }
        self
    }

    /// Translate every vertex by `offset`.
    pub fn translated(mut self, offset: &Vec3) -> Self {
        for v in &mut self.vertices {
            *v += offset;
        }
        self
    }

    /// Flip every triangle.
    pub fn reversed(mut self) -> Self {
        for tri in &mut self.triangles {
            tri.swap(1, 2);
        }
        self
    }

    /// Append another solid's triangles (disjoint union, no boolean).
    pub fn merge(&mut self, other: &Solid) {
        let base = self.vertices.len() as u32;
        self.vertices.extend_from_slice(&other.vertices);
        self.triangles.extend(
            other
                .triangles
                .iter()
                .map(|t| [t[0] + base, t[1] + base, t[2] + base]),
        );
    }

    /// Concatenate several solids into one.
    pub fn concat(parts: impl IntoIterator<Item = Solid>) -> Self {
        let mut out = Solid::empty();
        for part in parts {
            out.merge(&part);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::primitives::{cuboid, cylinder};
    use approx::assert_relative_eq;
    use std::f64::consts::PI;

    #[test]
    fn test_box_properties() {
        let b = cuboid(Point3::new(0.0, 0.0, 0.0), Point3::new(40.0, 40.0, 5.0));
        assert_eq!(b.vertex_count(), 8);
        assert_eq!(b.triangle_count(), 12);
        assert_relative_eq!(b.volume(), 8000.0, epsilon = 1e-9);
        assert!(b.signed_volume() > 0.0);
        assert_relative_eq!(b.surface_area(), 2.0 * (1600.0 + 200.0 + 200.0), epsilon = 1e-9);
        let c = b.centroid();
        assert_relative_eq!(c.x, 20.0, epsilon = 1e-9);
        assert_relative_eq!(c.z, 2.5, epsilon = 1e-9);
        assert!(b.is_watertight());
        assert!(b.is_winding_consistent());
        assert_eq!(b.boundary_edge_count(), 0);
    }

    #[test]
    fn test_open_mesh_is_not_watertight() {
        let mut b = cuboid(Point3::origin(), Point3::new(1.0, 1.0, 1.0));
        b.triangles.pop();
        assert!(!b.is_watertight());
        assert_eq!(b.boundary_edge_count(), 3);
        assert!(!Solid::empty().is_watertight());
    }

    #[test]
    fn test_flipped_face_breaks_winding() {
        let mut b = cuboid(Point3::origin(), Point3::new(1.0, 1.0, 1.0));
        b.triangles[0].swap(1, 2);
        assert!(b.is_watertight());
        assert!(!b.is_winding_consistent());
    }

    #[test]
    fn test_mirror_keeps_outward_winding() {
        let b = cuboid(Point3::origin(), Point3::new(1.0, 2.0, 3.0));
        let m = b.transformed(&Transform::scale(-1.0, 1.0, 1.0));
        assert!(m.signed_volume() > 0.0);
        assert_relative_eq!(m.bounds().min.x, -1.0);
    }

    #[test]
    fn test_merge_and_translate() {
        let a = cuboid(Point3::origin(), Point3::new(1.0, 1.0, 1.0));
        let b = a.clone().translated(&Vec3::new(5.0, 0.0, 0.0));
        let m = Solid::concat([a, b]);
        assert_eq!(m.triangle_count(), 24);
        assert_relative_eq!(m.volume(), 2.0, epsilon = 1e-9);
        assert_relative_eq!(m.bounds().max.x, 6.0);
        assert!(m.is_watertight());
    }

    #[test]
    fn test_cylinder_volume() {
        let c = cylinder(Point3::origin(), 10.0, 2.0, 128);
        assert!(c.is_watertight());
        assert_relative_eq!(c.volume(), PI * 100.0 * 2.0, max_relative = 1e-2);
    }
}
