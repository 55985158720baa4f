//! Planar sections: intersect a solid with a horizontal plane.

use std::collections::HashMap;

use qrstamp_math::{Aabb2, Point2, Point3};
use rayon::prelude::*;

use crate::Solid;

/// A closed planar polygon.
#[derive(Debug, Clone, PartialEq)]
pub struct Polygon2 {
    /// Vertices in order; the closing edge is implicit.
    pub points: Vec<Point2>,
}

impl Polygon2 {
    /// Create a new polygon from points.
    pub fn new(points: Vec<Point2>) -> Self {
        Self { points }
    }

    /// Number of vertices.
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Check if the polygon is empty.
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Signed area. Positive for counter-clockwise.
    pub fn signed_area(&self) -> f64 {
        let n = self.points.len();
        if n < 3 {
            return 0.0;
        }
        let mut area = 0.0;
        for i in 0..n {
            let j = (i + 1) % n;
            area += self.points[i].x * self.points[j].y;
            area -= self.points[j].x * self.points[i].y;
        }
        area / 2.0
    }

    /// Is the polygon counter-clockwise?
    pub fn is_ccw(&self) -> bool {
        self.signed_area() > 0.0
    }

    /// Reverse the winding order.
    pub fn reverse(&mut self) {
        self.points.reverse();
    }

    /// Ensure counter-clockwise winding.
    pub fn ensure_ccw(&mut self) {
        if !self.is_ccw() {
            self.reverse();
        }
    }

    /// Ensure clockwise winding.
    pub fn ensure_cw(&mut self) {
        if self.is_ccw() {
            self.reverse();
        }
    }

    /// Perimeter length.
    pub fn perimeter(&self) -> f64 {
        self.edges().map(|(a, b)| (b - a).norm()).sum()
    }

    /// Area centroid. Falls back to the vertex average for zero-area loops.
    pub fn centroid(&self) -> Point2 {
        let a = self.signed_area();
        if a.abs() < 1e-12 {
            if self.points.is_empty() {
                return Point2::origin();
            }
            let n = self.points.len() as f64;
            let (sx, sy) = self
                .points
                .iter()
                .fold((0.0, 0.0), |(x, y), p| (x + p.x, y + p.y));
            return Point2::new(sx / n, sy / n);
        }
        let (mut cx, mut cy) = (0.0, 0.0);
        for (p, q) in self.edges() {
            let cross = p.x * q.y - q.x * p.y;
            cx += (p.x + q.x) * cross;
            cy += (p.y + q.y) * cross;
        }
        Point2::new(cx / (6.0 * a), cy / (6.0 * a))
    }

    /// Bounding rectangle.
    pub fn bounds(&self) -> Aabb2 {
        let mut b = Aabb2::empty();
        for p in &self.points {
            b.include_point(p);
        }
        b
    }

    /// Iterate edges `(p[i], p[i+1])`, including the closing edge.
    pub fn edges(&self) -> impl Iterator<Item = (Point2, Point2)> + '_ {
        let n = self.points.len();
        (0..n).map(move |i| (self.points[i], self.points[(i + 1) % n]))
    }

    /// Winding number of the loop around `p`.
    ///
    /// +1 inside a CCW loop, -1 inside a CW loop, 0 outside.
    pub fn winding_number(&self, p: &Point2) -> i32 {
        let mut wn = 0;
        for (a, b) in self.edges() {
            let side = (b.x - a.x) * (p.y - a.y) - (p.x - a.x) * (b.y - a.y);
            if a.y <= p.y {
                if b.y > p.y && side > 0.0 {
                    wn += 1;
                }
            } else if b.y <= p.y && side < 0.0 {
                wn -= 1;
            }
        }
        wn
    }

    /// Distance from `p` to the nearest point on the boundary.
    pub fn distance_to_boundary(&self, p: &Point2) -> f64 {
        self.edges()
            .map(|(a, b)| point_segment_distance(p, &a, &b))
            .fold(f64::INFINITY, f64::min)
    }
}

/// Euclidean distance from `p` to segment `ab`.
pub fn point_segment_distance(p: &Point2, a: &Point2, b: &Point2) -> f64 {
    let ab = b - a;
    let len2 = ab.norm_squared();
    if len2 < 1e-24 {
        return (p - a).norm();
    }
    let t = ((p - a).dot(&ab) / len2).clamp(0.0, 1.0);
    (p - (a + ab * t)).norm()
}

/// Section a solid with the plane `z = const`.
///
/// Returns closed loops oriented by nesting depth: outer boundaries are
/// counter-clockwise, holes clockwise, whatever the mesh's own winding.
/// Loops are sorted by decreasing absolute area.
pub fn section_at_z(solid: &Solid, z: f64) -> Vec<Polygon2> {
    let segments: Vec<(Point2, Point2)> = (0..solid.triangle_count())
        .into_par_iter()
        .filter_map(|i| triangle_plane_intersection(&solid.triangle(i), z))
        .collect();

    let mut loops = chain_segments(&segments);
    orient_by_nesting(&mut loops);
    loops.sort_by(|a, b| b.signed_area().abs().total_cmp(&a.signed_area().abs()));
    loops
}

/// Intersect a triangle with a horizontal plane at Z.
/// Returns the segment projected to XY if the plane crosses the triangle.
fn triangle_plane_intersection(tri: &[Point3; 3], z: f64) -> Option<(Point2, Point2)> {
    let eps = 1e-10;
    let d = [tri[0].z - z, tri[1].z - z, tri[2].z - z];

    if d.iter().all(|&x| x > eps) || d.iter().all(|&x| x < -eps) {
        return None;
    }
    // Coplanar triangles produce no segment; their neighbors do.
    if d.iter().all(|&x| x.abs() <= eps) {
        return None;
    }

    let mut points: Vec<Point2> = Vec::with_capacity(2);
    for k in 0..3 {
        let (ia, ib) = (k, (k + 1) % 3);
        let (da, db) = (d[ia], d[ib]);
        if (da > eps && db < -eps) || (da < -eps && db > eps) {
            // Interpolate from the lexicographically smaller endpoint so the
            // two triangles sharing this edge produce bit-identical points.
            let (pa, pb, da, db) = if lex_less(&tri[ia], &tri[ib]) {
                (tri[ia], tri[ib], da, db)
            } else {
                (tri[ib], tri[ia], db, da)
            };
            let t = da / (da - db);
            points.push(Point2::new(
                pa.x + t * (pb.x - pa.x),
                pa.y + t * (pb.y - pa.y),
            ));
        } else if da.abs() <= eps && db.abs() > eps {
            points.push(Point2::new(tri[ia].x, tri[ia].y));
        }
    }

    points.dedup_by(|a, b| (*a - *b).norm_squared() < eps * eps);
    if points.len() >= 2 && (points[0] - points[1]).norm_squared() >= eps * eps {
        Some((points[0], points[1]))
    } else {
        None
    }
}

fn lex_less(a: &Point3, b: &Point3) -> bool {
    (a.x, a.y, a.z) < (b.x, b.y, b.z)
}

fn point_key(p: &Point2) -> (i64, i64) {
    const Q: f64 = 1e6;
    ((p.x * Q).round() as i64, (p.y * Q).round() as i64)
}

/// Chain unordered segments into closed loops.
///
/// Segments are treated as undirected; open chains of at least three
/// points are closed implicitly.
fn chain_segments(segments: &[(Point2, Point2)]) -> Vec<Polygon2> {
    let mut by_point: HashMap<(i64, i64), Vec<usize>> = HashMap::new();
    for (i, (a, b)) in segments.iter().enumerate() {
        by_point.entry(point_key(a)).or_default().push(i);
        by_point.entry(point_key(b)).or_default().push(i);
    }

    let mut used = vec![false; segments.len()];
    let mut contours = Vec::new();

    for start in 0..segments.len() {
        if used[start] {
            continue;
        }
        used[start] = true;
        let (first, second) = segments[start];
        let start_key = point_key(&first);
        let mut chain = vec![first, second];
        let mut tip = second;

        loop {
            let tip_key = point_key(&tip);
            if tip_key == start_key {
                chain.pop();
                break;
            }
            let next = by_point
                .get(&tip_key)
                .and_then(|cands| cands.iter().copied().find(|&c| !used[c]));
            let Some(next) = next else {
                break;
            };
            used[next] = true;
            let (a, b) = segments[next];
            tip = if point_key(&a) == tip_key { b } else { a };
            chain.push(tip);
        }

        if chain.len() >= 3 {
            contours.push(Polygon2::new(chain));
        }
    }

    contours
}

/// Orient loops so outer boundaries are CCW and holes are CW.
fn orient_by_nesting(loops: &mut [Polygon2]) {
    let depths: Vec<usize> = loops
        .iter()
        .enumerate()
        .map(|(i, l)| {
            let sample = l.points[0];
            loops
                .iter()
                .enumerate()
                .filter(|&(j, other)| j != i && other.winding_number(&sample) != 0)
                .count()
        })
        .collect();
    for (l, depth) in loops.iter_mut().zip(depths) {
        if depth % 2 == 0 {
            l.ensure_ccw();
        } else {
            l.ensure_cw();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::primitives::{cuboid, cylinder};
    use approx::assert_relative_eq;
    use std::f64::consts::PI;

    fn square(x0: f64, y0: f64, s: f64) -> Polygon2 {
        Polygon2::new(vec![
            Point2::new(x0, y0),
            Point2::new(x0 + s, y0),
            Point2::new(x0 + s, y0 + s),
            Point2::new(x0, y0 + s),
        ])
    }

    #[test]
    fn test_polygon_measures() {
        let sq = square(0.0, 0.0, 2.0);
        assert_relative_eq!(sq.signed_area(), 4.0);
        assert!(sq.is_ccw());
        assert_relative_eq!(sq.perimeter(), 8.0);
        let c = sq.centroid();
        assert_relative_eq!(c.x, 1.0);
        assert_relative_eq!(c.y, 1.0);
        assert_eq!(sq.winding_number(&Point2::new(1.0, 1.0)), 1);
        assert_eq!(sq.winding_number(&Point2::new(3.0, 1.0)), 0);
        assert_relative_eq!(sq.distance_to_boundary(&Point2::new(1.0, 0.5)), 0.5);
    }

    #[test]
    fn test_section_box() {
        let b = cuboid(Point3::new(0.0, 0.0, 0.0), Point3::new(10.0, 20.0, 5.0));
        let loops = section_at_z(&b, 4.99);
        assert_eq!(loops.len(), 1);
        assert!(loops[0].is_ccw());
        assert_relative_eq!(loops[0].signed_area(), 200.0, epsilon = 1e-6);
        let bb = loops[0].bounds();
        assert_relative_eq!(bb.width(), 10.0, epsilon = 1e-9);
        assert_relative_eq!(bb.height(), 20.0, epsilon = 1e-9);
    }

    #[test]
    fn test_section_miss() {
        let b = cuboid(Point3::origin(), Point3::new(1.0, 1.0, 1.0));
        assert!(section_at_z(&b, 2.0).is_empty());
    }

    #[test]
    fn test_section_disc() {
        let c = cylinder(Point3::origin(), 10.0, 2.0, 64);
        let loops = section_at_z(&c, 1.0);
        assert_eq!(loops.len(), 1);
        let area = loops[0].signed_area();
        assert!(area > 0.0);
        assert_relative_eq!(area, PI * 100.0, max_relative = 0.01);
    }

    #[test]
    fn test_section_with_hole_orients_by_depth() {
        // A frame: outer box with the inner box reversed (a cavity).
        let mut frame = cuboid(Point3::new(0.0, 0.0, 0.0), Point3::new(10.0, 10.0, 2.0));
        let hole = cuboid(Point3::new(3.0, 3.0, -1.0), Point3::new(7.0, 7.0, 3.0)).reversed();
        frame.merge(&hole);
        let loops = section_at_z(&frame, 1.0);
        assert_eq!(loops.len(), 2);
        assert!(loops[0].is_ccw());
        assert!(!loops[1].is_ccw());
        let total: f64 = loops.iter().map(|l| l.signed_area()).sum();
        assert_relative_eq!(total, 100.0 - 16.0, epsilon = 1e-6);
    }

    #[test]
    fn test_section_inside_out_mesh_still_ccw() {
        let b = cuboid(Point3::origin(), Point3::new(4.0, 4.0, 4.0)).reversed();
        let loops = section_at_z(&b, 2.0);
        assert_eq!(loops.len(), 1);
        assert!(loops[0].is_ccw());
    }
}
