//! Point containment queries.

use qrstamp_math::{Point3, Vec3};

use crate::Solid;

/// Test whether `point` lies inside a closed solid.
///
/// Casts a ray along a slightly tilted direction so that it rarely grazes
/// edges or vertices, and counts crossings: odd = inside, even = outside.
pub fn point_in_solid(point: &Point3, solid: &Solid) -> bool {
    let ray_dir = Vec3::new(1.0, 1e-7, 1.3e-7);
    let mut crossings = 0u32;

    for i in 0..solid.triangle_count() {
        let [v0, v1, v2] = solid.triangle(i);

        // Möller-Trumbore ray-triangle intersection
        let edge1 = v1 - v0;
        let edge2 = v2 - v0;
        let h = ray_dir.cross(&edge2);
        let a = edge1.dot(&h);
        if a.abs() < 1e-12 {
            continue; // ray parallel to the triangle
        }

        let f = 1.0 / a;
        let s = point - v0;
        let u = f * s.dot(&h);
        if !(0.0..=1.0).contains(&u) {
            continue;
        }
        let q = s.cross(&edge1);
        let v = f * ray_dir.dot(&q);
        if v < 0.0 || u + v > 1.0 {
            continue;
        }
        let t = f * edge2.dot(&q);
        if t > 1e-12 {
            crossings += 1;
        }
    }

    crossings % 2 == 1
}
