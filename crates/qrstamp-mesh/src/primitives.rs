//! Primitive solid builders.

use std::f64::consts::TAU;

use qrstamp_math::{Point3, Vec3};

use crate::Solid;

/// Axis-aligned box spanning `min` to `max`.
pub fn cuboid(min: Point3, max: Point3) -> Solid {
    let vertices = vec![
        Point3::new(min.x, min.y, min.z),
        Point3::new(max.x, min.y, min.z),
        Point3::new(max.x, max.y, min.z),
        Point3::new(min.x, max.y, min.z),
        Point3::new(min.x, min.y, max.z),
        Point3::new(max.x, min.y, max.z),
        Point3::new(max.x, max.y, max.z),
        Point3::new(min.x, max.y, max.z),
    ];
    let triangles = vec![
        // bottom
        [0, 2, 1],
        [0, 3, 2],
        // top
        [4, 5, 6],
        [4, 6, 7],
        // front (y = min)
        [0, 1, 5],
        [0, 5, 4],
        // back (y = max)
        [2, 3, 7],
        [2, 7, 6],
        // left (x = min)
        [0, 4, 7],
        [0, 7, 3],
        // right (x = max)
        [1, 2, 6],
        [1, 6, 5],
    ];
    Solid::new(vertices, triangles)
}

/// Box of the given size centered at `center`.
pub fn centered_box(center: Point3, sx: f64, sy: f64, sz: f64) -> Solid {
    let h = Vec3::new(sx / 2.0, sy / 2.0, sz / 2.0);
    cuboid(center - h, center + h)
}

/// Z-aligned cylinder (disc) whose bottom face is centered at `base_center`.
pub fn cylinder(base_center: Point3, radius: f64, height: f64, segments: u32) -> Solid {
    let n = segments.max(3);
    let mut vertices = Vec::with_capacity(2 * n as usize + 2);
    vertices.push(base_center);
    vertices.push(Point3::new(base_center.x, base_center.y, base_center.z + height));
    for level in [0.0, height] {
        for i in 0..n {
            let (s, c) = (TAU * i as f64 / n as f64).sin_cos();
            vertices.push(Point3::new(
                base_center.x + radius * c,
                base_center.y + radius * s,
                base_center.z + level,
            ));
        }
    }

    let ring = |i: u32| 2 + i % n;
    let top = |i: u32| 2 + n + i % n;
    let mut triangles = Vec::with_capacity(4 * n as usize);
    for i in 0..n {
        triangles.push([0, ring(i + 1), ring(i)]);
        triangles.push([1, top(i), top(i + 1)]);
        triangles.push([ring(i), ring(i + 1), top(i + 1)]);
        triangles.push([ring(i), top(i + 1), top(i)]);
    }
    Solid::new(vertices, triangles)
}
