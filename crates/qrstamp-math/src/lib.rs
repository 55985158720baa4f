#![warn(missing_docs)]

//! Math types for the qrstamp pipeline.
//!
//! Thin wrappers around nalgebra: points and vectors in millimeters,
//! rigid/affine placement transforms, bounding boxes and tolerances.

mod bbox;

pub use bbox::{Aabb2, Aabb3};

use nalgebra::{Matrix4, Vector3, Vector4};

/// A point in 3D space.
pub type Point3 = nalgebra::Point3<f64>;

/// A vector in 3D space.
pub type Vec3 = Vector3<f64>;

/// A point in the placement plane.
pub type Point2 = nalgebra::Point2<f64>;

/// A 4x4 affine transformation matrix.
#[derive(Debug, Clone, PartialEq)]
pub struct Transform {
    /// The underlying 4x4 matrix.
    pub matrix: Matrix4<f64>,
}

impl Transform {
    /// Identity transform.
    pub fn identity() -> Self {
        Self {
            matrix: Matrix4::identity(),
        }
    }

    /// Translation by `(dx, dy, dz)`.
    pub fn translation(dx: f64, dy: f64, dz: f64) -> Self {
        let mut m = Matrix4::identity();
        m[(0, 3)] = dx;
        m[(1, 3)] = dy;
        m[(2, 3)] = dz;
        Self { matrix: m }
    }

    /// Non-uniform scale by `(sx, sy, sz)`.
    pub fn scale(sx: f64, sy: f64, sz: f64) -> Self {
        let mut m = Matrix4::identity();
        m[(0, 0)] = sx;
        m[(1, 1)] = sy;
        m[(2, 2)] = sz;
        Self { matrix: m }
    }

    /// Rotation about the X axis by `angle` radians.
    pub fn rotation_x(angle: f64) -> Self {
        let (s, c) = angle.sin_cos();
        let mut m = Matrix4::identity();
        m[(1, 1)] = c;
        m[(1, 2)] = -s;
        m[(2, 1)] = s;
        m[(2, 2)] = c;
        Self { matrix: m }
    }

    /// Rotation about the Z axis by `angle` radians.
    pub fn rotation_z(angle: f64) -> Self {
        let (s, c) = angle.sin_cos();
        let mut m = Matrix4::identity();
        m[(0, 0)] = c;
        m[(0, 1)] = -s;
        m[(1, 0)] = s;
        m[(1, 1)] = c;
        Self { matrix: m }
    }

    /// Compose: `self * other`, so `other` is applied first.
    pub fn then(&self, other: &Transform) -> Self {
        Self {
            matrix: self.matrix * other.matrix,
        }
    }

    /// Transform a point.
    pub fn apply_point(&self, p: &Point3) -> Point3 {
        let v = self.matrix * Vector4::new(p.x, p.y, p.z, 1.0);
        Point3::new(v.x, v.y, v.z)
    }

    /// Transform a direction vector (translation is ignored).
    pub fn apply_vec(&self, v: &Vec3) -> Vec3 {
        let r = self.matrix * Vector4::new(v.x, v.y, v.z, 0.0);
        Vec3::new(r.x, r.y, r.z)
    }

    /// Determinant of the linear (upper-left 3x3) part.
    pub fn linear_determinant(&self) -> f64 {
        self.matrix.fixed_view::<3, 3>(0, 0).determinant()
    }

    /// True if the transform mirrors space, so triangle winding must flip.
    pub fn reverses_orientation(&self) -> bool {
        self.linear_determinant() < 0.0
    }

    /// Inverse of this transform, if it exists.
    pub fn inverse(&self) -> Option<Self> {
        self.matrix.try_inverse().map(|matrix| Self { matrix })
    }
}

impl Default for Transform {
    fn default() -> Self {
        Self::identity()
    }
}

/// Tolerance constants for geometric comparisons.
#[derive(Debug, Clone, Copy)]
pub struct Tolerance {
    /// Linear distance tolerance in mm.
    pub linear: f64,
    /// Grid used to quantize positions when welding coincident vertices.
    pub weld: f64,
}

impl Tolerance {
    /// Mesh tolerances (1e-6 mm linear, 1e-5 mm weld grid).
    pub const DEFAULT: Self = Self {
        linear: 1e-6,
        weld: 1e-5,
    };

    /// Check if two points are coincident within tolerance.
    pub fn points_equal(&self, a: &Point3, b: &Point3) -> bool {
        (a - b).norm() < self.linear
    }

    /// Quantize a point onto the weld grid.
    ///
    /// Two points with the same key are treated as one vertex.
    pub fn weld_key(&self, p: &Point3) -> [i64; 3] {
        [
            (p.x / self.weld).round() as i64,
            (p.y / self.weld).round() as i64,
            (p.z / self.weld).round() as i64,
        ]
    }
}

impl Default for Tolerance {
    fn default() -> Self {
        Self::DEFAULT
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::f64::consts::PI;

    #[test]
    fn test_translation() {
        let t = Transform::translation(10.0, 20.0, 30.0);
        let r = t.apply_point(&Point3::new(1.0, 2.0, 3.0));
        assert_relative_eq!(r.x, 11.0);
        assert_relative_eq!(r.y, 22.0);
        assert_relative_eq!(r.z, 33.0);
    }

    #[test]
    fn test_rotation_z_90() {
        let r = Transform::rotation_z(PI / 2.0).apply_point(&Point3::new(1.0, 0.0, 0.0));
        assert!(r.x.abs() < 1e-12);
        assert!((r.y - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_rotation_x_180_flips_z_and_y() {
        let r = Transform::rotation_x(PI).apply_point(&Point3::new(1.0, 2.0, 3.0));
        assert!((r.x - 1.0).abs() < 1e-12);
        assert!((r.y + 2.0).abs() < 1e-12);
        assert!((r.z + 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_then_applies_right_operand_first() {
        let t1 = Transform::translation(1.0, 0.0, 0.0);
        let t2 = Transform::scale(2.0, 2.0, 2.0);
        // t1 first: origin -> (1,0,0) -> (2,0,0)
        let r = t2.then(&t1).apply_point(&Point3::origin());
        assert!((r.x - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_apply_vec_ignores_translation() {
        let t = Transform::translation(5.0, 5.0, 5.0);
        let v = t.apply_vec(&Vec3::new(0.0, 0.0, 1.0));
        assert_relative_eq!(v.z, 1.0);
        assert_relative_eq!(v.x, 0.0);
    }

    #[test]
    fn test_orientation() {
        assert!(!Transform::rotation_x(PI).reverses_orientation());
        assert!(!Transform::rotation_z(PI).reverses_orientation());
        assert!(Transform::scale(-1.0, 1.0, 1.0).reverses_orientation());
    }

    #[test]
    fn test_inverse_roundtrip() {
        let t = Transform::translation(1.0, 2.0, 3.0).then(&Transform::rotation_z(0.3));
        let Some(inv) = t.inverse() else {
            panic!("rigid transform must be invertible");
        };
        let p = Point3::new(5.0, 6.0, 7.0);
        let r = t.then(&inv).apply_point(&p);
        assert!((r - p).norm() < 1e-12);
    }

    #[test]
    fn test_weld_key() {
        let tol = Tolerance::DEFAULT;
        let a = Point3::new(1.0, 2.0, 3.0);
        let b = Point3::new(1.0 + 1e-7, 2.0, 3.0 - 1e-7);
        assert_eq!(tol.weld_key(&a), tol.weld_key(&b));
        let c = Point3::new(1.001, 2.0, 3.0);
        assert_ne!(tol.weld_key(&a), tol.weld_key(&c));
        assert!(tol.points_equal(&a, &b));
    }
}
