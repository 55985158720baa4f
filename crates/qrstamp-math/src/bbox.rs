//! Axis-aligned bounding boxes.
//!
//! `Aabb3` drives the boolean preflight overlap check; `Aabb2` is the
//! planar footprint of a base solid.

use crate::{Point2, Point3, Vec3};

/// Axis-aligned bounding box in 3D.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb3 {
    /// Minimum corner.
    pub min: Point3,
    /// Maximum corner.
    pub max: Point3,
}

impl Aabb3 {
    /// Create an AABB from min and max corners.
    pub fn new(min: Point3, max: Point3) -> Self {
        Self { min, max }
    }

    /// Create an empty (inverted) AABB suitable for expansion.
    pub fn empty() -> Self {
        Self {
            min: Point3::new(f64::INFINITY, f64::INFINITY, f64::INFINITY),
            max: Point3::new(f64::NEG_INFINITY, f64::NEG_INFINITY, f64::NEG_INFINITY),
        }
    }

    /// Bounding box of a point set.
    pub fn from_points<'a>(points: impl IntoIterator<Item = &'a Point3>) -> Self {
        let mut aabb = Self::empty();
        for p in points {
            aabb.include_point(p);
        }
        aabb
    }

    /// True if no point was ever included.
    pub fn is_empty(&self) -> bool {
        self.min.x > self.max.x || self.min.y > self.max.y || self.min.z > self.max.z
    }

    /// Expand this AABB to include a point.
    pub fn include_point(&mut self, p: &Point3) {
        self.min.x = self.min.x.min(p.x);
        self.min.y = self.min.y.min(p.y);
        self.min.z = self.min.z.min(p.z);
        self.max.x = self.max.x.max(p.x);
        self.max.y = self.max.y.max(p.y);
        self.max.z = self.max.z.max(p.z);
    }

    /// Test if two AABBs overlap (touching counts as overlap).
    pub fn overlaps(&self, other: &Aabb3) -> bool {
        self.min.x <= other.max.x
            && self.max.x >= other.min.x
            && self.min.y <= other.max.y
            && self.max.y >= other.min.y
            && self.min.z <= other.max.z
            && self.max.z >= other.min.z
    }

    /// Per-axis overlap flags `[x, y, z]`, strict (touching does not count).
    ///
    /// Engraving needs interpenetration, so tangent boxes report `false`.
    pub fn overlap_axes(&self, other: &Aabb3) -> [bool; 3] {
        [
            self.min.x < other.max.x && self.max.x > other.min.x,
            self.min.y < other.max.y && self.max.y > other.min.y,
            self.min.z < other.max.z && self.max.z > other.min.z,
        ]
    }

    /// Size along each axis.
    pub fn extent(&self) -> Vec3 {
        self.max - self.min
    }

    /// Center point.
    pub fn center(&self) -> Point3 {
        Point3::from((self.min.coords + self.max.coords) * 0.5)
    }

    /// Projection onto the XY plane.
    pub fn xy(&self) -> Aabb2 {
        Aabb2::new(
            Point2::new(self.min.x, self.min.y),
            Point2::new(self.max.x, self.max.y),
        )
    }
}

/// Axis-aligned rectangle in the placement plane.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb2 {
    /// Minimum corner.
    pub min: Point2,
    /// Maximum corner.
    pub max: Point2,
}

impl Aabb2 {
    /// Create a rectangle from min and max corners.
    pub fn new(min: Point2, max: Point2) -> Self {
        Self { min, max }
    }

    /// Create an empty (inverted) rectangle suitable for expansion.
    pub fn empty() -> Self {
        Self {
            min: Point2::new(f64::INFINITY, f64::INFINITY),
            max: Point2::new(f64::NEG_INFINITY, f64::NEG_INFINITY),
        }
    }

    /// Expand to include a point.
    pub fn include_point(&mut self, p: &Point2) {
        self.min.x = self.min.x.min(p.x);
        self.min.y = self.min.y.min(p.y);
        self.max.x = self.max.x.max(p.x);
        self.max.y = self.max.y.max(p.y);
    }

    /// Width along X.
    pub fn width(&self) -> f64 {
        self.max.x - self.min.x
    }

    /// Height along Y.
    pub fn height(&self) -> f64 {
        self.max.y - self.min.y
    }

    /// Center point.
    pub fn center(&self) -> Point2 {
        Point2::from((self.min.coords + self.max.coords) * 0.5)
    }

    /// Closed containment test.
    pub fn contains(&self, p: &Point2) -> bool {
        p.x >= self.min.x && p.x <= self.max.x && p.y >= self.min.y && p.y <= self.max.y
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aabb_overlap() {
        let a = Aabb3::new(Point3::new(0.0, 0.0, 0.0), Point3::new(10.0, 10.0, 10.0));
        let b = Aabb3::new(Point3::new(5.0, 5.0, 5.0), Point3::new(15.0, 15.0, 15.0));
        assert!(a.overlaps(&b));
        assert!(b.overlaps(&a));
        assert_eq!(a.overlap_axes(&b), [true, true, true]);

        let c = Aabb3::new(Point3::new(20.0, 20.0, 20.0), Point3::new(30.0, 30.0, 30.0));
        assert!(!a.overlaps(&c));
    }

    #[test]
    fn test_touching_is_not_interpenetration() {
        let a = Aabb3::new(Point3::new(0.0, 0.0, 0.0), Point3::new(10.0, 10.0, 10.0));
        let b = Aabb3::new(Point3::new(0.0, 0.0, 10.0), Point3::new(10.0, 10.0, 12.0));
        assert!(a.overlaps(&b));
        assert_eq!(a.overlap_axes(&b), [true, true, false]);
    }

    #[test]
    fn test_from_points_and_empty() {
        assert!(Aabb3::empty().is_empty());
        let pts = [Point3::new(1.0, -2.0, 3.0), Point3::new(-1.0, 2.0, 0.0)];
        let b = Aabb3::from_points(pts.iter());
        assert!(!b.is_empty());
        assert!((b.extent().x - 2.0).abs() < 1e-12);
        assert!((b.extent().y - 4.0).abs() < 1e-12);
        assert!((b.center().z - 1.5).abs() < 1e-12);
    }

    #[test]
    fn test_aabb2() {
        let mut r = Aabb2::empty();
        r.include_point(&Point2::new(-1.0, 0.0));
        r.include_point(&Point2::new(3.0, 2.0));
        assert!((r.width() - 4.0).abs() < 1e-12);
        assert!((r.height() - 2.0).abs() < 1e-12);
        assert!(r.contains(&Point2::new(0.0, 1.0)));
        assert!(!r.contains(&Point2::new(0.0, 2.5)));
    }
}
