//! The base's usable placement area.
//!
//! A [`Footprint`] is derived once from the base solid and answers two
//! questions for the planner: is this XY point inside, and how large a
//! centered square fits.

use std::f64::consts::SQRT_2;

use qrstamp_math::{Aabb2, Point2};
use qrstamp_mesh::{section_at_z, Polygon2, Solid};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{GeometryDegenerateError, Result};
use crate::stamp::Face;

/// How to model the footprint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FootprintKind {
    /// Axis-aligned bounds.
    #[default]
    Box,
    /// Circle around the centroid; only for bases known to be round.
    Circle,
    /// True cross-section just inside the marked face.
    Section,
}

/// Usable area in the XY placement plane.
#[derive(Debug, Clone)]
pub enum Footprint {
    /// Rectangle from the base bounds.
    AxisAlignedBox(Aabb2),
    /// Disc.
    Circle {
        /// Center in XY.
        center: Point2,
        /// Radius in mm.
        radius: f64,
    },
    /// Planar cross-section. Outer loops are CCW, holes CW.
    Polygon {
        /// Section loops.
        loops: Vec<Polygon2>,
        /// Area centroid of the whole section.
        centroid: Point2,
    },
}

/// Derive the footprint of `base` for marking `face`.
///
/// `section_offset` is how far inside the face the section plane sits; a
/// plane exactly on the face would cut along its triangles' edges.
pub fn analyze_footprint(
    base: &Solid,
    kind: FootprintKind,
    face: Face,
    section_offset: f64,
) -> Result<Footprint> {
    if base.is_empty() {
        return Err(GeometryDegenerateError::InvalidSpec("base solid is empty".into()).into());
    }
    let bounds = base.bounds();
    let footprint = match kind {
        FootprintKind::Box => Footprint::AxisAlignedBox(bounds.xy()),
        FootprintKind::Circle => {
            let c = base.centroid();
            let center = Point2::new(c.x, c.y);
            let radius = base
                .vertices
                .iter()
                .map(|v| (Point2::new(v.x, v.y) - center).norm())
                .fold(0.0, f64::max);
            Footprint::Circle { center, radius }
        }
        FootprintKind::Section => {
            let z = match face {
                Face::Top => bounds.max.z - section_offset,
                Face::Bottom => bounds.min.z + section_offset,
            };
            let loops = section_at_z(base, z);
            if loops.is_empty() {
                return Err(GeometryDegenerateError::EmptySection(z).into());
            }
            let centroid = area_centroid(&loops);
            Footprint::Polygon { loops, centroid }
        }
    };
    debug!(?kind, ?face, "footprint analyzed");
    Ok(footprint)
}

fn area_centroid(loops: &[Polygon2]) -> Point2 {
    let mut area = 0.0;
    let mut acc = Point2::origin().coords;
    for l in loops {
        let a = l.signed_area();
        area += a;
        acc += l.centroid().coords * a;
    }
    if area.abs() < 1e-12 {
        return loops
            .first()
            .map(|l| l.bounds().center())
            .unwrap_or_else(Point2::origin);
    }
    Point2::from(acc / area)
}

impl Footprint {
    /// Where the stamp is centered.
    pub fn center(&self) -> Point2 {
        match self {
            Footprint::AxisAlignedBox(b) => b.center(),
            Footprint::Circle { center, .. } => *center,
            Footprint::Polygon { centroid, .. } => *centroid,
        }
    }

    /// XY bounds of the usable area.
    pub fn bounds(&self) -> Aabb2 {
        match self {
            Footprint::AxisAlignedBox(b) => *b,
            Footprint::Circle { center, radius } => Aabb2::new(
                Point2::new(center.x - radius, center.y - radius),
                Point2::new(center.x + radius, center.y + radius),
            ),
            Footprint::Polygon { loops, .. } => {
                let mut b = Aabb2::empty();
                for p in loops.iter().flat_map(|l| l.points.iter()) {
                    b.include_point(p);
                }
                b
            }
        }
    }

    /// True for the axis-aligned box footprint.
    pub fn is_rectangular(&self) -> bool {
        matches!(self, Footprint::AxisAlignedBox(_))
    }

    /// Closed containment test. Polygons use the non-zero winding rule.
    pub fn contains(&self, p: &Point2) -> bool {
        match self {
            Footprint::AxisAlignedBox(b) => b.contains(p),
            Footprint::Circle { center, radius } => (p - center).norm() <= *radius,
            Footprint::Polygon { loops, .. } => {
                loops.iter().map(|l| l.winding_number(p)).sum::<i32>() != 0
                    || self.on_boundary(p)
            }
        }
    }

    /// Inside and at least `margin` away from the boundary.
    pub fn contains_with_margin(&self, p: &Point2, margin: f64) -> bool {
        if margin <= 0.0 {
            return self.contains(p);
        }
        match self {
            Footprint::AxisAlignedBox(b) => {
                p.x >= b.min.x + margin
                    && p.x <= b.max.x - margin
                    && p.y >= b.min.y + margin
                    && p.y <= b.max.y - margin
            }
            Footprint::Circle { center, radius } => (p - center).norm() <= radius - margin,
            Footprint::Polygon { loops, .. } => {
                self.contains(p)
                    && loops
                        .iter()
                        .map(|l| l.distance_to_boundary(p))
                        .fold(f64::INFINITY, f64::min)
                        >= margin
            }
        }
    }

    fn on_boundary(&self, p: &Point2) -> bool {
        match self {
            Footprint::Polygon { loops, .. } => {
                loops.iter().any(|l| l.distance_to_boundary(p) < 1e-9)
            }
            _ => false,
        }
    }

    /// Side of the largest square, centered at [`center`](Self::center),
    /// that stays `margin` inside the footprint. May be zero or negative
    /// when nothing fits.
    pub fn max_safe_extent(&self, margin: f64) -> f64 {
        match self {
            Footprint::AxisAlignedBox(b) => b.width().min(b.height()) - 2.0 * margin,
            Footprint::Circle { radius, .. } => 2.0 * radius / SQRT_2 - 2.0 * margin,
            Footprint::Polygon { loops, centroid } => {
                polygon_safe_extent(self, loops, centroid, margin)
            }
        }
    }
}

const EXTENT_SAMPLES_PER_SIDE: usize = 24;
const EXTENT_ITERATIONS: usize = 40;

/// Binary search on the square side. A candidate fits if every boundary
/// sample is inside with margin and no section vertex lies strictly inside
/// the square (which would mean a notch the samples stepped over).
fn polygon_safe_extent(fp: &Footprint, loops: &[Polygon2], c: &Point2, margin: f64) -> f64 {
    let fits = |side: f64| {
        let h = side / 2.0;
        let n = EXTENT_SAMPLES_PER_SIDE;
        let boundary_ok = (0..n).all(|i| {
            let t = -h + side * i as f64 / n as f64;
            [
                Point2::new(c.x + t, c.y - h),
                Point2::new(c.x + h, c.y + t),
                Point2::new(c.x - t, c.y + h),
                Point2::new(c.x - h, c.y - t),
            ]
            .iter()
            .all(|p| fp.contains_with_margin(p, margin))
        });
        boundary_ok
            && !loops.iter().flat_map(|l| l.points.iter()).any(|p| {
                (p.x - c.x).abs() < h - 1e-9 && (p.y - c.y).abs() < h - 1e-9
            })
    };

    let b = fp.bounds();
    let (mut lo, mut hi) = (0.0, b.width().min(b.height()));
    if !fits(lo) {
        return -2.0 * margin;
    }
    for _ in 0..EXTENT_ITERATIONS {
        let mid = 0.5 * (lo + hi);
        if fits(mid) {
            lo = mid;
        } else {
            hi = mid;
        }
    }
    lo
}
