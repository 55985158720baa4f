//! Sizing and positioning the stamp against the base.

use std::f64::consts::PI;

use qrstamp_math::{Aabb3, Point2, Point3, Transform};
use serde::{Deserialize, Serialize};

use crate::error::{GeometryDegenerateError, Result};
use crate::footprint::Footprint;
use crate::grid::ModuleGrid;
use crate::journal::RunJournal;
use crate::stamp::{Face, StampSpec};

const STAGE: &str = "place";

/// Which points of a module must be inside the footprint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Strictness {
    /// The module center.
    #[default]
    Center,
    /// All four corners.
    Corners,
}

/// Result of planning.
#[derive(Debug, Clone)]
pub struct Placement {
    /// Spec with the final (possibly clamped) module size.
    pub spec: StampSpec,
    /// Local stamp frame to world.
    pub transform: Transform,
    /// Grid with modules outside the footprint removed.
    pub grid: ModuleGrid,
    /// Modules removed by footprint filtering.
    pub dropped: usize,
    /// Requested stamp side, if it had to be reduced.
    pub clamped_from: Option<f64>,
    /// Z of the marked face.
    pub surface_z: f64,
}

impl Placement {
    /// Final stamp side in mm.
    pub fn extent(&self) -> f64 {
        self.spec.extent(self.grid.module_count())
    }

    /// World position of module `(x, y)`'s center at local height `z`.
    pub fn module_center(&self, x: usize, y: usize, z: f64) -> Point3 {
        let s = self.spec.module_size_mm;
        let (hx, hy) = (self.grid.cols() as f64 / 2.0, self.grid.rows() as f64 / 2.0);
        self.transform.apply_point(&Point3::new(
            (x as f64 + 0.5 - hx) * s,
            (y as f64 + 0.5 - hy) * s,
            z,
        ))
    }
}

/// Plans module size, transform and module filtering for one base.
#[derive(Debug, Clone, Copy)]
pub struct PlacementPlanner<'a> {
    footprint: &'a Footprint,
    base_bounds: Aabb3,
    target_size_mm: f64,
    margin_mm: f64,
    strictness: Strictness,
}

impl<'a> PlacementPlanner<'a> {
    /// Planner for `footprint` on a base with `base_bounds`.
    pub fn new(footprint: &'a Footprint, base_bounds: Aabb3) -> Self {
        Self {
            footprint,
            base_bounds,
            target_size_mm: 22.0,
            margin_mm: 0.5,
            strictness: Strictness::Center,
        }
    }

    /// Requested stamp side in mm.
    pub fn with_target_size(mut self, mm: f64) -> Self {
        self.target_size_mm = mm;
        self
    }

    /// Clearance kept from the footprint edge.
    pub fn with_margin(mut self, mm: f64) -> Self {
        self.margin_mm = mm;
        self
    }

    /// Module containment strictness.
    pub fn with_strictness(mut self, strictness: Strictness) -> Self {
        self.strictness = strictness;
        self
    }

    /// Module size for a grid `modules` wide, clamped to the footprint's
    /// safe extent. Returns the size and, if clamped, the requested side.
    pub fn resolve_module_size(
        &self,
        modules: usize,
        journal: &mut RunJournal,
    ) -> Result<(f64, Option<f64>)> {
        if modules == 0 {
            return Err(GeometryDegenerateError::EmptyGrid.into());
        }
        if !(self.target_size_mm > 0.0) {
            return Err(GeometryDegenerateError::InvalidSpec(format!(
                "target size must be positive, got {}",
                self.target_size_mm
            ))
            .into());
        }
        let safe = self.footprint.max_safe_extent(self.margin_mm);
        if safe <= 0.0 {
            return Err(GeometryDegenerateError::FootprintTooSmall(safe).into());
        }
        let (side, clamped_from) = if self.target_size_mm > safe {
            journal.warn(
                STAGE,
                format!(
                    "stamp reduced from {:.2} mm to {:.2} mm to fit the footprint",
                    self.target_size_mm, safe
                ),
            );
            (safe, Some(self.target_size_mm))
        } else {
            (self.target_size_mm, None)
        };
        Ok((side / modules as f64, clamped_from))
    }

    /// Z of the marked face.
    pub fn surface_z(&self, face: Face) -> f64 {
        match face {
            Face::Top => self.base_bounds.max.z,
            Face::Bottom => self.base_bounds.min.z,
        }
    }

    /// Local-to-world transform: optional 180° turn about the normal, face
    /// selection, then translation onto the footprint center at the surface.
    pub fn transform(&self, spec: &StampSpec) -> Transform {
        let c = self.footprint.center();
        let mut t = Transform::translation(c.x, c.y, self.surface_z(spec.face));
        if spec.face == Face::Bottom {
            t = t.then(&Transform::rotation_x(PI));
        }
        if spec.rotation_180 {
            t = t.then(&Transform::rotation_z(PI));
        }
        t
    }

    /// Drop modules whose test points fall outside the footprint. Boxes are
    /// fitted by the size clamp and are not filtered.
    pub fn filter_modules(
        &self,
        grid: &ModuleGrid,
        spec: &StampSpec,
        transform: &Transform,
    ) -> Result<ModuleGrid> {
        if self.footprint.is_rectangular() {
            return Ok(grid.clone());
        }
        let s = spec.module_size_mm;
        let (hx, hy) = (grid.cols() as f64 / 2.0, grid.rows() as f64 / 2.0);
        let world = |lx: f64, ly: f64| {
            let p = transform.apply_point(&Point3::new((lx - hx) * s, (ly - hy) * s, 0.0));
            Point2::new(p.x, p.y)
        };
        let filtered = grid.filtered(|x, y| {
            let (fx, fy) = (x as f64, y as f64);
            match self.strictness {
                Strictness::Center => self
                    .footprint
                    .contains_with_margin(&world(fx + 0.5, fy + 0.5), self.margin_mm),
                Strictness::Corners => [(0.0, 0.0), (1.0, 0.0), (1.0, 1.0), (0.0, 1.0)]
                    .iter()
                    .all(|(dx, dy)| {
                        self.footprint
                            .contains_with_margin(&world(fx + dx, fy + dy), self.margin_mm)
                    }),
            }
        });
        if filtered.active_count() == 0 {
            return Err(GeometryDegenerateError::NoModulesInsideFootprint.into());
        }
        Ok(filtered)
    }

    /// Full plan for `grid`, starting from `spec` (whose module size is
    /// replaced).
    pub fn plan(
        &self,
        grid: &ModuleGrid,
        spec: &StampSpec,
        journal: &mut RunJournal,
    ) -> Result<Placement> {
        let (module_size_mm, clamped_from) =
            self.resolve_module_size(grid.module_count(), journal)?;
        let spec = StampSpec {
            module_size_mm,
            ..*spec
        };
        let transform = self.transform(&spec);
        let kept = self.filter_modules(grid, &spec, &transform)?;
        let dropped = grid.active_count() - kept.active_count();
        if dropped > 0 {
            journal.warn(
                STAGE,
                format!("{dropped} modules outside the footprint were dropped"),
            );
        }
        let c = self.footprint.center();
        journal.record(
            STAGE,
            format!(
                "module {:.3} mm, side {:.2} mm, centered at ({:.2}, {:.2}) on {:?} face z={:.3}",
                module_size_mm,
                spec.extent(grid.module_count()),
                c.x,
                c.y,
                spec.face,
                self.surface_z(spec.face)
            ),
        );
        Ok(Placement {
            spec,
            transform,
            grid: kept,
            dropped,
            clamped_from,
            surface_z: self.surface_z(spec.face),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::footprint::{analyze_footprint, FootprintKind};
    use crate::stamp::StampMode;
    use approx::assert_relative_eq;
    use qrstamp_mesh::primitives::{cuboid, cylinder};

    fn spec(face: Face) -> StampSpec {
        StampSpec {
            module_size_mm: 1.0,
            depth_mm: 0.3,
            z_offset_mm: 0.01,
            rotation_180: false,
            mode: StampMode::Engrave,
            face,
        }
    }

    fn full(n: usize) -> ModuleGrid {
        ModuleGrid::from_raster(&vec![vec![true; n]; n])
    }

    #[test]
    fn test_box_keeps_requested_size() {
        let base = cuboid(Point3::origin(), Point3::new(40.0, 40.0, 5.0));
        let fp = analyze_footprint(&base, FootprintKind::Box, Face::Top, 0.05).unwrap();
        let planner = PlacementPlanner::new(&fp, base.bounds()).with_target_size(22.0);
        let mut j = RunJournal::new();
        let plan = planner.plan(&full(25), &spec(Face::Top), &mut j).unwrap();
        assert_relative_eq!(plan.spec.module_size_mm, 0.88, epsilon = 1e-12);
        assert!(plan.clamped_from.is_none());
        assert_eq!(plan.dropped, 0);
        let origin = plan.transform.apply_point(&Point3::origin());
        assert_relative_eq!(origin, Point3::new(20.0, 20.0, 5.0));
        assert!(!j.has_warnings());
    }

    #[test]
    fn test_circle_clamps_and_logs() {
        let disc = cylinder(Point3::origin(), 10.0, 3.0, 128);
        let fp = analyze_footprint(&disc, FootprintKind::Circle, Face::Top, 0.05).unwrap();
        let planner = PlacementPlanner::new(&fp, disc.bounds())
            .with_target_size(28.0)
            .with_margin(2.0);
        let mut j = RunJournal::new();
        let plan = planner.plan(&full(21), &spec(Face::Top), &mut j).unwrap();
        let expected = 20.0 / 2f64.sqrt() - 4.0;
        assert_relative_eq!(plan.extent(), expected, epsilon = 1e-6);
        assert_eq!(plan.clamped_from, Some(28.0));
        assert_eq!(plan.dropped, 0);
        assert!(j.stage("place").any(|e| e.message.contains("reduced")));
    }

    #[test]
    fn test_bottom_face_points_down() {
        let base = cuboid(Point3::origin(), Point3::new(10.0, 10.0, 4.0));
        let fp = analyze_footprint(&base, FootprintKind::Box, Face::Bottom, 0.05).unwrap();
        let planner = PlacementPlanner::new(&fp, base.bounds());
        let t = planner.transform(&spec(Face::Bottom));
        let deep = t.apply_point(&Point3::new(0.0, 0.0, -0.3));
        assert_relative_eq!(deep.z, 0.3, epsilon = 1e-12);
        let n = t.apply_vec(&qrstamp_math::Vec3::z());
        assert_relative_eq!(n.z, -1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_rotation_180_turns_about_normal() {
        let base = cuboid(Point3::origin(), Point3::new(10.0, 10.0, 4.0));
        let fp = analyze_footprint(&base, FootprintKind::Box, Face::Top, 0.05).unwrap();
        let planner = PlacementPlanner::new(&fp, base.bounds());
        let mut sp = spec(Face::Top);
        sp.rotation_180 = true;
        let p = planner.transform(&sp).apply_point(&Point3::new(1.0, 2.0, 0.0));
        assert_relative_eq!(p, Point3::new(4.0, 3.0, 4.0), epsilon = 1e-12);
    }

    #[test]
    fn test_corner_strictness_drops_more() {
        let disc = cylinder(Point3::origin(), 10.0, 3.0, 128);
        let fp = analyze_footprint(&disc, FootprintKind::Circle, Face::Top, 0.05).unwrap();
        let planner = PlacementPlanner::new(&fp, disc.bounds()).with_margin(0.0);
        let sp = spec(Face::Top);
        let t = planner.transform(&sp);
        let grid = full(20);
        let centers = planner.filter_modules(&grid, &sp, &t).unwrap();
        let corners = planner
            .with_strictness(Strictness::Corners)
            .filter_modules(&grid, &sp, &t)
            .unwrap();
        assert!(centers.active_count() < 400);
        assert!(corners.active_count() < centers.active_count());
    }

    #[test]
    fn test_nothing_inside_is_error() {
        let disc = cylinder(Point3::origin(), 1.0, 3.0, 32);
        let fp = analyze_footprint(&disc, FootprintKind::Circle, Face::Top, 0.05).unwrap();
        let planner = PlacementPlanner::new(&fp, disc.bounds()).with_margin(0.0);
        let sp = StampSpec {
            module_size_mm: 3.0,
            ..spec(Face::Top)
        };
        // a 2x2 grid of 3 mm modules has no module center within 1 mm
        let err = planner
            .filter_modules(&full(2), &sp, &planner.transform(&sp))
            .unwrap_err();
        assert!(err.to_string().contains("no module"));
    }
}
