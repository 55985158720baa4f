//! Result validation.

use qrstamp_math::Point3;
use qrstamp_mesh::{point_in_solid, Solid};
use serde::Serialize;

use crate::stamp::StampMode;

/// What to do with a combined solid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    /// Ship it.
    Accept,
    /// Not watertight; repair and check again.
    Retry,
    /// Nothing usable.
    GiveUp,
}

/// Checks on a combined solid.
#[derive(Debug, Clone, Serialize)]
pub struct ValidationReport {
    /// Vertices in the result.
    pub vertex_count: usize,
    /// Triangles in the result.
    pub triangle_count: usize,
    /// Closed two-manifold edges.
    pub watertight: bool,
    /// `result - base` vertex count.
    pub vertex_delta: i64,
    /// Minimum `|vertex_delta|` that counts as a change.
    pub change_threshold: usize,
    /// `|vertex_delta| >= change_threshold`.
    pub changed: bool,
    /// Non-fatal findings.
    pub warnings: Vec<String>,
    /// Decision.
    pub verdict: Verdict,
}

impl ValidationReport {
    /// Final decision for a result that was already repaired once: a
    /// non-empty result that is still open is kept and flagged. Never
    /// returns [`Verdict::Retry`].
    pub fn settle(mut self) -> Self {
        if self.verdict == Verdict::Retry {
            self.warnings.push(
                "result still not watertight after repair; kept as is, check it in the slicer"
                    .into(),
            );
            self.verdict = Verdict::Accept;
        }
        self
    }
}

/// Vertex-count change expected from stamping `active` of `total` modules.
pub fn change_threshold(active: usize, total: usize) -> usize {
    if total == 0 {
        return 1;
    }
    (100 * active).div_ceil(total).max(1)
}

/// Whether the mark shows at `sample`, a point halfway through one active
/// module's depth: engraving leaves it outside the result, embossing
/// inside.
pub fn mark_present(result: &Solid, sample: &Point3, mode: StampMode) -> bool {
    let inside = point_in_solid(sample, result);
    match mode {
        StampMode::Engrave => !inside,
        StampMode::Emboss => inside,
    }
}

/// Validate `result` against the `base` it was made from.
pub fn validate(result: &Solid, base: &Solid, active: usize, total: usize) -> ValidationReport {
    let vertex_count = result.vertex_count();
    let triangle_count = result.triangle_count();
    let watertight = result.is_watertight();
    let vertex_delta = vertex_count as i64 - base.vertex_count() as i64;
    let threshold = change_threshold(active, total);
    let changed = vertex_delta.unsigned_abs() as usize >= threshold;

    let mut warnings = Vec::new();
    if !changed {
        warnings.push(format!(
            "vertex count changed by {vertex_delta} (threshold {threshold}); \
             the boolean may have silently done nothing"
        ));
    }
    if vertex_count > 0 && !watertight {
        warnings.push(format!(
            "result is not watertight ({} open edges)",
            result.boundary_edge_count()
        ));
    }

    let verdict = if vertex_count == 0 || triangle_count == 0 {
        Verdict::GiveUp
    } else if !watertight {
        Verdict::Retry
    } else {
        Verdict::Accept
    };

    ValidationReport {
        vertex_count,
        triangle_count,
        watertight,
        vertex_delta,
        change_threshold: threshold,
        changed,
        warnings,
        verdict,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use qrstamp_booleans::{BooleanBackend, BspBackend};
    use qrstamp_mesh::primitives::cuboid;

    #[test]
    fn test_threshold() {
        assert_eq!(change_threshold(312, 625), 50);
        assert_eq!(change_threshold(1, 1000), 1);
        assert_eq!(change_threshold(0, 0), 1);
    }

    #[test]
    fn test_unchanged_result_warns_but_accepts() {
        let base = cuboid(Point3::origin(), Point3::new(1.0, 1.0, 1.0));
        let report = validate(&base, &base, 10, 20);
        assert_eq!(report.verdict, Verdict::Accept);
        assert!(!report.changed);
        assert_eq!(report.warnings.len(), 1);
    }

    #[test]
    fn test_open_and_empty() {
        let base = cuboid(Point3::origin(), Point3::new(1.0, 1.0, 1.0));
        let mut open = base.clone();
        open.triangles.pop();
        assert_eq!(validate(&open, &base, 1, 1).verdict, Verdict::Retry);
        assert_eq!(validate(&Solid::empty(), &base, 1, 1).verdict, Verdict::GiveUp);
    }

    #[test]
    fn test_settle_never_leaves_retry() {
        let base = cuboid(Point3::origin(), Point3::new(1.0, 1.0, 1.0));
        let mut open = base.clone();
        open.triangles.pop();
        let settled = validate(&open, &base, 1, 1).settle();
        assert_eq!(settled.verdict, Verdict::Accept);
        assert!(settled.warnings.iter().any(|w| w.contains("after repair")));
        let empty = validate(&Solid::empty(), &base, 1, 1).settle();
        assert_eq!(empty.verdict, Verdict::GiveUp);
    }

    #[test]
    fn test_mark_present_follows_the_mode() {
        let base = cuboid(Point3::origin(), Point3::new(10.0, 10.0, 2.0));
        let pocket = cuboid(Point3::new(4.0, 4.0, 1.5), Point3::new(6.0, 6.0, 3.0));
        let bsp = BspBackend::new();
        let engraved = bsp.difference(&base, &pocket).unwrap();
        let sample = Point3::new(5.0, 5.0, 1.75);
        assert!(mark_present(&engraved, &sample, StampMode::Engrave));
        assert!(!mark_present(&base, &sample, StampMode::Engrave));

        let boss = cuboid(Point3::new(4.0, 4.0, 1.9), Point3::new(6.0, 6.0, 2.5));
        let embossed = bsp.union(&base, &boss).unwrap();
        let above = Point3::new(5.0, 5.0, 2.25);
        assert!(mark_present(&embossed, &above, StampMode::Emboss));
        assert!(!mark_present(&base, &above, StampMode::Emboss));
    }
}
