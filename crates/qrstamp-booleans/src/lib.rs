#![warn(missing_docs)]

//! Boolean operations on triangle-mesh solids.
//!
//! Backends are capabilities behind the [`BooleanBackend`] trait so the
//! combination engine can rotate through them:
//! - **bsp**: in-process BSP polygon-soup CSG
//! - **bsp-snapped**: the same engine on grid-snapped input with a coarser
//!   plane tolerance, for nearly coincident geometry
//! - **openscad**: an out-of-process CSG renderer
//!
//! Mesh healing (repair, decimation) sits behind [`MeshHealer`].

mod bsp;
mod error;
mod openscad;

pub use bsp::BspBackend;
pub use error::{BooleanError, Result};
pub use openscad::OpenScadBackend;

use qrstamp_math::Tolerance;
use qrstamp_mesh::{RepairStats, Solid};

/// CSG boolean operation type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BooleanOp {
    /// Union: combine both solids.
    Union,
    /// Difference: subtract the tool from the target.
    Difference,
    /// Intersection: keep only the overlapping region.
    Intersection,
}

impl std::fmt::Display for BooleanOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            BooleanOp::Union => "union",
            BooleanOp::Difference => "difference",
            BooleanOp::Intersection => "intersection",
        })
    }
}

/// A boolean engine.
///
/// Calls may be slow and may fail; callers run them under a timeout.
pub trait BooleanBackend: Send + Sync {
    /// Short stable name used in logs and configuration.
    fn name(&self) -> &str;

    /// Compute `a op b`. An empty result is returned as-is, not as an error.
    fn apply(&self, a: &Solid, b: &Solid, op: BooleanOp) -> Result<Solid>;

    /// `a - b`.
    fn difference(&self, a: &Solid, b: &Solid) -> Result<Solid> {
        self.apply(a, b, BooleanOp::Difference)
    }

    /// `a ∪ b`.
    fn union(&self, a: &Solid, b: &Solid) -> Result<Solid> {
        self.apply(a, b, BooleanOp::Union)
    }

    /// `a ∩ b`.
    fn intersection(&self, a: &Solid, b: &Solid) -> Result<Solid> {
        self.apply(a, b, BooleanOp::Intersection)
    }
}

/// Mesh healing capability: repair and decimation.
pub trait MeshHealer: Send + Sync {
    /// Weld, clean, orient and close a mesh.
    fn repair(&self, solid: Solid) -> (Solid, RepairStats);

    /// Reduce the face count to about `target_ratio` of the input.
    fn decimate(&self, solid: &Solid, target_ratio: f64) -> Solid;
}

/// Healer backed by the in-process mesh routines.
#[derive(Debug, Clone, Copy, Default)]
pub struct KernelHealer {
    /// Weld and degeneracy tolerances.
    pub tolerance: Tolerance,
}

impl MeshHealer for KernelHealer {
    fn repair(&self, solid: Solid) -> (Solid, RepairStats) {
        qrstamp_mesh::repair_mesh(solid, &self.tolerance)
    }

    fn decimate(&self, solid: &Solid, target_ratio: f64) -> Solid {
        qrstamp_mesh::decimate(solid, target_ratio)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use qrstamp_math::Point3;
    use qrstamp_mesh::primitives::cuboid;

    #[test]
    fn test_op_display() {
        assert_eq!(BooleanOp::Difference.to_string(), "difference");
    }

    #[test]
    fn test_kernel_healer_closes_open_box() {
        let mut b = cuboid(Point3::origin(), Point3::new(1.0, 1.0, 1.0));
        b.triangles.truncate(11);
        let (fixed, stats) = KernelHealer::default().repair(b);
        assert!(fixed.is_watertight());
        assert_eq!(stats.holes_filled, 1);
    }
}
