//! End-to-end stamping run.
//!
//! Stages run strictly in order: encode, footprint, place, build, combine,
//! validate. Each records into the caller's [`RunJournal`]. Nothing is
//! written to disk here; the caller exports [`StampRun::parts`].

use qrstamp_mesh::io::NamedPart;
use qrstamp_mesh::Solid;
use serde::Serialize;
use tracing::instrument;

use crate::combine::{Attempt, CombinationEngine, CombineOutcome};
use crate::config::{OutputMode, StampConfig};
use crate::encoder::encode;
use crate::error::Result;
use crate::footprint::analyze_footprint;
use crate::grid::ModuleGrid;
use crate::journal::{Entry, RunJournal};
use crate::placement::{Placement, PlacementPlanner};
use crate::stamp::{build_stamp, StampMode, StampSpec};
use crate::validate::{mark_present, validate, ValidationReport, Verdict};

/// A configured pipeline.
#[derive(Debug, Clone)]
pub struct Pipeline {
    config: StampConfig,
    engine: CombinationEngine,
}

/// Everything a run produced.
#[derive(Debug, Clone)]
pub struct StampRun {
    /// Output mode the run used.
    pub mode: OutputMode,
    /// Base as loaded.
    pub base: Solid,
    /// Placed stamp in world coordinates.
    pub stamp: Solid,
    /// Final solid: the combination result, or the base when the
    /// combination failed or was skipped.
    pub solid: Solid,
    /// Encoded grid before footprint filtering.
    pub grid: ModuleGrid,
    /// Sizing and placement decisions.
    pub placement: Placement,
    /// Combination outcome, if a boolean ran.
    pub outcome: Option<CombineOutcome>,
    /// Kernel calls made.
    pub attempts: Vec<Attempt>,
    /// Final validation, if a boolean ran.
    pub validation: Option<ValidationReport>,
}

impl StampRun {
    /// Objects to export: one combined solid, or base and stamp.
    pub fn parts(&self) -> Vec<NamedPart> {
        match self.mode {
            OutputMode::Combined => vec![NamedPart::new("qrstamp", self.solid.clone())],
            OutputMode::Separate => vec![
                NamedPart::new("base", self.base.clone()),
                NamedPart::new("qr", self.stamp.clone()),
            ],
        }
    }

    /// Serializable summary including the journal.
    pub fn report(&self, journal: &RunJournal) -> RunReport {
        RunReport {
            modules: self.grid.module_count(),
            active_modules: self.grid.active_count(),
            placed_modules: self.placement.grid.active_count(),
            dropped_modules: self.placement.dropped,
            module_size_mm: self.placement.spec.module_size_mm,
            stamp_side_mm: self.placement.extent(),
            clamped_from_mm: self.placement.clamped_from,
            base_triangles: self.base.triangle_count(),
            stamp_triangles: self.stamp.triangle_count(),
            result_triangles: self.solid.triangle_count(),
            outcome: self.outcome.clone(),
            attempts: self.attempts.clone(),
            validation: self.validation.clone(),
            journal: journal.entries().to_vec(),
        }
    }
}

/// Machine-readable run summary.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    /// Grid side in modules.
    pub modules: usize,
    /// Active modules after encoding.
    pub active_modules: usize,
    /// Active modules after footprint filtering.
    pub placed_modules: usize,
    /// Modules dropped by the footprint.
    pub dropped_modules: usize,
    /// Final module size.
    pub module_size_mm: f64,
    /// Final stamp side.
    pub stamp_side_mm: f64,
    /// Requested side when it was reduced.
    pub clamped_from_mm: Option<f64>,
    /// Base triangles.
    pub base_triangles: usize,
    /// Stamp triangles.
    pub stamp_triangles: usize,
    /// Result triangles.
    pub result_triangles: usize,
    /// Combination outcome.
    pub outcome: Option<CombineOutcome>,
    /// Kernel calls.
    pub attempts: Vec<Attempt>,
    /// Validation.
    pub validation: Option<ValidationReport>,
    /// Journal entries.
    pub journal: Vec<Entry>,
}

impl Pipeline {
    /// Build a pipeline from validated configuration.
    pub fn new(config: StampConfig) -> Result<Self> {
        config.validate()?;
        let engine =
            CombinationEngine::new(config.combine.backends()?).with_options(config.combine.options());
        Ok(Self { config, engine })
    }

    /// Replace the combination engine.
    pub fn with_engine(mut self, engine: CombinationEngine) -> Self {
        self.engine = engine;
        self
    }

    /// Active configuration.
    pub fn config(&self) -> &StampConfig {
        &self.config
    }

    /// Stamp `payload` onto `base`.
    #[instrument(skip_all, fields(payload_len = payload.len()))]
    pub fn run(&self, payload: &str, base: Solid, journal: &mut RunJournal) -> Result<StampRun> {
        let cfg = &self.config;

        let grid = encode(payload, &cfg.encode)?;
        journal.record(
            "encode",
            format!(
                "{} bytes at level {} -> {}x{} modules, {} active",
                payload.len(),
                cfg.encode.level,
                grid.cols(),
                grid.rows(),
                grid.active_count()
            ),
        );

        let footprint = analyze_footprint(
            &base,
            cfg.footprint.kind,
            cfg.stamp.face,
            cfg.footprint.section_offset_mm,
        )?;
        let fb = footprint.bounds();
        journal.record(
            "footprint",
            format!(
                "{:?} footprint {:.2} x {:.2} mm, safe extent {:.2} mm",
                cfg.footprint.kind,
                fb.width(),
                fb.height(),
                footprint.max_safe_extent(cfg.stamp.margin_mm)
            ),
        );

        let spec = StampSpec {
            module_size_mm: cfg.stamp.target_size_mm / grid.module_count().max(1) as f64,
            depth_mm: cfg.stamp.depth_mm,
            z_offset_mm: cfg.stamp.z_offset_mm,
            rotation_180: cfg.stamp.rotation_180,
            mode: cfg.stamp.mode,
            face: cfg.stamp.face,
        };
        let placement = PlacementPlanner::new(&footprint, base.bounds())
            .with_target_size(cfg.stamp.target_size_mm)
            .with_margin(cfg.stamp.margin_mm)
            .with_strictness(cfg.footprint.strictness)
            .plan(&grid, &spec, journal)?;

        let algorithm = cfg.stamp.algorithm.algorithm();
        let local = build_stamp(&placement.grid, &placement.spec, algorithm.as_ref())?;
        let stamp = local.transformed(&placement.transform);
        let sb = stamp.bounds();
        journal.record(
            "build",
            format!(
                "{} stamp: {} triangles, z {:.3}..{:.3}",
                algorithm.name(),
                stamp.triangle_count(),
                sb.min.z,
                sb.max.z
            ),
        );

        if cfg.output.mode == OutputMode::Separate {
            journal.record("combine", "separate output, boolean skipped");
            return Ok(StampRun {
                mode: OutputMode::Separate,
                solid: base.clone(),
                base,
                stamp,
                grid,
                placement,
                outcome: None,
                attempts: Vec::new(),
                validation: None,
            });
        }

        let combination =
            self.engine
                .combine(base.clone(), stamp.clone(), placement.spec.mode.op(), journal)?;
        let mut solid = combination.solid;
        let active = placement.grid.active_count();
        let total = placement.grid.total();

        let mut report = validate(&solid, &base, active, total);
        if report.verdict == Verdict::Retry && combination.outcome.is_combined() {
            match self.engine.repair("validate", solid.clone())? {
                Some((repaired, stats)) => {
                    journal.warn(
                        "validate",
                        format!(
                            "result not watertight, repaired ({} holes filled, {} faces flipped)",
                            stats.holes_filled, stats.flipped_faces
                        ),
                    );
                    solid = repaired;
                }
                None => journal.warn("validate", "result not watertight and repair failed"),
            }
            report = validate(&solid, &base, active, total).settle();
        } else {
            report = report.settle();
        }
        if report.verdict == Verdict::GiveUp {
            journal.warn("validate", "result unusable, writing the base unmodified");
            solid = base.clone();
        } else if combination.outcome.is_combined() {
            if let Some((x, y)) = placement.grid.active().next() {
                let half = placement.spec.depth_mm / 2.0;
                let z = match placement.spec.mode {
                    StampMode::Engrave => -half,
                    StampMode::Emboss => half,
                };
                let sample = placement.module_center(x, y, z);
                if !mark_present(&solid, &sample, placement.spec.mode) {
                    report.warnings.push(format!(
                        "module ({x}, {y}) is not marked in the result; the boolean may have missed the stamp"
                    ));
                }
            }
        }
        for w in &report.warnings {
            journal.warn("validate", w.clone());
        }
        journal.record(
            "validate",
            format!(
                "{:?}: {} vertices ({:+}), watertight {}",
                report.verdict, report.vertex_count, report.vertex_delta, report.watertight
            ),
        );

        Ok(StampRun {
            mode: OutputMode::Combined,
            base,
            stamp,
            solid,
            grid,
            placement,
            outcome: Some(combination.outcome),
            attempts: combination.attempts,
            validation: Some(report),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use qrstamp_booleans::{BooleanBackend, BooleanOp, MeshHealer};
    use qrstamp_math::Point3;
    use qrstamp_mesh::primitives::cuboid;
    use qrstamp_mesh::RepairStats;
    use std::sync::Arc;

    /// Returns the base with one face missing.
    struct Leaky;

    impl BooleanBackend for Leaky {
        fn name(&self) -> &str {
            "leaky"
        }

        fn apply(&self, a: &Solid, _b: &Solid, _op: BooleanOp) -> qrstamp_booleans::Result<Solid> {
            let mut out = a.clone();
            out.triangles.pop();
            Ok(out)
        }
    }

    /// Healer that changes nothing.
    struct Inert;

    impl MeshHealer for Inert {
        fn repair(&self, solid: Solid) -> (Solid, RepairStats) {
            (solid, RepairStats::default())
        }

        fn decimate(&self, solid: &Solid, _target_ratio: f64) -> Solid {
            solid.clone()
        }
    }

    fn plate() -> Solid {
        cuboid(Point3::origin(), Point3::new(40.0, 40.0, 5.0))
    }

    fn leaky_pipeline(healer: Option<Arc<dyn MeshHealer>>) -> Pipeline {
        let config = StampConfig::default();
        let mut engine = CombinationEngine::new(vec![Arc::new(Leaky) as Arc<dyn BooleanBackend>])
            .with_options(config.combine.options());
        if let Some(h) = healer {
            engine = engine.with_healer(h);
        }
        Pipeline::new(config).unwrap().with_engine(engine)
    }

    #[test]
    fn test_open_result_is_repaired_by_engine_healer() {
        let mut journal = RunJournal::new();
        let run = leaky_pipeline(None).run("HELLO", plate(), &mut journal).unwrap();
        let report = run.validation.unwrap();
        assert_eq!(report.verdict, Verdict::Accept);
        assert!(report.watertight);
        assert!(run.solid.is_watertight());
        assert!(journal.stage("validate").any(|e| e.message.contains("repaired")));
        // the leaky kernel never cut anything
        assert!(report.warnings.iter().any(|w| w.contains("not marked")));
    }

    #[test]
    fn test_unrepairable_result_gets_a_final_verdict() {
        let mut journal = RunJournal::new();
        let run = leaky_pipeline(Some(Arc::new(Inert)))
            .run("HELLO", plate(), &mut journal)
            .unwrap();
        let report = run.validation.unwrap();
        assert_ne!(report.verdict, Verdict::Retry);
        assert_eq!(report.verdict, Verdict::Accept);
        assert!(!report.watertight);
        assert!(report.warnings.iter().any(|w| w.contains("after repair")));
        assert!(!run.solid.is_watertight());
    }
}
