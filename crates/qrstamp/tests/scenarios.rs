//! End-to-end scenarios on in-memory bases.

use std::f64::consts::SQRT_2;
use std::sync::Arc;

use approx::assert_relative_eq;
use qrstamp::{
    analyze_footprint, build_stamp, encode, AlgorithmKind, CombinationEngine, CombineOutcome,
    EncodeOptions, ErrorLevel, Face, FootprintKind, OutputMode, Pipeline, RunJournal,
    StampConfig, StampError, StampMode, StampSpec,
};
use qrstamp_booleans::{BooleanBackend, BooleanOp, BspBackend};
use qrstamp_math::{Point2, Point3};
use qrstamp_mesh::io::{load_parts, save_parts};
use qrstamp_mesh::primitives::{cuboid, cylinder};
use qrstamp_mesh::Solid;

fn plate() -> Solid {
    cuboid(Point3::origin(), Point3::new(40.0, 40.0, 5.0))
}

fn bsp_only(config: &StampConfig) -> CombinationEngine {
    let backends: Vec<Arc<dyn BooleanBackend>> =
        vec![Arc::new(BspBackend::new()), Arc::new(BspBackend::snapped())];
    CombinationEngine::new(backends).with_options(config.combine.options())
}

#[test]
fn engrave_hello_on_a_plate() {
    let mut config = StampConfig::default();
    config.encode.level = ErrorLevel::M;
    config.stamp.target_size_mm = 22.0;
    config.stamp.depth_mm = 0.3;
    config.stamp.margin_mm = 0.5;
    let pipeline = Pipeline::new(config.clone()).unwrap().with_engine(bsp_only(&config));

    let mut journal = RunJournal::new();
    let run = pipeline.run("HELLO", plate(), &mut journal).unwrap();

    assert_eq!(run.grid.module_count(), 33);
    assert_relative_eq!(run.placement.spec.module_size_mm, 22.0 / 33.0, epsilon = 1e-12);
    assert!(run.placement.clamped_from.is_none());

    let sb = run.stamp.bounds();
    assert_relative_eq!(sb.min.z, 4.7, epsilon = 1e-9);
    assert_relative_eq!(sb.max.z, 5.01, epsilon = 1e-9);
    assert_relative_eq!(sb.extent().x, 22.0, epsilon = 1e-9);
    assert_relative_eq!(sb.center().x, 20.0, epsilon = 1e-9);

    assert!(run.outcome.as_ref().is_some_and(CombineOutcome::is_combined));
    let rb = run.solid.bounds();
    assert!(rb.min.z >= -1e-9 && rb.max.z <= 5.0 + 1e-9);

    let report = run.validation.as_ref().unwrap();
    assert!(report.changed);
    assert!(report.vertex_delta >= report.change_threshold as i64);
    // material was removed
    assert!(run.solid.volume() < plate().volume() - 1.0);
    assert!(!journal.stage("validate").any(|e| e.message.contains("not marked")));
}

#[test]
fn emboss_on_the_bottom_face_with_boxes() {
    let mut config = StampConfig::default();
    config.encode.min_version = 1;
    config.stamp.mode = StampMode::Emboss;
    config.stamp.face = Face::Bottom;
    config.stamp.algorithm = AlgorithmKind::Box;
    config.stamp.target_size_mm = 21.0;
    let pipeline = Pipeline::new(config.clone()).unwrap().with_engine(bsp_only(&config));

    let mut journal = RunJournal::new();
    let run = pipeline.run("A", plate(), &mut journal).unwrap();
    let sb = run.stamp.bounds();
    assert_relative_eq!(sb.min.z, -0.3, epsilon = 1e-9);
    assert_relative_eq!(sb.max.z, 0.01, epsilon = 1e-9);
    assert!(run.outcome.as_ref().is_some_and(CombineOutcome::is_combined));
    assert!(run.solid.volume() > plate().volume() + 1.0);
    assert!(!journal.stage("validate").any(|e| e.message.contains("not marked")));
}

#[test]
fn disc_clamps_to_inscribed_square() {
    let disc = cylinder(Point3::origin(), 10.0, 3.0, 128);
    let mut config = StampConfig::default();
    config.footprint.kind = FootprintKind::Circle;
    config.stamp.target_size_mm = 28.0;
    config.stamp.margin_mm = 0.5;
    config.output.mode = OutputMode::Separate;
    let pipeline = Pipeline::new(config).unwrap();

    let mut journal = RunJournal::new();
    let run = pipeline.run("HELLO", disc, &mut journal).unwrap();
    let expected = 20.0 / SQRT_2 - 1.0;
    assert_eq!(run.placement.clamped_from, Some(28.0));
    assert_relative_eq!(run.placement.extent(), expected, epsilon = 1e-6);
    assert_eq!(run.placement.dropped, 0);
    assert!(journal.stage("place").any(|e| e.message.contains("reduced")));

    // every placed module sits inside the disc
    let r2 = run
        .stamp
        .vertices
        .iter()
        .map(|v| v.x * v.x + v.y * v.y)
        .fold(0.0, f64::max);
    assert!(r2.sqrt() <= 10.0);
}

#[test]
fn section_extent_keeps_most_modules() {
    let disc = cylinder(Point3::origin(), 12.0, 2.0, 96);
    let fp = analyze_footprint(&disc, FootprintKind::Section, Face::Top, 0.05).unwrap();
    let margin = 0.5;
    let side = fp.max_safe_extent(margin);
    assert!(side > 10.0);

    let n = 25;
    let size = side / n as f64;
    let c = fp.center();
    let mut inside = 0;
    for y in 0..n {
        for x in 0..n {
            let p = Point2::new(
                c.x + (x as f64 + 0.5 - n as f64 / 2.0) * size,
                c.y + (y as f64 + 0.5 - n as f64 / 2.0) * size,
            );
            if fp.contains_with_margin(&p, margin) {
                inside += 1;
            }
        }
    }
    assert!(inside as f64 >= 0.95 * (n * n) as f64);
}

#[test]
fn section_footprint_run_places_modules_inside() {
    let holed = BspBackend::new()
        .difference(
            &plate(),
            &cuboid(Point3::new(30.0, 30.0, -1.0), Point3::new(34.0, 34.0, 6.0)),
        )
        .unwrap();
    let mut config = StampConfig::default();
    config.footprint.kind = FootprintKind::Section;
    config.stamp.target_size_mm = 30.0;
    config.output.mode = OutputMode::Separate;
    let pipeline = Pipeline::new(config.clone()).unwrap();

    let mut journal = RunJournal::new();
    let run = pipeline.run("HELLO", holed.clone(), &mut journal).unwrap();
    assert!(run.placement.clamped_from.is_some());

    let fp = analyze_footprint(&holed, FootprintKind::Section, Face::Top, 0.05).unwrap();
    let grid = &run.placement.grid;
    assert!(grid.active_count() > 0);
    for (x, y) in grid.active() {
        let world = run.placement.module_center(x, y, 0.0);
        let p = Point2::new(world.x, world.y);
        assert!(fp.contains(&p), "module ({x}, {y}) at {p:?}");
        assert!(fp.contains_with_margin(&p, config.stamp.margin_mm));
    }
    // the stamp stays clear of the hole
    let sb = run.stamp.bounds();
    assert!(sb.max.x < 30.0 && sb.max.y < 30.0);
}

#[test]
fn both_algorithms_span_the_full_grid() {
    let grid = encode("https://example.com/k/1", &EncodeOptions::default()).unwrap();
    let spec = StampSpec {
        module_size_mm: 0.75,
        depth_mm: 0.4,
        z_offset_mm: 0.01,
        rotation_180: false,
        mode: StampMode::Engrave,
        face: Face::Top,
    };
    let expected = grid.module_count() as f64 * spec.module_size_mm;
    for kind in [AlgorithmKind::Box, AlgorithmKind::Contour] {
        let s = build_stamp(&grid, &spec, kind.algorithm().as_ref()).unwrap();
        let e = s.bounds().extent();
        assert!((e.x - expected).abs() < 0.05 * spec.module_size_mm, "{kind:?}");
        assert!((e.y - expected).abs() < 0.05 * spec.module_size_mm, "{kind:?}");
    }
}

#[test]
fn stamp_outside_the_base_is_no_overlap() {
    let engine = CombinationEngine::new(vec![Arc::new(BspBackend::new()) as Arc<dyn BooleanBackend>]);
    let stamp = cuboid(Point3::new(10.0, 10.0, 9.0), Point3::new(20.0, 20.0, 9.3));
    let mut journal = RunJournal::new();
    let err = engine
        .combine(plate(), stamp, BooleanOp::Difference, &mut journal)
        .unwrap_err();
    assert!(matches!(err, StampError::NoOverlap(_)));
    // the nudge was attempted and logged
    assert!(journal.stage("combine").any(|e| e.message.contains("nudging")));
}

#[test]
fn empty_stamp_is_idempotent() {
    let engine = CombinationEngine::new(vec![Arc::new(BspBackend::new()) as Arc<dyn BooleanBackend>]);
    let mut journal = RunJournal::new();
    let tool = cuboid(Point3::new(10.0, 10.0, 4.0), Point3::new(12.0, 12.0, 6.0));
    let once = engine
        .combine(plate(), tool, BooleanOp::Difference, &mut journal)
        .unwrap();
    let again = engine
        .combine(once.solid.clone(), Solid::empty(), BooleanOp::Difference, &mut journal)
        .unwrap();
    assert_eq!(again.outcome, CombineOutcome::Unchanged);
    assert_eq!(again.solid, once.solid);
}

#[test]
fn separate_mode_exports_two_objects() {
    let mut config = StampConfig::default();
    config.output.mode = OutputMode::Separate;
    let pipeline = Pipeline::new(config).unwrap();
    let mut journal = RunJournal::new();
    let run = pipeline.run("tag-7", plate(), &mut journal).unwrap();
    assert!(run.outcome.is_none());
    assert_eq!(run.solid, run.base);

    let dir = std::env::temp_dir().join(format!("qrstamp-it-{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join("tag.3mf");
    let written = save_parts(&run.parts(), &path).unwrap();
    assert_eq!(written, path);
    let parts = load_parts(&path).unwrap();
    assert_eq!(parts.len(), 2);
    assert_eq!(parts[0].name, "base");
    assert_eq!(parts[1].name, "qr");
    assert!(parts[1].solid.is_watertight());

    let report = run.report(&journal);
    let json = serde_json::to_string(&report).unwrap();
    assert!(json.contains("\"placed_modules\""));
    std::fs::remove_dir_all(&dir).ok();
}

#[test]
fn touching_stamp_is_nudged_into_the_base() {
    let engine = CombinationEngine::new(vec![Arc::new(BspBackend::new()) as Arc<dyn BooleanBackend>]);
    let stamp = cuboid(Point3::new(10.0, 10.0, 5.0), Point3::new(12.0, 12.0, 5.3));
    let mut journal = RunJournal::new();
    let c = engine
        .combine(plate(), stamp, BooleanOp::Difference, &mut journal)
        .unwrap();
    assert!(c.outcome.is_combined());
    assert_relative_eq!(c.solid.bounds().max.z, 5.0, epsilon = 1e-9);
    assert!(c.solid.volume() < plate().volume());
}
