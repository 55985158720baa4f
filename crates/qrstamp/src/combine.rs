//! Boolean combination with a fallback ladder.
//!
//! Boolean kernels fail in many ways on real meshes: they error, return
//! nothing, or stall. [`CombinationEngine::combine`] runs a preflight
//! overlap check and then an ordered list of [`RecoveryStrategy`] rungs,
//! stopping at the first non-empty result. When every rung fails the base
//! comes back untouched with [`CombineOutcome::Failed`]; only a missing
//! overlap or a timeout is an error.

use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use qrstamp_booleans::{BooleanBackend, BooleanError, BooleanOp, KernelHealer, MeshHealer};
use qrstamp_math::Vec3;
use qrstamp_mesh::{RepairStats, Solid};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::error::{Result, StampError};
use crate::journal::RunJournal;

const STAGE: &str = "combine";
const WORKER_STACK: usize = 64 * 1024 * 1024;

/// One rung of the fallback ladder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RecoveryStrategy {
    /// Primary backend on the inputs as given.
    Direct,
    /// Repair non-watertight inputs, then the primary backend again.
    RepairRetry,
    /// Each remaining backend in priority order.
    EngineRotation,
    /// `base - (base ∩ stamp)`, for differences only.
    IntersectThenSubtract,
    /// Decimate both inputs, then the primary backend.
    Simplify,
}

impl RecoveryStrategy {
    /// Name used in logs.
    pub fn name(self) -> &'static str {
        match self {
            RecoveryStrategy::Direct => "direct",
            RecoveryStrategy::RepairRetry => "repair-retry",
            RecoveryStrategy::EngineRotation => "engine-rotation",
            RecoveryStrategy::IntersectThenSubtract => "intersect-then-subtract",
            RecoveryStrategy::Simplify => "simplify",
        }
    }
}

/// The full ladder in its standard order.
pub const DEFAULT_LADDER: [RecoveryStrategy; 5] = [
    RecoveryStrategy::Direct,
    RecoveryStrategy::RepairRetry,
    RecoveryStrategy::EngineRotation,
    RecoveryStrategy::IntersectThenSubtract,
    RecoveryStrategy::Simplify,
];

/// How a combination ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CombineOutcome {
    /// A rung produced a non-empty result.
    Combined {
        /// Winning rung.
        strategy: RecoveryStrategy,
        /// Backend that produced it.
        engine: String,
    },
    /// The stamp was empty; the base is returned as-is.
    Unchanged,
    /// Every rung failed; the base is returned as-is.
    Failed,
}

impl CombineOutcome {
    /// True if the result differs from the base.
    pub fn is_combined(&self) -> bool {
        matches!(self, CombineOutcome::Combined { .. })
    }
}

/// What one kernel call did.
#[derive(Debug, Clone, Serialize)]
pub struct Attempt {
    /// Rung.
    pub strategy: RecoveryStrategy,
    /// Backend or healer step.
    pub engine: String,
    /// Wall-clock time.
    pub elapsed_ms: u64,
    /// `"ok"`, `"empty"`, or the error text.
    pub result: String,
}

/// Result of [`CombinationEngine::combine`].
#[derive(Debug, Clone)]
pub struct Combination {
    /// Combined solid, or the original base.
    pub solid: Solid,
    /// How it ended.
    pub outcome: CombineOutcome,
    /// Every kernel call, in order.
    pub attempts: Vec<Attempt>,
}

/// Ladder tuning.
#[derive(Debug, Clone)]
pub struct CombineOptions {
    /// Rungs, in order.
    pub ladder: Vec<RecoveryStrategy>,
    /// Wall-clock limit per kernel call.
    pub timeout: Duration,
    /// Z translation toward the base applied once when boxes do not overlap.
    pub preflight_nudge_mm: f64,
    /// Face ratio kept by the simplify rung.
    pub decimate_ratio: f64,
}

impl Default for CombineOptions {
    fn default() -> Self {
        Self {
            ladder: DEFAULT_LADDER.to_vec(),
            timeout: Duration::from_secs(180),
            preflight_nudge_mm: 0.05,
            decimate_ratio: 0.6,
        }
    }
}

/// Runs the fallback ladder over a list of backends.
#[derive(Clone)]
pub struct CombinationEngine {
    backends: Vec<Arc<dyn BooleanBackend>>,
    healer: Arc<dyn MeshHealer>,
    options: CombineOptions,
}

impl std::fmt::Debug for CombinationEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CombinationEngine")
            .field(
                "backends",
                &self.backends.iter().map(|b| b.name()).collect::<Vec<_>>(),
            )
            .field("options", &self.options)
            .finish()
    }
}

/// Outcome of one kernel call made under the time limit.
type Call<T = Solid> = std::result::Result<T, BooleanError>;

impl CombinationEngine {
    /// Engine over `backends` (first is primary) with the in-process healer.
    pub fn new(backends: Vec<Arc<dyn BooleanBackend>>) -> Self {
        Self {
            backends,
            healer: Arc::new(KernelHealer::default()),
            options: CombineOptions::default(),
        }
    }

    /// Replace the healer.
    pub fn with_healer(mut self, healer: Arc<dyn MeshHealer>) -> Self {
        self.healer = healer;
        self
    }

    /// Replace the options.
    pub fn with_options(mut self, options: CombineOptions) -> Self {
        self.options = options;
        self
    }

    /// Current options.
    pub fn options(&self) -> &CombineOptions {
        &self.options
    }

    /// Combine `stamp` into `base` with `op`.
    ///
    /// Errors only on missing overlap or a stalled kernel call.
    #[instrument(skip_all, fields(%op))]
    pub fn combine(
        &self,
        base: Solid,
        stamp: Solid,
        op: BooleanOp,
        journal: &mut RunJournal,
    ) -> Result<Combination> {
        if stamp.is_empty() {
            journal.record(STAGE, "stamp is empty, base unchanged");
            return Ok(Combination {
                solid: base,
                outcome: CombineOutcome::Unchanged,
                attempts: Vec::new(),
            });
        }
        let stamp = self.preflight(&base, stamp, journal)?;

        let mut run = LadderRun {
            engine: self,
            op,
            base: Arc::new(base),
            stamp: Arc::new(stamp),
            attempts: Vec::new(),
        };
        let original = Arc::clone(&run.base);

        for &strategy in &self.options.ladder {
            let started = Instant::now();
            let found = run.rung(strategy, journal)?;
            let ms = started.elapsed().as_millis();
            match found {
                Some((solid, engine)) => {
                    journal.record(
                        STAGE,
                        format!(
                            "{} via {engine} succeeded in {ms} ms ({} triangles)",
                            strategy.name(),
                            solid.triangle_count()
                        ),
                    );
                    return Ok(Combination {
                        solid,
                        outcome: CombineOutcome::Combined { strategy, engine },
                        attempts: run.attempts,
                    });
                }
                None => journal.record(
                    STAGE,
                    format!("{} produced nothing after {ms} ms", strategy.name()),
                ),
            }
        }

        journal.warn(
            STAGE,
            format!(
                "CombinationFailed: all {} strategies failed, returning the base unmodified",
                self.options.ladder.len()
            ),
        );
        let attempts = run.attempts;
        drop(run.base);
        Ok(Combination {
            solid: Arc::try_unwrap(original).unwrap_or_else(|shared| (*shared).clone()),
            outcome: CombineOutcome::Failed,
            attempts,
        })
    }

    /// Check bounding-box overlap on all axes, nudging the stamp toward the
    /// base along Z once if needed.
    pub fn preflight(&self, base: &Solid, stamp: Solid, journal: &mut RunJournal) -> Result<Solid> {
        let bb = base.bounds();
        let axes = bb.overlap_axes(&stamp.bounds());
        if axes.iter().all(|&a| a) {
            return Ok(stamp);
        }
        let direction = (bb.center().z - stamp.bounds().center().z).signum();
        let dz = direction * self.options.preflight_nudge_mm;
        journal.warn(
            STAGE,
            format!("no overlap on axes {axes:?}, nudging stamp by {dz:+.3} mm in z"),
        );
        let stamp = stamp.translated(&Vec3::new(0.0, 0.0, dz));
        let axes = bb.overlap_axes(&stamp.bounds());
        if axes.iter().all(|&a| a) {
            Ok(stamp)
        } else {
            journal.warn(STAGE, "still no overlap after nudge");
            Err(StampError::NoOverlap(axes))
        }
    }

    /// Repair `solid` with the configured healer under the time limit.
    ///
    /// `Ok(None)` when the healer failed or returned nothing.
    pub fn repair(&self, stage: &str, solid: Solid) -> Result<Option<(Solid, RepairStats)>> {
        let healer = Arc::clone(&self.healer);
        let call = self.call(stage, move || Ok(healer.repair(solid)))?;
        Ok(call.ok().filter(|(s, _)| !s.is_empty()))
    }

    /// Run `f` on a worker thread, waiting at most the configured timeout.
    fn call<T, F>(&self, stage: &str, f: F) -> Result<Call<T>>
    where
        T: Send + 'static,
        F: FnOnce() -> Call<T> + Send + 'static,
    {
        let (tx, rx) = mpsc::channel();
        let spawned = thread::Builder::new()
            .name(format!("qrstamp-{stage}"))
            .stack_size(WORKER_STACK)
            .spawn(move || {
                // The receiver is gone if we already timed out.
                let _ = tx.send(f());
            });
        if let Err(e) = spawned {
            return Ok(Err(BooleanError::Process(format!("could not spawn worker: {e}"))));
        }
        match rx.recv_timeout(self.options.timeout) {
            Ok(result) => Ok(result),
            Err(mpsc::RecvTimeoutError::Timeout) => Err(StampError::Timeout {
                stage: stage.to_string(),
                limit: self.options.timeout,
            }),
            Err(mpsc::RecvTimeoutError::Disconnected) => Ok(Err(BooleanError::EngineFailed {
                engine: stage.to_string(),
                reason: "worker panicked".into(),
            })),
        }
    }
}

/// Mutable state of one ladder run. Repaired operands carry forward to the
/// later rungs.
struct LadderRun<'a> {
    engine: &'a CombinationEngine,
    op: BooleanOp,
    base: Arc<Solid>,
    stamp: Arc<Solid>,
    attempts: Vec<Attempt>,
}

impl LadderRun<'_> {
    fn rung(
        &mut self,
        strategy: RecoveryStrategy,
        journal: &mut RunJournal,
    ) -> Result<Option<(Solid, String)>> {
        let Some(primary) = self.engine.backends.first().cloned() else {
            journal.warn(STAGE, "no boolean backend configured");
            return Ok(None);
        };
        match strategy {
            RecoveryStrategy::Direct => {
                let (a, b) = (Arc::clone(&self.base), Arc::clone(&self.stamp));
                self.try_backend(strategy, &primary, a, b, self.op)
            }
            RecoveryStrategy::RepairRetry => {
                let base_ok = self.base.is_watertight();
                let stamp_ok = self.stamp.is_watertight();
                if base_ok && stamp_ok {
                    journal.record(STAGE, "inputs are watertight, skipping repair");
                    return Ok(None);
                }
                if !base_ok {
                    self.base = self.repair(strategy, Arc::clone(&self.base), "base")?;
                }
                if !stamp_ok {
                    self.stamp = self.repair(strategy, Arc::clone(&self.stamp), "stamp")?;
                }
                journal.record(
                    STAGE,
                    format!(
                        "repaired inputs (base watertight: {}, stamp watertight: {})",
                        self.base.is_watertight(),
                        self.stamp.is_watertight()
                    ),
                );
                let (a, b) = (Arc::clone(&self.base), Arc::clone(&self.stamp));
                self.try_backend(strategy, &primary, a, b, self.op)
            }
            RecoveryStrategy::EngineRotation => {
                let others: Vec<_> = self.engine.backends.iter().skip(1).cloned().collect();
                for backend in others {
                    let (a, b) = (Arc::clone(&self.base), Arc::clone(&self.stamp));
                    if let Some(found) = self.try_backend(strategy, &backend, a, b, self.op)? {
                        return Ok(Some(found));
                    }
                }
                Ok(None)
            }
            RecoveryStrategy::IntersectThenSubtract => {
                if self.op != BooleanOp::Difference {
                    return Ok(None);
                }
                let backends = self.engine.backends.clone();
                for backend in backends {
                    let (a, b) = (Arc::clone(&self.base), Arc::clone(&self.stamp));
                    let Some((overlap, _)) =
                        self.try_backend(strategy, &backend, a, b, BooleanOp::Intersection)?
                    else {
                        continue;
                    };
                    let a = Arc::clone(&self.base);
                    let found =
                        self.try_backend(strategy, &backend, a, Arc::new(overlap), BooleanOp::Difference)?;
                    if found.is_some() {
                        return Ok(found);
                    }
                }
                Ok(None)
            }
            RecoveryStrategy::Simplify => {
                let ratio = self.engine.options.decimate_ratio;
                let base = self.decimate(strategy, Arc::clone(&self.base), ratio)?;
                let stamp = self.decimate(strategy, Arc::clone(&self.stamp), ratio)?;
                journal.record(
                    STAGE,
                    format!(
                        "decimated to {} + {} triangles",
                        base.triangle_count(),
                        stamp.triangle_count()
                    ),
                );
                self.try_backend(strategy, &primary, base, stamp, self.op)
            }
        }
    }

    fn try_backend(
        &mut self,
        strategy: RecoveryStrategy,
        backend: &Arc<dyn BooleanBackend>,
        a: Arc<Solid>,
        b: Arc<Solid>,
        op: BooleanOp,
    ) -> Result<Option<(Solid, String)>> {
        let name = backend.name().to_string();
        let worker = Arc::clone(backend);
        let started = Instant::now();
        let call = self
            .engine
            .call(strategy.name(), move || worker.apply(&a, &b, op))?;
        let (found, result) = match call {
            Ok(s) if s.vertex_count() > 0 && !s.is_empty() => (Some(s), "ok".to_string()),
            Ok(_) => (None, "empty".to_string()),
            Err(e) => (None, e.to_string()),
        };
        debug!(strategy = strategy.name(), engine = %name, %op, %result, "kernel call");
        self.attempts.push(Attempt {
            strategy,
            engine: name.clone(),
            elapsed_ms: started.elapsed().as_millis() as u64,
            result,
        });
        Ok(found.map(|s| (s, name)))
    }

    fn repair(
        &mut self,
        strategy: RecoveryStrategy,
        solid: Arc<Solid>,
        which: &str,
    ) -> Result<Arc<Solid>> {
        let healer = Arc::clone(&self.engine.healer);
        let input = Arc::clone(&solid);
        let started = Instant::now();
        let call = self.engine.call(strategy.name(), move || {
            Ok(healer.repair((*input).clone()).0)
        })?;
        self.record_heal(strategy, format!("repair {which}"), started, solid, call)
    }

    fn decimate(
        &mut self,
        strategy: RecoveryStrategy,
        solid: Arc<Solid>,
        ratio: f64,
    ) -> Result<Arc<Solid>> {
        let healer = Arc::clone(&self.engine.healer);
        let input = Arc::clone(&solid);
        let started = Instant::now();
        let call = self
            .engine
            .call(strategy.name(), move || Ok(healer.decimate(&input, ratio)))?;
        self.record_heal(strategy, "decimate".into(), started, solid, call)
    }

    /// Log a healer call; a failed call leaves the operand as it was.
    fn record_heal(
        &mut self,
        strategy: RecoveryStrategy,
        engine: String,
        started: Instant,
        original: Arc<Solid>,
        call: Call,
    ) -> Result<Arc<Solid>> {
        let (solid, result) = match call {
            Ok(s) if !s.is_empty() => (Arc::new(s), "ok".to_string()),
            Ok(_) => (original, "empty".to_string()),
            Err(e) => (original, e.to_string()),
        };
        self.attempts.push(Attempt {
            strategy,
            engine,
            elapsed_ms: started.elapsed().as_millis() as u64,
            result,
        });
        Ok(solid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use qrstamp_booleans::{BooleanError, BspBackend};
    use qrstamp_math::Point3;
    use qrstamp_mesh::primitives::{cuboid, cylinder};
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Backend with scripted behavior.
    struct Scripted {
        name: &'static str,
        mode: Mode,
        calls: AtomicUsize,
    }

    #[derive(Clone, Copy)]
    enum Mode {
        Fail,
        Empty,
        Stall,
        /// Fails plain differences but handles intersections and
        /// differences against a small tool.
        OnlyGentle,
        /// Fails while the operands together exceed this many triangles.
        Heavy(usize),
    }

    impl Scripted {
        fn new(name: &'static str, mode: Mode) -> Arc<Self> {
            Arc::new(Self {
                name,
                mode,
                calls: AtomicUsize::new(0),
            })
        }
    }

    impl BooleanBackend for Scripted {
        fn name(&self) -> &str {
            self.name
        }

        fn apply(&self, a: &Solid, b: &Solid, op: BooleanOp) -> qrstamp_booleans::Result<Solid> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.mode {
                Mode::Fail => Err(BooleanError::EngineFailed {
                    engine: self.name.into(),
                    reason: "scripted".into(),
                }),
                Mode::Empty => Ok(Solid::empty()),
                Mode::Stall => {
                    thread::sleep(Duration::from_millis(500));
                    Ok(a.clone())
                }
                Mode::OnlyGentle => {
                    let tool_inside = b.bounds().max.z <= a.bounds().max.z + 1e-9;
                    if op == BooleanOp::Difference && !tool_inside {
                        Err(BooleanError::EngineFailed {
                            engine: self.name.into(),
                            reason: "tool leaves the base".into(),
                        })
                    } else {
                        BspBackend::new().apply(a, b, op)
                    }
                }
                Mode::Heavy(max) => {
                    if a.triangle_count() + b.triangle_count() > max {
                        Err(BooleanError::EngineFailed {
                            engine: self.name.into(),
                            reason: "mesh too dense".into(),
                        })
                    } else {
                        Ok(a.clone())
                    }
                }
            }
        }
    }

    fn shared<B: BooleanBackend + 'static>(b: B) -> Arc<dyn BooleanBackend> {
        Arc::new(b)
    }

    fn base() -> Solid {
        cuboid(Point3::origin(), Point3::new(10.0, 10.0, 5.0))
    }

    fn tool() -> Solid {
        cuboid(Point3::new(4.0, 4.0, 4.0), Point3::new(6.0, 6.0, 6.0))
    }

    #[test]
    fn test_direct_success() {
        let engine = CombinationEngine::new(vec![shared(BspBackend::new())]);
        let mut j = RunJournal::new();
        let c = engine
            .combine(base(), tool(), BooleanOp::Difference, &mut j)
            .unwrap();
        assert_eq!(
            c.outcome,
            CombineOutcome::Combined {
                strategy: RecoveryStrategy::Direct,
                engine: "bsp".into()
            }
        );
        assert!((c.solid.volume() - 496.0).abs() < 1e-6);
        assert_eq!(c.attempts.len(), 1);
    }

    #[test]
    fn test_rotation_reaches_second_backend() {
        let failing = Scripted::new("broken", Mode::Fail);
        let first: Arc<dyn BooleanBackend> = failing.clone();
        let engine = CombinationEngine::new(vec![first, shared(BspBackend::snapped())]);
        let mut j = RunJournal::new();
        let c = engine
            .combine(base(), tool(), BooleanOp::Difference, &mut j)
            .unwrap();
        assert_eq!(
            c.outcome,
            CombineOutcome::Combined {
                strategy: RecoveryStrategy::EngineRotation,
                engine: "bsp-snapped".into()
            }
        );
        // direct only: both inputs are watertight so repair is skipped
        assert_eq!(failing.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_intersect_then_subtract() {
        let gentle: Arc<dyn BooleanBackend> = Scripted::new("gentle", Mode::OnlyGentle);
        let engine = CombinationEngine::new(vec![gentle]);
        let mut j = RunJournal::new();
        let c = engine
            .combine(base(), tool(), BooleanOp::Difference, &mut j)
            .unwrap();
        assert!(matches!(
            c.outcome,
            CombineOutcome::Combined {
                strategy: RecoveryStrategy::IntersectThenSubtract,
                ..
            }
        ));
        assert!((c.solid.volume() - 496.0).abs() < 1e-6);
    }

    #[test]
    fn test_repair_retry_closes_open_stamp() {
        let mut open = tool();
        open.triangles.truncate(10);
        let empty: Arc<dyn BooleanBackend> = Scripted::new("empty", Mode::Empty);
        let engine = CombinationEngine::new(vec![empty])
            .with_options(CombineOptions {
                ladder: vec![RecoveryStrategy::RepairRetry],
                ..Default::default()
            });
        let mut j = RunJournal::new();
        let c = engine
            .combine(base(), open, BooleanOp::Difference, &mut j)
            .unwrap();
        assert_eq!(c.outcome, CombineOutcome::Failed);
        assert!(c.attempts.iter().any(|a| a.engine == "repair stamp"));
        assert!(!c.attempts.iter().any(|a| a.engine == "repair base"));
    }

    #[test]
    fn test_simplify_rescues_dense_inputs() {
        let disc = cylinder(Point3::origin(), 5.0, 5.0, 64);
        let max = disc.triangle_count() + tool().triangle_count() - 1;
        let heavy: Arc<dyn BooleanBackend> = Scripted::new("heavy", Mode::Heavy(max));
        let engine = CombinationEngine::new(vec![heavy]);
        let mut j = RunJournal::new();
        let c = engine
            .combine(disc.clone(), tool(), BooleanOp::Difference, &mut j)
            .unwrap();
        assert_eq!(
            c.outcome,
            CombineOutcome::Combined {
                strategy: RecoveryStrategy::Simplify,
                engine: "heavy".into()
            }
        );
        assert!(c.solid.triangle_count() < disc.triangle_count());
        assert!(c.attempts.iter().any(|a| a.engine == "decimate" && a.result == "ok"));
    }

    #[test]
    fn test_give_up_returns_base() {
        let a: Arc<dyn BooleanBackend> = Scripted::new("a", Mode::Fail);
        let b: Arc<dyn BooleanBackend> = Scripted::new("b", Mode::Empty);
        let engine = CombinationEngine::new(vec![a, b]);
        let mut j = RunJournal::new();
        let c = engine
            .combine(base(), tool(), BooleanOp::Difference, &mut j)
            .unwrap();
        assert_eq!(c.outcome, CombineOutcome::Failed);
        assert_eq!(c.solid, base());
        assert!(j.has_warnings());
        assert!(j.to_text().contains("CombinationFailed"));
    }

    #[test]
    fn test_stall_times_out() {
        let slow: Arc<dyn BooleanBackend> = Scripted::new("slow", Mode::Stall);
        let engine = CombinationEngine::new(vec![slow]).with_options(
            CombineOptions {
                timeout: Duration::from_millis(20),
                ..Default::default()
            },
        );
        let mut j = RunJournal::new();
        let err = engine
            .combine(base(), tool(), BooleanOp::Difference, &mut j)
            .unwrap_err();
        assert!(matches!(err, StampError::Timeout { .. }));
    }

    #[test]
    fn test_empty_stamp_is_unchanged() {
        let engine = CombinationEngine::new(vec![shared(BspBackend::new())]);
        let mut j = RunJournal::new();
        let c = engine
            .combine(base(), Solid::empty(), BooleanOp::Difference, &mut j)
            .unwrap();
        assert_eq!(c.outcome, CombineOutcome::Unchanged);
        assert_eq!(c.solid, base());
    }

    #[test]
    fn test_preflight_nudge_and_no_overlap() {
        let engine = CombinationEngine::new(vec![shared(BspBackend::new())]);
        let mut j = RunJournal::new();

        // 0.02 mm above the top: one nudge brings it into contact
        let near = cuboid(Point3::new(4.0, 4.0, 5.02), Point3::new(6.0, 6.0, 6.0));
        let moved = engine.preflight(&base(), near, &mut j).unwrap();
        assert!((moved.bounds().min.z - 4.97).abs() < 1e-9);

        let far = cuboid(Point3::new(4.0, 4.0, 8.0), Point3::new(6.0, 6.0, 9.0));
        let err = engine
            .combine(base(), far, BooleanOp::Difference, &mut j)
            .unwrap_err();
        assert!(matches!(err, StampError::NoOverlap([true, true, false])));
    }
}
