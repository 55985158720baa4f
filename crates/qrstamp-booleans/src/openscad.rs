//! Out-of-process boolean engine driving the OpenSCAD renderer.
//!
//! Both operands are written as binary STL into a scratch directory, a
//! one-line `.scad` script imports them, and `openscad -o result.stl`
//! renders the CSG. Slow, but independent of the in-process kernel.
//!
//! With a deadline set, a render that runs past it is killed and its
//! scratch directory removed.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use qrstamp_mesh::io::{load_solid, save_solid, PartMerge};
use qrstamp_mesh::Solid;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{BooleanError, Result};
use crate::{BooleanBackend, BooleanOp};

/// OpenSCAD CLI backend.
#[derive(Debug, Clone)]
pub struct OpenScadBackend {
    binary: PathBuf,
    work_dir: PathBuf,
    deadline: Option<Duration>,
}

const POLL_INTERVAL: Duration = Duration::from_millis(25);

impl OpenScadBackend {
    /// Use `binary` (a path or a name on `PATH`) with scratch files in the
    /// system temp directory.
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            work_dir: std::env::temp_dir(),
            deadline: None,
        }
    }

    /// Kill renders that run longer than `limit`.
    pub fn with_deadline(mut self, limit: Duration) -> Self {
        self.deadline = Some(limit);
        self
    }

    /// Put scratch files in `dir` instead.
    pub fn with_work_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.work_dir = dir.into();
        self
    }

    /// True if the binary can be launched.
    pub fn is_available(&self) -> bool {
        Command::new(&self.binary)
            .arg("--version")
            .output()
            .is_ok()
    }

    fn run(&self, a: &Solid, b: &Solid, op: BooleanOp, scratch: &Path) -> Result<Solid> {
        let a_path = scratch.join("a.stl");
        let b_path = scratch.join("b.stl");
        let scad_path = scratch.join("op.scad");
        let out_path = scratch.join("result.stl");
        save_solid(a, &a_path)?;
        save_solid(b, &b_path)?;
        fs::write(&scad_path, scad_script(op, &a_path, &b_path))
            .map_err(|e| BooleanError::Process(e.to_string()))?;

        let stderr_path = scratch.join("stderr.txt");
        let stderr = fs::File::create(&stderr_path).map_err(|e| BooleanError::Process(e.to_string()))?;
        let mut child = Command::new(&self.binary)
            .arg("-o")
            .arg(&out_path)
            .arg(&scad_path)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(stderr)
            .spawn()
            .map_err(|e| match e.kind() {
                ErrorKind::NotFound => BooleanError::Unavailable(self.binary.display().to_string()),
                _ => BooleanError::Process(e.to_string()),
            })?;

        let started = Instant::now();
        let status = loop {
            match child.try_wait() {
                Ok(Some(status)) => break status,
                Ok(None) => {}
                Err(e) => return Err(BooleanError::Process(e.to_string())),
            }
            if let Some(limit) = self.deadline {
                if started.elapsed() >= limit {
                    if let Err(e) = child.kill() {
                        warn!(error = %e, "could not kill openscad");
                    }
                    let _ = child.wait();
                    return Err(BooleanError::TimedOut {
                        engine: "openscad".into(),
                        limit,
                    });
                }
            }
            thread::sleep(POLL_INTERVAL);
        };
        if !status.success() {
            let stderr = fs::read_to_string(&stderr_path).unwrap_or_default();
            return Err(BooleanError::Process(stderr.trim().to_string()));
        }
        debug!(binary = %self.binary.display(), %op, "openscad finished");

        match load_solid(&out_path, PartMerge::All) {
            Ok(s) => Ok(s),
            // OpenSCAD writes an empty file for an empty result.
            Err(qrstamp_mesh::MeshError::EmptyGeometry(_)) => Ok(Solid::empty()),
            Err(e) => Err(e.into()),
        }
    }
}

impl Default for OpenScadBackend {
    fn default() -> Self {
        Self::new("openscad")
    }
}

fn scad_script(op: BooleanOp, a: &Path, b: &Path) -> String {
    let verb = match op {
        BooleanOp::Union => "union",
        BooleanOp::Difference => "difference",
        BooleanOp::Intersection => "intersection",
    };
    format!(
        "{verb}() {{\n  import(\"{}\");\n  import(\"{}\");\n}}\n",
        scad_path_literal(a),
        scad_path_literal(b)
    )
}

fn scad_path_literal(path: &Path) -> String {
    path.display()
        .to_string()
        .replace('\\', "/")
        .replace('"', "\\\"")
}

impl BooleanBackend for OpenScadBackend {
    fn name(&self) -> &str {
        "openscad"
    }

    fn apply(&self, a: &Solid, b: &Solid, op: BooleanOp) -> Result<Solid> {
        if a.is_empty() {
            return Err(BooleanError::EmptyOperand);
        }
        let scratch = self.work_dir.join(format!("qrstamp-scad-{}", Uuid::new_v4()));
        fs::create_dir_all(&scratch).map_err(|e| BooleanError::Process(e.to_string()))?;
        let result = self.run(a, b, op, &scratch);
        if let Err(e) = fs::remove_dir_all(&scratch) {
            warn!(dir = %scratch.display(), error = %e, "could not remove scratch dir");
        }
        result
    }
}
