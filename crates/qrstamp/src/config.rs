//! Run configuration.
//!
//! Loaded from TOML; every field has a default so a partial file (or none)
//! works. CLI flags override individual fields afterwards.
//!
//! ```toml
//! [encode]
//! level = "Q"
//!
//! [stamp]
//! target_size_mm = 18.0
//! mode = "emboss"
//!
//! [combine]
//! backends = ["bsp", "openscad"]
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use qrstamp_booleans::{BooleanBackend, BspBackend, OpenScadBackend};
use qrstamp_mesh::io::PartMerge;
use serde::{Deserialize, Serialize};

use crate::combine::{CombineOptions, RecoveryStrategy, DEFAULT_LADDER};
use crate::encoder::EncodeOptions;
use crate::error::{Result, StampError};
use crate::footprint::FootprintKind;
use crate::placement::Strictness;
use crate::stamp::{AlgorithmKind, Face, StampMode};

/// Complete configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StampConfig {
    /// Payload encoding.
    pub encode: EncodeOptions,
    /// Stamp geometry.
    pub stamp: StampSection,
    /// Footprint analysis.
    pub footprint: FootprintSection,
    /// Boolean combination.
    pub combine: CombineSection,
    /// Output files.
    pub output: OutputSection,
}

/// `[stamp]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StampSection {
    /// Requested side of the stamp in mm.
    pub target_size_mm: f64,
    /// Engrave depth or emboss height in mm.
    pub depth_mm: f64,
    /// Extra penetration into the base in mm.
    pub z_offset_mm: f64,
    /// Clearance from the footprint edge in mm.
    pub margin_mm: f64,
    /// Engrave or emboss.
    pub mode: StampMode,
    /// Marked face.
    pub face: Face,
    /// Rotate 180° about the face normal.
    pub rotation_180: bool,
    /// Geometry strategy.
    pub algorithm: AlgorithmKind,
}

impl Default for StampSection {
    fn default() -> Self {
        Self {
            target_size_mm: 22.0,
            depth_mm: 0.3,
            z_offset_mm: 0.01,
            margin_mm: 0.5,
            mode: StampMode::Engrave,
            face: Face::Top,
            rotation_180: false,
            algorithm: AlgorithmKind::Contour,
        }
    }
}

/// `[footprint]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FootprintSection {
    /// Footprint model.
    pub kind: FootprintKind,
    /// Distance of the section plane inside the face in mm.
    pub section_offset_mm: f64,
    /// Module containment strictness.
    pub strictness: Strictness,
}

impl Default for FootprintSection {
    fn default() -> Self {
        Self {
            kind: FootprintKind::Box,
            section_offset_mm: 0.05,
            strictness: Strictness::Center,
        }
    }
}

/// `[combine]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CombineSection {
    /// Backend names in priority order: `bsp`, `bsp-snapped`, `openscad`.
    pub backends: Vec<String>,
    /// Ladder rungs in order.
    pub ladder: Vec<RecoveryStrategy>,
    /// Wall-clock limit per kernel call in seconds.
    pub timeout_secs: u64,
    /// One-time Z nudge when the stamp misses the base, in mm.
    pub preflight_nudge_mm: f64,
    /// Face ratio kept by the simplify rung.
    pub decimate_ratio: f64,
    /// OpenSCAD executable.
    pub openscad_binary: String,
    /// Scratch directory for OpenSCAD operands; system temp dir if unset.
    pub openscad_work_dir: Option<PathBuf>,
}

impl Default for CombineSection {
    fn default() -> Self {
        Self {
            backends: vec!["bsp".into(), "bsp-snapped".into(), "openscad".into()],
            ladder: DEFAULT_LADDER.to_vec(),
            timeout_secs: 180,
            preflight_nudge_mm: 0.05,
            decimate_ratio: 0.6,
            openscad_binary: "openscad".into(),
            openscad_work_dir: None,
        }
    }
}

impl CombineSection {
    /// Instantiate the configured backends.
    pub fn backends(&self) -> Result<Vec<Arc<dyn BooleanBackend>>> {
        self.backends
            .iter()
            .map(|name| -> Result<Arc<dyn BooleanBackend>> {
                match name.as_str() {
                    "bsp" => Ok(Arc::new(BspBackend::new())),
                    "bsp-snapped" => Ok(Arc::new(BspBackend::snapped())),
                    "openscad" => Ok(Arc::new(self.openscad())),
                    other => Err(StampError::Config(format!("unknown backend {other:?}"))),
                }
            })
            .collect()
    }

    /// OpenSCAD backend killed at the per-call time limit.
    fn openscad(&self) -> OpenScadBackend {
        let backend = OpenScadBackend::new(&self.openscad_binary)
            .with_deadline(Duration::from_secs(self.timeout_secs));
        match &self.openscad_work_dir {
            Some(dir) => backend.with_work_dir(dir),
            None => backend,
        }
    }

    /// Ladder options.
    pub fn options(&self) -> CombineOptions {
        CombineOptions {
            ladder: self.ladder.clone(),
            timeout: Duration::from_secs(self.timeout_secs),
            preflight_nudge_mm: self.preflight_nudge_mm,
            decimate_ratio: self.decimate_ratio,
        }
    }
}

/// Whether the stamp is fused into the base or written beside it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputMode {
    /// Boolean-combine stamp and base into one solid.
    #[default]
    Combined,
    /// Skip the boolean; write base and stamp as two objects.
    Separate,
}

/// Multi-part input handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MergePolicy {
    /// First non-empty part only.
    First,
    /// All parts merged.
    #[default]
    All,
}

impl From<MergePolicy> for PartMerge {
    fn from(p: MergePolicy) -> Self {
        match p {
            MergePolicy::First => PartMerge::First,
            MergePolicy::All => PartMerge::All,
        }
    }
}

/// `[output]`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputSection {
    /// Combined or separate objects.
    pub mode: OutputMode,
    /// Input part handling.
    pub part_merge: MergePolicy,
    /// Output extension override (`3mf`, `stl`, `obj`).
    pub format: Option<String>,
}

impl StampConfig {
    /// Parse TOML text.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text).map_err(|e| StampError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| StampError::Config(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&text)
    }

    /// Serialize as TOML.
    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| StampError::Config(e.to_string()))
    }

    /// Reject values no run can use.
    pub fn validate(&self) -> Result<()> {
        let s = &self.stamp;
        let positive = [
            ("stamp.target_size_mm", s.target_size_mm),
            ("stamp.depth_mm", s.depth_mm),
        ];
        for (name, v) in positive {
            if !(v > 0.0) || !v.is_finite() {
                return Err(StampError::Config(format!("{name} must be positive, got {v}")));
            }
        }
        let non_negative = [
            ("stamp.z_offset_mm", s.z_offset_mm),
            ("stamp.margin_mm", s.margin_mm),
            ("footprint.section_offset_mm", self.footprint.section_offset_mm),
            ("combine.preflight_nudge_mm", self.combine.preflight_nudge_mm),
        ];
        for (name, v) in non_negative {
            if v < 0.0 || !v.is_finite() {
                return Err(StampError::Config(format!(
                    "{name} must be non-negative, got {v}"
                )));
            }
        }
        if !(1..=40).contains(&self.encode.min_version) {
            return Err(StampError::Config(format!(
                "encode.min_version must be within 1..=40, got {}",
                self.encode.min_version
            )));
        }
        let r = self.combine.decimate_ratio;
        if !(r > 0.0 && r <= 1.0) {
            return Err(StampError::Config(format!(
                "combine.decimate_ratio must be in (0, 1], got {r}"
            )));
        }
        if self.combine.backends.is_empty() {
            return Err(StampError::Config("combine.backends is empty".into()));
        }
        if self.combine.timeout_secs == 0 {
            return Err(StampError::Config("combine.timeout_secs must be at least 1".into()));
        }
        self.combine.backends()?;
        Ok(())
    }
}
