//! Payload encoding into a module grid.

use qrcode::{Color, EcLevel, QrCode, Version};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{InputError, Result};
use crate::grid::ModuleGrid;

/// Largest symbol version.
pub const MAX_VERSION: i16 = 40;

/// Error-correction level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ErrorLevel {
    /// ~7% recovery.
    L,
    /// ~15% recovery.
    #[default]
    M,
    /// ~25% recovery.
    Q,
    /// ~30% recovery.
    H,
}

impl ErrorLevel {
    fn ec_level(self) -> EcLevel {
        match self {
            ErrorLevel::L => EcLevel::L,
            ErrorLevel::M => EcLevel::M,
            ErrorLevel::Q => EcLevel::Q,
            ErrorLevel::H => EcLevel::H,
        }
    }
}

impl std::fmt::Display for ErrorLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}

impl std::str::FromStr for ErrorLevel {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, String> {
        match s.to_ascii_uppercase().as_str() {
            "L" => Ok(Self::L),
            "M" => Ok(Self::M),
            "Q" => Ok(Self::Q),
            "H" => Ok(Self::H),
            other => Err(format!("unknown error level {other:?} (expected L, M, Q or H)")),
        }
    }
}

/// Encoder settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EncodeOptions {
    /// Error-correction level.
    pub level: ErrorLevel,
    /// Smallest symbol version to try (1..=40).
    pub min_version: i16,
    /// Inactive border modules added around the symbol.
    pub quiet_zone: usize,
}

impl Default for EncodeOptions {
    fn default() -> Self {
        Self {
            level: ErrorLevel::M,
            min_version: 4,
            quiet_zone: 0,
        }
    }
}

/// Encode `payload` into a y-up module grid.
///
/// Versions are tried from `min_version` upward; the first that holds the
/// payload wins.
pub fn encode(payload: &str, options: &EncodeOptions) -> Result<ModuleGrid> {
    if payload.is_empty() {
        return Err(InputError::EmptyPayload.into());
    }
    let start = options.min_version.clamp(1, MAX_VERSION);
    let code = (start..=MAX_VERSION)
        .find_map(|v| {
            QrCode::with_version(payload.as_bytes(), Version::Normal(v), options.level.ec_level())
                .ok()
        })
        .ok_or_else(|| InputError::PayloadTooLarge {
            len: payload.len(),
            level: options.level.to_string(),
        })?;

    let width = code.width();
    let colors = code.to_colors();
    let raster: Vec<Vec<bool>> = colors
        .chunks(width)
        .map(|row| row.iter().map(|&c| c == Color::Dark).collect())
        .collect();
    let grid = ModuleGrid::from_raster(&raster).with_quiet_zone(options.quiet_zone);
    debug!(
        version = ?code.version(),
        modules = grid.module_count(),
        active = grid.active_count(),
        "payload encoded"
    );
    Ok(grid)
}

/// Build a tracking URL `<base>?id=<id>`, percent-encoding the identifier.
pub fn tracking_url(base: &str, id: &str) -> String {
    let sep = if base.contains('?') { '&' } else { '?' };
    format!("{base}{sep}id={}", percent_encode(id))
}

/// Percent-encode everything except RFC 3986 unreserved characters and the
/// few marks URI components conventionally leave alone.
fn percent_encode(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for b in s.bytes() {
        let keep = b.is_ascii_alphanumeric()
            || matches!(b, b'-' | b'_' | b'.' | b'!' | b'~' | b'*' | b'\'' | b'(' | b')');
        if keep {
            out.push(b as char);
        } else {
            out.push_str(&format!("%{b:02X}"));
        }
    }
    out
}
