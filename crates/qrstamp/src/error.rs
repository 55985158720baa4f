//! Error types for the stamp pipeline.
//!
//! Input and geometry errors are fatal and raised before any boolean work.
//! A failed combination is not an error: it comes back as
//! [`CombineOutcome::Failed`](crate::CombineOutcome::Failed) next to the
//! untouched base.

use std::time::Duration;

use qrstamp_mesh::MeshError;
use thiserror::Error;

/// Bad or missing input.
#[derive(Error, Debug)]
pub enum InputError {
    /// The payload does not fit the largest grid at the requested level.
    #[error("payload of {len} bytes does not fit at error level {level}")]
    PayloadTooLarge {
        /// Payload length in bytes.
        len: usize,
        /// Requested error-correction level.
        level: String,
    },

    /// Nothing to encode.
    #[error("payload is empty")]
    EmptyPayload,

    /// The base file could not be loaded.
    #[error(transparent)]
    Load(#[from] MeshError),
}

/// Geometry that leaves nothing meaningful to combine.
#[derive(Error, Debug)]
pub enum GeometryDegenerateError {
    /// The module grid has no active module.
    #[error("module grid has no active modules")]
    EmptyGrid,

    /// Footprint filtering dropped every module.
    #[error("no module lies inside the footprint")]
    NoModulesInsideFootprint,

    /// The footprint cannot hold a stamp once margins are applied.
    #[error("footprint safe extent {0:.3} mm leaves no room for a stamp")]
    FootprintTooSmall(f64),

    /// A stamp parameter is out of range.
    #[error("invalid stamp spec: {0}")]
    InvalidSpec(String),

    /// Slicing the base produced no cross-section.
    #[error("base has no cross-section at z = {0:.4}")]
    EmptySection(f64),
}

/// Errors raised by the pipeline.
#[derive(Error, Debug)]
pub enum StampError {
    /// Bad input; nothing was computed.
    #[error("input error: {0}")]
    Input(#[from] InputError),

    /// Degenerate geometry; nothing to combine.
    #[error("degenerate geometry: {0}")]
    Geometry(#[from] GeometryDegenerateError),

    /// Stamp and base bounding boxes do not overlap, even after nudging.
    #[error("stamp does not overlap the base (axes x/y/z: {0:?})")]
    NoOverlap([bool; 3]),

    /// A kernel call exceeded the wall-clock limit.
    #[error("{stage} timed out after {limit:?}")]
    Timeout {
        /// Ladder step that stalled.
        stage: String,
        /// Configured limit.
        limit: Duration,
    },

    /// Invalid configuration.
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl From<MeshError> for StampError {
    fn from(e: MeshError) -> Self {
        StampError::Input(InputError::Load(e))
    }
}

/// Result type for pipeline operations.
pub type Result<T> = std::result::Result<T, StampError>;
