//! Error types for boolean backends.

use std::time::Duration;

use qrstamp_mesh::MeshError;
use thiserror::Error;

/// Errors a boolean backend can report.
#[derive(Error, Debug)]
pub enum BooleanError {
    /// The left-hand operand has no geometry.
    #[error("boolean operand is empty")]
    EmptyOperand,

    /// The engine ran but could not produce a result.
    #[error("{engine} failed: {reason}")]
    EngineFailed {
        /// Backend name.
        engine: String,
        /// What went wrong.
        reason: String,
    },

    /// The backend cannot run on this machine.
    #[error("backend {0} is unavailable")]
    Unavailable(String),

    /// The engine ran past its deadline and was stopped.
    #[error("{engine} exceeded {limit:?}")]
    TimedOut {
        /// Backend name.
        engine: String,
        /// Deadline that expired.
        limit: Duration,
    },

    /// An external process failed.
    #[error("external process failed: {0}")]
    Process(String),

    /// Reading or writing an intermediate mesh failed.
    #[error(transparent)]
    Mesh(#[from] MeshError),
}

/// Result type for boolean operations.
pub type Result<T> = std::result::Result<T, BooleanError>;
