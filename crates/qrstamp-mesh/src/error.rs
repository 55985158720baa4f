//! Error types for mesh operations.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while building, reading or writing meshes.
#[derive(Error, Debug)]
pub enum MeshError {
    /// Mesh has no triangles.
    #[error("mesh is empty")]
    EmptyMesh,

    /// Mesh has degenerate geometry.
    #[error("mesh has degenerate geometry: {0}")]
    Degenerate(String),

    /// Underlying I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The file exists but could not be parsed.
    #[error("cannot read {path}: {reason}")]
    Unreadable {
        /// Offending file.
        path: PathBuf,
        /// What went wrong.
        reason: String,
    },

    /// The file parsed but holds no triangles.
    #[error("no geometry in {0}")]
    EmptyGeometry(PathBuf),

    /// File extension is not a known mesh format.
    #[error("unsupported mesh format: {0}")]
    UnsupportedFormat(String),

    /// Malformed 3MF model XML.
    #[error("3MF XML error: {0}")]
    Xml(String),

    /// 3MF container error.
    #[error("3MF archive error: {0}")]
    Zip(#[from] zip::result::ZipError),
}

/// Result type for mesh operations.
pub type Result<T> = std::result::Result<T, MeshError>;
