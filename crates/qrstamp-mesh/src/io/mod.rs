//! Reading and writing mesh files.
//!
//! Supported containers are STL (binary and ASCII), Wavefront OBJ and 3MF.
//! Loaders return every part in the file; [`load_solid`] merges them into
//! one welded solid. Writers fall back to binary STL when the requested
//! format cannot be produced.

mod obj;
mod stl;
mod threemf;

use std::fs;
use std::path::{Path, PathBuf};

use qrstamp_math::Tolerance;
use tracing::{info, warn};

use crate::error::{MeshError, Result};
use crate::repair::weld_vertices;
use crate::Solid;

pub use obj::{parse_obj, write_obj};
pub use stl::{parse_stl, write_stl};
pub use threemf::{parse_3mf, write_3mf};

/// Mesh container format, chosen by file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MeshFormat {
    /// Stereolithography, binary on write.
    Stl,
    /// Wavefront OBJ.
    Obj,
    /// 3D Manufacturing Format (zip + XML).
    ThreeMf,
}

impl MeshFormat {
    /// Detect the format from a path's extension.
    pub fn from_path(path: &Path) -> Result<Self> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("")
            .to_ascii_lowercase();
        match ext.as_str() {
            "stl" => Ok(Self::Stl),
            "obj" => Ok(Self::Obj),
            "3mf" => Ok(Self::ThreeMf),
            _ => Err(MeshError::UnsupportedFormat(ext)),
        }
    }
}

/// How multi-part files become a single solid.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PartMerge {
    /// Keep only the first non-empty part.
    First,
    /// Concatenate every part.
    #[default]
    All,
}

/// One named object of a mesh file.
#[derive(Debug, Clone)]
pub struct NamedPart {
    /// Object name (may be empty).
    pub name: String,
    /// Object geometry.
    pub solid: Solid,
}

impl NamedPart {
    /// Create a named part.
    pub fn new(name: impl Into<String>, solid: Solid) -> Self {
        Self {
            name: name.into(),
            solid,
        }
    }
}

fn unreadable(path: &Path, reason: impl ToString) -> MeshError {
    MeshError::Unreadable {
        path: path.to_path_buf(),
        reason: reason.to_string(),
    }
}

/// Read every part of a mesh file. Parts are welded but otherwise untouched.
pub fn load_parts(path: &Path) -> Result<Vec<NamedPart>> {
    let format = MeshFormat::from_path(path)?;
    let bytes = fs::read(path).map_err(|e| unreadable(path, e))?;
    let parts = match format {
        MeshFormat::Stl => parse_stl(&bytes),
        MeshFormat::Obj => parse_obj(&String::from_utf8_lossy(&bytes)),
        MeshFormat::ThreeMf => parse_3mf(&bytes),
    }
    .map_err(|e| match e {
        MeshError::Unreadable { .. } => e,
        other => unreadable(path, other),
    })?;

    let tol = Tolerance::DEFAULT;
    Ok(parts
        .into_iter()
        .map(|p| NamedPart::new(p.name, weld_vertices(p.solid, &tol)))
        .collect())
}

/// Read a mesh file as one solid.
pub fn load_solid(path: &Path, merge: PartMerge) -> Result<Solid> {
    let parts: Vec<NamedPart> = load_parts(path)?
        .into_iter()
        .filter(|p| !p.solid.is_empty())
        .collect();
    if parts.is_empty() {
        return Err(MeshError::EmptyGeometry(path.to_path_buf()));
    }
    let count = parts.len();
    let solid = match merge {
        PartMerge::First => parts.into_iter().next().map(|p| p.solid).unwrap_or_default(),
        PartMerge::All => weld_vertices(
            Solid::concat(parts.into_iter().map(|p| p.solid)),
            &Tolerance::DEFAULT,
        ),
    };
    info!(
        path = %path.display(),
        parts = count,
        vertices = solid.vertex_count(),
        triangles = solid.triangle_count(),
        "loaded mesh"
    );
    Ok(solid)
}

/// Write one solid. Returns the path actually written.
///
/// An unsupported extension or a failed 3MF/OBJ encode falls back to
/// binary STL next to the requested path.
pub fn save_solid(solid: &Solid, path: &Path) -> Result<PathBuf> {
    save_parts(&[NamedPart::new("solid", solid.clone())], path)
}

/// Write several named parts. 3MF keeps them as separate objects; STL and
/// OBJ store them merged. Returns the path actually written.
pub fn save_parts(parts: &[NamedPart], path: &Path) -> Result<PathBuf> {
    if parts.iter().all(|p| p.solid.is_empty()) {
        return Err(MeshError::EmptyMesh);
    }
    let encoded = match MeshFormat::from_path(path) {
        Ok(MeshFormat::Stl) => Ok(write_stl(&merged(parts))),
        Ok(MeshFormat::Obj) => Ok(write_obj(&merged(parts)).into_bytes()),
        Ok(MeshFormat::ThreeMf) => write_3mf(parts),
        Err(e) => Err(e),
    };

    match encoded {
        Ok(bytes) => {
            fs::write(path, bytes)?;
            Ok(path.to_path_buf())
        }
        Err(e) => {
            let fallback = path.with_extension("stl");
            warn!(
                requested = %path.display(),
                fallback = %fallback.display(),
                error = %e,
                "export failed, writing STL instead"
            );
            fs::write(&fallback, write_stl(&merged(parts)))?;
            Ok(fallback)
        }
    }
}

fn merged(parts: &[NamedPart]) -> Solid {
    Solid::concat(parts.iter().map(|p| p.solid.clone()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::primitives::cuboid;
    use qrstamp_math::Point3;

    fn temp_path(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("qrstamp-io-{}", uuid::Uuid::new_v4()));
        fs::create_dir_all(&dir).unwrap();
        dir.join(name)
    }

    #[test]
    fn test_format_from_path() {
        assert_eq!(MeshFormat::from_path(Path::new("a.STL")).unwrap(), MeshFormat::Stl);
        assert_eq!(MeshFormat::from_path(Path::new("a.3mf")).unwrap(), MeshFormat::ThreeMf);
        assert!(MeshFormat::from_path(Path::new("a.step")).is_err());
    }

    #[test]
    fn test_stl_file_roundtrip() {
        let cube = cuboid(Point3::origin(), Point3::new(2.0, 3.0, 4.0));
        let path = temp_path("cube.stl");
        let written = save_solid(&cube, &path).unwrap();
        assert_eq!(written, path);
        let back = load_solid(&path, PartMerge::All).unwrap();
        assert_eq!(back.vertex_count(), 8);
        assert_eq!(back.triangle_count(), 12);
        assert!(back.is_watertight());
        assert!((back.volume() - 24.0).abs() < 1e-3);
    }

    #[test]
    fn test_unsupported_extension_falls_back_to_stl() {
        let cube = cuboid(Point3::origin(), Point3::new(1.0, 1.0, 1.0));
        let path = temp_path("cube.step");
        let written = save_solid(&cube, &path).unwrap();
        assert_eq!(written.extension().unwrap(), "stl");
        assert!(written.exists());
        assert!(!path.exists());
    }

    #[test]
    fn test_missing_file_is_unreadable() {
        let err = load_solid(Path::new("/nonexistent/base.stl"), PartMerge::All).unwrap_err();
        assert!(matches!(err, MeshError::Unreadable { .. }));
    }

    #[test]
    fn test_empty_file_is_empty_geometry() {
        let path = temp_path("empty.obj");
        fs::write(&path, "# nothing here\n").unwrap();
        let err = load_solid(&path, PartMerge::All).unwrap_err();
        assert!(matches!(err, MeshError::EmptyGeometry(_)));
    }

    #[test]
    fn test_3mf_parts_merge_policy() {
        let a = cuboid(Point3::origin(), Point3::new(1.0, 1.0, 1.0));
        let b = cuboid(Point3::new(5.0, 0.0, 0.0), Point3::new(6.0, 1.0, 1.0));
        let path = temp_path("scene.3mf");
        save_parts(&[NamedPart::new("base", a), NamedPart::new("qr", b)], &path).unwrap();

        let parts = load_parts(&path).unwrap();
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[0].name, "base");
        assert_eq!(parts[1].name, "qr");

        let first = load_solid(&path, PartMerge::First).unwrap();
        assert_eq!(first.triangle_count(), 12);
        let all = load_solid(&path, PartMerge::All).unwrap();
        assert_eq!(all.triangle_count(), 24);
        assert!((all.bounds().max.x - 6.0).abs() < 1e-6);
    }
}
