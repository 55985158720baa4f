//! Wavefront OBJ reading and writing.

use std::fmt::Write as _;

use qrstamp_math::Point3;

use super::NamedPart;
use crate::error::{MeshError, Result};
use crate::Solid;

/// Parse OBJ text. Each `o`/`g` statement starts a new part; faces are
/// fan-triangulated and may use negative (relative) indices.
pub fn parse_obj(text: &str) -> Result<Vec<NamedPart>> {
    let mut positions: Vec<Point3> = Vec::new();
    let mut parts: Vec<(String, Vec<[usize; 3]>)> = vec![(String::new(), Vec::new())];

    for (lineno, line) in text.lines().enumerate() {
        let line = line.split('#').next().unwrap_or("");
        let mut tokens = line.split_whitespace();
        match tokens.next() {
            Some("v") => {
                let c: Vec<f64> = tokens.take(3).filter_map(|t| t.parse().ok()).collect();
                if c.len() != 3 {
                    return Err(MeshError::Degenerate(format!(
                        "bad vertex on line {}",
                        lineno + 1
                    )));
                }
                positions.push(Point3::new(c[0], c[1], c[2]));
            }
            Some("o") | Some("g") => {
                let name = tokens.collect::<Vec<_>>().join(" ");
                match parts.last_mut() {
                    Some(last) if last.1.is_empty() => last.0 = name,
                    _ => parts.push((name, Vec::new())),
                }
            }
            Some("f") => {
                let mut face = Vec::new();
                for t in tokens {
                    let idx = t.split('/').next().unwrap_or("");
                    let i: i64 = idx.parse().map_err(|_| {
                        MeshError::Degenerate(format!("bad face index on line {}", lineno + 1))
                    })?;
                    let resolved = if i < 0 {
                        positions.len() as i64 + i
                    } else {
                        i - 1
                    };
                    if resolved < 0 || resolved as usize >= positions.len() {
                        return Err(MeshError::Degenerate(format!(
                            "face index {i} out of range on line {}",
                            lineno + 1
                        )));
                    }
                    face.push(resolved as usize);
                }
                if face.len() >= 3 {
                    if let Some(part) = parts.last_mut() {
                        for k in 1..face.len() - 1 {
                            part.1.push([face[0], face[k], face[k + 1]]);
                        }
                    }
                }
            }
            _ => {}
        }
    }

    // Each part gets its own compact vertex buffer.
    Ok(parts
        .into_iter()
        .filter(|(_, faces)| !faces.is_empty())
        .map(|(name, faces)| {
            let mut remap = std::collections::HashMap::new();
            let mut vertices = Vec::new();
            let triangles = faces
                .iter()
                .map(|f| {
                    f.map(|g| {
                        *remap.entry(g).or_insert_with(|| {
                            vertices.push(positions[g]);
                            (vertices.len() - 1) as u32
                        })
                    })
                })
                .collect();
            NamedPart::new(name, Solid::new(vertices, triangles))
        })
        .collect())
}

/// Encode a solid as OBJ text.
pub fn write_obj(solid: &Solid) -> String {
    let mut out = String::with_capacity(solid.vertex_count() * 32 + solid.triangle_count() * 24);
    out.push_str("# qrstamp\no solid\n");
    for v in &solid.vertices {
        let _ = writeln!(out, "v {:.6} {:.6} {:.6}", v.x, v.y, v.z);
    }
    for t in &solid.triangles {
        let _ = writeln!(out, "f {} {} {}", t[0] + 1, t[1] + 1, t[2] + 1);
    }
    out
}
