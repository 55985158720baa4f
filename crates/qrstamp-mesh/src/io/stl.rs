//! STL reading (binary and ASCII) and binary writing.

use qrstamp_math::Point3;

use super::NamedPart;
use crate::error::{MeshError, Result};
use crate::Solid;

const HEADER_LEN: usize = 80;
const RECORD_LEN: usize = 50;

/// Parse STL bytes. ASCII files may hold several `solid` blocks.
pub fn parse_stl(bytes: &[u8]) -> Result<Vec<NamedPart>> {
    if is_binary(bytes) {
        return parse_binary(bytes).map(|s| vec![NamedPart::new("", s)]);
    }
    let text = String::from_utf8_lossy(bytes);
    if text.trim_start().starts_with("solid") {
        return parse_ascii(&text);
    }
    if bytes.len() >= HEADER_LEN + 4 {
        return parse_binary(bytes).map(|s| vec![NamedPart::new("", s)]);
    }
    Err(MeshError::Degenerate("not an STL file".into()))
}

fn triangle_count_field(bytes: &[u8]) -> Option<usize> {
    let raw: [u8; 4] = bytes.get(HEADER_LEN..HEADER_LEN + 4)?.try_into().ok()?;
    Some(u32::from_le_bytes(raw) as usize)
}

/// Binary files have an exact size; ASCII files that happen to start with
/// "solid" in a binary header are caught by this check too.
fn is_binary(bytes: &[u8]) -> bool {
    triangle_count_field(bytes)
        .is_some_and(|n| bytes.len() == HEADER_LEN + 4 + n * RECORD_LEN)
}

fn read_f32(bytes: &[u8], at: usize) -> f64 {
    let raw = [bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]];
    f32::from_le_bytes(raw) as f64
}

fn parse_binary(bytes: &[u8]) -> Result<Solid> {
    let n = triangle_count_field(bytes)
        .ok_or_else(|| MeshError::Degenerate("truncated STL header".into()))?;
    if bytes.len() < HEADER_LEN + 4 + n * RECORD_LEN {
        return Err(MeshError::Degenerate(format!(
            "binary STL declares {n} triangles but is only {} bytes",
            bytes.len()
        )));
    }
    let mut vertices = Vec::with_capacity(n * 3);
    let mut triangles = Vec::with_capacity(n);
    for t in 0..n {
        // skip the 12-byte facet normal
        let rec = HEADER_LEN + 4 + t * RECORD_LEN + 12;
        for k in 0..3 {
            let at = rec + k * 12;
            vertices.push(Point3::new(
                read_f32(bytes, at),
                read_f32(bytes, at + 4),
                read_f32(bytes, at + 8),
            ));
        }
        let base = (t * 3) as u32;
        triangles.push([base, base + 1, base + 2]);
    }
    Ok(Solid::new(vertices, triangles))
}

fn parse_ascii(text: &str) -> Result<Vec<NamedPart>> {
    let mut parts = Vec::new();
    let mut current: Option<NamedPart> = None;
    let mut facet: Vec<Point3> = Vec::new();

    for (lineno, line) in text.lines().enumerate() {
        let mut tokens = line.split_whitespace();
        match tokens.next() {
            Some("solid") => {
                let name = tokens.collect::<Vec<_>>().join(" ");
                if let Some(part) = current.take() {
                    parts.push(part);
                }
                current = Some(NamedPart::new(name, Solid::empty()));
            }
            Some("outer") => facet.clear(),
            Some("vertex") => {
                let coords: Vec<f64> = tokens.filter_map(|t| t.parse().ok()).collect();
                if coords.len() != 3 {
                    return Err(MeshError::Degenerate(format!(
                        "bad vertex on line {}",
                        lineno + 1
                    )));
                }
                facet.push(Point3::new(coords[0], coords[1], coords[2]));
            }
            Some("endloop") => {
                let part = current.get_or_insert_with(|| NamedPart::new("", Solid::empty()));
                let solid = &mut part.solid;
                if facet.len() >= 3 {
                    let base = solid.vertices.len() as u32;
                    solid.vertices.extend_from_slice(&facet);
                    for i in 1..facet.len() as u32 - 1 {
                        solid.triangles.push([base, base + i, base + i + 1]);
                    }
                }
                facet.clear();
            }
            Some("endsolid") => {
                if let Some(part) = current.take() {
                    parts.push(part);
                }
            }
            _ => {}
        }
    }
    if let Some(part) = current.take() {
        parts.push(part);
    }
    Ok(parts)
}

/// Encode a solid as binary STL.
pub fn write_stl(solid: &Solid) -> Vec<u8> {
    let num_triangles = solid.triangle_count();
    let mut data = Vec::with_capacity(HEADER_LEN + 4 + num_triangles * RECORD_LEN);

    let mut header = [b' '; HEADER_LEN];
    let tag = b"qrstamp binary STL";
    header[..tag.len()].copy_from_slice(tag);
    data.extend_from_slice(&header);
    data.extend_from_slice(&(num_triangles as u32).to_le_bytes());

    for i in 0..num_triangles {
        let n = solid.triangle_normal(i);
        let len = n.norm();
        let n = if len > 1e-10 {
            n / len
        } else {
            qrstamp_math::Vec3::z()
        };
        for c in [n.x, n.y, n.z] {
            data.extend_from_slice(&(c as f32).to_le_bytes());
        }
        for v in solid.triangle(i) {
            for c in [v.x, v.y, v.z] {
                data.extend_from_slice(&(c as f32).to_le_bytes());
            }
        }
        // attribute byte count
        data.extend_from_slice(&0u16.to_le_bytes());
    }
    data
}
