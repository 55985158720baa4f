//! 3MF container reading and writing.

use std::collections::HashMap;
use std::fmt::Write as _;
use std::io::{Cursor, Read, Write};

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use qrstamp_math::{Point3, Transform};
use zip::write::SimpleFileOptions;
use zip::{ZipArchive, ZipWriter};

use super::NamedPart;
use crate::error::{MeshError, Result};
use crate::Solid;

const MODEL_PATH: &str = "3D/3dmodel.model";

const CONTENT_TYPES_XML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types">
    <Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/>
    <Default Extension="model" ContentType="application/vnd.ms-package.3dmanufacturing-3dmodel+xml"/>
</Types>"#;

const RELS_XML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">
    <Relationship Target="/3D/3dmodel.model" Id="rel-1" Type="http://schemas.microsoft.com/3dmanufacturing/2013/01/3dmodel"/>
</Relationships>"#;

/// Encode parts as a 3MF package, one object and one build item per part.
pub fn write_3mf(parts: &[NamedPart]) -> Result<Vec<u8>> {
    let mut buffer = Cursor::new(Vec::new());
    let mut zip = ZipWriter::new(&mut buffer);
    let options = SimpleFileOptions::default()
        .compression_method(zip::CompressionMethod::Deflated)
        .compression_level(Some(6));

    zip.start_file("[Content_Types].xml", options)?;
    zip.write_all(CONTENT_TYPES_XML.as_bytes())?;
    zip.start_file("_rels/.rels", options)?;
    zip.write_all(RELS_XML.as_bytes())?;
    zip.start_file(MODEL_PATH, options)?;
    zip.write_all(model_xml(parts).as_bytes())?;
    zip.finish()?;

    Ok(buffer.into_inner())
}

fn escape_attr(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('"', "&quot;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

fn model_xml(parts: &[NamedPart]) -> String {
    let mut objects = String::new();
    let mut items = String::new();
    for (i, part) in parts.iter().enumerate() {
        let id = i + 1;
        let _ = writeln!(
            objects,
            "        <object id=\"{id}\" name=\"{}\" type=\"model\">\n            <mesh>\n                <vertices>",
            escape_attr(&part.name)
        );
        for v in &part.solid.vertices {
            let _ = writeln!(
                objects,
                "                    <vertex x=\"{:.6}\" y=\"{:.6}\" z=\"{:.6}\"/>",
                v.x, v.y, v.z
            );
        }
        objects.push_str("                </vertices>\n                <triangles>\n");
        for t in &part.solid.triangles {
            let _ = writeln!(
                objects,
                "                    <triangle v1=\"{}\" v2=\"{}\" v3=\"{}\"/>",
                t[0], t[1], t[2]
            );
        }
        objects.push_str("                </triangles>\n            </mesh>\n        </object>\n");
        let _ = writeln!(
            items,
            "        <item objectid=\"{id}\" transform=\"1 0 0 0 1 0 0 0 1 0 0 0\" p:UUID=\"{}\"/>",
            uuid::Uuid::new_v4()
        );
    }

    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<model unit="millimeter" xml:lang="en-US" xmlns="http://schemas.microsoft.com/3dmanufacturing/core/2015/02" xmlns:p="http://schemas.microsoft.com/3dmanufacturing/production/2015/06">
    <metadata name="Application">qrstamp</metadata>
    <resources>
{objects}    </resources>
    <build p:UUID="{}">
{items}    </build>
</model>"#,
        uuid::Uuid::new_v4()
    )
}

// =============================================================================
// Reading
// =============================================================================

/// One `<object>` resource: its own mesh and/or references to other objects.
#[derive(Default)]
struct ObjectDef {
    name: String,
    mesh: Solid,
    components: Vec<(String, Transform)>,
}

/// Parse a 3MF package. Every build item becomes one part, with the item
/// and component transforms applied. Without a build section every mesh
/// object is returned untransformed.
pub fn parse_3mf(bytes: &[u8]) -> Result<Vec<NamedPart>> {
    let mut archive = ZipArchive::new(Cursor::new(bytes))?;
    let model_name = if archive.by_name(MODEL_PATH).is_ok() {
        MODEL_PATH.to_string()
    } else {
        archive
            .file_names()
            .find(|n| n.ends_with(".model"))
            .map(str::to_string)
            .ok_or_else(|| MeshError::Xml("no .model part in package".into()))?
    };
    let mut xml = String::new();
    archive.by_name(&model_name)?.read_to_string(&mut xml)?;
    parse_model_xml(&xml)
}

fn attr(e: &BytesStart<'_>, name: &[u8]) -> Result<Option<String>> {
    for a in e.attributes() {
        let a = a.map_err(|err| MeshError::Xml(err.to_string()))?;
        if a.key.local_name().as_ref() == name {
            let value = a
                .unescape_value()
                .map_err(|err| MeshError::Xml(err.to_string()))?;
            return Ok(Some(value.into_owned()));
        }
    }
    Ok(None)
}

fn num_attr(e: &BytesStart<'_>, name: &[u8]) -> Result<f64> {
    attr(e, name)?
        .and_then(|s| s.trim().parse().ok())
        .ok_or_else(|| {
            MeshError::Xml(format!(
                "missing numeric attribute {}",
                String::from_utf8_lossy(name)
            ))
        })
}

fn index_attr(e: &BytesStart<'_>, name: &[u8]) -> Result<u32> {
    attr(e, name)?
        .and_then(|s| s.trim().parse().ok())
        .ok_or_else(|| {
            MeshError::Xml(format!(
                "missing index attribute {}",
                String::from_utf8_lossy(name)
            ))
        })
}

/// 3MF matrices are 12 numbers in row-vector order:
/// `m00 m01 m02 m10 m11 m12 m20 m21 m22 m30 m31 m32`.
fn parse_transform(s: Option<String>) -> Result<Transform> {
    let Some(s) = s else {
        return Ok(Transform::identity());
    };
    let m: Vec<f64> = s
        .split_whitespace()
        .map(|t| t.parse::<f64>())
        .collect::<std::result::Result<_, _>>()
        .map_err(|e| MeshError::Xml(format!("bad transform: {e}")))?;
    if m.len() != 12 {
        return Err(MeshError::Xml(format!("transform has {} values", m.len())));
    }
    let mut t = Transform::identity();
    for row in 0..3 {
        for col in 0..3 {
            t.matrix[(row, col)] = m[col * 3 + row];
        }
        t.matrix[(row, 3)] = m[9 + row];
    }
    Ok(t)
}

fn parse_model_xml(xml: &str) -> Result<Vec<NamedPart>> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut objects: HashMap<String, ObjectDef> = HashMap::new();
    let mut order: Vec<String> = Vec::new();
    let mut items: Vec<(String, Transform)> = Vec::new();
    let mut current: Option<(String, ObjectDef)> = None;

    loop {
        let event = reader
            .read_event()
            .map_err(|e| MeshError::Xml(e.to_string()))?;
        match event {
            Event::Start(e) | Event::Empty(e) => match e.local_name().as_ref() {
                b"object" => {
                    let id = attr(&e, b"id")?.unwrap_or_default();
                    let def = ObjectDef {
                        name: attr(&e, b"name")?.unwrap_or_default(),
                        ..ObjectDef::default()
                    };
                    current = Some((id, def));
                }
                b"vertex" => {
                    if let Some((_, def)) = current.as_mut() {
                        def.mesh.vertices.push(Point3::new(
                            num_attr(&e, b"x")?,
                            num_attr(&e, b"y")?,
                            num_attr(&e, b"z")?,
                        ));
                    }
                }
                b"triangle" => {
                    if let Some((_, def)) = current.as_mut() {
                        let t = [
                            index_attr(&e, b"v1")?,
                            index_attr(&e, b"v2")?,
                            index_attr(&e, b"v3")?,
                        ];
                        let n = def.mesh.vertices.len() as u32;
                        if t.iter().any(|&i| i >= n) {
                            return Err(MeshError::Xml(format!(
                                "triangle index out of range in object {}",
                                def.name
                            )));
                        }
                        def.mesh.triangles.push(t);
                    }
                }
                b"component" => {
                    if let Some((_, def)) = current.as_mut() {
                        let target = attr(&e, b"objectid")?.unwrap_or_default();
                        def.components
                            .push((target, parse_transform(attr(&e, b"transform")?)?));
                    }
                }
                b"item" => {
                    let target = attr(&e, b"objectid")?.unwrap_or_default();
                    items.push((target, parse_transform(attr(&e, b"transform")?)?));
                }
                _ => {}
            },
            Event::End(e) if e.local_name().as_ref() == b"object" => {
                if let Some((id, def)) = current.take() {
                    order.push(id.clone());
                    objects.insert(id, def);
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if items.is_empty() {
        return Ok(order
            .iter()
            .filter_map(|id| objects.get(id))
            .filter(|def| !def.mesh.is_empty())
            .map(|def| NamedPart::new(def.name.clone(), def.mesh.clone()))
            .collect());
    }

    let mut parts = Vec::with_capacity(items.len());
    for (id, transform) in items {
        let mut solid = Solid::empty();
        resolve_object(&objects, &id, &transform, 0, &mut solid)?;
        let name = objects.get(&id).map(|d| d.name.clone()).unwrap_or_default();
        parts.push(NamedPart::new(name, solid));
    }
    Ok(parts)
}

fn resolve_object(
    objects: &HashMap<String, ObjectDef>,
    id: &str,
    transform: &Transform,
    depth: usize,
    out: &mut Solid,
) -> Result<()> {
    if depth > 16 {
        return Err(MeshError::Xml("component nesting too deep".into()));
    }
    let def = objects
        .get(id)
        .ok_or_else(|| MeshError::Xml(format!("build item references unknown object {id}")))?;
    if !def.mesh.is_empty() {
        out.merge(&def.mesh.clone().transformed(transform));
    }
    for (child, local) in &def.components {
        resolve_object(objects, child, &transform.then(local), depth + 1, out)?;
    }
    Ok(())
}
