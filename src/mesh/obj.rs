//! Line-oriented Wavefront OBJ reader for the subset the viewer needs:
//! positions, normals, texture coordinates, and triangle/quad faces.
//!
//! Any malformed line or out-of-range index aborts the whole parse; the
//! loader never emits partial geometry.

use crate::mesh::{MeshData, Vertex};
use log::{debug, info};
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ObjError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("line {line}: {reason}")]
    Malformed { line: usize, reason: String },
    #[error("line {line}: {kind} index {index} out of range (have {count})")]
    IndexOutOfRange {
        line: usize,
        kind: &'static str,
        index: usize,
        count: usize,
    },
}

/// One corner of a face after index validation. Indices are 0-based;
/// `texture`/`normal` are `None` when the component was absent (or written
/// as the OBJ "0" placeholder, which must never be looked up).
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
struct FaceRef {
    position: usize,
    texture: Option<usize>,
    normal: Option<usize>,
}

pub fn load(path: &Path) -> Result<MeshData, ObjError> {
    let text = fs::read_to_string(path)?;
    let mesh = parse(&text)?;
    info!(
        "Loaded {}: {} vertices, {} triangles",
        path.display(),
        mesh.vertices.len(),
        mesh.indices.len() / 3
    );
    Ok(mesh)
}

pub fn parse(text: &str) -> Result<MeshData, ObjError> {
    let mut positions: Vec<[f32; 3]> = Vec::new();
    let mut normals: Vec<[f32; 3]> = Vec::new();
    let mut tex_coords: Vec<[f32; 2]> = Vec::new();

    let mut mesh = MeshData::default();
    let mut seen: HashMap<FaceRef, u32> = HashMap::new();

    for (line_no, raw) in text.lines().enumerate() {
        let line_no = line_no + 1;
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let parts: Vec<&str> = line.split_whitespace().collect();
        match parts[0] {
            "v" => positions.push(parse_floats::<3>(&parts[1..], line_no)?),
            "vn" => normals.push(parse_floats::<3>(&parts[1..], line_no)?),
            "vt" => tex_coords.push(parse_floats::<2>(&parts[1..], line_no)?),
            "f" => {
                let corners = parts.len() - 1;
                if corners != 3 && corners != 4 {
                    return Err(ObjError::Malformed {
                        line: line_no,
                        reason: format!("face must have 3 or 4 vertices, found {}", corners),
                    });
                }

                let mut refs = [FaceRef { position: 0, texture: None, normal: None }; 4];
                for (slot, group) in refs.iter_mut().zip(&parts[1..]) {
                    *slot = parse_face_group(
                        group,
                        line_no,
                        positions.len(),
                        tex_coords.len(),
                        normals.len(),
                    )?;
                }

                let mut emit = |face_ref: FaceRef| {
                    let next = mesh.vertices.len() as u32;
                    let index = *seen.entry(face_ref).or_insert_with(|| {
                        mesh.vertices.push(Vertex {
                            position: positions[face_ref.position],
                            normal: face_ref.normal.map_or([0.0, 1.0, 0.0], |i| normals[i]),
                            tex_coord: face_ref.texture.map_or([0.0, 0.0], |i| tex_coords[i]),
                        });
                        next
                    });
                    mesh.indices.push(index);
                };

                // Triangle as-is; quad split along the 0-2 diagonal.
                for &i in &[0, 1, 2] {
                    emit(refs[i]);
                }
                if corners == 4 {
                    for &i in &[0, 2, 3] {
                        emit(refs[i]);
                    }
                }
            }
            "mtllib" | "usemtl" | "s" | "o" | "g" => {
                debug!("line {}: ignoring unsupported '{}' directive", line_no, parts[0]);
            }
            other => {
                debug!("line {}: ignoring unrecognized '{}' directive", line_no, other);
            }
        }
    }

    Ok(mesh)
}

fn parse_floats<const N: usize>(parts: &[&str], line_no: usize) -> Result<[f32; N], ObjError> {
    if parts.len() < N {
        return Err(ObjError::Malformed {
            line: line_no,
            reason: format!("expected {} components, found {}", N, parts.len()),
        });
    }
    let mut out = [0.0f32; N];
    for (dst, src) in out.iter_mut().zip(parts) {
        *dst = src.parse().map_err(|_| ObjError::Malformed {
            line: line_no,
            reason: format!("invalid float '{}'", src),
        })?;
    }
    Ok(out)
}

/// Parses one `vertex[/texture[/normal]]` group. Vertex indices are 1-based
/// and always required; a texture or normal index of 0 (or an empty slot)
/// means the component is absent.
fn parse_face_group(
    group: &str,
    line_no: usize,
    position_count: usize,
    texture_count: usize,
    normal_count: usize,
) -> Result<FaceRef, ObjError> {
    let mut fields = group.splitn(3, '/');

    let position = match fields.next().map(str::trim).filter(|s| !s.is_empty()) {
        Some(field) => {
            let index: usize = field.parse().map_err(|_| ObjError::Malformed {
                line: line_no,
                reason: format!("invalid vertex index '{}'", field),
            })?;
            if index == 0 {
                return Err(ObjError::Malformed {
                    line: line_no,
                    reason: "vertex index must be 1-based, found 0".to_string(),
                });
            }
            if index > position_count {
                return Err(ObjError::IndexOutOfRange {
                    line: line_no,
                    kind: "vertex",
                    index,
                    count: position_count,
                });
            }
            index - 1
        }
        None => {
            return Err(ObjError::Malformed {
                line: line_no,
                reason: format!("face group '{}' is missing a vertex index", group),
            });
        }
    };

    let texture = parse_optional_index(fields.next(), line_no, "texture", texture_count)?;
    let normal = parse_optional_index(fields.next(), line_no, "normal", normal_count)?;

    Ok(FaceRef { position, texture, normal })
}

fn parse_optional_index(
    field: Option<&str>,
    line_no: usize,
    kind: &'static str,
    count: usize,
) -> Result<Option<usize>, ObjError> {
    let Some(field) = field.map(str::trim).filter(|s| !s.is_empty()) else {
        return Ok(None);
    };
    let index: usize = field.parse().map_err(|_| ObjError::Malformed {
        line: line_no,
        reason: format!("invalid {} index '{}'", kind, field),
    })?;
    if index == 0 {
        // OBJ writes 0 for "no entry"; it is a placeholder, not a lookup.
        return Ok(None);
    }
    if index > count {
        return Err(ObjError::IndexOutOfRange { line: line_no, kind, index, count });
    }
    Ok(Some(index - 1))
}

#[cfg(test)]
mod tests {
    use super::*;

    const TRIANGLE: &str = "\
v 0.0 0.0 0.0
v 1.0 0.0 0.0
v 0.0 1.0 0.0
vn 0.0 0.0 1.0
vt 0.5 0.5
f 1/1/1 2/1/1 3/1/1
";

    #[test]
    fn triangle_indices_are_complete_and_in_range() {
        let mesh = parse(TRIANGLE).unwrap();
        assert_eq!(mesh.indices.len() % 3, 0);
        assert!(mesh
            .indices
            .iter()
            .all(|&i| (i as usize) < mesh.vertices.len()));
        assert_eq!(mesh.indices.len(), 3);
    }

    #[test]
    fn quad_splits_along_first_to_third_diagonal() {
        let text = "\
v 0.0 0.0 0.0
v 1.0 0.0 0.0
v 1.0 1.0 0.0
v 0.0 1.0 0.0
f 1 2 3 4
";
        let mesh = parse(text).unwrap();
        // (a,b,c) and (a,c,d), with vertices deduplicated in first-use order.
        assert_eq!(mesh.indices, vec![0, 1, 2, 0, 2, 3]);
        assert_eq!(mesh.vertices.len(), 4);
    }

    #[test]
    fn shared_corners_are_deduplicated() {
        let mesh = parse(
            "\
v 0.0 0.0 0.0
v 1.0 0.0 0.0
v 1.0 1.0 0.0
v 0.0 1.0 0.0
f 1 2 3
f 1 3 4
",
        )
        .unwrap();
        assert_eq!(mesh.vertices.len(), 4);
        assert_eq!(mesh.indices.len(), 6);
    }

    #[test]
    fn zero_vertex_index_is_rejected() {
        let text = "v 0.0 0.0 0.0\nf 0 1 1\n";
        assert!(matches!(
            parse(text),
            Err(ObjError::Malformed { line: 2, .. })
        ));
    }

    #[test]
    fn missing_vertex_index_is_rejected() {
        let text = "v 0.0 0.0 0.0\nvn 0.0 0.0 1.0\nf //1 1//1 1//1\n";
        assert!(matches!(parse(text), Err(ObjError::Malformed { .. })));
    }

    #[test]
    fn zero_texture_index_means_absent() {
        let text = "\
v 0.0 0.0 0.0
v 1.0 0.0 0.0
v 0.0 1.0 0.0
f 1/0 2/0 3/0
";
        let mesh = parse(text).unwrap();
        assert!(mesh.vertices.iter().all(|v| v.tex_coord == [0.0, 0.0]));
    }

    #[test]
    fn out_of_range_vertex_index_aborts() {
        let text = "v 0.0 0.0 0.0\nv 1.0 0.0 0.0\nf 1 2 5\n";
        assert!(matches!(
            parse(text),
            Err(ObjError::IndexOutOfRange { kind: "vertex", index: 5, count: 2, .. })
        ));
    }

    #[test]
    fn malformed_float_aborts() {
        assert!(matches!(
            parse("v 1.0 nope 2.0\n"),
            Err(ObjError::Malformed { line: 1, .. })
        ));
    }

    #[test]
    fn unsupported_directives_are_ignored() {
        let text = "\
mtllib scene.mtl
o cube
s off
v 0.0 0.0 0.0
v 1.0 0.0 0.0
v 0.0 1.0 0.0
f 1 2 3
";
        let mesh = parse(text).unwrap();
        assert_eq!(mesh.indices.len(), 3);
    }

    #[test]
    fn five_sided_face_is_rejected() {
        let text = "\
v 0.0 0.0 0.0
v 1.0 0.0 0.0
v 1.0 1.0 0.0
v 0.0 1.0 0.0
v -1.0 1.0 0.0
f 1 2 3 4 5
";
        assert!(matches!(parse(text), Err(ObjError::Malformed { .. })));
    }

    #[test]
    fn expand_matches_index_order() {
        let mesh = parse(TRIANGLE).unwrap();
        let flat = mesh.expand();
        assert_eq!(flat.len(), mesh.indices.len());
        assert_eq!(flat[0], mesh.vertices[mesh.indices[0] as usize]);
    }
}
