//! Wavefront OBJ text parser.
//!
//! Handles the subset `v vn vt f g o usemtl mtllib s`. Anything else is
//! reported as a [`ParseWarning`] and skipped, so files using unsupported
//! extensions still load.

use glam::Vec3;
use std::path::{Path, PathBuf};

/// One drawable group of triangles, de-indexed into flat component arrays.
///
/// An array that received no data is `None`.
#[derive(Debug, Clone, PartialEq)]
pub struct Geometry {
    pub object: String,
    pub groups: Vec<String>,
    pub material: String,
    /// Three floats per vertex.
    pub position: Option<Vec<f32>>,
    /// Two floats per vertex.
    pub texcoord: Option<Vec<f32>>,
    /// Three floats per vertex.
    pub normal: Option<Vec<f32>>,
}

impl Geometry {
    pub fn positions(&self) -> &[f32] {
        self.position.as_deref().unwrap_or_default()
    }

    pub fn texcoords(&self) -> Option<&[f32]> {
        self.texcoord.as_deref()
    }

    pub fn normals(&self) -> Option<&[f32]> {
        self.normal.as_deref()
    }

    pub fn vertex_count(&self) -> usize {
        self.positions().len() / 3
    }

    pub fn triangle_count(&self) -> usize {
        self.vertex_count() / 3
    }

    /// Per-triangle face normals, repeated for each of the triangle's vertices.
    pub fn flat_normals(&self) -> Vec<f32> {
        let mut out = Vec::with_capacity(self.triangle_count() * 9);
        for tri in self.positions().chunks_exact(9) {
            let a = Vec3::from_slice(&tri[0..3]);
            let b = Vec3::from_slice(&tri[3..6]);
            let c = Vec3::from_slice(&tri[6..9]);
            let n = (b - a).cross(c - a).normalize_or_zero();
            for _ in 0..3 {
                out.extend_from_slice(&n.to_array());
            }
        }
        out
    }
}

/// Result of a parse run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ObjDocument {
    pub geometries: Vec<Geometry>,
    /// Raw `mtllib` arguments, verbatim (filenames may contain spaces).
    pub material_libs: Vec<String>,
    pub warnings: Vec<ParseWarning>,
}

impl ObjDocument {
    pub fn vertex_count(&self) -> usize {
        self.geometries.iter().map(Geometry::vertex_count).sum()
    }
}

/// Non-fatal problem found while parsing. Line numbers are 1-based.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ParseWarning {
    #[error("line {line}: unhandled keyword `{keyword}`")]
    UnknownKeyword { line: usize, keyword: String },
    #[error("line {line}: `{token}` is not a number")]
    BadNumber { line: usize, token: String },
    #[error("line {line}: `{token}` is not a vertex index")]
    BadIndex { line: usize, token: String },
    #[error("line {line}: index {index} is outside a pool of {len} entries")]
    IndexOutOfRange { line: usize, index: i64, len: usize },
}

/// Errors from loading OBJ files. Parsing itself never fails.
#[derive(Debug, thiserror::Error)]
pub enum ObjError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Canceled(#[from] kiln_common::Canceled),
}

/// Read an OBJ file off-thread and parse it.
pub async fn load_obj(path: impl AsRef<Path>) -> Result<ObjDocument, ObjError> {
    let path = path.as_ref().to_path_buf();
    let read_path = path.clone();
    let text = kiln_common::unblock(move || std::fs::read_to_string(read_path))
        .await?
        .map_err(|source| ObjError::Io { path, source })?;
    Ok(parse_obj(&text))
}

/// Parse OBJ text into de-indexed, fan-triangulated geometries.
pub fn parse_obj(text: &str) -> ObjDocument {
    let mut parser = Parser::default();
    for (i, raw) in text.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        parser.line(i + 1, line);
    }
    parser.finish()
}

#[derive(Default)]
struct Building {
    object: String,
    groups: Vec<String>,
    material: String,
    position: Vec<f32>,
    texcoord: Vec<f32>,
    normal: Vec<f32>,
}

impl Building {
    fn finish(self) -> Geometry {
        let non_empty = |v: Vec<f32>| (!v.is_empty()).then_some(v);
        Geometry {
            object: self.object,
            groups: self.groups,
            material: self.material,
            position: non_empty(self.position),
            texcoord: non_empty(self.texcoord),
            normal: non_empty(self.normal),
        }
    }
}

struct Parser {
    // Index 0 of every pool is a zero sentinel so OBJ's 1-based indices map directly.
    positions: Vec<[f32; 3]>,
    texcoords: Vec<[f32; 2]>,
    normals: Vec<[f32; 3]>,
    geometries: Vec<Building>,
    /// Index into `geometries` of the one receiving faces, if open.
    current: Option<usize>,
    object: String,
    groups: Vec<String>,
    material: String,
    material_libs: Vec<String>,
    warnings: Vec<ParseWarning>,
}

impl Default for Parser {
    fn default() -> Self {
        Self {
            positions: vec![[0.0; 3]],
            texcoords: vec![[0.0; 2]],
            normals: vec![[0.0; 3]],
            geometries: Vec::new(),
            current: None,
            object: "default".into(),
            groups: vec!["default".into()],
            material: "default".into(),
            material_libs: Vec::new(),
            warnings: Vec::new(),
        }
    }
}

impl Parser {
    fn line(&mut self, line_no: usize, line: &str) {
        let mut tokens = line.split_whitespace();
        let Some(keyword) = tokens.next() else {
            return;
        };
        let parts: Vec<&str> = tokens.collect();
        let unparsed = line[keyword.len()..].trim_start();

        match keyword {
            "v" => {
                let p = self.components::<3>(line_no, &parts);
                self.positions.push(p);
            }
            "vn" => {
                let n = self.components::<3>(line_no, &parts);
                self.normals.push(n);
            }
            "vt" => {
                let t = self.components::<2>(line_no, &parts);
                self.texcoords.push(t);
            }
            "f" => self.face(line_no, &parts),
            "s" => {}
            "mtllib" => self.material_libs.push(unparsed.to_string()),
            "usemtl" => {
                self.material = unparsed.to_string();
                self.close_geometry();
            }
            "g" => {
                self.groups = parts.iter().map(|s| s.to_string()).collect();
                self.close_geometry();
            }
            "o" => {
                self.object = unparsed.to_string();
                self.close_geometry();
            }
            other => {
                tracing::warn!(line = line_no, keyword = other, "unhandled OBJ keyword");
                self.warnings.push(ParseWarning::UnknownKeyword {
                    line: line_no,
                    keyword: other.to_string(),
                });
            }
        }
    }

    /// Fixed-width pool entry: missing components are 0, extras are ignored.
    fn components<const N: usize>(&mut self, line_no: usize, parts: &[&str]) -> [f32; N] {
        let mut out = [0.0; N];
        for (slot, token) in out.iter_mut().zip(parts) {
            match token.parse::<f32>() {
                Ok(v) => *slot = v,
                Err(_) => {
                    tracing::warn!(line = line_no, token, "unparsable OBJ number");
                    self.warnings.push(ParseWarning::BadNumber {
                        line: line_no,
                        token: token.to_string(),
                    });
                }
            }
        }
        out
    }

    /// Metadata changed: stop appending to a geometry that already has data.
    fn close_geometry(&mut self) {
        if let Some(i) = self.current {
            if !self.geometries[i].position.is_empty() {
                self.current = None;
            }
        }
    }

    fn open_geometry(&mut self) -> usize {
        if let Some(i) = self.current {
            return i;
        }
        self.geometries.push(Building {
            object: self.object.clone(),
            groups: self.groups.clone(),
            material: self.material.clone(),
            ..Building::default()
        });
        let i = self.geometries.len() - 1;
        self.current = Some(i);
        i
    }

    fn face(&mut self, line_no: usize, parts: &[&str]) {
        let g = self.open_geometry();
        for k in 0..parts.len().saturating_sub(2) {
            self.vertex(g, line_no, parts[0]);
            self.vertex(g, line_no, parts[k + 1]);
            self.vertex(g, line_no, parts[k + 2]);
        }
    }

    fn vertex(&mut self, g: usize, line_no: usize, token: &str) {
        for (slot, raw) in token.split('/').enumerate() {
            if raw.is_empty() {
                continue;
            }
            let Ok(index) = raw.parse::<i64>() else {
                self.warn_index(ParseWarning::BadIndex {
                    line: line_no,
                    token: raw.to_string(),
                });
                continue;
            };
            let len = match slot {
                0 => self.positions.len(),
                1 => self.texcoords.len(),
                2 => self.normals.len(),
                _ => {
                    self.warn_index(ParseWarning::BadIndex {
                        line: line_no,
                        token: token.to_string(),
                    });
                    break;
                }
            };
            let Some(i) = resolve_index(index, len) else {
                self.warn_index(ParseWarning::IndexOutOfRange {
                    line: line_no,
                    index,
                    len,
                });
                continue;
            };
            let geometry = &mut self.geometries[g];
            match slot {
                0 => geometry.position.extend_from_slice(&self.positions[i]),
                1 => geometry.texcoord.extend_from_slice(&self.texcoords[i]),
                _ => geometry.normal.extend_from_slice(&self.normals[i]),
            }
        }
    }

    fn warn_index(&mut self, warning: ParseWarning) {
        tracing::warn!(%warning, "skipping OBJ vertex index");
        self.warnings.push(warning);
    }

    fn finish(self) -> ObjDocument {
        ObjDocument {
            geometries: self.geometries.into_iter().map(Building::finish).collect(),
            material_libs: self.material_libs,
            warnings: self.warnings,
        }
    }
}

/// Positive indices are used as written; negative ones count back from the
/// end of the pool (whose length includes the sentinel).
fn resolve_index(index: i64, len: usize) -> Option<usize> {
    let len = len as i64;
    let i = if index >= 0 { index } else { len + index };
    (0..len).contains(&i).then_some(i as usize)
}
