use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use bytemuck::{Pod, Zeroable};
use glam::Vec3;
use serde::{Deserialize, Serialize};

/// Interleaved vertex as uploaded to the mesh pipeline.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Default, Pod, Zeroable, Serialize, Deserialize)]
pub struct Vertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
}

impl Vertex {
    pub fn new(position: Vec3, normal: Vec3) -> Self {
        Self {
            position: position.to_array(),
            normal: normal.to_array(),
        }
    }

    fn normal_vec(&self) -> Vec3 {
        Vec3::from_array(self.normal)
    }
}

/// Indexed triangle list ready for upload.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MeshData {
    pub vertices: Vec<Vertex>,
    pub indices: Vec<u32>,
}

impl MeshData {
    /// Axis aligned cube centred on the origin with flat-shaded faces.
    pub fn cube(half_extent: f32) -> Self {
        let h = half_extent;
        let faces: [(Vec3, [Vec3; 4]); 6] = [
            (
                Vec3::X,
                [
                    Vec3::new(h, -h, -h),
                    Vec3::new(h, h, -h),
                    Vec3::new(h, h, h),
                    Vec3::new(h, -h, h),
                ],
            ),
            (
                Vec3::NEG_X,
                [
                    Vec3::new(-h, h, -h),
                    Vec3::new(-h, -h, -h),
                    Vec3::new(-h, -h, h),
                    Vec3::new(-h, h, h),
                ],
            ),
            (
                Vec3::Y,
                [
                    Vec3::new(h, h, -h),
                    Vec3::new(-h, h, -h),
                    Vec3::new(-h, h, h),
                    Vec3::new(h, h, h),
                ],
            ),
            (
                Vec3::NEG_Y,
                [
                    Vec3::new(-h, -h, -h),
                    Vec3::new(h, -h, -h),
                    Vec3::new(h, -h, h),
                    Vec3::new(-h, -h, h),
                ],
            ),
            (
                Vec3::Z,
                [
                    Vec3::new(-h, -h, h),
                    Vec3::new(h, -h, h),
                    Vec3::new(h, h, h),
                    Vec3::new(-h, h, h),
                ],
            ),
            (
                Vec3::NEG_Z,
                [
                    Vec3::new(-h, h, -h),
                    Vec3::new(h, h, -h),
                    Vec3::new(h, -h, -h),
                    Vec3::new(-h, -h, -h),
                ],
            ),
        ];

        let mut mesh = MeshData::default();
        for (normal, corners) in faces {
            let base = mesh.vertices.len() as u32;
            mesh.vertices
                .extend(corners.iter().map(|corner| Vertex::new(*corner, normal)));
            mesh.indices
                .extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
        }
        mesh
    }

    /// Square in the XY plane facing +Z, `size` units on a side.
    pub fn plane(size: f32) -> Self {
        let h = size * 0.5;
        let vertices = [
            Vec3::new(-h, -h, 0.0),
            Vec3::new(h, -h, 0.0),
            Vec3::new(h, h, 0.0),
            Vec3::new(-h, h, 0.0),
        ]
        .into_iter()
        .map(|p| Vertex::new(p, Vec3::Z))
        .collect();
        MeshData {
            vertices,
            indices: vec![0, 1, 2, 0, 2, 3],
        }
    }

    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }
}

/// Where a render component gets its geometry from.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MeshSource {
    #[default]
    Cube,
    Plane { size: f32 },
    Obj { path: PathBuf },
}

impl MeshSource {
    /// Stable key for mesh caches (`f32` sizes are keyed by their bits).
    pub fn cache_key(&self) -> String {
        match self {
            Self::Cube => "cube".to_string(),
            Self::Plane { size } => format!("plane:{:08x}", size.to_bits()),
            Self::Obj { path } => format!("obj:{}", path.display()),
        }
    }

    pub fn load(&self) -> Result<MeshData> {
        match self {
            Self::Cube => Ok(MeshData::cube(0.5)),
            Self::Plane { size } => Ok(MeshData::plane(*size)),
            Self::Obj { path } => load_obj_file(path),
        }
    }
}

pub fn load_obj_file(path: &Path) -> Result<MeshData> {
    let data = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read mesh {}", path.display()))?;
    load_obj_from_str(&data).with_context(|| format!("failed to parse mesh {}", path.display()))
}

/// Parses an OBJ file from memory. Polygons are fan-triangulated and
/// identical position/normal pairs share one vertex.
pub fn load_obj_from_str(data: &str) -> Result<MeshData> {
    let mut positions = Vec::new();
    let mut normals = Vec::new();
    let mut triangles: Vec<[FaceIndex; 3]> = Vec::new();

    for (line_no, line) in data.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let mut parts = trimmed.split_whitespace();
        let Some(tag) = parts.next() else {
            continue;
        };
        match tag {
            "v" => positions.push(
                parse_vec3(parts)
                    .with_context(|| format!("invalid position on line {}", line_no + 1))?,
            ),
            "vn" => normals.push(
                parse_vec3(parts)
                    .with_context(|| format!("invalid normal on line {}", line_no + 1))?,
            ),
            "f" => {
                let polygon = parse_face(parts, positions.len(), normals.len())
                    .with_context(|| format!("invalid face on line {}", line_no + 1))?;
                for i in 1..polygon.len() - 1 {
                    triangles.push([polygon[0], polygon[i], polygon[i + 1]]);
                }
            }
            _ => {}
        }
    }

    if positions.is_empty() {
        return Err(anyhow!("mesh has no positions"));
    }

    let mut mesh = assemble(&positions, &normals, &triangles)?;
    if mesh.vertices.iter().any(|v| v.normal_vec() == Vec3::ZERO) {
        generate_normals(&mut mesh);
    }
    Ok(mesh)
}

/// Zero-based corner indices, already resolved against the counts seen so far.
#[derive(Debug, Clone, Copy)]
struct FaceIndex {
    position: usize,
    normal: Option<usize>,
}

fn parse_vec3<'a>(mut parts: impl Iterator<Item = &'a str>) -> Result<Vec3> {
    let mut next = || -> Result<f32> {
        Ok(parts
            .next()
            .ok_or_else(|| anyhow!("expected three components"))?
            .parse::<f32>()?)
    };
    Ok(Vec3::new(next()?, next()?, next()?))
}

fn parse_face<'a>(
    parts: impl Iterator<Item = &'a str>,
    position_count: usize,
    normal_count: usize,
) -> Result<Vec<FaceIndex>> {
    let mut polygon = Vec::new();
    for part in parts {
        let mut segments = part.split('/');
        let raw = segments
            .next()
            .ok_or_else(|| anyhow!("missing position index"))?
            .parse::<i32>()?;
        let position = resolve_index(raw, position_count)
            .ok_or_else(|| anyhow!("position index {raw} out of range"))?;
        // v/vt/vn, texture coordinates are ignored.
        let normal = match segments.nth(1) {
            Some(s) if !s.is_empty() => resolve_index(s.parse::<i32>()?, normal_count),
            _ => None,
        };
        polygon.push(FaceIndex { position, normal });
    }
    if polygon.len() < 3 {
        return Err(anyhow!("face needs at least 3 vertices"));
    }
    Ok(polygon)
}

/// Resolves a one-based (or negative, relative) OBJ index. Negative indices
/// count back from `len`, the number of elements declared before the face.
fn resolve_index(index: i32, len: usize) -> Option<usize> {
    match index {
        i if i > 0 => Some(i as usize - 1),
        i if i < 0 => {
            let back = i.unsigned_abs() as usize;
            (back <= len).then(|| len - back)
        }
        _ => None,
    }
}

fn assemble(positions: &[Vec3], normals: &[Vec3], triangles: &[[FaceIndex; 3]]) -> Result<MeshData> {
    let mut lookup: HashMap<(usize, Option<usize>), u32> = HashMap::new();
    let mut mesh = MeshData::default();

    for triangle in triangles {
        for corner in triangle {
            let position = corner.position;
            if position >= positions.len() {
                return Err(anyhow!("position index {} out of range", position + 1));
            }
            let normal = corner.normal.filter(|&i| i < normals.len());
            let next = mesh.vertices.len() as u32;
            let index = *lookup.entry((position, normal)).or_insert_with(|| {
                let n = normal.map(|i| normals[i]).unwrap_or(Vec3::ZERO);
                mesh.vertices.push(Vertex::new(positions[position], n));
                next
            });
            mesh.indices.push(index);
        }
    }
    Ok(mesh)
}

fn generate_normals(mesh: &mut MeshData) {
    let mut accum = vec![Vec3::ZERO; mesh.vertices.len()];
    for triangle in mesh.indices.chunks_exact(3) {
        let [a, b, c] = [triangle[0] as usize, triangle[1] as usize, triangle[2] as usize];
        let p0 = Vec3::from_array(mesh.vertices[a].position);
        let p1 = Vec3::from_array(mesh.vertices[b].position);
        let p2 = Vec3::from_array(mesh.vertices[c].position);
        let face = (p1 - p0).cross(p2 - p0);
        if face.length_squared() > f32::EPSILON {
            let face = face.normalize();
            accum[a] += face;
            accum[b] += face;
            accum[c] += face;
        }
    }
    for (vertex, normal) in mesh.vertices.iter_mut().zip(accum) {
        vertex.normal = normal.normalize_or_zero().to_array();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quad_is_fan_triangulated() {
        let obj = "v 0 0 0\nv 1 0 0\nv 1 1 0\nv 0 1 0\nf 1 2 3 4\n";
        let mesh = load_obj_from_str(obj).unwrap();
        assert_eq!(mesh.indices, vec![0, 1, 2, 0, 2, 3]);
        assert_eq!(mesh.vertices.len(), 4);
    }

    #[test]
    fn negative_indices_are_relative() {
        let obj = "v 0 0 0\nv 1 0 0\nv 0 1 0\nf -3 -2 -1\n";
        let mesh = load_obj_from_str(obj).unwrap();
        assert_eq!(mesh.triangle_count(), 1);
        assert_eq!(mesh.vertices[2].position, [0.0, 1.0, 0.0]);
    }

    #[test]
    fn negative_indices_count_vertices_declared_before_the_face() {
        let obj = "v 0 0 0\nv 1 0 0\nv 0 1 0\nf -3 -2 -1\nv 9 9 9\n";
        let mesh = load_obj_from_str(obj).unwrap();
        assert_eq!(mesh.vertices[0].position, [0.0, 0.0, 0.0]);
        assert_eq!(mesh.vertices[2].position, [0.0, 1.0, 0.0]);
    }

    #[test]
    fn relative_index_before_any_vertex_is_an_error() {
        let obj = "f -1 -2 -3\nv 0 0 0\nv 1 0 0\nv 0 1 0\n";
        assert!(load_obj_from_str(obj).is_err());
    }

    #[test]
    fn generates_normals_when_missing() {
        let obj = "v 0 0 0\nv 1 0 0\nv 0 1 0\nf 1 2 3\n";
        let mesh = load_obj_from_str(obj).unwrap();
        for vertex in &mesh.vertices {
            assert!((Vec3::from_array(vertex.normal) - Vec3::Z).length() < 1e-5);
        }
    }

    #[test]
    fn keeps_explicit_normals() {
        let obj = "v 0 0 0\nv 1 0 0\nv 0 1 0\nvn 0 0 -1\nf 1//1 2//1 3//1\n";
        let mesh = load_obj_from_str(obj).unwrap();
        assert_eq!(mesh.vertices[0].normal, [0.0, 0.0, -1.0]);
    }

    #[test]
    fn rejects_out_of_range_index() {
        let obj = "v 0 0 0\nv 1 0 0\nv 0 1 0\nf 1 2 9\n";
        assert!(load_obj_from_str(obj).is_err());
    }

    #[test]
    fn cube_has_outward_normals() {
        let cube = MeshData::cube(0.5);
        assert_eq!(cube.vertices.len(), 24);
        assert_eq!(cube.triangle_count(), 12);
        for vertex in &cube.vertices {
            let p = Vec3::from_array(vertex.position);
            assert!(p.dot(vertex.normal_vec()) > 0.0);
        }
    }

    #[test]
    fn mesh_source_round_trips_through_json() {
        let source = MeshSource::Plane { size: 4.0 };
        let json = serde_json::to_string(&source).unwrap();
        assert_eq!(json, r#"{"type":"plane","size":4.0}"#);
        let back: MeshSource = serde_json::from_str(&json).unwrap();
        assert_eq!(back, source);
    }
}
