//! Scene bookkeeping over the parsed document.
//!
//! Parsing is delegated to the `gltf` crate; this module classifies its
//! failures, then traverses the document exactly once to accumulate
//! triangle/vertex counts and the world-space bounding volume, and
//! derives the transform that normalizes the scene to a fixed
//! reference size centered at the origin.

use std::collections::VecDeque;

use glam::{Mat4, Vec3};
use thiserror::Error;
use tracing::info;

/// The largest bounding-box dimension of a normalized scene, in world
/// units.
pub const REFERENCE_SIZE: f32 = 10.0;

/// Parse failures, reported verbatim with no retry. The allocation
/// subtype exists so callers can suggest a compressed or smaller file
/// instead of a generic error.
#[derive(Error, Debug)]
pub enum ParseError {
    #[error("model too large for available memory: {0}")]
    OutOfMemory(String),

    #[error("failed to parse model: {0}")]
    Malformed(String),
}

/// Substrings recognized as allocation-failure signatures.
const OOM_SIGNATURES: &[&str] = &[
    "allocation failed",
    "out of memory",
    "memory allocation",
    "capacity overflow",
];

fn classify(message: String) -> ParseError {
    let lower = message.to_lowercase();
    if OOM_SIGNATURES.iter().any(|sig| lower.contains(sig)) {
        ParseError::OutOfMemory(message)
    } else {
        ParseError::Malformed(message)
    }
}

/// Delegate parsing of an assembled buffer to the glTF parser,
/// resolving buffers and decoding images.
pub fn parse(
    buffer: &[u8],
) -> Result<(gltf::Document, Vec<gltf::buffer::Data>, Vec<gltf::image::Data>), ParseError> {
    gltf::import_slice(buffer).map_err(|e| classify(e.to_string()))
}

/// Axis-aligned bounding box.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    pub min: [f32; 3],
    pub max: [f32; 3],
}

impl Aabb {
    pub fn empty() -> Self {
        Self {
            min: [f32::INFINITY; 3],
            max: [f32::NEG_INFINITY; 3],
        }
    }

    pub fn is_empty(&self) -> bool {
        self.min[0] > self.max[0]
    }

    pub fn union_point(&mut self, p: Vec3) {
        for i in 0..3 {
            self.min[i] = self.min[i].min(p[i]);
            self.max[i] = self.max[i].max(p[i]);
        }
    }

    pub fn size(&self) -> [f32; 3] {
        if self.is_empty() {
            return [0.0; 3];
        }
        [
            self.max[0] - self.min[0],
            self.max[1] - self.min[1],
            self.max[2] - self.min[2],
        ]
    }

    pub fn center(&self) -> [f32; 3] {
        if self.is_empty() {
            return [0.0; 3];
        }
        [
            (self.min[0] + self.max[0]) * 0.5,
            (self.min[1] + self.max[1]) * 0.5,
            (self.min[2] + self.max[2]) * 0.5,
        ]
    }

    pub fn max_dimension(&self) -> f32 {
        let size = self.size();
        size[0].max(size[1]).max(size[2])
    }
}

/// Uniform scale plus translation that maps a scene's bounding volume
/// onto [`REFERENCE_SIZE`] centered at the origin.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NormalizationTransform {
    pub scale: f32,
    pub translation: [f32; 3],
}

impl NormalizationTransform {
    pub const IDENTITY: Self = Self {
        scale: 1.0,
        translation: [0.0; 3],
    };

    /// Degenerate or empty bounds normalize to the identity.
    pub fn for_bounds(bounds: &Aabb) -> Self {
        let max_dim = bounds.max_dimension();
        if !max_dim.is_finite() || max_dim <= 0.0 {
            return Self::IDENTITY;
        }
        let scale = REFERENCE_SIZE / max_dim;
        let center = bounds.center();
        Self {
            scale,
            translation: [
                -center[0] * scale,
                -center[1] * scale,
                -center[2] * scale,
            ],
        }
    }

    pub fn apply(&self, p: [f32; 3]) -> [f32; 3] {
        [
            p[0] * self.scale + self.translation[0],
            p[1] * self.scale + self.translation[1],
            p[2] * self.scale + self.translation[2],
        ]
    }
}

/// Bookkeeping gathered in a single traversal of the parsed scene.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SceneSummary {
    pub triangle_count: u64,
    pub vertex_count: u64,
    pub bounding: Aabb,
    pub normalization: NormalizationTransform,
}

impl SceneSummary {
    pub fn bounding_size(&self) -> [f32; 3] {
        self.bounding.size()
    }
}

/// Walk the default scene once, accumulating per-primitive counts and
/// the union world-space bounding box. Triangle counts use the index
/// count divided by three for indexed primitives, else the vertex
/// count divided by three; meshes instanced by several nodes count
/// once per instance.
pub fn summarize(document: &gltf::Document) -> SceneSummary {
    let mut triangle_count = 0u64;
    let mut vertex_count = 0u64;
    let mut bounds = Aabb::empty();

    let scene = document.default_scene().or_else(|| document.scenes().next());
    let mut queue: VecDeque<(gltf::Node, Mat4)> = scene
        .map(|scene| {
            scene
                .nodes()
                .map(|node| {
                    let local = Mat4::from_cols_array_2d(&node.transform().matrix());
                    (node, local)
                })
                .collect()
        })
        .unwrap_or_default();

    while let Some((node, transform)) = queue.pop_front() {
        for child in node.children() {
            let local = Mat4::from_cols_array_2d(&child.transform().matrix());
            queue.push_back((child, transform * local));
        }

        let Some(mesh) = node.mesh() else { continue };
        for primitive in mesh.primitives() {
            let positions = primitive.get(&gltf::Semantic::Positions);
            let vertices = positions.as_ref().map(|a| a.count() as u64).unwrap_or(0);
            vertex_count += vertices;
            triangle_count += match primitive.indices() {
                Some(indices) => indices.count() as u64 / 3,
                None => vertices / 3,
            };

            if let Some(accessor) = positions {
                if let (Some(min), Some(max)) =
                    (accessor_vec3(accessor.min()), accessor_vec3(accessor.max()))
                {
                    for corner in box_corners(min, max) {
                        bounds.union_point(transform.transform_point3(corner));
                    }
                }
            }
        }
    }

    let normalization = NormalizationTransform::for_bounds(&bounds);
    info!(
        "Scene summary: {} triangles, {} vertices, bounds {:?}",
        triangle_count,
        vertex_count,
        bounds.size()
    );

    SceneSummary {
        triangle_count,
        vertex_count,
        bounding: bounds,
        normalization,
    }
}

fn accessor_vec3(value: Option<gltf::json::Value>) -> Option<Vec3> {
    let value = value?;
    let array = value.as_array()?;
    if array.len() < 3 {
        return None;
    }
    let mut out = [0.0f32; 3];
    for (slot, v) in out.iter_mut().zip(array) {
        *slot = v.as_f64()? as f32;
    }
    Some(Vec3::from(out))
}

fn box_corners(min: Vec3, max: Vec3) -> [Vec3; 8] {
    [
        Vec3::new(min.x, min.y, min.z),
        Vec3::new(max.x, min.y, min.z),
        Vec3::new(min.x, max.y, min.z),
        Vec3::new(max.x, max.y, min.z),
        Vec3::new(min.x, min.y, max.z),
        Vec3::new(max.x, min.y, max.z),
        Vec3::new(min.x, max.y, max.z),
        Vec3::new(max.x, max.y, max.z),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn document_from_json(json: &str) -> gltf::Document {
        gltf::Gltf::from_slice(json.as_bytes())
            .expect("test document should parse")
            .document
    }

    /// Accessors without a buffer view are read as zeros, which keeps
    /// count-only test documents small.
    fn two_node_scene(indexed: bool) -> String {
        let (indices_field, accessors) = if indexed {
            (
                r#""indices": 1,"#,
                r#"[
                    {"componentType": 5126, "count": 24, "type": "VEC3",
                     "min": [-1.0, -2.0, -1.0], "max": [1.0, 2.0, 1.0]},
                    {"componentType": 5125, "count": 36, "type": "SCALAR"}
                ]"#,
            )
        } else {
            (
                "",
                r#"[
                    {"componentType": 5126, "count": 24, "type": "VEC3",
                     "min": [-1.0, -2.0, -1.0], "max": [1.0, 2.0, 1.0]}
                ]"#,
            )
        };
        format!(
            r#"{{
                "asset": {{"version": "2.0"}},
                "scene": 0,
                "scenes": [{{"nodes": [0, 1]}}],
                "nodes": [
                    {{"mesh": 0}},
                    {{"mesh": 0, "translation": [4.0, 0.0, 0.0]}}
                ],
                "meshes": [{{"primitives": [{{"attributes": {{"POSITION": 0}}, {indices_field} "mode": 4}}]}}],
                "accessors": {accessors}
            }}"#
        )
    }

    #[test]
    fn indexed_triangle_count_is_indices_over_three() {
        let document = document_from_json(&two_node_scene(true));
        let summary = summarize(&document);
        // Two instances of a 36-index primitive.
        assert_eq!(summary.triangle_count, 24);
        assert_eq!(summary.vertex_count, 48);
    }

    #[test]
    fn non_indexed_triangle_count_is_vertices_over_three() {
        let document = document_from_json(&two_node_scene(false));
        let summary = summarize(&document);
        assert_eq!(summary.triangle_count, 16);
    }

    #[test]
    fn bounds_take_node_transforms_into_account() {
        let document = document_from_json(&two_node_scene(true));
        let summary = summarize(&document);
        // Instance at origin spans [-1, 1]; translated instance spans [3, 5].
        assert_eq!(summary.bounding.min, [-1.0, -2.0, -1.0]);
        assert_eq!(summary.bounding.max, [5.0, 2.0, 1.0]);
    }

    #[test]
    fn normalization_maps_largest_dimension_to_reference_size() {
        let bounds = Aabb {
            min: [-1.0, -1.0, -1.0],
            max: [3.0, 1.0, 1.0],
        };
        let norm = NormalizationTransform::for_bounds(&bounds);
        assert_eq!(norm.scale, REFERENCE_SIZE / 4.0);

        // Center maps to the origin.
        assert_eq!(norm.apply(bounds.center()), [0.0, 0.0, 0.0]);

        // Largest dimension maps to exactly the reference size.
        let lo = norm.apply(bounds.min);
        let hi = norm.apply(bounds.max);
        assert_eq!(hi[0] - lo[0], REFERENCE_SIZE);
    }

    #[test]
    fn degenerate_bounds_normalize_to_identity() {
        let flat = Aabb {
            min: [2.0, 2.0, 2.0],
            max: [2.0, 2.0, 2.0],
        };
        assert_eq!(
            NormalizationTransform::for_bounds(&flat),
            NormalizationTransform::IDENTITY
        );
        assert_eq!(
            NormalizationTransform::for_bounds(&Aabb::empty()),
            NormalizationTransform::IDENTITY
        );
    }

    #[test]
    fn allocation_failures_classify_as_out_of_memory() {
        let err = classify("memory allocation of 9000000000 bytes failed".to_string());
        assert!(matches!(err, ParseError::OutOfMemory(_)));

        let err = classify("invalid JSON at line 3".to_string());
        assert!(matches!(err, ParseError::Malformed(_)));
    }

    #[test]
    fn garbage_input_is_malformed() {
        let err = parse(b"not a model").unwrap_err();
        assert!(matches!(err, ParseError::Malformed(_)));
    }
}
