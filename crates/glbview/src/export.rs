//! Binary glTF export.
//!
//! Rebuilds a glTF JSON document plus one binary buffer from processed
//! mesh, material, texture and node data, and assembles the final GLB
//! container (header, padded JSON chunk, padded BIN chunk).

use std::collections::BTreeMap;

use gltf::json as gj;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExportError {
    #[error("failed to serialize document: {0}")]
    Json(String),
}

/// One primitive after processing: tightly packed attribute arrays and
/// a u32 index buffer.
pub struct ExportPrimitive {
    pub positions: Vec<[f32; 3]>,
    pub normals: Option<Vec<[f32; 3]>>,
    pub uvs: Option<Vec<[f32; 2]>>,
    pub indices: Vec<u32>,
    pub material: Option<usize>,
}

pub struct ExportMesh {
    pub name: Option<String>,
    pub primitives: Vec<ExportPrimitive>,
}

pub struct ExportMaterial {
    pub name: Option<String>,
    pub base_color: [f32; 4],
    pub metallic: f32,
    pub roughness: f32,
    pub double_sided: bool,
    /// Index into [`ExportDocument::images`].
    pub base_color_image: Option<usize>,
}

/// A re-encoded PNG destined for the binary buffer.
pub struct ExportImage {
    pub png: Vec<u8>,
}

pub struct ExportNode {
    pub name: Option<String>,
    /// Column-major local transform; `None` for identity.
    pub matrix: Option<[f32; 16]>,
    pub mesh: Option<usize>,
    pub children: Vec<usize>,
}

pub struct ExportDocument {
    pub meshes: Vec<ExportMesh>,
    pub materials: Vec<ExportMaterial>,
    pub images: Vec<ExportImage>,
    pub nodes: Vec<ExportNode>,
    /// Root node indices of the default scene.
    pub roots: Vec<usize>,
}

/// Serialize the document as a binary glTF container.
pub fn write_glb(doc: &ExportDocument) -> Result<Vec<u8>, ExportError> {
    let mut root = gj::Root::default();
    root.asset = gj::Asset {
        generator: Some("glbview compressor".to_string()),
        version: "2.0".to_string(),
        ..Default::default()
    };
    let mut bin = Vec::new();

    // Images first: one buffer view, image and texture per PNG.
    for (index, image) in doc.images.iter().enumerate() {
        let view = push_buffer_view(&mut root, &mut bin, &image.png, None);
        root.images.push(gj::Image {
            buffer_view: Some(gj::Index::new(view)),
            mime_type: Some(gj::image::MimeType("image/png".to_string())),
            name: None,
            uri: None,
            extensions: None,
            extras: gj::Extras::default(),
        });
        root.textures.push(gj::Texture {
            name: None,
            sampler: None,
            source: gj::Index::new(index as u32),
            extensions: None,
            extras: gj::Extras::default(),
        });
    }

    for material in &doc.materials {
        let base_color_texture = material.base_color_image.map(|image| gj::texture::Info {
            index: gj::Index::new(image as u32),
            tex_coord: 0,
            extensions: None,
            extras: gj::Extras::default(),
        });
        root.materials.push(gj::Material {
            name: material.name.clone(),
            pbr_metallic_roughness: gj::material::PbrMetallicRoughness {
                base_color_factor: gj::material::PbrBaseColorFactor(material.base_color),
                base_color_texture,
                metallic_factor: gj::material::StrengthFactor(material.metallic),
                roughness_factor: gj::material::StrengthFactor(material.roughness),
                ..Default::default()
            },
            double_sided: material.double_sided,
            ..Default::default()
        });
    }

    for mesh in &doc.meshes {
        let mut primitives = Vec::with_capacity(mesh.primitives.len());
        for primitive in &mesh.primitives {
            primitives.push(build_primitive(&mut root, &mut bin, primitive));
        }
        root.meshes.push(gj::Mesh {
            name: mesh.name.clone(),
            primitives,
            weights: None,
            extensions: None,
            extras: gj::Extras::default(),
        });
    }

    for node in &doc.nodes {
        root.nodes.push(gj::Node {
            name: node.name.clone(),
            matrix: node.matrix,
            mesh: node.mesh.map(|index| gj::Index::new(index as u32)),
            children: if node.children.is_empty() {
                None
            } else {
                Some(
                    node.children
                        .iter()
                        .map(|&child| gj::Index::new(child as u32))
                        .collect(),
                )
            },
            ..Default::default()
        });
    }

    root.scenes.push(gj::Scene {
        name: None,
        nodes: doc
            .roots
            .iter()
            .map(|&index| gj::Index::new(index as u32))
            .collect(),
        extensions: None,
        extras: gj::Extras::default(),
    });
    root.scene = Some(gj::Index::new(0));

    if !bin.is_empty() {
        // Final alignment so the BIN chunk length is exact.
        align(&mut bin);
        root.buffers.push(gj::Buffer {
            byte_length: gj::validation::USize64(bin.len() as u64),
            name: None,
            uri: None,
            extensions: None,
            extras: gj::Extras::default(),
        });
    }

    let json = gj::serialize::to_string(&root).map_err(|e| ExportError::Json(e.to_string()))?;
    Ok(assemble_glb(json.as_bytes(), &bin))
}

fn build_primitive(
    root: &mut gj::Root,
    bin: &mut Vec<u8>,
    primitive: &ExportPrimitive,
) -> gj::mesh::Primitive {
    let mut attributes = BTreeMap::new();

    let (min, max) = position_bounds(&primitive.positions);
    let positions_accessor = push_vec_accessor(
        root,
        bin,
        vec3_bytes(&primitive.positions),
        primitive.positions.len(),
        gj::accessor::Type::Vec3,
        Some(min),
        Some(max),
    );
    attributes.insert(
        gj::validation::Checked::Valid(gj::mesh::Semantic::Positions),
        gj::Index::new(positions_accessor),
    );

    if let Some(normals) = &primitive.normals {
        let accessor = push_vec_accessor(
            root,
            bin,
            vec3_bytes(normals),
            normals.len(),
            gj::accessor::Type::Vec3,
            None,
            None,
        );
        attributes.insert(
            gj::validation::Checked::Valid(gj::mesh::Semantic::Normals),
            gj::Index::new(accessor),
        );
    }

    if let Some(uvs) = &primitive.uvs {
        let accessor = push_vec_accessor(
            root,
            bin,
            uvs.iter()
                .flat_map(|uv| uv.iter().flat_map(|v| v.to_le_bytes()))
                .collect(),
            uvs.len(),
            gj::accessor::Type::Vec2,
            None,
            None,
        );
        attributes.insert(
            gj::validation::Checked::Valid(gj::mesh::Semantic::TexCoords(0)),
            gj::Index::new(accessor),
        );
    }

    let index_bytes: Vec<u8> = primitive
        .indices
        .iter()
        .flat_map(|i| i.to_le_bytes())
        .collect();
    let index_view = push_buffer_view(
        root,
        bin,
        &index_bytes,
        Some(gj::buffer::Target::ElementArrayBuffer),
    );
    let index_accessor = push_accessor(
        root,
        index_view,
        primitive.indices.len(),
        gj::accessor::ComponentType::U32,
        gj::accessor::Type::Scalar,
        None,
        None,
    );

    gj::mesh::Primitive {
        attributes,
        extensions: None,
        extras: gj::Extras::default(),
        indices: Some(gj::Index::new(index_accessor)),
        material: primitive
            .material
            .map(|index| gj::Index::new(index as u32)),
        mode: gj::validation::Checked::Valid(gj::mesh::Mode::Triangles),
        targets: None,
    }
}

fn push_vec_accessor(
    root: &mut gj::Root,
    bin: &mut Vec<u8>,
    bytes: Vec<u8>,
    count: usize,
    type_: gj::accessor::Type,
    min: Option<gj::Value>,
    max: Option<gj::Value>,
) -> u32 {
    let view = push_buffer_view(root, bin, &bytes, Some(gj::buffer::Target::ArrayBuffer));
    push_accessor(
        root,
        view,
        count,
        gj::accessor::ComponentType::F32,
        type_,
        min,
        max,
    )
}

fn push_buffer_view(
    root: &mut gj::Root,
    bin: &mut Vec<u8>,
    data: &[u8],
    target: Option<gj::buffer::Target>,
) -> u32 {
    align(bin);
    let offset = bin.len();
    bin.extend_from_slice(data);

    let view = root.buffer_views.len() as u32;
    root.buffer_views.push(gj::buffer::View {
        buffer: gj::Index::new(0),
        byte_offset: Some(gj::validation::USize64(offset as u64)),
        byte_length: gj::validation::USize64(data.len() as u64),
        byte_stride: None,
        target: target.map(gj::validation::Checked::Valid),
        name: None,
        extensions: None,
        extras: gj::Extras::default(),
    });
    view
}

fn push_accessor(
    root: &mut gj::Root,
    buffer_view: u32,
    count: usize,
    component_type: gj::accessor::ComponentType,
    type_: gj::accessor::Type,
    min: Option<gj::Value>,
    max: Option<gj::Value>,
) -> u32 {
    let accessor = root.accessors.len() as u32;
    root.accessors.push(gj::Accessor {
        buffer_view: Some(gj::Index::new(buffer_view)),
        byte_offset: Some(gj::validation::USize64(0)),
        count: gj::validation::USize64(count as u64),
        component_type: gj::validation::Checked::Valid(gj::accessor::GenericComponentType(
            component_type,
        )),
        type_: gj::validation::Checked::Valid(type_),
        min,
        max,
        normalized: false,
        name: None,
        sparse: None,
        extensions: None,
        extras: gj::Extras::default(),
    });
    accessor
}

fn vec3_bytes(values: &[[f32; 3]]) -> Vec<u8> {
    values
        .iter()
        .flat_map(|v| v.iter().flat_map(|c| c.to_le_bytes()))
        .collect()
}

fn position_bounds(positions: &[[f32; 3]]) -> (gj::Value, gj::Value) {
    let mut min = [f32::INFINITY; 3];
    let mut max = [f32::NEG_INFINITY; 3];
    for p in positions {
        for i in 0..3 {
            min[i] = min[i].min(p[i]);
            max[i] = max[i].max(p[i]);
        }
    }
    if positions.is_empty() {
        min = [0.0; 3];
        max = [0.0; 3];
    }
    (json_f32_array(&min), json_f32_array(&max))
}

fn json_f32_array(values: &[f32; 3]) -> gj::Value {
    gj::Value::Array(
        values
            .iter()
            .map(|&v| gj::Value::from(f64::from(v)))
            .collect(),
    )
}

fn align(bin: &mut Vec<u8>) {
    let padding = (4 - bin.len() % 4) % 4;
    bin.extend(std::iter::repeat(0u8).take(padding));
}

/// Assemble the GLB container: 12-byte header, space-padded JSON
/// chunk, zero-padded BIN chunk (omitted when there is no buffer).
fn assemble_glb(json: &[u8], bin: &[u8]) -> Vec<u8> {
    let json_padding = (4 - json.len() % 4) % 4;
    let json_chunk = json.len() + json_padding;
    let has_bin = !bin.is_empty();
    let bin_padding = (4 - bin.len() % 4) % 4;
    let bin_chunk = bin.len() + bin_padding;
    let total = 12 + 8 + json_chunk + if has_bin { 8 + bin_chunk } else { 0 };

    let mut glb = Vec::with_capacity(total);
    glb.extend_from_slice(b"glTF");
    glb.extend_from_slice(&2u32.to_le_bytes());
    glb.extend_from_slice(&(total as u32).to_le_bytes());

    glb.extend_from_slice(&(json_chunk as u32).to_le_bytes());
    glb.extend_from_slice(&0x4E4F_534Au32.to_le_bytes());
    glb.extend_from_slice(json);
    glb.extend(std::iter::repeat(b' ').take(json_padding));

    if has_bin {
        glb.extend_from_slice(&(bin_chunk as u32).to_le_bytes());
        glb.extend_from_slice(&0x004E_4942u32.to_le_bytes());
        glb.extend_from_slice(bin);
        glb.extend(std::iter::repeat(0u8).take(bin_padding));
    }
    glb
}

#[cfg(test)]
mod tests {
    use super::*;

    fn triangle_doc() -> ExportDocument {
        ExportDocument {
            meshes: vec![ExportMesh {
                name: Some("tri".to_string()),
                primitives: vec![ExportPrimitive {
                    positions: vec![[0.0, 0.0, 0.0], [2.0, 0.0, 0.0], [0.0, 1.0, 0.0]],
                    normals: Some(vec![[0.0, 0.0, 1.0]; 3]),
                    uvs: None,
                    indices: vec![0, 1, 2],
                    material: Some(0),
                }],
            }],
            materials: vec![ExportMaterial {
                name: None,
                base_color: [0.8, 0.2, 0.2, 1.0],
                metallic: 0.1,
                roughness: 0.7,
                double_sided: false,
                base_color_image: None,
            }],
            images: Vec::new(),
            nodes: vec![ExportNode {
                name: None,
                matrix: None,
                mesh: Some(0),
                children: Vec::new(),
            }],
            roots: vec![0],
        }
    }

    #[test]
    fn exported_glb_reparses() {
        let glb = write_glb(&triangle_doc()).unwrap();
        let (document, buffers, _images) = gltf::import_slice(&glb).expect("reimport");
        assert_eq!(buffers.len(), 1);
        assert_eq!(document.meshes().count(), 1);

        let mesh = document.meshes().next().unwrap();
        let primitive = mesh.primitives().next().unwrap();
        let reader = primitive.reader(|buffer| buffers.get(buffer.index()).map(|d| d.0.as_slice()));

        let positions: Vec<[f32; 3]> = reader.read_positions().unwrap().collect();
        assert_eq!(
            positions,
            vec![[0.0, 0.0, 0.0], [2.0, 0.0, 0.0], [0.0, 1.0, 0.0]]
        );
        let indices: Vec<u32> = reader.read_indices().unwrap().into_u32().collect();
        assert_eq!(indices, vec![0, 1, 2]);
        assert!(reader.read_normals().is_some());
        assert!(reader.read_tex_coords(0).is_none());

        let material = document.materials().next().unwrap();
        assert!(!material.double_sided());
    }

    #[test]
    fn container_layout_is_aligned() {
        let glb = write_glb(&triangle_doc()).unwrap();
        assert_eq!(&glb[0..4], b"glTF");
        let declared = u32::from_le_bytes([glb[8], glb[9], glb[10], glb[11]]);
        assert_eq!(declared as usize, glb.len());
        assert_eq!(glb.len() % 4, 0);
    }
}
