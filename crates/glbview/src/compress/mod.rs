//! GLB compression pipeline.
//!
//! Load → strip attributes if requested → merge duplicate vertices →
//! re-index and re-order via meshoptimizer → optional simplification →
//! optional texture downscale → re-export as binary glTF. Used by the
//! `glb-compress` tool.

use std::collections::{HashMap, HashSet};
use std::io::Cursor;
use std::path::Path;

use bytemuck::{Pod, Zeroable};
use log::{info, warn};
use thiserror::Error;

use crate::export::{
    self, ExportDocument, ExportImage, ExportMaterial, ExportMesh, ExportNode, ExportPrimitive,
};

#[derive(Debug, Clone)]
pub struct CompressOptions {
    /// Target fraction of the original index count, in `(0, 1]`.
    /// 1.0 keeps every triangle.
    pub simplify_ratio: f32,
    /// Uniform scale applied to texture dimensions, in `(0, 1]`.
    pub texture_scale: f32,
    pub remove_normals: bool,
    pub remove_uvs: bool,
}

impl Default for CompressOptions {
    fn default() -> Self {
        Self {
            simplify_ratio: 1.0,
            texture_scale: 1.0,
            remove_normals: false,
            remove_uvs: false,
        }
    }
}

impl CompressOptions {
    pub fn validate(&self) -> Result<(), CompressError> {
        if !(self.simplify_ratio > 0.0 && self.simplify_ratio <= 1.0) {
            return Err(CompressError::InvalidOption(format!(
                "simplify ratio {} outside (0, 1]",
                self.simplify_ratio
            )));
        }
        if !(self.texture_scale > 0.0 && self.texture_scale <= 1.0) {
            return Err(CompressError::InvalidOption(format!(
                "texture scale {} outside (0, 1]",
                self.texture_scale
            )));
        }
        Ok(())
    }
}

#[derive(Error, Debug)]
pub enum CompressError {
    #[error("invalid option: {0}")]
    InvalidOption(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse input model: {0}")]
    Parse(String),

    #[error("mesh optimization failed: {0}")]
    Optimize(String),

    #[error("failed to encode output: {0}")]
    Encode(#[from] export::ExportError),

    #[error("failed to encode texture: {0}")]
    Texture(String),
}

/// Before/after statistics for one compression run.
#[derive(Debug, Clone, Default)]
pub struct CompressStats {
    pub input_bytes: u64,
    pub output_bytes: u64,
    pub input_vertices: usize,
    pub output_vertices: usize,
    pub input_triangles: usize,
    pub output_triangles: usize,
    pub textures_resized: usize,
}

impl CompressStats {
    pub fn size_reduction_percent(&self) -> f64 {
        if self.input_bytes == 0 {
            return 0.0;
        }
        (1.0 - self.output_bytes as f64 / self.input_bytes as f64) * 100.0
    }

    pub fn vertex_reduction_percent(&self) -> f64 {
        if self.input_vertices == 0 {
            return 0.0;
        }
        (1.0 - self.output_vertices as f64 / self.input_vertices as f64) * 100.0
    }
}

/// Interleaved working vertex. Stripped attributes stay zeroed and are
/// simply not emitted on export.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
struct PackedVertex {
    position: [f32; 3],
    normal: [f32; 3],
    uv: [f32; 2],
}

struct PrimitiveData {
    vertices: Vec<PackedVertex>,
    indices: Vec<u32>,
    has_normals: bool,
    has_uvs: bool,
    material: Option<usize>,
}

/// Compress a GLB held in memory. Returns the new container and the
/// run statistics.
pub fn compress_slice(
    input: &[u8],
    options: &CompressOptions,
) -> Result<(Vec<u8>, CompressStats), CompressError> {
    options.validate()?;

    let (document, buffers, images) =
        gltf::import_slice(input).map_err(|e| CompressError::Parse(e.to_string()))?;

    let mut stats = CompressStats {
        input_bytes: input.len() as u64,
        ..Default::default()
    };

    // Mesh pass: strip, merge, re-index, simplify.
    let mut export_meshes = Vec::new();
    for mesh in document.meshes() {
        let mut primitives = Vec::new();
        for primitive in mesh.primitives() {
            let Some(mut data) = extract_primitive(&primitive, &buffers, options) else {
                continue;
            };
            stats.input_vertices += data.vertices.len();
            stats.input_triangles += data.indices.len() / 3;

            merge_vertices(&mut data);
            optimize_primitive(&mut data, options)?;

            stats.output_vertices += data.vertices.len();
            stats.output_triangles += data.indices.len() / 3;
            primitives.push(into_export_primitive(data));
        }
        export_meshes.push(ExportMesh {
            name: mesh.name().map(str::to_string),
            primitives,
        });
    }

    info!(
        "Vertices: {} -> {} ({:.1}%)",
        stats.input_vertices,
        stats.output_vertices,
        100.0 - stats.vertex_reduction_percent()
    );
    info!(
        "Faces: {} -> {}",
        stats.input_triangles, stats.output_triangles
    );

    // Texture pass: re-encode base-color images, downscaled when asked.
    let mut referenced: Vec<usize> = document
        .materials()
        .filter_map(|material| {
            material
                .pbr_metallic_roughness()
                .base_color_texture()
                .map(|info| info.texture().source().index())
        })
        .collect::<HashSet<usize>>()
        .into_iter()
        .collect();
    referenced.sort_unstable();

    let mut export_images = Vec::new();
    let mut image_slots: HashMap<usize, usize> = HashMap::new();
    for index in referenced {
        let Some(data) = images.get(index) else {
            continue;
        };
        match process_image(data, options.texture_scale)? {
            Some(processed) => {
                if processed.resized {
                    stats.textures_resized += 1;
                }
                image_slots.insert(index, export_images.len());
                export_images.push(ExportImage { png: processed.png });
            }
            None => warn!("Dropping texture {index} with unsupported format"),
        }
    }

    let export_materials = document
        .materials()
        .map(|material| {
            let pbr = material.pbr_metallic_roughness();
            let base_color_image = pbr
                .base_color_texture()
                .and_then(|info| image_slots.get(&info.texture().source().index()))
                .copied();
            ExportMaterial {
                name: material.name().map(str::to_string),
                base_color: pbr.base_color_factor(),
                metallic: pbr.metallic_factor(),
                roughness: pbr.roughness_factor(),
                double_sided: material.double_sided(),
                base_color_image,
            }
        })
        .collect();

    // Node pass: hierarchy and transforms carry over unchanged.
    let export_nodes = document
        .nodes()
        .map(|node| {
            let matrix = flatten_matrix(node.transform().matrix());
            ExportNode {
                name: node.name().map(str::to_string),
                matrix,
                mesh: node.mesh().map(|mesh| mesh.index()),
                children: node.children().map(|child| child.index()).collect(),
            }
        })
        .collect();

    let roots = match document.default_scene().or_else(|| document.scenes().next()) {
        Some(scene) => scene.nodes().map(|node| node.index()).collect(),
        None => root_nodes(&document),
    };

    let output = export::write_glb(&ExportDocument {
        meshes: export_meshes,
        materials: export_materials,
        images: export_images,
        nodes: export_nodes,
        roots,
    })?;

    stats.output_bytes = output.len() as u64;
    info!(
        "Compressed {} -> {} bytes ({:.1}% reduction)",
        stats.input_bytes,
        stats.output_bytes,
        stats.size_reduction_percent()
    );
    Ok((output, stats))
}

/// Compress a GLB file on disk.
pub fn compress_file(
    input: &Path,
    output: &Path,
    options: &CompressOptions,
) -> Result<CompressStats, CompressError> {
    let bytes = std::fs::read(input)?;
    let (compressed, stats) = compress_slice(&bytes, options)?;
    std::fs::write(output, &compressed)?;
    Ok(stats)
}

fn extract_primitive(
    primitive: &gltf::Primitive,
    buffers: &[gltf::buffer::Data],
    options: &CompressOptions,
) -> Option<PrimitiveData> {
    let reader = primitive.reader(|buffer| buffers.get(buffer.index()).map(|d| d.0.as_slice()));

    let Some(positions) = reader.read_positions() else {
        warn!("Skipping primitive {} without positions", primitive.index());
        return None;
    };
    let positions: Vec<[f32; 3]> = positions.collect();

    let normals: Option<Vec<[f32; 3]>> = if options.remove_normals {
        None
    } else {
        reader.read_normals().map(|iter| iter.collect())
    };
    let uvs: Option<Vec<[f32; 2]>> = if options.remove_uvs {
        None
    } else {
        reader.read_tex_coords(0).map(|iter| iter.into_f32().collect())
    };

    let indices: Vec<u32> = reader
        .read_indices()
        .map(|iter| iter.into_u32().collect())
        .unwrap_or_else(|| (0..positions.len() as u32).collect());

    let vertices = positions
        .iter()
        .enumerate()
        .map(|(i, position)| PackedVertex {
            position: *position,
            normal: normals
                .as_ref()
                .and_then(|n| n.get(i))
                .copied()
                .unwrap_or_default(),
            uv: uvs
                .as_ref()
                .and_then(|u| u.get(i))
                .copied()
                .unwrap_or_default(),
        })
        .collect();

    Some(PrimitiveData {
        vertices,
        indices,
        has_normals: normals.is_some(),
        has_uvs: uvs.is_some(),
        material: primitive.material().index(),
    })
}

/// Merge bit-identical vertices and remap the index buffer. Stripping
/// attributes first makes more vertices coincide, so this runs after
/// the strip step.
fn merge_vertices(data: &mut PrimitiveData) {
    let mut seen: HashMap<[u32; 8], u32> = HashMap::with_capacity(data.vertices.len());
    let mut unique: Vec<PackedVertex> = Vec::new();
    let mut remap: Vec<u32> = Vec::with_capacity(data.vertices.len());

    for vertex in &data.vertices {
        let bits: [u32; 8] = bytemuck::cast(*vertex);
        let index = *seen.entry(bits).or_insert_with(|| {
            unique.push(*vertex);
            (unique.len() - 1) as u32
        });
        remap.push(index);
    }

    for index in &mut data.indices {
        *index = remap[*index as usize];
    }
    data.vertices = unique;
}

/// meshoptimizer passes: vertex cache, overdraw, optional
/// simplification, vertex fetch.
fn optimize_primitive(
    data: &mut PrimitiveData,
    options: &CompressOptions,
) -> Result<(), CompressError> {
    let vertex_count = data.vertices.len();
    if vertex_count == 0 || data.indices.is_empty() {
        return Ok(());
    }

    meshopt::optimize_vertex_cache_in_place(&mut data.indices, vertex_count);

    let vertex_bytes: &[u8] = bytemuck::cast_slice(&data.vertices);
    let adapter = meshopt::VertexDataAdapter::new(
        vertex_bytes,
        std::mem::size_of::<PackedVertex>(),
        0,
    )
    .map_err(|e| CompressError::Optimize(e.to_string()))?;

    // Allow up to 5% worse cache efficiency for better overdraw.
    meshopt::optimize_overdraw_in_place(&mut data.indices, &adapter, 1.05);

    if options.simplify_ratio < 1.0 {
        let target = ((data.indices.len() as f32 * options.simplify_ratio) as usize / 3) * 3;
        let simplified = meshopt::simplify(
            &data.indices,
            &adapter,
            target.max(3),
            1e-2,
            meshopt::SimplifyOptions::empty(),
            None,
        );
        info!(
            "Simplified {} -> {} indices",
            data.indices.len(),
            simplified.len()
        );
        data.indices = simplified;
    }

    data.vertices = meshopt::optimize_vertex_fetch(&mut data.indices, &data.vertices);
    Ok(())
}

fn into_export_primitive(data: PrimitiveData) -> ExportPrimitive {
    let positions = data.vertices.iter().map(|v| v.position).collect();
    let normals = data
        .has_normals
        .then(|| data.vertices.iter().map(|v| v.normal).collect());
    let uvs = data
        .has_uvs
        .then(|| data.vertices.iter().map(|v| v.uv).collect());
    ExportPrimitive {
        positions,
        normals,
        uvs,
        indices: data.indices,
        material: data.material,
    }
}

struct ProcessedImage {
    png: Vec<u8>,
    resized: bool,
}

/// Re-encode a decoded glTF image as PNG, downscaled by `scale` with a
/// triangle filter when below 1.0.
fn process_image(
    data: &gltf::image::Data,
    scale: f32,
) -> Result<Option<ProcessedImage>, CompressError> {
    let Some(rgba) = to_rgba(data) else {
        return Ok(None);
    };

    let (width, height) = (data.width, data.height);
    let (new_width, new_height) = if scale < 1.0 {
        (
            ((width as f32 * scale).floor() as u32).max(1),
            ((height as f32 * scale).floor() as u32).max(1),
        )
    } else {
        (width, height)
    };

    let resized = (new_width, new_height) != (width, height);
    let output = if resized {
        info!("Texture resized: {width}x{height} -> {new_width}x{new_height}");
        image::imageops::resize(
            &rgba,
            new_width,
            new_height,
            image::imageops::FilterType::Triangle,
        )
    } else {
        rgba
    };

    let mut png = Cursor::new(Vec::new());
    image::DynamicImage::ImageRgba8(output)
        .write_to(&mut png, image::ImageFormat::Png)
        .map_err(|e| CompressError::Texture(e.to_string()))?;

    Ok(Some(ProcessedImage {
        png: png.into_inner(),
        resized,
    }))
}

fn to_rgba(data: &gltf::image::Data) -> Option<image::RgbaImage> {
    use gltf::image::Format;

    let pixel_count = (data.width * data.height) as usize;
    let pixels = match data.format {
        Format::R8G8B8A8 => data.pixels.clone(),
        Format::R8G8B8 => {
            let mut out = Vec::with_capacity(pixel_count * 4);
            for rgb in data.pixels.chunks_exact(3) {
                out.extend_from_slice(&[rgb[0], rgb[1], rgb[2], 255]);
            }
            out
        }
        Format::R8 => {
            let mut out = Vec::with_capacity(pixel_count * 4);
            for &value in &data.pixels {
                out.extend_from_slice(&[value, value, value, 255]);
            }
            out
        }
        _ => return None,
    };
    image::RgbaImage::from_raw(data.width, data.height, pixels)
}

fn flatten_matrix(matrix: [[f32; 4]; 4]) -> Option<[f32; 16]> {
    const IDENTITY: [[f32; 4]; 4] = [
        [1.0, 0.0, 0.0, 0.0],
        [0.0, 1.0, 0.0, 0.0],
        [0.0, 0.0, 1.0, 0.0],
        [0.0, 0.0, 0.0, 1.0],
    ];
    if matrix == IDENTITY {
        return None;
    }
    let mut flat = [0.0f32; 16];
    for (column, values) in matrix.iter().enumerate() {
        flat[column * 4..column * 4 + 4].copy_from_slice(values);
    }
    Some(flat)
}

/// Nodes that no other node lists as a child.
fn root_nodes(document: &gltf::Document) -> Vec<usize> {
    let mut children = HashSet::new();
    for node in document.nodes() {
        for child in node.children() {
            children.insert(child.index());
        }
    }
    document
        .nodes()
        .map(|node| node.index())
        .filter(|index| !children.contains(index))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::export::{ExportDocument, ExportImage, ExportMaterial, ExportMesh, ExportNode};

    /// A quad as a triangle soup: 6 vertices, 4 unique.
    fn soup_quad() -> ExportPrimitive {
        let a = [0.0, 0.0, 0.0];
        let b = [1.0, 0.0, 0.0];
        let c = [1.0, 1.0, 0.0];
        let d = [0.0, 1.0, 0.0];
        ExportPrimitive {
            positions: vec![a, b, c, a, c, d],
            normals: Some(vec![[0.0, 0.0, 1.0]; 6]),
            uvs: None,
            indices: vec![0, 1, 2, 3, 4, 5],
            material: None,
        }
    }

    fn glb_with(primitive: ExportPrimitive, images: Vec<ExportImage>) -> Vec<u8> {
        let materials = if images.is_empty() {
            Vec::new()
        } else {
            vec![ExportMaterial {
                name: None,
                base_color: [1.0; 4],
                metallic: 0.0,
                roughness: 1.0,
                double_sided: false,
                base_color_image: Some(0),
            }]
        };
        let primitive = ExportPrimitive {
            material: if materials.is_empty() { None } else { Some(0) },
            ..primitive
        };
        crate::export::write_glb(&ExportDocument {
            meshes: vec![ExportMesh {
                name: None,
                primitives: vec![primitive],
            }],
            materials,
            images,
            nodes: vec![ExportNode {
                name: None,
                matrix: None,
                mesh: Some(0),
                children: Vec::new(),
            }],
            roots: vec![0],
        })
        .unwrap()
    }

    fn test_png(width: u32, height: u32) -> Vec<u8> {
        let img = image::RgbaImage::from_pixel(width, height, image::Rgba([200, 64, 64, 255]));
        let mut out = Cursor::new(Vec::new());
        image::DynamicImage::ImageRgba8(img)
            .write_to(&mut out, image::ImageFormat::Png)
            .unwrap();
        out.into_inner()
    }

    #[test]
    fn option_validation_rejects_out_of_range_values() {
        for (ratio, scale) in [(0.0, 1.0), (1.5, 1.0), (1.0, 0.0), (1.0, -1.0)] {
            let options = CompressOptions {
                simplify_ratio: ratio,
                texture_scale: scale,
                ..Default::default()
            };
            assert!(options.validate().is_err(), "ratio {ratio} scale {scale}");
        }
        assert!(CompressOptions::default().validate().is_ok());
    }

    #[test]
    fn merge_never_increases_vertex_count_and_preserves_triangles() {
        let glb = glb_with(soup_quad(), Vec::new());
        let (output, stats) = compress_slice(&glb, &CompressOptions::default()).unwrap();

        assert_eq!(stats.input_vertices, 6);
        assert_eq!(stats.output_vertices, 4);
        assert_eq!(stats.input_triangles, 2);
        assert_eq!(stats.output_triangles, 2);

        // The output re-parses with the same triangle count.
        let (document, buffers, _) = gltf::import_slice(&output).unwrap();
        let primitive = document.meshes().next().unwrap().primitives().next().unwrap();
        let reader = primitive.reader(|buffer| buffers.get(buffer.index()).map(|d| d.0.as_slice()));
        let indices: Vec<u32> = reader.read_indices().unwrap().into_u32().collect();
        assert_eq!(indices.len(), 6);
        let positions: Vec<[f32; 3]> = reader.read_positions().unwrap().collect();
        assert_eq!(positions.len(), 4);
    }

    #[test]
    fn remove_normals_strips_the_attribute_from_output() {
        let glb = glb_with(soup_quad(), Vec::new());
        let options = CompressOptions {
            remove_normals: true,
            ..Default::default()
        };
        let (output, _) = compress_slice(&glb, &options).unwrap();

        let (document, buffers, _) = gltf::import_slice(&output).unwrap();
        let primitive = document.meshes().next().unwrap().primitives().next().unwrap();
        let reader = primitive.reader(|buffer| buffers.get(buffer.index()).map(|d| d.0.as_slice()));
        assert!(reader.read_normals().is_none());
        assert!(reader.read_positions().is_some());
    }

    #[test]
    fn texture_scale_halves_dimensions() {
        let mut primitive = soup_quad();
        primitive.uvs = Some(vec![[0.0, 0.0]; 6]);
        let glb = glb_with(primitive, vec![ExportImage { png: test_png(8, 8) }]);

        let options = CompressOptions {
            texture_scale: 0.5,
            ..Default::default()
        };
        let (output, stats) = compress_slice(&glb, &options).unwrap();
        assert_eq!(stats.textures_resized, 1);

        let (_document, _buffers, images) = gltf::import_slice(&output).unwrap();
        assert_eq!(images.len(), 1);
        assert_eq!(images[0].width, 4);
        assert_eq!(images[0].height, 4);
    }

    #[test]
    fn stats_percentages() {
        let stats = CompressStats {
            input_bytes: 1000,
            output_bytes: 250,
            input_vertices: 1000,
            output_vertices: 400,
            ..Default::default()
        };
        assert!((stats.size_reduction_percent() - 75.0).abs() < 0.01);
        assert!((stats.vertex_reduction_percent() - 60.0).abs() < 0.01);
    }
}
