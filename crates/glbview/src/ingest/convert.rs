//! Conversion from the parsed glTF document into engine-side meshes,
//! materials and textures, spawned under a single normalized root.

use std::collections::{HashMap, VecDeque};

use bevy::math::Mat4;
use bevy::prelude::*;
use bevy::render::mesh::{Indices, PrimitiveTopology, VertexAttributeValues};
use bevy::render::render_asset::RenderAssetUsages;
use bevy::render::render_resource::{Extent3d, Face, TextureDimension, TextureFormat};

use super::session::LoadedModel;
use super::LoadedSceneData;

/// Spawn the parsed scene: one root entity carrying the normalization
/// transform, with a flattened child entity per drawable primitive
/// instance. Returns the handles the session will own.
pub fn spawn_model(
    commands: &mut Commands,
    data: &LoadedSceneData,
    meshes: &mut Assets<Mesh>,
    materials: &mut Assets<StandardMaterial>,
    images: &mut Assets<Image>,
) -> LoadedModel {
    // Textures referenced by base-color slots, converted on demand.
    let mut image_handles: HashMap<usize, Handle<Image>> = HashMap::new();
    let mut texture_handles: Vec<Handle<Image>> = Vec::new();

    // Materials map 1:1 onto the document's materials.
    let mut material_handles: Vec<Handle<StandardMaterial>> = Vec::new();
    for material in data.document.materials() {
        let pbr = material.pbr_metallic_roughness();
        let base = pbr.base_color_factor();

        let base_color_texture = pbr.base_color_texture().and_then(|info| {
            let index = info.texture().source().index();
            if let Some(handle) = image_handles.get(&index) {
                return Some(handle.clone());
            }
            let image = data.images.get(index).and_then(convert_image)?;
            let handle = images.add(image);
            texture_handles.push(handle.clone());
            image_handles.insert(index, handle.clone());
            Some(handle)
        });

        material_handles.push(materials.add(StandardMaterial {
            base_color: Color::srgba(base[0], base[1], base[2], base[3]),
            base_color_texture,
            metallic: pbr.metallic_factor(),
            perceptual_roughness: pbr.roughness_factor(),
            double_sided: material.double_sided(),
            cull_mode: if material.double_sided() {
                None
            } else {
                Some(Face::Back)
            },
            ..default()
        }));
    }

    // Default material for primitives without one.
    let fallback_material = materials.add(StandardMaterial {
        base_color: Color::srgb(0.8, 0.8, 0.8),
        perceptual_roughness: 0.4,
        metallic: 0.1,
        ..default()
    });

    // Meshes: one handle per primitive, keyed by document mesh index.
    let mut mesh_handles: Vec<Handle<Mesh>> = Vec::new();
    let mut mesh_primitives: Vec<Vec<(Handle<Mesh>, Option<usize>)>> = Vec::new();
    for mesh in data.document.meshes() {
        let mut primitives = Vec::new();
        for primitive in mesh.primitives() {
            match convert_primitive(&primitive, &data.buffers) {
                Ok(converted) => {
                    let handle = meshes.add(converted);
                    mesh_handles.push(handle.clone());
                    primitives.push((handle, primitive.material().index()));
                }
                Err(err) => {
                    warn!(
                        "Skipping primitive {} of mesh {}: {}",
                        primitive.index(),
                        mesh.index(),
                        err
                    );
                }
            }
        }
        mesh_primitives.push(primitives);
    }

    // Root entity carries the normalization transform so the whole
    // scene lands centered at the origin at the reference size.
    let norm = data.summary.normalization;
    let root = commands
        .spawn((
            Transform {
                translation: Vec3::from_array(norm.translation),
                scale: Vec3::splat(norm.scale),
                ..default()
            },
            Visibility::default(),
            Name::new(data.origin_label.clone()),
        ))
        .id();

    // Breadth-first walk of the default scene with accumulated world
    // transforms; one child entity per primitive instance.
    let scene = data
        .document
        .default_scene()
        .or_else(|| data.document.scenes().next());
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

    let mut instances = 0usize;
    while let Some((node, transform)) = queue.pop_front() {
        for child in node.children() {
            let local = Mat4::from_cols_array_2d(&child.transform().matrix());
            queue.push_back((child, transform * local));
        }

        let Some(mesh) = node.mesh() else { continue };
        for (handle, material_index) in &mesh_primitives[mesh.index()] {
            let material = (*material_index)
                .and_then(|index| material_handles.get(index))
                .unwrap_or(&fallback_material)
                .clone();
            commands.spawn((
                Mesh3d(handle.clone()),
                MeshMaterial3d(material),
                Transform::from_matrix(transform),
                ChildOf(root),
            ));
            instances += 1;
        }
    }

    info!(
        "Spawned {} primitive instances from {} meshes, {} materials, {} textures",
        instances,
        mesh_primitives.len(),
        material_handles.len(),
        texture_handles.len()
    );

    material_handles.push(fallback_material);

    LoadedModel {
        root,
        meshes: mesh_handles,
        materials: material_handles,
        textures: texture_handles,
        summary: data.summary,
        file_size_mb: data.file_size_mb,
        origin: data.origin_label.clone(),
    }
}

/// Build an engine mesh from one glTF primitive. Missing normals are
/// computed so unlit exports still shade correctly.
fn convert_primitive(
    primitive: &gltf::Primitive,
    buffers: &[gltf::buffer::Data],
) -> Result<Mesh, String> {
    let reader = primitive.reader(|buffer| buffers.get(buffer.index()).map(|data| data.0.as_slice()));

    let positions: Vec<[f32; 3]> = reader
        .read_positions()
        .ok_or_else(|| "no position data".to_string())?
        .collect();

    let mut mesh = Mesh::new(
        PrimitiveTopology::TriangleList,
        RenderAssetUsages::RENDER_WORLD | RenderAssetUsages::MAIN_WORLD,
    );
    mesh.insert_attribute(
        Mesh::ATTRIBUTE_POSITION,
        VertexAttributeValues::Float32x3(positions),
    );

    let mut has_normals = false;
    if let Some(normals) = reader.read_normals() {
        mesh.insert_attribute(
            Mesh::ATTRIBUTE_NORMAL,
            VertexAttributeValues::Float32x3(normals.collect()),
        );
        has_normals = true;
    }

    if let Some(tex_coords) = reader.read_tex_coords(0) {
        mesh.insert_attribute(
            Mesh::ATTRIBUTE_UV_0,
            VertexAttributeValues::Float32x2(tex_coords.into_f32().collect()),
        );
    }

    let indexed = if let Some(indices) = reader.read_indices() {
        mesh.insert_indices(Indices::U32(indices.into_u32().collect()));
        true
    } else {
        false
    };

    if !has_normals {
        if indexed {
            mesh.compute_smooth_normals();
        } else {
            mesh.compute_flat_normals();
        }
    }

    Ok(mesh)
}

/// Expand a decoded glTF image to RGBA8 and wrap it as an engine
/// texture. Formats outside the 8-bit family are skipped.
fn convert_image(data: &gltf::image::Data) -> Option<Image> {
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
        Format::R8G8 => {
            let mut out = Vec::with_capacity(pixel_count * 4);
            for rg in data.pixels.chunks_exact(2) {
                out.extend_from_slice(&[rg[0], rg[1], 0, 255]);
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
        other => {
            warn!("Unsupported texture format {:?}, skipping", other);
            return None;
        }
    };

    Some(Image::new(
        Extent3d {
            width: data.width,
            height: data.height,
            depth_or_array_layers: 1,
        },
        TextureDimension::D2,
        pixels,
        TextureFormat::Rgba8UnormSrgb,
        RenderAssetUsages::RENDER_WORLD | RenderAssetUsages::MAIN_WORLD,
    ))
}
