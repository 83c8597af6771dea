//! The model ingest session: explicit owner of the currently displayed
//! model and every GPU-side handle backing it.
//!
//! Replacing a model always releases the old model's meshes, materials
//! and textures before the new scene is installed, which bounds peak
//! memory when swapping between large files. Acquire/release counts
//! are tracked so the discipline is observable.

use bevy::prelude::*;
use uuid::Uuid;

use glbview_ingest::SceneSummary;

/// A fully installed model: its entity tree plus the asset handles it
/// owns.
pub struct LoadedModel {
    pub root: Entity,
    pub meshes: Vec<Handle<Mesh>>,
    pub materials: Vec<Handle<StandardMaterial>>,
    pub textures: Vec<Handle<Image>>,
    pub summary: SceneSummary,
    pub file_size_mb: f64,
    pub origin: String,
}

/// Resource owning the single "currently displayed model" slot. Only
/// the ingest apply system mutates it, and only after the prior
/// model's resources are fully released.
#[derive(Resource)]
pub struct ModelIngestSession {
    pub id: Uuid,
    pub created_at: chrono::DateTime<chrono::Local>,
    current: Option<LoadedModel>,
    resources_acquired: usize,
    resources_released: usize,
}

impl Default for ModelIngestSession {
    fn default() -> Self {
        Self {
            id: Uuid::new_v4(),
            created_at: chrono::Local::now(),
            current: None,
            resources_acquired: 0,
            resources_released: 0,
        }
    }
}

impl ModelIngestSession {
    pub fn current(&self) -> Option<&LoadedModel> {
        self.current.as_ref()
    }

    /// Install a freshly spawned model. The previous model must have
    /// been disposed first.
    pub fn install(&mut self, model: LoadedModel) {
        debug_assert!(self.current.is_none(), "previous model was not disposed");
        self.resources_acquired +=
            model.meshes.len() + model.materials.len() + model.textures.len();
        info!(
            "Installed '{}': {} triangles, {:.2} MB",
            model.origin, model.summary.triangle_count, model.file_size_mb
        );
        self.current = Some(model);
    }

    /// Remove every GPU-side asset of the current model from the asset
    /// stores. Returns the root entity (still to be despawned) and the
    /// number of resources released.
    pub fn release_assets(
        &mut self,
        meshes: &mut Assets<Mesh>,
        materials: &mut Assets<StandardMaterial>,
        images: &mut Assets<Image>,
    ) -> (Option<Entity>, usize) {
        let Some(model) = self.current.take() else {
            return (None, 0);
        };

        let mut released = 0;
        for handle in &model.meshes {
            if meshes.remove(handle).is_some() {
                released += 1;
            }
        }
        for handle in &model.materials {
            if materials.remove(handle).is_some() {
                released += 1;
            }
        }
        for handle in &model.textures {
            if images.remove(handle).is_some() {
                released += 1;
            }
        }
        self.resources_released += released;
        info!(
            "Released {} GPU-side resources from '{}'",
            released, model.origin
        );
        (Some(model.root), released)
    }

    /// Dispose the current model: release its assets, then despawn its
    /// entity tree. Must complete before a replacement is installed.
    pub fn dispose_current(
        &mut self,
        commands: &mut Commands,
        meshes: &mut Assets<Mesh>,
        materials: &mut Assets<StandardMaterial>,
        images: &mut Assets<Image>,
    ) -> usize {
        let (root, released) = self.release_assets(meshes, materials, images);
        if let Some(root) = root {
            commands.entity(root).despawn();
        }
        released
    }

    /// Lifetime totals of (acquired, released) GPU-side resources.
    pub fn resource_counts(&self) -> (usize, usize) {
        (self.resources_acquired, self.resources_released)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bevy::render::mesh::PrimitiveTopology;
    use bevy::render::render_asset::RenderAssetUsages;
    use glbview_ingest::{Aabb, NormalizationTransform};

    fn empty_summary() -> SceneSummary {
        SceneSummary {
            triangle_count: 0,
            vertex_count: 0,
            bounding: Aabb::empty(),
            normalization: NormalizationTransform::IDENTITY,
        }
    }

    fn test_mesh() -> Mesh {
        Mesh::new(
            PrimitiveTopology::TriangleList,
            RenderAssetUsages::RENDER_WORLD | RenderAssetUsages::MAIN_WORLD,
        )
    }

    #[test]
    fn replacement_releases_every_acquired_resource() {
        let mut session = ModelIngestSession::default();
        let mut meshes = Assets::<Mesh>::default();
        let mut materials = Assets::<StandardMaterial>::default();
        let mut images = Assets::<Image>::default();

        let model = LoadedModel {
            root: Entity::PLACEHOLDER,
            meshes: vec![meshes.add(test_mesh()), meshes.add(test_mesh())],
            materials: vec![materials.add(StandardMaterial::default())],
            textures: Vec::new(),
            summary: empty_summary(),
            file_size_mb: 1.0,
            origin: "test".to_string(),
        };
        session.install(model);

        let (root, released) = session.release_assets(&mut meshes, &mut materials, &mut images);
        assert_eq!(root, Some(Entity::PLACEHOLDER));
        assert_eq!(released, 3);
        assert!(session.current().is_none());

        let (acquired, released_total) = session.resource_counts();
        assert_eq!(acquired, released_total);
        assert!(meshes.is_empty());
        assert!(materials.is_empty());
    }

    #[test]
    fn releasing_an_empty_session_is_a_no_op() {
        let mut session = ModelIngestSession::default();
        let mut meshes = Assets::<Mesh>::default();
        let mut materials = Assets::<StandardMaterial>::default();
        let mut images = Assets::<Image>::default();
        let (root, released) = session.release_assets(&mut meshes, &mut materials, &mut images);
        assert_eq!(root, None);
        assert_eq!(released, 0);
    }
}
