//! Render backend selection.
//!
//! The backend is chosen exactly once at startup, either by CLI
//! override or by probing for a high-performance adapter. Everything
//! downstream is backend-agnostic: ingestion only ever sees the chunk
//! size policy, and the final scene hand-off goes through Bevy's
//! render plugin configured here.

use bevy::prelude::*;
use bevy::render::settings::{Backends, RenderCreation, WgpuSettings};
use bevy::render::RenderPlugin;

use glbview_ingest::{FALLBACK_CHUNK_SIZE, HIGH_CAPABILITY_CHUNK_SIZE};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderBackend {
    /// Vulkan, Metal or DX12 via wgpu's primary backends.
    HighCapability,
    /// OpenGL, for hosts without a usable primary adapter.
    GlFallback,
}

impl RenderBackend {
    /// Parse a CLI backend argument. `None` means "probe".
    pub fn from_arg(value: &str) -> Result<Option<Self>, String> {
        match value.to_ascii_lowercase().as_str() {
            "auto" => Ok(None),
            "high" | "primary" => Ok(Some(Self::HighCapability)),
            "gl" | "fallback" => Ok(Some(Self::GlFallback)),
            other => Err(format!(
                "unknown backend '{other}' (expected 'auto', 'high' or 'gl')"
            )),
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::HighCapability => "wgpu primary (Vulkan/Metal/DX12)",
            Self::GlFallback => "OpenGL fallback",
        }
    }

    /// Per-chunk read size for the ingestion pipeline. The
    /// high-capability backend tolerates larger in-flight chunks.
    pub fn chunk_size(&self) -> usize {
        match self {
            Self::HighCapability => HIGH_CAPABILITY_CHUNK_SIZE,
            Self::GlFallback => FALLBACK_CHUNK_SIZE,
        }
    }

    fn backends(&self) -> Backends {
        match self {
            Self::HighCapability => Backends::PRIMARY,
            Self::GlFallback => Backends::GL,
        }
    }

    /// Render plugin configured for this backend, for
    /// `DefaultPlugins.set(..)`.
    pub fn render_plugin(&self) -> RenderPlugin {
        RenderPlugin {
            render_creation: RenderCreation::Automatic(WgpuSettings {
                backends: Some(self.backends()),
                ..Default::default()
            }),
            ..Default::default()
        }
    }
}

/// Backend choice plus the chunk size derived from it (or overridden on
/// the command line), inserted as a resource at startup.
#[derive(Resource, Debug, Clone, Copy)]
pub struct BackendConfig {
    pub backend: RenderBackend,
    pub chunk_size: usize,
}

/// Probe for a high-performance adapter on the primary backends,
/// falling back to GL when none is available.
pub fn probe() -> RenderBackend {
    let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
        backends: wgpu::Backends::PRIMARY,
        ..Default::default()
    });

    let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
        power_preference: wgpu::PowerPreference::HighPerformance,
        compatible_surface: None,
        force_fallback_adapter: false,
    }));

    match adapter {
        Some(adapter) => {
            let info = adapter.get_info();
            let limits = adapter.limits();
            info!(
                "High-capability adapter: {} ({:?}), max texture {}, max buffer {} bytes",
                info.name,
                info.backend,
                limits.max_texture_dimension_2d,
                limits.max_buffer_size
            );
            RenderBackend::HighCapability
        }
        None => {
            warn!("No high-capability adapter found, falling back to GL");
            RenderBackend::GlFallback
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_policy_follows_backend() {
        assert_eq!(
            RenderBackend::HighCapability.chunk_size(),
            128 * 1024 * 1024
        );
        assert_eq!(RenderBackend::GlFallback.chunk_size(), 64 * 1024 * 1024);
    }

    #[test]
    fn backend_argument_parsing() {
        assert_eq!(RenderBackend::from_arg("auto").unwrap(), None);
        assert_eq!(
            RenderBackend::from_arg("HIGH").unwrap(),
            Some(RenderBackend::HighCapability)
        );
        assert_eq!(
            RenderBackend::from_arg("gl").unwrap(),
            Some(RenderBackend::GlFallback)
        );
        assert!(RenderBackend::from_arg("software").is_err());
    }
}
