use bevy::prelude::Resource;
use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug, Clone, Resource)]
#[command(name = "glbview")]
#[command(about = "A viewer for large GLB/glTF models", long_about = None)]
pub struct Args {
    /// Path to a .glb or .gltf file to load on startup
    pub path: Option<PathBuf>,

    /// HTTP(S) URL to stream a model from instead of a local file
    #[arg(long, conflicts_with = "path")]
    pub url: Option<String>,

    /// Rendering backend: 'auto' (probe), 'high' (Vulkan/Metal/DX12) or 'gl'
    #[arg(long, default_value = "auto", value_name = "BACKEND")]
    pub backend: String,

    /// Override the per-chunk read size in MiB
    #[arg(long, value_name = "MIB")]
    pub chunk_size_mb: Option<usize>,

    /// Enable verbose output
    #[arg(short, long)]
    pub verbose: bool,
}

impl Args {
    pub fn parse_args() -> Self {
        Args::parse()
    }
}
