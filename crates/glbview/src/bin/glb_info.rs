use clap::Parser;
use std::fs::File;
use std::path::PathBuf;

use glbview_ingest::{glb, scene, ByteSource, CancelToken, ChunkedByteLoader, ProgressTracker};

#[derive(Parser, Debug)]
#[command(author, version, about = "Inspect GLB container layout and scene statistics", long_about = None)]
struct Args {
    /// GLB file to inspect
    file: PathBuf,

    /// Per-chunk read size in MiB
    #[arg(long, default_value_t = 64)]
    chunk_size_mb: usize,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args = Args::parse();

    let file = File::open(&args.file)?;
    let size = file.metadata()?.len();
    drop(file);

    let source = ByteSource::open(&args.file)?;
    let loader = ChunkedByteLoader::new(args.chunk_size_mb * 1024 * 1024)?;
    let mut tracker = ProgressTracker::sink();
    let buffer = loader.load(source, &mut tracker, &CancelToken::new())?;

    println!("File: {:?}", args.file);
    println!("Size: {:.2} MB ({} bytes)", size as f64 / 1_048_576.0, size);

    if !glb::is_glb(&buffer) {
        println!("Not a GLB container (no glTF magic); treating as JSON glTF");
    } else {
        let header = glb::Header::read_from(&mut &buffer[..])?;
        println!("\nGLB header:");
        println!("  Version: {}", header.version);
        println!("  Declared length: {} bytes", header.length);

        let chunks = glb::validate(&buffer)?;
        println!("\nChunks:");
        for chunk in &chunks {
            println!(
                "  {} at offset {} ({} bytes)",
                chunk.kind_str(),
                chunk.offset,
                chunk.length
            );
        }
    }

    let (document, _buffers, images) = scene::parse(&buffer)?;
    let summary = scene::summarize(&document);

    println!("\nScene:");
    println!("  Meshes: {}", document.meshes().count());
    println!(
        "  Primitives: {}",
        document.meshes().map(|m| m.primitives().count()).sum::<usize>()
    );
    println!("  Materials: {}", document.materials().count());
    println!("  Images: {}", images.len());
    println!("  Accessors: {}", document.accessors().count());
    println!("  Triangles: {}", summary.triangle_count);
    println!("  Vertices: {}", summary.vertex_count);

    let size = summary.bounding.size();
    println!(
        "  Bounds: {:.3} x {:.3} x {:.3}",
        size[0], size[1], size[2]
    );
    println!(
        "  Normalization: scale {:.5}, translation [{:.3}, {:.3}, {:.3}]",
        summary.normalization.scale,
        summary.normalization.translation[0],
        summary.normalization.translation[1],
        summary.normalization.translation[2]
    );

    Ok(())
}
