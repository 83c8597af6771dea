use clap::Parser;
use rayon::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use glbview::compress::{compress_file, CompressError, CompressOptions, CompressStats};

#[derive(Parser, Debug)]
#[command(author, version, about = "Compress GLB models: merge, re-index, simplify and downscale textures", long_about = None)]
struct Args {
    /// Input GLB file or directory containing GLB files
    #[arg(value_name = "INPUT")]
    input: PathBuf,

    /// Output file or directory (defaults to '<input>-compressed.glb')
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Simplification ratio in (0, 1], fraction of triangles to keep
    #[arg(long, default_value_t = 0.5)]
    simplify_ratio: f32,

    /// Texture scale in (0, 1], fraction of the original dimensions
    #[arg(long, default_value_t = 0.5)]
    texture_scale: f32,

    /// Remove normal attributes before merging
    #[arg(long)]
    remove_normals: bool,

    /// Remove texture coordinate attributes before merging
    #[arg(long)]
    remove_uvs: bool,

    /// Process directory files in parallel
    #[arg(short, long, default_value_t = true)]
    parallel: bool,

    /// Number of threads to use (0 = all available)
    #[arg(short = 'j', long, default_value_t = 0)]
    threads: usize,

    /// File pattern to match when processing directories
    #[arg(short = 'P', long, default_value = "*.glb")]
    pattern: String,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

impl Args {
    fn options(&self) -> CompressOptions {
        CompressOptions {
            simplify_ratio: self.simplify_ratio,
            texture_scale: self.texture_scale,
            remove_normals: self.remove_normals,
            remove_uvs: self.remove_uvs,
        }
    }
}

#[derive(Debug)]
struct RunResult {
    path: PathBuf,
    stats: Option<CompressStats>,
    elapsed: Duration,
    error: Option<String>,
}

fn process_file(input: &Path, args: &Args) -> RunResult {
    let output = determine_output_path(input, &args.output);
    let start = Instant::now();

    if args.verbose {
        println!("Processing: {:?} -> {:?}", input, output);
    }

    match compress_file(input, &output, &args.options()) {
        Ok(stats) => {
            if args.verbose {
                println!(
                    "  Vertices: {} -> {} ({:.1}% reduction)",
                    stats.input_vertices,
                    stats.output_vertices,
                    stats.vertex_reduction_percent()
                );
                println!(
                    "  File size: {} KB -> {} KB ({:.1}% reduction)",
                    stats.input_bytes / 1024,
                    stats.output_bytes / 1024,
                    stats.size_reduction_percent()
                );
            }
            RunResult {
                path: input.to_path_buf(),
                stats: Some(stats),
                elapsed: start.elapsed(),
                error: None,
            }
        }
        Err(e) => RunResult {
            path: input.to_path_buf(),
            stats: None,
            elapsed: start.elapsed(),
            error: Some(e.to_string()),
        },
    }
}

fn determine_output_path(input: &Path, output: &Option<PathBuf>) -> PathBuf {
    match output {
        Some(path) if path.is_dir() => path
            .join(input.file_stem().unwrap_or_default())
            .with_extension("glb"),
        Some(path) => path.clone(),
        None => {
            let stem = input
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_else(|| "model".to_string());
            input.with_file_name(format!("{stem}-compressed.glb"))
        }
    }
}

fn process_directory(args: &Args) -> Result<Vec<RunResult>, CompressError> {
    let pattern = glob::Pattern::new(&args.pattern)
        .map_err(|e| CompressError::InvalidOption(format!("invalid pattern: {e}")))?;

    let files: Vec<PathBuf> = fs::read_dir(&args.input)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_file() && pattern.matches_path(path))
        .collect();

    if files.is_empty() {
        println!(
            "No files found matching pattern '{}' in {:?}",
            args.pattern, args.input
        );
        return Ok(Vec::new());
    }

    println!("Found {} files to compress", files.len());

    if args.threads > 0 {
        rayon::ThreadPoolBuilder::new()
            .num_threads(args.threads)
            .build_global()
            .map_err(|e| CompressError::InvalidOption(format!("failed to set thread pool: {e}")))?;
    }

    let results = if args.parallel {
        files.par_iter().map(|path| process_file(path, args)).collect()
    } else {
        files.iter().map(|path| process_file(path, args)).collect()
    };

    Ok(results)
}

fn print_summary(results: &[RunResult]) {
    let successful: Vec<&RunResult> = results.iter().filter(|r| r.error.is_none()).collect();
    let failed = results.len() - successful.len();

    println!("\n=== Compression Summary ===");
    println!("Total files: {}", results.len());
    println!("  Successful: {}", successful.len());
    println!("  Failed: {}", failed);

    if !successful.is_empty() {
        let total_input: u64 = successful
            .iter()
            .filter_map(|r| r.stats.as_ref())
            .map(|s| s.input_bytes)
            .sum();
        let total_output: u64 = successful
            .iter()
            .filter_map(|r| r.stats.as_ref())
            .map(|s| s.output_bytes)
            .sum();
        let total_time: Duration = successful.iter().map(|r| r.elapsed).sum();

        let reduction = if total_input > 0 {
            (1.0 - total_output as f64 / total_input as f64) * 100.0
        } else {
            0.0
        };

        println!("\nSize statistics:");
        println!("  Total input: {:.2} MB", total_input as f64 / 1_048_576.0);
        println!(
            "  Total output: {:.2} MB",
            total_output as f64 / 1_048_576.0
        );
        println!("  Size reduction: {reduction:.1}%");

        println!("\nPerformance:");
        println!("  Total time: {:.2}s", total_time.as_secs_f64());
        println!(
            "  Average time per file: {:.2}s",
            total_time.as_secs_f64() / successful.len() as f64
        );
    }

    for result in results.iter().filter(|r| r.error.is_some()) {
        if let Some(error) = &result.error {
            eprintln!("\nFailed: {:?}", result.path);
            eprintln!("  Error: {error}");
        }
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args = Args::parse();

    if let Err(e) = args.options().validate() {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }

    if !args.input.exists() {
        eprintln!("Error: input path does not exist: {:?}", args.input);
        std::process::exit(1);
    }

    let results = if args.input.is_dir() {
        process_directory(&args)?
    } else {
        vec![process_file(&args.input, &args)]
    };

    print_summary(&results);

    if results.iter().any(|r| r.error.is_some()) {
        std::process::exit(1);
    }
    Ok(())
}
