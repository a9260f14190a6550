//! ALICE-Nanite CLI
//!
//! Command-line interface for building and inspecting virtual meshes.
//!
//! Author: Moroya Sakamoto

use alice_nanite::io::{get_info, load_vmesh, save_manifest, save_vmesh};
use alice_nanite::prelude::*;
use clap::{Parser, Subcommand, ValueEnum};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "alice-nanite")]
#[command(author = "Moroya Sakamoto")]
#[command(version = alice_nanite::VERSION)]
#[command(about = "ALICE-Nanite: cluster DAG builder and cut selector", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum Shape {
    Box,
    Sphere,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a procedural mesh as JSON
    Demo {
        /// Output file (.json)
        #[arg(short, long)]
        output: PathBuf,
        /// Shape to generate
        #[arg(long, value_enum, default_value = "sphere")]
        shape: Shape,
    },

    /// Build a cluster hierarchy from a JSON mesh
    Build {
        /// Input mesh (.json)
        input: PathBuf,
        /// Output container (.vmesh)
        #[arg(short, long)]
        output: PathBuf,
        /// Build configuration (.json)
        #[arg(long)]
        config: Option<PathBuf>,
        /// Also write a JSON manifest
        #[arg(long)]
        manifest: Option<PathBuf>,
    },

    /// Display container header and LOD table
    Info {
        /// Input file (.vmesh)
        file: PathBuf,
    },

    /// Select clusters for one view and simulate streaming them
    Select {
        /// Input file (.vmesh)
        file: PathBuf,
        /// Camera position "x,y,z"
        #[arg(long, value_parser = parse_vec3, allow_hyphen_values = true)]
        eye: Vec3,
        /// Point looked at "x,y,z"
        #[arg(long, value_parser = parse_vec3, allow_hyphen_values = true, default_value = "0,0,0")]
        target: Vec3,
        /// Pixel error threshold
        #[arg(long, default_value_t = 1.0)]
        threshold: f32,
        /// Streaming cache slots
        #[arg(long, default_value_t = 4096)]
        slots: usize,
    },
}

fn parse_vec3(s: &str) -> Result<Vec3, String> {
    let parts: Vec<f32> = s
        .split(',')
        .map(|p| p.trim().parse::<f32>().map_err(|e| format!("{}: {}", p, e)))
        .collect::<Result<_, _>>()?;
    match parts.as_slice() {
        [x, y, z] => Ok(Vec3::new(*x, *y, *z)),
        _ => Err(format!("expected x,y,z, got {}", s)),
    }
}

type CmdResult = Result<(), Box<dyn std::error::Error>>;

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Demo { output, shape } => cmd_demo(&output, shape),
        Commands::Build {
            input,
            output,
            config,
            manifest,
        } => cmd_build(&input, &output, config.as_deref(), manifest.as_deref()),
        Commands::Info { file } => cmd_info(&file),
        Commands::Select {
            file,
            eye,
            target,
            threshold,
            slots,
        } => cmd_select(&file, eye, target, threshold, slots),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn cmd_demo(output: &Path, shape: Shape) -> CmdResult {
    let mesh = match shape {
        Shape::Box => subdivided_box(Vec3::ONE, [16, 16, 16]),
        Shape::Sphere => uv_sphere(1.0, 64, 128),
    };
    serde_json::to_writer(BufWriter::new(File::create(output)?), &mesh)?;
    println!(
        "Wrote {} triangles to {}",
        mesh.triangle_count(),
        output.display()
    );
    Ok(())
}

fn cmd_build(input: &Path, output: &Path, config: Option<&Path>, manifest: Option<&Path>) -> CmdResult {
    let config = match config {
        Some(path) => BuildConfig::load_json(path)?,
        None => BuildConfig::default(),
    };
    let mesh: MeshStream = serde_json::from_reader(BufReader::new(File::open(input)?))?;
    println!("Input: {} triangles", mesh.triangle_count());

    let start = std::time::Instant::now();
    let built = HierarchyAssembler::new(config).build(&mesh)?;
    println!(
        "Built {} clusters in {} groups over {} LODs in {:.2?}",
        built.clusters.len(),
        built.groups.len(),
        built.lod_count,
        start.elapsed()
    );

    save_vmesh(&built, output)?;
    println!("Saved {}", output.display());
    if let Some(path) = manifest {
        save_manifest(&built, path)?;
        println!("Manifest {}", path.display());
    }
    Ok(())
}

fn cmd_info(path: &Path) -> CmdResult {
    println!("{}", get_info(path)?);
    let mesh = load_vmesh(path)?;
    println!("{:>4} {:>8} {:>7} {:>10} {:>12} {:>12}", "LOD", "clusters", "groups", "triangles", "max error", "deviation");
    for s in mesh.lod_stats() {
        println!(
            "{:>4} {:>8} {:>7} {:>10} {:>12.6} {:>12.6}",
            s.lod, s.clusters, s.groups, s.triangles, s.max_error, s.max_deviation
        );
    }
    Ok(())
}

fn cmd_select(path: &Path, eye: Vec3, target: Vec3, threshold: f32, slots: usize) -> CmdResult {
    let mesh = load_vmesh(path)?;
    let config = RuntimeConfig {
        pixel_error_threshold: threshold,
        ..Default::default()
    };
    let mut selector = RuntimeSelector::new(&mesh, config);
    let selection = selector.select(&Camera::look_at(eye, target));
    println!(
        "Selected {} clusters, {} triangles ({} refined groups, {} clamped)",
        selection.len(),
        selection.triangles,
        selection.refined_groups,
        selection.clamped_groups
    );

    let mut cache = StreamingCache::new(StreamingConfig {
        capacity: slots,
        ..Default::default()
    });
    let stats = cache.stream_selection(0, &mesh, &selection)?;
    println!(
        "Streaming: {} requests, {} misses, {} evictions, {} slots resident",
        stats.requests,
        stats.misses,
        stats.evictions,
        cache.len()
    );
    Ok(())
}
