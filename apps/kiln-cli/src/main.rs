use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use glam::Vec3;
use kiln_gpu::headless::{GpuCommand, HeadlessBackend};
use kiln_gpu::{ColorTarget, CubeFace, CubeSources, GpuContext, ProgramSpec, ShaderProgram};
use kiln_scene::Camera;
use kiln_studio::{LitModule, SkyboxModule, Studio, StudioConfig};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

type HeadlessStudio = Studio<HeadlessBackend>;

#[derive(Parser)]
#[command(name = "kiln-cli", about = "CLI tool for kiln operations")]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print version and crate info
    Info,
    /// Parse an OBJ file and summarize its geometry
    Obj {
        path: PathBuf,
    },
    /// Compile and link a WGSL pair, then check the named bindings
    Shader {
        vertex: PathBuf,
        fragment: PathBuf,
        /// Attribute that must exist (repeatable)
        #[arg(short, long = "attribute")]
        attributes: Vec<String>,
        /// Uniform that must exist (repeatable)
        #[arg(short, long = "uniform")]
        uniforms: Vec<String>,
    },
    /// Bake a cubemap without a GPU and print the pass trace
    Bake {
        /// OBJ mesh to include
        #[arg(long)]
        obj: Option<PathBuf>,
        /// Directory holding posx.* … negz.* skybox faces
        #[arg(long)]
        skybox: Option<PathBuf>,
        /// File extension of the skybox faces
        #[arg(long, default_value = "png")]
        skybox_ext: String,
        /// Edge length of each face
        #[arg(long, default_value = "512")]
        size: u32,
        /// Bake position as x,y,z
        #[arg(long, value_delimiter = ',', num_args = 3, default_values_t = [0.0, 0.0, 0.0])]
        at: Vec<f32>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    match cli.command {
        Commands::Info => {
            println!("kiln-cli v{}", env!("CARGO_PKG_VERSION"));
            println!("common: {}", kiln_common::crate_info());
            println!("scene: {}", kiln_scene::crate_info());
            println!("gpu: {}", kiln_gpu::crate_info());
            println!("studio: {}", kiln_studio::crate_info());
            println!("chart: {}", kiln_chart::crate_info());
        }
        Commands::Obj { path } => {
            let doc = pollster::block_on(kiln_scene::load_obj(&path))
                .with_context(|| format!("loading {}", path.display()))?;
            println!(
                "{}: {} geometries, {} vertices",
                path.display(),
                doc.geometries.len(),
                doc.vertex_count()
            );
            for lib in &doc.material_libs {
                println!("  mtllib {lib}");
            }
            for (i, g) in doc.geometries.iter().enumerate() {
                println!(
                    "  [{i}] object={} groups={} material={} triangles={} normals={} texcoords={}",
                    g.object,
                    g.groups.join(","),
                    g.material,
                    g.triangle_count(),
                    g.normals().is_some(),
                    g.texcoords().is_some()
                );
            }
            if !doc.warnings.is_empty() {
                println!("{} warnings:", doc.warnings.len());
                for w in &doc.warnings {
                    println!("  {w}");
                }
            }
        }
        Commands::Shader {
            vertex,
            fragment,
            attributes,
            uniforms,
        } => {
            let vs = std::fs::read_to_string(&vertex)
                .with_context(|| format!("reading {}", vertex.display()))?;
            let fs = std::fs::read_to_string(&fragment)
                .with_context(|| format!("reading {}", fragment.display()))?;
            let spec = ProgramSpec {
                attributes,
                uniforms,
            };
            let mut ctx = GpuContext::new(HeadlessBackend::new(1, 1));
            let program = ShaderProgram::create(&mut ctx, [vs.as_str(), fs.as_str()], &spec)?;
            let layout = program.layout();
            println!("linked {}", program.id());
            for a in &layout.attributes {
                println!("  attribute {} @location({}) x{}", a.name, a.location, a.components);
            }
            if let Some(block) = &layout.block {
                println!("  uniform block: {} bytes", block.size);
                for m in &block.members {
                    println!("    {} +{} {:?}", m.name, m.offset, m.ty);
                }
            }
            for t in &layout.textures {
                println!("  texture {} @binding({}) {:?}", t.name, t.binding, t.kind);
            }
        }
        Commands::Bake {
            obj,
            skybox,
            skybox_ext,
            size,
            at,
        } => {
            let mut studio = Studio::new(
                GpuContext::new(HeadlessBackend::new(size, size)),
                StudioConfig {
                    bake_size: size,
                    ..StudioConfig::default()
                },
            );
            pollster::block_on(populate(&mut studio, obj, skybox, &skybox_ext))?;

            let camera = Camera {
                position: Vec3::from_slice(&at),
                ..Camera::default()
            };
            studio.ctx_mut().backend_mut().take_commands();
            let cube = studio.render_cubemap(&camera)?;
            println!("baked {} ({size}x{size} per face)", cube.id);
            print_trace(studio.ctx().backend().commands());

            studio.teardown();
            println!("live after teardown: {}", studio.ctx().backend().live().len());
        }
    }

    Ok(())
}

async fn populate(
    studio: &mut HeadlessStudio,
    obj: Option<PathBuf>,
    skybox: Option<PathBuf>,
    ext: &str,
) -> Result<()> {
    if let Some(dir) = skybox {
        let sources = CubeSources::from_dir(&dir, ext);
        studio
            .register(async |s: &mut HeadlessStudio| SkyboxModule::load(s, sources).await)
            .await
            .with_context(|| format!("loading skybox from {}", dir.display()))?;
    }
    if let Some(path) = obj {
        let doc = kiln_scene::load_obj(&path)
            .await
            .with_context(|| format!("loading {}", path.display()))?;
        studio
            .register(async |s: &mut HeadlessStudio| {
                let mut lit = LitModule::create(s)?;
                lit.add(s.ctx_mut(), &doc)?;
                Ok(lit)
            })
            .await?;
    }
    Ok(())
}

/// One line per face: layer, draws, vertices.
fn print_trace(commands: &[GpuCommand]) {
    let mut faces: Vec<(u32, usize, u32)> = Vec::new();
    for command in commands {
        match command {
            GpuCommand::Clear(clear) => {
                if let ColorTarget::Texture { layer, .. } = clear.target.color {
                    faces.push((layer, 0, 0));
                }
            }
            GpuCommand::Draw(draw) => {
                if let Some(face) = faces.last_mut() {
                    face.1 += 1;
                    face.2 += draw.count;
                }
            }
            _ => {}
        }
    }
    for (layer, draws, vertices) in faces {
        let name = CubeFace::ALL
            .get(layer as usize)
            .map_or("?", |f| f.stem());
        println!("  {name}: {draws} draws, {vertices} vertices");
    }
}
