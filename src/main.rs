use std::path::{Path, PathBuf};
use std::rc::Rc;

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use glam::{Mat4, Vec3};
use glmesh::gpu::RecordingApi;
use glmesh::shader::MAX_TEXTURES_PER_SHADER;
use glmesh::{AttributeKind, FeatureLevel, Model, Renderer, StereoEye, VertexFormat, Viewport};

const TRACE_VERTEX_SHADER: &str = "uniform mat4 model_view_projection;\n\
                                   uniform vec3 camera_pos;\n\
                                   void main() {}\n";
const TRACE_FRAGMENT_SHADER: &str = "uniform vec4 color;\nvoid main() {}\n";
const EYE_SEPARATION: f32 = 0.064;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Feature level to emulate (2.0 or 3.0)
    #[arg(long, default_value = "3.0", value_parser = parse_feature_level)]
    feature_level: FeatureLevel,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the interleaved layout of a vertex format
    Layout {
        #[arg(required = true)]
        kinds: Vec<AttributeKind>,
    },
    /// Preprocess and compile <BASENAME>.glslv / .glslf, listing resolved uniforms
    Shader {
        basename: PathBuf,
        /// Preprocessor define, repeatable
        #[arg(short = 'D', long = "define")]
        defines: Vec<String>,
    },
    /// Load a glTF or OBJ model and report its meshes
    Inspect {
        path: PathBuf,
        /// Print the GPU calls of one render
        #[arg(long)]
        trace: bool,
        /// Render both eyes of a side-by-side stereo viewport
        #[arg(long)]
        stereo: bool,
        #[arg(long, default_value_t = 1)]
        instances: usize,
    },
}

fn parse_feature_level(s: &str) -> Result<FeatureLevel, String> {
    match s {
        "2" | "2.0" => Ok(FeatureLevel::Level20),
        "3" | "3.0" => Ok(FeatureLevel::Level30),
        _ => Err(format!("unknown feature level '{}', expected 2.0 or 3.0", s)),
    }
}

fn print_layout(kinds: &[AttributeKind]) -> Result<()> {
    let format = VertexFormat::new(kinds)?;
    for (kind, info, offset) in format.layout() {
        println!(
            "{:<16} slot {} offset {:>2}  {} x {:?}{}  {}",
            kind.to_string(),
            info.slot,
            offset,
            info.components,
            info.scalar,
            if info.normalized { " normalized" } else { "" },
            info.shader_name
        );
    }
    println!("vertex size: {} bytes", format.size());
    Ok(())
}

fn compile_shader(renderer: &mut Renderer, basename: &Path, defines: &[String]) -> Result<()> {
    let shader = renderer.load_shader(basename, defines)?;
    println!("{}: program {:?}", basename.display(), shader.program());
    println!("{:#?}", shader.uniforms());
    for unit in 0..MAX_TEXTURES_PER_SHADER {
        if let Some(location) = shader.texture_unit(unit) {
            println!("texture_unit_{} -> {:?}", unit, location);
        }
    }
    Ok(())
}

fn inspect(
    recorder: &RecordingApi,
    renderer: &mut Renderer,
    path: &Path,
    trace: bool,
    stereo: bool,
    instances: usize,
) -> Result<()> {
    if instances > 1 && !renderer.feature_level().supports_instancing() {
        bail!("Instanced rendering needs feature level 3.0");
    }

    let model = Model::load(renderer, path)?;
    println!("bounds: {:?} .. {:?}", model.bounds.min, model.bounds.max);
    for mesh in &model.meshes {
        println!(
            "mesh '{}': {} vertices, {} bytes each",
            mesh.name,
            mesh.num_vertices(),
            mesh.vertex_size()
        );
        for (index, range) in mesh.index_ranges().iter().enumerate() {
            println!(
                "  range {}: {} {:?} indices, material {}",
                index,
                range.count(),
                range.index_type(),
                range.material().map_or("-", |m| m.name())
            );
        }
    }
    if !trace {
        return Ok(());
    }

    let shader = renderer.compile_and_link_shader(TRACE_VERTEX_SHADER, TRACE_FRAGMENT_SHADER)?;
    let viewport = Viewport::new(0, 0, 1280, 720);
    let center = model.bounds.center();
    let view = Mat4::look_at_rh(center + Vec3::new(0.0, 0.0, 3.0), center, Vec3::Y);
    let projection = Mat4::perspective_rh_gl(60f32.to_radians(), 16.0 / 9.0, 0.1, 100.0);

    recorder.take_calls();
    if stereo {
        let [left, right] = viewport.split_stereo();
        let eye = |viewport: Viewport, offset: f32| StereoEye {
            viewport,
            model_view_projection: projection * Mat4::from_translation(Vec3::X * -offset) * view,
            camera_position: center + Vec3::new(offset, 0.0, 3.0),
        };
        let eyes = [
            eye(left, -EYE_SEPARATION / 2.0),
            eye(right, EYE_SEPARATION / 2.0),
        ];
        for mesh in &model.meshes {
            mesh.render_stereo(renderer, &shader, &eyes, false, instances);
        }
    } else {
        renderer.set_viewport(viewport);
        renderer.set_model_view_projection(projection * view);
        shader.set(renderer);
        for mesh in &model.meshes {
            mesh.render(renderer, false, instances);
        }
    }

    let calls = recorder.take_calls();
    for call in &calls {
        println!("{:?}", call);
    }
    println!(
        "{} calls, {} draws",
        calls.len(),
        calls.iter().filter(|call| call.is_draw()).count()
    );
    Ok(())
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    // Headless: every GPU call is recorded instead of issued.
    let recorder = Rc::new(RecordingApi::new(args.feature_level));
    let mut renderer = Renderer::new(recorder.clone(), None);

    match args.command {
        Command::Layout { kinds } => print_layout(&kinds),
        Command::Shader { basename, defines } => compile_shader(&mut renderer, &basename, &defines),
        Command::Inspect {
            path,
            trace,
            stereo,
            instances,
        } => inspect(&recorder, &mut renderer, &path, trace, stereo, instances),
    }
}
