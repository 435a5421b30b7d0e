//! GPU programs and the well-known uniforms fed into them every draw.

mod preprocessor;
#[cfg(test)]
mod tests;

pub use preprocessor::load_file_with_directives;

use std::ffi::OsString;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::thread::{self, JoinHandle};

use thiserror::Error;

use crate::gpu::{
    GpuError, GpuResource, GraphicsApi, ProgramHandle, ShaderHandle, UniformLocation, UniformValue,
};
use crate::renderer::Renderer;

pub const MAX_TEXTURES_PER_SHADER: usize = 8;
pub const VERTEX_EXTENSION: &str = "glslv";
pub const FRAGMENT_EXTENSION: &str = "glslf";

#[derive(Error, Debug)]
pub enum ShaderError {
    #[error("Can't load shader file {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Include cycle through {}", .0.display())]
    IncludeCycle(PathBuf),
    #[error("Malformed #include in {} line {line}", .path.display())]
    MalformedInclude { path: PathBuf, line: usize },
    #[error("Invalid define {0:?}")]
    InvalidDefine(String),
    #[error("Shader source loading task panicked")]
    LoadTaskPanicked,
    #[error(transparent)]
    Gpu(#[from] GpuError),
}

/// Preprocessed vertex and fragment source text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShaderSource {
    pub vertex: String,
    pub fragment: String,
}

/// The renderer capability a shader needs to become usable: turning source
/// text into a linked program, and reporting failures.
pub trait ShaderCompiler {
    /// Builds a program from `source` and installs it into `shader`. On
    /// failure `shader` is left as it was.
    fn recompile_shader(
        &mut self,
        source: &ShaderSource,
        shader: &mut Shader,
    ) -> Result<(), ShaderError>;

    fn set_last_error(&mut self, message: String);
}

/// Locations of the uniforms every shader may declare. `None` means the
/// program does not use it and it is never set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct UniformLocations {
    pub model_view_projection: Option<UniformLocation>,
    pub model: Option<UniformLocation>,
    pub color: Option<UniformLocation>,
    pub light_pos: Option<UniformLocation>,
    pub camera_pos: Option<UniformLocation>,
    pub time: Option<UniformLocation>,
    pub bone_transforms: Option<UniformLocation>,
}

type FinalizeCallback = Box<dyn FnMut(&Shader)>;

#[derive(Default)]
pub struct Shader {
    program: Option<GpuResource<ProgramHandle>>,
    vs: Option<GpuResource<ShaderHandle>>,
    fs: Option<GpuResource<ShaderHandle>>,
    basename: PathBuf,
    defines: Vec<String>,
    uniforms: UniformLocations,
    texture_units: [Option<UniformLocation>; MAX_TEXTURES_PER_SHADER],
    pending: Option<JoinHandle<Result<ShaderSource, ShaderError>>>,
    finalize_callback: Option<FinalizeCallback>,
}

impl Shader {
    pub fn new() -> Self {
        Self::default()
    }

    /// An uncompiled shader that `load`/`reload` will read from
    /// `<basename>.glslv` and `<basename>.glslf`.
    pub fn with_source(basename: impl AsRef<Path>, defines: &[String]) -> Self {
        Self {
            basename: basename.as_ref().to_path_buf(),
            defines: defines.to_vec(),
            ..Self::default()
        }
    }

    /// Adopts already-built objects. Uniform locations are reset; call
    /// [`Shader::initialize_uniforms`] to resolve them.
    pub fn init(
        &mut self,
        program: GpuResource<ProgramHandle>,
        vs: GpuResource<ShaderHandle>,
        fs: GpuResource<ShaderHandle>,
        defines: &[String],
    ) {
        self.program = Some(program);
        self.vs = Some(vs);
        self.fs = Some(fs);
        self.defines = defines.to_vec();
        self.uniforms = UniformLocations::default();
        self.texture_units = Default::default();
    }

    /// Releases the current objects and adopts new ones.
    pub fn reset(
        &mut self,
        program: GpuResource<ProgramHandle>,
        vs: GpuResource<ShaderHandle>,
        fs: GpuResource<ShaderHandle>,
    ) {
        self.clear();
        self.program = Some(program);
        self.vs = Some(vs);
        self.fs = Some(fs);
    }

    pub fn is_valid(&self) -> bool {
        self.program.is_some()
    }

    pub fn program(&self) -> Option<ProgramHandle> {
        self.program.as_ref().map(GpuResource::handle)
    }

    pub fn basename(&self) -> &Path {
        &self.basename
    }

    pub fn defines(&self) -> &[String] {
        &self.defines
    }

    pub fn uniforms(&self) -> &UniformLocations {
        &self.uniforms
    }

    pub fn texture_unit(&self, unit: usize) -> Option<UniformLocation> {
        self.texture_units.get(unit).copied().flatten()
    }

    pub fn is_load_pending(&self) -> bool {
        self.pending.is_some()
    }

    pub fn set_finalize_callback(&mut self, callback: impl FnMut(&Shader) + 'static) {
        self.finalize_callback = Some(Box::new(callback));
    }

    /// Resolves the well-known uniforms and binds every `texture_unit_N`
    /// sampler to unit N. Sampler bindings are set once here, not per draw.
    pub fn initialize_uniforms(&mut self, api: &dyn GraphicsApi) {
        let Some(program) = self.program() else {
            return;
        };
        api.use_program(Some(program));

        let find = |name: &str| api.uniform_location(program, name);
        self.uniforms = UniformLocations {
            model_view_projection: find("model_view_projection"),
            model: find("model"),
            color: find("color"),
            light_pos: find("light_pos"),
            camera_pos: find("camera_pos"),
            time: find("time"),
            // vec4 array, three per bone.
            bone_transforms: find("bone_transforms"),
        };

        for (unit, slot) in self.texture_units.iter_mut().enumerate() {
            *slot = find(&format!("texture_unit_{}", unit));
            if let Some(location) = *slot {
                api.set_uniform(location, UniformValue::Int(unit as i32));
            }
        }
        log::debug!("Program {:?} uniforms: {:?}", program, self.uniforms);
    }

    /// Makes this program current and pushes the renderer's per-frame state
    /// into every uniform the program uses.
    pub fn set(&self, renderer: &Renderer) {
        let Some(program) = self.program() else {
            log::warn!("Setting shader {} with no program", self.basename.display());
            return;
        };
        let api = renderer.api();
        api.use_program(Some(program));

        let uniforms = &self.uniforms;
        if let Some(location) = uniforms.model_view_projection {
            api.set_uniform(location, UniformValue::Mat4(renderer.model_view_projection()));
        }
        if let Some(location) = uniforms.model {
            api.set_uniform(location, UniformValue::Mat4(renderer.model()));
        }
        if let Some(location) = uniforms.color {
            api.set_uniform(location, UniformValue::Vec4(renderer.color()));
        }
        if let Some(location) = uniforms.light_pos {
            api.set_uniform(location, UniformValue::Vec3(renderer.light_pos()));
        }
        if let Some(location) = uniforms.camera_pos {
            api.set_uniform(location, UniformValue::Vec3(renderer.camera_pos()));
        }
        if let Some(location) = uniforms.time {
            api.set_uniform(location, UniformValue::Float(renderer.time() as f32));
        }
        if let Some(location) = uniforms.bone_transforms {
            if renderer.num_bones() > 0 {
                api.set_uniform(
                    location,
                    UniformValue::Vec4Array(bytemuck::cast_slice(renderer.bone_transforms())),
                );
            }
        }
    }

    pub fn find_uniform(&self, api: &dyn GraphicsApi, name: &str) -> Option<UniformLocation> {
        api.uniform_location(self.program()?, name)
    }

    /// Sets a uniform outside the well-known set. Returns false if the
    /// program does not use `name`.
    pub fn set_uniform(&self, api: &dyn GraphicsApi, name: &str, value: UniformValue<'_>) -> bool {
        let (Some(program), Some(location)) = (self.program(), self.find_uniform(api, name)) else {
            return false;
        };
        api.use_program(Some(program));
        api.set_uniform(location, value);
        true
    }

    /// Reads and preprocesses both source files synchronously.
    pub fn load_source_file(&self) -> Result<ShaderSource, ShaderError> {
        read_source_pair(&self.basename, &self.defines)
    }

    /// Starts reading the source files on a worker thread. Compilation
    /// happens in [`Shader::finalize`], on the thread owning the GPU context.
    pub fn load(&mut self) {
        let basename = self.basename.clone();
        let defines = self.defines.clone();
        log::info!("Loading shader {} in background", basename.display());
        self.pending = Some(thread::spawn(move || {
            read_source_pair(&basename, &defines)
        }));
    }

    /// Compiles the source started by [`Shader::load`]. Returns `Ok(false)`
    /// if nothing was pending.
    pub fn finalize(&mut self, compiler: &mut dyn ShaderCompiler) -> Result<bool, ShaderError> {
        let Some(task) = self.pending.take() else {
            return Ok(false);
        };
        let source = task
            .join()
            .unwrap_or(Err(ShaderError::LoadTaskPanicked))
            .map_err(|err| {
                log::error!("{}", err);
                compiler.set_last_error(err.to_string());
                err
            })?;
        compiler.recompile_shader(&source, self)?;

        if let Some(mut callback) = self.finalize_callback.take() {
            callback(self);
            self.finalize_callback = Some(callback);
        }
        Ok(true)
    }

    /// Load and compile in one step. On failure the current program stays
    /// in place.
    pub fn reload(
        &mut self,
        compiler: &mut dyn ShaderCompiler,
        basename: impl AsRef<Path>,
        defines: &[String],
    ) -> Result<(), ShaderError> {
        self.basename = basename.as_ref().to_path_buf();
        self.defines = defines.to_vec();

        let source = self.load_source_file().map_err(|err| {
            log::error!("{}", err);
            compiler.set_last_error(err.to_string());
            err
        })?;
        compiler.recompile_shader(&source, self)
    }

    /// Releases the program and both shader objects and drops any pending
    /// load. Safe to call repeatedly.
    pub fn clear(&mut self) {
        self.program = None;
        self.vs = None;
        self.fs = None;
        self.pending = None;
        self.uniforms = UniformLocations::default();
        self.texture_units = Default::default();
    }
}

impl fmt::Debug for Shader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Shader")
            .field("program", &self.program())
            .field("basename", &self.basename)
            .field("defines", &self.defines)
            .field("uniforms", &self.uniforms)
            .field("pending", &self.pending.is_some())
            .finish()
    }
}

fn source_path(basename: &Path, extension: &str) -> PathBuf {
    let mut path = OsString::from(basename.as_os_str());
    path.push(".");
    path.push(extension);
    PathBuf::from(path)
}

fn read_source_pair(basename: &Path, defines: &[String]) -> Result<ShaderSource, ShaderError> {
    let vertex = load_file_with_directives(&source_path(basename, VERTEX_EXTENSION), defines)?;
    let fragment = load_file_with_directives(&source_path(basename, FRAGMENT_EXTENSION), defines)?;
    Ok(ShaderSource { vertex, fragment })
}
