use std::ops::Mul;
use std::path::Path;
use std::rc::Rc;

use glam::{Mat4, Vec3, Vec4};

use crate::gpu::{
    FeatureLevel, GpuResource, GraphicsApi, ProgramHandle, ShaderHandle, ShaderStage, Viewport,
};
use crate::model::vertex::attribute_bindings;
use crate::shader::{Shader, ShaderCompiler, ShaderError, ShaderSource};

/// Affine transform packed as the top three rows of a 4x4 matrix, the layout
/// bone transforms are uploaded in (three vec4 per bone).
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct AffineTransform {
    pub rows: [Vec4; 3],
}

impl AffineTransform {
    pub const IDENTITY: Self = Self {
        rows: [Vec4::X, Vec4::Y, Vec4::Z],
    };

    pub fn from_mat4(m: &Mat4) -> Self {
        Self {
            rows: [m.row(0), m.row(1), m.row(2)],
        }
    }

    pub fn to_mat4(&self) -> Mat4 {
        Mat4::from_cols(self.rows[0], self.rows[1], self.rows[2], Vec4::W).transpose()
    }

    pub fn translation(&self) -> Vec3 {
        Vec3::new(self.rows[0].w, self.rows[1].w, self.rows[2].w)
    }
}

impl Default for AffineTransform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Mul for AffineTransform {
    type Output = AffineTransform;

    fn mul(self, rhs: AffineTransform) -> AffineTransform {
        AffineTransform::from_mat4(&(self.to_mat4() * rhs.to_mat4()))
    }
}

/// Per-eye parameters of a stereo draw.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StereoEye {
    pub viewport: Viewport,
    pub model_view_projection: Mat4,
    pub camera_position: Vec3,
}

/// Per-frame rendering state, plus the GPU API everything draws through.
pub struct Renderer {
    api: Rc<dyn GraphicsApi>,
    feature_level: FeatureLevel,
    model_view_projection: Mat4,
    model: Mat4,
    color: Vec4,
    light_pos: Vec3,
    camera_pos: Vec3,
    time: f64,
    bone_transforms: Vec<AffineTransform>,
    viewport: Viewport,
    last_error: String,
}

impl Renderer {
    /// `forced_level` overrides the level reported by the API, e.g. to
    /// exercise the non-VAO path on a 3.0 context.
    pub fn new(api: Rc<dyn GraphicsApi>, forced_level: Option<FeatureLevel>) -> Self {
        let detected = api.feature_level();
        let feature_level = match forced_level {
            Some(level) if level > detected => {
                log::warn!(
                    "Forced feature level {:?} exceeds detected {:?}, using detected",
                    level,
                    detected
                );
                detected
            }
            Some(level) => level,
            None => detected,
        };
        log::info!("Renderer using feature level {:?}", feature_level);

        Self {
            api,
            feature_level,
            model_view_projection: Mat4::IDENTITY,
            model: Mat4::IDENTITY,
            color: Vec4::ONE,
            light_pos: Vec3::ZERO,
            camera_pos: Vec3::ZERO,
            time: 0.0,
            bone_transforms: Vec::new(),
            viewport: Viewport::default(),
            last_error: String::new(),
        }
    }

    pub fn api(&self) -> &Rc<dyn GraphicsApi> {
        &self.api
    }

    pub fn feature_level(&self) -> FeatureLevel {
        self.feature_level
    }

    pub fn model_view_projection(&self) -> Mat4 {
        self.model_view_projection
    }

    pub fn set_model_view_projection(&mut self, mvp: Mat4) {
        self.model_view_projection = mvp;
    }

    pub fn model(&self) -> Mat4 {
        self.model
    }

    pub fn set_model(&mut self, model: Mat4) {
        self.model = model;
    }

    pub fn color(&self) -> Vec4 {
        self.color
    }

    pub fn set_color(&mut self, color: Vec4) {
        self.color = color;
    }

    pub fn light_pos(&self) -> Vec3 {
        self.light_pos
    }

    pub fn set_light_pos(&mut self, light_pos: Vec3) {
        self.light_pos = light_pos;
    }

    pub fn camera_pos(&self) -> Vec3 {
        self.camera_pos
    }

    pub fn set_camera_pos(&mut self, camera_pos: Vec3) {
        self.camera_pos = camera_pos;
    }

    /// Seconds since the caller's epoch.
    pub fn time(&self) -> f64 {
        self.time
    }

    pub fn set_time(&mut self, time: f64) {
        self.time = time;
    }

    pub fn bone_transforms(&self) -> &[AffineTransform] {
        &self.bone_transforms
    }

    pub fn num_bones(&self) -> usize {
        self.bone_transforms.len()
    }

    pub fn set_bone_transforms(&mut self, transforms: &[AffineTransform]) {
        self.bone_transforms.clear();
        self.bone_transforms.extend_from_slice(transforms);
    }

    pub fn viewport(&self) -> Viewport {
        self.viewport
    }

    pub fn set_viewport(&mut self, viewport: Viewport) {
        self.viewport = viewport;
        self.api.viewport(viewport);
    }

    pub fn last_error(&self) -> &str {
        &self.last_error
    }

    /// Compiles and links a program from in-memory sources.
    pub fn compile_and_link_shader(
        &mut self,
        vertex_source: &str,
        fragment_source: &str,
    ) -> Result<Shader, ShaderError> {
        let source = ShaderSource {
            vertex: vertex_source.to_string(),
            fragment: fragment_source.to_string(),
        };
        let mut shader = Shader::new();
        self.recompile_shader(&source, &mut shader)?;
        Ok(shader)
    }

    /// Loads `<basename>.glslv` / `<basename>.glslf` and compiles them.
    pub fn load_shader(
        &mut self,
        basename: impl AsRef<Path>,
        defines: &[String],
    ) -> Result<Shader, ShaderError> {
        let mut shader = Shader::new();
        shader.reload(self, basename, defines)?;
        Ok(shader)
    }

    #[allow(clippy::type_complexity)]
    fn build_program(
        &self,
        source: &ShaderSource,
    ) -> Result<
        (
            GpuResource<ProgramHandle>,
            GpuResource<ShaderHandle>,
            GpuResource<ShaderHandle>,
        ),
        ShaderError,
    > {
        let vs = self.api.compile_shader(ShaderStage::Vertex, &source.vertex)?;
        let vs = GpuResource::new(Rc::clone(&self.api), vs);
        let fs = self
            .api
            .compile_shader(ShaderStage::Fragment, &source.fragment)?;
        let fs = GpuResource::new(Rc::clone(&self.api), fs);
        let bindings: Vec<_> = attribute_bindings().collect();
        let program = self
            .api
            .link_program(vs.handle(), fs.handle(), &bindings)?;
        Ok((GpuResource::new(Rc::clone(&self.api), program), vs, fs))
    }
}

impl ShaderCompiler for Renderer {
    fn recompile_shader(
        &mut self,
        source: &ShaderSource,
        shader: &mut Shader,
    ) -> Result<(), ShaderError> {
        match self.build_program(source) {
            Ok((program, vs, fs)) => {
                log::info!("Linked program {:?}", program.handle());
                shader.reset(program, vs, fs);
                shader.initialize_uniforms(self.api.as_ref());
                Ok(())
            }
            Err(err) => {
                log::error!("Shader build failed: {}", err);
                self.set_last_error(err.to_string());
                Err(err)
            }
        }
    }

    fn set_last_error(&mut self, message: String) {
        self.last_error = message;
    }
}
