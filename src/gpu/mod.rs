//! The slice of the GPU API the mesh and shader layers drive.
//!
//! Everything goes through [`GraphicsApi`], implemented for OpenGL by
//! [`GlowApi`] and headlessly by [`RecordingApi`].

mod glow_backend;
mod recording;
mod resource;

pub use glow_backend::GlowApi;
pub use recording::{GpuCall, RecordingApi};
pub use resource::{GpuObject, GpuResource};

use std::num::NonZeroU32;

use glam::{Mat4, Vec2, Vec3, Vec4};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GpuError {
    #[error("Failed to create buffer: {0}")]
    BufferCreationFailed(String),
    #[error("Failed to create vertex array: {0}")]
    VertexArrayCreationFailed(String),
    #[error("Failed to compile {stage:?} shader: {log}")]
    CompileFailed { stage: ShaderStage, log: String },
    #[error("Failed to link program: {0}")]
    LinkFailed(String),
}

pub type GpuResult<T> = Result<T, GpuError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferHandle(pub NonZeroU32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VertexArrayHandle(pub NonZeroU32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ShaderHandle(pub NonZeroU32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProgramHandle(pub NonZeroU32);

/// A resolved uniform slot. Unresolved uniforms are represented as `None`
/// wherever a location is stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UniformLocation(pub u32);

/// Capability tier of the active context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum FeatureLevel {
    /// GLES 2.0 class: no vertex array objects, no instancing.
    Level20,
    /// GLES 3.0 / GL 3.x class.
    Level30,
}

impl FeatureLevel {
    pub fn supports_vertex_arrays(self) -> bool {
        self >= FeatureLevel::Level30
    }

    pub fn supports_instancing(self) -> bool {
        self >= FeatureLevel::Level30
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Primitive {
    Lines,
    Points,
    TriangleStrip,
    TriangleFan,
    #[default]
    Triangles,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferTarget {
    Array,
    ElementArray,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferUsage {
    StaticDraw,
    StreamDraw,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScalarType {
    F32,
    U8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IndexType {
    U16,
    U32,
}

impl IndexType {
    pub fn size(self) -> usize {
        match self {
            IndexType::U16 => std::mem::size_of::<u16>(),
            IndexType::U32 => std::mem::size_of::<u32>(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    Vertex,
    Fragment,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Viewport {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl Viewport {
    pub fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self { x, y, width, height }
    }

    /// Side-by-side eye viewports: left half for eye 0, right half for eye 1.
    pub fn split_stereo(&self) -> [Viewport; 2] {
        let half = self.width / 2;
        [
            Viewport::new(self.x, self.y, half, self.height),
            Viewport::new(self.x + half, self.y, self.width - half, self.height),
        ]
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UniformValue<'a> {
    Int(i32),
    Float(f32),
    Vec2(Vec2),
    Vec3(Vec3),
    Vec4(Vec4),
    Mat4(Mat4),
    Vec4Array(&'a [Vec4]),
}

/// The GPU operations this crate issues.
///
/// Implementations are bound to the thread owning the GPU context; callers
/// share them as `Rc<dyn GraphicsApi>`.
pub trait GraphicsApi {
    fn feature_level(&self) -> FeatureLevel;

    fn create_buffer(&self) -> GpuResult<BufferHandle>;
    fn delete_buffer(&self, buffer: BufferHandle);
    fn bind_buffer(&self, target: BufferTarget, buffer: Option<BufferHandle>);
    fn buffer_data(&self, target: BufferTarget, data: &[u8], usage: BufferUsage);

    fn create_vertex_array(&self) -> GpuResult<VertexArrayHandle>;
    fn delete_vertex_array(&self, vertex_array: VertexArrayHandle);
    fn bind_vertex_array(&self, vertex_array: Option<VertexArrayHandle>);

    fn enable_vertex_attrib(&self, slot: u32);
    fn disable_vertex_attrib(&self, slot: u32);
    fn vertex_attrib_pointer(
        &self,
        slot: u32,
        components: i32,
        scalar: ScalarType,
        normalized: bool,
        stride: i32,
        offset: i32,
    );

    fn draw_arrays(&self, primitive: Primitive, first: i32, count: i32);
    fn draw_elements(&self, primitive: Primitive, count: i32, index_type: IndexType, offset: i32);
    fn draw_elements_instanced(
        &self,
        primitive: Primitive,
        count: i32,
        index_type: IndexType,
        offset: i32,
        instances: i32,
    );

    fn viewport(&self, viewport: Viewport);

    /// Creates and compiles a shader object. The object is deleted again if
    /// compilation fails.
    fn compile_shader(&self, stage: ShaderStage, source: &str) -> GpuResult<ShaderHandle>;
    fn delete_shader(&self, shader: ShaderHandle);
    /// Links `vertex` and `fragment` into a new program, binding each
    /// `(slot, name)` attribute pair before linking.
    fn link_program(
        &self,
        vertex: ShaderHandle,
        fragment: ShaderHandle,
        attribute_bindings: &[(u32, &str)],
    ) -> GpuResult<ProgramHandle>;
    fn delete_program(&self, program: ProgramHandle);
    fn use_program(&self, program: Option<ProgramHandle>);

    fn uniform_location(&self, program: ProgramHandle, name: &str) -> Option<UniformLocation>;
    fn set_uniform(&self, location: UniformLocation, value: UniformValue<'_>);
}
