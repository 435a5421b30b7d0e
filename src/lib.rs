//! Interleaved vertex meshes and GLSL shader programs on top of OpenGL.

pub mod gpu;
pub mod model;
pub mod renderer;
pub mod shader;

pub use gpu::{FeatureLevel, GlowApi, GraphicsApi, Primitive, RecordingApi, Viewport};
pub use model::{
    Aabb, AttributeKind, BasicMaterial, IndexData, Material, Mesh, MeshError, MeshVertex, Model,
    Skeleton, VertexFormat,
};
pub use renderer::{AffineTransform, Renderer, StereoEye};
pub use shader::{Shader, ShaderError};
