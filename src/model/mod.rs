mod binding;
mod loader;
mod material;
mod mesh;
mod skinning;
pub mod vertex;

pub use binding::{BoundAttributes, VertexBinding};
pub use loader::Model;
pub use material::{BasicMaterial, Material};
pub use mesh::{Aabb, IndexData, IndexRange, Mesh};
pub use skinning::Skeleton;
pub use vertex::{AttributeInfo, AttributeKind, MeshVertex, VertexFormat};

use thiserror::Error;

use crate::gpu::GpuError;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum MeshError {
    #[error("Mesh has no vertices")]
    NoVertices,
    #[error("Vertex size {vertex_size} is smaller than the format's {format_size} bytes")]
    StrideTooSmall {
        vertex_size: usize,
        format_size: usize,
    },
    #[error("{len} bytes of vertex data is not a multiple of the vertex size {vertex_size}")]
    RaggedVertexData { len: usize, vertex_size: usize },
    #[error("Attribute {0} appears more than once in the vertex format")]
    DuplicateAttribute(AttributeKind),
    #[error("Unknown attribute kind: {0}")]
    UnknownAttribute(String),
    #[error("{what} {value} does not fit a GL size")]
    OutOfRange { what: &'static str, value: usize },
    #[error("Invalid skeleton: {0}")]
    InvalidSkeleton(String),
    #[error(transparent)]
    Gpu(#[from] GpuError),
}
