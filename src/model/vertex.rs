use std::fmt;
use std::str::FromStr;

use crate::gpu::{BufferHandle, BufferTarget, GraphicsApi, ScalarType};

use super::MeshError;

pub const ATTRIBUTE_POSITION: u32 = 0;
pub const ATTRIBUTE_NORMAL: u32 = 1;
pub const ATTRIBUTE_TANGENT: u32 = 2;
pub const ATTRIBUTE_TEX_COORD: u32 = 3;
pub const ATTRIBUTE_TEX_COORD_ALT: u32 = 4;
pub const ATTRIBUTE_COLOR: u32 = 5;
pub const ATTRIBUTE_BONE_INDICES: u32 = 6;
pub const ATTRIBUTE_BONE_WEIGHTS: u32 = 7;

/// One entry of an interleaved vertex record. `End` terminates a tag list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttributeKind {
    Position3f,
    Normal3f,
    Tangent4f,
    TexCoord2f,
    TexCoordAlt2f,
    Color4ub,
    BoneIndices4ub,
    BoneWeights4ub,
    End,
}

/// How a kind is laid out in memory and where it is bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttributeInfo {
    pub slot: u32,
    pub components: i32,
    pub size: usize,
    pub scalar: ScalarType,
    pub normalized: bool,
    /// Vertex shader input bound to `slot` at link time.
    pub shader_name: &'static str,
}

const fn info(
    slot: u32,
    components: i32,
    scalar: ScalarType,
    normalized: bool,
    shader_name: &'static str,
) -> AttributeInfo {
    let scalar_size = match scalar {
        ScalarType::F32 => 4,
        ScalarType::U8 => 1,
    };
    AttributeInfo {
        slot,
        components,
        size: components as usize * scalar_size,
        scalar,
        normalized,
        shader_name,
    }
}

const ATTRIBUTE_TABLE: [AttributeInfo; 8] = [
    info(ATTRIBUTE_POSITION, 3, ScalarType::F32, false, "aPosition"),
    info(ATTRIBUTE_NORMAL, 3, ScalarType::F32, false, "aNormal"),
    info(ATTRIBUTE_TANGENT, 4, ScalarType::F32, false, "aTangent"),
    info(ATTRIBUTE_TEX_COORD, 2, ScalarType::F32, false, "aTexCoord"),
    info(ATTRIBUTE_TEX_COORD_ALT, 2, ScalarType::F32, false, "aTexCoordAlt"),
    info(ATTRIBUTE_COLOR, 4, ScalarType::U8, true, "aColor"),
    info(ATTRIBUTE_BONE_INDICES, 4, ScalarType::U8, false, "aBoneIndices"),
    info(ATTRIBUTE_BONE_WEIGHTS, 4, ScalarType::U8, true, "aBoneWeights"),
];

impl AttributeKind {
    pub const ALL: [AttributeKind; 8] = [
        AttributeKind::Position3f,
        AttributeKind::Normal3f,
        AttributeKind::Tangent4f,
        AttributeKind::TexCoord2f,
        AttributeKind::TexCoordAlt2f,
        AttributeKind::Color4ub,
        AttributeKind::BoneIndices4ub,
        AttributeKind::BoneWeights4ub,
    ];

    /// Layout of this kind; `None` for the `End` sentinel.
    pub fn info(self) -> Option<&'static AttributeInfo> {
        match self {
            AttributeKind::End => None,
            kind => Some(&ATTRIBUTE_TABLE[kind as usize]),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            AttributeKind::Position3f => "position3f",
            AttributeKind::Normal3f => "normal3f",
            AttributeKind::Tangent4f => "tangent4f",
            AttributeKind::TexCoord2f => "texcoord2f",
            AttributeKind::TexCoordAlt2f => "texcoordalt2f",
            AttributeKind::Color4ub => "color4ub",
            AttributeKind::BoneIndices4ub => "boneindices4ub",
            AttributeKind::BoneWeights4ub => "boneweights4ub",
            AttributeKind::End => "end",
        }
    }
}

impl fmt::Display for AttributeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for AttributeKind {
    type Err = MeshError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.to_ascii_lowercase();
        AttributeKind::ALL
            .into_iter()
            .chain(std::iter::once(AttributeKind::End))
            .find(|kind| kind.name() == lower)
            .ok_or_else(|| MeshError::UnknownAttribute(s.to_string()))
    }
}

/// `(slot, shader input name)` pairs bound before linking every program.
pub fn attribute_bindings() -> impl Iterator<Item = (u32, &'static str)> {
    ATTRIBUTE_TABLE
        .iter()
        .map(|info| (info.slot, info.shader_name))
}

/// Ordered attribute kinds of one interleaved vertex record.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct VertexFormat {
    attributes: Vec<AttributeKind>,
}

impl VertexFormat {
    /// Takes kinds up to the first `End`, or the whole slice if there is none.
    pub fn new(kinds: &[AttributeKind]) -> Result<Self, MeshError> {
        let mut attributes = Vec::with_capacity(kinds.len());
        for &kind in kinds.iter().take_while(|&&kind| kind != AttributeKind::End) {
            if attributes.contains(&kind) {
                return Err(MeshError::DuplicateAttribute(kind));
            }
            attributes.push(kind);
        }
        Ok(Self { attributes })
    }

    pub fn attributes(&self) -> &[AttributeKind] {
        &self.attributes
    }

    pub fn iter(&self) -> impl Iterator<Item = AttributeKind> + '_ {
        self.attributes.iter().copied()
    }

    pub fn contains(&self, kind: AttributeKind) -> bool {
        self.attributes.contains(&kind)
    }

    /// Each kind with its layout and byte offset inside the record.
    pub fn layout(&self) -> impl Iterator<Item = (AttributeKind, &'static AttributeInfo, usize)> + '_ {
        self.attributes.iter().scan(0usize, |offset, &kind| {
            let info = kind.info()?;
            let at = *offset;
            *offset += info.size;
            Some((kind, info, at))
        })
    }

    /// Packed size of one record, without trailing padding.
    pub fn size(&self) -> usize {
        self.layout().map(|(_, info, _)| info.size).sum()
    }

    pub fn offset_of(&self, kind: AttributeKind) -> Option<usize> {
        self.layout()
            .find(|(k, _, _)| *k == kind)
            .map(|(_, _, offset)| offset)
    }
}

/// Binds `buffer` as the array buffer and points one attribute slot per kind
/// at it. Returns the cumulative offset reached at the end of the record.
///
/// # Panics
///
/// If `stride` or the last attribute offset does not fit a `GLint`.
pub fn set_attributes(
    api: &dyn GraphicsApi,
    buffer: BufferHandle,
    format: &VertexFormat,
    stride: usize,
    base_offset: usize,
) -> usize {
    assert!(
        i32::try_from(stride).is_ok() && i32::try_from(base_offset + format.size()).is_ok(),
        "stride {} with base offset {} out of GL range",
        stride,
        base_offset
    );
    api.bind_buffer(BufferTarget::Array, Some(buffer));
    let mut offset = 0;
    for kind in format.attributes() {
        let Some(info) = kind.info() else { break };
        api.enable_vertex_attrib(info.slot);
        api.vertex_attrib_pointer(
            info.slot,
            info.components,
            info.scalar,
            info.normalized,
            stride as i32,
            (base_offset + offset) as i32,
        );
        offset += info.size;
    }
    offset
}

/// Disables every slot `set_attributes` enabled for `format`.
pub fn unset_attributes(api: &dyn GraphicsApi, format: &VertexFormat) {
    for info in format.attributes().iter().filter_map(|kind| kind.info()) {
        api.disable_vertex_attrib(info.slot);
    }
}

/// Vertex produced by the model loader.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct MeshVertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub tex_coords: [f32; 2],
}

impl MeshVertex {
    pub const ATTRIBUTES: [AttributeKind; 4] = [
        AttributeKind::Position3f,
        AttributeKind::Normal3f,
        AttributeKind::TexCoord2f,
        AttributeKind::End,
    ];

    pub fn format() -> VertexFormat {
        VertexFormat {
            attributes: Self::ATTRIBUTES[..3].to_vec(),
        }
    }
}
