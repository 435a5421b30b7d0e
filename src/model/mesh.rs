use std::fmt;
use std::rc::Rc;

use glam::Vec3;

use crate::gpu::{
    BufferHandle, BufferTarget, BufferUsage, FeatureLevel, GpuResource, GraphicsApi, IndexType,
    Primitive, VertexArrayHandle,
};
use crate::renderer::{Renderer, StereoEye};
use crate::shader::Shader;

use super::binding::{BoundAttributes, VertexBinding};
use super::material::Material;
use super::skinning::Skeleton;
use super::vertex::{self, AttributeKind, VertexFormat};
use super::MeshError;

/// Axis-aligned bounding box.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl Aabb {
    pub fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    pub fn from_point(point: Vec3) -> Self {
        Self::new(point, point)
    }

    pub fn extended(self, point: Vec3) -> Self {
        Self::new(self.min.min(point), self.max.max(point))
    }

    pub fn union(self, other: Aabb) -> Self {
        Self::new(self.min.min(other.min), self.max.max(other.max))
    }

    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    pub fn size(&self) -> Vec3 {
        self.max - self.min
    }
}

pub enum IndexData<'a> {
    U16(&'a [u16]),
    U32(&'a [u32]),
}

impl IndexData<'_> {
    pub fn len(&self) -> usize {
        match self {
            IndexData::U16(indices) => indices.len(),
            IndexData::U32(indices) => indices.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn index_type(&self) -> IndexType {
        match self {
            IndexData::U16(_) => IndexType::U16,
            IndexData::U32(_) => IndexType::U32,
        }
    }

    fn as_bytes(&self) -> &[u8] {
        match self {
            IndexData::U16(indices) => bytemuck::cast_slice(indices),
            IndexData::U32(indices) => bytemuck::cast_slice(indices),
        }
    }
}

/// One index buffer drawn with one material.
pub struct IndexRange {
    ibo: Option<GpuResource<BufferHandle>>,
    count: usize,
    index_type: IndexType,
    material: Option<Rc<dyn Material>>,
}

impl IndexRange {
    pub fn buffer(&self) -> Option<BufferHandle> {
        self.ibo.as_ref().map(GpuResource::handle)
    }

    pub fn count(&self) -> usize {
        self.count
    }

    pub fn index_type(&self) -> IndexType {
        self.index_type
    }

    pub fn material(&self) -> Option<&Rc<dyn Material>> {
        self.material.as_ref()
    }
}

impl fmt::Debug for IndexRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IndexRange")
            .field("ibo", &self.buffer())
            .field("count", &self.count)
            .field("index_type", &self.index_type)
            .field("material", &self.material.as_ref().map(|m| m.name().to_string()))
            .finish()
    }
}

/// Vertex buffer plus ordered index ranges, drawn with one primitive type.
pub struct Mesh {
    pub name: String,
    vbo: Option<GpuResource<BufferHandle>>,
    vao: Option<GpuResource<VertexArrayHandle>>,
    format: VertexFormat,
    vertex_size: usize,
    num_vertices: usize,
    primitive: Primitive,
    bounds: Aabb,
    indices: Vec<IndexRange>,
    skeleton: Option<Skeleton>,
}

impl Mesh {
    pub fn new(name: impl Into<String>, primitive: Primitive) -> Self {
        Self {
            name: name.into(),
            vbo: None,
            vao: None,
            format: VertexFormat::default(),
            vertex_size: 0,
            num_vertices: 0,
            primitive,
            bounds: Aabb::default(),
            indices: Vec::new(),
            skeleton: None,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.vbo.is_some()
    }

    pub fn format(&self) -> &VertexFormat {
        &self.format
    }

    pub fn vertex_size(&self) -> usize {
        self.vertex_size
    }

    pub fn num_vertices(&self) -> usize {
        self.num_vertices
    }

    pub fn primitive(&self) -> Primitive {
        self.primitive
    }

    pub fn set_primitive(&mut self, primitive: Primitive) {
        self.primitive = primitive;
    }

    pub fn bounds(&self) -> Aabb {
        self.bounds
    }

    pub fn index_ranges(&self) -> &[IndexRange] {
        &self.indices
    }

    pub fn vertex_array(&self) -> Option<VertexArrayHandle> {
        self.vao.as_ref().map(GpuResource::handle)
    }

    pub fn skeleton(&self) -> Option<&Skeleton> {
        self.skeleton.as_ref()
    }

    pub fn set_skeleton(&mut self, skeleton: Skeleton) {
        self.skeleton = Some(skeleton);
    }

    /// Uploads interleaved vertices. Without `bounds`, the box is computed
    /// from the position attribute of every vertex.
    ///
    /// Loading over an already loaded mesh replaces its vertex buffer; index
    /// ranges are kept. Ranges whose buffers were released by
    /// [`Mesh::clear_platform_dependent`] are dropped.
    pub fn load_from_memory(
        &mut self,
        renderer: &Renderer,
        vertex_data: &[u8],
        vertex_size: usize,
        format: &VertexFormat,
        bounds: Option<Aabb>,
    ) -> Result<(), MeshError> {
        let count = vertex_count(vertex_data.len(), vertex_size, format)?;
        if self.is_valid() {
            log::warn!("Mesh '{}' loaded twice, replacing its vertex buffer", self.name);
        }

        // Upload vertex data
        let api = renderer.api();
        let vbo = GpuResource::new(Rc::clone(api), api.create_buffer()?);
        api.bind_buffer(BufferTarget::Array, Some(vbo.handle()));
        api.buffer_data(BufferTarget::Array, vertex_data, BufferUsage::StaticDraw);

        // Bake attribute state
        let vao = if renderer.feature_level().supports_vertex_arrays() {
            let vao = GpuResource::new(Rc::clone(api), api.create_vertex_array()?);
            api.bind_vertex_array(Some(vao.handle()));
            vertex::set_attributes(api.as_ref(), vbo.handle(), format, vertex_size, 0);
            api.bind_vertex_array(None);
            Some(vao)
        } else {
            None
        };

        self.bounds = match bounds {
            Some(bounds) => bounds,
            None => compute_bounds(vertex_data, vertex_size, format),
        };
        self.vbo = Some(vbo);
        self.vao = vao;
        self.format = format.clone();
        self.vertex_size = vertex_size;
        self.num_vertices = count;
        self.skeleton = None;

        let stale = self.indices.iter().filter(|range| range.ibo.is_none()).count();
        if stale > 0 {
            log::warn!(
                "Mesh '{}': dropping {} index ranges released before reload",
                self.name,
                stale
            );
            self.indices.retain(|range| range.ibo.is_some());
        }

        log::debug!(
            "Mesh '{}': {} vertices of {} bytes, bounds {:?}",
            self.name,
            count,
            vertex_size,
            self.bounds
        );
        Ok(())
    }

    /// Appends an index range. Ranges draw in the order they were added.
    pub fn add_indices(
        &mut self,
        renderer: &Renderer,
        indices: IndexData<'_>,
        material: Option<Rc<dyn Material>>,
    ) -> Result<(), MeshError> {
        gl_count("index count", indices.len())?;
        let api = renderer.api();
        let ibo = GpuResource::new(Rc::clone(api), api.create_buffer()?);
        api.bind_buffer(BufferTarget::ElementArray, Some(ibo.handle()));
        api.buffer_data(
            BufferTarget::ElementArray,
            indices.as_bytes(),
            BufferUsage::StaticDraw,
        );

        self.indices.push(IndexRange {
            ibo: Some(ibo),
            count: indices.len(),
            index_type: indices.index_type(),
            material,
        });
        Ok(())
    }

    // In range: vertex_count checked it at load.
    fn gl_vertex_count(&self) -> i32 {
        self.num_vertices as i32
    }

    fn bind_attributes(&self, api: &Rc<dyn GraphicsApi>) -> Option<BoundAttributes<'_>> {
        let Some(vbo) = &self.vbo else {
            log::warn!("Rendering mesh '{}' before it was loaded", self.name);
            return None;
        };
        let binding = VertexBinding::select(self.vertex_array(), vbo.handle());
        Some(binding.bind(api, &self.format, self.vertex_size))
    }

    /// Draws every index range with its material (unless `ignore_material`),
    /// or the whole vertex buffer when there are no ranges. `instances > 1`
    /// draws instanced and requires feature level 3.0.
    pub fn render(&self, renderer: &mut Renderer, ignore_material: bool, instances: usize) {
        let api = Rc::clone(renderer.api());
        let Some(_bound) = self.bind_attributes(&api) else {
            return;
        };

        // No ranges: draw the vertex buffer as is
        if self.indices.is_empty() {
            api.draw_arrays(self.primitive, 0, self.gl_vertex_count());
            return;
        }
        for range in &self.indices {
            if !ignore_material {
                if let Some(material) = &range.material {
                    material.set(renderer);
                }
            }
            let Some(ibo) = range.buffer() else { continue };
            api.bind_buffer(BufferTarget::ElementArray, Some(ibo));
            draw_element(api.as_ref(), renderer.feature_level(), self.primitive, range, instances);
        }
    }

    /// Like [`Mesh::render`], but every draw is issued twice, once per eye,
    /// with the renderer's camera, transform and viewport switched to that
    /// eye and `shader` re-applied in between.
    pub fn render_stereo(
        &self,
        renderer: &mut Renderer,
        shader: &Shader,
        eyes: &[StereoEye; 2],
        ignore_material: bool,
        instances: usize,
    ) {
        let api = Rc::clone(renderer.api());
        let Some(_bound) = self.bind_attributes(&api) else {
            return;
        };

        if self.indices.is_empty() {
            for eye in eyes {
                prepare_eye(renderer, shader, eye);
                api.draw_arrays(self.primitive, 0, self.gl_vertex_count());
            }
            return;
        }
        for range in &self.indices {
            if !ignore_material {
                if let Some(material) = &range.material {
                    material.set(renderer);
                }
            }
            let Some(ibo) = range.buffer() else { continue };
            api.bind_buffer(BufferTarget::ElementArray, Some(ibo));
            // Same range, once per eye
            for eye in eyes {
                prepare_eye(renderer, shader, eye);
                draw_element(api.as_ref(), renderer.feature_level(), self.primitive, range, instances);
            }
        }
    }

    /// Draws vertices that live in client memory, without a mesh. The data
    /// is streamed through a transient buffer released after the draw. At
    /// feature level 3.0 a transient VAO holds the attribute state, since
    /// core profiles reject attribute pointers with no VAO bound.
    pub fn render_array(
        renderer: &Renderer,
        primitive: Primitive,
        format: &VertexFormat,
        vertex_size: usize,
        vertices: &[u8],
    ) -> Result<(), MeshError> {
        let count = gl_count("vertex count", vertex_count(vertices.len(), vertex_size, format)?)?;
        let api = renderer.api();
        let vbo = stream_buffer(api, BufferTarget::Array, vertices)?;
        let vao = bind_immediate(renderer, &vbo, format, vertex_size)?;
        api.bind_buffer(BufferTarget::ElementArray, None);
        api.draw_arrays(primitive, 0, count);
        unbind_immediate(api.as_ref(), vao, format);
        Ok(())
    }

    /// Indexed variant of [`Mesh::render_array`] with 16-bit indices.
    pub fn render_array_indexed(
        renderer: &Renderer,
        primitive: Primitive,
        format: &VertexFormat,
        vertex_size: usize,
        vertices: &[u8],
        indices: &[u16],
    ) -> Result<(), MeshError> {
        vertex_count(vertices.len(), vertex_size, format)?;
        let count = gl_count("index count", indices.len())?;
        let api = renderer.api();
        let vbo = stream_buffer(api, BufferTarget::Array, vertices)?;
        let vao = bind_immediate(renderer, &vbo, format, vertex_size)?;
        // Element binding is VAO state, so it goes after the VAO
        let _ibo = stream_buffer(api, BufferTarget::ElementArray, bytemuck::cast_slice(indices))?;
        api.draw_elements(primitive, count, IndexType::U16, 0);
        unbind_immediate(api.as_ref(), vao, format);
        Ok(())
    }

    /// Releases the vertex buffer, the VAO and every index buffer. Bounds,
    /// counts and material references are kept.
    pub fn clear_platform_dependent(&mut self) {
        self.vbo = None;
        self.vao = None;
        for range in &mut self.indices {
            range.ibo = None;
        }
    }
}

impl fmt::Debug for Mesh {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Mesh")
            .field("name", &self.name)
            .field("vbo", &self.vbo.as_ref().map(GpuResource::handle))
            .field("vao", &self.vertex_array())
            .field("format", &self.format)
            .field("vertex_size", &self.vertex_size)
            .field("num_vertices", &self.num_vertices)
            .field("primitive", &self.primitive)
            .field("bounds", &self.bounds)
            .field("indices", &self.indices)
            .finish()
    }
}

fn prepare_eye(renderer: &mut Renderer, shader: &Shader, eye: &StereoEye) {
    renderer.set_camera_pos(eye.camera_position);
    renderer.set_model_view_projection(eye.model_view_projection);
    renderer.set_viewport(eye.viewport);
    shader.set(renderer);
}

fn draw_element(
    api: &dyn GraphicsApi,
    feature_level: FeatureLevel,
    primitive: Primitive,
    range: &IndexRange,
    instances: usize,
) {
    // In range: add_indices checked it.
    let count = range.count as i32;
    if instances > 1 {
        assert!(
            feature_level.supports_instancing(),
            "instanced draws need feature level 3.0, have {:?}",
            feature_level
        );
        let instances = i32::try_from(instances)
            .unwrap_or_else(|_| panic!("instance count {} out of range", instances));
        api.draw_elements_instanced(primitive, count, range.index_type, 0, instances);
    } else {
        api.draw_elements(primitive, count, range.index_type, 0);
    }
}

fn vertex_count(len: usize, vertex_size: usize, format: &VertexFormat) -> Result<usize, MeshError> {
    let format_size = format.size();
    if vertex_size == 0 || vertex_size < format_size {
        return Err(MeshError::StrideTooSmall {
            vertex_size,
            format_size,
        });
    }
    gl_count("vertex size", vertex_size)?;
    if len == 0 {
        return Err(MeshError::NoVertices);
    }
    if len % vertex_size != 0 {
        return Err(MeshError::RaggedVertexData { len, vertex_size });
    }
    let count = len / vertex_size;
    gl_count("vertex count", count)?;
    Ok(count)
}

/// GL takes sizes and counts as `GLsizei`.
fn gl_count(what: &'static str, value: usize) -> Result<i32, MeshError> {
    i32::try_from(value).map_err(|_| MeshError::OutOfRange { what, value })
}

fn compute_bounds(vertex_data: &[u8], vertex_size: usize, format: &VertexFormat) -> Aabb {
    let Some(offset) = format.offset_of(AttributeKind::Position3f) else {
        log::warn!("No position attribute to compute bounds from");
        return Aabb::default();
    };
    vertex_data
        .chunks_exact(vertex_size)
        .map(|vertex| {
            let position: [f32; 3] = bytemuck::pod_read_unaligned(&vertex[offset..offset + 12]);
            Vec3::from_array(position)
        })
        .fold(None, |bounds: Option<Aabb>, point| {
            Some(match bounds {
                Some(bounds) => bounds.extended(point),
                None => Aabb::from_point(point),
            })
        })
        .unwrap_or_default()
}

fn bind_immediate(
    renderer: &Renderer,
    vbo: &GpuResource<BufferHandle>,
    format: &VertexFormat,
    vertex_size: usize,
) -> Result<Option<GpuResource<VertexArrayHandle>>, MeshError> {
    let api = renderer.api();
    let vao = if renderer.feature_level().supports_vertex_arrays() {
        let vao = GpuResource::new(Rc::clone(api), api.create_vertex_array()?);
        api.bind_vertex_array(Some(vao.handle()));
        Some(vao)
    } else {
        None
    };
    vertex::set_attributes(api.as_ref(), vbo.handle(), format, vertex_size, 0);
    Ok(vao)
}

fn unbind_immediate(
    api: &dyn GraphicsApi,
    vao: Option<GpuResource<VertexArrayHandle>>,
    format: &VertexFormat,
) {
    match vao {
        // Attribute state dies with the VAO.
        Some(vao) => {
            api.bind_vertex_array(None);
            drop(vao);
        }
        None => vertex::unset_attributes(api, format),
    }
}

fn stream_buffer(
    api: &Rc<dyn GraphicsApi>,
    target: BufferTarget,
    data: &[u8],
) -> Result<GpuResource<BufferHandle>, MeshError> {
    let buffer = GpuResource::new(Rc::clone(api), api.create_buffer()?);
    api.bind_buffer(target, Some(buffer.handle()));
    api.buffer_data(target, data, BufferUsage::StreamDraw);
    Ok(buffer)
}
