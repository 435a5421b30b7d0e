use glow::HasContext;

use super::{
    BufferHandle, BufferTarget, BufferUsage, FeatureLevel, GpuError, GpuResult, GraphicsApi,
    IndexType, Primitive, ProgramHandle, ScalarType, ShaderHandle, ShaderStage, UniformLocation,
    UniformValue, VertexArrayHandle, Viewport,
};

/// OpenGL / OpenGL ES implementation over a current `glow` context.
pub struct GlowApi {
    gl: glow::Context,
    feature_level: FeatureLevel,
}

impl GlowApi {
    /// Wraps a context that is current on the calling thread.
    pub fn new(gl: glow::Context) -> Self {
        let version = gl.version();
        let feature_level = if version.major >= 3 {
            FeatureLevel::Level30
        } else {
            FeatureLevel::Level20
        };
        log::info!(
            "OpenGL{} {}.{} detected, using {:?}",
            if version.is_embedded { " ES" } else { "" },
            version.major,
            version.minor,
            feature_level
        );
        Self { gl, feature_level }
    }

    pub fn context(&self) -> &glow::Context {
        &self.gl
    }
}

fn target_flags(target: BufferTarget) -> u32 {
    match target {
        BufferTarget::Array => glow::ARRAY_BUFFER,
        BufferTarget::ElementArray => glow::ELEMENT_ARRAY_BUFFER,
    }
}

fn usage_flags(usage: BufferUsage) -> u32 {
    match usage {
        BufferUsage::StaticDraw => glow::STATIC_DRAW,
        BufferUsage::StreamDraw => glow::STREAM_DRAW,
    }
}

fn primitive_flags(primitive: Primitive) -> u32 {
    match primitive {
        Primitive::Lines => glow::LINES,
        Primitive::Points => glow::POINTS,
        Primitive::TriangleStrip => glow::TRIANGLE_STRIP,
        Primitive::TriangleFan => glow::TRIANGLE_FAN,
        Primitive::Triangles => glow::TRIANGLES,
    }
}

fn index_flags(index_type: IndexType) -> u32 {
    match index_type {
        IndexType::U16 => glow::UNSIGNED_SHORT,
        IndexType::U32 => glow::UNSIGNED_INT,
    }
}

fn scalar_flags(scalar: ScalarType) -> u32 {
    match scalar {
        ScalarType::F32 => glow::FLOAT,
        ScalarType::U8 => glow::UNSIGNED_BYTE,
    }
}

impl GraphicsApi for GlowApi {
    fn feature_level(&self) -> FeatureLevel {
        self.feature_level
    }

    fn create_buffer(&self) -> GpuResult<BufferHandle> {
        let buffer = unsafe { self.gl.create_buffer() }.map_err(GpuError::BufferCreationFailed)?;
        Ok(BufferHandle(buffer.0))
    }

    fn delete_buffer(&self, buffer: BufferHandle) {
        unsafe { self.gl.delete_buffer(glow::NativeBuffer(buffer.0)) }
    }

    fn bind_buffer(&self, target: BufferTarget, buffer: Option<BufferHandle>) {
        unsafe {
            self.gl
                .bind_buffer(target_flags(target), buffer.map(|b| glow::NativeBuffer(b.0)))
        }
    }

    fn buffer_data(&self, target: BufferTarget, data: &[u8], usage: BufferUsage) {
        unsafe {
            self.gl
                .buffer_data_u8_slice(target_flags(target), data, usage_flags(usage))
        }
    }

    fn create_vertex_array(&self) -> GpuResult<VertexArrayHandle> {
        let vao = unsafe { self.gl.create_vertex_array() }
            .map_err(GpuError::VertexArrayCreationFailed)?;
        Ok(VertexArrayHandle(vao.0))
    }

    fn delete_vertex_array(&self, vertex_array: VertexArrayHandle) {
        unsafe {
            self.gl
                .delete_vertex_array(glow::NativeVertexArray(vertex_array.0))
        }
    }

    fn bind_vertex_array(&self, vertex_array: Option<VertexArrayHandle>) {
        unsafe {
            self.gl
                .bind_vertex_array(vertex_array.map(|v| glow::NativeVertexArray(v.0)))
        }
    }

    fn enable_vertex_attrib(&self, slot: u32) {
        unsafe { self.gl.enable_vertex_attrib_array(slot) }
    }

    fn disable_vertex_attrib(&self, slot: u32) {
        unsafe { self.gl.disable_vertex_attrib_array(slot) }
    }

    fn vertex_attrib_pointer(
        &self,
        slot: u32,
        components: i32,
        scalar: ScalarType,
        normalized: bool,
        stride: i32,
        offset: i32,
    ) {
        unsafe {
            self.gl.vertex_attrib_pointer_f32(
                slot,
                components,
                scalar_flags(scalar),
                normalized,
                stride,
                offset,
            )
        }
    }

    fn draw_arrays(&self, primitive: Primitive, first: i32, count: i32) {
        unsafe { self.gl.draw_arrays(primitive_flags(primitive), first, count) }
    }

    fn draw_elements(&self, primitive: Primitive, count: i32, index_type: IndexType, offset: i32) {
        unsafe {
            self.gl.draw_elements(
                primitive_flags(primitive),
                count,
                index_flags(index_type),
                offset,
            )
        }
    }

    fn draw_elements_instanced(
        &self,
        primitive: Primitive,
        count: i32,
        index_type: IndexType,
        offset: i32,
        instances: i32,
    ) {
        unsafe {
            self.gl.draw_elements_instanced(
                primitive_flags(primitive),
                count,
                index_flags(index_type),
                offset,
                instances,
            )
        }
    }

    fn viewport(&self, viewport: Viewport) {
        unsafe {
            self.gl
                .viewport(viewport.x, viewport.y, viewport.width, viewport.height)
        }
    }

    fn compile_shader(&self, stage: ShaderStage, source: &str) -> GpuResult<ShaderHandle> {
        let kind = match stage {
            ShaderStage::Vertex => glow::VERTEX_SHADER,
            ShaderStage::Fragment => glow::FRAGMENT_SHADER,
        };
        unsafe {
            let shader = self
                .gl
                .create_shader(kind)
                .map_err(|log| GpuError::CompileFailed { stage, log })?;
            self.gl.shader_source(shader, source);
            self.gl.compile_shader(shader);
            if !self.gl.get_shader_compile_status(shader) {
                let log = self.gl.get_shader_info_log(shader);
                self.gl.delete_shader(shader);
                return Err(GpuError::CompileFailed { stage, log });
            }
            Ok(ShaderHandle(shader.0))
        }
    }

    fn delete_shader(&self, shader: ShaderHandle) {
        unsafe { self.gl.delete_shader(glow::NativeShader(shader.0)) }
    }

    fn link_program(
        &self,
        vertex: ShaderHandle,
        fragment: ShaderHandle,
        attribute_bindings: &[(u32, &str)],
    ) -> GpuResult<ProgramHandle> {
        unsafe {
            let program = self.gl.create_program().map_err(GpuError::LinkFailed)?;
            self.gl.attach_shader(program, glow::NativeShader(vertex.0));
            self.gl.attach_shader(program, glow::NativeShader(fragment.0));
            for &(slot, name) in attribute_bindings {
                self.gl.bind_attrib_location(program, slot, name);
            }
            self.gl.link_program(program);
            if !self.gl.get_program_link_status(program) {
                let log = self.gl.get_program_info_log(program);
                self.gl.delete_program(program);
                return Err(GpuError::LinkFailed(log));
            }
            Ok(ProgramHandle(program.0))
        }
    }

    fn delete_program(&self, program: ProgramHandle) {
        unsafe { self.gl.delete_program(glow::NativeProgram(program.0)) }
    }

    fn use_program(&self, program: Option<ProgramHandle>) {
        unsafe {
            self.gl
                .use_program(program.map(|p| glow::NativeProgram(p.0)))
        }
    }

    fn uniform_location(&self, program: ProgramHandle, name: &str) -> Option<UniformLocation> {
        unsafe {
            self.gl
                .get_uniform_location(glow::NativeProgram(program.0), name)
        }
        .map(|location| UniformLocation(location.0))
    }

    fn set_uniform(&self, location: UniformLocation, value: UniformValue<'_>) {
        let location = glow::NativeUniformLocation(location.0);
        let location = Some(&location);
        unsafe {
            match value {
                UniformValue::Int(v) => self.gl.uniform_1_i32(location, v),
                UniformValue::Float(v) => self.gl.uniform_1_f32(location, v),
                UniformValue::Vec2(v) => self.gl.uniform_2_f32_slice(location, &v.to_array()),
                UniformValue::Vec3(v) => self.gl.uniform_3_f32_slice(location, &v.to_array()),
                UniformValue::Vec4(v) => self.gl.uniform_4_f32_slice(location, &v.to_array()),
                UniformValue::Mat4(m) => {
                    self.gl
                        .uniform_matrix_4_f32_slice(location, false, &m.to_cols_array())
                }
                UniformValue::Vec4Array(values) => self
                    .gl
                    .uniform_4_f32_slice(location, bytemuck::cast_slice(values)),
            }
        }
    }
}
