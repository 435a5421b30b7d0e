use std::cell::{Cell, RefCell};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::num::NonZeroU32;

use super::{
    BufferHandle, BufferTarget, BufferUsage, FeatureLevel, GpuError, GpuResult, GraphicsApi,
    IndexType, Primitive, ProgramHandle, ScalarType, ShaderHandle, ShaderStage, UniformLocation,
    UniformValue, VertexArrayHandle, Viewport,
};

/// One call received by a [`RecordingApi`].
#[derive(Debug, Clone, PartialEq)]
pub enum GpuCall {
    CreateBuffer(BufferHandle),
    DeleteBuffer(BufferHandle),
    BindBuffer(BufferTarget, Option<BufferHandle>),
    BufferData {
        target: BufferTarget,
        len: usize,
        usage: BufferUsage,
    },
    CreateVertexArray(VertexArrayHandle),
    DeleteVertexArray(VertexArrayHandle),
    BindVertexArray(Option<VertexArrayHandle>),
    EnableVertexAttrib(u32),
    DisableVertexAttrib(u32),
    VertexAttribPointer {
        slot: u32,
        components: i32,
        scalar: ScalarType,
        normalized: bool,
        stride: i32,
        offset: i32,
    },
    DrawArrays {
        primitive: Primitive,
        first: i32,
        count: i32,
    },
    DrawElements {
        primitive: Primitive,
        count: i32,
        index_type: IndexType,
    },
    DrawElementsInstanced {
        primitive: Primitive,
        count: i32,
        index_type: IndexType,
        instances: i32,
    },
    Viewport(Viewport),
    CompileShader(ShaderStage, ShaderHandle),
    DeleteShader(ShaderHandle),
    LinkProgram(ProgramHandle),
    DeleteProgram(ProgramHandle),
    UseProgram(Option<ProgramHandle>),
    UniformInt(UniformLocation, i32),
    UniformFloats(UniformLocation, Vec<f32>),
}

impl GpuCall {
    pub fn is_draw(&self) -> bool {
        matches!(
            self,
            GpuCall::DrawArrays { .. }
                | GpuCall::DrawElements { .. }
                | GpuCall::DrawElementsInstanced { .. }
        )
    }
}

/// Headless [`GraphicsApi`] that records every call and tracks which objects
/// are alive. Shader "compilation" accepts any source with a `main` entry
/// point, and a linked program exposes the uniforms declared in its sources.
pub struct RecordingApi {
    feature_level: FeatureLevel,
    next_id: Cell<u32>,
    calls: RefCell<Vec<GpuCall>>,
    enabled_attributes: RefCell<BTreeSet<u32>>,
    live_buffers: RefCell<HashSet<BufferHandle>>,
    live_vertex_arrays: RefCell<HashSet<VertexArrayHandle>>,
    live_shaders: RefCell<HashSet<ShaderHandle>>,
    live_programs: RefCell<HashSet<ProgramHandle>>,
    shader_sources: RefCell<HashMap<ShaderHandle, String>>,
    program_uniforms: RefCell<HashMap<ProgramHandle, Vec<String>>>,
}

impl RecordingApi {
    pub fn new(feature_level: FeatureLevel) -> Self {
        Self {
            feature_level,
            next_id: Cell::new(1),
            calls: RefCell::new(Vec::new()),
            enabled_attributes: RefCell::new(BTreeSet::new()),
            live_buffers: RefCell::new(HashSet::new()),
            live_vertex_arrays: RefCell::new(HashSet::new()),
            live_shaders: RefCell::new(HashSet::new()),
            live_programs: RefCell::new(HashSet::new()),
            shader_sources: RefCell::new(HashMap::new()),
            program_uniforms: RefCell::new(HashMap::new()),
        }
    }

    pub fn calls(&self) -> Vec<GpuCall> {
        self.calls.borrow().clone()
    }

    pub fn take_calls(&self) -> Vec<GpuCall> {
        std::mem::take(&mut *self.calls.borrow_mut())
    }

    pub fn draw_calls(&self) -> Vec<GpuCall> {
        self.calls
            .borrow()
            .iter()
            .filter(|call| call.is_draw())
            .cloned()
            .collect()
    }

    pub fn enabled_attributes(&self) -> BTreeSet<u32> {
        self.enabled_attributes.borrow().clone()
    }

    pub fn live_buffer_count(&self) -> usize {
        self.live_buffers.borrow().len()
    }

    pub fn live_vertex_array_count(&self) -> usize {
        self.live_vertex_arrays.borrow().len()
    }

    pub fn live_shader_count(&self) -> usize {
        self.live_shaders.borrow().len()
    }

    pub fn live_program_count(&self) -> usize {
        self.live_programs.borrow().len()
    }

    pub fn is_program_live(&self, program: ProgramHandle) -> bool {
        self.live_programs.borrow().contains(&program)
    }

    fn record(&self, call: GpuCall) {
        self.calls.borrow_mut().push(call);
    }

    fn allocate(&self) -> NonZeroU32 {
        let id = self.next_id.get();
        self.next_id.set(id + 1);
        NonZeroU32::new(id).unwrap_or(NonZeroU32::MIN)
    }
}

impl Default for RecordingApi {
    fn default() -> Self {
        Self::new(FeatureLevel::Level30)
    }
}

/// Names declared by `uniform` statements, in order of first appearance.
fn declared_uniforms(source: &str, names: &mut Vec<String>) {
    for line in source.lines() {
        let Some(declaration) = line.trim().strip_prefix("uniform ") else {
            continue;
        };
        let declaration = declaration.split(';').next().unwrap_or_default();
        let mut parts = declaration.split(',');
        let first = parts
            .next()
            .and_then(|part| part.split_whitespace().last());
        for name in first.into_iter().chain(parts.map(str::trim)) {
            let name = name.split('[').next().unwrap_or_default().trim();
            if !name.is_empty() && !names.iter().any(|n| n == name) {
                names.push(name.to_string());
            }
        }
    }
}

impl GraphicsApi for RecordingApi {
    fn feature_level(&self) -> FeatureLevel {
        self.feature_level
    }

    fn create_buffer(&self) -> GpuResult<BufferHandle> {
        let buffer = BufferHandle(self.allocate());
        self.live_buffers.borrow_mut().insert(buffer);
        self.record(GpuCall::CreateBuffer(buffer));
        Ok(buffer)
    }

    fn delete_buffer(&self, buffer: BufferHandle) {
        if !self.live_buffers.borrow_mut().remove(&buffer) {
            log::warn!("Deleting buffer {:?} that is not alive", buffer);
        }
        self.record(GpuCall::DeleteBuffer(buffer));
    }

    fn bind_buffer(&self, target: BufferTarget, buffer: Option<BufferHandle>) {
        self.record(GpuCall::BindBuffer(target, buffer));
    }

    fn buffer_data(&self, target: BufferTarget, data: &[u8], usage: BufferUsage) {
        self.record(GpuCall::BufferData {
            target,
            len: data.len(),
            usage,
        });
    }

    fn create_vertex_array(&self) -> GpuResult<VertexArrayHandle> {
        let vao = VertexArrayHandle(self.allocate());
        self.live_vertex_arrays.borrow_mut().insert(vao);
        self.record(GpuCall::CreateVertexArray(vao));
        Ok(vao)
    }

    fn delete_vertex_array(&self, vertex_array: VertexArrayHandle) {
        if !self.live_vertex_arrays.borrow_mut().remove(&vertex_array) {
            log::warn!("Deleting vertex array {:?} that is not alive", vertex_array);
        }
        self.record(GpuCall::DeleteVertexArray(vertex_array));
    }

    fn bind_vertex_array(&self, vertex_array: Option<VertexArrayHandle>) {
        self.record(GpuCall::BindVertexArray(vertex_array));
    }

    fn enable_vertex_attrib(&self, slot: u32) {
        self.enabled_attributes.borrow_mut().insert(slot);
        self.record(GpuCall::EnableVertexAttrib(slot));
    }

    fn disable_vertex_attrib(&self, slot: u32) {
        self.enabled_attributes.borrow_mut().remove(&slot);
        self.record(GpuCall::DisableVertexAttrib(slot));
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
        self.record(GpuCall::VertexAttribPointer {
            slot,
            components,
            scalar,
            normalized,
            stride,
            offset,
        });
    }

    fn draw_arrays(&self, primitive: Primitive, first: i32, count: i32) {
        self.record(GpuCall::DrawArrays {
            primitive,
            first,
            count,
        });
    }

    fn draw_elements(&self, primitive: Primitive, count: i32, index_type: IndexType, _offset: i32) {
        self.record(GpuCall::DrawElements {
            primitive,
            count,
            index_type,
        });
    }

    fn draw_elements_instanced(
        &self,
        primitive: Primitive,
        count: i32,
        index_type: IndexType,
        _offset: i32,
        instances: i32,
    ) {
        self.record(GpuCall::DrawElementsInstanced {
            primitive,
            count,
            index_type,
            instances,
        });
    }

    fn viewport(&self, viewport: Viewport) {
        self.record(GpuCall::Viewport(viewport));
    }

    fn compile_shader(&self, stage: ShaderStage, source: &str) -> GpuResult<ShaderHandle> {
        if !source.contains("main") {
            return Err(GpuError::CompileFailed {
                stage,
                log: "no entry point 'main' found".to_string(),
            });
        }
        let shader = ShaderHandle(self.allocate());
        self.live_shaders.borrow_mut().insert(shader);
        self.shader_sources
            .borrow_mut()
            .insert(shader, source.to_string());
        self.record(GpuCall::CompileShader(stage, shader));
        Ok(shader)
    }

    fn delete_shader(&self, shader: ShaderHandle) {
        if !self.live_shaders.borrow_mut().remove(&shader) {
            log::warn!("Deleting shader {:?} that is not alive", shader);
        }
        self.record(GpuCall::DeleteShader(shader));
    }

    fn link_program(
        &self,
        vertex: ShaderHandle,
        fragment: ShaderHandle,
        _attribute_bindings: &[(u32, &str)],
    ) -> GpuResult<ProgramHandle> {
        let mut uniforms = Vec::new();
        {
            let sources = self.shader_sources.borrow();
            for shader in [vertex, fragment] {
                let source = sources.get(&shader).ok_or_else(|| {
                    GpuError::LinkFailed(format!("shader {:?} is not compiled", shader))
                })?;
                declared_uniforms(source, &mut uniforms);
            }
        }
        let program = ProgramHandle(self.allocate());
        self.live_programs.borrow_mut().insert(program);
        self.program_uniforms.borrow_mut().insert(program, uniforms);
        self.record(GpuCall::LinkProgram(program));
        Ok(program)
    }

    fn delete_program(&self, program: ProgramHandle) {
        if !self.live_programs.borrow_mut().remove(&program) {
            log::warn!("Deleting program {:?} that is not alive", program);
        }
        self.record(GpuCall::DeleteProgram(program));
    }

    fn use_program(&self, program: Option<ProgramHandle>) {
        self.record(GpuCall::UseProgram(program));
    }

    fn uniform_location(&self, program: ProgramHandle, name: &str) -> Option<UniformLocation> {
        self.program_uniforms
            .borrow()
            .get(&program)?
            .iter()
            .position(|uniform| uniform == name)
            .map(|index| UniformLocation(index as u32))
    }

    fn set_uniform(&self, location: UniformLocation, value: UniformValue<'_>) {
        let call = match value {
            UniformValue::Int(v) => GpuCall::UniformInt(location, v),
            UniformValue::Float(v) => GpuCall::UniformFloats(location, vec![v]),
            UniformValue::Vec2(v) => GpuCall::UniformFloats(location, v.to_array().to_vec()),
            UniformValue::Vec3(v) => GpuCall::UniformFloats(location, v.to_array().to_vec()),
            UniformValue::Vec4(v) => GpuCall::UniformFloats(location, v.to_array().to_vec()),
            UniformValue::Mat4(m) => GpuCall::UniformFloats(location, m.to_cols_array().to_vec()),
            UniformValue::Vec4Array(values) => {
                GpuCall::UniformFloats(location, bytemuck::cast_slice(values).to_vec())
            }
        };
        self.record(call);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_declared_uniforms() {
        let mut names = Vec::new();
        declared_uniforms(
            "uniform mat4 model_view_projection;\n\
             uniform lowp vec4 color;\n\
             uniform vec4 bone_transforms[96];\n\
             uniform float a, b;\n\
             void main() {}\n",
            &mut names,
        );
        assert_eq!(
            names,
            vec!["model_view_projection", "color", "bone_transforms", "a", "b"]
        );
    }

    #[test]
    fn test_compile_requires_main() {
        let api = RecordingApi::default();
        assert!(api.compile_shader(ShaderStage::Vertex, "uniform float t;").is_err());
        assert_eq!(api.live_shader_count(), 0);
        assert!(api.compile_shader(ShaderStage::Vertex, "void main() {}").is_ok());
        assert_eq!(api.live_shader_count(), 1);
    }

    #[test]
    fn test_uniform_lookup_per_program() {
        let api = RecordingApi::default();
        let vs = api
            .compile_shader(ShaderStage::Vertex, "uniform mat4 model;\nvoid main() {}")
            .unwrap();
        let fs = api
            .compile_shader(ShaderStage::Fragment, "uniform vec4 color;\nvoid main() {}")
            .unwrap();
        let program = api.link_program(vs, fs, &[]).unwrap();
        assert_eq!(api.uniform_location(program, "model"), Some(UniformLocation(0)));
        assert_eq!(api.uniform_location(program, "color"), Some(UniformLocation(1)));
        assert_eq!(api.uniform_location(program, "time"), None);
    }
}
