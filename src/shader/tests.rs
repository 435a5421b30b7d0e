use super::*;
use std::cell::Cell;
use std::rc::Rc;

use assert_fs::prelude::*;
use glam::{Mat4, Vec3, Vec4};
use test_log::test;

use crate::gpu::{GpuCall, RecordingApi, ShaderStage};
use crate::renderer::{AffineTransform, Renderer};

const VERTEX: &str = "#version 300 es\n\
                      uniform mat4 model_view_projection;\n\
                      uniform vec4 bone_transforms[24];\n\
                      void main() {}\n";
const FRAGMENT: &str = "#version 300 es\n\
                        uniform lowp vec4 color;\n\
                        uniform float time;\n\
                        uniform sampler2D texture_unit_0;\n\
                        uniform sampler2D texture_unit_3;\n\
                        void main() {}\n";

fn setup() -> (Rc<RecordingApi>, Renderer) {
    let recorder = Rc::new(RecordingApi::default());
    let renderer = Renderer::new(recorder.clone(), None);
    (recorder, renderer)
}

fn write_shader(dir: &assert_fs::TempDir, name: &str, vertex: &str, fragment: &str) -> PathBuf {
    dir.child(format!("{}.glslv", name)).write_str(vertex).unwrap();
    dir.child(format!("{}.glslf", name)).write_str(fragment).unwrap();
    dir.path().join(name)
}

fn uniform_calls(calls: &[GpuCall]) -> Vec<GpuCall> {
    calls
        .iter()
        .filter(|call| matches!(call, GpuCall::UniformInt(..) | GpuCall::UniformFloats(..)))
        .cloned()
        .collect()
}

#[test]
fn test_initialize_uniforms_resolves_declared_names() {
    let (_, mut renderer) = setup();
    let shader = renderer.compile_and_link_shader(VERTEX, FRAGMENT).unwrap();

    let uniforms = shader.uniforms();
    assert_eq!(uniforms.model_view_projection, Some(UniformLocation(0)));
    assert_eq!(uniforms.bone_transforms, Some(UniformLocation(1)));
    assert_eq!(uniforms.color, Some(UniformLocation(2)));
    assert_eq!(uniforms.time, Some(UniformLocation(3)));
    assert_eq!(uniforms.model, None);
    assert_eq!(uniforms.light_pos, None);
    assert_eq!(uniforms.camera_pos, None);
}

#[test]
fn test_texture_units_bound_once() {
    let (recorder, mut renderer) = setup();
    let shader = renderer.compile_and_link_shader(VERTEX, FRAGMENT).unwrap();

    assert_eq!(shader.texture_unit(0), Some(UniformLocation(4)));
    assert_eq!(shader.texture_unit(1), None);
    assert_eq!(shader.texture_unit(3), Some(UniformLocation(5)));
    assert_eq!(shader.texture_unit(MAX_TEXTURES_PER_SHADER), None);
    assert_eq!(
        uniform_calls(&recorder.calls()),
        vec![
            GpuCall::UniformInt(UniformLocation(4), 0),
            GpuCall::UniformInt(UniformLocation(5), 3),
        ]
    );

    recorder.take_calls();
    shader.set(&renderer);
    assert!(!recorder
        .calls()
        .iter()
        .any(|call| matches!(call, GpuCall::UniformInt(..))));
}

#[test]
fn test_set_pushes_only_resolved_uniforms() {
    let (recorder, mut renderer) = setup();
    let shader = renderer.compile_and_link_shader(VERTEX, FRAGMENT).unwrap();
    let mvp = Mat4::from_translation(Vec3::new(1.0, 2.0, 3.0));
    renderer.set_model_view_projection(mvp);
    renderer.set_color(Vec4::new(0.5, 0.25, 1.0, 1.0));
    renderer.set_time(2.5);
    renderer.set_light_pos(Vec3::ONE);

    recorder.take_calls();
    shader.set(&renderer);
    let calls = recorder.calls();
    assert_eq!(calls[0], GpuCall::UseProgram(shader.program()));
    // No bones set, so no bone upload.
    assert_eq!(
        uniform_calls(&calls),
        vec![
            GpuCall::UniformFloats(UniformLocation(0), mvp.to_cols_array().to_vec()),
            GpuCall::UniformFloats(UniformLocation(2), vec![0.5, 0.25, 1.0, 1.0]),
            GpuCall::UniformFloats(UniformLocation(3), vec![2.5]),
        ]
    );
}

#[test]
fn test_set_uploads_bone_transforms() {
    let (recorder, mut renderer) = setup();
    let shader = renderer.compile_and_link_shader(VERTEX, FRAGMENT).unwrap();
    let moved = AffineTransform::from_mat4(&Mat4::from_translation(Vec3::new(4.0, 5.0, 6.0)));
    renderer.set_bone_transforms(&[AffineTransform::IDENTITY, moved]);

    recorder.take_calls();
    shader.set(&renderer);
    let bones = recorder
        .calls()
        .into_iter()
        .find_map(|call| match call {
            GpuCall::UniformFloats(UniformLocation(1), values) => Some(values),
            _ => None,
        })
        .unwrap();
    assert_eq!(bones.len(), 2 * 12);
    assert_eq!(bones[12..16], [1.0f32, 0.0, 0.0, 4.0]);
}

#[test]
fn test_set_uniform_by_name() {
    let (recorder, mut renderer) = setup();
    let shader = renderer.compile_and_link_shader(VERTEX, FRAGMENT).unwrap();
    let api = renderer.api().as_ref();

    assert_eq!(shader.find_uniform(api, "time"), Some(UniformLocation(3)));
    assert!(shader.set_uniform(api, "time", UniformValue::Float(1.0)));
    assert_eq!(
        recorder.calls().last(),
        Some(&GpuCall::UniformFloats(UniformLocation(3), vec![1.0]))
    );
    assert!(!shader.set_uniform(api, "fog_density", UniformValue::Float(1.0)));
    assert!(!Shader::new().set_uniform(api, "time", UniformValue::Float(1.0)));
}

#[test]
fn test_load_shader_from_files() {
    let (_, mut renderer) = setup();
    let temp = assert_fs::TempDir::new().unwrap();
    let base = write_shader(&temp, "lit", VERTEX, FRAGMENT);

    let shader = renderer
        .load_shader(&base, &["SKINNED".to_string()])
        .unwrap();
    assert!(shader.is_valid());
    assert_eq!(shader.basename(), base.as_path());
    assert_eq!(shader.defines(), &["SKINNED".to_string()]);
    assert_eq!(shader.uniforms().color, Some(UniformLocation(2)));
}

#[test]
fn test_reload_replaces_program() {
    let (recorder, mut renderer) = setup();
    let temp = assert_fs::TempDir::new().unwrap();
    let base = write_shader(&temp, "lit", VERTEX, FRAGMENT);
    let mut shader = renderer.load_shader(&base, &[]).unwrap();
    let old = shader.program().unwrap();

    let other = write_shader(&temp, "flat", "void main() {}", "uniform vec4 color;\nvoid main() {}");
    shader.reload(&mut renderer, &other, &[]).unwrap();

    let new = shader.program().unwrap();
    assert_ne!(old, new);
    assert!(!recorder.is_program_live(old));
    assert!(recorder.is_program_live(new));
    assert_eq!(recorder.live_shader_count(), 2);
    assert_eq!(shader.uniforms().color, Some(UniformLocation(0)));
    assert_eq!(shader.uniforms().model_view_projection, None);
}

#[test]
fn test_reload_missing_file_keeps_program() {
    let (recorder, mut renderer) = setup();
    let temp = assert_fs::TempDir::new().unwrap();
    let base = write_shader(&temp, "lit", VERTEX, FRAGMENT);
    let mut shader = renderer.load_shader(&base, &[]).unwrap();
    let program = shader.program().unwrap();
    let uniforms = *shader.uniforms();

    let result = shader.reload(&mut renderer, temp.path().join("missing"), &[]);
    assert!(matches!(result, Err(ShaderError::Io { .. })));
    assert_eq!(shader.program(), Some(program));
    assert_eq!(*shader.uniforms(), uniforms);
    assert!(recorder.is_program_live(program));
    assert!(renderer.last_error().contains("missing.glslv"));
}

#[test]
fn test_reload_compile_failure_keeps_program() {
    let (recorder, mut renderer) = setup();
    let temp = assert_fs::TempDir::new().unwrap();
    let base = write_shader(&temp, "lit", VERTEX, FRAGMENT);
    let mut shader = renderer.load_shader(&base, &[]).unwrap();
    let program = shader.program().unwrap();

    let broken = write_shader(&temp, "broken", VERTEX, "uniform vec4 color;\n");
    let result = shader.reload(&mut renderer, &broken, &[]);
    assert!(matches!(result, Err(ShaderError::Gpu(_))));
    assert_eq!(shader.program(), Some(program));
    assert!(recorder.is_program_live(program));
    assert!(renderer.last_error().contains("Fragment"));
    // Only the original pair survives.
    assert_eq!(recorder.live_shader_count(), 2);
}

#[test]
fn test_load_then_finalize() {
    let (_, mut renderer) = setup();
    let temp = assert_fs::TempDir::new().unwrap();
    let base = write_shader(&temp, "lit", VERTEX, FRAGMENT);

    let finalized = Rc::new(Cell::new(0));
    let mut shader = Shader::with_source(&base, &["FOG".to_string()]);
    let counter = Rc::clone(&finalized);
    shader.set_finalize_callback(move |shader| {
        assert!(shader.is_valid());
        counter.set(counter.get() + 1);
    });

    assert!(!shader.is_valid());
    shader.load();
    assert!(shader.is_load_pending());
    assert!(shader.finalize(&mut renderer).unwrap());
    assert!(!shader.is_load_pending());
    assert!(shader.is_valid());
    assert_eq!(finalized.get(), 1);

    assert!(!shader.finalize(&mut renderer).unwrap());
    assert_eq!(finalized.get(), 1);
}

#[test]
fn test_finalize_reports_load_failure() {
    let (_, mut renderer) = setup();
    let temp = assert_fs::TempDir::new().unwrap();
    let mut shader = Shader::with_source(temp.path().join("nothing"), &[]);
    shader.load();

    let result = shader.finalize(&mut renderer);
    assert!(matches!(result, Err(ShaderError::Io { .. })));
    assert!(!shader.is_valid());
    assert!(!renderer.last_error().is_empty());
}

#[test]
fn test_load_source_file_applies_defines() {
    let temp = assert_fs::TempDir::new().unwrap();
    let base = write_shader(&temp, "lit", VERTEX, FRAGMENT);
    let shader = Shader::with_source(&base, &["SKINNED".to_string()]);

    let source = shader.load_source_file().unwrap();
    assert!(source.vertex.starts_with("#version 300 es\n#define SKINNED\n"));
    assert!(source.fragment.starts_with("#version 300 es\n#define SKINNED\n"));
}

#[test]
fn test_clear_is_idempotent() {
    let (recorder, mut renderer) = setup();
    let mut shader = renderer.compile_and_link_shader(VERTEX, FRAGMENT).unwrap();
    assert_eq!(recorder.live_program_count(), 1);

    shader.clear();
    assert!(!shader.is_valid());
    assert_eq!(shader.uniforms(), &UniformLocations::default());
    assert_eq!(recorder.live_program_count(), 0);
    assert_eq!(recorder.live_shader_count(), 0);

    recorder.take_calls();
    shader.clear();
    drop(shader);
    assert!(recorder.calls().is_empty());
}

#[test]
fn test_init_adopts_objects() {
    let (recorder, renderer) = setup();
    let api = renderer.api();
    let vs = api.compile_shader(ShaderStage::Vertex, VERTEX).unwrap();
    let fs = api.compile_shader(ShaderStage::Fragment, FRAGMENT).unwrap();
    let program = api.link_program(vs, fs, &[]).unwrap();

    let mut shader = Shader::new();
    shader.init(
        GpuResource::new(Rc::clone(api), program),
        GpuResource::new(Rc::clone(api), vs),
        GpuResource::new(Rc::clone(api), fs),
        &["SKINNED".to_string()],
    );
    assert_eq!(shader.program(), Some(program));
    assert_eq!(shader.uniforms().color, None);

    shader.initialize_uniforms(api.as_ref());
    assert_eq!(shader.uniforms().color, Some(UniformLocation(2)));

    drop(shader);
    assert_eq!(recorder.live_program_count(), 0);
    assert_eq!(recorder.live_shader_count(), 0);
}
