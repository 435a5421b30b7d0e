use std::rc::Rc;

use glam::Vec4;

use crate::renderer::Renderer;
use crate::shader::Shader;

/// Per-index-range render state applied right before the range is drawn.
pub trait Material {
    fn name(&self) -> &str;

    fn set(&self, renderer: &mut Renderer);
}

/// A flat base color, optionally pushed through a shader when applied.
#[derive(Debug)]
pub struct BasicMaterial {
    pub name: String,
    pub base_color: Vec4,
    pub shader: Option<Rc<Shader>>,
}

impl BasicMaterial {
    pub fn new(name: impl Into<String>, base_color: Vec4) -> Self {
        Self {
            name: name.into(),
            base_color,
            shader: None,
        }
    }

    pub fn with_shader(mut self, shader: Rc<Shader>) -> Self {
        self.shader = Some(shader);
        self
    }
}

impl Material for BasicMaterial {
    fn name(&self) -> &str {
        &self.name
    }

    fn set(&self, renderer: &mut Renderer) {
        renderer.set_color(self.base_color);
        if let Some(shader) = &self.shader {
            shader.set(renderer);
        }
    }
}
