use std::rc::Rc;

use crate::gpu::{BufferHandle, GraphicsApi, VertexArrayHandle};

use super::vertex::{self, VertexFormat};

/// Where a mesh's attribute state comes from at draw time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VertexBinding {
    /// Attribute state was baked into a vertex array object at load time.
    VertexArray(VertexArrayHandle),
    /// No VAO available: attributes are pointed at the buffer on every draw.
    Direct(BufferHandle),
}

impl VertexBinding {
    pub fn select(vao: Option<VertexArrayHandle>, vbo: BufferHandle) -> Self {
        match vao {
            Some(vao) => VertexBinding::VertexArray(vao),
            None => VertexBinding::Direct(vbo),
        }
    }

    /// Binds attribute state. It stays bound until the guard is dropped.
    pub fn bind<'a>(
        self,
        api: &Rc<dyn GraphicsApi>,
        format: &'a VertexFormat,
        vertex_size: usize,
    ) -> BoundAttributes<'a> {
        match self {
            VertexBinding::VertexArray(vao) => api.bind_vertex_array(Some(vao)),
            VertexBinding::Direct(vbo) => {
                vertex::set_attributes(api.as_ref(), vbo, format, vertex_size, 0);
            }
        }
        BoundAttributes {
            api: Rc::clone(api),
            binding: self,
            format,
        }
    }
}

/// Guard for bound attribute state; unbinds on drop.
pub struct BoundAttributes<'a> {
    api: Rc<dyn GraphicsApi>,
    binding: VertexBinding,
    format: &'a VertexFormat,
}

impl BoundAttributes<'_> {
    pub fn binding(&self) -> VertexBinding {
        self.binding
    }
}

impl Drop for BoundAttributes<'_> {
    fn drop(&mut self) {
        match self.binding {
            VertexBinding::VertexArray(_) => self.api.bind_vertex_array(None),
            VertexBinding::Direct(_) => vertex::unset_attributes(self.api.as_ref(), self.format),
        }
    }
}
