use std::fmt;
use std::rc::Rc;

use super::{BufferHandle, GraphicsApi, ProgramHandle, ShaderHandle, VertexArrayHandle};

/// A raw handle that knows how to give itself back to the API.
pub trait GpuObject: Copy + fmt::Debug {
    fn release(self, api: &dyn GraphicsApi);
}

impl GpuObject for BufferHandle {
    fn release(self, api: &dyn GraphicsApi) {
        api.delete_buffer(self);
    }
}

impl GpuObject for VertexArrayHandle {
    fn release(self, api: &dyn GraphicsApi) {
        api.delete_vertex_array(self);
    }
}

impl GpuObject for ShaderHandle {
    fn release(self, api: &dyn GraphicsApi) {
        api.delete_shader(self);
    }
}

impl GpuObject for ProgramHandle {
    fn release(self, api: &dyn GraphicsApi) {
        api.delete_program(self);
    }
}

/// Exclusive owner of one GPU object. The object is released exactly once,
/// when the owner is dropped. Not `Clone`.
pub struct GpuResource<T: GpuObject> {
    api: Rc<dyn GraphicsApi>,
    handle: T,
}

impl<T: GpuObject> GpuResource<T> {
    pub fn new(api: Rc<dyn GraphicsApi>, handle: T) -> Self {
        Self { api, handle }
    }

    pub fn handle(&self) -> T {
        self.handle
    }
}

impl<T: GpuObject> Drop for GpuResource<T> {
    fn drop(&mut self) {
        log::debug!("Releasing {:?}", self.handle);
        self.handle.release(self.api.as_ref());
    }
}

impl<T: GpuObject> fmt::Debug for GpuResource<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("GpuResource").field(&self.handle).finish()
    }
}
