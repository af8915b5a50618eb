// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Fixed-capacity GPU buffers with a CPU-side shadow copy.

use crate::renderer::api::gl;
use crate::renderer::error::ResourceError;
use crate::renderer::traits::GlDevice;
use bytemuck::{Pod, Zeroable};
use std::mem::size_of;

/// A buffer object whose storage is allocated once at `capacity` elements.
///
/// Writes go to the shadow copy and mark it dirty; the GPU copy is refreshed
/// on the next bind, or immediately while bound. The shadow copy is also what
/// a reload after context loss re-uploads.
#[derive(Debug)]
pub(crate) struct GpuBuffer<T: Pod> {
    target: u32,
    usage: u32,
    handle: u32,
    data: Vec<T>,
    capacity: usize,
    dirty: bool,
    bound: bool,
}

impl<T: Pod> GpuBuffer<T> {
    /// Allocates the buffer. A zero capacity creates no GPU object.
    pub(crate) fn new(
        gl: &dyn GlDevice,
        target: u32,
        capacity: usize,
        is_static: bool,
    ) -> Result<Self, ResourceError> {
        let mut buffer = Self {
            target,
            usage: if is_static { gl::STATIC_DRAW } else { gl::DYNAMIC_DRAW },
            handle: 0,
            data: Vec::with_capacity(capacity),
            capacity,
            dirty: false,
            bound: false,
        };
        buffer.allocate(gl)?;
        Ok(buffer)
    }

    fn allocate(&mut self, gl: &dyn GlDevice) -> Result<(), ResourceError> {
        if self.capacity == 0 {
            return Ok(());
        }
        let handle = gl.gen_buffer();
        if handle == 0 {
            return Err(ResourceError::HandleAllocation("buffer"));
        }
        gl.bind_buffer(self.target, handle);
        gl.buffer_data(self.target, self.capacity * size_of::<T>(), None, self.usage);
        gl.bind_buffer(self.target, 0);
        log::debug!(
            "Created buffer {handle} ({} x {} bytes)",
            self.capacity,
            size_of::<T>()
        );
        self.handle = handle;
        self.dirty = !self.data.is_empty();
        Ok(())
    }

    /// Recreates the GPU object after a context loss and schedules a re-upload.
    pub(crate) fn reload(&mut self, gl: &dyn GlDevice) -> Result<(), ResourceError> {
        self.handle = 0;
        self.bound = false;
        self.allocate(gl)
    }

    pub(crate) fn handle(&self) -> u32 {
        self.handle
    }

    pub(crate) fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of populated elements.
    pub(crate) fn len(&self) -> usize {
        self.data.len()
    }

    pub(crate) fn as_slice(&self) -> &[T] {
        &self.data
    }

    /// Replaces the contents.
    pub(crate) fn set(&mut self, gl: &dyn GlDevice, src: &[T]) -> Result<(), ResourceError> {
        if src.len() > self.capacity {
            return Err(ResourceError::InsufficientCapacity {
                needed: src.len(),
                available: self.capacity,
            });
        }
        self.data.clear();
        self.data.extend_from_slice(src);
        self.changed(gl);
        Ok(())
    }

    /// Overwrites elements starting at `offset`, growing the populated extent if needed.
    pub(crate) fn update(
        &mut self,
        gl: &dyn GlDevice,
        offset: usize,
        src: &[T],
    ) -> Result<(), ResourceError> {
        let end = offset + src.len();
        if end > self.capacity {
            return Err(ResourceError::IndexOutOfRange {
                offset,
                count: src.len(),
                len: self.capacity,
            });
        }
        if end > self.data.len() {
            self.data.resize(end, <T as Zeroable>::zeroed());
        }
        self.data[offset..end].copy_from_slice(src);
        self.changed(gl);
        Ok(())
    }

    /// Copies `count` populated elements from `offset` into `dest[dest_offset..]`.
    pub(crate) fn read(
        &self,
        offset: usize,
        count: usize,
        dest: &mut [T],
        dest_offset: usize,
    ) -> Result<(), ResourceError> {
        if offset + count > self.data.len() {
            return Err(ResourceError::IndexOutOfRange {
                offset,
                count,
                len: self.data.len(),
            });
        }
        let available = dest.len().saturating_sub(dest_offset);
        if count > available {
            return Err(ResourceError::InsufficientCapacity {
                needed: count,
                available,
            });
        }
        dest[dest_offset..dest_offset + count].copy_from_slice(&self.data[offset..offset + count]);
        Ok(())
    }

    fn changed(&mut self, gl: &dyn GlDevice) {
        self.dirty = true;
        if self.bound {
            self.upload(gl);
        }
    }

    fn upload(&mut self, gl: &dyn GlDevice) {
        if self.handle == 0 {
            return;
        }
        if !self.data.is_empty() {
            gl.buffer_sub_data(self.target, 0, bytemuck::cast_slice(&self.data));
            log::trace!("Uploaded {} elements to buffer {}", self.data.len(), self.handle);
        }
        self.dirty = false;
    }

    /// Binds the buffer, uploading pending changes.
    pub(crate) fn bind(&mut self, gl: &dyn GlDevice) {
        if self.handle == 0 {
            return;
        }
        gl.bind_buffer(self.target, self.handle);
        if self.dirty {
            self.upload(gl);
        }
        self.bound = true;
    }

    pub(crate) fn unbind(&mut self, gl: &dyn GlDevice) {
        if self.handle == 0 {
            return;
        }
        gl.bind_buffer(self.target, 0);
        self.bound = false;
    }

    pub(crate) fn dispose(&mut self, gl: &dyn GlDevice) {
        if self.handle == 0 {
            return;
        }
        if self.bound {
            gl.bind_buffer(self.target, 0);
        }
        gl.delete_buffer(self.handle);
        log::debug!("Deleted buffer {}", self.handle);
        self.handle = 0;
        self.bound = false;
    }

    /// Drops the handle without deleting it; it belonged to a lost context.
    pub(crate) fn forget(&mut self) {
        self.handle = 0;
        self.bound = false;
    }
}
