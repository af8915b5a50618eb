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

//! Indexed, interleaved meshes.

use super::buffer::GpuBuffer;
use super::vertex_attribute::{VertexAttribute, VertexAttributes, VertexUsage};
use crate::math::{Aabb, Mat4, Vec3};
use crate::renderer::api::gl;
use crate::renderer::api::shader::ShaderProgram;
use crate::renderer::context::GraphicsContext;
use crate::renderer::error::ResourceError;
use crate::renderer::registry::{ManagedSlot, ResourceId, ResourceKind, ResourceState};
use std::fmt;
use std::rc::Rc;

/// Per-instance attributes and their buffer.
#[derive(Debug)]
struct InstanceData {
    attributes: VertexAttributes,
    buffer: GpuBuffer<f32>,
}

impl InstanceData {
    fn floats_per_instance(&self) -> usize {
        self.attributes.vertex_size() / 4
    }

    fn num_instances(&self) -> usize {
        self.buffer.len() / self.floats_per_instance()
    }
}

/// A vertex buffer, an optional 16-bit index buffer and an optional instance
/// buffer, all of fixed capacity.
///
/// Vertex data is handled as `f32` slots; packed colors occupy one slot.
/// Meshes are always managed: the CPU-side copies are re-uploaded on the next
/// bind after a context loss.
pub struct Mesh {
    ctx: GraphicsContext,
    slot: Rc<ManagedSlot>,
    is_static: bool,
    attributes: VertexAttributes,
    vertices: GpuBuffer<f32>,
    indices: GpuBuffer<u16>,
    instances: Option<InstanceData>,
    auto_bind: bool,
}

impl fmt::Debug for Mesh {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Mesh")
            .field("id", &self.slot.id())
            .field("state", &self.slot.state())
            .field("attributes", &self.attributes)
            .field("vertices", &self.num_vertices())
            .field("indices", &self.indices.len())
            .field("instanced", &self.instances.is_some())
            .finish()
    }
}

fn check_stride(attributes: &VertexAttributes) -> Result<(), ResourceError> {
    if attributes.vertex_size() % 4 != 0 {
        return Err(ResourceError::InvalidArgument(format!(
            "vertex size {} is not a multiple of 4 bytes",
            attributes.vertex_size()
        )));
    }
    Ok(())
}

impl Mesh {
    /// Allocates a mesh for at most `max_vertices` vertices and `max_indices` indices.
    pub fn new(
        ctx: &GraphicsContext,
        is_static: bool,
        max_vertices: usize,
        max_indices: usize,
        attributes: VertexAttributes,
    ) -> Result<Self, ResourceError> {
        check_stride(&attributes)?;
        let gl = ctx.gl();
        let floats = attributes.vertex_size() / 4;
        let vertices = GpuBuffer::new(gl, gl::ARRAY_BUFFER, max_vertices * floats, is_static)?;
        let indices = GpuBuffer::new(gl, gl::ELEMENT_ARRAY_BUFFER, max_indices, is_static)?;

        let slot = ctx.allocate_slot(ResourceKind::Mesh);
        slot.set_state(ResourceState::Ready);
        ctx.register(&slot);
        log::debug!(
            "Created mesh {} ({max_vertices} vertices of {} bytes, {max_indices} indices)",
            slot.id(),
            attributes.vertex_size()
        );
        Ok(Self {
            ctx: ctx.clone(),
            slot,
            is_static,
            attributes,
            vertices,
            indices,
            instances: None,
            auto_bind: true,
        })
    }

    /// Like [`new`](Self::new), deriving the layout from a list of attributes.
    pub fn with_attributes(
        ctx: &GraphicsContext,
        is_static: bool,
        max_vertices: usize,
        max_indices: usize,
        attributes: Vec<VertexAttribute>,
    ) -> Result<Self, ResourceError> {
        Self::new(ctx, is_static, max_vertices, max_indices, VertexAttributes::new(attributes)?)
    }

    // --- Accessors ---

    /// The id of this mesh within its context.
    pub fn id(&self) -> ResourceId {
        self.slot.id()
    }

    /// The lifecycle state.
    pub fn state(&self) -> ResourceState {
        self.slot.state()
    }

    /// Whether the buffers use the static usage hint.
    pub fn is_static(&self) -> bool {
        self.is_static
    }

    /// The vertex layout.
    pub fn vertex_attributes(&self) -> &VertexAttributes {
        &self.attributes
    }

    /// The first attribute with the given usage.
    pub fn vertex_attribute(&self, usage: VertexUsage) -> Option<&VertexAttribute> {
        self.attributes.find_by_usage(usage)
    }

    /// Bytes per vertex.
    pub fn vertex_size(&self) -> usize {
        self.attributes.vertex_size()
    }

    fn floats_per_vertex(&self) -> usize {
        self.attributes.vertex_size() / 4
    }

    /// Number of vertices currently stored.
    pub fn num_vertices(&self) -> usize {
        self.vertices.len() / self.floats_per_vertex()
    }

    /// Vertex capacity.
    pub fn max_vertices(&self) -> usize {
        self.vertices.capacity() / self.floats_per_vertex()
    }

    /// Number of indices currently stored.
    pub fn num_indices(&self) -> usize {
        self.indices.len()
    }

    /// Index capacity.
    pub fn max_indices(&self) -> usize {
        self.indices.capacity()
    }

    /// The stored vertex data.
    pub fn vertices(&self) -> &[f32] {
        self.vertices.as_slice()
    }

    /// The stored indices.
    pub fn indices(&self) -> &[u16] {
        self.indices.as_slice()
    }

    /// GPU handle of the vertex buffer.
    pub fn vertex_buffer_handle(&self) -> u32 {
        self.vertices.handle()
    }

    /// Whether [`render_all`](Self::render_all) binds and unbinds around the draw.
    pub fn auto_bind(&self) -> bool {
        self.auto_bind
    }

    /// Sets the default binding behavior of [`render_all`](Self::render_all).
    pub fn set_auto_bind(&mut self, auto_bind: bool) {
        self.auto_bind = auto_bind;
    }

    // --- Lifecycle ---

    fn ensure_live(&self) -> Result<(), ResourceError> {
        if self.slot.state() == ResourceState::Disposed {
            return Err(ResourceError::Disposed("mesh"));
        }
        Ok(())
    }

    /// Recreates the GPU buffers if a context loss invalidated them.
    pub fn check_managed(&mut self) -> Result<(), ResourceError> {
        match self.slot.state() {
            ResourceState::Disposed => Err(ResourceError::Disposed("mesh")),
            ResourceState::Invalidated => {
                let gl = self.ctx.gl();
                self.slot.set_state(ResourceState::Uploading);
                self.vertices.reload(gl)?;
                self.indices.reload(gl)?;
                if let Some(instances) = &mut self.instances {
                    instances.buffer.reload(gl)?;
                }
                self.slot.set_state(ResourceState::Ready);
                log::debug!("Reloaded buffers of mesh {}", self.slot.id());
                Ok(())
            }
            _ => Ok(()),
        }
    }

    // --- Vertex and index data ---

    /// Replaces the vertex data.
    pub fn set_vertices(&mut self, vertices: &[f32]) -> Result<&mut Self, ResourceError> {
        self.ensure_live()?;
        self.vertices.set(self.ctx.gl(), vertices)?;
        Ok(self)
    }

    /// Overwrites vertex data starting at float `target_offset`.
    pub fn update_vertices(
        &mut self,
        target_offset: usize,
        source: &[f32],
    ) -> Result<&mut Self, ResourceError> {
        self.ensure_live()?;
        self.vertices.update(self.ctx.gl(), target_offset, source)?;
        Ok(self)
    }

    /// Copies `count` floats starting at `src_offset` into `dest[dest_offset..]`.
    pub fn get_vertices(
        &self,
        src_offset: usize,
        count: usize,
        dest: &mut [f32],
        dest_offset: usize,
    ) -> Result<(), ResourceError> {
        self.vertices.read(src_offset, count, dest, dest_offset)
    }

    /// Replaces the indices.
    pub fn set_indices(&mut self, indices: &[u16]) -> Result<&mut Self, ResourceError> {
        self.ensure_live()?;
        self.indices.set(self.ctx.gl(), indices)?;
        Ok(self)
    }

    /// Overwrites indices starting at `target_offset`.
    pub fn update_indices(
        &mut self,
        target_offset: usize,
        source: &[u16],
    ) -> Result<&mut Self, ResourceError> {
        self.ensure_live()?;
        self.indices.update(self.ctx.gl(), target_offset, source)?;
        Ok(self)
    }

    /// Copies `count` indices starting at `src_offset` into `dest[dest_offset..]`.
    pub fn get_indices(
        &self,
        src_offset: usize,
        count: usize,
        dest: &mut [u16],
        dest_offset: usize,
    ) -> Result<(), ResourceError> {
        self.indices.read(src_offset, count, dest, dest_offset)
    }

    // --- Instancing ---

    /// Whether an instance buffer is attached.
    pub fn is_instanced(&self) -> bool {
        self.instances.is_some()
    }

    /// Number of instances currently stored.
    pub fn num_instances(&self) -> usize {
        self.instances.as_ref().map_or(0, InstanceData::num_instances)
    }

    /// Attaches an instance buffer for up to `max_instances` instances.
    pub fn enable_instanced_rendering(
        &mut self,
        is_static: bool,
        max_instances: usize,
        attributes: VertexAttributes,
    ) -> Result<&mut Self, ResourceError> {
        self.ensure_live()?;
        if self.instances.is_some() {
            return Err(ResourceError::InvalidArgument(
                "instanced rendering is already enabled on this mesh".into(),
            ));
        }
        check_stride(&attributes)?;
        let capacity = max_instances * attributes.vertex_size() / 4;
        let buffer = GpuBuffer::new(self.ctx.gl(), gl::ARRAY_BUFFER, capacity, is_static)?;
        log::debug!("Enabled instancing on mesh {} ({max_instances} instances)", self.slot.id());
        self.instances = Some(InstanceData { attributes, buffer });
        Ok(self)
    }

    /// Detaches and deletes the instance buffer.
    pub fn disable_instanced_rendering(&mut self) -> &mut Self {
        if let Some(mut instances) = self.instances.take() {
            instances.buffer.dispose(self.ctx.gl());
        }
        self
    }

    /// Replaces the instance data.
    pub fn set_instance_data(&mut self, data: &[f32]) -> Result<&mut Self, ResourceError> {
        self.ensure_live()?;
        let instances = self.instances.as_mut().ok_or_else(|| {
            ResourceError::InvalidArgument("instanced rendering is not enabled".into())
        })?;
        instances.buffer.set(self.ctx.gl(), data)?;
        Ok(self)
    }

    /// Overwrites instance data starting at float `target_offset`.
    pub fn update_instance_data(
        &mut self,
        target_offset: usize,
        source: &[f32],
    ) -> Result<&mut Self, ResourceError> {
        self.ensure_live()?;
        let instances = self.instances.as_mut().ok_or_else(|| {
            ResourceError::InvalidArgument("instanced rendering is not enabled".into())
        })?;
        instances.buffer.update(self.ctx.gl(), target_offset, source)?;
        Ok(self)
    }

    // --- Binding and drawing ---

    /// Binds the buffers and points every attribute the shader uses at them.
    ///
    /// Attributes are matched by alias; those the shader does not use are skipped.
    pub fn bind(&mut self, shader: &mut ShaderProgram) -> Result<(), ResourceError> {
        self.check_managed()?;
        let gl = self.ctx.gl();

        self.vertices.bind(gl);
        let stride = self.attributes.vertex_size() as i32;
        for attribute in &self.attributes {
            let location = shader.fetch_attribute_location(&attribute.alias, false)?;
            if location < 0 {
                continue;
            }
            let location = location as u32;
            shader.enable_vertex_attribute_at(location)?;
            shader.set_vertex_attribute_at(
                location,
                attribute.num_components as i32,
                attribute.ty,
                attribute.normalized,
                stride,
                attribute.offset(),
            )?;
        }

        if let Some(instances) = &mut self.instances {
            instances.buffer.bind(gl);
            let stride = instances.attributes.vertex_size() as i32;
            for attribute in &instances.attributes {
                let location = shader.fetch_attribute_location(&attribute.alias, false)?;
                if location < 0 {
                    continue;
                }
                let location = location as u32;
                shader.enable_vertex_attribute_at(location)?;
                shader.set_vertex_attribute_at(
                    location,
                    attribute.num_components as i32,
                    attribute.ty,
                    attribute.normalized,
                    stride,
                    attribute.offset(),
                )?;
                gl.vertex_attrib_divisor(location, 1);
            }
        }

        self.indices.bind(gl);
        Ok(())
    }

    /// Disables the attribute arrays enabled by [`bind`](Self::bind) and unbinds the buffers.
    pub fn unbind(&mut self, shader: &mut ShaderProgram) -> Result<(), ResourceError> {
        let gl = self.ctx.gl();
        for attribute in &self.attributes {
            let location = shader.fetch_attribute_location(&attribute.alias, false)?;
            if location >= 0 {
                shader.disable_vertex_attribute_at(location as u32)?;
            }
        }
        self.vertices.unbind(gl);

        if let Some(instances) = &mut self.instances {
            for attribute in &instances.attributes {
                let location = shader.fetch_attribute_location(&attribute.alias, false)?;
                if location >= 0 {
                    shader.disable_vertex_attribute_at(location as u32)?;
                    gl.vertex_attrib_divisor(location as u32, 0);
                }
            }
            instances.buffer.unbind(gl);
        }

        self.indices.unbind(gl);
        Ok(())
    }

    /// Draws `count` indices (or vertices, without indices) starting at `offset`.
    ///
    /// With `auto_bind`, the mesh is bound before and unbound after the draw;
    /// otherwise the caller must have bound it.
    pub fn render(
        &mut self,
        shader: &mut ShaderProgram,
        primitive: u32,
        offset: usize,
        count: usize,
        auto_bind: bool,
    ) -> Result<(), ResourceError> {
        self.check_managed()?;
        if count == 0 {
            return Ok(());
        }
        if auto_bind {
            self.bind(shader)?;
        }
        let drawn = self.draw(primitive, offset, count);
        if auto_bind {
            self.unbind(shader)?;
        }
        drawn
    }

    /// Draws every index, or every vertex when the mesh has no indices.
    pub fn render_all(
        &mut self,
        shader: &mut ShaderProgram,
        primitive: u32,
    ) -> Result<(), ResourceError> {
        let count = if self.num_indices() > 0 {
            self.num_indices()
        } else {
            self.num_vertices()
        };
        self.render(shader, primitive, 0, count, self.auto_bind)
    }

    fn draw(&self, primitive: u32, offset: usize, count: usize) -> Result<(), ResourceError> {
        let gl = self.ctx.gl();
        let instances = self.num_instances() as i32;
        if self.num_indices() > 0 {
            if offset + count > self.num_indices() {
                return Err(ResourceError::IndexOutOfRange {
                    offset,
                    count,
                    len: self.num_indices(),
                });
            }
            let byte_offset = offset * std::mem::size_of::<u16>();
            if instances > 0 {
                gl.draw_elements_instanced(
                    primitive,
                    count as i32,
                    gl::UNSIGNED_SHORT,
                    byte_offset,
                    instances,
                );
            } else {
                gl.draw_elements(primitive, count as i32, gl::UNSIGNED_SHORT, byte_offset);
            }
        } else {
            if offset + count > self.num_vertices() {
                return Err(ResourceError::IndexOutOfRange {
                    offset,
                    count,
                    len: self.num_vertices(),
                });
            }
            if instances > 0 {
                gl.draw_arrays_instanced(primitive, offset as i32, count as i32, instances);
            } else {
                gl.draw_arrays(primitive, offset as i32, count as i32);
            }
        }
        self.ctx.check_error("draw")
    }

    // --- Geometry ---

    /// Float offset and component count of the position attribute.
    fn position_layout(&self) -> Result<(usize, usize), ResourceError> {
        let position = self
            .attributes
            .find_by_usage(VertexUsage::Position)
            .ok_or(ResourceError::MissingAttribute("position"))?;
        Ok((position.offset() / 4, position.num_components as usize))
    }

    fn position_at(&self, vertex: usize, layout: (usize, usize)) -> Result<Vec3, ResourceError> {
        let (pos_offset, components) = layout;
        let start = vertex * self.floats_per_vertex() + pos_offset;
        let p = self
            .vertices
            .as_slice()
            .get(start..start + components)
            .ok_or(ResourceError::IndexOutOfRange {
                offset: vertex,
                count: 1,
                len: self.num_vertices(),
            })?;
        Ok(match *p {
            [x] => Vec3::new(x, 0.0, 0.0),
            [x, y] => Vec3::new(x, y, 0.0),
            [x, y, z, ..] => Vec3::new(x, y, z),
            _ => Vec3::ZERO,
        })
    }

    /// Visits the (optionally transformed) position of every vertex referenced
    /// by `offset..offset + count`, through the indices if there are any.
    fn for_each_position(
        &self,
        offset: usize,
        count: usize,
        transform: Option<&Mat4>,
        mut visit: impl FnMut(Vec3),
    ) -> Result<(), ResourceError> {
        if self.num_vertices() == 0 {
            return Err(ResourceError::NoVertices);
        }
        let layout = self.position_layout()?;
        let indices = self.indices.as_slice();
        let max = if indices.is_empty() {
            self.num_vertices()
        } else {
            indices.len()
        };
        if count == 0 || offset + count > max {
            return Err(ResourceError::InvalidArgument(format!(
                "invalid part specified (offset={offset}, count={count}, max={max})"
            )));
        }
        for i in offset..offset + count {
            let vertex = if indices.is_empty() {
                i
            } else {
                indices[i] as usize
            };
            let p = self.position_at(vertex, layout)?;
            visit(transform.map_or(p, |m| m.transform_point(p)));
        }
        Ok(())
    }

    /// The axis-aligned box around every stored vertex.
    pub fn calculate_bounding_box(&self) -> Result<Aabb, ResourceError> {
        if self.num_vertices() == 0 {
            return Err(ResourceError::NoVertices);
        }
        let layout = self.position_layout()?;
        let mut bounds = Aabb::INVALID;
        for vertex in 0..self.num_vertices() {
            bounds.extend(self.position_at(vertex, layout)?);
        }
        Ok(bounds)
    }

    /// Grows `bounds` to include the vertices of a part of the mesh.
    pub fn extend_bounding_box(
        &self,
        bounds: &mut Aabb,
        offset: usize,
        count: usize,
        transform: Option<&Mat4>,
    ) -> Result<(), ResourceError> {
        self.for_each_position(offset, count, transform, |p| {
            bounds.extend(p);
        })
    }

    /// The box around a part of the mesh.
    pub fn calculate_bounding_box_range(
        &self,
        offset: usize,
        count: usize,
        transform: Option<&Mat4>,
    ) -> Result<Aabb, ResourceError> {
        let mut bounds = Aabb::INVALID;
        self.extend_bounding_box(&mut bounds, offset, count, transform)?;
        Ok(bounds)
    }

    /// Squared distance from `center` to the farthest vertex of a part of the mesh.
    pub fn calculate_radius_squared(
        &self,
        center: Vec3,
        offset: usize,
        count: usize,
        transform: Option<&Mat4>,
    ) -> Result<f32, ResourceError> {
        let mut result = 0.0f32;
        self.for_each_position(offset, count, transform, |p| {
            result = result.max(p.distance_squared(center));
        })?;
        Ok(result)
    }

    /// Distance from `center` to the farthest vertex of a part of the mesh.
    pub fn calculate_radius(
        &self,
        center: Vec3,
        offset: usize,
        count: usize,
        transform: Option<&Mat4>,
    ) -> Result<f32, ResourceError> {
        Ok(self
            .calculate_radius_squared(center, offset, count, transform)?
            .sqrt())
    }

    /// Transforms every position in place.
    pub fn transform(&mut self, matrix: &Mat4) -> Result<(), ResourceError> {
        let count = self.num_vertices();
        if count == 0 {
            return Ok(());
        }
        self.transform_range(matrix, 0, count)
    }

    /// Transforms the positions of vertices `start..start + count` in place.
    pub fn transform_range(
        &mut self,
        matrix: &Mat4,
        start: usize,
        count: usize,
    ) -> Result<(), ResourceError> {
        self.ensure_live()?;
        if count == 0 || start + count > self.num_vertices() {
            return Err(ResourceError::IndexOutOfRange {
                offset: start,
                count,
                len: self.num_vertices(),
            });
        }
        let layout = self.position_layout()?;
        let (pos_offset, components) = layout;
        let stride = self.floats_per_vertex();
        let mut data = self.vertices.as_slice().to_vec();
        for vertex in start..start + count {
            let p = matrix.transform_point(self.position_at(vertex, layout)?);
            let base = vertex * stride + pos_offset;
            let values = [p.x, p.y, p.z];
            data[base..base + components.min(3)].copy_from_slice(&values[..components.min(3)]);
        }
        self.vertices.set(self.ctx.gl(), &data)
    }

    /// Scales every position component-wise.
    pub fn scale(&mut self, x: f32, y: f32, z: f32) -> Result<(), ResourceError> {
        self.transform(&Mat4::from_scale(Vec3::new(x, y, z)))
    }

    // --- Copy ---

    /// Creates an independent mesh with the same contents.
    ///
    /// With a `usage` filter, only the first attribute of each listed usage is
    /// kept, in the listed order. With `remove_duplicates`, vertices equal on
    /// every kept component are merged and the indices remapped to the first
    /// occurrence. Meshes without indices are never merged.
    pub fn copy(
        &self,
        is_static: bool,
        remove_duplicates: bool,
        usage: Option<&[VertexUsage]>,
    ) -> Result<Mesh, ResourceError> {
        self.ensure_live()?;
        let stride = self.floats_per_vertex();

        let mut kept: Option<(Vec<VertexAttribute>, Vec<usize>)> = None;
        if let Some(usages) = usage {
            let mut attributes = Vec::new();
            let mut checks = Vec::new();
            for &u in usages {
                if let Some(attribute) = self.attributes.find_by_usage(u) {
                    let first = attribute.offset() / 4;
                    let floats = attribute.size_in_bytes().div_ceil(4);
                    checks.extend(first..first + floats);
                    attributes.push(attribute.clone());
                }
            }
            if !attributes.is_empty() {
                kept = Some((attributes, checks));
            }
        }
        let (layout, checks) = match kept {
            Some((attributes, checks)) => (VertexAttributes::new(attributes)?, checks),
            None => (self.attributes.clone(), (0..stride).collect()),
        };

        let mut indices = self.indices.as_slice().to_vec();
        // Merged vertices are only reachable through the index buffer.
        let merge = remove_duplicates && !indices.is_empty();
        let (vertices, num_vertices) = if merge || checks.len() != stride {
            compact_vertices(self.vertices.as_slice(), stride, &checks, &mut indices, merge)
        } else {
            (self.vertices.as_slice().to_vec(), self.num_vertices())
        };

        let mut copy = Mesh::new(&self.ctx, is_static, num_vertices, indices.len(), layout)?;
        copy.set_vertices(&vertices)?;
        if !indices.is_empty() {
            copy.set_indices(&indices)?;
        }
        copy.auto_bind = self.auto_bind;
        log::debug!(
            "Copied mesh {} into {} ({} -> {num_vertices} vertices)",
            self.slot.id(),
            copy.id(),
            self.num_vertices()
        );
        Ok(copy)
    }

    // --- Disposal ---

    /// Deletes the GPU buffers and stops tracking the mesh. Idempotent.
    pub fn dispose(&mut self) {
        if self.slot.state() == ResourceState::Disposed {
            return;
        }
        if self.slot.state() == ResourceState::Invalidated {
            self.vertices.forget();
            self.indices.forget();
            if let Some(instances) = &mut self.instances {
                instances.buffer.forget();
            }
        } else {
            let gl = self.ctx.gl();
            self.vertices.dispose(gl);
            self.indices.dispose(gl);
            if let Some(instances) = &mut self.instances {
                instances.buffer.dispose(gl);
            }
        }
        self.ctx.unregister(ResourceKind::Mesh, self.slot.id());
        self.slot.set_state(ResourceState::Disposed);
        log::debug!("Disposed mesh {}", self.slot.id());
    }
}

impl Drop for Mesh {
    fn drop(&mut self) {
        self.dispose();
    }
}

/// Projects each vertex onto the `checks` float slots and, if requested,
/// merges vertices equal on those slots. Indices are remapped in place.
/// Returns the new vertex data and vertex count.
fn compact_vertices(
    vertices: &[f32],
    stride: usize,
    checks: &[usize],
    indices: &mut [u16],
    remove_duplicates: bool,
) -> (Vec<f32>, usize) {
    let new_stride = checks.len();
    let num_vertices = vertices.len() / stride;
    let mut out: Vec<f32> = Vec::with_capacity(num_vertices * new_stride);
    let mut size = 0usize;

    for i in 0..num_vertices {
        let source = &vertices[i * stride..(i + 1) * stride];
        let duplicate = if remove_duplicates {
            (0..size).find(|&j| {
                let candidate = &out[j * new_stride..(j + 1) * new_stride];
                checks.iter().zip(candidate).all(|(&k, &v)| v == source[k])
            })
        } else {
            None
        };

        let target = match duplicate {
            Some(j) => j,
            None => {
                out.extend(checks.iter().map(|&k| source[k]));
                size += 1;
                size - 1
            }
        };
        if target != i {
            for index in indices.iter_mut().filter(|index| **index as usize == i) {
                *index = target as u16;
            }
        }
    }
    (out, size)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compact_merges_duplicates_including_first_vertex() {
        // Vertices 0 and 2 are equal.
        let vertices = [0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 1.0];
        let mut indices = [0, 1, 2, 2, 3, 0];
        let (out, count) = compact_vertices(&vertices, 2, &[0, 1], &mut indices, true);
        assert_eq!(count, 3);
        assert_eq!(out, vec![0.0, 0.0, 1.0, 0.0, 1.0, 1.0]);
        assert_eq!(indices, [0, 1, 0, 0, 2, 0]);
    }

    #[test]
    fn test_compact_projects_without_merging() {
        // Stride 3, keep slots 0 and 2.
        let vertices = [1.0, 9.0, 2.0, 1.0, 8.0, 2.0];
        let mut indices = [1, 0];
        let (out, count) = compact_vertices(&vertices, 3, &[0, 2], &mut indices, false);
        assert_eq!(count, 2);
        assert_eq!(out, vec![1.0, 2.0, 1.0, 2.0]);
        assert_eq!(indices, [1, 0]);
    }

    #[test]
    fn test_compact_merges_on_projected_slots_only() {
        // Equal on slot 0, different on slot 1, which is dropped.
        let vertices = [5.0, 1.0, 5.0, 2.0];
        let mut indices = [0, 1];
        let (out, count) = compact_vertices(&vertices, 2, &[0], &mut indices, true);
        assert_eq!(count, 1);
        assert_eq!(out, vec![5.0]);
        assert_eq!(indices, [0, 0]);
    }
}
