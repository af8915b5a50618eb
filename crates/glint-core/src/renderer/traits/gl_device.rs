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

//! The OpenGL-style call surface every backend implements.

use std::fmt::Debug;

/// Name, array size and GL type of an active program variable, as reported by
/// `get_active_uniform` / `get_active_attrib`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveVariable {
    /// The variable name. Array uniforms may carry a trailing `[0]`.
    pub name: String,
    /// Number of array elements (1 for non-arrays).
    pub size: i32,
    /// The GL type enumerant (e.g. [`FLOAT_VEC4`](crate::renderer::api::gl::FLOAT_VEC4)).
    pub ty: u32,
}

/// The OpenGL-style call surface the resource layer issues all GPU work through.
///
/// Handles are plain `u32` names where `0` means "none", exactly as in GL.
/// Enumerants come from [`gl`](crate::renderer::api::gl). Every method takes
/// `&self`: implementations are driven from a single render thread and manage
/// their own interior state.
///
/// The trait is intentionally narrow; it covers what textures, meshes and
/// shader programs need and nothing more.
pub trait GlDevice: Debug {
    // --- Textures ---

    /// Allocates a new texture name. Returns `0` if allocation failed.
    fn gen_texture(&self) -> u32;

    /// Deletes a texture name. Unknown names are ignored.
    fn delete_texture(&self, texture: u32);

    /// Binds `texture` (or `0` to unbind) to `target` on the active unit.
    fn bind_texture(&self, target: u32, texture: u32);

    /// Selects the active texture unit (`TEXTURE0 + n`).
    fn active_texture(&self, unit: u32);

    /// Sets a pixel-store parameter such as `UNPACK_ALIGNMENT`.
    fn pixel_store_i(&self, pname: u32, param: i32);

    /// Specifies a two-dimensional texture image. `pixels == None` allocates
    /// storage without initializing it.
    #[allow(clippy::too_many_arguments)]
    fn tex_image_2d(
        &self,
        target: u32,
        level: i32,
        internal_format: i32,
        width: i32,
        height: i32,
        format: u32,
        ty: u32,
        pixels: Option<&[u8]>,
    );

    /// Replaces a sub-rectangle of an existing texture image.
    #[allow(clippy::too_many_arguments)]
    fn tex_sub_image_2d(
        &self,
        target: u32,
        level: i32,
        x_offset: i32,
        y_offset: i32,
        width: i32,
        height: i32,
        format: u32,
        ty: u32,
        pixels: &[u8],
    );

    /// Sets an integer texture parameter on the texture bound to `target`.
    fn tex_parameter_i(&self, target: u32, pname: u32, param: i32);

    /// Sets a float texture parameter on the texture bound to `target`.
    fn tex_parameter_f(&self, target: u32, pname: u32, param: f32);

    /// Generates the mip chain of the texture bound to `target` from level 0.
    fn generate_mipmap(&self, target: u32);

    // --- Buffers ---

    /// Allocates a new buffer name. Returns `0` if allocation failed.
    fn gen_buffer(&self) -> u32;

    /// Deletes a buffer name. Unknown names are ignored.
    fn delete_buffer(&self, buffer: u32);

    /// Binds `buffer` (or `0`) to `target`.
    fn bind_buffer(&self, target: u32, buffer: u32);

    /// (Re)allocates the store of the buffer bound to `target` with `size`
    /// bytes, optionally initialized from `data`.
    fn buffer_data(&self, target: u32, size: usize, data: Option<&[u8]>, usage: u32);

    /// Overwrites part of the store of the buffer bound to `target`.
    fn buffer_sub_data(&self, target: u32, offset: usize, data: &[u8]);

    // --- Vertex attributes ---

    /// Enables the generic vertex attribute array at `index`.
    fn enable_vertex_attrib_array(&self, index: u32);

    /// Disables the generic vertex attribute array at `index`.
    fn disable_vertex_attrib_array(&self, index: u32);

    /// Describes the layout of attribute `index` within the bound `ARRAY_BUFFER`.
    fn vertex_attrib_pointer(
        &self,
        index: u32,
        size: i32,
        ty: u32,
        normalized: bool,
        stride: i32,
        offset: usize,
    );

    /// Sets the instancing divisor of attribute `index`.
    fn vertex_attrib_divisor(&self, index: u32, divisor: u32);

    /// Sets a constant value for attribute `index` while its array is disabled.
    fn vertex_attrib_4f(&self, index: u32, x: f32, y: f32, z: f32, w: f32);

    // --- Drawing ---

    /// Draws `count` vertices starting at `first`.
    fn draw_arrays(&self, mode: u32, first: i32, count: i32);

    /// Draws `count` indices of type `ty` starting at byte `offset` in the bound element buffer.
    fn draw_elements(&self, mode: u32, count: i32, ty: u32, offset: usize);

    /// Instanced variant of [`draw_arrays`](Self::draw_arrays).
    fn draw_arrays_instanced(&self, mode: u32, first: i32, count: i32, instances: i32);

    /// Instanced variant of [`draw_elements`](Self::draw_elements).
    fn draw_elements_instanced(
        &self,
        mode: u32,
        count: i32,
        ty: u32,
        offset: usize,
        instances: i32,
    );

    // --- Shaders and programs ---

    /// Creates a shader object of the given stage. Returns `0` on failure.
    fn create_shader(&self, ty: u32) -> u32;

    /// Replaces the source of a shader object.
    fn shader_source(&self, shader: u32, source: &str);

    /// Compiles a shader object.
    fn compile_shader(&self, shader: u32);

    /// Queries a shader parameter such as `COMPILE_STATUS`.
    fn get_shader_iv(&self, shader: u32, pname: u32) -> i32;

    /// Returns the info log of a shader object.
    fn get_shader_info_log(&self, shader: u32) -> String;

    /// Deletes a shader object.
    fn delete_shader(&self, shader: u32);

    /// Creates an empty program object. Returns `0` on failure.
    fn create_program(&self) -> u32;

    /// Attaches a shader object to a program.
    fn attach_shader(&self, program: u32, shader: u32);

    /// Links a program.
    fn link_program(&self, program: u32);

    /// Queries a program parameter such as `LINK_STATUS` or `ACTIVE_UNIFORMS`.
    fn get_program_iv(&self, program: u32, pname: u32) -> i32;

    /// Returns the info log of a program object.
    fn get_program_info_log(&self, program: u32) -> String;

    /// Installs a program (or `0`) as part of current rendering state.
    fn use_program(&self, program: u32);

    /// Deletes a program object.
    fn delete_program(&self, program: u32);

    /// Describes the active uniform at `index`.
    fn get_active_uniform(&self, program: u32, index: u32) -> Option<ActiveVariable>;

    /// Describes the active attribute at `index`.
    fn get_active_attrib(&self, program: u32, index: u32) -> Option<ActiveVariable>;

    /// Returns the location of a uniform, or `-1` if it is not active.
    fn get_uniform_location(&self, program: u32, name: &str) -> i32;

    /// Returns the location of an attribute, or `-1` if it is not active.
    fn get_attrib_location(&self, program: u32, name: &str) -> i32;

    // --- Uniforms (on the program in use) ---

    /// Sets an `int`/`sampler` uniform.
    fn uniform_1i(&self, location: i32, x: i32);
    /// Sets an `ivec2` uniform.
    fn uniform_2i(&self, location: i32, x: i32, y: i32);
    /// Sets an `ivec3` uniform.
    fn uniform_3i(&self, location: i32, x: i32, y: i32, z: i32);
    /// Sets an `ivec4` uniform.
    fn uniform_4i(&self, location: i32, x: i32, y: i32, z: i32, w: i32);
    /// Sets a `float` uniform.
    fn uniform_1f(&self, location: i32, x: f32);
    /// Sets a `vec2` uniform.
    fn uniform_2f(&self, location: i32, x: f32, y: f32);
    /// Sets a `vec3` uniform.
    fn uniform_3f(&self, location: i32, x: f32, y: f32, z: f32);
    /// Sets a `vec4` uniform.
    fn uniform_4f(&self, location: i32, x: f32, y: f32, z: f32, w: f32);
    /// Sets a `float[]` uniform.
    fn uniform_1fv(&self, location: i32, values: &[f32]);
    /// Sets a `vec2[]` uniform.
    fn uniform_2fv(&self, location: i32, values: &[f32]);
    /// Sets a `vec3[]` uniform.
    fn uniform_3fv(&self, location: i32, values: &[f32]);
    /// Sets a `vec4[]` uniform.
    fn uniform_4fv(&self, location: i32, values: &[f32]);
    /// Sets a `mat2` (or `mat2[]`) uniform from column-major floats.
    fn uniform_matrix_2fv(&self, location: i32, transpose: bool, values: &[f32]);
    /// Sets a `mat3` (or `mat3[]`) uniform from column-major floats.
    fn uniform_matrix_3fv(&self, location: i32, transpose: bool, values: &[f32]);
    /// Sets a `mat4` (or `mat4[]`) uniform from column-major floats.
    fn uniform_matrix_4fv(&self, location: i32, transpose: bool, values: &[f32]);

    // --- State queries ---

    /// Queries an integer state value.
    fn get_integer(&self, pname: u32) -> i32;

    /// Queries a float state value.
    fn get_float(&self, pname: u32) -> f32;

    /// Returns and clears the current error flag.
    fn get_error(&self) -> u32;

    /// Whether the context advertises the named extension.
    fn supports_extension(&self, name: &str) -> bool;
}
