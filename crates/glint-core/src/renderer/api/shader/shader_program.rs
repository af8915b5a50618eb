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

//! Linked vertex + fragment programs and their uniform / attribute tables.

use crate::math::{Color, Mat3, Mat4};
use crate::renderer::api::gl;
use crate::renderer::context::GraphicsContext;
use crate::renderer::error::{ResourceError, ShaderError};
use crate::renderer::registry::{ManagedSlot, ResourceId, ResourceKind, ResourceState};
use crate::renderer::traits::GlDevice;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

/// An active uniform or attribute of a linked program.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShaderVariable {
    /// The location to pass to setters.
    pub location: i32,
    /// Number of array elements (1 for non-arrays).
    pub size: i32,
    /// The GL type enumerant.
    pub ty: u32,
}

/// Handles of one successful compile + link.
#[derive(Debug, Default, Clone, Copy)]
struct ProgramHandles {
    program: u32,
    vertex: u32,
    fragment: u32,
}

/// A compiled and linked shader program.
///
/// Programs are always managed: their source text is retained and a context
/// loss makes the next use recompile them transparently.
///
/// Setters come in two forms. The by-name form looks the location up (and
/// caches it) and silently does nothing when the program has no such uniform
/// or attribute. The `_at` form takes a location and trusts it.
pub struct ShaderProgram {
    ctx: GraphicsContext,
    slot: Rc<ManagedSlot>,
    vertex_source: String,
    fragment_source: String,
    handles: ProgramHandles,
    log: String,
    compiled: bool,
    uniforms: HashMap<String, ShaderVariable>,
    attributes: HashMap<String, ShaderVariable>,
    uniform_locations: HashMap<String, i32>,
    attribute_locations: HashMap<String, i32>,
}

impl fmt::Debug for ShaderProgram {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShaderProgram")
            .field("id", &self.slot.id())
            .field("state", &self.slot.state())
            .field("program", &self.handles.program)
            .field("uniforms", &self.uniforms.len())
            .field("attributes", &self.attributes.len())
            .finish()
    }
}

fn stage_name(ty: u32) -> &'static str {
    if ty == gl::VERTEX_SHADER {
        "vertex"
    } else {
        "fragment"
    }
}

fn compile_stage(gl: &dyn GlDevice, ty: u32, source: &str) -> Result<u32, ShaderError> {
    let stage = stage_name(ty);
    let shader = gl.create_shader(ty);
    if shader == 0 {
        let log = format!("failed to create {stage} shader object");
        log::warn!("{log}");
        return Err(ShaderError::Compilation { stage, log });
    }
    gl.shader_source(shader, source);
    gl.compile_shader(shader);
    if gl.get_shader_iv(shader, gl::COMPILE_STATUS) == 0 {
        let log = gl.get_shader_info_log(shader);
        log::warn!("Failed to compile {stage} shader:\n{log}");
        gl.delete_shader(shader);
        return Err(ShaderError::Compilation { stage, log });
    }
    Ok(shader)
}

fn link(gl: &dyn GlDevice, vertex: &str, fragment: &str) -> Result<(ProgramHandles, String), ShaderError> {
    let vertex_shader = compile_stage(gl, gl::VERTEX_SHADER, vertex)?;
    let fragment_shader = match compile_stage(gl, gl::FRAGMENT_SHADER, fragment) {
        Ok(shader) => shader,
        Err(e) => {
            gl.delete_shader(vertex_shader);
            return Err(e);
        }
    };

    let program = gl.create_program();
    if program == 0 {
        gl.delete_shader(vertex_shader);
        gl.delete_shader(fragment_shader);
        let log = "failed to create program object".to_string();
        log::warn!("{log}");
        return Err(ShaderError::Link { log });
    }
    gl.attach_shader(program, vertex_shader);
    gl.attach_shader(program, fragment_shader);
    gl.link_program(program);

    let log = gl.get_program_info_log(program);
    if gl.get_program_iv(program, gl::LINK_STATUS) == 0 {
        log::warn!("Failed to link shader program:\n{log}");
        gl.delete_shader(vertex_shader);
        gl.delete_shader(fragment_shader);
        gl.delete_program(program);
        return Err(ShaderError::Link { log });
    }
    Ok((
        ProgramHandles {
            program,
            vertex: vertex_shader,
            fragment: fragment_shader,
        },
        log,
    ))
}

impl ShaderProgram {
    /// Compiles and links a program. The context's configured prefixes are
    /// prepended to each stage.
    pub fn new(ctx: &GraphicsContext, vertex: &str, fragment: &str) -> Result<Self, ResourceError> {
        let config = ctx.config();
        let vertex_source = format!("{}{}", config.prepend_vertex_code, vertex);
        let fragment_source = format!("{}{}", config.prepend_fragment_code, fragment);

        let slot = ctx.allocate_slot(ResourceKind::ShaderProgram);
        let mut program = Self {
            ctx: ctx.clone(),
            slot,
            vertex_source,
            fragment_source,
            handles: ProgramHandles::default(),
            log: String::new(),
            compiled: false,
            uniforms: HashMap::new(),
            attributes: HashMap::new(),
            uniform_locations: HashMap::new(),
            attribute_locations: HashMap::new(),
        };
        program.compile()?;
        ctx.register(&program.slot);
        Ok(program)
    }

    fn compile(&mut self) -> Result<(), ShaderError> {
        self.slot.set_state(ResourceState::Uploading);
        self.uniforms.clear();
        self.attributes.clear();
        self.uniform_locations.clear();
        self.attribute_locations.clear();

        let result = link(self.ctx.gl(), &self.vertex_source, &self.fragment_source);
        let (handles, log) = match result {
            Ok(linked) => linked,
            Err(e) => {
                self.compiled = false;
                self.handles = ProgramHandles::default();
                self.log = match &e {
                    ShaderError::Compilation { log, .. } | ShaderError::Link { log } => log.clone(),
                    other => other.to_string(),
                };
                self.slot.set_state(ResourceState::Unloaded);
                return Err(e);
            }
        };
        self.handles = handles;
        self.log = log;
        self.compiled = true;
        self.fetch_active_variables();
        self.slot.set_state(ResourceState::Ready);
        log::debug!(
            "Linked shader program {} (handle {}, {} uniforms, {} attributes)",
            self.slot.id(),
            handles.program,
            self.uniforms.len(),
            self.attributes.len()
        );
        Ok(())
    }

    fn fetch_active_variables(&mut self) {
        let gl = self.ctx.gl();
        let program = self.handles.program;

        let count = gl.get_program_iv(program, gl::ACTIVE_UNIFORMS).max(0) as u32;
        for index in 0..count {
            let Some(active) = gl.get_active_uniform(program, index) else {
                continue;
            };
            let location = gl.get_uniform_location(program, &active.name);
            self.uniform_locations.insert(active.name.clone(), location);
            self.uniforms.insert(
                active.name,
                ShaderVariable {
                    location,
                    size: active.size,
                    ty: active.ty,
                },
            );
        }

        let count = gl.get_program_iv(program, gl::ACTIVE_ATTRIBUTES).max(0) as u32;
        for index in 0..count {
            let Some(active) = gl.get_active_attrib(program, index) else {
                continue;
            };
            let location = gl.get_attrib_location(program, &active.name);
            self.attribute_locations.insert(active.name.clone(), location);
            self.attributes.insert(
                active.name,
                ShaderVariable {
                    location,
                    size: active.size,
                    ty: active.ty,
                },
            );
        }
    }

    /// Recompiles the program if a context loss invalidated it.
    ///
    /// Every GPU-affecting method calls this first.
    pub fn check_managed(&mut self) -> Result<(), ResourceError> {
        match self.slot.state() {
            ResourceState::Ready | ResourceState::Uploading => Ok(()),
            ResourceState::Disposed => Err(ResourceError::Disposed("shader program")),
            ResourceState::Invalidated => {
                log::debug!("Recompiling invalidated shader program {}", self.slot.id());
                self.compile()?;
                Ok(())
            }
            // Only reachable after a failed recompile; the sources have not
            // changed, so retrying would fail the same way.
            ResourceState::Unloaded => Err(ShaderError::NotCompiled {
                log: self.log.clone(),
            }
            .into()),
        }
    }

    // --- Introspection ---

    /// The id of this program within its context.
    pub fn id(&self) -> ResourceId {
        self.slot.id()
    }

    /// The lifecycle state.
    pub fn state(&self) -> ResourceState {
        self.slot.state()
    }

    /// The program handle, `0` when not linked.
    pub fn handle(&self) -> u32 {
        self.handles.program
    }

    /// Whether the last compile + link succeeded.
    pub fn is_compiled(&self) -> bool {
        self.compiled
    }

    /// The last link log, or the failure log of the last compile.
    pub fn log(&self) -> &str {
        &self.log
    }

    /// The vertex source, including the configured prefix.
    pub fn vertex_source(&self) -> &str {
        &self.vertex_source
    }

    /// The fragment source, including the configured prefix.
    pub fn fragment_source(&self) -> &str {
        &self.fragment_source
    }

    /// Whether the program has an active uniform with this name.
    pub fn has_uniform(&self, name: &str) -> bool {
        self.uniforms.contains_key(name)
    }

    /// The GL type of an active uniform.
    pub fn uniform_type(&self, name: &str) -> Option<u32> {
        self.uniforms.get(name).map(|v| v.ty)
    }

    /// The array size of an active uniform.
    pub fn uniform_size(&self, name: &str) -> Option<i32> {
        self.uniforms.get(name).map(|v| v.size)
    }

    /// The location of an active uniform.
    pub fn uniform_location(&self, name: &str) -> Option<i32> {
        self.uniforms.get(name).map(|v| v.location)
    }

    /// Whether the program has an active attribute with this name.
    pub fn has_attribute(&self, name: &str) -> bool {
        self.attributes.contains_key(name)
    }

    /// The GL type of an active attribute.
    pub fn attribute_type(&self, name: &str) -> Option<u32> {
        self.attributes.get(name).map(|v| v.ty)
    }

    /// The array size of an active attribute.
    pub fn attribute_size(&self, name: &str) -> Option<i32> {
        self.attributes.get(name).map(|v| v.size)
    }

    /// The location of an active attribute.
    pub fn attribute_location(&self, name: &str) -> Option<i32> {
        self.attributes.get(name).map(|v| v.location)
    }

    /// Names of the active uniforms, sorted.
    pub fn uniform_names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.uniforms.keys().cloned().collect();
        names.sort();
        names
    }

    /// Names of the active attributes, sorted.
    pub fn attribute_names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.attributes.keys().cloned().collect();
        names.sort();
        names
    }

    // --- Location lookup ---

    /// Looks up (and caches) a uniform location. Returns `-1` for an unknown
    /// name, or an error if `pedantic` is set.
    pub fn fetch_uniform_location(&mut self, name: &str, pedantic: bool) -> Result<i32, ResourceError> {
        self.check_managed()?;
        let location = match self.uniform_locations.get(name) {
            Some(&location) => location,
            None => {
                let location = self.ctx.gl().get_uniform_location(self.handles.program, name);
                self.uniform_locations.insert(name.to_string(), location);
                location
            }
        };
        if location == -1 && pedantic {
            return Err(ShaderError::UnknownUniform(name.to_string()).into());
        }
        Ok(location)
    }

    /// Looks up (and caches) an attribute location. Returns `-1` for an unknown
    /// name, or an error if `pedantic` is set.
    pub fn fetch_attribute_location(
        &mut self,
        name: &str,
        pedantic: bool,
    ) -> Result<i32, ResourceError> {
        self.check_managed()?;
        let location = match self.attribute_locations.get(name) {
            Some(&location) => location,
            None => {
                let location = self.ctx.gl().get_attrib_location(self.handles.program, name);
                self.attribute_locations.insert(name.to_string(), location);
                location
            }
        };
        if location == -1 && pedantic {
            return Err(ShaderError::UnknownAttribute(name.to_string()).into());
        }
        Ok(location)
    }

    fn uniform(&mut self, name: &str) -> Result<Option<i32>, ResourceError> {
        let location = self.fetch_uniform_location(name, false)?;
        if location == -1 {
            log::trace!("Ignoring unknown uniform '{name}'");
            return Ok(None);
        }
        Ok(Some(location))
    }

    fn attribute(&mut self, name: &str) -> Result<Option<u32>, ResourceError> {
        let location = self.fetch_attribute_location(name, false)?;
        if location < 0 {
            log::trace!("Ignoring unknown attribute '{name}'");
            return Ok(None);
        }
        Ok(Some(location as u32))
    }

    // --- Binding ---

    /// Makes this the current program, recompiling it first if needed.
    pub fn bind(&mut self) -> Result<(), ResourceError> {
        self.check_managed()?;
        self.ctx.gl().use_program(self.handles.program);
        Ok(())
    }

    /// Clears the current program.
    pub fn unbind(&self) {
        self.ctx.gl().use_program(0);
    }

    // --- Integer and float uniforms ---

    /// Sets an `int`/`ivecN` uniform from 1 to 4 values.
    pub fn set_uniform_i(&mut self, name: &str, values: &[i32]) -> Result<(), ResourceError> {
        match self.uniform(name)? {
            Some(location) => self.set_uniform_i_at(location, values),
            None => Ok(()),
        }
    }

    /// Sets an `int`/`ivecN` uniform at a known location.
    pub fn set_uniform_i_at(&mut self, location: i32, values: &[i32]) -> Result<(), ResourceError> {
        self.check_managed()?;
        let gl = self.ctx.gl();
        match *values {
            [x] => gl.uniform_1i(location, x),
            [x, y] => gl.uniform_2i(location, x, y),
            [x, y, z] => gl.uniform_3i(location, x, y, z),
            [x, y, z, w] => gl.uniform_4i(location, x, y, z, w),
            _ => {
                return Err(ResourceError::InvalidArgument(format!(
                    "integer uniform takes 1 to 4 values, got {}",
                    values.len()
                )))
            }
        }
        Ok(())
    }

    /// Sets a `float`/`vecN` uniform from 1 to 4 values.
    pub fn set_uniform_f(&mut self, name: &str, values: &[f32]) -> Result<(), ResourceError> {
        match self.uniform(name)? {
            Some(location) => self.set_uniform_f_at(location, values),
            None => Ok(()),
        }
    }

    /// Sets a `float`/`vecN` uniform at a known location.
    pub fn set_uniform_f_at(&mut self, location: i32, values: &[f32]) -> Result<(), ResourceError> {
        self.check_managed()?;
        let gl = self.ctx.gl();
        match *values {
            [x] => gl.uniform_1f(location, x),
            [x, y] => gl.uniform_2f(location, x, y),
            [x, y, z] => gl.uniform_3f(location, x, y, z),
            [x, y, z, w] => gl.uniform_4f(location, x, y, z, w),
            _ => {
                return Err(ResourceError::InvalidArgument(format!(
                    "float uniform takes 1 to 4 values, got {}",
                    values.len()
                )))
            }
        }
        Ok(())
    }

    /// Sets a color uniform as a `vec4`.
    pub fn set_uniform_color(&mut self, name: &str, color: Color) -> Result<(), ResourceError> {
        self.set_uniform_f(name, &[color.r, color.g, color.b, color.a])
    }

    /// Sets a color uniform at a known location.
    pub fn set_uniform_color_at(&mut self, location: i32, color: Color) -> Result<(), ResourceError> {
        self.set_uniform_f_at(location, &[color.r, color.g, color.b, color.a])
    }

    // --- Vector arrays ---

    /// Sets a `float[]` uniform.
    pub fn set_uniform_1fv(&mut self, name: &str, values: &[f32]) -> Result<(), ResourceError> {
        match self.uniform(name)? {
            Some(location) => self.set_uniform_1fv_at(location, values),
            None => Ok(()),
        }
    }

    /// Sets a `float[]` uniform at a known location.
    pub fn set_uniform_1fv_at(&mut self, location: i32, values: &[f32]) -> Result<(), ResourceError> {
        self.check_managed()?;
        self.ctx.gl().uniform_1fv(location, values);
        Ok(())
    }

    /// Sets a `vec2[]` uniform from tightly packed components.
    pub fn set_uniform_2fv(&mut self, name: &str, values: &[f32]) -> Result<(), ResourceError> {
        match self.uniform(name)? {
            Some(location) => self.set_uniform_2fv_at(location, values),
            None => Ok(()),
        }
    }

    /// Sets a `vec2[]` uniform at a known location.
    pub fn set_uniform_2fv_at(&mut self, location: i32, values: &[f32]) -> Result<(), ResourceError> {
        self.check_managed()?;
        self.ctx.gl().uniform_2fv(location, values);
        Ok(())
    }

    /// Sets a `vec3[]` uniform from tightly packed components.
    pub fn set_uniform_3fv(&mut self, name: &str, values: &[f32]) -> Result<(), ResourceError> {
        match self.uniform(name)? {
            Some(location) => self.set_uniform_3fv_at(location, values),
            None => Ok(()),
        }
    }

    /// Sets a `vec3[]` uniform at a known location.
    pub fn set_uniform_3fv_at(&mut self, location: i32, values: &[f32]) -> Result<(), ResourceError> {
        self.check_managed()?;
        self.ctx.gl().uniform_3fv(location, values);
        Ok(())
    }

    /// Sets a `vec4[]` uniform from tightly packed components.
    pub fn set_uniform_4fv(&mut self, name: &str, values: &[f32]) -> Result<(), ResourceError> {
        match self.uniform(name)? {
            Some(location) => self.set_uniform_4fv_at(location, values),
            None => Ok(()),
        }
    }

    /// Sets a `vec4[]` uniform at a known location.
    pub fn set_uniform_4fv_at(&mut self, location: i32, values: &[f32]) -> Result<(), ResourceError> {
        self.check_managed()?;
        self.ctx.gl().uniform_4fv(location, values);
        Ok(())
    }

    // --- Matrices ---

    /// Sets a matrix uniform from a flattened column-major array, choosing
    /// 2x2, 3x3 or 4x4 from its length (4, 9 or 16).
    pub fn set_uniform_matrix(
        &mut self,
        name: &str,
        values: &[f32],
        transpose: bool,
    ) -> Result<(), ResourceError> {
        match self.uniform(name)? {
            Some(location) => self.set_uniform_matrix_at(location, values, transpose),
            None => Ok(()),
        }
    }

    /// Sets a matrix uniform at a known location.
    pub fn set_uniform_matrix_at(
        &mut self,
        location: i32,
        values: &[f32],
        transpose: bool,
    ) -> Result<(), ResourceError> {
        self.check_managed()?;
        let gl = self.ctx.gl();
        match values.len() {
            4 => gl.uniform_matrix_2fv(location, transpose, values),
            9 => gl.uniform_matrix_3fv(location, transpose, values),
            16 => gl.uniform_matrix_4fv(location, transpose, values),
            n => return Err(ShaderError::InvalidMatrixSize(n).into()),
        }
        Ok(())
    }

    /// Sets a `mat3` uniform.
    pub fn set_uniform_mat3(&mut self, name: &str, matrix: &Mat3) -> Result<(), ResourceError> {
        self.set_uniform_matrix(name, &matrix.to_cols_array(), false)
    }

    /// Sets a `mat3` uniform at a known location.
    pub fn set_uniform_mat3_at(&mut self, location: i32, matrix: &Mat3) -> Result<(), ResourceError> {
        self.set_uniform_matrix_at(location, &matrix.to_cols_array(), false)
    }

    /// Sets a `mat4` uniform.
    pub fn set_uniform_mat4(&mut self, name: &str, matrix: &Mat4) -> Result<(), ResourceError> {
        self.set_uniform_matrix(name, &matrix.to_cols_array(), false)
    }

    /// Sets a `mat4` uniform at a known location.
    pub fn set_uniform_mat4_at(&mut self, location: i32, matrix: &Mat4) -> Result<(), ResourceError> {
        self.set_uniform_matrix_at(location, &matrix.to_cols_array(), false)
    }

    // --- Vertex attributes ---

    /// Enables the vertex array of a named attribute.
    pub fn enable_vertex_attribute(&mut self, name: &str) -> Result<(), ResourceError> {
        if let Some(location) = self.attribute(name)? {
            self.ctx.gl().enable_vertex_attrib_array(location);
        }
        Ok(())
    }

    /// Enables the vertex array at a known location.
    pub fn enable_vertex_attribute_at(&mut self, location: u32) -> Result<(), ResourceError> {
        self.check_managed()?;
        self.ctx.gl().enable_vertex_attrib_array(location);
        Ok(())
    }

    /// Disables the vertex array of a named attribute.
    pub fn disable_vertex_attribute(&mut self, name: &str) -> Result<(), ResourceError> {
        if let Some(location) = self.attribute(name)? {
            self.ctx.gl().disable_vertex_attrib_array(location);
        }
        Ok(())
    }

    /// Disables the vertex array at a known location.
    pub fn disable_vertex_attribute_at(&mut self, location: u32) -> Result<(), ResourceError> {
        self.check_managed()?;
        self.ctx.gl().disable_vertex_attrib_array(location);
        Ok(())
    }

    /// Points a named attribute at the bound vertex buffer.
    #[allow(clippy::too_many_arguments)]
    pub fn set_vertex_attribute(
        &mut self,
        name: &str,
        size: i32,
        ty: u32,
        normalized: bool,
        stride: i32,
        offset: usize,
    ) -> Result<(), ResourceError> {
        if let Some(location) = self.attribute(name)? {
            self.ctx
                .gl()
                .vertex_attrib_pointer(location, size, ty, normalized, stride, offset);
        }
        Ok(())
    }

    /// Points the attribute at a known location at the bound vertex buffer.
    #[allow(clippy::too_many_arguments)]
    pub fn set_vertex_attribute_at(
        &mut self,
        location: u32,
        size: i32,
        ty: u32,
        normalized: bool,
        stride: i32,
        offset: usize,
    ) -> Result<(), ResourceError> {
        self.check_managed()?;
        self.ctx
            .gl()
            .vertex_attrib_pointer(location, size, ty, normalized, stride, offset);
        Ok(())
    }

    /// Sets a constant value for a named attribute whose array is disabled.
    pub fn set_attribute_f(
        &mut self,
        name: &str,
        x: f32,
        y: f32,
        z: f32,
        w: f32,
    ) -> Result<(), ResourceError> {
        if let Some(location) = self.attribute(name)? {
            self.ctx.gl().vertex_attrib_4f(location, x, y, z, w);
        }
        Ok(())
    }

    // --- Disposal ---

    /// Deletes the program and its shaders and stops tracking it. Idempotent.
    pub fn dispose(&mut self) {
        if self.slot.state() == ResourceState::Disposed {
            return;
        }
        // Handles from a lost context may name live objects in the new one.
        if self.slot.state() != ResourceState::Invalidated && self.handles.program != 0 {
            let gl = self.ctx.gl();
            gl.use_program(0);
            gl.delete_shader(self.handles.vertex);
            gl.delete_shader(self.handles.fragment);
            gl.delete_program(self.handles.program);
            log::debug!(
                "Deleted shader program {} (handle {})",
                self.slot.id(),
                self.handles.program
            );
        }
        self.handles = ProgramHandles::default();
        self.ctx.unregister(ResourceKind::ShaderProgram, self.slot.id());
        self.slot.set_state(ResourceState::Disposed);
    }
}

impl Drop for ShaderProgram {
    fn drop(&mut self) {
        self.dispose();
    }
}
