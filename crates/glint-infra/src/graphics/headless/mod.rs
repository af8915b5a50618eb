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

//! An in-memory implementation of [`GlDevice`].
//!
//! [`HeadlessDevice`] keeps every object the resource layer creates (textures
//! with their mip levels, buffer stores, shaders, programs and uniform values)
//! and validates calls the way a GL ES 2.0 driver would, raising the usual
//! error codes through `get_error`. It also exposes what it holds, so tests and
//! tools can assert on uploads, draws and call counts, and can simulate a
//! context loss with [`HeadlessDevice::lose_context`].

mod config;
mod glsl;

pub use self::config::HeadlessConfig;

use self::glsl::{Declaration, DeclarationKind};
use glint_core::renderer::api::gl;
use glint_core::renderer::{ActiveVariable, GlDevice};
use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::fmt;

/// One specified image level of a texture, stored tightly packed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextureLevel {
    /// Width in pixels.
    pub width: i32,
    /// Height in pixels.
    pub height: i32,
    /// The internal format passed to `tex_image_2d`.
    pub internal_format: i32,
    /// The pixel format enumerant.
    pub format: u32,
    /// The component type enumerant.
    pub ty: u32,
    /// Row-major pixel bytes without row padding. Zeroed when the level was
    /// allocated without data.
    pub pixels: Vec<u8>,
}

/// The last value written to a uniform location.
#[derive(Debug, Clone, PartialEq)]
pub enum UniformValue {
    /// Written with one of the `uniform_Ni` calls.
    Int(Vec<i32>),
    /// Written with one of the `uniform_Nf` / `uniform_Nfv` calls.
    Float(Vec<f32>),
    /// Written with one of the `uniform_matrix_Nfv` calls.
    Matrix {
        /// 2, 3 or 4.
        dimension: usize,
        /// The `transpose` flag of the call.
        transpose: bool,
        /// The column-major values.
        values: Vec<f32>,
    },
}

/// The state of one generic vertex attribute.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VertexAttribState {
    /// Whether the attribute array is enabled.
    pub enabled: bool,
    /// Components per vertex.
    pub size: i32,
    /// Component type enumerant.
    pub ty: u32,
    /// Whether fixed-point values are normalized.
    pub normalized: bool,
    /// Byte stride between consecutive elements (0 means tightly packed).
    pub stride: i32,
    /// Byte offset of the first element in `buffer`.
    pub offset: usize,
    /// The `ARRAY_BUFFER` bound when the pointer was set.
    pub buffer: u32,
    /// The instancing divisor.
    pub divisor: u32,
    /// The constant value used while the array is disabled.
    pub constant: [f32; 4],
}

impl Default for VertexAttribState {
    fn default() -> Self {
        Self {
            enabled: false,
            size: 4,
            ty: gl::FLOAT,
            normalized: false,
            stride: 0,
            offset: 0,
            buffer: 0,
            divisor: 0,
            constant: [0.0, 0.0, 0.0, 1.0],
        }
    }
}

/// A draw call that passed validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrawCall {
    /// The primitive mode.
    pub mode: u32,
    /// First vertex for array draws, `0` for element draws.
    pub first: i32,
    /// Number of vertices or indices.
    pub count: i32,
    /// The index type for element draws, `None` for array draws.
    pub index_type: Option<u32>,
    /// Byte offset into the element buffer for element draws.
    pub offset: usize,
    /// Number of instances (1 for non-instanced draws).
    pub instances: i32,
    /// The program in use.
    pub program: u32,
}

#[derive(Debug)]
struct TextureObject {
    target: Option<u32>,
    levels: BTreeMap<i32, TextureLevel>,
    parameters_i: HashMap<u32, i32>,
    parameters_f: HashMap<u32, f32>,
}

impl TextureObject {
    fn new() -> Self {
        let parameters_i = HashMap::from([
            (gl::TEXTURE_MIN_FILTER, gl::NEAREST_MIPMAP_LINEAR as i32),
            (gl::TEXTURE_MAG_FILTER, gl::LINEAR as i32),
            (gl::TEXTURE_WRAP_S, gl::REPEAT as i32),
            (gl::TEXTURE_WRAP_T, gl::REPEAT as i32),
        ]);
        let parameters_f = HashMap::from([(gl::TEXTURE_MAX_ANISOTROPY_EXT, 1.0)]);
        Self {
            target: None,
            levels: BTreeMap::new(),
            parameters_i,
            parameters_f,
        }
    }
}

#[derive(Debug)]
struct BufferObject {
    data: Vec<u8>,
    usage: u32,
}

#[derive(Debug)]
struct ShaderObject {
    stage: u32,
    source: String,
    compiled: bool,
    log: String,
    declarations: Vec<Declaration>,
}

#[derive(Debug, Clone)]
struct ProgramVariable {
    name: String,
    ty: u32,
    size: i32,
    location: i32,
}

#[derive(Debug, Default)]
struct ProgramObject {
    shaders: Vec<u32>,
    linked: bool,
    log: String,
    uniforms: Vec<ProgramVariable>,
    attributes: Vec<ProgramVariable>,
    values: HashMap<i32, UniformValue>,
}

#[derive(Debug)]
struct DeviceState {
    next_handle: u32,
    generation: u32,
    textures: HashMap<u32, TextureObject>,
    buffers: HashMap<u32, BufferObject>,
    shaders: HashMap<u32, ShaderObject>,
    programs: HashMap<u32, ProgramObject>,
    /// Keyed by (unit index, target).
    texture_bindings: HashMap<(u32, u32), u32>,
    active_unit: u32,
    array_buffer: u32,
    element_buffer: u32,
    current_program: u32,
    pixel_store: HashMap<u32, i32>,
    attribs: Vec<VertexAttribState>,
    error: u32,
    fail_next_allocation: bool,
    calls: HashMap<&'static str, usize>,
    draws: Vec<DrawCall>,
}

impl DeviceState {
    fn new(max_vertex_attribs: u32) -> Self {
        Self {
            next_handle: 1,
            generation: 0,
            textures: HashMap::new(),
            buffers: HashMap::new(),
            shaders: HashMap::new(),
            programs: HashMap::new(),
            texture_bindings: HashMap::new(),
            active_unit: 0,
            array_buffer: 0,
            element_buffer: 0,
            current_program: 0,
            pixel_store: default_pixel_store(),
            attribs: vec![VertexAttribState::default(); max_vertex_attribs as usize],
            error: gl::NO_ERROR,
            fail_next_allocation: false,
            calls: HashMap::new(),
            draws: Vec::new(),
        }
    }

    /// Hands out a fresh name. Names are never reused, not even across a
    /// context loss, so stale handles are always detected.
    fn allocate(&mut self) -> u32 {
        if self.fail_next_allocation {
            self.fail_next_allocation = false;
            log::debug!("Headless device: simulated allocation failure");
            return 0;
        }
        let handle = self.next_handle;
        self.next_handle += 1;
        handle
    }

    /// Records an error. Like GL, the first error sticks until `get_error`.
    fn fail(&mut self, code: u32, operation: &str) {
        log::debug!("Headless device: {operation} raised 0x{code:04x}");
        if self.error == gl::NO_ERROR {
            self.error = code;
        }
    }

    fn bound_texture(&self, target: u32) -> u32 {
        self.texture_bindings
            .get(&(self.active_unit, target))
            .copied()
            .unwrap_or(0)
    }

    fn bound_texture_mut(&mut self, target: u32, operation: &str) -> Option<&mut TextureObject> {
        let handle = self.bound_texture(target);
        if handle == 0 || !self.textures.contains_key(&handle) {
            self.fail(gl::INVALID_OPERATION, operation);
            return None;
        }
        self.textures.get_mut(&handle)
    }

    fn bound_buffer(&self, target: u32) -> Option<u32> {
        match target {
            gl::ARRAY_BUFFER => Some(self.array_buffer),
            gl::ELEMENT_ARRAY_BUFFER => Some(self.element_buffer),
            _ => None,
        }
    }

    fn bound_buffer_mut(&mut self, target: u32, operation: &str) -> Option<&mut BufferObject> {
        let Some(handle) = self.bound_buffer(target) else {
            self.fail(gl::INVALID_ENUM, operation);
            return None;
        };
        if handle == 0 || !self.buffers.contains_key(&handle) {
            self.fail(gl::INVALID_OPERATION, operation);
            return None;
        }
        self.buffers.get_mut(&handle)
    }

    fn attrib_mut(&mut self, index: u32, operation: &str) -> Option<&mut VertexAttribState> {
        if index as usize >= self.attribs.len() {
            self.fail(gl::INVALID_VALUE, operation);
            return None;
        }
        self.attribs.get_mut(index as usize)
    }

    fn unpack_alignment(&self) -> usize {
        self.pixel_store
            .get(&gl::UNPACK_ALIGNMENT)
            .copied()
            .unwrap_or(4)
            .max(1) as usize
    }

    fn link(&mut self, program: u32, max_attribs: u32) {
        let Some(object) = self.programs.get(&program) else {
            self.fail(gl::INVALID_VALUE, "link_program");
            return;
        };
        let result = {
            let shaders: Vec<&ShaderObject> = object
                .shaders
                .iter()
                .filter_map(|handle| self.shaders.get(handle))
                .collect();
            link_stages(&shaders, max_attribs)
        };
        let Some(object) = self.programs.get_mut(&program) else {
            return;
        };
        object.values.clear();
        match result {
            Ok((uniforms, attributes)) => {
                object.linked = true;
                object.log.clear();
                object.uniforms = uniforms;
                object.attributes = attributes;
            }
            Err(log) => {
                log::debug!("Headless device: program {program} failed to link: {log}");
                object.linked = false;
                object.log = log;
                object.uniforms.clear();
                object.attributes.clear();
            }
        }
    }

    fn store_uniform(&mut self, location: i32, value: UniformValue, operation: &str) {
        if self.current_program == 0 {
            self.fail(gl::INVALID_OPERATION, operation);
            return;
        }
        if location == -1 {
            return;
        }
        let Some(program) = self.programs.get_mut(&self.current_program) else {
            self.fail(gl::INVALID_OPERATION, operation);
            return;
        };
        let accepted = program
            .uniforms
            .iter()
            .find(|u| location >= u.location && location < u.location + u.size)
            .is_some_and(|u| accepts(u.ty, &value));
        if !accepted {
            self.fail(gl::INVALID_OPERATION, operation);
            return;
        }
        program.values.insert(location, value);
    }

    /// Shared validation of every draw call.
    fn validate_draw(&mut self, mode: u32, count: i32, instances: i32, operation: &str) -> bool {
        if mode > gl::TRIANGLE_FAN {
            self.fail(gl::INVALID_ENUM, operation);
            return false;
        }
        if count < 0 || instances < 0 {
            self.fail(gl::INVALID_VALUE, operation);
            return false;
        }
        let linked = self
            .programs
            .get(&self.current_program)
            .is_some_and(|p| p.linked);
        if !linked {
            self.fail(gl::INVALID_OPERATION, operation);
            return false;
        }
        true
    }

    /// Checks that every enabled attribute array holds `vertices` vertices
    /// and enough instance data for `instances` instances.
    fn attributes_in_range(&self, vertices: usize, instances: usize) -> bool {
        self.attribs.iter().filter(|a| a.enabled).all(|attrib| {
            let Some(buffer) = self.buffers.get(&attrib.buffer) else {
                return false;
            };
            let elements = match attrib.divisor {
                0 => vertices,
                divisor => instances.div_ceil(divisor as usize),
            };
            if elements == 0 {
                return true;
            }
            let element_size = attrib.size.max(0) as usize * component_size(attrib.ty);
            let stride = match attrib.stride {
                0 => element_size,
                stride => stride as usize,
            };
            attrib.offset + (elements - 1) * stride + element_size <= buffer.data.len()
        })
    }

    fn record_draw(&mut self, draw: DrawCall) {
        log::trace!("Headless device: {draw:?}");
        self.draws.push(draw);
    }

    fn draw_elements(
        &mut self,
        mode: u32,
        count: i32,
        ty: u32,
        offset: usize,
        instances: i32,
        operation: &str,
    ) {
        if !self.validate_draw(mode, count, instances, operation) {
            return;
        }
        let index_size = match ty {
            gl::UNSIGNED_BYTE => 1,
            gl::UNSIGNED_SHORT => 2,
            gl::UNSIGNED_INT => 4,
            _ => {
                self.fail(gl::INVALID_ENUM, operation);
                return;
            }
        };
        let Some(indices) = self.buffers.get(&self.element_buffer) else {
            self.fail(gl::INVALID_OPERATION, operation);
            return;
        };
        let end = offset + count as usize * index_size;
        if end > indices.data.len() {
            self.fail(gl::INVALID_OPERATION, operation);
            return;
        }
        let max_index = indices.data[offset..end]
            .chunks_exact(index_size)
            .map(|bytes| match *bytes {
                [b] => b as usize,
                [lo, hi] => u16::from_le_bytes([lo, hi]) as usize,
                [a, b, c, d] => u32::from_le_bytes([a, b, c, d]) as usize,
                _ => 0,
            })
            .max();
        let vertices = max_index.map_or(0, |m| m + 1);
        if !self.attributes_in_range(vertices, instances as usize) {
            self.fail(gl::INVALID_OPERATION, operation);
            return;
        }
        self.record_draw(DrawCall {
            mode,
            first: 0,
            count,
            index_type: Some(ty),
            offset,
            instances,
            program: self.current_program,
        });
    }

    fn draw_arrays(&mut self, mode: u32, first: i32, count: i32, instances: i32, operation: &str) {
        if !self.validate_draw(mode, count, instances, operation) {
            return;
        }
        if first < 0 {
            self.fail(gl::INVALID_VALUE, operation);
            return;
        }
        let vertices = if count == 0 { 0 } else { (first + count) as usize };
        if !self.attributes_in_range(vertices, instances as usize) {
            self.fail(gl::INVALID_OPERATION, operation);
            return;
        }
        self.record_draw(DrawCall {
            mode,
            first,
            count,
            index_type: None,
            offset: 0,
            instances,
            program: self.current_program,
        });
    }
}

fn default_pixel_store() -> HashMap<u32, i32> {
    HashMap::from([(gl::UNPACK_ALIGNMENT, 4), (gl::PACK_ALIGNMENT, 4)])
}

/// Bytes per pixel of a format/type pair, or `None` if the pair is invalid.
fn bytes_per_pixel(format: u32, ty: u32) -> Option<usize> {
    match ty {
        gl::UNSIGNED_SHORT_5_6_5 if format == gl::RGB => Some(2),
        gl::UNSIGNED_SHORT_4_4_4_4 | gl::UNSIGNED_SHORT_5_5_5_1 if format == gl::RGBA => Some(2),
        gl::UNSIGNED_BYTE | gl::FLOAT => {
            let components = match format {
                gl::ALPHA | gl::LUMINANCE => 1,
                gl::LUMINANCE_ALPHA => 2,
                gl::RGB => 3,
                gl::RGBA => 4,
                _ => return None,
            };
            Some(if ty == gl::FLOAT { components * 4 } else { components })
        }
        _ => None,
    }
}

fn component_size(ty: u32) -> usize {
    match ty {
        gl::BYTE | gl::UNSIGNED_BYTE => 1,
        gl::SHORT | gl::UNSIGNED_SHORT => 2,
        _ => 4,
    }
}

/// Bytes a client image of `width` x `height` occupies with the given row alignment.
fn unpacked_len(width: usize, height: usize, bpp: usize, alignment: usize) -> usize {
    if width == 0 || height == 0 {
        return 0;
    }
    let row = width * bpp;
    row.div_ceil(alignment) * alignment * (height - 1) + row
}

/// Copies an aligned client image into tightly packed rows.
fn unpack(pixels: &[u8], width: usize, height: usize, bpp: usize, alignment: usize) -> Vec<u8> {
    let row = width * bpp;
    let stride = row.div_ceil(alignment) * alignment;
    let mut packed = Vec::with_capacity(row * height);
    for y in 0..height {
        packed.extend_from_slice(&pixels[y * stride..y * stride + row]);
    }
    packed
}

/// Builds the next mip level with a 2x2 box filter (byte formats) or point
/// sampling (packed and float formats).
fn downsample(level: &TextureLevel, bpp: usize) -> TextureLevel {
    let width = (level.width / 2).max(1);
    let height = (level.height / 2).max(1);
    let (src_w, src_h) = (level.width as usize, level.height as usize);
    let mut pixels = Vec::with_capacity(width as usize * height as usize * bpp);
    for y in 0..height as usize {
        for x in 0..width as usize {
            let (x0, y0) = ((x * 2).min(src_w - 1), (y * 2).min(src_h - 1));
            let (x1, y1) = ((x0 + 1).min(src_w - 1), (y0 + 1).min(src_h - 1));
            for c in 0..bpp {
                let texel = |px: usize, py: usize| level.pixels[(py * src_w + px) * bpp + c];
                if level.ty == gl::UNSIGNED_BYTE {
                    let sum = [(x0, y0), (x1, y0), (x0, y1), (x1, y1)]
                        .iter()
                        .map(|&(px, py)| texel(px, py) as u32)
                        .sum::<u32>();
                    pixels.push(((sum + 2) / 4) as u8);
                } else {
                    pixels.push(texel(x0, y0));
                }
            }
        }
    }
    TextureLevel {
        width,
        height,
        pixels,
        ..level.clone()
    }
}

fn is_valid_texture_parameter(pname: u32, value: i32) -> bool {
    let value = value as u32;
    match pname {
        gl::TEXTURE_MIN_FILTER => matches!(
            value,
            gl::NEAREST
                | gl::LINEAR
                | gl::NEAREST_MIPMAP_NEAREST
                | gl::LINEAR_MIPMAP_NEAREST
                | gl::NEAREST_MIPMAP_LINEAR
                | gl::LINEAR_MIPMAP_LINEAR
        ),
        gl::TEXTURE_MAG_FILTER => matches!(value, gl::NEAREST | gl::LINEAR),
        gl::TEXTURE_WRAP_S | gl::TEXTURE_WRAP_T => {
            matches!(value, gl::REPEAT | gl::CLAMP_TO_EDGE | gl::MIRRORED_REPEAT)
        }
        _ => false,
    }
}

/// Whether a uniform of GL type `ty` can be written with `value`.
fn accepts(ty: u32, value: &UniformValue) -> bool {
    match value {
        UniformValue::Int(_) => matches!(
            ty,
            gl::INT
                | gl::INT_VEC2
                | gl::INT_VEC3
                | gl::INT_VEC4
                | gl::BOOL
                | gl::SAMPLER_2D
                | gl::SAMPLER_CUBE
        ),
        UniformValue::Float(_) => matches!(
            ty,
            gl::FLOAT | gl::FLOAT_VEC2 | gl::FLOAT_VEC3 | gl::FLOAT_VEC4 | gl::BOOL
        ),
        UniformValue::Matrix { dimension, .. } => matches!(
            (ty, *dimension),
            (gl::FLOAT_MAT2, 2) | (gl::FLOAT_MAT3, 3) | (gl::FLOAT_MAT4, 4)
        ),
    }
}

/// Resolves `name` or `name[i]` to a location.
fn resolve_location(variables: &[ProgramVariable], name: &str) -> i32 {
    let (base, index) = match name.strip_suffix(']').and_then(|n| n.split_once('[')) {
        Some((base, index)) => match index.trim().parse::<u32>() {
            Ok(index) => (base, index as i32),
            Err(_) => return -1,
        },
        None => (name, 0),
    };
    variables
        .iter()
        .find(|v| v.name == base && index < v.size)
        .map_or(-1, |v| v.location + index)
}

type LinkedVariables = (Vec<ProgramVariable>, Vec<ProgramVariable>);

/// Merges the declarations of the attached stages into uniform and attribute tables.
fn link_stages(shaders: &[&ShaderObject], max_attribs: u32) -> Result<LinkedVariables, String> {
    for (stage, name) in [(gl::VERTEX_SHADER, "vertex"), (gl::FRAGMENT_SHADER, "fragment")] {
        match shaders.iter().find(|s| s.stage == stage) {
            None => return Err(format!("ERROR: Link failed: no {name} shader attached")),
            Some(shader) if !shader.compiled => {
                return Err(format!("ERROR: Link failed: {name} shader is not compiled"))
            }
            Some(_) => {}
        }
    }

    let mut uniforms: Vec<ProgramVariable> = Vec::new();
    let mut attributes: Vec<ProgramVariable> = Vec::new();
    let mut next_location = 0;
    for shader in shaders {
        for declaration in &shader.declarations {
            match declaration.kind {
                DeclarationKind::Uniform => {
                    if let Some(existing) = uniforms.iter().find(|u| u.name == declaration.name) {
                        if existing.ty != declaration.ty || existing.size != declaration.size {
                            return Err(format!(
                                "ERROR: Link failed: uniform '{}' declared with different types",
                                declaration.name
                            ));
                        }
                        continue;
                    }
                    uniforms.push(ProgramVariable {
                        name: declaration.name.clone(),
                        ty: declaration.ty,
                        size: declaration.size,
                        location: next_location,
                    });
                    next_location += declaration.size;
                }
                DeclarationKind::Attribute if shader.stage == gl::VERTEX_SHADER => {
                    if attributes.iter().any(|a| a.name == declaration.name) {
                        continue;
                    }
                    attributes.push(ProgramVariable {
                        name: declaration.name.clone(),
                        ty: declaration.ty,
                        size: declaration.size,
                        location: attributes.len() as i32,
                    });
                }
                DeclarationKind::Attribute => {}
            }
        }
    }
    if attributes.len() > max_attribs as usize {
        return Err(format!(
            "ERROR: Link failed: too many vertex attributes ({} > {max_attribs})",
            attributes.len()
        ));
    }
    Ok((uniforms, attributes))
}

/// A [`GlDevice`] that runs entirely in memory.
///
/// Like a real context it is confined to one thread; interior state lives in
/// a `RefCell`.
pub struct HeadlessDevice {
    config: HeadlessConfig,
    state: RefCell<DeviceState>,
}

impl fmt::Debug for HeadlessDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.borrow();
        f.debug_struct("HeadlessDevice")
            .field("generation", &state.generation)
            .field("textures", &state.textures.len())
            .field("buffers", &state.buffers.len())
            .field("programs", &state.programs.len())
            .finish()
    }
}

impl Default for HeadlessDevice {
    fn default() -> Self {
        Self::new(HeadlessConfig::default())
    }
}

impl HeadlessDevice {
    /// Creates a device advertising the capabilities in `config`.
    pub fn new(config: HeadlessConfig) -> Self {
        let state = DeviceState::new(config.max_vertex_attribs);
        Self {
            config,
            state: RefCell::new(state),
        }
    }

    /// The advertised capabilities.
    pub fn config(&self) -> &HeadlessConfig {
        &self.config
    }

    fn call<R>(&self, name: &'static str, f: impl FnOnce(&mut DeviceState) -> R) -> R {
        let mut state = self.state.borrow_mut();
        *state.calls.entry(name).or_insert(0) += 1;
        f(&mut state)
    }

    // --- Simulation ---

    /// Drops every GPU object, as happens when a real context is lost.
    ///
    /// Handles handed out before the loss become invalid; new handles keep
    /// counting up. Call counts and the draw log survive.
    pub fn lose_context(&self) {
        let mut state = self.state.borrow_mut();
        state.textures.clear();
        state.buffers.clear();
        state.shaders.clear();
        state.programs.clear();
        state.texture_bindings.clear();
        state.active_unit = 0;
        state.array_buffer = 0;
        state.element_buffer = 0;
        state.current_program = 0;
        state.pixel_store = default_pixel_store();
        state.attribs = vec![VertexAttribState::default(); self.config.max_vertex_attribs as usize];
        state.error = gl::NO_ERROR;
        state.generation += 1;
        log::info!(
            "Headless device: context lost (generation {})",
            state.generation
        );
    }

    /// Number of context losses simulated so far.
    pub fn context_generation(&self) -> u32 {
        self.state.borrow().generation
    }

    /// Raises `code` as if the last call had failed.
    pub fn inject_error(&self, code: u32) {
        self.state.borrow_mut().fail(code, "inject_error");
    }

    /// Makes the next `gen_*` / `create_*` call return `0`.
    pub fn fail_next_allocation(&self) {
        self.state.borrow_mut().fail_next_allocation = true;
    }

    // --- Call accounting ---

    /// How many times the named `GlDevice` method was called.
    pub fn call_count(&self, name: &str) -> usize {
        self.state.borrow().calls.get(name).copied().unwrap_or(0)
    }

    /// Resets every call counter and the draw log.
    pub fn reset_call_counts(&self) {
        let mut state = self.state.borrow_mut();
        state.calls.clear();
        state.draws.clear();
    }

    /// Every draw call that passed validation, in order.
    pub fn draw_calls(&self) -> Vec<DrawCall> {
        self.state.borrow().draws.clone()
    }

    // --- Object inspection ---

    /// Whether `handle` names a live texture.
    pub fn is_texture(&self, handle: u32) -> bool {
        self.state.borrow().textures.contains_key(&handle)
    }

    /// Whether `handle` names a live buffer.
    pub fn is_buffer(&self, handle: u32) -> bool {
        self.state.borrow().buffers.contains_key(&handle)
    }

    /// Whether `handle` names a live shader object.
    pub fn is_shader(&self, handle: u32) -> bool {
        self.state.borrow().shaders.contains_key(&handle)
    }

    /// Whether `handle` names a live program.
    pub fn is_program(&self, handle: u32) -> bool {
        self.state.borrow().programs.contains_key(&handle)
    }

    /// Number of live textures.
    pub fn live_textures(&self) -> usize {
        self.state.borrow().textures.len()
    }

    /// Number of live buffers.
    pub fn live_buffers(&self) -> usize {
        self.state.borrow().buffers.len()
    }

    /// Number of live shader objects.
    pub fn live_shaders(&self) -> usize {
        self.state.borrow().shaders.len()
    }

    /// Number of live programs.
    pub fn live_programs(&self) -> usize {
        self.state.borrow().programs.len()
    }

    /// A copy of one image level of a texture.
    pub fn texture_level(&self, texture: u32, level: i32) -> Option<TextureLevel> {
        self.state
            .borrow()
            .textures
            .get(&texture)
            .and_then(|t| t.levels.get(&level).cloned())
    }

    /// Number of specified image levels of a texture.
    pub fn mip_level_count(&self, texture: u32) -> usize {
        self.state
            .borrow()
            .textures
            .get(&texture)
            .map_or(0, |t| t.levels.len())
    }

    /// An integer texture parameter (filters and wraps).
    pub fn texture_parameter_i(&self, texture: u32, pname: u32) -> Option<i32> {
        self.state
            .borrow()
            .textures
            .get(&texture)
            .and_then(|t| t.parameters_i.get(&pname).copied())
    }

    /// A float texture parameter (anisotropy).
    pub fn texture_parameter_f(&self, texture: u32, pname: u32) -> Option<f32> {
        self.state
            .borrow()
            .textures
            .get(&texture)
            .and_then(|t| t.parameters_f.get(&pname).copied())
    }

    /// A copy of a buffer's store.
    pub fn buffer_contents(&self, buffer: u32) -> Option<Vec<u8>> {
        self.state
            .borrow()
            .buffers
            .get(&buffer)
            .map(|b| b.data.clone())
    }

    /// The usage hint of a buffer's store, `0` before `buffer_data`.
    pub fn buffer_usage(&self, buffer: u32) -> Option<u32> {
        self.state.borrow().buffers.get(&buffer).map(|b| b.usage)
    }

    /// Whether a program linked successfully.
    pub fn is_program_linked(&self, program: u32) -> bool {
        self.state
            .borrow()
            .programs
            .get(&program)
            .is_some_and(|p| p.linked)
    }

    /// The value last written to a uniform of `program`, by `name` or `name[i]`.
    pub fn uniform_value(&self, program: u32, name: &str) -> Option<UniformValue> {
        let state = self.state.borrow();
        let program = state.programs.get(&program)?;
        let location = resolve_location(&program.uniforms, name);
        program.values.get(&location).cloned()
    }

    /// The state of a generic vertex attribute.
    pub fn vertex_attrib_state(&self, index: u32) -> Option<VertexAttribState> {
        self.state.borrow().attribs.get(index as usize).copied()
    }

    /// The texture bound to `target` on unit `unit` (an index, not `TEXTURE0 + n`).
    pub fn bound_texture(&self, unit: u32, target: u32) -> u32 {
        self.state
            .borrow()
            .texture_bindings
            .get(&(unit, target))
            .copied()
            .unwrap_or(0)
    }

    /// The buffer bound to `target`.
    pub fn bound_buffer(&self, target: u32) -> u32 {
        self.state.borrow().bound_buffer(target).unwrap_or(0)
    }

    /// Index of the active texture unit.
    pub fn active_unit(&self) -> u32 {
        self.state.borrow().active_unit
    }

    /// The program in use.
    pub fn current_program(&self) -> u32 {
        self.state.borrow().current_program
    }

    /// A pixel-store parameter.
    pub fn pixel_store(&self, pname: u32) -> i32 {
        self.state
            .borrow()
            .pixel_store
            .get(&pname)
            .copied()
            .unwrap_or(0)
    }

    fn query(&self, state: &mut DeviceState, pname: u32, operation: &str) -> Option<i32> {
        Some(match pname {
            gl::MAX_TEXTURE_SIZE => self.config.max_texture_size,
            gl::MAX_VERTEX_ATTRIBS => self.config.max_vertex_attribs as i32,
            gl::MAX_TEXTURE_IMAGE_UNITS => self.config.max_texture_image_units as i32,
            gl::ACTIVE_TEXTURE => (gl::TEXTURE0 + state.active_unit) as i32,
            gl::CURRENT_PROGRAM => state.current_program as i32,
            gl::UNPACK_ALIGNMENT | gl::PACK_ALIGNMENT => {
                state.pixel_store.get(&pname).copied().unwrap_or(4)
            }
            _ => {
                state.fail(gl::INVALID_ENUM, operation);
                return None;
            }
        })
    }

    fn supports(&self, name: &str) -> bool {
        self.config.extensions.iter().any(|e| e == name)
    }
}

impl GlDevice for HeadlessDevice {
    // --- Textures ---

    fn gen_texture(&self) -> u32 {
        self.call("gen_texture", |s| {
            let handle = s.allocate();
            if handle != 0 {
                s.textures.insert(handle, TextureObject::new());
            }
            handle
        })
    }

    fn delete_texture(&self, texture: u32) {
        self.call("delete_texture", |s| {
            if s.textures.remove(&texture).is_some() {
                s.texture_bindings.retain(|_, bound| *bound != texture);
            }
        })
    }

    fn bind_texture(&self, target: u32, texture: u32) {
        self.call("bind_texture", |s| {
            if texture != 0 {
                let Some(object) = s.textures.get_mut(&texture) else {
                    s.fail(gl::INVALID_OPERATION, "bind_texture");
                    return;
                };
                match object.target {
                    Some(existing) if existing != target => {
                        s.fail(gl::INVALID_OPERATION, "bind_texture");
                        return;
                    }
                    Some(_) => {}
                    None => object.target = Some(target),
                }
            }
            let key = (s.active_unit, target);
            s.texture_bindings.insert(key, texture);
        })
    }

    fn active_texture(&self, unit: u32) {
        let units = self.config.max_texture_image_units;
        self.call("active_texture", |s| {
            match unit.checked_sub(gl::TEXTURE0) {
                Some(index) if index < units => s.active_unit = index,
                _ => s.fail(gl::INVALID_ENUM, "active_texture"),
            }
        })
    }

    fn pixel_store_i(&self, pname: u32, param: i32) {
        self.call("pixel_store_i", |s| {
            if pname != gl::UNPACK_ALIGNMENT && pname != gl::PACK_ALIGNMENT {
                s.fail(gl::INVALID_ENUM, "pixel_store_i");
            } else if !matches!(param, 1 | 2 | 4 | 8) {
                s.fail(gl::INVALID_VALUE, "pixel_store_i");
            } else {
                s.pixel_store.insert(pname, param);
            }
        })
    }

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
    ) {
        let max_size = self.config.max_texture_size;
        self.call("tex_image_2d", |s| {
            let op = "tex_image_2d";
            if level < 0 || width < 0 || height < 0 || width > max_size || height > max_size {
                s.fail(gl::INVALID_VALUE, op);
                return;
            }
            let Some(bpp) = bytes_per_pixel(format, ty) else {
                s.fail(gl::INVALID_ENUM, op);
                return;
            };
            if internal_format as u32 != format {
                s.fail(gl::INVALID_OPERATION, op);
                return;
            }
            let (w, h) = (width as usize, height as usize);
            let alignment = s.unpack_alignment();
            let pixels = match pixels {
                Some(pixels) if pixels.len() < unpacked_len(w, h, bpp, alignment) => {
                    s.fail(gl::INVALID_OPERATION, op);
                    return;
                }
                Some(pixels) => unpack(pixels, w, h, bpp, alignment),
                None => vec![0; w * h * bpp],
            };
            let Some(texture) = s.bound_texture_mut(target, op) else {
                return;
            };
            texture.levels.insert(
                level,
                TextureLevel {
                    width,
                    height,
                    internal_format,
                    format,
                    ty,
                    pixels,
                },
            );
        })
    }

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
    ) {
        self.call("tex_sub_image_2d", |s| {
            let op = "tex_sub_image_2d";
            let alignment = s.unpack_alignment();
            let Some(texture) = s.bound_texture_mut(target, op) else {
                return;
            };
            let error = match texture.levels.get_mut(&level) {
                None => Some(gl::INVALID_OPERATION),
                Some(image) if image.format != format || image.ty != ty => {
                    Some(gl::INVALID_OPERATION)
                }
                Some(_) if x_offset < 0 || y_offset < 0 || width < 0 || height < 0 => {
                    Some(gl::INVALID_VALUE)
                }
                Some(image)
                    if x_offset + width > image.width || y_offset + height > image.height =>
                {
                    Some(gl::INVALID_VALUE)
                }
                Some(image) => {
                    let bpp = bytes_per_pixel(format, ty).unwrap_or(1);
                    let (w, h) = (width as usize, height as usize);
                    if pixels.len() < unpacked_len(w, h, bpp, alignment) {
                        Some(gl::INVALID_OPERATION)
                    } else {
                        let rows = unpack(pixels, w, h, bpp, alignment);
                        let dst_stride = image.width as usize * bpp;
                        for y in 0..h {
                            let dst = (y_offset as usize + y) * dst_stride + x_offset as usize * bpp;
                            image.pixels[dst..dst + w * bpp]
                                .copy_from_slice(&rows[y * w * bpp..(y + 1) * w * bpp]);
                        }
                        None
                    }
                }
            };
            if let Some(code) = error {
                s.fail(code, op);
            }
        })
    }

    fn tex_parameter_i(&self, target: u32, pname: u32, param: i32) {
        self.call("tex_parameter_i", |s| {
            let op = "tex_parameter_i";
            if !matches!(
                pname,
                gl::TEXTURE_MIN_FILTER | gl::TEXTURE_MAG_FILTER | gl::TEXTURE_WRAP_S | gl::TEXTURE_WRAP_T
            ) || !is_valid_texture_parameter(pname, param)
            {
                s.fail(gl::INVALID_ENUM, op);
                return;
            }
            if let Some(texture) = s.bound_texture_mut(target, op) {
                texture.parameters_i.insert(pname, param);
            }
        })
    }

    fn tex_parameter_f(&self, target: u32, pname: u32, param: f32) {
        let anisotropy = self.supports(gl::EXT_TEXTURE_FILTER_ANISOTROPIC);
        let max_anisotropy = self.config.max_anisotropy;
        self.call("tex_parameter_f", |s| {
            let op = "tex_parameter_f";
            if pname == gl::TEXTURE_MAX_ANISOTROPY_EXT {
                if !anisotropy {
                    s.fail(gl::INVALID_ENUM, op);
                    return;
                }
                if param < 1.0 {
                    s.fail(gl::INVALID_VALUE, op);
                    return;
                }
                if let Some(texture) = s.bound_texture_mut(target, op) {
                    texture.parameters_f.insert(pname, param.min(max_anisotropy));
                }
                return;
            }
            if !is_valid_texture_parameter(pname, param as i32) {
                s.fail(gl::INVALID_ENUM, op);
                return;
            }
            if let Some(texture) = s.bound_texture_mut(target, op) {
                texture.parameters_i.insert(pname, param as i32);
            }
        })
    }

    fn generate_mipmap(&self, target: u32) {
        self.call("generate_mipmap", |s| {
            let op = "generate_mipmap";
            let Some(texture) = s.bound_texture_mut(target, op) else {
                return;
            };
            let Some(base) = texture.levels.get(&0).cloned() else {
                s.fail(gl::INVALID_OPERATION, op);
                return;
            };
            if base.width == 0 || base.height == 0 {
                s.fail(gl::INVALID_OPERATION, op);
                return;
            }
            let bpp = bytes_per_pixel(base.format, base.ty).unwrap_or(1);
            texture.levels.retain(|&level, _| level == 0);
            let mut current = base;
            let mut level = 0;
            while current.width > 1 || current.height > 1 {
                current = downsample(&current, bpp);
                level += 1;
                texture.levels.insert(level, current.clone());
            }
        })
    }

    // --- Buffers ---

    fn gen_buffer(&self) -> u32 {
        self.call("gen_buffer", |s| {
            let handle = s.allocate();
            if handle != 0 {
                s.buffers.insert(
                    handle,
                    BufferObject {
                        data: Vec::new(),
                        usage: 0,
                    },
                );
            }
            handle
        })
    }

    fn delete_buffer(&self, buffer: u32) {
        self.call("delete_buffer", |s| {
            if s.buffers.remove(&buffer).is_none() {
                return;
            }
            if s.array_buffer == buffer {
                s.array_buffer = 0;
            }
            if s.element_buffer == buffer {
                s.element_buffer = 0;
            }
            for attrib in s.attribs.iter_mut().filter(|a| a.buffer == buffer) {
                attrib.buffer = 0;
            }
        })
    }

    fn bind_buffer(&self, target: u32, buffer: u32) {
        self.call("bind_buffer", |s| {
            if buffer != 0 && !s.buffers.contains_key(&buffer) {
                s.fail(gl::INVALID_OPERATION, "bind_buffer");
                return;
            }
            match target {
                gl::ARRAY_BUFFER => s.array_buffer = buffer,
                gl::ELEMENT_ARRAY_BUFFER => s.element_buffer = buffer,
                _ => s.fail(gl::INVALID_ENUM, "bind_buffer"),
            }
        })
    }

    fn buffer_data(&self, target: u32, size: usize, data: Option<&[u8]>, usage: u32) {
        self.call("buffer_data", |s| {
            let op = "buffer_data";
            if !matches!(usage, gl::STREAM_DRAW | gl::STATIC_DRAW | gl::DYNAMIC_DRAW) {
                s.fail(gl::INVALID_ENUM, op);
                return;
            }
            let store = match data {
                Some(data) if data.len() < size => {
                    s.fail(gl::INVALID_VALUE, op);
                    return;
                }
                Some(data) => data[..size].to_vec(),
                None => vec![0; size],
            };
            if let Some(buffer) = s.bound_buffer_mut(target, op) {
                buffer.data = store;
                buffer.usage = usage;
            }
        })
    }

    fn buffer_sub_data(&self, target: u32, offset: usize, data: &[u8]) {
        self.call("buffer_sub_data", |s| {
            let op = "buffer_sub_data";
            let Some(buffer) = s.bound_buffer_mut(target, op) else {
                return;
            };
            let end = offset + data.len();
            if end > buffer.data.len() {
                s.fail(gl::INVALID_VALUE, op);
                return;
            }
            buffer.data[offset..end].copy_from_slice(data);
        })
    }

    // --- Vertex attributes ---

    fn enable_vertex_attrib_array(&self, index: u32) {
        self.call("enable_vertex_attrib_array", |s| {
            if let Some(attrib) = s.attrib_mut(index, "enable_vertex_attrib_array") {
                attrib.enabled = true;
            }
        })
    }

    fn disable_vertex_attrib_array(&self, index: u32) {
        self.call("disable_vertex_attrib_array", |s| {
            if let Some(attrib) = s.attrib_mut(index, "disable_vertex_attrib_array") {
                attrib.enabled = false;
            }
        })
    }

    fn vertex_attrib_pointer(
        &self,
        index: u32,
        size: i32,
        ty: u32,
        normalized: bool,
        stride: i32,
        offset: usize,
    ) {
        self.call("vertex_attrib_pointer", |s| {
            let op = "vertex_attrib_pointer";
            if !(1..=4).contains(&size) || stride < 0 {
                s.fail(gl::INVALID_VALUE, op);
                return;
            }
            if !matches!(
                ty,
                gl::BYTE | gl::UNSIGNED_BYTE | gl::SHORT | gl::UNSIGNED_SHORT | gl::FIXED | gl::FLOAT
            ) {
                s.fail(gl::INVALID_ENUM, op);
                return;
            }
            let buffer = s.array_buffer;
            if buffer == 0 {
                s.fail(gl::INVALID_OPERATION, op);
                return;
            }
            if let Some(attrib) = s.attrib_mut(index, op) {
                attrib.size = size;
                attrib.ty = ty;
                attrib.normalized = normalized;
                attrib.stride = stride;
                attrib.offset = offset;
                attrib.buffer = buffer;
            }
        })
    }

    fn vertex_attrib_divisor(&self, index: u32, divisor: u32) {
        self.call("vertex_attrib_divisor", |s| {
            if let Some(attrib) = s.attrib_mut(index, "vertex_attrib_divisor") {
                attrib.divisor = divisor;
            }
        })
    }

    fn vertex_attrib_4f(&self, index: u32, x: f32, y: f32, z: f32, w: f32) {
        self.call("vertex_attrib_4f", |s| {
            if let Some(attrib) = s.attrib_mut(index, "vertex_attrib_4f") {
                attrib.constant = [x, y, z, w];
            }
        })
    }

    // --- Drawing ---

    fn draw_arrays(&self, mode: u32, first: i32, count: i32) {
        self.call("draw_arrays", |s| s.draw_arrays(mode, first, count, 1, "draw_arrays"))
    }

    fn draw_elements(&self, mode: u32, count: i32, ty: u32, offset: usize) {
        self.call("draw_elements", |s| {
            s.draw_elements(mode, count, ty, offset, 1, "draw_elements")
        })
    }

    fn draw_arrays_instanced(&self, mode: u32, first: i32, count: i32, instances: i32) {
        self.call("draw_arrays_instanced", |s| {
            s.draw_arrays(mode, first, count, instances, "draw_arrays_instanced")
        })
    }

    fn draw_elements_instanced(
        &self,
        mode: u32,
        count: i32,
        ty: u32,
        offset: usize,
        instances: i32,
    ) {
        self.call("draw_elements_instanced", |s| {
            s.draw_elements(mode, count, ty, offset, instances, "draw_elements_instanced")
        })
    }

    // --- Shaders and programs ---

    fn create_shader(&self, ty: u32) -> u32 {
        self.call("create_shader", |s| {
            if ty != gl::VERTEX_SHADER && ty != gl::FRAGMENT_SHADER {
                s.fail(gl::INVALID_ENUM, "create_shader");
                return 0;
            }
            let handle = s.allocate();
            if handle != 0 {
                s.shaders.insert(
                    handle,
                    ShaderObject {
                        stage: ty,
                        source: String::new(),
                        compiled: false,
                        log: String::new(),
                        declarations: Vec::new(),
                    },
                );
            }
            handle
        })
    }

    fn shader_source(&self, shader: u32, source: &str) {
        self.call("shader_source", |s| match s.shaders.get_mut(&shader) {
            Some(object) => object.source = source.to_string(),
            None => s.fail(gl::INVALID_VALUE, "shader_source"),
        })
    }

    fn compile_shader(&self, shader: u32) {
        self.call("compile_shader", |s| {
            let Some(object) = s.shaders.get_mut(&shader) else {
                s.fail(gl::INVALID_VALUE, "compile_shader");
                return;
            };
            match glsl::compile(object.stage, &object.source) {
                Ok(declarations) => {
                    object.compiled = true;
                    object.log.clear();
                    object.declarations = declarations;
                }
                Err(log) => {
                    object.compiled = false;
                    object.log = log;
                    object.declarations.clear();
                }
            }
        })
    }

    fn get_shader_iv(&self, shader: u32, pname: u32) -> i32 {
        self.call("get_shader_iv", |s| {
            let Some(object) = s.shaders.get(&shader) else {
                s.fail(gl::INVALID_VALUE, "get_shader_iv");
                return 0;
            };
            match pname {
                gl::COMPILE_STATUS => object.compiled as i32,
                gl::INFO_LOG_LENGTH if object.log.is_empty() => 0,
                gl::INFO_LOG_LENGTH => object.log.len() as i32 + 1,
                _ => {
                    s.fail(gl::INVALID_ENUM, "get_shader_iv");
                    0
                }
            }
        })
    }

    fn get_shader_info_log(&self, shader: u32) -> String {
        self.call("get_shader_info_log", |s| match s.shaders.get(&shader) {
            Some(object) => object.log.clone(),
            None => {
                s.fail(gl::INVALID_VALUE, "get_shader_info_log");
                String::new()
            }
        })
    }

    fn delete_shader(&self, shader: u32) {
        self.call("delete_shader", |s| {
            s.shaders.remove(&shader);
        })
    }

    fn create_program(&self) -> u32 {
        self.call("create_program", |s| {
            let handle = s.allocate();
            if handle != 0 {
                s.programs.insert(handle, ProgramObject::default());
            }
            handle
        })
    }

    fn attach_shader(&self, program: u32, shader: u32) {
        self.call("attach_shader", |s| {
            let op = "attach_shader";
            if !s.shaders.contains_key(&shader) {
                s.fail(gl::INVALID_VALUE, op);
                return;
            }
            let Some(object) = s.programs.get_mut(&program) else {
                s.fail(gl::INVALID_VALUE, op);
                return;
            };
            if object.shaders.contains(&shader) {
                s.fail(gl::INVALID_OPERATION, op);
                return;
            }
            object.shaders.push(shader);
        })
    }

    fn link_program(&self, program: u32) {
        let max_attribs = self.config.max_vertex_attribs;
        self.call("link_program", |s| s.link(program, max_attribs))
    }

    fn get_program_iv(&self, program: u32, pname: u32) -> i32 {
        self.call("get_program_iv", |s| {
            let Some(object) = s.programs.get(&program) else {
                s.fail(gl::INVALID_VALUE, "get_program_iv");
                return 0;
            };
            match pname {
                gl::LINK_STATUS => object.linked as i32,
                gl::ACTIVE_UNIFORMS => object.uniforms.len() as i32,
                gl::ACTIVE_ATTRIBUTES => object.attributes.len() as i32,
                gl::INFO_LOG_LENGTH if object.log.is_empty() => 0,
                gl::INFO_LOG_LENGTH => object.log.len() as i32 + 1,
                _ => {
                    s.fail(gl::INVALID_ENUM, "get_program_iv");
                    0
                }
            }
        })
    }

    fn get_program_info_log(&self, program: u32) -> String {
        self.call("get_program_info_log", |s| match s.programs.get(&program) {
            Some(object) => object.log.clone(),
            None => {
                s.fail(gl::INVALID_VALUE, "get_program_info_log");
                String::new()
            }
        })
    }

    fn use_program(&self, program: u32) {
        self.call("use_program", |s| {
            if program == 0 {
                s.current_program = 0;
                return;
            }
            match s.programs.get(&program) {
                None => s.fail(gl::INVALID_VALUE, "use_program"),
                Some(object) if !object.linked => s.fail(gl::INVALID_OPERATION, "use_program"),
                Some(_) => s.current_program = program,
            }
        })
    }

    fn delete_program(&self, program: u32) {
        self.call("delete_program", |s| {
            if s.programs.remove(&program).is_some() && s.current_program == program {
                s.current_program = 0;
            }
        })
    }

    /// Reports array uniforms by their base name.
    fn get_active_uniform(&self, program: u32, index: u32) -> Option<ActiveVariable> {
        self.call("get_active_uniform", |s| {
            let variable = s
                .programs
                .get(&program)
                .and_then(|p| p.uniforms.get(index as usize))
                .map(|v| ActiveVariable {
                    name: v.name.clone(),
                    size: v.size,
                    ty: v.ty,
                });
            if variable.is_none() {
                s.fail(gl::INVALID_VALUE, "get_active_uniform");
            }
            variable
        })
    }

    fn get_active_attrib(&self, program: u32, index: u32) -> Option<ActiveVariable> {
        self.call("get_active_attrib", |s| {
            let variable = s
                .programs
                .get(&program)
                .and_then(|p| p.attributes.get(index as usize))
                .map(|v| ActiveVariable {
                    name: v.name.clone(),
                    size: v.size,
                    ty: v.ty,
                });
            if variable.is_none() {
                s.fail(gl::INVALID_VALUE, "get_active_attrib");
            }
            variable
        })
    }

    fn get_uniform_location(&self, program: u32, name: &str) -> i32 {
        self.call("get_uniform_location", |s| match s.programs.get(&program) {
            Some(object) if object.linked => resolve_location(&object.uniforms, name),
            Some(_) => {
                s.fail(gl::INVALID_OPERATION, "get_uniform_location");
                -1
            }
            None => {
                s.fail(gl::INVALID_VALUE, "get_uniform_location");
                -1
            }
        })
    }

    fn get_attrib_location(&self, program: u32, name: &str) -> i32 {
        self.call("get_attrib_location", |s| match s.programs.get(&program) {
            Some(object) if object.linked => resolve_location(&object.attributes, name),
            Some(_) => {
                s.fail(gl::INVALID_OPERATION, "get_attrib_location");
                -1
            }
            None => {
                s.fail(gl::INVALID_VALUE, "get_attrib_location");
                -1
            }
        })
    }

    // --- Uniforms ---

    fn uniform_1i(&self, location: i32, x: i32) {
        self.call("uniform_1i", |s| {
            s.store_uniform(location, UniformValue::Int(vec![x]), "uniform_1i")
        })
    }

    fn uniform_2i(&self, location: i32, x: i32, y: i32) {
        self.call("uniform_2i", |s| {
            s.store_uniform(location, UniformValue::Int(vec![x, y]), "uniform_2i")
        })
    }

    fn uniform_3i(&self, location: i32, x: i32, y: i32, z: i32) {
        self.call("uniform_3i", |s| {
            s.store_uniform(location, UniformValue::Int(vec![x, y, z]), "uniform_3i")
        })
    }

    fn uniform_4i(&self, location: i32, x: i32, y: i32, z: i32, w: i32) {
        self.call("uniform_4i", |s| {
            s.store_uniform(location, UniformValue::Int(vec![x, y, z, w]), "uniform_4i")
        })
    }

    fn uniform_1f(&self, location: i32, x: f32) {
        self.call("uniform_1f", |s| {
            s.store_uniform(location, UniformValue::Float(vec![x]), "uniform_1f")
        })
    }

    fn uniform_2f(&self, location: i32, x: f32, y: f32) {
        self.call("uniform_2f", |s| {
            s.store_uniform(location, UniformValue::Float(vec![x, y]), "uniform_2f")
        })
    }

    fn uniform_3f(&self, location: i32, x: f32, y: f32, z: f32) {
        self.call("uniform_3f", |s| {
            s.store_uniform(location, UniformValue::Float(vec![x, y, z]), "uniform_3f")
        })
    }

    fn uniform_4f(&self, location: i32, x: f32, y: f32, z: f32, w: f32) {
        self.call("uniform_4f", |s| {
            s.store_uniform(location, UniformValue::Float(vec![x, y, z, w]), "uniform_4f")
        })
    }

    fn uniform_1fv(&self, location: i32, values: &[f32]) {
        self.call("uniform_1fv", |s| {
            s.store_uniform(location, UniformValue::Float(values.to_vec()), "uniform_1fv")
        })
    }

    fn uniform_2fv(&self, location: i32, values: &[f32]) {
        self.call("uniform_2fv", |s| {
            s.store_uniform(location, UniformValue::Float(values.to_vec()), "uniform_2fv")
        })
    }

    fn uniform_3fv(&self, location: i32, values: &[f32]) {
        self.call("uniform_3fv", |s| {
            s.store_uniform(location, UniformValue::Float(values.to_vec()), "uniform_3fv")
        })
    }

    fn uniform_4fv(&self, location: i32, values: &[f32]) {
        self.call("uniform_4fv", |s| {
            s.store_uniform(location, UniformValue::Float(values.to_vec()), "uniform_4fv")
        })
    }

    fn uniform_matrix_2fv(&self, location: i32, transpose: bool, values: &[f32]) {
        self.call("uniform_matrix_2fv", |s| {
            let value = UniformValue::Matrix {
                dimension: 2,
                transpose,
                values: values.to_vec(),
            };
            s.store_uniform(location, value, "uniform_matrix_2fv")
        })
    }

    fn uniform_matrix_3fv(&self, location: i32, transpose: bool, values: &[f32]) {
        self.call("uniform_matrix_3fv", |s| {
            let value = UniformValue::Matrix {
                dimension: 3,
                transpose,
                values: values.to_vec(),
            };
            s.store_uniform(location, value, "uniform_matrix_3fv")
        })
    }

    fn uniform_matrix_4fv(&self, location: i32, transpose: bool, values: &[f32]) {
        self.call("uniform_matrix_4fv", |s| {
            let value = UniformValue::Matrix {
                dimension: 4,
                transpose,
                values: values.to_vec(),
            };
            s.store_uniform(location, value, "uniform_matrix_4fv")
        })
    }

    // --- State queries ---

    fn get_integer(&self, pname: u32) -> i32 {
        self.call("get_integer", |s| {
            self.query(s, pname, "get_integer").unwrap_or(0)
        })
    }

    fn get_float(&self, pname: u32) -> f32 {
        let anisotropy = self.supports(gl::EXT_TEXTURE_FILTER_ANISOTROPIC);
        self.call("get_float", |s| {
            if pname == gl::MAX_TEXTURE_MAX_ANISOTROPY_EXT {
                if anisotropy {
                    return self.config.max_anisotropy;
                }
                s.fail(gl::INVALID_ENUM, "get_float");
                return 0.0;
            }
            self.query(s, pname, "get_float").map_or(0.0, |v| v as f32)
        })
    }

    fn get_error(&self) -> u32 {
        self.call("get_error", |s| std::mem::replace(&mut s.error, gl::NO_ERROR))
    }

    fn supports_extension(&self, name: &str) -> bool {
        self.call("supports_extension", |_| ());
        self.supports(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const VERTEX: &str = "attribute vec2 a_position;\nuniform mat4 u_projTrans;\nuniform vec4 u_tints[3];\nvoid main() { gl_Position = u_projTrans * vec4(a_position, 0.0, 1.0); }";
    const FRAGMENT: &str = "uniform sampler2D u_texture;\nvoid main() { gl_FragColor = vec4(1.0); }";

    fn linked_program(device: &HeadlessDevice) -> u32 {
        let program = device.create_program();
        for (stage, source) in [(gl::VERTEX_SHADER, VERTEX), (gl::FRAGMENT_SHADER, FRAGMENT)] {
            let shader = device.create_shader(stage);
            device.shader_source(shader, source);
            device.compile_shader(shader);
            device.attach_shader(program, shader);
        }
        device.link_program(program);
        program
    }

    #[test]
    fn test_error_flag_keeps_the_first_error() {
        let device = HeadlessDevice::default();
        device.bind_texture(gl::TEXTURE_2D, 42);
        device.active_texture(gl::TEXTURE0 + 1000);
        assert_eq!(device.get_error(), gl::INVALID_OPERATION);
        assert_eq!(device.get_error(), gl::NO_ERROR);
    }

    #[test]
    fn test_tex_image_honours_unpack_alignment() {
        let device = HeadlessDevice::default();
        let texture = device.gen_texture();
        device.bind_texture(gl::TEXTURE_2D, texture);

        // 3x2 RGB rows are 9 bytes; with the default alignment of 4 each row is padded to 12.
        let tight = [1u8; 18];
        let rgb = gl::RGB as i32;
        device.tex_image_2d(gl::TEXTURE_2D, 0, rgb, 3, 2, gl::RGB, gl::UNSIGNED_BYTE, Some(&tight));
        assert_eq!(device.get_error(), gl::INVALID_OPERATION);

        device.pixel_store_i(gl::UNPACK_ALIGNMENT, 1);
        device.tex_image_2d(gl::TEXTURE_2D, 0, rgb, 3, 2, gl::RGB, gl::UNSIGNED_BYTE, Some(&tight));
        assert_eq!(device.get_error(), gl::NO_ERROR);
        let level = device.texture_level(texture, 0).unwrap();
        assert_eq!((level.width, level.height, level.pixels.len()), (3, 2, 18));
    }

    #[test]
    fn test_padded_rows_are_unpacked() {
        let device = HeadlessDevice::default();
        let texture = device.gen_texture();
        device.bind_texture(gl::TEXTURE_2D, texture);
        let padded = [1, 2, 3, 0, 4, 5, 6];
        let rgb = gl::RGB as i32;
        device.tex_image_2d(gl::TEXTURE_2D, 0, rgb, 1, 2, gl::RGB, gl::UNSIGNED_BYTE, Some(&padded));
        assert_eq!(device.texture_level(texture, 0).unwrap().pixels, [1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn test_generate_mipmap_builds_full_chain() {
        let device = HeadlessDevice::default();
        let texture = device.gen_texture();
        device.bind_texture(gl::TEXTURE_2D, texture);
        let rgba = gl::RGBA as i32;
        device.tex_image_2d(gl::TEXTURE_2D, 0, rgba, 8, 2, gl::RGBA, gl::UNSIGNED_BYTE, None);
        device.generate_mipmap(gl::TEXTURE_2D);
        // 8x2, 4x1, 2x1, 1x1
        assert_eq!(device.mip_level_count(texture), 4);
        assert_eq!(device.texture_level(texture, 3).unwrap().width, 1);
    }

    #[test]
    fn test_anisotropy_requires_extension() {
        let device = HeadlessDevice::new(HeadlessConfig::without_extensions());
        let texture = device.gen_texture();
        device.bind_texture(gl::TEXTURE_2D, texture);
        device.tex_parameter_f(gl::TEXTURE_2D, gl::TEXTURE_MAX_ANISOTROPY_EXT, 4.0);
        assert_eq!(device.get_error(), gl::INVALID_ENUM);
        assert!(!device.supports_extension(gl::EXT_TEXTURE_FILTER_ANISOTROPIC));
    }

    #[test]
    fn test_buffer_sub_data_bounds() {
        let device = HeadlessDevice::default();
        let buffer = device.gen_buffer();
        device.bind_buffer(gl::ARRAY_BUFFER, buffer);
        device.buffer_data(gl::ARRAY_BUFFER, 8, None, gl::STATIC_DRAW);
        device.buffer_sub_data(gl::ARRAY_BUFFER, 4, &[1, 2, 3, 4]);
        assert_eq!(device.get_error(), gl::NO_ERROR);
        device.buffer_sub_data(gl::ARRAY_BUFFER, 6, &[1, 2, 3, 4]);
        assert_eq!(device.get_error(), gl::INVALID_VALUE);
        assert_eq!(device.buffer_contents(buffer).unwrap(), [0, 0, 0, 0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_link_assigns_locations() {
        let device = HeadlessDevice::default();
        let program = linked_program(&device);
        assert!(device.is_program_linked(program));
        assert_eq!(device.get_program_iv(program, gl::ACTIVE_UNIFORMS), 3);
        assert_eq!(device.get_attrib_location(program, "a_position"), 0);
        let tints = device.get_uniform_location(program, "u_tints");
        assert_eq!(device.get_uniform_location(program, "u_tints[2]"), tints + 2);
        assert_eq!(device.get_uniform_location(program, "u_tints[3]"), -1);
        assert_eq!(device.get_uniform_location(program, "u_missing"), -1);
    }

    #[test]
    fn test_link_fails_without_fragment_stage() {
        let device = HeadlessDevice::default();
        let program = device.create_program();
        let shader = device.create_shader(gl::VERTEX_SHADER);
        device.shader_source(shader, VERTEX);
        device.compile_shader(shader);
        device.attach_shader(program, shader);
        device.link_program(program);
        assert_eq!(device.get_program_iv(program, gl::LINK_STATUS), 0);
        assert!(device.get_program_info_log(program).contains("fragment"));
    }

    #[test]
    fn test_uniform_type_checking() {
        let device = HeadlessDevice::default();
        let program = linked_program(&device);
        device.use_program(program);
        let sampler = device.get_uniform_location(program, "u_texture");
        device.uniform_1i(sampler, 2);
        assert_eq!(device.get_error(), gl::NO_ERROR);
        device.uniform_1f(sampler, 2.0);
        assert_eq!(device.get_error(), gl::INVALID_OPERATION);
        assert_eq!(
            device.uniform_value(program, "u_texture"),
            Some(UniformValue::Int(vec![2]))
        );
    }

    #[test]
    fn test_draw_requires_program_and_data() {
        let device = HeadlessDevice::default();
        device.draw_arrays(gl::TRIANGLES, 0, 3);
        assert_eq!(device.get_error(), gl::INVALID_OPERATION);

        let program = linked_program(&device);
        device.use_program(program);
        let buffer = device.gen_buffer();
        device.bind_buffer(gl::ARRAY_BUFFER, buffer);
        device.buffer_data(gl::ARRAY_BUFFER, 24, None, gl::STATIC_DRAW);
        device.enable_vertex_attrib_array(0);
        device.vertex_attrib_pointer(0, 2, gl::FLOAT, false, 8, 0);

        device.draw_arrays(gl::TRIANGLES, 0, 3);
        assert_eq!(device.get_error(), gl::NO_ERROR);
        device.draw_arrays(gl::TRIANGLES, 0, 4);
        assert_eq!(device.get_error(), gl::INVALID_OPERATION);
        assert_eq!(device.draw_calls().len(), 1);
    }

    #[test]
    fn test_lose_context_invalidates_handles() {
        let device = HeadlessDevice::default();
        let texture = device.gen_texture();
        device.lose_context();
        assert!(!device.is_texture(texture));
        assert_eq!(device.context_generation(), 1);
        assert_ne!(device.gen_texture(), texture);
        device.bind_texture(gl::TEXTURE_2D, texture);
        assert_eq!(device.get_error(), gl::INVALID_OPERATION);
    }

    #[test]
    fn test_simulated_allocation_failure() {
        let device = HeadlessDevice::default();
        device.fail_next_allocation();
        assert_eq!(device.gen_buffer(), 0);
        assert_ne!(device.gen_buffer(), 0);
        assert_eq!(device.call_count("gen_buffer"), 2);
    }
}
