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

//! GPU textures and their upload / reload lifecycle.

use super::mipmap;
use super::sampler::{SamplerState, TextureFilter, TextureTarget, TextureWrap};
use super::texture_data::{
    FileTextureData, GlOnlyTextureData, PixmapTextureData, TextureData, TextureDataType,
};
use crate::renderer::api::gl;
use crate::renderer::api::pixmap::{PixelFormat, Pixmap};
use crate::renderer::context::GraphicsContext;
use crate::renderer::error::ResourceError;
use crate::renderer::registry::{ManagedSlot, ResourceId, ResourceKind, ResourceState};
use std::borrow::Cow;
use std::fmt;
use std::path::Path;
use std::rc::Rc;

/// A texture object backed by a [`TextureData`] provider.
///
/// Creating a texture allocates its GPU handle but does not upload anything;
/// the first [`upload`](Self::upload) or [`bind`](Self::bind) does. A managed
/// texture is tracked by its [`GraphicsContext`] and transparently reloads
/// from its provider after a context-loss broadcast.
pub struct Texture {
    ctx: GraphicsContext,
    slot: Rc<ManagedSlot>,
    target: TextureTarget,
    handle: u32,
    data: Box<dyn TextureData>,
    sampler: SamplerState,
}

impl fmt::Debug for Texture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Texture")
            .field("id", &self.slot.id())
            .field("state", &self.slot.state())
            .field("target", &self.target)
            .field("handle", &self.handle)
            .field("data", &self.data)
            .field("sampler", &self.sampler)
            .finish()
    }
}

impl Texture {
    /// Creates a 2D texture from a provider.
    pub fn new(ctx: &GraphicsContext, data: Box<dyn TextureData>) -> Result<Self, ResourceError> {
        Self::with_target(ctx, TextureTarget::Texture2D, data)
    }

    /// Creates a texture bound to an explicit target.
    pub fn with_target(
        ctx: &GraphicsContext,
        target: TextureTarget,
        data: Box<dyn TextureData>,
    ) -> Result<Self, ResourceError> {
        let handle = ctx.gl().gen_texture();
        if handle == 0 {
            return Err(ResourceError::HandleAllocation("texture"));
        }
        let slot = ctx.allocate_slot(ResourceKind::Texture);
        if data.is_managed() {
            ctx.register(&slot);
        }
        log::debug!(
            "Created texture {} (handle {handle}, {:?}, managed: {})",
            slot.id(),
            target,
            data.is_managed()
        );

        let config = ctx.config();
        let sampler = SamplerState {
            min_filter: config.default_min_filter,
            mag_filter: config.default_mag_filter,
            wrap_u: config.default_wrap,
            wrap_v: config.default_wrap,
            anisotropic_level: 1.0,
        };
        Ok(Self {
            ctx: ctx.clone(),
            slot,
            target,
            handle,
            data,
            sampler,
        })
    }

    /// Creates an unmanaged texture from a pixmap, which is dropped after the first upload.
    pub fn from_pixmap(
        ctx: &GraphicsContext,
        pixmap: Pixmap,
        use_mipmaps: bool,
    ) -> Result<Self, ResourceError> {
        Self::new(ctx, Box::new(PixmapTextureData::new(pixmap, None, use_mipmaps, true)))
    }

    /// Creates a managed texture that retains `pixmap` for reloads.
    pub fn from_pixmap_managed(
        ctx: &GraphicsContext,
        pixmap: Pixmap,
        use_mipmaps: bool,
    ) -> Result<Self, ResourceError> {
        let data = PixmapTextureData::new(pixmap, None, use_mipmaps, false).with_managed(true);
        Self::new(ctx, Box::new(data))
    }

    /// Creates a managed texture from an image file. The file is decoded now,
    /// so a missing or malformed file fails here.
    pub fn from_file(
        ctx: &GraphicsContext,
        path: impl AsRef<Path>,
        use_mipmaps: bool,
    ) -> Result<Self, ResourceError> {
        let data = FileTextureData::preloaded(path.as_ref(), None, use_mipmaps)?;
        Self::new(ctx, Box::new(data))
    }

    /// Creates an unmanaged `width` x `height` texture filled with opaque white.
    pub fn with_size(
        ctx: &GraphicsContext,
        width: u32,
        height: u32,
        format: PixelFormat,
    ) -> Result<Self, ResourceError> {
        let pixmap = Pixmap::new(width, height, format)?;
        Self::from_pixmap(ctx, pixmap, false)
    }

    /// Creates a texture with uninitialized storage, e.g. for a render target.
    pub fn storage_only(
        ctx: &GraphicsContext,
        width: u32,
        height: u32,
        format: PixelFormat,
    ) -> Result<Self, ResourceError> {
        let data = GlOnlyTextureData::new(width, height, format)?;
        Self::new(ctx, Box::new(data))
    }

    // --- Accessors ---

    /// The id of this texture within its context.
    pub fn id(&self) -> ResourceId {
        self.slot.id()
    }

    /// The lifecycle state.
    pub fn state(&self) -> ResourceState {
        self.slot.state()
    }

    /// Whether the contents are on the GPU and current.
    pub fn is_uploaded(&self) -> bool {
        self.slot.state() == ResourceState::Ready
    }

    /// The GPU handle, `0` once disposed.
    pub fn handle(&self) -> u32 {
        self.handle
    }

    /// The binding target.
    pub fn target(&self) -> TextureTarget {
        self.target
    }

    /// The context this texture was created with.
    pub fn context(&self) -> &GraphicsContext {
        &self.ctx
    }

    /// The contents provider.
    pub fn texture_data(&self) -> &dyn TextureData {
        self.data.as_ref()
    }

    /// Whether the texture reloads itself after a context loss.
    pub fn is_managed(&self) -> bool {
        self.data.is_managed()
    }

    /// Width in pixels.
    pub fn width(&self) -> u32 {
        self.data.width()
    }

    /// Height in pixels.
    pub fn height(&self) -> u32 {
        self.data.height()
    }

    /// The upload format.
    pub fn format(&self) -> PixelFormat {
        self.data.format()
    }

    /// The recorded sampler state.
    pub fn sampler_state(&self) -> SamplerState {
        self.sampler
    }

    /// The minification filter.
    pub fn min_filter(&self) -> TextureFilter {
        self.sampler.min_filter
    }

    /// The magnification filter.
    pub fn mag_filter(&self) -> TextureFilter {
        self.sampler.mag_filter
    }

    /// The wrap mode along U.
    pub fn wrap_u(&self) -> TextureWrap {
        self.sampler.wrap_u
    }

    /// The wrap mode along V.
    pub fn wrap_v(&self) -> TextureWrap {
        self.sampler.wrap_v
    }

    /// The anisotropic filtering level in effect.
    pub fn anisotropic_filter_level(&self) -> f32 {
        self.sampler.anisotropic_level
    }

    // --- Upload lifecycle ---

    fn ensure_live(&self) -> Result<(), ResourceError> {
        if self.slot.state() == ResourceState::Disposed {
            return Err(ResourceError::Disposed("texture"));
        }
        Ok(())
    }

    /// Uploads the provider's contents. Does nothing if the texture is already
    /// current; reloads it if a context loss invalidated it.
    pub fn upload(&mut self) -> Result<(), ResourceError> {
        match self.slot.state() {
            ResourceState::Ready => {
                log::trace!("Texture {} already uploaded", self.slot.id());
                Ok(())
            }
            ResourceState::Disposed => Err(ResourceError::Disposed("texture")),
            ResourceState::Invalidated => self.reload(),
            ResourceState::Unloaded | ResourceState::Uploading => self.load_data(),
        }
    }

    /// Makes sure the texture is current before it is used. Equivalent to
    /// [`upload`](Self::upload); called by every binding operation.
    pub fn ensure_uploaded(&mut self) -> Result<(), ResourceError> {
        if self.is_uploaded() {
            return Ok(());
        }
        self.upload()
    }

    /// Replaces the provider and uploads it.
    ///
    /// The new provider must agree with the current one on being managed.
    pub fn load(&mut self, data: Box<dyn TextureData>) -> Result<(), ResourceError> {
        self.ensure_live()?;
        if data.is_managed() != self.data.is_managed() {
            return Err(ResourceError::ManagedMismatch);
        }
        self.data = data;
        self.load_data()
    }

    /// Recreates the GPU object of a managed texture from its provider.
    pub fn reload(&mut self) -> Result<(), ResourceError> {
        self.ensure_live()?;
        if !self.data.is_managed() {
            return Err(ResourceError::NotManaged("texture"));
        }
        // An invalidated handle died with the old context.
        if self.slot.state() != ResourceState::Invalidated && self.handle != 0 {
            self.ctx.gl().delete_texture(self.handle);
        }
        let handle = self.ctx.gl().gen_texture();
        if handle == 0 {
            return Err(ResourceError::HandleAllocation("texture"));
        }
        log::debug!(
            "Reloading texture {} with new handle {handle} (was {})",
            self.slot.id(),
            self.handle
        );
        self.handle = handle;
        self.slot.set_state(ResourceState::Unloaded);
        self.load_data()
    }

    fn load_data(&mut self) -> Result<(), ResourceError> {
        self.slot.set_state(ResourceState::Uploading);
        if !self.data.is_prepared() {
            self.data.prepare()?;
        }

        let target = self.target.gl_enum();
        let ctx = &self.ctx;
        let gl = ctx.gl();
        gl.bind_texture(target, self.handle);

        match self.data.data_type() {
            TextureDataType::Custom => {
                self.data.consume_custom_data(gl, target)?;
            }
            TextureDataType::Pixmap => {
                // There is no GPU format for palette indices.
                let wanted = match self.data.format() {
                    PixelFormat::IndexedColor => PixelFormat::Rgba8888,
                    format => format,
                };
                let use_mipmaps = self.data.use_mipmaps();
                let mut pixmap = self.data.consume_pixmap()?;
                if pixmap.format() != wanted {
                    log::debug!("Converting {:?} pixmap to {wanted:?} for upload", pixmap.format());
                    pixmap = Cow::Owned(pixmap.convert(wanted)?);
                }

                let alignment = pixmap.format().compute_alignment(pixmap.width());
                gl.pixel_store_i(gl::UNPACK_ALIGNMENT, alignment as i32);
                if use_mipmaps {
                    mipmap::generate_mipmaps(ctx, target, &pixmap)?;
                } else {
                    mipmap::upload_level(gl, target, 0, &pixmap)?;
                }
            }
        }
        ctx.check_error("tex_image_2d")?;

        let sampler = self.sampler;
        {
            let mut bound = BoundTexture { texture: self };
            bound.set_wrap(sampler.wrap_u, sampler.wrap_v, true);
            bound.set_filter(sampler.min_filter, sampler.mag_filter, true);
            bound.set_anisotropic_filter(sampler.anisotropic_level, true);
        }
        self.ctx.gl().bind_texture(target, 0);
        self.slot.set_state(ResourceState::Ready);
        log::debug!(
            "Uploaded texture {} ({}x{} {:?})",
            self.slot.id(),
            self.data.width(),
            self.data.height(),
            self.data.format()
        );
        Ok(())
    }

    // --- Binding ---

    /// Binds the texture on the currently active unit, uploading it first if needed.
    pub fn bind(&mut self) -> Result<BoundTexture<'_>, ResourceError> {
        self.ensure_uploaded()?;
        self.ctx.gl().bind_texture(self.target.gl_enum(), self.handle);
        Ok(BoundTexture { texture: self })
    }

    /// Activates texture unit `unit` and binds the texture there.
    pub fn bind_to(&mut self, unit: u32) -> Result<BoundTexture<'_>, ResourceError> {
        self.ensure_uploaded()?;
        self.ctx.activate_texture_unit(unit);
        self.ctx.gl().bind_texture(self.target.gl_enum(), self.handle);
        Ok(BoundTexture { texture: self })
    }

    /// Binds the texture and sets both filters.
    pub fn set_filter(
        &mut self,
        min_filter: TextureFilter,
        mag_filter: TextureFilter,
    ) -> Result<(), ResourceError> {
        self.bind()?.set_filter(min_filter, mag_filter, false);
        Ok(())
    }

    /// Binds the texture and sets both wrap modes.
    pub fn set_wrap(&mut self, u: TextureWrap, v: TextureWrap) -> Result<(), ResourceError> {
        self.bind()?.set_wrap(u, v, false);
        Ok(())
    }

    /// Binds the texture and sets the anisotropic filtering level. Returns the
    /// level in effect, which is clamped to the device maximum.
    pub fn set_anisotropic_filter(&mut self, level: f32) -> Result<f32, ResourceError> {
        Ok(self.bind()?.set_anisotropic_filter(level, false))
    }

    /// Replaces the region at `(x, y)` with the contents of `pixmap`.
    ///
    /// Not allowed on managed textures: their provider would no longer match
    /// what is on the GPU.
    pub fn draw(&mut self, pixmap: &Pixmap, x: i32, y: i32) -> Result<(), ResourceError> {
        if self.data.is_managed() {
            return Err(ResourceError::InvalidArgument(
                "can't draw to a managed texture".into(),
            ));
        }
        let pixmap = if pixmap.format() == PixelFormat::IndexedColor {
            Cow::Owned(pixmap.convert(PixelFormat::Rgba8888)?)
        } else {
            Cow::Borrowed(pixmap)
        };
        let target = self.target.gl_enum();
        self.bind()?;
        let gl = self.ctx.gl();
        let alignment = pixmap.format().compute_alignment(pixmap.width());
        gl.pixel_store_i(gl::UNPACK_ALIGNMENT, alignment as i32);
        gl.tex_sub_image_2d(
            target,
            0,
            x,
            y,
            pixmap.width() as i32,
            pixmap.height() as i32,
            pixmap.gl_format()?,
            pixmap.gl_type()?,
            pixmap.pixels(),
        );
        self.ctx.check_error("tex_sub_image_2d")
    }

    /// Deletes the GPU object and stops tracking the texture. Idempotent.
    pub fn dispose(&mut self) {
        if self.slot.state() == ResourceState::Disposed {
            return;
        }
        if self.slot.state() == ResourceState::Invalidated {
            self.handle = 0;
        } else if self.handle != 0 {
            self.ctx.gl().delete_texture(self.handle);
            log::debug!("Deleted texture {} (handle {})", self.slot.id(), self.handle);
            self.handle = 0;
        }
        if self.data.is_managed() {
            self.ctx.unregister(ResourceKind::Texture, self.slot.id());
        }
        self.slot.set_state(ResourceState::Disposed);
    }
}

impl Drop for Texture {
    fn drop(&mut self) {
        self.dispose();
    }
}

/// Proof that a [`Texture`] is bound on the active unit.
///
/// Sampler setters live here so they can skip the bind; every setter records
/// the applied state so it can be re-applied after a reload. With `force`
/// unset, a value equal to the recorded one is not sent again.
#[derive(Debug)]
pub struct BoundTexture<'a> {
    texture: &'a mut Texture,
}

impl BoundTexture<'_> {
    /// The bound texture's handle.
    pub fn handle(&self) -> u32 {
        self.texture.handle
    }

    /// Sets the minification and magnification filters.
    pub fn set_filter(&mut self, min_filter: TextureFilter, mag_filter: TextureFilter, force: bool) {
        let texture = &mut *self.texture;
        let target = texture.target.gl_enum();
        let gl = texture.ctx.gl();
        if force || texture.sampler.min_filter != min_filter {
            gl.tex_parameter_i(target, gl::TEXTURE_MIN_FILTER, min_filter.gl_enum() as i32);
            texture.sampler.min_filter = min_filter;
        } else {
            log::trace!("Min filter of texture {} already {min_filter:?}", texture.slot.id());
        }
        if force || texture.sampler.mag_filter != mag_filter {
            gl.tex_parameter_i(target, gl::TEXTURE_MAG_FILTER, mag_filter.gl_enum() as i32);
            texture.sampler.mag_filter = mag_filter;
        } else {
            log::trace!("Mag filter of texture {} already {mag_filter:?}", texture.slot.id());
        }
    }

    /// Sets the wrap modes along U and V.
    pub fn set_wrap(&mut self, u: TextureWrap, v: TextureWrap, force: bool) {
        let texture = &mut *self.texture;
        let target = texture.target.gl_enum();
        let gl = texture.ctx.gl();
        if force || texture.sampler.wrap_u != u {
            gl.tex_parameter_i(target, gl::TEXTURE_WRAP_S, u.gl_enum() as i32);
            texture.sampler.wrap_u = u;
        }
        if force || texture.sampler.wrap_v != v {
            gl.tex_parameter_i(target, gl::TEXTURE_WRAP_T, v.gl_enum() as i32);
            texture.sampler.wrap_v = v;
        }
    }

    /// Sets the anisotropic filtering level, clamped to the device maximum.
    /// Returns the level in effect; always `1.0` without the extension.
    pub fn set_anisotropic_filter(&mut self, level: f32, force: bool) -> f32 {
        let texture = &mut *self.texture;
        let max = texture.ctx.max_anisotropic_filter_level();
        if max <= 1.0 {
            return 1.0;
        }
        let level = level.clamp(1.0, max);
        if !force && (level - texture.sampler.anisotropic_level).abs() < 0.1 {
            return texture.sampler.anisotropic_level;
        }
        texture.ctx.gl().tex_parameter_f(
            texture.target.gl_enum(),
            gl::TEXTURE_MAX_ANISOTROPY_EXT,
            level,
        );
        texture.sampler.anisotropic_level = level;
        level
    }
}
