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

//! CPU-side sources of texture contents.

use crate::renderer::api::pixmap::{PixelFormat, Pixmap};
use crate::renderer::error::{FormatError, ResourceError};
use crate::renderer::traits::GlDevice;
use std::borrow::Cow;
use std::fmt::Debug;
use std::path::{Path, PathBuf};

/// How a [`TextureData`] delivers its contents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextureDataType {
    /// Through [`TextureData::consume_pixmap`].
    Pixmap,
    /// Through [`TextureData::consume_custom_data`].
    Custom,
}

/// A provider of texture contents.
///
/// The provider is what survives a context loss: a managed texture reloads by
/// preparing and consuming its provider again.
pub trait TextureData: Debug {
    /// How the contents are delivered.
    fn data_type(&self) -> TextureDataType;

    /// Whether [`prepare`](Self::prepare) has run since the last consume.
    fn is_prepared(&self) -> bool;

    /// Readies the contents for upload, e.g. by decoding a file.
    fn prepare(&mut self) -> Result<(), ResourceError>;

    /// Hands over the pixmap for one upload.
    ///
    /// Providers that dispose their pixmap give it away (`Cow::Owned`);
    /// the others lend it.
    fn consume_pixmap(&mut self) -> Result<Cow<'_, Pixmap>, ResourceError>;

    /// Whether the pixmap is released after each upload.
    fn disposes_pixmap(&self) -> bool;

    /// Uploads the contents directly through the device. Only called for
    /// [`TextureDataType::Custom`] providers, with the texture bound to `target`.
    fn consume_custom_data(&mut self, gl: &dyn GlDevice, target: u32) -> Result<(), ResourceError>;

    /// Width in pixels. May be `0` before the first `prepare`.
    fn width(&self) -> u32;

    /// Height in pixels. May be `0` before the first `prepare`.
    fn height(&self) -> u32;

    /// The pixel format the texture is uploaded in.
    fn format(&self) -> PixelFormat;

    /// Whether a mip chain is built on upload.
    fn use_mipmaps(&self) -> bool;

    /// Whether the provider can produce its contents again after a context loss.
    fn is_managed(&self) -> bool;
}

/// Texture contents held in an in-memory [`Pixmap`].
#[derive(Debug)]
pub struct PixmapTextureData {
    pixmap: Option<Pixmap>,
    width: u32,
    height: u32,
    format: PixelFormat,
    use_mipmaps: bool,
    dispose_pixmap: bool,
    managed: bool,
}

impl PixmapTextureData {
    /// Wraps a pixmap. `format` overrides the upload format; `None` keeps the
    /// pixmap's own. With `dispose_pixmap` the pixmap is dropped after the first upload.
    pub fn new(
        pixmap: Pixmap,
        format: Option<PixelFormat>,
        use_mipmaps: bool,
        dispose_pixmap: bool,
    ) -> Self {
        Self {
            width: pixmap.width(),
            height: pixmap.height(),
            format: format.unwrap_or(pixmap.format()),
            pixmap: Some(pixmap),
            use_mipmaps,
            dispose_pixmap,
            managed: false,
        }
    }

    /// Marks the data as able to reload. Only meaningful when the pixmap is retained.
    pub fn with_managed(mut self, managed: bool) -> Self {
        self.managed = managed;
        self
    }

    /// The retained pixmap, if it has not been consumed.
    pub fn pixmap(&self) -> Option<&Pixmap> {
        self.pixmap.as_ref()
    }
}

impl TextureData for PixmapTextureData {
    fn data_type(&self) -> TextureDataType {
        TextureDataType::Pixmap
    }

    fn is_prepared(&self) -> bool {
        true
    }

    fn prepare(&mut self) -> Result<(), ResourceError> {
        Ok(())
    }

    fn consume_pixmap(&mut self) -> Result<Cow<'_, Pixmap>, ResourceError> {
        if self.dispose_pixmap {
            return self
                .pixmap
                .take()
                .map(Cow::Owned)
                .ok_or(ResourceError::Disposed("pixmap"));
        }
        self.pixmap
            .as_ref()
            .map(Cow::Borrowed)
            .ok_or(ResourceError::Disposed("pixmap"))
    }

    fn disposes_pixmap(&self) -> bool {
        self.dispose_pixmap
    }

    fn consume_custom_data(&mut self, _gl: &dyn GlDevice, _target: u32) -> Result<(), ResourceError> {
        Err(ResourceError::InvalidArgument(
            "pixmap texture data has no custom upload".into(),
        ))
    }

    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
    }

    fn format(&self) -> PixelFormat {
        self.format
    }

    fn use_mipmaps(&self) -> bool {
        self.use_mipmaps
    }

    fn is_managed(&self) -> bool {
        self.managed
    }
}

/// Texture contents decoded from an image file.
///
/// Always managed: the file is decoded again on every `prepare`, and the
/// decoded pixmap is dropped once uploaded.
#[derive(Debug)]
pub struct FileTextureData {
    path: PathBuf,
    pixmap: Option<Pixmap>,
    width: u32,
    height: u32,
    format: Option<PixelFormat>,
    use_mipmaps: bool,
}

impl FileTextureData {
    /// Creates a provider that decodes `path` lazily on the first upload.
    pub fn new(path: impl Into<PathBuf>, format: Option<PixelFormat>, use_mipmaps: bool) -> Self {
        Self {
            path: path.into(),
            pixmap: None,
            width: 0,
            height: 0,
            format,
            use_mipmaps,
        }
    }

    /// Creates a provider and decodes `path` right away, so that a missing or
    /// malformed file is reported here rather than at upload.
    pub fn preloaded(
        path: impl Into<PathBuf>,
        format: Option<PixelFormat>,
        use_mipmaps: bool,
    ) -> Result<Self, ResourceError> {
        let mut data = Self::new(path, format, use_mipmaps);
        data.prepare()?;
        Ok(data)
    }

    /// The backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl TextureData for FileTextureData {
    fn data_type(&self) -> TextureDataType {
        TextureDataType::Pixmap
    }

    fn is_prepared(&self) -> bool {
        self.pixmap.is_some()
    }

    fn prepare(&mut self) -> Result<(), ResourceError> {
        if self.pixmap.is_some() {
            return Ok(());
        }
        let pixmap = Pixmap::from_file(&self.path)?;
        log::debug!(
            "Decoded texture file '{}' ({}x{})",
            self.path.display(),
            pixmap.width(),
            pixmap.height()
        );
        self.width = pixmap.width();
        self.height = pixmap.height();
        if self.format.is_none() {
            self.format = Some(pixmap.format());
        }
        self.pixmap = Some(pixmap);
        Ok(())
    }

    fn consume_pixmap(&mut self) -> Result<Cow<'_, Pixmap>, ResourceError> {
        self.pixmap.take().map(Cow::Owned).ok_or_else(|| {
            ResourceError::InvalidArgument(format!(
                "texture data for '{}' was not prepared",
                self.path.display()
            ))
        })
    }

    fn disposes_pixmap(&self) -> bool {
        true
    }

    fn consume_custom_data(&mut self, _gl: &dyn GlDevice, _target: u32) -> Result<(), ResourceError> {
        Err(ResourceError::InvalidArgument(
            "file texture data has no custom upload".into(),
        ))
    }

    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
    }

    fn format(&self) -> PixelFormat {
        self.format.unwrap_or(PixelFormat::Rgba8888)
    }

    fn use_mipmaps(&self) -> bool {
        self.use_mipmaps
    }

    fn is_managed(&self) -> bool {
        true
    }
}

/// Uninitialized texture storage of a given size, for render targets and
/// procedurally filled textures.
#[derive(Debug, Clone)]
pub struct GlOnlyTextureData {
    width: u32,
    height: u32,
    mip_level: i32,
    format: PixelFormat,
    gl_internal_format: u32,
    gl_format: u32,
    gl_type: u32,
    prepared: bool,
}

impl GlOnlyTextureData {
    /// Describes `width` x `height` storage in `format` at mip level 0.
    pub fn new(width: u32, height: u32, format: PixelFormat) -> Result<Self, FormatError> {
        Ok(Self {
            width,
            height,
            mip_level: 0,
            format,
            gl_internal_format: format.gl_internal_format()?,
            gl_format: format.gl_format()?,
            gl_type: format.gl_type()?,
            prepared: false,
        })
    }

    /// Targets another mip level.
    pub fn with_mip_level(mut self, mip_level: i32) -> Self {
        self.mip_level = mip_level;
        self
    }
}

impl TextureData for GlOnlyTextureData {
    fn data_type(&self) -> TextureDataType {
        TextureDataType::Custom
    }

    fn is_prepared(&self) -> bool {
        self.prepared
    }

    fn prepare(&mut self) -> Result<(), ResourceError> {
        if self.prepared {
            return Err(ResourceError::InvalidArgument(
                "texture data is already prepared".into(),
            ));
        }
        self.prepared = true;
        Ok(())
    }

    fn consume_pixmap(&mut self) -> Result<Cow<'_, Pixmap>, ResourceError> {
        Err(ResourceError::InvalidArgument(
            "storage-only texture data does not return a pixmap".into(),
        ))
    }

    fn disposes_pixmap(&self) -> bool {
        false
    }

    fn consume_custom_data(&mut self, gl: &dyn GlDevice, target: u32) -> Result<(), ResourceError> {
        gl.tex_image_2d(
            target,
            self.mip_level,
            self.gl_internal_format as i32,
            self.width as i32,
            self.height as i32,
            self.gl_format,
            self.gl_type,
            None,
        );
        self.prepared = false;
        Ok(())
    }

    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
    }

    fn format(&self) -> PixelFormat {
        self.format
    }

    fn use_mipmaps(&self) -> bool {
        false
    }

    fn is_managed(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retained_pixmap_is_lent() {
        let pixmap = Pixmap::new(2, 2, PixelFormat::Rgba8888).unwrap();
        let mut data = PixmapTextureData::new(pixmap, None, false, false).with_managed(true);
        assert!(matches!(data.consume_pixmap().unwrap(), Cow::Borrowed(_)));
        // Still there for the next upload.
        assert!(data.consume_pixmap().is_ok());
        assert!(data.pixmap().is_some());
        assert!(data.is_managed());
    }

    #[test]
    fn test_disposed_pixmap_is_given_away_once() {
        let pixmap = Pixmap::new(4, 1, PixelFormat::Alpha).unwrap();
        let mut data = PixmapTextureData::new(pixmap, Some(PixelFormat::Rgba8888), true, true);
        assert_eq!(data.format(), PixelFormat::Rgba8888);
        assert!(matches!(data.consume_pixmap().unwrap(), Cow::Owned(_)));
        assert!(matches!(data.consume_pixmap(), Err(ResourceError::Disposed(_))));
        // Dimensions are remembered.
        assert_eq!((data.width(), data.height()), (4, 1));
    }

    #[test]
    fn test_file_data_requires_prepare() {
        let mut data = FileTextureData::new("/nonexistent/glint.png", None, false);
        assert!(!data.is_prepared());
        assert!(data.is_managed());
        assert!(data.consume_pixmap().is_err());
        assert!(matches!(
            data.prepare(),
            Err(ResourceError::Pixmap(crate::renderer::error::PixmapError::Io { .. }))
        ));
    }

    #[test]
    fn test_gl_only_data_tracks_prepare() {
        let mut data = GlOnlyTextureData::new(8, 8, PixelFormat::Rgb565).unwrap();
        assert_eq!(data.data_type(), TextureDataType::Custom);
        data.prepare().unwrap();
        assert!(data.prepare().is_err());
        assert!(data.consume_pixmap().is_err());
        assert!(GlOnlyTextureData::new(1, 1, PixelFormat::IndexedColor).is_err());
    }
}
