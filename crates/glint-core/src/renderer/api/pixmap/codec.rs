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

//! Image file decoding and PNG encoding for [`Pixmap`].

use super::format::{PixelFormat, PngColorType};
use super::pixmap::Pixmap;
use crate::renderer::error::PixmapError;
use image::codecs::png::PngEncoder;
use image::{DynamicImage, ExtendedColorType, ImageEncoder};
use std::borrow::Cow;
use std::path::Path;

impl Pixmap {
    /// Decodes an encoded image (PNG, JPEG, BMP, ...).
    ///
    /// Gray images become `Alpha`, gray+alpha `LuminanceAlpha`, RGB `Rgb888`
    /// and everything else `Rgba8888`. Palettes are expanded by the decoder.
    pub fn decode(bytes: &[u8]) -> Result<Self, PixmapError> {
        let image =
            image::load_from_memory(bytes).map_err(|e| PixmapError::Decode(e.to_string()))?;
        let (width, height) = (image.width(), image.height());
        let (format, pixels) = match image {
            DynamicImage::ImageLuma8(buffer) => (PixelFormat::Alpha, buffer.into_raw()),
            DynamicImage::ImageLumaA8(buffer) => (PixelFormat::LuminanceAlpha, buffer.into_raw()),
            DynamicImage::ImageRgb8(buffer) => (PixelFormat::Rgb888, buffer.into_raw()),
            DynamicImage::ImageRgba8(buffer) => (PixelFormat::Rgba8888, buffer.into_raw()),
            other => (PixelFormat::Rgba8888, other.to_rgba8().into_raw()),
        };
        log::debug!("Decoded {width}x{height} image as {format:?}");
        Self::from_raw(width, height, format, pixels)
    }

    /// Reads and decodes an image file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, PixmapError> {
        let path = path.as_ref();
        let bytes = std::fs::read(path).map_err(|source| PixmapError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::decode(&bytes)
    }

    /// Encodes the pixmap as PNG.
    ///
    /// Formats without a PNG color type of their own (the packed 16-bit
    /// formats and `IndexedColor`) are expanded to RGBA first.
    pub fn encode_png(&self) -> Result<Vec<u8>, PixmapError> {
        let (data, color): (Cow<'_, [u8]>, ExtendedColorType) =
            match self.format().to_png_color_type() {
                Ok(PngColorType::Grayscale) => (Cow::Borrowed(self.pixels()), ExtendedColorType::L8),
                Ok(PngColorType::GrayscaleAlpha) => {
                    (Cow::Borrowed(self.pixels()), ExtendedColorType::La8)
                }
                Ok(PngColorType::Rgb) => (Cow::Borrowed(self.pixels()), ExtendedColorType::Rgb8),
                Ok(PngColorType::Rgba) => (Cow::Borrowed(self.pixels()), ExtendedColorType::Rgba8),
                Ok(PngColorType::Indexed) | Err(_) => (
                    Cow::Owned(self.convert(PixelFormat::Rgba8888)?.into_pixels()),
                    ExtendedColorType::Rgba8,
                ),
            };

        let mut out = Vec::new();
        PngEncoder::new(&mut out)
            .write_image(&data, self.width(), self.height(), color)
            .map_err(|e| PixmapError::Encode(e.to_string()))?;
        Ok(out)
    }

    /// Encodes the pixmap as PNG and writes it to `path`.
    pub fn write_png(&self, path: impl AsRef<Path>) -> Result<(), PixmapError> {
        let path = path.as_ref();
        let bytes = self.encode_png()?;
        std::fs::write(path, bytes).map_err(|source| PixmapError::Io {
            path: path.display().to_string(),
            source,
        })
    }
}
