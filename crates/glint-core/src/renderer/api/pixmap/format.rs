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

//! Engine-neutral pixel formats and their GL / PNG conversion tables.

use crate::renderer::api::gl;
use crate::renderer::error::FormatError;
use serde::{Deserialize, Serialize};

/// The storage format of a [`Pixmap`](super::Pixmap).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PixelFormat {
    /// 8-bit alpha.
    Alpha,
    /// 8-bit luminance followed by 8-bit alpha.
    LuminanceAlpha,
    /// 16-bit packed 5/6/5 RGB.
    Rgb565,
    /// 16-bit packed 4/4/4/4 RGBA.
    Rgba4444,
    /// 24-bit RGB.
    Rgb888,
    /// 32-bit RGBA.
    Rgba8888,
    /// 8-bit index into a palette of RGBA8888 colors.
    IndexedColor,
}

/// PNG color type bytes, as stored in the IHDR chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PngColorType {
    /// Single gray channel.
    Grayscale = 0,
    /// RGB triples.
    Rgb = 2,
    /// Palette indices.
    Indexed = 3,
    /// Gray plus alpha.
    GrayscaleAlpha = 4,
    /// RGBA quads.
    Rgba = 6,
}

// Channel expansion tables: i * 255 / (2^bits - 1).
const fn expansion_table<const N: usize>() -> [u32; N] {
    let mut table = [0u32; N];
    let max = (N - 1) as u32;
    let mut i = 0;
    while i < N {
        table[i] = (i as u32) * 255 / max;
        i += 1;
    }
    table
}

const LU4: [u32; 16] = expansion_table::<16>();
const LU5: [u32; 32] = expansion_table::<32>();
const LU6: [u32; 64] = expansion_table::<64>();

impl PixelFormat {
    /// All formats, in declaration order.
    pub const ALL: [PixelFormat; 7] = [
        PixelFormat::Alpha,
        PixelFormat::LuminanceAlpha,
        PixelFormat::Rgb565,
        PixelFormat::Rgba4444,
        PixelFormat::Rgb888,
        PixelFormat::Rgba8888,
        PixelFormat::IndexedColor,
    ];

    /// Size in bytes of one pixel.
    pub const fn bytes_per_pixel(self) -> usize {
        match self {
            PixelFormat::Alpha | PixelFormat::IndexedColor => 1,
            PixelFormat::LuminanceAlpha | PixelFormat::Rgb565 | PixelFormat::Rgba4444 => 2,
            PixelFormat::Rgb888 => 3,
            PixelFormat::Rgba8888 => 4,
        }
    }

    /// The natural unpack alignment of a single pixel of this format.
    pub const fn alignment(self) -> usize {
        match self {
            PixelFormat::Alpha | PixelFormat::IndexedColor | PixelFormat::Rgb888 => 1,
            PixelFormat::LuminanceAlpha | PixelFormat::Rgb565 | PixelFormat::Rgba4444 => 2,
            PixelFormat::Rgba8888 => 4,
        }
    }

    /// The largest unpack alignment in `{8, 4, 2, 1}` that divides a row of `width` pixels.
    ///
    /// This is the value to hand to `pixel_store_i(UNPACK_ALIGNMENT, ..)` before
    /// uploading tightly packed rows; any larger value would skew every row.
    pub const fn compute_alignment(self, width: u32) -> usize {
        let stride = width as usize * self.bytes_per_pixel();
        if stride % 8 == 0 {
            8
        } else if stride % 4 == 0 {
            4
        } else if stride % 2 == 0 {
            2
        } else {
            1
        }
    }

    /// The GL pixel format enumerant.
    ///
    /// `IndexedColor` has no GL counterpart and fails.
    pub fn gl_format(self) -> Result<u32, FormatError> {
        match self {
            PixelFormat::Alpha => Ok(gl::ALPHA),
            PixelFormat::LuminanceAlpha => Ok(gl::LUMINANCE_ALPHA),
            PixelFormat::Rgb565 | PixelFormat::Rgb888 => Ok(gl::RGB),
            PixelFormat::Rgba4444 | PixelFormat::Rgba8888 => Ok(gl::RGBA),
            PixelFormat::IndexedColor => Err(self.unsupported("GL format")),
        }
    }

    /// The GL internal format; identical to [`gl_format`](Self::gl_format) for
    /// unsized ES 2.0 formats.
    pub fn gl_internal_format(self) -> Result<u32, FormatError> {
        self.gl_format()
    }

    /// The GL component type enumerant.
    pub fn gl_type(self) -> Result<u32, FormatError> {
        match self {
            PixelFormat::Alpha
            | PixelFormat::LuminanceAlpha
            | PixelFormat::Rgb888
            | PixelFormat::Rgba8888 => Ok(gl::UNSIGNED_BYTE),
            PixelFormat::Rgb565 => Ok(gl::UNSIGNED_SHORT_5_6_5),
            PixelFormat::Rgba4444 => Ok(gl::UNSIGNED_SHORT_4_4_4_4),
            PixelFormat::IndexedColor => Err(self.unsupported("GL type")),
        }
    }

    /// Maps a GL format/type pair back to a pixel format.
    pub fn from_gl_format(format: u32, ty: u32) -> Result<Self, FormatError> {
        match (format, ty) {
            (gl::ALPHA, gl::UNSIGNED_BYTE) => Ok(PixelFormat::Alpha),
            (gl::LUMINANCE_ALPHA, gl::UNSIGNED_BYTE) => Ok(PixelFormat::LuminanceAlpha),
            (gl::RGB, gl::UNSIGNED_SHORT_5_6_5) => Ok(PixelFormat::Rgb565),
            (gl::RGBA, gl::UNSIGNED_SHORT_4_4_4_4) => Ok(PixelFormat::Rgba4444),
            (gl::RGB, gl::UNSIGNED_BYTE) => Ok(PixelFormat::Rgb888),
            (gl::RGBA, gl::UNSIGNED_BYTE) => Ok(PixelFormat::Rgba8888),
            _ => Err(FormatError::UnsupportedGlFormat { format, ty }),
        }
    }

    /// The PNG color type this format is written as.
    ///
    /// The 16-bit packed formats have no PNG equivalent.
    pub fn to_png_color_type(self) -> Result<PngColorType, FormatError> {
        match self {
            PixelFormat::Alpha => Ok(PngColorType::Grayscale),
            PixelFormat::LuminanceAlpha => Ok(PngColorType::GrayscaleAlpha),
            PixelFormat::Rgb888 => Ok(PngColorType::Rgb),
            PixelFormat::Rgba8888 => Ok(PngColorType::Rgba),
            PixelFormat::IndexedColor => Ok(PngColorType::Indexed),
            PixelFormat::Rgb565 | PixelFormat::Rgba4444 => Err(self.unsupported("PNG color type")),
        }
    }

    /// Maps a PNG color type byte and bit depth to a pixel format. Only 8-bit
    /// channels are supported.
    pub fn from_png_color_and_bit_depth(color_type: u8, bit_depth: u8) -> Result<Self, FormatError> {
        let unsupported = FormatError::UnsupportedPngColor {
            color_type,
            bit_depth,
        };
        if bit_depth != 8 {
            return Err(unsupported);
        }
        match color_type {
            0 => Ok(PixelFormat::Alpha),
            2 => Ok(PixelFormat::Rgb888),
            3 => Ok(PixelFormat::IndexedColor),
            4 => Ok(PixelFormat::LuminanceAlpha),
            6 => Ok(PixelFormat::Rgba8888),
            _ => Err(unsupported),
        }
    }

    /// Converts a packed `0xRRGGBBAA` color into this format's pixel value.
    ///
    /// Channels are truncated to the format's bit depth. `IndexedColor` values
    /// are palette indices and are passed through unchanged; palette lookup is
    /// the pixmap's job.
    pub fn rgba_to_format(self, color: u32) -> u32 {
        match self {
            PixelFormat::Alpha => color & 0xff,
            PixelFormat::LuminanceAlpha => {
                let r = ((color & 0xff00_0000) >> 24) as f32;
                let g = ((color & 0x00ff_0000) >> 16) as f32;
                let b = ((color & 0x0000_ff00) >> 8) as f32;
                let a = color & 0xff;
                let l = ((0.2126 * r + 0.7152 * g + 0.0722 * b) as u32) & 0xff;
                (l << 8) | a
            }
            PixelFormat::Rgb565 => {
                let r = (color & 0xff00_0000) >> 27;
                let g = (color & 0x00ff_0000) >> 18;
                let b = (color & 0x0000_ff00) >> 11;
                (r << 11) | (g << 5) | b
            }
            PixelFormat::Rgba4444 => {
                let r = (color & 0xff00_0000) >> 28;
                let g = (color & 0x00ff_0000) >> 20;
                let b = (color & 0x0000_ff00) >> 12;
                let a = (color & 0x0000_00ff) >> 4;
                (r << 12) | (g << 8) | (b << 4) | a
            }
            PixelFormat::Rgb888 => color >> 8,
            PixelFormat::Rgba8888 | PixelFormat::IndexedColor => color,
        }
    }

    /// Expands a pixel value of this format into packed `0xRRGGBBAA`.
    ///
    /// Inverse of [`rgba_to_format`](Self::rgba_to_format) up to quantization.
    pub fn to_rgba8888(self, value: u32) -> u32 {
        match self {
            PixelFormat::Alpha => (value & 0xff) | 0xffff_ff00,
            PixelFormat::LuminanceAlpha => {
                ((value & 0xff00) << 16) | ((value & 0xff00) << 8) | (value & 0xffff)
            }
            PixelFormat::Rgb565 => {
                let r = LU5[((value & 0xf800) >> 11) as usize] << 24;
                let g = LU6[((value & 0x07e0) >> 5) as usize] << 16;
                let b = LU5[(value & 0x001f) as usize] << 8;
                r | g | b | 0xff
            }
            PixelFormat::Rgba4444 => {
                let r = LU4[((value & 0xf000) >> 12) as usize] << 24;
                let g = LU4[((value & 0x0f00) >> 8) as usize] << 16;
                let b = LU4[((value & 0x00f0) >> 4) as usize] << 8;
                let a = LU4[(value & 0x000f) as usize];
                r | g | b | a
            }
            PixelFormat::Rgb888 => (value << 8) | 0xff,
            PixelFormat::Rgba8888 | PixelFormat::IndexedColor => value,
        }
    }

    /// Reads one stored pixel value from `bytes` (exactly `bytes_per_pixel` long).
    ///
    /// Byte order matches what the GL upload expects: bytes in component order
    /// for byte formats, native-endian words for the packed 16-bit formats.
    pub(crate) fn read_value(self, bytes: &[u8]) -> u32 {
        match self {
            PixelFormat::Alpha | PixelFormat::IndexedColor => bytes[0] as u32,
            PixelFormat::LuminanceAlpha => ((bytes[0] as u32) << 8) | bytes[1] as u32,
            PixelFormat::Rgb565 | PixelFormat::Rgba4444 => {
                u16::from_ne_bytes([bytes[0], bytes[1]]) as u32
            }
            PixelFormat::Rgb888 => {
                ((bytes[0] as u32) << 16) | ((bytes[1] as u32) << 8) | bytes[2] as u32
            }
            PixelFormat::Rgba8888 => u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
        }
    }

    /// Writes one pixel value into `bytes`; see [`read_value`](Self::read_value).
    pub(crate) fn write_value(self, bytes: &mut [u8], value: u32) {
        match self {
            PixelFormat::Alpha | PixelFormat::IndexedColor => bytes[0] = value as u8,
            PixelFormat::LuminanceAlpha => {
                bytes[0] = (value >> 8) as u8;
                bytes[1] = value as u8;
            }
            PixelFormat::Rgb565 | PixelFormat::Rgba4444 => {
                bytes[..2].copy_from_slice(&(value as u16).to_ne_bytes());
            }
            PixelFormat::Rgb888 => {
                bytes[0] = (value >> 16) as u8;
                bytes[1] = (value >> 8) as u8;
                bytes[2] = value as u8;
            }
            PixelFormat::Rgba8888 => bytes[..4].copy_from_slice(&value.to_be_bytes()),
        }
    }

    fn unsupported(self, table: &'static str) -> FormatError {
        FormatError::UnsupportedPixelFormat {
            format: format!("{self:?}"),
            table,
        }
    }
}
