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

//! Defines the `Color` type and its packed 32-bit representation.

/// An RGBA color with `f32` components in `[0.0, 1.0]`.
///
/// Pixmaps and uniforms exchange colors in the packed RGBA8888 form
/// (`0xRRGGBBAA`), see [`Color::to_rgba8888`].
#[derive(Debug, Clone, Copy, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
#[repr(C)]
pub struct Color {
    /// The red component.
    pub r: f32,
    /// The green component.
    pub g: f32,
    /// The blue component.
    pub b: f32,
    /// The alpha (opacity) component.
    pub a: f32,
}

impl Color {
    /// Opaque red.
    pub const RED: Self = Self::rgb(1.0, 0.0, 0.0);
    /// Opaque green.
    pub const GREEN: Self = Self::rgb(0.0, 1.0, 0.0);
    /// Opaque blue.
    pub const BLUE: Self = Self::rgb(0.0, 0.0, 1.0);
    /// Opaque white.
    pub const WHITE: Self = Self::rgb(1.0, 1.0, 1.0);
    /// Opaque black.
    pub const BLACK: Self = Self::rgb(0.0, 0.0, 0.0);
    /// Fully transparent black.
    pub const CLEAR: Self = Self::new(0.0, 0.0, 0.0, 0.0);

    /// Creates a new `Color` with explicit RGBA values.
    #[inline]
    pub const fn new(r: f32, g: f32, b: f32, a: f32) -> Self {
        Self { r, g, b, a }
    }

    /// Creates a new opaque `Color` (alpha = 1.0).
    #[inline]
    pub const fn rgb(r: f32, g: f32, b: f32) -> Self {
        Self { r, g, b, a: 1.0 }
    }

    /// Unpacks a `0xRRGGBBAA` value.
    pub fn from_rgba8888(value: u32) -> Self {
        Self {
            r: ((value >> 24) & 0xff) as f32 / 255.0,
            g: ((value >> 16) & 0xff) as f32 / 255.0,
            b: ((value >> 8) & 0xff) as f32 / 255.0,
            a: (value & 0xff) as f32 / 255.0,
        }
    }

    /// Packs the color into `0xRRGGBBAA`, clamping each channel to `[0.0, 1.0]`.
    pub fn to_rgba8888(&self) -> u32 {
        let channel = |c: f32| (c.clamp(0.0, 1.0) * 255.0).round() as u32;
        (channel(self.r) << 24) | (channel(self.g) << 16) | (channel(self.b) << 8) | channel(self.a)
    }

    /// Packs four 8-bit channels into `0xRRGGBBAA`.
    #[inline]
    pub const fn pack_rgba(r: u8, g: u8, b: u8, a: u8) -> u32 {
        ((r as u32) << 24) | ((g as u32) << 16) | ((b as u32) << 8) | (a as u32)
    }
}

impl Default for Color {
    fn default() -> Self {
        Self::WHITE
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_pack_constants() {
        assert_eq!(Color::RED.to_rgba8888(), 0xff0000ff);
        assert_eq!(Color::WHITE.to_rgba8888(), 0xffffffff);
        assert_eq!(Color::CLEAR.to_rgba8888(), 0);
        assert_eq!(Color::pack_rgba(255, 0, 0, 255), 0xff0000ff);
    }

    #[test]
    fn test_unpack_roundtrip() {
        let packed = 0x12345678;
        assert_eq!(Color::from_rgba8888(packed).to_rgba8888(), packed);
    }

    #[test]
    fn test_unpack_channels() {
        let c = Color::from_rgba8888(0xff800040);
        assert_relative_eq!(c.r, 1.0);
        assert_relative_eq!(c.g, 128.0 / 255.0);
        assert_relative_eq!(c.b, 0.0);
        assert_relative_eq!(c.a, 64.0 / 255.0);
    }

    #[test]
    fn test_out_of_range_channels_are_clamped() {
        let c = Color::new(2.0, -1.0, 0.5, 1.0);
        assert_eq!(c.to_rgba8888(), 0xff0080ff);
    }
}
