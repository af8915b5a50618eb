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

use crate::renderer::api::gl;
use serde::{Deserialize, Serialize};

/// Texture minification / magnification filters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TextureFilter {
    /// Nearest texel, no mipmaps.
    Nearest,
    /// Bilinear, no mipmaps.
    Linear,
    /// Alias of [`MipMapLinearLinear`](Self::MipMapLinearLinear).
    MipMap,
    /// Nearest texel of the nearest mip level.
    MipMapNearestNearest,
    /// Bilinear within the nearest mip level.
    MipMapLinearNearest,
    /// Nearest texel, blended between two mip levels.
    MipMapNearestLinear,
    /// Trilinear filtering.
    MipMapLinearLinear,
}

impl TextureFilter {
    /// The GL enumerant.
    pub fn gl_enum(self) -> u32 {
        match self {
            TextureFilter::Nearest => gl::NEAREST,
            TextureFilter::Linear => gl::LINEAR,
            TextureFilter::MipMap | TextureFilter::MipMapLinearLinear => gl::LINEAR_MIPMAP_LINEAR,
            TextureFilter::MipMapNearestNearest => gl::NEAREST_MIPMAP_NEAREST,
            TextureFilter::MipMapLinearNearest => gl::LINEAR_MIPMAP_NEAREST,
            TextureFilter::MipMapNearestLinear => gl::NEAREST_MIPMAP_LINEAR,
        }
    }

    /// Whether sampling with this filter reads mip levels.
    pub fn is_mipmap(self) -> bool {
        !matches!(self, TextureFilter::Nearest | TextureFilter::Linear)
    }
}

/// Texture coordinate wrap modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TextureWrap {
    /// Repeat, mirroring every other tile.
    MirroredRepeat,
    /// Clamp to the edge texels.
    ClampToEdge,
    /// Repeat.
    Repeat,
}

impl TextureWrap {
    /// The GL enumerant.
    pub fn gl_enum(self) -> u32 {
        match self {
            TextureWrap::MirroredRepeat => gl::MIRRORED_REPEAT,
            TextureWrap::ClampToEdge => gl::CLAMP_TO_EDGE,
            TextureWrap::Repeat => gl::REPEAT,
        }
    }
}

/// The binding target of a texture object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TextureTarget {
    /// `TEXTURE_2D`.
    Texture2D,
    /// `TEXTURE_3D`.
    Texture3D,
    /// `TEXTURE_CUBE_MAP`.
    CubeMap,
    /// `TEXTURE_2D_ARRAY`.
    Texture2DArray,
    /// `TEXTURE_2D_MULTISAMPLE`.
    Texture2DMultisample,
}

impl TextureTarget {
    /// The GL enumerant.
    pub fn gl_enum(self) -> u32 {
        match self {
            TextureTarget::Texture2D => gl::TEXTURE_2D,
            TextureTarget::Texture3D => gl::TEXTURE_3D,
            TextureTarget::CubeMap => gl::TEXTURE_CUBE_MAP,
            TextureTarget::Texture2DArray => gl::TEXTURE_2D_ARRAY,
            TextureTarget::Texture2DMultisample => gl::TEXTURE_2D_MULTISAMPLE,
        }
    }
}

/// The sampler state a texture records so it can be re-applied after an upload.
///
/// A freshly generated GPU handle starts with driver defaults, so every
/// (re)load writes this state back with `force = true`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SamplerState {
    /// Minification filter.
    pub min_filter: TextureFilter,
    /// Magnification filter.
    pub mag_filter: TextureFilter,
    /// Wrap mode along U (S).
    pub wrap_u: TextureWrap,
    /// Wrap mode along V (T).
    pub wrap_v: TextureWrap,
    /// Anisotropic filtering level; `1.0` disables it.
    pub anisotropic_level: f32,
}

impl Default for SamplerState {
    fn default() -> Self {
        Self {
            min_filter: TextureFilter::Nearest,
            mag_filter: TextureFilter::Nearest,
            wrap_u: TextureWrap::ClampToEdge,
            wrap_v: TextureWrap::ClampToEdge,
            anisotropic_level: 1.0,
        }
    }
}
