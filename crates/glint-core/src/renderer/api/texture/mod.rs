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

//! Textures, their contents providers and sampler state.

mod mipmap;
mod sampler;
#[allow(clippy::module_inception)]
mod texture;
mod texture_data;

pub use mipmap::downsample_chain;
pub use sampler::{SamplerState, TextureFilter, TextureTarget, TextureWrap};
pub use texture::{BoundTexture, Texture};
pub use texture_data::{
    FileTextureData, GlOnlyTextureData, PixmapTextureData, TextureData, TextureDataType,
};
