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

//! Defines the contracts between the resource layer and its external collaborators.
//!
//! - [`GlDevice`]: The OpenGL-style call surface every GPU operation goes through.
//! - [`TextureAssetManager`]: The reference-counted asset cache consulted during
//!   context-loss recovery.

mod asset_manager;
mod gl_device;

pub use self::asset_manager::{LoadedCallback, TextureAssetManager, TextureParameters};
pub use self::gl_device::{ActiveVariable, GlDevice};
