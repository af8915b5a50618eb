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

//! GPU resource lifecycle for Glint.
//!
//! This module defines the "common language" of the resource layer: the
//! [`GlDevice`] call surface every backend implements, the resource types that
//! drive it ([`Texture`], [`Mesh`], [`ShaderProgram`], CPU-side [`Pixmap`]s),
//! and the [`GraphicsContext`] that owns the managed-resource registry.
//!
//! The 'how' of talking to a driver lives in a concrete backend in the
//! `glint-infra` crate; nothing here assumes a particular one.

pub mod api;
pub mod config;
pub mod context;
pub mod error;
pub mod registry;
pub mod traits;

// Re-export the most important traits and types for easier use.
pub use self::api::*;
pub use self::config::GraphicsConfig;
pub use self::context::GraphicsContext;
pub use self::error::{FormatError, PixmapError, ResourceError, ShaderError};
pub use self::registry::{ResourceId, ResourceKind, ResourceRegistry, ResourceState};
pub use self::traits::{ActiveVariable, GlDevice, TextureAssetManager, TextureParameters};
