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

//! The asset-cache protocol used to reload textures after a context loss.

use crate::renderer::registry::ResourceId;
use std::fmt;

/// Invoked by the asset manager once an asset has finished (re)loading.
pub type LoadedCallback = Box<dyn FnOnce(&mut dyn TextureAssetManager, &str)>;

/// Load parameters handed to [`TextureAssetManager::load`].
#[derive(Default)]
pub struct TextureParameters {
    /// The texture whose GPU object should be reused instead of creating a new one.
    pub reuse_texture: Option<ResourceId>,
    /// Called with the asset name after the load completes.
    pub loaded_callback: Option<LoadedCallback>,
}

impl fmt::Debug for TextureParameters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TextureParameters")
            .field("reuse_texture", &self.reuse_texture)
            .field("loaded_callback", &self.loaded_callback.is_some())
            .finish()
    }
}

/// The reference-counted asset cache that may own managed textures.
///
/// Context-loss recovery goes through this protocol so that a texture shared by
/// several owners is not evicted while it is being reloaded. See
/// [`GraphicsContext::invalidate_all_textures_with`](crate::renderer::GraphicsContext::invalidate_all_textures_with).
pub trait TextureAssetManager {
    /// The asset name under which the texture `id` was loaded, if it came from this manager.
    fn asset_file_name(&self, id: ResourceId) -> Option<String>;

    /// Current reference count of an asset.
    fn reference_count(&self, name: &str) -> usize;

    /// Overwrites the reference count of an asset.
    fn set_reference_count(&mut self, name: &str, count: usize);

    /// Unloads an asset, disposing it once its reference count reaches zero.
    fn unload(&mut self, name: &str);

    /// Queues an asset for loading.
    fn load(&mut self, name: &str, parameters: TextureParameters);

    /// Blocks until every queued asset is loaded, invoking loaded callbacks.
    fn finish_loading(&mut self);
}
