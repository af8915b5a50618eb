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

//! The explicit per-application graphics context.

use crate::renderer::api::gl;
use crate::renderer::config::GraphicsConfig;
use crate::renderer::error::ResourceError;
use crate::renderer::registry::{
    ManagedSlot, ResourceId, ResourceKind, ResourceRegistry, ResourceState,
};
use crate::renderer::traits::{GlDevice, TextureAssetManager, TextureParameters};
use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

/// The internal, non-clonable state of a [`GraphicsContext`].
struct ContextInner {
    device: Rc<dyn GlDevice>,
    config: GraphicsConfig,
    registry: RefCell<ResourceRegistry>,
    /// Last unit passed to `active_texture`; `None` when unknown.
    active_unit: Cell<Option<u32>>,
    /// Queried once per context.
    max_anisotropy: Cell<Option<f32>>,
}

/// A clonable handle to one application's graphics state.
///
/// Owns the [`GlDevice`] every resource talks through, the [`GraphicsConfig`],
/// and the [`ResourceRegistry`] of managed textures, meshes and shader programs.
/// Resources keep a clone of the context they were created with. Several
/// contexts may coexist (one per window or application instance); they share
/// nothing.
///
/// Like the device, a context is confined to the render thread.
#[derive(Clone)]
pub struct GraphicsContext {
    inner: Rc<ContextInner>,
}

impl fmt::Debug for GraphicsContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GraphicsContext")
            .field("device", &self.inner.device)
            .field("registry", &self.inner.registry)
            .finish()
    }
}

impl GraphicsContext {
    /// Creates a context around a device.
    pub fn new(device: Rc<dyn GlDevice>, config: GraphicsConfig) -> Self {
        log::info!("Creating graphics context on {device:?}");
        Self {
            inner: Rc::new(ContextInner {
                device,
                config,
                registry: RefCell::new(ResourceRegistry::new()),
                active_unit: Cell::new(None),
                max_anisotropy: Cell::new(None),
            }),
        }
    }

    /// Creates a context with the default [`GraphicsConfig`].
    pub fn with_default_config(device: Rc<dyn GlDevice>) -> Self {
        Self::new(device, GraphicsConfig::default())
    }

    /// The call surface.
    #[inline]
    pub fn gl(&self) -> &dyn GlDevice {
        self.inner.device.as_ref()
    }

    /// A shared handle to the call surface.
    pub fn device(&self) -> Rc<dyn GlDevice> {
        Rc::clone(&self.inner.device)
    }

    /// The configuration this context was created with.
    #[inline]
    pub fn config(&self) -> &GraphicsConfig {
        &self.inner.config
    }

    /// Whether two handles refer to the same context.
    pub fn same_context(&self, other: &GraphicsContext) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    // --- Registry ---

    pub(crate) fn allocate_slot(&self, kind: ResourceKind) -> Rc<ManagedSlot> {
        self.inner.registry.borrow_mut().allocate(kind)
    }

    pub(crate) fn register(&self, slot: &Rc<ManagedSlot>) {
        self.inner.registry.borrow_mut().register(Rc::clone(slot));
    }

    pub(crate) fn unregister(&self, kind: ResourceKind, id: ResourceId) {
        self.inner.registry.borrow_mut().unregister(kind, id);
    }

    /// Whether a resource is tracked as managed by this context.
    pub fn is_managed(&self, kind: ResourceKind, id: ResourceId) -> bool {
        self.inner.registry.borrow().contains(kind, id)
    }

    /// Number of managed resources of a kind.
    pub fn managed_count(&self, kind: ResourceKind) -> usize {
        self.inner.registry.borrow().count(kind)
    }

    /// State of a managed resource, or `None` if it is not tracked.
    pub fn resource_state(&self, kind: ResourceKind, id: ResourceId) -> Option<ResourceState> {
        self.inner.registry.borrow().state(kind, id)
    }

    /// A one-line report of the managed resources tracked by this context.
    pub fn managed_status(&self) -> String {
        let registry = self.inner.registry.borrow();
        format!(
            "Managed textures: {}, managed meshes: {}, managed shader programs: {}",
            registry.count(ResourceKind::Texture),
            registry.count(ResourceKind::Mesh),
            registry.count(ResourceKind::ShaderProgram),
        )
    }

    // --- Context loss ---

    /// Marks every managed texture for reload on its next use.
    ///
    /// Call after the GPU context was lost and recreated. Returns the number of
    /// textures that were invalidated.
    pub fn invalidate_all_textures(&self) -> usize {
        self.reset_cached_state();
        let count = self
            .inner
            .registry
            .borrow()
            .invalidate_all(ResourceKind::Texture);
        log::info!("Invalidated {count} managed textures");
        count
    }

    /// Marks every managed mesh for re-upload on its next bind.
    pub fn invalidate_all_meshes(&self) -> usize {
        let count = self
            .inner
            .registry
            .borrow()
            .invalidate_all(ResourceKind::Mesh);
        log::info!("Invalidated {count} managed meshes");
        count
    }

    /// Marks every managed shader program for recompilation on its next use.
    pub fn invalidate_all_shader_programs(&self) -> usize {
        let count = self
            .inner
            .registry
            .borrow()
            .invalidate_all(ResourceKind::ShaderProgram);
        log::info!("Invalidated {count} managed shader programs");
        count
    }

    /// Broadcasts a context loss to every managed resource kind.
    pub fn invalidate_all(&self) -> usize {
        self.invalidate_all_textures()
            + self.invalidate_all_meshes()
            + self.invalidate_all_shader_programs()
    }

    /// Invalidates managed textures, reloading those owned by `assets` through
    /// its reference-counted protocol.
    ///
    /// For each texture the manager knows by name, the reference count is
    /// captured, set to zero, the asset is unloaded and queued for loading again
    /// with a callback that restores the count. Loading is then finished
    /// synchronously. If a callback never fired, the captured count is restored
    /// anyway so the asset is not evicted while still referenced.
    pub fn invalidate_all_textures_with(&self, assets: &mut dyn TextureAssetManager) -> usize {
        let invalidated = self.invalidate_all_textures();
        let ids = self.inner.registry.borrow().ids(ResourceKind::Texture);

        let mut pending = Vec::new();
        for id in ids {
            let Some(name) = assets.asset_file_name(id) else {
                continue;
            };
            let ref_count = assets.reference_count(&name);
            assets.set_reference_count(&name, 0);
            assets.unload(&name);

            let fired = Rc::new(Cell::new(false));
            let flag = Rc::clone(&fired);
            let parameters = TextureParameters {
                reuse_texture: Some(id),
                loaded_callback: Some(Box::new(move |manager, file_name| {
                    manager.set_reference_count(file_name, ref_count);
                    flag.set(true);
                })),
            };
            log::debug!("Reloading texture asset '{name}' ({id}) with {ref_count} references");
            assets.load(&name, parameters);
            pending.push((name, ref_count, fired));
        }

        if !pending.is_empty() {
            assets.finish_loading();
        }
        for (name, ref_count, fired) in pending {
            if !fired.get() {
                log::warn!(
                    "Loaded callback for texture asset '{name}' never fired, restoring {ref_count} references"
                );
                assets.set_reference_count(&name, ref_count);
            }
        }
        invalidated
    }

    fn reset_cached_state(&self) {
        self.inner.active_unit.set(None);
        self.inner.max_anisotropy.set(None);
    }

    // --- Shared device state ---

    /// Makes texture unit `unit` active, skipping the call when it already is.
    pub(crate) fn activate_texture_unit(&self, unit: u32) {
        if self.inner.active_unit.get() == Some(unit) {
            log::trace!("Texture unit {unit} already active");
            return;
        }
        self.gl().active_texture(gl::TEXTURE0 + unit);
        self.inner.active_unit.set(Some(unit));
    }

    /// The maximum anisotropic filtering level, or `1.0` if the extension is unavailable.
    ///
    /// Queried from the device once and cached until the next context loss.
    pub fn max_anisotropic_filter_level(&self) -> f32 {
        if let Some(level) = self.inner.max_anisotropy.get() {
            return level;
        }
        let level = if self.gl().supports_extension(gl::EXT_TEXTURE_FILTER_ANISOTROPIC) {
            self.gl().get_float(gl::MAX_TEXTURE_MAX_ANISOTROPY_EXT)
        } else {
            1.0
        };
        self.inner.max_anisotropy.set(Some(level));
        level
    }

    /// Surfaces a pending device error when [`GraphicsConfig::check_gl_errors`] is on.
    pub(crate) fn check_error(&self, operation: &'static str) -> Result<(), ResourceError> {
        if !self.inner.config.check_gl_errors {
            return Ok(());
        }
        match self.gl().get_error() {
            gl::NO_ERROR => Ok(()),
            code => {
                log::warn!("GL error 0x{code:04x} after {operation}");
                Err(ResourceError::Gl { operation, code })
            }
        }
    }
}
