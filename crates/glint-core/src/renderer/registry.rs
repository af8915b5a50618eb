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

//! Bookkeeping for managed GPU resources.
//!
//! Every texture, mesh and shader program owns a [`ManagedSlot`] holding its
//! [`ResourceState`]. Managed resources additionally share that slot with the
//! [`ResourceRegistry`] of their context, which is how a context-loss broadcast
//! reaches them without the registry owning the resources themselves: the
//! broadcast flips slots to [`ResourceState::Invalidated`], and each resource
//! notices on its next use and reloads from its retained CPU-side data.

use std::cell::Cell;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

/// A stable identifier for a resource, unique within one [`ResourceRegistry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ResourceId(pub u64);

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// The kind of a tracked resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    /// A [`Texture`](crate::renderer::Texture).
    Texture,
    /// A [`Mesh`](crate::renderer::Mesh).
    Mesh,
    /// A [`ShaderProgram`](crate::renderer::ShaderProgram).
    ShaderProgram,
}

impl ResourceKind {
    /// A lowercase name for log and error messages.
    pub fn name(self) -> &'static str {
        match self {
            ResourceKind::Texture => "texture",
            ResourceKind::Mesh => "mesh",
            ResourceKind::ShaderProgram => "shader program",
        }
    }
}

/// The lifecycle state of a GPU resource.
///
/// ```text
/// Unloaded --upload--> Uploading --ok--> Ready --context loss--> Invalidated
///                          ^                                          |
///                          +---------------- next use ----------------+
/// ```
/// Any state moves to `Disposed` on `dispose`; `Disposed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceState {
    /// Created, but its data has not reached the GPU yet.
    Unloaded,
    /// An upload is in progress.
    Uploading,
    /// The GPU object is current.
    Ready,
    /// The GPU context was lost; the resource must be reloaded before use.
    Invalidated,
    /// The GPU object was released.
    Disposed,
}

/// The state cell shared between a resource and its registry.
#[derive(Debug)]
pub struct ManagedSlot {
    id: ResourceId,
    kind: ResourceKind,
    state: Cell<ResourceState>,
}

impl ManagedSlot {
    /// Creates a slot in the [`ResourceState::Unloaded`] state.
    pub fn new(id: ResourceId, kind: ResourceKind) -> Self {
        Self {
            id,
            kind,
            state: Cell::new(ResourceState::Unloaded),
        }
    }

    /// The id of the owning resource.
    pub fn id(&self) -> ResourceId {
        self.id
    }

    /// The kind of the owning resource.
    pub fn kind(&self) -> ResourceKind {
        self.kind
    }

    /// The current state.
    pub fn state(&self) -> ResourceState {
        self.state.get()
    }

    /// Moves to `state`. Leaving `Disposed` is not allowed and is ignored.
    pub fn set_state(&self, state: ResourceState) {
        if self.state.get() != ResourceState::Disposed {
            self.state.set(state);
        }
    }

    /// Marks a live resource as needing reload. Returns `true` if the state changed.
    ///
    /// Resources that never reached the GPU stay `Unloaded`: their first upload
    /// will happen in the new context anyway.
    pub fn invalidate(&self) -> bool {
        match self.state.get() {
            ResourceState::Ready | ResourceState::Uploading => {
                self.state.set(ResourceState::Invalidated);
                true
            }
            _ => false,
        }
    }
}

/// Per-context collections of managed resources, keyed by [`ResourceId`].
///
/// Used only to broadcast invalidation; it never owns the resources.
#[derive(Debug, Default)]
pub struct ResourceRegistry {
    next_id: u64,
    textures: BTreeMap<ResourceId, Rc<ManagedSlot>>,
    meshes: BTreeMap<ResourceId, Rc<ManagedSlot>>,
    shaders: BTreeMap<ResourceId, Rc<ManagedSlot>>,
}

impl ResourceRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocates a fresh slot. The slot is not registered.
    pub fn allocate(&mut self, kind: ResourceKind) -> Rc<ManagedSlot> {
        let id = ResourceId(self.next_id);
        self.next_id += 1;
        Rc::new(ManagedSlot::new(id, kind))
    }

    fn collection(&self, kind: ResourceKind) -> &BTreeMap<ResourceId, Rc<ManagedSlot>> {
        match kind {
            ResourceKind::Texture => &self.textures,
            ResourceKind::Mesh => &self.meshes,
            ResourceKind::ShaderProgram => &self.shaders,
        }
    }

    fn collection_mut(&mut self, kind: ResourceKind) -> &mut BTreeMap<ResourceId, Rc<ManagedSlot>> {
        match kind {
            ResourceKind::Texture => &mut self.textures,
            ResourceKind::Mesh => &mut self.meshes,
            ResourceKind::ShaderProgram => &mut self.shaders,
        }
    }

    /// Starts tracking a slot.
    pub fn register(&mut self, slot: Rc<ManagedSlot>) {
        let kind = slot.kind();
        self.collection_mut(kind).insert(slot.id(), slot);
    }

    /// Stops tracking a resource. Returns `true` if it was tracked.
    pub fn unregister(&mut self, kind: ResourceKind, id: ResourceId) -> bool {
        self.collection_mut(kind).remove(&id).is_some()
    }

    /// Whether a resource is tracked.
    pub fn contains(&self, kind: ResourceKind, id: ResourceId) -> bool {
        self.collection(kind).contains_key(&id)
    }

    /// Number of tracked resources of a kind.
    pub fn count(&self, kind: ResourceKind) -> usize {
        self.collection(kind).len()
    }

    /// Ids of tracked resources of a kind, in creation order.
    pub fn ids(&self, kind: ResourceKind) -> Vec<ResourceId> {
        self.collection(kind).keys().copied().collect()
    }

    /// State of a tracked resource.
    pub fn state(&self, kind: ResourceKind, id: ResourceId) -> Option<ResourceState> {
        self.collection(kind).get(&id).map(|slot| slot.state())
    }

    /// Marks every tracked resource of a kind as invalidated. Returns how many changed state.
    pub fn invalidate_all(&self, kind: ResourceKind) -> usize {
        self.collection(kind)
            .values()
            .filter(|slot| slot.invalidate())
            .count()
    }
}
