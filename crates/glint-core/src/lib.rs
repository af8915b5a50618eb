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

//! # Glint Core
//!
//! Foundational crate for GPU resource management: CPU-side pixel buffers,
//! textures, meshes and shader programs, together with the bookkeeping that
//! lets every one of them survive a lost graphics context.
//!
//! The crate never talks to a graphics driver directly. All GPU work goes
//! through the [`GlDevice`](renderer::GlDevice) call surface, which concrete
//! backends (see the `glint-infra` crate) implement.

#![warn(missing_docs)]

pub mod math;
pub mod renderer;

pub use renderer::context::GraphicsContext;
