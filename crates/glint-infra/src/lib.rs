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

//! # Glint Infra
//!
//! Concrete implementations of the contracts defined in `glint-core`.
//!
//! Today this is the [`HeadlessDevice`], an in-memory GL emulation used to run
//! the resource layer without a window or driver: in tests, in tools that only
//! need to validate assets, and to rehearse context-loss recovery.

#![warn(missing_docs)]

pub mod graphics;

pub use graphics::{HeadlessConfig, HeadlessDevice};
