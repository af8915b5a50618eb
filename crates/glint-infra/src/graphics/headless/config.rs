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

use anyhow::Context;
use glint_core::renderer::api::gl;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Capabilities advertised by a [`HeadlessDevice`](super::HeadlessDevice).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeadlessConfig {
    /// Extension strings reported by `supports_extension`.
    pub extensions: Vec<String>,
    /// Value of `MAX_TEXTURE_MAX_ANISOTROPY_EXT`.
    pub max_anisotropy: f32,
    /// Value of `MAX_TEXTURE_SIZE`.
    pub max_texture_size: i32,
    /// Value of `MAX_VERTEX_ATTRIBS`.
    pub max_vertex_attribs: u32,
    /// Value of `MAX_TEXTURE_IMAGE_UNITS`.
    pub max_texture_image_units: u32,
}

impl Default for HeadlessConfig {
    fn default() -> Self {
        Self {
            extensions: vec![gl::EXT_TEXTURE_FILTER_ANISOTROPIC.to_string()],
            max_anisotropy: 16.0,
            max_texture_size: 4096,
            max_vertex_attribs: 16,
            max_texture_image_units: 16,
        }
    }
}

impl HeadlessConfig {
    /// A configuration without any extension.
    pub fn without_extensions() -> Self {
        Self {
            extensions: Vec::new(),
            ..Self::default()
        }
    }

    /// Parses a JSON configuration. Missing fields take their default value.
    pub fn from_json_str(json: &str) -> anyhow::Result<Self> {
        serde_json::from_str(json).context("Failed to parse headless device configuration")
    }

    /// Loads a JSON configuration file.
    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read '{}'", path.display()))?;
        Self::from_json_str(&json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_advertises_anisotropy() {
        let config = HeadlessConfig::default();
        assert!(config
            .extensions
            .iter()
            .any(|e| e == gl::EXT_TEXTURE_FILTER_ANISOTROPIC));
        assert!(HeadlessConfig::without_extensions().extensions.is_empty());
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config = HeadlessConfig::from_json_str(r#"{ "max_texture_size": 256 }"#).unwrap();
        assert_eq!(config.max_texture_size, 256);
        assert_eq!(config.max_vertex_attribs, 16);
    }

    #[test]
    fn test_bad_json_is_an_error() {
        assert!(HeadlessConfig::from_json_str("{ not json").is_err());
    }
}
