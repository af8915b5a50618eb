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

//! Per-context settings for the resource layer.

use crate::renderer::api::texture::{TextureFilter, TextureWrap};
use serde::{Deserialize, Serialize};

/// Settings shared by every resource created through a [`GraphicsContext`](super::GraphicsContext).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphicsConfig {
    /// If `true`, `get_error` is queried after uploads and draws and a non-zero
    /// code is surfaced as [`ResourceError::Gl`](super::ResourceError::Gl).
    pub check_gl_errors: bool,
    /// Use the driver's `generate_mipmap` instead of building the chain on the CPU.
    pub hardware_mipmaps: bool,
    /// Code prepended to every vertex shader source (e.g. a `#version` line).
    pub prepend_vertex_code: String,
    /// Code prepended to every fragment shader source.
    pub prepend_fragment_code: String,
    /// Minification filter of newly created textures.
    pub default_min_filter: TextureFilter,
    /// Magnification filter of newly created textures.
    pub default_mag_filter: TextureFilter,
    /// Wrap mode of newly created textures on both axes.
    pub default_wrap: TextureWrap,
}

impl Default for GraphicsConfig {
    fn default() -> Self {
        Self {
            check_gl_errors: cfg!(debug_assertions),
            hardware_mipmaps: true,
            prepend_vertex_code: String::new(),
            prepend_fragment_code: String::new(),
            default_min_filter: TextureFilter::Nearest,
            default_mag_filter: TextureFilter::Nearest,
            default_wrap: TextureWrap::ClampToEdge,
        }
    }
}

impl GraphicsConfig {
    /// Loads a configuration from a JSON string. Missing fields take their default value.
    pub fn from_json_str(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Loads a configuration from a JSON file.
    pub fn from_file(path: &str) -> Result<Self, Box<dyn std::error::Error>> {
        let content = std::fs::read_to_string(path)?;
        Ok(Self::from_json_str(&content)?)
    }

    /// Serializes the configuration as pretty-printed JSON.
    pub fn to_json_string(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_graphics_config() {
        let config = GraphicsConfig::default();
        assert!(config.hardware_mipmaps);
        assert_eq!(config.default_min_filter, TextureFilter::Nearest);
        assert_eq!(config.default_wrap, TextureWrap::ClampToEdge);
        assert!(config.prepend_vertex_code.is_empty());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config = GraphicsConfig::from_json_str(
            r##"{ "hardware_mipmaps": false, "prepend_vertex_code": "#version 100\n" }"##,
        )
        .unwrap();
        assert!(!config.hardware_mipmaps);
        assert_eq!(config.prepend_vertex_code, "#version 100\n");
        assert_eq!(config.default_mag_filter, TextureFilter::Nearest);
    }

    #[test]
    fn test_json_round_trip() {
        let config = GraphicsConfig {
            check_gl_errors: true,
            default_min_filter: TextureFilter::MipMapLinearLinear,
            default_wrap: TextureWrap::Repeat,
            ..Default::default()
        };
        let json = config.to_json_string().unwrap();
        assert_eq!(GraphicsConfig::from_json_str(&json).unwrap(), config);
    }

    #[test]
    fn test_invalid_json_is_rejected() {
        assert!(GraphicsConfig::from_json_str("{ not json").is_err());
    }
}
