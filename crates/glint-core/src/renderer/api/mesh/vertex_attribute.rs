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

//! Interleaved vertex layouts.

use crate::renderer::api::gl;
use crate::renderer::error::ResourceError;
use std::ops::Index;

/// The semantic role of a vertex attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VertexUsage {
    /// Vertex position.
    Position,
    /// Color as four floats.
    ColorUnpacked,
    /// Color as four normalized bytes packed in one float slot.
    ColorPacked,
    /// Surface normal.
    Normal,
    /// Texture coordinates.
    TextureCoordinates,
    /// Anything else.
    Generic,
    /// Skinning bone weight.
    BoneWeight,
    /// Tangent vector.
    Tangent,
    /// Binormal vector.
    BiNormal,
}

impl VertexUsage {
    /// A distinct bit per usage, for layout masks.
    pub const fn bit(self) -> u32 {
        match self {
            VertexUsage::Position => 1,
            VertexUsage::ColorUnpacked => 2,
            VertexUsage::ColorPacked => 4,
            VertexUsage::Normal => 8,
            VertexUsage::TextureCoordinates => 16,
            VertexUsage::Generic => 32,
            VertexUsage::BoneWeight => 64,
            VertexUsage::Tangent => 128,
            VertexUsage::BiNormal => 256,
        }
    }
}

/// One named, typed field of an interleaved vertex.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VertexAttribute {
    /// The semantic role.
    pub usage: VertexUsage,
    /// Number of components, 1 to 4.
    pub num_components: u32,
    /// The GL component type.
    pub ty: u32,
    /// Whether integer components are normalized to `[0, 1]` / `[-1, 1]`.
    pub normalized: bool,
    /// The shader attribute name this field binds to.
    pub alias: String,
    /// Unit index, for texture coordinates and bone weights.
    pub unit: u32,
    offset: usize,
}

impl VertexAttribute {
    /// Creates an attribute. Its offset is assigned by [`VertexAttributes`].
    pub fn new(
        usage: VertexUsage,
        num_components: u32,
        ty: u32,
        normalized: bool,
        alias: impl Into<String>,
        unit: u32,
    ) -> Self {
        Self {
            usage,
            num_components,
            ty,
            normalized,
            alias: alias.into(),
            unit,
            offset: 0,
        }
    }

    /// A float attribute.
    pub fn float(usage: VertexUsage, num_components: u32, alias: impl Into<String>) -> Self {
        Self::new(usage, num_components, gl::FLOAT, false, alias, 0)
    }

    /// `a_position`, three floats.
    pub fn position() -> Self {
        Self::float(VertexUsage::Position, 3, "a_position")
    }

    /// `a_position`, two floats.
    pub fn position_2d() -> Self {
        Self::float(VertexUsage::Position, 2, "a_position")
    }

    /// `a_normal`, three floats.
    pub fn normal() -> Self {
        Self::float(VertexUsage::Normal, 3, "a_normal")
    }

    /// `a_color`, four normalized bytes.
    pub fn color_packed() -> Self {
        Self::new(VertexUsage::ColorPacked, 4, gl::UNSIGNED_BYTE, true, "a_color", 0)
    }

    /// `a_color`, four floats.
    pub fn color_unpacked() -> Self {
        Self::float(VertexUsage::ColorUnpacked, 4, "a_color")
    }

    /// `a_texCoord{unit}`, two floats.
    pub fn tex_coords(unit: u32) -> Self {
        Self::new(
            VertexUsage::TextureCoordinates,
            2,
            gl::FLOAT,
            false,
            format!("a_texCoord{unit}"),
            unit,
        )
    }

    /// `a_tangent`, three floats.
    pub fn tangent() -> Self {
        Self::float(VertexUsage::Tangent, 3, "a_tangent")
    }

    /// `a_binormal`, three floats.
    pub fn binormal() -> Self {
        Self::float(VertexUsage::BiNormal, 3, "a_binormal")
    }

    /// `a_boneWeight{unit}`, two floats (bone index and weight).
    pub fn bone_weight(unit: u32) -> Self {
        Self::new(
            VertexUsage::BoneWeight,
            2,
            gl::FLOAT,
            false,
            format!("a_boneWeight{unit}"),
            unit,
        )
    }

    /// Byte offset inside the interleaved vertex.
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Size of the attribute in bytes.
    pub fn size_in_bytes(&self) -> usize {
        let components = self.num_components as usize;
        match self.ty {
            gl::BYTE | gl::UNSIGNED_BYTE => components,
            gl::SHORT | gl::UNSIGNED_SHORT => 2 * components,
            _ => 4 * components,
        }
    }
}

/// An ordered vertex layout with computed offsets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VertexAttributes {
    attributes: Vec<VertexAttribute>,
    vertex_size: usize,
}

impl VertexAttributes {
    /// Builds a layout, assigning each attribute the byte offset that follows
    /// the previous one.
    pub fn new(attributes: Vec<VertexAttribute>) -> Result<Self, ResourceError> {
        if attributes.is_empty() {
            return Err(ResourceError::InvalidArgument(
                "a vertex layout needs at least one attribute".into(),
            ));
        }
        let mut attributes = attributes;
        let mut offset = 0;
        for attribute in &mut attributes {
            if !(1..=4).contains(&attribute.num_components) {
                return Err(ResourceError::InvalidArgument(format!(
                    "attribute '{}' has {} components (expected 1 to 4)",
                    attribute.alias, attribute.num_components
                )));
            }
            attribute.offset = offset;
            offset += attribute.size_in_bytes();
        }
        Ok(Self {
            attributes,
            vertex_size: offset,
        })
    }

    /// Bytes per vertex, the interleaved stride.
    pub fn vertex_size(&self) -> usize {
        self.vertex_size
    }

    /// Number of attributes.
    pub fn len(&self) -> usize {
        self.attributes.len()
    }

    /// Always `false`; a layout has at least one attribute.
    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }

    /// The attribute at `index`.
    pub fn get(&self, index: usize) -> Option<&VertexAttribute> {
        self.attributes.get(index)
    }

    /// Iterates the attributes in layout order.
    pub fn iter(&self) -> std::slice::Iter<'_, VertexAttribute> {
        self.attributes.iter()
    }

    /// The first attribute with the given usage.
    pub fn find_by_usage(&self, usage: VertexUsage) -> Option<&VertexAttribute> {
        self.attributes.iter().find(|a| a.usage == usage)
    }

    /// Byte offset of the first attribute with the given usage.
    pub fn offset_of(&self, usage: VertexUsage) -> Option<usize> {
        self.find_by_usage(usage).map(VertexAttribute::offset)
    }

    /// The union of the usage bits of every attribute.
    pub fn mask(&self) -> u32 {
        self.attributes.iter().fold(0, |mask, a| mask | a.usage.bit())
    }
}

impl Index<usize> for VertexAttributes {
    type Output = VertexAttribute;

    fn index(&self, index: usize) -> &Self::Output {
        &self.attributes[index]
    }
}

impl<'a> IntoIterator for &'a VertexAttributes {
    type Item = &'a VertexAttribute;
    type IntoIter = std::slice::Iter<'a, VertexAttribute>;

    fn into_iter(self) -> Self::IntoIter {
        self.attributes.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_offsets_and_stride() {
        let layout = VertexAttributes::new(vec![
            VertexAttribute::position(),
            VertexAttribute::color_packed(),
            VertexAttribute::tex_coords(0),
        ])
        .unwrap();
        assert_eq!(layout[0].offset(), 0);
        assert_eq!(layout[1].offset(), 12);
        assert_eq!(layout[2].offset(), 16);
        assert_eq!(layout.vertex_size(), 24);
        let total: usize = layout.iter().map(VertexAttribute::size_in_bytes).sum();
        assert_eq!(total, layout.vertex_size());
    }

    #[test]
    fn test_find_by_usage_takes_first_match() {
        let layout = VertexAttributes::new(vec![
            VertexAttribute::tex_coords(0),
            VertexAttribute::tex_coords(1),
        ])
        .unwrap();
        let found = layout.find_by_usage(VertexUsage::TextureCoordinates).unwrap();
        assert_eq!(found.alias, "a_texCoord0");
        assert_eq!(layout.offset_of(VertexUsage::TextureCoordinates), Some(0));
        assert!(layout.find_by_usage(VertexUsage::Normal).is_none());
    }

    #[test]
    fn test_mask_combines_usages() {
        let layout =
            VertexAttributes::new(vec![VertexAttribute::position(), VertexAttribute::normal()])
                .unwrap();
        assert_eq!(
            layout.mask(),
            VertexUsage::Position.bit() | VertexUsage::Normal.bit()
        );
    }

    #[test]
    fn test_invalid_layouts_rejected() {
        assert!(VertexAttributes::new(Vec::new()).is_err());
        let five = VertexAttribute::float(VertexUsage::Generic, 5, "a_five");
        assert!(matches!(
            VertexAttributes::new(vec![five]),
            Err(ResourceError::InvalidArgument(_))
        ));
    }
}
