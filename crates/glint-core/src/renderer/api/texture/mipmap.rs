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

//! Mip chain generation for pixmap uploads.

use crate::renderer::api::pixmap::{Blending, Pixmap, PixmapFilter};
use crate::renderer::context::GraphicsContext;
use crate::renderer::error::{PixmapError, ResourceError};
use crate::renderer::traits::GlDevice;

/// Uploads `pixmap` as mip level `level` of the texture bound to `target`.
pub(crate) fn upload_level(
    gl: &dyn GlDevice,
    target: u32,
    level: i32,
    pixmap: &Pixmap,
) -> Result<(), ResourceError> {
    gl.tex_image_2d(
        target,
        level,
        pixmap.gl_internal_format()? as i32,
        pixmap.width() as i32,
        pixmap.height() as i32,
        pixmap.gl_format()?,
        pixmap.gl_type()?,
        Some(pixmap.pixels()),
    );
    Ok(())
}

/// Builds the levels below `base`, halving both dimensions each step and
/// stopping after the first level with a 1-pixel dimension.
///
/// Every level is a non-blending bilinear downsample of the previous one.
pub fn downsample_chain(base: &Pixmap) -> Result<Vec<Pixmap>, PixmapError> {
    let mut levels: Vec<Pixmap> = Vec::new();
    let (mut width, mut height) = (base.width() / 2, base.height() / 2);
    while width > 0 && height > 0 {
        let previous = levels.last().unwrap_or(base);
        let mut level = Pixmap::new(width, height, base.format())?;
        if !base.palette().is_empty() {
            level.set_palette(base.palette().to_vec())?;
        }
        level.set_blending(Blending::None);
        level.set_filter(PixmapFilter::BiLinear);
        level.draw_pixmap(
            previous,
            0,
            0,
            previous.width() as i32,
            previous.height() as i32,
            0,
            0,
            width as i32,
            height as i32,
        );
        levels.push(level);
        width /= 2;
        height /= 2;
    }
    Ok(levels)
}

/// Uploads `pixmap` with a full mip chain to the texture bound to `target`.
///
/// Uses the driver's `generate_mipmap` when the context is configured for
/// hardware mipmaps, otherwise builds the chain on the CPU, which requires a
/// square texture.
pub(crate) fn generate_mipmaps(
    ctx: &GraphicsContext,
    target: u32,
    pixmap: &Pixmap,
) -> Result<(), ResourceError> {
    let gl = ctx.gl();
    if ctx.config().hardware_mipmaps {
        upload_level(gl, target, 0, pixmap)?;
        gl.generate_mipmap(target);
        log::debug!("Generated hardware mipmaps for {}x{} texture", pixmap.width(), pixmap.height());
        return Ok(());
    }

    if pixmap.width() != pixmap.height() {
        return Err(ResourceError::InvalidArgument(format!(
            "CPU mipmap generation needs a square texture, got {}x{}",
            pixmap.width(),
            pixmap.height()
        )));
    }
    upload_level(gl, target, 0, pixmap)?;
    let levels = downsample_chain(pixmap)?;
    for (index, level) in levels.iter().enumerate() {
        upload_level(gl, target, index as i32 + 1, level)?;
    }
    log::debug!(
        "Uploaded {} CPU mip levels below {}x{}",
        levels.len(),
        pixmap.width(),
        pixmap.height()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::api::pixmap::PixelFormat;

    #[test]
    fn test_chain_stops_at_one_pixel() {
        let base = Pixmap::new(8, 8, PixelFormat::Rgba8888).unwrap();
        let sizes: Vec<_> = downsample_chain(&base)
            .unwrap()
            .iter()
            .map(|p| (p.width(), p.height()))
            .collect();
        assert_eq!(sizes, vec![(4, 4), (2, 2), (1, 1)]);
    }

    #[test]
    fn test_non_square_chain_ends_at_first_unit_dimension() {
        let base = Pixmap::new(8, 2, PixelFormat::Rgb888).unwrap();
        let sizes: Vec<_> = downsample_chain(&base)
            .unwrap()
            .iter()
            .map(|p| (p.width(), p.height()))
            .collect();
        assert_eq!(sizes, vec![(4, 1)]);
    }

    #[test]
    fn test_levels_average_the_previous_one() {
        let mut base = Pixmap::new(2, 2, PixelFormat::Rgba8888).unwrap();
        base.set_blending(Blending::None);
        base.set_pixel(0, 0, 0x000000ff);
        base.set_pixel(1, 1, 0x000000ff);
        let levels = downsample_chain(&base).unwrap();
        assert_eq!(levels.len(), 1);
        let mid = levels[0].get_pixel(0, 0);
        let red = mid >> 24;
        assert!(red > 0x40 && red < 0xc0, "got {mid:08x}");
        assert_eq!(mid & 0xff, 0xff);
    }
}
