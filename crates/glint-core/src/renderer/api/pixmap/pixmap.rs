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

//! The CPU-side pixel buffer.

use super::format::PixelFormat;
use crate::math::Color;
use crate::renderer::error::{FormatError, PixmapError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Range;

/// How drawing operations combine a source color with the destination pixel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Blending {
    /// The source overwrites the destination.
    None,
    /// Alpha compositing of the source over the destination.
    #[default]
    SourceOver,
}

/// How [`Pixmap::draw_pixmap`] samples the source when scaling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PixmapFilter {
    /// Take the nearest source pixel.
    NearestNeighbour,
    /// Interpolate the four surrounding source pixels.
    #[default]
    BiLinear,
}

/// A CPU-resident image: a tightly packed byte buffer with an explicit [`PixelFormat`].
///
/// Pixels are addressed with `(0, 0)` at the top-left corner. All color
/// arguments and return values are packed `0xRRGGBBAA`, whatever the storage
/// format; conversion goes through [`PixelFormat::rgba_to_format`] and
/// [`PixelFormat::to_rgba8888`]. The buffer length is always
/// `width * height * format.bytes_per_pixel()`.
#[derive(Clone, PartialEq)]
pub struct Pixmap {
    width: u32,
    height: u32,
    format: PixelFormat,
    pixels: Vec<u8>,
    /// RGBA8888 entries, used only by `IndexedColor`.
    palette: Vec<u32>,
    color: u32,
    blending: Blending,
    filter: PixmapFilter,
}

impl fmt::Debug for Pixmap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pixmap")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("format", &self.format)
            .field("color", &format_args!("{:#010x}", self.color))
            .field("blending", &self.blending)
            .field("filter", &self.filter)
            .finish()
    }
}

/// Alpha-composites `src` over `dst`, both packed RGBA8888.
fn blend(src: u32, dst: u32) -> u32 {
    let channel = |c: u32, shift: u32| ((c >> shift) & 0xff) as i32;
    let (src_r, src_g, src_b, src_a) = (
        channel(src, 24),
        channel(src, 16),
        channel(src, 8),
        channel(src, 0),
    );
    let (dst_r, dst_g, dst_b, dst_a) = (
        channel(dst, 24),
        channel(dst, 16),
        channel(dst, 8),
        channel(dst, 0),
    );

    let r = dst_r + src_a * (src_r - dst_r) / 255;
    let g = dst_g + src_a * (src_g - dst_g) / 255;
    let b = dst_b + src_a * (src_b - dst_b) / 255;
    let a = ((1.0 - (1.0 - src_a as f32 / 255.0) * (1.0 - dst_a as f32 / 255.0)) * 255.0) as i32;

    ((r as u32 & 0xff) << 24) | ((g as u32 & 0xff) << 16) | ((b as u32 & 0xff) << 8) | (a as u32 & 0xff)
}

/// Linear interpolation of each RGBA8888 channel.
fn lerp_color(a: u32, b: u32, t: f32) -> u32 {
    let mut out = 0;
    for shift in [24, 16, 8, 0] {
        let ca = ((a >> shift) & 0xff) as f32;
        let cb = ((b >> shift) & 0xff) as f32;
        let c = (ca + (cb - ca) * t).round().clamp(0.0, 255.0) as u32;
        out |= c << shift;
    }
    out
}

/// Offsets `k` in `0..len` for which both `src_start + k` and `dst_start + k`
/// fall inside their extents.
fn clip_span(src_start: i32, dst_start: i32, len: i32, src_len: u32, dst_len: u32) -> Range<i32> {
    let (src_start, dst_start) = (i64::from(src_start), i64::from(dst_start));
    let start = 0.max(-src_start).max(-dst_start);
    let end = i64::from(len)
        .min(i64::from(src_len) - src_start)
        .min(i64::from(dst_len) - dst_start);
    if end <= start {
        return 0..0;
    }
    // Both bounds lie in `0..=len`.
    start as i32..end as i32
}

impl Pixmap {
    /// Creates a pixmap and fills it with the default color, opaque white.
    ///
    /// An `IndexedColor` pixmap starts with a one-entry white palette; see
    /// [`with_palette`](Self::with_palette) to supply one.
    pub fn new(width: u32, height: u32, format: PixelFormat) -> Result<Self, PixmapError> {
        let palette = if format == PixelFormat::IndexedColor {
            vec![Color::WHITE.to_rgba8888()]
        } else {
            Vec::new()
        };
        Self::allocate(width, height, format, palette)
    }

    /// Creates an `IndexedColor` pixmap with the given RGBA8888 palette (1 to 256 entries).
    pub fn with_palette(width: u32, height: u32, palette: Vec<u32>) -> Result<Self, PixmapError> {
        if palette.is_empty() || palette.len() > 256 {
            return Err(PixmapError::InvalidPalette(palette.len()));
        }
        Self::allocate(width, height, PixelFormat::IndexedColor, palette)
    }

    fn allocate(
        width: u32,
        height: u32,
        format: PixelFormat,
        palette: Vec<u32>,
    ) -> Result<Self, PixmapError> {
        if width == 0 || height == 0 {
            return Err(PixmapError::InvalidDimensions { width, height });
        }
        let len = width as usize * height as usize * format.bytes_per_pixel();
        let mut pixmap = Self {
            width,
            height,
            format,
            pixels: vec![0; len],
            palette,
            color: Color::WHITE.to_rgba8888(),
            blending: Blending::default(),
            filter: PixmapFilter::default(),
        };
        pixmap.fill();
        Ok(pixmap)
    }

    /// Wraps an existing tightly packed buffer.
    pub fn from_raw(
        width: u32,
        height: u32,
        format: PixelFormat,
        pixels: Vec<u8>,
    ) -> Result<Self, PixmapError> {
        if width == 0 || height == 0 {
            return Err(PixmapError::InvalidDimensions { width, height });
        }
        let expected = width as usize * height as usize * format.bytes_per_pixel();
        if pixels.len() != expected {
            return Err(PixmapError::BufferSize {
                expected,
                actual: pixels.len(),
            });
        }
        let palette = if format == PixelFormat::IndexedColor {
            vec![Color::WHITE.to_rgba8888()]
        } else {
            Vec::new()
        };
        Ok(Self {
            width,
            height,
            format,
            pixels,
            palette,
            color: Color::WHITE.to_rgba8888(),
            blending: Blending::default(),
            filter: PixmapFilter::default(),
        })
    }

    // --- Accessors ---

    /// Width in pixels.
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Height in pixels.
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Storage format.
    pub fn format(&self) -> PixelFormat {
        self.format
    }

    /// The raw pixel bytes, row-major, top row first.
    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    /// Mutable access to the raw pixel bytes.
    pub fn pixels_mut(&mut self) -> &mut [u8] {
        &mut self.pixels
    }

    /// Consumes the pixmap, returning its buffer.
    pub fn into_pixels(self) -> Vec<u8> {
        self.pixels
    }

    /// The palette of an `IndexedColor` pixmap (empty otherwise).
    pub fn palette(&self) -> &[u32] {
        &self.palette
    }

    /// Replaces the palette of an `IndexedColor` pixmap. Stored indices are kept.
    pub fn set_palette(&mut self, palette: Vec<u32>) -> Result<(), PixmapError> {
        if self.format != PixelFormat::IndexedColor {
            return Err(PixmapError::UnsupportedFormat(format!(
                "{:?} pixmaps have no palette",
                self.format
            )));
        }
        if palette.is_empty() || palette.len() > 256 {
            return Err(PixmapError::InvalidPalette(palette.len()));
        }
        self.palette = palette;
        Ok(())
    }

    /// The current draw color as packed RGBA8888.
    pub fn color(&self) -> u32 {
        self.color
    }

    /// Sets the draw color used by `fill` and the draw primitives.
    pub fn set_color(&mut self, color: Color) {
        self.color = color.to_rgba8888();
    }

    /// Sets the draw color from packed RGBA8888.
    pub fn set_color_rgba8888(&mut self, color: u32) {
        self.color = color;
    }

    /// The blend mode used by the draw operations.
    pub fn blending(&self) -> Blending {
        self.blending
    }

    /// Sets the blend mode.
    pub fn set_blending(&mut self, blending: Blending) {
        self.blending = blending;
    }

    /// The scaling filter used by [`draw_pixmap`](Self::draw_pixmap).
    pub fn filter(&self) -> PixmapFilter {
        self.filter
    }

    /// Sets the scaling filter.
    pub fn set_filter(&mut self, filter: PixmapFilter) {
        self.filter = filter;
    }

    /// GL pixel format of the storage.
    pub fn gl_format(&self) -> Result<u32, FormatError> {
        self.format.gl_format()
    }

    /// GL internal format of the storage.
    pub fn gl_internal_format(&self) -> Result<u32, FormatError> {
        self.format.gl_internal_format()
    }

    /// GL component type of the storage.
    pub fn gl_type(&self) -> Result<u32, FormatError> {
        self.format.gl_type()
    }

    // --- Pixel access ---

    fn offset(&self, x: i32, y: i32) -> Option<usize> {
        if x < 0 || y < 0 || x >= self.width as i32 || y >= self.height as i32 {
            return None;
        }
        let index = y as usize * self.width as usize + x as usize;
        Some(index * self.format.bytes_per_pixel())
    }

    /// Storage value for a color: a palette index for `IndexedColor`, else the format conversion.
    fn encode(&self, color: u32) -> u32 {
        if self.format != PixelFormat::IndexedColor {
            return self.format.rgba_to_format(color);
        }
        let distance = |entry: u32| -> u32 {
            [24, 16, 8, 0]
                .iter()
                .map(|&shift| {
                    let d = ((entry >> shift) & 0xff) as i32 - ((color >> shift) & 0xff) as i32;
                    (d * d) as u32
                })
                .sum()
        };
        self.palette
            .iter()
            .enumerate()
            .min_by_key(|(_, &entry)| distance(entry))
            .map_or(0, |(index, _)| index as u32)
    }

    fn decode_value(&self, value: u32) -> u32 {
        if self.format == PixelFormat::IndexedColor {
            return self.palette.get(value as usize).copied().unwrap_or(0);
        }
        self.format.to_rgba8888(value)
    }

    /// The color at `(x, y)` as packed RGBA8888, or `0` outside the pixmap.
    pub fn get_pixel(&self, x: i32, y: i32) -> u32 {
        match self.offset(x, y) {
            Some(offset) => {
                let bpp = self.format.bytes_per_pixel();
                self.decode_value(self.format.read_value(&self.pixels[offset..offset + bpp]))
            }
            None => 0,
        }
    }

    /// Stores `color` at `(x, y)` without blending. Ignored outside the pixmap.
    pub fn set_pixel(&mut self, x: i32, y: i32, color: u32) {
        if let Some(offset) = self.offset(x, y) {
            let value = self.encode(color);
            let bpp = self.format.bytes_per_pixel();
            self.format
                .write_value(&mut self.pixels[offset..offset + bpp], value);
        }
    }

    /// Writes `color` at `(x, y)` honoring the blend mode.
    fn put(&mut self, x: i32, y: i32, color: u32) {
        if self.offset(x, y).is_none() {
            return;
        }
        let color = match self.blending {
            Blending::None => color,
            Blending::SourceOver => blend(color, self.get_pixel(x, y)),
        };
        self.set_pixel(x, y, color);
    }

    /// [`put`](Self::put) for coordinates computed in `i64`.
    fn put_wide(&mut self, x: i64, y: i64, color: u32) {
        if let (Ok(x), Ok(y)) = (i32::try_from(x), i32::try_from(y)) {
            self.put(x, y, color);
        }
    }

    // Spans are clipped before iterating, so their cost is bounded by the pixmap.
    fn hline(&mut self, x1: i64, x2: i64, y: i64, color: u32) {
        if y < 0 || y >= i64::from(self.height) {
            return;
        }
        let (start, end) = (x1.min(x2).max(0), x1.max(x2).min(i64::from(self.width) - 1));
        for x in start..=end {
            self.put_wide(x, y, color);
        }
    }

    fn vline(&mut self, y1: i64, y2: i64, x: i64, color: u32) {
        if x < 0 || x >= i64::from(self.width) {
            return;
        }
        let (start, end) = (y1.min(y2).max(0), y1.max(y2).min(i64::from(self.height) - 1));
        for y in start..=end {
            self.put_wide(x, y, color);
        }
    }

    // --- Drawing ---

    /// Overwrites every pixel with the current color, ignoring the blend mode.
    pub fn fill(&mut self) {
        let value = self.encode(self.color);
        let bpp = self.format.bytes_per_pixel();
        let mut encoded = [0u8; 4];
        self.format.write_value(&mut encoded, value);
        for chunk in self.pixels.chunks_exact_mut(bpp) {
            chunk.copy_from_slice(&encoded[..bpp]);
        }
    }

    /// Draws a single pixel in the current color.
    pub fn draw_pixel(&mut self, x: i32, y: i32) {
        self.put(x, y, self.color);
    }

    /// Draws a single pixel in `color`.
    pub fn draw_pixel_color(&mut self, x: i32, y: i32, color: u32) {
        self.put(x, y, color);
    }

    /// Draws a one-pixel line between two points (inclusive).
    pub fn draw_line(&mut self, x1: i32, y1: i32, x2: i32, y2: i32) {
        let color = self.color;
        let (x1, y1, x2, y2) = (i64::from(x1), i64::from(y1), i64::from(x2), i64::from(y2));
        let (mut x, mut y) = (x1, y1);
        let dx = (x2 - x1).abs();
        let dy = -(y2 - y1).abs();
        let sx = if x1 < x2 { 1 } else { -1 };
        let sy = if y1 < y2 { 1 } else { -1 };
        let mut err = dx + dy;
        loop {
            self.put_wide(x, y, color);
            if x == x2 && y == y2 {
                break;
            }
            let e2 = 2 * err;
            if e2 >= dy {
                err += dy;
                x += sx;
            }
            if e2 <= dx {
                err += dx;
                y += sy;
            }
        }
    }

    /// Draws the outline of a rectangle.
    pub fn draw_rectangle(&mut self, x: i32, y: i32, width: i32, height: i32) {
        if width <= 0 || height <= 0 {
            return;
        }
        let color = self.color;
        let (x, y) = (i64::from(x), i64::from(y));
        let (x2, y2) = (x + i64::from(width) - 1, y + i64::from(height) - 1);
        self.hline(x, x2, y, color);
        if y2 != y {
            self.hline(x, x2, y2, color);
        }
        if y2 - y > 1 {
            self.vline(y + 1, y2 - 1, x, color);
            if x2 != x {
                self.vline(y + 1, y2 - 1, x2, color);
            }
        }
    }

    /// Fills a rectangle.
    pub fn fill_rectangle(&mut self, x: i32, y: i32, width: i32, height: i32) {
        if width <= 0 || height <= 0 {
            return;
        }
        let color = self.color;
        let (x, y) = (i64::from(x), i64::from(y));
        let x2 = x + i64::from(width) - 1;
        let first = y.max(0);
        let last = (y + i64::from(height) - 1).min(i64::from(self.height) - 1);
        for row in first..=last {
            self.hline(x, x2, row, color);
        }
    }

    /// Draws the outline of a circle (midpoint algorithm).
    pub fn draw_circle(&mut self, cx: i32, cy: i32, radius: i32) {
        if radius < 0 {
            return;
        }
        if !self.touches_circle(cx, cy, radius) {
            return;
        }
        let color = self.color;
        let (cx, cy) = (i64::from(cx), i64::from(cy));
        let (mut x, mut y) = (i64::from(radius), 0i64);
        let mut err = 1 - x;
        while x >= y {
            let mut points = [
                (cx + x, cy + y),
                (cx + y, cy + x),
                (cx - y, cy + x),
                (cx - x, cy + y),
                (cx - x, cy - y),
                (cx - y, cy - x),
                (cx + y, cy - x),
                (cx + x, cy - y),
            ];
            // Octant points coincide on the axes and diagonals; plot each once.
            points.sort_unstable();
            let mut last = None;
            for p in points {
                if last != Some(p) {
                    self.put_wide(p.0, p.1, color);
                    last = Some(p);
                }
            }
            y += 1;
            if err < 0 {
                err += 2 * y + 1;
            } else {
                x -= 1;
                err += 2 * (y - x) + 1;
            }
        }
    }

    /// Fills a circle.
    pub fn fill_circle(&mut self, cx: i32, cy: i32, radius: i32) {
        if radius < 0 {
            return;
        }
        if !self.touches_circle(cx, cy, radius) {
            return;
        }
        let color = self.color;
        let (cx, cy, radius) = (i64::from(cx), i64::from(cy), i64::from(radius));
        let r2 = radius * radius;
        // Only rows inside the pixmap are scanned.
        let first = (-radius).max(-cy);
        let last = radius.min(i64::from(self.height) - 1 - cy);
        for dy in first..=last {
            let rest = r2 - dy * dy;
            let mut half = (rest as f64).sqrt() as i64;
            while half * half > rest {
                half -= 1;
            }
            while (half + 1) * (half + 1) <= rest {
                half += 1;
            }
            self.hline(cx - half, cx + half, cy + dy, color);
        }
    }

    /// Whether the bounding square of a circle overlaps the pixmap.
    fn touches_circle(&self, cx: i32, cy: i32, radius: i32) -> bool {
        let (cx, cy, radius) = (i64::from(cx), i64::from(cy), i64::from(radius));
        cx + radius >= 0
            && cy + radius >= 0
            && cx - radius < i64::from(self.width)
            && cy - radius < i64::from(self.height)
    }

    /// Fills a triangle, including its edges.
    pub fn fill_triangle(&mut self, x1: i32, y1: i32, x2: i32, y2: i32, x3: i32, y3: i32) {
        let color = self.color;
        let edge = |ax: i32, ay: i32, bx: i32, by: i32, px: i32, py: i32| -> i128 {
            let d = |a: i32, b: i32| i128::from(b) - i128::from(a);
            d(ax, bx) * d(ay, py) - d(ay, by) * d(ax, px)
        };
        let area = edge(x1, y1, x2, y2, x3, y3);
        if area == 0 {
            // Degenerate: draw the hull as lines.
            self.draw_line(x1, y1, x2, y2);
            self.draw_line(x2, y2, x3, y3);
            return;
        }
        let min_y = y1.min(y2).min(y3).max(0);
        let max_y = y1.max(y2).max(y3).min(self.height as i32 - 1);
        let min_x = x1.min(x2).min(x3).max(0);
        let max_x = x1.max(x2).max(x3).min(self.width as i32 - 1);
        for y in min_y..=max_y {
            for x in min_x..=max_x {
                let w0 = edge(x2, y2, x3, y3, x, y);
                let w1 = edge(x3, y3, x1, y1, x, y);
                let w2 = edge(x1, y1, x2, y2, x, y);
                let inside = if area > 0 {
                    w0 >= 0 && w1 >= 0 && w2 >= 0
                } else {
                    w0 <= 0 && w1 <= 0 && w2 <= 0
                };
                if inside {
                    self.put(x, y, color);
                }
            }
        }
    }

    /// Draws the whole of `src` with its top-left corner at `(x, y)`.
    pub fn draw_pixmap_at(&mut self, src: &Pixmap, x: i32, y: i32) {
        let (w, h) = (src.width as i32, src.height as i32);
        self.draw_pixmap(src, 0, 0, w, h, x, y, w, h);
    }

    /// Blits a region of `src` into a region of this pixmap.
    ///
    /// Equal source and destination sizes copy pixel for pixel; otherwise the
    /// source is scaled with the current [`PixmapFilter`]. The blend mode of
    /// this pixmap applies. Both regions are clipped.
    #[allow(clippy::too_many_arguments)]
    pub fn draw_pixmap(
        &mut self,
        src: &Pixmap,
        src_x: i32,
        src_y: i32,
        src_width: i32,
        src_height: i32,
        dst_x: i32,
        dst_y: i32,
        dst_width: i32,
        dst_height: i32,
    ) {
        if src_width <= 0 || src_height <= 0 || dst_width <= 0 || dst_height <= 0 {
            return;
        }

        if src_width == dst_width && src_height == dst_height {
            let cols = clip_span(src_x, dst_x, src_width, src.width, self.width);
            let rows = clip_span(src_y, dst_y, src_height, src.height, self.height);
            for row in rows {
                for col in cols.clone() {
                    let (sx, sy) = (src_x + col, src_y + row);
                    self.put(dst_x + col, dst_y + row, src.get_pixel(sx, sy));
                }
            }
            return;
        }

        let x_ratio = src_width as f32 / dst_width as f32;
        let y_ratio = src_height as f32 / dst_height as f32;
        let max_sx = src_x.saturating_add(src_width - 1).min(src.width as i32 - 1);
        let max_sy = src_y.saturating_add(src_height - 1).min(src.height as i32 - 1);
        let min_sx = src_x.max(0);
        let min_sy = src_y.max(0);
        if min_sx > max_sx || min_sy > max_sy {
            return;
        }

        let cols = clip_span(0, dst_x, dst_width, u32::MAX, self.width);
        for row in clip_span(0, dst_y, dst_height, u32::MAX, self.height) {
            let dy = dst_y + row;
            for col in cols.clone() {
                let dx = dst_x + col;
                let color = match self.filter {
                    PixmapFilter::NearestNeighbour => {
                        let sx = src_x
                            .saturating_add((col as f32 * x_ratio) as i32)
                            .clamp(min_sx, max_sx);
                        let sy = src_y
                            .saturating_add((row as f32 * y_ratio) as i32)
                            .clamp(min_sy, max_sy);
                        src.get_pixel(sx, sy)
                    }
                    PixmapFilter::BiLinear => {
                        let fx = (src_x as f32 + (col as f32 + 0.5) * x_ratio - 0.5)
                            .clamp(min_sx as f32, max_sx as f32);
                        let fy = (src_y as f32 + (row as f32 + 0.5) * y_ratio - 0.5)
                            .clamp(min_sy as f32, max_sy as f32);
                        let (x0, y0) = (fx.floor() as i32, fy.floor() as i32);
                        let (x1, y1) = ((x0 + 1).min(max_sx), (y0 + 1).min(max_sy));
                        let (tx, ty) = (fx - x0 as f32, fy - y0 as f32);
                        let top = lerp_color(src.get_pixel(x0, y0), src.get_pixel(x1, y0), tx);
                        let bottom = lerp_color(src.get_pixel(x0, y1), src.get_pixel(x1, y1), tx);
                        lerp_color(top, bottom, ty)
                    }
                };
                self.put(dx, dy, color);
            }
        }
    }

    /// Returns a copy of this pixmap stored in another format.
    ///
    /// Conversion to `IndexedColor` is only supported from an indexed pixmap,
    /// whose palette is kept.
    pub fn convert(&self, format: PixelFormat) -> Result<Pixmap, PixmapError> {
        if format == self.format {
            return Ok(self.clone());
        }
        if format == PixelFormat::IndexedColor {
            return Err(PixmapError::UnsupportedFormat(format!(
                "cannot quantize a {:?} pixmap to IndexedColor",
                self.format
            )));
        }
        let mut converted = Pixmap::new(self.width, self.height, format)?;
        converted.set_blending(Blending::None);
        converted.draw_pixmap_at(self, 0, 0);
        converted.blending = self.blending;
        converted.filter = self.filter;
        converted.color = self.color;
        Ok(converted)
    }
}
