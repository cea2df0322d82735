// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License in the LICENSE-APACHE file or at:
//     https://www.apache.org/licenses/LICENSE-2.0

//! Glyph rastering
//!
//! The [`Rasterizer`] trait is the interface to a font rasterizer. Backends
//! are available if the `ab_glyph` or `fontdue` features are enabled; the
//! `raster` feature selects the default backend, available via [`load_font`].

use crate::config::RenderMode;
use crate::conv::to_usize;
use thiserror::Error;

/// Rasterization errors
#[derive(Clone, Debug, PartialEq, Error)]
pub enum RasterizeError {
    /// The font has no glyph for this char
    #[error("no glyph for {0:?}")]
    MissingGlyph(char),
    #[error("render mode {0:?} is not supported by this rasterizer")]
    UnsupportedMode(RenderMode),
    #[error("cannot convert {format:?} bitmap to depth {depth}")]
    UnsupportedFormat { format: PixelFormat, depth: u8 },
    /// The bitmap data does not match its declared size
    #[error("malformed bitmap")]
    MalformedBitmap,
    #[error("font load error")]
    Font,
}

/// Pixel format of a [`Bitmap`]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    /// 8-bit coverage
    #[default]
    Gray,
    /// Sub-pixel coverage, 3 bytes (RGB) per pixel
    Lcd,
    /// Color, 4 bytes (BGRA) per pixel
    Bgra,
}

impl PixelFormat {
    /// Bytes per pixel
    #[inline]
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            PixelFormat::Gray => 1,
            PixelFormat::Lcd => 3,
            PixelFormat::Bgra => 4,
        }
    }
}

/// Parameters of a raster operation
#[derive(Clone, Debug, PartialEq)]
pub struct RasterRequest {
    pub codepoint: char,
    /// Font size in points (at 72 DPI, thus also pixels per Em)
    pub size: f32,
    pub render_mode: RenderMode,
    /// Stroke width in pixels, for outline modes
    pub outline_thickness: f32,
    pub hinting: bool,
    /// Bytes per pixel of the target atlas
    ///
    /// Depth 3 asks for sub-pixel ([`PixelFormat::Lcd`]) output; other
    /// formats are converted by the caller.
    pub depth: u8,
    /// Weights of the 5-tap LCD filter, if filtering is enabled
    pub lcd_weights: Option<[u8; 5]>,
}

/// A rastered glyph image with metrics
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Bitmap {
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
    /// Bytes from one row to the next
    pub pitch: usize,
    pub format: PixelFormat,
    pub data: Vec<u8>,
    /// Offset from the pen position to the left edge
    pub left: i32,
    /// Offset from the baseline up to the top edge
    pub top: i32,
    pub advance_x: f32,
    pub advance_y: f32,
}

impl Bitmap {
    /// An empty bitmap with the given advance
    ///
    /// Used for glyphs without an outline (e.g. space).
    pub fn empty(advance_x: f32) -> Self {
        Bitmap {
            advance_x,
            ..Default::default()
        }
    }

    /// Check that `data` covers the declared rows
    pub fn validate(&self) -> Result<(), RasterizeError> {
        let row_len = to_usize(self.width) * self.format.bytes_per_pixel();
        if self.height == 0 || self.width == 0 {
            return Ok(());
        }
        let len = self.pitch * (to_usize(self.height) - 1) + row_len;
        if self.pitch < row_len || self.data.len() < len {
            return Err(RasterizeError::MalformedBitmap);
        }
        Ok(())
    }
}

/// Vertical metrics of a face at one size
///
/// Values are in pixels, with `y` up: `descender` and `underline_position`
/// are usually negative.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct LineMetrics {
    /// Distance from the baseline to the top of the tallest glyphs
    pub ascender: f32,
    /// Distance from the baseline to the bottom of the lowest glyphs
    pub descender: f32,
    /// Extra space between the descender of a line and the next ascender
    pub line_gap: f32,
    /// Offset of the underline from the baseline (zero if unknown)
    pub underline_position: f32,
    /// Thickness of the underline (zero if unknown)
    pub underline_thickness: f32,
}

impl LineMetrics {
    /// Baseline-to-baseline distance
    #[inline]
    pub fn height(&self) -> f32 {
        self.ascender - self.descender + self.line_gap
    }
}

/// A font rasterizer
///
/// This is the source of glyph images and metrics. Implementations wrap a
/// single font face.
pub trait Rasterizer {
    /// True if the font has a glyph for `c`
    fn has_glyph(&self, c: char) -> bool;

    /// Raster a glyph
    fn rasterize(&mut self, request: &RasterRequest) -> Result<Bitmap, RasterizeError>;

    /// Horizontal advance adjustment (in pixels) for `next` following `prev`
    fn kerning(&self, prev: char, next: char, size: f32) -> f32;

    /// Vertical metrics at `size`
    fn line_metrics(&self, size: f32) -> LineMetrics;
}

impl<R: Rasterizer + ?Sized> Rasterizer for Box<R> {
    #[inline]
    fn has_glyph(&self, c: char) -> bool {
        (**self).has_glyph(c)
    }

    #[inline]
    fn rasterize(&mut self, request: &RasterRequest) -> Result<Bitmap, RasterizeError> {
        (**self).rasterize(request)
    }

    #[inline]
    fn kerning(&self, prev: char, next: char, size: f32) -> f32 {
        (**self).kerning(prev, next, size)
    }

    #[inline]
    fn line_metrics(&self, size: f32) -> LineMetrics {
        (**self).line_metrics(size)
    }
}

/// Apply a 5-tap filter to a row of sub-pixel coverage
///
/// Weights are in units of 1/256.
pub fn lcd_filter(row: &mut [u8], weights: [u8; 5]) {
    let src = row.to_vec();
    for (i, out) in row.iter_mut().enumerate() {
        let mut sum = 0u32;
        for (k, w) in weights.iter().enumerate() {
            if let Some(v) = (i + k).checked_sub(2).and_then(|j| src.get(j)) {
                sum += u32::from(*v) * u32::from(*w);
            }
        }
        *out = (sum >> 8).min(255) as u8;
    }
}

#[cfg(feature = "ab_glyph")]
#[cfg_attr(doc_cfg, doc(cfg(feature = "ab_glyph")))]
pub use ab::AbGlyphRasterizer;

#[cfg(feature = "ab_glyph")]
mod ab {
    use super::*;
    use ab_glyph::{Font, PxScale, ScaleFont};
    use easy_cast::*;
    use std::result::Result;

    /// Rasterizer using `ab_glyph`
    ///
    /// Supports [`RenderMode::Normal`] and [`RenderMode::SignedDistanceField`]
    /// (the latter yields coverage; the distance transform is applied by the
    /// caller). Hinting is not supported and ignored.
    #[derive(Debug)]
    pub struct AbGlyphRasterizer<F> {
        font: F,
    }

    impl<F: Font> AbGlyphRasterizer<F> {
        /// Construct
        pub fn new(font: F) -> Self {
            AbGlyphRasterizer { font }
        }

        /// Access the font
        pub fn font(&self) -> &F {
            &self.font
        }

        fn scale(&self, size: f32) -> PxScale {
            let upem = self.font.units_per_em().unwrap_or(1000.0);
            PxScale::from(size * self.font.height_unscaled() / upem)
        }
    }

    impl<F: Font> Rasterizer for AbGlyphRasterizer<F> {
        fn has_glyph(&self, c: char) -> bool {
            self.font.glyph_id(c).0 != 0
        }

        fn rasterize(&mut self, request: &RasterRequest) -> Result<Bitmap, RasterizeError> {
            match request.render_mode {
                RenderMode::Normal | RenderMode::SignedDistanceField => (),
                mode => return Err(RasterizeError::UnsupportedMode(mode)),
            }

            let id = self.font.glyph_id(request.codepoint);
            let scale = self.scale(request.size);
            let advance_x = self.font.as_scaled(scale).h_advance(id);

            // LCD output is rastered at triple horizontal resolution
            let lcd = request.depth == 3;
            let raster_scale = if lcd {
                PxScale {
                    x: scale.x * 3.0,
                    y: scale.y,
                }
            } else {
                scale
            };

            let glyph = id.with_scale_and_position(raster_scale, ab_glyph::point(0.0, 0.0));
            let Some(outline) = self.font.outline_glyph(glyph) else {
                return Ok(Bitmap::empty(advance_x));
            };

            let bounds = outline.px_bounds();
            let size = bounds.max - bounds.min;
            let (w, h) = (u32::conv_trunc(size.x), u32::conv_trunc(size.y));
            if w == 0 || h == 0 {
                log::warn!("Zero-sized glyph: {:?}", request.codepoint);
                return Ok(Bitmap::empty(advance_x));
            }

            let mut data = vec![0; usize::conv(w * h)];
            outline.draw(|x, y, c| {
                // Convert to u8 with saturating conversion, rounding down:
                data[usize::conv((y * w) + x)] = (c * 256.0) as u8;
            });

            let top = -i32::conv_trunc(bounds.min.y);
            if !lcd {
                return Ok(Bitmap {
                    width: w,
                    height: h,
                    pitch: usize::conv(w),
                    format: PixelFormat::Gray,
                    data,
                    left: bounds.min.x.cast_trunc(),
                    top,
                    advance_x,
                    advance_y: 0.0,
                });
            }

            // Pad each row to a whole number of pixels
            let width = w.div_ceil(3);
            let pitch = usize::conv(width * 3);
            let mut lcd_data = vec![0; pitch * usize::conv(h)];
            for (src, dst) in data
                .chunks_exact(usize::conv(w))
                .zip(lcd_data.chunks_exact_mut(pitch))
            {
                dst[..src.len()].copy_from_slice(src);
                if let Some(weights) = request.lcd_weights {
                    lcd_filter(dst, weights);
                }
            }

            Ok(Bitmap {
                width,
                height: h,
                pitch,
                format: PixelFormat::Lcd,
                data: lcd_data,
                left: (bounds.min.x / 3.0).floor().cast_trunc(),
                top,
                advance_x,
                advance_y: 0.0,
            })
        }

        fn kerning(&self, prev: char, next: char, size: f32) -> f32 {
            let font = self.font.as_scaled(self.scale(size));
            font.kern(self.font.glyph_id(prev), self.font.glyph_id(next))
        }

        fn line_metrics(&self, size: f32) -> LineMetrics {
            // ab_glyph does not read the post table; underline is unknown
            let font = self.font.as_scaled(self.scale(size));
            LineMetrics {
                ascender: font.ascent(),
                descender: font.descent(),
                line_gap: font.line_gap(),
                ..LineMetrics::default()
            }
        }
    }
}

#[cfg(feature = "fontdue")]
#[cfg_attr(doc_cfg, doc(cfg(feature = "fontdue")))]
pub use fd::FontdueRasterizer;

#[cfg(feature = "fontdue")]
mod fd {
    use super::*;
    use easy_cast::*;
    use std::result::Result;

    /// Rasterizer using `fontdue`
    ///
    /// Yields gray coverage for [`RenderMode::Normal`] and
    /// [`RenderMode::SignedDistanceField`].
    pub struct FontdueRasterizer {
        font: fontdue::Font,
    }

    impl FontdueRasterizer {
        /// Construct
        pub fn new(font: fontdue::Font) -> Self {
            FontdueRasterizer { font }
        }

        /// Access the font
        pub fn font(&self) -> &fontdue::Font {
            &self.font
        }
    }

    impl Rasterizer for FontdueRasterizer {
        fn has_glyph(&self, c: char) -> bool {
            self.font.lookup_glyph_index(c) != 0
        }

        fn rasterize(&mut self, request: &RasterRequest) -> Result<Bitmap, RasterizeError> {
            match request.render_mode {
                RenderMode::Normal | RenderMode::SignedDistanceField => (),
                mode => return Err(RasterizeError::UnsupportedMode(mode)),
            }

            let (metrics, data) = self.font.rasterize(request.codepoint, request.size);
            let advance_x = metrics.advance_width;
            if metrics.width == 0 || metrics.height == 0 {
                return Ok(Bitmap::empty(advance_x));
            }

            Ok(Bitmap {
                width: metrics.width.cast(),
                height: metrics.height.cast(),
                pitch: metrics.width,
                format: PixelFormat::Gray,
                data,
                left: metrics.xmin,
                top: metrics.ymin + i32::conv(metrics.height),
                advance_x,
                advance_y: metrics.advance_height,
            })
        }

        fn kerning(&self, prev: char, next: char, size: f32) -> f32 {
            self.font.horizontal_kern(prev, next, size).unwrap_or(0.0)
        }

        fn line_metrics(&self, size: f32) -> LineMetrics {
            match self.font.horizontal_line_metrics(size) {
                Some(m) => LineMetrics {
                    ascender: m.ascent,
                    descender: m.descent,
                    line_gap: m.line_gap,
                    ..LineMetrics::default()
                },
                None => {
                    log::warn!("FontdueRasterizer: font has no horizontal line metrics");
                    LineMetrics::default()
                }
            }
        }
    }
}

/// Load a font using the default backend
///
/// `data` is the contents of a font file; face index 0 is used.
#[cfg(any(feature = "ab_glyph", feature = "fontdue"))]
#[cfg_attr(doc_cfg, doc(cfg(any(feature = "ab_glyph", feature = "fontdue"))))]
pub fn load_font(data: Vec<u8>) -> Result<Box<dyn Rasterizer>, RasterizeError> {
    cfg_if::cfg_if! {
        if #[cfg(feature = "ab_glyph")] {
            ab_glyph::FontVec::try_from_vec(data)
                .map(|font| Box::new(AbGlyphRasterizer::new(font)) as Box<dyn Rasterizer>)
                .map_err(|err| {
                    log::error!("Failed to load font: {err}");
                    RasterizeError::Font
                })
        } else {
            fontdue::Font::from_bytes(data, fontdue::FontSettings::default())
                .map(|font| Box::new(FontdueRasterizer::new(font)) as Box<dyn Rasterizer>)
                .map_err(|err| {
                    log::error!("Failed to load font: {err}");
                    RasterizeError::Font
                })
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn filter_preserves_flat_coverage() {
        let mut row = [255u8; 9];
        lcd_filter(&mut row, [0x10, 0x40, 0x70, 0x40, 0x10]);
        assert_eq!(row[4], 255);
        assert!(row[0] < 255);
    }

    #[test]
    fn filter_spreads_single_subpixel() {
        let mut row = [0, 0, 0, 0, 128, 0, 0, 0, 0];
        lcd_filter(&mut row, [0x10, 0x40, 0x70, 0x40, 0x10]);
        assert_eq!(row, [0, 0, 8, 32, 56, 32, 8, 0, 0]);
    }

    #[test]
    fn validate() {
        let mut bitmap = Bitmap {
            width: 2,
            height: 2,
            pitch: 3,
            data: vec![0; 5],
            ..Default::default()
        };
        assert!(bitmap.validate().is_ok());
        bitmap.data.pop();
        assert_eq!(bitmap.validate(), Err(RasterizeError::MalformedBitmap));
        assert!(Bitmap::empty(4.0).validate().is_ok());
    }
}
