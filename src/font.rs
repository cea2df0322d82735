// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License in the LICENSE-APACHE file or at:
//     https://www.apache.org/licenses/LICENSE-2.0

//! Texture font: glyph provisioning

use crate::atlas::{Atlas, AtlasError};
use crate::cache::{GlyphCache, GlyphRecord, KerningTable};
use crate::config::{Config, KerningPolicy, RenderMode, TexCoords};
use crate::conv::{self, to_usize};
use crate::error::{ArgumentError, LoadError, MemoryError};
use crate::raster::{LineMetrics, RasterRequest, RasterizeError, Rasterizer};
use crate::sdf;
use thiserror::Error;

/// Failure of [`TextureFont::load_glyphs`]
#[derive(Debug, Error)]
#[error("failed to load glyphs ({remaining} chars not loaded)")]
pub struct LoadGlyphsError {
    /// Number of chars, starting from the one which failed, not loaded
    pub remaining: usize,
    #[source]
    pub source: LoadError,
}

/// Padding (pixels) around a glyph bitmap within its atlas region
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct Padding {
    left: u32,
    top: u32,
    right: u32,
    bottom: u32,
}

impl Padding {
    fn new(mode: RenderMode, thickness: f32, extra: u32) -> Result<Self, ArgumentError> {
        let mut pad = Padding {
            left: 0,
            top: 0,
            right: 1,
            bottom: 1,
        };
        if mode == RenderMode::SignedDistanceField {
            pad.left = 1;
            pad.top = 1;
        }

        let mut extra = extra;
        if mode.is_outline() {
            // thickness is validated: finite and non-negative
            let thickness = thickness.ceil();
            if thickness >= u32::MAX as f32 {
                return Err(ArgumentError::ThicknessTooLarge);
            }
            extra = extra
                .checked_add(thickness as u32)
                .ok_or(ArgumentError::GlyphTooLarge)?;
        }
        let add = |side: u32| side.checked_add(extra).ok_or(ArgumentError::GlyphTooLarge);
        Ok(Padding {
            left: add(pad.left)?,
            top: add(pad.top)?,
            right: add(pad.right)?,
            bottom: add(pad.bottom)?,
        })
    }

    /// Padded size of a `width` x `height` bitmap
    fn apply(&self, width: u32, height: u32) -> Result<(u32, u32), ArgumentError> {
        let width = width.checked_add(self.left).and_then(|w| w.checked_add(self.right));
        let height = height.checked_add(self.top).and_then(|h| h.checked_add(self.bottom));
        width.zip(height).ok_or(ArgumentError::GlyphTooLarge)
    }
}

fn check_thickness(thickness: f32) -> Result<(), ArgumentError> {
    if !thickness.is_finite() {
        Err(ArgumentError::NonFiniteThickness)
    } else if thickness < 0.0 {
        Err(ArgumentError::NegativeThickness)
    } else {
        Ok(())
    }
}

/// Snap metrics to whole pixels
///
/// The underline sits at least 2 pixels below the baseline and is at least
/// 1 pixel thick.
fn snap_metrics(raw: LineMetrics) -> LineMetrics {
    let px = |v: f32| if v.is_finite() { v } else { 0.0 };
    let ascender = px(raw.ascender).floor();
    let descender = px(raw.descender).floor();
    let height = px(raw.height()).floor();
    LineMetrics {
        ascender,
        descender,
        line_gap: height - ascender + descender,
        underline_position: px(raw.underline_position).round().min(-2.0),
        underline_thickness: px(raw.underline_thickness).round().max(1.0),
    }
}

/// Texture coordinates `[s0, t0, s1, t1]` of a pixel rectangle
fn tex_coords(mode: TexCoords, atlas: &Atlas, x: u32, y: u32, w: u32, h: u32) -> [f32; 4] {
    let (x0, y0) = (x as f32, y as f32);
    let (x1, y1) = ((x + w) as f32, (y + h) as f32);
    match mode {
        TexCoords::Normalized => {
            let (aw, ah) = (atlas.width() as f32, atlas.height() as f32);
            [x0 / aw, y0 / ah, x1 / aw, y1 / ah]
        }
        TexCoords::Pixels => [x0 - 0.5, y0 - 0.5, x1 - 0.5, y1 - 0.5],
    }
}

/// A font face at one size, with glyphs provisioned into a texture atlas
///
/// Glyphs are rastered on first request, packed into the [`Atlas`] and
/// cached by `(codepoint, render mode, outline thickness)`. Later requests for
/// the same variant return the cached [`GlyphRecord`] without touching the
/// rasterizer or atlas.
///
/// A "missing" glyph (a small opaque block) is placed in the atlas on
/// construction. It is returned for `'\0'` and (as a copy cached under the
/// requested key) for any char the font has no glyph for.
///
/// The atlas is shared with a renderer through [`Self::atlas_mut`]: upload
/// [`Atlas::data`] while [`Atlas::is_dirty`], then call
/// [`Atlas::mark_clean`].
#[derive(Debug)]
pub struct TextureFont<R: Rasterizer> {
    rasterizer: R,
    atlas: Atlas,
    size: f32,
    metrics: LineMetrics,
    config: Config,
    cache: GlyphCache,
    missing: GlyphRecord,
    kerning_stale: bool,
}

impl<R: Rasterizer> TextureFont<R> {
    /// Construct
    ///
    /// `size` is in points at 72 DPI (thus pixels per Em). Fails if the atlas
    /// has no room for the missing glyph.
    pub fn new(rasterizer: R, mut atlas: Atlas, size: f32, config: Config) -> Result<Self, LoadError> {
        if !size.is_finite() || size <= 0.0 {
            return Err(ArgumentError::InvalidFontSize.into());
        }
        check_thickness(config.outline_thickness)?;

        // 4x4 opaque block; texture coordinates address only its centre pixel
        let region = atlas.get_region(5, 5)?;
        let row_len = 4 * usize::from(atlas.depth());
        let mut row = Vec::new();
        row.try_reserve_exact(row_len).map_err(MemoryError::from)?;
        row.resize(row_len, 0xFF);
        atlas.set_region(region.x, region.y, 4, 4, &row, 0)?;

        let [s0, t0, s1, t1] = tex_coords(config.tex_coords, &atlas, region.x + 2, region.y + 2, 1, 1);
        let missing = GlyphRecord {
            codepoint: '\0',
            width: 4,
            height: 4,
            s0,
            t0,
            s1,
            t1,
            ..GlyphRecord::default()
        };
        let metrics = snap_metrics(rasterizer.line_metrics(size));
        log::debug!(
            "TextureFont::new: size {size}, atlas {}x{}x{}",
            atlas.width(),
            atlas.height(),
            atlas.depth()
        );

        Ok(TextureFont {
            rasterizer,
            atlas,
            size,
            metrics,
            config,
            cache: GlyphCache::new(),
            missing,
            kerning_stale: false,
        })
    }

    /// Font size (points at 72 DPI)
    #[inline]
    pub fn size(&self) -> f32 {
        self.size
    }

    /// Line metrics, snapped to whole pixels
    ///
    /// The underline position is at most `-2.0` and its thickness at least
    /// `1.0`.
    #[inline]
    pub fn line_metrics(&self) -> &LineMetrics {
        &self.metrics
    }

    /// Baseline-to-baseline distance
    #[inline]
    pub fn line_height(&self) -> f32 {
        self.metrics.height()
    }

    #[inline]
    pub fn config(&self) -> &Config {
        &self.config
    }

    #[inline]
    pub fn rasterizer(&self) -> &R {
        &self.rasterizer
    }

    #[inline]
    pub fn atlas(&self) -> &Atlas {
        &self.atlas
    }

    /// Access the atlas (e.g. to upload it and mark it clean)
    ///
    /// Allocating from the atlas directly is allowed; clearing it invalidates
    /// all cached glyphs.
    #[inline]
    pub fn atlas_mut(&mut self) -> &mut Atlas {
        &mut self.atlas
    }

    #[inline]
    pub fn cache(&self) -> &GlyphCache {
        &self.cache
    }

    /// The glyph used for `'\0'` and chars the font lacks
    #[inline]
    pub fn missing_glyph(&self) -> &GlyphRecord {
        &self.missing
    }

    /// Find a cached glyph without loading
    pub fn find_glyph(&self, c: char, mode: RenderMode, thickness: f32) -> Option<&GlyphRecord> {
        if c == '\0' {
            return Some(&self.missing);
        }
        self.cache.find_glyph(c, mode, thickness)
    }

    /// Get a glyph in the configured default variant, loading as required
    #[inline]
    pub fn get_glyph(&mut self, c: char) -> Result<&GlyphRecord, LoadError> {
        let (mode, thickness) = (self.config.render_mode, self.config.outline_thickness);
        self.get_or_load(c, mode, thickness)
    }

    /// Get a glyph variant, loading as required
    ///
    /// On failure nothing is registered and the atlas is unchanged. In
    /// particular, on [`LoadError::AtlasFull`] the caller may
    /// [enlarge](Self::enlarge_atlas) the atlas and retry.
    pub fn get_or_load(
        &mut self,
        c: char,
        mode: RenderMode,
        thickness: f32,
    ) -> Result<&GlyphRecord, LoadError> {
        let eager = self.config.kerning_policy == KerningPolicy::Eager;
        self.provision(c, mode, thickness, eager)?;
        Ok(self.find_glyph(c, mode, thickness).unwrap_or(&self.missing))
    }

    /// Load the default variant of each char of `text`
    ///
    /// Stops at the first failure. Kerning is regenerated once, after the
    /// last glyph is loaded, regardless of [`KerningPolicy`].
    pub fn load_glyphs(&mut self, text: &str) -> Result<(), LoadGlyphsError> {
        let (mode, thickness) = (self.config.render_mode, self.config.outline_thickness);

        let mut result = Ok(());
        for (index, c) in text.char_indices() {
            if let Err(source) = self.provision(c, mode, thickness, false) {
                let remaining = text[index..].chars().count();
                log::debug!("TextureFont::load_glyphs: stopped at {c:?}: {source}");
                result = Err(LoadGlyphsError { remaining, source });
                break;
            }
        }

        if self.kerning_stale {
            if let Err(err) = self.finalize_kerning() {
                log::warn!("TextureFont::load_glyphs: kerning not updated: {err}");
                if result.is_ok() {
                    result = Err(LoadGlyphsError {
                        remaining: 0,
                        source: err.into(),
                    });
                }
            }
        }
        result
    }

    /// True when kerning tables do not account for all loaded glyphs
    ///
    /// Call [`Self::finalize_kerning`] to update.
    #[inline]
    pub fn kerning_is_stale(&self) -> bool {
        self.kerning_stale
    }

    /// Regenerate kerning tables of all cached glyphs
    ///
    /// Does nothing (beyond clearing the stale flag) if kerning is disabled.
    /// On failure the tables remain stale.
    pub fn finalize_kerning(&mut self) -> Result<(), MemoryError> {
        if !self.config.kerning() {
            self.kerning_stale = false;
            return Ok(());
        }

        let size = self.size;
        let rasterizer = &self.rasterizer;
        self.kerning_stale = true;
        self.cache
            .regenerate_kerning(|prev, next| rasterizer.kerning(prev, next, size))?;
        self.kerning_stale = false;
        Ok(())
    }

    /// Kerning adjustment of `c` (default variant) when preceded by `prev`
    ///
    /// Zero if `c` is not loaded.
    pub fn kerning(&self, c: char, prev: char) -> f32 {
        self.find_glyph(c, self.config.render_mode, self.config.outline_thickness)
            .map(|record| record.kerning(prev))
            .unwrap_or(0.0)
    }

    /// Enlarge the atlas
    ///
    /// Cached glyphs keep their pixel position. With
    /// [`TexCoords::Normalized`], all texture coordinates are rescaled.
    pub fn enlarge_atlas(&mut self, width: u32, height: u32) -> Result<(), AtlasError> {
        let (old_w, old_h) = (self.atlas.width(), self.atlas.height());
        self.atlas.enlarge(width, height)?;

        if self.config.tex_coords == TexCoords::Normalized {
            let mul_w = old_w as f32 / width as f32;
            let mul_h = old_h as f32 / height as f32;
            for record in self.cache.iter_mut().chain(std::iter::once(&mut self.missing)) {
                record.s0 *= mul_w;
                record.s1 *= mul_w;
                record.t0 *= mul_h;
                record.t1 *= mul_h;
            }
        }
        Ok(())
    }

    /// Ensure variant `(c, mode, thickness)` is cached
    fn provision(&mut self, c: char, mode: RenderMode, thickness: f32, eager: bool) -> Result<(), LoadError> {
        if c == '\0' {
            return Ok(());
        }
        check_thickness(thickness)?;
        if self.cache.find_glyph(c, mode, thickness).is_some() {
            log::trace!("TextureFont: cache hit for {c:?} ({mode:?}, {thickness})");
            return Ok(());
        }
        self.load(c, mode, thickness, eager)
    }

    fn load(&mut self, c: char, mode: RenderMode, thickness: f32, eager: bool) -> Result<(), LoadError> {
        let depth = self.atlas.depth();
        if mode == RenderMode::SignedDistanceField && depth != 1 {
            return Err(ArgumentError::SdfRequiresGray(depth).into());
        }

        let pad = Padding::new(mode, thickness, self.config.padding)?;

        if !self.rasterizer.has_glyph(c) {
            return self.index_missing(c, mode, thickness);
        }
        let request = RasterRequest {
            codepoint: c,
            size: self.size,
            render_mode: mode,
            outline_thickness: thickness,
            hinting: self.config.hinting(),
            depth,
            lcd_weights: self.config.lcd_filter(),
        };
        let bitmap = match self.rasterizer.rasterize(&request) {
            Ok(bitmap) => bitmap,
            Err(RasterizeError::MissingGlyph(_)) => return self.index_missing(c, mode, thickness),
            Err(err) => return Err(err.into()),
        };
        bitmap.validate()?;

        let (width, height) = pad.apply(bitmap.width, bitmap.height)?;
        let bearing_x = i32::try_from(pad.left)
            .ok()
            .and_then(|left| bitmap.left.checked_sub(left));
        let bearing_y = i32::try_from(pad.top)
            .ok()
            .and_then(|top| bitmap.top.checked_add(top));
        let (bearing_x, bearing_y) = bearing_x
            .zip(bearing_y)
            .ok_or(ArgumentError::GlyphTooLarge)?;

        // Skip the allocation when the region could never fit
        if width > self.atlas.width() - 2 || height > self.atlas.height() - 2 {
            log::warn!("TextureFont: glyph {c:?} ({width}x{height}) exceeds the atlas");
            return Err(LoadError::AtlasFull { width, height });
        }
        let stride = to_usize(width) * usize::from(depth);

        let len = stride
            .checked_mul(to_usize(height))
            .ok_or(ArgumentError::GlyphTooLarge)?;
        let mut buffer = Vec::new();
        buffer.try_reserve_exact(len).map_err(MemoryError::from)?;
        buffer.resize(len, 0);
        let origin = to_usize(pad.top) * stride + to_usize(pad.left) * usize::from(depth);
        conv::blit(&bitmap, &mut buffer[origin..], stride, depth)?;

        if mode == RenderMode::SignedDistanceField {
            buffer = sdf::build_u8(&buffer, width, height);
        }

        // Everything which may fail for reasons other than memory is done
        // before the atlas is touched.
        self.cache.reserve(c)?;
        let region = match self.atlas.get_region(width, height) {
            Ok(region) => region,
            Err(err) => {
                if let AtlasError::Full { .. } = err {
                    log::warn!("TextureFont: atlas full; cannot load {c:?} ({width}x{height})");
                }
                return Err(err.into());
            }
        };
        self.atlas
            .set_region(region.x, region.y, width, height, &buffer, stride)?;

        let [s0, t0, s1, t1] = tex_coords(
            self.config.tex_coords,
            &self.atlas,
            region.x,
            region.y,
            width,
            height,
        );
        let record = GlyphRecord {
            codepoint: c,
            width,
            height,
            bearing_x,
            bearing_y,
            advance_x: bitmap.advance_x,
            advance_y: bitmap.advance_y,
            s0,
            t0,
            s1,
            t1,
            render_mode: mode,
            outline_thickness: thickness,
            kerning: KerningTable::default(),
        };
        self.cache.index_glyph(record)?;
        log::debug!(
            "TextureFont: loaded {c:?} ({mode:?}, {thickness}) at ({}, {}) size {width}x{height}",
            region.x,
            region.y
        );

        self.update_kerning(eager);
        Ok(())
    }

    /// Cache a copy of the missing glyph under `(c, mode, thickness)`
    fn index_missing(&mut self, c: char, mode: RenderMode, thickness: f32) -> Result<(), LoadError> {
        log::warn!("TextureFont: no glyph for {c:?}; using missing glyph");
        let record = GlyphRecord {
            codepoint: c,
            render_mode: mode,
            outline_thickness: thickness,
            kerning: KerningTable::default(),
            ..self.missing.clone()
        };
        self.cache.index_glyph(record)?;
        Ok(())
    }

    /// Kerning after a glyph is indexed
    ///
    /// The glyph is already registered, so a failure here leaves tables
    /// stale rather than failing the load.
    fn update_kerning(&mut self, eager: bool) {
        if !self.config.kerning() {
            return;
        }
        if eager {
            if let Err(err) = self.finalize_kerning() {
                log::warn!("TextureFont: kerning not updated: {err}");
            }
        } else {
            self.kerning_stale = true;
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn padding() {
        let pad = |mode, thickness, extra| {
            let p = Padding::new(mode, thickness, extra).unwrap();
            (p.left, p.top, p.right, p.bottom)
        };
        assert_eq!(pad(RenderMode::Normal, 0.0, 0), (0, 0, 1, 1));
        assert_eq!(pad(RenderMode::SignedDistanceField, 0.0, 0), (1, 1, 1, 1));
        assert_eq!(pad(RenderMode::Normal, 0.0, 2), (2, 2, 3, 3));
        assert_eq!(pad(RenderMode::OutlineEdge, 1.5, 0), (2, 2, 3, 3));
        assert_eq!(pad(RenderMode::OutlineNegative, 1.0, 1), (2, 2, 3, 3));
        // Thickness is ignored outside outline modes
        assert_eq!(pad(RenderMode::Normal, 3.0, 0), (0, 0, 1, 1));
    }

    #[test]
    fn padding_overflow() {
        let pad = Padding::new;
        assert_eq!(
            pad(RenderMode::OutlineEdge, 1e10, 0),
            Err(ArgumentError::ThicknessTooLarge)
        );
        assert_eq!(
            pad(RenderMode::OutlinePositive, f32::MAX, 0),
            Err(ArgumentError::ThicknessTooLarge)
        );
        assert_eq!(
            pad(RenderMode::Normal, 0.0, u32::MAX),
            Err(ArgumentError::GlyphTooLarge)
        );
        assert_eq!(
            pad(RenderMode::OutlineEdge, 4e9, u32::MAX / 2),
            Err(ArgumentError::GlyphTooLarge)
        );
        // Out-of-range thickness is fine when the mode ignores it
        assert!(pad(RenderMode::Normal, 1e10, 0).is_ok());

        let p = pad(RenderMode::Normal, 0.0, 10).unwrap();
        assert_eq!(p.apply(4, 5), Ok((25, 26)));
        assert_eq!(p.apply(u32::MAX - 20, 5), Err(ArgumentError::GlyphTooLarge));
        assert_eq!(p.apply(5, u32::MAX), Err(ArgumentError::GlyphTooLarge));
    }

    #[test]
    fn thickness() {
        assert_eq!(check_thickness(0.0), Ok(()));
        assert_eq!(check_thickness(2.5), Ok(()));
        assert_eq!(check_thickness(-1.0), Err(ArgumentError::NegativeThickness));
        assert_eq!(check_thickness(f32::NAN), Err(ArgumentError::NonFiniteThickness));
        assert_eq!(check_thickness(f32::INFINITY), Err(ArgumentError::NonFiniteThickness));
    }

    #[test]
    fn metrics() {
        let raw = LineMetrics {
            ascender: 9.7,
            descender: -2.4,
            line_gap: 1.0,
            underline_position: -1.2,
            underline_thickness: 0.4,
        };
        let m = snap_metrics(raw);
        assert_eq!((m.ascender, m.descender), (9.0, -3.0));
        // floor(9.7 + 2.4 + 1.0) = 13
        assert_eq!(m.line_gap, 1.0);
        assert_eq!(m.height(), 13.0);
        assert_eq!(m.underline_position, -2.0);
        assert_eq!(m.underline_thickness, 1.0);

        let raw = LineMetrics {
            underline_position: -3.6,
            underline_thickness: 2.5,
            ..raw
        };
        let m = snap_metrics(raw);
        assert_eq!((m.underline_position, m.underline_thickness), (-4.0, 3.0));

        let m = snap_metrics(LineMetrics {
            ascender: f32::NAN,
            ..LineMetrics::default()
        });
        assert_eq!(m.ascender, 0.0);
        assert_eq!(m.line_gap, 0.0);
        assert_eq!((m.underline_position, m.underline_thickness), (-2.0, 1.0));
    }

    #[test]
    fn coords() {
        let atlas = Atlas::new(64, 32, 1).unwrap();
        assert_eq!(
            tex_coords(TexCoords::Normalized, &atlas, 16, 8, 16, 8),
            [0.25, 0.25, 0.5, 0.5]
        );
        assert_eq!(
            tex_coords(TexCoords::Pixels, &atlas, 16, 8, 16, 8),
            [15.5, 7.5, 31.5, 15.5]
        );
    }
}
