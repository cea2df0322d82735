// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License in the LICENSE-APACHE file or at:
//     https://www.apache.org/licenses/LICENSE-2.0

//! Glyph records and kerning tables

use super::pages::Pages;
use crate::config::RenderMode;
use crate::error::MemoryError;

/// Identity of a cached glyph image
///
/// Thickness is compared exactly; callers should pass the same value they
/// loaded with.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct VariantKey {
    pub codepoint: char,
    pub render_mode: RenderMode,
    pub outline_thickness: f32,
}

impl VariantKey {
    /// Construct
    #[inline]
    pub fn new(codepoint: char, render_mode: RenderMode, outline_thickness: f32) -> Self {
        VariantKey {
            codepoint,
            render_mode,
            outline_thickness,
        }
    }
}

/// Kerning adjustments of one glyph against preceding glyphs
///
/// Absent entries read as zero.
#[derive(Clone, Debug, Default)]
pub struct KerningTable {
    pages: Pages<f32>,
}

impl KerningTable {
    /// Adjustment to apply when `prev` precedes the owning glyph
    #[inline]
    pub fn get(&self, prev: char) -> f32 {
        self.pages.get(prev.into()).copied().unwrap_or(0.0)
    }

    /// Set the adjustment for `prev`
    pub fn set(&mut self, prev: char, value: f32) -> Result<(), MemoryError> {
        *self.pages.slot_mut(prev.into())? = value;
        Ok(())
    }

    /// Iterate over non-zero entries in codepoint order
    pub fn iter(&self) -> impl Iterator<Item = (char, f32)> + '_ {
        self.pages
            .iter()
            .filter(|(_, v)| **v != 0.0)
            .filter_map(|(c, v)| char::from_u32(c).map(|c| (c, *v)))
    }

    /// True if no entry is non-zero
    pub fn is_empty(&self) -> bool {
        self.iter().next().is_none()
    }

    /// Remove all entries
    pub fn clear(&mut self) {
        self.pages.clear();
    }
}

/// A glyph image placed in the atlas, with its metrics
///
/// Metrics are in pixels. `width` and `height` include padding; bearings are
/// adjusted so that the padded quad lines up with the glyph's pen position.
/// The texture rectangle `(s0, t0)` to `(s1, t1)` is expressed per
/// [`TexCoords`](crate::TexCoords).
#[derive(Clone, Debug, Default)]
pub struct GlyphRecord {
    pub codepoint: char,
    pub width: u32,
    pub height: u32,
    /// Offset from the pen position to the left edge
    pub bearing_x: i32,
    /// Offset from the baseline up to the top edge
    pub bearing_y: i32,
    pub advance_x: f32,
    pub advance_y: f32,
    pub s0: f32,
    pub t0: f32,
    pub s1: f32,
    pub t1: f32,
    pub render_mode: RenderMode,
    pub outline_thickness: f32,
    pub kerning: KerningTable,
}

impl GlyphRecord {
    /// The key under which this record is cached
    #[inline]
    pub fn key(&self) -> VariantKey {
        VariantKey::new(self.codepoint, self.render_mode, self.outline_thickness)
    }

    /// True if this record is the variant `(mode, thickness)`
    #[inline]
    pub fn is_variant(&self, mode: RenderMode, thickness: f32) -> bool {
        self.render_mode == mode && self.outline_thickness == thickness
    }

    /// Record a kerning adjustment against `prev`
    #[inline]
    pub fn index_kerning(&mut self, prev: char, value: f32) -> Result<(), MemoryError> {
        self.kerning.set(prev, value)
    }

    /// Kerning adjustment when `prev` precedes this glyph
    #[inline]
    pub fn kerning(&self, prev: char) -> f32 {
        self.kerning.get(prev)
    }
}
