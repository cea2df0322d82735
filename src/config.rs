// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License in the LICENSE-APACHE file or at:
//     https://www.apache.org/licenses/LICENSE-2.0

//! Glyph provisioning configuration

/// Glyph render mode
///
/// Together with the outline thickness this distinguishes variants of a
/// glyph in the cache.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Ord, PartialOrd, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum RenderMode {
    /// Plain coverage
    #[default]
    Normal,
    /// Stroke centred on the outline
    OutlineEdge,
    /// Stroke outside the outline (glyph grows)
    OutlinePositive,
    /// Stroke inside the outline (glyph shrinks)
    OutlineNegative,
    /// Signed distance field computed from coverage
    SignedDistanceField,
}

impl RenderMode {
    /// True for the stroked modes
    #[inline]
    pub fn is_outline(self) -> bool {
        matches!(
            self,
            RenderMode::OutlineEdge | RenderMode::OutlinePositive | RenderMode::OutlineNegative
        )
    }
}

/// Texture coordinate convention for glyph records
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum TexCoords {
    /// Coordinates in `[0, 1]`, relative to the atlas size
    #[default]
    Normalized,
    /// Pixel coordinates, offset by half a pixel to address pixel centres
    Pixels,
}

/// When kerning tables are regenerated
///
/// Regeneration is quadratic in the number of cached glyphs.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum KerningPolicy {
    /// After each glyph is loaded
    #[default]
    Eager,
    /// Only on [`TextureFont::finalize_kerning`](crate::TextureFont::finalize_kerning)
    /// (and at the end of [`TextureFont::load_glyphs`](crate::TextureFont::load_glyphs))
    Deferred,
}

bitflags::bitflags! {
    /// Boolean options
    #[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
    #[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
    pub struct ConfigFlags: u8 {
        /// Request hinted outlines from the rasterizer
        const HINTING = 1 << 0;
        /// Build kerning tables
        const KERNING = 1 << 1;
        /// Apply the LCD filter to sub-pixel bitmaps
        const LCD_FILTERING = 1 << 2;
    }
}

impl Default for ConfigFlags {
    fn default() -> Self {
        ConfigFlags::all()
    }
}

/// Configuration of a [`TextureFont`](crate::TextureFont)
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Config {
    /// Render mode used by [`TextureFont::get_glyph`](crate::TextureFont::get_glyph)
    ///
    /// Other variants may be requested explicitly with
    /// [`TextureFont::get_or_load`](crate::TextureFont::get_or_load).
    pub render_mode: RenderMode,
    /// Outline thickness (pixels) used with [`Self::render_mode`]
    pub outline_thickness: f32,
    pub flags: ConfigFlags,
    /// Weights of the 5-tap LCD filter in units of 1/256
    ///
    /// Only used for atlases of depth 3 when [`ConfigFlags::LCD_FILTERING`]
    /// is set. Weights should sum to 256 to preserve intensity.
    pub lcd_weights: [u8; 5],
    pub tex_coords: TexCoords,
    /// Extra padding (pixels) on each side of each glyph
    ///
    /// This is in addition to the padding required by the render mode.
    pub padding: u32,
    pub kerning_policy: KerningPolicy,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            render_mode: RenderMode::default(),
            outline_thickness: 0.0,
            flags: ConfigFlags::default(),
            lcd_weights: [0x10, 0x40, 0x70, 0x40, 0x10],
            tex_coords: TexCoords::default(),
            padding: 0,
            kerning_policy: KerningPolicy::default(),
        }
    }
}

impl Config {
    /// Alternative default constructor
    pub fn new() -> Self {
        Self::default()
    }

    /// True if hinting is enabled
    #[inline]
    pub fn hinting(&self) -> bool {
        self.flags.contains(ConfigFlags::HINTING)
    }

    /// True if kerning is enabled
    #[inline]
    pub fn kerning(&self) -> bool {
        self.flags.contains(ConfigFlags::KERNING)
    }

    /// LCD filter weights, if filtering is enabled
    #[inline]
    pub fn lcd_filter(&self) -> Option<[u8; 5]> {
        self.flags
            .contains(ConfigFlags::LCD_FILTERING)
            .then_some(self.lcd_weights)
    }
}
