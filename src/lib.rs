// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License in the LICENSE-APACHE file or at:
//     https://www.apache.org/licenses/LICENSE-2.0

//! KAS glyph atlas library
//!
//! This library packs rastered glyphs into a texture atlas for rendering:
//!
//! -   [`atlas`]: a skyline rectangle packer over an owned pixel buffer
//! -   [`cache`]: a sparse index of glyph records, one per
//!     `(codepoint, render mode, outline thickness)` variant, with per-glyph
//!     kerning tables
//! -   [`sdf`]: signed distance fields via an anti-aliased Euclidean distance
//!     transform
//! -   [`TextureFont`]: ties the above to a [`raster::Rasterizer`], loading
//!     glyphs on demand
//!
//! The library does not talk to a graphics API: a renderer uploads
//! [`atlas::Atlas::data`] whenever the atlas is dirty.
//!
//! ```
//! # use kas_atlas::{atlas::Atlas, Config, RenderMode, TextureFont};
//! # use kas_atlas::raster::{Bitmap, LineMetrics, RasterRequest, RasterizeError, Rasterizer};
//! struct Blocks;
//! impl Rasterizer for Blocks {
//!     fn has_glyph(&self, c: char) -> bool {
//!         c.is_ascii_graphic()
//!     }
//!     fn rasterize(&mut self, req: &RasterRequest) -> Result<Bitmap, RasterizeError> {
//!         Ok(Bitmap {
//!             width: 6,
//!             height: 8,
//!             pitch: 6,
//!             data: vec![255; 48],
//!             top: 8,
//!             advance_x: req.size * 0.6,
//!             ..Bitmap::default()
//!         })
//!     }
//!     fn kerning(&self, _: char, _: char, _: f32) -> f32 {
//!         0.0
//!     }
//!     fn line_metrics(&self, size: f32) -> LineMetrics {
//!         LineMetrics {
//!             ascender: size * 0.8,
//!             descender: size * -0.2,
//!             ..LineMetrics::default()
//!         }
//!     }
//! }
//!
//! let atlas = Atlas::new(128, 128, 1).unwrap();
//! let mut font = TextureFont::new(Blocks, atlas, 10.0, Config::default()).unwrap();
//! let glyph = font.get_or_load('a', RenderMode::Normal, 0.0).unwrap();
//! assert_eq!((glyph.width, glyph.height), (7, 9));
//! assert!(font.atlas().is_dirty());
//! ```

#![cfg_attr(doc_cfg, feature(doc_cfg))]

pub mod atlas;
pub mod cache;
pub mod conv;
pub mod raster;
pub mod sdf;

mod config;
pub use config::*;

mod error;
pub use error::*;

mod font;
pub use font::{LoadGlyphsError, TextureFont};
