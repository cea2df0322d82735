// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License in the LICENSE-APACHE file or at:
//     https://www.apache.org/licenses/LICENSE-2.0

//! Glyph cache
//!
//! Records are indexed by codepoint through a two-level page table: page
//! `c >> 8`, slot `c & 0xFF`. Each slot holds the chain of variants of that
//! codepoint, distinguished by render mode and outline thickness.

mod pages;
mod record;

pub use record::{GlyphRecord, KerningTable, VariantKey};

use crate::config::RenderMode;
use crate::error::MemoryError;
use pages::Pages;
use smallvec::SmallVec;

type Chain = SmallVec<[GlyphRecord; 1]>;

/// Sparse index of glyph records
#[derive(Clone, Debug, Default)]
pub struct GlyphCache {
    glyphs: Pages<Chain>,
    len: usize,
}

impl GlyphCache {
    /// Construct an empty cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records (all variants)
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    /// True if no record is cached
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Ensure the next [`Self::index_glyph`] of `c` does not allocate
    pub fn reserve(&mut self, c: char) -> Result<(), MemoryError> {
        let chain = self.glyphs.slot_mut(c.into())?;
        chain.try_reserve(1)?;
        Ok(())
    }

    /// Add a record
    ///
    /// The record is appended to the chain of its codepoint. A record with a
    /// key already present is chained after the existing one, which remains
    /// the one found by [`Self::find_glyph`].
    pub fn index_glyph(&mut self, record: GlyphRecord) -> Result<&mut GlyphRecord, MemoryError> {
        let chain = self.glyphs.slot_mut(record.codepoint.into())?;
        chain.try_reserve(1)?;
        let index = chain.len();
        chain.push(record);
        self.len += 1;
        Ok(&mut chain[index])
    }

    /// Find the record for `(c, mode, thickness)`
    pub fn find_glyph(&self, c: char, mode: RenderMode, thickness: f32) -> Option<&GlyphRecord> {
        self.glyphs
            .get(c.into())?
            .iter()
            .find(|record| record.is_variant(mode, thickness))
    }

    /// Find the record for `key`
    #[inline]
    pub fn find(&self, key: &VariantKey) -> Option<&GlyphRecord> {
        self.find_glyph(key.codepoint, key.render_mode, key.outline_thickness)
    }

    /// All variants cached for `c`
    pub fn variants(&self, c: char) -> &[GlyphRecord] {
        self.glyphs.get(c.into()).map(|chain| &chain[..]).unwrap_or(&[])
    }

    /// Iterate over all records in codepoint order
    pub fn iter(&self) -> impl Iterator<Item = &GlyphRecord> {
        self.glyphs.iter().flat_map(|(_, chain)| chain.iter())
    }

    /// Iterate mutably over all records in codepoint order
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut GlyphRecord> {
        self.glyphs.iter_mut().flat_map(|(_, chain)| chain.iter_mut())
    }

    /// Iterate over distinct cached codepoints
    pub fn codepoints(&self) -> impl Iterator<Item = char> + '_ {
        self.glyphs
            .iter()
            .filter(|(_, chain)| !chain.is_empty())
            .filter_map(|(c, _)| char::from_u32(c))
    }

    /// Rebuild every record's kerning table from scratch
    ///
    /// For each record `next` and each distinct cached codepoint `prev`,
    /// `kern(prev, next)` is queried; only non-zero values are stored. Cost
    /// is quadratic in the number of cached glyphs.
    pub fn regenerate_kerning<F>(&mut self, mut kern: F) -> Result<(), MemoryError>
    where
        F: FnMut(char, char) -> f32,
    {
        let mut codepoints = Vec::new();
        codepoints.try_reserve_exact(self.len)?;
        codepoints.extend(self.codepoints());
        log::trace!(
            "GlyphCache::regenerate_kerning: {} records, {} codepoints",
            self.len,
            codepoints.len()
        );

        for record in self.iter_mut() {
            record.kerning.clear();
            for &prev in &codepoints {
                let value = kern(prev, record.codepoint);
                if value != 0.0 {
                    record.index_kerning(prev, value)?;
                }
            }
        }
        Ok(())
    }

    /// Remove all records
    pub fn clear(&mut self) {
        self.glyphs.clear();
        self.len = 0;
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn record(c: char, mode: RenderMode, thickness: f32, width: u32) -> GlyphRecord {
        GlyphRecord {
            codepoint: c,
            width,
            render_mode: mode,
            outline_thickness: thickness,
            ..GlyphRecord::default()
        }
    }

    #[test]
    fn variants_chain() {
        let mut cache = GlyphCache::new();
        assert!(cache.is_empty());
        assert!(cache.find_glyph('a', RenderMode::Normal, 0.0).is_none());

        cache.index_glyph(record('a', RenderMode::Normal, 0.0, 1)).unwrap();
        cache.index_glyph(record('a', RenderMode::SignedDistanceField, 0.0, 2)).unwrap();
        cache.index_glyph(record('a', RenderMode::OutlineEdge, 1.0, 3)).unwrap();
        cache.index_glyph(record('a', RenderMode::OutlineEdge, 2.0, 4)).unwrap();
        assert_eq!(cache.len(), 4);
        assert_eq!(cache.variants('a').len(), 4);
        assert!(cache.variants('b').is_empty());

        let find = |mode, thickness| cache.find_glyph('a', mode, thickness).map(|r| r.width);
        assert_eq!(find(RenderMode::Normal, 0.0), Some(1));
        assert_eq!(find(RenderMode::SignedDistanceField, 0.0), Some(2));
        assert_eq!(find(RenderMode::OutlineEdge, 1.0), Some(3));
        assert_eq!(find(RenderMode::OutlineEdge, 2.0), Some(4));
        assert_eq!(find(RenderMode::OutlineEdge, 1.5), None);
        assert_eq!(find(RenderMode::OutlinePositive, 1.0), None);
        assert_eq!(cache.find_glyph('b', RenderMode::Normal, 0.0).map(|r| r.width), None);
    }

    #[test]
    fn reindex_chains() {
        let mut cache = GlyphCache::new();
        cache.index_glyph(record('a', RenderMode::Normal, 0.0, 1)).unwrap();
        cache.index_glyph(record('a', RenderMode::Normal, 0.0, 2)).unwrap();
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.variants('a').len(), 2);

        let key = VariantKey::new('a', RenderMode::Normal, 0.0);
        assert_eq!(cache.find(&key).map(|r| r.width), Some(1));
    }

    #[test]
    fn sparse_codepoints() {
        let mut cache = GlyphCache::new();
        for c in ['z', 'a', '\u{4E2D}', '\u{1F600}', 'a'] {
            cache.index_glyph(record(c, RenderMode::Normal, 0.0, 1)).unwrap();
        }
        let cps: Vec<char> = cache.codepoints().collect();
        assert_eq!(cps, vec!['a', 'z', '\u{4E2D}', '\u{1F600}']);
        assert_eq!(cache.iter().count(), 5);
        assert!(cache.find_glyph('\u{1F600}', RenderMode::Normal, 0.0).is_some());
        assert!(cache.find_glyph('\u{1F601}', RenderMode::Normal, 0.0).is_none());

        cache.clear();
        assert!(cache.is_empty());
        assert_eq!(cache.codepoints().count(), 0);
    }

    #[test]
    fn reserve_then_index() {
        let mut cache = GlyphCache::new();
        cache.reserve('q').unwrap();
        assert!(cache.is_empty());
        assert!(cache.find_glyph('q', RenderMode::Normal, 0.0).is_none());
        assert_eq!(cache.codepoints().count(), 0);

        cache.index_glyph(record('q', RenderMode::Normal, 0.0, 1)).unwrap();
        assert_eq!(cache.codepoints().collect::<Vec<_>>(), vec!['q']);
    }

    #[test]
    fn regenerate_kerning() {
        let mut cache = GlyphCache::new();
        cache.index_glyph(record('A', RenderMode::Normal, 0.0, 1)).unwrap();
        cache.index_glyph(record('V', RenderMode::Normal, 0.0, 1)).unwrap();
        cache.index_glyph(record('V', RenderMode::SignedDistanceField, 0.0, 1)).unwrap();

        let mut calls = 0;
        cache
            .regenerate_kerning(|prev, next| {
                calls += 1;
                match (prev, next) {
                    ('A', 'V') => -2.0,
                    ('V', 'A') => -1.0,
                    _ => 0.0,
                }
            })
            .unwrap();
        // 3 records × 2 codepoints
        assert_eq!(calls, 6);

        let a = cache.find_glyph('A', RenderMode::Normal, 0.0).unwrap();
        assert_eq!(a.kerning('V'), -1.0);
        assert_eq!(a.kerning('A'), 0.0);
        for v in cache.variants('V') {
            assert_eq!(v.kerning('A'), -2.0);
            assert_eq!(v.kerning.iter().count(), 1);
        }

        // Tables are rebuilt, not accumulated
        cache.regenerate_kerning(|_, _| 0.0).unwrap();
        assert!(cache.iter().all(|r| r.kerning.is_empty()));
    }
}
