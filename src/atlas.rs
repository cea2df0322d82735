// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License in the LICENSE-APACHE file or at:
//     https://www.apache.org/licenses/LICENSE-2.0

//! Texture atlas
//!
//! An [`Atlas`] is a fixed-size pixel buffer in which rectangular regions are
//! allocated using a skyline packer. The skyline is a list of [`AtlasNode`]s,
//! each describing a horizontal run of the top edge of occupied space.
//!
//! A one-pixel border around the atlas is never allocated; this avoids
//! sampling artifacts at the texture edge.
//!
//! # Example
//!
//! ```
//! use kas_atlas::atlas::{Atlas, AtlasError};
//!
//! let mut atlas = Atlas::new(64, 64, 1).unwrap();
//! let region = atlas.get_region(10, 10).unwrap();
//! assert_eq!((region.x, region.y), (1, 1));
//!
//! let data = [255u8; 100];
//! atlas.set_region(region.x, region.y, 10, 10, &data, 10).unwrap();
//! assert!(atlas.is_dirty());
//!
//! assert!(matches!(atlas.get_region(63, 10), Err(AtlasError::Full { .. })));
//! ```

use crate::conv::to_usize;
use crate::error::MemoryError;
use thiserror::Error;

/// Atlas errors
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
pub enum AtlasError {
    /// No placement fits the requested size
    #[error("no space for a {width}x{height} region")]
    Full { width: u32, height: u32 },
    /// A region with zero width or height was requested
    #[error("requested region is empty")]
    EmptyRegion,
    /// A write would exceed the atlas interior or the source data
    #[error("region ({x}, {y}) {width}x{height} is out of bounds")]
    OutOfBounds {
        x: u32,
        y: u32,
        width: u32,
        height: u32,
    },
    /// Invalid construction or enlargement parameters
    #[error("invalid atlas size {width}x{height}x{depth}")]
    InvalidSize { width: u32, height: u32, depth: u8 },
    /// Deserialized state does not describe a valid atlas
    #[error("inconsistent atlas state")]
    Inconsistent,
    #[error(transparent)]
    Memory(#[from] MemoryError),
}

/// A run of the skyline
///
/// The run covers `x..x + width`; everything below `y` is (potentially)
/// occupied.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AtlasNode {
    pub x: u32,
    pub y: u32,
    pub width: u32,
}

impl AtlasNode {
    #[inline]
    fn end(&self) -> u32 {
        self.x + self.width
    }
}

/// An allocated region of the atlas, in pixels
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Region {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// A texture atlas
///
/// The atlas owns its pixel buffer. A renderer should read [`Atlas::data`]
/// when [`Atlas::is_dirty`] and call [`Atlas::mark_clean`] after upload.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(try_from = "AtlasState"))]
pub struct Atlas {
    width: u32,
    height: u32,
    depth: u8,
    data: Vec<u8>,
    nodes: Vec<AtlasNode>,
    used: u64,
    dirty: bool,
}

impl Atlas {
    /// Construct an empty atlas
    ///
    /// `depth` is the number of bytes per pixel: 1 (gray), 3 (LCD) or 4
    /// (RGBA). Width and height must be at least 3 since the border is
    /// reserved.
    pub fn new(width: u32, height: u32, depth: u8) -> Result<Self, AtlasError> {
        let invalid = AtlasError::InvalidSize {
            width,
            height,
            depth,
        };
        if width < 3 || height < 3 || !matches!(depth, 1 | 3 | 4) {
            return Err(invalid);
        }

        let data = alloc_zeroed(buffer_len(width, height, depth).ok_or(invalid)?)?;
        let mut nodes = Vec::new();
        nodes.try_reserve(8).map_err(MemoryError::from)?;
        nodes.push(AtlasNode {
            x: 1,
            y: 1,
            width: width - 2,
        });

        Ok(Atlas {
            width,
            height,
            depth,
            data,
            nodes,
            used: 0,
            dirty: true,
        })
    }

    /// Width in pixels
    #[inline]
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Height in pixels
    #[inline]
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Bytes per pixel
    #[inline]
    pub fn depth(&self) -> u8 {
        self.depth
    }

    /// The pixel buffer
    ///
    /// Row-major, `width * depth` bytes per row, without padding.
    #[inline]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// The skyline, ordered by `x`
    #[inline]
    pub fn nodes(&self) -> &[AtlasNode] {
        &self.nodes
    }

    /// Number of pixels handed out by [`Self::get_region`]
    #[inline]
    pub fn used_pixels(&self) -> u64 {
        self.used
    }

    /// True if the buffer changed since the last [`Self::mark_clean`]
    #[inline]
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Reset the dirty flag (after uploading the buffer)
    #[inline]
    pub fn mark_clean(&mut self) {
        self.dirty = false;
    }

    /// Find the placement height for a region starting at node `index`
    fn fit(&self, index: usize, width: u32, height: u32) -> Option<u32> {
        let node = self.nodes[index];
        if !fits(node.x, width, self.width) {
            return None;
        }

        let mut y = node.y;
        let mut width_left = i64::from(width);
        let mut i = index;
        while width_left > 0 {
            // Nodes span the interior, so this only fails on a corrupt list
            let node = self.nodes.get(i)?;
            y = y.max(node.y);
            if !fits(y, height, self.height) {
                return None;
            }
            width_left -= i64::from(node.width);
            i += 1;
        }

        Some(y)
    }

    /// Merge adjacent nodes of equal height
    fn merge(&mut self) {
        let mut i = 0;
        while i + 1 < self.nodes.len() {
            if self.nodes[i].y == self.nodes[i + 1].y {
                self.nodes[i].width += self.nodes[i + 1].width;
                self.nodes.remove(i + 1);
            } else {
                i += 1;
            }
        }
    }

    /// Allocate a region
    ///
    /// The placement with the lowest resulting top edge is chosen; ties go to
    /// the narrowest starting node. On failure the atlas is unchanged.
    pub fn get_region(&mut self, width: u32, height: u32) -> Result<Region, AtlasError> {
        if width == 0 || height == 0 {
            return Err(AtlasError::EmptyRegion);
        }

        let mut best: Option<(usize, u32)> = None;
        let mut best_top = u32::MAX;
        let mut best_width = u32::MAX;
        for index in 0..self.nodes.len() {
            let Some(y) = self.fit(index, width, height) else {
                continue;
            };
            let node = &self.nodes[index];
            let top = y + height;
            if top < best_top || (top == best_top && node.width > 0 && node.width < best_width) {
                best = Some((index, y));
                best_top = top;
                best_width = node.width;
            }
        }

        let Some((index, y)) = best else {
            log::trace!("Atlas::get_region: no space for {width}x{height}");
            return Err(AtlasError::Full { width, height });
        };

        self.nodes.try_reserve(1).map_err(MemoryError::from)?;
        let x = self.nodes[index].x;
        self.nodes.insert(
            index,
            AtlasNode {
                x,
                y: y + height,
                width,
            },
        );

        // Clip following nodes now (partially) covered by the new node
        let i = index + 1;
        while i < self.nodes.len() {
            let prev_end = self.nodes[i - 1].end();
            let node = &mut self.nodes[i];
            if node.x >= prev_end {
                break;
            }
            let shrink = prev_end - node.x;
            if node.width <= shrink {
                self.nodes.remove(i);
            } else {
                node.x += shrink;
                node.width -= shrink;
                break;
            }
        }
        self.merge();

        self.used += u64::from(width) * u64::from(height);
        self.dirty = true;
        Ok(Region {
            x,
            y,
            width,
            height,
        })
    }

    /// Copy pixel data into the atlas
    ///
    /// `data` holds `height` rows of `width * depth` bytes, each starting
    /// `stride` bytes after the previous one. A `stride` of zero repeats the
    /// first row.
    pub fn set_region(
        &mut self,
        x: u32,
        y: u32,
        width: u32,
        height: u32,
        data: &[u8],
        stride: usize,
    ) -> Result<(), AtlasError> {
        let out_of_bounds = AtlasError::OutOfBounds {
            x,
            y,
            width,
            height,
        };
        if x == 0 || y == 0 || !fits(x, width, self.width) || !fits(y, height, self.height) {
            return Err(out_of_bounds);
        }

        let depth = usize::from(self.depth);
        let row_len = to_usize(width) * depth;
        if height > 0 {
            let len = stride
                .checked_mul(to_usize(height) - 1)
                .and_then(|len| len.checked_add(row_len));
            if !matches!(len, Some(len) if len <= data.len()) {
                return Err(out_of_bounds);
            }
        }

        let atlas_stride = to_usize(self.width) * depth;
        for row in 0..to_usize(height) {
            let dst = (to_usize(y) + row) * atlas_stride + to_usize(x) * depth;
            let src = row * stride;
            self.data[dst..dst + row_len].copy_from_slice(&data[src..src + row_len]);
        }

        self.dirty = true;
        Ok(())
    }

    /// Remove all allocations and zero the buffer
    pub fn clear(&mut self) {
        log::debug!("Atlas::clear ({}x{})", self.width, self.height);
        self.nodes.clear();
        self.nodes.push(AtlasNode {
            x: 1,
            y: 1,
            width: self.width - 2,
        });
        self.used = 0;
        self.data.fill(0);
        self.dirty = true;
    }

    /// Grow the atlas
    ///
    /// Existing content keeps its pixel position; the grown area becomes free
    /// space. Regions previously returned stay valid (in pixels; normalized
    /// texture coordinates must be rescaled by the caller).
    pub fn enlarge(&mut self, width: u32, height: u32) -> Result<(), AtlasError> {
        let invalid = AtlasError::InvalidSize {
            width,
            height,
            depth: self.depth,
        };
        if width < self.width || height < self.height || (width, height) == (self.width, self.height)
        {
            return Err(invalid);
        }

        let mut data = alloc_zeroed(buffer_len(width, height, self.depth).ok_or(invalid)?)?;
        if width > self.width {
            self.nodes.try_reserve(1).map_err(MemoryError::from)?;
        }

        let depth = usize::from(self.depth);
        let old_stride = to_usize(self.width) * depth;
        let new_stride = to_usize(width) * depth;
        for row in 0..to_usize(self.height) {
            let src = row * old_stride;
            let dst = row * new_stride;
            data[dst..dst + old_stride].copy_from_slice(&self.data[src..src + old_stride]);
        }

        if width > self.width {
            self.nodes.push(AtlasNode {
                x: self.width - 1,
                y: 1,
                width: width - self.width,
            });
            self.merge();
        }

        log::debug!(
            "Atlas::enlarge: {}x{} -> {width}x{height}",
            self.width,
            self.height
        );
        self.width = width;
        self.height = height;
        self.data = data;
        self.dirty = true;
        Ok(())
    }
}

/// Serialized form of [`Atlas`], checked before use
#[cfg(feature = "serde")]
#[derive(serde::Deserialize)]
struct AtlasState {
    width: u32,
    height: u32,
    depth: u8,
    data: Vec<u8>,
    nodes: Vec<AtlasNode>,
    used: u64,
    dirty: bool,
}

#[cfg(feature = "serde")]
impl TryFrom<AtlasState> for Atlas {
    type Error = AtlasError;

    fn try_from(state: AtlasState) -> Result<Self, AtlasError> {
        let AtlasState {
            width,
            height,
            depth,
            data,
            nodes,
            used,
            dirty,
        } = state;
        if width < 3 || height < 3 || !matches!(depth, 1 | 3 | 4) {
            return Err(AtlasError::InvalidSize {
                width,
                height,
                depth,
            });
        }
        if buffer_len(width, height, depth) != Some(data.len()) {
            return Err(AtlasError::Inconsistent);
        }

        // Nodes must tile the interior from x = 1 to width - 1
        let mut x = 1;
        for node in &nodes {
            if node.x != x || node.width == 0 || node.y == 0 || node.y > height - 1 {
                return Err(AtlasError::Inconsistent);
            }
            x = x.checked_add(node.width).ok_or(AtlasError::Inconsistent)?;
        }
        if nodes.is_empty() || x != width - 1 {
            return Err(AtlasError::Inconsistent);
        }
        if used > u64::from(width) * u64::from(height) {
            return Err(AtlasError::Inconsistent);
        }

        Ok(Atlas {
            width,
            height,
            depth,
            data,
            nodes,
            used,
            dirty,
        })
    }
}

/// True if `pos..pos + len` lies left of the border at `size - 1`
#[inline]
fn fits(pos: u32, len: u32, size: u32) -> bool {
    u64::from(pos) + u64::from(len) < u64::from(size)
}

fn buffer_len(width: u32, height: u32, depth: u8) -> Option<usize> {
    to_usize(width)
        .checked_mul(to_usize(height))?
        .checked_mul(usize::from(depth))
}

fn alloc_zeroed(len: usize) -> Result<Vec<u8>, MemoryError> {
    let mut data = Vec::new();
    data.try_reserve_exact(len)?;
    data.resize(len, 0);
    Ok(data)
}

#[cfg(test)]
mod test {
    use super::*;

    fn overlaps(a: &Region, b: &Region) -> bool {
        a.x < b.x + b.width && b.x < a.x + a.width && a.y < b.y + b.height && b.y < a.y + a.height
    }

    fn check_nodes(atlas: &Atlas) {
        let nodes = atlas.nodes();
        assert_eq!(nodes[0].x, 1);
        for pair in nodes.windows(2) {
            assert_eq!(pair[0].end(), pair[1].x);
            assert_ne!(pair[0].y, pair[1].y);
        }
        assert_eq!(nodes.last().unwrap().end(), atlas.width() - 1);
    }

    #[test]
    fn skyline_scenario() {
        let mut atlas = Atlas::new(64, 64, 1).unwrap();
        assert_eq!(
            atlas.nodes(),
            &[AtlasNode {
                x: 1,
                y: 1,
                width: 62
            }]
        );

        let r = atlas.get_region(10, 10).unwrap();
        assert_eq!((r.x, r.y), (1, 1));

        let nodes = atlas.nodes().to_vec();
        assert_eq!(
            atlas.get_region(63, 10),
            Err(AtlasError::Full {
                width: 63,
                height: 10
            })
        );
        assert_eq!(atlas.nodes(), &nodes[..]);

        let r = atlas.get_region(50, 10).unwrap();
        assert_eq!((r.x, r.y), (11, 1));

        // The skyline over x in [1, 61) is now at y = 11
        let r = atlas.get_region(10, 10).unwrap();
        assert_eq!((r.x, r.y), (1, 11));
        assert_eq!(atlas.used_pixels(), 100 + 500 + 100);
        check_nodes(&atlas);
    }

    #[test]
    fn wide_region_spans_nodes() {
        let mut atlas = Atlas::new(64, 64, 1).unwrap();
        atlas.get_region(10, 10).unwrap();
        // Spans both skyline nodes, so sits on the taller one
        let r = atlas.get_region(60, 10).unwrap();
        assert_eq!((r.x, r.y), (1, 11));
        check_nodes(&atlas);
    }

    #[test]
    fn empty_region() {
        let mut atlas = Atlas::new(16, 16, 1).unwrap();
        assert_eq!(atlas.get_region(0, 4), Err(AtlasError::EmptyRegion));
        assert_eq!(atlas.get_region(4, 0), Err(AtlasError::EmptyRegion));
        assert_eq!(atlas.used_pixels(), 0);
    }

    #[test]
    fn invalid_size() {
        assert!(Atlas::new(2, 16, 1).is_err());
        assert!(Atlas::new(16, 16, 2).is_err());
        let atlas = Atlas::new(16, 8, 3).unwrap();
        assert_eq!(atlas.data().len(), 16 * 8 * 3);
    }

    #[test]
    fn no_overlap() {
        let mut atlas = Atlas::new(256, 256, 1).unwrap();
        let mut regions: Vec<Region> = Vec::new();
        let mut state = 0x2545_f491u32;
        let mut next = move || {
            state ^= state << 13;
            state ^= state >> 17;
            state ^= state << 5;
            state
        };

        for _ in 0..300 {
            let w = 1 + next() % 24;
            let h = 1 + next() % 24;
            match atlas.get_region(w, h) {
                Ok(r) => {
                    assert!(r.x >= 1 && r.y >= 1);
                    assert!(r.x + r.width <= 255 && r.y + r.height <= 255);
                    for other in &regions {
                        assert!(!overlaps(&r, other), "{r:?} overlaps {other:?}");
                    }
                    regions.push(r);
                }
                Err(AtlasError::Full { .. }) => (),
                Err(err) => panic!("unexpected error: {err}"),
            }
            check_nodes(&atlas);
        }

        let area: u64 = regions
            .iter()
            .map(|r| u64::from(r.width) * u64::from(r.height))
            .sum();
        assert_eq!(atlas.used_pixels(), area);
        assert!(area <= 254 * 254);
    }

    #[test]
    fn deterministic() {
        let sizes = [(5, 9), (12, 3), (7, 7), (30, 2), (1, 1), (9, 14), (3, 3)];
        let run = || {
            let mut atlas = Atlas::new(48, 48, 1).unwrap();
            sizes
                .iter()
                .map(|&(w, h)| atlas.get_region(w, h).ok())
                .collect::<Vec<_>>()
        };
        assert_eq!(run(), run());
    }

    #[test]
    fn full_is_stable() {
        let mut atlas = Atlas::new(32, 32, 1).unwrap();
        while atlas.get_region(7, 5).is_ok() {}
        let nodes = atlas.nodes().to_vec();
        let used = atlas.used_pixels();
        assert!(atlas.get_region(7, 5).is_err());
        assert!(atlas.get_region(31, 1).is_err());
        assert_eq!(atlas.nodes(), &nodes[..]);
        assert_eq!(atlas.used_pixels(), used);
    }

    #[test]
    fn set_region_stride() {
        let mut atlas = Atlas::new(8, 8, 1).unwrap();
        atlas.mark_clean();
        // 2x2 region taken from a source with 3 bytes per row
        let src = [1, 2, 9, 3, 4, 9];
        atlas.set_region(2, 3, 2, 2, &src, 3).unwrap();
        assert!(atlas.is_dirty());
        assert_eq!(&atlas.data()[3 * 8 + 2..3 * 8 + 4], &[1, 2]);
        assert_eq!(&atlas.data()[4 * 8 + 2..4 * 8 + 4], &[3, 4]);
        assert_eq!(atlas.data()[3 * 8 + 4], 0);

        // Zero stride repeats the row
        atlas.set_region(5, 5, 2, 2, &[7, 8], 0).unwrap();
        assert_eq!(&atlas.data()[6 * 8 + 5..6 * 8 + 7], &[7, 8]);
    }

    #[test]
    fn set_region_bounds() {
        let mut atlas = Atlas::new(8, 8, 4).unwrap();
        let src = [0u8; 64];
        assert!(atlas.set_region(0, 1, 1, 1, &src, 4).is_err());
        assert!(atlas.set_region(5, 1, 3, 1, &src, 12).is_err());
        assert!(atlas.set_region(1, 1, 2, 2, &src[..10], 8).is_err());
        assert!(atlas.set_region(1, 1, 6, 6, &src[..], 0).is_ok());

        // Sizes whose sum or product overflows
        assert!(atlas.set_region(1, 1, u32::MAX, 1, &src, 4).is_err());
        assert!(atlas.set_region(1, 1, 1, u32::MAX, &src, 4).is_err());
        assert!(atlas.set_region(u32::MAX, u32::MAX, 1, 1, &src, 4).is_err());
        assert!(atlas.set_region(1, 1, 1, 2, &src, usize::MAX).is_err());
    }

    #[test]
    fn huge_region() {
        let mut atlas = Atlas::new(64, 64, 1).unwrap();
        atlas.get_region(10, 10).unwrap();
        let nodes = atlas.nodes().to_vec();

        for (w, h) in [(10, u32::MAX), (u32::MAX, 1), (u32::MAX, u32::MAX)] {
            assert_eq!(
                atlas.get_region(w, h),
                Err(AtlasError::Full {
                    width: w,
                    height: h
                })
            );
            assert_eq!(atlas.nodes(), &nodes[..]);
        }
        assert_eq!(atlas.used_pixels(), 100);
        check_nodes(&atlas);

        assert!(matches!(
            atlas.enlarge(u32::MAX, u32::MAX),
            Err(AtlasError::InvalidSize { .. }) | Err(AtlasError::Memory(_))
        ));
        assert_eq!(atlas.width(), 64);
    }

    #[test]
    fn clear() {
        let mut atlas = Atlas::new(16, 16, 1).unwrap();
        let r = atlas.get_region(4, 4).unwrap();
        atlas.set_region(r.x, r.y, 4, 4, &[255; 16], 4).unwrap();
        atlas.clear();
        assert_eq!(atlas.used_pixels(), 0);
        assert_eq!(atlas.nodes().len(), 1);
        assert!(atlas.data().iter().all(|b| *b == 0));
        let r = atlas.get_region(4, 4).unwrap();
        assert_eq!((r.x, r.y), (1, 1));
    }

    #[test]
    fn enlarge() {
        let mut atlas = Atlas::new(16, 16, 1).unwrap();
        let r = atlas.get_region(14, 4).unwrap();
        atlas.set_region(r.x, r.y, 14, 4, &[200; 56], 14).unwrap();
        assert!(atlas.get_region(20, 4).is_err());

        assert!(atlas.enlarge(8, 32).is_err());
        atlas.enlarge(32, 32).unwrap();
        assert_eq!(atlas.data().len(), 32 * 32);
        assert_eq!(atlas.data()[32 + 1], 200);
        assert_eq!(atlas.data()[4 * 32 + 14], 200);
        assert_eq!(atlas.data()[5 * 32 + 14], 0);
        check_nodes(&atlas);

        let r = atlas.get_region(20, 4).unwrap();
        for x in r.x..r.x + r.width {
            for y in r.y..r.y + r.height {
                assert!(!(1..15).contains(&x) || !(1..5).contains(&y));
            }
        }
    }
}
