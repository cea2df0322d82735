// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License in the LICENSE-APACHE file or at:
//     https://www.apache.org/licenses/LICENSE-2.0

//! Type and pixel-format conversion utilities
//!
//! Sizes and coordinates are represented as `u32` by this library; buffer
//! indexing uses `usize`. We do not expect `usize` smaller than `u32`.

use crate::raster::{Bitmap, PixelFormat, RasterizeError};
use easy_cast::Cast;

/// Convert `usize` → `u32`
///
/// This is a "safer" wrapper around `as` ensuring (on debug builds) that the
/// input value may be represented correctly by `u32`.
#[inline]
pub fn to_u32(x: usize) -> u32 {
    x.cast()
}

/// Convert `u32` → `usize`
///
/// This is a "safer" wrapper around `as` ensuring that the operation is
/// zero-extension.
#[inline]
pub fn to_usize(x: u32) -> usize {
    x.cast()
}

/// Reorder a BGRA pixel to RGBA
#[inline]
pub fn bgra_to_rgba(px: [u8; 4]) -> [u8; 4] {
    let [b, g, r, a] = px;
    [r, g, b, a]
}

/// Convert a BGRA pixel to premultiplied luminance
#[inline]
pub fn bgra_to_gray(px: [u8; 4]) -> u8 {
    let [b, g, r, a] = px;
    let lum = 0.3 * f32::from(r) + 0.59 * f32::from(g) + 0.11 * f32::from(b);
    // Saturating conversion
    (lum * f32::from(a) / 255.0) as u8
}

/// Copy `bitmap` into `dst`, converting to the atlas pixel format
///
/// `dst` has `depth` bytes per pixel and `stride` bytes per row; the bitmap
/// is placed at its origin. Supported conversions:
///
/// -   gray to depth 1 (copy), 3 (replicated) or 4 (white with alpha)
/// -   LCD to depth 3 (copy)
/// -   BGRA to depth 1 (luminance × alpha) or 4 (reordered to RGBA)
pub fn blit(bitmap: &Bitmap, dst: &mut [u8], stride: usize, depth: u8) -> Result<(), RasterizeError> {
    let width = to_usize(bitmap.width);
    let pitch = bitmap.pitch;
    let bpp = bitmap.format.bytes_per_pixel();
    let rows = (0..to_usize(bitmap.height)).map(|row| {
        let start = row * pitch;
        &bitmap.data[start..start + width * bpp]
    });

    match (bitmap.format, depth) {
        (PixelFormat::Gray, 1) | (PixelFormat::Lcd, 3) => {
            for (row, src) in rows.enumerate() {
                let dst = &mut dst[row * stride..];
                dst[..src.len()].copy_from_slice(src);
            }
        }
        (PixelFormat::Gray, 3) => {
            for (row, src) in rows.enumerate() {
                let dst = &mut dst[row * stride..];
                for (px, v) in dst.chunks_exact_mut(3).zip(src) {
                    px.copy_from_slice(&[*v; 3]);
                }
            }
        }
        (PixelFormat::Gray, 4) => {
            for (row, src) in rows.enumerate() {
                let dst = &mut dst[row * stride..];
                for (px, v) in dst.chunks_exact_mut(4).zip(src) {
                    px.copy_from_slice(&[255, 255, 255, *v]);
                }
            }
        }
        (PixelFormat::Bgra, 1) => {
            for (row, src) in rows.enumerate() {
                let dst = &mut dst[row * stride..];
                for (v, px) in dst.iter_mut().zip(src.chunks_exact(4)) {
                    *v = bgra_to_gray([px[0], px[1], px[2], px[3]]);
                }
            }
        }
        (PixelFormat::Bgra, 4) => {
            for (row, src) in rows.enumerate() {
                let dst = &mut dst[row * stride..];
                for (out, px) in dst.chunks_exact_mut(4).zip(src.chunks_exact(4)) {
                    out.copy_from_slice(&bgra_to_rgba([px[0], px[1], px[2], px[3]]));
                }
            }
        }
        (format, depth) => return Err(RasterizeError::UnsupportedFormat { format, depth }),
    }

    Ok(())
}
