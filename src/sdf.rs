// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License in the LICENSE-APACHE file or at:
//     https://www.apache.org/licenses/LICENSE-2.0

//! Signed distance fields
//!
//! Distances are computed with an anti-aliased Euclidean distance transform:
//! partially covered pixels are treated as lying on the edge, with a
//! sub-pixel estimate of the edge position derived from their coverage and
//! the local gradient. Distances are then propagated with repeated raster
//! sweeps, each pixel tracking the offset to its closest edge pixel.
//!
//! Images are row-major `f64` coverage in `[0, 1]`.

use crate::conv::to_usize;

/// Distance assigned to pixels which have not been reached yet
const FAR: f64 = 1e6;

/// Minimum improvement for a distance update
///
/// Smaller changes are floating-point noise and could oscillate forever.
const EPSILON: f64 = 1e-3;

/// Compute the coverage gradient at edge pixels
///
/// Only pixels with coverage strictly between 0 and 1, not on the image
/// border, get a gradient (normalized to unit length where non-zero); all
/// other entries are zero. Returns `(gx, gy)`.
pub fn gradient(img: &[f64], width: u32, height: u32) -> (Vec<f64>, Vec<f64>) {
    let (w, h) = (to_usize(width), to_usize(height));
    debug_assert_eq!(img.len(), w * h);
    let mut gx = vec![0.0; w * h];
    let mut gy = vec![0.0; w * h];

    for y in 1..h.saturating_sub(1) {
        for x in 1..w.saturating_sub(1) {
            let k = y * w + x;
            if !(img[k] > 0.0 && img[k] < 1.0) {
                continue;
            }

            let gxk = -img[k - w - 1] - std::f64::consts::SQRT_2 * img[k - 1] - img[k + w - 1]
                + img[k - w + 1]
                + std::f64::consts::SQRT_2 * img[k + 1]
                + img[k + w + 1];
            let gyk = -img[k - w - 1] - std::f64::consts::SQRT_2 * img[k - w] - img[k - w + 1]
                + img[k + w - 1]
                + std::f64::consts::SQRT_2 * img[k + w]
                + img[k + w + 1];

            let len = (gxk * gxk + gyk * gyk).sqrt();
            if len > 0.0 {
                gx[k] = gxk / len;
                gy[k] = gyk / len;
            } else {
                gx[k] = gxk;
                gy[k] = gyk;
            }
        }
    }

    (gx, gy)
}

/// Estimate the distance from a pixel centre to the edge
///
/// `(gx, gy)` is the edge direction and `a` the pixel coverage. The result is
/// positive for pixels less than half covered.
pub fn edge_distance(gx: f64, gy: f64, a: f64) -> f64 {
    if gx == 0.0 || gy == 0.0 {
        // Exact for axis-aligned edges, a fair guess otherwise
        return 0.5 - a;
    }

    let len = (gx * gx + gy * gy).sqrt();
    let (gx, gy) = (gx / len, gy / len);

    // Symmetric in sign and transposition: reflect to the first octant
    let (mut gx, mut gy) = (gx.abs(), gy.abs());
    if gx < gy {
        std::mem::swap(&mut gx, &mut gy);
    }

    let a1 = 0.5 * gy / gx;
    if a < a1 {
        0.5 * (gx + gy) - (2.0 * gx * gy * a).sqrt()
    } else if a < 1.0 - a1 {
        (0.5 - a) * gx
    } else {
        -0.5 * (gx + gy) + (2.0 * gx * gy * (1.0 - a)).sqrt()
    }
}

struct Field<'a> {
    img: &'a [f64],
    gx: &'a [f64],
    gy: &'a [f64],
    w: usize,
    h: usize,
    dist: Vec<f64>,
    /// Offset from each pixel to its closest known edge pixel
    offset: Vec<(i32, i32)>,
}

impl<'a> Field<'a> {
    /// Distance from pixel `(x, y)` via the closest edge pixel of `c`
    fn distance(&self, c: usize, (dx, dy): (i32, i32)) -> f64 {
        let (cx, cy) = (c % self.w, c / self.w);
        let (ox, oy) = self.offset[c];
        let ex = cx as i64 - i64::from(ox);
        let ey = cy as i64 - i64::from(oy);
        let (Ok(ex), Ok(ey)) = (usize::try_from(ex), usize::try_from(ey)) else {
            return FAR;
        };
        if ex >= self.w || ey >= self.h {
            return FAR;
        }
        let closest = ey * self.w + ex;

        let a = self.img[closest].clamp(0.0, 1.0);
        if a == 0.0 {
            return FAR;
        }

        let (fx, fy) = (f64::from(dx), f64::from(dy));
        let di = (fx * fx + fy * fy).sqrt();
        let df = if di == 0.0 {
            edge_distance(self.gx[closest], self.gy[closest], a)
        } else {
            // The direction to the edge is accurate for large distances
            edge_distance(fx, fy, a)
        };
        di + df
    }

    /// Relax pixel `(x, y)` against the given neighbours
    ///
    /// Neighbours outside the image are skipped. Returns true on change.
    fn relax(&mut self, x: usize, y: usize, neighbours: &[(isize, isize)]) -> bool {
        let i = y * self.w + x;
        if self.dist[i] <= 0.0 {
            return false;
        }

        let mut changed = false;
        for &(nx, ny) in neighbours {
            let (Some(cx), Some(cy)) = (x.checked_add_signed(nx), y.checked_add_signed(ny)) else {
                continue;
            };
            if cx >= self.w || cy >= self.h {
                continue;
            }
            let c = cy * self.w + cx;

            let (ox, oy) = self.offset[c];
            // nx, ny are in -1..=1
            let offset = (ox - nx as i32, oy - ny as i32);
            let dist = self.distance(c, offset);
            if dist < self.dist[i] - EPSILON {
                self.offset[i] = offset;
                self.dist[i] = dist;
                changed = true;
            }
        }
        changed
    }
}

const LEFT: (isize, isize) = (-1, 0);
const RIGHT: (isize, isize) = (1, 0);
const FROM_ABOVE: [(isize, isize); 4] = [LEFT, (-1, -1), (0, -1), (1, -1)];
const FROM_BELOW: [(isize, isize); 4] = [RIGHT, (1, 1), (0, 1), (-1, 1)];

/// Propagate distances to the edge over the whole image
///
/// Pixels without coverage start "far", partially covered pixels start at
/// their [`edge_distance`] and fully covered pixels at zero. Each full
/// iteration sweeps rows downward (left to right, then right to left) and
/// upward (right to left, then left to right); iterations repeat until no
/// distance improves.
///
/// The result is the distance from each pixel to the covered area (zero
/// inside it).
pub fn propagate(img: &[f64], gx: &[f64], gy: &[f64], width: u32, height: u32) -> Vec<f64> {
    let (w, h) = (to_usize(width), to_usize(height));
    debug_assert!(img.len() == w * h && gx.len() == w * h && gy.len() == w * h);

    let dist = img
        .iter()
        .zip(gx.iter().zip(gy))
        .map(|(&a, (&gx, &gy))| {
            if a <= 0.0 {
                FAR
            } else if a < 1.0 {
                edge_distance(gx, gy, a)
            } else {
                0.0
            }
        })
        .collect();

    let mut field = Field {
        img,
        gx,
        gy,
        w,
        h,
        dist,
        offset: vec![(0, 0); w * h],
    };
    if w == 0 || h == 0 {
        return field.dist;
    }

    let mut sweeps = 0usize;
    loop {
        let mut changed = false;

        for y in 1..h {
            for x in 0..w {
                changed |= field.relax(x, y, &FROM_ABOVE);
            }
            for x in (0..w - 1).rev() {
                changed |= field.relax(x, y, &[RIGHT]);
            }
        }

        for y in (0..h - 1).rev() {
            for x in (0..w).rev() {
                changed |= field.relax(x, y, &FROM_BELOW);
            }
            for x in 1..w {
                changed |= field.relax(x, y, &[LEFT]);
            }
        }

        sweeps += 1;
        if !changed {
            break;
        }
    }
    log::trace!("sdf::propagate: {w}x{h} converged after {sweeps} sweeps");

    field.dist
}

/// Build a signed distance field
///
/// Input is coverage in `[0, 1]`. The distance outside the shape minus the
/// distance inside it is clamped to the largest interior depth and mapped to
/// `[0, 1]`, with `0.5` on the edge and larger values inside.
pub fn build(mask: &[f64], width: u32, height: u32) -> Vec<f64> {
    let (gx, gy) = gradient(mask, width, height);
    let mut outside = propagate(mask, &gx, &gy, width, height);

    let inverse: Vec<f64> = mask.iter().map(|a| 1.0 - a).collect();
    let (gx, gy) = gradient(&inverse, width, height);
    let inside = propagate(&inverse, &gx, &gy, width, height);

    let mut min = f64::MAX;
    for (out, inside) in outside.iter_mut().zip(&inside) {
        *out = out.max(0.0) - inside.max(0.0);
        min = min.min(*out);
    }

    let extremum = min.abs();
    if !(extremum > 0.0) {
        return vec![0.5; outside.len()];
    }

    outside
        .iter()
        .map(|d| (extremum - d.clamp(-extremum, extremum)) / (2.0 * extremum))
        .collect()
}

/// Build an 8-bit signed distance field from 8-bit coverage
///
/// Coverage is first stretched to span `[0, 1]` (unless flat).
pub fn build_u8(img: &[u8], width: u32, height: u32) -> Vec<u8> {
    let min = img.iter().copied().min().unwrap_or(0);
    let max = img.iter().copied().max().unwrap_or(0);

    let mask: Vec<f64> = if max > min {
        let range = f64::from(max - min);
        img.iter().map(|v| f64::from(v - min) / range).collect()
    } else {
        img.iter().map(|v| f64::from(*v) / 255.0).collect()
    };

    build(&mask, width, height)
        .into_iter()
        .map(|v| (255.0 * v) as u8)
        .collect()
}
