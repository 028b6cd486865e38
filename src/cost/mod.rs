//! # Matching costs
//!
//! Pixel-pair matching cost metrics computed over precomputed local intensity transforms.

// -----------------------------------------------------------------------------------------------
// MODULES
// -----------------------------------------------------------------------------------------------

pub mod census;
pub mod rank;

// -----------------------------------------------------------------------------------------------
// IMPORTS
// -----------------------------------------------------------------------------------------------

use crate::error::*;
use crate::frame::{GrayFloatImage, Pixel};

pub use census::{Census, CensusParams};
pub use rank::{Rank, RankParams};

// -----------------------------------------------------------------------------------------------
// TRAITS
// -----------------------------------------------------------------------------------------------

/// A cost metric between a base image pixel and a matched image pixel.
///
/// `init` must be called once per matching run before any cost is requested. Costs are
/// non-negative and bounded by `max_cost`.
pub trait MatchingCostComputer: Send + Sync {
    /// Stable identifier of the metric.
    fn name(&self) -> &'static str;

    /// Precompute the per-pixel transforms of both images.
    fn init(&mut self, base: &GrayFloatImage, matched: &GrayFloatImage) -> Result<()>;

    /// Dimensions of the images given to `init`.
    fn image_size(&self) -> (usize, usize);

    fn max_cost(&self) -> f64;

    /// Horizontal half-extent of the mask sampled by `get_cost`.
    fn border_width(&self) -> usize;

    /// Vertical half-extent of the mask sampled by `get_cost`.
    fn border_height(&self) -> usize;

    /// Cost of two pixels that are both at least the border extent away from the image edge.
    fn get_cost(&self, base: Pixel, matched: Pixel) -> f64;

    /// Cost of any two in-image pixels, mask samples are clamped onto the image.
    fn get_cost_border(&self, base: Pixel, matched: Pixel) -> f64;

    /// Cost of any two in-image pixels, using the fast path where possible.
    fn cost(&self, base: Pixel, matched: Pixel) -> f64 {
        let (w, h) = self.image_size();
        let (bw, bh) = (self.border_width(), self.border_height());

        if is_interior(base, w, h, bw, bh) && is_interior(matched, w, h, bw, bh) {
            self.get_cost(base, matched)
        }
        else {
            self.get_cost_border(base, matched)
        }
    }
}

// -----------------------------------------------------------------------------------------------
// FUNCTIONS
// -----------------------------------------------------------------------------------------------

/// True if a `(2*bw+1) x (2*bh+1)` mask centred on `p` lies inside the image.
pub fn is_interior(p: Pixel, width: usize, height: usize, bw: usize, bh: usize) -> bool {
    p.x >= bw && p.x + bw < width && p.y >= bh && p.y + bh < height
}

/// Clamp a coordinate offset onto `0..len`.
pub(crate) fn clamp_offset(v: usize, offset: isize, len: usize) -> usize {
    (v as isize + offset).max(0).min(len as isize - 1) as usize
}

/// Offsets of a `(2*hw+1) x (2*hh+1)` mask in row-major order.
pub(crate) fn mask_offsets(hw: usize, hh: usize, include_centre: bool) -> Vec<(isize, isize)> {
    let (hw, hh) = (hw as isize, hh as isize);
    let mut out = Vec::with_capacity(((2 * hw + 1) * (2 * hh + 1)) as usize);

    for dy in -hh..=hh {
        for dx in -hw..=hw {
            if include_centre || dx != 0 || dy != 0 {
                out.push((dx, dy));
            }
        }
    }

    out
}
