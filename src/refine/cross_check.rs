//! # Left-right cross check
//!
//! Keeps only disparities on which the left-based and right-based maps agree, and averages the
//! agreeing pairs so both maps carry the same sub-pixel estimate.

// -----------------------------------------------------------------------------------------------
// IMPORTS
// -----------------------------------------------------------------------------------------------

use log::debug;
use serde::Deserialize;

use super::DisparityRefiner;
use crate::disparity::{Disparity, DisparityFlags, DisparityMap, StereoMaps};
use crate::error::*;
use crate::frame::{Pixel, StereoFrame};

// -----------------------------------------------------------------------------------------------
// DATA STRUCTURES
// -----------------------------------------------------------------------------------------------

#[derive(Deserialize, Debug, Clone, Copy, PartialEq)]
#[serde(default)]
pub struct CrossCheckParams {
    /// Largest allowed distance between a left disparity and the negated right disparity.
    pub max_distance: f64
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CrossCheckRefiner {
    pub params: CrossCheckParams
}

// -----------------------------------------------------------------------------------------------
// IMPLEMENTATIONS
// -----------------------------------------------------------------------------------------------

impl Default for CrossCheckParams {
    fn default() -> Self {
        Self { max_distance: 1.0 }
    }
}

impl CrossCheckRefiner {
    pub fn new(params: CrossCheckParams) -> Self {
        Self { params }
    }

    fn max_distance_sq(&self) -> f64 {
        self.params.max_distance * self.params.max_distance
    }

    /// True if `left` and `right` describe the same correspondence within the threshold.
    fn agree(&self, left: &Disparity, right: &Disparity) -> bool {
        let ex = left.sub_dx + right.sub_dx;
        let ey = left.sub_dy + right.sub_dy;
        right.is_valid() && ex * ex + ey * ey <= self.max_distance_sq()
    }

    /// Check every valid disparity of `from` against `to`, invalidating both ends of a
    /// disagreement. Returns the number of disparities invalidated in `from`.
    fn invalidate_disagreeing(&self, from: &mut DisparityMap, to: &mut DisparityMap) -> usize {
        let (w, h) = (from.width(), from.height());
        let mut count = 0;

        for y in 0..h {
            for x in 0..w {
                let d = *from.get(x, y);
                if !d.is_valid() {
                    continue;
                }

                match d.matched_pixel(Pixel::new(x, y), w, h) {
                    Some(q) if self.agree(&d, to.get(q.x, q.y)) => (),
                    Some(q) => {
                        invalidate(from.get_mut(x, y));
                        invalidate(to.get_mut(q.x, q.y));
                        count += 1;
                    },
                    None => {
                        invalidate(from.get_mut(x, y));
                        count += 1;
                    }
                }
            }
        }

        count
    }
}

impl DisparityRefiner for CrossCheckRefiner {
    fn name(&self) -> &'static str {
        "cross_check"
    }

    fn refine(&self, maps: &mut StereoMaps, _frame: Option<&StereoFrame>) -> Result<()> {
        let (left, right) = match (maps.left.as_mut(), maps.right.as_mut()) {
            (Some(l), Some(r)) => (l, r),
            _ => return Err(Error::MissingMap("cross_check"))
        };
        if left.width() != right.width() || left.height() != right.height() {
            return Err(Error::DimensionMismatch {
                base: (left.width(), left.height()),
                matched: (right.width(), right.height())
            });
        }

        let (w, h) = (left.width(), left.height());
        let left_in = left.clone();
        let right_in = right.clone();

        // Average agreeing pairs, invalidate the rest
        for y in 0..h {
            for x in 0..w {
                let l = *left_in.get(x, y);
                if !l.is_valid() {
                    continue;
                }

                match l.matched_pixel(Pixel::new(x, y), w, h) {
                    Some(q) if self.agree(&l, right_in.get(q.x, q.y)) => {
                        let r = right_in.get(q.x, q.y);
                        let ax = 0.5 * (l.sub_dx - r.sub_dx);
                        let ay = 0.5 * (l.sub_dy - r.sub_dy);
                        left.get_mut(x, y).set_subpixel(ax, ay);
                        right.get_mut(q.x, q.y).set_subpixel(-ax, -ay);
                    },
                    Some(q) => {
                        invalidate(left.get_mut(x, y));
                        invalidate(right.get_mut(q.x, q.y));
                    },
                    None => invalidate(left.get_mut(x, y))
                }
            }
        }

        // Averaging may re-round a disparity onto another pixel, repeat until both maps agree
        let mut rounds = 0;
        loop {
            let changed = self.invalidate_disagreeing(left, right)
                + self.invalidate_disagreeing(right, left);
            rounds += 1;
            if changed == 0 {
                break;
            }
        }

        debug!(
            "Cross check settled after {} rounds, {} left and {} right pixels valid",
            rounds, left.valid_count(), right.valid_count()
        );

        Ok(())
    }
}

// -----------------------------------------------------------------------------------------------
// FUNCTIONS
// -----------------------------------------------------------------------------------------------

fn invalidate(d: &mut Disparity) {
    d.invalidate();
    d.flags.insert(DisparityFlags::OCCLUDED);
}

// -----------------------------------------------------------------------------------------------
// TESTS
// -----------------------------------------------------------------------------------------------
