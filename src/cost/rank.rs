//! # Rank transform cost
//!
//! Each pixel is replaced by the number of darker neighbours inside the rank mask. Pixel pairs
//! are compared by summing absolute rank differences over a separate correlation mask.

// -----------------------------------------------------------------------------------------------
// IMPORTS
// -----------------------------------------------------------------------------------------------

use log::debug;
use rayon::prelude::*;
use serde::Deserialize;

use super::{clamp_offset, mask_offsets, MatchingCostComputer};
use crate::error::*;
use crate::frame::{check_dimensions, GrayFloatImage, Pixel};

// -----------------------------------------------------------------------------------------------
// DATA STRUCTURES
// -----------------------------------------------------------------------------------------------

#[derive(Deserialize, Debug, Clone, Copy, PartialEq)]
#[serde(default)]
pub struct RankParams {
    pub rank_half_width: usize,
    pub rank_half_height: usize,
    pub corr_half_width: usize,
    pub corr_half_height: usize
}

pub struct Rank {
    params: RankParams,
    width: usize,
    height: usize,
    corr_offsets: Vec<(isize, isize)>,
    base: Vec<u32>,
    matched: Vec<u32>
}

// -----------------------------------------------------------------------------------------------
// IMPLEMENTATIONS
// -----------------------------------------------------------------------------------------------

impl Default for RankParams {
    fn default() -> Self {
        Self {
            rank_half_width: 2,
            rank_half_height: 2,
            corr_half_width: 2,
            corr_half_height: 2
        }
    }
}

impl RankParams {
    fn rank_area(&self) -> usize {
        (2 * self.rank_half_width + 1) * (2 * self.rank_half_height + 1)
    }

    fn corr_area(&self) -> usize {
        (2 * self.corr_half_width + 1) * (2 * self.corr_half_height + 1)
    }
}

impl Rank {
    pub fn new(params: RankParams) -> Self {
        Self {
            params,
            width: 0,
            height: 0,
            corr_offsets: mask_offsets(params.corr_half_width, params.corr_half_height, true),
            base: Vec::new(),
            matched: Vec::new()
        }
    }

    fn transform(&self, img: &GrayFloatImage) -> Vec<u32> {
        let (w, h) = (img.width(), img.height());
        let offsets = mask_offsets(self.params.rank_half_width, self.params.rank_half_height, false);

        let mut out = vec![0u32; w * h];
        out.par_chunks_mut(w)
            .enumerate()
            .for_each(|(y, row)| {
                for (x, rank) in row.iter_mut().enumerate() {
                    let centre = img.get(x, y);
                    *rank = offsets
                        .iter()
                        .filter(|(dx, dy)| {
                            img.get(clamp_offset(x, *dx, w), clamp_offset(y, *dy, h)) < centre
                        })
                        .count() as u32;
                }
            });

        out
    }

    fn rank_at(&self, data: &[u32], x: usize, y: usize) -> i64 {
        data[y * self.width + x] as i64
    }
}

impl MatchingCostComputer for Rank {
    fn name(&self) -> &'static str {
        "rank"
    }

    fn init(&mut self, base: &GrayFloatImage, matched: &GrayFloatImage) -> Result<()> {
        check_dimensions(base, matched)?;

        self.width = base.width();
        self.height = base.height();
        self.base = self.transform(base);
        self.matched = self.transform(matched);

        debug!(
            "Rank transform of {}x{} images, rank mask area {}, correlation mask area {}",
            self.width, self.height, self.params.rank_area(), self.params.corr_area()
        );

        Ok(())
    }

    fn image_size(&self) -> (usize, usize) {
        (self.width, self.height)
    }

    fn max_cost(&self) -> f64 {
        (self.params.rank_area() * self.params.corr_area()) as f64
    }

    fn border_width(&self) -> usize {
        self.params.corr_half_width
    }

    fn border_height(&self) -> usize {
        self.params.corr_half_height
    }

    fn get_cost(&self, base: Pixel, matched: Pixel) -> f64 {
        self.corr_offsets
            .iter()
            .map(|(dx, dy)| {
                let rb = self.rank_at(
                    &self.base,
                    (base.x as isize + dx) as usize,
                    (base.y as isize + dy) as usize
                );
                let rm = self.rank_at(
                    &self.matched,
                    (matched.x as isize + dx) as usize,
                    (matched.y as isize + dy) as usize
                );
                (rb - rm).abs()
            })
            .sum::<i64>() as f64
    }

    fn get_cost_border(&self, base: Pixel, matched: Pixel) -> f64 {
        let (w, h) = (self.width, self.height);

        self.corr_offsets
            .iter()
            .map(|(dx, dy)| {
                let rb = self.rank_at(
                    &self.base,
                    clamp_offset(base.x, *dx, w),
                    clamp_offset(base.y, *dy, h)
                );
                let rm = self.rank_at(
                    &self.matched,
                    clamp_offset(matched.x, *dx, w),
                    clamp_offset(matched.y, *dy, h)
                );
                (rb - rm).abs()
            })
            .sum::<i64>() as f64
    }
}

// -----------------------------------------------------------------------------------------------
// TESTS
// -----------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn textured(w: usize, h: usize) -> GrayFloatImage {
        GrayFloatImage::from_fn(w, h, |x, y| ((x * 53 + y * 29 + x * y * 7) % 197) as f32)
    }

    #[test]
    fn identical_images_cost_nothing() {
        let img = textured(14, 9);
        let mut rank = Rank::new(RankParams::default());
        rank.init(&img, &img).unwrap();

        for y in 0..9 {
            for x in 0..14 {
                let p = Pixel::new(x, y);
                assert_eq!(rank.cost(p, p), 0.0);
            }
        }
    }

    #[test]
    fn border_variant_agrees_in_interior() {
        let img = textured(16, 16);
        let other = GrayFloatImage::from_fn(16, 16, |x, y| img.get(x, 15 - y) * 0.5 + 3.0);
        let mut rank = Rank::new(RankParams {
            rank_half_width: 1,
            rank_half_height: 1,
            corr_half_width: 3,
            corr_half_height: 2
        });
        rank.init(&img, &other).unwrap();

        for &(a, b) in &[((5, 5), (8, 6)), ((3, 2), (12, 13)), ((7, 9), (7, 9))] {
            let a = Pixel::new(a.0, a.1);
            let b = Pixel::new(b.0, b.1);
            assert_eq!(rank.get_cost(a, b), rank.get_cost_border(a, b));
        }
    }

    #[test]
    fn max_cost_is_product_of_mask_areas() {
        let rank = Rank::new(RankParams {
            rank_half_width: 1,
            rank_half_height: 1,
            corr_half_width: 2,
            corr_half_height: 1
        });
        assert_eq!(rank.max_cost(), (9 * 15) as f64);
    }

    #[test]
    fn costs_are_bounded() {
        let img = textured(10, 10);
        let inv = GrayFloatImage::from_fn(10, 10, |x, y| 255.0 - img.get(x, y));
        let mut rank = Rank::new(RankParams::default());
        rank.init(&img, &inv).unwrap();

        for y in 0..10 {
            for x in 0..10 {
                let c = rank.cost(Pixel::new(x, y), Pixel::new(9 - x, y));
                assert!(c >= 0.0 && c <= rank.max_cost());
            }
        }
    }
}
