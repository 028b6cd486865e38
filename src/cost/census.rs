//! # Census transform cost
//!
//! Each pixel is encoded as a bit string with one bit per window neighbour, set when the
//! neighbour is darker than the centre. The cost of a pixel pair is the Hamming distance of
//! their encodings.

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
pub struct CensusParams {
    /// Window half width, the window is `2 * half_width + 1` wide.
    pub half_width: usize,
    /// Window half height, the window is `2 * half_height + 1` high.
    pub half_height: usize
}

pub struct Census {
    params: CensusParams,
    width: usize,
    height: usize,
    words_per_pixel: usize,
    base: Vec<u64>,
    matched: Vec<u64>
}

// -----------------------------------------------------------------------------------------------
// IMPLEMENTATIONS
// -----------------------------------------------------------------------------------------------

impl Default for CensusParams {
    fn default() -> Self {
        Self {
            half_width: 2,
            half_height: 2
        }
    }
}

impl Census {
    pub fn new(params: CensusParams) -> Self {
        let bits = (2 * params.half_width + 1) * (2 * params.half_height + 1) - 1;

        Self {
            params,
            width: 0,
            height: 0,
            words_per_pixel: ((bits + 63) / 64).max(1),
            base: Vec::new(),
            matched: Vec::new()
        }
    }

    /// Encode every pixel of `img`, sampling outside the image by edge replication.
    fn transform(&self, img: &GrayFloatImage) -> Vec<u64> {
        let (w, h) = (img.width(), img.height());
        let words = self.words_per_pixel;
        let offsets = mask_offsets(self.params.half_width, self.params.half_height, false);

        let mut out = vec![0u64; w * h * words];
        out.par_chunks_mut(w * words)
            .enumerate()
            .for_each(|(y, row)| {
                for x in 0..w {
                    let centre = img.get(x, y);
                    let code = &mut row[x * words..(x + 1) * words];

                    for (bit, (dx, dy)) in offsets.iter().enumerate() {
                        let n = img.get(clamp_offset(x, *dx, w), clamp_offset(y, *dy, h));
                        if n < centre {
                            code[bit / 64] |= 1u64 << (bit % 64);
                        }
                    }
                }
            });

        out
    }

    fn code<'a>(&self, data: &'a [u64], p: Pixel) -> &'a [u64] {
        let start = (p.y * self.width + p.x) * self.words_per_pixel;
        &data[start..start + self.words_per_pixel]
    }

    fn hamming(&self, base: Pixel, matched: Pixel) -> f64 {
        self.code(&self.base, base)
            .iter()
            .zip(self.code(&self.matched, matched))
            .map(|(a, b)| (a ^ b).count_ones())
            .sum::<u32>() as f64
    }
}

impl MatchingCostComputer for Census {
    fn name(&self) -> &'static str {
        "census"
    }

    fn init(&mut self, base: &GrayFloatImage, matched: &GrayFloatImage) -> Result<()> {
        check_dimensions(base, matched)?;

        self.width = base.width();
        self.height = base.height();
        self.base = self.transform(base);
        self.matched = self.transform(matched);

        debug!(
            "Census transform of {}x{} images with a {}x{} window",
            self.width, self.height,
            2 * self.params.half_width + 1, 2 * self.params.half_height + 1
        );

        Ok(())
    }

    fn image_size(&self) -> (usize, usize) {
        (self.width, self.height)
    }

    /// One less than the window area, the number of bits in an encoding.
    fn max_cost(&self) -> f64 {
        ((2 * self.params.half_width + 1) * (2 * self.params.half_height + 1) - 1) as f64
    }

    fn border_width(&self) -> usize {
        self.params.half_width
    }

    fn border_height(&self) -> usize {
        self.params.half_height
    }

    fn get_cost(&self, base: Pixel, matched: Pixel) -> f64 {
        self.hamming(base, matched)
    }

    fn get_cost_border(&self, base: Pixel, matched: Pixel) -> f64 {
        // Encodings already replicate the edge, only the centres need clamping
        let clamp = |p: Pixel| Pixel::new(
            p.x.min(self.width - 1),
            p.y.min(self.height - 1)
        );
        self.hamming(clamp(base), clamp(matched))
    }
}

// -----------------------------------------------------------------------------------------------
// TESTS
// -----------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn textured(w: usize, h: usize) -> GrayFloatImage {
        GrayFloatImage::from_fn(w, h, |x, y| ((x * 37 + y * 91 + x * y * 13) % 251) as f32)
    }

    #[test]
    fn identical_images_cost_nothing() {
        let img = textured(12, 10);
        let mut census = Census::new(CensusParams::default());
        census.init(&img, &img).unwrap();

        for y in 0..10 {
            for x in 0..12 {
                let p = Pixel::new(x, y);
                assert_eq!(census.cost(p, p), 0.0);
            }
        }
    }

    #[test]
    fn max_cost_is_bit_count() {
        let census = Census::new(CensusParams { half_width: 4, half_height: 3 });
        assert_eq!(census.max_cost(), 62.0);

        // Larger windows spill into more words
        let census = Census::new(CensusParams { half_width: 5, half_height: 5 });
        assert_eq!(census.max_cost(), 120.0);
        assert_eq!(census.words_per_pixel, 2);
    }

    #[test]
    fn border_matches_interior_fast_path() {
        let img = textured(16, 16);
        let other = GrayFloatImage::from_fn(16, 16, |x, y| img.get(15 - x, y));
        let mut census = Census::new(CensusParams::default());
        census.init(&img, &other).unwrap();

        let a = Pixel::new(6, 7);
        let b = Pixel::new(9, 5);
        assert_eq!(census.get_cost(a, b), census.get_cost_border(a, b));
        assert!(census.get_cost(a, b) <= census.max_cost());
    }

    #[test]
    fn darker_neighbours_set_bits() {
        // Centre brighter than all neighbours
        let img = GrayFloatImage::from_fn(3, 3, |x, y| if x == 1 && y == 1 { 10.0 } else { 0.0 });
        let flat = GrayFloatImage::new(3, 3);
        let mut census = Census::new(CensusParams { half_width: 1, half_height: 1 });
        census.init(&img, &flat).unwrap();

        let c = Pixel::new(1, 1);
        assert_eq!(census.cost(c, c), 8.0);
    }
}
