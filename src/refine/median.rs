//! # Median filter
//!
//! 3x3 median of the disparity magnitude. Invalid neighbours sort after every valid one, so a
//! window dominated by invalid pixels invalidates its centre.

// -----------------------------------------------------------------------------------------------
// IMPORTS
// -----------------------------------------------------------------------------------------------

use std::cmp::Ordering;

use rayon::prelude::*;

use super::{for_each_map, DisparityRefiner};
use crate::disparity::{Disparity, DisparityMap, StereoMaps};
use crate::error::*;
use crate::frame::StereoFrame;

// -----------------------------------------------------------------------------------------------
// DATA STRUCTURES
// -----------------------------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default)]
pub struct MedianFilterRefiner;

// -----------------------------------------------------------------------------------------------
// IMPLEMENTATIONS
// -----------------------------------------------------------------------------------------------

impl MedianFilterRefiner {
    fn refine_map(&self, map: &mut DisparityMap) {
        let snapshot = map.clone();
        let (w, h) = (map.width(), map.height());

        map.as_mut_slice()
            .par_chunks_mut(w)
            .enumerate()
            .for_each(|(y, row)| {
                for (x, cell) in row.iter_mut().enumerate() {
                    if cell.is_valid() {
                        *cell = median_at(&snapshot, x, y, w, h);
                    }
                }
            });
    }
}

impl DisparityRefiner for MedianFilterRefiner {
    fn name(&self) -> &'static str {
        "median"
    }

    fn refine(&self, maps: &mut StereoMaps, _frame: Option<&StereoFrame>) -> Result<()> {
        for_each_map(maps, |map, _| {
            self.refine_map(map);
            Ok(())
        })
    }
}

// -----------------------------------------------------------------------------------------------
// FUNCTIONS
// -----------------------------------------------------------------------------------------------

fn median_at(map: &DisparityMap, x: usize, y: usize, w: usize, h: usize) -> Disparity {
    let mut window: Vec<Disparity> = Vec::with_capacity(9);
    for ny in y.saturating_sub(1)..(y + 2).min(h) {
        for nx in x.saturating_sub(1)..(x + 2).min(w) {
            window.push(*map.get(nx, ny));
        }
    }

    let total = window.len();
    let mut valid: Vec<Disparity> = window.into_iter().filter(|d| d.is_valid()).collect();
    valid.sort_by(|a, b| {
        a.magnitude().partial_cmp(&b.magnitude()).unwrap_or(Ordering::Equal)
    });

    let centre = *map.get(x, y);
    match valid.get(total / 2) {
        Some(m) => {
            let mut out = centre;
            out.dx = m.dx;
            out.dy = m.dy;
            out.sub_dx = m.sub_dx;
            out.sub_dy = m.sub_dy;
            out
        },
        None => {
            let mut out = centre;
            out.invalidate();
            out
        }
    }
}

// -----------------------------------------------------------------------------------------------
// TESTS
// -----------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn filled(w: usize, h: usize, dx: i32) -> DisparityMap {
        let mut map = DisparityMap::new(w, h);
        for y in 0..h {
            for x in 0..w {
                map.put(x, y, Disparity::new(dx, 0, 0.5, 0.8));
            }
        }
        map
    }

    fn run(map: DisparityMap) -> DisparityMap {
        let mut maps = StereoMaps { left: Some(map), right: None };
        MedianFilterRefiner.refine(&mut maps, None).unwrap();
        maps.left.unwrap()
    }

    #[test]
    fn removes_isolated_outlier() {
        let mut map = filled(5, 5, 4);
        map.put(2, 2, Disparity::new(30, 0, 0.1, 0.9));

        let out = run(map);
        let d = out.get(2, 2);
        assert_eq!(d.dx, 4);
        // Centre keeps its own cost and confidence
        assert_eq!(d.cost, 0.1);
    }

    #[test]
    fn invalid_majority_invalidates_centre() {
        let mut map = DisparityMap::new(3, 3);
        map.put(1, 1, Disparity::new(2, 0, 0.0, 1.0));
        map.put(0, 0, Disparity::new(2, 0, 0.0, 1.0));

        let out = run(map);
        assert!(!out.get(1, 1).is_valid());
    }

    #[test]
    fn invalid_pixels_stay_invalid() {
        let mut map = filled(3, 3, 1);
        map.put(1, 1, Disparity::invalid());

        let out = run(map);
        assert!(!out.get(1, 1).is_valid());
        assert_eq!(out.valid_count(), 8);
    }
}
