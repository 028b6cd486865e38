//! # Peak removal
//!
//! Segments the map into 4-connected regions of continuous disparity and removes regions too
//! small to be real surfaces.

// -----------------------------------------------------------------------------------------------
// IMPORTS
// -----------------------------------------------------------------------------------------------

use log::debug;
use serde::Deserialize;

use super::{for_each_map, DisparityRefiner, NEIGHBOURS_4, NEIGHBOURS_8};
use crate::disparity::{Disparity, DisparityMap, StereoMaps};
use crate::error::*;
use crate::frame::{Pixel, StereoFrame};

// -----------------------------------------------------------------------------------------------
// DATA STRUCTURES
// -----------------------------------------------------------------------------------------------

#[derive(Deserialize, Debug, Clone, Copy, PartialEq)]
#[serde(default)]
pub struct PeakRemovalParams {
    /// Segments with fewer pixels than this are removed.
    pub min_segment_size: usize,
    /// Largest disparity magnitude step between neighbours of one segment.
    pub max_difference: f64,
    /// Rebuild removed pixels from their valid 3x3 neighbours.
    pub interpolate_invalidated: bool
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PeakRemovalRefiner {
    pub params: PeakRemovalParams
}

// -----------------------------------------------------------------------------------------------
// IMPLEMENTATIONS
// -----------------------------------------------------------------------------------------------

impl Default for PeakRemovalParams {
    fn default() -> Self {
        Self {
            min_segment_size: 20,
            max_difference: 1.0,
            interpolate_invalidated: false
        }
    }
}

impl PeakRemovalRefiner {
    pub fn new(params: PeakRemovalParams) -> Self {
        Self { params }
    }

    /// Label the 4-connected segments of valid pixels, returning the label of every pixel
    /// (`None` for invalid ones) and the size of every segment.
    fn segment(&self, map: &DisparityMap) -> (Vec<Option<usize>>, Vec<usize>) {
        let (w, h) = (map.width(), map.height());
        let mut labels: Vec<Option<usize>> = vec![None; w * h];
        let mut sizes = Vec::new();
        let mut stack = Vec::new();

        for start in 0..w * h {
            if labels[start].is_some() || !map.as_slice()[start].is_valid() {
                continue;
            }

            let label = sizes.len();
            let mut size = 0;
            labels[start] = Some(label);
            stack.push(Pixel::new(start % w, start / w));

            while let Some(p) = stack.pop() {
                size += 1;
                let m = map.get(p.x, p.y).magnitude();

                for (dx, dy) in NEIGHBOURS_4.iter() {
                    if let Some(n) = p.offset(*dx, *dy, w, h) {
                        let idx = n.y * w + n.x;
                        let nd = map.get(n.x, n.y);
                        if labels[idx].is_none()
                            && nd.is_valid()
                            && (nd.magnitude() - m).abs() <= self.params.max_difference
                        {
                            labels[idx] = Some(label);
                            stack.push(n);
                        }
                    }
                }
            }

            sizes.push(size);
        }

        (labels, sizes)
    }

    fn refine_map(&self, map: &mut DisparityMap) {
        let w = map.width();
        let (labels, sizes) = self.segment(map);

        let mut removed = Vec::new();
        for (idx, label) in labels.iter().enumerate() {
            if let Some(l) = label {
                if sizes[*l] < self.params.min_segment_size {
                    map.as_mut_slice()[idx].invalidate();
                    removed.push(Pixel::new(idx % w, idx / w));
                }
            }
        }

        let mut rebuilt = 0;
        if self.params.interpolate_invalidated {
            let snapshot = map.clone();
            for p in &removed {
                if let Some(d) = neighbour_mean(&snapshot, *p) {
                    map.put(p.x, p.y, d);
                    rebuilt += 1;
                }
            }
        }

        debug!(
            "Peak removal: {} segments, {} pixels removed, {} rebuilt",
            sizes.len(), removed.len(), rebuilt
        );
    }
}

impl DisparityRefiner for PeakRemovalRefiner {
    fn name(&self) -> &'static str {
        "peak_removal"
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

/// Mean of the valid 3x3 neighbours of `p`, if it has any.
fn neighbour_mean(map: &DisparityMap, p: Pixel) -> Option<Disparity> {
    let mut n = 0.0;
    let (mut sx, mut sy, mut cost, mut conf) = (0.0, 0.0, 0.0, 0.0);

    for (dx, dy) in NEIGHBOURS_8.iter() {
        if let Some(q) = p.offset(*dx, *dy, map.width(), map.height()) {
            let d = map.get(q.x, q.y);
            if d.is_valid() {
                n += 1.0;
                sx += d.sub_dx;
                sy += d.sub_dy;
                cost += d.cost;
                conf += d.confidence;
            }
        }
    }

    if n > 0.0 {
        Some(Disparity::with_subpixel(sx / n, sy / n, cost / n, conf / n))
    }
    else {
        None
    }
}

// -----------------------------------------------------------------------------------------------
// TESTS
// -----------------------------------------------------------------------------------------------
