//! # Anisotropic refinement
//!
//! Perona-Malik style diffusion of the disparity field,
//!
//! `d(t+1) = d(t) + r * sum(c(g_dir) * w_dir * (d_dir - d))`
//!
//! where `g_dir` is either the image intensity step (`Diffusion`) or the disparity step
//! (`Smoothing`) towards the neighbour. Diffusion mode also grows valid regions into invalid
//! pixels; smoothing only ever touches pixels that are already valid.

// -----------------------------------------------------------------------------------------------
// IMPORTS
// -----------------------------------------------------------------------------------------------

use log::debug;
use rayon::prelude::*;
use serde::Deserialize;

use super::{for_each_map, DisparityRefiner, NEIGHBOURS_4, NEIGHBOURS_8};
use crate::disparity::{Disparity, DisparityMap, StereoMaps};
use crate::error::*;
use crate::frame::{GrayFloatImage, Pixel, StereoFrame};

// -----------------------------------------------------------------------------------------------
// CONSTANTS
// -----------------------------------------------------------------------------------------------

/// Weight of the diagonal neighbours in the 8-neighbourhood.
const DIAGONAL_WEIGHT: f64 = 0.5;

// -----------------------------------------------------------------------------------------------
// ENUMERATIONS
// -----------------------------------------------------------------------------------------------

#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DiffusionMode {
    /// Conductance from image edges, invalid pixels are filled.
    Diffusion,
    /// Conductance from disparity edges, valid pixels only.
    Smoothing
}

#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DiffusionKernel {
    /// `exp(-(g/k)^2)`
    Exponential,
    /// `1 / (1 + (g/k)^2)`
    Rational,
    Constant
}

#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Neighbourhood {
    Four,
    Eight
}

// -----------------------------------------------------------------------------------------------
// DATA STRUCTURES
// -----------------------------------------------------------------------------------------------

#[derive(Deserialize, Debug, Clone, Copy, PartialEq)]
#[serde(default)]
pub struct AnisotropicParams {
    pub mode: DiffusionMode,
    pub kernel: DiffusionKernel,
    /// Edge strength at which the conductance has dropped noticeably.
    pub k: f64,
    pub neighbourhood: Neighbourhood,
    /// Step size `r` of one iteration.
    pub step: f64,
    pub iterations: usize
}

#[derive(Debug, Clone, Copy, Default)]
pub struct AnisotropicRefiner {
    pub params: AnisotropicParams
}

// -----------------------------------------------------------------------------------------------
// IMPLEMENTATIONS
// -----------------------------------------------------------------------------------------------

impl Default for AnisotropicParams {
    fn default() -> Self {
        Self {
            mode: DiffusionMode::Smoothing,
            kernel: DiffusionKernel::Exponential,
            k: 2.0,
            neighbourhood: Neighbourhood::Four,
            step: 0.2,
            iterations: 10
        }
    }
}

impl DiffusionKernel {
    pub fn conductance(&self, g: f64, k: f64) -> f64 {
        let s = g / k;
        match self {
            DiffusionKernel::Exponential => (-s * s).exp(),
            DiffusionKernel::Rational => 1.0 / (1.0 + s * s),
            DiffusionKernel::Constant => 1.0
        }
    }
}

impl Neighbourhood {
    /// Neighbour offsets with their weights.
    pub fn offsets(&self) -> Vec<((isize, isize), f64)> {
        match self {
            Neighbourhood::Four => NEIGHBOURS_4.iter().map(|o| (*o, 1.0)).collect(),
            Neighbourhood::Eight => NEIGHBOURS_8
                .iter()
                .map(|&(dx, dy)| {
                    let w = if dx != 0 && dy != 0 { DIAGONAL_WEIGHT } else { 1.0 };
                    ((dx, dy), w)
                })
                .collect()
        }
    }

    /// Sum of the neighbour weights, the explicit scheme is stable for `step <= 1 / total`.
    pub fn total_weight(&self) -> f64 {
        self.offsets().iter().map(|(_, w)| w).sum()
    }
}

impl AnisotropicParams {
    pub fn validate(&self) -> Result<()> {
        if !(self.k > 0.0) || !self.k.is_finite() {
            return Err(Error::InvalidParameter {
                name: "k",
                reason: format!("must be a positive number, got {}", self.k)
            });
        }

        let limit = 1.0 / self.neighbourhood.total_weight();
        if !(self.step > 0.0) || self.step > limit {
            return Err(Error::InvalidParameter {
                name: "step",
                reason: format!("must lie in (0, {}] for this neighbourhood, got {}", limit, self.step)
            });
        }

        Ok(())
    }
}

impl AnisotropicRefiner {
    pub fn new(params: AnisotropicParams) -> Self {
        Self { params }
    }

    fn refine_map(&self, map: &mut DisparityMap, image: Option<&GrayFloatImage>) -> Result<()> {
        let (w, h) = (map.width(), map.height());
        let offsets = self.params.neighbourhood.offsets();

        let mut current = map.as_slice().to_vec();
        let mut next = current.clone();

        for _ in 0..self.params.iterations {
            {
                let src = &current;
                next.par_chunks_mut(w)
                    .enumerate()
                    .for_each(|(y, row)| {
                        for (x, cell) in row.iter_mut().enumerate() {
                            *cell = self.update(src, image, &offsets, Pixel::new(x, y), w, h);
                        }
                    });
            }
            std::mem::swap(&mut current, &mut next);
        }

        let filled = current
            .iter()
            .zip(map.as_slice())
            .filter(|(after, before)| after.is_valid() && !before.is_valid())
            .count();

        map.as_mut_slice().copy_from_slice(&current);

        debug!(
            "Anisotropic {:?}: {} iterations, {} pixels filled",
            self.params.mode, self.params.iterations, filled
        );

        Ok(())
    }

    /// One explicit update of the pixel `p` from the buffer `src`.
    fn update(
        &self,
        src: &[Disparity],
        image: Option<&GrayFloatImage>,
        offsets: &[((isize, isize), f64)],
        p: Pixel,
        w: usize,
        h: usize
    ) -> Disparity {
        let centre = src[p.y * w + p.x];

        let (mut flux_x, mut flux_y) = (0.0, 0.0);
        let (mut norm, mut sx, mut sy, mut cost, mut conf) = (0.0, 0.0, 0.0, 0.0, 0.0);

        for ((dx, dy), weight) in offsets {
            let q = match p.offset(*dx, *dy, w, h) {
                Some(q) => q,
                None => continue
            };
            let n = src[q.y * w + q.x];
            if !n.is_valid() {
                continue;
            }

            let g = match (self.params.mode, image) {
                (DiffusionMode::Diffusion, Some(img)) => {
                    (img.get(q.x, q.y) - img.get(p.x, p.y)).abs() as f64
                },
                _ => (n.sub_dx - centre.sub_dx).hypot(n.sub_dy - centre.sub_dy)
            };
            let c = weight * self.params.kernel.conductance(g, self.params.k);

            if centre.is_valid() {
                flux_x += c * (n.sub_dx - centre.sub_dx);
                flux_y += c * (n.sub_dy - centre.sub_dy);
            }
            else {
                norm += c;
                sx += c * n.sub_dx;
                sy += c * n.sub_dy;
                cost += c * n.cost;
                conf += c * n.confidence;
            }
        }

        if centre.is_valid() {
            let mut out = centre;
            out.set_subpixel(
                centre.sub_dx + self.params.step * flux_x,
                centre.sub_dy + self.params.step * flux_y
            );
            out
        }
        else if self.params.mode == DiffusionMode::Diffusion && norm > 0.0 {
            Disparity::with_subpixel(sx / norm, sy / norm, cost / norm, conf / norm)
        }
        else {
            centre
        }
    }
}

impl DisparityRefiner for AnisotropicRefiner {
    fn name(&self) -> &'static str {
        "anisotropic"
    }

    fn refine(&self, maps: &mut StereoMaps, frame: Option<&StereoFrame>) -> Result<()> {
        self.params.validate()?;

        if self.params.mode == DiffusionMode::Diffusion && frame.is_none() {
            return Err(Error::MissingImages("anisotropic diffusion"));
        }

        for_each_map(maps, |map, is_left| {
            let image = frame.map(|f| f.base(is_left));
            if let Some(img) = image {
                if img.width() != map.width() || img.height() != map.height() {
                    return Err(Error::DimensionMismatch {
                        base: (map.width(), map.height()),
                        matched: (img.width(), img.height())
                    });
                }
            }
            self.refine_map(map, image)
        })
    }
}

// -----------------------------------------------------------------------------------------------
// TESTS
// -----------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn step_map(w: usize, h: usize) -> DisparityMap {
        let mut map = DisparityMap::new(w, h);
        for y in 0..h {
            for x in 0..w {
                let dx = if x < w / 2 { 2 } else { 8 };
                map.put(x, y, Disparity::new(dx, 0, 1.0, 0.5));
            }
        }
        map
    }

    #[test]
    fn constant_map_is_a_fixed_point() {
        let mut map = DisparityMap::new(6, 6);
        for y in 0..6 {
            for x in 0..6 {
                map.put(x, y, Disparity::new(4, 1, 0.0, 1.0));
            }
        }
        let mut maps = StereoMaps { left: Some(map), right: None };
        let refiner = AnisotropicRefiner::new(AnisotropicParams {
            neighbourhood: Neighbourhood::Eight,
            step: 0.15,
            ..Default::default()
        });
        refiner.refine(&mut maps, None).unwrap();

        for (_, _, d) in maps.left.unwrap().iter() {
            assert_relative_eq!(d.sub_dx, 4.0);
            assert_relative_eq!(d.sub_dy, 1.0);
        }
    }

    #[test]
    fn constant_kernel_blurs_edges_more_than_exponential() {
        let run = |kernel| {
            let mut maps = StereoMaps { left: Some(step_map(8, 4)), right: None };
            let refiner = AnisotropicRefiner::new(AnisotropicParams {
                kernel,
                k: 1.0,
                iterations: 3,
                ..Default::default()
            });
            refiner.refine(&mut maps, None).unwrap();
            maps.left.unwrap().get(3, 2).sub_dx
        };

        let blurred = run(DiffusionKernel::Constant);
        let preserved = run(DiffusionKernel::Exponential);
        assert!(blurred > 2.5);
        assert!((preserved - 2.0).abs() < 1e-3);
    }

    #[test]
    fn smoothing_leaves_invalid_pixels_alone() {
        let mut map = step_map(6, 6);
        map.get_mut(2, 2).invalidate();
        let mut maps = StereoMaps { left: Some(map), right: None };
        AnisotropicRefiner::default().refine(&mut maps, None).unwrap();

        assert!(!maps.left.unwrap().get(2, 2).is_valid());
    }

    #[test]
    fn diffusion_fills_holes_from_neighbours() {
        let mut map = DisparityMap::new(5, 5);
        for y in 0..5 {
            for x in 0..5 {
                map.put(x, y, Disparity::new(3, 0, 2.0, 0.5));
            }
        }
        map.get_mut(2, 2).invalidate();

        let img = GrayFloatImage::new(5, 5);
        let frame = StereoFrame::new(img.clone(), img).unwrap();
        let mut maps = StereoMaps { left: Some(map), right: None };
        let refiner = AnisotropicRefiner::new(AnisotropicParams {
            mode: DiffusionMode::Diffusion,
            iterations: 1,
            ..Default::default()
        });
        refiner.refine(&mut maps, Some(&frame)).unwrap();

        let d = *maps.left.unwrap().get(2, 2);
        assert!(d.is_valid());
        assert_eq!(d.dx, 3);
        assert_relative_eq!(d.cost, 2.0);
    }

    #[test]
    fn diffusion_without_images_fails() {
        let mut maps = StereoMaps { left: Some(step_map(4, 4)), right: None };
        let refiner = AnisotropicRefiner::new(AnisotropicParams {
            mode: DiffusionMode::Diffusion,
            ..Default::default()
        });

        assert!(matches!(refiner.refine(&mut maps, None), Err(Error::MissingImages(_))));
    }

    #[test]
    fn unstable_step_is_rejected() {
        let params = AnisotropicParams {
            neighbourhood: Neighbourhood::Eight,
            step: 0.2,
            ..Default::default()
        };
        assert!(params.validate().is_err());
        assert!(AnisotropicParams::default().validate().is_ok());
    }
}
