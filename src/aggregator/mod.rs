//! # Cost aggregation
//!
//! The cost aggregator drives a matching run: for every base image pixel it builds the set of
//! candidate matched pixels, scores them with the matching cost computer, lets the aggregation
//! strategy combine the scores, and hands the results to a disparity accumulator which produces
//! the disparity of the pixel.

// -----------------------------------------------------------------------------------------------
// MODULES
// -----------------------------------------------------------------------------------------------

pub mod scan;
pub mod sgm;

// -----------------------------------------------------------------------------------------------
// IMPORTS
// -----------------------------------------------------------------------------------------------

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use log::{debug, info, warn};
use nalgebra::Matrix3;
use rayon::prelude::*;
use serde::Deserialize;

use crate::computer::{DisparityAccumulator, DisparityComputer};
use crate::cost::MatchingCostComputer;
use crate::disparity::{Disparity, DisparityMap};
use crate::epiline::{enforce_rank2, rectified_fundamental, EpiLine};
use crate::error::*;
use crate::frame::{check_dimensions, GrayFloatImage, Pixel};

pub use scan::{PlainScan, WholeImageScan};
pub use sgm::{SgmAggregation, SgmParams};

// -----------------------------------------------------------------------------------------------
// DATA STRUCTURES
// -----------------------------------------------------------------------------------------------

/// Range of displacements searched, stated for the left image as base.
///
/// Bounds are inclusive. A window with a minimum above its maximum has no candidates, so every
/// pixel comes out invalid.
#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(default)]
pub struct SearchWindow {
    pub min_dx: i32,
    pub max_dx: i32,
    pub min_dy: i32,
    pub max_dy: i32
}

/// What to do with a pixel whose disparity came out non-finite.
#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum NumericFailurePolicy {
    /// Stop the whole run with the error.
    Abort,
    /// Log the failure and leave the pixel invalid.
    MarkInvalid
}

/// Read-only state shared by every worker of a matching run.
pub struct MatchingContext<'a> {
    pub base: &'a GrayFloatImage,
    pub matched: &'a GrayFloatImage,
    pub cost: &'a dyn MatchingCostComputer,
    pub fundamental: Matrix3<f64>,
    pub is_left_image_base: bool,
    /// Window oriented for the current base image.
    pub window: SearchWindow,
    pub rectified: bool
}

/// Matching run over one base image.
pub struct CostAggregator<'a> {
    base: &'a GrayFloatImage,
    matched: &'a GrayFloatImage,
    fundamental: Matrix3<f64>,
    is_left_image_base: bool,
    window: SearchWindow,
    cost: Box<dyn MatchingCostComputer>,
    computer: Box<dyn DisparityComputer>,
    strategy: Box<dyn AggregationStrategy>,
    failure_policy: NumericFailurePolicy,
    abort: Option<Arc<AtomicBool>>,
    initialised: bool
}

// -----------------------------------------------------------------------------------------------
// TRAITS
// -----------------------------------------------------------------------------------------------

/// How the candidate costs of a base pixel are produced and forwarded.
pub trait AggregationStrategy: Send + Sync {
    /// Stable identifier of the strategy.
    fn name(&self) -> &'static str;

    /// Candidate matched pixels of `base`, in order along the search line.
    fn candidates(&self, ctx: &MatchingContext<'_>, base: Pixel) -> Vec<Pixel> {
        ctx.epipolar_candidates(base)
    }

    /// Bound on the forwarded costs as a multiple of the matching cost maximum.
    fn cost_scale(&self) -> f64 {
        1.0
    }

    /// Score `candidates` and store them in `acc`.
    fn aggregate_pixel(
        &self,
        ctx: &MatchingContext<'_>,
        base: Pixel,
        candidates: &[Pixel],
        acc: &mut dyn DisparityAccumulator
    ) -> Result<()>;
}

// -----------------------------------------------------------------------------------------------
// IMPLEMENTATIONS
// -----------------------------------------------------------------------------------------------

impl Default for SearchWindow {
    fn default() -> Self {
        Self {
            min_dx: 0,
            max_dx: 64,
            min_dy: 0,
            max_dy: 0
        }
    }
}

impl SearchWindow {
    pub fn horizontal(min_dx: i32, max_dx: i32) -> Self {
        Self { min_dx, max_dx, min_dy: 0, max_dy: 0 }
    }

    /// The window as seen from the given base image. Right-based displacements are the negated
    /// left-based ones.
    pub fn oriented(&self, is_left_image_base: bool) -> Self {
        if is_left_image_base {
            *self
        }
        else {
            Self {
                min_dx: -self.max_dx,
                max_dx: -self.min_dx,
                min_dy: -self.max_dy,
                max_dy: -self.min_dy
            }
        }
    }

    pub fn contains(&self, dx: i32, dy: i32) -> bool {
        dx >= self.min_dx && dx <= self.max_dx && dy >= self.min_dy && dy <= self.max_dy
    }
}

impl Default for NumericFailurePolicy {
    fn default() -> Self {
        NumericFailurePolicy::MarkInvalid
    }
}

impl<'a> MatchingContext<'a> {
    pub fn width(&self) -> usize {
        self.base.width()
    }

    pub fn height(&self) -> usize {
        self.base.height()
    }

    /// Candidates on the epipolar line of `base` inside the search window.
    ///
    /// Rectified runs take the image row directly. Candidates are ordered by increasing matched
    /// `x`, then along the line for steep lines.
    pub fn epipolar_candidates(&self, base: Pixel) -> Vec<Pixel> {
        let w = &self.window;

        if self.rectified {
            if !w.contains(w.min_dx, 0) {
                return Vec::new();
            }
            return (w.min_dx..=w.max_dx)
                .rev()
                .filter_map(|dx| base.offset(-(dx as isize), 0, self.width(), self.height()))
                .collect();
        }

        match EpiLine::from_fundamental(&self.fundamental, base, self.is_left_image_base) {
            Some(line) => line
                .pixels(self.width(), self.height())
                .into_iter()
                .filter(|m| self.in_window(base, *m))
                .collect(),
            None => Vec::new()
        }
    }

    /// Every pixel of the search window around `base`, row by row.
    pub fn window_candidates(&self, base: Pixel) -> Vec<Pixel> {
        let w = &self.window;
        let mut out = Vec::new();

        for dy in (w.min_dy..=w.max_dy).rev() {
            for dx in (w.min_dx..=w.max_dx).rev() {
                if let Some(m) = base.offset(-(dx as isize), -(dy as isize), self.width(), self.height()) {
                    out.push(m);
                }
            }
        }

        out
    }

    pub fn in_window(&self, base: Pixel, matched: Pixel) -> bool {
        self.window.contains(
            base.x as i32 - matched.x as i32,
            base.y as i32 - matched.y as i32
        )
    }
}

impl<'a> CostAggregator<'a> {
    pub fn new(
        base: &'a GrayFloatImage,
        matched: &'a GrayFloatImage,
        is_left_image_base: bool,
        cost: Box<dyn MatchingCostComputer>,
        computer: Box<dyn DisparityComputer>,
        strategy: Box<dyn AggregationStrategy>
    ) -> Self {
        CostAggregator {
            base,
            matched,
            fundamental: rectified_fundamental(),
            is_left_image_base,
            window: SearchWindow::default(),
            cost,
            computer,
            strategy,
            failure_policy: NumericFailurePolicy::default(),
            abort: None,
            initialised: false
        }
    }

    /// Fundamental matrix relating the images as `x_right^T F x_left = 0`.
    pub fn with_fundamental(mut self, fundamental: Matrix3<f64>) -> Self {
        self.fundamental = fundamental;
        self.initialised = false;
        self
    }

    /// Search window, stated for the left image as base.
    pub fn with_window(mut self, window: SearchWindow) -> Self {
        self.window = window;
        self
    }

    pub fn with_failure_policy(mut self, policy: NumericFailurePolicy) -> Self {
        self.failure_policy = policy;
        self
    }

    /// Flag polled between rows; setting it ends the run with `Error::Aborted`.
    pub fn with_abort_flag(mut self, abort: Arc<AtomicBool>) -> Self {
        self.abort = Some(abort);
        self
    }

    pub fn is_left_image_base(&self) -> bool {
        self.is_left_image_base
    }

    pub fn fundamental(&self) -> &Matrix3<f64> {
        &self.fundamental
    }

    pub fn cost_computer(&self) -> &dyn MatchingCostComputer {
        self.cost.as_ref()
    }

    /// Validate the images, project the fundamental matrix onto rank 2 and precompute the cost
    /// transforms.
    pub fn init(&mut self) -> Result<()> {
        check_dimensions(self.base, self.matched)?;

        if self.fundamental.iter().any(|v| !v.is_finite()) {
            return Err(Error::InvalidParameter {
                name: "fundamental",
                reason: "matrix has non-finite entries".into()
            });
        }
        self.fundamental = enforce_rank2(&self.fundamental);

        let t0 = Instant::now();
        self.cost.init(self.base, self.matched)?;
        debug!("{} cost transforms computed in {:?}", self.cost.name(), t0.elapsed());

        self.initialised = true;
        Ok(())
    }

    /// Match every base pixel along its epipolar line.
    pub fn compute_matching_costs(&self) -> Result<DisparityMap> {
        self.run(false)
    }

    /// Match every base pixel along its image row, assuming a rectified pair.
    pub fn compute_matching_costs_rectified(&self) -> Result<DisparityMap> {
        self.run(true)
    }

    fn run(&self, rectified: bool) -> Result<DisparityMap> {
        if !self.initialised {
            return Err(Error::NotInitialised);
        }

        let (width, height) = (self.base.width(), self.base.height());
        let ctx = MatchingContext {
            base: self.base,
            matched: self.matched,
            cost: self.cost.as_ref(),
            fundamental: if rectified { rectified_fundamental() } else { self.fundamental },
            is_left_image_base: self.is_left_image_base,
            window: self.window.oriented(self.is_left_image_base),
            rectified
        };
        let max_cost = self.cost.max_cost() * self.strategy.cost_scale();

        info!(
            "Matching {}x{} {} image with {} strategy and {} computer{}",
            width, height,
            if self.is_left_image_base { "left" } else { "right" },
            self.strategy.name(),
            self.computer.name(),
            if rectified { " (rectified)" } else { "" }
        );
        let t0 = Instant::now();

        let mut map = DisparityMap::new(width, height);
        map.as_mut_slice()
            .par_chunks_mut(width)
            .enumerate()
            .try_for_each(|(y, row)| -> Result<()> {
                if let Some(abort) = &self.abort {
                    if abort.load(Ordering::Relaxed) {
                        return Err(Error::Aborted);
                    }
                }

                let mut acc = self.computer.accumulator(max_cost);
                for (x, cell) in row.iter_mut().enumerate() {
                    *cell = self.match_pixel(&ctx, Pixel::new(x, y), acc.as_mut())?;
                }
                Ok(())
            })?;

        map.update_statistics();
        info!(
            "Matching finished in {:?}, {} of {} pixels valid",
            t0.elapsed(), map.valid_count(), width * height
        );

        Ok(map)
    }

    fn match_pixel(
        &self,
        ctx: &MatchingContext<'_>,
        base: Pixel,
        acc: &mut dyn DisparityAccumulator
    ) -> Result<Disparity> {
        let candidates = self.strategy.candidates(ctx, base);

        let res = match self.strategy.aggregate_pixel(ctx, base, &candidates, acc) {
            Ok(()) => acc.finalize_for_pixel(),
            Err(e) => {
                // Drop whatever was stored before the failure
                let _ = acc.finalize_for_pixel();
                Err(e)
            }
        };

        match res {
            Err(e @ Error::NonFinite { .. }) => match self.failure_policy {
                NumericFailurePolicy::Abort => Err(e),
                NumericFailurePolicy::MarkInvalid => {
                    warn!("{}, pixel left invalid", e);
                    Ok(Disparity::invalid())
                }
            },
            other => other
        }
    }
}

// -----------------------------------------------------------------------------------------------
// TESTS
// -----------------------------------------------------------------------------------------------
