//! # Disparity computers
//!
//! A disparity computer reduces the stream of scored candidates of one base pixel to the final
//! disparity of that pixel. Computers are shared, read-only factories; the running state of a
//! pixel lives in a `DisparityAccumulator` owned by whichever worker is matching the pixel.

// -----------------------------------------------------------------------------------------------
// MODULES
// -----------------------------------------------------------------------------------------------

pub mod interpolating;
pub mod trimmed_mean;
pub mod wta;

// -----------------------------------------------------------------------------------------------
// IMPORTS
// -----------------------------------------------------------------------------------------------

use crate::confidence::MatchConfidence;
use crate::disparity::Disparity;
use crate::error::*;
use crate::frame::Pixel;

pub use interpolating::InterpolatingComputer;
pub use trimmed_mean::{MeanWeighting, SgmTrimmedMeanComputer, SpreadNorm, TrimmedMeanParams};
pub use wta::WtaComputer;

// -----------------------------------------------------------------------------------------------
// CONSTANTS
// -----------------------------------------------------------------------------------------------

/// Costs closer than this are ties.
const TIE_EPS: f64 = 1e-9;

// -----------------------------------------------------------------------------------------------
// DATA STRUCTURES
// -----------------------------------------------------------------------------------------------

/// A scored correspondence hypothesis for a base pixel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Candidate {
    pub base: Pixel,
    pub matched: Pixel,
    /// `base.x - matched.x`
    pub dx: i32,
    /// `base.y - matched.y`
    pub dy: i32,
    pub cost: f64,
    /// Number of path samples that contributed to `cost`, 1 for unaggregated costs.
    pub path_length: usize
}

/// Candidates of the current pixel with the indices of the best and second best.
#[derive(Debug, Clone, Default)]
pub(crate) struct RunningBest {
    pub candidates: Vec<Candidate>,
    pub best: Option<usize>,
    pub second: Option<usize>
}

// -----------------------------------------------------------------------------------------------
// TRAITS
// -----------------------------------------------------------------------------------------------

/// Factory of per-worker accumulators.
pub trait DisparityComputer: Send + Sync {
    /// Stable identifier of the computer.
    fn name(&self) -> &'static str;

    /// Fresh accumulator for a matching run whose costs are bounded by `max_cost`.
    fn accumulator(&self, max_cost: f64) -> Box<dyn DisparityAccumulator>;
}

/// Running state of the pixel currently being matched.
pub trait DisparityAccumulator: Send {
    /// Record one candidate of the current pixel.
    fn store_disparity(&mut self, candidate: Candidate);

    /// Emit the disparity of the current pixel and reset for the next one.
    ///
    /// A pixel that received no candidates yields an invalid disparity. A non-finite value
    /// produced while finalising is reported as `Error::NonFinite`; the state is reset either
    /// way.
    fn finalize_for_pixel(&mut self) -> Result<Disparity>;
}

// -----------------------------------------------------------------------------------------------
// IMPLEMENTATIONS
// -----------------------------------------------------------------------------------------------

impl Candidate {
    pub fn new(base: Pixel, matched: Pixel, cost: f64) -> Self {
        Candidate {
            base,
            matched,
            dx: base.x as i32 - matched.x as i32,
            dy: base.y as i32 - matched.y as i32,
            cost,
            path_length: 1
        }
    }

    pub fn with_path_length(mut self, path_length: usize) -> Self {
        self.path_length = path_length;
        self
    }

    fn magnitude_sq(&self) -> i64 {
        let (dx, dy) = (self.dx as i64, self.dy as i64);
        dx * dx + dy * dy
    }

    /// Lower cost wins, equal costs go to the smaller displacement.
    fn beats(&self, other: &Candidate) -> bool {
        if (self.cost - other.cost).abs() <= TIE_EPS {
            self.magnitude_sq() < other.magnitude_sq()
        }
        else {
            self.cost < other.cost
        }
    }
}

impl RunningBest {
    pub fn push(&mut self, candidate: Candidate) {
        let idx = self.candidates.len();
        self.candidates.push(candidate);

        match self.best {
            None => self.best = Some(idx),
            Some(b) if candidate.beats(&self.candidates[b]) => {
                self.second = Some(b);
                self.best = Some(idx);
            },
            Some(_) => {
                let replace = match self.second {
                    None => true,
                    Some(s) => candidate.beats(&self.candidates[s])
                };
                if replace {
                    self.second = Some(idx);
                }
            }
        }
    }

    pub fn costs(&self) -> Vec<f64> {
        self.candidates.iter().map(|c| c.cost).collect()
    }

    pub fn confidence(&self, method: MatchConfidence, max_cost: f64) -> f64 {
        match (self.best, self.second) {
            (Some(b), Some(s)) => method.compute(&self.costs(), b, s, max_cost),
            _ => 1.0
        }
    }

    pub fn reset(&mut self) {
        self.candidates.clear();
        self.best = None;
        self.second = None;
    }
}

// -----------------------------------------------------------------------------------------------
// TESTS
// -----------------------------------------------------------------------------------------------
