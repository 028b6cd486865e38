//! # SGM trimmed mean
//!
//! Takes the disparity of a pixel as a weighted mean over its candidates, after trimming the
//! disparity-sorted candidate window from either end while that tightens the spread of the
//! window around its mean.

// -----------------------------------------------------------------------------------------------
// IMPORTS
// -----------------------------------------------------------------------------------------------

use serde::Deserialize;

use super::{Candidate, DisparityAccumulator, DisparityComputer, RunningBest};
use crate::confidence::MatchConfidence;
use crate::disparity::Disparity;
use crate::error::*;

// -----------------------------------------------------------------------------------------------
// CONSTANTS
// -----------------------------------------------------------------------------------------------

/// Added to costs before inverting them.
const WEIGHT_EPS: f64 = 1e-3;

/// Windows are never trimmed below this many candidates.
const MIN_WINDOW: usize = 3;

// -----------------------------------------------------------------------------------------------
// ENUMERATIONS
// -----------------------------------------------------------------------------------------------

/// Per-candidate weight of the window mean.
#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MeanWeighting {
    /// Every candidate counts once.
    Simple,
    /// `1 / cost`
    CostInverse,
    /// `path_length / cost`
    CostAndPathLength
}

/// Norm of the window spread.
#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SpreadNorm {
    /// `sum(|mean - d|) / n^2`
    L1,
    /// `sqrt(sum(|mean - d|^2)) / n^2`
    L2
}

// -----------------------------------------------------------------------------------------------
// DATA STRUCTURES
// -----------------------------------------------------------------------------------------------

#[derive(Deserialize, Debug, Clone, Copy, PartialEq)]
#[serde(default)]
pub struct TrimmedMeanParams {
    pub weighting: MeanWeighting,
    pub norm: SpreadNorm
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SgmTrimmedMeanComputer {
    pub params: TrimmedMeanParams,
    pub confidence: MatchConfidence
}

struct TrimmedMeanAccumulator {
    params: TrimmedMeanParams,
    confidence: MatchConfidence,
    max_cost: f64,
    running: RunningBest
}

// -----------------------------------------------------------------------------------------------
// IMPLEMENTATIONS
// -----------------------------------------------------------------------------------------------

impl Default for TrimmedMeanParams {
    fn default() -> Self {
        Self {
            weighting: MeanWeighting::CostInverse,
            norm: SpreadNorm::L1
        }
    }
}

impl MeanWeighting {
    fn weight(&self, c: &Candidate) -> f64 {
        match self {
            MeanWeighting::Simple => 1.0,
            MeanWeighting::CostInverse => 1.0 / (c.cost + WEIGHT_EPS),
            MeanWeighting::CostAndPathLength => c.path_length as f64 / (c.cost + WEIGHT_EPS)
        }
    }
}

impl SgmTrimmedMeanComputer {
    pub fn new(params: TrimmedMeanParams, confidence: MatchConfidence) -> Self {
        Self { params, confidence }
    }
}

impl DisparityComputer for SgmTrimmedMeanComputer {
    fn name(&self) -> &'static str {
        "sgm_trimmed_mean"
    }

    fn accumulator(&self, max_cost: f64) -> Box<dyn DisparityAccumulator> {
        Box::new(TrimmedMeanAccumulator {
            params: self.params,
            confidence: self.confidence,
            max_cost,
            running: RunningBest::default()
        })
    }
}

impl TrimmedMeanAccumulator {
    /// Weighted mean displacement of a window.
    fn mean(&self, window: &[Candidate]) -> (f64, f64) {
        let mut sum_w = 0.0;
        let (mut sx, mut sy) = (0.0, 0.0);

        for c in window {
            let w = self.params.weighting.weight(c);
            sum_w += w;
            sx += w * c.dx as f64;
            sy += w * c.dy as f64;
        }

        (sx / sum_w, sy / sum_w)
    }

    /// Spread of a window around its weighted mean.
    fn spread(&self, window: &[Candidate]) -> f64 {
        let (mx, my) = self.mean(window);
        let n = window.len() as f64;
        let dist = |c: &Candidate| (mx - c.dx as f64).hypot(my - c.dy as f64);

        match self.params.norm {
            SpreadNorm::L1 => window.iter().map(dist).sum::<f64>() / (n * n),
            SpreadNorm::L2 => window.iter().map(|c| dist(c).powi(2)).sum::<f64>().sqrt() / (n * n)
        }
    }

    fn finalize(&self) -> Result<Disparity> {
        let best = match self.running.best {
            Some(b) => self.running.candidates[b],
            None => return Ok(Disparity::invalid())
        };

        let mut sorted = self.running.candidates.clone();
        sorted.sort_by_key(|c| (c.dx, c.dy));

        let (mut lo, mut hi) = (0, sorted.len());
        let mut cost = self.spread(&sorted[lo..hi]);

        while hi - lo > MIN_WINDOW {
            let drop_first = self.spread(&sorted[lo + 1..hi]);
            let drop_last = self.spread(&sorted[lo..hi - 1]);

            if drop_first <= drop_last && drop_first < cost {
                lo += 1;
                cost = drop_first;
            }
            else if drop_last < drop_first && drop_last < cost {
                hi -= 1;
                cost = drop_last;
            }
            else {
                break;
            }
        }

        let (mx, my) = self.mean(&sorted[lo..hi]);
        if !mx.is_finite() || !my.is_finite() || !cost.is_finite() {
            return Err(Error::NonFinite {
                quantity: "trimmed mean disparity",
                x: best.base.x,
                y: best.base.y
            });
        }

        Ok(Disparity::with_subpixel(
            mx,
            my,
            cost,
            self.running.confidence(self.confidence, self.max_cost)
        ))
    }
}

impl DisparityAccumulator for TrimmedMeanAccumulator {
    fn store_disparity(&mut self, candidate: Candidate) {
        self.running.push(candidate);
    }

    fn finalize_for_pixel(&mut self) -> Result<Disparity> {
        let res = self.finalize();
        self.running.reset();
        res
    }
}

// -----------------------------------------------------------------------------------------------
// TESTS
// -----------------------------------------------------------------------------------------------
