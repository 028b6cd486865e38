//! # Semi-global matching
//!
//! For each base pixel, the candidate costs are propagated along 16 paths converging on the
//! pixel from the image border, penalising disparity changes between consecutive path pixels.
//! The final costs of all paths are summed per candidate.

// -----------------------------------------------------------------------------------------------
// IMPORTS
// -----------------------------------------------------------------------------------------------

use serde::Deserialize;

use super::{AggregationStrategy, MatchingContext};
use crate::computer::{Candidate, DisparityAccumulator};
use crate::error::*;
use crate::frame::Pixel;
use crate::path::{Path, PathDirection};

// -----------------------------------------------------------------------------------------------
// DATA STRUCTURES
// -----------------------------------------------------------------------------------------------

#[derive(Deserialize, Debug, Clone, Copy, PartialEq)]
#[serde(default)]
pub struct SgmParams {
    /// `P1` as a fraction of the maximum matching cost, charged for a change of one step.
    pub low_penalty_coeff: f64,
    /// `P2` as a fraction of the maximum matching cost, charged for any larger change.
    pub high_penalty_coeff: f64,
    /// Attenuation of `P2` by the base image intensity step along the path, 0 for a flat `P2`.
    pub gradient_coeff: f64
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SgmAggregation {
    pub params: SgmParams
}

// -----------------------------------------------------------------------------------------------
// IMPLEMENTATIONS
// -----------------------------------------------------------------------------------------------

impl Default for SgmParams {
    fn default() -> Self {
        Self {
            low_penalty_coeff: 0.05,
            high_penalty_coeff: 0.5,
            gradient_coeff: 0.0
        }
    }
}

impl SgmAggregation {
    pub fn new(params: SgmParams) -> Self {
        Self { params }
    }

    /// Cost of candidate displacement `disp` at path pixel `q`, and whether the match was inside
    /// the matched image.
    fn raw_cost(ctx: &MatchingContext<'_>, q: Pixel, disp: (isize, isize)) -> (f64, bool) {
        match q.offset(-disp.0, -disp.1, ctx.width(), ctx.height()) {
            Some(m) => (ctx.cost.cost(q, m), true),
            None => (ctx.cost.max_cost(), false)
        }
    }

    /// Run one path and add its final costs to `totals`.
    fn accumulate_path(
        &self,
        ctx: &MatchingContext<'_>,
        direction: PathDirection,
        base: Pixel,
        disps: &[(isize, isize)],
        totals: &mut [f64],
        samples: &mut [usize]
    ) {
        let max_cost = ctx.cost.max_cost();
        let p1 = self.params.low_penalty_coeff * max_cost;
        let p2 = (self.params.high_penalty_coeff * max_cost).max(p1);

        let mut path = Path::init(direction, base, ctx.width(), ctx.height(), disps.len());
        let mut raw = vec![0.0; disps.len()];

        let fill_raw = |q: Pixel, raw: &mut [f64], samples: &mut [usize]| {
            for (d, disp) in disps.iter().enumerate() {
                let (c, inside) = Self::raw_cost(ctx, q, *disp);
                raw[d] = c;
                if inside {
                    samples[d] += 1;
                }
            }
        };

        fill_raw(path.current_pixel(), &mut raw, samples);
        path.current_costs_mut().copy_from_slice(&raw);

        while path.has_next_pixel() {
            path.next();
            let (q, prev_q) = (path.current_pixel(), path.previous_pixel());
            fill_raw(q, &mut raw, samples);

            let p2 = if self.params.gradient_coeff > 0.0 {
                let step = (ctx.base.get(q.x, q.y) - ctx.base.get(prev_q.x, prev_q.y)).abs() as f64;
                (p2 / (1.0 + self.params.gradient_coeff * step)).max(p1)
            }
            else {
                p2
            };

            let (prev, cur) = path.step_costs_mut();
            let min_prev = prev.iter().cloned().fold(f64::INFINITY, f64::min);
            let n = prev.len();

            // With p2 >= p1 the global minimum stands in for the jumps of more than one step
            for d in 0..n {
                let mut best = prev[d].min(min_prev + p2);
                if d > 0 {
                    best = best.min(prev[d - 1] + p1);
                }
                if d + 1 < n {
                    best = best.min(prev[d + 1] + p1);
                }
                cur[d] = raw[d] + best;
            }
        }

        for (t, c) in totals.iter_mut().zip(path.final_costs()) {
            *t += c;
        }
    }
}

impl AggregationStrategy for SgmAggregation {
    fn name(&self) -> &'static str {
        "sgm"
    }

    /// Totals sum one path cost per direction.
    fn cost_scale(&self) -> f64 {
        PathDirection::ALL.len() as f64
    }

    fn aggregate_pixel(
        &self,
        ctx: &MatchingContext<'_>,
        base: Pixel,
        candidates: &[Pixel],
        acc: &mut dyn DisparityAccumulator
    ) -> Result<()> {
        if candidates.is_empty() {
            return Ok(());
        }

        let disps: Vec<(isize, isize)> = candidates
            .iter()
            .map(|m| (base.x as isize - m.x as isize, base.y as isize - m.y as isize))
            .collect();
        let mut totals = vec![0.0; disps.len()];
        let mut samples = vec![0usize; disps.len()];

        for &direction in PathDirection::ALL.iter() {
            self.accumulate_path(ctx, direction, base, &disps, &mut totals, &mut samples);
        }

        if totals.iter().any(|t| !t.is_finite()) {
            return Err(Error::NonFinite {
                quantity: "aggregated cost",
                x: base.x,
                y: base.y
            });
        }

        for ((m, total), n) in candidates.iter().zip(&totals).zip(&samples) {
            acc.store_disparity(Candidate::new(base, *m, *total).with_path_length(*n));
        }

        Ok(())
    }
}

// -----------------------------------------------------------------------------------------------
// TESTS
// -----------------------------------------------------------------------------------------------
