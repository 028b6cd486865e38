//! # Interpolating winner-take-all
//!
//! Winner-take-all refined to sub-pixel precision. The winner's two neighbours along a common
//! axis are moved away from it in proportion to how much worse they match,
//! `D' = D_winner + (cost_neighbour / cost_winner) * (D_neighbour - D_winner)`, and a parabola
//! fitted through the three costs at those positions gives the sub-pixel vertex.

// -----------------------------------------------------------------------------------------------
// IMPORTS
// -----------------------------------------------------------------------------------------------

use nalgebra::{Matrix3, Vector3};

use super::{Candidate, DisparityAccumulator, DisparityComputer, RunningBest};
use crate::confidence::MatchConfidence;
use crate::disparity::Disparity;
use crate::error::*;

// -----------------------------------------------------------------------------------------------
// CONSTANTS
// -----------------------------------------------------------------------------------------------

/// Parabolas flatter than this have no usable vertex.
const MIN_CURVATURE: f64 = 1e-12;

/// Largest vertex offset per pixel of axis step, keeps the integer disparity on the winner.
const MAX_OFFSET: f64 = 0.5 - 1e-6;

/// Axes searched for a neighbour pair, horizontal first.
const AXES: [(i32, i32); 4] = [(1, 0), (0, 1), (1, 1), (1, -1)];

// -----------------------------------------------------------------------------------------------
// DATA STRUCTURES
// -----------------------------------------------------------------------------------------------

/// Interpolates along the first axis on which both neighbours of the winner were candidates.
/// Winners without such a pair, and exact matches, keep their integer disparity.
#[derive(Debug, Clone, Copy, Default)]
pub struct InterpolatingComputer {
    pub confidence: MatchConfidence
}

struct InterpolatingAccumulator {
    confidence: MatchConfidence,
    max_cost: f64,
    running: RunningBest
}

// -----------------------------------------------------------------------------------------------
// IMPLEMENTATIONS
// -----------------------------------------------------------------------------------------------

impl InterpolatingComputer {
    pub fn new(confidence: MatchConfidence) -> Self {
        Self { confidence }
    }
}

impl DisparityComputer for InterpolatingComputer {
    fn name(&self) -> &'static str {
        "interpolating"
    }

    fn accumulator(&self, max_cost: f64) -> Box<dyn DisparityAccumulator> {
        Box::new(InterpolatingAccumulator {
            confidence: self.confidence,
            max_cost,
            running: RunningBest::default()
        })
    }
}

impl InterpolatingAccumulator {
    fn finalize(&self) -> Result<Disparity> {
        let best = match self.running.best {
            Some(b) => self.running.candidates[b],
            None => return Ok(Disparity::invalid())
        };

        let confidence = self.running.confidence(self.confidence, self.max_cost);
        let integer = Disparity::new(best.dx, best.dy, best.cost, confidence);

        // An exact match has no cost slope to interpolate
        if best.cost == 0.0 {
            return Ok(integer);
        }

        let (prev, next, axis) = match neighbours(&self.running.candidates, &best) {
            Some(n) => n,
            None => return Ok(integer)
        };

        let (sx, sy) = match subpixel_offset(&prev, &best, &next, axis)? {
            Some(offset) => offset,
            None => return Ok(integer)
        };

        let (sub_dx, sub_dy) = (best.dx as f64 + sx, best.dy as f64 + sy);
        if !sub_dx.is_finite() || !sub_dy.is_finite() {
            return Err(Error::NonFinite {
                quantity: "sub-pixel disparity",
                x: best.base.x,
                y: best.base.y
            });
        }

        Ok(Disparity::with_subpixel(sub_dx, sub_dy, best.cost, confidence))
    }
}

impl DisparityAccumulator for InterpolatingAccumulator {
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
// FUNCTIONS
// -----------------------------------------------------------------------------------------------

/// Candidates one axis step below and above the winner, with the axis.
fn neighbours(cands: &[Candidate], best: &Candidate) -> Option<(Candidate, Candidate, (i32, i32))> {
    let at = |dx: i32, dy: i32| cands.iter().find(|c| c.dx == dx && c.dy == dy).copied();

    AXES.iter().find_map(|&(sx, sy)| {
        let prev = at(best.dx - sx, best.dy - sy)?;
        let next = at(best.dx + sx, best.dy + sy)?;
        Some((prev, next, (sx, sy)))
    })
}

/// Offset of the cost parabola vertex from the winner, as `(dx, dy)`.
///
/// The neighbours sit at `-cost_prev / cost_best` and `cost_next / cost_best` axis steps from
/// the winner, and `cost = a t^2 + b t + c` is fitted through the three by least squares.
/// Returns `None` when the fit is not convex.
fn subpixel_offset(
    prev: &Candidate,
    best: &Candidate,
    next: &Candidate,
    axis: (i32, i32)
) -> Result<Option<(f64, f64)>> {
    let step = (axis.0 as f64).hypot(axis.1 as f64);
    let t0 = -prev.cost / best.cost * step;
    let t2 = next.cost / best.cost * step;

    if !t0.is_finite() || !t2.is_finite() {
        return Err(Error::NonFinite {
            quantity: "interpolation weight",
            x: best.base.x,
            y: best.base.y
        });
    }

    let a = Matrix3::new(
        t0 * t0, t0, 1.0,
        0.0, 0.0, 1.0,
        t2 * t2, t2, 1.0
    );
    let b = Vector3::new(prev.cost, best.cost, next.cost);

    let coeffs = match a.svd(true, true).solve(&b, 1e-12) {
        Ok(c) => c,
        Err(_) => return Ok(None)
    };
    if coeffs[0] <= MIN_CURVATURE {
        return Ok(None);
    }

    let limit = MAX_OFFSET * step;
    let vertex = (-coeffs[1] / (2.0 * coeffs[0])).max(-limit).min(limit);

    Ok(Some((vertex * axis.0 as f64 / step, vertex * axis.1 as f64 / step)))
}

// -----------------------------------------------------------------------------------------------
// TESTS
// -----------------------------------------------------------------------------------------------
