//! # Unaggregated scans
//!
//! Strategies that forward the raw matching cost of every candidate.

// -----------------------------------------------------------------------------------------------
// IMPORTS
// -----------------------------------------------------------------------------------------------

use super::{AggregationStrategy, MatchingContext};
use crate::computer::{Candidate, DisparityAccumulator};
use crate::error::*;
use crate::frame::Pixel;

// -----------------------------------------------------------------------------------------------
// DATA STRUCTURES
// -----------------------------------------------------------------------------------------------

/// Candidates along the epipolar line (or image row), raw costs.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlainScan;

/// Candidates over the whole two dimensional search window, ignoring epipolar geometry.
#[derive(Debug, Clone, Copy, Default)]
pub struct WholeImageScan;

// -----------------------------------------------------------------------------------------------
// IMPLEMENTATIONS
// -----------------------------------------------------------------------------------------------

impl AggregationStrategy for PlainScan {
    fn name(&self) -> &'static str {
        "plain"
    }

    fn aggregate_pixel(
        &self,
        ctx: &MatchingContext<'_>,
        base: Pixel,
        candidates: &[Pixel],
        acc: &mut dyn DisparityAccumulator
    ) -> Result<()> {
        forward_raw_costs(ctx, base, candidates, acc);
        Ok(())
    }
}

impl AggregationStrategy for WholeImageScan {
    fn name(&self) -> &'static str {
        "whole_image"
    }

    fn candidates(&self, ctx: &MatchingContext<'_>, base: Pixel) -> Vec<Pixel> {
        ctx.window_candidates(base)
    }

    fn aggregate_pixel(
        &self,
        ctx: &MatchingContext<'_>,
        base: Pixel,
        candidates: &[Pixel],
        acc: &mut dyn DisparityAccumulator
    ) -> Result<()> {
        forward_raw_costs(ctx, base, candidates, acc);
        Ok(())
    }
}

// -----------------------------------------------------------------------------------------------
// FUNCTIONS
// -----------------------------------------------------------------------------------------------

fn forward_raw_costs(
    ctx: &MatchingContext<'_>,
    base: Pixel,
    candidates: &[Pixel],
    acc: &mut dyn DisparityAccumulator
) {
    for m in candidates {
        acc.store_disparity(Candidate::new(base, *m, ctx.cost.cost(base, *m)));
    }
}
