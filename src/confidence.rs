//! # Match confidence
//!
//! Scores how clearly the best candidate of a pixel beats the runner-up.

// -----------------------------------------------------------------------------------------------
// IMPORTS
// -----------------------------------------------------------------------------------------------

use serde::Deserialize;

// -----------------------------------------------------------------------------------------------
// CONSTANTS
// -----------------------------------------------------------------------------------------------

/// Costs closer than this are considered equal.
const COST_EPS: f64 = 1e-6;

// -----------------------------------------------------------------------------------------------
// ENUMERATIONS
// -----------------------------------------------------------------------------------------------

/// Confidence formula, comparing the best cost `c1` and the second best cost `c2`.
#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MatchConfidence {
    /// `(c2 - c1) / max_cost`
    TwoAgainstMax,
    /// `(c2 - c1) / (c2 + c1)`
    TwoAgainstTwo,
    /// `(c2 - c1) / sum(costs)`
    TwoAgainstAverage
}

// -----------------------------------------------------------------------------------------------
// IMPLEMENTATIONS
// -----------------------------------------------------------------------------------------------

impl Default for MatchConfidence {
    fn default() -> Self {
        MatchConfidence::TwoAgainstTwo
    }
}

impl MatchConfidence {
    /// Confidence in `[0, 1]` of the candidate at `best` against the one at `second`.
    ///
    /// `max_cost` bounds the costs being compared, so aggregated costs need the aggregated
    /// bound. A pixel with fewer than two candidates has nothing to be confused with and
    /// scores 1.
    pub fn compute(&self, costs: &[f64], best: usize, second: usize, max_cost: f64) -> f64 {
        if costs.len() < 2 {
            return 1.0;
        }

        let c1 = costs[best];
        let c2 = costs[second];
        let gap = c2 - c1;

        let conf = match self {
            MatchConfidence::TwoAgainstMax => {
                if max_cost > 0.0 { gap / max_cost } else { 0.0 }
            },
            MatchConfidence::TwoAgainstTwo => {
                if gap.abs() < COST_EPS { 0.0 } else { gap / (c2 + c1) }
            },
            MatchConfidence::TwoAgainstAverage => {
                let sum: f64 = costs.iter().sum();
                if sum > 0.0 { gap / sum } else { 0.0 }
            }
        };

        if conf.is_finite() { conf.max(0.0).min(1.0) } else { 0.0 }
    }
}

// -----------------------------------------------------------------------------------------------
// TESTS
// -----------------------------------------------------------------------------------------------
