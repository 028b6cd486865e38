//! # Winner-take-all
//!
//! The candidate with the lowest cost becomes the disparity, at integer precision.

// -----------------------------------------------------------------------------------------------
// IMPORTS
// -----------------------------------------------------------------------------------------------

use super::{Candidate, DisparityAccumulator, DisparityComputer, RunningBest};
use crate::confidence::MatchConfidence;
use crate::disparity::Disparity;
use crate::error::*;

// -----------------------------------------------------------------------------------------------
// DATA STRUCTURES
// -----------------------------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default)]
pub struct WtaComputer {
    pub confidence: MatchConfidence
}

struct WtaAccumulator {
    confidence: MatchConfidence,
    max_cost: f64,
    running: RunningBest
}

// -----------------------------------------------------------------------------------------------
// IMPLEMENTATIONS
// -----------------------------------------------------------------------------------------------

impl WtaComputer {
    pub fn new(confidence: MatchConfidence) -> Self {
        Self { confidence }
    }
}

impl DisparityComputer for WtaComputer {
    fn name(&self) -> &'static str {
        "wta"
    }

    fn accumulator(&self, max_cost: f64) -> Box<dyn DisparityAccumulator> {
        Box::new(WtaAccumulator {
            confidence: self.confidence,
            max_cost,
            running: RunningBest::default()
        })
    }
}

impl DisparityAccumulator for WtaAccumulator {
    fn store_disparity(&mut self, candidate: Candidate) {
        self.running.push(candidate);
    }

    fn finalize_for_pixel(&mut self) -> Result<Disparity> {
        let disp = match self.running.best {
            Some(b) => {
                let best = self.running.candidates[b];
                Disparity::new(
                    best.dx,
                    best.dy,
                    best.cost,
                    self.running.confidence(self.confidence, self.max_cost)
                )
            },
            None => Disparity::invalid()
        };

        self.running.reset();
        Ok(disp)
    }
}

// -----------------------------------------------------------------------------------------------
// TESTS
// -----------------------------------------------------------------------------------------------
