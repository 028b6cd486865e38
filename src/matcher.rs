//! # Stereo matcher
//!
//! Full matching pipeline: left-base and right-base matching runs followed by the refinement
//! chain, all assembled from a [`MatcherConfig`].

// -----------------------------------------------------------------------------------------------
// IMPORTS
// -----------------------------------------------------------------------------------------------

use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Instant;

use image::GrayImage;
use log::info;

use crate::aggregator::CostAggregator;
use crate::config::MatcherConfig;
use crate::disparity::{DisparityAlgorithm, DisparityMap, StereoMaps};
use crate::error::*;
use crate::frame::StereoFrame;
use crate::refine::RefinementChain;

// -----------------------------------------------------------------------------------------------
// DATA STRUCTURES
// -----------------------------------------------------------------------------------------------

pub struct StereoMatcher {
    config: MatcherConfig,
    refinement: RefinementChain,
    abort: Option<Arc<AtomicBool>>
}

// -----------------------------------------------------------------------------------------------
// IMPLEMENTATIONS
// -----------------------------------------------------------------------------------------------

impl StereoMatcher {
    /// Create a matcher, validating the configuration.
    pub fn new(config: MatcherConfig) -> Result<Self> {
        config.validate()?;

        Ok(Self {
            refinement: config.refinement_chain(),
            config,
            abort: None
        })
    }

    /// Flag that cancels a running match when set.
    pub fn with_abort_flag(mut self, abort: Arc<AtomicBool>) -> Self {
        self.abort = Some(abort);
        self
    }

    pub fn config(&self) -> &MatcherConfig {
        &self.config
    }

    /// Match a single direction with a freshly built set of strategies.
    pub fn match_from(&self, frame: &StereoFrame, is_left_image_base: bool) -> Result<DisparityMap> {
        let mut aggregator = CostAggregator::new(
            frame.base(is_left_image_base),
            frame.matched(is_left_image_base),
            is_left_image_base,
            self.config.cost.build(),
            self.config.disparity.build(self.config.confidence),
            self.config.aggregation.build()
        )
        .with_fundamental(self.config.geometry.fundamental())
        .with_window(self.config.window)
        .with_failure_policy(self.config.numeric_failure);

        if let Some(abort) = &self.abort {
            aggregator = aggregator.with_abort_flag(abort.clone());
        }

        aggregator.init()?;

        if self.config.geometry.is_rectified() {
            aggregator.compute_matching_costs_rectified()
        }
        else {
            aggregator.compute_matching_costs()
        }
    }

    /// Compute the left-base map, the right-base map if configured, and refine them.
    pub fn compute_pair(&mut self, frame: &StereoFrame) -> Result<StereoMaps> {
        let t0 = Instant::now();

        let mut maps = StereoMaps {
            left: Some(self.match_from(frame, true)?),
            right: if self.config.compute_right {
                Some(self.match_from(frame, false)?)
            }
            else {
                None
            }
        };

        self.refinement.run(&mut maps, Some(frame))?;

        info!(
            "Stereo pair matched in {:?}, valid pixels left/right: {:?}/{:?}",
            t0.elapsed(),
            maps.left.as_ref().map(DisparityMap::valid_count),
            maps.right.as_ref().map(DisparityMap::valid_count)
        );

        Ok(maps)
    }

    /// Match 8-bit images, applying the configured pre-filter.
    pub fn compute_luma(&mut self, left: &GrayImage, right: &GrayImage) -> Result<StereoMaps> {
        let frame = StereoFrame::from_luma(left, right, self.config.prefilter_sigma)?;
        self.compute_pair(&frame)
    }
}

impl DisparityAlgorithm for StereoMatcher {
    /// Compute the refined left-base disparity map of the given frame.
    fn compute(&mut self, frame: &StereoFrame) -> Result<DisparityMap> {
        self.compute_pair(frame)?
            .left
            .ok_or(Error::MissingMap("stereo matcher"))
    }
}

// -----------------------------------------------------------------------------------------------
// TESTS
// -----------------------------------------------------------------------------------------------
