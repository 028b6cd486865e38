//! # Disparity Computation
//!
//! This crate provides dense disparity map computation for stereo computer vision: Census and
//! Rank matching costs, semi-global matching over 16 path directions, sub-pixel disparity
//! estimation and a chain of map refinement filters.
//!
//! The usual entry point is [`matcher::StereoMatcher`], built from a [`config::MatcherConfig`].

// -----------------------------------------------------------------------------------------------
// MODULES
// -----------------------------------------------------------------------------------------------

pub mod aggregator;
pub mod computer;
pub mod confidence;
pub mod config;
pub mod cost;
mod disparity;
pub mod epiline;
mod error;
pub mod frame;
pub mod matcher;
pub mod path;
pub mod refine;

// -----------------------------------------------------------------------------------------------
// EXPORTS
// -----------------------------------------------------------------------------------------------

pub use disparity::{
    Disparity, DisparityAlgorithm, DisparityFlags, DisparityMap, DisparityMapRecord,
    DisparityRecord, StereoMaps
};
pub use error::{Error, Result};

pub mod prelude {
    pub use crate::aggregator::{CostAggregator, NumericFailurePolicy, SearchWindow};
    pub use crate::config::{
        load_config, AggregationConfig, ComputerConfig, CostConfig, Geometry, MatcherConfig,
        RefinerConfig
    };
    pub use crate::confidence::MatchConfidence;
    pub use crate::disparity::{Disparity, DisparityAlgorithm, DisparityFlags, DisparityMap, StereoMaps};
    pub use crate::frame::{GrayFloatImage, Pixel, StereoFrame};
    pub use crate::matcher::StereoMatcher;
}
