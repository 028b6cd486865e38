//! # Matcher configuration
//!
//! Parameter tree of a matching run, loadable from JSON. Every strategy family is an internally
//! tagged enum keyed by the strategy's string id, for example
//!
//! ```json
//! {
//!     "cost": { "type": "census", "half_width": 3, "half_height": 3 },
//!     "aggregation": { "type": "sgm", "low_penalty_coeff": 0.05 },
//!     "disparity": { "type": "wta" },
//!     "refinement": [{ "type": "cross_check" }, { "type": "median" }],
//!     "window": { "min_dx": 0, "max_dx": 64, "min_dy": 0, "max_dy": 0 }
//! }
//! ```
//!
//! The same ids are accepted by the `*_from_id` factories, which build a strategy with its
//! default parameters.

// -----------------------------------------------------------------------------------------------
// IMPORTS
// -----------------------------------------------------------------------------------------------

use std::fs;
use std::path::Path;

use log::debug;
use nalgebra::Matrix3;
use serde::Deserialize;

use crate::aggregator::{
    AggregationStrategy, NumericFailurePolicy, PlainScan, SearchWindow, SgmAggregation, SgmParams,
    WholeImageScan
};
use crate::computer::{
    DisparityComputer, InterpolatingComputer, SgmTrimmedMeanComputer, TrimmedMeanParams,
    WtaComputer
};
use crate::confidence::MatchConfidence;
use crate::cost::{Census, CensusParams, MatchingCostComputer, Rank, RankParams};
use crate::epiline::rectified_fundamental;
use crate::error::*;
use crate::refine::{
    AnisotropicParams, AnisotropicRefiner, CrossCheckParams, CrossCheckRefiner, DisparityRefiner,
    MedianFilterRefiner, PeakRemovalParams, PeakRemovalRefiner, RefinementChain
};

// -----------------------------------------------------------------------------------------------
// ENUMERATIONS
// -----------------------------------------------------------------------------------------------

/// Epipolar geometry of the image pair.
#[derive(Deserialize, Debug, Clone, Copy, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Geometry {
    /// Epipolar lines are image rows.
    Rectified,
    /// Fundamental matrix in row-major order, `x_right^T F x_left = 0`.
    Fundamental { matrix: [[f64; 3]; 3] }
}

#[derive(Deserialize, Debug, Clone, Copy, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CostConfig {
    Census(CensusParams),
    Rank(RankParams)
}

#[derive(Deserialize, Debug, Clone, Copy, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AggregationConfig {
    Plain,
    WholeImage,
    Sgm(SgmParams)
}

#[derive(Deserialize, Debug, Clone, Copy, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ComputerConfig {
    Wta,
    Interpolating,
    SgmTrimmedMean(TrimmedMeanParams)
}

#[derive(Deserialize, Debug, Clone, Copy, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RefinerConfig {
    CrossCheck(CrossCheckParams),
    PeakRemoval(PeakRemovalParams),
    Median,
    Anisotropic(AnisotropicParams)
}

// -----------------------------------------------------------------------------------------------
// DATA STRUCTURES
// -----------------------------------------------------------------------------------------------

/// Complete description of a matching run.
#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct MatcherConfig {
    pub geometry: Geometry,
    pub cost: CostConfig,
    pub aggregation: AggregationConfig,
    pub disparity: ComputerConfig,
    /// Refiners, run in order after both maps are computed.
    pub refinement: Vec<RefinerConfig>,
    /// Search window, stated for the left image as base.
    pub window: SearchWindow,
    pub confidence: MatchConfidence,
    /// Also compute the map with the right image as base.
    pub compute_right: bool,
    pub numeric_failure: NumericFailurePolicy,
    /// Standard deviation of a Gaussian applied to 8-bit inputs before matching.
    pub prefilter_sigma: Option<f32>
}

// -----------------------------------------------------------------------------------------------
// IMPLEMENTATIONS
// -----------------------------------------------------------------------------------------------

impl Default for Geometry {
    fn default() -> Self {
        Geometry::Rectified
    }
}

impl Geometry {
    pub fn is_rectified(&self) -> bool {
        matches!(self, Geometry::Rectified)
    }

    pub fn fundamental(&self) -> Matrix3<f64> {
        match self {
            Geometry::Rectified => rectified_fundamental(),
            Geometry::Fundamental { matrix } => Matrix3::from_fn(|r, c| matrix[r][c])
        }
    }

    pub fn from_fundamental(f: &Matrix3<f64>) -> Self {
        let mut matrix = [[0.0; 3]; 3];
        for (r, row) in matrix.iter_mut().enumerate() {
            for (c, v) in row.iter_mut().enumerate() {
                *v = f[(r, c)];
            }
        }
        Geometry::Fundamental { matrix }
    }
}

impl Default for CostConfig {
    fn default() -> Self {
        CostConfig::Census(CensusParams::default())
    }
}

impl CostConfig {
    pub fn build(&self) -> Box<dyn MatchingCostComputer> {
        match self {
            CostConfig::Census(p) => Box::new(Census::new(*p)),
            CostConfig::Rank(p) => Box::new(Rank::new(*p))
        }
    }
}

impl Default for AggregationConfig {
    fn default() -> Self {
        AggregationConfig::Sgm(SgmParams::default())
    }
}

impl AggregationConfig {
    pub fn build(&self) -> Box<dyn AggregationStrategy> {
        match self {
            AggregationConfig::Plain => Box::new(PlainScan),
            AggregationConfig::WholeImage => Box::new(WholeImageScan),
            AggregationConfig::Sgm(p) => Box::new(SgmAggregation::new(*p))
        }
    }
}

impl Default for ComputerConfig {
    fn default() -> Self {
        ComputerConfig::Wta
    }
}

impl ComputerConfig {
    pub fn build(&self, confidence: MatchConfidence) -> Box<dyn DisparityComputer> {
        match self {
            ComputerConfig::Wta => Box::new(WtaComputer::new(confidence)),
            ComputerConfig::Interpolating => Box::new(InterpolatingComputer::new(confidence)),
            ComputerConfig::SgmTrimmedMean(p) => {
                Box::new(SgmTrimmedMeanComputer::new(*p, confidence))
            }
        }
    }
}

impl RefinerConfig {
    pub fn build(&self) -> Box<dyn DisparityRefiner> {
        match self {
            RefinerConfig::CrossCheck(p) => Box::new(CrossCheckRefiner::new(*p)),
            RefinerConfig::PeakRemoval(p) => Box::new(PeakRemovalRefiner::new(*p)),
            RefinerConfig::Median => Box::new(MedianFilterRefiner),
            RefinerConfig::Anisotropic(p) => Box::new(AnisotropicRefiner::new(*p))
        }
    }

    fn validate(&self) -> Result<()> {
        match self {
            RefinerConfig::CrossCheck(p) => check_non_negative("max_distance", p.max_distance),
            RefinerConfig::PeakRemoval(p) => check_non_negative("max_difference", p.max_difference),
            RefinerConfig::Median => Ok(()),
            RefinerConfig::Anisotropic(p) => p.validate()
        }
    }
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            geometry: Geometry::default(),
            cost: CostConfig::default(),
            aggregation: AggregationConfig::default(),
            disparity: ComputerConfig::default(),
            refinement: Vec::new(),
            window: SearchWindow::default(),
            confidence: MatchConfidence::default(),
            compute_right: true,
            numeric_failure: NumericFailurePolicy::default(),
            prefilter_sigma: None
        }
    }
}

impl MatcherConfig {
    /// Parse and validate a configuration.
    pub fn from_json_str(s: &str) -> Result<Self> {
        let config: MatcherConfig = serde_json::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn with_geometry(mut self, geometry: Geometry) -> Self {
        self.geometry = geometry;
        self
    }

    pub fn with_cost(mut self, cost: CostConfig) -> Self {
        self.cost = cost;
        self
    }

    pub fn with_aggregation(mut self, aggregation: AggregationConfig) -> Self {
        self.aggregation = aggregation;
        self
    }

    pub fn with_disparity(mut self, disparity: ComputerConfig) -> Self {
        self.disparity = disparity;
        self
    }

    pub fn with_refiner(mut self, refiner: RefinerConfig) -> Self {
        self.refinement.push(refiner);
        self
    }

    pub fn with_window(mut self, window: SearchWindow) -> Self {
        self.window = window;
        self
    }

    pub fn with_confidence(mut self, confidence: MatchConfidence) -> Self {
        self.confidence = confidence;
        self
    }

    pub fn with_compute_right(mut self, compute_right: bool) -> Self {
        self.compute_right = compute_right;
        self
    }

    pub fn with_numeric_failure(mut self, policy: NumericFailurePolicy) -> Self {
        self.numeric_failure = policy;
        self
    }

    pub fn with_prefilter_sigma(mut self, sigma: f32) -> Self {
        self.prefilter_sigma = Some(sigma);
        self
    }

    /// Range check every parameter.
    ///
    /// An empty search window is not an error, it only makes every pixel invalid.
    pub fn validate(&self) -> Result<()> {
        if let Geometry::Fundamental { matrix } = &self.geometry {
            if matrix.iter().flatten().any(|v| !v.is_finite()) {
                return Err(Error::InvalidParameter {
                    name: "geometry",
                    reason: "fundamental matrix has non-finite entries".into()
                });
            }
        }

        if let AggregationConfig::Sgm(p) = &self.aggregation {
            check_non_negative("low_penalty_coeff", p.low_penalty_coeff)?;
            check_non_negative("high_penalty_coeff", p.high_penalty_coeff)?;
            check_non_negative("gradient_coeff", p.gradient_coeff)?;
        }

        if let Some(sigma) = self.prefilter_sigma {
            if !(sigma > 0.0) || !sigma.is_finite() {
                return Err(Error::InvalidParameter {
                    name: "prefilter_sigma",
                    reason: format!("must be a positive number, got {}", sigma)
                });
            }
        }

        for refiner in &self.refinement {
            refiner.validate()?;
        }

        let needs_both = self
            .refinement
            .iter()
            .any(|r| matches!(r, RefinerConfig::CrossCheck(_)));
        if needs_both && !self.compute_right {
            return Err(Error::InvalidParameter {
                name: "refinement",
                reason: "cross_check needs compute_right to be enabled".into()
            });
        }

        Ok(())
    }

    pub fn refinement_chain(&self) -> RefinementChain {
        self.refinement
            .iter()
            .fold(RefinementChain::new(), |chain, r| chain.with(r.build()))
    }
}

// -----------------------------------------------------------------------------------------------
// FUNCTIONS
// -----------------------------------------------------------------------------------------------

/// Read, parse and validate a JSON configuration file.
pub fn load_config(path: &Path) -> Result<MatcherConfig> {
    let contents = fs::read_to_string(path)?;
    let config = MatcherConfig::from_json_str(&contents)?;
    debug!("Loaded matcher configuration from {}", path.display());
    Ok(config)
}

pub fn cost_from_id(id: &str) -> Result<Box<dyn MatchingCostComputer>> {
    let config = match id {
        "census" => CostConfig::Census(CensusParams::default()),
        "rank" => CostConfig::Rank(RankParams::default()),
        _ => return Err(unknown("cost", id))
    };
    Ok(config.build())
}

pub fn aggregation_from_id(id: &str) -> Result<Box<dyn AggregationStrategy>> {
    let config = match id {
        "plain" => AggregationConfig::Plain,
        "whole_image" => AggregationConfig::WholeImage,
        "sgm" => AggregationConfig::Sgm(SgmParams::default()),
        _ => return Err(unknown("aggregation", id))
    };
    Ok(config.build())
}

pub fn computer_from_id(id: &str, confidence: MatchConfidence) -> Result<Box<dyn DisparityComputer>> {
    let config = match id {
        "wta" => ComputerConfig::Wta,
        "interpolating" => ComputerConfig::Interpolating,
        "sgm_trimmed_mean" => ComputerConfig::SgmTrimmedMean(TrimmedMeanParams::default()),
        _ => return Err(unknown("disparity", id))
    };
    Ok(config.build(confidence))
}

pub fn refiner_from_id(id: &str) -> Result<Box<dyn DisparityRefiner>> {
    let config = match id {
        "cross_check" => RefinerConfig::CrossCheck(CrossCheckParams::default()),
        "peak_removal" => RefinerConfig::PeakRemoval(PeakRemovalParams::default()),
        "median" => RefinerConfig::Median,
        "anisotropic" => RefinerConfig::Anisotropic(AnisotropicParams::default()),
        _ => return Err(unknown("refinement", id))
    };
    Ok(config.build())
}

fn unknown(family: &'static str, id: &str) -> Error {
    Error::UnknownStrategy { family, id: id.to_string() }
}

fn check_non_negative(name: &'static str, v: f64) -> Result<()> {
    if v >= 0.0 && v.is_finite() {
        Ok(())
    }
    else {
        Err(Error::InvalidParameter {
            name,
            reason: format!("must be a finite non-negative number, got {}", v)
        })
    }
}

// -----------------------------------------------------------------------------------------------
// TESTS
// -----------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::computer::{MeanWeighting, SpreadNorm};

    #[test]
    fn empty_object_gives_defaults() {
        let config = MatcherConfig::from_json_str("{}").unwrap();
        assert_eq!(config, MatcherConfig::default());
        assert!(config.geometry.is_rectified());
        assert!(config.compute_right);
    }

    #[test]
    fn strategies_are_selected_by_id() {
        let config = MatcherConfig::from_json_str(r#"{
            "geometry": { "type": "fundamental", "matrix": [[0, 0, 0], [0, 0, -1], [0, 1, 0]] },
            "cost": { "type": "rank", "corr_half_width": 3 },
            "aggregation": { "type": "whole_image" },
            "disparity": { "type": "sgm_trimmed_mean", "weighting": "simple", "norm": "l2" },
            "refinement": [
                { "type": "cross_check", "max_distance": 2.0 },
                { "type": "median" },
                { "type": "anisotropic", "mode": "smoothing", "neighbourhood": "eight", "step": 0.1 }
            ],
            "window": { "min_dx": -4, "max_dx": 12 },
            "confidence": "two_against_max",
            "numeric_failure": "abort",
            "prefilter_sigma": 0.8
        }"#).unwrap();

        assert_eq!(config.geometry.fundamental(), rectified_fundamental());
        assert_eq!(config.cost, CostConfig::Rank(RankParams { corr_half_width: 3, ..Default::default() }));
        assert_eq!(config.aggregation, AggregationConfig::WholeImage);
        assert_eq!(
            config.disparity,
            ComputerConfig::SgmTrimmedMean(TrimmedMeanParams {
                weighting: MeanWeighting::Simple,
                norm: SpreadNorm::L2
            })
        );
        assert_eq!(config.refinement.len(), 3);
        assert_eq!(config.window, SearchWindow { min_dx: -4, max_dx: 12, min_dy: 0, max_dy: 0 });
        assert_eq!(config.confidence, MatchConfidence::TwoAgainstMax);
        assert_eq!(config.numeric_failure, NumericFailurePolicy::Abort);

        let chain = config.refinement_chain();
        assert_eq!(chain.len(), 3);
    }

    #[test]
    fn unknown_tag_is_a_parse_error() {
        let err = MatcherConfig::from_json_str(r#"{ "cost": { "type": "sad" } }"#).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn factories_know_every_id() {
        for id in &["census", "rank"] {
            assert_eq!(cost_from_id(id).unwrap().name(), *id);
        }
        for id in &["plain", "whole_image", "sgm"] {
            assert_eq!(aggregation_from_id(id).unwrap().name(), *id);
        }
        for id in &["wta", "interpolating", "sgm_trimmed_mean"] {
            assert_eq!(computer_from_id(id, MatchConfidence::default()).unwrap().name(), *id);
        }
        for id in &["cross_check", "peak_removal", "median", "anisotropic"] {
            assert_eq!(refiner_from_id(id).unwrap().name(), *id);
        }

        assert!(matches!(
            aggregation_from_id("graph_cut"),
            Err(Error::UnknownStrategy { family: "aggregation", .. })
        ));
    }

    #[test]
    fn validation_rejects_bad_values() {
        let bad_sgm = MatcherConfig::default().with_aggregation(AggregationConfig::Sgm(SgmParams {
            low_penalty_coeff: -1.0,
            ..Default::default()
        }));
        assert!(bad_sgm.validate().is_err());

        let lonely_cross_check = MatcherConfig::default()
            .with_compute_right(false)
            .with_refiner(RefinerConfig::CrossCheck(CrossCheckParams::default()));
        assert!(lonely_cross_check.validate().is_err());

        let bad_sigma = MatcherConfig::default().with_prefilter_sigma(0.0);
        assert!(bad_sigma.validate().is_err());

        let mut f = [[0.0; 3]; 3];
        f[1][2] = f64::NAN;
        let bad_geometry = MatcherConfig::default()
            .with_geometry(Geometry::Fundamental { matrix: f });
        assert!(bad_geometry.validate().is_err());
    }

    #[test]
    fn empty_window_is_allowed() {
        let config = MatcherConfig::default().with_window(SearchWindow::horizontal(5, 2));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let err = load_config(Path::new("/nonexistent/matcher.json")).unwrap_err();
        assert!(matches!(err, Error::Io(_)));
    }
}
