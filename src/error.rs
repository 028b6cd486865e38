//! # Error standards
//!
//! This module provides a standardised error enum and result type for this crate.

// -----------------------------------------------------------------------------------------------
// TYPES
// -----------------------------------------------------------------------------------------------

/// Standard result type used in the disparity crate.
pub type Result<T> = std::result::Result<T, Error>;

// -----------------------------------------------------------------------------------------------
// ENUMERATIONS
// -----------------------------------------------------------------------------------------------

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("Image has zero size ({width}x{height})")]
    ZeroSizeImage {
        width: usize,
        height: usize
    },

    #[error("Image dimensions differ: base is {base:?}, matched is {matched:?}")]
    DimensionMismatch {
        base: (usize, usize),
        matched: (usize, usize)
    },

    #[error("Invalid parameter `{name}`: {reason}")]
    InvalidParameter {
        name: &'static str,
        reason: String
    },

    #[error("Unknown {family} strategy `{id}`")]
    UnknownStrategy {
        family: &'static str,
        id: String
    },

    #[error("Non-finite {quantity} computed for pixel ({x}, {y})")]
    NonFinite {
        quantity: &'static str,
        x: usize,
        y: usize
    },

    #[error("Refiner `{0}` requires both the left and right disparity maps")]
    MissingMap(&'static str),

    #[error("Refiner `{0}` requires the stereo images")]
    MissingImages(&'static str),

    #[error("Cost aggregator used before `init` was called")]
    NotInitialised,

    #[error("Matching run was aborted")]
    Aborted,

    #[error("Failed to parse configuration")]
    Config(#[from] serde_json::Error),

    #[error("Failed to read configuration")]
    Io(#[from] std::io::Error)
}
