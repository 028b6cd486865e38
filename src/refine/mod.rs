//! # Disparity refinement
//!
//! Post-processing passes over finished disparity maps. Each refiner is independent of the
//! others; the chain runs them in the configured order.

// -----------------------------------------------------------------------------------------------
// MODULES
// -----------------------------------------------------------------------------------------------

pub mod anisotropic;
pub mod cross_check;
pub mod median;
pub mod peak_removal;

// -----------------------------------------------------------------------------------------------
// IMPORTS
// -----------------------------------------------------------------------------------------------

use std::time::Instant;

use log::debug;

use crate::disparity::{DisparityMap, StereoMaps};
use crate::error::*;
use crate::frame::StereoFrame;

pub use anisotropic::{AnisotropicParams, AnisotropicRefiner, DiffusionKernel, DiffusionMode, Neighbourhood};
pub use cross_check::{CrossCheckParams, CrossCheckRefiner};
pub use median::MedianFilterRefiner;
pub use peak_removal::{PeakRemovalParams, PeakRemovalRefiner};

// -----------------------------------------------------------------------------------------------
// CONSTANTS
// -----------------------------------------------------------------------------------------------

/// Offsets of the 4-neighbourhood.
pub(crate) const NEIGHBOURS_4: [(isize, isize); 4] = [(1, 0), (-1, 0), (0, 1), (0, -1)];

/// Offsets of the 8-neighbourhood.
pub(crate) const NEIGHBOURS_8: [(isize, isize); 8] = [
    (1, 0), (-1, 0), (0, 1), (0, -1),
    (1, 1), (-1, 1), (1, -1), (-1, -1)
];

// -----------------------------------------------------------------------------------------------
// DATA STRUCTURES
// -----------------------------------------------------------------------------------------------

/// Ordered sequence of refiners.
#[derive(Default)]
pub struct RefinementChain {
    refiners: Vec<Box<dyn DisparityRefiner>>
}

// -----------------------------------------------------------------------------------------------
// TRAITS
// -----------------------------------------------------------------------------------------------

pub trait DisparityRefiner: Send + Sync {
    /// Stable identifier of the refiner.
    fn name(&self) -> &'static str;

    /// Refine the maps in place. Either map may be absent; `frame` holds the images the maps were
    /// computed from when they are available.
    fn refine(&self, maps: &mut StereoMaps, frame: Option<&StereoFrame>) -> Result<()>;
}

// -----------------------------------------------------------------------------------------------
// IMPLEMENTATIONS
// -----------------------------------------------------------------------------------------------

impl RefinementChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, refiner: Box<dyn DisparityRefiner>) {
        self.refiners.push(refiner);
    }

    pub fn with(mut self, refiner: Box<dyn DisparityRefiner>) -> Self {
        self.push(refiner);
        self
    }

    pub fn len(&self) -> usize {
        self.refiners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.refiners.is_empty()
    }

    pub fn run(&self, maps: &mut StereoMaps, frame: Option<&StereoFrame>) -> Result<()> {
        for refiner in &self.refiners {
            let t0 = Instant::now();
            refiner.refine(maps, frame)?;

            debug!(
                "Refiner {} finished in {:?}, valid pixels left/right: {:?}/{:?}",
                refiner.name(),
                t0.elapsed(),
                maps.left.as_ref().map(DisparityMap::valid_count),
                maps.right.as_ref().map(DisparityMap::valid_count)
            );
        }

        for map in maps.left.iter_mut().chain(maps.right.iter_mut()) {
            map.update_statistics();
        }

        Ok(())
    }
}

// -----------------------------------------------------------------------------------------------
// FUNCTIONS
// -----------------------------------------------------------------------------------------------

/// Apply `f` to the left and right maps that are present.
pub(crate) fn for_each_map<F>(maps: &mut StereoMaps, mut f: F) -> Result<()>
where
    F: FnMut(&mut DisparityMap, bool) -> Result<()>
{
    if let Some(left) = maps.left.as_mut() {
        f(left, true)?;
    }
    if let Some(right) = maps.right.as_mut() {
        f(right, false)?;
    }
    Ok(())
}
