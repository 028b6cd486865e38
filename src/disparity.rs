//! # General disparity objects
//!
//! This module provides the per-pixel disparity record, the disparity map container, their flat
//! serialisable form, and the generic disparity algorithm trait.

// -----------------------------------------------------------------------------------------------
// IMPORTS
// -----------------------------------------------------------------------------------------------

use std::fmt;
use std::str::FromStr;

use image::GrayImage;
use serde::{Deserialize, Serialize};

use crate::error::*;
use crate::frame::{Pixel, StereoFrame};

// -----------------------------------------------------------------------------------------------
// CONSTANTS
// -----------------------------------------------------------------------------------------------

const FLAG_NAMES: [(DisparityFlags, &str); 3] = [
    (DisparityFlags::VALID, "Valid"),
    (DisparityFlags::INVALID, "Invalid"),
    (DisparityFlags::OCCLUDED, "Occluded")
];

// -----------------------------------------------------------------------------------------------
// DATA STRUCTURES
// -----------------------------------------------------------------------------------------------

/// Bitset of disparity states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct DisparityFlags(u8);

/// Disparity of a single base image pixel.
///
/// The displacement follows `dx = base_x - matched_x` and `dy = base_y - matched_y`. The
/// sub-pixel components hold the full displacement, so `dx == sub_dx.round()` for a freshly
/// computed disparity. Displacements are meaningless unless the disparity is valid.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Disparity {
    pub dx: i32,
    pub dy: i32,
    pub sub_dx: f64,
    pub sub_dy: f64,
    pub cost: f64,
    pub confidence: f64,
    pub flags: DisparityFlags
}

/// A dense disparity map matching the dimensions of its base image.
#[derive(Debug, Clone, PartialEq)]
pub struct DisparityMap {
    width: usize,
    height: usize,
    data: Vec<Disparity>,
    pub max_disp: Option<f64>,
    pub min_disp: Option<f64>
}

/// The left-based and right-based maps handed through the refinement chain.
#[derive(Debug, Clone, Default)]
pub struct StereoMaps {
    pub left: Option<DisparityMap>,
    pub right: Option<DisparityMap>
}

/// Flat record of one disparity map cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DisparityRecord {
    pub dx: i32,
    pub dy: i32,
    pub sub_dx: f64,
    pub sub_dy: f64,
    pub cost: f64,
    pub confidence: f64,
    pub flags: String
}

/// Flat record of a whole disparity map, cells in row-major order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DisparityMapRecord {
    pub width: usize,
    pub height: usize,
    pub cells: Vec<DisparityRecord>
}

// -----------------------------------------------------------------------------------------------
// TRAITS
// -----------------------------------------------------------------------------------------------

pub trait DisparityAlgorithm {
    /// Compute the disparity map of the given stereo frame.
    fn compute(&mut self, frame: &StereoFrame) -> Result<DisparityMap>;
}

// -----------------------------------------------------------------------------------------------
// IMPLEMENTATIONS
// -----------------------------------------------------------------------------------------------

impl DisparityFlags {
    pub const VALID: DisparityFlags = DisparityFlags(0b001);
    pub const INVALID: DisparityFlags = DisparityFlags(0b010);
    pub const OCCLUDED: DisparityFlags = DisparityFlags(0b100);

    pub fn empty() -> Self {
        DisparityFlags(0)
    }

    pub fn bits(&self) -> u8 {
        self.0
    }

    pub fn contains(&self, other: DisparityFlags) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn insert(&mut self, other: DisparityFlags) {
        self.0 |= other.0;
    }

    pub fn remove(&mut self, other: DisparityFlags) {
        self.0 &= !other.0;
    }
}

impl std::ops::BitOr for DisparityFlags {
    type Output = DisparityFlags;

    fn bitor(self, rhs: DisparityFlags) -> DisparityFlags {
        DisparityFlags(self.0 | rhs.0)
    }
}

impl fmt::Display for DisparityFlags {
    /// Renders the set flags as a pipe-terminated name list, e.g. `Invalid|Occluded|`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (flag, name) in FLAG_NAMES.iter() {
            if self.contains(*flag) {
                write!(f, "{}|", name)?;
            }
        }
        Ok(())
    }
}

impl FromStr for DisparityFlags {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let mut flags = DisparityFlags::empty();

        for name in s.split('|').map(str::trim).filter(|n| !n.is_empty()) {
            let flag = FLAG_NAMES
                .iter()
                .find(|(_, n)| *n == name)
                .map(|(f, _)| *f)
                .ok_or_else(|| Error::InvalidParameter {
                    name: "flags",
                    reason: format!("unknown disparity flag `{}`", name)
                })?;
            flags.insert(flag);
        }

        Ok(flags)
    }
}

impl Disparity {
    /// A valid disparity at an integer displacement.
    pub fn new(dx: i32, dy: i32, cost: f64, confidence: f64) -> Self {
        Disparity {
            dx,
            dy,
            sub_dx: dx as f64,
            sub_dy: dy as f64,
            cost,
            confidence,
            flags: DisparityFlags::VALID
        }
    }

    /// A valid disparity at a sub-pixel displacement, integer parts rounded from it.
    pub fn with_subpixel(sub_dx: f64, sub_dy: f64, cost: f64, confidence: f64) -> Self {
        Disparity {
            dx: sub_dx.round() as i32,
            dy: sub_dy.round() as i32,
            sub_dx,
            sub_dy,
            cost,
            confidence,
            flags: DisparityFlags::VALID
        }
    }

    /// Placeholder for pixels with no match.
    pub fn invalid() -> Self {
        Disparity {
            dx: 0,
            dy: 0,
            sub_dx: 0.0,
            sub_dy: 0.0,
            cost: 0.0,
            confidence: 0.0,
            flags: DisparityFlags::INVALID
        }
    }

    pub fn is_valid(&self) -> bool {
        self.flags.contains(DisparityFlags::VALID) && !self.flags.contains(DisparityFlags::INVALID)
    }

    /// Clear the valid bit and mark the disparity invalid, keeping the other flags.
    pub fn invalidate(&mut self) {
        self.flags.remove(DisparityFlags::VALID);
        self.flags.insert(DisparityFlags::INVALID);
    }

    /// Replace the sub-pixel displacement and re-round the integer parts.
    pub fn set_subpixel(&mut self, sub_dx: f64, sub_dy: f64) {
        self.sub_dx = sub_dx;
        self.sub_dy = sub_dy;
        self.dx = sub_dx.round() as i32;
        self.dy = sub_dy.round() as i32;
    }

    /// Euclidean length of the sub-pixel displacement.
    pub fn magnitude(&self) -> f64 {
        self.sub_dx.hypot(self.sub_dy)
    }

    /// The pixel this disparity points to in the matched image, if it lies inside it.
    pub fn matched_pixel(&self, base: Pixel, width: usize, height: usize) -> Option<Pixel> {
        base.offset(-(self.dx as isize), -(self.dy as isize), width, height)
    }

    pub fn to_record(&self) -> DisparityRecord {
        DisparityRecord {
            dx: self.dx,
            dy: self.dy,
            sub_dx: self.sub_dx,
            sub_dy: self.sub_dy,
            cost: self.cost,
            confidence: self.confidence,
            flags: self.flags.to_string()
        }
    }

    pub fn from_record(record: &DisparityRecord) -> Result<Self> {
        Ok(Disparity {
            dx: record.dx,
            dy: record.dy,
            sub_dx: record.sub_dx,
            sub_dy: record.sub_dy,
            cost: record.cost,
            confidence: record.confidence,
            flags: record.flags.parse()?
        })
    }
}

impl Default for Disparity {
    fn default() -> Self {
        Disparity::invalid()
    }
}

impl DisparityMap {
    /// Create a map with every cell invalid.
    pub fn new(width: usize, height: usize) -> Self {
        DisparityMap {
            width,
            height,
            data: vec![Disparity::invalid(); width * height],
            min_disp: None,
            max_disp: None
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn get(&self, x: usize, y: usize) -> &Disparity {
        &self.data[y * self.width + x]
    }

    pub fn get_mut(&mut self, x: usize, y: usize) -> &mut Disparity {
        &mut self.data[y * self.width + x]
    }

    pub fn put(&mut self, x: usize, y: usize, val: Disparity) {
        self.data[y * self.width + x] = val;
    }

    pub fn as_slice(&self) -> &[Disparity] {
        &self.data
    }

    /// Row-major mutable access to all cells, for row-parallel writers.
    pub fn as_mut_slice(&mut self) -> &mut [Disparity] {
        &mut self.data
    }

    /// Iterate over `(x, y, disparity)` for every cell.
    pub fn iter(&self) -> impl Iterator<Item = (usize, usize, &Disparity)> + '_ {
        let width = self.width;
        self.data
            .iter()
            .enumerate()
            .map(move |(i, d)| (i % width, i / width, d))
    }

    pub fn valid_count(&self) -> usize {
        self.data.iter().filter(|d| d.is_valid()).count()
    }

    /// Recompute `min_disp` and `max_disp` from the magnitudes of valid cells.
    pub fn update_statistics(&mut self) {
        let mut min_disp: Option<f64> = None;
        let mut max_disp: Option<f64> = None;

        for d in self.data.iter().filter(|d| d.is_valid()) {
            let m = d.magnitude();
            min_disp = Some(min_disp.map_or(m, |v| v.min(m)));
            max_disp = Some(max_disp.map_or(m, |v| v.max(m)));
        }

        self.min_disp = min_disp;
        self.max_disp = max_disp;
    }

    /// Converts the map into a Luma8 image of disparity magnitudes.
    ///
    /// Invalid cells are drawn black, magnitudes above 255 saturate.
    pub fn to_luma(&self) -> GrayImage {
        self.luma_scaled(1.0)
    }

    /// Converts the map to a normalised GrayImage.
    ///
    /// Normalises by the maximum observed disparity in the map. If the maximum disparity is not
    /// set then the function is equivalent to `.to_luma()`.
    pub fn to_luma_normalised(&self) -> GrayImage {
        let mult = match self.max_disp {
            Some(d) if d > 0.0 => 255.0 / d,
            _ => 1.0
        };

        self.luma_scaled(mult)
    }

    fn luma_scaled(&self, mult: f64) -> GrayImage {
        GrayImage::from_fn(self.width as u32, self.height as u32, |x, y| {
            let d = self.get(x as usize, y as usize);
            let val = if d.is_valid() { d.magnitude() * mult } else { 0.0 };
            image::Luma([val.max(0.0).min(255.0) as u8])
        })
    }

    pub fn to_records(&self) -> DisparityMapRecord {
        DisparityMapRecord {
            width: self.width,
            height: self.height,
            cells: self.data.iter().map(Disparity::to_record).collect()
        }
    }

    pub fn from_records(record: &DisparityMapRecord) -> Result<Self> {
        if record.cells.len() != record.width * record.height {
            return Err(Error::InvalidParameter {
                name: "cells",
                reason: format!(
                    "record holds {} cells, expected {}x{}",
                    record.cells.len(), record.width, record.height
                )
            });
        }

        let data = record
            .cells
            .iter()
            .map(Disparity::from_record)
            .collect::<Result<Vec<_>>>()?;

        let mut map = DisparityMap {
            width: record.width,
            height: record.height,
            data,
            min_disp: None,
            max_disp: None
        };
        map.update_statistics();

        Ok(map)
    }
}

// -----------------------------------------------------------------------------------------------
// TESTS
// -----------------------------------------------------------------------------------------------
