//! # SGM paths
//!
//! A path walks from the image border in a fixed direction until it reaches a base pixel, and
//! holds the dynamic programming table the aggregator fills along the way. The recurrence itself
//! lives in the aggregator; a path only knows where it starts, how it steps and how long it is.

// -----------------------------------------------------------------------------------------------
// IMPORTS
// -----------------------------------------------------------------------------------------------

use crate::frame::Pixel;

// -----------------------------------------------------------------------------------------------
// DATA STRUCTURES
// -----------------------------------------------------------------------------------------------

/// Direction of travel of a path towards its base pixel.
///
/// Knight directions advance one pixel along their primary axis on every step and one pixel
/// along the secondary axis on every second step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PathDirection {
    PosX,
    NegX,
    PosY,
    NegY,
    PosXPosY,
    NegXPosY,
    PosXNegY,
    NegXNegY,
    PosXHalfPosY,
    PosXHalfNegY,
    NegXHalfPosY,
    NegXHalfNegY,
    PosYHalfPosX,
    PosYHalfNegX,
    NegYHalfPosX,
    NegYHalfNegX
}

/// Walk from the border to a base pixel with its DP cost table.
#[derive(Debug, Clone)]
pub struct Path {
    direction: PathDirection,
    length: usize,
    current_index: usize,
    current: Pixel,
    previous: Pixel,
    even_step: bool,
    disparity_range: usize,
    costs: Vec<f64>
}

// -----------------------------------------------------------------------------------------------
// CONSTANTS
// -----------------------------------------------------------------------------------------------

impl PathDirection {
    pub const ALL: [PathDirection; 16] = [
        PathDirection::PosX,
        PathDirection::NegX,
        PathDirection::PosY,
        PathDirection::NegY,
        PathDirection::PosXPosY,
        PathDirection::NegXPosY,
        PathDirection::PosXNegY,
        PathDirection::NegXNegY,
        PathDirection::PosXHalfPosY,
        PathDirection::PosXHalfNegY,
        PathDirection::NegXHalfPosY,
        PathDirection::NegXHalfNegY,
        PathDirection::PosYHalfPosX,
        PathDirection::PosYHalfNegX,
        PathDirection::NegYHalfPosX,
        PathDirection::NegYHalfNegX
    ];
}

// -----------------------------------------------------------------------------------------------
// IMPLEMENTATIONS
// -----------------------------------------------------------------------------------------------

impl PathDirection {
    /// Step taken on every call to `next` as `(dx, dy)`.
    pub fn primary(&self) -> (isize, isize) {
        use PathDirection::*;

        match self {
            PosX | PosXHalfPosY | PosXHalfNegY => (1, 0),
            NegX | NegXHalfPosY | NegXHalfNegY => (-1, 0),
            PosY | PosYHalfPosX | PosYHalfNegX => (0, 1),
            NegY | NegYHalfPosX | NegYHalfNegX => (0, -1),
            PosXPosY => (1, 1),
            NegXPosY => (-1, 1),
            PosXNegY => (1, -1),
            NegXNegY => (-1, -1)
        }
    }

    /// Step taken on every second call to `next`, zero for non-knight directions.
    pub fn secondary(&self) -> (isize, isize) {
        use PathDirection::*;

        match self {
            PosXHalfPosY | NegXHalfPosY => (0, 1),
            PosXHalfNegY | NegXHalfNegY => (0, -1),
            PosYHalfPosX | NegYHalfPosX => (1, 0),
            PosYHalfNegX | NegYHalfNegX => (-1, 0),
            _ => (0, 0)
        }
    }

    pub fn is_knight(&self) -> bool {
        self.secondary() != (0, 0)
    }

    /// Number of steps from the border to `base` so the walk never leaves the image.
    pub fn length(&self, base: Pixel, width: usize, height: usize) -> usize {
        // Room behind the base pixel along one axis for a walk travelling with sign `s`
        let room = |s: isize, v: usize, len: usize| match s {
            1 => v,
            -1 => len - 1 - v,
            _ => usize::MAX
        };

        let (px, py) = self.primary();
        let (sx, sy) = self.secondary();

        let primary = room(px, base.x, width).min(room(py, base.y, height));
        if !self.is_knight() {
            return primary;
        }

        let secondary = room(sx, base.x, width).min(room(sy, base.y, height));
        primary.min(secondary.saturating_mul(2).saturating_add(1))
    }
}

impl Path {
    /// Start a walk that ends at `base` after `length` steps.
    pub fn init(
        direction: PathDirection,
        base: Pixel,
        width: usize,
        height: usize,
        disparity_range: usize
    ) -> Self {
        let length = direction.length(base, width, height);
        let (px, py) = direction.primary();
        let (sx, sy) = direction.secondary();

        let n = length as isize;
        let half = (length / 2) as isize;
        let start = Pixel::new(
            (base.x as isize - n * px - half * sx) as usize,
            (base.y as isize - n * py - half * sy) as usize
        );

        Path {
            direction,
            length,
            current_index: 0,
            current: start,
            previous: start,
            even_step: false,
            disparity_range,
            costs: vec![0.0; (length + 1) * disparity_range]
        }
    }

    pub fn direction(&self) -> PathDirection {
        self.direction
    }

    pub fn length(&self) -> usize {
        self.length
    }

    pub fn current_index(&self) -> usize {
        self.current_index
    }

    pub fn current_pixel(&self) -> Pixel {
        self.current
    }

    /// Pixel visited before the current one, equal to it at the start of the walk.
    pub fn previous_pixel(&self) -> Pixel {
        self.previous
    }

    pub fn has_next_pixel(&self) -> bool {
        self.current_index < self.length
    }

    /// Advance one step towards the base pixel.
    pub fn next(&mut self) {
        if !self.has_next_pixel() {
            return;
        }

        let (px, py) = self.direction.primary();
        let (mut dx, mut dy) = (px, py);
        if self.even_step {
            let (sx, sy) = self.direction.secondary();
            dx += sx;
            dy += sy;
        }
        self.even_step = !self.even_step;

        self.previous = self.current;
        self.current = Pixel::new(
            (self.current.x as isize + dx) as usize,
            (self.current.y as isize + dy) as usize
        );
        self.current_index += 1;
    }

    pub fn cost(&self, index: usize, disparity: usize) -> f64 {
        self.costs[index * self.disparity_range + disparity]
    }

    /// Table row of the current step.
    pub fn current_costs_mut(&mut self) -> &mut [f64] {
        let start = self.current_index * self.disparity_range;
        &mut self.costs[start..start + self.disparity_range]
    }

    /// Table rows of the previous and the current step.
    ///
    /// Panics at the start of the walk, where there is no previous step.
    pub(crate) fn step_costs_mut(&mut self) -> (&[f64], &mut [f64]) {
        let range = self.disparity_range;
        let start = self.current_index * range;
        let (head, tail) = self.costs.split_at_mut(start);

        (&head[start - range..], &mut tail[..range])
    }

    /// Table row of the last step, the one at the base pixel.
    pub fn final_costs(&self) -> &[f64] {
        let start = self.length * self.disparity_range;
        &self.costs[start..start + self.disparity_range]
    }
}

// -----------------------------------------------------------------------------------------------
// TESTS
// -----------------------------------------------------------------------------------------------
