//! # Epipolar lines
//!
//! Epipolar line computation from the fundamental matrix, degeneracy classification, and
//! enumeration of the integer pixels a line passes through.

// -----------------------------------------------------------------------------------------------
// IMPORTS
// -----------------------------------------------------------------------------------------------

use nalgebra::{Matrix3, Vector3};

use crate::frame::Pixel;

// -----------------------------------------------------------------------------------------------
// CONSTANTS
// -----------------------------------------------------------------------------------------------

/// Normalised coefficients below this magnitude are treated as zero.
const DEGENERATE_EPS: f64 = 1e-9;

// -----------------------------------------------------------------------------------------------
// DATA STRUCTURES
// -----------------------------------------------------------------------------------------------

/// Line `a*x + b*y + c = 0` in the matched image with `a^2 + b^2 = 1`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EpiLine {
    pub a: f64,
    pub b: f64,
    pub c: f64
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineKind {
    /// Constant `y`, `a` is zero.
    Horizontal,
    /// Constant `x`, `b` is zero.
    Vertical,
    Oblique
}

// -----------------------------------------------------------------------------------------------
// IMPLEMENTATIONS
// -----------------------------------------------------------------------------------------------

impl EpiLine {
    /// Build a line from raw coefficients, normalising them. Returns `None` if `a` and `b` are
    /// both zero.
    pub fn new(a: f64, b: f64, c: f64) -> Option<Self> {
        let n = a.hypot(b);
        if !(n > DEGENERATE_EPS) || !c.is_finite() {
            return None;
        }

        Some(EpiLine { a: a / n, b: b / n, c: c / n })
    }

    /// Line in the matched image corresponding to `base` in the base image.
    ///
    /// `fundamental` relates the images as `x_right^T F x_left = 0`, so the line is `F x` when
    /// the left image is the base and `F^T x` otherwise.
    pub fn from_fundamental(
        fundamental: &Matrix3<f64>,
        base: Pixel,
        is_left_image_base: bool
    ) -> Option<Self> {
        let p = Vector3::new(base.x as f64, base.y as f64, 1.0);
        let l = if is_left_image_base {
            fundamental * p
        }
        else {
            fundamental.transpose() * p
        };

        EpiLine::new(l[0], l[1], l[2])
    }

    pub fn kind(&self) -> LineKind {
        if self.a.abs() < DEGENERATE_EPS {
            LineKind::Horizontal
        }
        else if self.b.abs() < DEGENERATE_EPS {
            LineKind::Vertical
        }
        else {
            LineKind::Oblique
        }
    }

    pub fn is_horizontal(&self) -> bool {
        self.kind() == LineKind::Horizontal
    }

    pub fn is_vertical(&self) -> bool {
        self.kind() == LineKind::Vertical
    }

    /// `y` coordinate at `x`. Meaningless for vertical lines.
    pub fn y_at(&self, x: f64) -> f64 {
        -(self.a * x + self.c) / self.b
    }

    /// `x` coordinate at `y`. Meaningless for horizontal lines.
    pub fn x_at(&self, y: f64) -> f64 {
        -(self.b * y + self.c) / self.a
    }

    /// Unsigned distance of a point to the line.
    pub fn distance(&self, x: f64, y: f64) -> f64 {
        (self.a * x + self.b * y + self.c).abs()
    }

    /// Integer pixels of a `width` by `height` image that the line passes through.
    ///
    /// Pixels are ordered by increasing `x` (then by walk direction in `y`) and no pixel
    /// appears twice.
    pub fn pixels(&self, width: usize, height: usize) -> Vec<Pixel> {
        let mut out = Vec::new();
        if width == 0 || height == 0 {
            return out;
        }

        match self.kind() {
            LineKind::Horizontal => {
                let y = (-self.c / self.b).round();
                if y >= 0.0 && y < height as f64 {
                    out.extend((0..width).map(|x| Pixel::new(x, y as usize)));
                }
            },
            LineKind::Vertical => {
                let x = (-self.c / self.a).round();
                if x >= 0.0 && x < width as f64 {
                    out.extend((0..height).map(|y| Pixel::new(x as usize, y)));
                }
            },
            LineKind::Oblique => self.walk_columns(width, height, &mut out)
        }

        out
    }

    /// Walk the columns, covering every row between the line's entry and exit of each column.
    ///
    /// Consecutive columns share the row at their common boundary, so the start row of a column
    /// is moved one step past the last row emitted by the previous column.
    fn walk_columns(&self, width: usize, height: usize, out: &mut Vec<Pixel>) {
        let step: i64 = if self.y_at(1.0) >= self.y_at(0.0) { 1 } else { -1 };
        // Rows outside the image collapse onto one sentinel row either side
        let row = |y: f64| y.round().max(-1.0).min(height as f64) as i64;
        let mut last_row: Option<i64> = None;

        for x in 0..width {
            let y_in = row(self.y_at(x as f64 - 0.5));
            let y_out = row(self.y_at(x as f64 + 0.5));

            let mut start = y_in;
            if let Some(last) = last_row {
                // Shallow lines may stay on the last row, steep ones must not repeat it.
                if start == last && y_out != last {
                    start += step;
                }
            }

            let mut y = start;
            loop {
                if y >= 0 && y < height as i64 {
                    out.push(Pixel::new(x, y as usize));
                }
                if y == y_out {
                    break;
                }
                y += step;
            }

            last_row = Some(y_out);
        }
    }
}

// -----------------------------------------------------------------------------------------------
// FUNCTIONS
// -----------------------------------------------------------------------------------------------

/// Fundamental matrix of a rectified pair, epipolar lines are image rows.
pub fn rectified_fundamental() -> Matrix3<f64> {
    Matrix3::new(
        0.0, 0.0, 0.0,
        0.0, 0.0, -1.0,
        0.0, 1.0, 0.0
    )
}

/// Project a fundamental matrix onto the nearest rank 2 matrix.
///
/// Sets the smallest singular value to zero. Matrices that are already rank deficient come back
/// unchanged up to rounding.
pub fn enforce_rank2(f: &Matrix3<f64>) -> Matrix3<f64> {
    let mut svd = f.svd(true, true);

    let idx = svd
        .singular_values
        .iter()
        .enumerate()
        .fold(0, |min_idx, (idx, &val)| {
            if val < svd.singular_values[min_idx] { idx } else { min_idx }
        });
    svd.singular_values[idx] = 0.0;

    svd.recompose().unwrap_or(*f)
}

// -----------------------------------------------------------------------------------------------
// TESTS
// -----------------------------------------------------------------------------------------------
