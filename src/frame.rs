//! # Grayscale images and stereo frames
//!
//! Single-channel floating point images used as matching input, and the stereo frame pairing
//! them.

// -----------------------------------------------------------------------------------------------
// IMPORTS
// -----------------------------------------------------------------------------------------------

use image::{DynamicImage, GrayImage};
use serde::{Deserialize, Serialize};

use crate::error::*;

// -----------------------------------------------------------------------------------------------
// DATA STRUCTURES
// -----------------------------------------------------------------------------------------------

/// Integer pixel coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Pixel {
    pub x: usize,
    pub y: usize
}

/// A row-major single channel floating point image.
#[derive(Debug, Clone, PartialEq)]
pub struct GrayFloatImage {
    width: usize,
    height: usize,
    data: Vec<f32>
}

/// A pair of equally sized grayscale images.
#[derive(Debug, Clone)]
pub struct StereoFrame {
    pub left: GrayFloatImage,
    pub right: GrayFloatImage
}

// -----------------------------------------------------------------------------------------------
// IMPLEMENTATIONS
// -----------------------------------------------------------------------------------------------

impl Pixel {
    pub fn new(x: usize, y: usize) -> Self {
        Self { x, y }
    }

    /// Offset the pixel, returning `None` if the result leaves a `width` by `height` image.
    pub fn offset(&self, dx: isize, dy: isize, width: usize, height: usize) -> Option<Pixel> {
        let x = self.x as isize + dx;
        let y = self.y as isize + dy;

        if x < 0 || y < 0 || x >= width as isize || y >= height as isize {
            None
        }
        else {
            Some(Pixel::new(x as usize, y as usize))
        }
    }
}

impl GrayFloatImage {
    pub fn new(width: usize, height: usize) -> Self {
        GrayFloatImage {
            width,
            height,
            data: vec![0.0; width * height]
        }
    }

    /// Build an image by evaluating `f(x, y)` for every pixel.
    pub fn from_fn<F>(width: usize, height: usize, mut f: F) -> Self
    where
        F: FnMut(usize, usize) -> f32
    {
        let mut data = Vec::with_capacity(width * height);
        for y in 0..height {
            for x in 0..width {
                data.push(f(x, y));
            }
        }

        GrayFloatImage { width, height, data }
    }

    /// Wrap a row-major buffer.
    pub fn from_vec(width: usize, height: usize, data: Vec<f32>) -> Result<Self> {
        if data.len() != width * height {
            return Err(Error::InvalidParameter {
                name: "data",
                reason: format!(
                    "buffer holds {} values, expected {}x{}", data.len(), width, height
                )
            });
        }

        Ok(GrayFloatImage { width, height, data })
    }

    pub fn from_luma(img: &GrayImage) -> Self {
        let (w, h) = img.dimensions();
        Self::from_fn(w as usize, h as usize, |x, y| {
            img.get_pixel(x as u32, y as u32)[0] as f32
        })
    }

    /// Convert after smoothing with a Gaussian of the given standard deviation.
    pub fn from_luma_blurred(img: &GrayImage, sigma: f32) -> Self {
        if sigma <= 0.0 {
            return Self::from_luma(img);
        }

        Self::from_luma(&imageproc::filter::gaussian_blur_f32(img, sigma))
    }

    pub fn from_dynamic(img: &DynamicImage) -> Self {
        Self::from_luma(&img.to_luma8())
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    pub fn get(&self, x: usize, y: usize) -> f32 {
        self.data[y * self.width + x]
    }

    /// Get a value with out-of-range coordinates clamped onto the nearest edge pixel.
    pub fn get_clamped(&self, x: isize, y: isize) -> f32 {
        let x = x.max(0).min(self.width as isize - 1) as usize;
        let y = y.max(0).min(self.height as isize - 1) as usize;
        self.get(x, y)
    }

    pub fn put(&mut self, x: usize, y: usize, val: f32) {
        self.data[y * self.width + x] = val;
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    /// Converts the image into an 8 bit grayscale image, saturating out of range values.
    pub fn to_luma(&self) -> GrayImage {
        GrayImage::from_fn(self.width as u32, self.height as u32, |x, y| {
            image::Luma([self.get(x as usize, y as usize).max(0.0).min(255.0) as u8])
        })
    }
}

impl StereoFrame {
    /// Pair two images, checking that their dimensions agree.
    pub fn new(left: GrayFloatImage, right: GrayFloatImage) -> Result<Self> {
        check_dimensions(&left, &right)?;
        Ok(Self { left, right })
    }

    pub fn from_luma(left: &GrayImage, right: &GrayImage, prefilter_sigma: Option<f32>) -> Result<Self> {
        match prefilter_sigma {
            Some(sigma) => Self::new(
                GrayFloatImage::from_luma_blurred(left, sigma),
                GrayFloatImage::from_luma_blurred(right, sigma)
            ),
            None => Self::new(GrayFloatImage::from_luma(left), GrayFloatImage::from_luma(right))
        }
    }

    pub fn width(&self) -> usize {
        self.left.width()
    }

    pub fn height(&self) -> usize {
        self.left.height()
    }

    /// Image used as base when matching from the given side.
    pub fn base(&self, is_left_image_base: bool) -> &GrayFloatImage {
        if is_left_image_base { &self.left } else { &self.right }
    }

    /// Image searched for correspondences when matching from the given side.
    pub fn matched(&self, is_left_image_base: bool) -> &GrayFloatImage {
        if is_left_image_base { &self.right } else { &self.left }
    }
}

// -----------------------------------------------------------------------------------------------
// FUNCTIONS
// -----------------------------------------------------------------------------------------------

/// Fail if either image is empty or if the two images differ in size.
pub(crate) fn check_dimensions(base: &GrayFloatImage, matched: &GrayFloatImage) -> Result<()> {
    if base.is_empty() {
        return Err(Error::ZeroSizeImage { width: base.width(), height: base.height() });
    }
    if matched.is_empty() {
        return Err(Error::ZeroSizeImage { width: matched.width(), height: matched.height() });
    }
    if base.width() != matched.width() || base.height() != matched.height() {
        return Err(Error::DimensionMismatch {
            base: (base.width(), base.height()),
            matched: (matched.width(), matched.height())
        });
    }

    Ok(())
}

// -----------------------------------------------------------------------------------------------
// TESTS
// -----------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamped_access_replicates_edges() {
        let img = GrayFloatImage::from_fn(3, 2, |x, y| (x + 10 * y) as f32);

        assert_eq!(img.get_clamped(-4, 0), 0.0);
        assert_eq!(img.get_clamped(7, 1), 12.0);
        assert_eq!(img.get_clamped(1, -1), 1.0);
        assert_eq!(img.get_clamped(1, 5), 11.0);
    }

    #[test]
    fn frame_rejects_mismatched_sizes() {
        let res = StereoFrame::new(GrayFloatImage::new(4, 4), GrayFloatImage::new(5, 4));
        assert!(matches!(res, Err(Error::DimensionMismatch { .. })));

        let res = StereoFrame::new(GrayFloatImage::new(0, 4), GrayFloatImage::new(0, 4));
        assert!(matches!(res, Err(Error::ZeroSizeImage { .. })));
    }

    #[test]
    fn prefilter_spreads_an_impulse() {
        let img = GrayImage::from_fn(9, 9, |x, y| {
            image::Luma([if (x, y) == (4, 4) { 255 } else { 0 }])
        });

        let sharp = GrayFloatImage::from_luma(&img);
        assert_eq!(GrayFloatImage::from_luma_blurred(&img, 0.0), sharp);

        let blurred = GrayFloatImage::from_luma_blurred(&img, 1.0);
        let (centre, side, far) = (blurred.get(4, 4), blurred.get(5, 4), blurred.get(0, 0));
        assert!(centre < 255.0);
        assert!(side > 0.0 && side < centre);
        assert_eq!(far, 0.0);
    }

    #[test]
    fn pixel_offset_stays_in_bounds() {
        let p = Pixel::new(1, 1);
        assert_eq!(p.offset(-1, 2, 4, 4), Some(Pixel::new(0, 3)));
        assert_eq!(p.offset(-2, 0, 4, 4), None);
        assert_eq!(p.offset(0, 3, 4, 4), None);
    }
}
