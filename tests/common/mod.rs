//! Synthetic stereo pairs shared by the integration tests and the benchmark.

#![allow(dead_code)]

use cv_sgm_disparity::prelude::*;

/// Pseudo-random texture with no repeating structure along rows.
pub fn textured(w: usize, h: usize) -> GrayFloatImage {
    GrayFloatImage::from_fn(w, h, |x, y| {
        let mut v = (x as u32).wrapping_mul(0x9E37_79B1) ^ (y as u32).wrapping_mul(0x85EB_CA77);
        v ^= v >> 15;
        v = v.wrapping_mul(0x2C1B_3C6D);
        v ^= v >> 12;
        v = v.wrapping_mul(0x27D4_EB2D);
        v ^= v >> 16;
        ((v >> 8) % 256) as f32
    })
}

/// Pair whose matched image is the base moved right by `shift` pixels, edge replicated.
pub fn shifted_pair(w: usize, h: usize, shift: usize) -> StereoFrame {
    shifted_pair_2d(w, h, shift, 0)
}

/// Pair whose matched image is the base moved by `(sx, sy)` pixels, edge replicated.
pub fn shifted_pair_2d(w: usize, h: usize, sx: usize, sy: usize) -> StereoFrame {
    let base = textured(w, h);
    let matched = GrayFloatImage::from_fn(w, h, |x, y| {
        base.get((x + sx).min(w - 1), (y + sy).min(h - 1))
    });
    StereoFrame::new(base, matched).unwrap()
}
