//! # End-to-end matching
//!
//! Runs the full matcher over synthetic stereo pairs with known disparities.

use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use approx::assert_relative_eq;
use cv_sgm_disparity::{prelude::*, Error};
use cv_sgm_disparity::cost::{CensusParams, RankParams};
use cv_sgm_disparity::epiline::rectified_fundamental;
use nalgebra::Matrix3;

mod common;
use common::{shifted_pair, shifted_pair_2d, textured};

fn census_config(aggregation: AggregationConfig) -> MatcherConfig {
    MatcherConfig::default()
        .with_cost(CostConfig::Census(CensusParams { half_width: 2, half_height: 2 }))
        .with_aggregation(aggregation)
        .with_disparity(ComputerConfig::Wta)
        .with_window(SearchWindow::horizontal(0, 5))
        .with_compute_right(false)
}

#[test]
fn constant_images_match_at_zero() {
    let img = GrayFloatImage::from_fn(16, 16, |_, _| 128.0);
    let frame = StereoFrame::new(img.clone(), img).unwrap();

    for aggregation in &[AggregationConfig::Plain, AggregationConfig::Sgm(Default::default())] {
        let mut matcher = StereoMatcher::new(
            census_config(*aggregation).with_compute_right(true)
        ).unwrap();
        let maps = matcher.compute_pair(&frame).unwrap();

        for map in [maps.left.unwrap(), maps.right.unwrap()].iter() {
            for (x, y, d) in map.iter() {
                assert!(d.is_valid(), "pixel ({}, {}) invalid", x, y);
                assert_eq!((d.dx, d.dy), (0, 0));
                assert_eq!(d.flags, DisparityFlags::VALID);

                // Every candidate costs the same over a flat region
                let full_window = x >= 5 && x <= 10;
                if *aggregation == AggregationConfig::Plain && full_window {
                    assert_eq!(d.confidence, 0.0);
                }
            }
        }
    }
}

#[test]
fn shifted_texture_is_recovered() {
    let (w, h) = (32, 16);
    let frame = shifted_pair(w, h, 3);
    let mut matcher = StereoMatcher::new(census_config(AggregationConfig::Plain)).unwrap();

    let map = matcher.compute(&frame).unwrap();

    for y in 3..h - 3 {
        for x in 5..w - 2 {
            let d = map.get(x, y);
            assert!(d.is_valid());
            assert_eq!(d.dx, 3, "pixel ({}, {})", x, y);
            assert_eq!(d.dy, 0);
            assert_eq!(d.cost, 0.0);
            assert!(d.confidence > 0.9);
        }
    }

    assert_eq!(map.max_disp.map(|m| m >= 3.0), Some(true));
}

#[test]
fn flat_region_has_no_confidence() {
    let (w, h) = (40, 16);
    let texture = textured(w, h);
    let base = GrayFloatImage::from_fn(w, h, |x, y| if x < 16 { texture.get(x, y) } else { 128.0 });
    let matched = GrayFloatImage::from_fn(w, h, |x, y| base.get((x + 3).min(w - 1), y));
    let frame = StereoFrame::new(base, matched).unwrap();

    let map = StereoMatcher::new(census_config(AggregationConfig::Plain))
        .unwrap()
        .compute(&frame)
        .unwrap();

    // Textured strip
    for y in 3..h - 3 {
        for x in 5..=10 {
            let d = map.get(x, y);
            assert_eq!(d.dx, 3, "pixel ({}, {})", x, y);
            assert!(d.confidence > 0.9);
        }
    }

    // Every census word of the flat part is empty, so all candidates tie
    for y in 0..h {
        for x in 20..w {
            let d = map.get(x, y);
            assert!(d.is_valid());
            assert_eq!(d.dx, 0, "pixel ({}, {})", x, y);
            assert_eq!(d.confidence, 0.0);
        }
    }
}

#[test]
fn sgm_recovers_shifted_texture() {
    let (w, h) = (40, 24);
    let frame = shifted_pair(w, h, 3);
    let mut matcher = StereoMatcher::new(
        census_config(AggregationConfig::Sgm(Default::default()))
    ).unwrap();

    let map = matcher.compute(&frame).unwrap();

    for y in 4..h - 4 {
        for x in 8..w - 5 {
            let d = map.get(x, y);
            assert!(d.is_valid());
            assert_eq!(d.dx, 3, "pixel ({}, {})", x, y);
            assert!(d.cost >= 0.0);
            assert!(d.confidence >= 0.0 && d.confidence <= 1.0);
        }
    }
}

#[test]
fn rank_cost_recovers_shifted_texture() {
    let (w, h) = (32, 16);
    let frame = shifted_pair(w, h, 3);
    let config = census_config(AggregationConfig::Plain)
        .with_cost(CostConfig::Rank(RankParams::default()));
    let mut matcher = StereoMatcher::new(config).unwrap();

    let map = matcher.compute(&frame).unwrap();

    for y in 0..h {
        for x in 8..w - 6 {
            assert_eq!(map.get(x, y).dx, 3, "pixel ({}, {})", x, y);
            assert_eq!(map.get(x, y).cost, 0.0);
        }
    }
}

#[test]
fn interpolation_stays_within_half_a_pixel() {
    let (w, h) = (32, 16);
    let frame = shifted_pair(w, h, 3);
    let config = census_config(AggregationConfig::Plain)
        .with_disparity(ComputerConfig::Interpolating);
    let mut matcher = StereoMatcher::new(config).unwrap();

    let map = matcher.compute(&frame).unwrap();

    for y in 3..h - 3 {
        for x in 5..w - 2 {
            let d = map.get(x, y);
            assert_eq!(d.dx, 3);
            assert!((d.sub_dx - 3.0).abs() < 0.5);
            assert_eq!(d.dx, d.sub_dx.round() as i32);
        }
    }
}

#[test]
fn sgm_is_deterministic() {
    let frame = shifted_pair(24, 12, 2);
    let config = census_config(AggregationConfig::Sgm(Default::default()))
        .with_disparity(ComputerConfig::SgmTrimmedMean(Default::default()))
        .with_compute_right(true);

    let first = StereoMatcher::new(config.clone()).unwrap().compute_pair(&frame).unwrap();
    let second = StereoMatcher::new(config).unwrap().compute_pair(&frame).unwrap();

    assert_eq!(first.left, second.left);
    assert_eq!(first.right, second.right);
}

#[test]
fn valid_disparities_are_well_formed() {
    let frame = shifted_pair(24, 12, 2);
    let config = census_config(AggregationConfig::Sgm(Default::default()))
        .with_disparity(ComputerConfig::SgmTrimmedMean(Default::default()))
        .with_confidence(MatchConfidence::TwoAgainstAverage)
        .with_compute_right(true);
    let maps = StereoMatcher::new(config).unwrap().compute_pair(&frame).unwrap();

    for map in [maps.left.unwrap(), maps.right.unwrap()].iter() {
        for (_, _, d) in map.iter().filter(|(_, _, d)| d.is_valid()) {
            assert!(d.cost >= 0.0 && d.cost.is_finite());
            assert!(d.confidence >= 0.0 && d.confidence <= 1.0);
            assert_eq!(d.dx, d.sub_dx.round() as i32);
        }
    }
}

#[test]
fn fundamental_matrix_path_agrees_with_rectified() {
    let frame = shifted_pair(24, 10, 3);
    let rectified = census_config(AggregationConfig::Plain).with_compute_right(true);
    // A scaled rectified matrix describes the same geometry
    let unrectified = rectified
        .clone()
        .with_geometry(Geometry::from_fundamental(&(rectified_fundamental() * 2.5)));

    let a = StereoMatcher::new(rectified).unwrap().compute_pair(&frame).unwrap();
    let b = StereoMatcher::new(unrectified).unwrap().compute_pair(&frame).unwrap();

    for (ma, mb) in [(a.left, b.left), (a.right, b.right)].iter() {
        let (ma, mb) = (ma.as_ref().unwrap(), mb.as_ref().unwrap());
        for (x, y, da) in ma.iter() {
            let db = mb.get(x, y);
            assert_eq!(da.is_valid(), db.is_valid());
            assert_eq!((da.dx, da.dy), (db.dx, db.dy), "pixel ({}, {})", x, y);
            assert_relative_eq!(da.cost, db.cost);
        }
    }
}

#[test]
fn oblique_epipolar_lines_are_followed() {
    let (w, h) = (40, 24);
    let frame = shifted_pair_2d(w, h, 4, 2);

    // Image translation along (2, 1), epipolar lines are parallel to it
    let fundamental = Matrix3::new(
        0.0, 0.0, 1.0,
        0.0, 0.0, -2.0,
        -1.0, 2.0, 0.0
    );
    let config = census_config(AggregationConfig::Plain)
        .with_geometry(Geometry::from_fundamental(&fundamental))
        .with_window(SearchWindow { min_dx: 0, max_dx: 6, min_dy: 0, max_dy: 3 });

    let map = StereoMatcher::new(config).unwrap().compute(&frame).unwrap();

    let (mut total, mut hits) = (0, 0);
    for y in 4..h - 2 {
        for x in 6..w - 2 {
            let d = map.get(x, y);
            total += 1;
            if d.is_valid() && (d.dx, d.dy) == (4, 2) && d.cost == 0.0 {
                hits += 1;
            }
        }
    }

    // Census ties between unrelated windows are rare but possible
    assert!(hits * 10 >= total * 9, "{} of {} pixels matched", hits, total);
}

#[test]
fn luma_input_goes_through_prefilter() {
    let frame = shifted_pair(32, 16, 3);
    let (left, right) = (frame.base(true).to_luma(), frame.matched(true).to_luma());
    let config = census_config(AggregationConfig::Plain).with_compute_right(true);

    let mut sharp = StereoMatcher::new(config.clone()).unwrap();
    let from_luma = sharp.compute_luma(&left, &right).unwrap();
    let direct = sharp.compute_pair(&frame).unwrap();
    assert_eq!(from_luma.left, direct.left);
    assert_eq!(from_luma.right, direct.right);

    let mut blurred = StereoMatcher::new(config.with_prefilter_sigma(1.0)).unwrap();
    let smoothed = blurred.compute_luma(&left, &right).unwrap();
    let smoothed_left = smoothed.left.unwrap();
    assert_ne!(Some(&smoothed_left), direct.left.as_ref());

    // The blur commutes with the shift away from the image edges
    let (mut total, mut hits) = (0, 0);
    for y in 4..12 {
        for x in 10..20 {
            total += 1;
            if smoothed_left.get(x, y).dx == 3 {
                hits += 1;
            }
        }
    }
    assert!(hits * 10 >= total * 8, "{} of {} pixels matched", hits, total);
}

#[test]
fn max_confidence_is_scaled_for_aggregated_costs() {
    let (w, h) = (32, 16);
    let frame = shifted_pair(w, h, 3);
    let config = census_config(AggregationConfig::Sgm(Default::default()))
        .with_confidence(MatchConfidence::TwoAgainstMax);

    let map = StereoMatcher::new(config).unwrap().compute(&frame).unwrap();

    let confidences: Vec<f64> = map
        .iter()
        .filter(|(_, _, d)| d.is_valid())
        .map(|(_, _, d)| d.confidence)
        .collect();
    assert!(confidences.iter().all(|c| *c >= 0.0 && *c <= 1.0));
    assert!(confidences.iter().any(|c| *c > 0.0 && *c < 1.0));
}

#[test]
fn right_base_map_has_negated_disparities() {
    let (w, h) = (32, 16);
    let frame = shifted_pair(w, h, 3);
    let config = census_config(AggregationConfig::Plain).with_compute_right(true);
    let maps = StereoMatcher::new(config).unwrap().compute_pair(&frame).unwrap();
    let right = maps.right.unwrap();

    for y in 3..h - 3 {
        for x in 2..w - 8 {
            assert_eq!(right.get(x, y).dx, -3, "pixel ({}, {})", x, y);
        }
    }
}

#[test]
fn empty_window_leaves_every_pixel_invalid() {
    let frame = shifted_pair(12, 8, 1);
    let config = census_config(AggregationConfig::Plain)
        .with_window(SearchWindow::horizontal(4, 1));

    let map = StereoMatcher::new(config).unwrap().compute(&frame).unwrap();
    assert_eq!(map.valid_count(), 0);
}

#[test]
fn raised_abort_flag_stops_the_run() {
    let frame = shifted_pair(16, 8, 1);
    let abort = Arc::new(AtomicBool::new(true));
    let mut matcher = StereoMatcher::new(census_config(AggregationConfig::Plain))
        .unwrap()
        .with_abort_flag(abort);

    assert!(matches!(matcher.compute(&frame), Err(Error::Aborted)));
}

#[test]
fn image_dimension_errors() {
    let a = GrayFloatImage::new(8, 8);
    let b = GrayFloatImage::new(8, 6);
    assert!(matches!(
        StereoFrame::new(a.clone(), b),
        Err(Error::DimensionMismatch { .. })
    ));
    assert!(matches!(
        StereoFrame::new(GrayFloatImage::new(0, 4), GrayFloatImage::new(0, 4)),
        Err(Error::ZeroSizeImage { .. })
    ));
}
