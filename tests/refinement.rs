//! # Refinement chain
//!
//! Refiners driven through the configuration layer, and the flat record form of refined maps.

use approx::assert_relative_eq;
use cv_sgm_disparity::prelude::*;
use cv_sgm_disparity::DisparityMapRecord;

mod common;
use common::shifted_pair;

fn island_map() -> DisparityMap {
    let mut map = DisparityMap::new(12, 12);
    for y in 0..12 {
        for x in 0..12 {
            map.put(x, y, Disparity::new(0, 0, 1.0, 1.0));
        }
    }
    for &(x, y) in &[(5, 5), (6, 5), (6, 6)] {
        map.put(x, y, Disparity::new(10, 0, 1.0, 1.0));
    }
    map
}

fn run_chain(json: &str, map: DisparityMap) -> DisparityMap {
    let config = MatcherConfig::from_json_str(json).unwrap();
    let mut maps = StereoMaps { left: Some(map), right: None };
    config.refinement_chain().run(&mut maps, None).unwrap();
    maps.left.unwrap()
}

#[test]
fn small_island_is_removed() {
    let out = run_chain(
        r#"{ "refinement": [{ "type": "peak_removal", "min_segment_size": 6 }] }"#,
        island_map()
    );

    for &(x, y) in &[(5, 5), (6, 5), (6, 6)] {
        let d = out.get(x, y);
        assert!(!d.is_valid());
        assert!(d.flags.contains(DisparityFlags::INVALID));
    }
    assert_eq!(out.valid_count(), 144 - 3);
    assert_eq!(out.max_disp, Some(0.0));
}

#[test]
fn small_island_is_rebuilt_from_neighbours() {
    let out = run_chain(
        r#"{ "refinement": [{
            "type": "peak_removal",
            "min_segment_size": 6,
            "interpolate_invalidated": true
        }] }"#,
        island_map()
    );

    for &(x, y) in &[(5, 5), (6, 5), (6, 6)] {
        let d = out.get(x, y);
        assert!(d.is_valid());
        assert_eq!((d.dx, d.dy), (0, 0));
    }
}

#[test]
fn cross_checked_maps_are_consistent() {
    let (w, h) = (32, 16);
    let frame = shifted_pair(w, h, 3);
    let config = MatcherConfig::from_json_str(r#"{
        "cost": { "type": "census", "half_width": 2, "half_height": 2 },
        "aggregation": { "type": "plain" },
        "window": { "min_dx": 0, "max_dx": 5 },
        "refinement": [{ "type": "cross_check", "max_distance": 1.0 }]
    }"#).unwrap();

    let maps = StereoMatcher::new(config).unwrap().compute_pair(&frame).unwrap();
    let (left, right) = (maps.left.unwrap(), maps.right.unwrap());

    for (base, other, sign) in [(&left, &right, 1), (&right, &left, -1)].iter() {
        for (x, y, d) in base.iter().filter(|(_, _, d)| d.is_valid()) {
            let q = d
                .matched_pixel(Pixel::new(x, y), w, h)
                .expect("valid disparity points inside the image");
            let back = other.get(q.x, q.y);

            assert!(back.is_valid(), "({}, {}) has no valid partner", x, y);
            assert!((d.sub_dx + back.sub_dx).hypot(d.sub_dy + back.sub_dy) <= 1.0);
            assert!(d.dx * *sign >= 0);
        }
    }

    // Textured interior survives the check
    for y in 3..h - 3 {
        for x in 8..w - 8 {
            assert_eq!(left.get(x, y).dx, 3, "pixel ({}, {})", x, y);
        }
    }
}

#[test]
fn full_chain_keeps_disparities_well_formed() {
    let frame = shifted_pair(24, 16, 2);
    let config = MatcherConfig::from_json_str(r#"{
        "window": { "min_dx": 0, "max_dx": 4 },
        "refinement": [
            { "type": "cross_check" },
            { "type": "peak_removal", "min_segment_size": 4 },
            { "type": "median" },
            { "type": "anisotropic", "mode": "diffusion", "kernel": "rational", "iterations": 3 }
        ]
    }"#).unwrap();

    let maps = StereoMatcher::new(config).unwrap().compute_pair(&frame).unwrap();

    for map in [maps.left.unwrap(), maps.right.unwrap()].iter() {
        assert!(map.valid_count() > 0);
        for (_, _, d) in map.iter().filter(|(_, _, d)| d.is_valid()) {
            assert!(d.cost >= 0.0);
            assert!(d.confidence >= 0.0 && d.confidence <= 1.0);
            assert_eq!(d.dx, d.sub_dx.round() as i32);
        }
    }
}

#[test]
fn records_survive_json() {
    let mut map = island_map();
    map.put(0, 0, Disparity::with_subpixel(2.75, -0.5, 3.25, 0.125));
    let mut occluded = Disparity::invalid();
    occluded.flags.insert(DisparityFlags::OCCLUDED);
    map.put(1, 0, occluded);

    let json = serde_json::to_string(&map.to_records()).unwrap();
    let record: DisparityMapRecord = serde_json::from_str(&json).unwrap();
    let back = DisparityMap::from_records(&record).unwrap();

    assert_eq!((back.width(), back.height()), (12, 12));
    for (x, y, d) in map.iter() {
        let b = back.get(x, y);
        assert_eq!(b.flags, d.flags, "pixel ({}, {})", x, y);
        assert_eq!((b.dx, b.dy), (d.dx, d.dy));
        assert_relative_eq!(b.sub_dx, d.sub_dx);
        assert_relative_eq!(b.sub_dy, d.sub_dy);
        assert_relative_eq!(b.cost, d.cost);
        assert_relative_eq!(b.confidence, d.confidence);
    }
}
