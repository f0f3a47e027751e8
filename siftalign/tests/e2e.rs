mod common;

use common::synthetic_image::{blob_image, moved_blobs, reference_blobs, rigid_map, Blob};
use siftalign::alignment_processor::AlignmentProcessor;
use siftalign::config::{AlignConfig, SiftConfig};
use siftalign::feature::Feature;
use siftalign::float_image::FloatImage;
use siftalign::transform_model::{ModelFamily, TransformModel};

const SIZE: usize = 100;
const PIVOT: [f64; 2] = [50.0, 50.0];
const ANGLE_DEG: f64 = 10.0;
const SHIFT: [f64; 2] = [5.0, 3.0];

fn processor() -> AlignmentProcessor {
    let config = AlignConfig {
        sift: SiftConfig {
            fdsize: 4,
            ..SiftConfig::default()
        },
        model: ModelFamily::Rigid,
        ..AlignConfig::default()
    };
    AlignmentProcessor::new(config).unwrap()
}

fn nearest_feature(features: &[Feature], p: [f64; 2]) -> Option<(&Feature, f64)> {
    features
        .iter()
        .map(|f| (f, (f.x as f64 - p[0]).hypot(f.y as f64 - p[1])))
        .min_by(|a, b| a.1.total_cmp(&b.1))
}

fn assert_maps_blobs(model: &TransformModel, from: &[Blob], to: &[Blob], tolerance: f64) {
    for (a, b) in from.iter().zip(to) {
        let [x, y] = model.apply(a.center);
        let error = (x - b.center[0]).hypot(y - b.center[1]);
        assert!(
            error < tolerance,
            "blob at {:?} mapped to ({x:.2}, {y:.2}), expected {:?}",
            a.center,
            b.center
        );
    }
}

#[test]
fn every_blob_yields_a_feature() {
    let blobs = reference_blobs();
    let features = processor().extract(&blob_image(SIZE, SIZE, &blobs));
    assert!(features.len() >= blobs.len(), "{} features", features.len());
    for blob in &blobs {
        let (feature, distance) = nearest_feature(&features, blob.center).unwrap();
        assert!(distance < 1.0, "no feature near {:?}, nearest {distance:.2}", blob.center);
        assert!(
            feature.scale > 1.6 && feature.scale < 4.0,
            "unexpected scale {} at {:?}",
            feature.scale,
            blob.center
        );
    }
}

#[test]
fn rotated_scene_is_aligned() {
    let angle = ANGLE_DEG.to_radians();
    let a = reference_blobs();
    let b = moved_blobs(&a, angle, PIVOT, SHIFT);
    let alignment = processor()
        .align_pair(&blob_image(SIZE, SIZE, &a), &blob_image(SIZE, SIZE, &b))
        .unwrap();

    let TransformModel::Rigid(model) = &alignment.model else {
        panic!("expected a rigid model, got {:?}", alignment.model);
    };
    assert!(
        (model.angle().to_degrees() - ANGLE_DEG).abs() < 0.5,
        "angle {:.3} deg",
        model.angle().to_degrees()
    );
    let [x, y] = alignment.model.apply(PIVOT);
    let expected = rigid_map(PIVOT, angle, PIVOT, SHIFT);
    assert!((x - expected[0]).hypot(y - expected[1]) < 1.0, "pivot maps to ({x:.2}, {y:.2})");
    assert_maps_blobs(&alignment.model, &a, &b, 1.0);
    assert!(alignment.inliers.len() >= 8, "{} inliers", alignment.inliers.len());
}

#[test]
fn extraction_is_repeatable() {
    let image = blob_image(SIZE, SIZE, &reference_blobs());
    let p = processor();
    assert_eq!(p.extract(&image), p.extract(&image));
}

#[test]
fn image_below_min_size_has_no_features() {
    let blobs: Vec<Blob> = reference_blobs()
        .into_iter()
        .filter(|b| b.center[0] < 50.0 && b.center[1] < 50.0)
        .collect();
    let small = blob_image(SIZE / 2, SIZE / 2, &blobs);
    assert!(processor().extract(&small).is_empty());
    assert!(processor().extract(&FloatImage::default()).is_empty());
}

#[test]
fn sequence_is_aligned_into_first_frame() {
    let step = 6f64.to_radians();
    let first = reference_blobs();
    let second = moved_blobs(&first, step, PIVOT, [3.0, 2.0]);
    let third = moved_blobs(&second, step, PIVOT, [3.0, 2.0]);
    let images: Vec<FloatImage> = [&first, &second, &third]
        .iter()
        .map(|blobs| blob_image(SIZE, SIZE, blobs))
        .collect();

    let layers = processor().align_sequence(&images);
    assert_eq!(layers.len(), 3);
    assert!(layers[0].alignment.is_none());
    assert!(layers[1].alignment.is_some());
    assert!(layers[2].alignment.is_some());
    assert_maps_blobs(&layers[1].cumulative, &second, &first, 1.0);
    assert_maps_blobs(&layers[2].cumulative, &third, &first, 1.5);
}
