use approx::assert_abs_diff_eq;
use ndarray::Axis;
use tmask::core::cloud_mask::{CloudClassifier, ThresholdPolicy, CLOUD_VALUE};
use tmask::core::{build_design_matrix, fit_model, ModelEvaluator, RobustMethod, NUM_PARAMS};
use tmask::types::{Band, ReflectanceStack, NUM_BANDS};

const FIRST_DAY: f64 = 2_457_400.0;
const CLOUDY: usize = 6;

/// Per-band harmonic coefficients used to synthesise clear observations
fn truth(band: usize) -> [f64; NUM_PARAMS] {
    let base = [600.0, 900.0, 1100.0, 3200.0][band];
    [base, 80.0, -40.0, 25.0, 10.0]
}

fn dates() -> Vec<f64> {
    (0..12).map(|i| FIRST_DAY + 30.0 * i as f64).collect()
}

/// Clear-sky stack on an 8x8 grid plus `extra(t, band, row, col)`
fn stack_with<F>(dates: &[f64], extra: F) -> ReflectanceStack
where
    F: Fn(usize, usize, usize, usize) -> f64,
{
    let (basis, _) = build_design_matrix(dates).unwrap();
    ReflectanceStack::from_shape_fn((dates.len(), NUM_BANDS, 8, 8), |(t, b, r, c)| {
        (basis.evaluate(dates[t], &truth(b)) + extra(t, b, r, c)).round() as u16
    })
}

/// 12 dates on an 8x8 grid with a bright block on one date
fn synthetic_stack(dates: &[f64]) -> ReflectanceStack {
    stack_with(dates, |t, _, r, c| {
        if t == CLOUDY && (2..6).contains(&r) && (2..6).contains(&c) {
            2000.0
        } else {
            0.0
        }
    })
}

#[test]
fn test_fit_recovers_clear_sky_model() {
    let dates = dates();
    let stack = synthetic_stack(&dates);
    let (_, design) = build_design_matrix(&dates).unwrap();

    let model = fit_model(&stack, design.view(), &dates, RobustMethod::Bisquare, Some(0.0)).unwrap();
    assert_eq!(model.coeffs.dim(), (NUM_BANDS, NUM_PARAMS, 8, 8));

    for band in 0..NUM_BANDS {
        for (p, expected) in truth(band).iter().enumerate() {
            // Clear pixel and a pixel carrying the cloud outlier
            assert_abs_diff_eq!(model.coeffs[[band, p, 0, 0]] as f64, *expected, epsilon = 2.0);
            assert_abs_diff_eq!(model.coeffs[[band, p, 3, 3]] as f64, *expected, epsilon = 2.0);
        }
        assert!(model.rmse[[band, 0, 0]] < 1.0);
        assert!(model.num_iter[[band, 3, 3]] >= 1);
    }
}

#[test]
fn test_outlier_date_is_classified_as_cloud() {
    let dates = dates();
    let stack = synthetic_stack(&dates);
    let (_, design) = build_design_matrix(&dates).unwrap();
    let model = fit_model(&stack, design.view(), &dates, RobustMethod::Bisquare, Some(0.0)).unwrap();

    let predicted = ModelEvaluator::from_training_dates(&dates)
        .unwrap()
        .predict(&dates, &model.coeffs)
        .unwrap();
    let classifier = CloudClassifier::new(ThresholdPolicy::Static { threshold: 400.0 });
    let masks = classifier.classify_stack(&stack, &predicted).unwrap();

    assert_eq!(masks.len(), dates.len());
    for (t, mask) in masks.iter().enumerate() {
        assert_eq!(mask.has_detections(), t == CLOUDY, "date {}", t);
    }
    let cloudy = &masks[CLOUDY];
    assert_eq!(cloudy.encoded[[3, 3]], CLOUD_VALUE);
    assert_eq!(cloudy.encoded[[0, 0]], 0);
    // Block corners have only four flagged neighbours and are filtered out
    assert!(cloudy.cloud[[2, 2]]);
    assert_eq!(cloudy.encoded[[2, 2]], 0);

    // Same inputs, same masks
    let again = classifier.classify_stack(&stack, &predicted).unwrap();
    for (a, b) in masks.iter().zip(&again) {
        assert_eq!(a.encoded, b.encoded);
    }
}

#[test]
fn test_predicted_stack_tracks_clear_observations() {
    let dates = dates();
    let stack = synthetic_stack(&dates);
    let (_, design) = build_design_matrix(&dates).unwrap();
    let model = fit_model(&stack, design.view(), &dates, RobustMethod::Bisquare, Some(0.0)).unwrap();

    let predicted = ModelEvaluator::from_training_dates(&dates)
        .unwrap()
        .predict(&dates, &model.coeffs)
        .unwrap();

    for (t, scene) in predicted.axis_iter(Axis(0)).enumerate() {
        for b in 0..NUM_BANDS {
            let observed = stack[[t, b, 7, 7]] as f32;
            assert_abs_diff_eq!(scene[[b, 7, 7]], observed, epsilon = 2.0);
        }
    }
}

#[test]
fn test_single_band_outlier_is_cloud_before_filtering() {
    let dates = dates();
    let green = Band::Green.index();
    let stack = stack_with(&dates, |t, b, r, c| {
        if t == CLOUDY && b == green && (r, c) == (4, 4) {
            2000.0
        } else {
            0.0
        }
    });
    let (_, design) = build_design_matrix(&dates).unwrap();
    let model = fit_model(&stack, design.view(), &dates, RobustMethod::Bisquare, Some(0.0)).unwrap();

    // The outlier is down-weighted, the other bands fit exactly
    assert_abs_diff_eq!(model.coeffs[[green, 0, 4, 4]] as f64, truth(green)[0], epsilon = 2.0);

    let predicted = ModelEvaluator::from_training_dates(&dates)
        .unwrap()
        .predict(&dates, &model.coeffs)
        .unwrap();
    let classifier = CloudClassifier::new(ThresholdPolicy::Static { threshold: 400.0 });
    let masks = classifier.classify_stack(&stack, &predicted).unwrap();

    for (t, mask) in masks.iter().enumerate() {
        assert_eq!(mask.cloud[[4, 4]], t == CLOUDY, "date {}", t);
        assert!(!mask.shadow[[4, 4]], "date {}", t);
    }
    // An isolated pixel does not survive the 3x3 median
    assert_eq!(masks[CLOUDY].encoded[[4, 4]], 0);
    assert!(!masks[CLOUDY].has_detections());
}
