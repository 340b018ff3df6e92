mod common;

use approx::assert_abs_diff_eq;
use common::generate_data;
use ndarray::{Array1, Array2};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::Normal;
use sortedl1::ols::{estimate_noise, fit_ols};
use sortedl1::{AlphaType, LossType, Slope, SlopeError, SlopeParameters};

fn linear_data(n: usize, p: usize, beta: &[f64], sigma: f64, seed: u64) -> (Array2<f64>, Array1<f64>) {
    let mut rng = StdRng::seed_from_u64(seed);
    let normal = Normal::new(0.0, 1.0).unwrap();
    let x = Array2::from_shape_fn((n, p), |_| rng.sample(normal));
    let mut coefs = Array1::zeros(p);
    for (j, &b) in beta.iter().enumerate() {
        coefs[j] = b;
    }
    let y = x.dot(&coefs) + 1.0 + Array1::from_shape_fn(n, |_| sigma * rng.sample(normal));
    (x, y)
}

fn estimating(loss: LossType) -> SlopeParameters {
    SlopeParameters {
        loss,
        alpha_type: AlphaType::Estimate,
        ..SlopeParameters::default()
    }
}

#[test]
fn least_squares_recovers_a_noiseless_model() {
    let (x, _) = linear_data(30, 3, &[2.0, -1.0, 0.5], 0.0, 1);
    let y = x.dot(&ndarray::array![2.0, -1.0, 0.5]) + 4.0;
    let (beta0, beta) = fit_ols(x.view(), y.view(), true).unwrap();
    assert_abs_diff_eq!(beta0, 4.0, epsilon = 1e-8);
    assert_abs_diff_eq!(beta, ndarray::array![2.0, -1.0, 0.5], epsilon = 1e-8);
    assert_abs_diff_eq!(estimate_noise(x.view(), y.view(), true).unwrap(), 0.0, epsilon = 1e-6);
}

#[test]
fn noise_estimate_tracks_the_true_sigma() {
    let (x, y) = linear_data(2000, 5, &[1.0, 1.0], 0.7, 2);
    let sigma = estimate_noise(x.view(), y.view(), true).unwrap();
    assert!((sigma - 0.7).abs() < 0.05, "sigma estimate {sigma}");
}

#[test]
fn long_data_needs_a_single_fit() {
    let (x, y) = linear_data(200, 10, &[3.0, -3.0, 2.0], 1.0, 3);
    let fit = Slope::new(estimating(LossType::Quadratic))
        .unwrap()
        .fit(&x, y.view(), None, None)
        .unwrap();
    assert!(fit.alpha() > 0.0 && fit.alpha() < 1.0);
    let beta = fit.dense_coefficients();
    for j in 0..3 {
        assert!(beta[[j, 0]] != 0.0, "signal {j} was dropped");
    }
}

#[test]
fn wide_data_iterates_to_a_stable_selection() {
    let (x, y) = linear_data(40, 100, &[4.0, -4.0, 3.0], 0.5, 4);
    let fit = Slope::new(estimating(LossType::Quadratic))
        .unwrap()
        .fit(&x, y.view(), None, None)
        .unwrap();
    assert!(fit.alpha() > 0.0);
    let beta = fit.dense_coefficients();
    let selected = beta.iter().filter(|&&b| b != 0.0).count();
    assert!(selected >= 3 && selected < 39, "{selected} columns selected");
}

#[test]
fn estimation_is_limited_to_the_quadratic_loss() {
    assert!(matches!(
        Slope::new(estimating(LossType::Logistic)),
        Err(SlopeError::Invalid(_))
    ));
}

#[test]
fn explicit_alpha_overrides_estimation() {
    let data = generate_data(100, 10, LossType::Quadratic, 1, 1.0, 0.3, 9);
    let fit = Slope::new(estimating(LossType::Quadratic))
        .unwrap()
        .fit(&data.x, data.y.view(), Some(0.25), None)
        .unwrap();
    assert_eq!(fit.alpha(), 0.25);
}
