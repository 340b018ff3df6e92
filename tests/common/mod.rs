//! Simulated designs shared by the integration tests.

use ndarray::{Array1, Array2};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_distr::{Normal, Poisson};
use sortedl1::LossType;
use sprs::CsMat;

pub struct SimulatedData {
    pub x: Array2<f64>,
    pub y: Array1<f64>,
    pub beta: Array2<f64>,
}

/// Draws a design with `x_density` of each column non-zero, a coefficient
/// matrix with `coef_density` of each class column non-zero, and a response
/// from the matching model. `m` is the number of classes for the multinomial
/// loss and ignored otherwise.
pub fn generate_data(
    n: usize,
    p: usize,
    loss: LossType,
    m: usize,
    x_density: f64,
    coef_density: f64,
    seed: u64,
) -> SimulatedData {
    let mut rng = StdRng::seed_from_u64(seed);
    let normal = Normal::new(0.0, 1.0).expect("unit normal");
    let m = if loss == LossType::Multinomial { m } else { 1 };

    let mut x = Array2::zeros((n, p));
    let rows_per_column = ((x_density * n as f64).floor() as usize).max(1);
    let mut rows: Vec<usize> = (0..n).collect();
    for j in 0..p {
        rows.shuffle(&mut rng);
        for &i in rows.iter().take(rows_per_column) {
            x[[i, j]] = rng.sample(normal);
        }
    }

    let mut beta = Array2::zeros((p, m));
    let nonzero_per_class = ((coef_density * p as f64).floor() as usize).max(1);
    let mut features: Vec<usize> = (0..p).collect();
    for k in 0..m {
        features.shuffle(&mut rng);
        for &j in features.iter().take(nonzero_per_class) {
            beta[[j, k]] = rng.sample(normal);
        }
    }

    let eta = x.dot(&beta);
    let y = match loss {
        LossType::Quadratic => eta.column(0).mapv(|e| e + rng.sample(normal)),
        LossType::Logistic => eta.column(0).mapv(|e| {
            let prob = 1.0 / (1.0 + (-e).exp());
            if rng.gen_range(0.0..1.0) < prob { 1.0 } else { 0.0 }
        }),
        LossType::Poisson => eta.column(0).mapv(|e| {
            let rate = Poisson::new(e.exp()).expect("positive rate");
            rng.sample(rate)
        }),
        LossType::Multinomial => Array1::from_shape_fn(n, |i| {
            let scores = eta.row(i);
            let top = scores.fold(f64::NEG_INFINITY, |a, &b| a.max(b));
            let weights = scores.mapv(|s| (s - top).exp());
            let draw = rng.gen_range(0.0..weights.sum());
            let mut cumulative = 0.0;
            let mut class = m - 1;
            for (k, &w) in weights.iter().enumerate() {
                cumulative += w;
                if draw < cumulative {
                    class = k;
                    break;
                }
            }
            class as f64
        }),
    };

    SimulatedData { x, y, beta }
}

pub fn sparse_copy(x: &Array2<f64>) -> CsMat<f64> {
    CsMat::csc_from_dense(x.view(), 0.0)
}

/// The fixed 10 x 3 design used by the logistic and Poisson reference fits.
pub fn reference_design() -> Array2<f64> {
    ndarray::array![
        [0.288, -0.0452, 0.880],
        [0.788, 0.576, -0.305],
        [1.510, 0.390, -0.621],
        [-2.210, -1.120, -0.0449],
        [-0.0162, 0.944, 0.821],
        [0.594, 0.919, 0.782],
        [0.0746, -1.990, 0.620],
        [-0.0561, -0.156, -1.470],
        [-0.478, 0.418, 1.360],
        [-0.103, 0.388, -0.0538]
    ]
}

/// Asserts that `values` never increase by more than `slack`.
pub fn assert_non_increasing(values: &Array1<f64>, slack: f64) {
    for (step, pair) in values.as_slice().expect("contiguous").windows(2).enumerate() {
        assert!(
            pair[1] <= pair[0] + slack,
            "value rose from {} to {} at step {}",
            pair[0],
            pair[1],
            step + 1
        );
    }
}

/// Asserts that every value is strictly below the one before it.
pub fn assert_decreasing(values: &Array1<f64>) {
    for (step, pair) in values.as_slice().expect("contiguous").windows(2).enumerate() {
        assert!(
            pair[1] < pair[0],
            "value did not drop from {} to {} at step {}",
            pair[0],
            pair[1],
            step + 1
        );
    }
}
