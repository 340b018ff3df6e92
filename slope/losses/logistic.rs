use super::{LossFunction, PROB_CLAMP, column_means, shift_intercept};
use crate::error::SlopeError;
use crate::math::{logit, sigmoid, xlogx};
use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis, Zip};

/// Upper bound of the logistic curvature `p(1 − p)`, whose inverse is the
/// intercept step.
const CURVATURE_BOUND: f64 = 0.25;

/// Binomial deviance with the logit link. The response must be 0/1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Logistic;

fn softplus(x: f64) -> f64 {
    x.max(0.0) + (-x.abs()).exp().ln_1p()
}

impl LossFunction for Logistic {
    fn name(&self) -> &'static str {
        "logistic"
    }

    fn loss(&self, eta: ArrayView2<f64>, y: ArrayView2<f64>) -> f64 {
        let n = y.nrows() as f64;
        Zip::from(&eta)
            .and(&y)
            .fold(0.0, |acc, &e, &yi| acc + softplus(e) - yi * e)
            / n
    }

    fn dual(&self, theta: ArrayView2<f64>, y: ArrayView2<f64>) -> f64 {
        let n = y.nrows() as f64;
        -Zip::from(&theta).and(&y).fold(0.0, |acc, &t, &yi| {
            let p = (t + yi).clamp(0.0, 1.0);
            acc + xlogx(p) + xlogx(1.0 - p)
        }) / n
    }

    fn residual(&self, eta: ArrayView2<f64>, y: ArrayView2<f64>) -> Array2<f64> {
        Zip::from(&eta).and(&y).map_collect(|&e, &yi| sigmoid(e) - yi)
    }

    fn update_weights_and_working_response(
        &self,
        w: &mut Array2<f64>,
        z: &mut Array2<f64>,
        eta: ArrayView2<f64>,
        y: ArrayView2<f64>,
    ) {
        Zip::from(w)
            .and(z)
            .and(&eta)
            .and(&y)
            .for_each(|wi, zi, &e, &yi| {
                let p = sigmoid(e).clamp(PROB_CLAMP, 1.0 - PROB_CLAMP);
                *wi = p * (1.0 - p);
                *zi = e + (yi - p) / *wi;
            });
    }

    /// Clamps y into [0, 1]; anything still not 0 or 1 is rejected. A single
    /// observed class is allowed.
    fn preprocess_response(&self, y: ArrayView1<f64>) -> Result<Array2<f64>, SlopeError> {
        let clamped = y.mapv(|v| v.clamp(0.0, 1.0));
        if let Some(bad) = clamped.iter().find(|&&v| v != 0.0 && v != 1.0) {
            return Err(SlopeError::UnsupportedResponse {
                loss: self.name(),
                reason: format!("expected binary outcomes, found {bad}"),
            });
        }
        Ok(clamped.insert_axis(Axis(1)))
    }

    fn link(&self, eta: ArrayView2<f64>) -> Array2<f64> {
        eta.mapv(sigmoid)
    }

    fn update_intercept(&self, beta0: &mut Array1<f64>, eta: &mut Array2<f64>, y: ArrayView2<f64>) -> bool {
        let means = column_means(&self.residual(eta.view(), y));
        for (k, &mean) in means.iter().enumerate() {
            shift_intercept(beta0, eta, k, mean / CURVATURE_BOUND);
        }
        true
    }

    fn null_intercept(&self, y: ArrayView2<f64>) -> Array1<f64> {
        y.mean_axis(Axis(0))
            .unwrap_or_else(|| Array1::from_elem(y.ncols(), 0.5))
            .mapv(|p| logit(p.clamp(PROB_CLAMP, 1.0 - PROB_CLAMP)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    #[test]
    fn responses_are_clamped_to_binary_outcomes() {
        let y = Logistic.preprocess_response(array![0.0, 2.0, 1.0, -3.0].view()).unwrap();
        assert_eq!(y, array![[0.0], [1.0], [1.0], [0.0]]);
        assert!(Logistic.preprocess_response(array![1.0, 1.0].view()).is_ok());
        assert!(Logistic.preprocess_response(array![0.0, 0.5].view()).is_err());
    }

    #[test]
    fn single_class_null_intercept_is_finite() {
        let y = Logistic.preprocess_response(array![1.0, 1.0, 1.0].view()).unwrap();
        let beta0 = Logistic.null_intercept(y.view());
        assert!(beta0[0].is_finite() && beta0[0] > 0.0);
    }

    #[test]
    fn loss_is_stable_for_large_predictors() {
        let y = array![[1.0], [0.0]];
        let eta = array![[800.0], [-800.0]];
        assert_abs_diff_eq!(Logistic.loss(eta.view(), y.view()), 0.0, epsilon = 1e-12);
        let eta = array![[0.0], [0.0]];
        assert_abs_diff_eq!(Logistic.loss(eta.view(), y.view()), 2f64.ln(), epsilon = 1e-12);
    }

    #[test]
    fn irls_weights_are_clamped() {
        let y = array![[1.0], [0.0]];
        let eta = array![[50.0], [0.0]];
        let mut w = Array2::zeros((2, 1));
        let mut z = Array2::zeros((2, 1));
        Logistic.update_weights_and_working_response(&mut w, &mut z, eta.view(), y.view());
        assert_abs_diff_eq!(w[[0, 0]], PROB_CLAMP * (1.0 - PROB_CLAMP), epsilon = 1e-15);
        assert_abs_diff_eq!(w[[1, 0]], 0.25, epsilon = 1e-15);
        assert_abs_diff_eq!(z[[1, 0]], -2.0, epsilon = 1e-12);
    }
}
