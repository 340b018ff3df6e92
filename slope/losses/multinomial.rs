use super::{LossFunction, PROB_CLAMP, column_means, shift_intercept};
use crate::error::SlopeError;
use crate::math::{log_sum_exp, softmax, xlogx};
use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis, Zip};

/// Upper bound of the softmax curvature, whose inverse is the intercept step.
const CURVATURE_BOUND: f64 = 0.5;

/// Cross-entropy over `K` classes with a full softmax parametrization. Labels
/// are integers `0..K`, expanded to an indicator matrix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Multinomial;

impl LossFunction for Multinomial {
    fn name(&self) -> &'static str {
        "multinomial"
    }

    fn loss(&self, eta: ArrayView2<f64>, y: ArrayView2<f64>) -> f64 {
        let n = y.nrows() as f64;
        let fit = Zip::from(&eta).and(&y).fold(0.0, |acc, &e, &yi| acc + e * yi);
        (log_sum_exp(eta).sum() - fit) / n
    }

    fn dual(&self, theta: ArrayView2<f64>, y: ArrayView2<f64>) -> f64 {
        let n = y.nrows() as f64;
        -Zip::from(&theta)
            .and(&y)
            .fold(0.0, |acc, &t, &yi| acc + xlogx((t + yi).clamp(0.0, 1.0)))
            / n
    }

    fn residual(&self, eta: ArrayView2<f64>, y: ArrayView2<f64>) -> Array2<f64> {
        softmax(eta) - &y
    }

    /// Diagonal IRLS weights `pₖ(1 − pₖ)` per class.
    fn update_weights_and_working_response(
        &self,
        w: &mut Array2<f64>,
        z: &mut Array2<f64>,
        eta: ArrayView2<f64>,
        y: ArrayView2<f64>,
    ) {
        let p = softmax(eta);
        Zip::from(w)
            .and(z)
            .and(&eta)
            .and(&y)
            .and(&p)
            .for_each(|wi, zi, &e, &yi, &pi| {
                let pc = pi.clamp(PROB_CLAMP, 1.0 - PROB_CLAMP);
                *wi = pc * (1.0 - pc);
                *zi = e + (yi - pc) / *wi;
            });
    }

    fn preprocess_response(&self, y: ArrayView1<f64>) -> Result<Array2<f64>, SlopeError> {
        let unsupported = |reason: String| SlopeError::UnsupportedResponse {
            loss: "multinomial",
            reason,
        };
        if let Some(bad) = y.iter().find(|&&v| v < 0.0 || v.fract() != 0.0) {
            return Err(unsupported(format!(
                "class labels must be non-negative integers, found {bad}"
            )));
        }
        let classes = y.fold(0.0, |m: f64, &v| m.max(v)) as usize + 1;
        if classes < 2 {
            return Err(unsupported("at least two classes are required".to_string()));
        }
        let mut indicator = Array2::zeros((y.len(), classes));
        for (i, &label) in y.iter().enumerate() {
            indicator[[i, label as usize]] = 1.0;
        }
        Ok(indicator)
    }

    fn link(&self, eta: ArrayView2<f64>) -> Array2<f64> {
        softmax(eta)
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
            .unwrap_or_else(|| Array1::from_elem(y.ncols(), 1.0))
            .mapv(|share| share.max(PROB_CLAMP).ln())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    #[test]
    fn labels_expand_to_indicators() {
        let y = Multinomial.preprocess_response(array![0.0, 2.0, 1.0, 2.0].view()).unwrap();
        assert_eq!(y, array![[1.0, 0.0, 0.0], [0.0, 0.0, 1.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]]);
        assert!(Multinomial.preprocess_response(array![0.0, 1.5].view()).is_err());

        let y = Multinomial.preprocess_response(array![0.0, 2.0].view()).unwrap();
        assert_eq!(y.ncols(), 3);
        assert!(Multinomial.null_intercept(y.view()).iter().all(|b| b.is_finite()));
    }

    #[test]
    fn uniform_predictor_costs_log_k() {
        let y = Multinomial.preprocess_response(array![0.0, 1.0, 2.0].view()).unwrap();
        let eta = Array2::zeros((3, 3));
        assert_abs_diff_eq!(Multinomial.loss(eta.view(), y.view()), 3f64.ln(), epsilon = 1e-12);
        let probs = Multinomial.link(eta.view());
        assert_abs_diff_eq!(probs[[1, 2]], 1.0 / 3.0, epsilon = 1e-12);
    }
}
