use super::{LossFunction, PROB_CLAMP, shift_intercept};
use crate::error::SlopeError;
use crate::math::xlogx;
use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis, Zip};

const ARMIJO_C: f64 = 1e-4;
const BACKTRACK: f64 = 0.5;
const MAX_BACKTRACKS: usize = 50;

/// Poisson deviance with the log link. The response must be non-negative.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Poisson;

impl LossFunction for Poisson {
    fn name(&self) -> &'static str {
        "poisson"
    }

    fn loss(&self, eta: ArrayView2<f64>, y: ArrayView2<f64>) -> f64 {
        let n = y.nrows() as f64;
        Zip::from(&eta)
            .and(&y)
            .fold(0.0, |acc, &e, &yi| acc + e.exp() - yi * e)
            / n
    }

    fn dual(&self, theta: ArrayView2<f64>, y: ArrayView2<f64>) -> f64 {
        let n = y.nrows() as f64;
        Zip::from(&theta).and(&y).fold(0.0, |acc, &t, &yi| {
            let e = (t + yi).max(0.0);
            acc + e - xlogx(e)
        }) / n
    }

    fn residual(&self, eta: ArrayView2<f64>, y: ArrayView2<f64>) -> Array2<f64> {
        Zip::from(&eta).and(&y).map_collect(|&e, &yi| e.exp() - yi)
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
                *wi = e.exp();
                *zi = e - 1.0 + yi / *wi;
            });
    }

    fn preprocess_response(&self, y: ArrayView1<f64>) -> Result<Array2<f64>, SlopeError> {
        if let Some(bad) = y.iter().find(|&&v| v < 0.0) {
            return Err(SlopeError::UnsupportedResponse {
                loss: self.name(),
                reason: format!("counts must be non-negative, found {bad}"),
            });
        }
        Ok(y.insert_axis(Axis(1)).to_owned())
    }

    fn link(&self, eta: ArrayView2<f64>) -> Array2<f64> {
        eta.mapv(f64::exp)
    }

    /// Newton direction on the intercept with Armijo backtracking, since the
    /// gradient of the exponential is not Lipschitz.
    fn update_intercept(&self, beta0: &mut Array1<f64>, eta: &mut Array2<f64>, y: ArrayView2<f64>) -> bool {
        let n = y.nrows() as f64;
        let mut ok = true;

        for k in 0..y.ncols() {
            let (grad, hess) = Zip::from(eta.column(k))
                .and(y.column(k))
                .fold((0.0, 0.0), |(g, h), &e, &yi| (g + e.exp() - yi, h + e.exp()));
            let (grad, hess) = (grad / n, hess / n);
            if grad == 0.0 || hess <= 0.0 {
                continue;
            }
            let direction = -grad / hess;
            let column_loss = |shift: f64| {
                Zip::from(eta.column(k))
                    .and(y.column(k))
                    .fold(0.0, |acc, &e, &yi| acc + (e + shift).exp() - yi * (e + shift))
                    / n
            };
            let f0 = column_loss(0.0);

            let mut t = 1.0;
            let mut accepted = None;
            for _ in 0..MAX_BACKTRACKS {
                if column_loss(t * direction) <= f0 + ARMIJO_C * t * grad * direction {
                    accepted = Some(t * direction);
                    break;
                }
                t *= BACKTRACK;
            }

            match accepted {
                Some(step) => shift_intercept(beta0, eta, k, -step),
                None => ok = false,
            }
        }
        ok
    }

    fn null_intercept(&self, y: ArrayView2<f64>) -> Array1<f64> {
        y.mean_axis(Axis(0))
            .unwrap_or_else(|| Array1::ones(y.ncols()))
            .mapv(|mean| mean.max(PROB_CLAMP).ln())
    }

    fn saturated_loss(&self, y: ArrayView2<f64>) -> f64 {
        let n = y.nrows() as f64;
        y.fold(0.0, |acc, &yi| acc + xlogx(yi) - yi) / n
    }
}
