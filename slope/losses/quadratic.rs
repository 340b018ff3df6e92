use super::{LossFunction, column_means, shift_intercept};
use crate::error::SlopeError;
use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis, Zip};

/// Least squares, `‖η − y‖² / (2n)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Quadratic;

impl LossFunction for Quadratic {
    fn name(&self) -> &'static str {
        "quadratic"
    }

    fn loss(&self, eta: ArrayView2<f64>, y: ArrayView2<f64>) -> f64 {
        let n = y.nrows() as f64;
        Zip::from(&eta)
            .and(&y)
            .fold(0.0, |acc, &e, &yi| acc + (e - yi) * (e - yi))
            / (2.0 * n)
    }

    fn dual(&self, theta: ArrayView2<f64>, y: ArrayView2<f64>) -> f64 {
        let n = y.nrows() as f64;
        -Zip::from(&theta)
            .and(&y)
            .fold(0.0, |acc, &t, &yi| acc + t * yi + 0.5 * t * t)
            / n
    }

    fn residual(&self, eta: ArrayView2<f64>, y: ArrayView2<f64>) -> Array2<f64> {
        &eta - &y
    }

    fn update_weights_and_working_response(
        &self,
        w: &mut Array2<f64>,
        z: &mut Array2<f64>,
        _: ArrayView2<f64>,
        y: ArrayView2<f64>,
    ) {
        w.fill(1.0);
        z.assign(&y);
    }

    fn preprocess_response(&self, y: ArrayView1<f64>) -> Result<Array2<f64>, SlopeError> {
        Ok(y.insert_axis(Axis(1)).to_owned())
    }

    fn link(&self, eta: ArrayView2<f64>) -> Array2<f64> {
        eta.to_owned()
    }

    fn update_intercept(&self, beta0: &mut Array1<f64>, eta: &mut Array2<f64>, y: ArrayView2<f64>) -> bool {
        let means = column_means(&self.residual(eta.view(), y));
        for (k, &step) in means.iter().enumerate() {
            shift_intercept(beta0, eta, k, step);
        }
        true
    }

    fn null_intercept(&self, y: ArrayView2<f64>) -> Array1<f64> {
        y.mean_axis(Axis(0)).unwrap_or_else(|| Array1::zeros(y.ncols()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    #[test]
    fn exact_intercept_step_lands_on_the_mean() {
        let y = array![[1.0], [2.0], [6.0]];
        let mut beta0 = array![0.0];
        let mut eta = Array2::zeros((3, 1));
        Quadratic.update_intercept(&mut beta0, &mut eta, y.view());
        assert_abs_diff_eq!(beta0[0], 3.0, epsilon = 1e-12);
        assert_abs_diff_eq!(Quadratic.deviance(eta.view(), y.view()), 14.0, epsilon = 1e-12);
    }
}
