//! Ordinary least squares through the normal equations, used by α estimation.

use crate::error::SlopeError;
use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis, concatenate};
use ndarray_linalg::Solve;

/// Least-squares fit of `y` on the columns of `x`. Returns the intercept (zero
/// when `intercept` is false) and the coefficients.
pub fn fit_ols(x: ArrayView2<f64>, y: ArrayView1<f64>, intercept: bool) -> Result<(f64, Array1<f64>), SlopeError> {
    if x.nrows() != y.len() {
        return Err(SlopeError::DimensionMismatch {
            what: "response",
            expected: x.nrows(),
            found: y.len(),
        });
    }

    let design: Array2<f64> = if intercept {
        let ones = Array2::ones((x.nrows(), 1));
        concatenate(Axis(1), &[ones.view(), x]).map_err(|e| SlopeError::Linalg(e.to_string()))?
    } else {
        x.to_owned()
    };

    if design.ncols() == 0 {
        return Ok((0.0, Array1::zeros(0)));
    }

    let xtx = design.t().dot(&design);
    let xty = design.t().dot(&y);
    let solution = xtx
        .solve_into(xty)
        .map_err(|e| SlopeError::Linalg(e.to_string()))?;

    if intercept {
        Ok((solution[0], solution.slice(ndarray::s![1..]).to_owned()))
    } else {
        Ok((0.0, solution))
    }
}

/// Residual standard deviation of the least-squares fit,
/// `√(RSS / (n − p − intercept))`.
pub fn estimate_noise(x: ArrayView2<f64>, y: ArrayView1<f64>, intercept: bool) -> Result<f64, SlopeError> {
    let n = x.nrows();
    let used = x.ncols() + usize::from(intercept);
    if used >= n {
        return Err(SlopeError::TooManySelected {
            selected: x.ncols(),
            n,
        });
    }

    let (beta0, beta) = fit_ols(x, y, intercept)?;
    let fitted = if beta.is_empty() {
        Array1::from_elem(n, beta0)
    } else {
        x.dot(&beta) + beta0
    };
    let rss: f64 = (&y - &fitted).mapv(|r| r * r).sum();
    Ok((rss / (n - used) as f64).sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    #[test]
    fn normal_equations_without_intercept() {
        let x = array![[1.0, 2.0], [2.0, 1.0], [3.0, 4.0]];
        let y = array![7.0, 5.0, 11.0];
        let (beta0, beta) = fit_ols(x.view(), y.view(), false).unwrap();
        assert_eq!(beta0, 0.0);
        assert_abs_diff_eq!(beta, array![42.0 / 38.0, 82.0 / 38.0], epsilon = 1e-10);
        assert_abs_diff_eq!(beta[0], 1.105263, epsilon = 1e-6);
        assert_abs_diff_eq!(beta[1], 2.157895, epsilon = 1e-6);
    }

    #[test]
    fn exact_system_with_intercept() {
        let x = array![[1.0, 1.0], [2.0, 1.0], [5.0, 2.0]];
        let y = array![13.0, 14.0, 19.0];
        let (beta0, beta) = fit_ols(x.view(), y.view(), true).unwrap();
        assert_abs_diff_eq!(beta0, 10.0, epsilon = 1e-9);
        assert_abs_diff_eq!(beta, array![1.0, 2.0], epsilon = 1e-9);
    }

    #[test]
    fn noise_estimate_needs_degrees_of_freedom() {
        let x = array![[1.0], [2.0], [3.0], [4.0]];
        let y = array![1.0, 3.0, 2.0, 5.0];
        let sigma = estimate_noise(x.view(), y.view(), true).unwrap();
        // Slope 1.1, intercept 0: residuals (−0.1, 0.8, −1.3, 0.6), RSS 2.7 on 2 df.
        assert_abs_diff_eq!(sigma, (2.7f64 / 2.0).sqrt(), epsilon = 1e-10);

        let wide = array![[1.0, 0.0], [0.0, 1.0]];
        assert!(matches!(
            estimate_noise(wide.view(), array![1.0, 2.0].view(), false),
            Err(SlopeError::TooManySelected { selected: 2, n: 2 })
        ));
    }
}
