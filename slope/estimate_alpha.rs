//! # α Estimation
//!
//! Picks a single α from the noise level of a least-squares fit, for the
//! quadratic loss. With plenty of observations the noise comes from OLS on
//! every candidate column. Otherwise the selection and the noise estimate are
//! refined together: fit at `α = σ̂ / n`, re-estimate σ̂ on the selected
//! columns, and repeat until the selection stops changing.

use crate::error::SlopeError;
use crate::kernels::NormalizedDesign;
use crate::matrix::DesignMatrix;
use crate::ols::estimate_noise;
use crate::results::SlopePath;
use ndarray::{Array2, ArrayView1};

/// Observations needed beyond the column count for a one-shot estimate.
const SPARE_OBSERVATIONS: usize = 30;

/// Noise estimate from OLS on the normalized `columns`.
pub(crate) fn noise_on_columns<X: DesignMatrix>(
    design: &NormalizedDesign<'_, X>,
    y: ArrayView1<f64>,
    columns: &[usize],
    intercept: bool,
) -> Result<f64, SlopeError> {
    let n = design.nrows();
    let mut dense = Array2::zeros((n, columns.len()));
    for (c, &j) in columns.iter().enumerate() {
        design.add_column(j, 1.0, dense.column_mut(c));
    }
    estimate_noise(dense.view(), y, intercept)
}

/// Predictors with a non-zero coefficient in the last step of `path`.
fn selected(path: &SlopePath) -> Vec<usize> {
    let Some(fit) = path.last() else {
        return Vec::new();
    };
    let mut rows: Vec<usize> = fit.coefficients().iter().map(|(_, (j, _))| j).collect();
    rows.sort_unstable();
    rows.dedup();
    rows
}

/// Runs the estimation loop. `noise(columns)` estimates σ̂ on a column subset
/// and `fit_at(α)` solves the model at one α.
pub(crate) fn estimate_alpha<N, F>(
    n: usize,
    candidates: &[usize],
    intercept: bool,
    max_rounds: usize,
    mut noise: N,
    mut fit_at: F,
) -> Result<SlopePath, SlopeError>
where
    N: FnMut(&[usize]) -> Result<f64, SlopeError>,
    F: FnMut(f64) -> Result<SlopePath, SlopeError>,
{
    let nf = n as f64;

    if n >= candidates.len() + SPARE_OBSERVATIONS {
        let sigma = noise(candidates)?;
        log::info!("Estimated noise level {sigma:.4e} from the full least-squares fit");
        return fit_at(sigma / nf);
    }

    let mut current: Vec<usize> = Vec::new();
    let mut last = None;
    for round in 0..max_rounds {
        let sigma = noise(&current)?;
        let alpha = sigma / nf;
        let path = fit_at(alpha)?;
        let now = selected(&path);
        log::debug!(
            "alpha estimation round {round}: sigma {sigma:.4e}, alpha {alpha:.4e}, {} selected",
            now.len()
        );

        if now.len() + usize::from(intercept) >= n {
            return Err(SlopeError::TooManySelected { selected: now.len(), n });
        }
        if now == current {
            return Ok(path);
        }
        current = now;
        last = Some(path);
    }

    log::warn!("alpha estimation did not settle within {max_rounds} rounds; keeping the last fit");
    last.ok_or_else(|| SlopeError::invalid("alpha estimation needs at least one round"))
}
