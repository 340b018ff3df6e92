//! # Model Fitting
//!
//! The [`Slope`] model ties the pieces together: it validates the data,
//! normalizes the design, builds λ and the α grid, and walks the grid with warm
//! starts. At every step the strong rule picks the predictors worth solving
//! for, the outer loop solves and checks KKT conditions, and the result is
//! mapped back to the original feature scale.
//!
//! Dense (`Array2`) and sparse (`sprs::CsMat`) designs share one generic path
//! loop; only the optional materialization of the normalization differs.

use crate::clusters::Clusters;
use crate::error::SlopeError;
use crate::estimate_alpha::{estimate_alpha, noise_on_columns};
use crate::kernels::NormalizedDesign;
use crate::losses::{Loss, LossFunction};
use crate::math::{set_union, which_max};
use crate::matrix::{DesignMatrix, ensure_csc, scale_sparse_columns};
use crate::normalize::Normalization;
use crate::outer_loop::OuterLoop;
use crate::parameters::{AlphaType, ScreeningType, SlopeParameters};
use crate::results::{SlopeFit, SlopePath, to_sparse};
use crate::screening::{previously_active, strong_set};
use crate::sequence::{alpha_grid, default_alpha_min_ratio, lambda_sequence};
use crate::solvers::{Iterate, Solver, flatten};
use crate::sorted_l1::SortedL1Norm;
use ndarray::{Array1, Array2, ArrayView1, array};
use sprs::CsMat;
use std::time::Instant;

/// α used by [`Slope::fit`] when none is given.
pub const DEFAULT_ALPHA: f64 = 0.05;

/// Caller-supplied predicate, polled once per path step. Returning `true`
/// stops the path and keeps the steps already solved.
pub type Interrupt<'a> = &'a dyn Fn() -> bool;

/// Sorted-L1 penalized generalized linear model.
#[derive(Debug, Clone, Default)]
pub struct Slope {
    params: SlopeParameters,
}

/// Why a path ended before its last α.
#[derive(Debug, Clone, Copy, PartialEq)]
enum EarlyStop {
    DevianceChange(f64),
    DevianceRatio(f64),
    Clusters(usize),
}

impl Slope {
    pub fn new(params: SlopeParameters) -> Result<Self, SlopeError> {
        params.validate()?;
        Ok(Slope { params })
    }

    pub fn parameters(&self) -> &SlopeParameters {
        &self.params
    }

    /// Solves at a single α (by default [`DEFAULT_ALPHA`], or the estimated
    /// one when `alpha_type` is `estimate`).
    pub fn fit(
        &self,
        x: &Array2<f64>,
        y: ArrayView1<f64>,
        alpha: Option<f64>,
        lambda: Option<Array1<f64>>,
    ) -> Result<SlopeFit, SlopeError> {
        let path = self.path(x, y, self.single_alpha(alpha), lambda, None)?;
        last_fit(path)
    }

    /// [`Slope::fit`] for a sparse design.
    pub fn fit_sparse(
        &self,
        x: &CsMat<f64>,
        y: ArrayView1<f64>,
        alpha: Option<f64>,
        lambda: Option<Array1<f64>>,
    ) -> Result<SlopeFit, SlopeError> {
        let path = self.path_sparse(x, y, self.single_alpha(alpha), lambda, None)?;
        last_fit(path)
    }

    /// Fits the whole regularization path. Without `alpha` the grid is chosen
    /// from the data and may stop early.
    pub fn path(
        &self,
        x: &Array2<f64>,
        y: ArrayView1<f64>,
        alpha: Option<Array1<f64>>,
        lambda: Option<Array1<f64>>,
        interrupt: Option<Interrupt<'_>>,
    ) -> Result<SlopePath, SlopeError> {
        check_data(x, y)?;
        let mut norm = Normalization::compute(x, &self.params.centering, &self.params.scaling)?;

        let jit = norm.jit();
        if self.params.modify_x && (jit.centers() || jit.scales()) {
            let normalized = x.to_dense_normalized(norm.centers(), norm.scales());
            norm.mark_materialized(true, true);
            log::debug!("Normalization materialized into a dense copy of X");
            return self.run(&normalized, &norm, y, alpha, lambda, interrupt);
        }
        self.run(x, &norm, y, alpha, lambda, interrupt)
    }

    /// [`Slope::path`] for a sparse design. Row-major input is converted to
    /// column-major first. Centering is always applied just in time, so the
    /// sparsity pattern is never destroyed.
    pub fn path_sparse(
        &self,
        x: &CsMat<f64>,
        y: ArrayView1<f64>,
        alpha: Option<Array1<f64>>,
        lambda: Option<Array1<f64>>,
        interrupt: Option<Interrupt<'_>>,
    ) -> Result<SlopePath, SlopeError> {
        let x = ensure_csc(x);
        check_data(&x, y)?;
        let mut norm = Normalization::compute(&x, &self.params.centering, &self.params.scaling)?;

        if self.params.modify_x && norm.jit().scales() {
            let scaled = scale_sparse_columns(&x, norm.scales());
            norm.mark_materialized(false, true);
            log::debug!("Column scaling materialized into a copy of sparse X");
            return self.run(&scaled, &norm, y, alpha, lambda, interrupt);
        }
        self.run(&x, &norm, y, alpha, lambda, interrupt)
    }

    fn single_alpha(&self, alpha: Option<f64>) -> Option<Array1<f64>> {
        match (alpha, self.params.alpha_type) {
            (Some(a), _) => Some(array![a]),
            (None, AlphaType::Estimate) => None,
            (None, AlphaType::Path) => Some(array![DEFAULT_ALPHA]),
        }
    }

    fn resolve_lambda(&self, lambda: Option<Array1<f64>>, len: usize, n: usize) -> Result<Array1<f64>, SlopeError> {
        let params = &self.params;
        let Some(lambda) = lambda else {
            return lambda_sequence(params.lambda_type, len, n, params.q, params.theta1, params.theta2);
        };
        if lambda.len() != len {
            return Err(SlopeError::DimensionMismatch {
                what: "lambda",
                expected: len,
                found: lambda.len(),
            });
        }
        if lambda.iter().any(|l| !l.is_finite()) {
            return Err(SlopeError::NonFinite("lambda"));
        }
        if lambda.iter().any(|&l| l < 0.0) {
            return Err(SlopeError::invalid("lambda must be non-negative"));
        }
        if lambda.windows(2).into_iter().any(|w| w[1] > w[0]) {
            return Err(SlopeError::invalid("lambda must be non-increasing"));
        }
        Ok(lambda)
    }

    /// The path loop, shared by every storage type. `norm` already reflects
    /// any materialization of `x`.
    fn run<X: DesignMatrix>(
        &self,
        x: &X,
        norm: &Normalization,
        y: ArrayView1<f64>,
        alpha: Option<Array1<f64>>,
        lambda: Option<Array1<f64>>,
        interrupt: Option<Interrupt<'_>>,
    ) -> Result<SlopePath, SlopeError> {
        let params = &self.params;
        let timer = Instant::now();
        let (n, p) = (x.nrows(), x.ncols());

        let loss = Loss::from(params.loss);
        let response = loss.preprocess_response(y)?;
        let m = response.ncols();

        let lambda = self.resolve_lambda(lambda, p * m, n)?;
        let penalty = SortedL1Norm::new(lambda);
        let design = NormalizedDesign::new(x, norm);

        let drop_constant = params.intercept || norm.is_centering();
        let full_set: Vec<usize> = (0..p).filter(|&j| !(drop_constant && norm.is_constant(j))).collect();
        if full_set.len() < p {
            log::info!(
                "{} constant column(s) excluded from the model",
                p - full_set.len()
            );
        }

        if alpha.is_none() && params.alpha_type == AlphaType::Estimate {
            let first = response.column(0);
            return estimate_alpha(
                n,
                &full_set,
                params.intercept,
                params.alpha_est_max_it,
                |columns| noise_on_columns(&design, first, columns, params.intercept),
                |a| self.run(x, norm, y, Some(array![a]), Some(penalty.lambda().to_owned()), None),
            );
        }

        let mut state = Iterate::zeros(n, p, m);
        if params.intercept {
            state.beta0 = loss.null_intercept(response.view());
            for (k, &b0) in state.beta0.iter().enumerate() {
                state.eta.column_mut(k).fill(b0);
            }
        }
        let null_deviance = loss.deviance(state.eta.view(), response.view());

        let all: Vec<usize> = (0..p).collect();
        let mut gradient = Array2::zeros((p, m));
        let residual = loss.residual(state.eta.view(), response.view());
        design.update_gradient(&mut gradient, residual.view(), &full_set);
        let flat_gradient = flatten(gradient.view(), &all);
        let alpha_max = penalty.dual_norm(flat_gradient.view(), 1.0);
        let magnitudes: Vec<f64> = flat_gradient.iter().map(|g| g.abs()).collect();
        let alpha_max_ind = which_max(&magnitudes) % p.max(1);

        let (alphas, automatic) = match alpha {
            Some(alphas) => {
                check_alpha(&alphas)?;
                (alphas, false)
            }
            None => {
                let ratio = params
                    .alpha_min_ratio
                    .unwrap_or_else(|| default_alpha_min_ratio(n, p));
                (alpha_grid(alpha_max, ratio, params.path_length), true)
            }
        };

        log::info!(
            "Fitting {} path: n = {n}, p = {p}, m = {m}, {} step(s) from alpha {:.4e} to {:.4e} (alpha_max {alpha_max:.4e})",
            loss.name(),
            alphas.len(),
            alphas[0],
            alphas[alphas.len() - 1],
        );

        let outer = OuterLoop {
            design: &design,
            loss,
            y: response.view(),
            penalty: &penalty,
            intercept: params.intercept,
            tol: params.tol,
            max_it: params.max_it,
            screening: params.screening,
            full_set: &full_set,
            diagnostics: params.diagnostics,
        };
        let mut solver = Solver::from_parameters(params);
        let max_clusters = params.max_clusters.unwrap_or(n + 1);

        let mut alpha_prev = alpha_max.max(alphas[0]);
        let mut fits: Vec<SlopeFit> = Vec::with_capacity(alphas.len());

        for (step, &alpha_curr) in alphas.iter().enumerate() {
            if interrupt.is_some_and(|stop| stop()) {
                log::info!("Path interrupted after {step} of {} steps", alphas.len());
                break;
            }

            let (mut working, strong) = match params.screening {
                ScreeningType::None => (full_set.clone(), full_set.clone()),
                ScreeningType::Strong => {
                    let residual = loss.residual(state.eta.view(), response.view());
                    design.update_gradient(&mut gradient, residual.view(), &full_set);
                    let previous = previously_active(state.beta.view());
                    let mut strong = strong_set(gradient.view(), penalty.lambda(), alpha_curr, alpha_prev);
                    strong.retain(|j| full_set.binary_search(j).is_ok());
                    let strong = set_union(&strong, &previous);
                    let working = if full_set.binary_search(&alpha_max_ind).is_ok() {
                        set_union(&previous, &[alpha_max_ind])
                    } else {
                        previous
                    };
                    (working, strong)
                }
            };

            solver.reset();
            let solution = outer.solve(alpha_curr, &mut state, &mut solver, &mut working, &strong);

            let flat_beta = flatten(state.beta.view(), &all);
            let pattern = Clusters::new(flat_beta.view()).pattern(flat_beta.view());
            let mut intercepts = state.beta0.clone();
            let coefficients = norm.rescale_coefficients(&state.beta, &mut intercepts, params.intercept);

            let fit = SlopeFit {
                intercepts,
                coefficients: to_sparse(&coefficients),
                alpha: alpha_curr,
                lambda: penalty.lambda().to_owned(),
                deviance: loss.deviance(state.eta.view(), response.view()),
                null_deviance,
                primals: solution.primals,
                duals: solution.duals,
                gaps: solution.gaps,
                times: solution.times,
                passes: solution.passes,
                converged: solution.converged,
                pattern,
                loss: params.loss,
            };
            log::debug!(
                "step {step}: alpha {alpha_curr:.4e}, deviance ratio {:.5}, {} non-zero, {} cluster(s), working set {}, {} pass(es)",
                fit.deviance_ratio(),
                fit.coefficients.nnz(),
                fit.n_clusters(),
                working.len(),
                fit.passes,
            );

            let stop = if automatic {
                early_stop(fits.last(), &fit, params.dev_change_tol, params.dev_ratio_tol, max_clusters)
            } else {
                None
            };
            fits.push(fit);
            if let Some(reason) = stop {
                log::warn!("Path stopped early at step {step}: {}", describe(reason));
                break;
            }
            alpha_prev = alpha_curr;
        }

        log::info!(
            "Path finished: {} step(s) in {:.3}s",
            fits.len(),
            timer.elapsed().as_secs_f64()
        );
        Ok(SlopePath { fits, null_deviance })
    }
}

fn early_stop(
    previous: Option<&SlopeFit>,
    current: &SlopeFit,
    dev_change_tol: f64,
    dev_ratio_tol: f64,
    max_clusters: usize,
) -> Option<EarlyStop> {
    let ratio = current.deviance_ratio();
    if ratio > dev_ratio_tol {
        return Some(EarlyStop::DevianceRatio(ratio));
    }
    if let Some(previous) = previous {
        let change = (ratio - previous.deviance_ratio()).abs();
        if change < dev_change_tol {
            return Some(EarlyStop::DevianceChange(change));
        }
    }
    if current.n_clusters() > max_clusters {
        return Some(EarlyStop::Clusters(current.n_clusters()));
    }
    None
}

fn describe(reason: EarlyStop) -> String {
    match reason {
        EarlyStop::DevianceChange(change) => format!("deviance ratio changed by only {change:.3e}"),
        EarlyStop::DevianceRatio(ratio) => format!("deviance ratio {ratio:.5} reached the tolerance"),
        EarlyStop::Clusters(count) => format!("{count} non-zero clusters exceed the cap"),
    }
}

fn last_fit(path: SlopePath) -> Result<SlopeFit, SlopeError> {
    path.into_fits()
        .pop()
        .ok_or_else(|| SlopeError::invalid("the fit was interrupted before the first step"))
}

fn check_data<X: DesignMatrix>(x: &X, y: ArrayView1<f64>) -> Result<(), SlopeError> {
    if x.nrows() == 0 || x.ncols() == 0 {
        return Err(SlopeError::invalid("the design matrix must have at least one row and one column"));
    }
    if y.len() != x.nrows() {
        return Err(SlopeError::DimensionMismatch {
            what: "response",
            expected: x.nrows(),
            found: y.len(),
        });
    }
    if x.has_non_finite() {
        return Err(SlopeError::NonFinite("design matrix"));
    }
    if y.iter().any(|v| !v.is_finite()) {
        return Err(SlopeError::NonFinite("response"));
    }
    Ok(())
}

fn check_alpha(alphas: &Array1<f64>) -> Result<(), SlopeError> {
    if alphas.is_empty() {
        return Err(SlopeError::invalid("alpha must contain at least one value"));
    }
    if alphas.iter().any(|a| !a.is_finite()) {
        return Err(SlopeError::NonFinite("alpha"));
    }
    if alphas.iter().any(|&a| a < 0.0) {
        return Err(SlopeError::invalid("alpha must be non-negative"));
    }
    if alphas.windows(2).into_iter().any(|w| w[1] > w[0]) {
        return Err(SlopeError::invalid("alpha must be non-increasing"));
    }
    Ok(())
}
