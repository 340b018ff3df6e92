//! # Outer Loop
//!
//! Solves the problem at one α. Every outer iteration evaluates the duality
//! gap of the full loss restricted to the working set. Once the gap is small
//! the strong set, and then every candidate predictor, is checked for KKT
//! violations; violators join the working set and the solver runs again.
//! Running out of iterations is not an error: the last iterate is kept and a
//! warning is recorded.

use crate::kernels::NormalizedDesign;
use crate::losses::{Loss, LossFunction, column_means};
use crate::math::{set_diff, set_union};
use crate::matrix::DesignMatrix;
use crate::parameters::ScreeningType;
use crate::screening::kkt_violations;
use crate::solvers::{Iterate, Problem, Solver, flatten};
use crate::sorted_l1::SortedL1Norm;
use crate::warnings::{WarningCode, add_warning};
use ndarray::{Array2, ArrayView2};
use std::time::Instant;

/// Everything about a fit that stays fixed while α moves.
pub struct OuterLoop<'a, X: DesignMatrix> {
    pub design: &'a NormalizedDesign<'a, X>,
    pub loss: Loss,
    pub y: ArrayView2<'a, f64>,
    pub penalty: &'a SortedL1Norm,
    pub intercept: bool,
    pub tol: f64,
    pub max_it: usize,
    pub screening: ScreeningType,
    /// Predictors that may enter the model at all.
    pub full_set: &'a [usize],
    pub diagnostics: bool,
}

/// Convergence record of one α.
#[derive(Debug, Clone, Default)]
pub struct AlphaSolution {
    pub primals: Vec<f64>,
    pub duals: Vec<f64>,
    pub gaps: Vec<f64>,
    /// Seconds since the start of this α, one entry per recorded iteration.
    pub times: Vec<f64>,
    pub passes: usize,
    pub converged: bool,
}

impl AlphaSolution {
    fn record(&mut self, keep_history: bool, primal: f64, dual: f64, seconds: f64) {
        if !keep_history {
            self.primals.clear();
            self.duals.clear();
            self.gaps.clear();
            self.times.clear();
        }
        self.primals.push(primal);
        self.duals.push(dual);
        self.gaps.push(primal - dual);
        self.times.push(seconds);
    }
}

impl<X: DesignMatrix> OuterLoop<'_, X> {
    /// Primal value, dual value, and loss residual at `state`, with the dual
    /// point taken as the rescaled (and, with an intercept, centered) residual.
    fn duality_gap(&self, state: &Iterate, working: &[usize], alpha: f64, gradient: &mut Array2<f64>) -> (f64, f64, Array2<f64>) {
        let residual = self.loss.residual(state.eta.view(), self.y);
        self.design.update_gradient(gradient, residual.view(), working);

        let primal = self.loss.loss(state.eta.view(), self.y)
            + self.penalty.eval(flatten(state.beta.view(), working).view(), alpha);

        let mut theta = residual.clone();
        let mut dual_gradient = gradient.clone();
        if self.intercept {
            let means = column_means(&theta);
            for (k, &mean) in means.iter().enumerate() {
                theta.column_mut(k).mapv_inplace(|v| v - mean);
            }
            self.design.offset_gradient(&mut dual_gradient, means.view(), working);
        }
        let scale = self
            .penalty
            .dual_norm(flatten(dual_gradient.view(), working).view(), alpha)
            .max(1.0);
        theta.mapv_inplace(|v| v / scale);

        (primal, self.loss.dual(theta.view(), self.y), residual)
    }

    /// Predictors outside `working` that violate the optimality conditions,
    /// checked on the strong set first and then on every candidate.
    fn violations(&self, residual: ArrayView2<f64>, gradient: &mut Array2<f64>, alpha: f64, working: &[usize], strong: &[usize]) -> Vec<usize> {
        let lambda = self.penalty.lambda();
        self.design.update_gradient(gradient, residual, strong);
        let found = set_diff(&kkt_violations(gradient.view(), lambda, alpha, strong), working);
        if !found.is_empty() {
            log::trace!("{} KKT violations in the strong set", found.len());
            return found;
        }
        self.design.update_gradient(gradient, residual, self.full_set);
        let found = set_diff(&kkt_violations(gradient.view(), lambda, alpha, self.full_set), working);
        if !found.is_empty() {
            log::trace!("{} KKT violations outside the strong set", found.len());
        }
        found
    }

    /// Runs the solver at `alpha` until the gap closes and no KKT violation
    /// remains. `working` is extended in place.
    pub fn solve(&self, alpha: f64, state: &mut Iterate, solver: &mut Solver, working: &mut Vec<usize>, strong: &[usize]) -> AlphaSolution {
        let timer = Instant::now();
        let (p, m) = state.beta.dim();
        let mut gradient = Array2::zeros((p, m));
        let mut out = AlphaSolution::default();

        let problem = Problem {
            design: self.design,
            loss: self.loss,
            y: self.y,
            penalty: self.penalty,
            alpha,
            intercept: self.intercept,
            tol: self.tol,
        };

        for it in 0..self.max_it {
            let (primal, dual, residual) = self.duality_gap(state, working, alpha, &mut gradient);
            out.record(self.diagnostics, primal, dual, timer.elapsed().as_secs_f64());
            let gap = primal - dual;
            log::trace!(
                "outer iteration {it}: primal {primal:.6e}, gap {gap:.3e}, working set {}",
                working.len()
            );

            if gap.max(0.0) <= self.tol * (1.0 + primal.abs()) {
                if self.screening == ScreeningType::None {
                    out.converged = true;
                    break;
                }
                let found = self.violations(residual.view(), &mut gradient, alpha, working, strong);
                if found.is_empty() {
                    out.converged = true;
                    break;
                }
                *working = set_union(working, &found);
            }

            out.passes += solver.run(state, &problem, working);
        }

        if !out.converged {
            add_warning(
                WarningCode::MaxitReached,
                format!(
                    "maximum number of iterations ({}) reached at alpha = {alpha:.4e}",
                    self.max_it
                ),
            );
        }
        out
    }
}
