//! # Inner Solvers
//!
//! One call advances the coefficients for a fixed α on the current working set.
//! The hybrid solver works on the IRLS surrogate of the loss and alternates
//! proximal gradient steps with cluster coordinate descent. The proximal
//! gradient solvers (plain and accelerated) take a single step on the full loss
//! and leave convergence checking to the outer loop.
//!
//! Coefficient blocks of the working set are flattened column-major, so the
//! sorted-L1 prox sees one vector of length `|W| · m`.

mod hybrid;
mod hybrid_cd;
mod pgd;

pub use hybrid::Hybrid;
pub use pgd::ProximalGradient;

use crate::kernels::NormalizedDesign;
use crate::losses::Loss;
use crate::matrix::DesignMatrix;
use crate::parameters::{SlopeParameters, SolverType};
use crate::sorted_l1::SortedL1Norm;
use crate::warnings::{WarningCode, add_warning};
use ndarray::{Array1, Array2, ArrayView1, ArrayView2};

/// Backtracking gives up after this many shrinks of the step.
const MAX_BACKTRACKS: usize = 64;

/// Relative slack on the majorization test, absorbing rounding in the loss.
const MAJORIZATION_SLACK: f64 = 1e-12;

/// Solver state for one α: intercepts, coefficients, and the linear predictor
/// that belongs to them.
#[derive(Debug, Clone)]
pub struct Iterate {
    pub beta0: Array1<f64>,
    pub beta: Array2<f64>,
    pub eta: Array2<f64>,
}

impl Iterate {
    pub fn zeros(n: usize, p: usize, m: usize) -> Self {
        Iterate {
            beta0: Array1::zeros(m),
            beta: Array2::zeros((p, m)),
            eta: Array2::zeros((n, m)),
        }
    }
}

/// Read-only description of the problem at one α.
pub struct Problem<'a, X: DesignMatrix> {
    pub design: &'a NormalizedDesign<'a, X>,
    pub loss: Loss,
    pub y: ArrayView2<'a, f64>,
    pub penalty: &'a SortedL1Norm,
    pub alpha: f64,
    pub intercept: bool,
    pub tol: f64,
}

#[derive(Debug, Clone)]
pub enum Solver {
    Hybrid(Hybrid),
    ProximalGradient(ProximalGradient),
}

impl Solver {
    pub fn from_parameters(params: &SlopeParameters) -> Self {
        match params.resolved_solver() {
            SolverType::Pgd => Solver::ProximalGradient(ProximalGradient::new(false, params.learning_rate_decr)),
            SolverType::Fista => Solver::ProximalGradient(ProximalGradient::new(true, params.learning_rate_decr)),
            SolverType::Hybrid | SolverType::Auto => Solver::Hybrid(Hybrid::new(params)),
        }
    }

    /// Advances `state` on `working` and returns the number of passes made.
    pub fn run<X: DesignMatrix>(&mut self, state: &mut Iterate, problem: &Problem<X>, working: &[usize]) -> usize {
        match self {
            Solver::Hybrid(solver) => solver.run(state, problem, working),
            Solver::ProximalGradient(solver) => solver.run(state, problem, working),
        }
    }

    /// Forgets momentum and step-size history, e.g. between path steps.
    pub fn reset(&mut self) {
        if let Solver::ProximalGradient(solver) = self {
            solver.restart();
        }
    }
}

/// `β[W, :]` flattened column-major.
pub(crate) fn flatten(beta: ArrayView2<f64>, working: &[usize]) -> Array1<f64> {
    let mut out = Array1::zeros(working.len() * beta.ncols());
    let mut f = 0;
    for k in 0..beta.ncols() {
        for &j in working {
            out[f] = beta[[j, k]];
            f += 1;
        }
    }
    out
}

/// Inverse of [`flatten`]: writes `flat` back into the rows `working`.
pub(crate) fn scatter(beta: &mut Array2<f64>, working: &[usize], flat: ArrayView1<f64>) {
    let mut f = 0;
    for k in 0..beta.ncols() {
        for &j in working {
            beta[[j, k]] = flat[f];
            f += 1;
        }
    }
}

/// Backtracking proximal gradient step with an adaptive learning rate that
/// persists across calls.
#[derive(Debug, Clone)]
pub(crate) struct LineSearch {
    learning_rate: f64,
    decr: f64,
}

impl LineSearch {
    pub(crate) fn new(decr: f64) -> Self {
        LineSearch { learning_rate: 1.0, decr }
    }

    pub(crate) fn reset(&mut self) {
        self.learning_rate = 1.0;
    }

    /// Searches along `prox(start − t·gradient)` until the smooth part
    /// `smooth(candidate)` sits below its quadratic majorizer at `start`.
    /// `smooth` also returns whatever the caller wants to keep from the
    /// accepted candidate. Returns `None`, and records a warning, when the step
    /// collapses.
    pub(crate) fn step<T>(
        &mut self,
        start: ArrayView1<f64>,
        gradient: ArrayView1<f64>,
        f_old: f64,
        penalty: &SortedL1Norm,
        alpha: f64,
        mut smooth: impl FnMut(&Array1<f64>) -> (f64, T),
    ) -> Option<(Array1<f64>, T)> {
        for _ in 0..MAX_BACKTRACKS {
            let t = self.learning_rate;
            let shifted = &start - &(&gradient * t);
            let candidate = penalty.prox(shifted.view(), t * alpha);
            let diff = &candidate - &start;
            let (f_new, extra) = smooth(&candidate);
            let majorizer = f_old + diff.dot(&gradient) + diff.dot(&diff) / (2.0 * t);

            if f_new.is_finite() && majorizer >= f_new * (1.0 - MAJORIZATION_SLACK) {
                self.learning_rate *= 1.1;
                return Some((candidate, extra));
            }
            self.learning_rate *= self.decr;
        }

        add_warning(
            WarningCode::LineSearchFailed,
            format!(
                "no sufficient decrease after {MAX_BACKTRACKS} backtracking steps (learning rate {:.3e})",
                self.learning_rate
            ),
        );
        self.reset();
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    #[test]
    fn flatten_and_scatter_are_column_major() {
        let beta = array![[1.0, 4.0], [2.0, 5.0], [3.0, 6.0]];
        let flat = flatten(beta.view(), &[0, 2]);
        assert_eq!(flat, array![1.0, 3.0, 4.0, 6.0]);

        let mut out = Array2::zeros((3, 2));
        scatter(&mut out, &[0, 2], flat.view());
        assert_eq!(out, array![[1.0, 4.0], [0.0, 0.0], [3.0, 6.0]]);
    }

    #[test]
    fn line_search_finds_the_prox_of_a_quadratic() {
        // f(b) = ½‖b − c‖², so one full step lands on prox(c).
        let c = array![3.0, -1.0, 0.5];
        let penalty = SortedL1Norm::new(array![1.0, 0.5, 0.25]);
        let start = Array1::zeros(3);
        let gradient = -&c;
        let mut search = LineSearch::new(0.5);
        let f = |b: &Array1<f64>| {
            let d = b - &c;
            (0.5 * d.dot(&d), ())
        };
        let (candidate, _) = search
            .step(start.view(), gradient.view(), 0.5 * c.dot(&c), &penalty, 1.0, f)
            .unwrap();
        assert_abs_diff_eq!(candidate, penalty.prox(c.view(), 1.0), epsilon = 1e-12);
        assert!(search.learning_rate > 1.0);
    }

    #[test]
    fn line_search_reports_collapse() {
        let penalty = SortedL1Norm::new(array![1.0]);
        let mut search = LineSearch::new(0.5);
        let result = search.step(
            array![1.0].view(),
            array![-1.0].view(),
            0.0,
            &penalty,
            0.0,
            |_| (f64::NAN, ()),
        );
        assert!(result.is_none());
        assert_eq!(search.learning_rate, 1.0);
    }
}
