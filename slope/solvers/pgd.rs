//! Proximal gradient descent on the full loss, optionally accelerated.
//!
//! Every call takes one backtracking step from the current iterate (or, with
//! acceleration, from the momentum point). Momentum is dropped whenever the
//! objective goes up or the working set changes between calls.

use super::{Iterate, LineSearch, Problem, flatten, scatter};
use crate::losses::LossFunction;
use crate::matrix::DesignMatrix;
use crate::warnings::{WarningCode, add_warning};
use ndarray::{Array1, Array2};

#[derive(Debug, Clone)]
pub struct ProximalGradient {
    line_search: LineSearch,
    accelerated: bool,
    momentum: f64,
    previous: Option<Array1<f64>>,
    last_working: Vec<usize>,
}

impl ProximalGradient {
    pub fn new(accelerated: bool, learning_rate_decr: f64) -> Self {
        ProximalGradient {
            line_search: LineSearch::new(learning_rate_decr),
            accelerated,
            momentum: 1.0,
            previous: None,
            last_working: Vec::new(),
        }
    }

    pub fn restart(&mut self) {
        self.momentum = 1.0;
        self.previous = None;
    }

    pub fn run<X: DesignMatrix>(&mut self, state: &mut Iterate, problem: &Problem<X>, working: &[usize]) -> usize {
        let design = problem.design;
        let loss = problem.loss;
        let y = problem.y;
        let p = design.ncols();
        let m = y.ncols();

        if problem.intercept && !loss.update_intercept(&mut state.beta0, &mut state.eta, y) {
            add_warning(
                WarningCode::LineSearchFailed,
                format!("{} intercept step found no sufficient decrease", loss.name()),
            );
        }

        if working != self.last_working.as_slice() {
            self.restart();
            self.last_working = working.to_vec();
        }

        let current = flatten(state.beta.view(), working);
        let objective_old = loss.loss(state.eta.view(), y) + problem.penalty.eval(current.view(), problem.alpha);

        let t_next = 0.5 * (1.0 + (1.0 + 4.0 * self.momentum * self.momentum).sqrt());
        let weight = (self.momentum - 1.0) / t_next;
        let (point, eta_point) = match &self.previous {
            Some(previous) if self.accelerated && weight > 0.0 => {
                let point = &current + &((&current - previous) * weight);
                let mut beta = state.beta.clone();
                scatter(&mut beta, working, point.view());
                let eta = design.linear_predictor(beta.view(), state.beta0.view(), working, problem.intercept);
                (point, eta)
            }
            _ => (current.clone(), state.eta.clone()),
        };

        let residual = loss.residual(eta_point.view(), y);
        let mut gradient = Array2::zeros((p, m));
        design.update_gradient(&mut gradient, residual.view(), working);
        let f_old = loss.loss(eta_point.view(), y);

        let beta0 = state.beta0.view();
        let mut scratch = state.beta.clone();
        let step = self.line_search.step(
            point.view(),
            flatten(gradient.view(), working).view(),
            f_old,
            problem.penalty,
            problem.alpha,
            |candidate| {
                scatter(&mut scratch, working, candidate.view());
                let eta = design.linear_predictor(scratch.view(), beta0, working, problem.intercept);
                (loss.loss(eta.view(), y), eta)
            },
        );

        match step {
            Some((candidate, eta)) => {
                let objective_new = loss.loss(eta.view(), y) + problem.penalty.eval(candidate.view(), problem.alpha);
                scatter(&mut state.beta, working, candidate.view());
                state.eta = eta;
                if self.accelerated && objective_new <= objective_old {
                    self.momentum = t_next;
                    self.previous = Some(current);
                } else {
                    self.restart();
                    self.previous = Some(current);
                }
            }
            None => self.restart(),
        }
        1
    }
}
