//! Hybrid proximal gradient and coordinate descent on the IRLS surrogate.
//!
//! Each inner iteration checks the duality gap of the weighted least-squares
//! surrogate, takes one proximal gradient step (the only step that can split
//! clusters or activate predictors), then runs `pgd_freq` coordinate-descent
//! sweeps over the clusters. Only single-response losses are supported.

use super::hybrid_cd::CoordinateDescent;
use super::{Iterate, LineSearch, Problem, flatten, scatter};
use crate::clusters::Clusters;
use crate::losses::LossFunction;
use crate::matrix::DesignMatrix;
use crate::parameters::{CdType, SlopeParameters};
use crate::threshold::LambdaSums;
use ndarray::{Array1, Array2, Axis, Zip, array};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;

#[derive(Debug, Clone)]
pub struct Hybrid {
    line_search: LineSearch,
    max_it_inner: usize,
    pgd_freq: usize,
    update_clusters: bool,
    cd_type: CdType,
    rng: StdRng,
}

impl Hybrid {
    pub fn new(params: &SlopeParameters) -> Self {
        Hybrid {
            line_search: LineSearch::new(params.learning_rate_decr),
            max_it_inner: params.max_it_inner,
            pgd_freq: params.pgd_freq,
            update_clusters: params.update_clusters,
            cd_type: params.hybrid_cd_type,
            rng: StdRng::seed_from_u64(params.cd_seed),
        }
    }

    fn sweep_order(&mut self, n_clusters: usize) -> Vec<usize> {
        let mut order: Vec<usize> = (0..n_clusters).collect();
        if self.cd_type == CdType::Permuted {
            order.shuffle(&mut self.rng);
        }
        order
    }

    pub fn run<X: DesignMatrix>(&mut self, state: &mut Iterate, problem: &Problem<X>, working: &[usize]) -> usize {
        let design = problem.design;
        let penalty = problem.penalty;
        let alpha = problem.alpha;
        let n = design.nrows();
        let p = design.ncols();
        let nf = n as f64;

        let mut w2 = Array2::ones((n, 1));
        let mut z2 = Array2::zeros((n, 1));
        problem
            .loss
            .update_weights_and_working_response(&mut w2, &mut z2, state.eta.view(), problem.y);
        let w = w2.column(0).to_owned();
        let z = z2.column(0).to_owned();
        let w_sum = w.sum();

        let mut r = &state.eta.column(0) - &z;
        let mut clusters = Clusters::new(state.beta.column(0));
        let sums = LambdaSums::new(penalty.lambda().iter().copied());
        let cd = CoordinateDescent {
            design,
            w: w.view(),
            w_sum,
            sums: &sums,
            alpha,
            intercept: problem.intercept,
            update_clusters: self.update_clusters,
        };

        let no_intercept = Array1::zeros(1);
        let mut gradient = Array2::zeros((p, 1));
        let mut passes = 0;

        for it in 0..self.max_it_inner {
            let wr = &w * &r;
            let f_old = wr.dot(&r) / (2.0 * nf);
            let start = flatten(state.beta.view(), working);
            let primal = f_old + penalty.eval(start.view(), alpha);

            design.update_gradient(&mut gradient, wr.view().insert_axis(Axis(1)), working);

            let mut theta = wr.clone();
            let mut dual_gradient = gradient.clone();
            if problem.intercept {
                let mean = theta.mean().unwrap_or(0.0);
                theta.mapv_inplace(|v| v - mean);
                design.offset_gradient(&mut dual_gradient, array![mean].view(), working);
            }
            let dual_scale = penalty
                .dual_norm(flatten(dual_gradient.view(), working).view(), alpha)
                .max(1.0);
            theta.mapv_inplace(|v| v / dual_scale);
            let dual = -Zip::from(&theta).and(&z).and(&w).fold(0.0, |acc, &t, &zi, &wi| {
                let quadratic = if wi > 0.0 { t * t / (2.0 * wi) } else { 0.0 };
                acc + t * zi + quadratic
            }) / nf;

            let gap = primal - dual;
            log::trace!("inner iteration {it}: primal {primal:.6e}, gap {gap:.3e}");
            if gap.max(0.0) <= problem.tol * (1.0 + primal.abs()) {
                break;
            }
            passes += 1;
            let beta0_before = state.beta0[0];

            let step = self.line_search.step(
                start.view(),
                flatten(gradient.view(), working).view(),
                f_old,
                penalty,
                alpha,
                |candidate| {
                    let mut delta = Array2::zeros((p, 1));
                    scatter(&mut delta, working, (candidate - &start).view());
                    let shift = design.linear_predictor(delta.view(), no_intercept.view(), working, false);
                    let r_new = &r + &shift.column(0);
                    let f_new = Zip::from(&w).and(&r_new).fold(0.0, |acc, &wi, &ri| acc + wi * ri * ri) / (2.0 * nf);
                    (f_new, r_new)
                },
            );

            if let Some((candidate, r_new)) = step {
                scatter(&mut state.beta, working, candidate.view());
                r = r_new;
                if problem.intercept && w_sum > 0.0 {
                    let shift = w.dot(&r) / w_sum;
                    state.beta0[0] -= shift;
                    r.mapv_inplace(|v| v - shift);
                }
                clusters.update_from(state.beta.column(0));
            }

            for _ in 0..self.pgd_freq {
                let order = self.sweep_order(clusters.n_clusters());
                let mut beta0 = state.beta0[0];
                cd.sweep(&order, state.beta.column_mut(0), &mut beta0, &mut r, &mut clusters);
                state.beta0[0] = beta0;
            }

            if flatten(state.beta.view(), working) == start && state.beta0[0] == beta0_before {
                log::trace!("inner iteration {it}: iterate unchanged, stopping");
                break;
            }
        }

        state.eta.column_mut(0).assign(&(&z + &r));
        passes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernels::NormalizedDesign;
    use crate::losses::Loss;
    use crate::normalize::Normalization;
    use crate::parameters::LossType;
    use crate::sorted_l1::SortedL1Norm;
    use approx::assert_abs_diff_eq;

    fn identity_problem(cd_type: CdType) -> Iterate {
        let x = Array2::from_diag(&array![1.0, 1.0, 1.0, 1.0]);
        let y = array![[8.0], [6.0], [4.0], [2.0]];
        let norm = Normalization::none(4);
        let design = NormalizedDesign::new(&x, &norm);
        // λ is scaled by 1/n so the mean-loss problem matches ½‖y − β‖² + J(β).
        let penalty = SortedL1Norm::new(array![1.0, 0.75, 0.5, 0.25] / 4.0);
        let problem = Problem {
            design: &design,
            loss: Loss::from(LossType::Quadratic),
            y: y.view(),
            penalty: &penalty,
            alpha: 1.0,
            intercept: false,
            tol: 1e-12,
        };
        let params = SlopeParameters {
            hybrid_cd_type: cd_type,
            cd_seed: 7,
            ..SlopeParameters::default()
        };
        let mut solver = Hybrid::new(&params);
        let mut state = Iterate::zeros(4, 4, 1);
        solver.run(&mut state, &problem, &[0, 1, 2, 3]);
        state
    }

    #[test]
    fn identity_design_recovers_the_prox() {
        for cd_type in [CdType::Cyclical, CdType::Permuted] {
            let state = identity_problem(cd_type);
            assert_abs_diff_eq!(state.beta.column(0), array![7.0, 5.25, 3.5, 1.75].view(), epsilon = 1e-8);
            assert_abs_diff_eq!(state.eta.column(0), state.beta.column(0), epsilon = 1e-10);
        }
    }

    #[test]
    fn intercept_absorbs_the_response_mean() {
        let x = array![[1.0], [2.0], [3.0], [4.0]];
        let y = array![[3.0], [5.0], [7.0], [9.0]];
        let norm = Normalization::none(1);
        let design = NormalizedDesign::new(&x, &norm);
        let penalty = SortedL1Norm::new(array![1.0]);
        let problem = Problem {
            design: &design,
            loss: Loss::from(LossType::Quadratic),
            y: y.view(),
            penalty: &penalty,
            alpha: 1e-10,
            intercept: true,
            tol: 1e-12,
        };
        let mut solver = Hybrid::new(&SlopeParameters::default());
        let mut state = Iterate::zeros(4, 1, 1);
        let passes = solver.run(&mut state, &problem, &[0]);
        assert!(passes > 0);
        assert_abs_diff_eq!(state.beta[[0, 0]], 2.0, epsilon = 1e-6);
        assert_abs_diff_eq!(state.beta0[0], 1.0, epsilon = 1e-6);
    }
}
