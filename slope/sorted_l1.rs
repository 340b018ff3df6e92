//! # Sorted L1 Norm
//!
//! Evaluation, proximal operator, and dual norm of
//! `J(β) = Σᵢ λᵢ |β|₍ᵢ₎` with `λ` non-increasing and non-negative.
//!
//! Every operation accepts a coefficient vector shorter than `λ`. In that case
//! the leading entries of `λ` are used, which is exactly the penalty of the
//! full vector when the omitted coordinates are zero (working-set solves).

use crate::math::{cumsum, sign, sort_index_desc};
use ndarray::{Array1, ArrayView1};

/// Floor on the cumulative weights when `α · Σλ` vanishes, so the dual norm
/// stays finite for unpenalized problems.
const DUAL_NORM_FLOOR: f64 = 1e-6;

#[derive(Debug, Clone)]
pub struct SortedL1Norm {
    lambda: Array1<f64>,
}

impl SortedL1Norm {
    pub fn new(lambda: Array1<f64>) -> Self {
        Self { lambda }
    }

    pub fn lambda(&self) -> ArrayView1<'_, f64> {
        self.lambda.view()
    }

    /// `α · Σᵢ λᵢ |β|₍ᵢ₎`.
    pub fn eval(&self, beta: ArrayView1<f64>, alpha: f64) -> f64 {
        let mut abs: Vec<f64> = beta.iter().map(|b| b.abs()).collect();
        abs.sort_by(|a, b| b.total_cmp(a));
        alpha
            * abs
                .iter()
                .zip(self.lambda.iter())
                .map(|(b, l)| b * l)
                .sum::<f64>()
    }

    /// `argmin_x ½‖x − v‖² + step · J(x)`, by pool-adjacent-violators on the
    /// sorted magnitudes.
    pub fn prox(&self, v: ArrayView1<f64>, step: f64) -> Array1<f64> {
        let p = v.len();
        let abs: Vec<f64> = v.iter().map(|x| x.abs()).collect();
        let ord = sort_index_desc(&abs);

        // Blocks are stored on a stack: [start, end] in sorted order, running sum
        // and mean. Merging pops while the previous mean does not exceed the top.
        let mut start = vec![0usize; p];
        let mut end = vec![0usize; p];
        let mut sum = vec![0.0; p];
        let mut mean = vec![0.0; p];
        let mut k = 0usize;

        for i in 0..p {
            start[k] = i;
            end[k] = i;
            sum[k] = abs[ord[i]] - self.lambda[i] * step;
            mean[k] = sum[k];

            while k > 0 && mean[k - 1] <= mean[k] {
                k -= 1;
                end[k] = i;
                sum[k] += sum[k + 1];
                mean[k] = sum[k] / (i - start[k] + 1) as f64;
            }
            k += 1;
        }

        let mut out = Array1::zeros(p);
        for block in 0..k {
            let value = mean[block].max(0.0);
            for &idx in &ord[start[block]..=end[block]] {
                out[idx] = sign(v[idx]) * value;
            }
        }
        out
    }

    /// `max_k Σᵢ≤ₖ |g|₍ᵢ₎ / (α Σᵢ≤ₖ λᵢ)`. A value at most one means `g` lies in
    /// the subdifferential ball of `α J` at the origin.
    pub fn dual_norm(&self, gradient: ArrayView1<f64>, alpha: f64) -> f64 {
        let mut abs: Vec<f64> = gradient.iter().map(|g| g.abs()).collect();
        abs.sort_by(|a, b| b.total_cmp(a));
        let num = cumsum(abs.iter().copied());
        let den = cumsum(self.lambda.iter().take(abs.len()).map(|l| alpha * l));

        let total = den.last().copied().unwrap_or(0.0);
        if total <= 0.0 {
            return num.iter().fold(0.0, |m: f64, &v| m.max(v)) / DUAL_NORM_FLOOR;
        }

        num.iter()
            .zip(den.iter())
            .filter(|(_, d)| **d > 0.0)
            .fold(0.0, |m: f64, (n, d)| m.max(n / d))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    #[test]
    fn prox_matches_reference_values() {
        let norm = SortedL1Norm::new(array![4.0, 2.0]);
        let out = norm.prox(array![5.0, 2.0].view(), 1.0);
        assert_abs_diff_eq!(out, array![1.0, 0.0], epsilon = 1e-12);

        let norm = SortedL1Norm::new(array![3.0, 3.0]);
        let out = norm.prox(array![3.0, 3.0].view(), 1.0);
        assert_abs_diff_eq!(out, array![0.0, 0.0], epsilon = 1e-12);

        let norm = SortedL1Norm::new(array![3.0, 0.0]);
        let out = norm.prox(array![2.0, 1.0].view(), 1.0);
        assert_abs_diff_eq!(out, array![0.0, 0.0], epsilon = 1e-12);
    }

    #[test]
    fn prox_pools_violators_and_keeps_signs() {
        let norm = SortedL1Norm::new(array![1.0, 0.75, 0.5, 0.25]);
        let out = norm.prox(array![-8.0, 6.0, 4.0, -2.0].view(), 1.0);
        assert_abs_diff_eq!(out, array![-7.0, 5.25, 3.5, -1.75], epsilon = 1e-12);

        // Equal inputs with decreasing weights are pooled to a common magnitude.
        let norm = SortedL1Norm::new(array![2.0, 1.0]);
        let out = norm.prox(array![3.0, -3.0].view(), 1.0);
        assert_abs_diff_eq!(out, array![1.5, -1.5], epsilon = 1e-12);
    }

    #[test]
    fn prox_limits_in_the_step_size() {
        let mut rng = StdRng::seed_from_u64(42);
        let lambda = Array1::from_iter((0..20).rev().map(|i| 0.1 + i as f64 * 0.05));
        let norm = SortedL1Norm::new(lambda);
        let v = Array1::from_iter((0..20).map(|_| rng.gen_range(-3.0..3.0)));

        assert_abs_diff_eq!(norm.prox(v.view(), 0.0), v, epsilon = 1e-12);
        assert!(norm.prox(v.view(), 1e6).iter().all(|&x| x == 0.0));

        let out = norm.prox(v.view(), 0.3);
        let ord = sort_index_desc(&v.iter().map(|x| x.abs()).collect::<Vec<_>>());
        for w in ord.windows(2) {
            assert!(out[w[0]].abs() >= out[w[1]].abs() - 1e-12);
        }
        // Idempotent for a fixed input.
        assert_abs_diff_eq!(norm.prox(v.view(), 0.3), out, epsilon = 0.0);
    }

    #[test]
    fn dual_norm_is_the_largest_cumulative_ratio() {
        let norm = SortedL1Norm::new(array![2.0, 1.0]);
        // sorted |g| = (3, 1); cumulative ratios 3/2 and 4/3.
        assert_abs_diff_eq!(norm.dual_norm(array![1.0, -3.0].view(), 1.0), 1.5, epsilon = 1e-12);
        assert_abs_diff_eq!(norm.dual_norm(array![1.0, -3.0].view(), 0.5), 3.0, epsilon = 1e-12);
        assert_abs_diff_eq!(norm.eval(array![1.0, -3.0].view(), 0.5), 3.5, epsilon = 1e-12);
    }
}
