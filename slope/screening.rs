//! Strong-rule screening and KKT checks.
//!
//! Coefficient blocks are `p × m`. Both rules work on the flattened block in
//! column-major order, so flat position `f` belongs to predictor `f % p`, and
//! report predictors (rows) rather than individual coefficients.

use crate::math::sort_index_desc;
use ndarray::{ArrayView1, ArrayView2};

/// Predictors with at least one non-zero coefficient.
pub fn previously_active(beta: ArrayView2<f64>) -> Vec<usize> {
    beta.rows()
        .into_iter()
        .enumerate()
        .filter(|(_, row)| row.iter().any(|&b| b != 0.0))
        .map(|(j, _)| j)
        .collect()
}

fn flat_abs(gradient: ArrayView2<f64>, rows: &[usize]) -> Vec<(usize, f64)> {
    let mut out = Vec::with_capacity(rows.len() * gradient.ncols());
    for k in 0..gradient.ncols() {
        for &j in rows {
            out.push((j, gradient[[j, k]].abs()));
        }
    }
    out
}

fn sorted_predictors(mut picked: Vec<usize>) -> Vec<usize> {
    picked.sort_unstable();
    picked.dedup();
    picked
}

/// Sorted strong rule for moving from `alpha_prev` to `alpha`, given the
/// gradient at the previous solution. Blocks of the sorted gradient are kept
/// whenever their accumulated excess over `(2α − α_prev) λ` is non-negative.
pub fn strong_set(gradient: ArrayView2<f64>, lambda: ArrayView1<f64>, alpha: f64, alpha_prev: f64) -> Vec<usize> {
    let rows: Vec<usize> = (0..gradient.nrows()).collect();
    let entries = flat_abs(gradient, &rows);
    let magnitudes: Vec<f64> = entries.iter().map(|e| e.1).collect();
    let ord = sort_index_desc(&magnitudes);
    let factor = 2.0 * alpha - alpha_prev;

    let mut kept = 0;
    let mut running = 0.0;
    for (i, &idx) in ord.iter().enumerate() {
        running += magnitudes[idx] - factor * lambda[i];
        if running >= 0.0 {
            kept = i + 1;
            running = 0.0;
        }
    }

    sorted_predictors(ord[..kept].iter().map(|&idx| entries[idx].0).collect())
}

/// Predictors among `candidates` that break the optimality condition
/// `Σᵢ≤ₖ |g|₍ᵢ₎ ≤ α Σᵢ≤ₖ λᵢ` of a zero coefficient block.
pub fn kkt_violations(
    gradient: ArrayView2<f64>,
    lambda: ArrayView1<f64>,
    alpha: f64,
    candidates: &[usize],
) -> Vec<usize> {
    let entries = flat_abs(gradient, candidates);
    let magnitudes: Vec<f64> = entries.iter().map(|e| e.1).collect();
    let ord = sort_index_desc(&magnitudes);

    let mut running = 0.0;
    let mut violations = Vec::new();
    for (i, &idx) in ord.iter().enumerate() {
        running += magnitudes[idx] - alpha * lambda[i];
        if running > 0.0 {
            violations.push(entries[idx].0);
        }
    }
    sorted_predictors(violations)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn previously_active_rows() {
        let beta = array![[0.0, 0.0], [0.0, 1.0], [2.0, 0.0], [0.0, 0.0]];
        assert_eq!(previously_active(beta.view()), vec![1, 2]);
    }

    #[test]
    fn strong_rule_keeps_the_large_gradients() {
        let gradient = array![[0.1], [2.0], [0.9], [1.5]];
        let lambda = array![4.0, 3.0, 2.0, 1.0];
        // 2α − α_prev = 0.4: sorted weights (1.6, 1.2, 0.8, 0.4).
        let strong = strong_set(gradient.view(), lambda.view(), 0.5, 0.6);
        assert_eq!(strong, vec![1, 2, 3]);

        let none = strong_set(gradient.view(), lambda.view(), 1.0, 1.0);
        assert!(none.is_empty());
    }

    #[test]
    fn strong_rule_accumulates_small_deficits() {
        // The top entry alone falls short but the block of two pays off.
        let gradient = array![[0.1], [2.5], [1.8]];
        let lambda = array![3.0, 1.0, 1.0];
        let strong = strong_set(gradient.view(), lambda.view(), 1.0, 1.0);
        assert_eq!(strong, vec![1, 2]);
    }

    #[test]
    fn kkt_flags_cumulative_violations() {
        let gradient = array![[0.5, 0.0], [0.0, 3.0], [1.0, 0.2]];
        let lambda = array![2.0, 1.5, 1.0, 0.5, 0.25, 0.1];
        assert_eq!(kkt_violations(gradient.view(), lambda.view(), 1.0, &[0, 1, 2]), vec![1, 2]);
        assert!(kkt_violations(gradient.view(), lambda.view(), 2.0, &[0, 1, 2]).is_empty());
        assert!(kkt_violations(gradient.view(), lambda.view(), 1.0, &[0, 2]).is_empty());
    }
}
