use itertools::Itertools;
use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis, Zip};
use std::cmp::Ordering;

pub fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

pub fn logit(p: f64) -> f64 {
    (p / (1.0 - p)).ln()
}

/// Sign with `sign(0) == 0`, unlike `f64::signum`.
pub fn sign(x: f64) -> f64 {
    if x > 0.0 {
        1.0
    } else if x < 0.0 {
        -1.0
    } else {
        0.0
    }
}

/// `x ln x`, continuously extended to 0 at the origin.
pub fn xlogx(x: f64) -> f64 {
    if x <= 0.0 { 0.0 } else { x * x.ln() }
}

/// Indices that sort `values` in decreasing order. Ties keep their original order.
pub fn sort_index_desc(values: &[f64]) -> Vec<usize> {
    let mut ord: Vec<usize> = (0..values.len()).collect();
    ord.sort_by(|&a, &b| values[b].partial_cmp(&values[a]).unwrap_or(Ordering::Equal));
    ord
}

pub fn cumsum(values: impl IntoIterator<Item = f64>) -> Vec<f64> {
    values
        .into_iter()
        .scan(0.0, |acc, v| {
            *acc += v;
            Some(*acc)
        })
        .collect()
}

pub fn which_max(values: &[f64]) -> usize {
    values
        .iter()
        .enumerate()
        .fold((0, f64::NEG_INFINITY), |(best, best_val), (i, &v)| {
            if v > best_val { (i, v) } else { (best, best_val) }
        })
        .0
}

/// Union of two sorted index sets.
pub fn set_union(a: &[usize], b: &[usize]) -> Vec<usize> {
    a.iter().merge(b.iter()).dedup().copied().collect()
}

/// Elements of sorted `a` not present in sorted `b`.
pub fn set_diff(a: &[usize], b: &[usize]) -> Vec<usize> {
    a.iter()
        .filter(|v| b.binary_search(v).is_err())
        .copied()
        .collect()
}

/// Row-wise log-sum-exp, shifted by the row maximum for stability.
pub fn log_sum_exp(eta: ArrayView2<f64>) -> Array1<f64> {
    eta.map_axis(Axis(1), |row| {
        let max = row.fold(f64::NEG_INFINITY, |m, &v| m.max(v));
        if !max.is_finite() {
            return max;
        }
        max + row.fold(0.0, |acc, &v| acc + (v - max).exp()).ln()
    })
}

/// Row-wise softmax.
pub fn softmax(eta: ArrayView2<f64>) -> Array2<f64> {
    let lse = log_sum_exp(eta);
    let mut out = eta.to_owned();
    Zip::from(out.rows_mut()).and(&lse).for_each(|mut row, &l| {
        row.mapv_inplace(|v| (v - l).exp());
    });
    out
}

pub fn mean(values: ArrayView1<f64>) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.sum() / values.len() as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    #[test]
    fn softmax_rows_sum_to_one_even_for_huge_inputs() {
        let eta = array![[1000.0, 1001.0, 999.0], [-3.0, 0.0, 2.0]];
        let p = softmax(eta.view());
        for row in p.rows() {
            assert_abs_diff_eq!(row.sum(), 1.0, epsilon = 1e-12);
        }
        assert!(p[[0, 1]] > p[[0, 0]]);
        assert_abs_diff_eq!(log_sum_exp(eta.view())[0], 1001.0 + (1.0 + (-1.0f64).exp() + (-2.0f64).exp()).ln(), epsilon = 1e-9);
    }

    #[test]
    fn index_sets_merge_and_subtract() {
        assert_eq!(set_union(&[0, 2, 5], &[1, 2, 7]), vec![0, 1, 2, 5, 7]);
        assert_eq!(set_diff(&[0, 1, 2, 5, 7], &[1, 5]), vec![0, 2, 7]);
        assert!(set_union(&[], &[]).is_empty());
    }

    #[test]
    fn sort_index_is_stable_and_decreasing() {
        assert_eq!(sort_index_desc(&[1.0, 3.0, 3.0, 2.0]), vec![1, 2, 3, 0]);
        assert_eq!(which_max(&[1.0, 3.0, 3.0, 2.0]), 1);
        assert_eq!(cumsum(vec![1.0, 2.0, 3.0]), vec![1.0, 3.0, 6.0]);
    }
}
