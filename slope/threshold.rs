//! Cluster-aware soft thresholding for one coordinate-descent step.
//!
//! A cluster moving to a new magnitude takes over the λ weights of the ranks it
//! lands on. The rule scans upward (the cluster overtakes larger ones) or
//! downward (it falls below smaller ones) and stops at the first position whose
//! bracketing inequalities hold. Landing exactly on a neighbour's magnitude is a
//! merge; falling through the last non-zero cluster lands on zero.

use crate::clusters::Clusters;
use crate::math::sign;

/// Prefix sums of λ with a leading zero, so the weight block of ranks
/// `start..start + len` is a difference of two entries.
#[derive(Debug, Clone)]
pub struct LambdaSums {
    cum: Vec<f64>,
}

impl LambdaSums {
    pub fn new(lambda: impl IntoIterator<Item = f64>) -> Self {
        let mut cum = vec![0.0];
        let mut acc = 0.0;
        for l in lambda {
            acc += l;
            cum.push(acc);
        }
        LambdaSums { cum }
    }

    pub fn block(&self, start: usize, len: usize) -> f64 {
        let last = self.cum.len() - 1;
        let lo = start.min(last);
        let hi = (start + len).min(last);
        self.cum[hi] - self.cum[lo]
    }
}

/// Returns the thresholded signed magnitude of cluster `j` for candidate `x`
/// and the cluster position it should occupy. Weights are multiplied by
/// `scale` (α over the coordinate's curvature). Position `n_clusters()`
/// denotes the zero cluster.
pub fn slope_threshold(x: f64, j: usize, sums: &LambdaSums, scale: f64, clusters: &Clusters) -> (f64, usize) {
    let weight = |start: usize, len: usize| scale * sums.block(start, len);

    let n = clusters.n_clusters();
    let size = clusters.size(j);
    let abs_x = x.abs();
    let sgn = sign(x);

    let mut lo = weight(clusters.pointer(j), size);

    if abs_x - lo > clusters.coeff(j) {
        for k in (0..j).rev() {
            let c_k = clusters.coeff(k);
            if abs_x - lo < c_k {
                return (x - sgn * lo, k + 1);
            }
            let hi = weight(clusters.pointer(k), size);
            if abs_x - hi <= c_k {
                return (sgn * c_k, k);
            }
            lo = hi;
        }
        return (x - sgn * lo, 0);
    }

    let end = clusters.pointer(j + 1);
    let mut hi = weight(end - size, size);

    for k in (j + 1)..n {
        let c_k = clusters.coeff(k);
        let end = clusters.pointer(k + 1);
        if abs_x > hi + c_k {
            return (x - sgn * hi, k - 1);
        }
        lo = weight(end - size, size);
        if abs_x >= lo + c_k {
            return (sgn * c_k, k);
        }
        hi = lo;
    }

    if abs_x > hi {
        (x - sgn * hi, n.saturating_sub(1))
    } else {
        (0.0, n)
    }
}
