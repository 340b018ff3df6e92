//! Cluster coordinate descent on the weighted least-squares surrogate.
//!
//! A cluster is moved as one coordinate along `x_s = Σₖ sign(βₖ) x̃ₖ`. The
//! thresholded magnitude can land on another cluster (merge), between two
//! clusters (reorder), or on zero. Only non-zero clusters are visited, so this
//! step never activates new predictors.

use crate::clusters::Clusters;
use crate::kernels::NormalizedDesign;
use crate::math::sign;
use crate::matrix::DesignMatrix;
use crate::threshold::{LambdaSums, slope_threshold};
use ndarray::{Array1, ArrayView1, ArrayViewMut1, Zip};

/// Curvatures at or below this are treated as a flat direction and skipped.
const MIN_CURVATURE: f64 = 1e-14;

pub(super) struct CoordinateDescent<'a, X: DesignMatrix> {
    pub design: &'a NormalizedDesign<'a, X>,
    pub w: ArrayView1<'a, f64>,
    pub w_sum: f64,
    pub sums: &'a LambdaSums,
    pub alpha: f64,
    pub intercept: bool,
    pub update_clusters: bool,
}

impl<X: DesignMatrix> CoordinateDescent<'_, X> {
    /// One pass over the clusters in `order`. Positions that no longer exist
    /// after earlier merges are skipped. `r = η − z` is kept in sync.
    pub fn sweep(
        &self,
        order: &[usize],
        mut beta: ArrayViewMut1<f64>,
        beta0: &mut f64,
        r: &mut Array1<f64>,
        clusters: &mut Clusters,
    ) {
        let n = self.design.nrows() as f64;

        for &j in order {
            if j >= clusters.n_clusters() {
                continue;
            }
            let c_old = clusters.coeff(j);
            if c_old == 0.0 {
                continue;
            }

            let members: Vec<usize> = clusters.iter(j).collect();
            let signs: Vec<f64> = members.iter().map(|&k| sign(beta[k])).collect();

            let mut direction = None;
            let (gradient, curvature) = if members.len() == 1 {
                let wr_sum = self.w.dot(&*r);
                let (g, h) = self
                    .design
                    .column_gradient_hessian(members[0], self.w, r.view(), wr_sum, self.w_sum);
                (g * signs[0], h)
            } else {
                let mut x_s = Array1::zeros(r.len());
                for (&k, &s) in members.iter().zip(&signs) {
                    self.design.add_column(k, s, x_s.view_mut());
                }
                let (g, h) = Zip::from(&x_s)
                    .and(&self.w)
                    .and(&*r)
                    .fold((0.0, 0.0), |(g, h), &x, &wi, &ri| (g + x * wi * ri, h + wi * x * x));
                direction = Some(x_s);
                (g / n, h / n)
            };

            if curvature <= MIN_CURVATURE {
                continue;
            }

            let candidate = c_old - gradient / curvature;
            let scale = self.alpha / curvature;
            let (c_tilde, new_position) = if self.update_clusters {
                slope_threshold(candidate, j, self.sums, scale, clusters)
            } else {
                (self.frozen_threshold(candidate, j, scale, clusters), j)
            };

            for (&k, &s) in members.iter().zip(&signs) {
                beta[k] = c_tilde * s;
            }

            let c_diff = c_old - c_tilde;
            if c_diff != 0.0 {
                match &direction {
                    Some(x_s) => r.scaled_add(-c_diff, x_s),
                    None => self.design.add_column(members[0], -signs[0] * c_diff, r.view_mut()),
                }
            }

            if self.update_clusters {
                clusters.update(j, new_position, c_tilde.abs());
            } else {
                clusters.set_coeff(j, c_tilde.abs());
            }

            if self.intercept && self.w_sum > 0.0 {
                let shift = self.w.dot(&*r) / self.w_sum;
                *beta0 -= shift;
                r.mapv_inplace(|v| v - shift);
            }
        }
    }

    /// Soft thresholding of cluster `j` with its current λ block, clamped
    /// between its neighbours so the cluster order never changes.
    fn frozen_threshold(&self, candidate: f64, j: usize, scale: f64, clusters: &Clusters) -> f64 {
        let size = clusters.size(j);
        let shrunk = (candidate.abs() - scale * self.sums.block(clusters.pointer(j), size)).max(0.0);
        let upper = if j == 0 { f64::INFINITY } else { clusters.coeff(j - 1) };
        let lower = clusters.coeff(j + 1);
        sign(candidate) * shrunk.clamp(lower.min(upper), upper)
    }
}
