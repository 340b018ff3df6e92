//! Linear predictor and gradient kernels over the working set.
//!
//! `NormalizedDesign` borrows X together with its normalization and applies
//! centering and scaling just in time: a normalized column is
//! `x̃ⱼ = (xⱼ − cⱼ) / sⱼ`, so every product with it is the raw product corrected
//! by a centering term and divided by the scale. Gradient columns are computed
//! in parallel and written to disjoint rows of the output.

use crate::matrix::DesignMatrix;
use crate::normalize::{JitMode, Normalization};
use crate::threads;
use ndarray::{Array1, Array2, ArrayView1, ArrayView2, ArrayViewMut1, Axis};

pub struct NormalizedDesign<'a, X: DesignMatrix> {
    x: &'a X,
    norm: &'a Normalization,
    jit: JitMode,
    /// `x̃ⱼᵀ 𝟙` for every column.
    sums: Array1<f64>,
}

impl<'a, X: DesignMatrix> NormalizedDesign<'a, X> {
    pub fn new(x: &'a X, norm: &'a Normalization) -> Self {
        let jit = norm.jit();
        let n = x.nrows() as f64;
        let sums = Array1::from(threads::parallel_map(x.ncols(), |j| {
            let mut sum = x.col_sum(j);
            if jit.centers() {
                sum -= n * norm.centers()[j];
            }
            if jit.scales() {
                sum /= norm.scales()[j];
            }
            sum
        }));
        NormalizedDesign { x, norm, jit, sums }
    }

    pub fn nrows(&self) -> usize {
        self.x.nrows()
    }

    pub fn ncols(&self) -> usize {
        self.x.ncols()
    }

    pub fn normalization(&self) -> &Normalization {
        self.norm
    }

    fn center(&self, j: usize) -> f64 {
        if self.jit.centers() { self.norm.centers()[j] } else { 0.0 }
    }

    fn scale(&self, j: usize) -> f64 {
        if self.jit.scales() { self.norm.scales()[j] } else { 1.0 }
    }

    /// `η = X̃[:, W] β[W] + β₀`
    pub fn linear_predictor(
        &self,
        beta: ArrayView2<f64>,
        beta0: ArrayView1<f64>,
        active: &[usize],
        intercept: bool,
    ) -> Array2<f64> {
        let mut eta = Array2::zeros((self.nrows(), beta.ncols()));
        for k in 0..beta.ncols() {
            let mut offset = if intercept { beta0[k] } else { 0.0 };
            let mut col = eta.column_mut(k);
            for &j in active {
                let b = beta[[j, k]];
                if b == 0.0 {
                    continue;
                }
                let b = b / self.scale(j);
                self.x.col_axpy(j, b, col.view_mut());
                offset -= self.center(j) * b;
            }
            if offset != 0.0 {
                col.mapv_inplace(|v| v + offset);
            }
        }
        eta
    }

    /// Writes `g[W] = X̃[:, W]ᵀ r / n`. Rows outside `W` are left untouched.
    pub fn update_gradient(&self, g: &mut Array2<f64>, residual: ArrayView2<f64>, active: &[usize]) {
        let n = self.nrows() as f64;
        let m = residual.ncols();
        let residual_sums = residual.sum_axis(Axis(0));

        let rows = threads::parallel_map(active.len(), |a| {
            let j = active[a];
            let (c, s) = (self.center(j), self.scale(j));
            (0..m)
                .map(|k| (self.x.col_dot(j, residual.column(k)) - c * residual_sums[k]) / (s * n))
                .collect::<Vec<f64>>()
        });

        for (&j, row) in active.iter().zip(rows) {
            for (k, v) in row.into_iter().enumerate() {
                g[[j, k]] = v;
            }
        }
    }

    /// `g[W] −= offset ⊗ X̃[:, W]ᵀ 𝟙 / n`, the gradient change from shifting
    /// every residual in column `k` by `offset[k]`.
    pub fn offset_gradient(&self, g: &mut Array2<f64>, offset: ArrayView1<f64>, active: &[usize]) {
        let n = self.nrows() as f64;
        for &j in active {
            for (k, &o) in offset.iter().enumerate() {
                g[[j, k]] -= o * self.sums[j] / n;
            }
        }
    }

    /// `out += a · x̃ⱼ`
    pub fn add_column(&self, j: usize, a: f64, mut out: ArrayViewMut1<f64>) {
        let a = a / self.scale(j);
        self.x.col_axpy(j, a, out.view_mut());
        let shift = self.center(j) * a;
        if shift != 0.0 {
            out.mapv_inplace(|v| v - shift);
        }
    }

    /// Gradient and curvature of the weighted surrogate along one normalized
    /// column: `x̃ⱼᵀ (w ∘ r) / n` and `x̃ⱼᵀ W x̃ⱼ / n`. `wr_sum` and `w_sum` are
    /// `Σ wᵢ rᵢ` and `Σ wᵢ`.
    pub fn column_gradient_hessian(
        &self,
        j: usize,
        w: ArrayView1<f64>,
        r: ArrayView1<f64>,
        wr_sum: f64,
        w_sum: f64,
    ) -> (f64, f64) {
        let n = self.nrows() as f64;
        let (c, s) = (self.center(j), self.scale(j));
        let gradient = (self.x.col_weighted_dot(j, w, r) - c * wr_sum) / (s * n);
        let curvature = if c == 0.0 {
            self.x.col_weighted_sq_sum(j, w)
        } else {
            self.x.col_weighted_sq_sum(j, w) - 2.0 * c * self.x.col_dot(j, w) + c * c * w_sum
        };
        (gradient, curvature / (s * s * n))
    }
}
