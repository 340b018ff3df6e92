//! Column-oriented access to the design matrix.
//!
//! Solvers only ever touch X one column at a time, so dense (`Array2`) and
//! compressed sparse column (`sprs::CsMat`) storage share one capability set.
//! Dense loops run in row order without BLAS so both storages accumulate in the
//! same order and agree to the last bit on the same data.

use ndarray::{Array1, Array2, ArrayView1, ArrayViewMut1, Zip};
use sprs::CsMat;

pub trait DesignMatrix: Sync {
    fn nrows(&self) -> usize;
    fn ncols(&self) -> usize;
    fn is_sparse(&self) -> bool;

    /// Visits the stored entries of column `j` in row order. Dense storage
    /// visits every row.
    fn for_each_in_col<F: FnMut(usize, f64)>(&self, j: usize, f: F);

    /// Number of stored entries in column `j`.
    fn col_stored(&self, j: usize) -> usize;

    /// `xⱼᵀ v`
    fn col_dot(&self, j: usize, v: ArrayView1<f64>) -> f64 {
        let mut acc = 0.0;
        self.for_each_in_col(j, |i, x| acc += x * v[i]);
        acc
    }

    /// `Σᵢ xᵢⱼ wᵢ vᵢ`
    fn col_weighted_dot(&self, j: usize, w: ArrayView1<f64>, v: ArrayView1<f64>) -> f64 {
        let mut acc = 0.0;
        self.for_each_in_col(j, |i, x| acc += x * w[i] * v[i]);
        acc
    }

    /// `Σᵢ wᵢ xᵢⱼ²`
    fn col_weighted_sq_sum(&self, j: usize, w: ArrayView1<f64>) -> f64 {
        let mut acc = 0.0;
        self.for_each_in_col(j, |i, x| acc += w[i] * x * x);
        acc
    }

    fn col_sum(&self, j: usize) -> f64 {
        let mut acc = 0.0;
        self.for_each_in_col(j, |_, x| acc += x);
        acc
    }

    fn col_sq_sum(&self, j: usize) -> f64 {
        let mut acc = 0.0;
        self.for_each_in_col(j, |_, x| acc += x * x);
        acc
    }

    /// `out += a · xⱼ`
    fn col_axpy(&self, j: usize, a: f64, mut out: ArrayViewMut1<f64>) {
        self.for_each_in_col(j, |i, x| out[i] += a * x);
    }

    fn has_non_finite(&self) -> bool {
        (0..self.ncols()).any(|j| {
            let mut bad = false;
            self.for_each_in_col(j, |_, x| bad |= !x.is_finite());
            bad
        })
    }

    /// Dense copy of `(X − c) / s`.
    fn to_dense_normalized(&self, centers: ArrayView1<f64>, scales: ArrayView1<f64>) -> Array2<f64> {
        let mut out = Array2::zeros((self.nrows(), self.ncols()));
        for j in 0..self.ncols() {
            let mut col = out.column_mut(j);
            self.for_each_in_col(j, |i, x| col[i] = x);
            let (c, s) = (centers[j], scales[j]);
            col.mapv_inplace(|x| (x - c) / s);
        }
        out
    }
}

impl DesignMatrix for Array2<f64> {
    fn nrows(&self) -> usize {
        self.nrows()
    }

    fn ncols(&self) -> usize {
        self.ncols()
    }

    fn is_sparse(&self) -> bool {
        false
    }

    fn for_each_in_col<F: FnMut(usize, f64)>(&self, j: usize, mut f: F) {
        for (i, &x) in self.column(j).iter().enumerate() {
            f(i, x);
        }
    }

    fn col_stored(&self, _: usize) -> usize {
        self.nrows()
    }

    fn col_dot(&self, j: usize, v: ArrayView1<f64>) -> f64 {
        Zip::from(self.column(j))
            .and(&v)
            .fold(0.0, |acc, &x, &vi| acc + x * vi)
    }

    fn col_axpy(&self, j: usize, a: f64, mut out: ArrayViewMut1<f64>) {
        Zip::from(&mut out)
            .and(self.column(j))
            .for_each(|o, &x| *o += a * x);
    }
}

/// Compressed sparse column storage. Callers convert CSR input with
/// [`ensure_csc`] first.
impl DesignMatrix for CsMat<f64> {
    fn nrows(&self) -> usize {
        self.rows()
    }

    fn ncols(&self) -> usize {
        self.cols()
    }

    fn is_sparse(&self) -> bool {
        true
    }

    fn for_each_in_col<F: FnMut(usize, f64)>(&self, j: usize, mut f: F) {
        if let Some(col) = self.outer_view(j) {
            for (i, &x) in col.iter() {
                f(i, x);
            }
        }
    }

    fn col_stored(&self, j: usize) -> usize {
        self.outer_view(j).map_or(0, |col| col.nnz())
    }
}

/// Returns `x` in compressed sparse column layout.
pub fn ensure_csc(x: &CsMat<f64>) -> CsMat<f64> {
    if x.is_csc() { x.clone() } else { x.to_csc() }
}

/// Rescales the stored entries of a CSC matrix column by column.
pub fn scale_sparse_columns(x: &CsMat<f64>, scales: ArrayView1<f64>) -> CsMat<f64> {
    let indptr = x.indptr();
    let offsets = indptr.raw_storage();
    let base = offsets.first().copied().unwrap_or(0);
    let mut data = x.data().to_vec();
    for j in 0..x.cols() {
        for value in &mut data[offsets[j] - base..offsets[j + 1] - base] {
            *value /= scales[j];
        }
    }
    let shifted: Vec<usize> = offsets.iter().map(|o| o - base).collect();
    CsMat::new_csc((x.rows(), x.cols()), shifted, x.indices().to_vec(), data)
}

/// Dense matrix product `X B` for a `p × m` coefficient block.
pub fn matmul<X: DesignMatrix>(x: &X, beta: ndarray::ArrayView2<f64>) -> Array2<f64> {
    let mut out = Array2::zeros((x.nrows(), beta.ncols()));
    for k in 0..beta.ncols() {
        for j in 0..x.ncols() {
            let b = beta[[j, k]];
            if b != 0.0 {
                x.col_axpy(j, b, out.column_mut(k));
            }
        }
    }
    out
}

/// `Xᵀ 𝟙`
pub fn column_sums<X: DesignMatrix>(x: &X) -> Array1<f64> {
    Array1::from_iter((0..x.ncols()).map(|j| x.col_sum(j)))
}
