//! # Fit Results
//!
//! Read-only snapshots of a solved model. Coefficients are reported on the
//! original feature scale and stored as a compressed sparse column matrix of
//! shape `p × m`.

use crate::losses::{Loss, LossFunction};
use crate::matrix::{DesignMatrix, matmul};
use crate::parameters::LossType;
use ndarray::{Array1, Array2, ArrayView1};
use serde::Serialize;
use sprs::CsMat;

/// Solution at one α.
#[derive(Debug, Clone)]
pub struct SlopeFit {
    pub(crate) intercepts: Array1<f64>,
    pub(crate) coefficients: CsMat<f64>,
    pub(crate) alpha: f64,
    pub(crate) lambda: Array1<f64>,
    pub(crate) deviance: f64,
    pub(crate) null_deviance: f64,
    pub(crate) primals: Vec<f64>,
    pub(crate) duals: Vec<f64>,
    pub(crate) gaps: Vec<f64>,
    pub(crate) times: Vec<f64>,
    pub(crate) passes: usize,
    pub(crate) converged: bool,
    pub(crate) pattern: Array2<i32>,
    pub(crate) loss: LossType,
}

/// Dense `p × m` block to CSC, dropping exact zeros.
pub(crate) fn to_sparse(beta: &Array2<f64>) -> CsMat<f64> {
    let (p, m) = beta.dim();
    let mut indptr = Vec::with_capacity(m + 1);
    let mut indices = Vec::new();
    let mut data = Vec::new();
    indptr.push(0);
    for k in 0..m {
        for j in 0..p {
            let v = beta[[j, k]];
            if v != 0.0 {
                indices.push(j);
                data.push(v);
            }
        }
        indptr.push(indices.len());
    }
    CsMat::new_csc((p, m), indptr, indices, data)
}

impl SlopeFit {
    pub fn intercepts(&self) -> ArrayView1<'_, f64> {
        self.intercepts.view()
    }

    pub fn coefficients(&self) -> &CsMat<f64> {
        &self.coefficients
    }

    pub fn dense_coefficients(&self) -> Array2<f64> {
        self.coefficients.to_dense()
    }

    pub fn alpha(&self) -> f64 {
        self.alpha
    }

    pub fn lambda(&self) -> ArrayView1<'_, f64> {
        self.lambda.view()
    }

    pub fn deviance(&self) -> f64 {
        self.deviance
    }

    pub fn null_deviance(&self) -> f64 {
        self.null_deviance
    }

    /// `1 − deviance / null deviance`; zero when the null model is already exact.
    pub fn deviance_ratio(&self) -> f64 {
        if self.null_deviance > 0.0 {
            1.0 - self.deviance / self.null_deviance
        } else {
            0.0
        }
    }

    pub fn primals(&self) -> &[f64] {
        &self.primals
    }

    pub fn duals(&self) -> &[f64] {
        &self.duals
    }

    pub fn gaps(&self) -> &[f64] {
        &self.gaps
    }

    pub fn times(&self) -> &[f64] {
        &self.times
    }

    pub fn passes(&self) -> usize {
        self.passes
    }

    pub fn converged(&self) -> bool {
        self.converged
    }

    pub fn n_clusters(&self) -> usize {
        self.pattern.ncols()
    }

    /// Signed cluster pattern of the flattened coefficients in the normalized
    /// problem: one row per coefficient, one column per non-zero cluster.
    pub fn pattern(&self) -> &Array2<i32> {
        &self.pattern
    }

    pub fn loss(&self) -> LossType {
        self.loss
    }

    /// `X β + β₀` on the original feature scale.
    pub fn linear_predictor<X: DesignMatrix>(&self, x: &X) -> Array2<f64> {
        let mut eta = matmul(x, self.dense_coefficients().view());
        for (k, &b0) in self.intercepts.iter().enumerate() {
            eta.column_mut(k).mapv_inplace(|v| v + b0);
        }
        eta
    }

    /// Predictions on the response scale.
    pub fn predict<X: DesignMatrix>(&self, x: &X) -> Array2<f64> {
        Loss::from(self.loss).link(self.linear_predictor(x).view())
    }

    pub fn summary(&self) -> StepSummary {
        StepSummary {
            alpha: self.alpha,
            deviance: self.deviance,
            deviance_ratio: self.deviance_ratio(),
            nonzeros: self.coefficients.nnz(),
            clusters: self.n_clusters(),
            passes: self.passes,
            gap: self.gaps.last().copied().unwrap_or(f64::NAN),
            converged: self.converged,
        }
    }
}

/// Flat per-step record for reporting.
#[derive(Debug, Clone, Serialize)]
pub struct StepSummary {
    pub alpha: f64,
    pub deviance: f64,
    pub deviance_ratio: f64,
    pub nonzeros: usize,
    pub clusters: usize,
    pub passes: usize,
    pub gap: f64,
    pub converged: bool,
}

/// Fits along a decreasing α sequence with one λ and one null deviance.
#[derive(Debug, Clone)]
pub struct SlopePath {
    pub(crate) fits: Vec<SlopeFit>,
    pub(crate) null_deviance: f64,
}

impl SlopePath {
    pub fn len(&self) -> usize {
        self.fits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fits.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, SlopeFit> {
        self.fits.iter()
    }

    pub fn get(&self, step: usize) -> Option<&SlopeFit> {
        self.fits.get(step)
    }

    pub fn last(&self) -> Option<&SlopeFit> {
        self.fits.last()
    }

    pub fn null_deviance(&self) -> f64 {
        self.null_deviance
    }

    pub fn alphas(&self) -> Array1<f64> {
        self.fits.iter().map(|f| f.alpha).collect()
    }

    pub fn deviances(&self) -> Array1<f64> {
        self.fits.iter().map(|f| f.deviance).collect()
    }

    pub fn deviance_ratios(&self) -> Array1<f64> {
        self.fits.iter().map(SlopeFit::deviance_ratio).collect()
    }

    pub fn coefs(&self) -> Vec<&CsMat<f64>> {
        self.fits.iter().map(|f| &f.coefficients).collect()
    }

    pub fn intercepts(&self) -> Vec<ArrayView1<'_, f64>> {
        self.fits.iter().map(SlopeFit::intercepts).collect()
    }

    /// Final duality gap of every step.
    pub fn gaps(&self) -> Array1<f64> {
        self.fits
            .iter()
            .map(|f| f.gaps.last().copied().unwrap_or(f64::NAN))
            .collect()
    }

    pub fn summaries(&self) -> Vec<StepSummary> {
        self.fits.iter().map(SlopeFit::summary).collect()
    }

    pub fn into_fits(self) -> Vec<SlopeFit> {
        self.fits
    }
}

impl<'a> IntoIterator for &'a SlopePath {
    type Item = &'a SlopeFit;
    type IntoIter = std::slice::Iter<'a, SlopeFit>;

    fn into_iter(self) -> Self::IntoIter {
        self.fits.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    fn fit() -> SlopeFit {
        let beta = array![[0.5], [0.0], [-1.0]];
        SlopeFit {
            intercepts: array![0.25],
            coefficients: to_sparse(&beta),
            alpha: 0.1,
            lambda: array![1.0, 0.5, 0.25],
            deviance: 2.0,
            null_deviance: 8.0,
            primals: vec![1.0],
            duals: vec![0.9],
            gaps: vec![0.1],
            times: vec![0.0],
            passes: 3,
            converged: true,
            pattern: array![[0, 1], [0, 0], [-1, 0]],
            loss: LossType::Logistic,
        }
    }

    #[test]
    fn sparse_storage_and_predictions() {
        let fit = fit();
        assert_eq!(fit.coefficients().nnz(), 2);
        assert_eq!(fit.dense_coefficients(), array![[0.5], [0.0], [-1.0]]);
        assert_abs_diff_eq!(fit.deviance_ratio(), 0.75, epsilon = 1e-15);
        assert_eq!(fit.n_clusters(), 2);

        let x = array![[1.0, 3.0, 0.0], [0.0, 0.0, 1.0]];
        let eta = fit.linear_predictor(&x);
        assert_abs_diff_eq!(eta, array![[0.75], [-0.75]], epsilon = 1e-15);
        let prob = fit.predict(&x);
        assert_abs_diff_eq!(prob[[0, 0]], 1.0 / (1.0 + (-0.75f64).exp()), epsilon = 1e-12);
    }

    #[test]
    fn path_accessors_follow_step_order() {
        let mut second = fit();
        second.alpha = 0.05;
        second.deviance = 1.0;
        let path = SlopePath {
            fits: vec![fit(), second],
            null_deviance: 8.0,
        };
        assert_eq!(path.len(), 2);
        assert_eq!(path.alphas(), array![0.1, 0.05]);
        assert_abs_diff_eq!(path.deviance_ratios(), array![0.75, 0.875], epsilon = 1e-15);
        assert_eq!(path.gaps(), array![0.1, 0.1]);
        assert_eq!(path.last().map(SlopeFit::alpha), Some(0.05));

        let json = serde_json::to_string(&path.summaries()).unwrap();
        assert!(json.contains("\"deviance_ratio\":0.875"));
    }
}
