//! # Feature Normalization
//!
//! Column centers and scales, computed once per fit. Normalization is either
//! materialized into a copy of X or applied just in time by the kernels, which
//! only need to know whether a centering term, a scaling factor, or both are
//! active. Coefficients are always mapped back to the original feature scale.

use crate::error::SlopeError;
use crate::matrix::DesignMatrix;
use crate::parameters::{Centering, CenteringType, Scaling, ScalingType};
use crate::threads;
use ndarray::{Array1, Array2, ArrayView1};

/// Which parts of the normalization the kernels apply on the fly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JitMode {
    None,
    Center,
    Scale,
    Both,
}

impl JitMode {
    fn from_flags(center: bool, scale: bool) -> Self {
        match (center, scale) {
            (false, false) => JitMode::None,
            (true, false) => JitMode::Center,
            (false, true) => JitMode::Scale,
            (true, true) => JitMode::Both,
        }
    }

    pub fn centers(self) -> bool {
        matches!(self, JitMode::Center | JitMode::Both)
    }

    pub fn scales(self) -> bool {
        matches!(self, JitMode::Scale | JitMode::Both)
    }
}

#[derive(Debug, Clone, Copy)]
struct ColumnStats {
    mean: f64,
    sd: f64,
    min: f64,
    max: f64,
    l1: f64,
    l2: f64,
    max_abs: f64,
}

fn column_stats<X: DesignMatrix>(x: &X, j: usize) -> ColumnStats {
    let n = x.nrows();
    let stored = x.col_stored(j);
    let implicit_zeros = stored < n;

    let mut sum = 0.0;
    let mut l1 = 0.0;
    let mut sq = 0.0;
    let mut min = if implicit_zeros { 0.0 } else { f64::INFINITY };
    let mut max = if implicit_zeros { 0.0 } else { f64::NEG_INFINITY };
    x.for_each_in_col(j, |_, v| {
        sum += v;
        l1 += v.abs();
        sq += v * v;
        min = min.min(v);
        max = max.max(v);
    });
    if n == 0 {
        min = 0.0;
        max = 0.0;
    }

    let mean = sum / n.max(1) as f64;
    let mut ss = 0.0;
    x.for_each_in_col(j, |_, v| ss += (v - mean) * (v - mean));
    ss += (n - stored) as f64 * mean * mean;

    ColumnStats {
        mean,
        sd: (ss / n.max(1) as f64).sqrt(),
        min,
        max,
        l1,
        l2: sq.sqrt(),
        max_abs: min.abs().max(max.abs()),
    }
}

#[derive(Debug, Clone)]
pub struct Normalization {
    centers: Array1<f64>,
    scales: Array1<f64>,
    constant: Vec<bool>,
    jit: JitMode,
}

impl Normalization {
    /// Maps the retired single-word normalization setting to centering and
    /// scaling rules.
    pub fn from_type(kind: &str) -> Result<(Centering, Scaling), SlopeError> {
        match kind {
            "standardization" => Ok((
                Centering::Type(CenteringType::Mean),
                Scaling::Type(ScalingType::Sd),
            )),
            "none" => Ok((
                Centering::Type(CenteringType::None),
                Scaling::Type(ScalingType::None),
            )),
            other => Err(SlopeError::invalid(format!(
                "unknown normalization type '{other}'"
            ))),
        }
    }

    pub fn compute<X: DesignMatrix>(x: &X, centering: &Centering, scaling: &Scaling) -> Result<Self, SlopeError> {
        let p = x.ncols();
        let stats = threads::parallel_map(p, |j| column_stats(x, j));
        let constant: Vec<bool> = stats.iter().map(|s| s.max == s.min).collect();

        let centers = match centering {
            Centering::Type(CenteringType::None) => Array1::zeros(p),
            Centering::Type(CenteringType::Mean) => stats.iter().map(|s| s.mean).collect(),
            Centering::Type(CenteringType::Min) => stats.iter().map(|s| s.min).collect(),
            Centering::Manual(values) => manual(values, p, "centers")?,
        };

        let scales = match scaling {
            Scaling::Type(kind) => stats
                .iter()
                .zip(&constant)
                .map(|(s, &flat)| {
                    let value = match kind {
                        ScalingType::None => 1.0,
                        ScalingType::Sd if flat => 0.0,
                        ScalingType::Sd => s.sd,
                        ScalingType::L1 => s.l1,
                        ScalingType::L2 => s.l2,
                        ScalingType::MaxAbs => s.max_abs,
                        ScalingType::Range => s.max - s.min,
                    };
                    if value == 0.0 { 1.0 } else { value }
                })
                .collect(),
            Scaling::Manual(values) => {
                let scales = manual(values, p, "scales")?;
                if scales.iter().any(|&s| s == 0.0) {
                    return Err(SlopeError::invalid("manual scales must be non-zero"));
                }
                scales
            }
        };

        let jit = JitMode::from_flags(
            centers.iter().any(|&c| c != 0.0),
            scales.iter().any(|&s| s != 1.0),
        );

        Ok(Normalization {
            centers,
            scales,
            constant,
            jit,
        })
    }

    /// Identity normalization for `p` columns.
    pub fn none(p: usize) -> Self {
        Normalization {
            centers: Array1::zeros(p),
            scales: Array1::ones(p),
            constant: vec![false; p],
            jit: JitMode::None,
        }
    }

    pub fn centers(&self) -> ArrayView1<'_, f64> {
        self.centers.view()
    }

    pub fn scales(&self) -> ArrayView1<'_, f64> {
        self.scales.view()
    }

    pub fn jit(&self) -> JitMode {
        self.jit
    }

    pub fn is_centering(&self) -> bool {
        self.centers.iter().any(|&c| c != 0.0)
    }

    /// Columns whose entries are all equal.
    pub fn is_constant(&self, j: usize) -> bool {
        self.constant[j]
    }

    /// Marks the normalization as already applied to X, so kernels stop
    /// applying it.
    pub fn mark_materialized(&mut self, centered: bool, scaled: bool) {
        self.jit = JitMode::from_flags(self.jit.centers() && !centered, self.jit.scales() && !scaled);
    }

    /// Maps coefficients of the normalized problem back to the original
    /// features; the intercept absorbs the centering when it is fitted.
    pub fn rescale_coefficients(&self, beta: &Array2<f64>, beta0: &mut Array1<f64>, intercept: bool) -> Array2<f64> {
        let mut out = beta.clone();
        for k in 0..out.ncols() {
            let mut shift = 0.0;
            for j in 0..out.nrows() {
                if out[[j, k]] != 0.0 {
                    out[[j, k]] /= self.scales[j];
                    shift += self.centers[j] * out[[j, k]];
                }
            }
            if intercept {
                beta0[k] -= shift;
            }
        }
        out
    }
}

fn manual(values: &[f64], p: usize, what: &'static str) -> Result<Array1<f64>, SlopeError> {
    if values.len() != p {
        return Err(SlopeError::DimensionMismatch {
            what,
            expected: p,
            found: values.len(),
        });
    }
    if values.iter().any(|v| !v.is_finite()) {
        return Err(SlopeError::NonFinite(what));
    }
    Ok(Array1::from(values.to_vec()))
}
