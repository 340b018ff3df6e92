//! # Loss Family
//!
//! The four GLM losses behind one capability set. Every quantity is laid out as
//! an `n × m` matrix, where `m` is one for the scalar families and the number of
//! classes for the multinomial loss. Residuals follow the sign convention
//! `r = ∂loss/∂η · n`, so the gradient in β is always `Xᵀ r / n`.
//!
//! Dispatch happens once per call through the [`Loss`] enum. The element loops
//! inside each family are monomorphic.

mod logistic;
mod multinomial;
mod poisson;
mod quadratic;

pub use logistic::Logistic;
pub use multinomial::Multinomial;
pub use poisson::Poisson;
pub use quadratic::Quadratic;

use crate::error::SlopeError;
use crate::parameters::LossType;
use ndarray::{Array1, Array2, ArrayView1, ArrayView2};

/// Lower and upper clamp for probabilities entering IRLS weights.
pub(crate) const PROB_CLAMP: f64 = 1e-5;

pub trait LossFunction {
    fn name(&self) -> &'static str;

    /// Mean loss over the observations.
    fn loss(&self, eta: ArrayView2<f64>, y: ArrayView2<f64>) -> f64;

    /// Negated Fenchel conjugate at the dual point `theta`, averaged over the
    /// observations. `theta` is a scaled residual.
    fn dual(&self, theta: ArrayView2<f64>, y: ArrayView2<f64>) -> f64;

    fn residual(&self, eta: ArrayView2<f64>, y: ArrayView2<f64>) -> Array2<f64>;

    /// IRLS step: fills weights `w` and working response `z` so that
    /// `Σ wᵢ (zᵢ − ηᵢ)² / (2n)` is the local quadratic surrogate.
    fn update_weights_and_working_response(
        &self,
        w: &mut Array2<f64>,
        z: &mut Array2<f64>,
        eta: ArrayView2<f64>,
        y: ArrayView2<f64>,
    );

    /// Checks the support of the response and lays it out as an `n × m` matrix.
    fn preprocess_response(&self, y: ArrayView1<f64>) -> Result<Array2<f64>, SlopeError>;

    /// Inverse link: linear predictor to response scale.
    fn link(&self, eta: ArrayView2<f64>) -> Array2<f64>;

    /// One step on the intercepts with `eta` shifted along. Returns `false`
    /// when a line search could not find sufficient decrease.
    fn update_intercept(&self, beta0: &mut Array1<f64>, eta: &mut Array2<f64>, y: ArrayView2<f64>) -> bool;

    /// Intercepts of the intercept-only model.
    fn null_intercept(&self, y: ArrayView2<f64>) -> Array1<f64>;

    fn saturated_loss(&self, _: ArrayView2<f64>) -> f64 {
        0.0
    }

    fn deviance(&self, eta: ArrayView2<f64>, y: ArrayView2<f64>) -> f64 {
        let n = y.nrows() as f64;
        2.0 * n * (self.loss(eta, y) - self.saturated_loss(y))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Loss {
    Quadratic(Quadratic),
    Logistic(Logistic),
    Poisson(Poisson),
    Multinomial(Multinomial),
}

impl From<LossType> for Loss {
    fn from(loss: LossType) -> Self {
        match loss {
            LossType::Quadratic => Loss::Quadratic(Quadratic),
            LossType::Logistic => Loss::Logistic(Logistic),
            LossType::Poisson => Loss::Poisson(Poisson),
            LossType::Multinomial => Loss::Multinomial(Multinomial),
        }
    }
}

macro_rules! dispatch {
    ($self:ident, $inner:ident => $body:expr) => {
        match $self {
            Loss::Quadratic($inner) => $body,
            Loss::Logistic($inner) => $body,
            Loss::Poisson($inner) => $body,
            Loss::Multinomial($inner) => $body,
        }
    };
}

impl Loss {
    pub fn is_multinomial(&self) -> bool {
        matches!(self, Loss::Multinomial(_))
    }

    pub fn is_quadratic(&self) -> bool {
        matches!(self, Loss::Quadratic(_))
    }
}

impl LossFunction for Loss {
    fn name(&self) -> &'static str {
        dispatch!(self, l => l.name())
    }

    fn loss(&self, eta: ArrayView2<f64>, y: ArrayView2<f64>) -> f64 {
        dispatch!(self, l => l.loss(eta, y))
    }

    fn dual(&self, theta: ArrayView2<f64>, y: ArrayView2<f64>) -> f64 {
        dispatch!(self, l => l.dual(theta, y))
    }

    fn residual(&self, eta: ArrayView2<f64>, y: ArrayView2<f64>) -> Array2<f64> {
        dispatch!(self, l => l.residual(eta, y))
    }

    fn update_weights_and_working_response(
        &self,
        w: &mut Array2<f64>,
        z: &mut Array2<f64>,
        eta: ArrayView2<f64>,
        y: ArrayView2<f64>,
    ) {
        dispatch!(self, l => l.update_weights_and_working_response(w, z, eta, y))
    }

    fn preprocess_response(&self, y: ArrayView1<f64>) -> Result<Array2<f64>, SlopeError> {
        dispatch!(self, l => l.preprocess_response(y))
    }

    fn link(&self, eta: ArrayView2<f64>) -> Array2<f64> {
        dispatch!(self, l => l.link(eta))
    }

    fn update_intercept(&self, beta0: &mut Array1<f64>, eta: &mut Array2<f64>, y: ArrayView2<f64>) -> bool {
        dispatch!(self, l => l.update_intercept(beta0, eta, y))
    }

    fn null_intercept(&self, y: ArrayView2<f64>) -> Array1<f64> {
        dispatch!(self, l => l.null_intercept(y))
    }

    fn saturated_loss(&self, y: ArrayView2<f64>) -> f64 {
        dispatch!(self, l => l.saturated_loss(y))
    }
}

/// Shifts column `k` of `eta` and the matching intercept by `-step`.
pub(crate) fn shift_intercept(beta0: &mut Array1<f64>, eta: &mut Array2<f64>, k: usize, step: f64) {
    beta0[k] -= step;
    eta.column_mut(k).mapv_inplace(|v| v - step);
}

/// Column means of a residual matrix.
pub(crate) fn column_means(r: &Array2<f64>) -> Array1<f64> {
    let n = r.nrows().max(1) as f64;
    r.sum_axis(ndarray::Axis(0)) / n
}
