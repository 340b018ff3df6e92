#![deny(dead_code)]
#![deny(unused_imports)]

//! Sorted-L1 penalized (SLOPE) generalized linear models.
//!
//! [`Slope`] fits quadratic, logistic, Poisson and multinomial models along a
//! regularization path, on dense or sparse designs.

pub mod clusters;
pub mod data;
pub mod error;
pub mod estimate_alpha;
pub mod kernels;
pub mod losses;
pub mod math;
pub mod matrix;
pub mod normalize;
pub mod ols;
pub mod outer_loop;
pub mod parameters;
pub mod path;
pub mod results;
pub mod screening;
pub mod sequence;
pub mod solvers;
pub mod sorted_l1;
pub mod threads;
pub mod threshold;
pub mod warnings;

pub use error::{ConfigError, SlopeError};
pub use parameters::{
    AlphaType, CdType, Centering, CenteringType, LambdaType, LossType, Scaling, ScalingType,
    ScreeningType, SlopeParameters, SolverType,
};
pub use path::{DEFAULT_ALPHA, Interrupt, Slope};
pub use results::{SlopeFit, SlopePath, StepSummary};
pub use sorted_l1::SortedL1Norm;
