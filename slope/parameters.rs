//! # Model Configuration
//!
//! A plain options struct with serde defaults, so a partial TOML file (or none
//! at all) yields a usable model. Every enumeration serializes in snake case.
//! Older option names are still accepted on load and mapped to their current
//! spelling, with a one-time deprecation warning.

use crate::error::{ConfigError, SlopeError};
use crate::normalize::Normalization;
use crate::warnings::{WarningCode, add_warning_once};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum LossType {
    /// Least squares on a continuous response.
    #[default]
    Quadratic,
    /// Binary outcomes coded 0/1.
    Logistic,
    /// Non-negative counts.
    Poisson,
    /// Class labels `0..K`.
    Multinomial,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum CenteringType {
    None,
    #[default]
    Mean,
    Min,
}

/// Column centers: a rule, or one value per column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Centering {
    Type(CenteringType),
    Manual(Vec<f64>),
}

impl Default for Centering {
    fn default() -> Self {
        Centering::Type(CenteringType::default())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum ScalingType {
    None,
    /// Population standard deviation.
    #[default]
    Sd,
    L1,
    L2,
    MaxAbs,
    Range,
}

/// Column scales: a rule, or one value per column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scaling {
    Type(ScalingType),
    Manual(Vec<f64>),
}

impl Default for Scaling {
    fn default() -> Self {
        Scaling::Type(ScalingType::default())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum LambdaType {
    /// Benjamini-Hochberg quantiles.
    #[default]
    Bh,
    /// BH adjusted for the sample size.
    Gaussian,
    Oscar,
    Lasso,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum AlphaType {
    #[default]
    Path,
    /// Single α from the noise level of a least-squares fit.
    Estimate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum ScreeningType {
    None,
    #[default]
    Strong,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum SolverType {
    /// FISTA for the multinomial loss, hybrid otherwise.
    #[default]
    Auto,
    Pgd,
    Fista,
    Hybrid,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum CdType {
    #[default]
    Cyclical,
    /// Cluster order shuffled every sweep.
    Permuted,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SlopeParameters {
    pub loss: LossType,
    pub intercept: bool,
    pub centering: Centering,
    pub scaling: Scaling,
    /// Materialize normalization on a copy of dense X instead of applying it
    /// inside the kernels.
    pub modify_x: bool,
    pub path_length: usize,
    /// `α_min / α_max`; chosen from the problem shape when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alpha_min_ratio: Option<f64>,
    pub alpha_type: AlphaType,
    pub lambda_type: LambdaType,
    pub q: f64,
    pub theta1: f64,
    pub theta2: f64,
    pub tol: f64,
    pub max_it: usize,
    pub max_it_inner: usize,
    pub pgd_freq: usize,
    pub update_clusters: bool,
    pub screening: ScreeningType,
    pub solver: SolverType,
    pub hybrid_cd_type: CdType,
    pub cd_seed: u64,
    /// Early-stop cap on the number of non-zero clusters; `n + 1` when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_clusters: Option<usize>,
    pub dev_change_tol: f64,
    pub dev_ratio_tol: f64,
    pub diagnostics: bool,
    pub alpha_est_max_it: usize,
    pub learning_rate_decr: f64,
}

impl Default for SlopeParameters {
    fn default() -> Self {
        SlopeParameters {
            loss: LossType::Quadratic,
            intercept: true,
            centering: Centering::default(),
            scaling: Scaling::default(),
            modify_x: false,
            path_length: 100,
            alpha_min_ratio: None,
            alpha_type: AlphaType::Path,
            lambda_type: LambdaType::Bh,
            q: 0.1,
            theta1: 1.0,
            theta2: 0.5,
            tol: 1e-4,
            max_it: 10_000,
            max_it_inner: 10_000,
            pgd_freq: 10,
            update_clusters: true,
            screening: ScreeningType::Strong,
            solver: SolverType::Auto,
            hybrid_cd_type: CdType::Cyclical,
            cd_seed: 0,
            max_clusters: None,
            dev_change_tol: 1e-5,
            dev_ratio_tol: 0.999,
            diagnostics: false,
            alpha_est_max_it: 20,
            learning_rate_decr: 0.5,
        }
    }
}

fn check(ok: bool, msg: &str) -> Result<(), SlopeError> {
    if ok { Ok(()) } else { Err(SlopeError::invalid(msg)) }
}

impl SlopeParameters {
    /// Checks every option that can be judged without data.
    pub fn validate(&self) -> Result<(), SlopeError> {
        check(self.tol > 0.0 && self.tol.is_finite(), "tol must be positive")?;
        check(self.max_it >= 1, "max_it must be at least 1")?;
        check(self.max_it_inner >= 1, "max_it_inner must be at least 1")?;
        check(self.pgd_freq >= 1, "pgd_freq must be at least 1")?;
        check(self.path_length >= 1, "path_length must be at least 1")?;
        check(self.alpha_est_max_it >= 1, "alpha_est_max_it must be at least 1")?;
        check(self.q > 0.0 && self.q < 1.0, "q must lie in (0, 1)")?;
        check(
            self.theta1 >= 0.0 && self.theta2 >= 0.0,
            "theta1 and theta2 must be non-negative",
        )?;
        check(
            (0.0..=1.0).contains(&self.dev_change_tol),
            "dev_change_tol must lie in [0, 1]",
        )?;
        check(
            (0.0..=1.0).contains(&self.dev_ratio_tol),
            "dev_ratio_tol must lie in [0, 1]",
        )?;
        check(
            self.learning_rate_decr > 0.0 && self.learning_rate_decr < 1.0,
            "learning_rate_decr must lie in (0, 1)",
        )?;
        if let Some(ratio) = self.alpha_min_ratio {
            check(ratio > 0.0 && ratio < 1.0, "alpha_min_ratio must lie in (0, 1)")?;
        }
        if let Some(max_clusters) = self.max_clusters {
            check(max_clusters >= 1, "max_clusters must be at least 1")?;
        }
        if let Centering::Manual(centers) = &self.centering {
            check(
                centers.iter().all(|c| c.is_finite()),
                "manual centers must be finite",
            )?;
        }
        if let Scaling::Manual(scales) = &self.scaling {
            check(
                scales.iter().all(|s| s.is_finite() && *s != 0.0),
                "manual scales must be finite and non-zero",
            )?;
        }
        check(
            !(self.loss == LossType::Multinomial && self.solver == SolverType::Hybrid),
            "the hybrid solver does not support the multinomial loss; use pgd or fista",
        )?;
        check(
            self.alpha_type != AlphaType::Estimate || self.loss == LossType::Quadratic,
            "alpha estimation is only available for the quadratic loss",
        )?;
        Ok(())
    }

    /// The solver actually run once `auto` is resolved against the loss.
    pub fn resolved_solver(&self) -> SolverType {
        match (self.solver, self.loss) {
            (SolverType::Auto, LossType::Multinomial) => SolverType::Fista,
            (SolverType::Auto, _) => SolverType::Hybrid,
            (solver, _) => solver,
        }
    }

    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let mut table: toml::Table = toml::from_str(text)?;
        migrate_deprecated(&mut table)?;
        Ok(toml::Value::Table(table).try_into()?)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }
}

const RENAMED: [(&str, &str); 2] = [("objective", "loss"), ("max_iterations", "max_it")];

/// Rewrites retired option names in place.
fn migrate_deprecated(table: &mut toml::Table) -> Result<(), ConfigError> {
    for (old, current) in RENAMED {
        if let Some(value) = table.remove(old) {
            add_warning_once(
                old,
                WarningCode::DeprecatedFeature,
                format!("option '{old}' is deprecated, use '{current}'"),
            );
            table.entry(current.to_string()).or_insert(value);
        }
    }

    if let Some(value) = table.remove("normalization") {
        add_warning_once(
            "normalization",
            WarningCode::DeprecatedFeature,
            "option 'normalization' is deprecated, use 'centering' and 'scaling'",
        );
        let kind = value.as_str().unwrap_or_default();
        let (centering, scaling) =
            Normalization::from_type(kind).map_err(|e| ConfigError::InvalidValue {
                key: "normalization".to_string(),
                reason: format!("{e}, expected \"standardization\" or \"none\""),
            })?;
        if !table.contains_key("centering") {
            table.insert("centering".to_string(), toml::Value::try_from(centering)?);
        }
        if !table.contains_key("scaling") {
            table.insert("scaling".to_string(), toml::Value::try_from(scaling)?);
        }
    }
    Ok(())
}
