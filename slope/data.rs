//! # Tabular Input and Output
//!
//! Reads a delimited text file with a header row into a dense design matrix and
//! a response vector, and writes fitted coefficients back out. The response is
//! picked by column name; every other column becomes a feature. Failures are
//! assumed to be problems with the user's file and are reported with the
//! offending row and column.

use crate::results::SlopePath;
use ndarray::{Array1, Array2};
use std::path::Path;
use thiserror::Error;

/// A design matrix with its response, ready for fitting.
#[derive(Debug)]
pub struct Dataset {
    pub x: Array2<f64>,
    pub y: Array1<f64>,
    /// Header names of the columns of `x`, in order.
    pub feature_names: Vec<String>,
}

#[derive(Error, Debug)]
pub enum DataError {
    #[error("Error from the CSV reader: {0}")]
    Csv(#[from] csv::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("The response column '{0}' was not found in the input file. Please check spelling and case.")]
    MissingColumn(String),

    #[error("Row {row}, column '{column}': '{value}' is not a number.")]
    NonNumeric {
        row: usize,
        column: String,
        value: String,
    },

    #[error("Row {row}, column '{column}' holds a missing or non-finite value.")]
    NonFinite { row: usize, column: String },

    #[error("Rows of unequal length: {0}")]
    Shape(#[from] ndarray::ShapeError),

    #[error("The input file has no feature columns besides the response.")]
    NoFeatures,

    #[error("The input file contains no data rows.")]
    Empty,
}

fn parse_cell(value: &str, row: usize, column: &str) -> Result<f64, DataError> {
    let trimmed = value.trim();
    if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("na") {
        return Err(DataError::NonFinite {
            row,
            column: column.to_string(),
        });
    }
    let parsed: f64 = trimmed.parse().map_err(|_| DataError::NonNumeric {
        row,
        column: column.to_string(),
        value: trimmed.to_string(),
    })?;
    if !parsed.is_finite() {
        return Err(DataError::NonFinite {
            row,
            column: column.to_string(),
        });
    }
    Ok(parsed)
}

/// Loads `path`, taking the column named `response` as y.
pub fn load_csv(path: impl AsRef<Path>, response: &str, delimiter: u8) -> Result<Dataset, DataError> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(true)
        .trim(csv::Trim::Headers)
        .from_path(path.as_ref())?;

    let headers: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();
    let response_idx = headers
        .iter()
        .position(|h| h == response)
        .ok_or_else(|| DataError::MissingColumn(response.to_string()))?;
    let feature_names: Vec<String> = headers
        .iter()
        .enumerate()
        .filter(|&(j, _)| j != response_idx)
        .map(|(_, h)| h.clone())
        .collect();
    if feature_names.is_empty() {
        return Err(DataError::NoFeatures);
    }

    let mut y = Vec::new();
    let mut values = Vec::new();
    for (i, record) in reader.records().enumerate() {
        let record = record?;
        // Header is line 1.
        let row = i + 2;
        for (j, cell) in record.iter().enumerate() {
            let value = parse_cell(cell, row, &headers[j])?;
            if j == response_idx {
                y.push(value);
            } else {
                values.push(value);
            }
        }
    }
    if y.is_empty() {
        return Err(DataError::Empty);
    }

    let n = y.len();
    let p = feature_names.len();
    let x = Array2::from_shape_vec((n, p), values)?;
    log::info!("Loaded {n} rows and {p} features from {}", path.as_ref().display());

    Ok(Dataset {
        x,
        y: Array1::from(y),
        feature_names,
    })
}

/// Writes one row per (step, class, term) with the coefficient on the original
/// scale. Intercepts appear under the term `(intercept)`; zero coefficients are
/// skipped.
pub fn write_coefficients(path: impl AsRef<Path>, fits: &SlopePath, feature_names: &[String]) -> Result<(), DataError> {
    let mut writer = csv::Writer::from_path(path.as_ref())?;
    writer.write_record(["step", "alpha", "class", "term", "estimate"])?;
    for (step, fit) in fits.iter().enumerate() {
        let alpha = fit.alpha().to_string();
        let step = step.to_string();
        for (k, b0) in fit.intercepts().iter().enumerate() {
            writer.write_record([step.clone(), alpha.clone(), k.to_string(), "(intercept)".to_string(), b0.to_string()])?;
        }
        for (value, (j, k)) in fit.coefficients().iter() {
            let term = feature_names.get(j).cloned().unwrap_or_else(|| format!("x{j}"));
            writer.write_record([step.clone(), alpha.clone(), k.to_string(), term, value.to_string()])?;
        }
    }
    writer.flush()?;
    Ok(())
}
