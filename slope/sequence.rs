//! # Regularization Sequences
//!
//! The λ weight sequences (BH, Gaussian, OSCAR, lasso), the standard normal
//! quantile they are built from, and the geometric α grid of a path.

use crate::error::SlopeError;
use crate::parameters::LambdaType;
use ndarray::Array1;

const A: [f64; 8] = [
    3.387_132_872_796_366_608,
    133.141_667_891_784_377_45,
    1_971.590_950_306_551_442_7,
    13_731.693_765_509_461_125,
    45_921.953_931_549_871_457,
    67_265.770_927_008_700_853,
    33_430.575_583_588_128_105,
    2_509.080_928_730_122_672_7,
];
const B: [f64; 8] = [
    1.0,
    42.313_330_701_600_911_252,
    687.187_007_492_057_908_3,
    5_394.196_021_424_751_107_7,
    21_213.794_301_586_595_867,
    39_307.895_800_092_710_61,
    28_729.085_735_721_942_674,
    5_226.495_278_852_854_561,
];
const C: [f64; 8] = [
    1.423_437_110_749_683_577_34,
    4.630_337_846_156_545_295_9,
    5.769_497_221_460_691_405_5,
    3.647_848_324_763_204_605_04,
    1.270_458_252_452_368_382_58,
    0.241_780_725_177_450_611_77,
    0.022_723_844_989_269_184_583_3,
    7.745_450_142_783_414_076_4e-4,
];
const D: [f64; 8] = [
    1.0,
    2.053_191_626_637_758_821_87,
    1.676_384_830_183_803_849_4,
    0.689_767_334_985_100_004_55,
    0.148_103_976_427_480_074_59,
    0.015_198_666_563_616_457_196_6,
    5.475_938_084_995_344_946e-4,
    1.050_750_071_644_416_843_24e-9,
];
const E: [f64; 8] = [
    6.657_904_643_501_103_777_2,
    5.463_784_911_164_114_369_9,
    1.784_826_539_917_291_335_8,
    0.296_560_571_828_504_891_23,
    0.026_532_189_526_576_123_093,
    0.001_242_660_947_388_078_438_6,
    2.711_555_568_743_487_578_15e-5,
    2.010_334_399_292_288_132_65e-7,
];
const F: [f64; 8] = [
    1.0,
    0.599_832_206_555_887_937_69,
    0.136_929_880_922_735_805_31,
    0.014_875_361_290_850_614_852_5,
    7.868_691_311_456_132_591e-4,
    1.846_318_317_510_054_681_8e-5,
    1.421_511_758_316_445_888_7e-7,
    2.044_263_103_389_939_785_64e-15,
];

fn poly(coefs: &[f64; 8], x: f64) -> f64 {
    coefs.iter().rev().fold(0.0, |acc, &c| acc * x + c)
}

/// Standard normal quantile Φ⁻¹(p), Wichura's algorithm AS 241 (about 16
/// significant digits).
pub fn qnorm(p: f64) -> Result<f64, SlopeError> {
    if !(0.0..=1.0).contains(&p) {
        return Err(SlopeError::invalid(format!(
            "probability must lie in [0, 1], got {p}"
        )));
    }
    if p == 0.0 {
        return Ok(f64::NEG_INFINITY);
    }
    if p == 1.0 {
        return Ok(f64::INFINITY);
    }

    let q = p - 0.5;
    if q.abs() <= 0.425 {
        let r = 0.180625 - q * q;
        return Ok(q * poly(&A, r) / poly(&B, r));
    }

    let tail = if q < 0.0 { p } else { 1.0 - p };
    let r = (-tail.ln()).sqrt();
    let value = if r <= 5.0 {
        let r = r - 1.6;
        poly(&C, r) / poly(&D, r)
    } else {
        let r = r - 5.0;
        poly(&E, r) / poly(&F, r)
    };
    Ok(if q < 0.0 { -value } else { value })
}

/// Benjamini-Hochberg weights `λᵢ = Φ⁻¹(1 − q(i + 1)/(2p))`.
fn bh(p: usize, q: f64) -> Result<Array1<f64>, SlopeError> {
    let mut out = Array1::zeros(p);
    for i in 0..p {
        out[i] = qnorm(1.0 - q * (i + 1) as f64 / (2.0 * p as f64))?;
    }
    Ok(out)
}

/// Builds a λ sequence of length `p`. `n` is only used by the Gaussian type.
pub fn lambda_sequence(
    kind: LambdaType,
    p: usize,
    n: usize,
    q: f64,
    theta1: f64,
    theta2: f64,
) -> Result<Array1<f64>, SlopeError> {
    let lambda = match kind {
        LambdaType::Lasso => Array1::ones(p),
        LambdaType::Oscar => Array1::from_iter((0..p).map(|i| theta1 + theta2 * (p - i - 1) as f64)),
        LambdaType::Bh => bh(p, q)?,
        LambdaType::Gaussian => {
            let mut lambda = bh(p, q)?;
            let mut sum_sq = 0.0;
            for i in 1..p {
                sum_sq += lambda[i - 1] * lambda[i - 1];
                let w = 1.0 / (n as f64 - i as f64 - 1.0).max(1.0);
                let value = lambda[i] * (1.0 + w * sum_sq).sqrt();
                if value > lambda[i - 1] {
                    let previous = lambda[i - 1];
                    lambda.slice_mut(ndarray::s![i..]).fill(previous);
                    break;
                }
                lambda[i] = value;
            }
            lambda
        }
    };
    Ok(lambda)
}

/// `path_length` values from `alpha_max` down to `ratio · alpha_max`, evenly spaced
/// on the log scale.
pub fn alpha_grid(alpha_max: f64, ratio: f64, path_length: usize) -> Array1<f64> {
    if path_length <= 1 {
        return Array1::from_elem(path_length, alpha_max);
    }
    let last = (path_length - 1) as f64;
    Array1::from_iter((0..path_length).map(|i| alpha_max * ratio.powf(i as f64 / last)))
}

/// Default `α_min / α_max` for a problem of shape `n × p`.
pub fn default_alpha_min_ratio(n: usize, p: usize) -> f64 {
    if n > p { 1e-2 } else { 1e-4 }
}
