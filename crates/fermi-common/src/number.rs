//! Rich numbers (§3.2): the scalar/currency/date/distribution sum type that
//! backs every numeric `Value`. Distribution variants carry or can
//! regenerate a Monte-Carlo sample vector of configurable length.

use std::fmt;
use std::sync::Arc;

use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};

use crate::rng::EngineRng;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// How a confidence interval's bounds should be read as a distribution
/// family (§3.2).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ConfidenceInterpretation {
    Normal,
    Uniform,
    LogNormal,
    Auto,
}

/// Confidence level -> z-score table used by §4.2.1. Falls back to the 90%
/// value (1.645) for anything not in the table, matching the reference's
/// hardcoded default.
pub fn z_score_for_confidence(confidence_pct: f64) -> f64 {
    if (confidence_pct - 90.0).abs() < 1e-9 {
        1.645
    } else if (confidence_pct - 95.0).abs() < 1e-9 {
        1.96
    } else if (confidence_pct - 99.0).abs() < 1e-9 {
        2.576
    } else {
        1.645
    }
}

/// Immutable Monte-Carlo sample vector. Shared via `Arc` so cloning a
/// `RichNumber` never copies the underlying samples.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleBuffer(Arc<[f64]>);

impl SampleBuffer {
    pub fn new(samples: Vec<f64>) -> Self {
        SampleBuffer(samples.into())
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn mean(&self) -> f64 {
        if self.0.is_empty() {
            return 0.0;
        }
        self.0.iter().sum::<f64>() / self.0.len() as f64
    }
}

/// A rich number: a representative scalar (`val`, via `representative()`)
/// plus a detailed type (§3.2).
#[derive(Debug, Clone, PartialEq)]
pub enum RichNumber {
    Raw(f64),
    Currency(f64, String),
    Percent(f64),
    Date(f64, String),
    Time(f64, String),
    DateTime(f64, String),
    Gaussian {
        mean: f64,
        variance: f64,
        samples: Option<SampleBuffer>,
    },
    LogNormal {
        mean: f64,
        variance: f64,
        samples: Option<SampleBuffer>,
    },
    Uniform {
        lo: f64,
        hi: f64,
        samples: Option<SampleBuffer>,
    },
    ConfidenceInterval {
        lo: f64,
        hi: f64,
        confidence_pct: f64,
        interp: ConfidenceInterpretation,
        source: Option<Box<RichNumber>>,
    },
    Sampled(SampleBuffer),
}

impl RichNumber {
    /// The representative scalar (`val` in §3.2): used wherever a rich
    /// number must collapse to one `f64` (display, coercion, comparisons).
    pub fn representative(&self) -> f64 {
        match self {
            RichNumber::Raw(v) => *v,
            RichNumber::Currency(v, _) => *v,
            RichNumber::Percent(v) => *v,
            RichNumber::Date(v, _) | RichNumber::Time(v, _) | RichNumber::DateTime(v, _) => *v,
            RichNumber::Gaussian { mean, .. } => *mean,
            RichNumber::LogNormal { mean, variance, .. } => (mean + variance / 2.0).exp(),
            RichNumber::Uniform { lo, hi, .. } => (lo + hi) / 2.0,
            RichNumber::ConfidenceInterval { lo, hi, interp, .. } => ci_median(*lo, *hi, *interp),
            RichNumber::Sampled(samples) => samples.mean(),
        }
    }

    pub fn detailed_type_name(&self) -> &'static str {
        match self {
            RichNumber::Raw(_) => "Raw",
            RichNumber::Currency(..) => "Currency",
            RichNumber::Percent(_) => "Percent",
            RichNumber::Date(..) => "Date",
            RichNumber::Time(..) => "Time",
            RichNumber::DateTime(..) => "DateTime",
            RichNumber::Gaussian { .. } => "Gaussian",
            RichNumber::LogNormal { .. } => "LogNormal",
            RichNumber::Uniform { .. } => "Uniform",
            RichNumber::ConfidenceInterval { .. } => "ConfidenceInterval",
            RichNumber::Sampled(_) => "Sampled",
        }
    }

    pub fn is_distribution(&self) -> bool {
        matches!(
            self,
            RichNumber::Gaussian { .. }
                | RichNumber::LogNormal { .. }
                | RichNumber::Uniform { .. }
                | RichNumber::ConfidenceInterval { .. }
                | RichNumber::Sampled(_)
        )
    }

    /// Construct a confidence interval, enforcing the §3.2 fallback rules:
    /// `LogNormal` interpretation requires strictly positive bounds, and
    /// `Auto` resolves to a concrete interpretation immediately.
    pub fn confidence_interval(lo: f64, hi: f64, confidence_pct: f64, interp: ConfidenceInterpretation) -> RichNumber {
        let resolved = match interp {
            ConfidenceInterpretation::LogNormal if !(lo > 0.0 && hi > 0.0) => ConfidenceInterpretation::Normal,
            ConfidenceInterpretation::Auto => {
                if lo > 0.0 && hi / lo >= 2.0 {
                    ConfidenceInterpretation::LogNormal
                } else {
                    ConfidenceInterpretation::Normal
                }
            }
            other => other,
        };
        RichNumber::ConfidenceInterval {
            lo,
            hi,
            confidence_pct,
            interp: resolved,
            source: None,
        }
    }

    /// Materialise (or return the cached) sample vector of `len` draws
    /// (§3.2, §4.2). Confidence intervals are first converted to their
    /// resolved parametric form (§4.2.1) before sampling.
    pub fn to_samples(&self, len: usize, rng: &mut EngineRng) -> SampleBuffer {
        match self {
            RichNumber::Gaussian { mean, variance, samples } => {
                samples.clone().unwrap_or_else(|| sample_gaussian(*mean, *variance, len, rng))
            }
            RichNumber::LogNormal { mean, variance, samples } => samples
                .clone()
                .unwrap_or_else(|| sample_lognormal(*mean, *variance, len, rng)),
            RichNumber::Uniform { lo, hi, samples } => samples.clone().unwrap_or_else(|| sample_uniform(*lo, *hi, len, rng)),
            RichNumber::Sampled(samples) => samples.clone(),
            RichNumber::ConfidenceInterval { lo, hi, confidence_pct, interp, .. } => {
                ci_to_samples(*lo, *hi, *confidence_pct, *interp, len, rng)
            }
            other => SampleBuffer::new(vec![other.representative(); len]),
        }
    }
}

/// Baseline rendering rules (§4.7): two-decimal formatting for every
/// distribution, since their defining parameters are display-only and
/// don't go through the config-aware `smart_rounding` path that plain
/// scalars do. Callers that need locale/rounding-aware scalar formatting
/// (currency symbols, significant-digit rounding) go through the
/// serialization layer instead of this impl.
impl fmt::Display for RichNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RichNumber::Raw(v) => write!(f, "{v}"),
            RichNumber::Currency(v, symbol) => write!(f, "{symbol}{v:.2}"),
            RichNumber::Percent(v) => write!(f, "{:.2}%", v * 100.0),
            RichNumber::Date(serial, pattern) => f.write_str(&format_date_serial(*serial, pattern)),
            RichNumber::Time(serial, pattern) => f.write_str(&format_time_serial(*serial, pattern)),
            RichNumber::DateTime(serial, pattern) => f.write_str(&format_datetime_serial(*serial, pattern)),
            RichNumber::Gaussian { mean, variance, .. } => write!(f, "N(\u{3bc}={mean:.2}, \u{3c3}\u{b2}={variance:.2})"),
            RichNumber::LogNormal { mean, variance, .. } => write!(f, "LN(\u{3bc}={mean:.2}, \u{3c3}\u{b2}={variance:.2})"),
            RichNumber::Uniform { lo, hi, .. } => write!(f, "U({lo:.2}, {hi:.2})"),
            RichNumber::ConfidenceInterval { lo, hi, .. } => write!(f, "CI[{lo:.2}, {hi:.2}]"),
            RichNumber::Sampled(samples) => {
                let (mean, variance) = fit_normal(samples.as_slice());
                write!(f, "S(\u{3bc}={mean:.2}, \u{3c3}\u{b2}={variance:.2})")
            }
        }
    }
}

/// Day 0 of the Excel 1900 serial date system (§4.7). Doesn't reproduce
/// Excel's fictitious Feb-29-1900 leap bug; display-only, not a DATE
/// function.
fn excel_epoch() -> NaiveDate {
    NaiveDate::from_ymd_opt(1899, 12, 30).expect("valid epoch date")
}

fn format_date_serial(serial: f64, pattern: &str) -> String {
    match excel_epoch().checked_add_signed(Duration::days(serial.floor() as i64)) {
        Some(date) => date.format(pattern).to_string(),
        None => serial.to_string(),
    }
}

fn seconds_from_midnight(serial: f64) -> Option<NaiveTime> {
    let secs = (serial.fract().abs() * 86_400.0).round() as i64;
    NaiveTime::from_num_seconds_from_midnight_opt(secs.rem_euclid(86_400) as u32, 0)
}

fn format_time_serial(serial: f64, pattern: &str) -> String {
    match seconds_from_midnight(serial) {
        Some(time) => time.format(pattern).to_string(),
        None => serial.to_string(),
    }
}

fn format_datetime_serial(serial: f64, pattern: &str) -> String {
    let date = excel_epoch().checked_add_signed(Duration::days(serial.floor() as i64));
    match (date, seconds_from_midnight(serial)) {
        (Some(date), Some(time)) => NaiveDateTime::new(date, time).format(pattern).to_string(),
        _ => serial.to_string(),
    }
}

fn ci_median(lo: f64, hi: f64, interp: ConfidenceInterpretation) -> f64 {
    match interp {
        ConfidenceInterpretation::LogNormal => (lo.ln() + hi.ln()).exp().sqrt(),
        _ => (lo + hi) / 2.0,
    }
}

/// §4.2.1: confidence interval -> sample vector under its resolved
/// interpretation.
pub fn ci_to_samples(
    lo: f64,
    hi: f64,
    confidence_pct: f64,
    interp: ConfidenceInterpretation,
    len: usize,
    rng: &mut EngineRng,
) -> SampleBuffer {
    let z = z_score_for_confidence(confidence_pct);
    match interp {
        ConfidenceInterpretation::Normal | ConfidenceInterpretation::Auto => {
            let mean = (lo + hi) / 2.0;
            let sigma = (hi - lo) / (2.0 * z);
            sample_gaussian(mean, sigma * sigma, len, rng)
        }
        ConfidenceInterpretation::Uniform => sample_uniform(lo, hi, len, rng),
        ConfidenceInterpretation::LogNormal => {
            let ln_lo = lo.ln();
            let ln_hi = hi.ln();
            let mean = (ln_lo + ln_hi) / 2.0;
            let sigma = (ln_hi - ln_lo) / (2.0 * z);
            sample_lognormal(mean, sigma * sigma, len, rng)
        }
    }
}

pub fn sample_gaussian(mean: f64, variance: f64, len: usize, rng: &mut EngineRng) -> SampleBuffer {
    SampleBuffer::new((0..len).map(|_| rng.normal(mean, variance)).collect())
}

pub fn sample_lognormal(mean: f64, variance: f64, len: usize, rng: &mut EngineRng) -> SampleBuffer {
    SampleBuffer::new((0..len).map(|_| rng.normal(mean, variance).exp()).collect())
}

pub fn sample_uniform(lo: f64, hi: f64, len: usize, rng: &mut EngineRng) -> SampleBuffer {
    SampleBuffer::new((0..len).map(|_| rng.uniform(lo, hi)).collect())
}

/// Fit a normal distribution's parameters back from a sample vector (§4.2).
pub fn fit_normal(samples: &[f64]) -> (f64, f64) {
    if samples.is_empty() {
        return (0.0, 0.0);
    }
    let n = samples.len() as f64;
    let mean = samples.iter().sum::<f64>() / n;
    let variance = samples.iter().map(|s| (s - mean).powi(2)).sum::<f64>() / n;
    (mean, variance)
}

/// Fit a log-normal distribution's underlying-normal parameters from a
/// sample vector of strictly positive draws.
pub fn fit_lognormal(samples: &[f64]) -> (f64, f64) {
    let logs: Vec<f64> = samples.iter().filter(|s| **s > 0.0).map(|s| s.ln()).collect();
    fit_normal(&logs)
}

/// Fit a uniform distribution's bounds from a sample vector, falling back
/// to a `±0.5` spread around the single value when the samples collapse
/// to one point.
pub fn fit_uniform(samples: &[f64]) -> (f64, f64) {
    if samples.is_empty() {
        return (0.0, 0.0);
    }
    let lo = samples.iter().cloned().fold(f64::INFINITY, f64::min);
    let hi = samples.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    if (hi - lo).abs() < f64::EPSILON {
        (lo - 0.5, hi + 0.5)
    } else {
        (lo, hi)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rng::EngineRng;

    #[test]
    fn lognormal_representative_matches_formula() {
        let n = RichNumber::LogNormal {
            mean: 1.0,
            variance: 0.25,
            samples: None,
        };
        let expected = (1.0f64 + 0.125).exp();
        assert!((n.representative() - expected).abs() < 1e-9);
    }

    #[test]
    fn ci_lognormal_requires_positive_bounds() {
        let n = RichNumber::confidence_interval(-1.0, 5.0, 90.0, ConfidenceInterpretation::LogNormal);
        match n {
            RichNumber::ConfidenceInterval { interp, .. } => assert_eq!(interp, ConfidenceInterpretation::Normal),
            _ => panic!("expected CI"),
        }
    }

    #[test]
    fn ci_auto_picks_lognormal_for_wide_ratio() {
        let n = RichNumber::confidence_interval(10.0, 30.0, 90.0, ConfidenceInterpretation::Auto);
        match n {
            RichNumber::ConfidenceInterval { interp, .. } => assert_eq!(interp, ConfidenceInterpretation::LogNormal),
            _ => panic!("expected CI"),
        }
    }

    #[test]
    fn fit_normal_recovers_mean() {
        let mut rng = EngineRng::from_seed(3);
        let samples = sample_gaussian(5.0, 4.0, 50_000, &mut rng);
        let (mean, _) = fit_normal(samples.as_slice());
        assert!((mean - 5.0).abs() < 0.1);
    }

    #[test]
    fn fit_uniform_falls_back_when_collapsed() {
        let (lo, hi) = fit_uniform(&[2.0, 2.0, 2.0]);
        assert_eq!(lo, 1.5);
        assert_eq!(hi, 2.5);
    }

    #[test]
    fn gaussian_display_uses_two_decimals() {
        let n = RichNumber::Gaussian { mean: 1.0, variance: 0.25, samples: None };
        assert_eq!(n.to_string(), "N(\u{3bc}=1.00, \u{3c3}\u{b2}=0.25)");
    }

    #[test]
    fn currency_display_prefixes_symbol() {
        let n = RichNumber::Currency(12.5, "$".to_string());
        assert_eq!(n.to_string(), "$12.50");
    }

    #[test]
    fn date_display_formats_against_excel_epoch() {
        // Serial 1 is 1899-12-31 under the 1900 system.
        let n = RichNumber::Date(1.0, "%Y-%m-%d".to_string());
        assert_eq!(n.to_string(), "1899-12-31");
    }
}
