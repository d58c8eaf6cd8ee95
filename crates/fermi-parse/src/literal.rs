//! Recognises the bit-exact cell literal grammar of §6.2: distribution
//! literals, error-code strings, and the `=`-prefix/`'`-escape rules that
//! decide whether raw cell text is a formula, a string, or a parsed number.

use once_cell::sync::Lazy;
use regex::Regex;

use fermi_common::ErrorKind;

use crate::ast::DistributionLiteral;

static ERROR_CODE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^#[A-Za-z0-9/]+[?!]?$").unwrap());

static GAUSSIAN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^N\(\s*(?:mu|μ)\s*=\s*([^,]+),\s*(?:sigma2|σ²)\s*=\s*([^)]+)\)$").unwrap());
static SAMPLED_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^S\(\s*(?:mu|μ)\s*=\s*([^,]+),\s*(?:sigma2|σ²)\s*=\s*([^)]+)\)$").unwrap());
static CI_BRACKET_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)^CI\[\s*([^,]+),\s*([^\]]+)\]$").unwrap());
static BARE_BRACKET_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\[\s*([^,]+),\s*([^\]]+)\]$").unwrap());
static TO_RANGE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)^\s*([^\s]+)\s+to\s+([^\s]+)\s*$").unwrap());
static LOGNORMAL_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)^LN\(\s*([^,]+),\s*([^)]+)\)$").unwrap());
static UNIFORM_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)^U\(\s*([^,]+),\s*([^)]+)\)$").unwrap());
static LEGACY_CONF_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)^P(\d+(?:\.\d+)?)\[\s*([^,]+),\s*([^\]]+)\]$").unwrap());

fn parse_f64(s: &str) -> Option<f64> {
    s.trim().parse::<f64>().ok()
}

/// Whether `text` starts a formula (§6.2).
pub fn is_formula(text: &str) -> bool {
    text.starts_with('=')
}

/// Apply the leading-apostrophe escape rule: `'=A1` stores the literal
/// string `"=A1"` rather than being treated as a formula.
pub fn strip_leading_apostrophe(text: &str) -> Option<&str> {
    text.strip_prefix('\'')
}

/// Match an error-code string (`#DIV/0!`, `#NAME?`, ...) against the
/// canonical taxonomy, falling back to the generic `Error` kind for any
/// text that matches the shape but not a known code.
pub fn parse_error_literal(text: &str) -> Option<ErrorKind> {
    let trimmed = text.trim();
    if !ERROR_CODE_RE.is_match(trimmed) {
        return None;
    }
    Some(ErrorKind::parse(trimmed).unwrap_or(ErrorKind::Error))
}

/// Recognise one of the §6.2 distribution literal patterns. Returns
/// `None` if `text` doesn't match any of them.
pub fn parse_distribution_literal(text: &str) -> Option<DistributionLiteral> {
    let t = text.trim();

    if let Some(c) = GAUSSIAN_RE.captures(t) {
        let mean = parse_f64(&c[1])?;
        let variance = parse_f64(&c[2])?;
        return Some(DistributionLiteral::Gaussian { mean, variance });
    }
    if let Some(c) = SAMPLED_RE.captures(t) {
        let mean = parse_f64(&c[1])?;
        let variance = parse_f64(&c[2])?;
        return Some(DistributionLiteral::Sampled { mean, variance });
    }
    if let Some(c) = LOGNORMAL_RE.captures(t) {
        let mean = parse_f64(&c[1])?;
        let variance = parse_f64(&c[2])?;
        return Some(DistributionLiteral::LogNormal { mean, variance });
    }
    if let Some(c) = UNIFORM_RE.captures(t) {
        let lo = parse_f64(&c[1])?;
        let hi = parse_f64(&c[2])?;
        return Some(DistributionLiteral::Uniform { lo, hi });
    }
    if let Some(c) = LEGACY_CONF_RE.captures(t) {
        let confidence_pct = parse_f64(&c[1])?;
        let lo = parse_f64(&c[2])?;
        let hi = parse_f64(&c[3])?;
        return Some(DistributionLiteral::ConfidenceInterval { lo, hi, confidence_pct });
    }
    if let Some(c) = CI_BRACKET_RE.captures(t) {
        let lo = parse_f64(&c[1])?;
        let hi = parse_f64(&c[2])?;
        return Some(DistributionLiteral::ConfidenceInterval { lo, hi, confidence_pct: 90.0 });
    }
    if let Some(c) = BARE_BRACKET_RE.captures(t) {
        let lo = parse_f64(&c[1])?;
        let hi = parse_f64(&c[2])?;
        return Some(DistributionLiteral::ConfidenceInterval { lo, hi, confidence_pct: 90.0 });
    }
    if let Some(c) = TO_RANGE_RE.captures(t) {
        let lo = parse_f64(&c[1])?;
        let hi = parse_f64(&c[2])?;
        return Some(DistributionLiteral::ConfidenceInterval { lo, hi, confidence_pct: 90.0 });
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gaussian_literal_with_unicode_params() {
        let lit = parse_distribution_literal("N(μ=3.5, σ²=0.25)").unwrap();
        assert_eq!(lit, DistributionLiteral::Gaussian { mean: 3.5, variance: 0.25 });
    }

    #[test]
    fn gaussian_literal_with_ascii_params() {
        let lit = parse_distribution_literal("N(mu=3.5, sigma2=0.25)").unwrap();
        assert_eq!(lit, DistributionLiteral::Gaussian { mean: 3.5, variance: 0.25 });
    }

    #[test]
    fn bare_bracket_and_ci_bracket_agree_at_90_pct() {
        let bare = parse_distribution_literal("[10, 20]").unwrap();
        let ci = parse_distribution_literal("CI[10, 20]").unwrap();
        assert_eq!(bare, ci);
    }

    #[test]
    fn legacy_confidence_prefix() {
        let lit = parse_distribution_literal("P95[10, 20]").unwrap();
        assert_eq!(
            lit,
            DistributionLiteral::ConfidenceInterval {
                lo: 10.0,
                hi: 20.0,
                confidence_pct: 95.0
            }
        );
    }

    #[test]
    fn to_range_literal() {
        let lit = parse_distribution_literal("10 to 20").unwrap();
        assert_eq!(
            lit,
            DistributionLiteral::ConfidenceInterval {
                lo: 10.0,
                hi: 20.0,
                confidence_pct: 90.0
            }
        );
    }

    #[test]
    fn error_literal_matches_known_code() {
        assert_eq!(parse_error_literal("#DIV/0!"), Some(ErrorKind::DivByZero));
        assert_eq!(parse_error_literal("#BOGUS!"), Some(ErrorKind::Error));
        assert_eq!(parse_error_literal("hello"), None);
    }

    #[test]
    fn single_arg_gaussian_literal_is_left_unmatched() {
        // §8.3: "Parsing N(1) (one arg) leaves the string unmatched."
        assert_eq!(parse_distribution_literal("N(1)"), None);
    }

    #[test]
    fn apostrophe_escapes_formula_marker() {
        assert_eq!(strip_leading_apostrophe("'=A1"), Some("=A1"));
        assert!(is_formula("=A1+B1"));
        assert!(!is_formula("'=A1"));
    }
}
