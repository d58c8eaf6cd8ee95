//! The arithmetic engine (§4.2): scalar operators with epsilon-based near-zero
//! safety, and the Monte-Carlo core that propagates uncertainty through every
//! operator when at least one operand is a distribution.

use fermi_common::number::{ci_to_samples, fit_lognormal, fit_normal, fit_uniform};
use fermi_common::{ConfidenceInterpretation, EngineConfig, EngineRng, ErrorKind, RichNumber, SampleBuffer, Value};
use rayon::prelude::*;

/// §4.2 "Numerical safety": `l + r`, snapped to exactly zero when the sum is
/// negligible relative to `l`.
pub fn add_with_epsilon_raw(l: f64, r: f64, eps: f64) -> f64 {
    let sum = l + r;
    if sum.abs() < eps * l.abs() {
        0.0
    } else {
        sum
    }
}

/// Three-way float comparison using the `mod = 1 + eps` tolerance band from
/// §4.2. Returns -1/0/+1.
pub fn float_cmp(l: f64, r: f64, eps: f64) -> i32 {
    let m = 1.0 + eps;
    let equal = if r >= 0.0 { l * m >= r && l <= r * m } else { l * m <= r && l >= r * m };
    if equal {
        0
    } else if l < r {
        -1
    } else {
        1
    }
}

/// §4.2: whether `v` is close enough to zero to treat as zero. Division
/// contexts use a thousand-fold looser tolerance, floored at `1e-12`.
pub fn is_effectively_zero(v: f64, for_division: bool, eps: f64) -> bool {
    let tol = if for_division { eps * 1000.0 } else { eps };
    v.abs() < tol.max(1e-12)
}

/// §4.2 `safe_division`: `Err(DivByZero)` for an exactly-zero or
/// effectively-zero denominator, a non-finite result, or a result whose
/// magnitude exceeds `2^53 - 1`.
pub fn safe_division(a: f64, b: f64, eps: f64) -> Result<f64, ErrorKind> {
    if b == 0.0 || is_effectively_zero(b, true, eps) {
        return Err(ErrorKind::DivByZero);
    }
    let result = a / b;
    if !result.is_finite() || result.abs() > 9_007_199_254_740_991.0 {
        return Err(ErrorKind::DivByZero);
    }
    Ok(result)
}

/// §4.2 `safe_multiplication`: exactly `0` when either operand is
/// effectively zero, otherwise the plain product.
pub fn safe_multiplication(a: f64, b: f64, eps: f64) -> f64 {
    if is_effectively_zero(a, false, eps) || is_effectively_zero(b, false, eps) {
        0.0
    } else {
        a * b
    }
}

fn clone_with_value(template: &RichNumber, val: f64) -> RichNumber {
    match template {
        RichNumber::Raw(_) => RichNumber::Raw(val),
        RichNumber::Currency(_, sym) => RichNumber::Currency(val, sym.clone()),
        RichNumber::Percent(_) => RichNumber::Percent(val),
        RichNumber::Date(_, fmt) => RichNumber::Date(val, fmt.clone()),
        RichNumber::Time(_, fmt) => RichNumber::Time(val, fmt.clone()),
        RichNumber::DateTime(_, fmt) => RichNumber::DateTime(val, fmt.clone()),
        // Distributions never reach the scalar combine path; fall back to Raw.
        _ => RichNumber::Raw(val),
    }
}

fn demote_percent(n: &RichNumber) -> RichNumber {
    match n {
        RichNumber::Percent(v) => RichNumber::Raw(*v),
        other => other.clone(),
    }
}

/// §4.1 additive type-promotion table, applied once the representative
/// scalars have already been combined into `val`.
fn combine_additive(l: &RichNumber, r: &RichNumber, val: f64) -> RichNumber {
    match (l, r) {
        (RichNumber::Date(..), RichNumber::Time(_, fmt)) => RichNumber::DateTime(val, fmt.clone()),
        (RichNumber::DateTime(..), RichNumber::Date(..)) => RichNumber::Raw(val),
        (RichNumber::Raw(_), other) => clone_with_value(other, val),
        (other, RichNumber::Raw(_)) => clone_with_value(other, val),
        _ => clone_with_value(l, val),
    }
}

/// §4.1 multiplicative type-promotion table: `Percent` is demoted to `Raw`
/// before the `Raw + X -> X` rule is applied; same table is reused for `/`
/// and `^` (the spec only states it for `*`, but the "else Raw" fallback is
/// the only sensible reading for the other multiplicative-family operators).
fn combine_multiplicative(l: &RichNumber, r: &RichNumber, val: f64) -> RichNumber {
    let l = demote_percent(l);
    let r = demote_percent(r);
    match (&l, &r) {
        (RichNumber::Raw(_), other) => clone_with_value(other, val),
        (other, RichNumber::Raw(_)) => clone_with_value(other, val),
        _ => RichNumber::Raw(val),
    }
}

/// Coerce a scalar [`Value`] to a [`RichNumber`] per §4.2 "Coercion
/// contracts". Errors propagate their own kind; everything else that can't
/// be read as a number becomes `Value`.
pub fn coerce_scalar_to_number(v: &Value, config: &EngineConfig) -> Result<RichNumber, ErrorKind> {
    match v {
        Value::Number(n) => Ok(n.clone()),
        Value::Bool(b) => Ok(RichNumber::Raw(if *b { 1.0 } else { 0.0 })),
        Value::Empty => Ok(RichNumber::Raw(0.0)),
        Value::String(s) => parse_numeric_string(s, config).ok_or(ErrorKind::Value),
        Value::Error(e) => Err(e.kind),
        Value::Range(_) => Err(ErrorKind::Value),
    }
}

/// §4.2 `coerce_scalar_to_bool`. Returns `None` (not an error kind) because
/// the spec leaves the failure mode to the caller (callers typically map
/// `None` to `Error(Value)`).
pub fn coerce_scalar_to_bool(v: &Value) -> Option<bool> {
    match v {
        Value::Bool(b) => Some(*b),
        Value::Empty => Some(false),
        Value::String(s) if s.is_empty() => Some(false),
        Value::String(s) => match s.to_ascii_uppercase().as_str() {
            "TRUE" => Some(true),
            "FALSE" => Some(false),
            _ => None,
        },
        Value::Number(n) => Some(n.representative() != 0.0),
        _ => None,
    }
}

/// §4.2 `coerce_complex`: `a+bi` style strings to a `[re, im]` pair.
pub fn coerce_complex(s: &str) -> Option<[f64; 2]> {
    let t = s.trim();
    if let Some(stripped) = t.strip_suffix(['i', 'I']) {
        // pure imaginary or re+im form, e.g. "3+4i", "-2i", "5"
        if let Some(pos) = find_split(stripped) {
            let (re_part, im_part) = stripped.split_at(pos);
            let re: f64 = re_part.trim().parse().ok()?;
            let im_str = im_part.trim();
            let im: f64 = match im_str {
                "+" | "" => 1.0,
                "-" => -1.0,
                other => other.parse().ok()?,
            };
            return Some([re, im]);
        }
        let im_str = stripped.trim();
        let im: f64 = match im_str {
            "+" | "" => 1.0,
            "-" => -1.0,
            other => other.parse().ok()?,
        };
        return Some([0.0, im]);
    }
    t.parse::<f64>().ok().map(|re| [re, 0.0])
}

/// Find the index of the `+`/`-` that separates the real and imaginary parts
/// of a complex literal, ignoring a leading sign on the real part and any
/// exponent marker.
fn find_split(s: &str) -> Option<usize> {
    let bytes = s.as_bytes();
    for (i, b) in bytes.iter().enumerate().skip(1) {
        if (*b == b'+' || *b == b'-') && !matches!(bytes[i - 1], b'e' | b'E') {
            return Some(i);
        }
    }
    None
}

/// Parse a numeric string literal, honouring currency symbols, percent
/// suffix, and the configured decimal/thousand separators (§4.2).
pub fn parse_numeric_string(s: &str, config: &EngineConfig) -> Option<RichNumber> {
    let t = s.trim();
    if t.is_empty() {
        return None;
    }
    for sym in &config.currency_symbols {
        if let Some(rest) = t.strip_prefix(sym.as_str()) {
            let v = parse_plain_number(rest.trim(), config)?;
            return Some(RichNumber::Currency(v, sym.clone()));
        }
        if let Some(rest) = t.strip_suffix(sym.as_str()) {
            let v = parse_plain_number(rest.trim(), config)?;
            return Some(RichNumber::Currency(v, sym.clone()));
        }
    }
    if let Some(rest) = t.strip_suffix('%') {
        let v = parse_plain_number(rest.trim(), config)?;
        return Some(RichNumber::Percent(v / 100.0));
    }
    if let Some(v) = parse_plain_number(t, config) {
        return Some(RichNumber::Raw(v));
    }
    None
}

fn parse_plain_number(s: &str, config: &EngineConfig) -> Option<f64> {
    let mut normalized = s.replace(config.thousand_separator, "");
    if config.decimal_separator != '.' {
        normalized = normalized.replace(config.decimal_separator, ".");
    }
    let v: f64 = normalized.parse().ok()?;
    if v.is_finite() {
        Some(v)
    } else {
        None
    }
}

/// Context threaded through every arithmetic call: the engine configuration
/// plus the single mutable RNG stream that keeps sampling reproducible
/// (§5, §8.1 "Determinism modulo RNG").
pub struct ArithCtx<'a> {
    pub config: &'a EngineConfig,
    pub rng: &'a mut EngineRng,
}

fn value_error(v: &Value) -> Option<ErrorKind> {
    match v {
        Value::Error(e) => Some(e.kind),
        _ => None,
    }
}

macro_rules! short_circuit {
    ($l:expr, $r:expr) => {
        if let Some(k) = value_error($l) {
            return Value::error(k);
        }
        if let Some(k) = value_error($r) {
            return Value::error(k);
        }
    };
}

pub fn add(l: &Value, r: &Value, ctx: &mut ArithCtx) -> Value {
    short_circuit!(l, r);
    binary_numeric(l, r, ctx, BinOp::Add)
}

pub fn sub(l: &Value, r: &Value, ctx: &mut ArithCtx) -> Value {
    short_circuit!(l, r);
    binary_numeric(l, r, ctx, BinOp::Sub)
}

pub fn mul(l: &Value, r: &Value, ctx: &mut ArithCtx) -> Value {
    short_circuit!(l, r);
    binary_numeric(l, r, ctx, BinOp::Mul)
}

pub fn div(l: &Value, r: &Value, ctx: &mut ArithCtx) -> Value {
    short_circuit!(l, r);
    binary_numeric(l, r, ctx, BinOp::Div)
}

pub fn pow(l: &Value, r: &Value, ctx: &mut ArithCtx) -> Value {
    short_circuit!(l, r);
    binary_numeric(l, r, ctx, BinOp::Pow)
}

pub fn unary_minus(v: &Value, ctx: &mut ArithCtx) -> Value {
    if let Some(k) = value_error(v) {
        return Value::error(k);
    }
    match coerce_scalar_to_number(v, ctx.config) {
        Ok(n) if n.is_distribution() => {
            let samples = n.to_samples(ctx.config.sample_size, ctx.rng);
            let negated: Vec<f64> = samples.as_slice().iter().map(|s| -s).collect();
            Value::Number(refit_like(&n, &n, negated))
        }
        Ok(n) => Value::Number(clone_with_value(&n, -n.representative())),
        Err(k) => Value::error(k),
    }
}

pub fn unary_plus(v: &Value, ctx: &mut ArithCtx) -> Value {
    if let Some(k) = value_error(v) {
        return Value::error(k);
    }
    match coerce_scalar_to_number(v, ctx.config) {
        Ok(n) => Value::Number(n),
        Err(k) => Value::error(k),
    }
}

pub fn unary_percent(v: &Value, ctx: &mut ArithCtx) -> Value {
    if let Some(k) = value_error(v) {
        return Value::error(k);
    }
    match coerce_scalar_to_number(v, ctx.config) {
        Ok(n) => Value::Number(RichNumber::Percent(n.representative() / 100.0)),
        Err(k) => Value::error(k),
    }
}

enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Pow,
}

fn binary_numeric(l: &Value, r: &Value, ctx: &mut ArithCtx, op: BinOp) -> Value {
    let ln = match coerce_scalar_to_number(l, ctx.config) {
        Ok(n) => n,
        Err(k) => return Value::error(k),
    };
    let rn = match coerce_scalar_to_number(r, ctx.config) {
        Ok(n) => n,
        Err(k) => return Value::error(k),
    };

    if ln.is_distribution() || rn.is_distribution() {
        return distribution_binary(&ln, &rn, ctx, op);
    }

    let eps = ctx.config.precision_epsilon;
    let lv = ln.representative();
    let rv = rn.representative();
    match op {
        BinOp::Add => Value::Number(combine_additive(&ln, &rn, add_with_epsilon_raw(lv, rv, eps))),
        BinOp::Sub => Value::Number(combine_additive(&ln, &rn, add_with_epsilon_raw(lv, -rv, eps))),
        BinOp::Mul => Value::Number(combine_multiplicative(&ln, &rn, safe_multiplication(lv, rv, eps))),
        BinOp::Div => match safe_division(lv, rv, eps) {
            Ok(v) => Value::Number(combine_multiplicative(&ln, &rn, v)),
            Err(k) => Value::error(k),
        },
        BinOp::Pow => {
            let v = lv.powf(rv);
            if !v.is_finite() {
                Value::error(ErrorKind::Num)
            } else {
                Value::Number(combine_multiplicative(&ln, &rn, v))
            }
        }
    }
}

/// Family classification after elementwise Monte-Carlo propagation (§4.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Family {
    Gaussian,
    Uniform,
    LogNormal,
    Sampled,
}

fn is_gaussian(n: &RichNumber) -> bool {
    matches!(n, RichNumber::Gaussian { .. })
}
fn is_lognormal(n: &RichNumber) -> bool {
    matches!(n, RichNumber::LogNormal { .. })
}
fn is_uniform(n: &RichNumber) -> bool {
    matches!(n, RichNumber::Uniform { .. })
}
fn is_scalar_like(n: &RichNumber) -> bool {
    !n.is_distribution()
}

fn classify_add_sub(l: &RichNumber, r: &RichNumber) -> Family {
    if (is_gaussian(l) && (is_gaussian(r) || is_scalar_like(r))) || (is_gaussian(r) && is_scalar_like(l)) {
        return Family::Gaussian;
    }
    if (is_uniform(l) && is_scalar_like(r)) || (is_uniform(r) && is_scalar_like(l)) {
        return Family::Uniform;
    }
    Family::Sampled
}

fn classify_mul_div(l: &RichNumber, r: &RichNumber) -> Family {
    if is_gaussian(l) && is_gaussian(r) {
        // Explicitly not preserved per §4.2: "A mixed Gaussian x Gaussian is
        // Sampled (not preserved)."
        return Family::Sampled;
    }
    let lognormal_ok = (is_lognormal(l) && is_lognormal(r))
        || (is_lognormal(l) && is_scalar_like(r) && r.representative() > 0.0)
        || (is_lognormal(r) && is_scalar_like(l) && l.representative() > 0.0);
    if lognormal_ok {
        return Family::LogNormal;
    }
    if (is_uniform(l) && is_scalar_like(r)) || (is_uniform(r) && is_scalar_like(l)) {
        return Family::Uniform;
    }
    Family::Sampled
}

fn classify_pow(l: &RichNumber, r: &RichNumber) -> Family {
    if is_lognormal(l) && is_scalar_like(r) {
        Family::LogNormal
    } else {
        Family::Sampled
    }
}

fn refit(family: Family, samples: Vec<f64>) -> RichNumber {
    let buf = SampleBuffer::new(samples);
    match family {
        Family::Gaussian => {
            let (mean, variance) = fit_normal(buf.as_slice());
            RichNumber::Gaussian { mean, variance, samples: Some(buf) }
        }
        Family::Uniform => {
            let (lo, hi) = fit_uniform(buf.as_slice());
            RichNumber::Uniform { lo, hi, samples: Some(buf) }
        }
        Family::LogNormal => {
            let (mean, variance) = fit_lognormal(buf.as_slice());
            RichNumber::LogNormal { mean, variance, samples: Some(buf) }
        }
        Family::Sampled => RichNumber::Sampled(buf),
    }
}

/// Re-classify and refit as if `l op r` produced `samples`, using the same
/// family `l` already belongs to (used by unary negation, which never
/// changes family).
fn refit_like(l: &RichNumber, _r: &RichNumber, samples: Vec<f64>) -> RichNumber {
    let family = if is_gaussian(l) {
        Family::Gaussian
    } else if is_uniform(l) {
        Family::Uniform
    } else if is_lognormal(l) {
        Family::LogNormal
    } else {
        Family::Sampled
    };
    refit(family, samples)
}

fn to_samples(n: &RichNumber, config: &EngineConfig, rng: &mut EngineRng) -> SampleBuffer {
    if let RichNumber::ConfidenceInterval { lo, hi, confidence_pct, interp, .. } = n {
        return ci_to_samples(*lo, *hi, *confidence_pct, resolve_ci_interp(*interp, *lo, *hi), config.sample_size, rng);
    }
    n.to_samples(config.sample_size, rng)
}

fn resolve_ci_interp(interp: ConfidenceInterpretation, lo: f64, hi: f64) -> ConfidenceInterpretation {
    match interp {
        ConfidenceInterpretation::Auto => {
            if lo > 0.0 && hi / lo >= 2.0 {
                ConfidenceInterpretation::LogNormal
            } else {
                ConfidenceInterpretation::Normal
            }
        }
        other => other,
    }
}

fn distribution_binary(ln: &RichNumber, rn: &RichNumber, ctx: &mut ArithCtx, op: BinOp) -> Value {
    let eps = ctx.config.precision_epsilon;
    let left_samples = to_samples(ln, ctx.config, ctx.rng);
    let right_samples = to_samples(rn, ctx.config, ctx.rng);

    let pairs: Vec<(f64, f64)> = left_samples.as_slice().iter().copied().zip(right_samples.as_slice().iter().copied()).collect();

    let combined: Result<Vec<f64>, ErrorKind> = match op {
        BinOp::Add => Ok(pairs.par_iter().map(|(a, b)| add_with_epsilon_raw(*a, *b, eps)).collect()),
        BinOp::Sub => Ok(pairs.par_iter().map(|(a, b)| add_with_epsilon_raw(*a, -*b, eps)).collect()),
        BinOp::Mul => Ok(pairs.par_iter().map(|(a, b)| safe_multiplication(*a, *b, eps)).collect()),
        BinOp::Div => {
            let mut out = Vec::with_capacity(pairs.len());
            let mut err = None;
            for (a, b) in &pairs {
                match safe_division(*a, *b, eps) {
                    Ok(v) => out.push(v),
                    Err(k) => {
                        err = Some(k);
                        break;
                    }
                }
            }
            match err {
                Some(k) => Err(k),
                None => Ok(out),
            }
        }
        BinOp::Pow => {
            let mut err = None;
            let out: Vec<f64> = pairs
                .iter()
                .map(|(a, b)| {
                    let v = a.powf(*b);
                    if !v.is_finite() && err.is_none() {
                        err = Some(ErrorKind::Num);
                    }
                    v
                })
                .collect();
            match err {
                Some(k) => Err(k),
                None => Ok(out),
            }
        }
    };

    let samples = match combined {
        Ok(s) => s,
        Err(k) => return Value::error(k),
    };
    if samples.iter().any(|v| !v.is_finite()) {
        return Value::error(ErrorKind::Num);
    }

    let family = match op {
        BinOp::Add | BinOp::Sub => classify_add_sub(ln, rn),
        BinOp::Mul | BinOp::Div => classify_mul_div(ln, rn),
        BinOp::Pow => classify_pow(ln, rn),
    };
    Value::Number(refit(family, samples))
}

/// §4.2 ordered comparators. Numeric comparisons use [`float_cmp`]; other
/// type combinations compare by [`Value::type_of`] ordering first, falling
/// back to string/bool comparison within the same type.
pub fn lt(l: &Value, r: &Value, config: &EngineConfig) -> Value {
    from_compare(l, r, config, |c| c < 0)
}
pub fn leq(l: &Value, r: &Value, config: &EngineConfig) -> Value {
    from_compare(l, r, config, |c| c <= 0)
}
pub fn gt(l: &Value, r: &Value, config: &EngineConfig) -> Value {
    from_compare(l, r, config, |c| c > 0)
}
pub fn geq(l: &Value, r: &Value, config: &EngineConfig) -> Value {
    from_compare(l, r, config, |c| c >= 0)
}

fn from_compare(l: &Value, r: &Value, config: &EngineConfig, pred: impl Fn(i32) -> bool) -> Value {
    match compare(l, r, config) {
        Ok(c) => Value::Bool(pred(c)),
        Err(k) => Value::error(k),
    }
}
pub fn eq(l: &Value, r: &Value, config: &EngineConfig) -> Value {
    strict_equal(l, r, config)
}
pub fn neq(l: &Value, r: &Value, config: &EngineConfig) -> Value {
    match strict_equal(l, r, config) {
        Value::Bool(b) => Value::Bool(!b),
        other => other,
    }
}

fn strict_equal(l: &Value, r: &Value, config: &EngineConfig) -> Value {
    if let Some(k) = value_error(l) {
        return Value::error(k);
    }
    if let Some(k) = value_error(r) {
        return Value::error(k);
    }
    match (l, r) {
        (Value::String(a), Value::String(b)) => {
            if config.case_sensitive {
                Value::Bool(a == b)
            } else {
                Value::Bool(a.eq_ignore_ascii_case(b))
            }
        }
        (Value::Bool(a), Value::Bool(b)) => Value::Bool(a == b),
        (Value::Empty, Value::Empty) => Value::Bool(true),
        _ => match compare(l, r, config) {
            Ok(c) => Value::Bool(c == 0),
            Err(k) => Value::error(k),
        },
    }
}

fn compare(l: &Value, r: &Value, config: &EngineConfig) -> Result<i32, ErrorKind> {
    let ln = coerce_scalar_to_number(l, config)?;
    let rn = coerce_scalar_to_number(r, config)?;
    Ok(float_cmp(ln.representative(), rn.representative(), config.precision_epsilon))
}

#[cfg(test)]
mod tests {
    use super::*;
    use fermi_common::EngineRng;

    fn ctx<'a>(config: &'a EngineConfig, rng: &'a mut EngineRng) -> ArithCtx<'a> {
        ArithCtx { config, rng }
    }

    #[test]
    fn add_commutes_for_scalars() {
        let config = EngineConfig::default();
        let mut rng = EngineRng::from_seed(1);
        let a = Value::raw(2.0);
        let b = Value::raw(3.0);
        assert_eq!(add(&a, &b, &mut ctx(&config, &mut rng)), add(&b, &a, &mut ctx(&config, &mut rng)));
    }

    #[test]
    fn divide_by_zero_errors() {
        let config = EngineConfig::default();
        let mut rng = EngineRng::from_seed(1);
        let v = div(&Value::raw(5.0), &Value::raw(0.0), &mut ctx(&config, &mut rng));
        assert_eq!(v, Value::error(ErrorKind::DivByZero));
    }

    #[test]
    fn gaussian_sum_adds_mean_and_variance() {
        let config = EngineConfig::default().with_sample_size(20_000);
        let mut rng = EngineRng::from_seed(7);
        let a = Value::Number(RichNumber::Gaussian { mean: 1.0, variance: 2.0, samples: None });
        let b = Value::Number(RichNumber::Gaussian { mean: 3.0, variance: 4.0, samples: None });
        let sum = add(&a, &b, &mut ctx(&config, &mut rng));
        match sum {
            Value::Number(RichNumber::Gaussian { mean, variance, .. }) => {
                assert!((mean - 4.0).abs() < 0.2, "mean was {mean}");
                assert!((variance - 6.0).abs() < 0.6, "variance was {variance}");
            }
            other => panic!("expected Gaussian, got {other:?}"),
        }
    }

    #[test]
    fn gaussian_times_scalar_scales_variance() {
        let config = EngineConfig::default().with_sample_size(20_000);
        let mut rng = EngineRng::from_seed(11);
        let a = Value::Number(RichNumber::Gaussian { mean: 1.0, variance: 2.0, samples: None });
        let c = Value::raw(3.0);
        let prod = mul(&a, &c, &mut ctx(&config, &mut rng));
        match prod {
            Value::Number(n) => {
                let mean = n.representative();
                assert!((mean - 3.0).abs() < 0.3, "mean was {mean}");
            }
            other => panic!("expected number, got {other:?}"),
        }
    }

    #[test]
    fn uniform_plus_scalar_preserves_uniform() {
        let config = EngineConfig::default().with_sample_size(20_000);
        let mut rng = EngineRng::from_seed(5);
        let u = Value::Number(RichNumber::Uniform { lo: 0.0, hi: 1.0, samples: None });
        let c = Value::raw(10.0);
        match add(&u, &c, &mut ctx(&config, &mut rng)) {
            Value::Number(RichNumber::Uniform { lo, hi, .. }) => {
                assert!((lo - 10.0).abs() < 0.1);
                assert!((hi - 11.0).abs() < 0.1);
            }
            other => panic!("expected Uniform, got {other:?}"),
        }
    }

    #[test]
    fn mixed_gaussian_times_gaussian_is_sampled() {
        let config = EngineConfig::default().with_sample_size(5_000);
        let mut rng = EngineRng::from_seed(3);
        let a = Value::Number(RichNumber::Gaussian { mean: 1.0, variance: 1.0, samples: None });
        let b = Value::Number(RichNumber::Gaussian { mean: 1.0, variance: 1.0, samples: None });
        match mul(&a, &b, &mut ctx(&config, &mut rng)) {
            Value::Number(RichNumber::Sampled(_)) => {}
            other => panic!("expected Sampled, got {other:?}"),
        }
    }

    #[test]
    fn division_by_distribution_with_zero_sample_errors() {
        let config = EngineConfig::default().with_sample_size(2_000);
        let mut rng = EngineRng::from_seed(9);
        // Uniform(-1, 1) guarantees some samples effectively zero.
        let numerator = Value::raw(1.0);
        let denom = Value::Number(RichNumber::Uniform { lo: -1.0, hi: 1.0, samples: None });
        let result = div(&numerator, &denom, &mut ctx(&config, &mut rng));
        assert_eq!(result, Value::error(ErrorKind::DivByZero));
    }

    #[test]
    fn percent_demoted_before_multiplicative_combine() {
        let config = EngineConfig::default();
        let mut rng = EngineRng::from_seed(1);
        let p = Value::Number(RichNumber::Percent(0.1));
        let c = Value::Number(RichNumber::Currency(2.0, "$".into()));
        match mul(&p, &c, &mut ctx(&config, &mut rng)) {
            Value::Number(RichNumber::Currency(v, sym)) => {
                assert!((v - 0.2).abs() < 1e-9);
                assert_eq!(sym, "$");
            }
            other => panic!("expected Currency, got {other:?}"),
        }
    }
}
