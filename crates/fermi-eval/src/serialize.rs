//! Serialization surface (§4.7): render a cell value for export, honouring
//! the translation package and `smart_rounding`. `RichNumber`'s own
//! `Display` already covers the distribution formats (`N(...)`, `S(...)`,
//! `CI[...]`, two-decimal, config-independent); this module adds the one
//! thing that IS config-sensitive — plain scalar rounding — and dispatches
//! across the rest of `Value`.

use fermi_common::{CellError, EngineConfig, RichNumber, SimpleCellAddress, SimpleRangeValue, Value};

use crate::engine::{CellChange, RecomputeReport};

/// Render `value` for export. `None` stands in for `Empty -> null` (§4.7);
/// every other case renders to a display string.
pub fn serialize_value(value: &Value, config: &EngineConfig) -> Option<String> {
    match value {
        Value::Empty => None,
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Error(err) => Some(serialize_error(err, config)),
        Value::Number(n) => Some(serialize_number(n, config)),
        Value::Range(r) => Some(serialize_range(r, config)),
    }
}

fn serialize_error(err: &CellError, config: &EngineConfig) -> String {
    config.translation_package.translate_error(err.kind.code())
}

/// Plain scalars go through `smart_rounding`; every other rich number
/// (currency, percent, date/time, the distribution family) renders via its
/// own `Display`, which §4.7 fixes independently of configuration.
fn serialize_number(n: &RichNumber, config: &EngineConfig) -> String {
    match n {
        RichNumber::Raw(v) => smart_round_display(*v, config),
        other => other.to_string(),
    }
}

fn smart_round_display(v: f64, config: &EngineConfig) -> String {
    if !config.smart_rounding {
        return v.to_string();
    }
    round_significant(v, config.precision_rounding).to_string()
}

/// Half-away-from-zero rounding to `digits` significant figures (§4.7).
fn round_significant(v: f64, digits: u8) -> f64 {
    if v == 0.0 || !v.is_finite() {
        return v;
    }
    let magnitude = v.abs().log10().floor();
    let factor = 10f64.powf((digits as f64 - 1.0) - magnitude);
    round_half_away_from_zero(v * factor) / factor
}

fn round_half_away_from_zero(x: f64) -> f64 {
    if x >= 0.0 {
        (x + 0.5).floor()
    } else {
        (x - 0.5).ceil()
    }
}

/// Not part of the core serialization rules (§4.7 only names scalar
/// rendering), but an array formula's cached result is a `Value::Range`
/// like any other cell value, so exporting one needs some textual form.
/// Rows are `;`-separated, cells `,`-separated; empty cells render blank.
fn serialize_range(range: &SimpleRangeValue, config: &EngineConfig) -> String {
    let mut rows = Vec::with_capacity(range.height());
    for row in 0..range.height() {
        let cells: Vec<String> = (0..range.width())
            .map(|col| range.get(col, row).and_then(|v| serialize_value(v, config)).unwrap_or_default())
            .collect();
        rows.push(cells.join(","));
    }
    rows.join(";")
}

/// Produce the set of exported changes for a recompute pass (§4.6 step 5).
pub fn serialize_changes(report: &RecomputeReport, config: &EngineConfig) -> Vec<(SimpleCellAddress, Option<String>)> {
    report
        .changed
        .iter()
        .map(|CellChange { address, value }| (*address, serialize_value(value, config)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use fermi_common::ErrorKind;

    #[test]
    fn empty_serializes_to_none() {
        assert_eq!(serialize_value(&Value::Empty, &EngineConfig::new()), None);
    }

    #[test]
    fn error_serializes_through_translation_package() {
        let config = EngineConfig::new();
        let value = Value::error(ErrorKind::DivByZero);
        assert_eq!(serialize_value(&value, &config), Some("#DIV/0!".to_string()));
    }

    #[test]
    fn gaussian_uses_fixed_two_decimal_format() {
        let config = EngineConfig::new();
        let value = Value::Number(RichNumber::Gaussian { mean: 1.0, variance: 0.25, samples: None });
        assert_eq!(serialize_value(&value, &config), Some("N(\u{3bc}=1.00, \u{3c3}\u{b2}=0.25)".to_string()));
    }

    #[test]
    fn raw_number_honours_smart_rounding() {
        let config = EngineConfig::new().with_smart_rounding(true);
        let value = Value::raw(1.0 / 3.0);
        let rendered = serialize_value(&value, &config).unwrap();
        assert!(rendered.starts_with("0.3333333333"), "got {rendered}");
    }

    #[test]
    fn raw_number_skips_rounding_when_disabled() {
        let config = EngineConfig::new().with_smart_rounding(false);
        let value = Value::raw(1.0 / 3.0);
        let rendered = serialize_value(&value, &config).unwrap();
        assert_eq!(rendered, (1.0f64 / 3.0).to_string());
    }

    #[test]
    fn range_renders_rows_and_cells() {
        let config = EngineConfig::new();
        let range = SimpleRangeValue::new(2, 2, vec![Value::raw(1.0), Value::raw(2.0), Value::Empty, Value::raw(4.0)]);
        assert_eq!(serialize_range(&range, &config), "1,2;,4");
    }

    #[test]
    fn half_away_from_zero_rounds_negative_correctly() {
        assert_eq!(round_half_away_from_zero(-2.5), -3.0);
        assert_eq!(round_half_away_from_zero(2.5), 3.0);
    }
}
