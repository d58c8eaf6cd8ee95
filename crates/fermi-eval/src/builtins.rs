//! Registration and implementation of the builtin function surface (§6.3).
//!
//! Everything here is a plain [`FunctionImpl`](crate::function::FunctionImpl)
//! registered by name into a [`FunctionRegistry`]. The handful of functions
//! that need their argument ASTs rather than evaluated values (`IF`, `IFS`,
//! `CHOOSE`, `SWITCH`, `IFERROR`, `IFNA`, `FORMULATEXT`) are special-cased in
//! the evaluator instead and never appear here. This module only covers the
//! illustrative list from §6.3; it is not meant to grow into a full
//! spreadsheet function library.

use fermi_common::{CellError, ErrorKind, RichNumber, Value};

use crate::arith::coerce_scalar_to_number;
use crate::function::{ArgType, FnFlags, FunctionContext, FunctionRegistry, FunctionSpec, ParamSpec};

pub fn register_builtins(reg: &mut FunctionRegistry) {
    register_logical(reg);
    register_text(reg);
    register_math(reg);
    register_trig(reg);
    register_random(reg);
    register_aggregation(reg);
}

fn err(kind: ErrorKind) -> Value {
    Value::Error(CellError::new(kind))
}

fn num(args: &[Value], i: usize, ctx: &FunctionContext) -> Result<f64, Value> {
    match args.get(i) {
        Some(v) => coerce_scalar_to_number(v, ctx.config).map(|n| n.representative()).map_err(err),
        None => Err(err(ErrorKind::Value)),
    }
}

fn num_or(args: &[Value], i: usize, ctx: &FunctionContext, default: f64) -> Result<f64, Value> {
    if args.len() > i {
        num(args, i, ctx)
    } else {
        Ok(default)
    }
}

fn text(args: &[Value], i: usize) -> Result<String, Value> {
    match args.get(i) {
        Some(Value::Error(e)) => Err(Value::Error(e.clone())),
        Some(v) => Ok(v.to_string()),
        None => Err(err(ErrorKind::Value)),
    }
}

/// Flatten the scalar values a reduction-style function sees: each argument
/// is either already a scalar or a materialized range, and a reduction
/// visits every cell of every range in argument order (§4.4 "Vectorization"
/// covers per-cell broadcast for elementwise functions; reductions fold
/// across the whole argument list instead).
fn flatten(args: &[Value]) -> Vec<&Value> {
    let mut out = Vec::new();
    for a in args {
        match a {
            Value::Range(r) => out.extend(r.iter()),
            other => out.push(other),
        }
    }
    out
}

// ---------------------------------------------------------------------
// Logical
// ---------------------------------------------------------------------

fn register_logical(reg: &mut FunctionRegistry) {
    reg.register(FunctionSpec {
        name: "AND",
        params: &[ParamSpec::repeating("condition", ArgType::Bool)],
        flags: FnFlags::PURE,
        call: |args, _ctx| fold_bool(args, true, |acc, b| acc && b),
    });
    reg.register(FunctionSpec {
        name: "OR",
        params: &[ParamSpec::repeating("condition", ArgType::Bool)],
        flags: FnFlags::PURE,
        call: |args, _ctx| fold_bool(args, false, |acc, b| acc || b),
    });
    reg.register(FunctionSpec {
        name: "XOR",
        params: &[ParamSpec::repeating("condition", ArgType::Bool)],
        flags: FnFlags::PURE,
        call: |args, _ctx| fold_bool(args, false, |acc, b| acc ^ b),
    });
    reg.register(FunctionSpec {
        name: "NOT",
        params: &[ParamSpec::required("condition", ArgType::Bool)],
        flags: FnFlags::PURE.union(FnFlags::ELEMENTWISE),
        call: |args, _ctx| match crate::arith::coerce_scalar_to_bool(args.first().unwrap_or(&Value::Empty)) {
            Some(b) => Value::Bool(!b),
            None => err(ErrorKind::Value),
        },
    });
}

fn fold_bool(args: &[Value], seed: bool, f: impl Fn(bool, bool) -> bool) -> Value {
    let cells = flatten(args);
    if cells.is_empty() {
        return err(ErrorKind::Value);
    }
    let mut acc = seed;
    for v in cells {
        if v.is_error() {
            return v.clone();
        }
        match crate::arith::coerce_scalar_to_bool(v) {
            Some(b) => acc = f(acc, b),
            None => return err(ErrorKind::Value),
        }
    }
    Value::Bool(acc)
}

// ---------------------------------------------------------------------
// Text
// ---------------------------------------------------------------------

fn register_text(reg: &mut FunctionRegistry) {
    reg.register(FunctionSpec {
        name: "CONCATENATE",
        params: &[ParamSpec::repeating("text", ArgType::Text)],
        flags: FnFlags::PURE,
        call: |args, _ctx| {
            let mut out = String::new();
            for v in flatten(args) {
                if v.is_error() {
                    return v.clone();
                }
                out.push_str(&v.to_string());
            }
            Value::String(out)
        },
    });
    reg.register(FunctionSpec {
        name: "LEN",
        params: &[ParamSpec::required("text", ArgType::Text)],
        flags: FnFlags::PURE.union(FnFlags::ELEMENTWISE),
        call: |args, _ctx| match text(args, 0) {
            Ok(s) => Value::raw(s.chars().count() as f64),
            Err(e) => e,
        },
    });
    reg.register(FunctionSpec {
        name: "LEFT",
        params: &[ParamSpec::required("text", ArgType::Text), ParamSpec::optional("num_chars", ArgType::Number)],
        flags: FnFlags::PURE.union(FnFlags::ELEMENTWISE),
        call: |args, ctx| {
            let s = match text(args, 0) {
                Ok(s) => s,
                Err(e) => return e,
            };
            let n = match num_or(args, 1, ctx, 1.0) {
                Ok(n) => n,
                Err(e) => return e,
            };
            if n < 0.0 {
                return err(ErrorKind::Value);
            }
            Value::String(s.chars().take(n as usize).collect())
        },
    });
    reg.register(FunctionSpec {
        name: "RIGHT",
        params: &[ParamSpec::required("text", ArgType::Text), ParamSpec::optional("num_chars", ArgType::Number)],
        flags: FnFlags::PURE.union(FnFlags::ELEMENTWISE),
        call: |args, ctx| {
            let s = match text(args, 0) {
                Ok(s) => s,
                Err(e) => return e,
            };
            let n = match num_or(args, 1, ctx, 1.0) {
                Ok(n) => n,
                Err(e) => return e,
            };
            if n < 0.0 {
                return err(ErrorKind::Value);
            }
            let n = n as usize;
            let chars: Vec<char> = s.chars().collect();
            let start = chars.len().saturating_sub(n);
            Value::String(chars[start..].iter().collect())
        },
    });
    reg.register(FunctionSpec {
        name: "MID",
        params: &[
            ParamSpec::required("text", ArgType::Text),
            ParamSpec::required("start", ArgType::Number),
            ParamSpec::required("num_chars", ArgType::Number),
        ],
        flags: FnFlags::PURE.union(FnFlags::ELEMENTWISE),
        call: |args, ctx| {
            let s = match text(args, 0) {
                Ok(s) => s,
                Err(e) => return e,
            };
            let start = match num(args, 1, ctx) {
                Ok(n) => n,
                Err(e) => return e,
            };
            let count = match num(args, 2, ctx) {
                Ok(n) => n,
                Err(e) => return e,
            };
            if start < 1.0 || count < 0.0 {
                return err(ErrorKind::Value);
            }
            let chars: Vec<char> = s.chars().collect();
            let start = (start as usize).saturating_sub(1).min(chars.len());
            let end = (start + count as usize).min(chars.len());
            Value::String(chars[start..end].iter().collect())
        },
    });
    reg.register(FunctionSpec {
        name: "TRIM",
        params: &[ParamSpec::required("text", ArgType::Text)],
        flags: FnFlags::PURE.union(FnFlags::ELEMENTWISE),
        call: |args, _ctx| match text(args, 0) {
            Ok(s) => {
                let collapsed = s.split_whitespace().collect::<Vec<_>>().join(" ");
                Value::String(collapsed)
            }
            Err(e) => e,
        },
    });
    reg.register(FunctionSpec {
        name: "PROPER",
        params: &[ParamSpec::required("text", ArgType::Text)],
        flags: FnFlags::PURE.union(FnFlags::ELEMENTWISE),
        call: |args, _ctx| match text(args, 0) {
            Ok(s) => {
                let mut out = String::with_capacity(s.len());
                let mut start_of_word = true;
                for c in s.chars() {
                    if c.is_alphabetic() {
                        out.extend(if start_of_word { c.to_uppercase().collect::<Vec<_>>() } else { c.to_lowercase().collect::<Vec<_>>() });
                        start_of_word = false;
                    } else {
                        out.push(c);
                        start_of_word = true;
                    }
                }
                Value::String(out)
            }
            Err(e) => e,
        },
    });
    reg.register(FunctionSpec {
        name: "CLEAN",
        params: &[ParamSpec::required("text", ArgType::Text)],
        flags: FnFlags::PURE.union(FnFlags::ELEMENTWISE),
        call: |args, _ctx| match text(args, 0) {
            Ok(s) => Value::String(s.chars().filter(|c| !c.is_control()).collect()),
            Err(e) => e,
        },
    });
    reg.register(FunctionSpec {
        name: "REPT",
        params: &[ParamSpec::required("text", ArgType::Text), ParamSpec::required("count", ArgType::Number)],
        flags: FnFlags::PURE.union(FnFlags::ELEMENTWISE),
        call: |args, ctx| {
            let s = match text(args, 0) {
                Ok(s) => s,
                Err(e) => return e,
            };
            let n = match num(args, 1, ctx) {
                Ok(n) => n,
                Err(e) => return e,
            };
            if n < 0.0 {
                return err(ErrorKind::Value);
            }
            Value::String(s.repeat(n as usize))
        },
    });
    reg.register(FunctionSpec {
        name: "SEARCH",
        params: &[
            ParamSpec::required("find", ArgType::Text),
            ParamSpec::required("within", ArgType::Text),
            ParamSpec::optional("start", ArgType::Number),
        ],
        flags: FnFlags::PURE.union(FnFlags::ELEMENTWISE),
        call: |args, ctx| find_impl(args, ctx, true),
    });
    reg.register(FunctionSpec {
        name: "FIND",
        params: &[
            ParamSpec::required("find", ArgType::Text),
            ParamSpec::required("within", ArgType::Text),
            ParamSpec::optional("start", ArgType::Number),
        ],
        flags: FnFlags::PURE.union(FnFlags::ELEMENTWISE),
        call: |args, ctx| find_impl(args, ctx, false),
    });
    reg.register(FunctionSpec {
        name: "SUBSTITUTE",
        params: &[
            ParamSpec::required("text", ArgType::Text),
            ParamSpec::required("old", ArgType::Text),
            ParamSpec::required("new", ArgType::Text),
            ParamSpec::optional("instance", ArgType::Number),
        ],
        flags: FnFlags::PURE.union(FnFlags::ELEMENTWISE),
        call: |args, ctx| {
            let s = match text(args, 0) {
                Ok(s) => s,
                Err(e) => return e,
            };
            let old = match text(args, 1) {
                Ok(s) => s,
                Err(e) => return e,
            };
            let new = match text(args, 2) {
                Ok(s) => s,
                Err(e) => return e,
            };
            if old.is_empty() {
                return Value::String(s);
            }
            if args.len() <= 3 {
                return Value::String(s.replace(&old, &new));
            }
            let instance = match num(args, 3, ctx) {
                Ok(n) => n,
                Err(e) => return e,
            };
            if instance < 1.0 {
                return err(ErrorKind::Value);
            }
            let target = instance as usize;
            let mut out = String::with_capacity(s.len());
            let mut rest = s.as_str();
            let mut count = 0usize;
            while let Some(pos) = rest.find(&old) {
                count += 1;
                out.push_str(&rest[..pos]);
                if count == target {
                    out.push_str(&new);
                } else {
                    out.push_str(&old);
                }
                rest = &rest[pos + old.len()..];
            }
            out.push_str(rest);
            Value::String(out)
        },
    });
    reg.register(FunctionSpec {
        name: "T",
        params: &[ParamSpec::required("value", ArgType::Any)],
        flags: FnFlags::PURE.union(FnFlags::ELEMENTWISE),
        call: |args, _ctx| match args.first() {
            Some(Value::String(s)) => Value::String(s.clone()),
            Some(Value::Error(e)) => Value::Error(e.clone()),
            _ => Value::String(String::new()),
        },
    });
    reg.register(FunctionSpec {
        name: "UPPER",
        params: &[ParamSpec::required("text", ArgType::Text)],
        flags: FnFlags::PURE.union(FnFlags::ELEMENTWISE),
        call: |args, _ctx| match text(args, 0) {
            Ok(s) => Value::String(s.to_uppercase()),
            Err(e) => e,
        },
    });
    reg.register(FunctionSpec {
        name: "LOWER",
        params: &[ParamSpec::required("text", ArgType::Text)],
        flags: FnFlags::PURE.union(FnFlags::ELEMENTWISE),
        call: |args, _ctx| match text(args, 0) {
            Ok(s) => Value::String(s.to_lowercase()),
            Err(e) => e,
        },
    });
    reg.register(FunctionSpec {
        name: "EXACT",
        params: &[ParamSpec::required("text1", ArgType::Text), ParamSpec::required("text2", ArgType::Text)],
        flags: FnFlags::PURE.union(FnFlags::ELEMENTWISE),
        call: |args, _ctx| {
            let a = match text(args, 0) {
                Ok(s) => s,
                Err(e) => return e,
            };
            let b = match text(args, 1) {
                Ok(s) => s,
                Err(e) => return e,
            };
            Value::Bool(a == b)
        },
    });
    reg.register(FunctionSpec {
        name: "CHAR",
        params: &[ParamSpec::required("number", ArgType::Number)],
        flags: FnFlags::PURE.union(FnFlags::ELEMENTWISE),
        call: |args, ctx| {
            let n = match num(args, 0, ctx) {
                Ok(n) => n,
                Err(e) => return e,
            };
            let n = n.round() as i64;
            if !(1..256).contains(&n) {
                return err(ErrorKind::Value);
            }
            match char::from_u32(n as u32) {
                Some(c) => Value::String(c.to_string()),
                None => err(ErrorKind::Value),
            }
        },
    });
    reg.register(FunctionSpec {
        name: "UNICHAR",
        params: &[ParamSpec::required("number", ArgType::Number)],
        flags: FnFlags::PURE.union(FnFlags::ELEMENTWISE),
        call: |args, ctx| {
            let n = match num(args, 0, ctx) {
                Ok(n) => n,
                Err(e) => return e,
            };
            let n = n.round() as i64;
            if !(1..1_114_112).contains(&n) {
                return err(ErrorKind::Value);
            }
            match char::from_u32(n as u32) {
                Some(c) => Value::String(c.to_string()),
                None => err(ErrorKind::Value),
            }
        },
    });
}

fn find_impl(args: &[Value], ctx: &FunctionContext, case_insensitive: bool) -> Value {
    let needle = match text(args, 0) {
        Ok(s) => s,
        Err(e) => return e,
    };
    let haystack = match text(args, 1) {
        Ok(s) => s,
        Err(e) => return e,
    };
    let start = match num_or(args, 2, ctx, 1.0) {
        Ok(n) => n,
        Err(e) => return e,
    };
    if start < 1.0 {
        return err(ErrorKind::Value);
    }
    let chars: Vec<char> = haystack.chars().collect();
    let skip = (start as usize - 1).min(chars.len());
    let (n, h): (String, String) = if case_insensitive {
        (needle.to_lowercase(), chars[skip..].iter().collect::<String>().to_lowercase())
    } else {
        (needle.clone(), chars[skip..].iter().collect())
    };
    match h.find(&n) {
        Some(byte_pos) => {
            let char_pos = h[..byte_pos].chars().count();
            Value::raw((skip + char_pos + 1) as f64)
        }
        None => err(ErrorKind::Value),
    }
}

// ---------------------------------------------------------------------
// Math
// ---------------------------------------------------------------------

fn register_math(reg: &mut FunctionRegistry) {
    reg.register(FunctionSpec {
        name: "DELTA",
        params: &[ParamSpec::required("number1", ArgType::Number), ParamSpec::optional("number2", ArgType::Number)],
        flags: FnFlags::PURE.union(FnFlags::ELEMENTWISE),
        call: |args, ctx| {
            let a = match num(args, 0, ctx) {
                Ok(n) => n,
                Err(e) => return e,
            };
            let b = match num_or(args, 1, ctx, 0.0) {
                Ok(n) => n,
                Err(e) => return e,
            };
            Value::Bool(a == b)
        },
    });
    reg.register(FunctionSpec {
        name: "MOD",
        params: &[ParamSpec::required("number", ArgType::Number), ParamSpec::required("divisor", ArgType::Number)],
        flags: FnFlags::PURE.union(FnFlags::ELEMENTWISE),
        call: |args, ctx| {
            let (a, b) = match (num(args, 0, ctx), num(args, 1, ctx)) {
                (Ok(a), Ok(b)) => (a, b),
                (Err(e), _) | (_, Err(e)) => return e,
            };
            if b == 0.0 {
                return err(ErrorKind::DivByZero);
            }
            let r = a - b * (a / b).floor();
            Value::raw(r)
        },
    });
    reg.register(FunctionSpec {
        name: "INT",
        params: &[ParamSpec::required("number", ArgType::Number)],
        flags: FnFlags::PURE.union(FnFlags::ELEMENTWISE),
        call: |args, ctx| match num(args, 0, ctx) {
            Ok(n) => Value::raw(n.floor()),
            Err(e) => e,
        },
    });
    reg.register(FunctionSpec {
        name: "ROUND",
        params: &[ParamSpec::required("number", ArgType::Number), ParamSpec::optional("digits", ArgType::Number)],
        flags: FnFlags::PURE.union(FnFlags::ELEMENTWISE),
        call: |args, ctx| match round_half_away(args, ctx) {
            Ok(v) => Value::raw(v),
            Err(e) => e,
        },
    });
    reg.register(FunctionSpec {
        name: "ROUNDUP",
        params: &[ParamSpec::required("number", ArgType::Number), ParamSpec::optional("digits", ArgType::Number)],
        flags: FnFlags::PURE.union(FnFlags::ELEMENTWISE),
        call: |args, ctx| {
            let (n, digits) = match num_and_digits(args, ctx) {
                Ok(pair) => pair,
                Err(e) => return e,
            };
            let scale = 10f64.powi(digits);
            let scaled = n * scale;
            let rounded = if scaled >= 0.0 { scaled.ceil() } else { scaled.floor() };
            Value::raw(rounded / scale)
        },
    });
    reg.register(FunctionSpec {
        name: "ROUNDDOWN",
        params: &[ParamSpec::required("number", ArgType::Number), ParamSpec::optional("digits", ArgType::Number)],
        flags: FnFlags::PURE.union(FnFlags::ELEMENTWISE),
        call: |args, ctx| {
            let (n, digits) = match num_and_digits(args, ctx) {
                Ok(pair) => pair,
                Err(e) => return e,
            };
            let scale = 10f64.powi(digits);
            let scaled = n * scale;
            let truncated = scaled.trunc();
            Value::raw(truncated / scale)
        },
    });
    reg.register(FunctionSpec {
        name: "EVEN",
        params: &[ParamSpec::required("number", ArgType::Number)],
        flags: FnFlags::PURE.union(FnFlags::ELEMENTWISE),
        call: |args, ctx| match num(args, 0, ctx) {
            Ok(n) => Value::raw(round_to_multiple_away(n, 2.0)),
            Err(e) => e,
        },
    });
    reg.register(FunctionSpec {
        name: "ODD",
        params: &[ParamSpec::required("number", ArgType::Number)],
        flags: FnFlags::PURE.union(FnFlags::ELEMENTWISE),
        call: |args, ctx| match num(args, 0, ctx) {
            Ok(n) => {
                let v = round_to_multiple_away(n, 2.0);
                let v = if n >= 0.0 { v + 1.0 } else { v - 1.0 };
                Value::raw(v)
            }
            Err(e) => e,
        },
    });
    for name in ["CEILING", "CEILING.MATH", "CEILING.PRECISE"] {
        reg.register(FunctionSpec {
            name,
            params: &[
                ParamSpec::required("number", ArgType::Number),
                ParamSpec::optional("significance", ArgType::Number),
            ],
            flags: FnFlags::PURE.union(FnFlags::ELEMENTWISE),
            call: |args, ctx| round_to_significance(args, ctx, true),
        });
    }
    for name in ["FLOOR", "FLOOR.MATH", "FLOOR.PRECISE"] {
        reg.register(FunctionSpec {
            name,
            params: &[
                ParamSpec::required("number", ArgType::Number),
                ParamSpec::optional("significance", ArgType::Number),
            ],
            flags: FnFlags::PURE.union(FnFlags::ELEMENTWISE),
            call: |args, ctx| round_to_significance(args, ctx, false),
        });
    }
    reg.register(FunctionSpec {
        name: "ABS",
        params: &[ParamSpec::required("number", ArgType::Number)],
        flags: FnFlags::PURE.union(FnFlags::ELEMENTWISE),
        call: |args, ctx| match num(args, 0, ctx) {
            Ok(n) => Value::raw(n.abs()),
            Err(e) => e,
        },
    });
    reg.register(FunctionSpec {
        name: "PI",
        params: &[],
        flags: FnFlags::PURE,
        call: |_args, _ctx| Value::raw(std::f64::consts::PI),
    });
    reg.register(FunctionSpec {
        name: "SQRTPI",
        params: &[ParamSpec::required("number", ArgType::Number)],
        flags: FnFlags::PURE.union(FnFlags::ELEMENTWISE),
        call: |args, ctx| match num(args, 0, ctx) {
            Ok(n) if n >= 0.0 => Value::raw((n * std::f64::consts::PI).sqrt()),
            Ok(_) => err(ErrorKind::Num),
            Err(e) => e,
        },
    });
    reg.register(FunctionSpec {
        name: "RADIANS",
        params: &[ParamSpec::required("angle", ArgType::Number)],
        flags: FnFlags::PURE.union(FnFlags::ELEMENTWISE),
        call: |args, ctx| match num(args, 0, ctx) {
            Ok(n) => Value::raw(n.to_radians()),
            Err(e) => e,
        },
    });
    reg.register(FunctionSpec {
        name: "DEGREES",
        params: &[ParamSpec::required("angle", ArgType::Number)],
        flags: FnFlags::PURE.union(FnFlags::ELEMENTWISE),
        call: |args, ctx| match num(args, 0, ctx) {
            Ok(n) => Value::raw(n.to_degrees()),
            Err(e) => e,
        },
    });
    reg.register(FunctionSpec {
        name: "BITAND",
        params: &[ParamSpec::required("number1", ArgType::Number), ParamSpec::required("number2", ArgType::Number)],
        flags: FnFlags::PURE.union(FnFlags::ELEMENTWISE),
        call: |args, ctx| bitwise(args, ctx, |a, b| a & b),
    });
    reg.register(FunctionSpec {
        name: "BITOR",
        params: &[ParamSpec::required("number1", ArgType::Number), ParamSpec::required("number2", ArgType::Number)],
        flags: FnFlags::PURE.union(FnFlags::ELEMENTWISE),
        call: |args, ctx| bitwise(args, ctx, |a, b| a | b),
    });
    reg.register(FunctionSpec {
        name: "BITXOR",
        params: &[ParamSpec::required("number1", ArgType::Number), ParamSpec::required("number2", ArgType::Number)],
        flags: FnFlags::PURE.union(FnFlags::ELEMENTWISE),
        call: |args, ctx| bitwise(args, ctx, |a, b| a ^ b),
    });
}

fn bitwise(args: &[Value], ctx: &FunctionContext, f: impl Fn(u64, u64) -> u64) -> Value {
    let (a, b) = match (num(args, 0, ctx), num(args, 1, ctx)) {
        (Ok(a), Ok(b)) => (a, b),
        (Err(e), _) | (_, Err(e)) => return e,
    };
    if a < 0.0 || b < 0.0 || a.fract() != 0.0 || b.fract() != 0.0 {
        return err(ErrorKind::Num);
    }
    Value::raw(f(a as u64, b as u64) as f64)
}

fn num_and_digits(args: &[Value], ctx: &FunctionContext) -> Result<(f64, i32), Value> {
    let n = num(args, 0, ctx)?;
    let digits = num_or(args, 1, ctx, 0.0)?;
    Ok((n, digits as i32))
}

/// §6.3 `ROUND`: half-away-from-zero rounding to `digits` decimal places.
fn round_half_away(args: &[Value], ctx: &FunctionContext) -> Result<f64, Value> {
    let (n, digits) = num_and_digits(args, ctx)?;
    let scale = 10f64.powi(digits);
    let scaled = n * scale;
    let rounded = if scaled >= 0.0 { (scaled + 0.5).floor() } else { (scaled - 0.5).ceil() };
    Ok(rounded / scale)
}

fn round_to_multiple_away(n: f64, multiple: f64) -> f64 {
    if n >= 0.0 {
        (n / multiple).ceil() * multiple
    } else {
        (n / multiple).floor() * multiple
    }
}

fn round_to_significance(args: &[Value], ctx: &FunctionContext, ceiling: bool) -> Value {
    let n = match num(args, 0, ctx) {
        Ok(n) => n,
        Err(e) => return e,
    };
    let default_sig = if n >= 0.0 { 1.0 } else { -1.0 };
    let sig = match num_or(args, 1, ctx, default_sig) {
        Ok(n) => n,
        Err(e) => return e,
    };
    if sig == 0.0 {
        return Value::raw(0.0);
    }
    let quotient = n / sig;
    let rounded = if ceiling { quotient.ceil() } else { quotient.floor() };
    Value::raw(rounded * sig)
}

// ---------------------------------------------------------------------
// Trigonometry
// ---------------------------------------------------------------------

fn register_trig(reg: &mut FunctionRegistry) {
    macro_rules! unary_trig {
        ($name:literal, $f:expr) => {
            reg.register(FunctionSpec {
                name: $name,
                params: &[ParamSpec::required("number", ArgType::Number)],
                flags: FnFlags::PURE.union(FnFlags::ELEMENTWISE),
                call: |args, ctx| match num(args, 0, ctx) {
                    Ok(n) => {
                        let f: fn(f64) -> f64 = $f;
                        let v = f(n);
                        if v.is_finite() {
                            Value::raw(v)
                        } else {
                            err(ErrorKind::Num)
                        }
                    }
                    Err(e) => e,
                },
            });
        };
    }

    unary_trig!("ACOS", f64::acos);
    unary_trig!("ASIN", f64::asin);
    unary_trig!("COS", f64::cos);
    unary_trig!("SIN", f64::sin);
    unary_trig!("TAN", f64::tan);
    unary_trig!("ATAN", f64::atan);
    unary_trig!("SINH", f64::sinh);
    unary_trig!("COSH", f64::cosh);
    unary_trig!("TANH", f64::tanh);
    unary_trig!("ASINH", f64::asinh);
    unary_trig!("ACOSH", f64::acosh);
    unary_trig!("ATANH", f64::atanh);
    unary_trig!("COT", |n: f64| 1.0 / n.tan());
    unary_trig!("SEC", |n: f64| 1.0 / n.cos());
    unary_trig!("CSC", |n: f64| 1.0 / n.sin());
    unary_trig!("COTH", |n: f64| 1.0 / n.tanh());
    unary_trig!("SECH", |n: f64| 1.0 / n.cosh());
    unary_trig!("CSCH", |n: f64| 1.0 / n.sinh());
    unary_trig!("ACOT", |n: f64| (1.0 / n).atan());
    unary_trig!("ACOTH", |n: f64| (1.0 / n).atanh());

    reg.register(FunctionSpec {
        name: "ATAN2",
        params: &[ParamSpec::required("x", ArgType::Number), ParamSpec::required("y", ArgType::Number)],
        flags: FnFlags::PURE.union(FnFlags::ELEMENTWISE),
        // §6.3: ATAN2(x, y) returns the angle of the point (x, y), i.e.
        // `atan2(y, x)` in the usual math-library argument order, and
        // errors when both arguments are zero (the angle is undefined).
        call: |args, ctx| {
            let (x, y) = match (num(args, 0, ctx), num(args, 1, ctx)) {
                (Ok(x), Ok(y)) => (x, y),
                (Err(e), _) | (_, Err(e)) => return e,
            };
            if x == 0.0 && y == 0.0 {
                return err(ErrorKind::DivByZero);
            }
            Value::raw(y.atan2(x))
        },
    });
}

// ---------------------------------------------------------------------
// Volatile / random
// ---------------------------------------------------------------------

fn register_random(reg: &mut FunctionRegistry) {
    reg.register(FunctionSpec {
        name: "RAND",
        params: &[],
        flags: FnFlags::VOLATILE,
        call: |_args, ctx| Value::raw(ctx.rng.uniform(0.0, 1.0)),
    });
    reg.register(FunctionSpec {
        name: "RANDBETWEEN",
        params: &[ParamSpec::required("bottom", ArgType::Number), ParamSpec::required("top", ArgType::Number)],
        flags: FnFlags::VOLATILE,
        // §6.3: draws an integer in `[ceil(bottom), floor(top)]` inclusive,
        // widening `top` by one when that range would otherwise be empty.
        call: |args, ctx| {
            let lo = match num(args, 0, ctx) {
                Ok(n) => n,
                Err(e) => return e,
            };
            let hi = match num(args, 1, ctx) {
                Ok(n) => n,
                Err(e) => return e,
            };
            let lo_i = lo.ceil() as i64;
            let mut hi_i = hi.floor() as i64;
            if hi_i < lo_i {
                hi_i = lo_i;
            }
            Value::raw(ctx.rng.gen_range_inclusive_i64(lo_i, hi_i) as f64)
        },
    });
}

// ---------------------------------------------------------------------
// Aggregation
// ---------------------------------------------------------------------

fn register_aggregation(reg: &mut FunctionRegistry) {
    reg.register(FunctionSpec {
        name: "SUM",
        params: &[ParamSpec::repeating("values", ArgType::Number)],
        flags: FnFlags::PURE,
        call: |args, ctx| {
            let mut total = 0.0;
            for v in flatten(args) {
                match v {
                    Value::Error(e) => return Value::Error(e.clone()),
                    Value::Empty => {}
                    other => match coerce_scalar_to_number(other, ctx.config) {
                        Ok(n) => total += n.representative(),
                        Err(k) => return err(k),
                    },
                }
            }
            Value::Number(RichNumber::Raw(total))
        },
    });
    reg.register(FunctionSpec {
        name: "COUNTUNIQUE",
        params: &[ParamSpec::repeating("values", ArgType::Any)],
        flags: FnFlags::PURE,
        call: |args, _ctx| {
            let mut seen: Vec<String> = Vec::new();
            for v in flatten(args) {
                if matches!(v, Value::Empty) {
                    continue;
                }
                let key = format!("{}:{}", v.type_of(), v);
                if !seen.contains(&key) {
                    seen.push(key);
                }
            }
            Value::raw(seen.len() as f64)
        },
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use fermi_common::EngineConfig;
    use fermi_common::EngineRng;
    use fermi_common::SimpleRangeValue;

    fn call(reg: &FunctionRegistry, name: &str, args: &[Value]) -> Value {
        let config = EngineConfig::default();
        let mut rng = EngineRng::from_seed(1);
        let spec = reg.get(name).expect("registered");
        let mut ctx = FunctionContext { config: &config, rng: &mut rng };
        (spec.call)(args, &mut ctx)
    }

    fn registry() -> FunctionRegistry {
        let mut reg = FunctionRegistry::new();
        register_builtins(&mut reg);
        reg
    }

    #[test]
    fn and_or_xor_not() {
        let reg = registry();
        assert_eq!(call(&reg, "AND", &[Value::Bool(true), Value::Bool(true)]), Value::Bool(true));
        assert_eq!(call(&reg, "AND", &[Value::Bool(true), Value::Bool(false)]), Value::Bool(false));
        assert_eq!(call(&reg, "OR", &[Value::Bool(false), Value::Bool(true)]), Value::Bool(true));
        assert_eq!(call(&reg, "XOR", &[Value::Bool(true), Value::Bool(true)]), Value::Bool(false));
        assert_eq!(call(&reg, "NOT", &[Value::Bool(true)]), Value::Bool(false));
    }

    #[test]
    fn concatenate_joins_flattened_args() {
        let reg = registry();
        let range = Value::Range(SimpleRangeValue::new(2, 1, vec![Value::String("a".into()), Value::String("b".into())]));
        assert_eq!(call(&reg, "CONCATENATE", &[range, Value::String("!".into())]), Value::String("ab!".into()));
    }

    #[test]
    fn left_right_mid() {
        let reg = registry();
        let s = Value::String("hello world".into());
        assert_eq!(call(&reg, "LEFT", &[s.clone(), Value::raw(5.0)]), Value::String("hello".into()));
        assert_eq!(call(&reg, "RIGHT", &[s.clone(), Value::raw(5.0)]), Value::String("world".into()));
        assert_eq!(call(&reg, "MID", &[s, Value::raw(7.0), Value::raw(5.0)]), Value::String("world".into()));
    }

    #[test]
    fn substitute_targets_one_instance() {
        let reg = registry();
        let args = [
            Value::String("a-b-a-b".into()),
            Value::String("a".into()),
            Value::String("X".into()),
            Value::raw(2.0),
        ];
        assert_eq!(call(&reg, "SUBSTITUTE", &args), Value::String("a-b-X-b".into()));
    }

    #[test]
    fn char_rejects_out_of_range() {
        let reg = registry();
        assert_eq!(call(&reg, "CHAR", &[Value::raw(300.0)]), err(ErrorKind::Value));
        assert_eq!(call(&reg, "CHAR", &[Value::raw(65.0)]), Value::String("A".into()));
    }

    #[test]
    fn round_half_away_from_zero() {
        let reg = registry();
        assert_eq!(call(&reg, "ROUND", &[Value::raw(2.5), Value::raw(0.0)]), Value::raw(3.0));
        assert_eq!(call(&reg, "ROUND", &[Value::raw(-2.5), Value::raw(0.0)]), Value::raw(-3.0));
        assert_eq!(call(&reg, "ROUNDUP", &[Value::raw(2.1), Value::raw(0.0)]), Value::raw(3.0));
        assert_eq!(call(&reg, "ROUNDDOWN", &[Value::raw(2.9), Value::raw(0.0)]), Value::raw(2.0));
    }

    #[test]
    fn ceiling_and_floor_to_significance() {
        let reg = registry();
        assert_eq!(call(&reg, "CEILING", &[Value::raw(4.1), Value::raw(1.0)]), Value::raw(5.0));
        assert_eq!(call(&reg, "FLOOR", &[Value::raw(4.9), Value::raw(1.0)]), Value::raw(4.0));
    }

    #[test]
    fn even_and_odd() {
        let reg = registry();
        assert_eq!(call(&reg, "EVEN", &[Value::raw(3.0)]), Value::raw(4.0));
        assert_eq!(call(&reg, "ODD", &[Value::raw(2.0)]), Value::raw(3.0));
    }

    #[test]
    fn atan2_uses_y_x_order_and_rejects_origin() {
        let reg = registry();
        match call(&reg, "ATAN2", &[Value::raw(1.0), Value::raw(1.0)]) {
            Value::Number(n) => assert!((n.representative() - std::f64::consts::FRAC_PI_4).abs() < 1e-9),
            other => panic!("expected number, got {other:?}"),
        }
        assert_eq!(call(&reg, "ATAN2", &[Value::raw(0.0), Value::raw(0.0)]), err(ErrorKind::DivByZero));
    }

    #[test]
    fn randbetween_stays_in_bounds() {
        let reg = registry();
        for _ in 0..50 {
            match call(&reg, "RANDBETWEEN", &[Value::raw(3.0), Value::raw(3.0)]) {
                Value::Number(n) => assert_eq!(n.representative(), 3.0),
                other => panic!("expected number, got {other:?}"),
            }
        }
    }

    #[test]
    fn sum_flattens_ranges_and_skips_empty() {
        let reg = registry();
        let range = Value::Range(SimpleRangeValue::new(1, 3, vec![Value::raw(1.0), Value::Empty, Value::raw(2.0)]));
        assert_eq!(call(&reg, "SUM", &[range, Value::raw(10.0)]), Value::raw(13.0));
    }

    #[test]
    fn countunique_counts_distinct_non_empty_values() {
        let reg = registry();
        let range = Value::Range(SimpleRangeValue::new(1, 4, vec![
            Value::raw(1.0),
            Value::raw(1.0),
            Value::String("a".into()),
            Value::Empty,
        ]));
        assert_eq!(call(&reg, "COUNTUNIQUE", &[range]), Value::raw(2.0));
    }
}
