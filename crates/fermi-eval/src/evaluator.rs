//! The AST-walking evaluator (§4.4): dispatches literal nodes directly,
//! resolves references against the dependency graph, and routes
//! `FunctionCall` nodes either to the small set of control-flow builtins
//! that must see their argument ASTs unevaluated (`IF`, `IFS`, `CHOOSE`,
//! `SWITCH`, `IFERROR`, `IFNA`, `FORMULATEXT`) or to the function
//! registry after eagerly evaluating arguments.

use fermi_common::number::sample_gaussian;
use fermi_common::{
    AbsoluteCellRange, CellAddress, ConfidenceInterpretation, EngineConfig, EngineRng, ErrorKind, RichNumber,
    SheetId, SheetRegistry, SimpleCellAddress, SimpleRangeValue, Value,
};
use fermi_parse::ast::{Ast, BinaryOperator, ColumnRef, DistributionLiteral, RowRef, UnaryOperator};

use crate::arith::{self, ArithCtx};
use crate::function::{FnFlags, FunctionContext, FunctionRegistry, FunctionSpec};
use crate::graph::DependencyGraph;
use crate::vertex::VertexData;

/// Evaluate `ast`, the formula body of the cell at `address`, against the
/// current graph state (§4.4).
pub fn evaluate(
    ast: &Ast,
    address: SimpleCellAddress,
    graph: &DependencyGraph,
    registry: &FunctionRegistry,
    config: &EngineConfig,
    rng: &mut EngineRng,
) -> Value {
    match ast {
        Ast::Empty => Value::Empty,
        Ast::Number(n) => Value::raw(*n),
        Ast::String(s) => Value::String(s.clone()),
        Ast::Bool(b) => Value::Bool(*b),
        Ast::Error(k) => Value::error(*k),
        Ast::Distribution(d) => eval_distribution(d, config, rng),

        Ast::CellReference(addr) => match resolve_cell(addr, address, graph.sheets()) {
            Ok(resolved) => graph.get_scalar_value(resolved),
            Err(k) => Value::error(k),
        },

        Ast::CellRange(a, b) => eval_cell_range(a, b, address, graph),
        Ast::ColumnRange(a, b) => eval_column_range(a, b, address, graph),
        Ast::RowRange(a, b) => eval_row_range(a, b, address, graph),

        Ast::NamedExpression(name) => eval_named(name, address.sheet, graph),

        Ast::FunctionCall { name, args } => eval_function_call(name, args, address, graph, registry, config, rng),

        Ast::Array(rows) => eval_array(rows, address, graph, registry, config, rng),

        Ast::Parenthesis(inner) => evaluate(inner, address, graph, registry, config, rng),

        Ast::UnaryOp { op, expr } => {
            let v = evaluate(expr, address, graph, registry, config, rng).narrow_scalar();
            map_unary_mut(v, |scalar| {
                let mut ctx = ArithCtx { config, rng: &mut *rng };
                match op {
                    UnaryOperator::Plus => arith::unary_plus(scalar, &mut ctx),
                    UnaryOperator::Minus => arith::unary_minus(scalar, &mut ctx),
                    UnaryOperator::Percent => arith::unary_percent(scalar, &mut ctx),
                }
            })
        }

        Ast::BinaryOp { op, left, right } => {
            let lv = evaluate(left, address, graph, registry, config, rng);
            let rv = evaluate(right, address, graph, registry, config, rng);
            eval_binary(*op, lv, rv, config, rng)
        }
    }
}

fn eval_distribution(d: &DistributionLiteral, config: &EngineConfig, rng: &mut EngineRng) -> Value {
    match d {
        DistributionLiteral::Gaussian { mean, variance } => {
            Value::Number(RichNumber::Gaussian { mean: *mean, variance: *variance, samples: None })
        }
        DistributionLiteral::LogNormal { mean, variance } => {
            Value::Number(RichNumber::LogNormal { mean: *mean, variance: *variance, samples: None })
        }
        DistributionLiteral::Uniform { lo, hi } => Value::Number(RichNumber::Uniform { lo: *lo, hi: *hi, samples: None }),
        DistributionLiteral::ConfidenceInterval { lo, hi, confidence_pct } => {
            Value::Number(RichNumber::confidence_interval(*lo, *hi, *confidence_pct, ConfidenceInterpretation::Auto))
        }
        // `S(mean, variance)` generates its sample vector immediately from
        // the literal's parameters (§6.2: "Sampled (generated from
        // parameters)"), unlike the other distribution literals which stay
        // lazily parametric until an operator first needs samples.
        DistributionLiteral::Sampled { mean, variance } => {
            let buf = sample_gaussian(*mean, *variance, config.sample_size, rng);
            Value::Number(RichNumber::Sampled(buf))
        }
    }
}

fn resolve_cell(addr: &CellAddress, base: SimpleCellAddress, sheets: &SheetRegistry) -> Result<SimpleCellAddress, ErrorKind> {
    addr.to_simple(base.sheet, sheets).map_err(|_| ErrorKind::Ref)
}

fn resolve_sheet(name: &Option<String>, default_sheet: SheetId, sheets: &SheetRegistry) -> Result<SheetId, ErrorKind> {
    match name {
        Some(n) => sheets.id_of(n).ok_or(ErrorKind::Ref),
        None => Ok(default_sheet),
    }
}

fn materialize_range(range: AbsoluteCellRange, graph: &DependencyGraph) -> Value {
    let width = range.width() as usize;
    let height = range.height() as usize;
    let data: Vec<Value> = range.addresses().map(|a| graph.get_scalar_value(a)).collect();
    Value::Range(SimpleRangeValue::new(width, height, data))
}

fn eval_cell_range(a: &CellAddress, b: &CellAddress, base: SimpleCellAddress, graph: &DependencyGraph) -> Value {
    let sheet = match resolve_sheet(&a.sheet, base.sheet, graph.sheets()) {
        Ok(s) => s,
        Err(k) => return Value::error(k),
    };
    let (start_col, end_col) = (a.col.min(b.col), a.col.max(b.col));
    let (start_row, end_row) = (a.row.min(b.row), a.row.max(b.row));
    match AbsoluteCellRange::new(sheet, start_col, start_row, end_col, end_row) {
        Ok(range) => materialize_range(range, graph),
        Err(_) => Value::error(ErrorKind::Ref),
    }
}

fn eval_column_range(a: &ColumnRef, b: &ColumnRef, base: SimpleCellAddress, graph: &DependencyGraph) -> Value {
    let sheet = match resolve_sheet(&a.sheet, base.sheet, graph.sheets()) {
        Ok(s) => s,
        Err(k) => return Value::error(k),
    };
    let (start_col, end_col) = (a.col.min(b.col), a.col.max(b.col));
    let height = graph.get_sheet_height(sheet);
    if height == 0 {
        return Value::Range(SimpleRangeValue::new((end_col - start_col + 1) as usize, 0, Vec::new()));
    }
    match AbsoluteCellRange::new(sheet, start_col, 0, end_col, height - 1) {
        Ok(range) => materialize_range(range, graph),
        Err(_) => Value::error(ErrorKind::Ref),
    }
}

fn eval_row_range(a: &RowRef, b: &RowRef, base: SimpleCellAddress, graph: &DependencyGraph) -> Value {
    let sheet = match resolve_sheet(&a.sheet, base.sheet, graph.sheets()) {
        Ok(s) => s,
        Err(k) => return Value::error(k),
    };
    let (start_row, end_row) = (a.row.min(b.row), a.row.max(b.row));
    let width = graph.get_sheet_width(sheet);
    if width == 0 {
        return Value::Range(SimpleRangeValue::new(0, (end_row - start_row + 1) as usize, Vec::new()));
    }
    match AbsoluteCellRange::new(sheet, 0, start_row, width - 1, end_row) {
        Ok(range) => materialize_range(range, graph),
        Err(_) => Value::error(ErrorKind::Ref),
    }
}

/// Two-level named-expression lookup (§6.4): the formula's own sheet
/// scope first, falling back to the workbook-wide scope (`None`).
fn eval_named(name: &str, sheet: SheetId, graph: &DependencyGraph) -> Value {
    if graph.is_named_defined(Some(sheet), name) {
        if let Some(v) = graph.named_node(Some(sheet), name).and_then(|id| graph.node(id)) {
            return v.current_value();
        }
    }
    if graph.is_named_defined(None, name) {
        if let Some(v) = graph.named_node(None, name).and_then(|id| graph.node(id)) {
            return v.current_value();
        }
    }
    Value::error(ErrorKind::Name)
}

fn eval_array(
    rows: &[Vec<Ast>],
    address: SimpleCellAddress,
    graph: &DependencyGraph,
    registry: &FunctionRegistry,
    config: &EngineConfig,
    rng: &mut EngineRng,
) -> Value {
    let height = rows.len();
    let width = rows.first().map(|r| r.len()).unwrap_or(0);
    let mut data = Vec::with_capacity(width * height);
    for row in rows {
        for item in row {
            data.push(evaluate(item, address, graph, registry, config, rng).narrow_scalar());
        }
    }
    Value::Range(SimpleRangeValue::new(width, height, data))
}

fn map_unary_mut(v: Value, mut f: impl FnMut(&Value) -> Value) -> Value {
    match v {
        Value::Range(r) => {
            let data: Vec<Value> = r.iter().map(|e| f(e)).collect();
            Value::Range(SimpleRangeValue::new(r.width(), r.height(), data))
        }
        other => f(&other),
    }
}

fn broadcast_binary_mut(l: Value, r: Value, mut f: impl FnMut(&Value, &Value) -> Value) -> Value {
    match (&l, &r) {
        (Value::Range(lr), Value::Range(rr)) => {
            if lr.width() != rr.width() || lr.height() != rr.height() {
                return Value::error(ErrorKind::Value);
            }
            let data: Vec<Value> = lr.iter().zip(rr.iter()).map(|(a, b)| f(a, b)).collect();
            Value::Range(SimpleRangeValue::new(lr.width(), lr.height(), data))
        }
        (Value::Range(lr), _) => {
            let data: Vec<Value> = lr.iter().map(|a| f(a, &r)).collect();
            Value::Range(SimpleRangeValue::new(lr.width(), lr.height(), data))
        }
        (_, Value::Range(rr)) => {
            let data: Vec<Value> = rr.iter().map(|b| f(&l, b)).collect();
            Value::Range(SimpleRangeValue::new(rr.width(), rr.height(), data))
        }
        _ => f(&l, &r),
    }
}

fn concat_values(l: &Value, r: &Value, config: &EngineConfig) -> Value {
    if l.is_error() {
        return l.clone();
    }
    if r.is_error() {
        return r.clone();
    }
    let _ = config;
    Value::String(format!("{l}{r}"))
}

fn eval_binary(op: BinaryOperator, lv: Value, rv: Value, config: &EngineConfig, rng: &mut EngineRng) -> Value {
    match op {
        BinaryOperator::Add => broadcast_binary_mut(lv, rv, |a, b| {
            let mut ctx = ArithCtx { config, rng: &mut *rng };
            arith::add(a, b, &mut ctx)
        }),
        BinaryOperator::Sub => broadcast_binary_mut(lv, rv, |a, b| {
            let mut ctx = ArithCtx { config, rng: &mut *rng };
            arith::sub(a, b, &mut ctx)
        }),
        BinaryOperator::Mul => broadcast_binary_mut(lv, rv, |a, b| {
            let mut ctx = ArithCtx { config, rng: &mut *rng };
            arith::mul(a, b, &mut ctx)
        }),
        BinaryOperator::Div => broadcast_binary_mut(lv, rv, |a, b| {
            let mut ctx = ArithCtx { config, rng: &mut *rng };
            arith::div(a, b, &mut ctx)
        }),
        BinaryOperator::Pow => broadcast_binary_mut(lv, rv, |a, b| {
            let mut ctx = ArithCtx { config, rng: &mut *rng };
            arith::pow(a, b, &mut ctx)
        }),
        BinaryOperator::Concat => broadcast_binary_mut(lv, rv, |a, b| concat_values(a, b, config)),
        BinaryOperator::Eq => broadcast_binary_mut(lv, rv, |a, b| arith::eq(a, b, config)),
        BinaryOperator::Ne => broadcast_binary_mut(lv, rv, |a, b| arith::neq(a, b, config)),
        BinaryOperator::Lt => broadcast_binary_mut(lv, rv, |a, b| arith::lt(a, b, config)),
        BinaryOperator::Le => broadcast_binary_mut(lv, rv, |a, b| arith::leq(a, b, config)),
        BinaryOperator::Gt => broadcast_binary_mut(lv, rv, |a, b| arith::gt(a, b, config)),
        BinaryOperator::Ge => broadcast_binary_mut(lv, rv, |a, b| arith::geq(a, b, config)),
    }
}

/// Dispatch a `FunctionCall` node. Control-flow functions that must not
/// evaluate every argument (§4.4, §7) are special-cased here, ahead of the
/// function registry; everything else is evaluated eagerly and handed to
/// its registered [`FunctionSpec`].
fn eval_function_call(
    name: &str,
    args: &[Ast],
    address: SimpleCellAddress,
    graph: &DependencyGraph,
    registry: &FunctionRegistry,
    config: &EngineConfig,
    rng: &mut EngineRng,
) -> Value {
    match name.to_ascii_uppercase().as_str() {
        "IF" => return eval_if(args, address, graph, registry, config, rng),
        "IFS" => return eval_ifs(args, address, graph, registry, config, rng),
        "CHOOSE" => return eval_choose(args, address, graph, registry, config, rng),
        "SWITCH" => return eval_switch(args, address, graph, registry, config, rng),
        "IFERROR" => return eval_iferror(args, address, graph, registry, config, rng, false),
        "IFNA" => return eval_iferror(args, address, graph, registry, config, rng, true),
        "FORMULATEXT" => return eval_formulatext(args, address, graph, config),
        _ => {}
    }

    let evaluated: Vec<Value> = args
        .iter()
        .map(|a| evaluate(a, address, graph, registry, config, rng).narrow_scalar())
        .collect();

    let Some(spec) = registry.get(name) else {
        return crate::function::unknown_function_error();
    };

    if spec.flags.contains(FnFlags::ELEMENTWISE) {
        eval_elementwise(spec, &evaluated, config, rng)
    } else {
        if let Some(e) = evaluated.iter().find(|v| v.is_error()) {
            return e.clone();
        }
        let mut fctx = FunctionContext { config, rng };
        (spec.call)(&evaluated, &mut fctx)
    }
}

fn eval_elementwise(spec: &FunctionSpec, args: &[Value], config: &EngineConfig, rng: &mut EngineRng) -> Value {
    let dims = args.iter().find_map(|v| match v {
        Value::Range(r) => Some((r.width(), r.height())),
        _ => None,
    });
    let Some((width, height)) = dims else {
        if let Some(e) = args.iter().find(|v| v.is_error()) {
            return e.clone();
        }
        let mut fctx = FunctionContext { config, rng };
        return (spec.call)(args, &mut fctx);
    };

    let mut data = Vec::with_capacity(width * height);
    for row in 0..height {
        for col in 0..width {
            let cell_args: Vec<Value> = args
                .iter()
                .map(|v| match v {
                    Value::Range(r) => r.get(col, row).cloned().unwrap_or(Value::Empty),
                    other => other.clone(),
                })
                .collect();
            if let Some(e) = cell_args.iter().find(|v| v.is_error()) {
                data.push(e.clone());
                continue;
            }
            let mut fctx = FunctionContext { config, rng: &mut *rng };
            data.push((spec.call)(&cell_args, &mut fctx));
        }
    }
    Value::Range(SimpleRangeValue::new(width, height, data))
}

fn eval_if(
    args: &[Ast],
    address: SimpleCellAddress,
    graph: &DependencyGraph,
    registry: &FunctionRegistry,
    config: &EngineConfig,
    rng: &mut EngineRng,
) -> Value {
    if args.len() < 2 || args.len() > 3 {
        return Value::error(ErrorKind::Value);
    }
    let cond = evaluate(&args[0], address, graph, registry, config, rng).narrow_scalar();
    if cond.is_error() {
        return cond;
    }
    let Some(b) = arith::coerce_scalar_to_bool(&cond) else {
        return Value::error(ErrorKind::Value);
    };
    if b {
        evaluate(&args[1], address, graph, registry, config, rng)
    } else if args.len() == 3 {
        evaluate(&args[2], address, graph, registry, config, rng)
    } else {
        Value::Bool(false)
    }
}

fn eval_ifs(
    args: &[Ast],
    address: SimpleCellAddress,
    graph: &DependencyGraph,
    registry: &FunctionRegistry,
    config: &EngineConfig,
    rng: &mut EngineRng,
) -> Value {
    if args.len() < 2 || args.len() % 2 != 0 {
        return Value::error(ErrorKind::Value);
    }
    let mut i = 0;
    while i + 1 < args.len() {
        let cond = evaluate(&args[i], address, graph, registry, config, rng).narrow_scalar();
        if cond.is_error() {
            return cond;
        }
        match arith::coerce_scalar_to_bool(&cond) {
            Some(true) => return evaluate(&args[i + 1], address, graph, registry, config, rng),
            Some(false) => {}
            None => return Value::error(ErrorKind::Value),
        }
        i += 2;
    }
    Value::error(ErrorKind::Na)
}

fn eval_choose(
    args: &[Ast],
    address: SimpleCellAddress,
    graph: &DependencyGraph,
    registry: &FunctionRegistry,
    config: &EngineConfig,
    rng: &mut EngineRng,
) -> Value {
    if args.len() < 2 {
        return Value::error(ErrorKind::Value);
    }
    let idx_v = evaluate(&args[0], address, graph, registry, config, rng).narrow_scalar();
    if idx_v.is_error() {
        return idx_v;
    }
    let idx = match arith::coerce_scalar_to_number(&idx_v, config) {
        Ok(n) => n.representative(),
        Err(k) => return Value::error(k),
    };
    let i = idx.round() as i64;
    if i < 1 || i as usize >= args.len() {
        return Value::error(ErrorKind::Value);
    }
    evaluate(&args[i as usize], address, graph, registry, config, rng)
}

fn eval_switch(
    args: &[Ast],
    address: SimpleCellAddress,
    graph: &DependencyGraph,
    registry: &FunctionRegistry,
    config: &EngineConfig,
    rng: &mut EngineRng,
) -> Value {
    if args.len() < 3 {
        return Value::error(ErrorKind::Value);
    }
    let target = evaluate(&args[0], address, graph, registry, config, rng).narrow_scalar();
    if target.is_error() {
        return target;
    }
    let mut i = 1;
    while i + 1 < args.len() {
        let candidate = evaluate(&args[i], address, graph, registry, config, rng).narrow_scalar();
        if matches!(arith::eq(&target, &candidate, config), Value::Bool(true)) {
            return evaluate(&args[i + 1], address, graph, registry, config, rng);
        }
        i += 2;
    }
    if i < args.len() {
        evaluate(&args[i], address, graph, registry, config, rng)
    } else {
        Value::error(ErrorKind::Na)
    }
}

fn eval_iferror(
    args: &[Ast],
    address: SimpleCellAddress,
    graph: &DependencyGraph,
    registry: &FunctionRegistry,
    config: &EngineConfig,
    rng: &mut EngineRng,
    na_only: bool,
) -> Value {
    if args.len() != 2 {
        return Value::error(ErrorKind::Value);
    }
    let x = evaluate(&args[0], address, graph, registry, config, rng);
    let traps = match &x {
        Value::Error(e) => !na_only || e.kind == ErrorKind::Na,
        _ => false,
    };
    if traps {
        evaluate(&args[1], address, graph, registry, config, rng)
    } else {
        x
    }
}

/// `FORMULATEXT` needs the *reference itself*, not the value it resolves
/// to, so it reads its argument's AST directly instead of evaluating it.
fn eval_formulatext(args: &[Ast], address: SimpleCellAddress, graph: &DependencyGraph, config: &EngineConfig) -> Value {
    let Some(Ast::CellReference(addr)) = args.first() else {
        return Value::error(ErrorKind::Value);
    };
    let resolved = match resolve_cell(addr, address, graph.sheets()) {
        Ok(r) => r,
        Err(k) => return Value::error(k),
    };
    match graph.get_cell(resolved) {
        Some(VertexData::Formula { ast, .. }) | Some(VertexData::Array { ast, .. }) => {
            Value::String(format!("={}", fermi_parse::pretty_print(ast, resolved, config)))
        }
        _ => Value::error(ErrorKind::Na),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::function::{ArgType, ParamSpec};
    use fermi_parse::parse_formula;

    fn test_registry() -> FunctionRegistry {
        let mut reg = FunctionRegistry::new();
        reg.register(FunctionSpec {
            name: "SUM",
            params: &[ParamSpec::repeating("values", ArgType::Number)],
            flags: FnFlags::PURE,
            call: |args, ctx| {
                let mut total = 0.0;
                for a in args {
                    match a {
                        Value::Range(r) => {
                            for v in r.iter() {
                                if let Value::Number(n) = v {
                                    total += n.representative();
                                }
                            }
                        }
                        Value::Number(n) => total += n.representative(),
                        _ => {}
                    }
                }
                let _ = ctx;
                Value::raw(total)
            },
        });
        reg
    }

    fn addr(col: u32, row: u32) -> SimpleCellAddress {
        SimpleCellAddress::new(0, col, row)
    }

    #[test]
    fn literal_number_evaluates_to_raw() {
        let graph = DependencyGraph::new();
        let registry = FunctionRegistry::new();
        let config = EngineConfig::default();
        let mut rng = EngineRng::from_seed(1);
        let ast = parse_formula("42").unwrap();
        assert_eq!(evaluate(&ast, addr(0, 0), &graph, &registry, &config, &mut rng), Value::raw(42.0));
    }

    #[test]
    fn sum_over_materialized_range() {
        let mut graph = DependencyGraph::new();
        let sheet = graph.sheets_mut().get_or_insert("Sheet1");
        for row in 0..3 {
            graph.set_value(SimpleCellAddress::new(sheet, 0, row), format!("{}", row + 1), Value::raw((row + 1) as f64));
        }
        let registry = test_registry();
        let config = EngineConfig::default();
        let mut rng = EngineRng::from_seed(1);
        let ast = parse_formula("SUM(A1:A3)").unwrap();
        assert_eq!(evaluate(&ast, SimpleCellAddress::new(sheet, 1, 0), &graph, &registry, &config, &mut rng), Value::raw(6.0));
    }

    #[test]
    fn if_only_evaluates_chosen_branch() {
        let graph = DependencyGraph::new();
        let registry = FunctionRegistry::new();
        let config = EngineConfig::default();
        let mut rng = EngineRng::from_seed(1);
        // The false branch divides by zero; IF must not touch it.
        let ast = parse_formula("IF(TRUE, 1, 1/0)").unwrap();
        assert_eq!(evaluate(&ast, addr(0, 0), &graph, &registry, &config, &mut rng), Value::raw(1.0));
    }

    #[test]
    fn iferror_traps_any_error() {
        let graph = DependencyGraph::new();
        let registry = FunctionRegistry::new();
        let config = EngineConfig::default();
        let mut rng = EngineRng::from_seed(1);
        let ast = parse_formula("IFERROR(1/0, 99)").unwrap();
        assert_eq!(evaluate(&ast, addr(0, 0), &graph, &registry, &config, &mut rng), Value::raw(99.0));
    }

    #[test]
    fn ifna_ignores_non_na_errors() {
        let graph = DependencyGraph::new();
        let registry = FunctionRegistry::new();
        let config = EngineConfig::default();
        let mut rng = EngineRng::from_seed(1);
        let ast = parse_formula("IFNA(1/0, 99)").unwrap();
        assert_eq!(
            evaluate(&ast, addr(0, 0), &graph, &registry, &config, &mut rng),
            Value::error(ErrorKind::DivByZero)
        );
    }

    #[test]
    fn binary_op_broadcasts_over_range() {
        let mut graph = DependencyGraph::new();
        let sheet = graph.sheets_mut().get_or_insert("Sheet1");
        graph.set_value(SimpleCellAddress::new(sheet, 0, 0), "1".into(), Value::raw(1.0));
        graph.set_value(SimpleCellAddress::new(sheet, 0, 1), "2".into(), Value::raw(2.0));
        let registry = FunctionRegistry::new();
        let config = EngineConfig::default();
        let mut rng = EngineRng::from_seed(1);
        let ast = parse_formula("A1:A2+1").unwrap();
        match evaluate(&ast, SimpleCellAddress::new(sheet, 1, 0), &graph, &registry, &config, &mut rng) {
            Value::Range(r) => {
                assert_eq!(r.get(0, 0), Some(&Value::raw(2.0)));
                assert_eq!(r.get(0, 1), Some(&Value::raw(3.0)));
            }
            other => panic!("expected Range, got {other:?}"),
        }
    }

    #[test]
    fn cell_reference_resolves_through_current_value() {
        let mut graph = DependencyGraph::new();
        let sheet = graph.sheets_mut().get_or_insert("Sheet1");
        graph.set_value(SimpleCellAddress::new(sheet, 0, 0), "1".into(), Value::raw(1.0));
        let registry = FunctionRegistry::new();
        let config = EngineConfig::default();
        let mut rng = EngineRng::from_seed(1);
        let ast = parse_formula("A1").unwrap();
        assert_eq!(
            evaluate(&ast, SimpleCellAddress::new(sheet, 1, 0), &graph, &registry, &config, &mut rng),
            Value::raw(1.0)
        );
    }

    #[test]
    fn named_expression_falls_back_to_workbook_scope() {
        let mut graph = DependencyGraph::new();
        let sheet = graph.sheets_mut().get_or_insert("Sheet1");
        graph.set_named_value(None, "TaxRate", Value::raw(0.2));
        let registry = FunctionRegistry::new();
        let config = EngineConfig::default();
        let mut rng = EngineRng::from_seed(1);
        let ast = parse_formula("TaxRate").unwrap();
        assert_eq!(
            evaluate(&ast, SimpleCellAddress::new(sheet, 0, 0), &graph, &registry, &config, &mut rng),
            Value::raw(0.2)
        );
    }
}
