//! Reference-independent canonical hashing (§4.3 "AST hashing"): two
//! formulas that are structurally identical modulo their relative
//! references — e.g. `=A1+1` at `B1` and `=A2+1` at `B2` — render to the
//! same canonical text and therefore share one cache entry.

use std::hash::{Hash, Hasher};

use fermi_common::{CellAddress, EngineConfig, RefKind, SimpleCellAddress};
use rustc_hash::FxHasher;

use crate::ast::{Ast, BinaryOperator, ColumnRef, DistributionLiteral, RowRef, UnaryOperator};

fn render_number(n: f64, config: &EngineConfig) -> String {
    let s = format!("{n}");
    if config.decimal_separator != '.' {
        s.replace('.', &config.decimal_separator.to_string())
    } else {
        s
    }
}

fn canonical_ref_coord(value: u32, kind: RefKind, origin: u32) -> String {
    match kind {
        RefKind::Absolute => format!("${value}"),
        RefKind::Relative => {
            let delta = value as i64 - origin as i64;
            format!("@{delta:+}")
        }
    }
}

fn render_cell_address(addr: &CellAddress, origin: SimpleCellAddress) -> String {
    let sheet = match &addr.sheet {
        Some(s) => s.clone(),
        None => "!REF".to_string(),
    };
    format!(
        "{sheet}:{}:{}",
        canonical_ref_coord(addr.col, addr.col_kind, origin.col),
        canonical_ref_coord(addr.row, addr.row_kind, origin.row)
    )
}

fn render_column_ref(c: &ColumnRef, origin: u32) -> String {
    let sheet = c.sheet.clone().unwrap_or_else(|| "!REF".to_string());
    format!("{sheet}:{}", canonical_ref_coord(c.col, c.col_kind, origin))
}

fn render_row_ref(r: &RowRef, origin: u32) -> String {
    let sheet = r.sheet.clone().unwrap_or_else(|| "!REF".to_string());
    format!("{sheet}:{}", canonical_ref_coord(r.row, r.row_kind, origin))
}

fn render_distribution(d: &DistributionLiteral, config: &EngineConfig) -> String {
    match d {
        DistributionLiteral::Gaussian { mean, variance } => {
            format!("N({}, {})", render_number(*mean, config), render_number(*variance, config))
        }
        DistributionLiteral::Sampled { mean, variance } => {
            format!("S({}, {})", render_number(*mean, config), render_number(*variance, config))
        }
        DistributionLiteral::LogNormal { mean, variance } => {
            format!("LN({}, {})", render_number(*mean, config), render_number(*variance, config))
        }
        DistributionLiteral::Uniform { lo, hi } => {
            format!("U({}, {})", render_number(*lo, config), render_number(*hi, config))
        }
        DistributionLiteral::ConfidenceInterval { lo, hi, confidence_pct } => {
            format!(
                "CI{}[{}, {}]",
                render_number(*confidence_pct, config),
                render_number(*lo, config),
                render_number(*hi, config)
            )
        }
    }
}

fn op_symbol(op: BinaryOperator) -> &'static str {
    match op {
        BinaryOperator::Add => "+",
        BinaryOperator::Sub => "-",
        BinaryOperator::Mul => "*",
        BinaryOperator::Div => "/",
        BinaryOperator::Pow => "^",
        BinaryOperator::Concat => "&",
        BinaryOperator::Eq => "=",
        BinaryOperator::Ne => "<>",
        BinaryOperator::Lt => "<",
        BinaryOperator::Le => "<=",
        BinaryOperator::Gt => ">",
        BinaryOperator::Ge => ">=",
    }
}

/// Deterministic pretty-print used both to key the [`crate::cache::FormulaCache`]
/// and to reinsert a transformed AST (§4.3 "AST hashing").
pub fn pretty_print(ast: &Ast, origin: SimpleCellAddress, config: &EngineConfig) -> String {
    match ast {
        Ast::Empty => String::new(),
        Ast::Number(n) => render_number(*n, config),
        Ast::String(s) => format!("\"{}\"", s.replace('"', "\"\"")),
        Ast::Bool(b) => if *b { "TRUE" } else { "FALSE" }.to_string(),
        Ast::Error(k) => k.code().to_string(),
        Ast::Distribution(d) => render_distribution(d, config),
        Ast::CellReference(addr) => render_cell_address(addr, origin),
        Ast::CellRange(a, b) => format!("{}:{}", render_cell_address(a, origin), render_cell_address(b, origin)),
        Ast::ColumnRange(a, b) => format!("{}:{}", render_column_ref(a, origin.col), render_column_ref(b, origin.col)),
        Ast::RowRange(a, b) => format!("{}:{}", render_row_ref(a, origin.row), render_row_ref(b, origin.row)),
        Ast::NamedExpression(name) => config.translation_package.canonical_function_name(name),
        Ast::FunctionCall { name, args } => {
            let canon_name = config.translation_package.canonical_function_name(name);
            let rendered_args: Vec<String> = args.iter().map(|a| pretty_print(a, origin, config)).collect();
            format!("{canon_name}({})", rendered_args.join(&config.function_arg_separator.to_string()))
        }
        Ast::Array(rows) => {
            let rows_rendered: Vec<String> = rows
                .iter()
                .map(|row| {
                    row.iter()
                        .map(|a| pretty_print(a, origin, config))
                        .collect::<Vec<_>>()
                        .join(&config.function_arg_separator.to_string())
                })
                .collect();
            format!("{{{}}}", rows_rendered.join(";"))
        }
        Ast::Parenthesis(inner) => format!("({})", pretty_print(inner, origin, config)),
        Ast::UnaryOp { op, expr } => {
            let rendered = pretty_print(expr, origin, config);
            match op {
                UnaryOperator::Plus => format!("+{rendered}"),
                UnaryOperator::Minus => format!("-{rendered}"),
                UnaryOperator::Percent => format!("{rendered}%"),
            }
        }
        Ast::BinaryOp { op, left, right } => {
            format!("{}{}{}", pretty_print(left, origin, config), op_symbol(*op), pretty_print(right, origin, config))
        }
    }
}

/// The canonical, reference-independent hash of `ast` as parsed at `origin`
/// (§4.3). Two ASTs with identical canonical text hash identically.
pub fn canonical_hash(ast: &Ast, origin: SimpleCellAddress, config: &EngineConfig) -> u64 {
    let text = pretty_print(ast, origin, config);
    let mut hasher = FxHasher::default();
    text.hash(&mut hasher);
    hasher.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use fermi_common::CellAddress;

    #[test]
    fn same_relative_shape_hashes_identically_at_different_origins() {
        let config = EngineConfig::default();
        let ast_a = Ast::BinaryOp {
            op: BinaryOperator::Add,
            left: Box::new(Ast::CellReference(CellAddress::relative(0, 0))), // A1, relative
            right: Box::new(Ast::Number(1.0)),
        };
        let ast_b = Ast::BinaryOp {
            op: BinaryOperator::Add,
            left: Box::new(Ast::CellReference(CellAddress::relative(0, 1))), // A2, relative
            right: Box::new(Ast::Number(1.0)),
        };
        let origin_a = SimpleCellAddress::new(0, 1, 0); // B1
        let origin_b = SimpleCellAddress::new(0, 1, 1); // B2
        assert_eq!(
            canonical_hash(&ast_a, origin_a, &config),
            canonical_hash(&ast_b, origin_b, &config)
        );
    }

    #[test]
    fn absolute_references_are_origin_independent_but_position_sensitive() {
        let config = EngineConfig::default();
        let absolute = CellAddress::absolute(Some("Sheet1".to_string()), 0, 0);
        let ast = Ast::CellReference(absolute);
        let h1 = canonical_hash(&ast, SimpleCellAddress::new(0, 5, 5), &config);
        let h2 = canonical_hash(&ast, SimpleCellAddress::new(0, 9, 9), &config);
        assert_eq!(h1, h2);
    }
}
