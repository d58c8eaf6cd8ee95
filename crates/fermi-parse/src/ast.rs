//! The parser's output AST (§4.3) and the dependency shapes it yields.

use fermi_common::{CellAddress, ErrorKind, RefKind};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum UnaryOperator {
    Plus,
    Minus,
    Percent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum BinaryOperator {
    Add,
    Sub,
    Mul,
    Div,
    Pow,
    Concat,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

/// One endpoint of a column-only range (`A:A`) — row is intentionally
/// absent, unlike [`fermi_common::CellAddress`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ColumnRef {
    pub sheet: Option<String>,
    pub col: u32,
    pub col_kind: RefKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct RowRef {
    pub sheet: Option<String>,
    pub row: u32,
    pub row_kind: RefKind,
}

/// A distribution literal recognised directly by the tokenizer/parser
/// (§6.2), materialised into a `RichNumber` at evaluation time.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum DistributionLiteral {
    Gaussian { mean: f64, variance: f64 },
    Sampled { mean: f64, variance: f64 },
    ConfidenceInterval { lo: f64, hi: f64, confidence_pct: f64 },
    LogNormal { mean: f64, variance: f64 },
    Uniform { lo: f64, hi: f64 },
}

/// Parsed formula AST (§4.3). Reference-bearing nodes hold a relative
/// [`CellAddress`]/[`ColumnRef`]/[`RowRef`] — absolutizing against the
/// owning formula's address happens during dependency extraction, not
/// during parsing.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Ast {
    Empty,
    Number(f64),
    String(String),
    Bool(bool),
    Error(ErrorKind),
    Distribution(DistributionLiteral),
    CellReference(CellAddress),
    CellRange(CellAddress, CellAddress),
    ColumnRange(ColumnRef, ColumnRef),
    RowRange(RowRef, RowRef),
    NamedExpression(String),
    FunctionCall { name: String, args: Vec<Ast> },
    Array(Vec<Vec<Ast>>),
    Parenthesis(Box<Ast>),
    UnaryOp { op: UnaryOperator, expr: Box<Ast> },
    BinaryOp { op: BinaryOperator, left: Box<Ast>, right: Box<Ast> },
}

/// A raw dependency extracted from an AST, still relative to the owning
/// formula's address (§4.3 "Dependency extraction").
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Dep {
    Address(CellAddress),
    CellRange(CellAddress, CellAddress),
    ColumnRange(ColumnRef, ColumnRef),
    RowRange(RowRef, RowRef),
    NamedExpression(String),
}

/// Walk `ast` and collect every reference it contains, in AST order
/// (§4.3 "Dependency extraction").
pub fn collect_dependencies(ast: &Ast) -> Vec<Dep> {
    let mut out = Vec::new();
    walk(ast, &mut out);
    out
}

fn walk(ast: &Ast, out: &mut Vec<Dep>) {
    match ast {
        Ast::CellReference(addr) => out.push(Dep::Address(addr.clone())),
        Ast::CellRange(a, b) => out.push(Dep::CellRange(a.clone(), b.clone())),
        Ast::ColumnRange(a, b) => out.push(Dep::ColumnRange(a.clone(), b.clone())),
        Ast::RowRange(a, b) => out.push(Dep::RowRange(a.clone(), b.clone())),
        Ast::NamedExpression(name) => out.push(Dep::NamedExpression(name.clone())),
        Ast::UnaryOp { expr, .. } => walk(expr, out),
        Ast::Parenthesis(inner) => walk(inner, out),
        Ast::BinaryOp { left, right, .. } => {
            walk(left, out);
            walk(right, out);
        }
        Ast::FunctionCall { args, .. } => {
            for a in args {
                walk(a, out);
            }
        }
        Ast::Array(rows) => {
            for row in rows {
                for item in row {
                    walk(item, out);
                }
            }
        }
        Ast::Empty
        | Ast::Number(_)
        | Ast::String(_)
        | Ast::Bool(_)
        | Ast::Error(_)
        | Ast::Distribution(_) => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collects_nested_references() {
        let ast = Ast::BinaryOp {
            op: BinaryOperator::Add,
            left: Box::new(Ast::CellReference(CellAddress::relative(0, 0))),
            right: Box::new(Ast::FunctionCall {
                name: "SUM".into(),
                args: vec![Ast::CellRange(CellAddress::relative(1, 0), CellAddress::relative(1, 9))],
            }),
        };
        let deps = collect_dependencies(&ast);
        assert_eq!(deps.len(), 2);
    }
}
