//! Pratt parser over the token stream from [`crate::tokenizer`] (§4.3).

use fermi_common::{CellAddress, RefKind};

use crate::ast::{Ast, BinaryOperator, ColumnRef, RowRef, UnaryOperator};
use crate::tokenizer::{tokenize, Tok, Token, TokenizerError};

#[derive(Debug, Clone, thiserror::Error, PartialEq)]
pub enum ParseError {
    #[error(transparent)]
    Lexing(#[from] TokenizerError),
    #[error("unexpected end of formula")]
    UnexpectedEof,
    #[error("unexpected token at byte {pos}: {found}")]
    Unexpected { found: String, pos: usize },
}

/// Parse formula text (without the leading `=`) into an [`Ast`].
pub fn parse_formula(src: &str) -> Result<Ast, ParseError> {
    let tokens = tokenize(src)?;
    let mut p = Parser { tokens, pos: 0 };
    let ast = p.parse_expr(0)?;
    if p.pos != p.tokens.len() {
        let tok = &p.tokens[p.pos];
        return Err(ParseError::Unexpected {
            found: format!("{:?}", tok.tok),
            pos: tok.start,
        });
    }
    Ok(ast)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

fn binding_power(op: &str) -> Option<(u8, u8)> {
    // (left binding power, right binding power); equal for left-assoc.
    Some(match op {
        "=" | "<>" | "<" | "<=" | ">" | ">=" => (1, 2),
        "&" => (3, 4),
        "+" | "-" => (5, 6),
        "*" | "/" => (7, 8),
        "^" => (10, 9), // right-associative
        _ => return None,
    })
}

fn binary_operator(op: &str) -> BinaryOperator {
    match op {
        "+" => BinaryOperator::Add,
        "-" => BinaryOperator::Sub,
        "*" => BinaryOperator::Mul,
        "/" => BinaryOperator::Div,
        "^" => BinaryOperator::Pow,
        "&" => BinaryOperator::Concat,
        "=" => BinaryOperator::Eq,
        "<>" => BinaryOperator::Ne,
        "<" => BinaryOperator::Lt,
        "<=" => BinaryOperator::Le,
        ">" => BinaryOperator::Gt,
        ">=" => BinaryOperator::Ge,
        _ => unreachable!("unknown binary operator {op}"),
    }
}

impl Parser {
    fn peek(&self) -> Option<&Tok> {
        self.tokens.get(self.pos).map(|t| &t.tok)
    }

    fn pos_of(&self, idx: usize) -> usize {
        self.tokens.get(idx).map(|t| t.start).unwrap_or(0)
    }

    fn bump(&mut self) -> Option<Tok> {
        let t = self.tokens.get(self.pos).map(|t| t.tok.clone());
        if t.is_some() {
            self.pos += 1;
        }
        t
    }

    fn expect(&mut self, want: &Tok) -> Result<(), ParseError> {
        match self.bump() {
            Some(t) if &t == want => Ok(()),
            Some(t) => Err(ParseError::Unexpected {
                found: format!("{t:?}"),
                pos: self.pos_of(self.pos.saturating_sub(1)),
            }),
            None => Err(ParseError::UnexpectedEof),
        }
    }

    /// Precedence-climbing expression parser: `min_bp` is the minimum left
    /// binding power a following infix operator must have to be consumed
    /// here rather than deferred to the caller.
    fn parse_expr(&mut self, min_bp: u8) -> Result<Ast, ParseError> {
        let mut lhs = self.parse_prefix()?;

        loop {
            // postfix %
            if matches!(self.peek(), Some(Tok::Op("%"))) {
                self.bump();
                lhs = Ast::UnaryOp {
                    op: UnaryOperator::Percent,
                    expr: Box::new(lhs),
                };
                continue;
            }

            let op = match self.peek() {
                Some(Tok::Op(op)) => *op,
                _ => break,
            };
            let (lbp, rbp) = match binding_power(op) {
                Some(bp) => bp,
                None => break,
            };
            if lbp < min_bp {
                break;
            }
            self.bump();
            let rhs = self.parse_expr(rbp)?;
            lhs = Ast::BinaryOp {
                op: binary_operator(op),
                left: Box::new(lhs),
                right: Box::new(rhs),
            };
        }

        Ok(lhs)
    }

    fn parse_prefix(&mut self) -> Result<Ast, ParseError> {
        match self.peek() {
            Some(Tok::Op("+")) => {
                self.bump();
                let expr = self.parse_expr(9)?;
                Ok(Ast::UnaryOp { op: UnaryOperator::Plus, expr: Box::new(expr) })
            }
            Some(Tok::Op("-")) => {
                self.bump();
                let expr = self.parse_expr(9)?;
                Ok(Ast::UnaryOp { op: UnaryOperator::Minus, expr: Box::new(expr) })
            }
            _ => self.parse_range_or_atom(),
        }
    }

    /// Atom parsing plus the `:`-joined range forms (`A1:B2`, `A:A`, `1:1`
    /// already arrive pre-joined as a single token from the tokenizer, but
    /// `A1:B2` is two `Ref` tokens joined by a `Colon` here).
    fn parse_range_or_atom(&mut self) -> Result<Ast, ParseError> {
        let atom = self.parse_atom()?;
        if let Ast::CellReference(start) = &atom {
            if matches!(self.peek(), Some(Tok::Colon)) {
                self.bump();
                let end = self.parse_atom()?;
                if let Ast::CellReference(end) = end {
                    return Ok(Ast::CellRange(start.clone(), end));
                }
                return Err(ParseError::Unexpected {
                    found: "non-reference range end".into(),
                    pos: self.pos_of(self.pos),
                });
            }
        }
        Ok(atom)
    }

    fn parse_atom(&mut self) -> Result<Ast, ParseError> {
        let start_pos = self.pos;
        match self.bump().ok_or(ParseError::UnexpectedEof)? {
            Tok::Number(n) => Ok(Ast::Number(n)),
            Tok::Str(s) => Ok(Ast::String(s)),
            Tok::Bool(b) => Ok(Ast::Bool(b)),
            Tok::ErrorLit(k) => Ok(Ast::Error(k)),
            Tok::Ref(r) => Ok(Ast::CellReference(CellAddress {
                sheet: r.sheet,
                col: r.col,
                row: r.row,
                col_kind: r.col_kind,
                row_kind: r.row_kind,
                sheet_kind: RefKind::Absolute,
            })),
            Tok::ColumnRange { sheet, start, end } => Ok(Ast::ColumnRange(
                ColumnRef { sheet: sheet.clone(), col: start.0, col_kind: start.1 },
                ColumnRef { sheet, col: end.0, col_kind: end.1 },
            )),
            Tok::RowRange { sheet, start, end } => Ok(Ast::RowRange(
                RowRef { sheet: sheet.clone(), row: start.0, row_kind: start.1 },
                RowRef { sheet, row: end.0, row_kind: end.1 },
            )),
            Tok::LParen => {
                let inner = self.parse_expr(0)?;
                self.expect(&Tok::RParen)?;
                Ok(Ast::Parenthesis(Box::new(inner)))
            }
            Tok::LBrace => {
                let rows = self.parse_array_rows()?;
                Ok(Ast::Array(rows))
            }
            Tok::Ident(name) => {
                if matches!(self.peek(), Some(Tok::LParen)) {
                    self.bump();
                    let args = self.parse_args()?;
                    self.expect(&Tok::RParen)?;
                    Ok(Ast::FunctionCall { name, args })
                } else {
                    Ok(Ast::NamedExpression(name))
                }
            }
            other => Err(ParseError::Unexpected {
                found: format!("{other:?}"),
                pos: self.pos_of(start_pos),
            }),
        }
    }

    fn parse_args(&mut self) -> Result<Vec<Ast>, ParseError> {
        let mut args = Vec::new();
        if matches!(self.peek(), Some(Tok::RParen)) {
            return Ok(args);
        }
        loop {
            args.push(self.parse_expr(0)?);
            match self.peek() {
                Some(Tok::Comma) => {
                    self.bump();
                }
                _ => break,
            }
        }
        Ok(args)
    }

    fn parse_array_rows(&mut self) -> Result<Vec<Vec<Ast>>, ParseError> {
        let mut rows = vec![Vec::new()];
        loop {
            rows.last_mut().unwrap().push(self.parse_expr(0)?);
            match self.peek() {
                Some(Tok::Comma) => {
                    self.bump();
                }
                Some(Tok::Semicolon) => {
                    self.bump();
                    rows.push(Vec::new());
                }
                Some(Tok::RBrace) => {
                    self.bump();
                    break;
                }
                _ => {
                    return Err(ParseError::Unexpected {
                        found: format!("{:?}", self.peek()),
                        pos: self.pos_of(self.pos),
                    })
                }
            }
        }
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_arithmetic_with_precedence() {
        let ast = parse_formula("1+2*3").unwrap();
        match ast {
            Ast::BinaryOp { op: BinaryOperator::Add, right, .. } => {
                assert!(matches!(*right, Ast::BinaryOp { op: BinaryOperator::Mul, .. }));
            }
            other => panic!("unexpected ast {other:?}"),
        }
    }

    #[test]
    fn power_is_right_associative() {
        // 2^3^2 should be 2^(3^2), not (2^3)^2
        let ast = parse_formula("2^3^2").unwrap();
        match ast {
            Ast::BinaryOp { op: BinaryOperator::Pow, left, right } => {
                assert!(matches!(*left, Ast::Number(n) if n == 2.0));
                assert!(matches!(*right, Ast::BinaryOp { op: BinaryOperator::Pow, .. }));
            }
            other => panic!("unexpected ast {other:?}"),
        }
    }

    #[test]
    fn parses_function_call_with_range_arg() {
        let ast = parse_formula("SUM(A1:B2)").unwrap();
        match ast {
            Ast::FunctionCall { name, args } => {
                assert_eq!(name, "SUM");
                assert!(matches!(args[0], Ast::CellRange(..)));
            }
            other => panic!("unexpected ast {other:?}"),
        }
    }

    #[test]
    fn parses_unary_minus_and_percent() {
        // `-` binds the whole following expression (including any postfix
        // `%` inside it), so `-5%` groups as `-(5%)`, not `(-5)%`.
        let ast = parse_formula("-5%").unwrap();
        match ast {
            Ast::UnaryOp { op: UnaryOperator::Minus, expr } => {
                assert!(matches!(*expr, Ast::UnaryOp { op: UnaryOperator::Percent, .. }));
            }
            other => panic!("unexpected ast {other:?}"),
        }
    }

    #[test]
    fn parses_named_expression_reference() {
        let ast = parse_formula("MyRange+1").unwrap();
        match ast {
            Ast::BinaryOp { left, .. } => assert!(matches!(*left, Ast::NamedExpression(ref n) if n == "MyRange")),
            other => panic!("unexpected ast {other:?}"),
        }
    }

    #[test]
    fn parses_array_literal() {
        let ast = parse_formula("{1,2;3,4}").unwrap();
        match ast {
            Ast::Array(rows) => {
                assert_eq!(rows.len(), 2);
                assert_eq!(rows[0].len(), 2);
            }
            other => panic!("unexpected ast {other:?}"),
        }
    }
}
