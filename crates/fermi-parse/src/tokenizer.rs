//! Regex-driven tokenizer (§4.3) for formula text (cell content for which
//! [`crate::literal::is_formula`] is true). Produces a flat token stream the
//! Pratt parser walks; whitespace is dropped rather than preserved as a
//! token, since this engine has no formula-text round-trip requirement
//! beyond the canonical hash in §4.3's "AST hashing".

use once_cell::sync::Lazy;
use regex::Regex;

use fermi_common::{ErrorKind, RefKind};

#[derive(Debug, Clone, PartialEq)]
pub struct RawRef {
    pub sheet: Option<String>,
    pub col: u32,
    pub row: u32,
    pub col_kind: RefKind,
    pub row_kind: RefKind,
    /// R1C1-style references carry signed, possibly-relative offsets
    /// instead of the absolute letters/digits A1 uses; `is_r1c1` tells the
    /// parser which resolution rule applies.
    pub is_r1c1: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Tok {
    Number(f64),
    Str(String),
    Bool(bool),
    ErrorLit(ErrorKind),
    Ref(RawRef),
    ColumnRange { sheet: Option<String>, start: (u32, RefKind), end: (u32, RefKind) },
    RowRange { sheet: Option<String>, start: (u32, RefKind), end: (u32, RefKind) },
    Ident(String),
    LParen,
    RParen,
    LBrace,
    RBrace,
    Comma,
    Semicolon,
    Colon,
    Op(&'static str),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub tok: Tok,
    pub start: usize,
    pub end: usize,
}

#[derive(Debug, Clone, thiserror::Error, PartialEq)]
#[error("lexing error at byte {pos}: {message}")]
pub struct TokenizerError {
    pub message: String,
    pub pos: usize,
}

static SHEET_PREFIX_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(?:'([^']+)'|([A-Za-z_][A-Za-z0-9_.]*))!").unwrap());
static A1_REF_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(\$?)([A-Za-z]{1,3})(\$?)([0-9]+)").unwrap());
static R1C1_REF_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^R(\[-?[0-9]+\]|[0-9]+)?C(\[-?[0-9]+\]|[0-9]+)?").unwrap());
static COLUMN_RANGE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(\$?)([A-Za-z]{1,3})\s*:\s*(\$?)([A-Za-z]{1,3})(?![0-9A-Za-z(])").unwrap());
static ROW_RANGE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(\$?)([0-9]+)\s*:\s*(\$?)([0-9]+)").unwrap());
static NUMBER_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[0-9]+(\.[0-9]+)?([eE][+-]?[0-9]+)?").unwrap());
static ERROR_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^#[A-Za-z0-9/]+[?!]?").unwrap());
static IDENT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_.]*").unwrap());

fn column_letters_to_index(s: &str) -> u32 {
    fermi_common::letters_to_column(&s.to_ascii_uppercase()).unwrap_or(0)
}

fn kind(has_dollar: &str) -> RefKind {
    if has_dollar.is_empty() {
        RefKind::Relative
    } else {
        RefKind::Absolute
    }
}

/// Tokenize formula text (without the leading `=`).
pub fn tokenize(src: &str) -> Result<Vec<Token>, TokenizerError> {
    let mut out = Vec::new();
    let mut i = 0usize;
    let bytes = src.as_bytes();

    while i < bytes.len() {
        let rest = &src[i..];
        let c = bytes[i];

        if c == b' ' || c == b'\t' || c == b'\n' || c == b'\r' {
            i += 1;
            continue;
        }

        // optional sheet prefix ahead of a reference/range
        let mut sheet = None;
        let mut lookahead = rest;
        let mut sheet_len = 0;
        if let Some(m) = SHEET_PREFIX_RE.captures(rest) {
            let whole = m.get(0).unwrap();
            sheet = Some(m.get(1).or_else(|| m.get(2)).unwrap().as_str().to_string());
            sheet_len = whole.end();
            lookahead = &rest[sheet_len..];
        }

        if let Some(m) = COLUMN_RANGE_RE.captures(lookahead) {
            let whole_len = sheet_len + m.get(0).unwrap().end();
            let start_abs = kind(&m[1]);
            let start_col = column_letters_to_index(&m[2]);
            let end_abs = kind(&m[3]);
            let end_col = column_letters_to_index(&m[4]);
            out.push(Token {
                tok: Tok::ColumnRange {
                    sheet,
                    start: (start_col, start_abs),
                    end: (end_col, end_abs),
                },
                start: i,
                end: i + whole_len,
            });
            i += whole_len;
            continue;
        }

        if let Some(m) = ROW_RANGE_RE.captures(lookahead) {
            let whole_len = sheet_len + m.get(0).unwrap().end();
            let start_abs = kind(&m[1]);
            let start_row: u32 = m[2].parse().unwrap_or(1);
            let end_abs = kind(&m[3]);
            let end_row: u32 = m[4].parse().unwrap_or(1);
            out.push(Token {
                tok: Tok::RowRange {
                    sheet,
                    start: (start_row.saturating_sub(1), start_abs),
                    end: (end_row.saturating_sub(1), end_abs),
                },
                start: i,
                end: i + whole_len,
            });
            i += whole_len;
            continue;
        }

        if let Some(m) = A1_REF_RE.captures(lookahead) {
            let whole_len = sheet_len + m.get(0).unwrap().end();
            let col_kind = kind(&m[1]);
            let col = column_letters_to_index(&m[2]);
            let row_kind = kind(&m[3]);
            let row1: u32 = m[4].parse().unwrap_or(1);
            out.push(Token {
                tok: Tok::Ref(RawRef {
                    sheet,
                    col,
                    row: row1.saturating_sub(1),
                    col_kind,
                    row_kind,
                    is_r1c1: false,
                }),
                start: i,
                end: i + whole_len,
            });
            i += whole_len;
            continue;
        }

        if let Some(m) = R1C1_REF_RE.captures(lookahead) {
            if m.get(1).is_some() || m.get(2).is_some() {
                let whole_len = sheet_len + m.get(0).unwrap().end();
                let (row, row_kind) = parse_r1c1_component(m.get(1).map(|g| g.as_str()));
                let (col, col_kind) = parse_r1c1_component(m.get(2).map(|g| g.as_str()));
                out.push(Token {
                    tok: Tok::Ref(RawRef {
                        sheet,
                        col,
                        row,
                        col_kind,
                        row_kind,
                        is_r1c1: true,
                    }),
                    start: i,
                    end: i + whole_len,
                });
                i += whole_len;
                continue;
            }
        }

        if sheet.is_some() {
            return Err(TokenizerError {
                message: "expected a reference after sheet prefix".into(),
                pos: i,
            });
        }

        match c {
            b'"' => {
                let (s, len) = lex_string(rest)?;
                out.push(Token { tok: Tok::Str(s), start: i, end: i + len });
                i += len;
            }
            b'#' => {
                let m = ERROR_RE
                    .find(rest)
                    .ok_or_else(|| TokenizerError { message: "invalid error literal".into(), pos: i })?;
                let text = m.as_str();
                let kind = ErrorKind::parse(text).unwrap_or(ErrorKind::Error);
                out.push(Token { tok: Tok::ErrorLit(kind), start: i, end: i + text.len() });
                i += text.len();
            }
            b'0'..=b'9' => {
                let m = NUMBER_RE.find(rest).expect("NUMBER_RE must match a leading digit");
                let text = m.as_str();
                let n: f64 = text.parse().map_err(|_| TokenizerError {
                    message: format!("invalid number literal {text:?}"),
                    pos: i,
                })?;
                out.push(Token { tok: Tok::Number(n), start: i, end: i + text.len() });
                i += text.len();
            }
            b'(' => {
                out.push(Token { tok: Tok::LParen, start: i, end: i + 1 });
                i += 1;
            }
            b')' => {
                out.push(Token { tok: Tok::RParen, start: i, end: i + 1 });
                i += 1;
            }
            b'{' => {
                out.push(Token { tok: Tok::LBrace, start: i, end: i + 1 });
                i += 1;
            }
            b'}' => {
                out.push(Token { tok: Tok::RBrace, start: i, end: i + 1 });
                i += 1;
            }
            b',' => {
                out.push(Token { tok: Tok::Comma, start: i, end: i + 1 });
                i += 1;
            }
            b';' => {
                out.push(Token { tok: Tok::Semicolon, start: i, end: i + 1 });
                i += 1;
            }
            b':' => {
                out.push(Token { tok: Tok::Colon, start: i, end: i + 1 });
                i += 1;
            }
            b'>' | b'<' => {
                if rest.as_bytes().get(1) == Some(&b'=') {
                    let op = if c == b'>' { ">=" } else { "<=" };
                    out.push(Token { tok: Tok::Op(op), start: i, end: i + 2 });
                    i += 2;
                } else if c == b'<' && rest.as_bytes().get(1) == Some(&b'>') {
                    out.push(Token { tok: Tok::Op("<>"), start: i, end: i + 2 });
                    i += 2;
                } else {
                    out.push(Token { tok: Tok::Op(if c == b'>' { ">" } else { "<" }), start: i, end: i + 1 });
                    i += 1;
                }
            }
            b'+' | b'-' | b'*' | b'/' | b'^' | b'&' | b'=' | b'%' => {
                let op: &'static str = match c {
                    b'+' => "+",
                    b'-' => "-",
                    b'*' => "*",
                    b'/' => "/",
                    b'^' => "^",
                    b'&' => "&",
                    b'=' => "=",
                    b'%' => "%",
                    _ => unreachable!(),
                };
                out.push(Token { tok: Tok::Op(op), start: i, end: i + 1 });
                i += 1;
            }
            _ => {
                if let Some(m) = IDENT_RE.find(rest) {
                    let text = m.as_str();
                    let tok = match text.to_ascii_uppercase().as_str() {
                        "TRUE" => Tok::Bool(true),
                        "FALSE" => Tok::Bool(false),
                        _ => Tok::Ident(text.to_string()),
                    };
                    out.push(Token { tok, start: i, end: i + text.len() });
                    i += text.len();
                } else {
                    return Err(TokenizerError {
                        message: format!("unrecognised character {:?}", src[i..].chars().next()),
                        pos: i,
                    });
                }
            }
        }
    }

    Ok(out)
}

fn parse_r1c1_component(part: Option<&str>) -> (u32, RefKind) {
    match part {
        None => (0, RefKind::Relative),
        Some(p) if p.starts_with('[') => {
            let inner = &p[1..p.len() - 1];
            let offset: i64 = inner.parse().unwrap_or(0);
            (offset.max(0) as u32, RefKind::Relative)
        }
        Some(p) => (p.parse::<u32>().unwrap_or(1).saturating_sub(1), RefKind::Absolute),
    }
}

fn lex_string(rest: &str) -> Result<(String, usize), TokenizerError> {
    let bytes = rest.as_bytes();
    debug_assert_eq!(bytes[0], b'"');
    let mut out = String::new();
    let mut i = 1;
    loop {
        if i >= bytes.len() {
            return Err(TokenizerError {
                message: "unterminated string literal".into(),
                pos: i,
            });
        }
        if bytes[i] == b'"' {
            if bytes.get(i + 1) == Some(&b'"') {
                out.push('"');
                i += 2;
                continue;
            }
            return Ok((out, i + 1));
        }
        let ch = rest[i..].chars().next().unwrap();
        out.push(ch);
        i += ch.len_utf8();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokenizes_simple_arithmetic() {
        let toks = tokenize("A1+B2*2").unwrap();
        assert_eq!(toks.len(), 5);
        assert!(matches!(toks[1].tok, Tok::Op("+")));
    }

    #[test]
    fn tokenizes_sheet_qualified_reference() {
        let toks = tokenize("Sheet1!$A$1").unwrap();
        assert_eq!(toks.len(), 1);
        match &toks[0].tok {
            Tok::Ref(r) => {
                assert_eq!(r.sheet.as_deref(), Some("Sheet1"));
                assert_eq!(r.col, 0);
                assert_eq!(r.row, 0);
                assert_eq!(r.col_kind, RefKind::Absolute);
            }
            other => panic!("expected Ref, got {other:?}"),
        }
    }

    #[test]
    fn tokenizes_column_range() {
        let toks = tokenize("SUM(A:A)").unwrap();
        assert!(toks.iter().any(|t| matches!(t.tok, Tok::ColumnRange { .. })));
    }

    #[test]
    fn tokenizes_r1c1_relative() {
        let toks = tokenize("R[1]C[-1]").unwrap();
        match &toks[0].tok {
            Tok::Ref(r) => assert!(r.is_r1c1),
            other => panic!("expected Ref, got {other:?}"),
        }
    }

    #[test]
    fn tokenizes_string_with_escaped_quote() {
        let toks = tokenize("\"a\"\"b\"").unwrap();
        assert_eq!(toks[0].tok, Tok::Str("a\"b".to_string()));
    }
}
