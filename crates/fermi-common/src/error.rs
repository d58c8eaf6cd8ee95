//! The in-sheet error taxonomy (§3.1, §7) plus `FermiError`, the Rust-level
//! error returned by fallible constructors and configuration.
//!
//! `ErrorKind`/`CellError` are *data* — they live inside `Value::Error` and
//! flow through formulas like any other value. `FermiError` is a normal
//! `std::error::Error` for misuse that can't be represented as a cell value
//! (e.g. an out-of-range address passed to the graph API).

use std::fmt;

/// Canonical error codes a cell can hold, per spec §3.1.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    DivByZero,
    Name,
    Value,
    Num,
    Na,
    Cycle,
    Ref,
    Spill,
    Lic,
    Error,
}

impl ErrorKind {
    /// The bare Excel-style code, with no message attached.
    pub fn code(self) -> &'static str {
        match self {
            ErrorKind::DivByZero => "#DIV/0!",
            ErrorKind::Name => "#NAME?",
            ErrorKind::Value => "#VALUE!",
            ErrorKind::Num => "#NUM!",
            ErrorKind::Na => "#N/A",
            ErrorKind::Cycle => "#CIRC!",
            ErrorKind::Ref => "#REF!",
            ErrorKind::Spill => "#SPILL!",
            ErrorKind::Lic => "#LIC!",
            ErrorKind::Error => "#ERROR!",
        }
    }

    /// Parse a bare code such as `"#DIV/0!"`. Returns `None` for anything
    /// that doesn't match one of the canonical codes.
    pub fn parse(code: &str) -> Option<Self> {
        Some(match code.trim() {
            "#DIV/0!" => ErrorKind::DivByZero,
            "#NAME?" => ErrorKind::Name,
            "#VALUE!" => ErrorKind::Value,
            "#NUM!" => ErrorKind::Num,
            "#N/A" => ErrorKind::Na,
            "#CIRC!" => ErrorKind::Cycle,
            "#REF!" => ErrorKind::Ref,
            "#SPILL!" => ErrorKind::Spill,
            "#LIC!" => ErrorKind::Lic,
            "#ERROR!" => ErrorKind::Error,
            _ => return None,
        })
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// A cell-visible error: the canonical kind, an optional human message, and
/// the address of the formula that first produced it (for attribution when
/// the error propagates through several cells).
#[derive(Debug, Clone, PartialEq)]
pub struct CellError {
    pub kind: ErrorKind,
    pub message: Option<String>,
    pub root: Option<SimpleRoot>,
}

/// Lightweight address stand-in so `fermi-common` doesn't need to depend on
/// `address::SimpleCellAddress` for this one field (avoids a cycle risk if
/// addresses ever need to report errors themselves).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SimpleRoot {
    pub sheet: u16,
    pub row: u32,
    pub col: u32,
}

impl CellError {
    pub fn new(kind: ErrorKind) -> Self {
        CellError {
            kind,
            message: None,
            root: None,
        }
    }

    pub fn with_message(mut self, msg: impl Into<String>) -> Self {
        self.message = Some(msg.into());
        self
    }

    pub fn with_root(mut self, root: SimpleRoot) -> Self {
        self.root = Some(root);
        self
    }
}

impl From<ErrorKind> for CellError {
    fn from(kind: ErrorKind) -> Self {
        CellError::new(kind)
    }
}

impl fmt::Display for CellError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind)?;
        if let Some(ref msg) = self.message {
            write!(f, ": {msg}")?;
        }
        Ok(())
    }
}

/// Structural/Rust-level failures: bad configuration, invalid addresses,
/// malformed literals that can't even be represented as a `CellError`.
#[derive(Debug, thiserror::Error, Clone, PartialEq)]
pub enum FermiError {
    #[error("row/column indices must be 1-based (>= 1)")]
    ZeroIndex,
    #[error("row {0} exceeds the supported grid (1,048,576 rows)")]
    RowOverflow(u32),
    #[error("column {0} exceeds the supported grid (16,384 columns)")]
    ColOverflow(u32),
    #[error("range must be ordered so the start is above/left of the end")]
    RangeOrder,
    #[error("unknown sheet {0:?}")]
    UnknownSheet(String),
    #[error("unknown sheet id {0}")]
    UnknownSheetId(u16),
    #[error("invalid named expression {0:?}")]
    InvalidName(String),
    #[error("{0}")]
    Config(String),
}

use crate::address::SimpleCellAddress;

impl From<SimpleCellAddress> for SimpleRoot {
    fn from(addr: SimpleCellAddress) -> Self {
        SimpleRoot {
            sheet: addr.sheet,
            row: addr.row,
            col: addr.col,
        }
    }
}
