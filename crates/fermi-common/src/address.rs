//! Cell addresses (§3.3) and the sheet-name registry.

use std::collections::HashMap;
use std::fmt;

use crate::coord::{column_letters, letters_to_column};
use crate::error::FermiError;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Stable sheet identifier, allocated by [`SheetRegistry`].
pub type SheetId = u16;

/// The reserved sheet that holds named-expression "cells" (§4.1.6/§6.4).
/// Negative in the spec's prose; represented here as the top of the `u16`
/// range so it never collides with a real sheet id allocated from zero.
pub const SHEET_FOR_WORKBOOK_EXPRESSIONS: SheetId = SheetId::MAX;

/// Whether a row/column/sheet part of a reference is absolute (`$A$1`) or
/// relative (`A1`), per §3.3.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum RefKind {
    Absolute,
    Relative,
}

impl RefKind {
    pub fn is_absolute(self) -> bool {
        matches!(self, RefKind::Absolute)
    }
}

/// Name ⇄ id table for sheets. Insertion order is preserved so iteration
/// order matches creation order (useful for deterministic serialization).
#[derive(Debug, Default, Clone)]
pub struct SheetRegistry {
    names: Vec<String>,
    by_name: HashMap<String, SheetId>,
}

impl SheetRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the existing id for `name`, or allocates a new one.
    pub fn get_or_insert(&mut self, name: &str) -> SheetId {
        if let Some(&id) = self.by_name.get(name) {
            return id;
        }
        let id = self.names.len() as SheetId;
        self.names.push(name.to_string());
        self.by_name.insert(name.to_string(), id);
        id
    }

    pub fn id_of(&self, name: &str) -> Option<SheetId> {
        self.by_name.get(name).copied()
    }

    pub fn name_of(&self, id: SheetId) -> Option<&str> {
        self.names.get(id as usize).map(|s| s.as_str())
    }

    pub fn remove(&mut self, id: SheetId) -> Result<(), FermiError> {
        let name = self
            .names
            .get(id as usize)
            .cloned()
            .ok_or(FermiError::UnknownSheetId(id))?;
        self.by_name.remove(&name);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }
}

/// A resolved, 0-based (sheet, col, row) triple — the form graph vertices
/// and range iterators key on.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SimpleCellAddress {
    pub sheet: SheetId,
    pub col: u32,
    pub row: u32,
}

impl SimpleCellAddress {
    pub fn new(sheet: SheetId, col: u32, row: u32) -> Self {
        SimpleCellAddress { sheet, col, row }
    }

    pub fn to_a1(self) -> String {
        format!("{}{}", column_letters(self.col), self.row + 1)
    }
}

impl fmt::Display for SimpleCellAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_a1())
    }
}

/// An address as it appears in formula text: may carry relative components
/// that still need rebasing against the owning formula's address, per
/// §3.3/§4.3 (`absolutize`).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct CellAddress {
    pub sheet: Option<String>,
    pub col: u32,
    pub row: u32,
    pub col_kind: RefKind,
    pub row_kind: RefKind,
    pub sheet_kind: RefKind,
}

impl CellAddress {
    pub fn absolute(sheet: impl Into<Option<String>>, col: u32, row: u32) -> Self {
        CellAddress {
            sheet: sheet.into(),
            col,
            row,
            col_kind: RefKind::Absolute,
            row_kind: RefKind::Absolute,
            sheet_kind: RefKind::Absolute,
        }
    }

    pub fn relative(col: u32, row: u32) -> Self {
        CellAddress {
            sheet: None,
            col,
            row,
            col_kind: RefKind::Relative,
            row_kind: RefKind::Relative,
            sheet_kind: RefKind::Relative,
        }
    }

    /// Rebase a relative address that was parsed as part of a formula at
    /// `origin` so it resolves correctly for a formula now living at
    /// `target` (used when copying/moving cells). Absolute components are
    /// left untouched, per Excel's `$`-anchor semantics.
    pub fn rebase(&self, origin: SimpleCellAddress, target: SimpleCellAddress) -> CellAddress {
        let drow = target.row as i64 - origin.row as i64;
        let dcol = target.col as i64 - origin.col as i64;
        let row = if self.row_kind.is_absolute() {
            self.row
        } else {
            (self.row as i64 + drow).max(0) as u32
        };
        let col = if self.col_kind.is_absolute() {
            self.col
        } else {
            (self.col as i64 + dcol).max(0) as u32
        };
        CellAddress {
            sheet: self.sheet.clone(),
            col,
            row,
            col_kind: self.col_kind,
            row_kind: self.row_kind,
            sheet_kind: self.sheet_kind,
        }
    }

    /// Resolve against a sheet registry + the formula's own sheet (used
    /// when the reference omits a sheet name).
    pub fn to_simple(&self, default_sheet: SheetId, sheets: &SheetRegistry) -> Result<SimpleCellAddress, FermiError> {
        let sheet = match &self.sheet {
            Some(name) => sheets.id_of(name).ok_or_else(|| FermiError::UnknownSheet(name.clone()))?,
            None => default_sheet,
        };
        Ok(SimpleCellAddress::new(sheet, self.col, self.row))
    }

    /// Parse an A1-style reference, e.g. `"Sheet1!$B$3"` or `"C4"`.
    pub fn parse_a1(text: &str) -> Option<CellAddress> {
        let (sheet, rest) = match text.rsplit_once('!') {
            Some((s, r)) => (Some(strip_sheet_quotes(s)), r),
            None => (None, text),
        };
        let mut chars = rest.char_indices().peekable();
        let col_abs = matches!(chars.peek(), Some((_, '$')));
        if col_abs {
            chars.next();
        }
        let col_start = chars.peek().map(|(i, _)| *i).unwrap_or(rest.len());
        let mut col_end = col_start;
        for (i, c) in chars.clone() {
            if c.is_ascii_alphabetic() {
                col_end = i + c.len_utf8();
                chars.next();
            } else {
                break;
            }
        }
        if col_end == col_start {
            return None;
        }
        let col_letters = rest[col_start..col_end].to_ascii_uppercase();
        let col = letters_to_column(&col_letters)?;

        let row_abs = matches!(chars.peek(), Some((_, '$')));
        if row_abs {
            chars.next();
        }
        let row_start = chars.peek().map(|(i, _)| *i).unwrap_or(rest.len());
        let digits = &rest[row_start..];
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        let row1: u32 = digits.parse().ok()?;
        if row1 == 0 {
            return None;
        }

        Some(CellAddress {
            sheet,
            col,
            row: row1 - 1,
            col_kind: if col_abs { RefKind::Absolute } else { RefKind::Relative },
            row_kind: if row_abs { RefKind::Absolute } else { RefKind::Relative },
            sheet_kind: RefKind::Absolute,
        })
    }
}

fn strip_sheet_quotes(s: &str) -> String {
    s.trim_matches('\'').to_string()
}

impl fmt::Display for CellAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(sheet) = &self.sheet {
            write!(f, "{sheet}!")?;
        }
        if self.col_kind.is_absolute() {
            write!(f, "$")?;
        }
        write!(f, "{}", column_letters(self.col))?;
        if self.row_kind.is_absolute() {
            write!(f, "$")?;
        }
        write!(f, "{}", self.row + 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sheet_registry_stable_ids() {
        let mut reg = SheetRegistry::new();
        let a = reg.get_or_insert("Sheet1");
        let b = reg.get_or_insert("Sheet2");
        assert_eq!(reg.get_or_insert("Sheet1"), a);
        assert_ne!(a, b);
        assert_eq!(reg.name_of(a), Some("Sheet1"));
    }

    #[test]
    fn parse_a1_with_anchors() {
        let addr = CellAddress::parse_a1("$B$3").unwrap();
        assert_eq!(addr.col, 1);
        assert_eq!(addr.row, 2);
        assert!(addr.col_kind.is_absolute());
        assert!(addr.row_kind.is_absolute());
        assert_eq!(addr.to_string(), "$B$3");
    }

    #[test]
    fn parse_a1_with_sheet() {
        let addr = CellAddress::parse_a1("Sheet1!A1").unwrap();
        assert_eq!(addr.sheet.as_deref(), Some("Sheet1"));
        assert_eq!(addr.col, 0);
        assert_eq!(addr.row, 0);
    }

    #[test]
    fn rebase_keeps_absolute_fixed() {
        let origin = SimpleCellAddress::new(0, 0, 0);
        let target = SimpleCellAddress::new(0, 1, 2);
        let rel = CellAddress::relative(0, 2); // $A3-relative, col abs false
        let rebased = rel.rebase(origin, target);
        assert_eq!(rebased.col, 1);
        assert_eq!(rebased.row, 4);

        let abs = CellAddress::absolute(None, 0, 2);
        let rebased_abs = abs.rebase(origin, target);
        assert_eq!(rebased_abs.col, 0);
        assert_eq!(rebased_abs.row, 2);
    }
}
