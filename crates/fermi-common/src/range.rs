//! Rectangular cell ranges (§3.3), including first-class infinite
//! column/row ranges (`A:A`, `1:1`).

use std::fmt;

use crate::address::{SheetId, SimpleCellAddress};
use crate::error::FermiError;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Sentinel marking an unbounded row or column in an infinite range.
pub const UNBOUNDED: u32 = u32::MAX;

/// An inclusive rectangular range of cells on one sheet. `end.col`/`end.row`
/// may be [`UNBOUNDED`] for infinite column/row ranges (§3.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct AbsoluteCellRange {
    pub sheet: SheetId,
    pub start_col: u32,
    pub start_row: u32,
    pub end_col: u32,
    pub end_row: u32,
}

impl AbsoluteCellRange {
    pub fn new(sheet: SheetId, start_col: u32, start_row: u32, end_col: u32, end_row: u32) -> Result<Self, FermiError> {
        if end_col != UNBOUNDED && start_col > end_col {
            return Err(FermiError::RangeOrder);
        }
        if end_row != UNBOUNDED && start_row > end_row {
            return Err(FermiError::RangeOrder);
        }
        Ok(AbsoluteCellRange {
            sheet,
            start_col,
            start_row,
            end_col,
            end_row,
        })
    }

    pub fn single_cell(addr: SimpleCellAddress) -> Self {
        AbsoluteCellRange {
            sheet: addr.sheet,
            start_col: addr.col,
            start_row: addr.row,
            end_col: addr.col,
            end_row: addr.row,
        }
    }

    /// `A:A`-style infinite column range.
    pub fn infinite_columns(sheet: SheetId, start_col: u32, end_col: u32) -> Self {
        AbsoluteCellRange {
            sheet,
            start_col,
            start_row: 0,
            end_col,
            end_row: UNBOUNDED,
        }
    }

    /// `1:1`-style infinite row range.
    pub fn infinite_rows(sheet: SheetId, start_row: u32, end_row: u32) -> Self {
        AbsoluteCellRange {
            sheet,
            start_col: 0,
            start_row,
            end_col: UNBOUNDED,
            end_row,
        }
    }

    pub fn is_finite(&self) -> bool {
        self.end_col != UNBOUNDED && self.end_row != UNBOUNDED
    }

    pub fn start(&self) -> SimpleCellAddress {
        SimpleCellAddress::new(self.sheet, self.start_col, self.start_row)
    }

    pub fn end(&self) -> SimpleCellAddress {
        SimpleCellAddress::new(self.sheet, self.end_col, self.end_row)
    }

    pub fn width(&self) -> u32 {
        self.end_col.wrapping_sub(self.start_col).wrapping_add(1)
    }

    pub fn height(&self) -> u32 {
        self.end_row.wrapping_sub(self.start_row).wrapping_add(1)
    }

    pub fn contains_addr(&self, addr: SimpleCellAddress) -> bool {
        addr.sheet == self.sheet
            && addr.col >= self.start_col
            && (self.end_col == UNBOUNDED || addr.col <= self.end_col)
            && addr.row >= self.start_row
            && (self.end_row == UNBOUNDED || addr.row <= self.end_row)
    }

    /// True if `other` is entirely contained within `self` (used to find the
    /// largest already-installed sub-range during §4.5.1 range installation).
    pub fn contains_range(&self, other: &AbsoluteCellRange) -> bool {
        if self.sheet != other.sheet {
            return false;
        }
        // An UNBOUNDED upper bound on `self` always satisfies the check; an
        // UNBOUNDED upper bound on `other` only fits inside an equally
        // unbounded `self`.
        let col_upper_ok = self.end_col == UNBOUNDED || (other.end_col != UNBOUNDED && other.end_col <= self.end_col);
        let row_upper_ok = self.end_row == UNBOUNDED || (other.end_row != UNBOUNDED && other.end_row <= self.end_row);
        other.start_col >= self.start_col && other.start_row >= self.start_row && col_upper_ok && row_upper_ok
    }

    pub fn intersect(&self, other: &AbsoluteCellRange) -> Option<AbsoluteCellRange> {
        if self.sheet != other.sheet {
            return None;
        }
        let start_col = self.start_col.max(other.start_col);
        let start_row = self.start_row.max(other.start_row);
        let end_col = min_unbounded(self.end_col, other.end_col);
        let end_row = min_unbounded(self.end_row, other.end_row);
        if end_col != UNBOUNDED && start_col > end_col {
            return None;
        }
        if end_row != UNBOUNDED && start_row > end_row {
            return None;
        }
        Some(AbsoluteCellRange {
            sheet: self.sheet,
            start_col,
            start_row,
            end_col,
            end_row,
        })
    }

    /// Row-major iterator over every address in a **finite** range. Panics
    /// if called on an infinite range — callers must materialise those
    /// against the sheet's used-range first.
    pub fn addresses(&self) -> impl Iterator<Item = SimpleCellAddress> + '_ {
        assert!(self.is_finite(), "cannot iterate an infinite range directly");
        let sheet = self.sheet;
        (self.start_row..=self.end_row)
            .flat_map(move |row| (self.start_col..=self.end_col).map(move |col| SimpleCellAddress::new(sheet, col, row)))
    }
}

fn min_unbounded(a: u32, b: u32) -> u32 {
    if a == UNBOUNDED {
        b
    } else if b == UNBOUNDED {
        a
    } else {
        a.min(b)
    }
}

impl fmt::Display for AbsoluteCellRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.start(), self.end())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finite_range_iterates_row_major() {
        let r = AbsoluteCellRange::new(0, 0, 0, 1, 1).unwrap();
        let addrs: Vec<_> = r.addresses().map(|a| (a.col, a.row)).collect();
        assert_eq!(addrs, vec![(0, 0), (1, 0), (0, 1), (1, 1)]);
    }

    #[test]
    fn sub_range_containment() {
        let big = AbsoluteCellRange::new(0, 0, 0, 0, 9).unwrap(); // A1:A10
        let small = AbsoluteCellRange::new(0, 0, 0, 0, 4).unwrap(); // A1:A5
        assert!(big.contains_range(&small));
        assert!(!small.contains_range(&big));
    }

    #[test]
    fn infinite_column_contains_any_row() {
        let col = AbsoluteCellRange::infinite_columns(0, 0, 0); // A:A
        assert!(col.contains_addr(SimpleCellAddress::new(0, 0, 999_999)));
        assert!(!col.contains_addr(SimpleCellAddress::new(0, 1, 0)));
    }

    #[test]
    fn intersect_finite_with_infinite() {
        let col = AbsoluteCellRange::infinite_columns(0, 0, 0);
        let block = AbsoluteCellRange::new(0, 0, 2, 3, 5).unwrap();
        let got = col.intersect(&block).unwrap();
        assert_eq!(got, AbsoluteCellRange::new(0, 0, 2, 0, 5).unwrap());
    }
}
