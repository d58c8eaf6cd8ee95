//! The hash-keyed AST cache (§4.3 "Cache") and dependency absolutisation.

use std::collections::HashMap;

use fermi_common::{AbsoluteCellRange, EngineConfig, FermiError, SheetId, SheetRegistry, SimpleCellAddress};

use crate::ast::{collect_dependencies, Ast, Dep};
use crate::hash::canonical_hash;

/// Functions whose presence makes a formula re-evaluate on every
/// recompute pass regardless of dependency changes (§4.3).
pub const VOLATILE_FNS: &[&str] = &["RAND", "RANDBETWEEN", "NOW", "TODAY"];

/// Functions whose result depends on sheet geometry rather than cell
/// values, so they must be re-evaluated after any structural edit (§4.3).
pub const STRUCTURAL_FNS: &[&str] = &["FORMULATEXT", "ROW", "COLUMN", "ROWS", "COLUMNS"];

fn contains_function(ast: &Ast, names: &[&str]) -> bool {
    match ast {
        Ast::FunctionCall { name, args } => {
            names.iter().any(|n| n.eq_ignore_ascii_case(name)) || args.iter().any(|a| contains_function(a, names))
        }
        Ast::UnaryOp { expr, .. } | Ast::Parenthesis(expr) => contains_function(expr, names),
        Ast::BinaryOp { left, right, .. } => contains_function(left, names) || contains_function(right, names),
        Ast::Array(rows) => rows.iter().flatten().any(|a| contains_function(a, names)),
        _ => false,
    }
}

/// A dependency with its sheet-relative addresses resolved against a
/// specific formula's own address and the workbook's sheet registry.
#[derive(Debug, Clone, PartialEq)]
pub enum ResolvedDep {
    Address(SimpleCellAddress),
    Range(AbsoluteCellRange),
    NamedExpression(String),
}

/// Resolve a relative [`Dep`] extracted from an AST against the owning
/// formula's address (§4.3 "Dependency extraction": `absolutize`).
pub fn absolutize(dep: &Dep, base: SimpleCellAddress, sheets: &SheetRegistry) -> Result<ResolvedDep, FermiError> {
    let resolve_sheet = |name: &Option<String>| -> Result<SheetId, FermiError> {
        match name {
            Some(n) => sheets.id_of(n).ok_or_else(|| FermiError::UnknownSheet(n.clone())),
            None => Ok(base.sheet),
        }
    };

    // `CellAddress.col`/`.row` always hold the literal position as typed;
    // `col_kind`/`row_kind` only matter when the owning formula is later
    // moved (§3.3 `rebase`), not for this initial resolution.
    match dep {
        Dep::Address(addr) => Ok(ResolvedDep::Address(SimpleCellAddress::new(resolve_sheet(&addr.sheet)?, addr.col, addr.row))),
        Dep::CellRange(a, b) => {
            let sheet = resolve_sheet(&a.sheet)?;
            let (sc, ec) = (a.col.min(b.col), a.col.max(b.col));
            let (sr, er) = (a.row.min(b.row), a.row.max(b.row));
            Ok(ResolvedDep::Range(AbsoluteCellRange::new(sheet, sc, sr, ec, er)?))
        }
        Dep::ColumnRange(a, b) => {
            let sheet = resolve_sheet(&a.sheet)?;
            Ok(ResolvedDep::Range(AbsoluteCellRange::infinite_columns(sheet, a.col.min(b.col), a.col.max(b.col))))
        }
        Dep::RowRange(a, b) => {
            let sheet = resolve_sheet(&a.sheet)?;
            Ok(ResolvedDep::Range(AbsoluteCellRange::infinite_rows(sheet, a.row.min(b.row), a.row.max(b.row))))
        }
        Dep::NamedExpression(name) => Ok(ResolvedDep::NamedExpression(name.clone())),
    }
}

/// A parsed formula plus the metadata the evaluator/graph need without
/// re-walking the AST (§4.3 "Cache").
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    pub ast: Ast,
    pub dependencies: Vec<Dep>,
    pub has_volatile_fn: bool,
    pub has_structural_fn: bool,
}

/// `Cache = Map<hash, Entry>` (§4.3). Keyed by the canonical,
/// reference-independent hash so structurally identical formulas at
/// different addresses share one parsed tree.
#[derive(Debug, Default)]
pub struct FormulaCache {
    entries: HashMap<u64, CacheEntry>,
}

impl FormulaCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, hash: u64) -> Option<&CacheEntry> {
        self.entries.get(&hash)
    }

    /// Insert (overwriting any existing entry), computing dependencies and
    /// volatility flags from `ast`.
    pub fn set(&mut self, hash: u64, ast: Ast) -> &CacheEntry {
        let entry = build_entry(ast);
        self.entries.insert(hash, entry);
        self.entries.get(&hash).expect("just inserted")
    }

    /// Insert only if `hash` is absent; returns the (possibly pre-existing)
    /// entry either way.
    pub fn maybe_set_and_get(&mut self, hash: u64, ast: Ast) -> &CacheEntry {
        self.entries.entry(hash).or_insert_with(|| build_entry(ast));
        self.entries.get(&hash).expect("just inserted or present")
    }

    /// Recompute `ast`'s canonical hash and fetch its cache entry if
    /// present, used when reinserting a transformed AST (§4.3).
    pub fn fetch_cached_for_ast(&self, ast: &Ast, origin: SimpleCellAddress, config: &EngineConfig) -> Option<&CacheEntry> {
        let hash = canonical_hash(ast, origin, config);
        self.get(hash)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn build_entry(ast: Ast) -> CacheEntry {
    let dependencies = collect_dependencies(&ast);
    let has_volatile_fn = contains_function(&ast, VOLATILE_FNS);
    let has_structural_fn = contains_function(&ast, STRUCTURAL_FNS);
    CacheEntry {
        ast,
        dependencies,
        has_volatile_fn,
        has_structural_fn,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_formula;

    #[test]
    fn set_computes_volatility_flags() {
        let mut cache = FormulaCache::new();
        let ast = parse_formula("RAND()+1").unwrap();
        let entry = cache.set(1, ast);
        assert!(entry.has_volatile_fn);
        assert!(!entry.has_structural_fn);
    }

    #[test]
    fn maybe_set_and_get_does_not_overwrite() {
        let mut cache = FormulaCache::new();
        let ast1 = parse_formula("1+1").unwrap();
        let ast2 = parse_formula("2+2").unwrap();
        cache.maybe_set_and_get(7, ast1.clone());
        cache.maybe_set_and_get(7, ast2);
        assert_eq!(cache.get(7).unwrap().ast, ast1);
    }

    #[test]
    fn absolutize_resolves_relative_cell_range() {
        let mut sheets = SheetRegistry::new();
        let sheet0 = sheets.get_or_insert("Sheet1");
        let ast = parse_formula("SUM(A1:A3)").unwrap();
        let deps = collect_dependencies(&ast);
        let base = SimpleCellAddress::new(sheet0, 1, 0);
        let resolved = absolutize(&deps[0], base, &sheets).unwrap();
        match resolved {
            ResolvedDep::Range(r) => {
                assert_eq!(r.sheet, sheet0);
                assert_eq!(r.start_row, 0);
                assert_eq!(r.end_row, 2);
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
