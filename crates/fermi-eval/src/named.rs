//! Named expressions (§6.4). Storage and two-level workbook/sheet scoping
//! live in [`crate::graph::DependencyGraph`] (`named`, `named_defined`,
//! `get_or_create_named`, `set_named_value`, `set_named_formula`); this
//! module owns the one thing the graph shouldn't have to know about: what
//! makes a name valid in the first place.

use once_cell::sync::Lazy;
use regex::Regex;

use fermi_common::{FermiError, SheetId, Value};
use fermi_parse::Ast;

use crate::graph::{DependencyGraph, ResolvedDependency};

/// Unicode-aware identifier shape: a leading letter or underscore, then
/// letters, digits, underscores or periods.
static VALID_NAME: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[\p{L}_][\p{L}\p{N}_.]*$").unwrap());

/// A1-style cell reference shape (§6.4): one or more letters followed by
/// one or more digits, e.g. `A1`, `BC204`.
static A1_SHAPED: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z]+[0-9]+$").unwrap());

/// R1C1-style cell reference shape (§6.4): `R`, optional row digits, `C`,
/// optional column digits — matches `RC`, `R1C1`, `R5C`, etc.
static R1C1_SHAPED: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[rR][0-9]*[cC][0-9]*$").unwrap());

/// Case-folded form used as the map key so `TaxRate` and `taxrate` collide
/// (§6.4).
pub fn normalise(name: &str) -> String {
    name.to_lowercase()
}

/// Reject names that would be ambiguous with a cell reference, and enforce
/// the identifier shape (§6.4). Does not check for collisions with
/// existing names — that's a caller policy decision (silently overwrite
/// vs. error), not a validity question.
pub fn validate_name(name: &str) -> Result<(), FermiError> {
    if !VALID_NAME.is_match(name) {
        return Err(FermiError::InvalidName(name.to_string()));
    }
    if A1_SHAPED.is_match(name) || R1C1_SHAPED.is_match(name) {
        return Err(FermiError::InvalidName(name.to_string()));
    }
    Ok(())
}

/// Define (or redefine) a named constant value in `scope` (`None` for the
/// workbook-wide scope).
pub fn define_value(graph: &mut DependencyGraph, scope: Option<SheetId>, name: &str, value: Value) -> Result<(), FermiError> {
    validate_name(name)?;
    graph.set_named_value(scope, name, value);
    Ok(())
}

/// Define (or redefine) a named formula in `scope`, wiring its already
/// resolved dependencies the same way a cell formula does.
pub fn define_formula(
    graph: &mut DependencyGraph,
    scope: Option<SheetId>,
    name: &str,
    ast: Ast,
    deps: Vec<ResolvedDependency>,
    has_volatile_fn: bool,
    version: u64,
) -> Result<(), FermiError> {
    validate_name(name)?;
    graph.set_named_formula(scope, name, ast, deps, has_volatile_fn, version);
    Ok(())
}

/// Remove a name from `scope`. Leaves a placeholder behind if other
/// formulas still reference it, mirroring `DependencyGraph::set_empty`.
pub fn undefine(graph: &mut DependencyGraph, scope: Option<SheetId>, name: &str) {
    graph.undefine_named(scope, name);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_ordinary_identifiers() {
        assert!(validate_name("TaxRate").is_ok());
        assert!(validate_name("_hidden").is_ok());
        assert!(validate_name("my.range").is_ok());
        assert!(validate_name("\u{03c0}_value").is_ok()); // leading Greek letter
    }

    #[test]
    fn rejects_a1_shaped_names() {
        assert!(validate_name("A1").is_err());
        assert!(validate_name("bc204").is_err());
    }

    #[test]
    fn rejects_r1c1_shaped_names() {
        assert!(validate_name("RC").is_err());
        assert!(validate_name("R1C1").is_err());
        assert!(validate_name("r5c").is_err());
    }

    #[test]
    fn rejects_names_starting_with_a_digit_or_containing_spaces() {
        assert!(validate_name("1abc").is_err());
        assert!(validate_name("my name").is_err());
    }

    #[test]
    fn normalise_case_folds() {
        assert_eq!(normalise("TaxRate"), normalise("taxrate"));
    }

    #[test]
    fn undefined_name_reads_back_as_not_defined() {
        let mut graph = DependencyGraph::new();
        let sheet = graph.sheets_mut().get_or_insert("Sheet1");
        assert!(!graph.is_named_defined(Some(sheet), "TaxRate"));
        define_value(&mut graph, Some(sheet), "TaxRate", Value::raw(0.2)).unwrap();
        assert!(graph.is_named_defined(Some(sheet), "TaxRate"));
        undefine(&mut graph, Some(sheet), "TaxRate");
        assert!(!graph.is_named_defined(Some(sheet), "TaxRate"));
    }

    #[test]
    fn invalid_name_is_rejected_before_touching_the_graph() {
        let mut graph = DependencyGraph::new();
        assert!(define_value(&mut graph, None, "A1", Value::raw(1.0)).is_err());
        assert!(!graph.is_named_defined(None, "A1"));
    }
}
