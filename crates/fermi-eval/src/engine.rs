//! The `Engine` facade (§4.5 public operations, §4.6 recomputation cycle):
//! the one type an embedder actually touches. Owns the dependency graph,
//! the formula cache, the function registry and the seeded RNG, and wires
//! cell-text entry through the parser/cache before handing resolved
//! dependencies to the graph.

use fermi_common::{
    AbsoluteCellRange, EngineConfig, EngineRng, ErrorKind, FermiError, SheetId, SimpleCellAddress, Value,
    SHEET_FOR_WORKBOOK_EXPRESSIONS,
};
use fermi_parse::{absolutize, canonical_hash, Ast, FormulaCache, ResolvedDep};

use crate::evaluator;
use crate::function::{FunctionRegistry, FunctionSpec};
use crate::graph::{DependencyGraph, ResolvedDependency};
use crate::vertex::VertexData;
use crate::{builtins, named};

/// A single cell whose cached value changed during a recompute pass
/// (§4.6 step 3 "enqueue content-change records" / step 5 "exported
/// changes").
#[derive(Debug, Clone, PartialEq)]
pub struct CellChange {
    pub address: SimpleCellAddress,
    pub value: Value,
}

/// The result of one [`Engine::recompute`] pass (§4.6).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecomputeReport {
    pub changed: Vec<CellChange>,
    /// Vertices diagnosed as part of a circular reference this pass.
    pub cycles: usize,
}

/// Headless formula engine: value/distribution arithmetic, dependency
/// graph, parser cache and evaluator bundled behind one owner (§1, §5).
/// `!Sync` by convention — every mutating operation takes `&mut self`.
pub struct Engine {
    graph: DependencyGraph,
    cache: FormulaCache,
    registry: FunctionRegistry,
    config: EngineConfig,
    rng: EngineRng,
    next_version: u64,
}

impl Engine {
    pub fn new(config: EngineConfig) -> Self {
        let mut registry = FunctionRegistry::new();
        builtins::register_builtins(&mut registry);
        let rng = match config.seed {
            Some(seed) => EngineRng::from_seed(seed),
            None => EngineRng::from_entropy(),
        };
        Engine {
            graph: DependencyGraph::new(),
            cache: FormulaCache::new(),
            registry,
            config,
            rng,
            next_version: 0,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn graph(&self) -> &DependencyGraph {
        &self.graph
    }

    pub fn register_function(&mut self, spec: FunctionSpec) {
        self.registry.register(spec);
    }

    fn bump_version(&mut self) -> u64 {
        self.next_version += 1;
        self.next_version
    }

    // ---- sheets --------------------------------------------------------

    pub fn get_or_insert_sheet(&mut self, name: &str) -> SheetId {
        self.graph.sheets_mut().get_or_insert(name)
    }

    pub fn sheet_id(&self, name: &str) -> Option<SheetId> {
        self.graph.sheets().id_of(name)
    }

    // ---- cell entry (§3.5, §4.3) ----------------------------------------

    /// Parse and install `raw_text` at `addr` (§3.5 "Mutation"). Dispatches
    /// to a plain value, a scalar formula, or an array formula depending on
    /// what the text parses to and, for formulas, what its first
    /// evaluation produces (§4.6: "the result may spill into width x
    /// height"). A lexing/parse failure installs a `ParsingError` vertex
    /// rather than returning `Err` — that's a valid, recoverable cell
    /// state, not engine misuse.
    pub fn set_cell_contents(&mut self, addr: SimpleCellAddress, raw_text: &str) -> Result<(), FermiError> {
        let ast = match fermi_parse::parse_cell_content(raw_text) {
            Ok(ast) => ast,
            Err(err) => {
                self.graph.set_parsing_error(addr, raw_text.to_string(), err.to_string());
                return Ok(());
            }
        };

        if is_formula_entry(raw_text) {
            self.install_formula(addr, raw_text, ast)
        } else {
            let value = evaluator::evaluate(&ast, addr, &self.graph, &self.registry, &self.config, &mut self.rng);
            self.graph.set_value(addr, raw_text.to_string(), value);
            Ok(())
        }
    }

    pub fn set_value(&mut self, addr: SimpleCellAddress, value: Value) {
        self.graph.set_value(addr, String::new(), value);
    }

    pub fn set_empty(&mut self, addr: SimpleCellAddress) {
        self.graph.set_empty(addr);
    }

    fn install_formula(&mut self, addr: SimpleCellAddress, raw_text: &str, ast: Ast) -> Result<(), FermiError> {
        let hash = canonical_hash(&ast, addr, &self.config);
        let entry = self.cache.maybe_set_and_get(hash, ast.clone());
        let deps = entry.dependencies.clone();
        let has_volatile_fn = entry.has_volatile_fn;
        let has_structural_fn = entry.has_structural_fn;

        let resolved = self.resolve_dependencies(&deps, addr)?;
        let version = self.bump_version();

        // Probe the shape the formula produces before wiring it in, since
        // whether it spills (and how wide) is only known from evaluating
        // it (§4.6). The probe reads the graph but doesn't touch it, so
        // it's safe to run before the vertex exists.
        let probe = evaluator::evaluate(&ast, addr, &self.graph, &self.registry, &self.config, &mut self.rng);

        if let Value::Range(range) = &probe {
            let (width, height) = (range.width() as u32, range.height() as u32);
            self.graph
                .set_array_formula(addr, ast, width.max(1), height.max(1), resolved, has_volatile_fn, version);
        } else {
            self.graph
                .set_formula(addr, ast, resolved, has_volatile_fn, has_structural_fn, version);
        }
        // Still honour the raw text for formulas so a no-op re-entry with
        // identical text is distinguishable from a structural edit, even
        // though plain `Formula`/`Array` vertices don't themselves carry
        // `raw_text` (only `ParsingError`/`Value` do, per §3.4).
        let _ = raw_text;
        Ok(())
    }

    fn resolve_dependencies(&self, deps: &[fermi_parse::ast::Dep], base: SimpleCellAddress) -> Result<Vec<ResolvedDependency>, FermiError> {
        let mut out = Vec::with_capacity(deps.len());
        for dep in deps {
            let resolved = match dep {
                fermi_parse::ast::Dep::NamedExpression(name) => {
                    let scope = if self.graph.is_named_defined(Some(base.sheet), name) {
                        Some(base.sheet)
                    } else {
                        None
                    };
                    ResolvedDependency::Named(scope, name.clone())
                }
                other => match absolutize(other, base, self.graph.sheets())? {
                    ResolvedDep::Address(addr) => ResolvedDependency::Cell(addr),
                    ResolvedDep::Range(range) => ResolvedDependency::Range(range),
                    ResolvedDep::NamedExpression(name) => ResolvedDependency::Named(None, name),
                },
            };
            out.push(resolved);
        }
        Ok(out)
    }

    // ---- named expressions (§6.4) ----------------------------------------

    pub fn define_name(&mut self, scope: Option<SheetId>, name: &str, value: Value) -> Result<(), FermiError> {
        named::define_value(&mut self.graph, scope, name, value)
    }

    pub fn define_name_formula(&mut self, scope: Option<SheetId>, name: &str, raw_text: &str) -> Result<(), FermiError> {
        let ast = fermi_parse::parse_formula(raw_text.trim_start_matches('=')).map_err(|e| FermiError::Config(e.to_string()))?;
        let base = SimpleCellAddress::new(scope.unwrap_or(SHEET_FOR_WORKBOOK_EXPRESSIONS), 0, 0);
        let hash = canonical_hash(&ast, base, &self.config);
        let entry = self.cache.maybe_set_and_get(hash, ast.clone());
        let deps = entry.dependencies.clone();
        let has_volatile_fn = entry.has_volatile_fn;
        let resolved = self.resolve_dependencies(&deps, base)?;
        let version = self.bump_version();
        named::define_formula(&mut self.graph, scope, name, ast, resolved, has_volatile_fn, version)
    }

    pub fn undefine_name(&mut self, scope: Option<SheetId>, name: &str) {
        named::undefine(&mut self.graph, scope, name);
    }

    // ---- structural edits (§4.5.3) ----------------------------------------

    pub fn add_rows(&mut self, sheet: SheetId, row_start: u32, count: u32) {
        self.graph.add_rows(sheet, row_start, count);
    }

    pub fn add_columns(&mut self, sheet: SheetId, col_start: u32, count: u32) {
        self.graph.add_columns(sheet, col_start, count);
    }

    pub fn remove_rows(&mut self, sheet: SheetId, row_start: u32, count: u32) {
        self.graph.remove_rows(sheet, row_start, count);
    }

    pub fn remove_columns(&mut self, sheet: SheetId, col_start: u32, count: u32) {
        self.graph.remove_columns(sheet, col_start, count);
    }

    pub fn clear_sheet(&mut self, sheet: SheetId) {
        self.graph.clear_sheet(sheet);
    }

    pub fn remove_sheet(&mut self, sheet: SheetId) -> Result<(), FermiError> {
        self.graph.remove_sheet(sheet)
    }

    pub fn move_cells(&mut self, from: AbsoluteCellRange, to: SimpleCellAddress) {
        self.graph.move_cells(from, to);
    }

    // ---- queries ----------------------------------------------------------

    pub fn get_cell(&self, addr: SimpleCellAddress) -> Option<&VertexData> {
        self.graph.get_cell(addr)
    }

    pub fn get_scalar_value(&self, addr: SimpleCellAddress) -> Value {
        self.graph.get_scalar_value(addr)
    }

    pub fn get_sheet_width(&self, sheet: SheetId) -> u32 {
        self.graph.get_sheet_width(sheet)
    }

    pub fn get_sheet_height(&self, sheet: SheetId) -> u32 {
        self.graph.get_sheet_height(sheet)
    }

    // ---- recomputation cycle (§4.6) ---------------------------------------

    /// Run one recomputation pass: collect dirty and volatile vertices,
    /// evaluate them in dependency order, write results back, clear dirty
    /// flags, and report what changed (§4.6 steps 1-5).
    #[tracing::instrument(level = "debug", skip(self))]
    pub fn recompute(&mut self) -> RecomputeReport {
        let to_recompute = self.graph.verts_to_recompute();
        if to_recompute.is_empty() {
            return RecomputeReport::default();
        }

        let order = self.graph.top_sort_with_scc();
        let mut changed = Vec::new();
        let mut cycles = 0usize;

        for scc in order {
            for id in scc {
                if !to_recompute.contains(&id) {
                    continue;
                }
                if self.graph.is_cycle_node(id) {
                    cycles += 1;
                    self.graph.set_cached_value(id, Value::error(ErrorKind::Cycle));
                    if let Some(addr) = self.graph.address_of(id) {
                        changed.push(CellChange { address: addr, value: Value::error(ErrorKind::Cycle) });
                    }
                    continue;
                }

                let Some(node) = self.graph.node(id) else { continue };
                let Some(ast) = node.ast().cloned() else { continue };
                let Some(addr) = self.graph.address_of(id) else { continue };

                tracing::trace!(%addr, "recomputing formula");
                let value = evaluator::evaluate(&ast, addr, &self.graph, &self.registry, &self.config, &mut self.rng);
                self.graph.set_cached_value(id, value.clone());
                changed.push(CellChange { address: addr, value });
            }
        }

        self.graph.clear_dirty();
        tracing::debug!(changed = changed.len(), cycles, "recompute pass complete");
        RecomputeReport { changed, cycles }
    }
}

fn is_formula_entry(raw_text: &str) -> bool {
    fermi_parse::literal::strip_leading_apostrophe(raw_text).is_none() && fermi_parse::literal::is_formula(raw_text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use fermi_common::RichNumber;

    fn engine() -> Engine {
        Engine::new(EngineConfig::new().with_seed(1))
    }

    #[test]
    fn literal_value_round_trips() {
        let mut eng = engine();
        let sheet = eng.get_or_insert_sheet("Sheet1");
        let a1 = SimpleCellAddress::new(sheet, 0, 0);
        eng.set_cell_contents(a1, "42").unwrap();
        assert_eq!(eng.get_scalar_value(a1), Value::raw(42.0));
    }

    #[test]
    fn formula_recomputes_after_dependency_changes() {
        let mut eng = engine();
        let sheet = eng.get_or_insert_sheet("Sheet1");
        let a1 = SimpleCellAddress::new(sheet, 0, 0);
        let b1 = SimpleCellAddress::new(sheet, 1, 0);
        eng.set_cell_contents(a1, "10").unwrap();
        eng.set_cell_contents(b1, "=A1*2").unwrap();
        let report = eng.recompute();
        assert!(!report.changed.is_empty());
        assert_eq!(eng.get_scalar_value(b1), Value::raw(20.0));

        eng.set_cell_contents(a1, "5").unwrap();
        eng.recompute();
        assert_eq!(eng.get_scalar_value(b1), Value::raw(10.0));
    }

    #[test]
    fn circular_reference_surfaces_cycle_error() {
        let mut eng = engine();
        let sheet = eng.get_or_insert_sheet("Sheet1");
        let a1 = SimpleCellAddress::new(sheet, 0, 0);
        let b1 = SimpleCellAddress::new(sheet, 1, 0);
        eng.set_cell_contents(a1, "=B1+1").unwrap();
        eng.set_cell_contents(b1, "=A1+1").unwrap();
        let report = eng.recompute();
        assert!(report.cycles > 0);
        assert_eq!(eng.get_scalar_value(a1), Value::error(ErrorKind::Cycle));
    }

    #[test]
    fn parse_failure_installs_parsing_error_not_err() {
        let mut eng = engine();
        let sheet = eng.get_or_insert_sheet("Sheet1");
        let a1 = SimpleCellAddress::new(sheet, 0, 0);
        assert!(eng.set_cell_contents(a1, "=1+").is_ok());
        assert!(matches!(eng.get_cell(a1), Some(VertexData::ParsingError { .. })));
        assert!(matches!(eng.get_scalar_value(a1), Value::Error(e) if e.kind == ErrorKind::Error));
    }

    #[test]
    fn distribution_literal_samples_immediately() {
        let mut eng = engine();
        let sheet = eng.get_or_insert_sheet("Sheet1");
        let a1 = SimpleCellAddress::new(sheet, 0, 0);
        eng.set_cell_contents(a1, "S(mu=1, sigma2=0.25)").unwrap();
        match eng.get_scalar_value(a1) {
            Value::Number(RichNumber::Sampled(samples)) => assert_eq!(samples.len(), eng.config().sample_size),
            other => panic!("expected sampled value, got {other:?}"),
        }
    }

    #[test]
    fn volatile_function_is_always_in_recompute_set() {
        let mut eng = engine();
        let sheet = eng.get_or_insert_sheet("Sheet1");
        let a1 = SimpleCellAddress::new(sheet, 0, 0);
        eng.set_cell_contents(a1, "=RAND()").unwrap();
        eng.recompute();
        let second = eng.recompute();
        assert_eq!(second.changed.len(), 1);
    }
}
