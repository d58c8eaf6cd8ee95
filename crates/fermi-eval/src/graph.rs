//! The dependency graph (§4.5): an arena of [`VertexData`] indexed by
//! [`NodeId`] with `HashSet<NodeId>` adjacency, per the explicit design
//! note in §9 ("Reference-counted / cyclic graphs"). Owns the sheet
//! registry too, since structural edits (§4.5.3) mutate sheet geometry and
//! graph wiring together.

use rustc_hash::{FxHashMap, FxHashSet};

use fermi_common::{AbsoluteCellRange, ErrorKind, SheetId, SheetRegistry, SimpleCellAddress, Value, UNBOUNDED};
use fermi_parse::Ast;

pub use crate::vertex::{NodeId, RawCell, Vertex, VertexData};

/// Everything `set_formula` needs to wire dependency edges, already
/// absolutised against the formula's own address (§4.3 "Dependency
/// extraction", `absolutize`).
#[derive(Debug, Clone)]
pub enum ResolvedDependency {
    Cell(SimpleCellAddress),
    Range(AbsoluteCellRange),
    Named(Option<SheetId>, String),
}

/// The dependency graph over cells, ranges, array formulas and named
/// expressions (§3.4, §4.5).
pub struct DependencyGraph {
    sheets: SheetRegistry,
    vertices: Vec<Option<VertexData>>,
    /// `forward[dep]` = the set of vertices that depend on `dep` (edge
    /// `dep -> dependent`, §4.5 invariant).
    forward: Vec<FxHashSet<NodeId>>,
    /// `backward[v]` = the set of `v`'s own dependencies; kept so a
    /// formula can be rewired (old edges dropped) without re-deriving them
    /// from a stale AST.
    backward: Vec<FxHashSet<NodeId>>,
    addresses: FxHashMap<SimpleCellAddress, NodeId>,
    /// Exact-range lookup so re-referencing the same range doesn't
    /// allocate a second vertex.
    ranges_by_range: FxHashMap<AbsoluteCellRange, NodeId>,
    /// Every range vertex, for the linear containment scan §4.5.1
    /// describes (`find_smaller_range`). Kept as a flat list rather than
    /// an interval tree: this engine's size budget doesn't call for one.
    range_vertices: Vec<NodeId>,
    infinite_range_vertices: Vec<NodeId>,
    named: FxHashMap<(Option<SheetId>, String), NodeId>,
    /// Names that have actually been defined via `set_named_value`, as
    /// opposed to a placeholder created by `get_or_create_named` when a
    /// formula references a name nobody has defined yet (§6.4: an
    /// undefined name must keep reading back `#NAME?`, not `Empty`).
    named_defined: FxHashSet<(Option<SheetId>, String)>,
    dirty: FxHashSet<NodeId>,
    volatile: FxHashSet<NodeId>,
    structural_dependent: FxHashSet<NodeId>,
    /// Vertices diagnosed as part of a non-trivial SCC by the last
    /// `top_sort_with_scc` call (§4.5.2); the evaluator sets these
    /// directly to `Error(Cycle)` rather than evaluating their AST.
    cycle_nodes: FxHashSet<NodeId>,
}

impl Default for DependencyGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl DependencyGraph {
    pub fn new() -> Self {
        DependencyGraph {
            sheets: SheetRegistry::new(),
            vertices: Vec::new(),
            forward: Vec::new(),
            backward: Vec::new(),
            addresses: FxHashMap::default(),
            ranges_by_range: FxHashMap::default(),
            range_vertices: Vec::new(),
            infinite_range_vertices: Vec::new(),
            named: FxHashMap::default(),
            named_defined: FxHashSet::default(),
            dirty: FxHashSet::default(),
            volatile: FxHashSet::default(),
            structural_dependent: FxHashSet::default(),
            cycle_nodes: FxHashSet::default(),
        }
    }

    pub fn sheets(&self) -> &SheetRegistry {
        &self.sheets
    }

    pub fn sheets_mut(&mut self) -> &mut SheetRegistry {
        &mut self.sheets
    }

    pub fn node(&self, id: NodeId) -> Option<&VertexData> {
        self.vertices.get(id.as_index()).and_then(|o| o.as_ref())
    }

    pub fn node_mut(&mut self, id: NodeId) -> Option<&mut VertexData> {
        self.vertices.get_mut(id.as_index()).and_then(|o| o.as_mut())
    }

    pub fn is_cycle_node(&self, id: NodeId) -> bool {
        self.cycle_nodes.contains(&id)
    }

    pub fn is_volatile(&self, id: NodeId) -> bool {
        self.volatile.contains(&id)
    }

    pub fn dependents_of(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.forward.get(id.as_index()).into_iter().flatten().copied()
    }

    pub fn dependencies_of(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.backward.get(id.as_index()).into_iter().flatten().copied()
    }

    fn alloc(&mut self, data: VertexData) -> NodeId {
        let id = NodeId(self.vertices.len() as u32);
        self.vertices.push(Some(data));
        self.forward.push(FxHashSet::default());
        self.backward.push(FxHashSet::default());
        id
    }

    fn add_edge(&mut self, dep: NodeId, dependent: NodeId) {
        self.forward[dep.as_index()].insert(dependent);
        self.backward[dependent.as_index()].insert(dep);
    }

    /// Drop every incoming edge of `id` (used before rewiring a formula
    /// that's being overwritten with a new AST, §3.5 "Mutation").
    fn clear_incoming(&mut self, id: NodeId) {
        let deps: Vec<NodeId> = self.backward[id.as_index()].drain().collect();
        for dep in deps {
            self.forward[dep.as_index()].remove(&id);
            self.reclaim_if_orphan_empty(dep);
        }
    }

    /// An `Empty` vertex exists as a vertex iff it has >= 1 dependent
    /// (§3.4, §8.1 "Empty invariant"). Called after removing edges to
    /// reclaim placeholders nobody references any more.
    fn reclaim_if_orphan_empty(&mut self, id: NodeId) {
        let is_empty = matches!(self.node(id), Some(VertexData::Empty));
        if is_empty && self.forward[id.as_index()].is_empty() {
            if let Some(addr) = self.addresses.iter().find(|(_, &v)| v == id).map(|(a, _)| *a) {
                self.addresses.remove(&addr);
            }
            self.vertices[id.as_index()] = None;
        }
    }

    /// Fetch the vertex at `addr`, creating an `Empty` placeholder if it
    /// doesn't exist yet (§3.4: created on demand when referenced).
    pub fn get_or_create_cell(&mut self, addr: SimpleCellAddress) -> NodeId {
        if let Some(&id) = self.addresses.get(&addr) {
            return id;
        }
        let id = self.alloc(VertexData::Empty);
        self.addresses.insert(addr, id);
        id
    }

    // ---- mutation (§3.5, §4.5 public operations) ----------------------

    pub fn set_value(&mut self, addr: SimpleCellAddress, raw: String, value: Value) -> NodeId {
        let id = self.install_cell(addr, VertexData::Value(RawCell { raw, value }));
        self.mark_dirty_transitive(id);
        id
    }

    pub fn set_parsing_error(&mut self, addr: SimpleCellAddress, raw_text: String, message: String) -> NodeId {
        let id = self.install_cell(addr, VertexData::ParsingError { raw_text, message });
        self.mark_dirty_transitive(id);
        id
    }

    pub fn set_empty(&mut self, addr: SimpleCellAddress) {
        let Some(&id) = self.addresses.get(&addr) else { return };
        self.clear_incoming(id);
        self.volatile.remove(&id);
        self.structural_dependent.remove(&id);
        if self.forward[id.as_index()].is_empty() {
            self.addresses.remove(&addr);
            self.vertices[id.as_index()] = None;
        } else {
            // Still has dependents: becomes a placeholder rather than
            // disappearing (§3.5 "Destruction").
            self.vertices[id.as_index()] = Some(VertexData::Empty);
            self.mark_dirty_transitive(id);
        }
    }

    /// Install a scalar formula and wire its dependency edges (§3.5,
    /// §4.5.1). `deps` are resolved (absolutised) dependencies, not raw
    /// AST deps — callers go through [`crate::evaluator::install_formula`]
    /// or resolve with `fermi_parse::absolutize` themselves.
    pub fn set_formula(
        &mut self,
        addr: SimpleCellAddress,
        ast: Ast,
        deps: Vec<ResolvedDependency>,
        has_volatile_fn: bool,
        has_structural_fn: bool,
        version: u64,
    ) -> NodeId {
        let id = self.install_cell(
            addr,
            VertexData::Formula { address: addr, ast, version, cached_value: Value::Empty },
        );
        self.wire_dependencies(id, &deps);
        if has_volatile_fn {
            self.volatile.insert(id);
        } else {
            self.volatile.remove(&id);
        }
        if has_structural_fn {
            self.structural_dependent.insert(id);
        } else {
            self.structural_dependent.remove(&id);
        }
        self.mark_dirty_transitive(id);
        id
    }

    /// Install an array formula anchored at `addr`, spilling into
    /// `width x height`. Non-corner cells in the rectangle map to the same
    /// [`NodeId`] (§3.4 "Array vertex invariants"); `no_space` is computed
    /// here from whatever already occupies the rectangle (§4.6 "Spill").
    pub fn set_array_formula(
        &mut self,
        addr: SimpleCellAddress,
        ast: Ast,
        width: u32,
        height: u32,
        deps: Vec<ResolvedDependency>,
        has_volatile_fn: bool,
        version: u64,
    ) -> NodeId {
        let mut no_space = false;
        for row in 0..height {
            for col in 0..width {
                if row == 0 && col == 0 {
                    continue;
                }
                let cell = SimpleCellAddress::new(addr.sheet, addr.col + col, addr.row + row);
                if let Some(&existing) = self.addresses.get(&cell) {
                    if !matches!(self.node(existing), Some(VertexData::Empty)) {
                        no_space = true;
                    }
                }
            }
        }

        let id = self.install_cell(
            addr,
            VertexData::Array { address: addr, ast, version, width, height, no_space, cached_value: Value::Empty },
        );

        if !no_space {
            for row in 0..height {
                for col in 0..width {
                    if row == 0 && col == 0 {
                        continue;
                    }
                    let cell = SimpleCellAddress::new(addr.sheet, addr.col + col, addr.row + row);
                    if let Some(&old) = self.addresses.get(&cell) {
                        if old != id {
                            self.clear_incoming(old);
                            self.reclaim_if_orphan_empty(old);
                        }
                    }
                    self.addresses.insert(cell, id);
                }
            }
        }

        self.wire_dependencies(id, &deps);
        if has_volatile_fn {
            self.volatile.insert(id);
        }
        self.mark_dirty_transitive(id);
        id
    }

    fn install_cell(&mut self, addr: SimpleCellAddress, data: VertexData) -> NodeId {
        if let Some(&old) = self.addresses.get(&addr) {
            self.clear_incoming(old);
            self.volatile.remove(&old);
            self.structural_dependent.remove(&old);
            self.vertices[old.as_index()] = Some(data);
            return old;
        }
        let id = self.alloc(data);
        self.addresses.insert(addr, id);
        // A brand new addressed cell may fall inside an already-installed
        // infinite range (spec.md:186/192) — wire it in now rather than
        // waiting for the range to be re-installed.
        self.correct_infinite_ranges_dependency(addr);
        id
    }

    fn wire_dependencies(&mut self, formula_id: NodeId, deps: &[ResolvedDependency]) {
        for dep in deps {
            let dep_id = match dep {
                ResolvedDependency::Cell(addr) => self.get_or_create_cell(*addr),
                ResolvedDependency::Range(range) => self.install_range(*range),
                ResolvedDependency::Named(sheet, name) => self.get_or_create_named(*sheet, name),
            };
            self.add_edge(dep_id, formula_id);
        }
    }

    // ---- named expressions (§6.4) --------------------------------------

    pub fn get_or_create_named(&mut self, scope: Option<SheetId>, name: &str) -> NodeId {
        let key = (scope, name.to_ascii_lowercase());
        if let Some(&id) = self.named.get(&key) {
            return id;
        }
        let id = self.alloc(VertexData::Empty);
        self.named.insert(key, id);
        id
    }

    pub fn set_named_value(&mut self, scope: Option<SheetId>, name: &str, value: Value) {
        let id = self.get_or_create_named(scope, name);
        self.vertices[id.as_index()] = Some(VertexData::Value(RawCell { raw: String::new(), value }));
        self.named_defined.insert((scope, name.to_ascii_lowercase()));
        self.mark_dirty_transitive(id);
    }

    /// Install a named formula (as opposed to a plain value, §6.4) and wire
    /// its dependency edges, the named-expression counterpart to
    /// `set_formula`.
    pub fn set_named_formula(
        &mut self,
        scope: Option<SheetId>,
        name: &str,
        ast: Ast,
        deps: Vec<ResolvedDependency>,
        has_volatile_fn: bool,
        version: u64,
    ) -> NodeId {
        let id = self.get_or_create_named(scope, name);
        let address = SimpleCellAddress::new(scope.unwrap_or(0), 0, 0);
        self.vertices[id.as_index()] = Some(VertexData::Formula { address, ast, version, cached_value: Value::Empty });
        self.wire_dependencies(id, &deps);
        if has_volatile_fn {
            self.volatile.insert(id);
        } else {
            self.volatile.remove(&id);
        }
        self.named_defined.insert((scope, name.to_ascii_lowercase()));
        self.mark_dirty_transitive(id);
        id
    }

    pub fn named_node(&self, scope: Option<SheetId>, name: &str) -> Option<NodeId> {
        self.named.get(&(scope, name.to_ascii_lowercase())).copied()
    }

    /// Whether `name` has been explicitly defined in `scope`, as opposed to
    /// merely existing as a placeholder because some formula references it
    /// (§6.4).
    pub fn is_named_defined(&self, scope: Option<SheetId>, name: &str) -> bool {
        self.named_defined.contains(&(scope, name.to_ascii_lowercase()))
    }

    /// Remove a named expression definition. The vertex itself is only
    /// dropped if nothing still depends on it (mirrors `set_empty`).
    pub fn undefine_named(&mut self, scope: Option<SheetId>, name: &str) {
        let key = (scope, name.to_ascii_lowercase());
        self.named_defined.remove(&key);
        if let Some(&id) = self.named.get(&key) {
            self.clear_incoming(id);
            if self.forward[id.as_index()].is_empty() {
                self.named.remove(&key);
                self.vertices[id.as_index()] = None;
            } else {
                self.vertices[id.as_index()] = Some(VertexData::Empty);
                self.mark_dirty_transitive(id);
            }
        }
    }

    // ---- range installation (§4.5.1) -----------------------------------

    /// Look up or create the vertex for `range`, wiring hierarchical edges
    /// to the largest already-installed sub-range when one exists, or
    /// fanning out brute-force edges to every covered cell otherwise.
    pub fn install_range(&mut self, range: AbsoluteCellRange) -> NodeId {
        if let Some(&id) = self.ranges_by_range.get(&range) {
            return id;
        }

        let smaller = self.find_smaller_range(&range);
        let id = self.alloc(VertexData::Range { range, brute_force: smaller.is_none(), smaller_range: smaller });
        self.ranges_by_range.insert(range, id);
        self.range_vertices.push(id);
        if !range.is_finite() {
            self.infinite_range_vertices.push(id);
        }

        match smaller {
            Some(s) => {
                self.add_edge(s, id);
                for addr in cells_only_in(&range, &self.range_of(s)) {
                    let cell_id = self.get_or_create_cell(addr);
                    self.add_edge(cell_id, id);
                }
            }
            None if range.is_finite() => {
                for addr in range.addresses() {
                    let cell_id = self.get_or_create_cell(addr);
                    self.add_edge(cell_id, id);
                }
            }
            None => {
                // Infinite range: wire only cells already present on the
                // sheet that fall inside it; newly-touched cells are
                // connected on the fly by `correct_infinite_ranges_dependency`.
                let touched: Vec<SimpleCellAddress> =
                    self.addresses.keys().filter(|a| range.contains_addr(**a)).copied().collect();
                for addr in touched {
                    let cell_id = self.get_or_create_cell(addr);
                    self.add_edge(cell_id, id);
                }
            }
        }

        self.upgrade_existing_ranges_through(id, &range);
        id
    }

    fn range_of(&self, id: NodeId) -> AbsoluteCellRange {
        match self.node(id) {
            Some(VertexData::Range { range, .. }) => *range,
            _ => unreachable!("range_of called on non-range vertex"),
        }
    }

    /// The largest already-installed range strictly contained in `range`
    /// (§4.5.1 `find_smaller_range`).
    fn find_smaller_range(&self, range: &AbsoluteCellRange) -> Option<NodeId> {
        self.range_vertices
            .iter()
            .copied()
            .filter(|&id| {
                let r = self.range_of(id);
                r != *range && range.contains_range(&r)
            })
            .max_by_key(|&id| {
                let r = self.range_of(id);
                area(&r)
            })
    }

    /// When a newly-installed range `new` turns out to be a sub-range of
    /// an already brute-force range `r`, rewire `r` to route through `new`
    /// instead of its direct cell edges (§4.5.1: "if a sub-range now
    /// exists, remove the brute-force cell edges and install the
    /// hierarchical edge").
    fn upgrade_existing_ranges_through(&mut self, new_id: NodeId, new_range: &AbsoluteCellRange) {
        let candidates: Vec<NodeId> = self
            .range_vertices
            .iter()
            .copied()
            .filter(|&id| id != new_id)
            .filter(|&id| {
                let r = self.range_of(id);
                r != *new_range && r.contains_range(new_range)
            })
            .collect();

        for r_id in candidates {
            let (r_range, currently_brute, current_smaller) = match self.node(r_id) {
                Some(VertexData::Range { range, brute_force, smaller_range }) => (*range, *brute_force, *smaller_range),
                _ => continue,
            };
            let should_upgrade = currently_brute
                || current_smaller.map(|s| area(new_range) > area(&self.range_of(s))).unwrap_or(false);
            if !should_upgrade {
                continue;
            }
            if currently_brute && r_range.is_finite() {
                for addr in r_range.addresses() {
                    if let Some(&cell_id) = self.addresses.get(&addr) {
                        self.forward[cell_id.as_index()].remove(&r_id);
                        self.backward[r_id.as_index()].remove(&cell_id);
                        self.reclaim_if_orphan_empty(cell_id);
                    }
                }
            } else if let Some(old_smaller) = current_smaller {
                self.forward[old_smaller.as_index()].remove(&r_id);
                self.backward[r_id.as_index()].remove(&old_smaller);
            }
            self.add_edge(new_id, r_id);
            if let Some(VertexData::Range { brute_force, smaller_range, .. }) = self.node_mut(r_id) {
                *brute_force = false;
                *smaller_range = Some(new_id);
            }
        }
    }

    /// Wire a newly-touched cell into any infinite range that covers it
    /// (§4.5 `correct_infinite_ranges_dependency`). Call after inserting a
    /// new addressed cell.
    pub fn correct_infinite_ranges_dependency(&mut self, addr: SimpleCellAddress) {
        let matching: Vec<NodeId> = self
            .infinite_range_vertices
            .iter()
            .copied()
            .filter(|&id| self.range_of(id).contains_addr(addr))
            .collect();
        if matching.is_empty() {
            return;
        }
        let cell_id = self.get_or_create_cell(addr);
        for range_id in matching {
            self.add_edge(cell_id, range_id);
            self.mark_dirty_transitive(range_id);
        }
    }

    // ---- querying (§4.5 query methods) ----------------------------------

    pub fn get_cell(&self, addr: SimpleCellAddress) -> Option<&VertexData> {
        self.addresses.get(&addr).and_then(|id| self.node(*id))
    }

    /// Fetch the value a dependent sees when it reads `addr`. Array
    /// vertices alias every cell in their spill rectangle to one `NodeId`
    /// (§3.4 "Array vertex invariants"), so a plain `current_value()` would
    /// hand back the whole result to every cell in the rectangle; this
    /// indexes into it by `addr`'s offset from the array's corner instead.
    pub fn get_scalar_value(&self, addr: SimpleCellAddress) -> Value {
        match self.addresses.get(&addr).and_then(|id| self.node(*id)) {
            Some(VertexData::Array { address, cached_value, no_space, width, height, .. }) => {
                if *no_space {
                    return Value::error(ErrorKind::Spill);
                }
                let col_off = addr.col.wrapping_sub(address.col);
                let row_off = addr.row.wrapping_sub(address.row);
                if col_off >= *width || row_off >= *height {
                    return Value::Empty;
                }
                match cached_value {
                    Value::Range(r) => r.get(col_off as usize, row_off as usize).cloned().unwrap_or(Value::Empty),
                    scalar if col_off == 0 && row_off == 0 => scalar.clone(),
                    _ => Value::Empty,
                }
            }
            Some(v) => v.current_value(),
            None => Value::Empty,
        }
    }

    pub fn get_sheet_width(&self, sheet: SheetId) -> u32 {
        self.addresses.keys().filter(|a| a.sheet == sheet).map(|a| a.col + 1).max().unwrap_or(0)
    }

    pub fn get_sheet_height(&self, sheet: SheetId) -> u32 {
        self.addresses.keys().filter(|a| a.sheet == sheet).map(|a| a.row + 1).max().unwrap_or(0)
    }

    pub fn address_of(&self, id: NodeId) -> Option<SimpleCellAddress> {
        self.addresses.iter().find(|(_, &v)| v == id).map(|(a, _)| *a)
    }

    /// Write a freshly evaluated result back into a formula or array
    /// vertex's `cached_value` (§4.6 step 3, "write results into the
    /// vertex"). A no-op on any other vertex kind, since only those two
    /// carry a cached result to update.
    pub fn set_cached_value(&mut self, id: NodeId, value: Value) {
        if let Some(data) = self.node_mut(id) {
            match data {
                VertexData::Formula { cached_value, .. } | VertexData::Array { cached_value, .. } => {
                    *cached_value = value;
                }
                _ => {}
            }
        }
    }

    // ---- dirty/volatile bookkeeping (§4.5, §4.6) -------------------------

    /// Mark `id` and every transitive dependent dirty (§3.5 "Mutation",
    /// §4.6 step 1).
    pub fn mark_dirty_transitive(&mut self, id: NodeId) {
        let mut stack = vec![id];
        while let Some(n) = stack.pop() {
            if self.dirty.insert(n) {
                stack.extend(self.forward[n.as_index()].iter().copied());
            }
        }
    }

    pub fn clear_dirty(&mut self) {
        self.dirty.clear();
    }

    /// Dirty vertices plus every volatile vertex, regardless of dirty
    /// state (§4.5 invariant: "Volatile vertices are always included"),
    /// closed over transitive dependents so that a volatile vertex's
    /// downstream formulas are re-evaluated alongside it even when no
    /// edit touched them directly (§8.4 scenario 6: "A1 and B1 are
    /// re-evaluated even though their inputs are unchanged").
    pub fn verts_to_recompute(&self) -> FxHashSet<NodeId> {
        let mut out = FxHashSet::default();
        let mut stack: Vec<NodeId> = self.dirty.iter().chain(self.volatile.iter()).copied().collect();
        while let Some(id) = stack.pop() {
            if out.insert(id) {
                if let Some(dependents) = self.forward.get(id.as_index()) {
                    stack.extend(dependents.iter().copied());
                }
            }
        }
        out
    }

    /// Every vertex whose result depends on sheet geometry (§4.3
    /// `has_structural_fn`), marked dirty after a structural edit.
    fn mark_structural_dependents_dirty(&mut self) {
        let ids: Vec<NodeId> = self.structural_dependent.iter().copied().collect();
        for id in ids {
            self.mark_dirty_transitive(id);
        }
    }

    // ---- SCC / cycle detection (§4.5.2) -----------------------------------

    /// Tarjan's algorithm over the `forward` adjacency (`dep -> dependent`
    /// edges), returning SCCs in dependency-first (topological) order.
    /// Any non-trivial SCC (size > 1, or a single vertex with a self-loop)
    /// is recorded in `cycle_nodes` for the evaluator to short-circuit to
    /// `Error(Cycle)` (§4.5.2, §7).
    pub fn top_sort_with_scc(&mut self) -> Vec<Vec<NodeId>> {
        self.cycle_nodes.clear();
        let n = self.vertices.len();
        let mut index: Vec<Option<u32>> = vec![None; n];
        let mut lowlink: Vec<u32> = vec![0; n];
        let mut on_stack: Vec<bool> = vec![false; n];
        let mut stack: Vec<NodeId> = Vec::new();
        let mut next_index: u32 = 0;
        let mut sccs: Vec<Vec<NodeId>> = Vec::new();

        // Explicit work-stack Tarjan to avoid deep recursion on large
        // sheets (§9 arena design note implies no assumption about depth).
        enum Frame {
            Enter(NodeId),
            Exit(NodeId),
        }

        for start in 0..n {
            if self.vertices[start].is_none() || index[start].is_some() {
                continue;
            }
            let mut work = vec![Frame::Enter(NodeId(start as u32))];
            while let Some(frame) = work.pop() {
                match frame {
                    Frame::Enter(v) => {
                        let vi = v.as_index();
                        if index[vi].is_some() {
                            continue;
                        }
                        index[vi] = Some(next_index);
                        lowlink[vi] = next_index;
                        next_index += 1;
                        stack.push(v);
                        on_stack[vi] = true;
                        work.push(Frame::Exit(v));
                        for &w in &self.forward[vi] {
                            let wi = w.as_index();
                            if index[wi].is_none() {
                                work.push(Frame::Enter(w));
                            }
                        }
                    }
                    Frame::Exit(v) => {
                        let vi = v.as_index();
                        // By the time v's Exit frame runs, every neighbour
                        // reachable via a tree edge has already had its own
                        // Exit processed (it was pushed above v's Exit
                        // frame), so `lowlink[w]` is final either way —
                        // folding it in here covers both tree and back
                        // edges without needing a parent pointer.
                        for &w in &self.forward[vi] {
                            let wi = w.as_index();
                            if on_stack[wi] {
                                lowlink[vi] = lowlink[vi].min(lowlink[wi]);
                            }
                        }
                        if lowlink[vi] == index[vi].unwrap() {
                            let mut component = Vec::new();
                            loop {
                                let w = stack.pop().expect("component root must be on stack");
                                on_stack[w.as_index()] = false;
                                component.push(w);
                                if w == v {
                                    break;
                                }
                            }
                            sccs.push(component);
                        }
                    }
                }
            }
        }

        for scc in &sccs {
            if scc.len() > 1 || self.forward[scc[0].as_index()].contains(&scc[0]) {
                for &id in scc {
                    self.cycle_nodes.insert(id);
                }
            }
        }

        // Tarjan completes sink components first (reverse topological
        // order w.r.t. `dep -> dependent` edges); reverse so dependencies
        // are evaluated before their dependents.
        sccs.reverse();
        sccs
    }

    // ---- structural edits (§4.5.3) ----------------------------------------

    /// Insert `count` rows at `row_start` on `sheet`: shifts every cell at
    /// or below `row_start` down, extends ranges that straddle the
    /// insertion point, and marks structural-dependent vertices dirty.
    pub fn add_rows(&mut self, sheet: SheetId, row_start: u32, count: u32) {
        self.shift_axis(sheet, row_start, count as i64, Axis::Row);
        self.extend_ranges_for_insert(sheet, row_start, count, Axis::Row);
        self.mark_structural_dependents_dirty();
    }

    pub fn add_columns(&mut self, sheet: SheetId, col_start: u32, count: u32) {
        self.shift_axis(sheet, col_start, count as i64, Axis::Col);
        self.extend_ranges_for_insert(sheet, col_start, count, Axis::Col);
        self.mark_structural_dependents_dirty();
    }

    pub fn remove_rows(&mut self, sheet: SheetId, row_start: u32, count: u32) {
        self.remove_span(sheet, row_start, count, Axis::Row);
        self.mark_structural_dependents_dirty();
    }

    pub fn remove_columns(&mut self, sheet: SheetId, col_start: u32, count: u32) {
        self.remove_span(sheet, col_start, count, Axis::Col);
        self.mark_structural_dependents_dirty();
    }

    pub fn clear_sheet(&mut self, sheet: SheetId) {
        let addrs: Vec<SimpleCellAddress> = self.addresses.keys().filter(|a| a.sheet == sheet).copied().collect();
        for addr in addrs {
            self.set_empty(addr);
        }
    }

    pub fn remove_sheet(&mut self, sheet: SheetId) -> Result<(), fermi_common::FermiError> {
        self.clear_sheet(sheet);
        self.sheets.remove(sheet)
    }

    /// Move every cell in `from` so its top-left lands at `to`, preserving
    /// relative layout. Implemented as set_empty + re-install at the
    /// shifted address since this engine doesn't track per-formula AST
    /// rebasing versions beyond what `fermi-parse`'s `CellAddress::rebase`
    /// already offers the caller.
    pub fn move_cells(&mut self, from: AbsoluteCellRange, to: SimpleCellAddress) {
        let drow = to.row as i64 - from.start_row as i64;
        let dcol = to.col as i64 - from.start_col as i64;
        let moved: Vec<(SimpleCellAddress, VertexData)> = from
            .addresses()
            .filter_map(|addr| self.addresses.get(&addr).and_then(|id| self.node(*id)).map(|v| (addr, v.clone())))
            .collect();
        for (addr, _) in &moved {
            self.set_empty(*addr);
        }
        for (addr, data) in moved {
            let new_addr = SimpleCellAddress::new(to.sheet, (addr.col as i64 + dcol) as u32, (addr.row as i64 + drow) as u32);
            match data {
                VertexData::Value(cell) => {
                    self.set_value(new_addr, cell.raw, cell.value);
                }
                VertexData::ParsingError { raw_text, message } => {
                    self.set_parsing_error(new_addr, raw_text, message);
                }
                other => {
                    let id = self.install_cell(new_addr, other);
                    self.mark_dirty_transitive(id);
                }
            }
        }
    }

    fn shift_axis(&mut self, sheet: SheetId, start: u32, delta: i64, axis: Axis) {
        let affected: Vec<(SimpleCellAddress, NodeId)> = self
            .addresses
            .iter()
            .filter(|(a, _)| a.sheet == sheet && axis.coord(a) >= start)
            .map(|(a, id)| (*a, *id))
            .collect();
        for (addr, id) in affected {
            self.addresses.remove(&addr);
            let shifted = axis.shifted(addr, delta);
            self.addresses.insert(shifted, id);
            if let Some(data) = self.node_mut(id) {
                match data {
                    VertexData::Formula { address, .. } | VertexData::Array { address, .. } => *address = shifted,
                    _ => {}
                }
            }
            self.mark_dirty_transitive(id);
        }
    }

    fn extend_ranges_for_insert(&mut self, sheet: SheetId, start: u32, count: u32, axis: Axis) {
        let ids: Vec<NodeId> = self.range_vertices.clone();
        for id in ids {
            let range = self.range_of(id);
            if range.sheet != sheet {
                continue;
            }
            if axis.straddles_insert(&range, start) {
                let extended = axis.extend(range, count);
                self.ranges_by_range.remove(&range);
                if let Some(VertexData::Range { range: r, .. }) = self.node_mut(id) {
                    *r = extended;
                }
                self.ranges_by_range.insert(extended, id);
                self.mark_dirty_transitive(id);
            }
        }
    }

    /// Shrink or split ranges that straddle a removed span (§4.5.3
    /// `truncate_ranges`), then drop the removed cells.
    fn remove_span(&mut self, sheet: SheetId, start: u32, count: u32, axis: Axis) {
        let ids: Vec<NodeId> = self.range_vertices.clone();
        for id in &ids {
            let range = self.range_of(*id);
            if range.sheet != sheet {
                continue;
            }
            if let Some(truncated) = axis.truncate(range, start, count) {
                self.ranges_by_range.remove(&range);
                if let Some(VertexData::Range { range: r, .. }) = self.node_mut(*id) {
                    *r = truncated;
                }
                self.ranges_by_range.insert(truncated, *id);
            }
            self.mark_dirty_transitive(*id);
        }

        let to_remove: Vec<SimpleCellAddress> = self
            .addresses
            .keys()
            .filter(|a| a.sheet == sheet && axis.coord(a) >= start && axis.coord(a) < start + count)
            .copied()
            .collect();
        for addr in to_remove {
            self.set_empty(addr);
        }

        self.shift_axis(sheet, start + count, -(count as i64), axis);
    }
}

#[derive(Clone, Copy)]
enum Axis {
    Row,
    Col,
}

impl Axis {
    fn coord(self, addr: &SimpleCellAddress) -> u32 {
        match self {
            Axis::Row => addr.row,
            Axis::Col => addr.col,
        }
    }

    fn shifted(self, addr: SimpleCellAddress, delta: i64) -> SimpleCellAddress {
        match self {
            Axis::Row => SimpleCellAddress::new(addr.sheet, addr.col, (addr.row as i64 + delta).max(0) as u32),
            Axis::Col => SimpleCellAddress::new(addr.sheet, (addr.col as i64 + delta).max(0) as u32, addr.row),
        }
    }

    fn straddles_insert(self, range: &AbsoluteCellRange, start: u32) -> bool {
        match self {
            Axis::Row => range.start_row < start && (range.end_row == UNBOUNDED || range.end_row >= start.saturating_sub(1)),
            Axis::Col => range.start_col < start && (range.end_col == UNBOUNDED || range.end_col >= start.saturating_sub(1)),
        }
    }

    fn extend(self, range: AbsoluteCellRange, count: u32) -> AbsoluteCellRange {
        match self {
            Axis::Row => AbsoluteCellRange {
                end_row: if range.end_row == UNBOUNDED { UNBOUNDED } else { range.end_row + count },
                ..range
            },
            Axis::Col => AbsoluteCellRange {
                end_col: if range.end_col == UNBOUNDED { UNBOUNDED } else { range.end_col + count },
                ..range
            },
        }
    }

    /// Shrink `range` to exclude `[start, start+count)`, or `None` if the
    /// removal doesn't touch it. A range fully inside the removed span
    /// degenerates to a single-cell range clamped at `start`.
    fn truncate(self, range: AbsoluteCellRange, start: u32, count: u32) -> Option<AbsoluteCellRange> {
        let (s, e) = match self {
            Axis::Row => (range.start_row, range.end_row),
            Axis::Col => (range.start_col, range.end_col),
        };
        if e != UNBOUNDED && e < start {
            return None;
        }
        if s >= start + count {
            let ns = s.saturating_sub(count);
            let ne = if e == UNBOUNDED { UNBOUNDED } else { e.saturating_sub(count) };
            return Some(self.with(range, ns, ne));
        }
        if e == UNBOUNDED || e >= start + count {
            let ne = if e == UNBOUNDED { UNBOUNDED } else { e - count };
            return Some(self.with(range, s.min(start), ne.max(s.min(start))));
        }
        Some(self.with(range, s.min(start), start.saturating_sub(1).max(s.min(start))))
    }

    fn with(self, range: AbsoluteCellRange, s: u32, e: u32) -> AbsoluteCellRange {
        match self {
            Axis::Row => AbsoluteCellRange { start_row: s, end_row: e, ..range },
            Axis::Col => AbsoluteCellRange { start_col: s, end_col: e, ..range },
        }
    }
}

fn area(range: &AbsoluteCellRange) -> u64 {
    if !range.is_finite() {
        return u64::MAX;
    }
    range.width() as u64 * range.height() as u64
}

/// Addresses in `outer` that aren't covered by `inner` — the cells a new
/// hierarchical range vertex must wire directly (§4.5.1: "connect only
/// `R \ S`").
fn cells_only_in(outer: &AbsoluteCellRange, inner: &AbsoluteCellRange) -> Vec<SimpleCellAddress> {
    if !outer.is_finite() {
        return Vec::new();
    }
    outer.addresses().filter(|a| !inner.contains_addr(*a)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use fermi_parse::parse_formula;

    fn addr(sheet: SheetId, col: u32, row: u32) -> SimpleCellAddress {
        SimpleCellAddress::new(sheet, col, row)
    }

    #[test]
    fn empty_vertex_created_on_demand_and_reclaimed() {
        let mut g = DependencyGraph::new();
        let sheet = g.sheets_mut().get_or_insert("Sheet1");
        let a1 = addr(sheet, 0, 0);
        let dep = g.get_or_create_cell(a1);
        assert!(matches!(g.node(dep), Some(VertexData::Empty)));

        let formula_addr = addr(sheet, 1, 0);
        g.set_formula(formula_addr, Ast::Number(0.0), vec![ResolvedDependency::Cell(a1)], false, false, 1);
        assert!(g.node(dep).is_some());

        g.set_empty(formula_addr);
        assert!(g.node(dep).is_none(), "orphaned Empty vertex must be reclaimed");
    }

    #[test]
    fn range_hierarchical_sharing_sum_then_subsum() {
        let mut g = DependencyGraph::new();
        let sheet = g.sheets_mut().get_or_insert("Sheet1");
        for row in 0..10 {
            g.set_value(addr(sheet, 0, row), format!("{}", row + 1), Value::raw((row + 1) as f64));
        }
        let big = AbsoluteCellRange::new(sheet, 0, 0, 0, 9).unwrap(); // A1:A10
        let small = AbsoluteCellRange::new(sheet, 0, 0, 0, 4).unwrap(); // A1:A5

        let big_id = g.install_range(big);
        let small_id = g.install_range(small);

        assert!(g.dependents_of(small_id).any(|d| d == big_id), "A1:A5 must have an edge into A1:A10");
        match g.node(big_id) {
            Some(VertexData::Range { smaller_range, .. }) => assert_eq!(*smaller_range, Some(small_id)),
            other => panic!("expected range vertex, got {other:?}"),
        }
    }

    #[test]
    fn two_cell_cycle_is_flagged() {
        let mut g = DependencyGraph::new();
        let sheet = g.sheets_mut().get_or_insert("Sheet1");
        let a1 = addr(sheet, 0, 0);
        let b1 = addr(sheet, 1, 0);

        let ast_a = parse_formula("B1").unwrap();
        let ast_b = parse_formula("A1").unwrap();
        g.set_formula(a1, ast_a, vec![ResolvedDependency::Cell(b1)], false, false, 1);
        g.set_formula(b1, ast_b, vec![ResolvedDependency::Cell(a1)], false, false, 1);

        g.top_sort_with_scc();
        let a1_id = g.addresses[&a1];
        let b1_id = g.addresses[&b1];
        assert!(g.is_cycle_node(a1_id));
        assert!(g.is_cycle_node(b1_id));
    }

    #[test]
    fn volatile_vertex_always_in_recompute_set() {
        let mut g = DependencyGraph::new();
        let sheet = g.sheets_mut().get_or_insert("Sheet1");
        let rand_addr = addr(sheet, 0, 0);
        let id = g.set_formula(rand_addr, parse_formula("RAND()").unwrap(), vec![], true, false, 1);
        g.clear_dirty();
        assert!(g.verts_to_recompute().contains(&id));
    }

    #[test]
    fn volatile_vertex_pulls_in_its_dependents() {
        let mut g = DependencyGraph::new();
        let sheet = g.sheets_mut().get_or_insert("Sheet1");
        let a1 = addr(sheet, 0, 0);
        let b1 = addr(sheet, 1, 0);
        let a1_id = g.set_formula(a1, parse_formula("RAND()").unwrap(), vec![], true, false, 1);
        let b1_id = g.set_formula(b1, parse_formula("A1").unwrap(), vec![ResolvedDependency::Cell(a1)], false, false, 2);
        g.clear_dirty();
        let to_recompute = g.verts_to_recompute();
        assert!(to_recompute.contains(&a1_id));
        assert!(to_recompute.contains(&b1_id));
    }

    #[test]
    fn sum_over_infinite_range_picks_up_a_cell_created_afterwards() {
        let mut g = DependencyGraph::new();
        let sheet = g.sheets_mut().get_or_insert("Sheet1");
        g.set_value(addr(sheet, 0, 0), "1".into(), Value::raw(1.0));

        let whole_column = AbsoluteCellRange::infinite_columns(sheet, 0, 0); // A:A
        let range_id = g.install_range(whole_column);
        g.clear_dirty();

        // A5 is touched only now, after the range vertex already exists.
        let a5 = addr(sheet, 0, 4);
        g.set_value(a5, "5".into(), Value::raw(5.0));

        assert!(g.dependents_of(g.addresses[&a5]).any(|d| d == range_id), "A5 must be wired into A:A");
        assert!(g.dirty.contains(&range_id), "A:A must be marked dirty once a new cell falls inside it");
    }

    #[test]
    fn remove_rows_shifts_cells_down_below_the_cut() {
        let mut g = DependencyGraph::new();
        let sheet = g.sheets_mut().get_or_insert("Sheet1");
        g.set_value(addr(sheet, 0, 0), "1".into(), Value::raw(1.0));
        g.set_value(addr(sheet, 0, 1), "2".into(), Value::raw(2.0));
        g.set_value(addr(sheet, 0, 2), "3".into(), Value::raw(3.0));

        g.remove_rows(sheet, 1, 1); // delete row 2 (0-based index 1)

        assert_eq!(g.get_scalar_value(addr(sheet, 0, 0)), Value::raw(1.0));
        assert_eq!(g.get_scalar_value(addr(sheet, 0, 1)), Value::raw(3.0));
        assert_eq!(g.get_scalar_value(addr(sheet, 0, 2)), Value::Empty);
    }
}
