//! Graph vertex storage (§3.4). An arena of [`VertexData`] indexed by
//! [`NodeId`], grounded on the teacher's `engine::graph::Vertex` /
//! `engine::vertex::VertexId` pairing: a plain `Vec` arena plus a newtype
//! index, rather than the teacher's later shard/SoA evolution (`vertex.rs`,
//! `graph_soa.rs`, `csr_edges.rs`) which exists there to support a
//! multi-shard, cache-optimised executor this spec does not call for.

use fermi_common::{AbsoluteCellRange, ErrorKind, SimpleCellAddress, Value};
use fermi_parse::Ast;

/// Index into [`crate::graph::DependencyGraph`]'s vertex arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u32);

impl NodeId {
    pub fn as_index(self) -> usize {
        self.0 as usize
    }
}

/// A literal cell's raw text plus its parsed value, kept side by side so
/// re-parsing on format changes (e.g. a currency symbol edit) doesn't need
/// the original text round-tripped through `Display` (§3.4 `Value(raw,
/// parsed)`).
#[derive(Debug, Clone, PartialEq)]
pub struct RawCell {
    pub raw: String,
    pub value: Value,
}

/// One tagged graph vertex (§3.4). Held behind [`NodeId`] so edges and the
/// address map never hold a borrow into the arena.
#[derive(Debug, Clone)]
pub enum VertexData {
    /// A literal value cell.
    Value(RawCell),
    /// A scalar formula cell.
    Formula {
        address: SimpleCellAddress,
        ast: Ast,
        /// Bumped on every re-parse; lets stale cached dependents notice a
        /// formula edit happened even if its hash collided by coincidence.
        version: u64,
        cached_value: Value,
    },
    /// An array formula whose result spills into a `width x height`
    /// rectangle anchored at `address` (the "corner").
    Array {
        address: SimpleCellAddress,
        ast: Ast,
        version: u64,
        width: u32,
        height: u32,
        /// Set when the spill rectangle collided with occupied cells; the
        /// corner then evaluates to `Error(Spill)` instead of spilling.
        no_space: bool,
        cached_value: Value,
    },
    /// Created on demand when an empty cell becomes a dependency.
    Empty,
    /// A materialised range dependency (§3.4, §4.5.1).
    Range {
        range: AbsoluteCellRange,
        /// `true` until a sub-range is found to hierarchically share edges
        /// with; while true, edges fan out to every covered cell instead of
        /// through a smaller sub-range vertex.
        brute_force: bool,
        /// The sub-range this range's edges currently route through, when
        /// not brute-force.
        smaller_range: Option<NodeId>,
    },
    /// A cell whose raw text failed to parse as a formula (§4.3 lexing
    /// failure).
    ParsingError { raw_text: String, message: String },
}

impl VertexData {
    /// The value this vertex currently presents to dependents, without
    /// re-evaluating anything (§4.4 step 2 "fetch scalar value").
    pub fn current_value(&self) -> Value {
        match self {
            VertexData::Value(cell) => cell.value.clone(),
            VertexData::Formula { cached_value, .. } => cached_value.clone(),
            VertexData::Array { cached_value, no_space, .. } => {
                if *no_space {
                    Value::error(ErrorKind::Spill)
                } else {
                    cached_value.clone()
                }
            }
            VertexData::Empty => Value::Empty,
            VertexData::Range { .. } => Value::error(ErrorKind::Value),
            VertexData::ParsingError { message, .. } => {
                Value::Error(fermi_common::CellError::new(ErrorKind::Error).with_message(format!("parse error: {message}")))
            }
        }
    }

    pub fn is_formula(&self) -> bool {
        matches!(self, VertexData::Formula { .. } | VertexData::Array { .. })
    }

    pub fn is_range(&self) -> bool {
        matches!(self, VertexData::Range { .. })
    }

    pub fn ast(&self) -> Option<&Ast> {
        match self {
            VertexData::Formula { ast, .. } | VertexData::Array { ast, .. } => Some(ast),
            _ => None,
        }
    }
}

/// Backwards-compatible alias: the engine's public surface talks about
/// "vertices", the arena slot type is `VertexData`.
pub type Vertex = VertexData;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_vertex_yields_empty_value() {
        assert_eq!(VertexData::Empty.current_value(), Value::Empty);
    }

    #[test]
    fn array_with_no_space_surfaces_spill_error() {
        let v = VertexData::Array {
            address: SimpleCellAddress::new(0, 0, 0),
            ast: Ast::Number(1.0),
            version: 1,
            width: 2,
            height: 2,
            no_space: true,
            cached_value: Value::raw(1.0),
        };
        assert_eq!(v.current_value(), Value::error(ErrorKind::Spill));
    }
}
