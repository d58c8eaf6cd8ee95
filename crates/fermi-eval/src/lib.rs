//! Arithmetic engine, dependency graph, evaluator, function registry and
//! serialization surface for the fermi formula engine. This crate owns the
//! one supported embedding point: [`engine::Engine`].

pub mod arith;
pub mod builtins;
pub mod engine;
pub mod evaluator;
pub mod function;
pub mod graph;
pub mod named;
pub mod serialize;
pub mod vertex;

pub use engine::{CellChange, Engine, RecomputeReport};
pub use function::{ArgType, FnFlags, FunctionContext, FunctionRegistry, FunctionSpec, ParamSpec};
pub use graph::{DependencyGraph, NodeId};
pub use serialize::{serialize_changes, serialize_value};
pub use vertex::{Vertex, VertexData};
