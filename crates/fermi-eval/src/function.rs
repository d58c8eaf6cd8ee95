//! The function plugin protocol (§6.3): a capability-flagged function
//! descriptor plus the registry the evaluator dispatches through.
//!
//! This is a deliberately plainer cousin of the teacher's
//! `function_registry.rs`/`function.rs` pair: that implementation backs a
//! global `DashMap<(namespace, name), Arc<dyn Function>>` registry with SIMD
//! stripe/arena-based fold contexts built for a vectorized, multi-threaded
//! execution engine. Nothing in this spec calls for that machinery — a
//! single engine instance owns one registry, evaluation is single-threaded
//! per recompute pass (§5), and a function's job is just "take resolved
//! argument values, produce a value". So the registry here is an ordinary
//! `FxHashMap` keyed by uppercased name, and a function is a plain fn
//! pointer rather than a trait object.

use fermi_common::{CellError, ErrorKind, Value};
use rustc_hash::FxHashMap;

/// What shape of value a parameter accepts (§6.3). Used only for
/// documentation/introspection today; the evaluator does not reject calls
/// based on this beyond the lazy-argument flag in [`ParamSpec::lazy`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgType {
    Any,
    Number,
    Text,
    Bool,
    Range,
    Lambda,
}

#[derive(Debug, Clone)]
pub struct ParamSpec {
    pub name: &'static str,
    pub arg_type: ArgType,
    pub optional: bool,
    pub repeating: bool,
}

impl ParamSpec {
    pub const fn required(name: &'static str, arg_type: ArgType) -> Self {
        ParamSpec { name, arg_type, optional: false, repeating: false }
    }

    pub const fn optional(name: &'static str, arg_type: ArgType) -> Self {
        ParamSpec { name, arg_type, optional: true, repeating: false }
    }

    pub const fn repeating(name: &'static str, arg_type: ArgType) -> Self {
        ParamSpec { name, arg_type, optional: true, repeating: true }
    }
}

bitflags::bitflags! {
    /// Function capability flags (§6.3), modelled on the teacher's `FnCaps`
    /// but trimmed to the subset this engine's evaluator actually consults:
    /// whether a call may be cached/shared across identical formulas
    /// (`PURE`), whether it forces re-evaluation on every pass regardless of
    /// dependency changes (`VOLATILE`), and whether scalar arguments should
    /// broadcast across a `Range` argument (`ELEMENTWISE`, §4.4
    /// "Vectorization").
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct FnFlags: u8 {
        const PURE        = 0b0000_0001;
        const VOLATILE     = 0b0000_0010;
        const ELEMENTWISE = 0b0000_0100;
        const REDUCTION    = 0b0000_1000;
        const LAZY_ARGS    = 0b0001_0000;
    }
}

/// Everything a registered function call needs beyond its already-evaluated
/// arguments: engine configuration and a place to report a graph-visible
/// error with the calling cell's address attached.
pub struct FunctionContext<'a> {
    pub config: &'a fermi_common::EngineConfig,
    pub rng: &'a mut fermi_common::EngineRng,
}

pub type FunctionImpl = fn(&[Value], &mut FunctionContext) -> Value;

#[derive(Clone)]
pub struct FunctionSpec {
    pub name: &'static str,
    pub params: &'static [ParamSpec],
    pub flags: FnFlags,
    pub call: FunctionImpl,
}

/// Registry of builtin functions, keyed by uppercased name (§6.3). The
/// evaluator consults `flags` before deciding whether to evaluate arguments
/// eagerly or hand over unevaluated ASTs (the small set of lazy
/// control-flow functions listed in §4.4 bypass this registry entirely and
/// are special-cased in the evaluator instead).
#[derive(Default)]
pub struct FunctionRegistry {
    functions: FxHashMap<String, FunctionSpec>,
}

impl FunctionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, spec: FunctionSpec) {
        self.functions.insert(spec.name.to_ascii_uppercase(), spec);
    }

    pub fn get(&self, name: &str) -> Option<&FunctionSpec> {
        self.functions.get(&name.to_ascii_uppercase())
    }

    pub fn is_volatile(&self, name: &str) -> bool {
        self.get(name).map(|f| f.flags.contains(FnFlags::VOLATILE)).unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.functions.keys().map(|s| s.as_str())
    }
}

/// `#NAME?` for a call to a function that isn't registered.
pub fn unknown_function_error() -> Value {
    Value::Error(CellError::new(ErrorKind::Name).with_message("unknown function"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop(_args: &[Value], _ctx: &mut FunctionContext) -> Value {
        Value::raw(0.0)
    }

    #[test]
    fn registry_lookup_is_case_insensitive() {
        let mut reg = FunctionRegistry::new();
        reg.register(FunctionSpec {
            name: "SUM",
            params: &[ParamSpec::repeating("values", ArgType::Number)],
            flags: FnFlags::PURE.union(FnFlags::ELEMENTWISE),
            call: noop,
        });
        assert!(reg.get("sum").is_some());
        assert!(reg.get("Sum").is_some());
        assert!(reg.get("missing").is_none());
    }

    #[test]
    fn volatile_flag_is_reported() {
        let mut reg = FunctionRegistry::new();
        reg.register(FunctionSpec {
            name: "RAND",
            params: &[],
            flags: FnFlags::VOLATILE,
            call: noop,
        });
        assert!(reg.is_volatile("RAND"));
        assert!(!reg.is_volatile("SUM"));
    }
}
