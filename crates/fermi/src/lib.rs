//! Meta crate that re-exports the fermi formula engine's building blocks
//! with sensible defaults. Downstream users can depend on this crate alone
//! and opt into specific layers via feature flags, while still reaching the
//! underlying crates directly when deeper integration is required.

#[cfg(feature = "common")]
pub use fermi_common as common;

#[cfg(feature = "parse")]
pub use fermi_parse as parse;

#[cfg(feature = "eval")]
pub use fermi_eval as eval;

#[cfg(feature = "eval")]
pub use fermi_eval::{CellChange, Engine, RecomputeReport};

#[cfg(feature = "common")]
pub use fermi_common::{CellError, EngineConfig, ErrorKind, RichNumber, SimpleCellAddress, Value};

/// Install a `tracing-subscriber` formatter reading `RUST_LOG` (or `info` if
/// unset). Intended for binaries embedding the engine; library users are
/// expected to configure their own subscriber.
#[cfg(feature = "tracing")]
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
