//! Shared data model for the fermi formula engine: rich numbers, cell
//! addresses and ranges, the error taxonomy, engine configuration and the
//! seeded RNG used for Monte-Carlo sampling.

pub mod address;
pub mod config;
pub mod coord;
pub mod error;
pub mod number;
pub mod range;
pub mod rng;
pub mod value;

pub use address::{CellAddress, RefKind, SheetId, SheetRegistry, SimpleCellAddress, SHEET_FOR_WORKBOOK_EXPRESSIONS};
pub use config::{EngineConfig, TranslationPackage};
pub use coord::{column_letters, letters_to_column};
pub use error::{CellError, ErrorKind, FermiError, SimpleRoot};
pub use number::{ConfidenceInterpretation, RichNumber, SampleBuffer};
pub use range::{AbsoluteCellRange, UNBOUNDED};
pub use rng::EngineRng;
pub use value::{SimpleRangeValue, Value};
