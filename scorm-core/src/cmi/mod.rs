//! CMI runtime data model: element declarations, validation and the store

pub mod store;
pub mod timespan;
pub mod types;

pub use store::{CmiStore, DirtySnapshot};
pub use types::{Access, CmiSchema, DataType, ElementSpec, ScorePaths, format_decimal, parse_decimal};
