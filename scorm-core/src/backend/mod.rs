//! Attempt storage backends

pub mod memory;
pub mod migrations;
pub mod sqlite;
pub mod traits;

pub use memory::MemoryAttemptBackend;
pub use sqlite::SqliteAttemptBackend;
pub use traits::{AttemptBackend, AttemptLease};
