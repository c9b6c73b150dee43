//! Attempt persistence: background flushing, retry and the replay queue

pub mod replay;
pub mod retry;
pub mod sync;

pub use replay::{DrainReport, ReplayEntry, ReplayQueue};
pub use retry::RetryPolicy;
pub use sync::{CommitRequest, LeaseOptions, PersistenceSynchronizer, SyncOptions, Termination};
