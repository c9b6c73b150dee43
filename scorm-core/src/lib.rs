//! scorm-core: SCORM 1.2 / 2004 run-time environment adapter
//!
//! This crate sits between SCORM content and a host learning platform:
//!
//! - **API bridge** - [`ApiBridge`] implements the `Initialize` / `GetValue` /
//!   `SetValue` / `Commit` / `Terminate` family with the string-typed wire contract
//! - **CMI data model** - [`CmiStore`] validates and stages element writes
//! - **Dialects** - [`RteDialect`] captures everything that differs between versions
//! - **Persistence** - [`PersistenceSynchronizer`] flushes attempts in the
//!   background, with retry and a durable [`ReplayQueue`]
//! - **Sessions** - [`SessionManager`] resumes or creates attempts and keeps one
//!   live session per learner and package
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use scorm_core::{
//!     MemoryAttemptBackend, NoopHost, OpenRequest, RteConfig, ScormVersion, SessionManager,
//! };
//!
//! async fn example() -> Result<(), Box<dyn std::error::Error>> {
//!     let backend = Arc::new(MemoryAttemptBackend::new());
//!     let manager = SessionManager::from_config(backend, RteConfig::default()).await?;
//!
//!     let session = manager
//!         .open(OpenRequest::new("learner-1", "course-1", ScormVersion::Scorm12), Arc::new(NoopHost))
//!         .await?;
//!     session.invoke("LMSInitialize", &[""]);
//!     session.invoke("LMSSetValue", &["cmi.core.lesson_status", "completed"]);
//!     session.invoke("LMSFinish", &[""]);
//!     session.close().await;
//!     Ok(())
//! }
//! ```
//!
//! # Architecture
//!
//! ```text
//! content ──find_api──▶ FrameRegistry ──▶ ApiBridge ──▶ CmiStore
//!                                            │
//!                               Commit/Terminate snapshot
//!                                            ▼
//!                                PersistenceSynchronizer ──▶ AttemptBackend
//!                                            │ (retries exhausted)
//!                                            ▼
//!                                       ReplayQueue
//! ```

pub mod attempt;
pub mod backend;
pub mod bridge;
pub mod cmi;
pub mod completion;
pub mod config;
pub mod dialect;
pub mod error;
pub mod host;
pub mod persistence;
pub mod session;

// Re-export key types for convenience
pub use attempt::{Attempt, AttemptStatus, LaunchContext, LaunchMode, ScormVersion};
pub use backend::{AttemptBackend, AttemptLease, MemoryAttemptBackend, SqliteAttemptBackend};
pub use bridge::{
    ApiBridge, AttachedApi, BridgeState, ErrorReporter, FrameId, FrameRegistry, SharedBridge,
};
pub use cmi::CmiStore;
pub use completion::{CompletionEvaluator, Evaluation};
pub use config::RteConfig;
pub use dialect::{ApiFunction, ErrorCode, RteDialect, Scorm12, Scorm2004, dialect_for};
pub use error::{
    BackendError, BridgeError, CmiError, ConfigError, FrameError, PersistenceError,
    ProtocolError, ReplayError, RteError, SessionError,
};
pub use host::{HostCallbacks, NoopHost, RecordingHost};
pub use persistence::{LeaseOptions, PersistenceSynchronizer, ReplayQueue, RetryPolicy};
pub use session::{OpenRequest, SessionHandle, SessionManager};
