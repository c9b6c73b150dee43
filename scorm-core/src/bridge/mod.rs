//! The API object exposed to content, and where content finds it

pub mod api;
pub mod errors;
pub mod frames;

pub use api::{ApiBridge, BridgeState, SharedBridge};
pub use errors::ErrorReporter;
pub use frames::{AttachedApi, FrameId, FrameRegistry, MAX_DISCOVERY_HOPS};
