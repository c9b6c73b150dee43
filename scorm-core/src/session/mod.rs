//! Session lifecycle: which attempt a launch lands on, and its teardown

mod handle;
mod manager;

pub use handle::SessionHandle;
pub use manager::{OpenRequest, SessionManager};
