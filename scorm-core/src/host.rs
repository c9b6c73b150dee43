//! Host callback interface
//!
//! The surrounding player UI registers a [`HostCallbacks`] implementation
//! when it opens a session. Callbacks run inline on the adapter's own call
//! path, so implementations must return quickly and must not call back into
//! the bridge.

use std::sync::Mutex;

use crate::attempt::AttemptStatus;

/// Notifications the adapter delivers to the host
pub trait HostCallbacks: Send + Sync {
    /// A distinct terminal status was reached
    fn on_complete(&self, status: AttemptStatus, score: Option<f64>);

    /// Something needs human attention: lost persistence, refused session
    fn on_error(&self, message: &str);
}

/// Host that ignores every notification
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopHost;

impl HostCallbacks for NoopHost {
    fn on_complete(&self, _status: AttemptStatus, _score: Option<f64>) {}

    fn on_error(&self, _message: &str) {}
}

/// Host that records notifications for later inspection
///
/// Used by tests and by the CLI to print what a player would have shown.
#[derive(Debug, Default)]
pub struct RecordingHost {
    completions: Mutex<Vec<(AttemptStatus, Option<f64>)>>,
    errors: Mutex<Vec<String>>,
}

impl RecordingHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every `on_complete` call so far, oldest first
    pub fn completions(&self) -> Vec<(AttemptStatus, Option<f64>)> {
        self.completions
            .lock()
            .map(|c| c.clone())
            .unwrap_or_default()
    }

    /// Every `on_error` message so far, oldest first
    pub fn errors(&self) -> Vec<String> {
        self.errors.lock().map(|e| e.clone()).unwrap_or_default()
    }
}

impl HostCallbacks for RecordingHost {
    fn on_complete(&self, status: AttemptStatus, score: Option<f64>) {
        if let Ok(mut completions) = self.completions.lock() {
            completions.push((status, score));
        }
    }

    fn on_error(&self, message: &str) {
        if let Ok(mut errors) = self.errors.lock() {
            errors.push(message.to_string());
        }
    }
}
