//! SessionHandle: one live session, from mount to unmount

use std::sync::{Arc, MutexGuard, PoisonError};
use std::time::Duration;

use tracing::{debug, warn};

use super::manager::SlotGuard;
use crate::attempt::Attempt;
use crate::bridge::{ApiBridge, AttachedApi, BridgeState, FrameId, FrameRegistry, SharedBridge};
use crate::error::FrameError;
use crate::persistence::PersistenceSynchronizer;

/// A live session returned by [`super::SessionManager::open`]
///
/// Closing (or dropping) the handle detaches the API from every frame it was
/// mounted in, makes a last attempt to persist, and frees the (user, package)
/// slot once persistence has settled.
#[derive(Debug)]
pub struct SessionHandle {
    attempt_id: String,
    resumed: bool,
    bridge: SharedBridge,
    sync: Arc<PersistenceSynchronizer>,
    grace: Duration,
    slot: Option<SlotGuard>,
    mounts: Vec<AttachedApi>,
    closed: bool,
}

impl SessionHandle {
    pub(crate) fn new(
        attempt_id: String,
        resumed: bool,
        bridge: SharedBridge,
        sync: Arc<PersistenceSynchronizer>,
        grace: Duration,
        slot: SlotGuard,
    ) -> Self {
        Self {
            attempt_id,
            resumed,
            bridge,
            sync,
            grace,
            slot: Some(slot),
            mounts: Vec::new(),
            closed: false,
        }
    }

    pub fn attempt_id(&self) -> &str {
        &self.attempt_id
    }

    /// Whether this session picked up an existing attempt
    pub fn is_resumed(&self) -> bool {
        self.resumed
    }

    /// The API object, for hosts that wire it up themselves
    pub fn bridge(&self) -> SharedBridge {
        self.bridge.clone()
    }

    fn lock_bridge(&self) -> MutexGuard<'_, ApiBridge> {
        self.bridge.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Publish the API in `frame` for content to discover
    pub fn mount(&mut self, registry: &FrameRegistry, frame: FrameId) -> Result<(), FrameError> {
        let attached = registry.attach(frame, self.bridge.clone())?;
        self.mounts.push(attached);
        Ok(())
    }

    /// Call an API function by wire name
    pub fn invoke(&self, function: &str, args: &[&str]) -> String {
        self.lock_bridge().invoke(function, args)
    }

    pub fn is_terminated(&self) -> bool {
        self.lock_bridge().is_terminated()
    }

    /// Whether any progress is not yet confirmed by the backend
    pub fn pending_sync(&self) -> bool {
        self.sync.pending_sync()
    }

    /// The attempt as this session currently sees it
    pub fn attempt(&self) -> Attempt {
        self.sync.attempt()
    }

    /// Wait until everything committed so far has been written or parked
    pub async fn wait_synced(&self) {
        self.sync.wait_idle().await;
    }

    /// Unmount: Terminate if content never did, then drain persistence
    ///
    /// Returns the attempt as last committed.
    pub async fn close(mut self) -> Attempt {
        self.mounts.clear();
        {
            let mut bridge = self.lock_bridge();
            if bridge.state() == BridgeState::Initialized && bridge.terminate("") != "true" {
                warn!(
                    attempt_id = %self.attempt_id,
                    code = bridge.last_error_code().0,
                    "terminate on unmount failed"
                );
            }
        }
        self.sync.close(self.grace).await;
        self.closed = true;
        debug!(attempt_id = %self.attempt_id, "session closed");
        self.sync.attempt()
    }
}

impl Drop for SessionHandle {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        self.mounts.clear();
        self.lock_bridge().flush_on_unload();

        let slot = self.slot.take();
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                let sync = self.sync.clone();
                let grace = self.grace;
                runtime.spawn(async move {
                    sync.close(grace).await;
                    drop(slot);
                });
            }
            Err(_) => {
                warn!(
                    attempt_id = %self.attempt_id,
                    "session dropped outside a runtime, unsynced progress may be lost"
                );
                drop(slot);
            }
        }
    }
}
