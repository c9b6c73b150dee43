//! Frame tree and API discovery
//!
//! Content finds the API by probing its own frame, then each parent up to the
//! top, then the opener window and that window's parents. The registry models
//! that tree so players can mount a bridge where content will look for it.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, trace};

use super::api::SharedBridge;
use crate::error::FrameError;

/// Hops before discovery gives up, guarding against cyclic frame graphs
pub const MAX_DISCOVERY_HOPS: usize = 500;

/// Opaque handle to a registered frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FrameId(u64);

impl FrameId {
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

struct Frame {
    parent: Option<FrameId>,
    opener: Option<FrameId>,
    globals: HashMap<String, SharedBridge>,
}

#[derive(Default)]
struct Registry {
    next_id: u64,
    frames: HashMap<FrameId, Frame>,
}

impl Registry {
    fn insert(&mut self, parent: Option<FrameId>, opener: Option<FrameId>) -> FrameId {
        self.next_id += 1;
        let id = FrameId(self.next_id);
        self.frames.insert(
            id,
            Frame {
                parent,
                opener,
                globals: HashMap::new(),
            },
        );
        id
    }
}

/// Shared model of the player's windows and frames
#[derive(Clone, Default)]
pub struct FrameRegistry {
    inner: Arc<Mutex<Registry>>,
}

impl FrameRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Registry> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a top-level window with no opener
    pub fn create_window(&self) -> FrameId {
        self.lock().insert(None, None)
    }

    /// Register a frame nested in `parent`
    pub fn create_child(&self, parent: FrameId) -> Result<FrameId, FrameError> {
        let mut registry = self.lock();
        if !registry.frames.contains_key(&parent) {
            return Err(FrameError::NotFound(parent.0));
        }
        Ok(registry.insert(Some(parent), None))
    }

    /// Register a popup window opened from `opener`
    pub fn open_window(&self, opener: FrameId) -> Result<FrameId, FrameError> {
        let mut registry = self.lock();
        if !registry.frames.contains_key(&opener) {
            return Err(FrameError::NotFound(opener.0));
        }
        Ok(registry.insert(None, Some(opener)))
    }

    /// Forget a frame; its children become unreachable through it
    pub fn remove(&self, frame: FrameId) -> bool {
        self.lock().frames.remove(&frame).is_some()
    }

    /// Publish `bridge` on `frame` under the bridge's global name
    ///
    /// The returned guard withdraws the global when dropped.
    pub fn attach(&self, frame: FrameId, bridge: SharedBridge) -> Result<AttachedApi, FrameError> {
        let name = bridge
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .global_name();
        let mut registry = self.lock();
        let slot = registry
            .frames
            .get_mut(&frame)
            .ok_or(FrameError::NotFound(frame.0))?;
        if slot.globals.contains_key(name) {
            return Err(FrameError::AlreadyAttached {
                frame: frame.0,
                name: name.to_string(),
            });
        }
        slot.globals.insert(name.to_string(), bridge);
        debug!(frame = frame.0, global = name, "api attached");
        Ok(AttachedApi {
            registry: self.clone(),
            frame,
            name,
        })
    }

    /// Withdraw a global; returns whether one was present
    pub fn detach(&self, frame: FrameId, name: &str) -> bool {
        let removed = self
            .lock()
            .frames
            .get_mut(&frame)
            .and_then(|slot| slot.globals.remove(name))
            .is_some();
        if removed {
            debug!(frame = frame.0, global = name, "api detached");
        }
        removed
    }

    /// Look for `name` the way content does
    ///
    /// Checks `from`, then each ancestor up to the top window. If nothing is
    /// found, repeats from the top window's opener. Stops after
    /// [`MAX_DISCOVERY_HOPS`] frames.
    pub fn find_api(&self, from: FrameId, name: &str) -> Option<SharedBridge> {
        let registry = self.lock();
        let mut current = Some(from);
        let mut hops = 0;

        while let Some(start) = current {
            let mut cursor = Some(start);
            let mut opener = None;

            while let Some(at) = cursor {
                if hops >= MAX_DISCOVERY_HOPS {
                    trace!(from = from.0, global = name, "discovery hop limit reached");
                    return None;
                }
                hops += 1;
                let frame = registry.frames.get(&at)?;
                if let Some(bridge) = frame.globals.get(name) {
                    trace!(from = from.0, found = at.0, hops, "api discovered");
                    return Some(bridge.clone());
                }
                opener = frame.opener;
                cursor = frame.parent;
            }
            current = opener;
        }
        None
    }
}

impl std::fmt::Debug for FrameRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameRegistry")
            .field("frames", &self.lock().frames.len())
            .finish()
    }
}

/// Keeps a bridge published; detaches on drop
#[derive(Debug)]
pub struct AttachedApi {
    registry: FrameRegistry,
    frame: FrameId,
    name: &'static str,
}

impl AttachedApi {
    pub fn frame(&self) -> FrameId {
        self.frame
    }

    pub fn global_name(&self) -> &'static str {
        self.name
    }
}

impl Drop for AttachedApi {
    fn drop(&mut self) {
        self.registry.detach(self.frame, self.name);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attempt::{LaunchContext, ScormVersion};
    use crate::bridge::api::tests::harness;

    async fn shared(version: ScormVersion) -> SharedBridge {
        harness(version, LaunchContext::new("u1", "Learner"))
            .await
            .bridge
            .into_shared()
    }

    #[tokio::test]
    async fn finds_api_in_ancestor() {
        let registry = FrameRegistry::new();
        let top = registry.create_window();
        let middle = registry.create_child(top).unwrap();
        let leaf = registry.create_child(middle).unwrap();
        let _attached = registry
            .attach(top, shared(ScormVersion::Scorm12).await)
            .unwrap();

        assert!(registry.find_api(leaf, "API").is_some());
        assert!(registry.find_api(leaf, "API_1484_11").is_none());
    }

    #[tokio::test]
    async fn nearest_frame_wins() {
        let registry = FrameRegistry::new();
        let top = registry.create_window();
        let leaf = registry.create_child(top).unwrap();
        let outer = shared(ScormVersion::Scorm2004).await;
        let inner = shared(ScormVersion::Scorm2004).await;
        let _a = registry.attach(top, outer.clone()).unwrap();
        let _b = registry.attach(leaf, inner.clone()).unwrap();

        let found = registry.find_api(leaf, "API_1484_11").unwrap();
        assert!(Arc::ptr_eq(&found, &inner));
    }

    #[tokio::test]
    async fn falls_back_to_opener_chain() {
        let registry = FrameRegistry::new();
        let lms = registry.create_window();
        let lms_frame = registry.create_child(lms).unwrap();
        let popup = registry.open_window(lms_frame).unwrap();
        let content = registry.create_child(popup).unwrap();
        let _attached = registry
            .attach(lms, shared(ScormVersion::Scorm2004).await)
            .unwrap();

        assert!(registry.find_api(content, "API_1484_11").is_some());
    }

    #[tokio::test]
    async fn drop_guard_detaches() {
        let registry = FrameRegistry::new();
        let top = registry.create_window();
        let attached = registry
            .attach(top, shared(ScormVersion::Scorm12).await)
            .unwrap();
        assert_eq!(attached.global_name(), "API");
        drop(attached);
        assert!(registry.find_api(top, "API").is_none());
    }

    #[tokio::test]
    async fn second_attach_on_same_frame_is_refused() {
        let registry = FrameRegistry::new();
        let top = registry.create_window();
        let _first = registry
            .attach(top, shared(ScormVersion::Scorm12).await)
            .unwrap();
        let second = registry.attach(top, shared(ScormVersion::Scorm12).await);
        assert!(matches!(second, Err(FrameError::AlreadyAttached { .. })));
    }

    #[test]
    fn unknown_frames_are_rejected() {
        let registry = FrameRegistry::new();
        let top = registry.create_window();
        assert!(registry.remove(top));
        assert_eq!(registry.create_child(top), Err(FrameError::NotFound(top.as_u64())));
        assert!(registry.find_api(top, "API").is_none());
    }

    #[test]
    fn deep_chains_stop_at_hop_limit() {
        let registry = FrameRegistry::new();
        let mut frame = registry.create_window();
        for _ in 0..MAX_DISCOVERY_HOPS + 10 {
            frame = registry.create_child(frame).unwrap();
        }
        assert!(registry.find_api(frame, "API").is_none());
    }
}
