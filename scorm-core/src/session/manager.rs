//! SessionManager: attempt lifecycle and resumption
//!
//! Opening a session decides which attempt the learner is on. A resumable
//! attempt (not terminated) is picked up where it left off; otherwise a new
//! one is started with the next attempt number. At most one session per
//! (user, package) is live at a time: an in-process slot guards a manager,
//! and a backend lease guards managers that share a backend.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::Utc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::handle::SessionHandle;
use crate::attempt::{Attempt, LaunchContext, ScormVersion};
use crate::backend::AttemptBackend;
use crate::bridge::ApiBridge;
use crate::cmi::CmiStore;
use crate::completion::CompletionEvaluator;
use crate::config::RteConfig;
use crate::dialect::dialect_for;
use crate::error::{RteError, SessionError};
use crate::host::HostCallbacks;
use crate::persistence::{
    CommitRequest, DrainReport, LeaseOptions, PersistenceSynchronizer, ReplayQueue, SyncOptions,
};

type LearnerKey = (String, String);

/// Live sessions keyed by (user, package); the value is the attempt id once known
type ActiveMap = Arc<Mutex<HashMap<LearnerKey, Option<String>>>>;

fn lock(active: &ActiveMap) -> MutexGuard<'_, HashMap<LearnerKey, Option<String>>> {
    active.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Who is launching what
#[derive(Debug, Clone)]
pub struct OpenRequest {
    pub user_id: String,
    pub package_id: String,
    pub version: ScormVersion,
    pub launch: LaunchContext,
}

impl OpenRequest {
    /// Request with a launch context naming the learner by id
    pub fn new(
        user_id: impl Into<String>,
        package_id: impl Into<String>,
        version: ScormVersion,
    ) -> Self {
        let user_id = user_id.into();
        Self {
            launch: LaunchContext::new(user_id.clone(), user_id.clone()),
            user_id,
            package_id: package_id.into(),
            version,
        }
    }

    pub fn with_launch(mut self, launch: LaunchContext) -> Self {
        self.launch = launch;
        self
    }
}

/// Holds a (user, package) reservation; released on drop
#[derive(Debug)]
pub(crate) struct SlotGuard {
    active: ActiveMap,
    key: LearnerKey,
}

impl SlotGuard {
    fn bind(&self, attempt_id: &str) {
        if let Some(slot) = lock(&self.active).get_mut(&self.key) {
            *slot = Some(attempt_id.to_string());
        }
    }
}

impl Drop for SlotGuard {
    fn drop(&mut self) {
        lock(&self.active).remove(&self.key);
        debug!(user_id = %self.key.0, package_id = %self.key.1, "session slot released");
    }
}

/// Opens sessions against one backend and replay queue
pub struct SessionManager {
    backend: Arc<dyn AttemptBackend>,
    replay: ReplayQueue,
    config: RteConfig,
    active: ActiveMap,
    /// Lease holder id, fixed for the life of the manager
    holder: String,
}

impl SessionManager {
    pub fn new(backend: Arc<dyn AttemptBackend>, replay: ReplayQueue, config: RteConfig) -> Self {
        Self {
            backend,
            replay,
            config,
            active: Arc::new(Mutex::new(HashMap::new())),
            holder: Uuid::new_v4().to_string(),
        }
    }

    /// Build a manager whose replay queue lives where `config` says
    pub async fn from_config(
        backend: Arc<dyn AttemptBackend>,
        config: RteConfig,
    ) -> Result<Self, RteError> {
        let replay = ReplayQueue::load(&config.persistence.replay_dir).await?;
        Ok(Self::new(backend, replay, config))
    }

    pub fn config(&self) -> &RteConfig {
        &self.config
    }

    pub fn replay(&self) -> &ReplayQueue {
        &self.replay
    }

    /// Id this manager claims leases under
    pub fn holder(&self) -> &str {
        &self.holder
    }

    /// Whether a session for the pair is currently live
    pub fn is_active(&self, user_id: &str, package_id: &str) -> bool {
        lock(&self.active).contains_key(&(user_id.to_string(), package_id.to_string()))
    }

    pub fn active_count(&self) -> usize {
        lock(&self.active).len()
    }

    /// Push parked snapshots to the backend
    pub async fn drain_replay(&self) -> Result<DrainReport, RteError> {
        Ok(self.replay.drain(self.backend.as_ref()).await?)
    }

    /// Open a session, resuming the latest attempt when it is still open
    ///
    /// Refuses with [`SessionError::AttemptInProgress`] while another session
    /// for the same pair is live, here or in another manager on the same
    /// backend; the host hears about it through `on_error`.
    /// Must be called from within a tokio runtime.
    pub async fn open(
        &self,
        request: OpenRequest,
        host: Arc<dyn HostCallbacks>,
    ) -> Result<SessionHandle, SessionError> {
        let slot = match self.reserve(&request.user_id, &request.package_id) {
            Ok(slot) => slot,
            Err(e) => {
                warn!(
                    user_id = %request.user_id,
                    package_id = %request.package_id,
                    "session refused, attempt already in progress"
                );
                host.on_error(&e.to_string());
                return Err(e);
            }
        };

        match self.replay.drain(self.backend.as_ref()).await {
            Ok(report) if report.failed > 0 => {
                warn!(failed = report.failed, "replay queue not fully drained")
            }
            Ok(_) => {}
            Err(e) => warn!(error = %e, "failed to drain replay queue"),
        }

        let lease = LeaseOptions {
            user_id: request.user_id.clone(),
            package_id: request.package_id.clone(),
            holder: self.holder.clone(),
            ttl: self.config.lease_ttl(),
        };
        self.claim_lease(&lease, host.as_ref()).await?;

        match self.start(request, host, slot, lease.clone()).await {
            Ok(handle) => Ok(handle),
            Err(e) => {
                if let Err(release) = self
                    .backend
                    .release_lease(&lease.user_id, &lease.package_id, &lease.holder)
                    .await
                {
                    debug!(error = %release, "lease release after failed open");
                }
                Err(e)
            }
        }
    }

    async fn start(
        &self,
        request: OpenRequest,
        host: Arc<dyn HostCallbacks>,
        slot: SlotGuard,
        lease: LeaseOptions,
    ) -> Result<SessionHandle, SessionError> {
        let latest = self.latest_attempt(&request.user_id, &request.package_id).await?;
        let (attempt, resumed) = match latest {
            Some(attempt) if !attempt.is_terminated() && attempt.version == request.version => {
                (attempt, true)
            }
            previous => {
                if let Some(previous) = &previous
                    && !previous.is_terminated()
                {
                    warn!(
                        attempt_id = %previous.id,
                        stored = %previous.version,
                        requested = %request.version,
                        "open attempt has a different version, starting a new one"
                    );
                    self.close_superseded(previous).await?;
                }
                let number = previous.map_or(1, |a| a.attempt_number + 1);
                (
                    Attempt::new(
                        request.user_id.clone(),
                        request.package_id.clone(),
                        number,
                        request.version,
                    ),
                    false,
                )
            }
        };
        slot.bind(&attempt.id);

        let dialect = dialect_for(request.version);
        let mut store = CmiStore::new(dialect.schema());
        store.seed(dialect.seed_values(&attempt, &request.launch));
        let evaluator = CompletionEvaluator::new(dialect.clone(), attempt.status);
        let attempt_id = attempt.id.clone();

        if resumed {
            info!(
                attempt_id = %attempt_id,
                user_id = %request.user_id,
                package_id = %request.package_id,
                attempt_number = attempt.attempt_number,
                suspended = attempt.is_suspended(),
                "resuming attempt"
            );
        } else {
            info!(
                attempt_id = %attempt_id,
                user_id = %request.user_id,
                package_id = %request.package_id,
                attempt_number = attempt.attempt_number,
                "starting new attempt"
            );
        }

        let sync = Arc::new(PersistenceSynchronizer::spawn(
            attempt,
            dialect.clone(),
            self.backend.clone(),
            self.replay.clone(),
            host.clone(),
            SyncOptions {
                retry: self.config.retry_policy(),
                lease: Some(lease),
            },
        ));
        if !resumed {
            // New attempts get their row before the SCO says anything.
            sync.commit(CommitRequest::default())
                .map_err(|_| SessionError::Closed)?;
        }

        let bridge = ApiBridge::new(dialect, attempt_id.clone(), store, evaluator, sync.clone(), host)
            .into_shared();
        Ok(SessionHandle::new(
            attempt_id,
            resumed,
            bridge,
            sync,
            self.config.grace_period(),
            slot,
        ))
    }

    /// Take the backend lease for the pair or refuse the open
    ///
    /// An unreachable backend only blocks the open when there is no parked
    /// progress to resume from. The synchronizer keeps trying to take the
    /// lease once the backend is back.
    async fn claim_lease(
        &self,
        lease: &LeaseOptions,
        host: &dyn HostCallbacks,
    ) -> Result<(), SessionError> {
        match self.backend.claim_lease(&lease.lease_at(Utc::now())).await {
            Ok(true) => Ok(()),
            Ok(false) => {
                let attempt_id = match self
                    .backend
                    .get_latest_attempt(&lease.user_id, &lease.package_id)
                    .await
                {
                    Ok(Some(attempt)) if !attempt.is_terminated() => Some(attempt.id),
                    _ => None,
                };
                let e = SessionError::AttemptInProgress {
                    user_id: lease.user_id.clone(),
                    package_id: lease.package_id.clone(),
                    attempt_id,
                };
                warn!(
                    user_id = %lease.user_id,
                    package_id = %lease.package_id,
                    "session refused, attempt leased by another manager"
                );
                host.on_error(&e.to_string());
                Err(e)
            }
            Err(e) => {
                let parked = self.replay.find(&lease.user_id, &lease.package_id).await;
                if parked.is_none() {
                    return Err(e.into());
                }
                warn!(error = %e, "lease claim failed, resuming from replay queue unleased");
                Ok(())
            }
        }
    }

    /// Close an open attempt that a new attempt replaces, keeping its status
    async fn close_superseded(&self, previous: &Attempt) -> Result<(), SessionError> {
        let mut closed = previous.clone();
        let now = Utc::now();
        closed.terminated_at = Some(now);
        closed.last_accessed_at = now;
        self.backend.upsert_attempt(&closed).await?;
        if let Err(e) = self.replay.resolve(&closed.id, &self.holder, u64::MAX).await {
            warn!(error = %e, "failed to update replay queue");
        }
        info!(
            attempt_id = %closed.id,
            status = %closed.status.as_str(),
            "superseded attempt closed"
        );
        Ok(())
    }

    fn reserve(&self, user_id: &str, package_id: &str) -> Result<SlotGuard, SessionError> {
        let key = (user_id.to_string(), package_id.to_string());
        let mut active = lock(&self.active);
        if let Some(existing) = active.get(&key) {
            return Err(SessionError::AttemptInProgress {
                user_id: key.0,
                package_id: key.1,
                attempt_id: existing.clone(),
            });
        }
        active.insert(key.clone(), None);
        Ok(SlotGuard {
            active: self.active.clone(),
            key,
        })
    }

    /// Latest attempt, preferring a parked snapshot the backend has not seen
    async fn latest_attempt(
        &self,
        user_id: &str,
        package_id: &str,
    ) -> Result<Option<Attempt>, SessionError> {
        let parked = self
            .replay
            .find(user_id, package_id)
            .await
            .map(|entry| entry.attempt);
        let stored = match self.backend.get_latest_attempt(user_id, package_id).await {
            Ok(stored) => stored,
            Err(e) if parked.is_some() => {
                warn!(error = %e, "backend lookup failed, resuming from replay queue");
                None
            }
            Err(e) => return Err(e.into()),
        };

        Ok(match (stored, parked) {
            (Some(stored), Some(parked)) if parked.attempt_number >= stored.attempt_number => {
                debug!(attempt_id = %parked.id, "using parked snapshot over stored row");
                Some(parked)
            }
            (Some(stored), _) => Some(stored),
            (None, parked) => parked,
        })
    }
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager")
            .field("active", &self.active_count())
            .field("config", &self.config)
            .finish()
    }
}
