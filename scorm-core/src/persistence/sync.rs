//! Persistence synchronizer
//!
//! Commit never waits on the backend. Each commit folds the staged values
//! into the session's copy of the attempt, stamps the resulting snapshot with
//! a sequence number and hands it to a background worker. The worker only
//! ever writes the newest snapshot it has not written yet, so a burst of
//! commits collapses into one upsert without losing any value: every
//! snapshot already contains everything committed before it.
//!
//! When given a lease the worker also renews it every half TTL and gives it
//! back on close, unless progress is still parked. A parked session's lease
//! is left to lapse so that no other host resumes from a stale row.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{Notify, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::replay::{ReplayEntry, ReplayQueue};
use super::retry::RetryPolicy;
use crate::attempt::{Attempt, AttemptStatus};
use crate::backend::{AttemptBackend, AttemptLease};
use crate::cmi::parse_decimal;
use crate::dialect::RteDialect;
use crate::error::PersistenceError;
use crate::host::HostCallbacks;

/// Values and status to fold into the attempt
#[derive(Debug, Clone, Default)]
pub struct CommitRequest {
    /// Changed CMI values, in the order they were last set
    pub values: Vec<(String, String)>,
    pub status: Option<AttemptStatus>,
    pub termination: Option<Termination>,
}

/// End-of-session bookkeeping carried by the final commit
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Termination {
    /// Exit value the SCO reported for this session
    pub exit: Option<String>,
    pub session_time_centis: Option<u64>,
    /// Close the attempt for resumption
    pub close: bool,
}

/// Writer lease held for the life of the session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeaseOptions {
    pub user_id: String,
    pub package_id: String,
    pub holder: String,
    pub ttl: Duration,
}

impl LeaseOptions {
    /// The lease as claimed at `now`
    pub fn lease_at(&self, now: DateTime<Utc>) -> AttemptLease {
        let ttl = chrono::Duration::from_std(self.ttl).unwrap_or_default();
        AttemptLease {
            user_id: self.user_id.clone(),
            package_id: self.package_id.clone(),
            holder: self.holder.clone(),
            expires_at: now.checked_add_signed(ttl).unwrap_or(now),
        }
    }

    fn renew_interval(&self) -> Duration {
        self.ttl / 2
    }
}

/// Tuning for the synchronizer
#[derive(Debug, Clone, Default)]
pub struct SyncOptions {
    pub retry: RetryPolicy,
    /// Lease to keep alive, already claimed by the caller
    pub lease: Option<LeaseOptions>,
}

#[derive(Debug, Clone)]
struct FlushBatch {
    seq: u64,
    attempt: Attempt,
}

struct Shared {
    session: String,
    backend: Arc<dyn AttemptBackend>,
    replay: ReplayQueue,
    host: Arc<dyn HostCallbacks>,
    retry: RetryPolicy,
    lease: Option<LeaseOptions>,
    /// Newest snapshot not yet picked up by the worker
    latest: Mutex<Option<FlushBatch>>,
    /// Snapshot the worker is currently writing
    in_flight: Mutex<Option<FlushBatch>>,
    notify: Notify,
    /// Highest sequence number the worker has finished with
    settled: watch::Sender<u64>,
    /// Failure not yet reported to the SCO
    failure: Mutex<Option<PersistenceError>>,
    /// A snapshot sits in the replay queue
    unconfirmed: AtomicBool,
}

/// Flushes attempt snapshots to the backend in the background
pub struct PersistenceSynchronizer {
    dialect: Arc<dyn RteDialect>,
    attempt: Mutex<Attempt>,
    next_seq: AtomicU64,
    closed: AtomicBool,
    shared: Arc<Shared>,
    cancel: CancellationToken,
    worker: Mutex<Option<JoinHandle<()>>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl PersistenceSynchronizer {
    /// Start a synchronizer for `attempt`
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn(
        attempt: Attempt,
        dialect: Arc<dyn RteDialect>,
        backend: Arc<dyn AttemptBackend>,
        replay: ReplayQueue,
        host: Arc<dyn HostCallbacks>,
        options: SyncOptions,
    ) -> Self {
        let (settled, _) = watch::channel(0);
        let shared = Arc::new(Shared {
            session: Uuid::new_v4().to_string(),
            backend,
            replay,
            host,
            retry: options.retry,
            lease: options.lease,
            latest: Mutex::new(None),
            in_flight: Mutex::new(None),
            notify: Notify::new(),
            settled,
            failure: Mutex::new(None),
            unconfirmed: AtomicBool::new(false),
        });
        let cancel = CancellationToken::new();
        let worker = tokio::spawn(run_worker(shared.clone(), cancel.clone()));

        Self {
            dialect,
            attempt: Mutex::new(attempt),
            next_seq: AtomicU64::new(0),
            closed: AtomicBool::new(false),
            shared,
            cancel,
            worker: Mutex::new(Some(worker)),
        }
    }

    /// Session tag written into replay entries
    pub fn session_id(&self) -> &str {
        &self.shared.session
    }

    /// Fold a commit into the attempt and queue the snapshot
    ///
    /// Returns the snapshot's sequence number. Never waits on the backend.
    pub fn commit(&self, request: CommitRequest) -> Result<u64, PersistenceError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(PersistenceError::Closed);
        }
        // Sequence assignment and hand-off happen under the attempt lock so
        // the worker never sees an older snapshot replace a newer one.
        let mut attempt = lock(&self.attempt);
        apply_commit(&mut attempt, self.dialect.as_ref(), request);
        let seq = self.next_seq.fetch_add(1, Ordering::SeqCst) + 1;
        *lock(&self.shared.latest) = Some(FlushBatch {
            seq,
            attempt: attempt.clone(),
        });
        drop(attempt);

        self.shared.notify.notify_one();
        debug!(seq, "snapshot queued");
        Ok(seq)
    }

    /// Current desired state of the attempt
    pub fn attempt(&self) -> Attempt {
        lock(&self.attempt).clone()
    }

    /// Whether any snapshot is not yet confirmed by the backend
    pub fn pending_sync(&self) -> bool {
        let issued = self.next_seq.load(Ordering::SeqCst);
        *self.shared.settled.borrow() < issued || self.shared.unconfirmed.load(Ordering::SeqCst)
    }

    /// Take the failure not yet reported to the SCO, if any
    pub fn take_failure(&self) -> Option<PersistenceError> {
        lock(&self.shared.failure).take()
    }

    /// Wait until every snapshot queued so far has been written or parked
    pub async fn wait_idle(&self) {
        let target = self.next_seq.load(Ordering::SeqCst);
        let mut settled = self.shared.settled.subscribe();
        // The sender lives in `shared`, which outlives this borrow.
        let _ = settled.wait_for(|seq| *seq >= target).await;
    }

    /// Stop accepting commits and drain within `grace`
    ///
    /// Whatever is still unwritten when the grace window runs out is parked
    /// in the replay queue.
    pub async fn close(&self, grace: Duration) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.cancel.cancel();
        let Some(mut worker) = lock(&self.worker).take() else {
            return;
        };

        match tokio::time::timeout(grace, &mut worker).await {
            Ok(_) => debug!(session = %self.shared.session, "synchronizer drained"),
            Err(_) => {
                worker.abort();
                let _ = worker.await;
                warn!(
                    session = %self.shared.session,
                    grace_ms = grace.as_millis() as u64,
                    "grace window exceeded, parking unsynced snapshot"
                );
                self.spill().await;
            }
        }
        self.release_lease(grace).await;
    }

    async fn release_lease(&self, grace: Duration) {
        let Some(lease) = &self.shared.lease else {
            return;
        };
        if self.shared.unconfirmed.load(Ordering::SeqCst) {
            info!(
                user_id = %lease.user_id,
                package_id = %lease.package_id,
                "progress still parked, leaving lease to expire"
            );
            return;
        }
        let release = self.shared.backend.release_lease(
            &lease.user_id,
            &lease.package_id,
            &lease.holder,
        );
        match tokio::time::timeout(grace, release).await {
            Ok(Ok(())) => debug!(
                user_id = %lease.user_id,
                package_id = %lease.package_id,
                "lease released"
            ),
            Ok(Err(e)) => warn!(error = %e, "failed to release lease, it will expire"),
            Err(_) => warn!("lease release timed out, it will expire"),
        }
    }

    /// Park the newest unwritten snapshot in the replay queue
    async fn spill(&self) {
        let pending = lock(&self.shared.latest)
            .take()
            .or_else(|| lock(&self.shared.in_flight).take());
        let Some(batch) = pending else {
            return;
        };
        let seq = batch.seq;
        park(&self.shared, batch, "grace window exceeded".to_string()).await;
        self.shared.settled.send_replace(seq);
    }
}

impl std::fmt::Debug for PersistenceSynchronizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PersistenceSynchronizer")
            .field("session", &self.shared.session)
            .field("next_seq", &self.next_seq.load(Ordering::SeqCst))
            .field("closed", &self.closed.load(Ordering::SeqCst))
            .finish()
    }
}

/// Map committed CMI values onto the attempt record
fn apply_commit(attempt: &mut Attempt, dialect: &dyn RteDialect, request: CommitRequest) {
    let bindings = dialect.bindings();
    let score = &dialect.schema().score;
    let now = Utc::now();

    for (path, value) in request.values {
        let path = path.as_str();
        if path == bindings.location {
            attempt.location = Some(value);
        } else if path == bindings.suspend_data {
            attempt.suspend_data = Some(value);
        } else if path == score.raw {
            attempt.score_raw = parse_decimal(&value);
        } else if path == score.min {
            attempt.score_min = parse_decimal(&value);
        } else if path == score.max {
            attempt.score_max = parse_decimal(&value);
        } else if path == bindings.exit || path == bindings.session_time {
            // Only meaningful at Terminate, carried by `Termination`.
        } else {
            attempt.runtime_data.insert(path.to_string(), value);
        }
    }

    if let Some(status) = request.status {
        attempt.set_status(status, now);
    }
    attempt.last_accessed_at = now;

    if let Some(termination) = request.termination {
        attempt.total_time_centis = attempt
            .total_time_centis
            .saturating_add(termination.session_time_centis.unwrap_or(0));
        attempt.exit = termination.exit;
        if termination.close {
            attempt.terminated_at = Some(now);
        }
    }
}

async fn run_worker(shared: Arc<Shared>, cancel: CancellationToken) {
    let mut renew_at = shared
        .lease
        .as_ref()
        .map(|lease| Instant::now() + lease.renew_interval());
    loop {
        if let (Some(lease), Some(at)) = (&shared.lease, renew_at)
            && Instant::now() >= at
        {
            renew_lease(&shared, lease).await;
            renew_at = Some(Instant::now() + lease.renew_interval());
        }

        let next = {
            let mut latest = lock(&shared.latest);
            let batch = latest.take();
            if let Some(batch) = &batch {
                *lock(&shared.in_flight) = Some(batch.clone());
            }
            batch
        };

        match next {
            Some(batch) => {
                flush(&shared, batch).await;
                lock(&shared.in_flight).take();
            }
            None if cancel.is_cancelled() => break,
            None => {
                tokio::select! {
                    _ = shared.notify.notified() => {}
                    _ = cancel.cancelled() => {}
                    _ = sleep_until(renew_at) => {}
                }
            }
        }
    }
    debug!(session = %shared.session, "synchronizer worker stopped");
}

/// Sleep until `at`, or forever when there is nothing to wake for
async fn sleep_until(at: Option<Instant>) {
    match at {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}

async fn renew_lease(shared: &Shared, lease: &LeaseOptions) {
    match shared.backend.claim_lease(&lease.lease_at(Utc::now())).await {
        Ok(true) => debug!(
            user_id = %lease.user_id,
            package_id = %lease.package_id,
            "lease renewed"
        ),
        Ok(false) => {
            error!(
                user_id = %lease.user_id,
                package_id = %lease.package_id,
                "lease taken over by another session"
            );
            shared
                .host
                .on_error("Another session has taken over this attempt");
        }
        // An offline backend cannot hand the lease to anyone else either.
        Err(e) => warn!(error = %e, "lease renewal failed"),
    }
}

async fn flush(shared: &Shared, batch: FlushBatch) {
    let mut policy = shared.retry.clone();
    policy.reset();
    let mut last_error = String::new();

    while let Some(delay) = policy.next_delay() {
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        match shared.backend.upsert_attempt(&batch.attempt).await {
            Ok(()) => {
                debug!(seq = batch.seq, attempt_id = %batch.attempt.id, "snapshot persisted");
                shared.unconfirmed.store(false, Ordering::SeqCst);
                if let Err(e) = shared
                    .replay
                    .resolve(&batch.attempt.id, &shared.session, batch.seq)
                    .await
                {
                    warn!(error = %e, "failed to update replay queue");
                }
                shared.settled.send_replace(batch.seq);
                return;
            }
            Err(e) => {
                warn!(
                    seq = batch.seq,
                    attempt = policy.attempts(),
                    error = %e,
                    "attempt upsert failed"
                );
                last_error = e.to_string();
            }
        }
    }

    let seq = batch.seq;
    let failure = PersistenceError::RetriesExhausted {
        attempts: policy.attempts(),
        message: last_error,
    };
    park(shared, batch, failure.to_string()).await;
    *lock(&shared.failure) = Some(failure);
    shared.settled.send_replace(seq);
}

/// Put a snapshot in the replay queue and tell the host
async fn park(shared: &Shared, batch: FlushBatch, reason: String) {
    let entry = ReplayEntry::new(shared.session.clone(), batch.seq, batch.attempt);
    match shared.replay.append(entry).await {
        Ok(()) => info!(seq = batch.seq, %reason, "snapshot parked for replay"),
        Err(e) => error!(seq = batch.seq, error = %e, "failed to park snapshot, progress may be lost"),
    }
    shared.unconfirmed.store(true, Ordering::SeqCst);
    shared
        .host
        .on_error(&format!("Progress not saved yet: {}", reason));
}
