//! Durable replay queue
//!
//! Snapshots that could not reach the backend are parked in a JSON file so a
//! closed tab or crashed process does not lose learner progress. The queue
//! holds at most one entry per attempt, always the newest snapshot, and is
//! drained before every session open.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::attempt::Attempt;
use crate::backend::AttemptBackend;
use crate::error::{BackendError, ReplayError};

/// Replay queue file name
const REPLAY_FILE: &str = "replay_queue.json";

/// One unsynced attempt snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplayEntry {
    /// Sequence number within the session that produced it
    pub seq: u64,
    /// Id of the session that produced it
    pub session: String,
    pub attempt: Attempt,
    pub queued_at: DateTime<Utc>,
}

impl ReplayEntry {
    pub fn new(session: impl Into<String>, seq: u64, attempt: Attempt) -> Self {
        Self {
            seq,
            session: session.into(),
            attempt,
            queued_at: Utc::now(),
        }
    }
}

/// Outcome of a drain pass
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DrainReport {
    pub replayed: usize,
    pub failed: usize,
    /// Entries discarded because the backend can never accept them
    pub dropped: usize,
}

/// File-backed queue of unsynced snapshots, keyed by attempt id
#[derive(Debug, Clone)]
pub struct ReplayQueue {
    entries: Arc<RwLock<HashMap<String, ReplayEntry>>>,
    file_path: PathBuf,
}

impl ReplayQueue {
    /// Load the queue from `dir`, or start empty
    ///
    /// An unreadable file body is treated as empty rather than blocking
    /// every session open.
    pub async fn load(dir: &Path) -> Result<Self, ReplayError> {
        let file_path = dir.join(REPLAY_FILE);

        let entries = if file_path.exists() {
            let content = fs::read_to_string(&file_path)
                .await
                .map_err(ReplayError::Read)?;
            let list: Vec<ReplayEntry> = serde_json::from_str(&content).unwrap_or_else(|e| {
                warn!(path = %file_path.display(), error = %e, "discarding unreadable replay queue");
                Vec::new()
            });
            list.into_iter()
                .map(|entry| (entry.attempt.id.clone(), entry))
                .collect()
        } else {
            HashMap::new()
        };

        Ok(Self {
            entries: Arc::new(RwLock::new(entries)),
            file_path,
        })
    }

    pub fn file_path(&self) -> &Path {
        &self.file_path
    }

    /// Park a snapshot, keeping only the newest one per attempt
    pub async fn append(&self, entry: ReplayEntry) -> Result<(), ReplayError> {
        let mut entries = self.entries.write().await;
        let keep_existing = entries
            .get(&entry.attempt.id)
            .is_some_and(|existing| existing.session == entry.session && existing.seq > entry.seq);
        if keep_existing {
            return Ok(());
        }
        info!(attempt_id = %entry.attempt.id, seq = entry.seq, "snapshot queued for replay");
        entries.insert(entry.attempt.id.clone(), entry);
        self.persist(&entries).await
    }

    /// Drop the entry for `attempt_id` if a snapshot at least as new synced
    pub async fn resolve(
        &self,
        attempt_id: &str,
        session: &str,
        seq: u64,
    ) -> Result<bool, ReplayError> {
        let mut entries = self.entries.write().await;
        let resolved = entries
            .get(attempt_id)
            .is_some_and(|existing| existing.session != session || existing.seq <= seq);
        if resolved {
            entries.remove(attempt_id);
            debug!(attempt_id, seq, "replay entry resolved");
            self.persist(&entries).await?;
        }
        Ok(resolved)
    }

    /// Newest parked snapshot for the pair, if any
    pub async fn find(&self, user_id: &str, package_id: &str) -> Option<ReplayEntry> {
        let entries = self.entries.read().await;
        entries
            .values()
            .filter(|e| e.attempt.user_id == user_id && e.attempt.package_id == package_id)
            .max_by_key(|e| e.attempt.attempt_number)
            .cloned()
    }

    /// Every parked entry, oldest first
    pub async fn entries(&self) -> Vec<ReplayEntry> {
        let entries = self.entries.read().await;
        let mut list: Vec<ReplayEntry> = entries.values().cloned().collect();
        list.sort_by_key(|e| e.queued_at);
        list
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// Push every parked snapshot to the backend
    ///
    /// Entries that fail stay queued for the next drain. A conflict means a
    /// different attempt already owns that attempt number, so the entry is
    /// dropped.
    pub async fn drain(&self, backend: &dyn AttemptBackend) -> Result<DrainReport, ReplayError> {
        let mut report = DrainReport::default();
        for entry in self.entries().await {
            let remove = match backend.upsert_attempt(&entry.attempt).await {
                Ok(()) => {
                    report.replayed += 1;
                    true
                }
                Err(e @ BackendError::Conflict { .. }) => {
                    warn!(attempt_id = %entry.attempt.id, error = %e, "dropping unreplayable snapshot");
                    report.dropped += 1;
                    true
                }
                Err(e) => {
                    warn!(attempt_id = %entry.attempt.id, error = %e, "replay failed, keeping entry");
                    report.failed += 1;
                    false
                }
            };
            if remove {
                let mut entries = self.entries.write().await;
                // A newer snapshot may have been queued while this one was in flight.
                if entries.get(&entry.attempt.id) == Some(&entry) {
                    entries.remove(&entry.attempt.id);
                    self.persist(&entries).await?;
                }
            }
        }
        if report.replayed > 0 || report.dropped > 0 {
            info!(
                replayed = report.replayed,
                failed = report.failed,
                dropped = report.dropped,
                "replay queue drained"
            );
        }
        Ok(report)
    }

    async fn persist(&self, entries: &HashMap<String, ReplayEntry>) -> Result<(), ReplayError> {
        let mut list: Vec<&ReplayEntry> = entries.values().collect();
        list.sort_by_key(|e| e.queued_at);

        if let Some(parent) = self.file_path.parent() {
            fs::create_dir_all(parent).await.map_err(ReplayError::Write)?;
        }

        let content = serde_json::to_string_pretty(&list)?;
        let tmp_path = self.file_path.with_extension("json.tmp");
        fs::write(&tmp_path, content).await.map_err(ReplayError::Write)?;
        fs::rename(&tmp_path, &self.file_path)
            .await
            .map_err(ReplayError::Write)?;
        Ok(())
    }
}
