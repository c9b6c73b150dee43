//! In-process attempt backend
//!
//! Keeps attempts in a map behind a tokio `RwLock`. Failures and latency can
//! be injected so the retry and replay paths can be exercised without a
//! real database.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use super::traits::{AttemptBackend, AttemptLease};
use crate::attempt::Attempt;
use crate::error::BackendError;

/// Attempt store held in memory
#[derive(Debug, Default)]
pub struct MemoryAttemptBackend {
    attempts: RwLock<HashMap<String, Attempt>>,
    leases: RwLock<HashMap<(String, String), AttemptLease>>,
    fail_next: AtomicU32,
    unavailable: AtomicBool,
    latency: Mutex<Duration>,
    upserts: AtomicUsize,
}

impl MemoryAttemptBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `count` upserts fail
    pub fn fail_next(&self, count: u32) {
        self.fail_next.store(count, Ordering::SeqCst);
    }

    /// Fail every call until switched back
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Delay every upsert by `latency`
    pub fn set_latency(&self, latency: Duration) {
        if let Ok(mut slot) = self.latency.lock() {
            *slot = latency;
        }
    }

    /// Number of upserts that reached the store
    pub fn upsert_count(&self) -> usize {
        self.upserts.load(Ordering::SeqCst)
    }

    /// Every stored attempt for the pair, ordered by attempt number
    pub async fn attempts_for(&self, user_id: &str, package_id: &str) -> Vec<Attempt> {
        let attempts = self.attempts.read().await;
        let mut matching: Vec<Attempt> = attempts
            .values()
            .filter(|a| a.user_id == user_id && a.package_id == package_id)
            .cloned()
            .collect();
        matching.sort_by_key(|a| a.attempt_number);
        matching
    }

    /// Current lease for the pair, expired or not
    pub async fn lease_for(&self, user_id: &str, package_id: &str) -> Option<AttemptLease> {
        self.leases
            .read()
            .await
            .get(&(user_id.to_string(), package_id.to_string()))
            .cloned()
    }

    /// Look up an attempt by id
    pub async fn get(&self, id: &str) -> Option<Attempt> {
        self.attempts.read().await.get(id).cloned()
    }

    fn check_available(&self) -> Result<(), BackendError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(BackendError::Unavailable("backend offline".to_string()));
        }
        Ok(())
    }

    fn take_injected_failure(&self) -> bool {
        self.fail_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }

    fn current_latency(&self) -> Duration {
        self.latency.lock().map(|l| *l).unwrap_or_default()
    }
}

#[async_trait]
impl AttemptBackend for MemoryAttemptBackend {
    async fn upsert_attempt(&self, attempt: &Attempt) -> Result<(), BackendError> {
        let latency = self.current_latency();
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        self.check_available()?;
        if self.take_injected_failure() {
            return Err(BackendError::Unavailable("injected failure".to_string()));
        }

        let mut attempts = self.attempts.write().await;
        let duplicate = attempts.values().any(|existing| {
            existing.id != attempt.id
                && existing.user_id == attempt.user_id
                && existing.package_id == attempt.package_id
                && existing.attempt_number == attempt.attempt_number
        });
        if duplicate {
            return Err(BackendError::Conflict {
                user_id: attempt.user_id.clone(),
                package_id: attempt.package_id.clone(),
                attempt_number: attempt.attempt_number,
            });
        }
        attempts.insert(attempt.id.clone(), attempt.clone());
        self.upserts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn get_latest_attempt(
        &self,
        user_id: &str,
        package_id: &str,
    ) -> Result<Option<Attempt>, BackendError> {
        self.check_available()?;
        let attempts = self.attempts.read().await;
        Ok(attempts
            .values()
            .filter(|a| a.user_id == user_id && a.package_id == package_id)
            .max_by_key(|a| a.attempt_number)
            .cloned())
    }

    async fn claim_lease(&self, lease: &AttemptLease) -> Result<bool, BackendError> {
        self.check_available()?;
        let mut leases = self.leases.write().await;
        let key = (lease.user_id.clone(), lease.package_id.clone());
        if let Some(current) = leases.get(&key)
            && current.holder != lease.holder
            && !current.is_expired_at(Utc::now())
        {
            return Ok(false);
        }
        leases.insert(key, lease.clone());
        Ok(true)
    }

    async fn release_lease(
        &self,
        user_id: &str,
        package_id: &str,
        holder: &str,
    ) -> Result<(), BackendError> {
        self.check_available()?;
        let mut leases = self.leases.write().await;
        let key = (user_id.to_string(), package_id.to_string());
        if leases.get(&key).is_some_and(|l| l.holder == holder) {
            leases.remove(&key);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attempt::ScormVersion;
    use chrono::Duration as TimeDelta;

    fn lease(holder: &str, ttl_secs: i64) -> AttemptLease {
        AttemptLease {
            user_id: "u1".to_string(),
            package_id: "p1".to_string(),
            holder: holder.to_string(),
            expires_at: Utc::now() + TimeDelta::seconds(ttl_secs),
        }
    }

    #[tokio::test]
    async fn latest_attempt_is_highest_number() {
        let backend = MemoryAttemptBackend::new();
        backend
            .upsert_attempt(&Attempt::new("u1", "p1", 1, ScormVersion::Scorm12))
            .await
            .unwrap();
        backend
            .upsert_attempt(&Attempt::new("u1", "p1", 2, ScormVersion::Scorm12))
            .await
            .unwrap();
        backend
            .upsert_attempt(&Attempt::new("u1", "other", 7, ScormVersion::Scorm12))
            .await
            .unwrap();

        let latest = backend.get_latest_attempt("u1", "p1").await.unwrap().unwrap();
        assert_eq!(latest.attempt_number, 2);
        assert!(backend.get_latest_attempt("u2", "p1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn upsert_replaces_by_id() {
        let backend = MemoryAttemptBackend::new();
        let mut attempt = Attempt::new("u1", "p1", 1, ScormVersion::Scorm12);
        backend.upsert_attempt(&attempt).await.unwrap();
        attempt.location = Some("slide-2".to_string());
        backend.upsert_attempt(&attempt).await.unwrap();

        assert_eq!(backend.attempts_for("u1", "p1").await.len(), 1);
        assert_eq!(
            backend.get(&attempt.id).await.unwrap().location.as_deref(),
            Some("slide-2")
        );
    }

    #[tokio::test]
    async fn duplicate_attempt_number_conflicts() {
        let backend = MemoryAttemptBackend::new();
        backend
            .upsert_attempt(&Attempt::new("u1", "p1", 1, ScormVersion::Scorm12))
            .await
            .unwrap();
        let result = backend
            .upsert_attempt(&Attempt::new("u1", "p1", 1, ScormVersion::Scorm12))
            .await;
        assert!(matches!(result, Err(BackendError::Conflict { .. })));
    }

    #[tokio::test]
    async fn injected_failures_are_consumed() {
        let backend = MemoryAttemptBackend::new();
        let attempt = Attempt::new("u1", "p1", 1, ScormVersion::Scorm12);
        backend.fail_next(2);

        assert!(backend.upsert_attempt(&attempt).await.is_err());
        assert!(backend.upsert_attempt(&attempt).await.is_err());
        assert!(backend.upsert_attempt(&attempt).await.is_ok());
        assert_eq!(backend.upsert_count(), 1);
    }

    #[tokio::test]
    async fn unavailable_backend_rejects_reads() {
        let backend = MemoryAttemptBackend::new();
        backend.set_unavailable(true);
        assert!(matches!(
            backend.get_latest_attempt("u1", "p1").await,
            Err(BackendError::Unavailable(_))
        ));
    }

    #[tokio::test]
    async fn live_lease_excludes_other_holders() {
        let backend = MemoryAttemptBackend::new();
        assert!(backend.claim_lease(&lease("a", 60)).await.unwrap());
        assert!(!backend.claim_lease(&lease("b", 60)).await.unwrap());
        // renewal by the owner
        assert!(backend.claim_lease(&lease("a", 120)).await.unwrap());

        backend.release_lease("u1", "p1", "b").await.unwrap();
        assert_eq!(backend.lease_for("u1", "p1").await.unwrap().holder, "a");

        backend.release_lease("u1", "p1", "a").await.unwrap();
        assert!(backend.lease_for("u1", "p1").await.is_none());
        assert!(backend.claim_lease(&lease("b", 60)).await.unwrap());
    }

    #[tokio::test]
    async fn expired_lease_can_be_taken_over() {
        let backend = MemoryAttemptBackend::new();
        assert!(backend.claim_lease(&lease("a", -1)).await.unwrap());
        assert!(backend.claim_lease(&lease("b", 60)).await.unwrap());
        assert_eq!(backend.lease_for("u1", "p1").await.unwrap().holder, "b");
    }
}
