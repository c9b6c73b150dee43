//! AttemptBackend trait
//!
//! The backend is the system of record for attempts. The session manager
//! reads the latest attempt when a session opens, and the persistence
//! synchronizer is the only writer while the session is live. Writers
//! in different processes are kept apart by a lease on the
//! `(user_id, package_id)` pair.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::attempt::Attempt;
use crate::error::BackendError;

/// A claim on the right to write attempts for one learner and package
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttemptLease {
    pub user_id: String,
    pub package_id: String,
    /// Opaque id of the session manager holding the claim
    pub holder: String,
    pub expires_at: DateTime<Utc>,
}

impl AttemptLease {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

/// Durable storage for attempt records
#[async_trait]
pub trait AttemptBackend: Send + Sync {
    /// Insert or replace the attempt keyed by its id
    ///
    /// Must reject a second row with the same
    /// `(user_id, package_id, attempt_number)` under a different id.
    async fn upsert_attempt(&self, attempt: &Attempt) -> Result<(), BackendError>;

    /// Highest-numbered attempt for the pair, if any
    async fn get_latest_attempt(
        &self,
        user_id: &str,
        package_id: &str,
    ) -> Result<Option<Attempt>, BackendError>;

    /// Take or renew the lease for the pair
    ///
    /// Returns `false` while another holder's lease is unexpired. The same
    /// holder may claim again at any time, which also extends `expires_at`.
    async fn claim_lease(&self, lease: &AttemptLease) -> Result<bool, BackendError>;

    /// Give up the lease if `holder` still owns it
    async fn release_lease(
        &self,
        user_id: &str,
        package_id: &str,
        holder: &str,
    ) -> Result<(), BackendError>;
}
