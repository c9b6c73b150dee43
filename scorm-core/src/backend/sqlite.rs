//! SQLite attempt backend
//!
//! rusqlite calls block, so the async trait methods run them on tokio's
//! blocking pool against a shared connection.

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{Connection, ErrorCode, OptionalExtension, params};

use super::migrations::Migrator;
use super::traits::{AttemptBackend, AttemptLease};
use crate::attempt::{Attempt, AttemptStatus, ScormVersion};
use crate::error::BackendError;

const SELECT_COLUMNS: &str = "id, user_id, package_id, attempt_number, version, status,
    score_raw, score_min, score_max, suspend_data, location, exit_value,
    total_time_centis, runtime_data, started_at, last_accessed_at, completed_at, terminated_at";

/// SQLite-backed attempt store
pub struct SqliteAttemptBackend {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteAttemptBackend {
    /// Open or create database at path
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, BackendError> {
        if let Some(parent) = path.as_ref().parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| {
                BackendError::Unavailable(format!("failed to create database dir: {}", e))
            })?;
        }
        Self::from_connection(Connection::open(path)?)
    }

    /// Open in-memory database (for testing)
    pub fn open_in_memory() -> Result<Self, BackendError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self, BackendError> {
        conn.busy_timeout(Duration::from_secs(5))?;
        let backend = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        backend.init()?;
        Ok(backend)
    }

    /// Run migrations
    fn init(&self) -> Result<(), BackendError> {
        let conn = self.lock()?;
        Migrator::new(&conn).migrate()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, BackendError> {
        self.conn
            .lock()
            .map_err(|_| BackendError::Unavailable("connection lock poisoned".to_string()))
    }

    /// Run `f` on the blocking pool with the connection locked
    async fn with_conn<T, F>(&self, f: F) -> Result<T, BackendError>
    where
        F: FnOnce(&Connection) -> Result<T, BackendError> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let conn = conn
                .lock()
                .map_err(|_| BackendError::Unavailable("connection lock poisoned".to_string()))?;
            f(&conn)
        })
        .await
        .map_err(|e| BackendError::Unavailable(format!("database task failed: {}", e)))?
    }

    /// Every attempt for the pair, oldest first
    pub fn list_attempts(
        &self,
        user_id: &str,
        package_id: &str,
    ) -> Result<Vec<Attempt>, BackendError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM attempts WHERE user_id = ?1 AND package_id = ?2
             ORDER BY attempt_number ASC",
            SELECT_COLUMNS
        ))?;
        let rows = stmt.query_map(params![user_id, package_id], RawAttempt::from_row)?;
        let mut attempts = Vec::new();
        for row in rows {
            attempts.push(row?.into_attempt()?);
        }
        Ok(attempts)
    }
}

/// Column values as stored, before parsing into domain types
struct RawAttempt {
    id: String,
    user_id: String,
    package_id: String,
    attempt_number: u32,
    version: String,
    status: String,
    score_raw: Option<f64>,
    score_min: Option<f64>,
    score_max: Option<f64>,
    suspend_data: Option<String>,
    location: Option<String>,
    exit: Option<String>,
    total_time_centis: i64,
    runtime_data: String,
    started_at: String,
    last_accessed_at: String,
    completed_at: Option<String>,
    terminated_at: Option<String>,
}

impl RawAttempt {
    fn from_row(row: &rusqlite::Row) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get(0)?,
            user_id: row.get(1)?,
            package_id: row.get(2)?,
            attempt_number: row.get(3)?,
            version: row.get(4)?,
            status: row.get(5)?,
            score_raw: row.get(6)?,
            score_min: row.get(7)?,
            score_max: row.get(8)?,
            suspend_data: row.get(9)?,
            location: row.get(10)?,
            exit: row.get(11)?,
            total_time_centis: row.get(12)?,
            runtime_data: row.get(13)?,
            started_at: row.get(14)?,
            last_accessed_at: row.get(15)?,
            completed_at: row.get(16)?,
            terminated_at: row.get(17)?,
        })
    }

    fn into_attempt(self) -> Result<Attempt, BackendError> {
        let id = self.id;
        let corrupt = |message: String| BackendError::Corrupt {
            id: id.clone(),
            message,
        };
        let timestamp = |value: &str| -> Result<DateTime<Utc>, BackendError> {
            DateTime::parse_from_rfc3339(value)
                .map(|t| t.with_timezone(&Utc))
                .map_err(|e| corrupt(format!("bad timestamp {:?}: {}", value, e)))
        };

        let version: ScormVersion = self.version.parse().map_err(corrupt)?;
        let status = AttemptStatus::parse(&self.status)
            .ok_or_else(|| corrupt(format!("unknown status {:?}", self.status)))?;
        let runtime_data = serde_json::from_str(&self.runtime_data)
            .map_err(|e| corrupt(format!("bad runtime data: {}", e)))?;
        let started_at = timestamp(&self.started_at)?;
        let last_accessed_at = timestamp(&self.last_accessed_at)?;
        let completed_at = self.completed_at.as_deref().map(|t| timestamp(t)).transpose()?;
        let terminated_at = self.terminated_at.as_deref().map(|t| timestamp(t)).transpose()?;

        Ok(Attempt {
            id,
            package_id: self.package_id,
            user_id: self.user_id,
            attempt_number: self.attempt_number,
            version,
            status,
            score_raw: self.score_raw,
            score_min: self.score_min,
            score_max: self.score_max,
            suspend_data: self.suspend_data,
            location: self.location,
            exit: self.exit,
            total_time_centis: self.total_time_centis.max(0) as u64,
            runtime_data,
            started_at,
            last_accessed_at,
            completed_at,
            terminated_at,
        })
    }
}

fn is_unique_violation(error: &rusqlite::Error) -> bool {
    matches!(
        error,
        rusqlite::Error::SqliteFailure(e, _) if e.code == ErrorCode::ConstraintViolation
    )
}

#[async_trait]
impl AttemptBackend for SqliteAttemptBackend {
    async fn upsert_attempt(&self, attempt: &Attempt) -> Result<(), BackendError> {
        let runtime_data = serde_json::to_string(&attempt.runtime_data).map_err(|e| {
            BackendError::Corrupt {
                id: attempt.id.clone(),
                message: format!("runtime data not serializable: {}", e),
            }
        })?;
        let total_time = i64::try_from(attempt.total_time_centis).unwrap_or(i64::MAX);
        let attempt = attempt.clone();

        self.with_conn(move |conn| {
            let result = conn.execute(
                "INSERT INTO attempts (id, user_id, package_id, attempt_number, version, status,
                    score_raw, score_min, score_max, suspend_data, location, exit_value,
                    total_time_centis, runtime_data, started_at, last_accessed_at, completed_at, terminated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18)
                 ON CONFLICT(id) DO UPDATE SET
                    status = excluded.status,
                    score_raw = excluded.score_raw,
                    score_min = excluded.score_min,
                    score_max = excluded.score_max,
                    suspend_data = excluded.suspend_data,
                    location = excluded.location,
                    exit_value = excluded.exit_value,
                    total_time_centis = excluded.total_time_centis,
                    runtime_data = excluded.runtime_data,
                    last_accessed_at = excluded.last_accessed_at,
                    completed_at = excluded.completed_at,
                    terminated_at = excluded.terminated_at",
                params![
                    attempt.id,
                    attempt.user_id,
                    attempt.package_id,
                    attempt.attempt_number,
                    attempt.version.as_str(),
                    attempt.status.as_str(),
                    attempt.score_raw,
                    attempt.score_min,
                    attempt.score_max,
                    attempt.suspend_data,
                    attempt.location,
                    attempt.exit,
                    total_time,
                    runtime_data,
                    attempt.started_at.to_rfc3339(),
                    attempt.last_accessed_at.to_rfc3339(),
                    attempt.completed_at.map(|t| t.to_rfc3339()),
                    attempt.terminated_at.map(|t| t.to_rfc3339()),
                ],
            );

            match result {
                Ok(_) => Ok(()),
                Err(e) if is_unique_violation(&e) => Err(BackendError::Conflict {
                    user_id: attempt.user_id.clone(),
                    package_id: attempt.package_id.clone(),
                    attempt_number: attempt.attempt_number,
                }),
                Err(e) => Err(e.into()),
            }
        })
        .await
    }

    async fn get_latest_attempt(
        &self,
        user_id: &str,
        package_id: &str,
    ) -> Result<Option<Attempt>, BackendError> {
        let (user_id, package_id) = (user_id.to_string(), package_id.to_string());
        let raw = self
            .with_conn(move |conn| {
                Ok(conn
                    .query_row(
                        &format!(
                            "SELECT {} FROM attempts WHERE user_id = ?1 AND package_id = ?2
                             ORDER BY attempt_number DESC LIMIT 1",
                            SELECT_COLUMNS
                        ),
                        params![user_id, package_id],
                        RawAttempt::from_row,
                    )
                    .optional()?)
            })
            .await?;
        raw.map(RawAttempt::into_attempt).transpose()
    }

    async fn claim_lease(&self, lease: &AttemptLease) -> Result<bool, BackendError> {
        let lease = lease.clone();
        let now = Utc::now().timestamp_millis();
        self.with_conn(move |conn| {
            // The update only fires for the same holder or a lapsed lease
            let changed = conn.execute(
                "INSERT INTO attempt_leases (user_id, package_id, holder, expires_at)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(user_id, package_id) DO UPDATE SET
                    holder = excluded.holder,
                    expires_at = excluded.expires_at
                 WHERE attempt_leases.holder = excluded.holder
                    OR attempt_leases.expires_at <= ?5",
                params![
                    lease.user_id,
                    lease.package_id,
                    lease.holder,
                    lease.expires_at.timestamp_millis(),
                    now,
                ],
            )?;
            Ok(changed == 1)
        })
        .await
    }

    async fn release_lease(
        &self,
        user_id: &str,
        package_id: &str,
        holder: &str,
    ) -> Result<(), BackendError> {
        let (user_id, package_id, holder) =
            (user_id.to_string(), package_id.to_string(), holder.to_string());
        self.with_conn(move |conn| {
            conn.execute(
                "DELETE FROM attempt_leases
                 WHERE user_id = ?1 AND package_id = ?2 AND holder = ?3",
                params![user_id, package_id, holder],
            )?;
            Ok(())
        })
        .await
    }
}
