//! Concurrency tests for SessionManager
//!
//! Only one session per (user, package) may be live, no matter how the
//! opens interleave or how many managers share the database.

use std::sync::Arc;
use std::time::Duration;

use scorm_core::{
    MemoryAttemptBackend, OpenRequest, RecordingHost, RteConfig, ScormVersion, SessionError,
    SessionManager, SqliteAttemptBackend,
};
use tempfile::TempDir;

async fn create_test_manager(dir: &TempDir) -> (Arc<MemoryAttemptBackend>, Arc<SessionManager>) {
    let backend = Arc::new(MemoryAttemptBackend::new());
    // Slow writes widen the window in which two opens overlap.
    backend.set_latency(Duration::from_millis(20));
    let mut config = RteConfig::default();
    config.persistence.replay_dir = dir.path().to_path_buf();
    let manager = SessionManager::from_config(backend.clone(), config)
        .await
        .unwrap();
    (backend, Arc::new(manager))
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_opens_create_exactly_one_attempt() {
    let dir = TempDir::new().unwrap();
    let (backend, manager) = create_test_manager(&dir).await;
    let host = Arc::new(RecordingHost::new());

    let opens = (0..8).map(|_| {
        let manager = manager.clone();
        let host = host.clone();
        tokio::spawn(async move {
            manager
                .open(OpenRequest::new("u1", "p1", ScormVersion::Scorm2004), host)
                .await
        })
    });
    let results: Vec<_> = join_all(opens).await;

    let mut sessions = Vec::new();
    let mut refused = 0;
    for result in results {
        match result {
            Ok(session) => sessions.push(session),
            Err(SessionError::AttemptInProgress { .. }) => refused += 1,
            Err(other) => panic!("unexpected error: {}", other),
        }
    }
    assert_eq!(sessions.len(), 1);
    assert_eq!(refused, 7);
    assert_eq!(host.errors().len(), 7);

    sessions[0].wait_synced().await;
    assert_eq!(backend.attempts_for("u1", "p1").await.len(), 1);
}

#[tokio::test]
async fn refusal_names_the_live_attempt() {
    let dir = TempDir::new().unwrap();
    let (backend, manager) = create_test_manager(&dir).await;
    let host = Arc::new(RecordingHost::new());

    let first = manager
        .open(OpenRequest::new("u1", "p1", ScormVersion::Scorm12), host.clone())
        .await
        .unwrap();
    let second = manager
        .open(OpenRequest::new("u1", "p1", ScormVersion::Scorm12), host.clone())
        .await;

    let Err(SessionError::AttemptInProgress { attempt_id, .. }) = second else {
        panic!("second open should be refused");
    };
    assert_eq!(attempt_id.as_deref(), Some(first.attempt_id()));
    assert!(host.errors()[0].contains("already in progress"));

    first.wait_synced().await;
    assert_eq!(backend.attempts_for("u1", "p1").await.len(), 1);
}

#[tokio::test]
async fn reopen_after_unmount_resumes_same_attempt() {
    let dir = TempDir::new().unwrap();
    let (backend, manager) = create_test_manager(&dir).await;

    let first = manager
        .open(
            OpenRequest::new("u1", "p1", ScormVersion::Scorm12),
            Arc::new(RecordingHost::new()),
        )
        .await
        .unwrap();
    let id = first.attempt_id().to_string();
    first.close().await;

    let second = manager
        .open(
            OpenRequest::new("u1", "p1", ScormVersion::Scorm12),
            Arc::new(RecordingHost::new()),
        )
        .await
        .unwrap();
    assert!(second.is_resumed());
    assert_eq!(second.attempt_id(), id);
    assert_eq!(backend.attempts_for("u1", "p1").await.len(), 1);
}

#[tokio::test]
async fn different_learners_open_in_parallel() {
    let dir = TempDir::new().unwrap();
    let (_backend, manager) = create_test_manager(&dir).await;

    let (a, b) = tokio::join!(
        manager.open(
            OpenRequest::new("u1", "p1", ScormVersion::Scorm12),
            Arc::new(RecordingHost::new()),
        ),
        manager.open(
            OpenRequest::new("u2", "p1", ScormVersion::Scorm12),
            Arc::new(RecordingHost::new()),
        ),
    );
    assert!(a.is_ok());
    assert!(b.is_ok());
    assert_eq!(manager.active_count(), 2);
}

#[tokio::test]
async fn managers_sharing_a_database_keep_one_writer() {
    let db_dir = TempDir::new().unwrap();
    let db = db_dir.path().join("attempts.db");
    let (dir_a, dir_b) = (TempDir::new().unwrap(), TempDir::new().unwrap());
    let manager_for = |dir: &TempDir| {
        let mut config = RteConfig::default();
        config.persistence.replay_dir = dir.path().to_path_buf();
        config.storage.database = db.clone();
        config
    };
    let host_a = SessionManager::from_config(
        Arc::new(SqliteAttemptBackend::open(&db).unwrap()),
        manager_for(&dir_a),
    )
    .await
    .unwrap();
    let host_b = SessionManager::from_config(
        Arc::new(SqliteAttemptBackend::open(&db).unwrap()),
        manager_for(&dir_b),
    )
    .await
    .unwrap();
    let recorder = Arc::new(RecordingHost::new());

    let first = host_a
        .open(OpenRequest::new("u1", "p1", ScormVersion::Scorm12), recorder.clone())
        .await
        .unwrap();
    first.invoke("LMSInitialize", &[""]);
    first.invoke("LMSSetValue", &["cmi.suspend_data", "from-a"]);
    first.invoke("LMSSetValue", &["cmi.core.exit", "suspend"]);
    first.invoke("LMSCommit", &[""]);
    first.wait_synced().await;

    let refused = host_b
        .open(OpenRequest::new("u1", "p1", ScormVersion::Scorm12), recorder.clone())
        .await;
    let Err(SessionError::AttemptInProgress { attempt_id, .. }) = refused else {
        panic!("second manager should be refused");
    };
    assert_eq!(attempt_id.as_deref(), Some(first.attempt_id()));
    assert_eq!(recorder.errors().len(), 1);

    let id = first.attempt_id().to_string();
    first.close().await;

    let second = host_b
        .open(OpenRequest::new("u1", "p1", ScormVersion::Scorm12), recorder.clone())
        .await
        .unwrap();
    assert!(second.is_resumed());
    assert_eq!(second.attempt_id(), id);
    second.invoke("LMSInitialize", &[""]);
    assert_eq!(second.invoke("LMSGetValue", &["cmi.suspend_data"]), "from-a");
}

async fn join_all<T: Send + 'static>(
    handles: impl Iterator<Item = tokio::task::JoinHandle<T>>,
) -> Vec<T> {
    let mut results = Vec::new();
    for handle in handles.collect::<Vec<_>>() {
        results.push(handle.await.unwrap());
    }
    results
}
