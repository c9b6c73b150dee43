//! Error types for scorm-core
//!
//! Protocol and validation errors never cross the API bridge as Rust errors:
//! the bridge converts them into the active version's numeric codes. The
//! remaining families escalate to the host.

use thiserror::Error;

/// Top-level error type for scorm-core
#[derive(Error, Debug)]
pub enum RteError {
    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    #[error("Persistence error: {0}")]
    Persistence(#[from] PersistenceError),

    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),

    #[error("Replay queue error: {0}")]
    Replay(#[from] ReplayError),

    #[error("Frame error: {0}")]
    Frame(#[from] FrameError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

/// Wrong call order on the API bridge
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("not initialized")]
    NotInitialized,

    #[error("already initialized")]
    AlreadyInitialized,

    #[error("content instance terminated")]
    InstanceTerminated,

    #[error("already terminated")]
    AlreadyTerminated,

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("unknown API function: {0}")]
    UnknownFunction(String),
}

/// Data model validation failures raised by the CMI store
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CmiError {
    #[error("empty element name")]
    EmptyPath { write: bool },

    #[error("undefined data model element: {0}")]
    Undefined(String),

    #[error("element value not initialized: {0}")]
    NotInitialized(String),

    #[error("element is read only: {0}")]
    ReadOnly(String),

    #[error("element is write only: {0}")]
    WriteOnly(String),

    #[error("element is a keyword and cannot be set: {0}")]
    Keyword(String),

    #[error("type mismatch for {path}: {value:?}")]
    TypeMismatch { path: String, value: String },

    #[error("value out of range for {path}: {value:?}")]
    OutOfRange { path: String, value: String },

    #[error("collection index out of sequence: {0}")]
    IndexOutOfSequence(String),

    #[error("collection index out of range: {0}")]
    IndexOutOfRange(String),

    #[error("dependency not established: {0}")]
    DependencyNotEstablished(String),
}

/// Any failure of a single bridge call
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BridgeError {
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    Validation(#[from] CmiError),

    #[error(transparent)]
    Persistence(#[from] PersistenceError),
}

/// Failures flushing attempt state to the backend
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PersistenceError {
    #[error("commit could not be queued: synchronizer is closed")]
    Closed,

    #[error("backend write failed after {attempts} attempts: {message}")]
    RetriesExhausted { attempts: u32, message: String },

    #[error("progress not yet confirmed by the backend: {0}")]
    Unconfirmed(String),
}

/// Attempt lifecycle errors escalated to the host
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("An attempt for user {user_id} on package {package_id} is already in progress")]
    AttemptInProgress {
        user_id: String,
        package_id: String,
        attempt_id: Option<String>,
    },

    #[error("Session already closed")]
    Closed,

    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),

    #[error("Frame error: {0}")]
    Frame(#[from] FrameError),
}

/// Errors from attempt storage backends
#[derive(Error, Debug)]
pub enum BackendError {
    #[error("Backend unavailable: {0}")]
    Unavailable(String),

    #[error("Attempt number {attempt_number} already exists for user {user_id} on package {package_id}")]
    Conflict {
        user_id: String,
        package_id: String,
        attempt_number: u32,
    },

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Corrupt attempt row {id}: {message}")]
    Corrupt { id: String, message: String },
}

/// Errors from the durable replay queue
#[derive(Error, Debug)]
pub enum ReplayError {
    #[error("failed to read replay queue: {0}")]
    Read(#[source] std::io::Error),

    #[error("failed to write replay queue: {0}")]
    Write(#[source] std::io::Error),

    #[error("failed to serialize replay queue: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Errors from the frame registry
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    #[error("Frame not found: {0}")]
    NotFound(u64),

    #[error("Global {name} already attached to frame {frame}")]
    AlreadyAttached { frame: u64, name: String },
}

/// Errors loading configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid value for {field}: {message}")]
    Invalid { field: String, message: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn protocol_error_messages_match_scorm_wording() {
        assert_eq!(
            ProtocolError::AlreadyInitialized.to_string(),
            "already initialized"
        );
        assert_eq!(
            ProtocolError::AlreadyTerminated.to_string(),
            "already terminated"
        );
    }

    #[test]
    fn cmi_error_type_mismatch_displays_path_and_value() {
        let error = CmiError::TypeMismatch {
            path: "cmi.core.score.raw".to_string(),
            value: "eighty".to_string(),
        };
        let text = error.to_string();
        assert!(text.contains("cmi.core.score.raw"));
        assert!(text.contains("eighty"));
    }

    #[test]
    fn session_error_in_progress_names_the_pair() {
        let error = SessionError::AttemptInProgress {
            user_id: "u1".to_string(),
            package_id: "p1".to_string(),
            attempt_id: None,
        };
        let text = error.to_string();
        assert!(text.contains("already in progress"));
        assert!(text.contains("u1"));
        assert!(text.contains("p1"));
    }

    #[test]
    fn persistence_error_retries_exhausted_displays_count() {
        let error = PersistenceError::RetriesExhausted {
            attempts: 3,
            message: "connection refused".to_string(),
        };
        assert!(error.to_string().contains("3 attempts"));
        assert!(error.to_string().contains("connection refused"));
    }

    #[test]
    fn bridge_error_converts_from_families() {
        let from_protocol: BridgeError = ProtocolError::NotInitialized.into();
        assert!(matches!(from_protocol, BridgeError::Protocol(_)));

        let from_cmi: BridgeError = CmiError::Undefined("cmi.x".to_string()).into();
        assert!(matches!(from_cmi, BridgeError::Validation(_)));

        let from_persistence: BridgeError = PersistenceError::Closed.into();
        assert!(matches!(from_persistence, BridgeError::Persistence(_)));
    }

    #[test]
    fn rte_error_converts_from_session_error() {
        let session_error = SessionError::Closed;
        let error: RteError = session_error.into();
        assert!(matches!(error, RteError::Session(_)));
        assert!(error.to_string().contains("Session error"));
    }

    #[test]
    fn session_error_converts_from_backend_error() {
        let backend_error = BackendError::Unavailable("down".to_string());
        let session_error: SessionError = backend_error.into();
        assert!(matches!(session_error, SessionError::Backend(_)));
    }
}
