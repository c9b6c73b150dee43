//! The API object content talks to
//!
//! Every operation returns the wire-level string SCOs expect: `"true"` or
//! `"false"` for lifecycle and write calls, the element value (or `""`) for
//! reads. Failures never escape as Rust errors; they land in the
//! [`ErrorReporter`] for the SCO to query.

use std::sync::{Arc, Mutex};

use tracing::{debug, info, trace, warn};

use super::errors::ErrorReporter;
use crate::cmi::CmiStore;
use crate::completion::{CompletionEvaluator, Evaluation};
use crate::dialect::{ApiFunction, ErrorCode, RteDialect};
use crate::error::{BridgeError, PersistenceError, ProtocolError};
use crate::host::HostCallbacks;
use crate::persistence::{CommitRequest, PersistenceSynchronizer, Termination};

const TRUE: &str = "true";
const FALSE: &str = "false";

/// A bridge shared between the session handle and the frames it is mounted in
pub type SharedBridge = Arc<Mutex<ApiBridge>>;

/// Lifecycle of one bridge instance
///
/// Transitions only move forward; a terminated bridge cannot be
/// re-initialized.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BridgeState {
    Uninitialized,
    Initialized,
    Terminated,
}

/// Version-specific API object bound to one attempt
pub struct ApiBridge {
    dialect: Arc<dyn RteDialect>,
    attempt_id: String,
    state: BridgeState,
    store: CmiStore,
    errors: ErrorReporter,
    evaluator: CompletionEvaluator,
    sync: Arc<PersistenceSynchronizer>,
    host: Arc<dyn HostCallbacks>,
}

impl ApiBridge {
    pub fn new(
        dialect: Arc<dyn RteDialect>,
        attempt_id: impl Into<String>,
        store: CmiStore,
        evaluator: CompletionEvaluator,
        sync: Arc<PersistenceSynchronizer>,
        host: Arc<dyn HostCallbacks>,
    ) -> Self {
        Self {
            errors: ErrorReporter::new(dialect.clone()),
            dialect,
            attempt_id: attempt_id.into(),
            state: BridgeState::Uninitialized,
            store,
            evaluator,
            sync,
            host,
        }
    }

    pub fn into_shared(self) -> SharedBridge {
        Arc::new(Mutex::new(self))
    }

    pub fn state(&self) -> BridgeState {
        self.state
    }

    pub fn is_terminated(&self) -> bool {
        self.state == BridgeState::Terminated
    }

    pub fn attempt_id(&self) -> &str {
        &self.attempt_id
    }

    /// Name of the global this bridge is published under
    pub fn global_name(&self) -> &'static str {
        self.dialect.global_name()
    }

    /// Host-side read access to the data model
    pub fn store(&self) -> &CmiStore {
        &self.store
    }

    pub fn initialize(&mut self, arg: &str) -> String {
        let function = ApiFunction::Initialize;
        let result = match self.state {
            BridgeState::Initialized => Err(ProtocolError::AlreadyInitialized),
            BridgeState::Terminated => Err(ProtocolError::InstanceTerminated),
            BridgeState::Uninitialized if !arg.is_empty() => {
                Err(ProtocolError::InvalidArgument(arg.to_string()))
            }
            BridgeState::Uninitialized => Ok(()),
        };
        match result {
            Ok(()) => {
                self.state = BridgeState::Initialized;
                self.errors.clear();
                info!(attempt_id = %self.attempt_id, version = %self.dialect.version(), "api initialized");
                TRUE.to_string()
            }
            Err(e) => self.fail(function, e.into(), FALSE),
        }
    }

    pub fn get_value(&mut self, path: &str) -> String {
        let function = ApiFunction::GetValue;
        if let Err(e) = self.require_initialized() {
            // Reads after Terminate answer "false" like every other call.
            let reply = if self.is_terminated() { FALSE } else { "" };
            return self.fail(function, e.into(), reply);
        }
        match self.store.get(path) {
            Ok(value) => {
                self.errors.clear();
                trace!(path, "get value");
                value
            }
            Err(e) => self.fail(function, e.into(), ""),
        }
    }

    pub fn set_value(&mut self, path: &str, value: &str) -> String {
        let function = ApiFunction::SetValue;
        if let Err(e) = self.require_initialized() {
            return self.fail(function, e.into(), FALSE);
        }
        match self.store.set(path, value) {
            Ok(()) => {
                self.errors.clear();
                TRUE.to_string()
            }
            Err(e) => self.fail(function, e.into(), FALSE),
        }
    }

    /// Queue the dirty set for persistence without waiting for the backend
    ///
    /// A failure from an earlier flush is reported here, once, after the new
    /// snapshot has been queued.
    pub fn commit(&mut self, arg: &str) -> String {
        let function = ApiFunction::Commit;
        if let Err(e) = self.require_initialized() {
            return self.fail(function, e.into(), FALSE);
        }
        if !arg.is_empty() {
            return self.fail(
                function,
                ProtocolError::InvalidArgument(arg.to_string()).into(),
                FALSE,
            );
        }
        let evaluation = match self.flush(None) {
            Ok(evaluation) => evaluation,
            Err(e) => return self.fail(function, e.into(), FALSE),
        };
        self.report(&evaluation);
        if let Some(failure) = self.sync.take_failure() {
            return self.fail(function, failure.into(), FALSE);
        }
        self.errors.clear();
        TRUE.to_string()
    }

    /// Final commit, then close the bridge
    ///
    /// A persistence failure not yet reported to the SCO makes this answer
    /// `"false"`, but the bridge still closes.
    pub fn terminate(&mut self, arg: &str) -> String {
        let function = ApiFunction::Terminate;
        if let Err(e) = self.require_initialized() {
            return self.fail(function, e.into(), FALSE);
        }
        if !arg.is_empty() {
            return self.fail(
                function,
                ProtocolError::InvalidArgument(arg.to_string()).into(),
                FALSE,
            );
        }

        let bindings = self.dialect.bindings();
        let exit = self.store.value(bindings.exit).map(str::to_string);
        let session_time = self
            .store
            .value(bindings.session_time)
            .and_then(|value| self.dialect.parse_session_time(value));
        let close = exit.as_deref() != Some("suspend")
            && self.evaluator.assess(&self.store).status.is_terminal();

        let termination = Termination {
            exit,
            session_time_centis: session_time,
            close,
        };
        let evaluation = match self.flush(Some(termination)) {
            Ok(evaluation) => evaluation,
            Err(e) => return self.fail(function, e.into(), FALSE),
        };

        self.state = BridgeState::Terminated;
        self.report(&evaluation);
        info!(
            attempt_id = %self.attempt_id,
            status = %evaluation.status,
            closed = close,
            "api terminated"
        );
        // Last call the SCO will get an error code from.
        if let Some(failure) = self.sync.take_failure() {
            return self.fail(function, failure.into(), FALSE);
        }
        self.errors.clear();
        TRUE.to_string()
    }

    pub fn get_last_error(&self) -> String {
        self.errors.last_error().to_string()
    }

    pub fn get_error_string(&self, code: &str) -> String {
        self.errors.error_string(code)
    }

    pub fn get_diagnostic(&self, code: &str) -> String {
        self.errors.diagnostic(code)
    }

    /// Numeric form of the last error
    pub fn last_error_code(&self) -> ErrorCode {
        self.errors.last_error()
    }

    /// Dispatch a call by its wire name
    ///
    /// Missing arguments are treated as empty strings.
    pub fn invoke(&mut self, name: &str, args: &[&str]) -> String {
        let arg = |idx: usize| args.get(idx).copied().unwrap_or("");
        let Some(function) = self.dialect.function(name) else {
            let error = ProtocolError::UnknownFunction(name.to_string());
            return self.fail(ApiFunction::GetLastError, error.into(), FALSE);
        };
        match function {
            ApiFunction::Initialize => self.initialize(arg(0)),
            ApiFunction::Terminate => self.terminate(arg(0)),
            ApiFunction::GetValue => self.get_value(arg(0)),
            ApiFunction::SetValue => self.set_value(arg(0), arg(1)),
            ApiFunction::Commit => self.commit(arg(0)),
            ApiFunction::GetLastError => self.get_last_error(),
            ApiFunction::GetErrorString => self.get_error_string(arg(0)),
            ApiFunction::GetDiagnostic => self.get_diagnostic(arg(0)),
        }
    }

    /// Best-effort flush when the frame goes away without Terminate
    ///
    /// Leaves the bridge state alone; returns whether anything was queued.
    pub fn flush_on_unload(&mut self) -> bool {
        if self.state != BridgeState::Initialized || !self.store.is_dirty() {
            return false;
        }
        match self.flush(None) {
            Ok(evaluation) => {
                self.report(&evaluation);
                debug!(attempt_id = %self.attempt_id, "dirty values flushed on unload");
                true
            }
            Err(e) => {
                warn!(attempt_id = %self.attempt_id, error = %e, "unload flush failed");
                false
            }
        }
    }

    fn require_initialized(&self) -> Result<(), ProtocolError> {
        match self.state {
            BridgeState::Initialized => Ok(()),
            BridgeState::Uninitialized => Err(ProtocolError::NotInitialized),
            BridgeState::Terminated => Err(ProtocolError::AlreadyTerminated),
        }
    }

    /// Snapshot the dirty set, evaluate, and hand the snapshot to persistence
    ///
    /// The dirty set is only cleared once the snapshot is queued, so nothing
    /// staged is lost if queueing fails.
    fn flush(&mut self, termination: Option<Termination>) -> Result<Evaluation, PersistenceError> {
        let snapshot = self.store.dirty_snapshot();
        let evaluation = self.evaluator.assess(&self.store);
        self.sync.commit(CommitRequest {
            values: snapshot.values(),
            status: Some(evaluation.status),
            termination,
        })?;
        self.store.clear_dirty(&snapshot);
        self.evaluator.record(&evaluation);
        Ok(evaluation)
    }

    fn report(&self, evaluation: &Evaluation) {
        if evaluation.notify {
            info!(attempt_id = %self.attempt_id, status = %evaluation.status, "attempt reached terminal status");
            self.host.on_complete(evaluation.status, evaluation.score);
        }
    }

    fn fail(&mut self, function: ApiFunction, error: BridgeError, reply: &str) -> String {
        let code = self.errors.record(function, &error);
        debug!(
            function = self.dialect.function_name(function),
            code = code.0,
            error = %error,
            "api call failed"
        );
        reply.to_string()
    }
}

impl std::fmt::Debug for ApiBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiBridge")
            .field("version", &self.dialect.version())
            .field("attempt_id", &self.attempt_id)
            .field("state", &self.state)
            .field("last_error", &self.errors.last_error())
            .finish()
    }
}
