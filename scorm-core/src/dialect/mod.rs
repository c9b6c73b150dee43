//! Version dialects
//!
//! Everything that differs between SCORM 1.2 and SCORM 2004 lives behind
//! [`RteDialect`]: wire function names, the element catalog, the error-code
//! vocabulary, and how attempt columns map onto CMI paths. A dialect is
//! picked once per session with [`dialect_for`].

pub mod scorm12;
pub mod scorm2004;

use std::fmt;
use std::sync::Arc;

use crate::attempt::{Attempt, AttemptStatus, LaunchContext, ScormVersion};
use crate::cmi::{CmiSchema, CmiStore, parse_decimal};
use crate::error::BridgeError;

pub use scorm12::Scorm12;
pub use scorm2004::Scorm2004;

/// Operations of the bridge's function family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ApiFunction {
    Initialize,
    Terminate,
    GetValue,
    SetValue,
    Commit,
    GetLastError,
    GetErrorString,
    GetDiagnostic,
}

/// Numeric SCORM error code; `0` means no error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ErrorCode(pub u16);

impl ErrorCode {
    pub const NONE: ErrorCode = ErrorCode(0);

    pub fn is_error(&self) -> bool {
        self.0 != 0
    }

    /// Parse a code as passed by content, e.g. `"401"`
    pub fn parse(code: &str) -> Option<Self> {
        code.trim().parse::<u16>().ok().map(ErrorCode)
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// CMI paths backing the attempt's dedicated columns
#[derive(Debug)]
pub struct AttemptBindings {
    pub location: &'static str,
    pub suspend_data: &'static str,
    pub exit: &'static str,
    pub session_time: &'static str,
}

/// Mastery threshold supplied by the host at launch
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PassingThreshold {
    /// SCORM 1.2 mastery score on a 0-100 scale
    Percent(f64),
    /// SCORM 2004 scaled passing score on a -1..1 scale
    Scaled(f64),
}

impl PassingThreshold {
    pub fn as_percent(&self) -> f64 {
        match self {
            Self::Percent(p) => *p,
            Self::Scaled(s) => s * 100.0,
        }
    }
}

/// Score elements as currently held by the store
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ScoreReading {
    pub raw: Option<f64>,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub scaled: Option<f64>,
}

impl ScoreReading {
    pub(crate) fn read(store: &CmiStore, raw: &str, min: &str, max: &str) -> Self {
        let number = |path: &str| store.value(path).and_then(parse_decimal);
        Self {
            raw: number(raw),
            min: number(min),
            max: number(max),
            scaled: None,
        }
    }

    /// Score on a 0-100 scale
    ///
    /// Prefers the scaled score, then raw normalized by its bounds, then raw
    /// as-is (1.2 raw scores are already percentages by convention).
    pub fn percent(&self) -> Option<f64> {
        if let Some(scaled) = self.scaled {
            return Some(scaled * 100.0);
        }
        let raw = self.raw?;
        match self.max {
            Some(max) => {
                let min = self.min.unwrap_or(0.0);
                if max > min {
                    Some((raw - min) / (max - min) * 100.0)
                } else {
                    None
                }
            }
            None => Some(raw),
        }
    }
}

/// What the SCO has reported so far, in version-neutral terms
#[derive(Debug, Clone, PartialEq)]
pub struct ReportedOutcome {
    /// Completion as reported, `None` when unknown
    pub completion: Option<AttemptStatus>,
    /// Pass/fail as reported, `None` when unknown
    pub success: Option<bool>,
    pub score: ScoreReading,
    pub threshold: Option<PassingThreshold>,
    /// Whether the attempt counts for credit
    pub credit: bool,
}

/// Version-specific behavior of the run-time environment
pub trait RteDialect: Send + Sync + fmt::Debug {
    fn version(&self) -> ScormVersion;

    /// Name of the global object content looks up
    fn global_name(&self) -> &'static str;

    /// Map a wire function name to an operation
    fn function(&self, name: &str) -> Option<ApiFunction>;

    /// Wire name of an operation
    fn function_name(&self, function: ApiFunction) -> &'static str;

    fn schema(&self) -> &'static CmiSchema;

    fn bindings(&self) -> &'static AttemptBindings;

    /// Code reported for a failed call of `function`
    fn error_code(&self, function: ApiFunction, error: &BridgeError) -> ErrorCode;

    /// Short description of a code, `None` if the version does not define it
    fn error_string(&self, code: ErrorCode) -> Option<&'static str>;

    /// Values to seed the store with when a session opens
    fn seed_values(&self, attempt: &Attempt, launch: &LaunchContext) -> Vec<(String, String)>;

    fn reported_outcome(&self, store: &CmiStore) -> ReportedOutcome;

    /// Parse the session time element into hundredths of a second
    fn parse_session_time(&self, value: &str) -> Option<u64>;
}

/// Select the dialect for a package version
pub fn dialect_for(version: ScormVersion) -> Arc<dyn RteDialect> {
    match version {
        ScormVersion::Scorm12 => Arc::new(Scorm12),
        ScormVersion::Scorm2004 => Arc::new(Scorm2004),
    }
}

/// Entry value for a session opening on `attempt`
pub(crate) fn entry_for(attempt: &Attempt) -> &'static str {
    if attempt.is_suspended() {
        "resume"
    } else if attempt.status == AttemptStatus::NotAttempted && attempt.runtime_data.is_empty() {
        "ab-initio"
    } else {
        ""
    }
}
