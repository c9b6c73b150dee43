//! SCORM 2004 run-time environment (`API_1484_11`)

use super::{
    ApiFunction, AttemptBindings, ErrorCode, PassingThreshold, ReportedOutcome, RteDialect,
    ScoreReading, entry_for,
};
use crate::attempt::{Attempt, AttemptStatus, LaunchContext, ScormVersion};
use crate::cmi::timespan::{format_duration, parse_duration};
use crate::cmi::types::{CmiSchema, DataType, ElementSpec, ScorePaths};
use crate::cmi::{CmiStore, format_decimal, parse_decimal};
use crate::error::{BridgeError, CmiError, ProtocolError};

const COMPLETION_STATUS: &[&str] = &["completed", "incomplete", "not attempted", "unknown"];
const SUCCESS_STATUS: &[&str] = &["passed", "failed", "unknown"];
const CREDIT: &[&str] = &["credit", "no-credit"];
const ENTRY: &[&str] = &["ab-initio", "resume", ""];
const EXIT: &[&str] = &["time-out", "suspend", "logout", "normal", ""];
const MODE: &[&str] = &["browse", "normal", "review"];
const TIME_LIMIT_ACTION: &[&str] = &[
    "exit,message",
    "continue,message",
    "exit,no message",
    "continue,no message",
];
const INTERACTION_TYPE: &[&str] = &[
    "true-false",
    "choice",
    "fill-in",
    "long-fill-in",
    "matching",
    "performance",
    "sequencing",
    "likert",
    "numeric",
    "other",
];
const INTERACTION_RESULT: &[&str] = &["correct", "incorrect", "unanticipated", "neutral"];
const AUDIO_CAPTIONING: &[&str] = &["-1", "0", "1"];

const REAL: DataType = DataType::Decimal {
    min: None,
    max: None,
    blank: false,
};
const SCALED: DataType = DataType::Decimal {
    min: Some(-1.0),
    max: Some(1.0),
    blank: false,
};
const UNIT: DataType = DataType::Decimal {
    min: Some(0.0),
    max: Some(1.0),
    blank: false,
};
const NON_NEGATIVE: DataType = DataType::Decimal {
    min: Some(0.0),
    max: None,
    blank: false,
};
const LONG_IDENTIFIER: DataType = DataType::Identifier { max: 4000 };
const TEXT250: DataType = DataType::Text { max: 250 };
const TEXT4000: DataType = DataType::Text { max: 4000 };

static SCHEMA: CmiSchema = CmiSchema {
    elements: &[
        ElementSpec::ro("cmi._version", DataType::Constant("1.0")),
        ElementSpec::ro(
            "cmi.comments_from_learner._children",
            DataType::Constant("comment,location,timestamp"),
        ),
        ElementSpec::ro("cmi.comments_from_learner._count", DataType::Count),
        ElementSpec::rw("cmi.comments_from_learner.n.comment", TEXT4000),
        ElementSpec::rw("cmi.comments_from_learner.n.location", TEXT250),
        ElementSpec::rw("cmi.comments_from_learner.n.timestamp", DataType::Timestamp),
        ElementSpec::ro(
            "cmi.comments_from_lms._children",
            DataType::Constant("comment,location,timestamp"),
        ),
        ElementSpec::ro("cmi.comments_from_lms._count", DataType::Count),
        ElementSpec::ro("cmi.comments_from_lms.n.comment", TEXT4000),
        ElementSpec::ro("cmi.comments_from_lms.n.location", TEXT250),
        ElementSpec::ro("cmi.comments_from_lms.n.timestamp", DataType::Timestamp),
        ElementSpec::rw(
            "cmi.completion_status",
            DataType::Vocabulary(COMPLETION_STATUS),
        ),
        ElementSpec::ro("cmi.completion_threshold", UNIT),
        ElementSpec::ro("cmi.credit", DataType::Vocabulary(CREDIT)),
        ElementSpec::ro("cmi.entry", DataType::Vocabulary(ENTRY)),
        ElementSpec::wo("cmi.exit", DataType::Vocabulary(EXIT)),
        ElementSpec::ro(
            "cmi.interactions._children",
            DataType::Constant(
                "id,type,objectives,timestamp,correct_responses,weighting,learner_response,result,latency,description",
            ),
        ),
        ElementSpec::ro("cmi.interactions._count", DataType::Count),
        ElementSpec::rw("cmi.interactions.n.id", LONG_IDENTIFIER),
        ElementSpec::rw(
            "cmi.interactions.n.type",
            DataType::Vocabulary(INTERACTION_TYPE),
        ),
        ElementSpec::ro("cmi.interactions.n.objectives._count", DataType::Count),
        ElementSpec::rw("cmi.interactions.n.objectives.n.id", LONG_IDENTIFIER),
        ElementSpec::rw("cmi.interactions.n.timestamp", DataType::Timestamp),
        ElementSpec::ro("cmi.interactions.n.correct_responses._count", DataType::Count),
        ElementSpec::rw("cmi.interactions.n.correct_responses.n.pattern", TEXT4000),
        ElementSpec::rw("cmi.interactions.n.weighting", REAL),
        ElementSpec::rw("cmi.interactions.n.learner_response", TEXT4000),
        ElementSpec::rw(
            "cmi.interactions.n.result",
            DataType::VocabularyOrDecimal(INTERACTION_RESULT),
        ),
        ElementSpec::rw("cmi.interactions.n.latency", DataType::Duration),
        ElementSpec::rw("cmi.interactions.n.description", TEXT250),
        ElementSpec::ro("cmi.launch_data", TEXT4000),
        ElementSpec::ro("cmi.learner_id", LONG_IDENTIFIER),
        ElementSpec::ro("cmi.learner_name", TEXT250),
        ElementSpec::ro(
            "cmi.learner_preference._children",
            DataType::Constant("audio_level,language,delivery_speed,audio_captioning"),
        ),
        ElementSpec::rw("cmi.learner_preference.audio_level", NON_NEGATIVE),
        ElementSpec::rw("cmi.learner_preference.language", TEXT250),
        ElementSpec::rw("cmi.learner_preference.delivery_speed", NON_NEGATIVE),
        ElementSpec::rw(
            "cmi.learner_preference.audio_captioning",
            DataType::Vocabulary(AUDIO_CAPTIONING),
        ),
        ElementSpec::rw("cmi.location", DataType::Text { max: 1000 }),
        ElementSpec::ro("cmi.max_time_allowed", DataType::Duration),
        ElementSpec::ro("cmi.mode", DataType::Vocabulary(MODE)),
        ElementSpec::ro(
            "cmi.objectives._children",
            DataType::Constant(
                "id,score,success_status,completion_status,progress_measure,description",
            ),
        ),
        ElementSpec::ro("cmi.objectives._count", DataType::Count),
        ElementSpec::rw("cmi.objectives.n.id", LONG_IDENTIFIER),
        ElementSpec::ro(
            "cmi.objectives.n.score._children",
            DataType::Constant("scaled,raw,min,max"),
        ),
        ElementSpec::rw("cmi.objectives.n.score.scaled", SCALED),
        ElementSpec::rw("cmi.objectives.n.score.raw", REAL),
        ElementSpec::rw("cmi.objectives.n.score.min", REAL),
        ElementSpec::rw("cmi.objectives.n.score.max", REAL),
        ElementSpec::rw(
            "cmi.objectives.n.success_status",
            DataType::Vocabulary(SUCCESS_STATUS),
        ),
        ElementSpec::rw(
            "cmi.objectives.n.completion_status",
            DataType::Vocabulary(COMPLETION_STATUS),
        ),
        ElementSpec::rw("cmi.objectives.n.progress_measure", UNIT),
        ElementSpec::rw("cmi.objectives.n.description", TEXT250),
        ElementSpec::rw("cmi.progress_measure", UNIT),
        ElementSpec::ro("cmi.scaled_passing_score", SCALED),
        ElementSpec::ro(
            "cmi.score._children",
            DataType::Constant("scaled,raw,min,max"),
        ),
        ElementSpec::rw("cmi.score.scaled", SCALED),
        ElementSpec::rw("cmi.score.raw", REAL),
        ElementSpec::rw("cmi.score.min", REAL),
        ElementSpec::rw("cmi.score.max", REAL),
        ElementSpec::wo("cmi.session_time", DataType::Duration),
        ElementSpec::rw("cmi.success_status", DataType::Vocabulary(SUCCESS_STATUS)),
        ElementSpec::rw("cmi.suspend_data", DataType::Text { max: 64000 }),
        ElementSpec::ro(
            "cmi.time_limit_action",
            DataType::Vocabulary(TIME_LIMIT_ACTION),
        ),
        ElementSpec::ro("cmi.total_time", DataType::Duration),
    ],
    score: ScorePaths {
        raw: "cmi.score.raw",
        min: "cmi.score.min",
        max: "cmi.score.max",
    },
    require_collection_id: true,
};

static BINDINGS: AttemptBindings = AttemptBindings {
    location: "cmi.location",
    suspend_data: "cmi.suspend_data",
    exit: "cmi.exit",
    session_time: "cmi.session_time",
};

const COMPLETION_STATUS_PATH: &str = "cmi.completion_status";
const SUCCESS_STATUS_PATH: &str = "cmi.success_status";
const SCALED_SCORE_PATH: &str = "cmi.score.scaled";
const PASSING_SCORE_PATH: &str = "cmi.scaled_passing_score";
const THRESHOLD_PATH: &str = "cmi.completion_threshold";
const PROGRESS_PATH: &str = "cmi.progress_measure";
const CREDIT_PATH: &str = "cmi.credit";

/// SCORM 2004 (4th edition run-time)
#[derive(Debug, Clone, Copy, Default)]
pub struct Scorm2004;

fn completion_status(status: AttemptStatus) -> &'static str {
    match status {
        AttemptStatus::NotAttempted => "unknown",
        AttemptStatus::Incomplete => "incomplete",
        AttemptStatus::Completed | AttemptStatus::Passed | AttemptStatus::Failed => "completed",
    }
}

fn success_status(status: AttemptStatus) -> &'static str {
    match status {
        AttemptStatus::Passed => "passed",
        AttemptStatus::Failed => "failed",
        _ => "unknown",
    }
}

/// Per-function code for calls made in the wrong lifecycle state
fn lifecycle_code(function: ApiFunction, terminated: bool) -> u16 {
    match (function, terminated) {
        (ApiFunction::Terminate, false) => 112,
        (ApiFunction::Terminate, true) => 113,
        (ApiFunction::GetValue, false) => 122,
        (ApiFunction::GetValue, true) => 123,
        (ApiFunction::SetValue, false) => 132,
        (ApiFunction::SetValue, true) => 133,
        (ApiFunction::Commit, false) => 142,
        (ApiFunction::Commit, true) => 143,
        _ => 101,
    }
}

impl RteDialect for Scorm2004 {
    fn version(&self) -> ScormVersion {
        ScormVersion::Scorm2004
    }

    fn global_name(&self) -> &'static str {
        "API_1484_11"
    }

    fn function(&self, name: &str) -> Option<ApiFunction> {
        match name {
            "Initialize" => Some(ApiFunction::Initialize),
            "Terminate" => Some(ApiFunction::Terminate),
            "GetValue" => Some(ApiFunction::GetValue),
            "SetValue" => Some(ApiFunction::SetValue),
            "Commit" => Some(ApiFunction::Commit),
            "GetLastError" => Some(ApiFunction::GetLastError),
            "GetErrorString" => Some(ApiFunction::GetErrorString),
            "GetDiagnostic" => Some(ApiFunction::GetDiagnostic),
            _ => None,
        }
    }

    fn function_name(&self, function: ApiFunction) -> &'static str {
        match function {
            ApiFunction::Initialize => "Initialize",
            ApiFunction::Terminate => "Terminate",
            ApiFunction::GetValue => "GetValue",
            ApiFunction::SetValue => "SetValue",
            ApiFunction::Commit => "Commit",
            ApiFunction::GetLastError => "GetLastError",
            ApiFunction::GetErrorString => "GetErrorString",
            ApiFunction::GetDiagnostic => "GetDiagnostic",
        }
    }

    fn schema(&self) -> &'static CmiSchema {
        &SCHEMA
    }

    fn bindings(&self) -> &'static AttemptBindings {
        &BINDINGS
    }

    fn error_code(&self, function: ApiFunction, error: &BridgeError) -> ErrorCode {
        let reading = function == ApiFunction::GetValue;
        let code = match error {
            BridgeError::Protocol(protocol) => match protocol {
                ProtocolError::NotInitialized => lifecycle_code(function, false),
                ProtocolError::AlreadyTerminated => lifecycle_code(function, true),
                ProtocolError::AlreadyInitialized => 103,
                ProtocolError::InstanceTerminated => 104,
                ProtocolError::InvalidArgument(_) => 201,
                ProtocolError::UnknownFunction(_) => 101,
            },
            BridgeError::Validation(cmi) => match cmi {
                CmiError::EmptyPath { write: false } => 301,
                CmiError::EmptyPath { write: true } => 351,
                CmiError::Undefined(path)
                    if reading && (path.ends_with("._children") || path.ends_with("._count")) =>
                {
                    301
                }
                // Unset elements read as undefined, like 1.2.
                CmiError::Undefined(_) | CmiError::NotInitialized(_) => 401,
                CmiError::ReadOnly(_) | CmiError::Keyword(_) => 404,
                CmiError::WriteOnly(_) => 405,
                CmiError::TypeMismatch { .. } => 406,
                CmiError::OutOfRange { .. } => 407,
                CmiError::IndexOutOfSequence(_) => 351,
                CmiError::IndexOutOfRange(_) => 301,
                CmiError::DependencyNotEstablished(_) => 408,
            },
            BridgeError::Persistence(_) if function == ApiFunction::Terminate => 111,
            BridgeError::Persistence(_) => 391,
        };
        ErrorCode(code)
    }

    fn error_string(&self, code: ErrorCode) -> Option<&'static str> {
        let text = match code.0 {
            0 => "No Error",
            101 => "General Exception",
            102 => "General Initialization Failure",
            103 => "Already Initialized",
            104 => "Content Instance Terminated",
            111 => "General Termination Failure",
            112 => "Termination Before Initialization",
            113 => "Termination After Termination",
            122 => "Retrieve Data Before Initialization",
            123 => "Retrieve Data After Termination",
            132 => "Store Data Before Initialization",
            133 => "Store Data After Termination",
            142 => "Commit Before Initialization",
            143 => "Commit After Termination",
            201 => "General Argument Error",
            301 => "General Get Failure",
            351 => "General Set Failure",
            391 => "General Commit Failure",
            401 => "Undefined Data Model Element",
            402 => "Unimplemented Data Model Element",
            403 => "Data Model Element Value Not Initialized",
            404 => "Data Model Element Is Read Only",
            405 => "Data Model Element Is Write Only",
            406 => "Data Model Element Type Mismatch",
            407 => "Data Model Element Value Out Of Range",
            408 => "Data Model Dependency Not Established",
            _ => return None,
        };
        Some(text)
    }

    fn seed_values(&self, attempt: &Attempt, launch: &LaunchContext) -> Vec<(String, String)> {
        let mut values: Vec<(String, String)> = vec![
            (
                COMPLETION_STATUS_PATH.to_string(),
                completion_status(attempt.status).to_string(),
            ),
            (
                SUCCESS_STATUS_PATH.to_string(),
                success_status(attempt.status).to_string(),
            ),
        ];
        values.extend(
            attempt
                .runtime_data
                .iter()
                .map(|(path, value)| (path.clone(), value.clone())),
        );

        let mut put = |path: &str, value: String| values.push((path.to_string(), value));
        if let Some(location) = &attempt.location {
            put(BINDINGS.location, location.clone());
        }
        if let Some(suspend) = &attempt.suspend_data {
            put(BINDINGS.suspend_data, suspend.clone());
        }
        if let Some(raw) = attempt.score_raw {
            put(SCHEMA.score.raw, format_decimal(raw));
        }
        if let Some(min) = attempt.score_min {
            put(SCHEMA.score.min, format_decimal(min));
        }
        if let Some(max) = attempt.score_max {
            put(SCHEMA.score.max, format_decimal(max));
        }

        put("cmi.learner_id", launch.learner_id.clone());
        put("cmi.learner_name", launch.learner_name.clone());
        put(
            CREDIT_PATH,
            if launch.credit { "credit" } else { "no-credit" }.to_string(),
        );
        put("cmi.mode", launch.mode.as_str().to_string());
        put("cmi.entry", entry_for(attempt).to_string());
        put("cmi.total_time", format_duration(attempt.total_time_centis));
        if let Some(data) = &launch.launch_data {
            put("cmi.launch_data", data.clone());
        }
        if let Some(comment) = &launch.comments_from_lms {
            put("cmi.comments_from_lms.0.comment", comment.clone());
        }
        if let Some(score) = launch.scaled_passing_score {
            put(PASSING_SCORE_PATH, format_decimal(score));
        }
        if let Some(threshold) = launch.completion_threshold {
            put(THRESHOLD_PATH, format_decimal(threshold));
        }
        if let Some(max_time) = &launch.max_time_allowed {
            put("cmi.max_time_allowed", max_time.clone());
        }
        if let Some(action) = &launch.time_limit_action {
            put("cmi.time_limit_action", action.clone());
        }
        values
    }

    fn reported_outcome(&self, store: &CmiStore) -> ReportedOutcome {
        let number = |path: &str| store.value(path).and_then(parse_decimal);

        let reported = match store.value(COMPLETION_STATUS_PATH).unwrap_or("unknown") {
            "completed" => Some(AttemptStatus::Completed),
            "incomplete" => Some(AttemptStatus::Incomplete),
            "not attempted" => Some(AttemptStatus::NotAttempted),
            _ => None,
        };
        // A completion threshold overrides whatever the SCO reported once
        // progress is known.
        let completion = match (number(THRESHOLD_PATH), number(PROGRESS_PATH)) {
            (Some(threshold), Some(progress)) if progress >= threshold => {
                Some(AttemptStatus::Completed)
            }
            (Some(_), Some(_)) => Some(AttemptStatus::Incomplete),
            _ => reported,
        };
        let success = match store.value(SUCCESS_STATUS_PATH).unwrap_or("unknown") {
            "passed" => Some(true),
            "failed" => Some(false),
            _ => None,
        };

        let mut score =
            ScoreReading::read(store, SCHEMA.score.raw, SCHEMA.score.min, SCHEMA.score.max);
        score.scaled = number(SCALED_SCORE_PATH);

        ReportedOutcome {
            completion,
            success,
            score,
            threshold: number(PASSING_SCORE_PATH).map(PassingThreshold::Scaled),
            credit: store.value(CREDIT_PATH).unwrap_or("credit") == "credit",
        }
    }

    fn parse_session_time(&self, value: &str) -> Option<u64> {
        parse_duration(value).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PersistenceError;

    fn store_for(attempt: &Attempt, launch: &LaunchContext) -> CmiStore {
        let mut store = CmiStore::new(Scorm2004.schema());
        store.seed(Scorm2004.seed_values(attempt, launch));
        store
    }

    fn fresh_store(launch: &LaunchContext) -> CmiStore {
        store_for(&Attempt::new("u1", "p1", 1, ScormVersion::Scorm2004), launch)
    }

    #[test]
    fn first_launch_values() {
        let store = fresh_store(&LaunchContext::new("learner-1", "Ada"));
        assert_eq!(store.get("cmi._version").unwrap(), "1.0");
        assert_eq!(store.get("cmi.learner_id").unwrap(), "learner-1");
        assert_eq!(store.get("cmi.completion_status").unwrap(), "unknown");
        assert_eq!(store.get("cmi.success_status").unwrap(), "unknown");
        assert_eq!(store.get("cmi.entry").unwrap(), "ab-initio");
        assert_eq!(store.get("cmi.total_time").unwrap(), "PT0S");
        assert_eq!(store.get("cmi.mode").unwrap(), "normal");
    }

    #[test]
    fn resumed_attempt_restores_runtime_data() {
        let mut attempt = Attempt::new("u1", "p1", 1, ScormVersion::Scorm2004);
        attempt.status = AttemptStatus::Incomplete;
        attempt.exit = Some("suspend".to_string());
        attempt.suspend_data = Some("{\"page\":4}".to_string());
        attempt.total_time_centis = 540_000;
        attempt
            .runtime_data
            .insert("cmi.interactions.0.id".to_string(), "q1".to_string());
        attempt
            .runtime_data
            .insert("cmi.interactions.0.result".to_string(), "correct".to_string());

        let store = store_for(&attempt, &LaunchContext::new("u1", "U"));
        assert_eq!(store.get("cmi.entry").unwrap(), "resume");
        assert_eq!(store.get("cmi.suspend_data").unwrap(), "{\"page\":4}");
        assert_eq!(store.get("cmi.completion_status").unwrap(), "incomplete");
        assert_eq!(store.get("cmi.total_time").unwrap(), "PT1H30M");
        assert_eq!(store.get("cmi.interactions._count").unwrap(), "1");
        assert_eq!(store.get("cmi.interactions.0.result").unwrap(), "correct");
    }

    #[test]
    fn interaction_children_need_an_id() {
        let mut store = fresh_store(&LaunchContext::new("u1", "U"));
        assert!(matches!(
            store.set("cmi.interactions.0.type", "choice"),
            Err(CmiError::DependencyNotEstablished(_))
        ));
        store.set("cmi.interactions.0.id", "q1").unwrap();
        store.set("cmi.interactions.0.type", "choice").unwrap();
        store.set("cmi.interactions.0.objectives.0.id", "obj-1").unwrap();
        assert_eq!(store.get("cmi.interactions.0.objectives._count").unwrap(), "1");
    }

    #[test]
    fn lifecycle_codes_depend_on_function() {
        let code = |function, error: ProtocolError| {
            Scorm2004
                .error_code(function, &BridgeError::Protocol(error))
                .0
        };
        assert_eq!(code(ApiFunction::GetValue, ProtocolError::NotInitialized), 122);
        assert_eq!(code(ApiFunction::SetValue, ProtocolError::NotInitialized), 132);
        assert_eq!(code(ApiFunction::Commit, ProtocolError::AlreadyTerminated), 143);
        assert_eq!(code(ApiFunction::Terminate, ProtocolError::AlreadyTerminated), 113);
        assert_eq!(code(ApiFunction::Initialize, ProtocolError::AlreadyInitialized), 103);
        assert_eq!(code(ApiFunction::Initialize, ProtocolError::InstanceTerminated), 104);
    }

    #[test]
    fn validation_codes() {
        let code = |function, error: CmiError| {
            Scorm2004
                .error_code(function, &BridgeError::Validation(error))
                .0
        };
        assert_eq!(
            code(ApiFunction::GetValue, CmiError::NotInitialized("cmi.location".into())),
            401
        );
        assert_eq!(
            code(ApiFunction::GetValue, CmiError::Undefined("cmi.learner_id._children".into())),
            301
        );
        assert_eq!(
            code(ApiFunction::SetValue, CmiError::Undefined("cmi.bogus".into())),
            401
        );
        assert_eq!(
            code(ApiFunction::SetValue, CmiError::ReadOnly("cmi.learner_id".into())),
            404
        );
        assert_eq!(
            code(ApiFunction::GetValue, CmiError::WriteOnly("cmi.exit".into())),
            405
        );
        assert_eq!(
            code(
                ApiFunction::SetValue,
                CmiError::OutOfRange {
                    path: "cmi.score.scaled".into(),
                    value: "2".into()
                }
            ),
            407
        );
        assert_eq!(
            code(ApiFunction::SetValue, CmiError::EmptyPath { write: true }),
            351
        );
    }

    #[test]
    fn persistence_failure_codes() {
        let failure = BridgeError::Persistence(PersistenceError::RetriesExhausted {
            attempts: 3,
            message: "down".into(),
        });
        assert_eq!(Scorm2004.error_code(ApiFunction::Commit, &failure).0, 391);
        assert_eq!(Scorm2004.error_code(ApiFunction::Terminate, &failure).0, 111);
    }

    #[test]
    fn outcome_uses_scaled_score_and_passing_threshold() {
        let launch = LaunchContext::new("u1", "U").with_scaled_passing_score(0.8);
        let mut store = fresh_store(&launch);
        store.set("cmi.score.scaled", "0.5").unwrap();
        store.set("cmi.completion_status", "completed").unwrap();

        let outcome = Scorm2004.reported_outcome(&store);
        assert_eq!(outcome.completion, Some(AttemptStatus::Completed));
        assert_eq!(outcome.success, None);
        assert_eq!(outcome.threshold, Some(PassingThreshold::Scaled(0.8)));
        assert_eq!(outcome.score.percent(), Some(50.0));
    }

    #[test]
    fn completion_threshold_overrides_reported_status() {
        let mut launch = LaunchContext::new("u1", "U");
        launch.completion_threshold = Some(0.75);
        let mut store = fresh_store(&launch);
        store.set("cmi.completion_status", "completed").unwrap();
        store.set("cmi.progress_measure", "0.5").unwrap();
        assert_eq!(
            Scorm2004.reported_outcome(&store).completion,
            Some(AttemptStatus::Incomplete)
        );

        store.set("cmi.progress_measure", "0.8").unwrap();
        assert_eq!(
            Scorm2004.reported_outcome(&store).completion,
            Some(AttemptStatus::Completed)
        );
    }

    #[test]
    fn session_time_is_iso_duration() {
        assert_eq!(Scorm2004.parse_session_time("PT1M"), Some(6_000));
        assert_eq!(Scorm2004.parse_session_time("00:01:00"), None);
    }
}
