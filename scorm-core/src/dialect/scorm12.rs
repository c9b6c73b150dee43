//! SCORM 1.2 run-time environment (`API`, `LMS*` functions, `cmi.core.*`)

use super::{
    ApiFunction, AttemptBindings, ErrorCode, PassingThreshold, ReportedOutcome, RteDialect,
    ScoreReading, entry_for,
};
use crate::attempt::{Attempt, AttemptStatus, LaunchContext, ScormVersion};
use crate::cmi::timespan::{format_timespan, parse_timespan};
use crate::cmi::types::{CmiSchema, DataType, ElementSpec, ScorePaths};
use crate::cmi::{CmiStore, format_decimal, parse_decimal};
use crate::error::{BridgeError, CmiError, ProtocolError};

const LESSON_STATUS: &[&str] = &[
    "passed",
    "completed",
    "failed",
    "incomplete",
    "browsed",
    "not attempted",
];
const CREDIT: &[&str] = &["credit", "no-credit"];
const ENTRY: &[&str] = &["ab-initio", "resume", ""];
const LESSON_MODE: &[&str] = &["browse", "normal", "review"];
const EXIT: &[&str] = &["time-out", "suspend", "logout", ""];
const TIME_LIMIT_ACTION: &[&str] = &[
    "exit,message",
    "exit,no message",
    "continue,message",
    "continue,no message",
];
const INTERACTION_TYPE: &[&str] = &[
    "true-false",
    "choice",
    "fill-in",
    "matching",
    "performance",
    "sequencing",
    "likert",
    "numeric",
];
const INTERACTION_RESULT: &[&str] = &["correct", "wrong", "unanticipated", "neutral"];

const SCORE: DataType = DataType::Decimal {
    min: Some(0.0),
    max: Some(100.0),
    blank: true,
};
const IDENTIFIER: DataType = DataType::Identifier { max: 255 };
const STRING255: DataType = DataType::Text { max: 255 };
const STRING4096: DataType = DataType::Text { max: 4096 };

static SCHEMA: CmiSchema = CmiSchema {
    elements: &[
        ElementSpec::ro(
            "cmi.core._children",
            DataType::Constant(
                "student_id,student_name,lesson_location,credit,lesson_status,entry,score,total_time,lesson_mode,exit,session_time",
            ),
        ),
        ElementSpec::ro("cmi.core.student_id", IDENTIFIER),
        ElementSpec::ro("cmi.core.student_name", STRING255),
        ElementSpec::rw("cmi.core.lesson_location", STRING255),
        ElementSpec::ro("cmi.core.credit", DataType::Vocabulary(CREDIT)),
        ElementSpec::rw("cmi.core.lesson_status", DataType::Vocabulary(LESSON_STATUS)),
        ElementSpec::ro("cmi.core.entry", DataType::Vocabulary(ENTRY)),
        ElementSpec::ro("cmi.core.score._children", DataType::Constant("raw,min,max")),
        ElementSpec::rw("cmi.core.score.raw", SCORE),
        ElementSpec::rw("cmi.core.score.min", SCORE),
        ElementSpec::rw("cmi.core.score.max", SCORE),
        ElementSpec::ro("cmi.core.total_time", DataType::Timespan),
        ElementSpec::ro("cmi.core.lesson_mode", DataType::Vocabulary(LESSON_MODE)),
        ElementSpec::wo("cmi.core.exit", DataType::Vocabulary(EXIT)),
        ElementSpec::wo("cmi.core.session_time", DataType::Timespan),
        ElementSpec::rw("cmi.suspend_data", STRING4096),
        ElementSpec::ro("cmi.launch_data", STRING4096),
        ElementSpec::rw("cmi.comments", STRING4096),
        ElementSpec::ro("cmi.comments_from_lms", STRING4096),
        ElementSpec::ro("cmi.objectives._children", DataType::Constant("id,score,status")),
        ElementSpec::ro("cmi.objectives._count", DataType::Count),
        ElementSpec::rw("cmi.objectives.n.id", IDENTIFIER),
        ElementSpec::ro(
            "cmi.objectives.n.score._children",
            DataType::Constant("raw,min,max"),
        ),
        ElementSpec::rw("cmi.objectives.n.score.raw", SCORE),
        ElementSpec::rw("cmi.objectives.n.score.min", SCORE),
        ElementSpec::rw("cmi.objectives.n.score.max", SCORE),
        ElementSpec::rw("cmi.objectives.n.status", DataType::Vocabulary(LESSON_STATUS)),
        ElementSpec::ro(
            "cmi.student_data._children",
            DataType::Constant("mastery_score,max_time_allowed,time_limit_action"),
        ),
        ElementSpec::ro("cmi.student_data.mastery_score", SCORE),
        ElementSpec::ro("cmi.student_data.max_time_allowed", DataType::Timespan),
        ElementSpec::ro(
            "cmi.student_data.time_limit_action",
            DataType::Vocabulary(TIME_LIMIT_ACTION),
        ),
        ElementSpec::ro(
            "cmi.student_preference._children",
            DataType::Constant("audio,language,speed,text"),
        ),
        ElementSpec::rw(
            "cmi.student_preference.audio",
            DataType::Integer { min: -1, max: 100 },
        ),
        ElementSpec::rw("cmi.student_preference.language", STRING255),
        ElementSpec::rw(
            "cmi.student_preference.speed",
            DataType::Integer {
                min: -100,
                max: 100,
            },
        ),
        ElementSpec::rw(
            "cmi.student_preference.text",
            DataType::Integer { min: -1, max: 1 },
        ),
        ElementSpec::ro(
            "cmi.interactions._children",
            DataType::Constant(
                "id,objectives,time,type,correct_responses,weighting,student_response,result,latency",
            ),
        ),
        ElementSpec::ro("cmi.interactions._count", DataType::Count),
        ElementSpec::wo("cmi.interactions.n.id", IDENTIFIER),
        ElementSpec::ro("cmi.interactions.n.objectives._count", DataType::Count),
        ElementSpec::wo("cmi.interactions.n.objectives.n.id", IDENTIFIER),
        ElementSpec::wo("cmi.interactions.n.time", DataType::ClockTime),
        ElementSpec::wo(
            "cmi.interactions.n.type",
            DataType::Vocabulary(INTERACTION_TYPE),
        ),
        ElementSpec::ro("cmi.interactions.n.correct_responses._count", DataType::Count),
        ElementSpec::wo("cmi.interactions.n.correct_responses.n.pattern", STRING255),
        ElementSpec::wo(
            "cmi.interactions.n.weighting",
            DataType::Decimal {
                min: None,
                max: None,
                blank: false,
            },
        ),
        ElementSpec::wo("cmi.interactions.n.student_response", STRING255),
        ElementSpec::wo(
            "cmi.interactions.n.result",
            DataType::VocabularyOrDecimal(INTERACTION_RESULT),
        ),
        ElementSpec::wo("cmi.interactions.n.latency", DataType::Timespan),
    ],
    score: ScorePaths {
        raw: "cmi.core.score.raw",
        min: "cmi.core.score.min",
        max: "cmi.core.score.max",
    },
    require_collection_id: false,
};

static BINDINGS: AttemptBindings = AttemptBindings {
    location: "cmi.core.lesson_location",
    suspend_data: "cmi.suspend_data",
    exit: "cmi.core.exit",
    session_time: "cmi.core.session_time",
};

const LESSON_STATUS_PATH: &str = "cmi.core.lesson_status";
const MASTERY_SCORE_PATH: &str = "cmi.student_data.mastery_score";
const CREDIT_PATH: &str = "cmi.core.credit";

/// SCORM 1.2
#[derive(Debug, Clone, Copy, Default)]
pub struct Scorm12;

fn lesson_status(status: AttemptStatus) -> &'static str {
    match status {
        AttemptStatus::NotAttempted => "not attempted",
        AttemptStatus::Incomplete => "incomplete",
        AttemptStatus::Completed => "completed",
        AttemptStatus::Passed => "passed",
        AttemptStatus::Failed => "failed",
    }
}

impl RteDialect for Scorm12 {
    fn version(&self) -> ScormVersion {
        ScormVersion::Scorm12
    }

    fn global_name(&self) -> &'static str {
        "API"
    }

    fn function(&self, name: &str) -> Option<ApiFunction> {
        match name {
            "LMSInitialize" => Some(ApiFunction::Initialize),
            "LMSFinish" => Some(ApiFunction::Terminate),
            "LMSGetValue" => Some(ApiFunction::GetValue),
            "LMSSetValue" => Some(ApiFunction::SetValue),
            "LMSCommit" => Some(ApiFunction::Commit),
            "LMSGetLastError" => Some(ApiFunction::GetLastError),
            "LMSGetErrorString" => Some(ApiFunction::GetErrorString),
            "LMSGetDiagnostic" => Some(ApiFunction::GetDiagnostic),
            _ => None,
        }
    }

    fn function_name(&self, function: ApiFunction) -> &'static str {
        match function {
            ApiFunction::Initialize => "LMSInitialize",
            ApiFunction::Terminate => "LMSFinish",
            ApiFunction::GetValue => "LMSGetValue",
            ApiFunction::SetValue => "LMSSetValue",
            ApiFunction::Commit => "LMSCommit",
            ApiFunction::GetLastError => "LMSGetLastError",
            ApiFunction::GetErrorString => "LMSGetErrorString",
            ApiFunction::GetDiagnostic => "LMSGetDiagnostic",
        }
    }

    fn schema(&self) -> &'static CmiSchema {
        &SCHEMA
    }

    fn bindings(&self) -> &'static AttemptBindings {
        &BINDINGS
    }

    fn error_code(&self, _function: ApiFunction, error: &BridgeError) -> ErrorCode {
        let code = match error {
            BridgeError::Protocol(protocol) => match protocol {
                ProtocolError::NotInitialized => 301,
                ProtocolError::InvalidArgument(_) => 201,
                ProtocolError::AlreadyInitialized
                | ProtocolError::InstanceTerminated
                | ProtocolError::AlreadyTerminated
                | ProtocolError::UnknownFunction(_) => 101,
            },
            BridgeError::Validation(cmi) => match cmi {
                CmiError::Undefined(path) if path.ends_with("._children") => 202,
                CmiError::Undefined(path) if path.ends_with("._count") => 203,
                CmiError::Undefined(_) | CmiError::NotInitialized(_) => 401,
                CmiError::Keyword(_) => 402,
                CmiError::ReadOnly(_) => 403,
                CmiError::WriteOnly(_) => 404,
                CmiError::TypeMismatch { .. } | CmiError::OutOfRange { .. } => 405,
                CmiError::EmptyPath { .. }
                | CmiError::IndexOutOfSequence(_)
                | CmiError::IndexOutOfRange(_)
                | CmiError::DependencyNotEstablished(_) => 201,
            },
            BridgeError::Persistence(_) => 101,
        };
        ErrorCode(code)
    }

    fn error_string(&self, code: ErrorCode) -> Option<&'static str> {
        let text = match code.0 {
            0 => "No error",
            101 => "General exception",
            201 => "Invalid argument error",
            202 => "Element cannot have children",
            203 => "Element not an array - cannot have count",
            301 => "Not initialized",
            401 => "Not implemented error",
            402 => "Invalid set value, element is a keyword",
            403 => "Element is read only",
            404 => "Element is write only",
            405 => "Incorrect Data Type",
            _ => return None,
        };
        Some(text)
    }

    fn seed_values(&self, attempt: &Attempt, launch: &LaunchContext) -> Vec<(String, String)> {
        let mut values: Vec<(String, String)> = vec![(
            LESSON_STATUS_PATH.to_string(),
            lesson_status(attempt.status).to_string(),
        )];
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

        put("cmi.core.student_id", launch.learner_id.clone());
        put("cmi.core.student_name", launch.learner_name.clone());
        put(
            CREDIT_PATH,
            if launch.credit { "credit" } else { "no-credit" }.to_string(),
        );
        put("cmi.core.lesson_mode", launch.mode.as_str().to_string());
        put("cmi.core.entry", entry_for(attempt).to_string());
        put(
            "cmi.core.total_time",
            format_timespan(attempt.total_time_centis),
        );
        if let Some(data) = &launch.launch_data {
            put("cmi.launch_data", data.clone());
        }
        if let Some(comments) = &launch.comments_from_lms {
            put("cmi.comments_from_lms", comments.clone());
        }
        if let Some(mastery) = launch.mastery_score {
            put(MASTERY_SCORE_PATH, format_decimal(mastery));
        }
        if let Some(max_time) = &launch.max_time_allowed {
            put("cmi.student_data.max_time_allowed", max_time.clone());
        }
        if let Some(action) = &launch.time_limit_action {
            put("cmi.student_data.time_limit_action", action.clone());
        }
        values
    }

    fn reported_outcome(&self, store: &CmiStore) -> ReportedOutcome {
        let status = store.value(LESSON_STATUS_PATH).unwrap_or("");
        let completion = match status {
            "passed" | "completed" | "failed" => Some(AttemptStatus::Completed),
            "incomplete" | "browsed" => Some(AttemptStatus::Incomplete),
            "not attempted" => Some(AttemptStatus::NotAttempted),
            _ => None,
        };
        let success = match status {
            "passed" => Some(true),
            "failed" => Some(false),
            _ => None,
        };
        ReportedOutcome {
            completion,
            success,
            score: ScoreReading::read(store, SCHEMA.score.raw, SCHEMA.score.min, SCHEMA.score.max),
            threshold: store
                .value(MASTERY_SCORE_PATH)
                .and_then(parse_decimal)
                .map(PassingThreshold::Percent),
            credit: store.value(CREDIT_PATH).unwrap_or("credit") == "credit",
        }
    }

    fn parse_session_time(&self, value: &str) -> Option<u64> {
        parse_timespan(value).ok()
    }
}
