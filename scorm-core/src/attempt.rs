//! Attempt records and launch context
//!
//! An [`Attempt`] is one learner's run through one package. It is the unit
//! the backend persists and the unit a session resumes.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// SCORM run-time version implemented by a package
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ScormVersion {
    #[serde(rename = "1.2")]
    Scorm12,
    #[serde(rename = "2004")]
    Scorm2004,
}

impl ScormVersion {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Scorm12 => "1.2",
            Self::Scorm2004 => "2004",
        }
    }
}

impl fmt::Display for ScormVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ScormVersion {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "1.2" | "scorm12" | "scorm_1.2" => Ok(Self::Scorm12),
            "2004" | "scorm2004" | "scorm_2004" => Ok(Self::Scorm2004),
            other => Err(format!("unknown SCORM version: {}", other)),
        }
    }
}

/// Normalized attempt status
///
/// Transitions are monotonic: an attempt never moves back to a lower rank.
/// `Passed` and `Failed` outrank `Completed`, so a SCO may report completion
/// first and a pass/fail verdict afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptStatus {
    NotAttempted,
    Incomplete,
    Completed,
    Passed,
    Failed,
}

impl AttemptStatus {
    fn rank(&self) -> u8 {
        match self {
            Self::NotAttempted => 0,
            Self::Incomplete => 1,
            Self::Completed => 2,
            Self::Passed | Self::Failed => 3,
        }
    }

    /// Whether this status ends the learner's progress on the attempt
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Passed | Self::Failed)
    }

    /// Apply a newly derived status, refusing regressions
    pub fn advance(self, next: AttemptStatus) -> AttemptStatus {
        if next.rank() >= self.rank() { next } else { self }
    }

    /// Convert to database string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotAttempted => "not_attempted",
            Self::Incomplete => "incomplete",
            Self::Completed => "completed",
            Self::Passed => "passed",
            Self::Failed => "failed",
        }
    }

    /// Parse from database string
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "not_attempted" => Some(Self::NotAttempted),
            "incomplete" => Some(Self::Incomplete),
            "completed" => Some(Self::Completed),
            "passed" => Some(Self::Passed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

impl fmt::Display for AttemptStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One learner's run of one package
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attempt {
    pub id: String,
    pub package_id: String,
    pub user_id: String,
    /// Monotonic per (user, package), starting at 1
    pub attempt_number: u32,
    pub version: ScormVersion,
    pub status: AttemptStatus,
    pub score_raw: Option<f64>,
    pub score_min: Option<f64>,
    pub score_max: Option<f64>,
    /// Opaque bookmark blob owned by the SCO
    pub suspend_data: Option<String>,
    /// Bookmark pointer
    pub location: Option<String>,
    /// Last exit value reported at Terminate
    pub exit: Option<String>,
    /// Accumulated session time in hundredths of a second
    pub total_time_centis: u64,
    /// Every other persisted CMI value, keyed by dot-path
    #[serde(default)]
    pub runtime_data: BTreeMap<String, String>,
    pub started_at: DateTime<Utc>,
    pub last_accessed_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    /// Set once the attempt is closed for resumption
    pub terminated_at: Option<DateTime<Utc>>,
}

impl Attempt {
    /// Create a fresh, not-attempted record
    pub fn new(
        user_id: impl Into<String>,
        package_id: impl Into<String>,
        attempt_number: u32,
        version: ScormVersion,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::now_v7().to_string(),
            package_id: package_id.into(),
            user_id: user_id.into(),
            attempt_number,
            version,
            status: AttemptStatus::NotAttempted,
            score_raw: None,
            score_min: None,
            score_max: None,
            suspend_data: None,
            location: None,
            exit: None,
            total_time_centis: 0,
            runtime_data: BTreeMap::new(),
            started_at: now,
            last_accessed_at: now,
            completed_at: None,
            terminated_at: None,
        }
    }

    pub fn is_terminated(&self) -> bool {
        self.terminated_at.is_some()
    }

    /// Whether the previous session left the attempt suspended
    pub fn is_suspended(&self) -> bool {
        self.exit.as_deref() == Some("suspend")
    }

    /// Record a status change, stamping `completed_at` on the first terminal one
    pub fn set_status(&mut self, status: AttemptStatus, at: DateTime<Utc>) {
        self.status = self.status.advance(status);
        if self.status.is_terminal() && self.completed_at.is_none() {
            self.completed_at = Some(at);
        }
    }
}

/// How the host launched the content
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LaunchMode {
    Browse,
    #[default]
    Normal,
    Review,
}

impl LaunchMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Browse => "browse",
            Self::Normal => "normal",
            Self::Review => "review",
        }
    }
}

/// Host-supplied values seeded into the read-only part of the data model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LaunchContext {
    pub learner_id: String,
    pub learner_name: String,
    #[serde(default = "default_true")]
    pub credit: bool,
    #[serde(default)]
    pub mode: LaunchMode,
    pub launch_data: Option<String>,
    /// SCORM 1.2 mastery score (0-100)
    pub mastery_score: Option<f64>,
    /// SCORM 2004 scaled passing score (-1..1)
    pub scaled_passing_score: Option<f64>,
    pub completion_threshold: Option<f64>,
    pub max_time_allowed: Option<String>,
    pub time_limit_action: Option<String>,
    pub comments_from_lms: Option<String>,
    /// Signed entry URL of the SCO, consumed by the player frame
    pub content_url: Option<String>,
}

fn default_true() -> bool {
    true
}

impl LaunchContext {
    pub fn new(learner_id: impl Into<String>, learner_name: impl Into<String>) -> Self {
        Self {
            learner_id: learner_id.into(),
            learner_name: learner_name.into(),
            credit: true,
            mode: LaunchMode::Normal,
            launch_data: None,
            mastery_score: None,
            scaled_passing_score: None,
            completion_threshold: None,
            max_time_allowed: None,
            time_limit_action: None,
            comments_from_lms: None,
            content_url: None,
        }
    }

    pub fn with_mastery_score(mut self, score: f64) -> Self {
        self.mastery_score = Some(score);
        self
    }

    pub fn with_scaled_passing_score(mut self, score: f64) -> Self {
        self.scaled_passing_score = Some(score);
        self
    }

    pub fn with_content_url(mut self, url: impl Into<String>) -> Self {
        self.content_url = Some(url.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_never_regresses() {
        let status = AttemptStatus::Completed;
        assert_eq!(
            status.advance(AttemptStatus::Incomplete),
            AttemptStatus::Completed
        );
        assert_eq!(
            status.advance(AttemptStatus::NotAttempted),
            AttemptStatus::Completed
        );
    }

    #[test]
    fn status_moves_forward() {
        let status = AttemptStatus::NotAttempted;
        let status = status.advance(AttemptStatus::Incomplete);
        assert_eq!(status, AttemptStatus::Incomplete);
        let status = status.advance(AttemptStatus::Completed);
        assert_eq!(status, AttemptStatus::Completed);
        let status = status.advance(AttemptStatus::Passed);
        assert_eq!(status, AttemptStatus::Passed);
    }

    #[test]
    fn pass_fail_verdicts_can_flip_but_not_drop_to_completed() {
        let status = AttemptStatus::Failed.advance(AttemptStatus::Passed);
        assert_eq!(status, AttemptStatus::Passed);
        assert_eq!(
            status.advance(AttemptStatus::Completed),
            AttemptStatus::Passed
        );
    }

    #[test]
    fn status_db_strings_roundtrip() {
        for status in [
            AttemptStatus::NotAttempted,
            AttemptStatus::Incomplete,
            AttemptStatus::Completed,
            AttemptStatus::Passed,
            AttemptStatus::Failed,
        ] {
            assert_eq!(AttemptStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(AttemptStatus::parse("browsed"), None);
    }

    #[test]
    fn new_attempt_is_open_and_not_attempted() {
        let attempt = Attempt::new("u1", "p1", 1, ScormVersion::Scorm12);
        assert_eq!(attempt.status, AttemptStatus::NotAttempted);
        assert!(!attempt.is_terminated());
        assert!(!attempt.is_suspended());
        assert_eq!(attempt.started_at, attempt.last_accessed_at);
    }

    #[test]
    fn set_status_stamps_completion_once() {
        let mut attempt = Attempt::new("u1", "p1", 1, ScormVersion::Scorm2004);
        let first = Utc::now();
        attempt.set_status(AttemptStatus::Completed, first);
        attempt.set_status(AttemptStatus::Passed, first + chrono::Duration::seconds(5));
        assert_eq!(attempt.status, AttemptStatus::Passed);
        assert_eq!(attempt.completed_at, Some(first));
    }

    #[test]
    fn version_parses_common_spellings() {
        assert_eq!("1.2".parse::<ScormVersion>(), Ok(ScormVersion::Scorm12));
        assert_eq!("2004".parse::<ScormVersion>(), Ok(ScormVersion::Scorm2004));
        assert_eq!(
            "SCORM2004".parse::<ScormVersion>(),
            Ok(ScormVersion::Scorm2004)
        );
        assert!("1.3".parse::<ScormVersion>().is_err());
    }

    #[test]
    fn version_serializes_as_wire_number() {
        let json = serde_json::to_string(&ScormVersion::Scorm12).unwrap();
        assert_eq!(json, "\"1.2\"");
    }
}
