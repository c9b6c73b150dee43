//! Normalized outcome derivation
//!
//! After every Commit and Terminate the bridge asks the evaluator what the
//! CMI values add up to. The evaluator folds the dialect's reading of the
//! store into one [`AttemptStatus`], keeps it monotonic, and decides whether
//! the host should hear about it.

use std::sync::Arc;

use tracing::debug;

use crate::attempt::AttemptStatus;
use crate::cmi::CmiStore;
use crate::dialect::{ReportedOutcome, RteDialect};

/// Result of one evaluation
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Evaluation {
    pub status: AttemptStatus,
    /// Score as a 0-100 percentage, when one can be derived
    pub score: Option<f64>,
    /// Set when `status` is a terminal transition the host has not seen
    pub notify: bool,
}

/// Derives attempt status from CMI values
#[derive(Debug)]
pub struct CompletionEvaluator {
    dialect: Arc<dyn RteDialect>,
    status: AttemptStatus,
    last_reported: Option<AttemptStatus>,
}

impl CompletionEvaluator {
    /// Start from the attempt's persisted status
    ///
    /// A terminal persisted status counts as already reported, so resuming a
    /// completed attempt does not fire the callback a second time.
    pub fn new(dialect: Arc<dyn RteDialect>, persisted: AttemptStatus) -> Self {
        Self {
            dialect,
            status: persisted,
            last_reported: persisted.is_terminal().then_some(persisted),
        }
    }

    pub fn status(&self) -> AttemptStatus {
        self.status
    }

    /// Work out what the store contents add up to, without recording it
    pub fn assess(&self, store: &CmiStore) -> Evaluation {
        let outcome = self.dialect.reported_outcome(store);
        let score = outcome.score.percent();
        let status = self.status.advance(derive_status(&outcome, score));
        Evaluation {
            status,
            score,
            notify: status.is_terminal() && self.last_reported != Some(status),
        }
    }

    /// Accept an assessment once it has been handed to persistence
    pub fn record(&mut self, evaluation: &Evaluation) {
        self.status = self.status.advance(evaluation.status);
        if evaluation.notify {
            self.last_reported = Some(evaluation.status);
        }
        debug!(
            status = %self.status,
            score = ?evaluation.score,
            notify = evaluation.notify,
            "attempt evaluated"
        );
    }

    /// Assess and record in one step
    pub fn evaluate(&mut self, store: &CmiStore) -> Evaluation {
        let evaluation = self.assess(store);
        self.record(&evaluation);
        evaluation
    }
}

fn derive_status(outcome: &ReportedOutcome, score: Option<f64>) -> AttemptStatus {
    // With credit and a mastery threshold, the score decides pass/fail
    // regardless of what the SCO reported.
    let judged = match (outcome.credit, outcome.threshold, score) {
        (true, Some(threshold), Some(percent)) => Some(percent >= threshold.as_percent()),
        _ => outcome.success,
    };
    match judged {
        Some(true) => AttemptStatus::Passed,
        Some(false) => AttemptStatus::Failed,
        None => match outcome.completion {
            Some(AttemptStatus::NotAttempted) | None => AttemptStatus::Incomplete,
            Some(status) => status,
        },
    }
}
