//! Last-error slot behind GetLastError / GetErrorString / GetDiagnostic

use std::sync::Arc;

use crate::dialect::{ApiFunction, ErrorCode, RteDialect};
use crate::error::BridgeError;

/// Tracks the outcome of the most recent bridge call
#[derive(Debug)]
pub struct ErrorReporter {
    dialect: Arc<dyn RteDialect>,
    code: ErrorCode,
    diagnostic: String,
}

impl ErrorReporter {
    pub fn new(dialect: Arc<dyn RteDialect>) -> Self {
        Self {
            dialect,
            code: ErrorCode::NONE,
            diagnostic: String::new(),
        }
    }

    /// Reset after a successful call
    pub fn clear(&mut self) {
        self.code = ErrorCode::NONE;
        self.diagnostic.clear();
    }

    /// Record a failed call and return the code it maps to
    pub fn record(&mut self, function: ApiFunction, error: &BridgeError) -> ErrorCode {
        self.code = self.dialect.error_code(function, error);
        self.diagnostic = error.to_string();
        self.code
    }

    pub fn last_error(&self) -> ErrorCode {
        self.code
    }

    /// Short text for `code`, empty when the version does not define it
    pub fn error_string(&self, code: &str) -> String {
        ErrorCode::parse(code)
            .and_then(|code| self.dialect.error_string(code))
            .unwrap_or_default()
            .to_string()
    }

    /// Detail for `code`
    ///
    /// For the last error (or an empty argument) this is the specific cause,
    /// e.g. the backend message behind a failed commit. Other codes get
    /// their generic text.
    pub fn diagnostic(&self, code: &str) -> String {
        let requested = if code.trim().is_empty() {
            Some(self.code)
        } else {
            ErrorCode::parse(code)
        };
        match requested {
            Some(requested) if requested == self.code && self.code.is_error() => {
                self.diagnostic.clone()
            }
            Some(requested) => self
                .dialect
                .error_string(requested)
                .unwrap_or_default()
                .to_string(),
            None => String::new(),
        }
    }
}
