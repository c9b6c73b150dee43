//! Element declarations and value validation for the CMI data model

use std::sync::LazyLock;

use regex::Regex;

use super::timespan;

/// Who may touch an element through the API bridge
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    ReadOnly,
    WriteOnly,
    ReadWrite,
}

impl Access {
    pub fn readable(&self) -> bool {
        !matches!(self, Self::WriteOnly)
    }

    pub fn writable(&self) -> bool {
        !matches!(self, Self::ReadOnly)
    }
}

/// Declared data type of an element
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DataType {
    /// Free text up to `max` characters
    Text { max: usize },
    /// Identifier without whitespace, up to `max` characters
    Identifier { max: usize },
    /// Decimal number; `blank` accepts the empty string
    Decimal {
        min: Option<f64>,
        max: Option<f64>,
        blank: bool,
    },
    Integer { min: i64, max: i64 },
    Vocabulary(&'static [&'static str]),
    /// Either a vocabulary token or a decimal
    VocabularyOrDecimal(&'static [&'static str]),
    /// SCORM 1.2 CMITimespan, `HHHH:MM:SS.SS`
    Timespan,
    /// SCORM 1.2 CMITime, `HH:MM:SS.SS`
    ClockTime,
    /// SCORM 2004 timeinterval (ISO 8601 duration)
    Duration,
    /// SCORM 2004 time (ISO 8601 timestamp)
    Timestamp,
    /// `_children` and `_version` keywords with a fixed value
    Constant(&'static str),
    /// `_count` keyword, derived from the collection contents
    Count,
}

impl DataType {
    pub fn is_keyword(&self) -> bool {
        matches!(self, Self::Constant(_) | Self::Count)
    }
}

/// Why a value was rejected
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    TypeMismatch,
    OutOfRange,
}

/// Declaration of one element, `n` segments standing for collection indices
#[derive(Debug, Clone, Copy)]
pub struct ElementSpec {
    pub path: &'static str,
    pub data_type: DataType,
    pub access: Access,
}

impl ElementSpec {
    pub const fn rw(path: &'static str, data_type: DataType) -> Self {
        Self {
            path,
            data_type,
            access: Access::ReadWrite,
        }
    }

    pub const fn ro(path: &'static str, data_type: DataType) -> Self {
        Self {
            path,
            data_type,
            access: Access::ReadOnly,
        }
    }

    pub const fn wo(path: &'static str, data_type: DataType) -> Self {
        Self {
            path,
            data_type,
            access: Access::WriteOnly,
        }
    }
}

/// Paths of the attempt-level score triplet, for the raw-within-bounds rule
#[derive(Debug, Clone, Copy)]
pub struct ScorePaths {
    pub raw: &'static str,
    pub min: &'static str,
    pub max: &'static str,
}

/// Complete element set of one SCORM version
#[derive(Debug)]
pub struct CmiSchema {
    pub elements: &'static [ElementSpec],
    pub score: ScorePaths,
    /// Collection members other than `id` require the member's `id` first
    pub require_collection_id: bool,
}

/// An element resolved against a concrete path
#[derive(Debug, Clone)]
pub struct Resolved {
    pub spec: &'static ElementSpec,
    /// Concrete collection prefixes with the index used at each level,
    /// e.g. `("cmi.interactions", 2)`
    pub collections: Vec<(String, usize)>,
}

impl CmiSchema {
    /// Find the declaration matching a concrete dot-path
    pub fn resolve(&'static self, path: &str) -> Option<Resolved> {
        let segments: Vec<&str> = path.split('.').collect();
        'specs: for spec in self.elements {
            let pattern: Vec<&str> = spec.path.split('.').collect();
            if pattern.len() != segments.len() {
                continue;
            }
            let mut collections = Vec::new();
            for (idx, (want, got)) in pattern.iter().zip(&segments).enumerate() {
                if *want == "n" {
                    match parse_index(got) {
                        Some(index) => collections.push((segments[..idx].join("."), index)),
                        None => continue 'specs,
                    }
                } else if want != got {
                    continue 'specs;
                }
            }
            return Some(Resolved { spec, collections });
        }
        None
    }
}

fn parse_index(segment: &str) -> Option<usize> {
    if segment.is_empty() || !segment.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    if segment.len() > 1 && segment.starts_with('0') {
        return None;
    }
    segment.parse().ok()
}

static DECIMAL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[-+]?(\d+(\.\d*)?|\.\d+)$").expect("valid decimal regex"));

static IDENTIFIER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\S+$").expect("valid identifier regex"));

static TIMESTAMP: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^\d{4}(-\d{2}(-\d{2}(T\d{2}(:\d{2}(:\d{2}(\.\d{1,2})?)?)?(Z|[+-]\d{2}(:\d{2})?)?)?)?)?$",
    )
    .expect("valid timestamp regex")
});

static CLOCK_TIME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([01]\d|2[0-3]):[0-5]\d:[0-5]\d(\.\d{1,2})?$").expect("valid time regex")
});

impl From<timespan::TimeRejection> for Rejection {
    fn from(rejection: timespan::TimeRejection) -> Self {
        match rejection {
            timespan::TimeRejection::Malformed => Rejection::TypeMismatch,
            timespan::TimeRejection::Overflow => Rejection::OutOfRange,
        }
    }
}

/// Check a candidate value against a declared type
pub fn validate(data_type: &DataType, value: &str) -> Result<(), Rejection> {
    match data_type {
        DataType::Text { max } => {
            if value.chars().count() > *max {
                Err(Rejection::TypeMismatch)
            } else {
                Ok(())
            }
        }
        DataType::Identifier { max } => {
            if value.chars().count() > *max || !IDENTIFIER.is_match(value) {
                Err(Rejection::TypeMismatch)
            } else {
                Ok(())
            }
        }
        DataType::Decimal { min, max, blank } => {
            if value.is_empty() && *blank {
                return Ok(());
            }
            let number = parse_decimal(value).ok_or(Rejection::TypeMismatch)?;
            if min.is_some_and(|m| number < m) || max.is_some_and(|m| number > m) {
                return Err(Rejection::OutOfRange);
            }
            Ok(())
        }
        DataType::Integer { min, max } => {
            let number: i64 = value.parse().map_err(|_| Rejection::TypeMismatch)?;
            if number < *min || number > *max {
                Err(Rejection::OutOfRange)
            } else {
                Ok(())
            }
        }
        DataType::Vocabulary(tokens) => {
            if tokens.contains(&value) {
                Ok(())
            } else {
                Err(Rejection::TypeMismatch)
            }
        }
        DataType::VocabularyOrDecimal(tokens) => {
            if tokens.contains(&value) || parse_decimal(value).is_some() {
                Ok(())
            } else {
                Err(Rejection::TypeMismatch)
            }
        }
        DataType::Timespan => timespan::parse_timespan(value)
            .map(|_| ())
            .map_err(Rejection::from),
        DataType::ClockTime => {
            if CLOCK_TIME.is_match(value) {
                Ok(())
            } else {
                Err(Rejection::TypeMismatch)
            }
        }
        DataType::Duration => timespan::parse_duration(value)
            .map(|_| ())
            .map_err(Rejection::from),
        DataType::Timestamp => {
            if TIMESTAMP.is_match(value) {
                Ok(())
            } else {
                Err(Rejection::TypeMismatch)
            }
        }
        DataType::Constant(_) | DataType::Count => Err(Rejection::TypeMismatch),
    }
}

/// Parse a CMI decimal, rejecting exponents and non-finite values
pub fn parse_decimal(value: &str) -> Option<f64> {
    if !DECIMAL.is_match(value) {
        return None;
    }
    value.parse::<f64>().ok().filter(|n| n.is_finite())
}

/// Render a number the way SCOs expect to read it back
pub fn format_decimal(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        let text = format!("{:.7}", value);
        text.trim_end_matches('0').trim_end_matches('.').to_string()
    }
}
