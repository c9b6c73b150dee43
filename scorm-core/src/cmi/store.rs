//! In-memory CMI data store with dirty tracking

use std::collections::BTreeMap;

use tracing::{debug, warn};

use super::types::{CmiSchema, DataType, Rejection, Resolved, parse_decimal, validate};
use crate::error::CmiError;

/// Values changed since the last commit, captured at one instant
///
/// Each entry remembers the write generation it was captured at, so clearing
/// the snapshot leaves alone any key that was written again afterwards.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DirtySnapshot {
    entries: Vec<(String, String, u64)>,
}

impl DirtySnapshot {
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Changed paths with the value each held at snapshot time
    pub fn values(&self) -> Vec<(String, String)> {
        self.entries
            .iter()
            .map(|(path, value, _)| (path.clone(), value.clone()))
            .collect()
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(path, _, _)| path.as_str())
    }
}

/// Validated runtime data model for one attempt
#[derive(Debug)]
pub struct CmiStore {
    schema: &'static CmiSchema,
    values: BTreeMap<String, String>,
    dirty: BTreeMap<String, u64>,
    generation: u64,
}

impl CmiStore {
    pub fn new(schema: &'static CmiSchema) -> Self {
        Self {
            schema,
            values: BTreeMap::new(),
            dirty: BTreeMap::new(),
            generation: 0,
        }
    }

    /// Read an element on behalf of the SCO
    pub fn get(&self, path: &str) -> Result<String, CmiError> {
        if path.is_empty() {
            return Err(CmiError::EmptyPath { write: false });
        }
        let resolved = self.resolve(path)?;
        if !resolved.spec.access.readable() {
            return Err(CmiError::WriteOnly(path.to_string()));
        }
        for (prefix, index) in &resolved.collections {
            if *index >= self.count(prefix) {
                return Err(CmiError::IndexOutOfRange(path.to_string()));
            }
        }
        match resolved.spec.data_type {
            DataType::Constant(value) => Ok(value.to_string()),
            DataType::Count => Ok(self.count(collection_of(path)).to_string()),
            _ => self
                .values
                .get(path)
                .cloned()
                .ok_or_else(|| CmiError::NotInitialized(path.to_string())),
        }
    }

    /// Write an element on behalf of the SCO
    ///
    /// On any error the store is left untouched.
    pub fn set(&mut self, path: &str, value: &str) -> Result<(), CmiError> {
        if path.is_empty() {
            return Err(CmiError::EmptyPath { write: true });
        }
        let resolved = self.resolve(path)?;
        if resolved.spec.data_type.is_keyword() {
            return Err(CmiError::Keyword(path.to_string()));
        }
        if !resolved.spec.access.writable() {
            return Err(CmiError::ReadOnly(path.to_string()));
        }
        validate(&resolved.spec.data_type, value).map_err(|rejection| match rejection {
            Rejection::TypeMismatch => CmiError::TypeMismatch {
                path: path.to_string(),
                value: value.to_string(),
            },
            Rejection::OutOfRange => CmiError::OutOfRange {
                path: path.to_string(),
                value: value.to_string(),
            },
        })?;
        self.check_collections(path, &resolved)?;
        self.check_score_bounds(path, value)?;

        self.generation += 1;
        self.values.insert(path.to_string(), value.to_string());
        self.dirty.insert(path.to_string(), self.generation);
        debug!(path, "cmi value staged");
        Ok(())
    }

    /// Pre-populate from persisted and host-supplied values
    ///
    /// Access modes are not enforced, and seeded values are not dirty.
    /// Unknown paths and keywords are skipped.
    pub fn seed<I, K, V>(&mut self, values: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        for (path, value) in values {
            let path = path.into();
            match self.schema.resolve(&path) {
                Some(resolved) if !resolved.spec.data_type.is_keyword() => {
                    self.values.insert(path, value.into());
                }
                _ => warn!(path = %path, "skipping unknown element while seeding"),
            }
        }
    }

    /// Capture the dirty set as it stands right now
    pub fn dirty_snapshot(&self) -> DirtySnapshot {
        let entries = self
            .dirty
            .iter()
            .filter_map(|(path, generation)| {
                self.values
                    .get(path)
                    .map(|value| (path.clone(), value.clone(), *generation))
            })
            .collect();
        DirtySnapshot { entries }
    }

    /// Drop exactly the snapshotted writes from the dirty set
    pub fn clear_dirty(&mut self, snapshot: &DirtySnapshot) {
        for (path, _, generation) in &snapshot.entries {
            if self.dirty.get(path) == Some(generation) {
                self.dirty.remove(path);
            }
        }
    }

    pub fn is_dirty(&self) -> bool {
        !self.dirty.is_empty()
    }

    /// Raw stored value, ignoring access modes (host-side reads)
    pub fn value(&self, path: &str) -> Option<&str> {
        self.values.get(path).map(String::as_str)
    }

    pub fn schema(&self) -> &'static CmiSchema {
        self.schema
    }

    fn resolve(&self, path: &str) -> Result<Resolved, CmiError> {
        self.schema
            .resolve(path)
            .ok_or_else(|| CmiError::Undefined(path.to_string()))
    }

    /// Number of members in the collection rooted at `prefix`
    fn count(&self, prefix: &str) -> usize {
        let lead = format!("{}.", prefix);
        self.values
            .range(lead.clone()..)
            .take_while(|(key, _)| key.starts_with(&lead))
            .filter_map(|(key, _)| key[lead.len()..].split('.').next()?.parse::<usize>().ok())
            .map(|index| index + 1)
            .max()
            .unwrap_or(0)
    }

    fn check_collections(&self, path: &str, resolved: &Resolved) -> Result<(), CmiError> {
        for (prefix, index) in &resolved.collections {
            let count = self.count(prefix);
            if *index > count {
                return Err(CmiError::IndexOutOfSequence(path.to_string()));
            }
        }
        if !self.schema.require_collection_id {
            return Ok(());
        }
        for (prefix, index) in &resolved.collections {
            let id_path = format!("{}.{}.id", prefix, index);
            if path != id_path
                && self.schema.resolve(&id_path).is_some()
                && !self.values.contains_key(&id_path)
            {
                return Err(CmiError::DependencyNotEstablished(path.to_string()));
            }
        }
        Ok(())
    }

    fn check_score_bounds(&self, path: &str, value: &str) -> Result<(), CmiError> {
        let score = &self.schema.score;
        if path != score.raw && path != score.min && path != score.max {
            return Ok(());
        }
        let pick = |candidate: &str| -> Option<f64> {
            if candidate == path {
                parse_decimal(value)
            } else {
                self.values.get(candidate).and_then(|v| parse_decimal(v))
            }
        };
        if let (Some(raw), Some(min), Some(max)) = (pick(score.raw), pick(score.min), pick(score.max))
            && (raw < min || raw > max)
        {
            return Err(CmiError::OutOfRange {
                path: path.to_string(),
                value: value.to_string(),
            });
        }
        Ok(())
    }
}

/// Collection prefix of a `_count` path
fn collection_of(path: &str) -> &str {
    path.strip_suffix("._count").unwrap_or(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cmi::types::{ElementSpec, ScorePaths};

    static SCHEMA: CmiSchema = CmiSchema {
        elements: &[
            ElementSpec::ro("cmi._version", DataType::Constant("1.0")),
            ElementSpec::rw("cmi.location", DataType::Text { max: 1000 }),
            ElementSpec::rw("cmi.suspend_data", DataType::Text { max: 64000 }),
            ElementSpec::ro("cmi.learner_id", DataType::Identifier { max: 4000 }),
            ElementSpec::wo("cmi.exit", DataType::Vocabulary(&["suspend", "normal", ""])),
            ElementSpec::rw(
                "cmi.score.raw",
                DataType::Decimal {
                    min: None,
                    max: None,
                    blank: false,
                },
            ),
            ElementSpec::rw(
                "cmi.score.min",
                DataType::Decimal {
                    min: None,
                    max: None,
                    blank: false,
                },
            ),
            ElementSpec::rw(
                "cmi.score.max",
                DataType::Decimal {
                    min: None,
                    max: None,
                    blank: false,
                },
            ),
            ElementSpec::ro("cmi.interactions._count", DataType::Count),
            ElementSpec::rw("cmi.interactions.n.id", DataType::Identifier { max: 4000 }),
            ElementSpec::rw(
                "cmi.interactions.n.result",
                DataType::Vocabulary(&["correct", "incorrect"]),
            ),
        ],
        score: ScorePaths {
            raw: "cmi.score.raw",
            min: "cmi.score.min",
            max: "cmi.score.max",
        },
        require_collection_id: true,
    };

    fn store() -> CmiStore {
        CmiStore::new(&SCHEMA)
    }

    #[test]
    fn get_unknown_path_is_undefined() {
        let store = store();
        assert_eq!(
            store.get("cmi.nope"),
            Err(CmiError::Undefined("cmi.nope".to_string()))
        );
    }

    #[test]
    fn get_unset_readable_element_is_not_initialized() {
        let store = store();
        assert_eq!(
            store.get("cmi.location"),
            Err(CmiError::NotInitialized("cmi.location".to_string()))
        );
    }

    #[test]
    fn get_write_only_element_is_denied() {
        let mut store = store();
        store.set("cmi.exit", "suspend").unwrap();
        assert_eq!(
            store.get("cmi.exit"),
            Err(CmiError::WriteOnly("cmi.exit".to_string()))
        );
    }

    #[test]
    fn get_constant_keyword() {
        assert_eq!(store().get("cmi._version").unwrap(), "1.0");
    }

    #[test]
    fn set_read_only_is_rejected_without_side_effects() {
        let mut store = store();
        let result = store.set("cmi.learner_id", "someone");
        assert_eq!(result, Err(CmiError::ReadOnly("cmi.learner_id".to_string())));
        assert!(!store.is_dirty());
        assert!(store.value("cmi.learner_id").is_none());
    }

    #[test]
    fn set_keyword_is_rejected() {
        let mut store = store();
        assert!(matches!(
            store.set("cmi.interactions._count", "4"),
            Err(CmiError::Keyword(_))
        ));
    }

    #[test]
    fn set_type_mismatch_leaves_previous_value() {
        let mut store = store();
        store.set("cmi.score.raw", "50").unwrap();
        let result = store.set("cmi.score.raw", "fifty");
        assert!(matches!(result, Err(CmiError::TypeMismatch { .. })));
        assert_eq!(store.get("cmi.score.raw").unwrap(), "50");
    }

    #[test]
    fn raw_score_must_fall_within_bounds() {
        let mut store = store();
        store.set("cmi.score.min", "0").unwrap();
        store.set("cmi.score.max", "100").unwrap();
        assert!(matches!(
            store.set("cmi.score.raw", "120"),
            Err(CmiError::OutOfRange { .. })
        ));
        store.set("cmi.score.raw", "85").unwrap();
        assert!(matches!(
            store.set("cmi.score.max", "80"),
            Err(CmiError::OutOfRange { .. })
        ));
    }

    #[test]
    fn collection_members_append_in_sequence() {
        let mut store = store();
        assert_eq!(store.get("cmi.interactions._count").unwrap(), "0");
        store.set("cmi.interactions.0.id", "q1").unwrap();
        assert!(matches!(
            store.set("cmi.interactions.2.id", "q3"),
            Err(CmiError::IndexOutOfSequence(_))
        ));
        store.set("cmi.interactions.1.id", "q2").unwrap();
        assert_eq!(store.get("cmi.interactions._count").unwrap(), "2");
    }

    #[test]
    fn collection_member_requires_id_first() {
        let mut store = store();
        assert!(matches!(
            store.set("cmi.interactions.0.result", "correct"),
            Err(CmiError::DependencyNotEstablished(_))
        ));
        store.set("cmi.interactions.0.id", "q1").unwrap();
        store.set("cmi.interactions.0.result", "correct").unwrap();
    }

    #[test]
    fn get_collection_member_beyond_count_is_out_of_range() {
        let store = store();
        assert!(matches!(
            store.get("cmi.interactions.0.id"),
            Err(CmiError::IndexOutOfRange(_))
        ));
    }

    #[test]
    fn seed_bypasses_access_and_is_clean() {
        let mut store = store();
        store.seed([("cmi.learner_id", "u-1"), ("cmi.suspend_data", "page3")]);
        assert_eq!(store.get("cmi.learner_id").unwrap(), "u-1");
        assert_eq!(store.get("cmi.suspend_data").unwrap(), "page3");
        assert!(!store.is_dirty());
    }

    #[test]
    fn seed_skips_unknown_paths() {
        let mut store = store();
        store.seed([("cmi.bogus", "x")]);
        assert!(store.value("cmi.bogus").is_none());
    }

    #[test]
    fn snapshot_keeps_last_write_per_path() {
        let mut store = store();
        store.set("cmi.location", "p1").unwrap();
        store.set("cmi.location", "p2").unwrap();
        let snapshot = store.dirty_snapshot();
        assert_eq!(
            snapshot.values(),
            vec![("cmi.location".to_string(), "p2".to_string())]
        );
    }

    #[test]
    fn clear_dirty_spares_writes_after_snapshot() {
        let mut store = store();
        store.set("cmi.location", "p1").unwrap();
        store.set("cmi.suspend_data", "a").unwrap();
        let snapshot = store.dirty_snapshot();

        store.set("cmi.location", "p2").unwrap();
        store.clear_dirty(&snapshot);

        let next = store.dirty_snapshot();
        assert_eq!(
            next.values(),
            vec![("cmi.location".to_string(), "p2".to_string())]
        );
    }

    #[test]
    fn empty_path_is_reported_per_direction() {
        let mut store = store();
        assert_eq!(store.get(""), Err(CmiError::EmptyPath { write: false }));
        assert_eq!(store.set("", "x"), Err(CmiError::EmptyPath { write: true }));
    }
}
