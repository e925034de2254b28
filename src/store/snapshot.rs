use crate::error::{value_kind, StoreError};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use std::fmt;
use std::ops::Deref;
use std::sync::Arc;

/// One immutable point-in-time value of the state.
///
/// Holds the typed value alongside its record form so comparisons and
/// merges don't have to re-serialize. Clones share both.
pub struct Snapshot<S> {
    value: Arc<S>,
    record: Arc<Map<String, Value>>,
}

impl<S> Snapshot<S> {
    /// The typed state value.
    pub fn value(&self) -> &Arc<S> {
        &self.value
    }

    /// The state as a keyed record.
    pub fn record(&self) -> &Map<String, Value> {
        &self.record
    }

    /// Whether two snapshots are the same allocation.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.value, &other.value)
    }
}

impl<S: Serialize> Snapshot<S> {
    /// Capture a value, rejecting anything that is not a keyed record.
    pub(crate) fn capture(value: S) -> Result<Self, StoreError> {
        match serde_json::to_value(&value)? {
            Value::Object(record) => Ok(Self {
                value: Arc::new(value),
                record: Arc::new(record),
            }),
            other => Err(StoreError::InvalidStateType {
                kind: value_kind(&other),
            }),
        }
    }
}

impl<S: Serialize + DeserializeOwned> Snapshot<S> {
    /// Decode a record into a snapshot.
    ///
    /// The stored record is re-derived from the decoded value, so keys the
    /// state type does not know about are dropped.
    pub(crate) fn from_record(record: Map<String, Value>) -> Result<Self, serde_json::Error> {
        let value: S = serde_json::from_value(Value::Object(record))?;
        match serde_json::to_value(&value)? {
            Value::Object(record) => Ok(Self {
                value: Arc::new(value),
                record: Arc::new(record),
            }),
            other => Err(serde::de::Error::custom(format!(
                "state decoded to {}, not a record",
                value_kind(&other)
            ))),
        }
    }
}

impl<S> Clone for Snapshot<S> {
    fn clone(&self) -> Self {
        Self {
            value: Arc::clone(&self.value),
            record: Arc::clone(&self.record),
        }
    }
}

impl<S> Deref for Snapshot<S> {
    type Target = S;

    fn deref(&self) -> &S {
        &self.value
    }
}

impl<S: fmt::Debug> fmt::Debug for Snapshot<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Snapshot").field(&self.value).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Counter {
        count: i32,
        label: String,
    }

    #[test]
    fn records_keep_declaration_order() {
        let snapshot = Snapshot::capture(Counter {
            count: 1,
            label: "a".into(),
        })
        .unwrap();

        let keys: Vec<_> = snapshot.record().keys().cloned().collect();
        assert_eq!(keys, vec!["count", "label"]);
        assert_eq!(snapshot.count, 1);
    }

    #[test]
    fn scalars_and_arrays_are_rejected() {
        assert!(matches!(
            Snapshot::capture(5),
            Err(StoreError::InvalidStateType { kind: "number" })
        ));
        assert!(matches!(
            Snapshot::capture(vec![1, 2]),
            Err(StoreError::InvalidStateType { kind: "array" })
        ));
        assert!(matches!(
            Snapshot::capture(Option::<Counter>::None),
            Err(StoreError::InvalidStateType { kind: "null" })
        ));
    }

    #[test]
    fn clones_share_storage() {
        let snapshot = Snapshot::capture(Counter {
            count: 1,
            label: "a".into(),
        })
        .unwrap();
        assert!(snapshot.ptr_eq(&snapshot.clone()));
    }

    #[test]
    fn from_record_decodes() {
        let mut record = Map::new();
        record.insert("count".into(), 3.into());
        record.insert("label".into(), "x".into());
        let snapshot = Snapshot::<Counter>::from_record(record).unwrap();
        assert_eq!(*snapshot.value().as_ref(), Counter { count: 3, label: "x".into() });
    }
}
