use crate::error::PersistenceError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

/// Milliseconds since the Unix epoch.
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Serialization envelope for a persisted state record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Packed {
    /// The state record, absent for an empty shell.
    pub data: Option<Value>,
    /// When the record was packed, in epoch milliseconds.
    pub timestamp: i64,
}

impl Packed {
    /// Wrap `data` with the current time.
    pub fn now(data: Value) -> Self {
        Self {
            data: Some(data),
            timestamp: now_millis(),
        }
    }

    /// The "nothing stored" record.
    pub fn empty() -> Self {
        Self {
            data: None,
            timestamp: 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_none()
    }

    /// Whether the record is older than `lifetime` at time `now`.
    pub fn is_expired(&self, lifetime: Option<Duration>, now: i64) -> bool {
        match lifetime {
            Some(lifetime) => {
                let age = now.saturating_sub(self.timestamp);
                age > i64::try_from(lifetime.as_millis()).unwrap_or(i64::MAX)
            }
            None => false,
        }
    }
}

/// Storage contract between a store and its durable medium.
///
/// Implementations only need to be effectively synchronous: a `read` that
/// follows a `write` must observe it.
pub trait PersistenceDriver: Send {
    fn name(&self) -> &str;

    /// How long a current record stays valid. `None` never expires.
    fn lifetime(&self) -> Option<Duration>;

    /// Whether writes of the current record are kept.
    fn set_persistence(&mut self, enabled: bool);

    /// Record the store's initial state, used by [`reset`](Self::reset).
    fn set_initial_state(&mut self, state: Value);

    /// Last written current record, or [`Packed::empty`] if none is stored
    /// or it has expired.
    fn read(&self) -> Result<Packed, PersistenceError>;

    fn write(&mut self, packed: &Packed) -> Result<(), PersistenceError>;

    /// Replace the current record with the initial state.
    fn reset(&mut self) -> Result<(), PersistenceError>;

    /// Remove the current record.
    fn clear(&mut self) -> Result<(), PersistenceError>;

    /// Store a dump and return its timestamp, unique within this driver.
    fn save_dump(&mut self, packed: &Packed) -> Result<i64, PersistenceError>;

    fn read_dump(&self, timestamp: i64) -> Result<Option<Packed>, PersistenceError>;

    /// Remove one dump. Unknown timestamps are ignored.
    fn remove_dump(&mut self, timestamp: i64) -> Result<(), PersistenceError>;

    /// Dump timestamps in insertion order.
    fn dump_history(&self) -> Result<Vec<i64>, PersistenceError>;

    /// Remove every dump.
    fn reset_history(&mut self) -> Result<(), PersistenceError>;

    fn pack(&self, state: Value) -> Packed {
        Packed::now(state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn empty_shell() {
        let packed = Packed::empty();
        assert!(packed.is_empty());
        assert_eq!(serde_json::to_value(&packed).unwrap(), json!({"data": null, "timestamp": 0}));
    }

    #[test]
    fn expiry() {
        let packed = Packed {
            data: Some(json!({})),
            timestamp: 1_000,
        };
        assert!(!packed.is_expired(None, 1_000_000));
        assert!(!packed.is_expired(Some(Duration::from_secs(1)), 2_000));
        assert!(packed.is_expired(Some(Duration::from_secs(1)), 2_001));
    }
}
