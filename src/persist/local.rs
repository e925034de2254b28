use super::driver::{now_millis, Packed, PersistenceDriver};
use super::storage::Storage;
use crate::error::PersistenceError;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

/// Persistence driver over a string key/value [`Storage`].
///
/// For a driver named `n` the layout is:
///
/// ```text
/// n              current record   {"data": {...}, "timestamp": 1700000000000}
/// n.dumps        dump index       [1700000000001, 1700000000002]
/// n.dump.<ts>    one dump record  {"data": {...}, "timestamp": <ts>}
/// ```
pub struct LocalStorageDriver {
    name: String,
    lifetime: Option<Duration>,
    persistence: bool,
    initial_state: Option<Value>,
    storage: Arc<dyn Storage>,
}

impl LocalStorageDriver {
    pub fn new(name: impl Into<String>, storage: impl Storage + 'static) -> Self {
        Self {
            name: name.into(),
            lifetime: None,
            persistence: false,
            initial_state: None,
            storage: Arc::new(storage),
        }
    }

    /// Expire current records older than `lifetime`.
    pub fn with_lifetime(mut self, lifetime: Duration) -> Self {
        self.lifetime = Some(lifetime);
        self
    }

    pub fn persistence(&self) -> bool {
        self.persistence
    }

    fn history_key(&self) -> String {
        format!("{}.dumps", self.name)
    }

    fn dump_key(&self, timestamp: i64) -> String {
        format!("{}.dump.{}", self.name, timestamp)
    }

    fn load<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, PersistenceError> {
        match self.storage.get_item(key)? {
            Some(raw) => serde_json::from_str(&raw)
                .map(Some)
                .map_err(|err| PersistenceError::Corrupt {
                    key: key.to_string(),
                    reason: err.to_string(),
                }),
            None => Ok(None),
        }
    }

    fn store<T: serde::Serialize>(&self, key: &str, value: &T) -> Result<(), PersistenceError> {
        let raw = serde_json::to_string(value)?;
        self.storage.set_item(key, &raw)
    }
}

impl PersistenceDriver for LocalStorageDriver {
    fn name(&self) -> &str {
        &self.name
    }

    fn lifetime(&self) -> Option<Duration> {
        self.lifetime
    }

    fn set_persistence(&mut self, enabled: bool) {
        self.persistence = enabled;
    }

    fn set_initial_state(&mut self, state: Value) {
        self.initial_state = Some(state);
    }

    fn read(&self) -> Result<Packed, PersistenceError> {
        let Some(packed) = self.load::<Packed>(&self.name)? else {
            return Ok(Packed::empty());
        };

        if packed.is_expired(self.lifetime, now_millis()) {
            tracing::debug!(driver = %self.name, timestamp = packed.timestamp, "persisted record expired");
            return Ok(Packed::empty());
        }
        Ok(packed)
    }

    fn write(&mut self, packed: &Packed) -> Result<(), PersistenceError> {
        if !self.persistence {
            return Ok(());
        }
        self.store(&self.name, packed)
    }

    fn reset(&mut self) -> Result<(), PersistenceError> {
        match self.initial_state.clone() {
            Some(initial) => {
                let packed = self.pack(initial);
                self.write(&packed)
            }
            None => self.clear(),
        }
    }

    fn clear(&mut self) -> Result<(), PersistenceError> {
        self.storage.remove_item(&self.name)
    }

    fn save_dump(&mut self, packed: &Packed) -> Result<i64, PersistenceError> {
        let mut history = self.dump_history()?;

        // Two dumps in the same millisecond still need distinct keys.
        let timestamp = match history.last() {
            Some(last) if *last >= packed.timestamp => last + 1,
            _ => packed.timestamp,
        };
        let record = Packed {
            data: packed.data.clone(),
            timestamp,
        };

        self.store(&self.dump_key(timestamp), &record)?;
        history.push(timestamp);
        self.store(&self.history_key(), &history)?;

        tracing::debug!(driver = %self.name, timestamp, "dump saved");
        Ok(timestamp)
    }

    fn read_dump(&self, timestamp: i64) -> Result<Option<Packed>, PersistenceError> {
        self.load(&self.dump_key(timestamp))
    }

    fn remove_dump(&mut self, timestamp: i64) -> Result<(), PersistenceError> {
        let mut history = self.dump_history()?;
        let before = history.len();
        history.retain(|ts| *ts != timestamp);

        self.storage.remove_item(&self.dump_key(timestamp))?;
        if history.len() != before {
            self.store(&self.history_key(), &history)?;
        }
        Ok(())
    }

    fn dump_history(&self) -> Result<Vec<i64>, PersistenceError> {
        Ok(self.load(&self.history_key())?.unwrap_or_default())
    }

    fn reset_history(&mut self) -> Result<(), PersistenceError> {
        for timestamp in self.dump_history()? {
            self.storage.remove_item(&self.dump_key(timestamp))?;
        }
        self.storage.remove_item(&self.history_key())
    }
}
