use super::options::StoreOptions;
use super::snapshot::Snapshot;
use super::subscriber::{Subscriber, SubscriberId};
use crate::error::{value_kind, StoreError};
use crate::event::{Event, EventManager, EventType, EventTypes, Listener};
use crate::persist::{FileStorage, LocalStorageDriver, MemoryStorage, PersistenceDriver};
use crate::runtime::{self, Scheduler, ThreadScheduler};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, RwLock};

type Subscribers = Vec<(SubscriberId, Arc<dyn Subscriber>)>;

struct StoreInner<S> {
    id: String,
    options: StoreOptions,
    initial: Snapshot<S>,
    current: RwLock<Snapshot<S>>,
    driver: Mutex<Box<dyn PersistenceDriver>>,
    events: EventManager<S>,
    subscribers: RwLock<Subscribers>,
    next_subscriber: AtomicUsize,
}

/// A shared application state container.
///
/// The state is replaced, never mutated, on every change. Changes are
/// persisted through a [`PersistenceDriver`] and announced to subscriptions
/// registered with [`on`](Self::on) and to attached UI [`Subscriber`]s.
/// Cloning a store gives another handle to the same container.
///
/// # Examples
///
/// ```
/// use serde::{Deserialize, Serialize};
/// use serde_json::json;
/// use statebox::Store;
///
/// #[derive(Clone, Serialize, Deserialize)]
/// struct Counter {
///     count: i32,
/// }
///
/// let store = Store::new(Counter { count: 0 }).unwrap();
/// store.set_state(json!({"count": 1})).unwrap();
/// assert_eq!(store.state().count, 1);
///
/// store.reset_state();
/// assert_eq!(store.state().count, 0);
/// ```
pub struct Store<S> {
    inner: Arc<StoreInner<S>>,
}

impl<S> Clone for Store<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

/// Configures and builds a [`Store`].
pub struct StoreBuilder<S> {
    initial: S,
    options: StoreOptions,
    driver: Option<Box<dyn PersistenceDriver>>,
    scheduler: Option<Arc<dyn Scheduler>>,
}

impl<S> StoreBuilder<S>
where
    S: Serialize + DeserializeOwned + Send + Sync + 'static,
{
    pub fn options(mut self, options: StoreOptions) -> Self {
        self.options = options;
        self
    }

    /// Use `driver` instead of the default local storage driver.
    pub fn driver(mut self, driver: impl PersistenceDriver + 'static) -> Self {
        self.driver = Some(Box::new(driver));
        self
    }

    /// Drive debounced notifications with `scheduler`.
    pub fn scheduler(mut self, scheduler: Arc<dyn Scheduler>) -> Self {
        self.scheduler = Some(scheduler);
        self
    }

    /// Validate the initial state and assemble the store.
    ///
    /// Fails with [`StoreError::InvalidStateType`] if the initial state is
    /// not a keyed record.
    pub fn build(self) -> Result<Store<S>, StoreError> {
        let StoreBuilder {
            initial,
            options,
            driver,
            scheduler,
        } = self;

        let initial = Snapshot::capture(initial)?;
        let id = options
            .uniq_key
            .clone()
            .unwrap_or_else(|| shape_hash(initial.record()));

        let mut driver = driver.unwrap_or_else(|| default_driver(&id, &options));

        let restored = if options.persistence {
            restore_persisted::<S>(&id, &*driver)
        } else {
            None
        };
        let is_restored = restored.is_some();
        let current = restored.unwrap_or_else(|| initial.clone());

        driver.set_persistence(options.persistence);
        driver.set_initial_state(Value::Object(initial.record().clone()));

        let scheduler = scheduler.unwrap_or_else(ThreadScheduler::global);
        let events = EventManager::new(options.debounce(), scheduler);

        tracing::debug!(
            store = %id,
            driver = driver.name(),
            persistence = options.persistence,
            restored = is_restored,
            "store created"
        );

        Ok(Store {
            inner: Arc::new(StoreInner {
                id,
                options,
                initial,
                current: RwLock::new(current),
                driver: Mutex::new(driver),
                events,
                subscribers: RwLock::new(Vec::new()),
                next_subscriber: AtomicUsize::new(0),
            }),
        })
    }
}

impl<S> Store<S>
where
    S: Serialize + DeserializeOwned + Send + Sync + 'static,
{
    pub fn builder(initial: S) -> StoreBuilder<S> {
        StoreBuilder {
            initial,
            options: StoreOptions::default(),
            driver: None,
            scheduler: None,
        }
    }

    /// Create a store with default options.
    pub fn new(initial: S) -> Result<Self, StoreError> {
        Self::builder(initial).build()
    }

    pub fn with_options(initial: S, options: StoreOptions) -> Result<Self, StoreError> {
        Self::builder(initial).options(options).build()
    }

    pub fn with_driver(
        initial: S,
        options: StoreOptions,
        driver: impl PersistenceDriver + 'static,
    ) -> Result<Self, StoreError> {
        Self::builder(initial).options(options).driver(driver).build()
    }

    /// The store identity: the `uniq_key` option or the shape hash.
    pub fn id(&self) -> &str {
        &self.inner.id
    }

    pub fn options(&self) -> &StoreOptions {
        &self.inner.options
    }

    /// The current state.
    pub fn state(&self) -> Arc<S> {
        Arc::clone(self.snapshot().value())
    }

    /// The current state together with its record form.
    pub fn snapshot(&self) -> Snapshot<S> {
        runtime::read(&self.inner.current).clone()
    }

    /// The state the store was constructed with.
    pub fn initial_state(&self) -> Arc<S> {
        Arc::clone(self.inner.initial.value())
    }

    /// Shallow-merge `patch` onto the current state.
    ///
    /// Top-level keys in `patch` replace the current values; every other key
    /// is carried over. The new state is persisted and announced before this
    /// returns, unless notifications are debounced.
    ///
    /// Fails, leaving the state untouched, if `patch` is not a record or if
    /// the merge does not decode into `S`.
    pub fn set_state<P: Serialize>(&self, patch: P) -> Result<(), StoreError> {
        let patch = match serde_json::to_value(patch)? {
            Value::Object(patch) => patch,
            other => {
                return Err(StoreError::InvalidPatch {
                    reason: format!("expected a record, got {}", value_kind(&other)),
                })
            }
        };

        let (current, previous) = self.apply(patch)?;
        self.update(&current, &previous);
        Ok(())
    }

    /// Replace the state with the result of editing a copy of it.
    pub fn set_state_with<F>(&self, edit: F) -> Result<(), StoreError>
    where
        S: Clone,
        F: FnOnce(&mut S),
    {
        let mut next = S::clone(&self.state());
        edit(&mut next);
        self.set_state(next)
    }

    /// Restore every field to its initial value.
    pub fn reset_state(&self) {
        let initial = self.inner.initial.record().clone();
        match self.apply(initial) {
            Ok((current, previous)) => {
                self.update(&current, &previous);
            }
            Err(err) => tracing::warn!(store = %self.inner.id, error = %err, "reset failed"),
        }
    }

    /// Overwrite the persisted record with the initial state.
    pub fn reset_persistence(&self) {
        if let Err(err) = runtime::lock(&self.inner.driver).reset() {
            tracing::warn!(store = %self.inner.id, error = %err, "failed to reset persistence");
        }
    }

    /// Remove the persisted record.
    pub fn clear_persistence(&self) {
        if let Err(err) = runtime::lock(&self.inner.driver).clear() {
            tracing::warn!(store = %self.inner.id, error = %err, "failed to clear persistence");
        }
    }

    /// Save the current state as a dump and return its timestamp.
    ///
    /// Returns `None` only if the storage medium failed.
    pub fn save_dump(&self) -> Option<i64> {
        let current = self.snapshot();
        let saved = {
            let mut driver = runtime::lock(&self.inner.driver);
            let packed = driver.pack(Value::Object(current.record().clone()));
            driver.save_dump(&packed)
        };

        self.inner
            .events
            .fire(EventType::DumpUpdate, &current, &current, None);

        match saved {
            Ok(timestamp) => Some(timestamp),
            Err(err) => {
                tracing::warn!(store = %self.inner.id, error = %err, "failed to save dump");
                None
            }
        }
    }

    /// Delete the dump saved at `timestamp`, if there is one.
    pub fn remove_dump(&self, timestamp: i64) {
        let removed = runtime::lock(&self.inner.driver).remove_dump(timestamp);
        if let Err(err) = removed {
            tracing::warn!(store = %self.inner.id, timestamp, error = %err, "failed to remove dump");
        }

        let current = self.snapshot();
        self.inner
            .events
            .fire(EventType::DumpUpdate, &current, &current, None);
    }

    /// Make the dump saved at `timestamp` the current state.
    ///
    /// Goes through [`set_state`](Self::set_state), then sends a
    /// `dumpUpdate` notification whose previous state is the one replaced.
    /// Unknown timestamps change nothing.
    pub fn restore_dump(&self, timestamp: i64) {
        let dump = runtime::lock(&self.inner.driver).read_dump(timestamp);
        let record = match dump {
            Ok(Some(packed)) => match packed.data {
                Some(Value::Object(record)) => record,
                _ => {
                    tracing::warn!(store = %self.inner.id, timestamp, "dump holds no state record");
                    return;
                }
            },
            Ok(None) => {
                tracing::debug!(store = %self.inner.id, timestamp, "no dump to restore");
                return;
            }
            Err(err) => {
                tracing::warn!(store = %self.inner.id, timestamp, error = %err, "failed to read dump");
                return;
            }
        };

        match self.apply(record) {
            Ok((current, previous)) => {
                self.update(&current, &previous);
                self.inner
                    .events
                    .fire(EventType::DumpUpdate, &current, &previous, None);
            }
            Err(err) => {
                tracing::warn!(store = %self.inner.id, timestamp, error = %err, "dump does not fit the state")
            }
        }
    }

    /// Timestamps of the saved dumps, oldest first.
    pub fn dump_history(&self) -> Vec<i64> {
        runtime::lock(&self.inner.driver)
            .dump_history()
            .unwrap_or_else(|err| {
                tracing::warn!(store = %self.inner.id, error = %err, "failed to read dump history");
                Vec::new()
            })
    }

    /// Delete every dump.
    pub fn reset_dump_history(&self) {
        let reset = runtime::lock(&self.inner.driver).reset_history();
        if let Err(err) = reset {
            tracing::warn!(store = %self.inner.id, error = %err, "failed to reset dump history");
        }

        let current = self.snapshot();
        self.inner
            .events
            .fire(EventType::DumpUpdate, &current, &current, None);
    }

    /// Subscribe to notifications of the given types.
    ///
    /// The new subscription immediately receives `init` and `dumpUpdate`
    /// with the current state as both current and previous.
    ///
    /// # Examples
    ///
    /// ```
    /// use serde_json::{json, Map, Value};
    /// use statebox::{EventType, Store};
    /// use std::sync::{Arc, Mutex};
    ///
    /// let store = Store::new(json!({"x": 0}).as_object().cloned().unwrap()).unwrap();
    /// let seen = Arc::new(Mutex::new(Vec::new()));
    /// let seen_clone = seen.clone();
    ///
    /// let event = store.on(EventType::Update, move |current: &Map<String, Value>, _: &Map<String, Value>, _| {
    ///     seen_clone.lock().unwrap().push(current["x"].clone());
    /// });
    ///
    /// store.set_state(json!({"x": 1})).unwrap();
    /// event.remove();
    /// store.set_state(json!({"x": 2})).unwrap();
    ///
    /// assert_eq!(*seen.lock().unwrap(), vec![json!(1)]);
    /// ```
    pub fn on<F>(&self, types: impl Into<EventTypes>, callback: F) -> Event<S>
    where
        F: Fn(&S, &S, EventType) + Send + Sync + 'static,
    {
        self.subscribe(types.into(), Listener::whole(callback))
    }

    /// Subscribe to changes of specific top-level keys only.
    pub fn on_keys<K, F>(&self, types: impl Into<EventTypes>, keys: K, callback: F) -> Event<S>
    where
        K: IntoIterator,
        K::Item: Into<String>,
        F: Fn(&S, &S, &[String], EventType) + Send + Sync + 'static,
    {
        self.subscribe(types.into(), Listener::keys(keys, callback))
    }

    fn subscribe(&self, types: EventTypes, listener: Listener<S>) -> Event<S> {
        let event = self.inner.events.add(types, listener);
        let current = self.snapshot();

        self.inner
            .events
            .fire(EventType::Init, &current, &current, Some(&event));
        self.inner
            .events
            .fire(EventType::DumpUpdate, &current, &current, Some(&event));

        event
    }

    /// Attach a UI subscriber to be re-rendered on every change.
    pub fn attach(&self, subscriber: Arc<dyn Subscriber>) -> SubscriberId {
        let id = SubscriberId(self.inner.next_subscriber.fetch_add(1, Ordering::SeqCst));
        runtime::write(&self.inner.subscribers).push((id, subscriber));
        id
    }

    pub fn detach(&self, id: SubscriberId) {
        runtime::write(&self.inner.subscribers).retain(|(attached, _)| *attached != id);
    }

    /// Re-render mounted subscribers, then send an `update` notification.
    pub fn update(&self, current: &Snapshot<S>, previous: &Snapshot<S>) {
        let subscribers = runtime::read(&self.inner.subscribers).clone();

        for (_, subscriber) in &subscribers {
            if !subscriber.is_mounted() {
                continue;
            }
            subscriber.will_update_from_store();
            subscriber.store_will_update();
            subscriber.force_update();
            subscriber.store_did_update();
            subscriber.did_update_from_store();
        }

        self.inner
            .events
            .fire(EventType::Update, current, previous, None);
    }

    /// Commit `patch` and persist the result as one step.
    ///
    /// The driver lock is held across both, so concurrent writers persist in
    /// the same order they commit. Lock order is driver, then state.
    fn apply(&self, patch: Map<String, Value>) -> Result<(Snapshot<S>, Snapshot<S>), StoreError> {
        let mut driver = runtime::lock(&self.inner.driver);
        let (current, previous) = self.commit(patch)?;
        self.persist(&mut **driver, &current);
        Ok((current, previous))
    }

    /// Merge `patch` into the current record and swap in the result.
    ///
    /// Returns the new and the replaced snapshot.
    fn commit(&self, patch: Map<String, Value>) -> Result<(Snapshot<S>, Snapshot<S>), StoreError> {
        let mut current = runtime::write(&self.inner.current);

        let mut record = current.record().clone();
        for (key, value) in patch {
            record.insert(key, value);
        }

        let next: Snapshot<S> = Snapshot::from_record(record).map_err(|err| StoreError::InvalidPatch {
            reason: err.to_string(),
        })?;
        let previous = std::mem::replace(&mut *current, next.clone());

        tracing::debug!(store = %self.inner.id, "state replaced");
        Ok((next, previous))
    }

    /// Best-effort write of the current record.
    fn persist(&self, driver: &mut dyn PersistenceDriver, current: &Snapshot<S>) {
        let packed = driver.pack(Value::Object(current.record().clone()));
        if let Err(err) = driver.write(&packed) {
            tracing::warn!(store = %self.inner.id, error = %err, "failed to persist state");
        }
    }
}

/// Identity derived from the top-level key names, in declaration order.
///
/// Two states with the same field names share an id regardless of values.
pub(crate) fn shape_hash(record: &Map<String, Value>) -> String {
    let flat: String = record.keys().map(String::as_str).collect();

    let mut hash: i32 = 0;
    for unit in flat.encode_utf16() {
        hash = hash.wrapping_mul(31).wrapping_add(i32::from(unit));
    }

    if hash < 0 {
        format!("-{:x}", hash.unsigned_abs())
    } else {
        format!("{hash:x}")
    }
}

fn default_driver(id: &str, options: &StoreOptions) -> Box<dyn PersistenceDriver> {
    let driver = match &options.storage_dir {
        Some(dir) => match FileStorage::open(dir) {
            Ok(storage) => LocalStorageDriver::new(id, storage),
            Err(err) => {
                tracing::warn!(store = %id, error = %err, "file storage unavailable, using memory");
                LocalStorageDriver::new(id, MemoryStorage::global())
            }
        },
        None => LocalStorageDriver::new(id, MemoryStorage::global()),
    };

    match options.lifetime_duration() {
        Some(lifetime) => Box::new(driver.with_lifetime(lifetime)),
        None => Box::new(driver),
    }
}

fn restore_persisted<S>(id: &str, driver: &dyn PersistenceDriver) -> Option<Snapshot<S>>
where
    S: Serialize + DeserializeOwned,
{
    let packed = match driver.read() {
        Ok(packed) => packed,
        Err(err) => {
            tracing::warn!(store = %id, error = %err, "failed to read persisted state");
            return None;
        }
    };

    match packed.data? {
        Value::Object(record) => match Snapshot::from_record(record) {
            Ok(snapshot) => Some(snapshot),
            Err(err) => {
                tracing::warn!(store = %id, error = %err, "persisted state does not fit, ignoring it");
                None
            }
        },
        other => {
            tracing::warn!(store = %id, kind = value_kind(&other), "persisted state is not a record");
            None
        }
    }
}
