use super::event::{Event, EventId, Listener};
use super::kind::{EventType, EventTypes};
use crate::compare::are_similar_records;
use crate::runtime::{self, Scheduler, TimerHandle};
use crate::store::Snapshot;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

struct Notification<S> {
    kind: EventType,
    current: Snapshot<S>,
    previous: Snapshot<S>,
}

/// Notifications waiting on one timer.
///
/// A burst collapses to one entry per type: the earliest previous state and
/// the latest current state.
struct Pending<S> {
    generation: u64,
    timer: TimerHandle,
    batch: Vec<Notification<S>>,
}

fn merge<S>(batch: &mut Vec<Notification<S>>, incoming: Notification<S>) {
    match batch.iter_mut().find(|n| n.kind == incoming.kind) {
        Some(existing) => existing.current = incoming.current,
        None => batch.push(incoming),
    }
}

struct ManagerState<S> {
    events: Vec<Event<S>>,
    counter: u64,
    generation: u64,
    broadcast: Option<Pending<S>>,
    targeted: HashMap<EventId, Pending<S>>,
}

struct Shared<S> {
    debounce: Duration,
    scheduler: Arc<dyn Scheduler>,
    state: Mutex<ManagerState<S>>,
}

/// Owns the active subscriptions and dispatches notifications to them.
///
/// With a non-zero debounce, notifications are held back until the debounce
/// window passes without another one arriving. Broadcasts share a single
/// timer; notifications aimed at one event use a timer of their own.
pub struct EventManager<S> {
    shared: Arc<Shared<S>>,
}

impl<S> Clone for EventManager<S> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<S: Send + Sync + 'static> EventManager<S> {
    /// Create a manager. A zero `debounce` dispatches synchronously.
    pub fn new(debounce: Duration, scheduler: Arc<dyn Scheduler>) -> Self {
        Self {
            shared: Arc::new(Shared {
                debounce,
                scheduler,
                state: Mutex::new(ManagerState {
                    events: Vec::new(),
                    counter: 0,
                    generation: 0,
                    broadcast: None,
                    targeted: HashMap::new(),
                }),
            }),
        }
    }

    pub fn debounce(&self) -> Duration {
        self.shared.debounce
    }

    /// Number of active subscriptions.
    pub fn len(&self) -> usize {
        runtime::lock(&self.shared.state).events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Register a subscription and return its handle.
    pub fn add(&self, types: impl Into<EventTypes>, listener: Listener<S>) -> Event<S> {
        let weak = Arc::downgrade(&self.shared);
        let on_remove = Box::new(move |id: EventId| {
            if let Some(shared) = weak.upgrade() {
                EventManager { shared }.remove(id);
            }
        });

        let mut state = runtime::lock(&self.shared.state);
        state.counter += 1;
        let id = EventId::new(state.counter, chrono::Utc::now().timestamp_millis());
        let event = Event::new(id, types.into(), listener, on_remove);
        state.events.push(event.clone());

        tracing::debug!(event = %id, keys = ?event.keys(), "subscription added");
        event
    }

    /// Remove a subscription, cancelling anything pending for it.
    ///
    /// Unknown ids are ignored.
    pub fn remove(&self, id: EventId) {
        let mut state = runtime::lock(&self.shared.state);
        if let Some(pending) = state.targeted.remove(&id) {
            pending.timer.cancel();
        }

        let before = state.events.len();
        state.events.retain(|event| event.id() != id);
        if state.events.len() != before {
            tracing::debug!(event = %id, "subscription removed");
        }
    }

    /// Notify subscriptions of a change.
    ///
    /// With `target` set only that event is considered; otherwise every
    /// active event is.
    pub fn fire(
        &self,
        kind: EventType,
        current: &Snapshot<S>,
        previous: &Snapshot<S>,
        target: Option<&Event<S>>,
    ) {
        let notification = Notification {
            kind,
            current: current.clone(),
            previous: previous.clone(),
        };

        if self.shared.debounce.is_zero() {
            match target {
                Some(event) => dispatch(event, &notification),
                None => {
                    let events = runtime::lock(&self.shared.state).events.clone();
                    for event in &events {
                        dispatch(event, &notification);
                    }
                }
            }
            return;
        }

        match target {
            Some(event) => self.arm_targeted(event.id(), notification),
            None => self.arm_broadcast(notification),
        }
    }

    fn arm_broadcast(&self, notification: Notification<S>) {
        let mut state = runtime::lock(&self.shared.state);
        state.generation += 1;
        let generation = state.generation;

        let mut batch = match state.broadcast.take() {
            Some(pending) => {
                pending.timer.cancel();
                pending.batch
            }
            None => Vec::new(),
        };
        merge(&mut batch, notification);

        let weak = Arc::downgrade(&self.shared);
        let timer = self.shared.scheduler.schedule(
            self.shared.debounce,
            Box::new(move || flush_broadcast(weak, generation)),
        );
        tracing::debug!(generation, delay = ?self.shared.debounce, "broadcast armed");

        state.broadcast = Some(Pending {
            generation,
            timer,
            batch,
        });
    }

    fn arm_targeted(&self, id: EventId, notification: Notification<S>) {
        let mut state = runtime::lock(&self.shared.state);
        state.generation += 1;
        let generation = state.generation;

        let mut batch = match state.targeted.remove(&id) {
            Some(pending) => {
                pending.timer.cancel();
                pending.batch
            }
            None => Vec::new(),
        };
        merge(&mut batch, notification);

        let weak = Arc::downgrade(&self.shared);
        let timer = self.shared.scheduler.schedule(
            self.shared.debounce,
            Box::new(move || flush_targeted(weak, id, generation)),
        );
        tracing::debug!(event = %id, generation, "targeted fire armed");

        state.targeted.insert(
            id,
            Pending {
                generation,
                timer,
                batch,
            },
        );
    }
}

fn flush_broadcast<S>(shared: Weak<Shared<S>>, generation: u64) {
    let Some(shared) = shared.upgrade() else {
        return;
    };

    let (batch, events) = {
        let mut state = runtime::lock(&shared.state);
        // A timer that was superseded after it started sleeping must not fire.
        if state.broadcast.as_ref().map(|p| p.generation) != Some(generation) {
            return;
        }
        let batch = state.broadcast.take().map(|p| p.batch).unwrap_or_default();
        (batch, state.events.clone())
    };

    for notification in &batch {
        for event in &events {
            dispatch(event, notification);
        }
    }
}

fn flush_targeted<S>(shared: Weak<Shared<S>>, id: EventId, generation: u64) {
    let Some(shared) = shared.upgrade() else {
        return;
    };

    let (batch, event) = {
        let mut state = runtime::lock(&shared.state);
        if state.targeted.get(&id).map(|p| p.generation) != Some(generation) {
            return;
        }
        let batch = state.targeted.remove(&id).map(|p| p.batch).unwrap_or_default();
        let event = state.events.iter().find(|e| e.id() == id).cloned();
        (batch, event)
    };

    if let Some(event) = event {
        for notification in &batch {
            dispatch(&event, notification);
        }
    }
}

fn dispatch<S>(event: &Event<S>, notification: &Notification<S>) {
    if !event.types().matches(notification.kind) {
        return;
    }

    let current: &S = &notification.current;
    let previous: &S = &notification.previous;

    match event.listener() {
        Listener::Whole(callback) => callback(current, previous, notification.kind),
        Listener::Keys { keys, callback } => {
            let excluded: Vec<&str> = notification
                .current
                .record()
                .keys()
                .map(String::as_str)
                .filter(|key| !keys.iter().any(|k| k == key))
                .collect();

            if !are_similar_records(
                notification.current.record(),
                notification.previous.record(),
                &excluded,
            ) {
                callback(current, previous, keys.as_slice(), notification.kind);
            }
        }
    }
}
