use super::kind::{EventType, EventTypes};
use std::fmt;
use std::sync::Arc;

/// Callback for a subscription that watches the whole state.
///
/// Receives the current state, the previous state and the notification type.
pub type WholeCallback<S> = Box<dyn Fn(&S, &S, EventType) + Send + Sync>;

/// Callback for a key-restricted subscription.
///
/// Receives the watched keys in addition to what [`WholeCallback`] gets.
pub type KeysCallback<S> = Box<dyn Fn(&S, &S, &[String], EventType) + Send + Sync>;

/// Unique identifier of a subscription within its manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EventId {
    seq: u64,
    created_at: i64,
}

impl EventId {
    pub(crate) fn new(seq: u64, created_at: i64) -> Self {
        Self { seq, created_at }
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.seq, self.created_at)
    }
}

/// What a subscription does when it fires.
pub enum Listener<S> {
    /// Fires on every matching notification.
    Whole(WholeCallback<S>),
    /// Fires only when one of `keys` differs between current and previous.
    Keys {
        keys: Vec<String>,
        callback: KeysCallback<S>,
    },
}

impl<S> Listener<S> {
    pub fn whole<F>(callback: F) -> Self
    where
        F: Fn(&S, &S, EventType) + Send + Sync + 'static,
    {
        Listener::Whole(Box::new(callback))
    }

    pub fn keys<K, F>(keys: K, callback: F) -> Self
    where
        K: IntoIterator,
        K::Item: Into<String>,
        F: Fn(&S, &S, &[String], EventType) + Send + Sync + 'static,
    {
        Listener::Keys {
            keys: keys.into_iter().map(Into::into).collect(),
            callback: Box::new(callback),
        }
    }
}

struct EventInner<S> {
    id: EventId,
    types: EventTypes,
    listener: Listener<S>,
    on_remove: Box<dyn Fn(EventId) + Send + Sync>,
}

/// A registered subscription.
///
/// Handles are cheap to clone and all refer to the same subscription. The
/// only way to unsubscribe is [`remove`](Self::remove); dropping a handle
/// leaves the subscription in place.
pub struct Event<S> {
    inner: Arc<EventInner<S>>,
}

impl<S> Event<S> {
    pub(crate) fn new(
        id: EventId,
        types: EventTypes,
        listener: Listener<S>,
        on_remove: Box<dyn Fn(EventId) + Send + Sync>,
    ) -> Self {
        Self {
            inner: Arc::new(EventInner {
                id,
                types,
                listener,
                on_remove,
            }),
        }
    }

    pub fn id(&self) -> EventId {
        self.inner.id
    }

    pub fn types(&self) -> &EventTypes {
        &self.inner.types
    }

    pub fn listener(&self) -> &Listener<S> {
        &self.inner.listener
    }

    /// The key allowlist, for key-restricted subscriptions.
    pub fn keys(&self) -> Option<&[String]> {
        match &self.inner.listener {
            Listener::Whole(_) => None,
            Listener::Keys { keys, .. } => Some(keys),
        }
    }

    /// Unsubscribe. Repeated calls are harmless.
    pub fn remove(&self) {
        (self.inner.on_remove)(self.inner.id);
    }
}

impl<S> Clone for Event<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S> fmt::Debug for Event<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Event")
            .field("id", &self.inner.id)
            .field("types", &self.inner.types)
            .field("keys", &self.keys())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn remove_reports_own_id() {
        let removed = Arc::new(Mutex::new(Vec::new()));
        let removed_clone = removed.clone();
        let event: Event<()> = Event::new(
            EventId::new(7, 1_700_000_000_000),
            EventType::Update.into(),
            Listener::whole(|_, _, _| {}),
            Box::new(move |id| removed_clone.lock().unwrap().push(id)),
        );

        event.clone().remove();
        assert_eq!(*removed.lock().unwrap(), vec![event.id()]);
        assert_eq!(event.id().to_string(), "7-1700000000000");
    }

    #[test]
    fn keys_only_for_restricted_listeners() {
        let whole: Event<()> = Event::new(
            EventId::new(1, 0),
            EventType::All.into(),
            Listener::whole(|_, _, _| {}),
            Box::new(|_| {}),
        );
        let restricted: Event<()> = Event::new(
            EventId::new(2, 0),
            EventType::All.into(),
            Listener::keys(["a", "b"], |_, _, _, _| {}),
            Box::new(|_| {}),
        );

        assert_eq!(whole.keys(), None);
        assert_eq!(restricted.keys(), Some(&["a".to_string(), "b".to_string()][..]));
    }
}
