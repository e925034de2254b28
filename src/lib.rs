//! # Statebox
//!
//! A shared application state container with selective change notification,
//! optional persistence and a dump history.
//!
//! ## Store
//!
//! - `Store<S>` - holds the current state of any serde record type
//! - `set_state` shallow-merges a patch and announces the change
//! - Dumps save and restore named, timestamped copies of the state
//!
//! ## Subscriptions
//!
//! - `Store::on` subscribes to `init`, `update`, `dumpUpdate` or `all`
//! - `Store::on_keys` fires only when one of the listed top-level keys changed
//! - A non-zero `setStateTimeout` debounces notifications through a `Scheduler`
//!
//! ## Persistence
//!
//! - `PersistenceDriver` - the storage contract a store writes through
//! - `LocalStorageDriver` over `MemoryStorage` or `FileStorage`

pub mod compare;
pub mod error;
pub mod event;
pub mod persist;
pub mod runtime;
pub mod store;

// Re-export main types for convenience
pub use error::{PersistenceError, StoreError};
pub use event::{Event, EventId, EventType, EventTypes};
pub use persist::{FileStorage, LocalStorageDriver, MemoryStorage, Packed, PersistenceDriver, Storage};
pub use runtime::{ManualScheduler, Scheduler, ThreadScheduler};
pub use store::{Snapshot, Store, StoreBuilder, StoreOptions, Subscriber, SubscriberId};

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn untyped_record_states_grow_new_keys() {
        let store = Store::builder(json!({"count": 0}).as_object().cloned().unwrap())
            .driver(LocalStorageDriver::new("untyped", MemoryStorage::new()))
            .build()
            .unwrap();

        store.set_state(json!({"label": "clicks"})).unwrap();
        assert_eq!(store.state()["count"], 0);
        assert_eq!(store.state()["label"], "clicks");
        assert_eq!(store.id(), "5a7510f");
        assert_eq!(*store.initial_state(), json!({"count": 0}).as_object().cloned().unwrap());
    }
}
