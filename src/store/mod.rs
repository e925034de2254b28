//! The state container.
//!
//! A [`Store`] owns the current [`Snapshot`] of the application state,
//! persists it, keeps a dump history, and tells subscriptions and attached
//! UI [`Subscriber`]s when it changes.

mod options;
mod snapshot;
mod store;
mod subscriber;

pub use options::StoreOptions;
pub use snapshot::Snapshot;
pub use store::{Store, StoreBuilder};
pub use subscriber::{Subscriber, SubscriberId};
