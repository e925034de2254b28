//! Subscriptions and change notification.
//!
//! An [`Event`] is one subscription: the notification types it listens for,
//! a callback, and optionally an allowlist of state keys. The
//! [`EventManager`] owns the active events and decides which of them to
//! invoke, and when, for each incoming notification.

mod event;
mod kind;
mod manager;

pub use event::{Event, EventId, KeysCallback, Listener, WholeCallback};
pub use kind::{EventType, EventTypes, ParseEventTypeError};
pub use manager::EventManager;
