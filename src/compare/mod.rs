//! Value-level equality between state records.
//!
//! Used by the event manager to decide whether a key-restricted
//! subscription has anything new to report.

mod similar;

pub use similar::{are_similar, are_similar_records};
