//! Durable copies of the state.
//!
//! A [`PersistenceDriver`] keeps one "current" record per store plus an
//! ordered history of timestamped dumps. [`LocalStorageDriver`] implements
//! the contract on top of any [`Storage`] key/value backend.

mod driver;
mod file;
mod local;
mod storage;

pub use driver::{now_millis, Packed, PersistenceDriver};
pub use file::FileStorage;
pub use local::LocalStorageDriver;
pub use storage::{MemoryStorage, Storage};
