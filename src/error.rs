//! Error types.
//!
//! Only construction errors and patch misuse surface from the store itself.
//! Persistence errors are produced by drivers and absorbed by the store.

use std::path::PathBuf;
use thiserror::Error;

/// Errors returned by [`Store`](crate::Store) operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The initial state does not serialize to a keyed record.
    #[error("initial state must be a record, passed: {kind}")]
    InvalidStateType { kind: &'static str },

    /// A `set_state` patch is not a record or does not fit the state type.
    #[error("invalid state patch: {reason}")]
    InvalidPatch { reason: String },

    #[error("state serialization failed")]
    Serialization(#[from] serde_json::Error),

    #[error("invalid store options: {0}")]
    Config(#[from] toml::de::Error),

    #[error("failed to read {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Errors raised by persistence drivers and storage backends.
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("failed to {operation} {path}")]
    Io {
        operation: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to encode persisted record")]
    Serialization(#[from] serde_json::Error),

    /// A stored entry exists but cannot be understood.
    #[error("corrupt entry {key}: {reason}")]
    Corrupt { key: String, reason: String },
}

/// Name of a JSON value's kind, used in [`StoreError::InvalidStateType`].
pub(crate) fn value_kind(value: &serde_json::Value) -> &'static str {
    use serde_json::Value;

    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn kinds_are_named() {
        assert_eq!(value_kind(&json!(1)), "number");
        assert_eq!(value_kind(&json!([1, 2])), "array");
        assert_eq!(value_kind(&json!(null)), "null");
        assert_eq!(value_kind(&json!({"a": 1})), "object");
    }

    #[test]
    fn invalid_state_message() {
        let err = StoreError::InvalidStateType { kind: "array" };
        assert_eq!(err.to_string(), "initial state must be a record, passed: array");
    }
}
