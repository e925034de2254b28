use crate::error::StoreError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Store construction options.
///
/// Every field is optional in serialized form. Field names are camelCase so
/// a TOML file reads like:
///
/// ```toml
/// persistence = true
/// setStateTimeout = 50
/// uniqKey = "settings"
/// storageDir = "/var/lib/app/state"
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct StoreOptions {
    /// Deep-freeze every snapshot. Snapshots are never mutated, so every
    /// store already satisfies this; it does not restrict merges.
    pub immutable: bool,
    /// Load the persisted record on start and save on every change.
    pub persistence: bool,
    /// Debounce window for notifications, in milliseconds. 0 is synchronous.
    pub set_state_timeout: u64,
    /// Explicit store identity; overrides the shape hash.
    pub uniq_key: Option<String>,
    /// Maximum age of a persisted record in milliseconds.
    pub lifetime: Option<u64>,
    /// Directory for file-backed storage. Without it the process-wide
    /// memory storage is used.
    pub storage_dir: Option<PathBuf>,
}

impl StoreOptions {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.set_state_timeout)
    }

    pub fn lifetime_duration(&self) -> Option<Duration> {
        self.lifetime.map(Duration::from_millis)
    }

    pub fn from_toml_str(source: &str) -> Result<Self, StoreError> {
        Ok(toml::from_str(source)?)
    }

    /// Read options from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|source| StoreError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_synchronous_and_volatile() {
        let options = StoreOptions::default();
        assert!(!options.immutable);
        assert!(!options.persistence);
        assert_eq!(options.debounce(), Duration::ZERO);
        assert_eq!(options.lifetime_duration(), None);
    }

    #[test]
    fn parses_camel_case_toml() {
        let options = StoreOptions::from_toml_str(
            r#"
            immutable = true
            persistence = true
            setStateTimeout = 25
            uniqKey = "profile"
            lifetime = 60000
            "#,
        )
        .unwrap();

        assert!(options.immutable);
        assert!(options.persistence);
        assert_eq!(options.debounce(), Duration::from_millis(25));
        assert_eq!(options.uniq_key.as_deref(), Some("profile"));
        assert_eq!(options.lifetime_duration(), Some(Duration::from_secs(60)));
        assert_eq!(options.storage_dir, None);
    }

    #[test]
    fn rejects_bad_types() {
        let err = StoreOptions::from_toml_str("setStateTimeout = \"soon\"").unwrap_err();
        assert!(matches!(err, StoreError::Config(_)));
    }

    #[test]
    fn load_reports_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = StoreOptions::load(dir.path().join("missing.toml")).unwrap_err();
        assert!(matches!(err, StoreError::Io { .. }));
    }

    #[test]
    fn load_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.toml");
        std::fs::write(&path, "persistence = true\n").unwrap();
        assert!(StoreOptions::load(&path).unwrap().persistence);
    }
}
