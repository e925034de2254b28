use super::storage::Storage;
use crate::error::PersistenceError;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// Storage backed by a directory holding one file per key.
///
/// Writes go to a temporary file that is then renamed over the target, so a
/// crash mid-write leaves the previous value intact.
#[derive(Debug, Clone)]
pub struct FileStorage {
    root: PathBuf,
}

impl FileStorage {
    /// Use `root` as the storage directory, creating it if needed.
    pub fn open(root: impl AsRef<Path>) -> Result<Self, PersistenceError> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root).map_err(|source| PersistenceError::Io {
            operation: "create",
            path: root.clone(),
            source,
        })?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let name: String = key
            .chars()
            .map(|c| match c {
                'a'..='z' | 'A'..='Z' | '0'..='9' | '-' | '_' | '.' => c,
                _ => '_',
            })
            .collect();
        self.root.join(format!("{name}.json"))
    }
}

impl Storage for FileStorage {
    fn get_item(&self, key: &str) -> Result<Option<String>, PersistenceError> {
        let path = self.path_for(key);
        match fs::read_to_string(&path) {
            Ok(contents) => Ok(Some(contents)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(source) => Err(PersistenceError::Io {
                operation: "read",
                path,
                source,
            }),
        }
    }

    fn set_item(&self, key: &str, value: &str) -> Result<(), PersistenceError> {
        let path = self.path_for(key);
        let temp = path.with_extension("json.tmp");

        fs::write(&temp, value).map_err(|source| PersistenceError::Io {
            operation: "write",
            path: temp.clone(),
            source,
        })?;
        fs::rename(&temp, &path).map_err(|source| PersistenceError::Io {
            operation: "rename",
            path: path.clone(),
            source,
        })
    }

    fn remove_item(&self, key: &str) -> Result<(), PersistenceError> {
        let path = self.path_for(key);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(source) => Err(PersistenceError::Io {
                operation: "remove",
                path,
                source,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn set_get_remove() {
        let dir = TempDir::new().unwrap();
        let storage = FileStorage::open(dir.path().join("nested")).unwrap();

        assert_eq!(storage.get_item("a1b2").unwrap(), None);

        storage.set_item("a1b2", "{\"x\":1}").unwrap();
        assert_eq!(storage.get_item("a1b2").unwrap().as_deref(), Some("{\"x\":1}"));
        assert!(storage.root().join("a1b2.json").exists());

        storage.remove_item("a1b2").unwrap();
        storage.remove_item("a1b2").unwrap();
        assert_eq!(storage.get_item("a1b2").unwrap(), None);
    }

    #[test]
    fn keys_are_sanitized() {
        let dir = TempDir::new().unwrap();
        let storage = FileStorage::open(dir.path()).unwrap();

        storage.set_item("../escape/key", "v").unwrap();
        assert!(dir.path().join(".._escape_key.json").exists());
        assert_eq!(storage.get_item("../escape/key").unwrap().as_deref(), Some("v"));
    }

    #[test]
    fn overwrite_leaves_no_temp_file() {
        let dir = TempDir::new().unwrap();
        let storage = FileStorage::open(dir.path()).unwrap();

        storage.set_item("k", "1").unwrap();
        storage.set_item("k", "2").unwrap();

        assert_eq!(storage.get_item("k").unwrap().as_deref(), Some("2"));
        assert!(!dir.path().join("k.json.tmp").exists());
    }
}
