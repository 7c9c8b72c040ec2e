use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;
use tempfile::NamedTempFile;

use crate::codec;
use crate::error::{EngineError, EngineResult};
use crate::util::{escape_component, unescape_component};

/// Scratch blob store for module state: `root/<module>/<name>`.
///
/// No option handling and no content addressing; the last write wins.
#[derive(Debug, Clone)]
pub struct LocalStore {
    root: PathBuf,
}

impl LocalStore {
    pub fn open(root: impl AsRef<Path>) -> EngineResult<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root).map_err(|e| EngineError::io(root.display(), e))?;
        Ok(Self { root })
    }

    fn path(&self, module: &str, name: &str) -> PathBuf {
        self.root.join(escape_component(module)).join(escape_component(name))
    }

    pub fn put(&self, module: &str, name: &str, data: &[u8]) -> EngineResult<()> {
        let path = self.path(module, name);
        let dir = path.parent().map(Path::to_path_buf).unwrap_or_else(|| self.root.clone());
        fs::create_dir_all(&dir).map_err(|e| EngineError::io(dir.display(), e))?;
        let mut tmp = NamedTempFile::new_in(&dir).map_err(|e| EngineError::io(dir.display(), e))?;
        tmp.write_all(data).map_err(|e| EngineError::io(tmp.path().display(), e))?;
        tmp.persist(&path).map_err(|e| EngineError::io(path.display(), e.error))?;
        Ok(())
    }

    pub fn retrieve(&self, module: &str, name: &str) -> EngineResult<Option<Vec<u8>>> {
        let path = self.path(module, name);
        match fs::read(&path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(EngineError::io(path.display(), e)),
        }
    }

    pub fn exists(&self, module: &str, name: &str) -> bool {
        self.path(module, name).is_file()
    }

    /// Names stored for `module`, sorted.
    pub fn available(&self, module: &str) -> EngineResult<Vec<String>> {
        let dir = self.root.join(escape_component(module));
        let read = match fs::read_dir(&dir) {
            Ok(read) => read,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(EngineError::io(dir.display(), e)),
        };
        let mut names = Vec::new();
        for entry in read {
            let entry = entry.map_err(|e| EngineError::io(dir.display(), e))?;
            let raw = entry.file_name().to_string_lossy().to_string();
            if raw.starts_with('.') {
                continue;
            }
            if let Some(name) = unescape_component(&raw) {
                names.push(name);
            }
        }
        names.sort();
        Ok(names)
    }

    /// Returns whether anything was removed.
    pub fn delete(&self, module: &str, name: &str) -> EngineResult<bool> {
        let path = self.path(module, name);
        match fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(EngineError::io(path.display(), e)),
        }
    }

    /// Store a value through the canonical encoding.
    pub fn put_value<T: Serialize>(&self, module: &str, name: &str, value: &T) -> EngineResult<()> {
        self.put(module, name, &codec::encode(value)?)
    }

    pub fn retrieve_value<T: DeserializeOwned>(&self, module: &str, name: &str) -> EngineResult<Option<T>> {
        self.retrieve(module, name)?.map(|bytes| codec::decode(&bytes)).transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn last_write_wins_and_names_are_listed() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = LocalStore::open(dir.path()).expect("open");
        store.put("plugin", "state/a", b"one").expect("put");
        store.put("plugin", "state/a", b"two").expect("put");
        store.put("plugin", "b", b"x").expect("put");
        assert_eq!(store.retrieve("plugin", "state/a").expect("get"), Some(b"two".to_vec()));
        assert_eq!(store.available("plugin").expect("list"), vec!["b", "state/a"]);
        assert!(store.delete("plugin", "b").expect("delete"));
        assert!(!store.exists("plugin", "b"));
        assert_eq!(store.retrieve("other", "b").expect("get"), None);
    }

    #[test]
    fn values_use_the_codec() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = LocalStore::open(dir.path()).expect("open");
        store.put_value("m", "counts", &vec![1u64, 2, 3]).expect("put");
        let back: Option<Vec<u64>> = store.retrieve_value("m", "counts").expect("get");
        assert_eq!(back, Some(vec![1, 2, 3]));
    }
}
