use std::collections::BTreeSet;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use tracing::debug;

use super::{ArtifactStore, StoreKey};
use crate::codec;
use crate::error::{EngineError, EngineResult};
use crate::model::Artifact;
use crate::oid::Oid;

/// Filesystem store: one directory per module, one file per artifact.
///
/// Artifacts are written to a hidden temporary sibling and renamed into place.
#[derive(Debug, Clone)]
pub struct FsStore {
    root: PathBuf,
}

impl FsStore {
    pub fn open(root: impl AsRef<Path>) -> EngineResult<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root).map_err(|e| EngineError::io(root.display(), e))?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn module_dir(&self, module: &str) -> EngineResult<PathBuf> {
        if module.is_empty() || module.starts_with('.') || module.contains(['/', '\\']) {
            return Err(EngineError::UnrecognizedModule(module.to_string()));
        }
        Ok(self.root.join(module))
    }

    fn path_for(&self, key: &StoreKey) -> EngineResult<PathBuf> {
        Ok(self.module_dir(&key.module)?.join(key.file_name()))
    }

    /// Artifact file names under `module`, skipping in-progress temporaries.
    fn entries(&self, module: &str) -> EngineResult<Vec<StoreKey>> {
        let dir = self.module_dir(module)?;
        let read = match fs::read_dir(&dir) {
            Ok(read) => read,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(EngineError::io(dir.display(), e)),
        };
        let mut keys = Vec::new();
        for entry in read {
            let entry = entry.map_err(|e| EngineError::io(dir.display(), e))?;
            let name = entry.file_name().to_string_lossy().to_string();
            if name.starts_with('.') {
                continue;
            }
            if let Some(key) = StoreKey::from_file_name(module, &name) {
                keys.push(key);
            }
        }
        Ok(keys)
    }
}

impl ArtifactStore for FsStore {
    fn exists(&self, key: &StoreKey) -> EngineResult<bool> {
        Ok(self.path_for(key)?.is_file())
    }

    fn retrieve(&self, key: &StoreKey) -> EngineResult<Option<Artifact>> {
        let path = self.path_for(key)?;
        match fs::read(&path) {
            Ok(bytes) => codec::decode(&bytes).map(Some),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(EngineError::io(path.display(), e)),
        }
    }

    fn store(&self, key: &StoreKey, artifact: &Artifact) -> EngineResult<()> {
        let dir = self.module_dir(&key.module)?;
        fs::create_dir_all(&dir).map_err(|e| EngineError::io(dir.display(), e))?;
        let path = dir.join(key.file_name());
        let bytes = codec::encode(artifact)?;

        let mut tmp = NamedTempFile::new_in(&dir).map_err(|e| EngineError::io(dir.display(), e))?;
        tmp.write_all(&bytes).map_err(|e| EngineError::io(tmp.path().display(), e))?;
        tmp.as_file().sync_all().map_err(|e| EngineError::io(tmp.path().display(), e))?;
        tmp.persist(&path).map_err(|e| EngineError::io(path.display(), e.error))?;
        debug!(key = %key, bytes = bytes.len(), "stored artifact");
        Ok(())
    }

    fn delete(&self, module: &str, oid: Option<&Oid>) -> EngineResult<usize> {
        let dir = self.module_dir(module)?;
        let mut removed = 0;
        for key in self.entries(module)? {
            if oid.is_some_and(|o| o != &key.oid) {
                continue;
            }
            let path = dir.join(key.file_name());
            match fs::remove_file(&path) {
                Ok(()) => removed += 1,
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => return Err(EngineError::io(path.display(), e)),
            }
        }
        Ok(removed)
    }

    fn retrieve_all_keys(&self, module: &str) -> EngineResult<Vec<Oid>> {
        let oids: BTreeSet<Oid> = self.entries(module)?.into_iter().map(|k| k.oid).collect();
        Ok(oids.into_iter().collect())
    }
}
