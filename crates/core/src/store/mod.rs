//! Persistent artifact storage.
//!
//! The namespace is partitioned by module name; inside a module an artifact
//! is addressed by OID plus the suffix of its mangling options. Writes are
//! atomic per key: readers observe either absence or a complete artifact.

mod fs;
mod local;

use std::fmt;

pub use fs::FsStore;
pub use local::LocalStore;

use crate::error::EngineResult;
use crate::model::Artifact;
use crate::oid::Oid;

/// Separates the OID from the option suffix in artifact file names.
pub const KEY_DELIMITER: char = '.';

/// Cache key of one artifact.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StoreKey {
    pub module: String,
    pub oid: Oid,
    pub suffix: String,
}

impl StoreKey {
    pub fn new(module: impl Into<String>, oid: Oid, suffix: impl Into<String>) -> Self {
        Self { module: module.into(), oid, suffix: suffix.into() }
    }

    /// File name inside the module directory: `oid` or `oid.suffix`.
    pub fn file_name(&self) -> String {
        if self.suffix.is_empty() {
            self.oid.to_string()
        } else {
            format!("{}{KEY_DELIMITER}{}", self.oid, self.suffix)
        }
    }

    /// Inverse of [`StoreKey::file_name`].
    pub fn from_file_name(module: &str, name: &str) -> Option<Self> {
        let (oid, suffix) = match name.split_once(KEY_DELIMITER) {
            Some((oid, suffix)) => (oid, suffix),
            None => (name, ""),
        };
        Some(Self::new(module, Oid::parse(oid)?, suffix))
    }
}

impl fmt::Display for StoreKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.module, self.file_name())
    }
}

/// Backend that persists artifacts by key.
pub trait ArtifactStore: Send + Sync {
    fn exists(&self, key: &StoreKey) -> EngineResult<bool>;

    fn retrieve(&self, key: &StoreKey) -> EngineResult<Option<Artifact>>;

    /// Write atomically. Concurrent writers to one key converge on the last complete write.
    fn store(&self, key: &StoreKey, artifact: &Artifact) -> EngineResult<()>;

    /// Delete every artifact of `module`, or only those of `oid`. Returns how many were removed.
    fn delete(&self, module: &str, oid: Option<&Oid>) -> EngineResult<usize>;

    /// Distinct OIDs with at least one artifact under `module`, sorted.
    fn retrieve_all_keys(&self, module: &str) -> EngineResult<Vec<Oid>>;
}
