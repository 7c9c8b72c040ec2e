use std::path::{Path, PathBuf};

/// Logical layout of a store on disk.
///
/// This is derived from a chosen root path. It does *not* perform any IO itself.
/// The CLI or other frontends are responsible for actually creating directories
/// and files based on this layout.
#[derive(Debug, Clone)]
pub struct StoreLayout {
    /// Root directory of the store.
    pub root: PathBuf,
    /// Directory for internal metadata (.oxide).
    pub meta_dir: PathBuf,
    /// Path to the engine config file (JSON).
    pub config_path: PathBuf,
    /// Path to the catalog database file.
    pub catalog_path: PathBuf,
    /// Default artifact datastore directory.
    pub datastore_dir: PathBuf,
    /// Default scratch store directory.
    pub localstore_dir: PathBuf,
    /// Default log directory.
    pub logs_dir: PathBuf,
}

impl StoreLayout {
    /// Compute the default layout for a store rooted at `root`.
    ///
    /// This does *not* touch the filesystem.
    pub fn new(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref().to_path_buf();
        let meta_dir = root.join(".oxide");
        let config_path = meta_dir.join("config.json");
        let catalog_path = meta_dir.join("catalog.db");
        let datastore_dir = root.join("datastore");
        let localstore_dir = root.join("localstore");
        let logs_dir = root.join("logs");

        Self { root, meta_dir, config_path, catalog_path, datastore_dir, localstore_dir, logs_dir }
    }

    /// Resolve a configured directory: absolute paths are kept, relative ones
    /// are taken from the layout root.
    pub fn resolve(&self, configured: &str) -> PathBuf {
        let path = Path::new(configured);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        }
    }

    /// Express `path` relative to the root when it lives under it.
    pub fn relative_string(&self, path: &Path) -> String {
        match path.strip_prefix(&self.root) {
            Ok(rel) => rel.to_string_lossy().to_string(),
            Err(_) => path.to_string_lossy().to_string(),
        }
    }
}
