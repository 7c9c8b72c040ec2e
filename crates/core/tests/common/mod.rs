#![allow(dead_code)]

use std::path::Path;

use oxide_core::config::{EngineConfig, StoreLayout};
use oxide_core::registry::ModuleRegistry;
use oxide_core::{Engine, Oid};

pub fn test_config() -> EngineConfig {
    EngineConfig { max_parallelism: 2, ..EngineConfig::default() }
}

/// Engine over a fresh store under `root/store` with the built-in modules.
pub fn open_engine(root: &Path) -> Engine {
    let layout = StoreLayout::new(root.join("store"));
    Engine::open(&layout, test_config()).expect("open engine")
}

pub fn open_engine_with(root: &Path, registry: ModuleRegistry) -> Engine {
    let layout = StoreLayout::new(root.join("store"));
    Engine::open_with(&layout, test_config(), registry).expect("open engine")
}

/// Write `data` to `root/inputs/name` and import it.
pub fn import_bytes(engine: &Engine, root: &Path, name: &str, data: &[u8]) -> Oid {
    let inputs = root.join("inputs");
    std::fs::create_dir_all(&inputs).expect("create inputs dir");
    let path = inputs.join(name);
    std::fs::write(&path, data).expect("write input");
    engine.import_file(&path).expect("import file")
}
