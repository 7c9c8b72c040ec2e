pub mod analysis;
pub mod objects;
pub mod serve;
pub mod store;

pub use analysis::*;
pub use objects::*;
pub use serve::*;
pub use store::*;

use anyhow::{Context, Result};
use oxide_core::config::{load_config_or_default, EngineConfig, StoreLayout};
use oxide_core::Engine;

use crate::canonicalize_or_current;

/// An opened store: layout, effective config, and engine.
pub struct Session {
    pub layout: StoreLayout,
    pub config: EngineConfig,
    pub engine: Engine,
}

/// Layout and config for `root`; the config falls back to defaults when absent.
pub fn load_layout(root: &str) -> Result<(StoreLayout, EngineConfig)> {
    let root_path = canonicalize_or_current(root)?;
    let layout = StoreLayout::new(&root_path);
    let config = load_config_or_default(&layout)?;
    Ok((layout, config))
}

/// Open the engine over an initialised store.
pub fn open_session(layout: StoreLayout, config: EngineConfig) -> Result<Session> {
    if !layout.config_path.exists() {
        return Err(anyhow::anyhow!(
            "No store at {} (run `oxide init` first)",
            layout.root.display()
        ));
    }
    let engine = Engine::open(&layout, config.clone())
        .with_context(|| format!("Failed to open store at {}", layout.root.display()))?;
    Ok(Session { layout, config, engine })
}
