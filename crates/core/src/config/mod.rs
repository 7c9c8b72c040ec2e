//! Engine configuration and on-disk layout.
//!
//! - `EngineConfig`: serializable engine options (`.oxide/config.json`).
//! - `StoreLayout`: computed paths for the store directories and files.
//! - `load_config` / `save_config`: JSON persistence with contextual errors.

mod layout;

use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::distrib::DEFAULT_MAX_FRAME_LENGTH;

pub use layout::StoreLayout;

/// Engine-level options. Every field has a default, so partial files are valid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub distributed_enabled: bool,
    /// Worker endpoints as `host:port`.
    pub distributed_compute_nodes: Vec<String>,
    /// Port a worker listens on.
    pub distributed_port: u16,
    /// Artifact datastore directory (relative paths resolve against the store root).
    pub dir_datastore: String,
    pub dir_localstore: String,
    /// Empty disables file logging.
    pub dir_logs: String,
    /// `tracing` filter directive, e.g. `info` or `oxide_core=debug`.
    pub logging_level: String,
    /// 0 = warnings only on the console, 3 = trace.
    pub verbosity_level: u8,
    pub logging_rotate: bool,
    /// Bytes.
    pub logging_max_log_size: u64,
    pub logging_num_log_files: u32,
    /// Upper bound on concurrently running mappers; 0 picks the number of CPUs.
    pub max_parallelism: usize,
    pub worker_timeout_secs: u64,
    /// How long a failed worker stays out of the healthy set.
    pub worker_cooldown_secs: u64,
    /// Largest RPC frame, in bytes, sent or accepted by workers and coordinators.
    pub rpc_max_frame_bytes: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            distributed_enabled: false,
            distributed_compute_nodes: Vec::new(),
            distributed_port: 7341,
            dir_datastore: "datastore".to_string(),
            dir_localstore: "localstore".to_string(),
            dir_logs: "logs".to_string(),
            logging_level: "info".to_string(),
            verbosity_level: 0,
            logging_rotate: true,
            logging_max_log_size: 10 * 1024 * 1024,
            logging_num_log_files: 5,
            max_parallelism: 0,
            worker_timeout_secs: 30,
            worker_cooldown_secs: 60,
            rpc_max_frame_bytes: DEFAULT_MAX_FRAME_LENGTH,
        }
    }
}

impl EngineConfig {
    /// Resolved datastore directory.
    pub fn datastore_dir(&self, layout: &StoreLayout) -> PathBuf {
        layout.resolve(&self.dir_datastore)
    }

    pub fn localstore_dir(&self, layout: &StoreLayout) -> PathBuf {
        layout.resolve(&self.dir_localstore)
    }

    /// `None` when file logging is disabled.
    pub fn logs_dir(&self, layout: &StoreLayout) -> Option<PathBuf> {
        (!self.dir_logs.trim().is_empty()).then(|| layout.resolve(&self.dir_logs))
    }

    /// Worker endpoints, empty unless distribution is enabled.
    pub fn worker_endpoints(&self) -> &[String] {
        if self.distributed_enabled {
            &self.distributed_compute_nodes
        } else {
            &[]
        }
    }
}

/// Load the engine config JSON from disk for a given layout.
pub fn load_config(layout: &StoreLayout) -> Result<EngineConfig> {
    let config_json = std::fs::read_to_string(&layout.config_path).with_context(|| {
        format!("Failed to read engine config at {}", layout.config_path.display())
    })?;
    let config: EngineConfig =
        serde_json::from_str(&config_json).context("Failed to parse engine config JSON")?;
    Ok(config)
}

/// Load the config if present, defaults otherwise.
pub fn load_config_or_default(layout: &StoreLayout) -> Result<EngineConfig> {
    if layout.config_path.exists() {
        load_config(layout)
    } else {
        Ok(EngineConfig::default())
    }
}

/// Write `config` as pretty JSON, creating the metadata directory.
pub fn save_config(layout: &StoreLayout, config: &EngineConfig) -> Result<()> {
    std::fs::create_dir_all(&layout.meta_dir).with_context(|| {
        format!("Failed to create metadata directory {}", layout.meta_dir.display())
    })?;
    let json = serde_json::to_string_pretty(config).context("Failed to serialize engine config")?;
    std::fs::write(&layout.config_path, json).with_context(|| {
        format!("Failed to write engine config at {}", layout.config_path.display())
    })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_takes_defaults() {
        let cfg: EngineConfig =
            serde_json::from_str(r#"{"distributed_port": 9000, "verbosity_level": 2}"#)
                .expect("parse");
        assert_eq!(cfg.distributed_port, 9000);
        assert_eq!(cfg.verbosity_level, 2);
        assert_eq!(cfg.dir_datastore, "datastore");
        assert!(cfg.worker_endpoints().is_empty());
        assert_eq!(cfg.rpc_max_frame_bytes, DEFAULT_MAX_FRAME_LENGTH);
    }

    #[test]
    fn save_then_load() {
        let dir = tempfile::tempdir().expect("tempdir");
        let layout = StoreLayout::new(dir.path());
        let mut cfg = EngineConfig::default();
        cfg.distributed_enabled = true;
        cfg.distributed_compute_nodes = vec!["127.0.0.1:7341".into()];
        save_config(&layout, &cfg).expect("save");
        let loaded = load_config(&layout).expect("load");
        assert_eq!(loaded, cfg);
        assert_eq!(loaded.worker_endpoints(), ["127.0.0.1:7341".to_string()]);
    }

    #[test]
    fn missing_file_has_context() {
        let dir = tempfile::tempdir().expect("tempdir");
        let err = load_config(&StoreLayout::new(dir.path())).expect_err("missing");
        assert!(format!("{err:#}").contains("Failed to read engine config"));
    }
}
