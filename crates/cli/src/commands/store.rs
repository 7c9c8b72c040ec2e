use std::fs;

use anyhow::{Context, Result};
use oxide_core::config::{save_config, EngineConfig, StoreLayout};
use oxide_core::engine::{COLLECTIONS, FILES};
use oxide_core::Engine;
use serde::Serialize;

use super::Session;

#[derive(Serialize)]
pub struct StoreInfoSnapshot {
    pub root: String,
    pub config_file: String,
    pub catalog: String,
    pub datastore: String,
    pub localstore: String,
    pub logs: Option<String>,
    pub files: usize,
    pub collections: usize,
    pub named_collections: usize,
    pub modules: Vec<String>,
    pub decoder: Option<String>,
    pub workers: Vec<WorkerStatus>,
}

#[derive(Serialize)]
pub struct WorkerStatus {
    pub endpoint: String,
    pub alive: bool,
}

/// Create the store directories, the config file (unless present) and the catalog.
pub fn init_command(layout: &StoreLayout, config: &EngineConfig) -> Result<()> {
    fs::create_dir_all(&layout.meta_dir)
        .with_context(|| format!("Failed to create meta dir: {}", layout.meta_dir.display()))?;
    let datastore = config.datastore_dir(layout);
    fs::create_dir_all(&datastore)
        .with_context(|| format!("Failed to create datastore dir: {}", datastore.display()))?;
    let localstore = config.localstore_dir(layout);
    fs::create_dir_all(&localstore)
        .with_context(|| format!("Failed to create localstore dir: {}", localstore.display()))?;

    let created_config = !layout.config_path.exists();
    if created_config {
        save_config(layout, config)?;
    }

    // Opening the engine creates the catalog and validates the config.
    Engine::open(layout, config.clone())
        .with_context(|| format!("Failed to initialize store at {}", layout.root.display()))?;

    println!("Initialized oxide store:");
    println!("  Root: {}", layout.root.display());
    println!(
        "  Config: {}{}",
        layout.config_path.display(),
        if created_config { "" } else { " (kept existing)" }
    );
    println!("  Catalog: {}", layout.catalog_path.display());
    println!("  Datastore: {}", layout.relative_string(&datastore));
    println!("  Localstore: {}", layout.relative_string(&localstore));
    Ok(())
}

pub fn store_info(session: &Session) -> Result<StoreInfoSnapshot> {
    let Session { layout, config, engine } = session;
    let workers = match engine.workers() {
        Some(pool) => pool
            .probe()
            .into_iter()
            .map(|(endpoint, alive)| WorkerStatus { endpoint, alive })
            .collect(),
        None => Vec::new(),
    };
    Ok(StoreInfoSnapshot {
        root: layout.root.display().to_string(),
        config_file: layout.config_path.display().to_string(),
        catalog: layout.catalog_path.display().to_string(),
        datastore: config.datastore_dir(layout).display().to_string(),
        localstore: config.localstore_dir(layout).display().to_string(),
        logs: config.logs_dir(layout).map(|p| p.display().to_string()),
        files: engine.retrieve_all_keys(FILES)?.len(),
        collections: engine.retrieve_all_keys(COLLECTIONS)?.len(),
        named_collections: engine.collection_names()?.len(),
        modules: engine.list_modules(false),
        decoder: engine.decoder().map(|d| d.name().to_string()),
        workers,
    })
}

pub fn info_command(session: &Session, json: bool) -> Result<()> {
    let info = store_info(session)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&info).context("Failed to serialize store info")?);
        return Ok(());
    }

    println!("oxide store");
    println!("===========");
    println!("Root: {}", info.root);
    println!("Config file: {}", info.config_file);
    println!("Catalog: {}", info.catalog);
    println!("Datastore: {}", info.datastore);
    println!("Localstore: {}", info.localstore);
    println!("Logs: {}", info.logs.as_deref().unwrap_or("(disabled)"));
    println!();
    println!("Files: {}", info.files);
    println!("Collections: {} ({} named)", info.collections, info.named_collections);
    println!("Modules: {}", info.modules.len());
    println!("Decoder: {}", info.decoder.as_deref().unwrap_or("(none)"));
    if !info.workers.is_empty() {
        println!("Workers:");
        for worker in &info.workers {
            println!("  - {} [{}]", worker.endpoint, if worker.alive { "alive" } else { "unreachable" });
        }
    }
    Ok(())
}
