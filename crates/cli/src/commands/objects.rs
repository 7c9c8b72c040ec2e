use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use oxide_core::engine::TAG_ANY;
use oxide_core::{Oid, Value};

use super::Session;
use crate::{parse_key_values, resolve_oid, resolve_oids, UsageError};

/// Import files and directories, optionally grouping the result into a named collection.
pub fn import_command(
    session: &Session,
    paths: &[String],
    collection: Option<&str>,
    recursive: bool,
) -> Result<Vec<Oid>> {
    let engine = &session.engine;
    let mut oids = Vec::new();
    for raw in paths {
        let path = Path::new(raw);
        if path.is_dir() {
            let imported = engine
                .import_directory(path, recursive)
                .with_context(|| format!("Failed to import directory {}", path.display()))?;
            for oid in &imported {
                println!("{oid}  {}", path.display());
            }
            oids.extend(imported);
        } else if path.is_file() {
            let oid = engine
                .import_file(path)
                .with_context(|| format!("Failed to import {}", path.display()))?;
            println!("{oid}  {}", path.display());
            oids.push(oid);
        } else {
            return Err(anyhow!("Path does not exist: {}", path.display()));
        }
    }

    if let Some(name) = collection {
        let oid = engine
            .create_collection(Some(name), &oids)
            .with_context(|| format!("Failed to create collection '{name}'"))?;
        println!("Collection {name}: {oid} ({} files)", oids.len());
    }
    Ok(oids)
}

pub fn tag_apply_command(session: &Session, oids: &[String], tags: &[String]) -> Result<()> {
    if tags.is_empty() {
        return Err(UsageError("At least one --tag key=value is required".into()).into());
    }
    let tags = parse_key_values(tags)?;
    let oids = resolve_oids(&session.engine, oids)?;
    session.engine.apply_tags(&oids, &tags).context("Failed to apply tags")?;
    println!("Tagged {} object(s) with {} tag(s)", oids.len(), tags.len());
    Ok(())
}

pub fn tag_get_command(session: &Session, oid: &str, json: bool) -> Result<()> {
    let oid = resolve_oid(&session.engine, oid)?;
    let tags = session.engine.get_tags(&oid).context("Failed to read tags")?;
    if json {
        let rendered: serde_json::Map<String, serde_json::Value> =
            tags.iter().map(|(k, v)| (k.clone(), v.to_json())).collect();
        println!("{}", serde_json::to_string_pretty(&rendered)?);
        return Ok(());
    }
    println!("Tags of {oid} ({}):", tags.len());
    if tags.is_empty() {
        println!("  (none)");
    }
    for (key, value) in &tags {
        println!("  {key} = {value}");
    }
    Ok(())
}

pub fn tag_filter_command(
    session: &Session,
    tag: &str,
    value: Option<&str>,
    oids: &[String],
) -> Result<()> {
    let value = value.map(Value::parse_cli).unwrap_or_else(|| Value::Str(TAG_ANY.to_string()));
    let list = if oids.is_empty() { None } else { Some(resolve_oids(&session.engine, oids)?) };
    let matched = session
        .engine
        .tag_filter(list.as_deref(), tag, &value)
        .context("Failed to filter by tag")?;
    for oid in matched {
        println!("{oid}");
    }
    Ok(())
}

pub fn collection_create_command(session: &Session, name: &str, oids: &[String]) -> Result<()> {
    let oids = resolve_oids(&session.engine, oids)?;
    let oid = session.engine.create_collection(Some(name), &oids)?;
    println!("Collection {name}: {oid}");
    Ok(())
}

pub fn collection_list_command(session: &Session, json: bool) -> Result<()> {
    let names = session.engine.collection_names()?;
    if json {
        let map: BTreeMap<String, String> =
            names.into_iter().map(|(name, oid)| (name, oid.to_string())).collect();
        println!("{}", serde_json::to_string_pretty(&map)?);
        return Ok(());
    }
    println!("Collections ({}):", names.len());
    if names.is_empty() {
        println!("  (none)");
    }
    for (name, oid) in names {
        println!("  - {name} {oid}");
    }
    Ok(())
}

pub fn collection_show_command(session: &Session, name: &str) -> Result<()> {
    let oid = resolve_oid(&session.engine, name)?;
    let members = session
        .engine
        .collection_members(&oid)?
        .ok_or_else(|| UsageError(format!("{oid} is not a collection")))?;
    println!("Collection {oid} ({} members):", members.len());
    for member in members {
        println!("  {member}");
    }
    Ok(())
}

pub fn collection_delete_command(session: &Session, name: &str) -> Result<()> {
    if session.engine.delete_collection(name)? {
        println!("Deleted collection name '{name}'");
        Ok(())
    } else {
        Err(UsageError(format!("No collection named '{name}'")).into())
    }
}

pub fn local_put_command(session: &Session, module: &str, name: &str, file: &Path) -> Result<()> {
    let data = fs::read(file).with_context(|| format!("Failed to read {}", file.display()))?;
    session.engine.local_store(module, name, &data)?;
    println!("Stored {} bytes as {module}/{name}", data.len());
    Ok(())
}

pub fn local_get_command(session: &Session, module: &str, name: &str, out: Option<&Path>) -> Result<()> {
    let data = session
        .engine
        .local_retrieve(module, name)?
        .ok_or_else(|| anyhow!("Nothing stored under {module}/{name}"))?;
    match out {
        Some(path) => {
            fs::write(path, &data).with_context(|| format!("Failed to write {}", path.display()))?;
            println!("Wrote {} bytes to {}", data.len(), path.display());
        }
        None => println!("{}", String::from_utf8_lossy(&data)),
    }
    Ok(())
}

pub fn local_list_command(session: &Session, module: &str) -> Result<()> {
    for name in session.engine.local_available(module)? {
        println!("{name}");
    }
    Ok(())
}
