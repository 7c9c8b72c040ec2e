use std::env;
use std::fmt;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use oxide_core::options::OptionBag;
use oxide_core::{Engine, EngineError, Oid, Value};

pub mod commands;
pub mod logging;

/// Canonicalize the root path if possible, falling back to the given string
/// relative to the current working directory.
pub fn canonicalize_or_current(root: &str) -> Result<PathBuf> {
    let path = Path::new(root);
    if path == Path::new(".") {
        Ok(env::current_dir().context("Failed to get current directory")?)
    } else {
        // The path may not exist yet (e.g. `init`), so fall back to joining with the cwd.
        match path.canonicalize() {
            Ok(p) => Ok(p),
            Err(_) => {
                let cwd = env::current_dir().context("Failed to get current directory")?;
                Ok(cwd.join(path))
            }
        }
    }
}

/// Bad command-line input that clap cannot catch (malformed `k=v`, unknown names).
#[derive(Debug)]
pub struct UsageError(pub String);

impl fmt::Display for UsageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for UsageError {}

/// Process exit code for a failed command: 1 for usage errors, 2 otherwise.
pub fn exit_code_for(err: &anyhow::Error) -> u8 {
    let usage = err.chain().any(|cause| {
        cause.downcast_ref::<UsageError>().is_some()
            || cause.downcast_ref::<EngineError>().is_some_and(EngineError::is_usage)
    });
    if usage {
        1
    } else {
        2
    }
}

/// Parse `key=value` pairs; values are JSON literals when they parse, strings otherwise.
pub fn parse_key_values(pairs: &[String]) -> Result<OptionBag> {
    let mut bag = OptionBag::new();
    for pair in pairs {
        let (key, value) = pair
            .split_once('=')
            .filter(|(k, _)| !k.trim().is_empty())
            .ok_or_else(|| UsageError(format!("Expected key=value, got '{pair}'")))?;
        bag.insert(key.trim().to_string(), Value::parse_cli(value));
    }
    Ok(bag)
}

/// Resolve command-line OID arguments: hex OIDs pass through, anything else
/// is looked up as a collection name.
pub fn resolve_oids(engine: &Engine, args: &[String]) -> Result<Vec<Oid>> {
    args.iter().map(|arg| resolve_oid(engine, arg)).collect()
}

pub fn resolve_oid(engine: &Engine, arg: &str) -> Result<Oid> {
    if let Some(oid) = Oid::parse(arg) {
        return Ok(oid);
    }
    engine
        .collection_oid(arg)
        .with_context(|| format!("Failed to look up collection '{arg}'"))?
        .ok_or_else(|| UsageError(format!("'{arg}' is neither an OID nor a collection name")).into())
}

/// Parse an address given as `0x...` hex or decimal.
pub fn parse_address(raw: &str) -> Result<u64> {
    let parsed = match raw.strip_prefix("0x").or_else(|| raw.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => raw.parse(),
    };
    parsed.map_err(|_| UsageError(format!("Invalid address '{raw}'")).into())
}
