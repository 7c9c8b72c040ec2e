use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::value::Value;

/// Filesystem facts captured for one name at import time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatRecord {
    pub path: String,
    pub size: u64,
    /// Modification time in seconds since the epoch, when the platform reports one.
    pub mtime: Option<i64>,
}

/// Everything known about how a file entered the store.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FileMeta {
    pub size: u64,
    /// Import timestamp (RFC 3339) -> original name -> stat record.
    pub snapshots: BTreeMap<String, BTreeMap<String, StatRecord>>,
    /// Every basename the file has been imported under.
    pub names: BTreeSet<String>,
    pub tags: BTreeMap<String, Value>,
}
