//! Object-level operations: sources, expansion, tags, imports and collections.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fs;
use std::path::Path;

use chrono::{SecondsFormat, Utc};
use tracing::{debug, info};

use super::Engine;
use crate::catalog::ImportRecord;
use crate::error::{EngineError, EngineResult};
use crate::model::Artifact;
use crate::oid::Oid;
use crate::options::OptionBag;
use crate::store::StoreKey;
use crate::value::Value;

/// Source module for imported file bytes.
pub const FILES: &str = "files";
/// Source module for collection member sets.
pub const COLLECTIONS: &str = "collections";
/// Tag recorded on every import.
pub const IMPORT_TIME_TAG: &str = "import_time";
/// `tag_filter` value matching any value of the tag.
pub const TAG_ANY: &str = "<empty>";

impl Engine {
    /// Name of the source module that produced `oid`, if any.
    pub fn source(&self, oid: &Oid) -> EngineResult<Option<&'static str>> {
        for source in [FILES, COLLECTIONS] {
            if self.store_backend().exists(&StoreKey::new(source, oid.clone(), ""))? {
                return Ok(Some(source));
            }
        }
        Ok(None)
    }

    /// Split `oids` into those known to a source and the rest.
    pub fn valid_oids(&self, oids: &[Oid]) -> EngineResult<(Vec<Oid>, Vec<Oid>)> {
        let mut valid = Vec::new();
        let mut invalid = Vec::new();
        for oid in oids {
            if self.source(oid)?.is_some() {
                valid.push(oid.clone());
            } else {
                invalid.push(oid.clone());
            }
        }
        Ok((valid, invalid))
    }

    /// Replace collection OIDs by their members, recursively, keeping first
    /// occurrences in caller order. Unknown OIDs pass through unchanged.
    pub fn expand_oids(&self, oids: &[Oid]) -> EngineResult<Vec<Oid>> {
        let mut out = Vec::new();
        let mut emitted = HashSet::new();
        let mut visited = HashSet::new();
        for oid in oids {
            self.expand_into(oid, &mut out, &mut emitted, &mut visited)?;
        }
        Ok(out)
    }

    fn expand_into(
        &self,
        oid: &Oid,
        out: &mut Vec<Oid>,
        emitted: &mut HashSet<Oid>,
        visited: &mut HashSet<Oid>,
    ) -> EngineResult<()> {
        match self.collection_members(oid)? {
            Some(members) => {
                if !visited.insert(oid.clone()) {
                    return Ok(());
                }
                for member in &members {
                    self.expand_into(member, out, emitted, visited)?;
                }
            }
            None => {
                if emitted.insert(oid.clone()) {
                    out.push(oid.clone());
                }
            }
        }
        Ok(())
    }

    /// Members of a collection, or `None` when `oid` is not one.
    pub fn collection_members(&self, oid: &Oid) -> EngineResult<Option<BTreeSet<Oid>>> {
        let key = StoreKey::new(COLLECTIONS, oid.clone(), "");
        match self.store_backend().retrieve(&key)? {
            Some(Artifact::Collection(members)) => Ok(Some(members)),
            Some(other) => Err(EngineError::Codec(format!(
                "collection {oid} holds a {} artifact",
                other.kind()
            ))),
            None => Ok(None),
        }
    }

    pub fn get_tags(&self, oid: &Oid) -> EngineResult<BTreeMap<String, Value>> {
        Ok(self.catalog().get_tags(oid)?)
    }

    /// Merge `tags` into the tag map of every OID in `oids`.
    pub fn apply_tags(&self, oids: &[Oid], tags: &BTreeMap<String, Value>) -> EngineResult<()> {
        let catalog = self.catalog();
        for oid in oids {
            catalog.apply_tags(oid, tags)?;
        }
        Ok(())
    }

    /// OIDs whose tag `tag` equals `value` (any value for [`TAG_ANY`]).
    /// Without a list, every known file and collection is considered.
    pub fn tag_filter(&self, oids: Option<&[Oid]>, tag: &str, value: &Value) -> EngineResult<Vec<Oid>> {
        let any = value.as_str() == Some(TAG_ANY);
        let matching: BTreeSet<Oid> = self
            .catalog()
            .tagged(tag)?
            .into_iter()
            .filter(|(_, v)| any || v == value)
            .map(|(oid, _)| oid)
            .collect();

        match oids {
            Some(oids) => {
                let mut seen = HashSet::new();
                Ok(oids
                    .iter()
                    .filter(|oid| matching.contains(*oid) && seen.insert((*oid).clone()))
                    .cloned()
                    .collect())
            }
            None => {
                let mut out = Vec::new();
                for oid in matching {
                    if self.source(&oid)?.is_some() {
                        out.push(oid);
                    }
                }
                Ok(out)
            }
        }
    }

    /// Import history of `oid`, oldest first.
    pub fn imports_for(&self, oid: &Oid) -> EngineResult<Vec<ImportRecord>> {
        Ok(self.catalog().imports_for(oid)?)
    }

    /// Bring a file into the store and refresh its metadata.
    pub fn import_file(&self, path: &Path) -> EngineResult<Oid> {
        let data = fs::read(path).map_err(|e| EngineError::io(path.display(), e))?;
        let metadata = fs::metadata(path).map_err(|e| EngineError::io(path.display(), e))?;
        let oid = Oid::from_bytes(&data);

        let key = StoreKey::new(FILES, oid.clone(), "");
        if !self.store_backend().exists(&key)? {
            self.store_backend().store(&key, &Artifact::Bytes(data.clone()))?;
            info!(oid = %oid, path = %path.display(), size = data.len(), "imported new file");
        } else {
            debug!(oid = %oid, path = %path.display(), "file already present");
        }

        let imported_at = Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true);
        let mtime = metadata
            .modified()
            .ok()
            .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
            .map(|d| d.as_secs() as i64);
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        let record = ImportRecord {
            oid: oid.clone(),
            name,
            path: path.display().to_string(),
            size: data.len() as u64,
            mtime,
            imported_at: imported_at.clone(),
        };
        {
            let catalog = self.catalog();
            catalog.record_import(&record)?;
            catalog.apply_tags(
                &oid,
                &BTreeMap::from([(IMPORT_TIME_TAG.to_string(), Value::Str(imported_at))]),
            )?;
        }

        let meta = self.registry().documentation(FILES).ok().and_then(|doc| doc.meta.clone());
        if let Some(meta) = meta {
            self.process(&meta, std::slice::from_ref(&oid), &OptionBag::new(), true)?;
        }
        Ok(oid)
    }

    /// Import every regular file under `dir`, in name order.
    pub fn import_directory(&self, dir: &Path, recursive: bool) -> EngineResult<Vec<Oid>> {
        let mut entries: Vec<_> = fs::read_dir(dir)
            .map_err(|e| EngineError::io(dir.display(), e))?
            .filter_map(Result::ok)
            .map(|entry| entry.path())
            .collect();
        entries.sort();

        let mut oids = Vec::new();
        for path in entries {
            if path.is_file() {
                oids.push(self.import_file(&path)?);
            } else if recursive && path.is_dir() {
                oids.extend(self.import_directory(&path, true)?);
            }
        }
        Ok(oids)
    }

    /// Store a collection over `oids` (collections are expanded to their
    /// files) and optionally bind `name` to it. An empty list is allowed.
    pub fn create_collection(&self, name: Option<&str>, oids: &[Oid]) -> EngineResult<Oid> {
        let (valid, _) = self.valid_oids(oids)?;
        if !oids.is_empty() && valid.is_empty() {
            return Err(EngineError::BadOidList { supplied: oids.len() });
        }
        let members: BTreeSet<Oid> = self.expand_oids(&valid)?.into_iter().collect();
        let oid = Oid::for_collection(&members);

        let key = StoreKey::new(COLLECTIONS, oid.clone(), "");
        if !self.store_backend().exists(&key)? {
            self.store_backend().store(&key, &Artifact::Collection(members.clone()))?;
        }
        if let Some(name) = name {
            self.catalog().set_collection_name(name, &oid)?;
        }
        info!(oid = %oid, members = members.len(), name = name.unwrap_or(""), "collection created");
        Ok(oid)
    }

    /// Named collections, sorted by name.
    pub fn collection_names(&self) -> EngineResult<Vec<(String, Oid)>> {
        Ok(self.catalog().collection_names()?)
    }

    pub fn collection_oid(&self, name: &str) -> EngineResult<Option<Oid>> {
        Ok(self.catalog().collection_oid(name)?)
    }

    /// Remove a name binding. The member set stays, since other names or
    /// artifacts may still refer to its OID.
    pub fn delete_collection(&self, name: &str) -> EngineResult<bool> {
        Ok(self.catalog().delete_collection_name(name)?)
    }
}
