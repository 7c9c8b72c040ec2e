use std::collections::BTreeMap;

use crate::engine::Engine;
use crate::error::EngineResult;
use crate::model::{Artifact, FileMeta, SourceType, StatRecord};
use crate::oid::Oid;
use crate::options::ResolvedOptions;
use crate::registry::{Documentation, Module};

use super::file_bytes;

/// Sidecar of the `files` source: sizes, import snapshots, names and tags.
pub struct FileMetaModule;

impl Module for FileMetaModule {
    fn name(&self) -> &'static str {
        "file_meta"
    }

    fn documentation(&self) -> Documentation {
        Documentation::atomic("Size, import snapshots, observed names and tags of a file")
    }

    fn process(&self, api: &Engine, oid: &Oid, _opts: &ResolvedOptions) -> EngineResult<Option<Artifact>> {
        let Some(bytes) = file_bytes(api, oid)? else {
            return Ok(None);
        };

        let mut meta = FileMeta { size: bytes.len() as u64, ..FileMeta::default() };
        for record in api.imports_for(oid)? {
            meta.names.insert(record.name.clone());
            meta.snapshots.entry(record.imported_at).or_insert_with(BTreeMap::new).insert(
                record.name,
                StatRecord { path: record.path, size: record.size, mtime: record.mtime },
            );
        }
        meta.tags = api.get_tags(oid)?;
        Ok(Some(Artifact::FileMeta(meta)))
    }
}

/// Source-type tag from the file's magic bytes.
pub struct SrcTypeModule;

impl Module for SrcTypeModule {
    fn name(&self) -> &'static str {
        "src_type"
    }

    fn documentation(&self) -> Documentation {
        Documentation::atomic("Source-type tag recognised from the file's magic (PE, ELF, ...)")
    }

    fn process(&self, api: &Engine, oid: &Oid, _opts: &ResolvedOptions) -> EngineResult<Option<Artifact>> {
        let Some(bytes) = file_bytes(api, oid)? else {
            return Ok(None);
        };
        let name = api.imports_for(oid)?.into_iter().next().map(|r| r.name);
        let kind = SourceType::detect(&bytes, name.as_deref());
        Ok(Some(Artifact::Text(kind.as_str().to_string())))
    }
}
