//! Source modules. They never compute anything; objects enter the store
//! through `Engine::import_file` and `Engine::create_collection`.

use crate::engine::Engine;
use crate::error::EngineResult;
use crate::model::Artifact;
use crate::oid::Oid;
use crate::options::ResolvedOptions;
use crate::registry::{Documentation, Module};

/// Imported file bytes.
pub struct FilesSource;

impl Module for FilesSource {
    fn name(&self) -> &'static str {
        "files"
    }

    fn documentation(&self) -> Documentation {
        Documentation::atomic("Raw bytes of imported files").source(Some("file_meta"))
    }

    fn process(&self, _api: &Engine, _oid: &Oid, _opts: &ResolvedOptions) -> EngineResult<Option<Artifact>> {
        Ok(None)
    }
}

/// Member sets of collections.
pub struct CollectionsSource;

impl Module for CollectionsSource {
    fn name(&self) -> &'static str {
        "collections"
    }

    fn documentation(&self) -> Documentation {
        Documentation::atomic("Member sets of collections").source(None)
    }

    fn process(&self, _api: &Engine, _oid: &Oid, _opts: &ResolvedOptions) -> EngineResult<Option<Artifact>> {
        Ok(None)
    }
}
