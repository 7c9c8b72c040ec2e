//! Module registry: the catalogue of analysis modules and their contracts.
//!
//! Every module declares its documentation (description, option schema, kind
//! and flags) once at registration. The registry is immutable after the
//! engine is built, so lookups need no locking.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::engine::Engine;
use crate::error::{EngineError, EngineResult};
use crate::model::Artifact;
use crate::oid::Oid;
use crate::options::{OptionSchema, OptionType, ResolvedOptions};
use crate::value::Value;

/// How a module consumes OIDs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModuleKind {
    /// One artifact per OID through [`Module::process`].
    Atomic,
    /// The whole OID list as one unit through [`Module::results`].
    Set,
    /// Per-OID [`Module::mapper`] plus an associative, commutative [`Module::reducer`].
    MapReduce,
}

/// Descriptor a module declares at registration.
#[derive(Debug, Clone)]
pub struct Documentation {
    pub description: String,
    pub opts: OptionSchema,
    pub kind: ModuleKind,
    /// Hidden from general listings.
    pub private: bool,
    /// Produces an object kind (`files`, `collections`).
    pub source: bool,
    /// Sidecar module run on every new object this source produces.
    pub meta: Option<String>,
}

impl Documentation {
    pub fn new(description: impl Into<String>, kind: ModuleKind) -> Self {
        Self {
            description: description.into(),
            opts: OptionSchema::new(),
            kind,
            private: false,
            source: false,
            meta: None,
        }
    }

    pub fn atomic(description: impl Into<String>) -> Self {
        Self::new(description, ModuleKind::Atomic)
    }

    pub fn with_opts(mut self, opts: OptionSchema) -> Self {
        self.opts = opts;
        self
    }

    pub fn private(mut self) -> Self {
        self.private = true;
        self
    }

    /// Mark as the source of an object kind, with an optional meta module.
    pub fn source(mut self, meta: Option<&str>) -> Self {
        self.source = true;
        self.private = true;
        self.meta = meta.map(str::to_string);
        self
    }

    pub fn summary(&self, name: &str) -> DocSummary {
        DocSummary {
            name: name.to_string(),
            description: self.description.clone(),
            kind: self.kind,
            set: self.kind == ModuleKind::Set,
            atomic: self.kind == ModuleKind::Atomic,
            private: self.private,
            source: self.source,
            meta: self.meta.clone(),
            opts: self
                .opts
                .iter()
                .map(|(name, spec)| OptionDoc {
                    name: name.clone(),
                    ty: spec.ty,
                    default: spec.default.clone(),
                    mangle: spec.mangle,
                    description: spec.description.clone(),
                })
                .collect(),
        }
    }
}

/// Serializable view of one option declaration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptionDoc {
    pub name: String,
    pub ty: OptionType,
    /// `None` when the option is required.
    pub default: Option<Value>,
    pub mangle: bool,
    pub description: String,
}

/// Serializable view of a module's documentation, as served to callers and peers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocSummary {
    pub name: String,
    pub description: String,
    pub kind: ModuleKind,
    pub set: bool,
    pub atomic: bool,
    pub private: bool,
    pub source: bool,
    pub meta: Option<String>,
    pub opts: Vec<OptionDoc>,
}

/// An analysis module.
///
/// Modules request the artifacts they depend on by calling back into the
/// engine. Returning `Ok(None)` (or [`EngineError::NotApplicable`]) means the
/// module cannot produce anything for this input; nothing is stored.
pub trait Module: Send + Sync {
    fn name(&self) -> &'static str;

    fn documentation(&self) -> Documentation;

    fn process(
        &self,
        _api: &Engine,
        _oid: &Oid,
        _opts: &ResolvedOptions,
    ) -> EngineResult<Option<Artifact>> {
        Err(EngineError::module(self.name(), "process is not implemented"))
    }

    fn results(
        &self,
        _api: &Engine,
        _oids: &[Oid],
        _opts: &ResolvedOptions,
    ) -> EngineResult<Option<Artifact>> {
        Err(EngineError::module(self.name(), "results is not implemented"))
    }

    fn mapper(
        &self,
        _api: &Engine,
        _oid: &Oid,
        _opts: &ResolvedOptions,
        _job_id: &Oid,
    ) -> EngineResult<Option<Artifact>> {
        Err(EngineError::module(self.name(), "mapper is not implemented"))
    }

    fn reducer(
        &self,
        _api: &Engine,
        _intermediate: Vec<Artifact>,
        _opts: &ResolvedOptions,
        _job_id: &Oid,
    ) -> EngineResult<Option<Artifact>> {
        Err(EngineError::module(self.name(), "reducer is not implemented"))
    }
}

/// A module together with the documentation it declared at registration.
#[derive(Clone)]
pub struct RegisteredModule {
    pub module: Arc<dyn Module>,
    pub doc: Documentation,
}

/// Registry for analysis modules; callers select by name.
#[derive(Default, Clone)]
pub struct ModuleRegistry {
    modules: BTreeMap<String, RegisteredModule>,
}

impl ModuleRegistry {
    pub fn new() -> Self {
        Self { modules: BTreeMap::new() }
    }

    /// Register `module`; names must be unique.
    pub fn register(&mut self, module: Arc<dyn Module>) -> EngineResult<&mut Self> {
        let name = module.name().to_string();
        if self.modules.contains_key(&name) {
            return Err(EngineError::DuplicateModule(name));
        }
        let doc = module.documentation();
        self.modules.insert(name, RegisteredModule { module, doc });
        Ok(self)
    }

    pub fn get(&self, name: &str) -> EngineResult<&RegisteredModule> {
        self.modules.get(name).ok_or_else(|| EngineError::UnrecognizedModule(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.modules.contains_key(name)
    }

    pub fn documentation(&self, name: &str) -> EngineResult<&Documentation> {
        self.get(name).map(|m| &m.doc)
    }

    /// Sorted module names; private modules only when `include_private`.
    pub fn names(&self, include_private: bool) -> Vec<String> {
        self.modules
            .iter()
            .filter(|(_, m)| include_private || !m.doc.private)
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// Source modules in name order.
    pub fn sources(&self) -> impl Iterator<Item = (&String, &RegisteredModule)> {
        self.modules.iter().filter(|(_, m)| m.doc.source)
    }

    pub fn summaries(&self, include_private: bool) -> Vec<DocSummary> {
        self.modules
            .iter()
            .filter(|(_, m)| include_private || !m.doc.private)
            .map(|(name, m)| m.doc.summary(name))
            .collect()
    }
}
