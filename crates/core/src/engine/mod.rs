//! The execution engine.
//!
//! [`Engine`] is a cheap, cloneable handle. Modules receive it and request the
//! artifacts they depend on through it, so dependency resolution is plain
//! recursion. Every request goes through the same path:
//!
//! 1. resolve options against the module's schema (cache key = module, OID, suffix)
//! 2. return the stored artifact if present (unless forced)
//! 3. detect cycles on the calling thread's stack
//! 4. coalesce concurrent requests for the same key
//! 5. invoke the module and store what it returns
//!
//! A module that cannot handle an input (`Ok(None)` or `NotApplicable`)
//! leaves nothing in the store.

mod inflight;
mod jobs;
mod objects;
mod stack;

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::Mutex;
use rayon::prelude::*;
use rayon::ThreadPool;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

pub use jobs::{job_id_for, map_namespace};
pub use objects::{COLLECTIONS, FILES, IMPORT_TIME_TAG, TAG_ANY};

use crate::catalog::CatalogDb;
use crate::config::{EngineConfig, StoreLayout};
use crate::decoder::{default_decoder, Decoder};
use crate::distrib::WorkerPool;
use crate::error::{EngineError, EngineResult};
use crate::model::Artifact;
use crate::modules::default_module_registry;
use crate::oid::Oid;
use crate::options::{self, OptionBag, ResolvedOptions};
use crate::reference::{self, ReferenceTable};
use crate::registry::{DocSummary, ModuleKind, ModuleRegistry, RegisteredModule};
use crate::store::{ArtifactStore, FsStore, LocalStore, StoreKey};

use inflight::InflightTable;

struct EngineInner {
    registry: ModuleRegistry,
    store: Arc<dyn ArtifactStore>,
    local: LocalStore,
    catalog: Mutex<CatalogDb>,
    config: EngineConfig,
    decoder: Option<Arc<dyn Decoder>>,
    inflight: InflightTable,
    pool: ThreadPool,
    workers: Option<WorkerPool>,
}

/// Handle to an analysis engine. Clones share all state.
#[derive(Clone)]
pub struct Engine {
    inner: Arc<EngineInner>,
}

/// Everything needed to build an engine, for callers that bring their own parts.
pub struct EngineParts {
    pub registry: ModuleRegistry,
    pub store: Arc<dyn ArtifactStore>,
    pub local: LocalStore,
    pub catalog: CatalogDb,
    pub config: EngineConfig,
    pub decoder: Option<Arc<dyn Decoder>>,
}

impl Engine {
    /// Open the store at `layout` with the built-in modules.
    pub fn open(layout: &StoreLayout, config: EngineConfig) -> EngineResult<Self> {
        Self::open_with(layout, config, default_module_registry()?)
    }

    /// Open the store at `layout` with a caller-supplied registry.
    pub fn open_with(
        layout: &StoreLayout,
        config: EngineConfig,
        registry: ModuleRegistry,
    ) -> EngineResult<Self> {
        std::fs::create_dir_all(&layout.meta_dir)
            .map_err(|e| EngineError::io(layout.meta_dir.display(), e))?;
        let store = FsStore::open(config.datastore_dir(layout))?;
        let local = LocalStore::open(config.localstore_dir(layout))?;
        let catalog = CatalogDb::open(&layout.catalog_path)?;
        Self::from_parts(EngineParts {
            registry,
            store: Arc::new(store),
            local,
            catalog,
            config,
            decoder: default_decoder(),
        })
    }

    pub fn from_parts(parts: EngineParts) -> EngineResult<Self> {
        let threads = match parts.config.max_parallelism {
            0 => std::thread::available_parallelism().map(|n| n.get()).unwrap_or(4),
            n => n,
        };
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("oxide-worker-{i}"))
            .build()
            .map_err(|e| EngineError::Config(format!("thread pool: {e}")))?;
        let endpoints = parts.config.worker_endpoints();
        let workers = if endpoints.is_empty() {
            None
        } else {
            Some(WorkerPool::new(
                endpoints.to_vec(),
                std::time::Duration::from_secs(parts.config.worker_timeout_secs),
                std::time::Duration::from_secs(parts.config.worker_cooldown_secs),
                parts.config.rpc_max_frame_bytes,
            )?)
        };

        Ok(Self {
            inner: Arc::new(EngineInner {
                registry: parts.registry,
                store: parts.store,
                local: parts.local,
                catalog: Mutex::new(parts.catalog),
                config: parts.config,
                decoder: parts.decoder,
                inflight: InflightTable::default(),
                pool,
                workers,
            }),
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    pub fn registry(&self) -> &ModuleRegistry {
        &self.inner.registry
    }

    pub fn decoder(&self) -> Option<&Arc<dyn Decoder>> {
        self.inner.decoder.as_ref()
    }

    pub fn workers(&self) -> Option<&WorkerPool> {
        self.inner.workers.as_ref()
    }

    pub(crate) fn store_backend(&self) -> &dyn ArtifactStore {
        self.inner.store.as_ref()
    }

    pub(crate) fn catalog(&self) -> parking_lot::MutexGuard<'_, CatalogDb> {
        self.inner.catalog.lock()
    }

    pub fn documentation(&self, module: &str) -> EngineResult<DocSummary> {
        Ok(self.inner.registry.documentation(module)?.summary(module))
    }

    /// Public module names, or all of them with `include_private`.
    pub fn list_modules(&self, include_private: bool) -> Vec<String> {
        self.inner.registry.names(include_private)
    }

    pub fn load_reference(&self, name: &str) -> EngineResult<ReferenceTable> {
        reference::load_reference(name)
    }

    /// Resolve `opts` against `module`'s schema.
    pub fn resolve_options(&self, module: &str, opts: &OptionBag) -> EngineResult<ResolvedOptions> {
        let doc = self.inner.registry.documentation(module)?;
        options::resolve(module, &doc.opts, opts)
    }

    /// Mangling options encoded in a stored suffix.
    pub fn parse_suffix(&self, module: &str, suffix: &str) -> EngineResult<OptionBag> {
        let doc = self.inner.registry.documentation(module)?;
        options::parse_suffix(module, &doc.opts, suffix)
    }

    fn key_for(&self, module: &str, oid: &Oid, opts: &ResolvedOptions) -> StoreKey {
        StoreKey::new(module, oid.clone(), opts.suffix())
    }

    /// Store check only; never invokes the module.
    pub fn exists(&self, module: &str, oid: &Oid, opts: &OptionBag) -> EngineResult<bool> {
        let resolved = self.resolve_options(module, opts)?;
        self.inner.store.exists(&self.key_for(module, oid, &resolved))
    }

    /// Produce-if-missing, then return the artifact for one OID.
    ///
    /// For set modules the OID is handed over as a one-element list; for
    /// map/reduce modules it names a single-object job.
    pub fn retrieve(&self, module: &str, oid: &Oid, opts: &OptionBag) -> EngineResult<Option<Artifact>> {
        let registered = self.inner.registry.get(module)?;
        let resolved = options::resolve(module, &registered.doc.opts, opts)?;
        match registered.doc.kind {
            ModuleKind::Atomic => self.produce(registered, module, oid, &resolved, false),
            ModuleKind::Set => {
                self.produce_set(registered, module, std::slice::from_ref(oid), &resolved, false)
            }
            ModuleKind::MapReduce => {
                let token = CancellationToken::new();
                self.job(registered, module, std::slice::from_ref(oid), &resolved, false, &token)
                    .map(|(_, artifact)| artifact)
            }
        }
    }

    /// Retrieve for a list. Atomic modules are resolved per expanded OID; set
    /// and map/reduce modules produce one artifact keyed by the list (or job).
    pub fn retrieve_many(
        &self,
        module: &str,
        oids: &[Oid],
        opts: &OptionBag,
    ) -> EngineResult<BTreeMap<Oid, Option<Artifact>>> {
        let registered = self.inner.registry.get(module)?;
        let resolved = options::resolve(module, &registered.doc.opts, opts)?;
        match registered.doc.kind {
            ModuleKind::Atomic => {
                let expanded = self.checked_expansion(oids)?;
                self.for_each_oid(&expanded, |oid| {
                    self.produce(registered, module, oid, &resolved, false)
                })
            }
            ModuleKind::Set => {
                let key_oid = set_key_oid(oids);
                let artifact = self.produce_set(registered, module, oids, &resolved, false)?;
                Ok(BTreeMap::from([(key_oid, artifact)]))
            }
            ModuleKind::MapReduce => {
                let token = CancellationToken::new();
                let (job_id, artifact) =
                    self.job(registered, module, oids, &resolved, false, &token)?;
                Ok(BTreeMap::from([(job_id, artifact)]))
            }
        }
    }

    /// Produce artifacts for every OID (collections expanded unless the module
    /// is a set module) and report which ones now have an artifact.
    pub fn process(
        &self,
        module: &str,
        oids: &[Oid],
        opts: &OptionBag,
        force: bool,
    ) -> EngineResult<BTreeMap<Oid, bool>> {
        let registered = self.inner.registry.get(module)?;
        let resolved = options::resolve(module, &registered.doc.opts, opts)?;
        let results = match registered.doc.kind {
            ModuleKind::Atomic => {
                let expanded = self.checked_expansion(oids)?;
                self.for_each_oid(&expanded, |oid| {
                    self.produce(registered, module, oid, &resolved, force)
                })?
            }
            ModuleKind::Set => {
                let key_oid = set_key_oid(oids);
                let artifact = self.produce_set(registered, module, oids, &resolved, force)?;
                BTreeMap::from([(key_oid, artifact)])
            }
            ModuleKind::MapReduce => {
                let token = CancellationToken::new();
                let (job_id, artifact) =
                    self.job(registered, module, oids, &resolved, force, &token)?;
                BTreeMap::from([(job_id, artifact)])
            }
        };
        Ok(results.into_iter().map(|(oid, artifact)| (oid, artifact.is_some())).collect())
    }

    /// Write an artifact directly (used by source modules and workers).
    pub fn store(&self, module: &str, oid: &Oid, artifact: &Artifact, opts: &OptionBag) -> EngineResult<()> {
        let resolved = self.resolve_options(module, opts)?;
        self.inner.store.store(&self.key_for(module, oid, &resolved), artifact)
    }

    /// Delete every artifact of `module`, or only those of `oid`.
    pub fn delete(&self, module: &str, oid: Option<&Oid>) -> EngineResult<usize> {
        self.inner.registry.get(module)?;
        self.inner.store.delete(module, oid)
    }

    pub fn retrieve_all_keys(&self, module: &str) -> EngineResult<Vec<Oid>> {
        self.inner.store.retrieve_all_keys(module)
    }

    /// Member at a dotted path of the artifact rendered as JSON.
    pub fn get_field(
        &self,
        module: &str,
        oid: &Oid,
        field: &str,
        opts: &OptionBag,
    ) -> EngineResult<Option<serde_json::Value>> {
        Ok(self.retrieve(module, oid, opts)?.and_then(|artifact| artifact.field(field)))
    }

    /// Run `f` for each OID on the engine's pool, keeping input order in the map.
    fn for_each_oid<F>(&self, oids: &[Oid], f: F) -> EngineResult<BTreeMap<Oid, Option<Artifact>>>
    where
        F: Fn(&Oid) -> EngineResult<Option<Artifact>> + Sync,
    {
        if oids.len() <= 1 {
            return oids.iter().map(|oid| Ok((oid.clone(), f(oid)?))).collect();
        }
        self.inner
            .pool
            .install(|| oids.par_iter().map(|oid| Ok((oid.clone(), f(oid)?))).collect())
    }

    fn checked_expansion(&self, oids: &[Oid]) -> EngineResult<Vec<Oid>> {
        let (valid, _) = self.valid_oids(oids)?;
        if valid.is_empty() {
            return Err(EngineError::BadOidList { supplied: oids.len() });
        }
        self.expand_oids(&valid)
    }

    /// Memoized invocation of an atomic module.
    fn produce(
        &self,
        registered: &RegisteredModule,
        module: &str,
        oid: &Oid,
        opts: &ResolvedOptions,
        force: bool,
    ) -> EngineResult<Option<Artifact>> {
        let key = self.key_for(module, oid, opts);
        self.memoized(&key, force, || registered.module.process(self, oid, opts))
    }

    fn produce_set(
        &self,
        registered: &RegisteredModule,
        module: &str,
        oids: &[Oid],
        opts: &ResolvedOptions,
        force: bool,
    ) -> EngineResult<Option<Artifact>> {
        let (valid, _) = self.valid_oids(oids)?;
        if valid.is_empty() {
            return Err(EngineError::BadOidList { supplied: oids.len() });
        }
        let key = self.key_for(module, &set_key_oid(oids), opts);
        self.memoized(&key, force, || registered.module.results(self, oids, opts))
    }

    /// Store check, cycle check, coalescing, then `compute` and store its output.
    pub(crate) fn memoized(
        &self,
        key: &StoreKey,
        force: bool,
        compute: impl FnOnce() -> EngineResult<Option<Artifact>>,
    ) -> EngineResult<Option<Artifact>> {
        if !force {
            if let Some(artifact) = self.inner.store.retrieve(key)? {
                debug!(key = %key, "cache hit");
                return Ok(Some(artifact));
            }
        }

        let _frame = stack::enter(key)?;
        self.inner.inflight.run(key, || {
            if !force {
                if let Some(artifact) = self.inner.store.retrieve(key)? {
                    return Ok(Some(artifact));
                }
            }
            debug!(key = %key, force, "computing artifact");
            match compute() {
                Ok(Some(artifact)) => {
                    self.inner.store.store(key, &artifact)?;
                    Ok(Some(artifact))
                }
                Ok(None) => {
                    debug!(key = %key, "module produced nothing");
                    Ok(None)
                }
                Err(EngineError::NotApplicable { module, oid }) => {
                    warn!(module = %module, oid = %oid, "not applicable");
                    Ok(None)
                }
                Err(e) => Err(e),
            }
        })
    }

    // Scratch store.

    pub fn local_store(&self, module: &str, name: &str, data: &[u8]) -> EngineResult<()> {
        self.inner.local.put(module, name, data)
    }

    pub fn local_retrieve(&self, module: &str, name: &str) -> EngineResult<Option<Vec<u8>>> {
        self.inner.local.retrieve(module, name)
    }

    pub fn local_exists(&self, module: &str, name: &str) -> bool {
        self.inner.local.exists(module, name)
    }

    pub fn local_available(&self, module: &str) -> EngineResult<Vec<String>> {
        self.inner.local.available(module)
    }

    pub fn local_delete(&self, module: &str, name: &str) -> EngineResult<bool> {
        self.inner.local.delete(module, name)
    }

    pub fn local_store_value<T: serde::Serialize>(&self, module: &str, name: &str, value: &T) -> EngineResult<()> {
        self.inner.local.put_value(module, name, value)
    }

    pub fn local_retrieve_value<T: serde::de::DeserializeOwned>(
        &self,
        module: &str,
        name: &str,
    ) -> EngineResult<Option<T>> {
        self.inner.local.retrieve_value(module, name)
    }
}

/// Store key OID of a set-module invocation: the OID itself for a single
/// input, the collection OID of the list otherwise.
pub fn set_key_oid(oids: &[Oid]) -> Oid {
    match oids {
        [single] => single.clone(),
        many => Oid::for_collection(many),
    }
}
