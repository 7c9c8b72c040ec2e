//! Map/reduce job execution.

use std::time::Instant;

use rayon::prelude::*;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::Engine;
use crate::codec;
use crate::error::{EngineError, EngineResult};
use crate::model::Artifact;
use crate::oid::Oid;
use crate::options::{self, OptionBag, ResolvedOptions};
use crate::registry::{ModuleKind, RegisteredModule};
use crate::store::StoreKey;

/// Store namespace holding per-OID mapper outputs of `module`.
pub fn map_namespace(module: &str) -> String {
    format!("{module}.map")
}

/// Identifier of a job over `expanded` file OIDs: the OID of the canonical
/// encoding of the sorted list. Module and mangling options are part of the
/// store key, so they are not hashed here.
pub fn job_id_for(expanded: &[Oid]) -> EngineResult<Oid> {
    let mut sorted = expanded.to_vec();
    sorted.sort();
    sorted.dedup();
    Ok(Oid::from_bytes(&codec::encode(&sorted)?))
}

impl Engine {
    /// Run a map/reduce module over `oids`, returning the job id and the aggregate.
    pub fn run_job(
        &self,
        module: &str,
        oids: &[Oid],
        opts: &OptionBag,
        force: bool,
        token: &CancellationToken,
    ) -> EngineResult<(Oid, Option<Artifact>)> {
        let registered = self.registry().get(module)?;
        if registered.doc.kind != ModuleKind::MapReduce {
            return Err(EngineError::module(module, "not a map/reduce module"));
        }
        let resolved = options::resolve(module, &registered.doc.opts, opts)?;
        self.job(registered, module, oids, &resolved, force, token)
    }

    pub(super) fn job(
        &self,
        registered: &RegisteredModule,
        module: &str,
        oids: &[Oid],
        opts: &ResolvedOptions,
        force: bool,
        token: &CancellationToken,
    ) -> EngineResult<(Oid, Option<Artifact>)> {
        let (valid, _) = self.valid_oids(oids)?;
        if valid.is_empty() {
            return Err(EngineError::BadOidList { supplied: oids.len() });
        }
        let expanded = self.expand_oids(&valid)?;
        let job_id = job_id_for(&expanded)?;
        let key = StoreKey::new(module, job_id.clone(), opts.suffix());

        let artifact = self.memoized(&key, force, || {
            let started = Instant::now();
            info!(module, job_id = %job_id, inputs = expanded.len(), "job started");

            let outputs = match self.workers() {
                Some(_) => self.map_remote(module, &expanded, opts, &job_id, force, token)?,
                None => self.map_local(registered, module, &expanded, opts, &job_id, force, token)?,
            };
            if token.is_cancelled() {
                info!(module, job_id = %job_id, "job canceled");
                return Err(EngineError::Canceled { job_id: job_id.to_string() });
            }

            let aggregate = registered.module.reducer(self, outputs, opts, &job_id)?;
            info!(
                module,
                job_id = %job_id,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "job finished"
            );
            Ok(aggregate)
        })?;
        Ok((job_id, artifact))
    }

    /// Memoized mapper output for one OID.
    pub(crate) fn map_one(
        &self,
        registered: &RegisteredModule,
        module: &str,
        oid: &Oid,
        opts: &ResolvedOptions,
        job_id: &Oid,
        force: bool,
    ) -> EngineResult<Option<Artifact>> {
        let key = StoreKey::new(map_namespace(module), oid.clone(), opts.suffix());
        self.memoized(&key, force, || registered.module.mapper(self, oid, opts, job_id))
    }

    /// Worker side of a distributed job: run mappers for one partition and
    /// hand the outputs back.
    pub fn map_partition(
        &self,
        module: &str,
        oids: &[Oid],
        opts: &OptionBag,
        job_id: &Oid,
        force: bool,
    ) -> EngineResult<Vec<(Oid, Option<Artifact>)>> {
        let registered = self.registry().get(module)?;
        if registered.doc.kind != ModuleKind::MapReduce {
            return Err(EngineError::module(module, "not a map/reduce module"));
        }
        let resolved = options::resolve(module, &registered.doc.opts, opts)?;
        self.inner.pool.install(|| {
            oids.par_iter()
                .map(|oid| {
                    let output = self.map_one(registered, module, oid, &resolved, job_id, force)?;
                    Ok((oid.clone(), output))
                })
                .collect()
        })
    }

    #[allow(clippy::too_many_arguments)]
    fn map_local(
        &self,
        registered: &RegisteredModule,
        module: &str,
        expanded: &[Oid],
        opts: &ResolvedOptions,
        job_id: &Oid,
        force: bool,
        token: &CancellationToken,
    ) -> EngineResult<Vec<Artifact>> {
        let results: Vec<Option<Artifact>> = self.inner.pool.install(|| {
            expanded
                .par_iter()
                .map(|oid| {
                    if token.is_cancelled() {
                        return Ok(None);
                    }
                    let output = self.map_one(registered, module, oid, opts, job_id, force)?;
                    if token.is_cancelled() {
                        debug!(module, oid = %oid, "discarding mapper output after cancel");
                        return Ok(None);
                    }
                    Ok(output)
                })
                .collect::<EngineResult<_>>()
        })?;
        Ok(results.into_iter().flatten().collect())
    }

    /// Fan mappers out to the worker pool, then record their outputs locally
    /// one at a time.
    fn map_remote(
        &self,
        module: &str,
        expanded: &[Oid],
        opts: &ResolvedOptions,
        job_id: &Oid,
        force: bool,
        token: &CancellationToken,
    ) -> EngineResult<Vec<Artifact>> {
        let Some(workers) = self.workers() else {
            return Ok(Vec::new());
        };
        let namespace = map_namespace(module);

        let mut outputs = Vec::new();
        let mut pending = Vec::new();
        for oid in expanded {
            let key = StoreKey::new(namespace.clone(), oid.clone(), opts.suffix());
            match (!force).then(|| self.store_backend().retrieve(&key)).transpose()?.flatten() {
                Some(artifact) => outputs.push(artifact),
                None => pending.push(oid.clone()),
            }
        }
        if pending.is_empty() || token.is_cancelled() {
            return Ok(outputs);
        }

        let returned = workers.map_partitions(self, module, &pending, &opts.to_bag(), job_id, force)?;
        if token.is_cancelled() {
            return Ok(outputs);
        }
        for (oid, artifact) in returned {
            if let Some(artifact) = artifact {
                let key = StoreKey::new(namespace.clone(), oid, opts.suffix());
                self.store_backend().store(&key, &artifact)?;
                outputs.push(artifact);
            }
        }
        Ok(outputs)
    }
}
