//! Coordinator-side view of the worker fleet.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::join_all;
use parking_lot::Mutex;
use tokio::runtime::Runtime;
use tracing::{info, warn};

use super::client::WorkerClient;
use super::protocol::{RpcMethod, RpcReply};
use crate::engine::Engine;
use crate::error::{EngineError, EngineResult};
use crate::model::Artifact;
use crate::oid::Oid;
use crate::options::OptionBag;
use crate::store::StoreKey;

type MapOutputs = Vec<(Oid, Option<Artifact>)>;

struct PoolState {
    endpoints: Vec<String>,
    timeout: Duration,
    cooldown: Duration,
    max_frame_length: usize,
    failed_at: Mutex<HashMap<String, Instant>>,
}

impl PoolState {
    fn client(&self, endpoint: &str) -> WorkerClient {
        WorkerClient::new(endpoint, self.timeout).with_max_frame_length(self.max_frame_length)
    }

    fn healthy(&self) -> Vec<String> {
        let now = Instant::now();
        let mut failed = self.failed_at.lock();
        failed.retain(|_, at| now.duration_since(*at) < self.cooldown);
        self.endpoints.iter().filter(|e| !failed.contains_key(*e)).cloned().collect()
    }

    fn mark_failed(&self, endpoint: &str) {
        self.failed_at.lock().insert(endpoint.to_string(), Instant::now());
    }
}

/// Worker endpoints plus a healthy set. Endpoints that fail stay out of the
/// set for the configured cooldown.
pub struct WorkerPool {
    state: Arc<PoolState>,
    runtime: Runtime,
}

impl WorkerPool {
    pub fn new(
        endpoints: Vec<String>,
        timeout: Duration,
        cooldown: Duration,
        max_frame_length: usize,
    ) -> EngineResult<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .thread_name("oxide-rpc")
            .enable_all()
            .build()
            .map_err(|e| EngineError::Config(format!("rpc runtime: {e}")))?;
        Ok(Self {
            state: Arc::new(PoolState {
                endpoints,
                timeout,
                cooldown,
                max_frame_length,
                failed_at: Mutex::new(HashMap::new()),
            }),
            runtime,
        })
    }

    pub fn endpoints(&self) -> &[String] {
        &self.state.endpoints
    }

    /// Endpoints not currently cooling down after a failure.
    pub fn healthy(&self) -> Vec<String> {
        self.state.healthy()
    }

    pub fn mark_failed(&self, endpoint: &str) {
        self.state.mark_failed(endpoint);
    }

    /// Ping every endpoint; unreachable ones are marked failed.
    pub fn probe(&self) -> Vec<(String, bool)> {
        let handles: Vec<_> = self
            .state
            .endpoints
            .iter()
            .map(|endpoint| {
                let client = self.state.client(endpoint);
                let state = self.state.clone();
                self.runtime.spawn(async move {
                    let alive = client.alive().await;
                    if !alive {
                        state.mark_failed(client.endpoint());
                    }
                    (client.endpoint().to_string(), alive)
                })
            })
            .collect();
        futures::executor::block_on(join_all(handles))
            .into_iter()
            .filter_map(Result::ok)
            .collect()
    }

    /// Run the mappers of `module` for `oids` on the healthy workers.
    ///
    /// OIDs are partitioned by hash over the healthy set. A partition whose
    /// worker is unreachable is retried once on the next healthy worker.
    /// Input files the worker lacks are shipped before mapping.
    pub fn map_partitions(
        &self,
        engine: &Engine,
        module: &str,
        oids: &[Oid],
        opts: &OptionBag,
        job_id: &Oid,
        force: bool,
    ) -> EngineResult<MapOutputs> {
        let healthy = self.state.healthy();
        if healthy.is_empty() {
            return Err(EngineError::WorkerUnavailable {
                endpoint: "*".to_string(),
                reason: "no healthy workers".to_string(),
            });
        }

        let mut partitions = vec![Vec::new(); healthy.len()];
        for oid in oids {
            partitions[oid.bucket(healthy.len())].push(oid.clone());
        }

        let handles: Vec<_> = partitions
            .into_iter()
            .enumerate()
            .filter(|(_, part)| !part.is_empty())
            .map(|(idx, part)| {
                let mut attempts = vec![healthy[idx].clone()];
                if healthy.len() > 1 {
                    attempts.push(healthy[(idx + 1) % healthy.len()].clone());
                }
                let task = PartitionTask {
                    state: self.state.clone(),
                    engine: engine.clone(),
                    module: module.to_string(),
                    oids: part,
                    opts: opts.clone(),
                    job_id: job_id.clone(),
                    force,
                };
                self.runtime.spawn(task.run(attempts))
            })
            .collect();

        let mut outputs = Vec::with_capacity(oids.len());
        for joined in futures::executor::block_on(join_all(handles)) {
            let part = joined.map_err(|e| EngineError::WorkerUnavailable {
                endpoint: "*".to_string(),
                reason: format!("partition task failed: {e}"),
            })??;
            outputs.extend(part);
        }
        Ok(outputs)
    }
}

struct PartitionTask {
    state: Arc<PoolState>,
    engine: Engine,
    module: String,
    oids: Vec<Oid>,
    opts: OptionBag,
    job_id: Oid,
    force: bool,
}

impl PartitionTask {
    async fn run(self, attempts: Vec<String>) -> EngineResult<MapOutputs> {
        let mut last_error = None;
        for endpoint in attempts {
            let client = self.state.client(&endpoint);
            match self.map_on(&client).await {
                Ok(outputs) => {
                    info!(endpoint = %endpoint, oids = self.oids.len(), "partition mapped");
                    return Ok(outputs);
                }
                Err(e @ EngineError::WorkerUnavailable { .. }) => {
                    warn!(endpoint = %endpoint, error = %e, "worker unavailable");
                    self.state.mark_failed(&endpoint);
                    last_error = Some(e);
                }
                Err(e) => return Err(e),
            }
        }
        Err(last_error.unwrap_or_else(|| EngineError::WorkerUnavailable {
            endpoint: "*".to_string(),
            reason: "no worker attempted".to_string(),
        }))
    }

    async fn map_on(&self, client: &WorkerClient) -> EngineResult<MapOutputs> {
        for oid in &self.oids {
            self.ship_input(client, oid).await?;
        }
        let reply = client
            .call(RpcMethod::DistMap {
                module: self.module.clone(),
                oids: self.oids.clone(),
                opts: self.opts.clone(),
                job_id: self.job_id.clone(),
                force: self.force,
            })
            .await?;
        match reply {
            RpcReply::MapOutputs(outputs) => Ok(outputs),
            other => Err(unexpected(client, &other)),
        }
    }

    async fn ship_input(&self, client: &WorkerClient, oid: &Oid) -> EngineResult<()> {
        let exists = client
            .call(RpcMethod::Exists { module: "files".into(), oid: oid.clone(), opts: OptionBag::new() })
            .await?;
        match exists {
            RpcReply::Exists(true) => return Ok(()),
            RpcReply::Exists(false) => {}
            other => return Err(unexpected(client, &other)),
        }
        let key = StoreKey::new("files", oid.clone(), "");
        let Some(artifact) = self.engine.store_backend().retrieve(&key)? else {
            return Ok(());
        };
        client
            .call(RpcMethod::Store {
                module: "files".into(),
                oid: oid.clone(),
                opts: OptionBag::new(),
                artifact,
            })
            .await?;
        Ok(())
    }
}

fn unexpected(client: &WorkerClient, reply: &RpcReply) -> EngineError {
    EngineError::Remote {
        endpoint: client.endpoint().to_string(),
        message: format!("unexpected reply {reply:?}"),
    }
}
