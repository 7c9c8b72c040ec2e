mod common;

use std::collections::BTreeMap;
use std::thread::JoinHandle;
use std::time::Duration;

use oxide_core::config::{EngineConfig, StoreLayout};
use oxide_core::distrib::{serve_listener, RpcMethod, RpcReply, WorkerClient};
use oxide_core::engine::map_namespace;
use oxide_core::model::Artifact;
use oxide_core::{Engine, EngineError, Oid, OptionBag};
use tempfile::tempdir;
use tokio_util::sync::CancellationToken;

use common::{import_bytes, open_engine, test_config};

struct Worker {
    endpoint: String,
    engine: Engine,
    shutdown: CancellationToken,
    handle: JoinHandle<()>,
}

impl Worker {
    /// Serve `engine` on an ephemeral localhost port from a dedicated runtime.
    fn start(engine: Engine) -> Self {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind worker");
        listener.set_nonblocking(true).expect("nonblocking");
        let endpoint = listener.local_addr().expect("local addr").to_string();
        let shutdown = CancellationToken::new();

        let served = engine.clone();
        let token = shutdown.clone();
        let handle = std::thread::spawn(move || {
            let runtime = tokio::runtime::Builder::new_multi_thread()
                .worker_threads(2)
                .enable_all()
                .build()
                .expect("worker runtime");
            runtime.block_on(async move {
                let listener = tokio::net::TcpListener::from_std(listener).expect("tokio listener");
                serve_listener(served, listener, token).await.expect("serve");
            });
        });
        Self { endpoint, engine, shutdown, handle }
    }

    fn stop(self) {
        self.shutdown.cancel();
        self.handle.join().expect("worker thread");
    }
}

fn coordinator_config(endpoints: &[&str]) -> EngineConfig {
    EngineConfig {
        distributed_enabled: true,
        distributed_compute_nodes: endpoints.iter().map(|e| e.to_string()).collect(),
        worker_timeout_secs: 10,
        ..test_config()
    }
}

fn coordinator_with(root: &std::path::Path, config: EngineConfig) -> Engine {
    Engine::open(&StoreLayout::new(root.join("coordinator")), config).expect("open coordinator")
}

fn coordinator(root: &std::path::Path, endpoint: &str) -> Engine {
    coordinator_with(root, coordinator_config(&[endpoint]))
}

/// An address nothing listens on.
fn dead_endpoint() -> String {
    let probe = std::net::TcpListener::bind("127.0.0.1:0").expect("bind");
    probe.local_addr().expect("local addr").to_string()
}

#[test]
fn map_phase_runs_on_the_worker() {
    let dir = tempdir().expect("tempdir");
    let worker = Worker::start(open_engine(&dir.path().join("worker")));
    let engine = coordinator(dir.path(), &worker.endpoint);

    let probed = engine.workers().expect("worker pool").probe();
    assert_eq!(probed, vec![(worker.endpoint.clone(), true)]);

    let a = import_bytes(&engine, dir.path(), "a.bin", &[0x10, 0x10]);
    let b = import_bytes(&engine, dir.path(), "b.bin", &[0x10, 0x20]);
    let results = engine
        .retrieve_many("byte_histogram", &[a.clone(), b.clone()], &OptionBag::new())
        .expect("distributed histogram");
    let expected: BTreeMap<String, u64> = [("10".to_string(), 3), ("20".to_string(), 1)].into();
    assert_eq!(results.into_values().next(), Some(Some(Artifact::Histogram(expected))));

    // Inputs were shipped and mapped remotely; outputs were recorded on both sides.
    let mut inputs = vec![a, b];
    inputs.sort();
    assert_eq!(worker.engine.retrieve_all_keys("files").expect("worker files"), inputs);
    let namespace = map_namespace("byte_histogram");
    assert_eq!(worker.engine.retrieve_all_keys(&namespace).expect("worker map outputs"), inputs);
    assert_eq!(engine.retrieve_all_keys(&namespace).expect("coordinator map outputs"), inputs);

    drop(engine);
    worker.stop();
}

#[test]
fn client_reaches_worker_and_reports_remote_errors() {
    let dir = tempdir().expect("tempdir");
    let worker_engine = open_engine(&dir.path().join("worker"));
    let oid = import_bytes(&worker_engine, dir.path(), "remote.bin", b"remote bytes");
    let worker = Worker::start(worker_engine);

    let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build().expect("runtime");
    let client = WorkerClient::new(worker.endpoint.clone(), Duration::from_secs(10));
    runtime.block_on(async {
        assert!(client.alive().await);

        let reply = client
            .call(RpcMethod::Retrieve { module: "src_type".into(), oid: oid.clone(), opts: OptionBag::new() })
            .await
            .expect("retrieve");
        assert_eq!(reply, RpcReply::Artifact(Some(Artifact::Text("UNKNOWN".into()))));

        match client.call(RpcMethod::ListModules).await.expect("list") {
            RpcReply::Modules(docs) => assert!(docs.iter().any(|d| d.name == "byte_histogram")),
            other => panic!("unexpected reply: {other:?}"),
        }

        let err = client
            .call(RpcMethod::Exists { module: "nope".into(), oid: oid.clone(), opts: OptionBag::new() })
            .await
            .expect_err("unknown module");
        match err {
            EngineError::Remote { message, .. } => assert_eq!(message, "Unrecognized module 'nope'"),
            other => panic!("unexpected error: {other}"),
        }
    });

    worker.stop();
}

#[test]
fn unreachable_worker_fails_the_job() {
    let dir = tempdir().expect("tempdir");
    let endpoint = dead_endpoint();
    let engine = coordinator(dir.path(), &endpoint);
    let oid = import_bytes(&engine, dir.path(), "lonely.bin", b"nobody listens");

    let err = engine
        .process("byte_histogram", std::slice::from_ref(&oid), &OptionBag::new(), false)
        .expect_err("no worker");
    assert!(matches!(err, EngineError::WorkerUnavailable { .. }), "unexpected error: {err}");
    assert!(!err.is_usage());

    let pool = engine.workers().expect("worker pool");
    assert!(pool.healthy().is_empty());
    assert!(engine.retrieve_all_keys("byte_histogram").expect("keys").is_empty());
}

#[test]
fn inputs_larger_than_eight_mebibytes_cross_the_wire() {
    let dir = tempdir().expect("tempdir");
    let worker = Worker::start(open_engine(&dir.path().join("worker")));
    let engine = coordinator(dir.path(), &worker.endpoint);

    let data: Vec<u8> = (0..9 * 1024 * 1024).map(|i: usize| i as u8).collect();
    let oid = import_bytes(&engine, dir.path(), "large.bin", &data);
    let results = engine
        .retrieve_many("byte_histogram", std::slice::from_ref(&oid), &OptionBag::new())
        .expect("distributed histogram");
    let histogram = match results.into_values().next() {
        Some(Some(Artifact::Histogram(counts))) => counts,
        other => panic!("unexpected result: {other:?}"),
    };
    assert_eq!(histogram.len(), 256);
    assert_eq!(histogram.get("00"), Some(&36_864));
    assert_eq!(worker.engine.retrieve_all_keys("files").expect("worker files"), vec![oid]);
    assert_eq!(engine.workers().expect("worker pool").healthy(), vec![worker.endpoint.clone()]);

    drop(engine);
    worker.stop();
}

#[test]
fn oversized_frames_fail_without_evicting_the_worker() {
    let dir = tempdir().expect("tempdir");
    let worker = Worker::start(open_engine(&dir.path().join("worker")));
    let config = EngineConfig { rpc_max_frame_bytes: 1024 * 1024, ..coordinator_config(&[&worker.endpoint]) };
    let engine = coordinator_with(dir.path(), config);

    let oid = import_bytes(&engine, dir.path(), "big.bin", &vec![0x5a; 2 * 1024 * 1024]);
    let err = engine
        .process("byte_histogram", std::slice::from_ref(&oid), &OptionBag::new(), false)
        .expect_err("frame over the limit");
    assert!(matches!(err, EngineError::Codec(_)), "unexpected error: {err}");
    assert_eq!(engine.workers().expect("worker pool").healthy(), vec![worker.endpoint.clone()]);
    assert!(engine.retrieve_all_keys("byte_histogram").expect("keys").is_empty());

    drop(engine);
    worker.stop();
}

#[test]
fn failed_partition_is_retried_on_a_live_worker() {
    let dir = tempdir().expect("tempdir");
    let worker = Worker::start(open_engine(&dir.path().join("worker")));
    let dead = dead_endpoint();
    let engine = coordinator_with(dir.path(), coordinator_config(&[&dead, &worker.endpoint]));

    // One input hashes to the dead endpoint's partition, one to the live one.
    let mut inputs = Vec::new();
    for bucket in 0..2 {
        let oid = (0u32..)
            .map(|i| format!("payload {i}").into_bytes())
            .find(|data| Oid::from_bytes(data).bucket(2) == bucket)
            .map(|data| import_bytes(&engine, dir.path(), &format!("part{bucket}.bin"), &data))
            .expect("some payload lands in the bucket");
        inputs.push(oid);
    }
    inputs.sort();

    engine
        .process("byte_histogram", &inputs, &OptionBag::new(), false)
        .expect("job survives the dead worker");

    assert_eq!(engine.workers().expect("worker pool").healthy(), vec![worker.endpoint.clone()]);
    let namespace = map_namespace("byte_histogram");
    assert_eq!(worker.engine.retrieve_all_keys(&namespace).expect("worker map outputs"), inputs);
    assert_eq!(engine.retrieve_all_keys(&namespace).expect("coordinator map outputs"), inputs);

    drop(engine);
    worker.stop();
}
