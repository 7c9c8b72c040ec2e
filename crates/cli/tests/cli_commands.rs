use std::fs;
use std::path::Path;

use assert_cmd::cargo::cargo_bin_cmd;
use assert_cmd::Command;
use oxide_core::Oid;
use predicates::prelude::*;
use tempfile::tempdir;

fn oxide(root: &Path) -> Command {
    let mut cmd = cargo_bin_cmd!("oxide");
    cmd.arg("--root").arg(root);
    cmd
}

/// Initialized store with one imported file grouped as `samples`.
fn store_with_sample(root: &Path, name: &str, data: &[u8]) -> Oid {
    oxide(root).arg("init").assert().success().stdout(predicate::str::contains("Initialized oxide store"));
    let input = root.join(name);
    fs::write(&input, data).expect("write input");
    let oid = Oid::from_bytes(data);
    oxide(root)
        .args(["import", "--collection", "samples"])
        .arg(&input)
        .assert()
        .success()
        .stdout(predicate::str::contains(oid.as_str()))
        .stdout(predicate::str::contains("Collection samples"));
    oid
}

#[test]
fn init_creates_layout_and_is_repeatable() {
    let dir = tempdir().expect("tempdir");
    let root = dir.path();
    oxide(root).arg("init").assert().success();
    assert!(root.join(".oxide").join("config.json").is_file());
    assert!(root.join(".oxide").join("catalog.db").is_file());
    assert!(root.join("datastore").is_dir());
    assert!(root.join("localstore").is_dir());

    oxide(root).arg("init").assert().success().stdout(predicate::str::contains("(kept existing)"));
}

#[test]
fn import_and_retrieve_fields() {
    let dir = tempdir().expect("tempdir");
    let root = dir.path();
    let oid = store_with_sample(root, "stub.exe", b"MZ\x90\x00\x03");

    oxide(root)
        .args(["retrieve", "src_type", oid.as_str()])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"ZM\""));
    oxide(root)
        .args(["retrieve", "file_meta", oid.as_str(), "--field", "size"])
        .assert()
        .success()
        .stdout(predicate::str::diff("5\n"));
    oxide(root)
        .args(["retrieve", "file_meta", "samples", "--field", "size"])
        .assert()
        .failure();

    let output = oxide(root).args(["info", "--json"]).output().expect("run info");
    assert!(output.status.success());
    let info: serde_json::Value = serde_json::from_slice(&output.stdout).expect("info json");
    assert_eq!(info["files"], 1);
    assert_eq!(info["named_collections"], 1);
}

#[test]
fn tags_and_collections_round_trip() {
    let dir = tempdir().expect("tempdir");
    let root = dir.path();
    let oid = store_with_sample(root, "a.bin", b"tag me");

    oxide(root)
        .args(["tag", "apply", oid.as_str(), "--tag", "family=alpha", "--tag", "score=3"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Tagged 1 object(s) with 2 tag(s)"));
    oxide(root)
        .args(["tag", "get", oid.as_str()])
        .assert()
        .success()
        .stdout(predicate::str::contains("family = alpha"))
        .stdout(predicate::str::contains("score = 3"));
    oxide(root)
        .args(["tag", "filter", "family", "--value", "alpha"])
        .assert()
        .success()
        .stdout(predicate::str::contains(oid.as_str()));
    oxide(root)
        .args(["tag", "filter", "family", "--value", "beta"])
        .assert()
        .success()
        .stdout(predicate::str::is_empty());
    oxide(root)
        .args(["tag", "filter", "import_time"])
        .assert()
        .success()
        .stdout(predicate::str::contains(oid.as_str()));

    oxide(root).args(["collection", "list"]).assert().success().stdout(predicate::str::contains("samples"));
    oxide(root)
        .args(["collection", "show", "samples"])
        .assert()
        .success()
        .stdout(predicate::str::contains("(1 members)"))
        .stdout(predicate::str::contains(oid.as_str()));
    oxide(root).args(["collection", "create", "again", "samples"]).assert().success();
    oxide(root).args(["collection", "delete", "samples"]).assert().success();
    oxide(root).args(["collection", "delete", "samples"]).assert().code(1);
}

#[test]
fn process_modules_and_docs() {
    let dir = tempdir().expect("tempdir");
    let root = dir.path();
    let oid = store_with_sample(root, "data.bin", &[1, 2, 3, 3]);

    oxide(root)
        .args(["process", "byte_histogram", "samples"])
        .assert()
        .success()
        .stdout(predicate::str::contains("byte_histogram: 1/1 produced"));
    oxide(root)
        .args(["process", "entropy", oid.as_str(), "--force"])
        .assert()
        .success()
        .stdout(predicate::str::contains(format!("{oid}: ok")));

    oxide(root)
        .arg("modules")
        .assert()
        .success()
        .stdout(predicate::str::contains("byte_histogram [map/reduce]"))
        .stdout(predicate::str::contains("files [source]").not());
    oxide(root).args(["modules", "--all"]).assert().success().stdout(predicate::str::contains("files [source]"));
    oxide(root)
        .args(["doc", "disassembly"])
        .assert()
        .success()
        .stdout(predicate::str::contains("mode (Int, default 0, mangled)"));
}

#[test]
fn write_graph_emits_adjacency_list() {
    let dir = tempdir().expect("tempdir");
    let root = dir.path();
    let mut code = vec![0xe8, 0x0b, 0x00, 0x00, 0x00, 0xc3];
    code.resize(0x10, 0xcc);
    code.extend_from_slice(&[0x55, 0xc3]);
    let oid = store_with_sample(root, "calls.bin", &code);

    let out = root.join("calls.txt");
    oxide(root)
        .args(["write-graph", "call_graph", oid.as_str(), "--out"])
        .arg(&out)
        .assert()
        .success()
        .stdout(predicate::str::contains("2 nodes / 1 edges"));
    assert_eq!(fs::read_to_string(&out).expect("read graph"), "0x0 0x10\n0x10\n");

    oxide(root)
        .args(["write-graph", "entropy", oid.as_str(), "--out"])
        .arg(root.join("bad.txt"))
        .assert()
        .code(1)
        .stderr(predicate::str::contains("not a graph"));
}

#[test]
fn local_scratch_commands() {
    let dir = tempdir().expect("tempdir");
    let root = dir.path();
    oxide(root).arg("init").assert().success();
    let blob = root.join("blob.txt");
    fs::write(&blob, "scratch contents").expect("write blob");

    oxide(root).args(["local", "put", "notes", "first"]).arg(&blob).assert().success();
    oxide(root).args(["local", "list", "notes"]).assert().success().stdout(predicate::str::diff("first\n"));
    oxide(root)
        .args(["local", "get", "notes", "first"])
        .assert()
        .success()
        .stdout(predicate::str::contains("scratch contents"));
    oxide(root).args(["local", "get", "notes", "missing"]).assert().code(2);
}

#[test]
fn exit_codes_separate_usage_from_failures() {
    let dir = tempdir().expect("tempdir");
    let root = dir.path();

    oxide(root).arg("--help").assert().code(0);
    oxide(root).arg("no-such-command").assert().code(1);
    oxide(root).arg("info").assert().code(2).stderr(predicate::str::contains("oxide init"));

    let oid = store_with_sample(root, "x.bin", b"exit codes");
    oxide(root).args(["process", "nope", oid.as_str()]).assert().code(1);
    oxide(root).args(["tag", "apply", oid.as_str()]).assert().code(1);
    oxide(root).args(["process", "disassembly", oid.as_str(), "--opt", "mode"]).assert().code(1);
    oxide(root).args(["process", "disassembly", oid.as_str(), "--opt", "mode=8"]).assert().code(1);
    oxide(root).args(["retrieve", "entropy", "not-a-collection"]).assert().code(1);
    oxide(root).args(["import"]).arg(root.join("missing.bin")).assert().code(2);
}
