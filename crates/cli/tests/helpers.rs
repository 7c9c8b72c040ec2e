use std::collections::BTreeMap;
use std::fs;

use oxide::commands::select_graph;
use oxide::{canonicalize_or_current, exit_code_for, parse_address, parse_key_values, UsageError};
use oxide_core::model::{Artifact, CallGraph, Graph};
use oxide_core::{EngineError, Value};
use tempfile::tempdir;

#[test]
fn canonicalize_or_current_resolves_existing_relative_path() {
    let original = std::env::current_dir().expect("cwd");
    let tmp = tempdir().expect("tempdir");
    let subdir = tmp.path().join("nested");
    fs::create_dir_all(&subdir).expect("create nested");
    std::env::set_current_dir(tmp.path()).expect("chdir tmp");

    let result = canonicalize_or_current("nested").expect("canonicalize nested");
    assert_eq!(result, subdir.canonicalize().expect("canonicalize subdir"));
    let missing = canonicalize_or_current("not-yet").expect("missing path");
    assert!(missing.ends_with("not-yet"));

    std::env::set_current_dir(original).expect("restore cwd");
}

#[test]
fn key_values_parse_json_literals() {
    let bag = parse_key_values(&["mode=16".into(), "name=alpha".into(), "flag=true".into()])
        .expect("parse");
    assert_eq!(bag.get("mode"), Some(&Value::Int(16)));
    assert_eq!(bag.get("name"), Some(&Value::Str("alpha".into())));
    assert_eq!(bag.get("flag"), Some(&Value::Bool(true)));

    let err = parse_key_values(&["novalue".into()]).expect_err("missing =");
    assert_eq!(exit_code_for(&err), 1);
    assert!(parse_key_values(&["=x".into()]).is_err());
}

#[test]
fn addresses_accept_hex_and_decimal() {
    assert_eq!(parse_address("0x1000").expect("hex"), 0x1000);
    assert_eq!(parse_address("0X1f").expect("hex"), 0x1f);
    assert_eq!(parse_address("4096").expect("decimal"), 4096);
    assert!(parse_address("zz").is_err());
}

#[test]
fn exit_codes_follow_error_kind() {
    let usage = anyhow::Error::new(UsageError("bad".into()));
    assert_eq!(exit_code_for(&usage), 1);

    let engine_usage = anyhow::Error::new(EngineError::UnrecognizedModule("nope".into())).context("outer");
    assert_eq!(exit_code_for(&engine_usage), 1);

    let io = anyhow::Error::new(EngineError::io("/tmp/x", "denied"));
    assert_eq!(exit_code_for(&io), 2);
    assert_eq!(exit_code_for(&anyhow::anyhow!("plain failure")), 2);
}

#[test]
fn graph_selection_by_artifact_kind() {
    let mut graph = Graph::new();
    graph.add_edge(0x1000, 0x1100);

    let picked = select_graph(Artifact::CallGraph(CallGraph { graph: graph.clone() }), None).expect("call graph");
    assert_eq!(picked, graph);

    let cfgs = Artifact::Cfgs(BTreeMap::from([(0x1000, graph.clone())]));
    assert_eq!(select_graph(cfgs.clone(), Some(0x1000)).expect("cfg"), graph);
    let err = select_graph(cfgs.clone(), None).expect_err("function required");
    assert!(err.to_string().contains("0x1000"));
    assert!(select_graph(cfgs, Some(0x2000)).is_err());
    assert_eq!(exit_code_for(&select_graph(Artifact::Count(1), None).expect_err("not a graph")), 1);
}
