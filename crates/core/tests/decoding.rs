#![cfg(feature = "capstone-decoder")]

mod common;

use std::collections::BTreeMap;

use oxide_core::model::Artifact;
use oxide_core::{OptionBag, Value};
use tempfile::tempdir;

use common::{import_bytes, open_engine};

#[test]
fn nop_sled_has_no_functions() {
    let dir = tempdir().expect("tempdir");
    let engine = open_engine(dir.path());
    let oid = import_bytes(&engine, dir.path(), "sled.bin", &[0x90, 0x90, 0xc3]);

    assert_eq!(
        engine.retrieve("src_type", &oid, &OptionBag::new()).expect("src_type"),
        Some(Artifact::Text("UNKNOWN".into()))
    );
    assert_eq!(
        engine.retrieve("nops", &oid, &OptionBag::new()).expect("nops"),
        Some(Artifact::Runs(BTreeMap::from([(0, 2)])))
    );
    assert_eq!(
        engine.retrieve("function_extract", &oid, &OptionBag::new()).expect("functions"),
        Some(Artifact::Functions(BTreeMap::new()))
    );
    assert_eq!(
        engine.retrieve("basic_blocks_hashes", &oid, &OptionBag::new()).expect("hashes"),
        Some(Artifact::BlockHashes(BTreeMap::new()))
    );
}

#[test]
fn direct_call_links_two_functions() {
    // call 0x10; ret; int3 padding; push ebp; ret
    let mut code = vec![0xe8, 0x0b, 0x00, 0x00, 0x00, 0xc3];
    code.resize(0x10, 0xcc);
    code.extend_from_slice(&[0x55, 0xc3]);

    let dir = tempdir().expect("tempdir");
    let engine = open_engine(dir.path());
    let oid = import_bytes(&engine, dir.path(), "calls.bin", &code);

    let funcs = match engine.retrieve("function_extract", &oid, &OptionBag::new()).expect("functions") {
        Some(Artifact::Functions(funcs)) => funcs,
        other => panic!("unexpected functions artifact: {other:?}"),
    };
    assert_eq!(funcs.keys().copied().collect::<Vec<_>>(), vec![0, 0x10]);
    assert_eq!(funcs[&0].end, 6);

    let graph = match engine.retrieve("call_graph", &oid, &OptionBag::new()).expect("call_graph") {
        Some(Artifact::CallGraph(cg)) => cg.graph,
        other => panic!("unexpected call graph artifact: {other:?}"),
    };
    assert_eq!(graph.nodes().collect::<Vec<_>>(), vec![0, 0x10]);
    assert_eq!(graph.edges().collect::<Vec<_>>(), vec![(0, 0x10)]);
}

#[test]
fn mode_option_selects_a_separate_artifact() {
    let dir = tempdir().expect("tempdir");
    let engine = open_engine(dir.path());
    // 16-bit: mov ax, 0x9090 is three bytes; 32-bit reads five.
    let oid = import_bytes(&engine, dir.path(), "modes.bin", &[0xb8, 0x90, 0x90, 0x90, 0x90, 0xc3]);

    let default = engine.retrieve("disassembly", &oid, &OptionBag::new()).expect("default mode");
    let real_mode: OptionBag = [("mode".to_string(), Value::Int(16))].into();
    let sixteen = engine.retrieve("disassembly", &oid, &real_mode).expect("16-bit mode");
    assert_ne!(default, sixteen);

    let suffixes: Vec<String> = std::fs::read_dir(dir.path().join("store").join("datastore").join("disassembly"))
        .expect("module dir")
        .filter_map(Result::ok)
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .filter_map(|name| name.split_once('.').map(|(_, suffix)| suffix.to_string()))
        .collect::<std::collections::BTreeSet<_>>()
        .into_iter()
        .collect();
    assert_eq!(suffixes, vec!["0".to_string(), "16".to_string()]);

    let bad: OptionBag = [("mode".to_string(), Value::Int(8))].into();
    assert!(engine.retrieve("disassembly", &oid, &bad).expect_err("invalid mode").is_usage());

    let histogram = engine
        .retrieve("opcode_histogram", &oid, &OptionBag::new())
        .expect("opcode histogram")
        .expect("artifact");
    match histogram {
        Artifact::Histogram(counts) => assert_eq!(counts.get("ret"), Some(&1)),
        other => panic!("unexpected histogram artifact: {other:?}"),
    }
}
