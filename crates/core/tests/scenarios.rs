mod common;

use std::collections::BTreeMap;

use oxide_core::engine::{job_id_for, map_namespace, IMPORT_TIME_TAG, TAG_ANY};
use oxide_core::{Artifact, EngineError, Oid, OptionBag, Value};
use serde_json::json;
use tempfile::tempdir;

use common::{import_bytes, open_engine};

#[test]
fn mz_stub_is_tagged_zm_with_file_meta() {
    let dir = tempdir().expect("tempdir");
    let engine = open_engine(dir.path());
    let oid = import_bytes(&engine, dir.path(), "stub.exe", b"MZ\x90\x00\x03");
    assert_eq!(oid, Oid::from_bytes(b"MZ\x90\x00\x03"));

    let kind = engine.retrieve("src_type", &oid, &OptionBag::new()).expect("src_type").expect("artifact");
    assert_eq!(kind.as_text(), Some("ZM"));

    let meta = engine.retrieve("file_meta", &oid, &OptionBag::new()).expect("file_meta");
    match meta {
        Some(Artifact::FileMeta(meta)) => {
            assert_eq!(meta.size, 5);
            assert!(meta.names.contains("stub.exe"));
            assert_eq!(meta.snapshots.len(), 1);
            assert!(meta.tags.contains_key(IMPORT_TIME_TAG));
        }
        other => panic!("unexpected file_meta artifact: {other:?}"),
    }
}

#[test]
fn truncated_elf_reports_32_bit_mode() {
    let dir = tempdir().expect("tempdir");
    let engine = open_engine(dir.path());
    let oid = import_bytes(&engine, dir.path(), "tiny.elf", b"\x7fELF\x01\x01");

    let kind = engine.retrieve("src_type", &oid, &OptionBag::new()).expect("src_type").expect("artifact");
    assert_eq!(kind.as_text(), Some("ELF"));

    let mode = engine.get_field("elf", &oid, "header.insn_mode", &OptionBag::new()).expect("field");
    assert_eq!(mode, Some(json!(32)));
    let known = engine.get_field("elf", &oid, "header.known_format", &OptionBag::new()).expect("field");
    assert_eq!(known, Some(json!(false)));
}

#[test]
fn format_modules_skip_other_formats() {
    let dir = tempdir().expect("tempdir");
    let engine = open_engine(dir.path());
    let oid = import_bytes(&engine, dir.path(), "tiny.elf", b"\x7fELF\x02\x01");

    assert_eq!(engine.retrieve("pe", &oid, &OptionBag::new()).expect("pe"), None);
    assert!(!engine.exists("pe", &oid, &OptionBag::new()).expect("exists"));

    let header = engine.retrieve("object_header", &oid, &OptionBag::new()).expect("object_header");
    let header = header.as_ref().and_then(Artifact::as_header).expect("header");
    assert_eq!(header.insn_mode, 64);
    assert_eq!(header.format, "ELF");
}

#[test]
fn byte_histogram_over_empty_collection_is_empty() {
    let dir = tempdir().expect("tempdir");
    let engine = open_engine(dir.path());
    let empty = engine.create_collection(None, &[]).expect("empty collection");
    assert_eq!(engine.collection_members(&empty).expect("members"), Some(Default::default()));

    let results = engine
        .retrieve_many("byte_histogram", std::slice::from_ref(&empty), &OptionBag::new())
        .expect("histogram");
    let expected_job = Oid::from_bytes(&[0u8; 8]);
    assert_eq!(job_id_for(&[]).expect("job id"), expected_job);
    assert_eq!(results.len(), 1);
    assert_eq!(results.get(&expected_job), Some(&Some(Artifact::Histogram(BTreeMap::new()))));

    assert!(engine.exists("byte_histogram", &expected_job, &OptionBag::new()).expect("exists"));
    assert_eq!(engine.retrieve_all_keys("byte_histogram").expect("keys"), vec![expected_job]);
}

#[test]
fn tag_filter_any_value_returns_every_import() {
    let dir = tempdir().expect("tempdir");
    let engine = open_engine(dir.path());
    let a = import_bytes(&engine, dir.path(), "a.bin", b"first file");
    let b = import_bytes(&engine, dir.path(), "b.bin", b"second file");

    let mut found = engine
        .tag_filter(None, IMPORT_TIME_TAG, &Value::Str(TAG_ANY.into()))
        .expect("tag filter");
    found.sort();
    let mut expected = vec![a, b];
    expected.sort();
    assert_eq!(found, expected);
}

#[test]
fn byte_histogram_sums_files_and_keeps_map_outputs() {
    let dir = tempdir().expect("tempdir");
    let engine = open_engine(dir.path());
    let a = import_bytes(&engine, dir.path(), "a.bin", &[0x00, 0x00, 0x01]);
    let b = import_bytes(&engine, dir.path(), "b.bin", &[0x01, 0xff]);

    let forward = engine
        .retrieve_many("byte_histogram", &[a.clone(), b.clone()], &OptionBag::new())
        .expect("histogram");
    let reverse = engine
        .retrieve_many("byte_histogram", &[b.clone(), a.clone()], &OptionBag::new())
        .expect("histogram");
    assert_eq!(forward, reverse);

    let (job_id, artifact) = forward.into_iter().next().expect("one job");
    assert_eq!(job_id, job_id_for(&[b.clone(), a.clone()]).expect("job id"));
    let expected: BTreeMap<String, u64> =
        [("00".to_string(), 2), ("01".to_string(), 2), ("ff".to_string(), 1)].into();
    assert_eq!(artifact, Some(Artifact::Histogram(expected)));

    let mut mapped = engine.retrieve_all_keys(&map_namespace("byte_histogram")).expect("map keys");
    mapped.sort();
    let mut inputs = vec![a, b];
    inputs.sort();
    assert_eq!(mapped, inputs);
}

#[test]
fn collections_expand_recursively() {
    let dir = tempdir().expect("tempdir");
    let engine = open_engine(dir.path());
    let a = import_bytes(&engine, dir.path(), "a.bin", b"aaaa");
    let b = import_bytes(&engine, dir.path(), "b.bin", b"bbbb");

    let inner = engine.create_collection(Some("inner"), std::slice::from_ref(&a)).expect("inner");
    let outer = engine.create_collection(Some("outer"), &[inner.clone(), b.clone()]).expect("outer");

    let mut expanded = engine.expand_oids(std::slice::from_ref(&outer)).expect("expand");
    expanded.sort();
    let mut expected = vec![a.clone(), b.clone()];
    expected.sort();
    assert_eq!(expanded, expected);

    let size = engine
        .retrieve_many("collection_size", &[outer.clone(), a.clone()], &OptionBag::new())
        .expect("collection_size");
    assert_eq!(size.into_values().next(), Some(Some(Artifact::Count(2))));

    assert_eq!(engine.collection_oid("outer").expect("lookup"), Some(outer.clone()));
    let names: Vec<String> = engine.collection_names().expect("names").into_iter().map(|(n, _)| n).collect();
    assert_eq!(names, vec!["inner".to_string(), "outer".to_string()]);

    assert!(engine.delete_collection("outer").expect("delete"));
    assert!(!engine.delete_collection("outer").expect("delete again"));
    assert_eq!(engine.collection_oid("outer").expect("lookup"), None);
    // Members stay addressable by OID after the name is gone.
    assert_eq!(engine.source(&outer).expect("source"), Some("collections"));
}

#[test]
fn collection_over_unknown_oids_is_rejected() {
    let dir = tempdir().expect("tempdir");
    let engine = open_engine(dir.path());
    let err = engine
        .create_collection(Some("ghost"), &[Oid::from_bytes(b"never imported")])
        .expect_err("no valid oids");
    assert_eq!(err, EngineError::BadOidList { supplied: 1 });

    let err = engine
        .process("entropy", &[Oid::from_bytes(b"never imported")], &OptionBag::new(), false)
        .expect_err("no valid oids");
    assert!(err.is_usage());
}

#[test]
fn tags_merge_and_filter_by_value() {
    let dir = tempdir().expect("tempdir");
    let engine = open_engine(dir.path());
    let a = import_bytes(&engine, dir.path(), "a.bin", b"tagged a");
    let b = import_bytes(&engine, dir.path(), "b.bin", b"tagged b");

    engine
        .apply_tags(std::slice::from_ref(&a), &BTreeMap::from([("family".to_string(), Value::from("alpha"))]))
        .expect("tag a");
    engine
        .apply_tags(std::slice::from_ref(&b), &BTreeMap::from([("family".to_string(), Value::from("beta"))]))
        .expect("tag b");

    let tags = engine.get_tags(&a).expect("tags");
    assert_eq!(tags.get("family"), Some(&Value::from("alpha")));
    assert!(tags.contains_key(IMPORT_TIME_TAG));

    assert_eq!(engine.tag_filter(None, "family", &Value::from("alpha")).expect("filter"), vec![a.clone()]);
    assert_eq!(
        engine
            .tag_filter(Some(&[b.clone(), a.clone(), b.clone()]), "family", &Value::from(TAG_ANY))
            .expect("filter"),
        vec![b.clone(), a.clone()]
    );
    assert!(engine.tag_filter(None, "missing", &Value::from(TAG_ANY)).expect("filter").is_empty());
}

#[test]
fn reimport_adds_a_name_without_new_bytes() {
    let dir = tempdir().expect("tempdir");
    let engine = open_engine(dir.path());
    let first = import_bytes(&engine, dir.path(), "one.bin", b"same bytes");
    let second = import_bytes(&engine, dir.path(), "two.bin", b"same bytes");
    assert_eq!(first, second);
    assert_eq!(engine.retrieve_all_keys("files").expect("keys"), vec![first.clone()]);

    let names: Vec<String> = engine.imports_for(&first).expect("imports").into_iter().map(|r| r.name).collect();
    assert_eq!(names, vec!["one.bin".to_string(), "two.bin".to_string()]);
    match engine.retrieve("file_meta", &first, &OptionBag::new()).expect("file_meta") {
        Some(Artifact::FileMeta(meta)) => assert_eq!(meta.names.len(), 2),
        other => panic!("unexpected file_meta artifact: {other:?}"),
    }
}

#[test]
fn import_directory_walks_in_name_order() {
    let dir = tempdir().expect("tempdir");
    let engine = open_engine(dir.path());
    let inputs = dir.path().join("tree");
    std::fs::create_dir_all(inputs.join("nested")).expect("mkdir");
    std::fs::write(inputs.join("b.bin"), b"bee").expect("write");
    std::fs::write(inputs.join("a.bin"), b"ay").expect("write");
    std::fs::write(inputs.join("nested").join("c.bin"), b"sea").expect("write");

    let flat = engine.import_directory(&inputs, false).expect("import");
    assert_eq!(flat, vec![Oid::from_bytes(b"ay"), Oid::from_bytes(b"bee")]);
    let deep = engine.import_directory(&inputs, true).expect("import");
    assert_eq!(deep.len(), 3);
    assert_eq!(deep[2], Oid::from_bytes(b"sea"));
}

#[test]
fn entropy_and_delete() {
    let dir = tempdir().expect("tempdir");
    let engine = open_engine(dir.path());
    let oid = import_bytes(&engine, dir.path(), "flat.bin", &[0x41; 64]);

    let processed = engine.process("entropy", std::slice::from_ref(&oid), &OptionBag::new(), false).expect("process");
    assert_eq!(processed.get(&oid), Some(&true));
    assert_eq!(engine.retrieve("entropy", &oid, &OptionBag::new()).expect("entropy"), Some(Artifact::Float(0.0)));

    assert_eq!(engine.delete("entropy", Some(&oid)).expect("delete"), 1);
    assert!(!engine.exists("entropy", &oid, &OptionBag::new()).expect("exists"));
    assert!(matches!(engine.delete("nope", None), Err(EngineError::UnrecognizedModule(_))));
}

#[test]
fn local_store_holds_scratch_values() {
    let dir = tempdir().expect("tempdir");
    let engine = open_engine(dir.path());

    assert!(!engine.local_exists("scratch", "note"));
    engine.local_store("scratch", "note", b"hello").expect("put");
    assert!(engine.local_exists("scratch", "note"));
    assert_eq!(engine.local_retrieve("scratch", "note").expect("get"), Some(b"hello".to_vec()));

    let table: BTreeMap<String, u64> = [("calls".to_string(), 3)].into();
    engine.local_store_value("scratch", "table", &table).expect("put value");
    let back: Option<BTreeMap<String, u64>> = engine.local_retrieve_value("scratch", "table").expect("get value");
    assert_eq!(back, Some(table));

    assert_eq!(engine.local_available("scratch").expect("list"), vec!["note".to_string(), "table".to_string()]);
    assert!(engine.local_delete("scratch", "note").expect("delete"));
    assert_eq!(engine.local_retrieve("scratch", "note").expect("get"), None);
}

#[test]
fn documentation_and_reference_tables() {
    let dir = tempdir().expect("tempdir");
    let engine = open_engine(dir.path());

    let doc = engine.documentation("opcode_histogram").expect("doc");
    assert_eq!(doc.opts.len(), 1);
    assert_eq!(doc.opts[0].name, "normalized");
    assert!(doc.opts[0].mangle);
    assert!(!engine.list_modules(false).contains(&"files".to_string()));
    assert!(matches!(engine.documentation("nope"), Err(EngineError::UnrecognizedModule(_))));

    let registers = engine.load_reference("x86_registers").expect("registers");
    assert!(registers.contains_key("eax"));
    assert!(engine.load_reference("no_such_table").is_err());
}
