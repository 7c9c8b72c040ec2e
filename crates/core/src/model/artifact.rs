//! The tagged union of everything a module can store.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use super::{
    BasicBlock, CallGraph, Disassembly, FileMeta, FormatInfo, Function, Graph, ObjectHeader,
};
use crate::oid::Oid;
use crate::value::Value;

/// An immutable module output, stored under (module, OID, suffix).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Artifact {
    Bytes(Vec<u8>),
    Text(String),
    FileMeta(FileMeta),
    Collection(BTreeSet<Oid>),
    Header(ObjectHeader),
    Format(FormatInfo),
    Disassembly(Disassembly),
    /// Start offset of each run -> run length.
    Runs(BTreeMap<u64, u64>),
    Functions(BTreeMap<u64, Function>),
    BasicBlocks(BTreeMap<u64, Vec<BasicBlock>>),
    /// Hex SHA-1 of a block's bytes -> first-instruction addresses of every block with those bytes.
    BlockHashes(BTreeMap<String, Vec<u64>>),
    Cfgs(BTreeMap<u64, Graph>),
    CallGraph(CallGraph),
    Histogram(BTreeMap<String, u64>),
    Count(u64),
    Float(f64),
    Record(BTreeMap<String, Value>),
}

impl Artifact {
    /// Variant name, used in logs and type-mismatch errors.
    pub fn kind(&self) -> &'static str {
        match self {
            Artifact::Bytes(_) => "bytes",
            Artifact::Text(_) => "text",
            Artifact::FileMeta(_) => "file_meta",
            Artifact::Collection(_) => "collection",
            Artifact::Header(_) => "header",
            Artifact::Format(_) => "format",
            Artifact::Disassembly(_) => "disassembly",
            Artifact::Runs(_) => "runs",
            Artifact::Functions(_) => "functions",
            Artifact::BasicBlocks(_) => "basic_blocks",
            Artifact::BlockHashes(_) => "block_hashes",
            Artifact::Cfgs(_) => "cfgs",
            Artifact::CallGraph(_) => "call_graph",
            Artifact::Histogram(_) => "histogram",
            Artifact::Count(_) => "count",
            Artifact::Float(_) => "float",
            Artifact::Record(_) => "record",
        }
    }

    /// Plain JSON view of the payload, without the variant wrapper.
    pub fn to_json(&self) -> serde_json::Value {
        let rendered = match self {
            Artifact::Bytes(b) => Ok(serde_json::Value::String(hex::encode(b))),
            Artifact::Text(s) => Ok(serde_json::Value::String(s.clone())),
            Artifact::FileMeta(m) => serde_json::to_value(m).map(|mut json| {
                if let Some(tags) = json.get_mut("tags") {
                    *tags = Value::Map(m.tags.clone()).to_json();
                }
                json
            }),
            Artifact::Collection(c) => serde_json::to_value(c),
            Artifact::Header(h) => serde_json::to_value(h),
            Artifact::Format(f) => serde_json::to_value(f),
            Artifact::Disassembly(d) => serde_json::to_value(d),
            Artifact::Runs(r) => serde_json::to_value(r),
            Artifact::Functions(f) => serde_json::to_value(f),
            Artifact::BasicBlocks(b) => serde_json::to_value(b),
            Artifact::BlockHashes(h) => serde_json::to_value(h),
            Artifact::Cfgs(c) => Ok(serde_json::Value::Object(
                c.iter().map(|(k, g)| (k.to_string(), graph_json(g))).collect(),
            )),
            Artifact::CallGraph(cg) => Ok(serde_json::json!({ "graph": graph_json(&cg.graph) })),
            Artifact::Histogram(h) => serde_json::to_value(h),
            Artifact::Count(n) => Ok(serde_json::Value::from(*n)),
            Artifact::Float(f) => Ok(Value::Float(*f).to_json()),
            Artifact::Record(r) => Ok(Value::Map(r.clone()).to_json()),
        };
        rendered.unwrap_or(serde_json::Value::Null)
    }

    /// Member at a dotted path (`header.insn_mode`, `names`). Numeric path
    /// segments index arrays.
    pub fn field(&self, path: &str) -> Option<serde_json::Value> {
        let mut current = self.to_json();
        for segment in path.split('.').filter(|s| !s.is_empty()) {
            current = match current {
                serde_json::Value::Object(mut map) => map.remove(segment)?,
                serde_json::Value::Array(mut items) => {
                    let idx: usize = segment.parse().ok()?;
                    if idx >= items.len() {
                        return None;
                    }
                    items.swap_remove(idx)
                }
                _ => return None,
            };
        }
        Some(current)
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Artifact::Bytes(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Artifact::Text(s) => Some(s),
            _ => None,
        }
    }

    /// The object header, whether stored bare or inside a format artifact.
    pub fn as_header(&self) -> Option<&ObjectHeader> {
        match self {
            Artifact::Header(h) => Some(h),
            Artifact::Format(f) => Some(&f.header),
            _ => None,
        }
    }
}

fn graph_json(graph: &Graph) -> serde_json::Value {
    serde_json::json!({
        "nodes": graph.nodes().collect::<Vec<_>>(),
        "edges": graph.edges().map(|(a, b)| [a, b]).collect::<Vec<_>>(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::header::ObjectHeader;

    #[test]
    fn field_descends_dotted_paths() {
        let art = Artifact::Format(FormatInfo { header: ObjectHeader::coarse("ELF", 32) });
        assert_eq!(art.field("header.insn_mode"), Some(serde_json::json!(32)));
        assert_eq!(art.field("header.missing"), None);
    }

    #[test]
    fn call_graph_renders_nodes_and_edges() {
        let mut graph = Graph::new();
        graph.add_edge(0x1000, 0x1100);
        let art = Artifact::CallGraph(CallGraph { graph });
        assert_eq!(art.field("graph.edges.0"), Some(serde_json::json!([0x1000, 0x1100])));
    }

    #[test]
    fn round_trips_through_codec() {
        let mut runs = BTreeMap::new();
        runs.insert(0u64, 2u64);
        let art = Artifact::Runs(runs);
        let bytes = crate::codec::encode(&art).expect("encode");
        let back: Artifact = crate::codec::decode(&bytes).expect("decode");
        assert_eq!(back, art);
    }
}
