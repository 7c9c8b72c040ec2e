//! Thin adjacency-list graph over addresses.

use std::collections::{BTreeMap, BTreeSet};
use std::io::{self, Write};

use serde::{Deserialize, Serialize};

/// Directed graph with `u64` nodes (basic-block or function start addresses).
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Graph {
    adjacency: BTreeMap<u64, BTreeSet<u64>>,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_node(&mut self, node: u64) {
        self.adjacency.entry(node).or_default();
    }

    /// Adds both endpoints if they are not present yet.
    pub fn add_edge(&mut self, from: u64, to: u64) {
        self.add_node(to);
        self.adjacency.entry(from).or_default().insert(to);
    }

    pub fn contains(&self, node: u64) -> bool {
        self.adjacency.contains_key(&node)
    }

    pub fn successors(&self, node: u64) -> impl Iterator<Item = u64> + '_ {
        self.adjacency.get(&node).into_iter().flat_map(|s| s.iter().copied())
    }

    pub fn nodes(&self) -> impl Iterator<Item = u64> + '_ {
        self.adjacency.keys().copied()
    }

    pub fn edges(&self) -> impl Iterator<Item = (u64, u64)> + '_ {
        self.adjacency.iter().flat_map(|(from, tos)| tos.iter().map(move |to| (*from, *to)))
    }

    pub fn node_count(&self) -> usize {
        self.adjacency.len()
    }

    pub fn edge_count(&self) -> usize {
        self.adjacency.values().map(BTreeSet::len).sum()
    }

    /// One line per node: the node followed by its successors, all in hex.
    pub fn write_adjacency<W: Write>(&self, out: &mut W) -> io::Result<()> {
        for (node, successors) in &self.adjacency {
            write!(out, "0x{node:x}")?;
            for succ in successors {
                write!(out, " 0x{succ:x}")?;
            }
            writeln!(out)?;
        }
        Ok(())
    }

    pub fn to_adjacency_string(&self) -> String {
        let mut buf = Vec::new();
        // Writing into a Vec cannot fail.
        let _ = self.write_adjacency(&mut buf);
        String::from_utf8_lossy(&buf).into_owned()
    }
}

/// Call graph over function start addresses.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CallGraph {
    pub graph: Graph,
}
