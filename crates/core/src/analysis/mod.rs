//! Structural analysis over decoded instructions.
//!
//! These are pure functions over the data model; the modules in
//! [`crate::modules`] fetch their inputs through the engine and call into here.
//!
//! - Target resolution for branch and call operands
//! - Function extraction from a linear disassembly
//! - Basic blocks, control-flow graphs, and the call graph
//! - Byte-level statistics

mod blocks;
mod callgraph;
mod cfg;
mod functions;
mod image;
mod stats;
mod target;

pub use blocks::{basic_blocks, block_hashes, block_leaders};
pub use callgraph::call_graph;
pub use cfg::control_flow_graph;
pub use functions::{extract_functions, ZERO_GAP};
pub use image::Image;
pub use stats::{byte_counts, nop_runs, opcode_counts, shannon_entropy};
pub use target::resolve_target_operand;
