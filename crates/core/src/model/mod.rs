//! Canonical data model for artifacts that flow between modules.
//!
//! - File metadata and source-type tags
//! - Unified object headers (PE / ELF / Mach-O)
//! - Instructions, functions, and basic blocks
//! - Control-flow and call graphs

pub mod artifact;
pub mod file_meta;
pub mod function;
pub mod graph;
pub mod header;
pub mod instruction;
pub mod source_type;

pub use artifact::Artifact;
pub use file_meta::{FileMeta, StatRecord};
pub use function::{BasicBlock, Function};
pub use graph::{CallGraph, Graph};
pub use header::{FormatInfo, ObjectHeader, Section};
pub use instruction::{Disassembly, Instruction, OpcodeInfo, Operand};
pub use source_type::SourceType;
