use serde::{Deserialize, Serialize};

use super::instruction::Instruction;

/// A contiguous run of instructions recovered by the function extractor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Function {
    pub name: String,
    /// Address of the first instruction.
    pub start: u64,
    /// Address just past the last instruction.
    pub end: u64,
    pub insns: Vec<Instruction>,
}

impl Function {
    /// Build from a non-empty instruction run; `None` for an empty one.
    pub fn from_insns(name: impl Into<String>, insns: Vec<Instruction>) -> Option<Self> {
        let start = insns.first()?.addr;
        let end = insns.last()?.end()?;
        Some(Self { name: name.into(), start, end, insns })
    }

    pub fn contains(&self, addr: u64) -> bool {
        addr >= self.start && addr < self.end
    }

    /// Index of the instruction starting exactly at `addr`.
    pub fn index_of(&self, addr: u64) -> Option<usize> {
        self.insns.binary_search_by_key(&addr, |i| i.addr).ok()
    }
}

/// Summary of one basic block inside a function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BasicBlock {
    pub first_insn: u64,
    pub last_insn: u64,
    pub num_insns: u64,
}
