//! Static reference tables compiled into the crate.

use std::collections::BTreeMap;

use crate::error::{EngineError, EngineResult};
use crate::model::instruction::group_for;
use crate::model::SourceType;
use crate::value::Value;

/// A named lookup table.
pub type ReferenceTable = BTreeMap<String, Value>;

pub const REFERENCE_TABLES: &[&str] = &["exec_mnemonics", "magic_table", "x86_registers"];

const X86_REGISTERS: &[(&str, i64)] = &[
    ("al", 8), ("ah", 8), ("bl", 8), ("bh", 8), ("cl", 8), ("ch", 8), ("dl", 8), ("dh", 8),
    ("spl", 8), ("bpl", 8), ("sil", 8), ("dil", 8),
    ("ax", 16), ("bx", 16), ("cx", 16), ("dx", 16), ("sp", 16), ("bp", 16), ("si", 16), ("di", 16),
    ("cs", 16), ("ds", 16), ("es", 16), ("fs", 16), ("gs", 16), ("ss", 16), ("ip", 16),
    ("eax", 32), ("ebx", 32), ("ecx", 32), ("edx", 32), ("esp", 32), ("ebp", 32), ("esi", 32),
    ("edi", 32), ("eip", 32),
    ("rax", 64), ("rbx", 64), ("rcx", 64), ("rdx", 64), ("rsp", 64), ("rbp", 64), ("rsi", 64),
    ("rdi", 64), ("rip", 64),
    ("r8", 64), ("r9", 64), ("r10", 64), ("r11", 64), ("r12", 64), ("r13", 64), ("r14", 64), ("r15", 64),
];

const EXEC_MNEMONICS: &[&str] = &[
    "call", "callcc", "jmp", "jcc", "ret", "retn", "iret", "int", "int1", "int3", "into", "syscall",
    "sysenter", "sysexit", "sysret",
];

/// Look up a reference table by name.
pub fn load_reference(name: &str) -> EngineResult<ReferenceTable> {
    let table = match name {
        "x86_registers" => X86_REGISTERS
            .iter()
            .map(|(reg, width)| (reg.to_string(), Value::Int(*width)))
            .chain((8..16).flat_map(|n| {
                [
                    (format!("r{n}d"), Value::Int(32)),
                    (format!("r{n}w"), Value::Int(16)),
                    (format!("r{n}b"), Value::Int(8)),
                ]
            }))
            .collect(),
        "magic_table" => SourceType::all()
            .iter()
            .map(|t| (t.as_str().to_string(), Value::Str(t.magic_description().to_string())))
            .collect(),
        "exec_mnemonics" => EXEC_MNEMONICS
            .iter()
            .map(|m| (m.to_string(), Value::Str(group_for(m).to_string())))
            .collect(),
        other => {
            return Err(EngineError::module(
                "reference",
                format!("unknown reference table '{other}' (known: {})", REFERENCE_TABLES.join(", ")),
            ))
        }
    };
    Ok(table)
}
