//! Decoded instruction records.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Linear disassembly keyed by file offset.
pub type Disassembly = BTreeMap<u64, Instruction>;

/// Operand variants produced by the decoder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operand {
    Register(String),
    Immediate(i64),
    /// Absolute memory offset (`moffs` forms).
    Offset(u64),
    /// Branch destination already resolved to an absolute address.
    Relative(u64),
    /// Far pointer `segment:offset`.
    SegmentOffset { segment: u64, offset: u64 },
    EffectiveAddress {
        segment: Option<String>,
        base: Option<String>,
        index: Option<String>,
        scale: i32,
        disp: i64,
    },
}

impl Operand {
    /// Short operand class used in instruction signatures.
    pub fn kind(&self) -> &'static str {
        match self {
            Operand::Register(_) => "reg",
            Operand::Immediate(_) => "imm",
            Operand::Offset(_) => "off",
            Operand::Relative(_) => "rel",
            Operand::SegmentOffset { .. } => "ptr",
            Operand::EffectiveAddress { .. } => "mem",
        }
    }
}

/// Raw decoder output kept alongside the normalised record.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct OpcodeInfo {
    pub mnemonic: String,
    pub operands: String,
    pub bytes: Vec<u8>,
}

pub const GROUP_EXEC: &str = "exec";
pub const GROUP_INVALID: &str = "invalid";
pub const GROUP_GENERAL: &str = "general";

/// One decoded instruction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instruction {
    pub addr: u64,
    pub offset: u64,
    pub len: u32,
    /// Normalised mnemonic: conditional jumps are `jcc`, far returns `retn`, etc.
    pub mnem: String,
    /// `exec` for branches, calls, returns and interrupts.
    pub group: String,
    pub prefixes: Vec<String>,
    pub d_op: Option<Operand>,
    pub s_ops: Vec<Operand>,
    pub signature: String,
    pub opcode: OpcodeInfo,
}

impl Instruction {
    /// Build a record from a normalised mnemonic; group and signature are derived.
    pub fn new(
        addr: u64,
        offset: u64,
        mnem: impl Into<String>,
        d_op: Option<Operand>,
        s_ops: Vec<Operand>,
        bytes: Vec<u8>,
    ) -> Self {
        let mnem = mnem.into();
        let group = group_for(&mnem).to_string();
        let signature = signature_for(&mnem, d_op.as_ref(), &s_ops);
        Self {
            addr,
            offset,
            len: bytes.len() as u32,
            opcode: OpcodeInfo { mnemonic: mnem.clone(), operands: String::new(), bytes },
            mnem,
            group,
            prefixes: Vec::new(),
            d_op,
            s_ops,
            signature,
        }
    }

    /// One undecodable byte.
    pub fn invalid(addr: u64, offset: u64, byte: u8) -> Self {
        Self::new(addr, offset, "invalid", None, Vec::new(), vec![byte])
    }

    /// Address of the textually next instruction; `None` past the end of the address space.
    pub fn end(&self) -> Option<u64> {
        self.addr.checked_add(u64::from(self.len))
    }

    pub fn is_exec(&self) -> bool {
        self.group == GROUP_EXEC
    }

    pub fn is_call(&self) -> bool {
        matches!(self.mnem.as_str(), "call" | "callcc")
    }

    pub fn is_branch(&self) -> bool {
        matches!(self.mnem.as_str(), "jmp" | "jcc")
    }

    pub fn is_terminator(&self) -> bool {
        matches!(self.mnem.as_str(), "ret" | "retn" | "hlt")
    }

    pub fn is_padding(&self) -> bool {
        matches!(self.mnem.as_str(), "nop" | "int3")
    }

    pub fn is_invalid(&self) -> bool {
        self.group == GROUP_INVALID
    }

    /// No fall-through to the next instruction.
    pub fn ends_flow(&self) -> bool {
        matches!(self.mnem.as_str(), "ret" | "retn" | "jmp")
    }
}

/// Classify a normalised mnemonic.
pub fn group_for(mnem: &str) -> &'static str {
    match mnem {
        "invalid" => GROUP_INVALID,
        "call" | "callcc" | "jmp" | "jcc" | "ret" | "retn" | "iret" | "int" | "int1" | "int3"
        | "into" | "syscall" | "sysenter" | "sysexit" | "sysret" => GROUP_EXEC,
        _ => GROUP_GENERAL,
    }
}

/// Fold decoder mnemonics into the engine's normalised set.
pub fn normalize_mnemonic(raw: &str, operand_count: usize) -> String {
    let raw = raw.trim().to_ascii_lowercase();
    match raw.as_str() {
        "call" | "lcall" => "call".to_string(),
        "jmp" | "ljmp" => "jmp".to_string(),
        "ret" if operand_count > 0 => "retn".to_string(),
        "ret" => "ret".to_string(),
        "retf" | "lret" | "retfq" => "retn".to_string(),
        "iret" | "iretd" | "iretq" => "iret".to_string(),
        "loop" | "loope" | "loopne" => "jcc".to_string(),
        s if s.starts_with('j') => "jcc".to_string(),
        s => s.to_string(),
    }
}

fn signature_for(mnem: &str, d_op: Option<&Operand>, s_ops: &[Operand]) -> String {
    let kinds: Vec<&str> = d_op.into_iter().chain(s_ops.iter()).map(Operand::kind).collect();
    if kinds.is_empty() {
        mnem.to_string()
    } else {
        format!("{mnem} {}", kinds.join(","))
    }
}
