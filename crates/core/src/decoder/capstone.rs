use capstone::arch::x86::{X86Operand, X86OperandType};
use capstone::arch::ArchOperand;
use capstone::{arch, prelude::*, Capstone, Insn, RegId};
use tracing::{debug, trace};

use super::{leading_prefixes, Decoder};
use crate::error::{EngineError, EngineResult};
use crate::model::instruction::{group_for, normalize_mnemonic, GROUP_EXEC};
use crate::model::{Instruction, OpcodeInfo, Operand};

/// x86 decoder (16/32/64-bit) backed by capstone.
pub struct CapstoneDecoder;

fn make_cs(insn_mode: u8) -> EngineResult<Capstone> {
    let mode = match insn_mode {
        16 => arch::x86::ArchMode::Mode16,
        64 => arch::x86::ArchMode::Mode64,
        _ => arch::x86::ArchMode::Mode32,
    };
    Capstone::new()
        .x86()
        .mode(mode)
        .detail(true)
        .build()
        .map_err(|e| EngineError::module("disassembly", format!("capstone init failed: {e}")))
}

impl Decoder for CapstoneDecoder {
    fn name(&self) -> &'static str {
        "capstone"
    }

    fn decode(
        &self,
        bytes: &[u8],
        base_addr: u64,
        base_offset: u64,
        insn_mode: u8,
    ) -> EngineResult<Vec<Instruction>> {
        let cs = make_cs(insn_mode)?;
        let mut out = Vec::new();
        let mut pos = 0usize;

        // disasm_all stops at the first undecodable byte; resume one byte later.
        while pos < bytes.len() {
            let Some(addr) = base_addr.checked_add(pos as u64) else {
                debug!(base_addr, pos, "section runs past the end of the address space");
                break;
            };
            let insns = cs
                .disasm_all(&bytes[pos..], addr)
                .map_err(|e| EngineError::module("disassembly", e.to_string()))?;
            let mut consumed = 0usize;
            for insn in insns.iter() {
                let offset = base_offset.saturating_add((pos + consumed) as u64);
                out.push(convert(&cs, insn, offset, insn_mode));
                consumed += insn.bytes().len();
            }
            pos += consumed;
            if pos < bytes.len() && consumed == 0 {
                let Some(addr) = base_addr.checked_add(pos as u64) else {
                    break;
                };
                trace!(addr, "undecodable byte");
                out.push(Instruction::invalid(addr, base_offset.saturating_add(pos as u64), bytes[pos]));
                pos += 1;
            }
        }
        Ok(out)
    }
}

fn convert(cs: &Capstone, insn: &Insn<'_>, offset: u64, insn_mode: u8) -> Instruction {
    let raw_mnem = insn.mnemonic().unwrap_or("").to_string();
    let raw_bytes = insn.bytes().to_vec();
    let x86_ops: Vec<X86Operand> = cs
        .insn_detail(insn)
        .map(|detail| {
            detail
                .arch_detail()
                .operands()
                .into_iter()
                .filter_map(|op| match op {
                    ArchOperand::X86Operand(x) => Some(x),
                    _ => None,
                })
                .collect()
        })
        .unwrap_or_default();

    let mnem = normalize_mnemonic(&raw_mnem, x86_ops.len());
    let is_exec = group_for(&mnem) == GROUP_EXEC;
    let opcode_byte = raw_bytes.get(leading_prefixes(&raw_bytes, insn_mode).len()).copied();
    let moffs = matches!(opcode_byte, Some(0xa0..=0xa3));

    let mut operands = operands_for(cs, &x86_ops, is_exec, moffs);
    let (d_op, s_ops) = if operands.len() >= 2 {
        let first = operands.remove(0);
        (Some(first), operands)
    } else if is_exec || mnem == "push" {
        (None, operands)
    } else {
        (operands.pop(), Vec::new())
    };

    let mut record = Instruction::new(insn.address(), offset, mnem, d_op, s_ops, raw_bytes);
    record.prefixes = leading_prefixes(&record.opcode.bytes, insn_mode);
    record.opcode = OpcodeInfo {
        mnemonic: raw_mnem,
        operands: insn.op_str().unwrap_or("").to_string(),
        bytes: std::mem::take(&mut record.opcode.bytes),
    };
    record
}

fn operands_for(cs: &Capstone, ops: &[X86Operand], is_exec: bool, moffs: bool) -> Vec<Operand> {
    // Far pointers decode as two immediates: segment then offset.
    if is_exec && ops.len() == 2 {
        if let (X86OperandType::Imm(seg), X86OperandType::Imm(off)) = (&ops[0].op_type, &ops[1].op_type) {
            return vec![Operand::SegmentOffset { segment: *seg as u64, offset: *off as u64 }];
        }
    }

    let reg_name = |id: RegId| -> Option<String> {
        if id.0 == 0 {
            None
        } else {
            cs.reg_name(id)
        }
    };

    ops.iter()
        .filter_map(|op| match &op.op_type {
            X86OperandType::Reg(reg) => reg_name(*reg).map(Operand::Register),
            X86OperandType::Imm(imm) if is_exec => Some(Operand::Relative(*imm as u64)),
            X86OperandType::Imm(imm) => Some(Operand::Immediate(*imm)),
            X86OperandType::Mem(mem) => {
                let base = reg_name(mem.base());
                let index = reg_name(mem.index());
                if moffs && base.is_none() && index.is_none() {
                    Some(Operand::Offset(mem.disp() as u64))
                } else {
                    Some(Operand::EffectiveAddress {
                        segment: reg_name(mem.segment()),
                        base,
                        index,
                        scale: mem.scale(),
                        disp: mem.disp(),
                    })
                }
            }
            _ => None,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_nops_and_ret() {
        let insns = CapstoneDecoder.decode(&[0x90, 0x90, 0xc3], 0, 0, 32).expect("decode");
        let mnems: Vec<&str> = insns.iter().map(|i| i.mnem.as_str()).collect();
        assert_eq!(mnems, vec!["nop", "nop", "ret"]);
        assert_eq!(insns[2].group, "exec");
    }

    #[test]
    fn relative_call_resolves_to_absolute() {
        // call +0 at 0x1000 lands on 0x1005.
        let insns =
            CapstoneDecoder.decode(&[0xe8, 0, 0, 0, 0], 0x1000, 0, 32).expect("decode");
        assert_eq!(insns.len(), 1);
        assert_eq!(insns[0].mnem, "call");
        assert_eq!(insns[0].s_ops, vec![Operand::Relative(0x1005)]);
        assert_eq!(insns[0].d_op, None);
    }

    #[test]
    fn conditional_jump_normalises() {
        let insns = CapstoneDecoder.decode(&[0x74, 0x00], 0, 0, 32).expect("decode");
        assert_eq!(insns[0].mnem, "jcc");
        assert_eq!(insns[0].opcode.mnemonic, "je");
    }

    #[test]
    fn mov_immediate_splits_dest_and_source() {
        let insns = CapstoneDecoder.decode(&[0xb8, 0x10, 0, 0, 0], 0, 0, 32).expect("decode");
        assert_eq!(insns[0].d_op, Some(Operand::Register("eax".into())));
        assert_eq!(insns[0].s_ops, vec![Operand::Immediate(0x10)]);
        assert_eq!(insns[0].signature, "mov reg,imm");
    }

    #[test]
    fn decoding_at_the_top_of_the_address_space() {
        let insns = CapstoneDecoder.decode(&[0x90, 0x90, 0x90], u64::MAX - 1, 0, 32).expect("decode");
        assert_eq!(insns.first().map(|i| i.addr), Some(u64::MAX - 1));
        assert!(insns.iter().all(|i| i.offset < 3));
    }

    #[test]
    fn every_byte_is_covered() {
        let data = [0x90, 0x0f, 0xff, 0xff, 0x90];
        let insns = CapstoneDecoder.decode(&data, 0, 0, 32).expect("decode");
        let covered: u64 = insns.iter().map(|i| u64::from(i.len)).sum();
        assert_eq!(covered, data.len() as u64);
    }
}
