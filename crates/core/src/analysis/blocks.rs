use std::collections::{BTreeMap, BTreeSet};

use sha1::{Digest, Sha1};

use super::{resolve_target_operand, Image};
use crate::model::{BasicBlock, Function};

/// Addresses that begin a basic block in `func`: its first instruction, every
/// in-function target of an exec instruction, and the instruction after each
/// exec instruction.
pub fn block_leaders(func: &Function, image: &Image<'_>) -> BTreeSet<u64> {
    let mut leaders = BTreeSet::new();
    let Some(first) = func.insns.first() else {
        return leaders;
    };
    leaders.insert(first.addr);

    for (idx, insn) in func.insns.iter().enumerate().filter(|(_, i)| i.is_exec()) {
        if let Some(target) = resolve_target_operand(insn, &func.insns[..idx], image) {
            if func.index_of(target).is_some() {
                leaders.insert(target);
            }
        }
        if let Some(next) = insn.end().filter(|next| func.index_of(*next).is_some()) {
            leaders.insert(next);
        }
    }
    leaders
}

/// Cut `func` into basic blocks at its leaders.
pub fn basic_blocks(func: &Function, image: &Image<'_>) -> Vec<BasicBlock> {
    let leaders = block_leaders(func, image);
    let mut blocks: Vec<BasicBlock> = Vec::new();

    for insn in &func.insns {
        match blocks.last_mut() {
            Some(block) if !leaders.contains(&insn.addr) => {
                block.last_insn = insn.addr;
                block.num_insns += 1;
            }
            _ => blocks.push(BasicBlock { first_insn: insn.addr, last_insn: insn.addr, num_insns: 1 }),
        }
    }
    blocks
}

/// Group blocks across all functions by the SHA-1 of their instruction bytes.
pub fn block_hashes(
    functions: &BTreeMap<u64, Function>,
    blocks: &BTreeMap<u64, Vec<BasicBlock>>,
) -> BTreeMap<String, Vec<u64>> {
    let mut hashes: BTreeMap<String, Vec<u64>> = BTreeMap::new();
    for (start, func_blocks) in blocks {
        let Some(func) = functions.get(start) else {
            continue;
        };
        for block in func_blocks {
            let mut hasher = Sha1::new();
            func.insns
                .iter()
                .filter(|i| i.addr >= block.first_insn && i.addr <= block.last_insn)
                .for_each(|i| hasher.update(&i.opcode.bytes));
            hashes.entry(format!("{:x}", hasher.finalize())).or_default().push(block.first_insn);
        }
    }
    hashes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Instruction, ObjectHeader, Operand};

    fn at(addr: u64, mnem: &str, s_ops: Vec<Operand>) -> Instruction {
        Instruction::new(addr, addr, mnem, None, s_ops, vec![0x90, 0x90])
    }

    fn loop_function() -> Function {
        let insns = vec![
            at(0x10, "push", Vec::new()),
            at(0x12, "dec", Vec::new()),
            at(0x14, "jcc", vec![Operand::Relative(0x12)]),
            at(0x16, "pop", Vec::new()),
            at(0x18, "ret", Vec::new()),
        ];
        Function::from_insns("f", insns).expect("non-empty")
    }

    #[test]
    fn blocks_cut_at_targets_and_after_exec() {
        let header = ObjectHeader::raw(0, 32);
        let image = Image::new(&[], &header);
        let func = loop_function();
        let blocks = basic_blocks(&func, &image);
        let firsts: Vec<u64> = blocks.iter().map(|b| b.first_insn).collect();
        assert_eq!(firsts, vec![0x10, 0x12, 0x16]);
        assert_eq!(blocks[1], BasicBlock { first_insn: 0x12, last_insn: 0x14, num_insns: 2 });
        let total: u64 = blocks.iter().map(|b| b.num_insns).sum();
        assert_eq!(total as usize, func.insns.len());
    }

    #[test]
    fn identical_blocks_share_a_hash() {
        let header = ObjectHeader::raw(0, 32);
        let image = Image::new(&[], &header);
        let a = Function::from_insns("a", vec![at(0, "ret", Vec::new())]).expect("non-empty");
        let b = Function::from_insns("b", vec![at(8, "ret", Vec::new())]).expect("non-empty");
        let mut functions = BTreeMap::new();
        let mut blocks = BTreeMap::new();
        for f in [a, b] {
            blocks.insert(f.start, basic_blocks(&f, &image));
            functions.insert(f.start, f);
        }
        let hashes = block_hashes(&functions, &blocks);
        assert_eq!(hashes.len(), 1);
        assert_eq!(hashes.values().next(), Some(&vec![0, 8]));
    }
}
