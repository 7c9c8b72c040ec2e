use std::collections::{BTreeMap, BTreeSet};

use super::{resolve_target_operand, Image};
use crate::model::{Function, Instruction};

/// Zero bytes after a terminator that end a function.
pub const ZERO_GAP: usize = 32;

/// How far back the call-target pass looks for register definitions.
const CALL_SCAN_WINDOW: usize = 16;

/// Partition a linear disassembly into functions keyed by start address.
///
/// Call targets and header entry points start new functions, as does any
/// break in address contiguity. A terminator followed by a zero gap ends the
/// current function. Padding is trimmed from both ends; unreached functions
/// holding invalid instructions or nothing but terminators are dropped.
pub fn extract_functions<'a, I>(insns: I, image: &Image<'_>) -> BTreeMap<u64, Function>
where
    I: IntoIterator<Item = &'a Instruction>,
{
    let mut stream: Vec<Instruction> = insns.into_iter().cloned().collect();
    stream.sort_by_key(|i| i.addr);

    let mut starts: BTreeSet<u64> = image.header.entries.clone();
    let mut called = BTreeSet::new();
    for (idx, insn) in stream.iter().enumerate().filter(|(_, i)| i.is_call()) {
        let window = &stream[idx.saturating_sub(CALL_SCAN_WINDOW)..idx];
        if let Some(target) = resolve_target_operand(insn, window, image) {
            called.insert(target);
        }
    }
    starts.extend(called.iter().copied());

    let mut functions = BTreeMap::new();
    let mut current: Vec<Instruction> = Vec::new();
    let mut skipping_zeros = false;

    for insn in stream {
        if skipping_zeros {
            if insn.opcode.bytes.iter().all(|b| *b == 0) && !starts.contains(&insn.addr) {
                continue;
            }
            skipping_zeros = false;
        }

        let breaks_run = current
            .last()
            .is_some_and(|prev| prev.end() != Some(insn.addr) || starts.contains(&insn.addr));
        if breaks_run {
            finish(&mut functions, std::mem::take(&mut current), &starts, image);
        }

        let ends_here = insn.is_terminator()
            && image.zero_run_at(insn.offset.saturating_add(u64::from(insn.len)), ZERO_GAP);
        current.push(insn);
        if ends_here {
            finish(&mut functions, std::mem::take(&mut current), &starts, image);
            skipping_zeros = true;
        }
    }
    finish(&mut functions, current, &starts, image);
    functions
}

fn finish(
    functions: &mut BTreeMap<u64, Function>,
    mut run: Vec<Instruction>,
    starts: &BTreeSet<u64>,
    image: &Image<'_>,
) {
    let lead = run.iter().take_while(|i| i.is_padding()).count();
    run.drain(..lead);
    while run.last().is_some_and(Instruction::is_padding) {
        run.pop();
    }
    let Some(first) = run.first() else {
        return;
    };

    let reached = starts.contains(&first.addr);
    let has_invalid = run.iter().any(Instruction::is_invalid);
    let only_terminators = run.iter().all(Instruction::is_terminator);
    if !reached && (has_invalid || only_terminators) {
        return;
    }

    let name = image
        .header
        .symbol_table
        .get(&first.addr)
        .cloned()
        .unwrap_or_else(|| format!("sub_{:x}", first.addr));
    if let Some(func) = Function::from_insns(name, run) {
        functions.insert(func.start, func);
    }
}
