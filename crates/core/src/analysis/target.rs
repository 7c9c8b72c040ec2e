use super::Image;
use crate::model::{Instruction, Operand};

/// Destination of an exec instruction, if one can be determined statically.
///
/// `preceding` holds the instructions before `insn` in the same function, in
/// address order. Register operands are resolved through the latest `mov`
/// into that register; this is best-effort and ignores other definitions.
pub fn resolve_target_operand(
    insn: &Instruction,
    preceding: &[Instruction],
    image: &Image<'_>,
) -> Option<u64> {
    let operand = insn.s_ops.first().or(insn.d_op.as_ref())?;
    match operand {
        Operand::Offset(addr) => image.read_pointer(*addr),
        Operand::Relative(addr) => Some(*addr),
        Operand::Immediate(imm) => u64::try_from(*imm).ok(),
        Operand::SegmentOffset { offset, .. } => Some(*offset),
        Operand::EffectiveAddress { base, index, disp, .. } => {
            let rip_relative = matches!(base.as_deref(), Some("rip" | "eip"));
            if index.is_some() || (base.is_some() && !rip_relative) {
                return None;
            }
            let slot = if rip_relative {
                insn.end()?.checked_add_signed(*disp)?
            } else {
                u64::try_from(*disp).ok()?
            };
            image.read_pointer(slot)
        }
        Operand::Register(reg) => register_value(reg, preceding),
    }
}

fn register_value(reg: &str, preceding: &[Instruction]) -> Option<u64> {
    let def = preceding.iter().rev().find(|i| {
        i.mnem == "mov" && matches!(&i.d_op, Some(Operand::Register(r)) if r == reg)
    })?;
    match def.s_ops.first()? {
        Operand::Immediate(imm) => u64::try_from(*imm).ok(),
        Operand::Offset(addr) | Operand::Relative(addr) => Some(*addr),
        Operand::EffectiveAddress { disp, .. } => u64::try_from(*disp).ok(),
        _ => None,
    }
}
