use std::collections::BTreeMap;

use super::{resolve_target_operand, Image};
use crate::model::{CallGraph, Function};

/// Call graph over function starts: f -> g whenever f calls g's start.
pub fn call_graph(functions: &BTreeMap<u64, Function>, image: &Image<'_>) -> CallGraph {
    let mut cg = CallGraph::default();
    for (start, func) in functions {
        cg.graph.add_node(*start);
        for (idx, insn) in func.insns.iter().enumerate().filter(|(_, i)| i.is_call()) {
            let Some(target) = resolve_target_operand(insn, &func.insns[..idx], image) else {
                continue;
            };
            if functions.contains_key(&target) {
                cg.graph.add_edge(*start, target);
            }
        }
    }
    cg
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Instruction, ObjectHeader, Operand};

    #[test]
    fn direct_call_becomes_edge() {
        let header = ObjectHeader::raw(0, 32);
        let image = Image::new(&[], &header);
        let f = Function::from_insns(
            "F",
            vec![
                Instruction::new(0x1000, 0, "call", None, vec![Operand::Relative(0x1100)], vec![0xe8; 5]),
                Instruction::new(0x1005, 5, "call", None, vec![Operand::Relative(0x9000)], vec![0xe8; 5]),
                Instruction::new(0x100a, 10, "ret", None, Vec::new(), vec![0xc3]),
            ],
        )
        .expect("non-empty");
        let g = Function::from_insns(
            "G",
            vec![Instruction::new(0x1100, 0x100, "ret", None, Vec::new(), vec![0xc3])],
        )
        .expect("non-empty");
        let functions = BTreeMap::from([(f.start, f), (g.start, g)]);
        let cg = call_graph(&functions, &image);
        assert_eq!(cg.graph.nodes().collect::<Vec<_>>(), vec![0x1000, 0x1100]);
        assert_eq!(cg.graph.edges().collect::<Vec<_>>(), vec![(0x1000, 0x1100)]);
    }
}
