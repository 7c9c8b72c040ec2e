use super::{basic_blocks, block_leaders, resolve_target_operand, Image};
use crate::model::{Function, Graph};

/// Control-flow graph over the block leaders of `func`.
///
/// Only blocks ending in an exec instruction get edges: one to their
/// in-function target and, unless they end in `ret`/`retn`/`jmp`, one to the
/// next block. Every leader is a node. Returns `None` when the function has no
/// intra-function edges.
pub fn control_flow_graph(func: &Function, image: &Image<'_>) -> Option<Graph> {
    let leaders = block_leaders(func, image);
    let mut graph = Graph::new();
    for leader in &leaders {
        graph.add_node(*leader);
    }

    for block in basic_blocks(func, image) {
        let Some(idx) = func.index_of(block.last_insn) else {
            continue;
        };
        let last = &func.insns[idx];
        if !last.is_exec() {
            continue;
        }

        if let Some(target) = resolve_target_operand(last, &func.insns[..idx], image) {
            if leaders.contains(&target) {
                graph.add_edge(block.first_insn, target);
            }
        }
        if let Some(next) = last.end().filter(|next| !last.ends_flow() && leaders.contains(next)) {
            graph.add_edge(block.first_insn, next);
        }
    }

    (graph.edge_count() > 0).then_some(graph)
}
