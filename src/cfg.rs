//! Control-flow graph construction, per spec §4.4.
//!
//! Built as a directed [`Graph`] over [`BlockId`], plus a synthetic exit
//! node every block can reach. `make_cfg` only wires edges; it assumes
//! `predecessors`/`successors` on each `BasicBlock` are already filled in
//! by the lowering pass that built the function (see `Function::finish`),
//! and layers the exit sentinel and the two fallback heuristics on top.

use indexmap::IndexMap;

use crate::block::BlockId;
use crate::function::Function;
use crate::graph::Graph;

/// Sentinel block id representing the function's single exit. Never a real
/// index into `Function::blocks`; code that walks the CFG must check for it
/// before indexing the block arena.
pub const EXIT: BlockId = BlockId(usize::MAX);

/// Builds the control-flow graph of `function`.
///
/// Steps (spec §4.4):
/// 1. Add a node for every block, plus the `EXIT` sentinel.
/// 2. Wire each block's recorded successor edges.
/// 3. A block whose only successor is itself (a self-loop, e.g. an infinite
///    `while (1) {}` with no break) additionally reaches `EXIT`, so the
///    allocator's liveness fixed point still terminates.
/// 4. If no block reaches `EXIT` by the above (e.g. every block falls
///    through in sequence with nothing marked terminal), the last block in
///    declaration order is wired to `EXIT` as a fallback.
pub fn make_cfg(function: &Function) -> Graph<BlockId> {
    let mut graph = Graph::new();
    for block in &function.blocks {
        graph.add_node(block.id);
    }
    graph.add_node(EXIT);

    for block in &function.blocks {
        for &succ in &block.successors {
            graph.add_directed_edge(block.id, succ);
        }
        if block.is_terminal() && block.successors.is_empty() {
            graph.add_directed_edge(block.id, EXIT);
        }
    }

    for block in &function.blocks {
        if block.successors == vec![block.id] {
            graph.add_directed_edge(block.id, EXIT);
        }
    }

    let reaches_exit = function.blocks.iter().any(|b| graph.neighbors(&b.id).any(|&n| n == EXIT));
    if !reaches_exit {
        if let Some(last) = function.blocks.last() {
            graph.add_directed_edge(last.id, EXIT);
        }
    }

    graph
}

/// Predecessor map derived from a built CFG, used by liveness to walk
/// backwards without recomputing `Graph::neighbors` under a different
/// direction.
pub fn predecessors(graph: &Graph<BlockId>) -> IndexMap<BlockId, Vec<BlockId>> {
    let mut preds: IndexMap<BlockId, Vec<BlockId>> = IndexMap::new();
    for &node in graph.nodes() {
        preds.entry(node).or_default();
    }
    for &node in graph.nodes() {
        for &succ in graph.neighbors(&node) {
            preds.entry(succ).or_default().push(node);
        }
    }
    preds
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::BasicBlock;
    use crate::instruction::Instruction;

    fn function_with_blocks(mut blocks: Vec<BasicBlock>) -> Function {
        for (i, block) in blocks.iter_mut().enumerate() {
            block.id = BlockId(i);
        }
        Function::from_blocks("f", blocks)
    }

    #[test]
    fn self_loop_reaches_exit() {
        let mut b0 = BasicBlock::new(BlockId(0), "loop");
        b0.push(Instruction::Jump { target: "loop".into(), link: false });
        b0.successors = vec![BlockId(0)];
        let function = function_with_blocks(vec![b0]);
        let graph = make_cfg(&function);
        assert!(graph.neighbors(&BlockId(0)).any(|&n| n == EXIT));
    }

    #[test]
    fn fallthrough_chain_falls_back_to_last_block_reaching_exit() {
        let mut b0 = BasicBlock::new(BlockId(0), "entry");
        b0.successors = vec![BlockId(1)];
        let b1 = BasicBlock::new(BlockId(1), "tail");
        let function = function_with_blocks(vec![b0, b1]);
        let graph = make_cfg(&function);
        assert!(graph.neighbors(&BlockId(1)).any(|&n| n == EXIT));
    }

    #[test]
    fn terminal_block_with_no_recorded_successor_reaches_exit() {
        let mut b0 = BasicBlock::new(BlockId(0), "entry");
        b0.push(Instruction::JumpRegister { reg: crate::vreg::Reg::Physical(4), link: false });
        let function = function_with_blocks(vec![b0]);
        let graph = make_cfg(&function);
        assert!(graph.neighbors(&BlockId(0)).any(|&n| n == EXIT));
    }
}
