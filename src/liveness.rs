//! Liveness analysis: the backward dataflow fixed point that feeds the
//! interference graph, per spec §4.5.
//!
//! `liveOut(B) = ⋃ liveIn(S)` over B's successors `S`
//! `liveIn(B) = read(B) ∪ (liveOut(B) − written(B))`
//!
//! Iterated to a fixed point in reverse postorder-ish repetition (here, just
//! repeated passes over all blocks until nothing changes — the CFGs this
//! crate deals with are small enough that worklist bookkeeping isn't worth
//! its own complexity).

use indexmap::IndexSet;

use crate::cfg::{self, EXIT};
use crate::function::Function;
use crate::vreg::VarId;

/// Recomputes `read`/`written`/`live_in`/`live_out` on every block of
/// `function`, iterating to a fixed point.
pub fn compute(function: &mut Function) {
    for block in &mut function.blocks {
        block.cache_read_written();
    }

    let graph = cfg::make_cfg(function);
    let successors: Vec<Vec<crate::block::BlockId>> = function
        .blocks
        .iter()
        .map(|b| graph.neighbors(&b.id).copied().filter(|&n| n != EXIT).collect())
        .collect();

    loop {
        let mut changed = false;
        for (i, block) in function.blocks.iter_mut().enumerate() {
            let mut live_out: IndexSet<VarId> = IndexSet::new();
            for succ in &successors[i] {
                if let Some(succ_block) = function.blocks.iter().find(|b| b.id == *succ) {
                    live_out.extend(succ_block.live_in.iter().copied());
                }
            }
            let mut live_in = block.read.clone();
            for var in &block.live_out {
                if !block.written.contains(var) {
                    live_in.insert(*var);
                }
            }

            if live_out != block.live_out || live_in != block.live_in {
                changed = true;
            }
            block.live_out = live_out;
            block.live_in = live_in;
        }
        if !changed {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::{BasicBlock, BlockId};
    use crate::instruction::{AluOp, Instruction};
    use crate::vreg::Reg;

    fn v(n: u32) -> Reg {
        Reg::Virtual(VarId(n))
    }

    #[test]
    fn variable_defined_before_loop_and_used_after_stays_live_through_it() {
        // entry: %0 = 1; loop: %1 = %0 + %1 (self-loop then falls to exit); tail: return %1
        let mut entry = BasicBlock::new(BlockId(0), "entry");
        entry.push(Instruction::SetI { dest: v(0), imm: 1i64.into() });
        entry.successors = vec![BlockId(1)];

        let mut body = BasicBlock::new(BlockId(1), "loop");
        body.push(Instruction::RType { op: AluOp::Add, left: v(0), right: v(1), dest: v(1) });
        body.successors = vec![BlockId(2)];

        let mut tail = BasicBlock::new(BlockId(2), "tail");
        tail.push(Instruction::Move { src: v(1), dest: v(1) });

        let mut function = Function::from_blocks("f", vec![entry, body, tail]);
        compute(&mut function);

        assert!(function.blocks[1].live_in.contains(&VarId(0)));
        assert!(function.blocks[1].live_out.contains(&VarId(0)));
    }

    #[test]
    fn dead_store_never_read_does_not_appear_live_out() {
        let mut only = BasicBlock::new(BlockId(0), "entry");
        only.push(Instruction::SetI { dest: v(0), imm: 1i64.into() });
        let mut function = Function::from_blocks("f", vec![only]);
        compute(&mut function);
        assert!(function.blocks[0].live_out.is_empty());
    }
}
