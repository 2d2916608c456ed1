//! Basic blocks: straight-line instruction sequences, wired into a function's
//! control-flow graph by index rather than by pointer.
//!
//! The original implementation links blocks together with `std::weak_ptr`,
//! since a block's predecessors/successors and its owning function form a
//! reference cycle. An arena of blocks addressed by a plain index sidesteps
//! that: `BlockId` is `Copy`, never dangles, and needs no weak-reference
//! upgrade-and-check dance to follow.

use std::fmt;

use indexmap::IndexSet;

use crate::instruction::Instruction;
use crate::vreg::{Reg, VarId};

/// Index of a [`BasicBlock`] within its owning [`crate::function::Function`]'s
/// block arena.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockId(pub usize);

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "block{}", self.0)
    }
}

/// A maximal straight-line run of instructions, with no internal control
/// transfer other than its final instruction.
#[derive(Clone, Debug)]
pub struct BasicBlock {
    pub id: BlockId,
    pub label: String,
    pub instructions: Vec<Instruction>,
    pub predecessors: Vec<BlockId>,
    pub successors: Vec<BlockId>,

    /// Registers read before being written anywhere in this block.
    pub read: IndexSet<VarId>,
    /// Registers written anywhere in this block.
    pub written: IndexSet<VarId>,
    /// Live-in set, populated by [`crate::liveness::compute`].
    pub live_in: IndexSet<VarId>,
    /// Live-out set, populated by [`crate::liveness::compute`].
    pub live_out: IndexSet<VarId>,
}

impl BasicBlock {
    pub fn new(id: BlockId, label: impl Into<String>) -> Self {
        Self {
            id,
            label: label.into(),
            instructions: Vec::new(),
            predecessors: Vec::new(),
            successors: Vec::new(),
            read: IndexSet::new(),
            written: IndexSet::new(),
            live_in: IndexSet::new(),
            live_out: IndexSet::new(),
        }
    }

    pub fn push(&mut self, instr: Instruction) {
        self.instructions.push(instr);
    }

    /// The instruction that determines this block's control transfer, if the
    /// block is non-empty.
    pub fn terminator(&self) -> Option<&Instruction> {
        self.instructions.last()
    }

    /// Whether this block ends in an unconditional jump without a link bit —
    /// control never falls through to the next block in program order.
    pub fn is_terminal(&self) -> bool {
        self.terminator().map(Instruction::is_terminal).unwrap_or(false)
    }

    /// Recomputes `read`/`written` from `instructions`, per spec §4.5: a
    /// register is "read" by the block if some instruction reads it before
    /// any instruction in the block writes it.
    pub fn cache_read_written(&mut self) {
        self.read.clear();
        self.written.clear();
        for instr in &self.instructions {
            for reg in instr.read() {
                if let Reg::Virtual(id) = reg {
                    if !self.written.contains(&id) {
                        self.read.insert(id);
                    }
                }
            }
            for reg in instr.written() {
                if let Reg::Virtual(id) = reg {
                    self.written.insert(id);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instruction::{AluOp, Instruction};

    fn v(n: u32) -> Reg {
        Reg::Virtual(VarId(n))
    }

    #[test]
    fn read_excludes_registers_written_before_their_first_read() {
        let mut block = BasicBlock::new(BlockId(0), "entry");
        block.push(Instruction::Move { src: v(0), dest: v(1) });
        block.push(Instruction::RType { op: AluOp::Add, left: v(1), right: v(1), dest: v(1) });
        block.cache_read_written();
        assert!(block.read.contains(&VarId(0)));
        assert!(!block.read.contains(&VarId(1)));
        assert!(block.written.contains(&VarId(1)));
    }

    #[test]
    fn terminal_block_ends_in_unconditional_jump() {
        let mut block = BasicBlock::new(BlockId(0), "entry");
        block.push(Instruction::Jump { target: "end".into(), link: false });
        assert!(block.is_terminal());
    }
}
