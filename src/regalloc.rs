//! The coloring register allocator, per spec §4.6.
//!
//! Runs build-interference / color / spill-and-retry to a fixed point:
//! build an undirected interference graph from per-block liveness, try to
//! greedily color it within the general-purpose register budget, and if that
//! fails, spill the most-live uncolored variable to the stack and try again.
//! `DEFAULT_MAX_ATTEMPTS` bounds the retry loop so a pathological function
//! fails loudly instead of looping forever.

use indexmap::{IndexMap, IndexSet};
use tracing::{debug, instrument, warn};

use crate::block::BlockId;
use crate::error::{Error, Result};
use crate::function::Function;
use crate::graph::Graph;
use crate::instruction::Instruction;
use crate::liveness;
use crate::types::Type;
use crate::vreg::{Reg, VarId};
use crate::why;

pub const DEFAULT_MAX_ATTEMPTS: u32 = 64;

/// Overridable ceilings for the allocator's retry loop. Exists so a caller
/// (tests, or a future `--max-spill-attempts` flag) can shrink the ceiling
/// instead of waiting out the default on a function known to be uncolorable.
#[derive(Copy, Clone, Debug)]
pub struct AllocatorLimits {
    pub max_attempts: u32,
}

impl Default for AllocatorLimits {
    fn default() -> Self {
        Self { max_attempts: DEFAULT_MAX_ATTEMPTS }
    }
}

/// Outcome of a single build-color-or-spill attempt.
enum AttemptResult {
    Success,
    Spilled,
    /// No uncolorable variable was left to spill; the function cannot be
    /// made to fit the register budget no matter how it's rewritten.
    NotSpilled,
}

/// Runs the allocator to completion, rewriting `function`'s blocks in place
/// to use only physical registers. Returns the number of spills performed.
#[instrument(skip(function), fields(name = %function.name))]
pub fn allocate(function: &mut Function, limits: AllocatorLimits) -> Result<u32> {
    liveness::compute(function);
    let mut tried: IndexSet<VarId> = IndexSet::new();
    let mut spills = 0u32;

    for attempt_no in 0..limits.max_attempts {
        match attempt(function, &mut tried)? {
            AttemptResult::Success => {
                debug!(spills, attempts = attempt_no + 1, "allocation converged");
                return Ok(spills);
            }
            AttemptResult::Spilled => {
                spills += 1;
                liveness::compute(function);
            }
            AttemptResult::NotSpilled => {
                warn!("no further spill candidate; allocation cannot converge");
                return Err(Error::AllocationFailed { attempts: attempt_no + 1 });
            }
        }
    }
    Err(Error::AllocationFailed { attempts: limits.max_attempts })
}

fn attempt(function: &mut Function, tried: &mut IndexSet<VarId>) -> Result<AttemptResult> {
    let graph = build_interference(function);
    let (lo, hi) = why::allocatable_range();
    let limit = (hi - lo + 1) as usize;

    match graph.color(limit, &IndexMap::new()) {
        Ok(colors) => {
            apply_coloring(function, &colors, lo);
            Ok(AttemptResult::Success)
        }
        Err(Error::Uncolorable { .. }) => match select_most_live(function, &graph, tried) {
            Some(candidate) => {
                tried.insert(candidate);
                debug!(candidate = ?candidate, "spilling");
                spill(function, candidate);
                split_blocks(function);
                Ok(AttemptResult::Spilled)
            }
            None => Ok(AttemptResult::NotSpilled),
        },
        Err(other) => Err(other),
    }
}

/// Builds the interference graph: one node per variable that appears in some
/// block's liveness/def/use sets, an edge between every pair simultaneously
/// in a block's `S(B) = liveIn(B) ∪ liveOut(B) ∪ read(B) ∪ written(B)`.
fn build_interference(function: &Function) -> Graph<VarId> {
    let mut graph = Graph::new();
    for block in &function.blocks {
        let mut present: IndexSet<VarId> = IndexSet::new();
        present.extend(block.live_in.iter().copied());
        present.extend(block.live_out.iter().copied());
        present.extend(block.read.iter().copied());
        present.extend(block.written.iter().copied());

        let members: Vec<VarId> = present.into_iter().collect();
        for &id in &members {
            graph.add_node(id);
        }
        for i in 0..members.len() {
            for j in (i + 1)..members.len() {
                graph.add_edge(members[i], members[j]);
            }
        }
    }
    graph
}

/// Picks the uncolorable variable with the largest total `|liveIn|+|liveOut|`
/// weight across the blocks it appears live in, skipping anything already in
/// `tried` or flagged [`crate::vreg::Variable::no_spill`]. Ties favor the
/// lowest [`VarId`], so the choice is deterministic. This is the only spill
/// heuristic implemented; the original sketches several alternatives but
/// treats none of them as normative, so only this one is built here (an
/// Open Question decision, recorded in DESIGN.md).
fn select_most_live(function: &Function, graph: &Graph<VarId>, tried: &IndexSet<VarId>) -> Option<VarId> {
    let mut best: Option<(VarId, usize)> = None;
    for &id in graph.nodes() {
        if tried.contains(&id) {
            continue;
        }
        if function.variable_table.get(&id).map(|v| v.no_spill).unwrap_or(false) {
            continue;
        }
        let score: usize = function
            .blocks
            .iter()
            .map(|b| b.live_in.contains(&id) as usize + b.live_out.contains(&id) as usize)
            .sum();
        best = match best {
            None => Some((id, score)),
            Some((_, best_score)) if score > best_score => Some((id, score)),
            Some((best_id, best_score)) if score == best_score && id.0 < best_id.0 => Some((id, score)),
            other => other,
        };
    }
    best.map(|(id, _)| id)
}

/// Rewrites every occurrence of `var_id` across every block: a `StackLoad`
/// before each instruction that reads it, a `StackStore` after each
/// instruction that writes it, each substitution using its own fresh vreg.
/// An instruction that both reads and writes `var_id` (an in-place op, e.g.
/// `SignExtend`) shares a single fresh vreg between its load and store, since
/// the field it occupies is the same storage slot before and after.
fn spill(function: &mut Function, var_id: VarId) {
    let ty = function.variable_table.get(&var_id).map(|v| v.ty.clone()).unwrap_or_else(Type::s64);
    let offset = function.stack_usage;
    function.stack_usage += ty.size_of().max(1);
    let old_reg = Reg::Virtual(var_id);

    let mut touched: Vec<(usize, usize, bool, bool)> = Vec::new();
    for (bi, block) in function.blocks.iter().enumerate() {
        for (ii, instr) in block.instructions.iter().enumerate() {
            let reads = instr.can_replace_read(old_reg);
            let writes = instr.can_replace_written(old_reg);
            if reads || writes {
                touched.push((bi, ii, reads, writes));
            }
        }
    }
    if touched.is_empty() {
        return;
    }

    let fresh_regs: Vec<Reg> = touched.iter().map(|_| function.new_var(ty.clone())).collect();

    let mut by_block: IndexMap<usize, Vec<(usize, bool, bool, Reg)>> = IndexMap::new();
    for ((bi, ii, reads, writes), fresh) in touched.into_iter().zip(fresh_regs) {
        by_block.entry(bi).or_default().push((ii, reads, writes, fresh));
    }

    for (bi, mut items) in by_block {
        items.sort_by(|a, b| b.0.cmp(&a.0));
        let block = &mut function.blocks[bi];
        for (ii, reads, writes, fresh) in items {
            if reads {
                block.instructions.insert(ii, Instruction::StackLoad { dest: fresh, offset });
            }
            let instr_idx = if reads { ii + 1 } else { ii };
            if reads {
                block.instructions[instr_idx].replace_read(old_reg, fresh);
            }
            if writes {
                block.instructions[instr_idx].replace_written(old_reg, fresh);
                block.instructions.insert(instr_idx + 1, Instruction::StackStore { src: fresh, offset });
            }
        }
    }
}

/// Re-partitions each block at every inserted `StackStore`/`StackLoad` not
/// already adjacent to a block boundary, so that no block spans more than
/// one spilled live range's load-use-store window. Jump targets resolve by
/// label, so only the first segment of a split block needs to keep the
/// original label; CFG edges into the split block's interior never exist
/// because spill-rewriting never introduces a new jump target.
fn split_blocks(function: &mut Function) {
    let old_blocks = std::mem::take(&mut function.blocks);

    struct Pending {
        label: String,
        instructions: Vec<Instruction>,
        is_last_segment: bool,
        old_successors: Vec<BlockId>,
    }

    let mut pending: Vec<Pending> = Vec::new();
    let mut old_to_new_first: IndexMap<BlockId, BlockId> = IndexMap::new();

    for block in old_blocks {
        let segments = segment_instructions(block.instructions);
        old_to_new_first.insert(block.id, BlockId(pending.len()));

        let segment_count = segments.len();
        for (i, instructions) in segments.into_iter().enumerate() {
            let label = if i == 0 { block.label.clone() } else { format!("{}$split{}", block.label, i) };
            let is_last_segment = i + 1 == segment_count;
            pending.push(Pending {
                label,
                instructions,
                is_last_segment,
                old_successors: if is_last_segment { block.successors.clone() } else { Vec::new() },
            });
        }
    }

    let mut new_blocks: Vec<crate::block::BasicBlock> = pending
        .into_iter()
        .enumerate()
        .map(|(i, p)| {
            let mut block = crate::block::BasicBlock::new(BlockId(i), p.label);
            block.instructions = p.instructions;
            block.successors = if p.is_last_segment {
                p.old_successors.iter().map(|old| old_to_new_first[old]).collect()
            } else {
                vec![BlockId(i + 1)]
            };
            block
        })
        .collect();

    let preds: Vec<(BlockId, BlockId)> =
        new_blocks.iter().flat_map(|b| b.successors.iter().map(move |&s| (s, b.id))).collect();
    for (target, from) in preds {
        if let Some(block) = new_blocks.iter_mut().find(|b| b.id == target) {
            block.predecessors.push(from);
        }
    }

    function.blocks = new_blocks;
}

/// Splits after every `StackStore` and before every `StackLoad`, dropping
/// the resulting empty segments.
fn segment_instructions(instructions: Vec<Instruction>) -> Vec<Vec<Instruction>> {
    let mut segments: Vec<Vec<Instruction>> = vec![Vec::new()];
    for instr in instructions {
        let starts_new_segment = matches!(instr, Instruction::StackLoad { .. }) && !segments.last().unwrap().is_empty();
        if starts_new_segment {
            segments.push(Vec::new());
        }
        let ends_segment = matches!(instr, Instruction::StackStore { .. });
        segments.last_mut().unwrap().push(instr);
        if ends_segment {
            segments.push(Vec::new());
        }
    }
    segments.retain(|s| !s.is_empty());
    if segments.is_empty() {
        segments.push(Vec::new());
    }
    segments
}

/// Writes the chosen colors back into every instruction operand and into
/// each `Variable`'s own `reg` field.
fn apply_coloring(function: &mut Function, colors: &IndexMap<VarId, usize>, lo: u8) {
    for (&id, &color) in colors {
        let physical = Reg::Physical(lo + color as u8);
        if let Some(variable) = function.variable_table.get_mut(&id) {
            variable.reg = physical;
        }
        let virt = Reg::Virtual(id);
        for block in &mut function.blocks {
            for instr in &mut block.instructions {
                instr.replace_read(virt, physical);
                instr.replace_written(virt, physical);
            }
        }
    }
}
