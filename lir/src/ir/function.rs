use core::fmt;

use alloc::{string::String, vec::Vec};

use cranelift_entity::{EntityRef, PrimaryMap};

use super::{
    block::{Block, BlockData},
    dominance::DominatorTree,
    insn::Instruction,
    loops::LoopForest,
    operand::{StackSlot, StorageKind, Variable},
};

/// A function in LIR form, sealed and ready for analysis.
///
/// Sealing establishes the properties every pass in this crate relies on:
/// each block starts with a label and ends with a terminator, every block
/// is reachable from the entry, the predecessor and successor lists agree
/// with the terminators, and the dominator tree and loop forest have been
/// computed. The linear order is initialized to reverse postorder and can
/// be replaced by a scheduler via [Function::set_linear_order].
#[derive(Debug)]
pub struct Function {
    pub(crate) name: String,
    pub(crate) blocks: PrimaryMap<Block, BlockData>,
    pub(crate) entry: Block,
    pub(crate) vars: PrimaryMap<Variable, StorageKind>,
    pub(crate) stack_slots: PrimaryMap<StackSlot, StorageKind>,
    pub(crate) linear_order: Vec<Block>,
    pub(crate) domtree: DominatorTree,
    pub(crate) loops: LoopForest,
}

impl Function {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn entry(&self) -> Block {
        self.entry
    }

    pub fn num_blocks(&self) -> usize {
        self.blocks.len()
    }

    /// All blocks, in creation order.
    pub fn blocks(&self) -> impl Iterator<Item = Block> + '_ {
        self.blocks.keys()
    }

    pub fn block(&self, block: Block) -> &BlockData {
        &self.blocks[block]
    }

    pub fn preds(&self, block: Block) -> &[Block] {
        &self.blocks[block].preds
    }

    pub fn succs(&self, block: Block) -> &[Block] {
        &self.blocks[block].succs
    }

    /// The leading label of `block`.
    pub fn label(&self, block: Block) -> &Instruction {
        &self.blocks[block].insts[0]
    }

    pub fn label_mut(&mut self, block: Block) -> &mut Instruction {
        &mut self.blocks[block].insts[0]
    }

    /// The trailing terminator of `block`.
    pub fn terminator(&self, block: Block) -> &Instruction {
        self.blocks[block]
            .insts
            .last()
            .expect("sealed blocks are never empty")
    }

    pub fn terminator_mut(&mut self, block: Block) -> &mut Instruction {
        self.blocks[block]
            .insts
            .last_mut()
            .expect("sealed blocks are never empty")
    }

    pub fn num_variables(&self) -> usize {
        self.vars.len()
    }

    pub fn var_kind(&self, var: Variable) -> StorageKind {
        self.vars[var]
    }

    pub fn num_stack_slots(&self) -> usize {
        self.stack_slots.len()
    }

    pub fn stack_slot_kind(&self, slot: StackSlot) -> StorageKind {
        self.stack_slots[slot]
    }

    /// The block schedule used by the global liveness solver.
    ///
    /// Defaults to reverse postorder from the entry. The solver walks this
    /// order reversed, so placing loop bodies after their headers here is
    /// what makes the backward sweeps converge quickly.
    pub fn linear_order(&self) -> &[Block] {
        &self.linear_order
    }

    /// Replace the block schedule.
    ///
    /// The new order must be a permutation of the function's blocks.
    pub fn set_linear_order(&mut self, order: Vec<Block>) {
        debug_assert_eq!(order.len(), self.blocks.len(), "schedule must cover every block");
        #[cfg(debug_assertions)]
        {
            let mut seen = alloc::vec![false; self.blocks.len()];
            for block in order.iter() {
                assert!(
                    !core::mem::replace(&mut seen[block.index()], true),
                    "{block} appears twice in the schedule"
                );
            }
        }
        self.linear_order = order;
    }

    pub fn domtree(&self) -> &DominatorTree {
        &self.domtree
    }

    pub fn loops(&self) -> &LoopForest {
        &self.loops
    }
}

impl fmt::Display for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "function {} {{", self.name)?;
        for (i, block) in self.linear_order.iter().copied().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            let data = &self.blocks[block];
            write!(f, "{block}:")?;
            if !data.preds.is_empty() {
                write!(f, " ; preds:")?;
                for pred in data.preds.iter() {
                    write!(f, " {pred}")?;
                }
            }
            writeln!(f)?;
            for inst in data.insts.iter() {
                writeln!(f, "    {inst}")?;
            }
        }
        f.write_str("}")
    }
}
