use core::fmt;

use alloc::vec::Vec;

use cranelift_entity::entity_impl;
use smallvec::SmallVec;

use super::insn::Instruction;

/// A handle to a basic block of a [super::Function].
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Block(u32);
entity_impl!(Block, "block");

/// The contents of a basic block.
///
/// A sealed block always holds a leading label, zero or more `Op`
/// instructions, and a trailing terminator. The predecessor and successor
/// lists are derived from the terminators at seal time and are ordered: the
/// successors of a `Branch` are `[then_dest, else_dest]`, and predecessors
/// appear in ascending block index order.
#[derive(Default)]
pub struct BlockData {
    pub(crate) insts: Vec<Instruction>,
    pub(crate) preds: SmallVec<[Block; 2]>,
    pub(crate) succs: SmallVec<[Block; 2]>,
}

impl BlockData {
    pub fn insts(&self) -> &[Instruction] {
        &self.insts
    }

    pub fn preds(&self) -> &[Block] {
        &self.preds
    }

    pub fn succs(&self) -> &[Block] {
        &self.succs
    }
}

impl fmt::Debug for BlockData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BlockData")
            .field("insts", &self.insts.len())
            .field("preds", &self.preds)
            .field("succs", &self.succs)
            .finish()
    }
}
