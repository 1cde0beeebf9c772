mod block;
mod builder;
pub mod cfg;
mod dominance;
mod function;
mod insn;
mod loops;
mod operand;

pub use self::{
    block::{Block, BlockData},
    builder::{BuildError, FunctionBuilder},
    dominance::DominatorTree,
    function::Function,
    insn::{AccessFlags, AccessMode, InstKind, Instruction, OperandAccess, OperandConsumer},
    loops::{LoopData, LoopForest, LoopId},
    operand::{Operand, PhysReg, StackSlot, StorageKind, Variable},
};
