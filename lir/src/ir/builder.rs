use alloc::{string::String, vec::Vec};

use cranelift_entity::{EntityRef, PrimaryMap};
use smallvec::{smallvec, SmallVec};

use super::{
    block::{Block, BlockData},
    cfg,
    dominance::DominatorTree,
    function::Function,
    insn::{InstKind, Instruction, OperandAccess},
    loops::LoopForest,
    operand::{Operand, StackSlot, StorageKind, Variable},
};

/// Structural problems detected when sealing a function.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum BuildError {
    #[error("function has no blocks")]
    Empty,
    #[error("{block} has no terminator")]
    MissingTerminator { block: Block },
    #[error("{block} is not reachable from the entry")]
    Unreachable { block: Block },
}

/// Incrementally constructs a [Function].
///
/// The first created block is the entry. Instructions are appended to the
/// current block, selected with [FunctionBuilder::switch_to_block]; every
/// block must end with exactly one terminator. [FunctionBuilder::seal]
/// validates the structure, derives the CFG edges, and computes the
/// dominator tree and loop forest.
///
/// Misuse such as appending past a terminator or building without a
/// current block is a programming error and panics.
pub struct FunctionBuilder {
    name: String,
    blocks: PrimaryMap<Block, BlockData>,
    vars: PrimaryMap<Variable, StorageKind>,
    stack_slots: PrimaryMap<StackSlot, StorageKind>,
    current: Option<Block>,
}

impl FunctionBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            blocks: PrimaryMap::new(),
            vars: PrimaryMap::new(),
            stack_slots: PrimaryMap::new(),
            current: None,
        }
    }

    pub fn declare_var(&mut self, kind: StorageKind) -> Variable {
        self.vars.push(kind)
    }

    pub fn create_stack_slot(&mut self, kind: StorageKind) -> StackSlot {
        self.stack_slots.push(kind)
    }

    /// The operand naming `var`, tagged with its declared storage kind.
    pub fn operand(&self, var: Variable) -> Operand {
        Operand::Var(var, self.vars[var])
    }

    pub fn stack_operand(&self, slot: StackSlot) -> Operand {
        Operand::Stack(slot, self.stack_slots[slot])
    }

    /// Create an empty block. The block starts with its label already in
    /// place.
    pub fn create_block(&mut self) -> Block {
        let mut data = BlockData::default();
        data.insts.push(Instruction::new(InstKind::Label { incoming: Vec::new() }, []));
        self.blocks.push(data)
    }

    pub fn switch_to_block(&mut self, block: Block) {
        self.current = Some(block);
    }

    /// Mark `operand` as defined on entry by attaching a definition to the
    /// entry block's label. Anything live into the function body must be
    /// declared this way, or liveness analysis will reject the function.
    pub fn declare_param(&mut self, operand: Operand) {
        let entry = self
            .blocks
            .keys()
            .next()
            .expect("declare the entry block before parameters");
        self.blocks[entry].insts[0].push_access(OperandAccess::def(operand));
    }

    fn push_inst(&mut self, inst: Instruction) {
        let block = self.current.expect("no current block, call switch_to_block first");
        let data = &mut self.blocks[block];
        let last = data.insts.last().expect("created blocks always hold their label");
        assert!(!last.is_terminator(), "{block} is already terminated");
        data.insts.push(inst);
    }

    pub fn op(&mut self, accesses: impl IntoIterator<Item = OperandAccess>) {
        self.push_inst(Instruction::new(InstKind::Op, accesses));
    }

    pub fn jump(&mut self, target: Block) {
        self.push_inst(Instruction::new(
            InstKind::Jump { target, outgoing: Vec::new() },
            [],
        ));
    }

    /// A two-way branch. The destinations must differ; a branch with one
    /// destination is a jump.
    pub fn branch(
        &mut self,
        then_dest: Block,
        else_dest: Block,
        accesses: impl IntoIterator<Item = OperandAccess>,
    ) {
        assert!(then_dest != else_dest, "branch destinations must differ");
        self.push_inst(Instruction::new(
            InstKind::Branch { then_dest, else_dest, outgoing: Vec::new() },
            accesses,
        ));
    }

    pub fn ret(&mut self, accesses: impl IntoIterator<Item = OperandAccess>) {
        self.push_inst(Instruction::new(InstKind::Ret { outgoing: Vec::new() }, accesses));
    }

    /// Validate the function, derive its CFG edges, and compute the
    /// dominator tree and loop forest. The linear order is initialized to
    /// reverse postorder.
    pub fn seal(self) -> Result<Function, BuildError> {
        let Self { name, mut blocks, vars, stack_slots, .. } = self;

        let entry = blocks.keys().next().ok_or(BuildError::Empty)?;

        for (block, data) in blocks.iter() {
            let terminated = data.insts.last().is_some_and(Instruction::is_terminator);
            if !terminated {
                return Err(BuildError::MissingTerminator { block });
            }
        }

        // Derive edges from the terminators. Iterating blocks in index
        // order keeps predecessor lists sorted ascending.
        let keys: Vec<Block> = blocks.keys().collect();
        for &block in keys.iter() {
            let succs: SmallVec<[Block; 2]> =
                match &blocks[block].insts.last().expect("checked above").kind {
                    InstKind::Jump { target, .. } => smallvec![*target],
                    InstKind::Branch { then_dest, else_dest, .. } => {
                        smallvec![*then_dest, *else_dest]
                    }
                    InstKind::Ret { .. } => SmallVec::new(),
                    kind => unreachable!("{block} ends in non-terminator {kind:?}"),
                };
            for &succ in succs.iter() {
                blocks[succ].preds.push(block);
            }
            blocks[block].succs = succs;
        }

        let mut func = Function {
            name,
            blocks,
            entry,
            vars,
            stack_slots,
            linear_order: Vec::new(),
            domtree: DominatorTree::default(),
            loops: LoopForest::default(),
        };

        let po = cfg::postorder(&func);
        if po.len() != func.num_blocks() {
            let mut reachable = alloc::vec![false; func.num_blocks()];
            for &block in po.iter() {
                reachable[block.index()] = true;
            }
            let block = func
                .blocks()
                .find(|b| !reachable[b.index()])
                .expect("some block is missing from the postorder");
            return Err(BuildError::Unreachable { block });
        }

        let mut rpo = po;
        rpo.reverse();
        func.linear_order = rpo;
        func.domtree = DominatorTree::compute(&func);
        func.loops = LoopForest::compute(&func);
        Ok(func)
    }
}

#[cfg(test)]
mod tests {
    use alloc::string::ToString;

    use pretty_assertions::assert_eq;

    use super::*;
    use crate::ir::AccessMode;

    #[test]
    fn straight_line() {
        let mut fb = FunctionBuilder::new("straight");
        let v0 = fb.declare_var(StorageKind::Word32);
        let b0 = fb.create_block();
        let b1 = fb.create_block();
        fb.declare_param(fb.operand(v0));
        fb.switch_to_block(b0);
        fb.jump(b1);
        fb.switch_to_block(b1);
        fb.ret([OperandAccess::use_of(fb.operand(v0))]);
        let func = fb.seal().unwrap();

        assert_eq!(func.entry(), b0);
        assert_eq!(func.num_blocks(), 2);
        assert_eq!(func.succs(b0), &[b1]);
        assert_eq!(func.preds(b1), &[b0]);
        assert_eq!(func.linear_order(), &[b0, b1]);

        let label = func.label(b0);
        assert!(label.is_label());
        assert_eq!(label.accesses().len(), 1);
        assert_eq!(label.accesses()[0].mode, AccessMode::Def);

        assert!(func.terminator(b1).is_terminator());
    }

    #[test]
    fn branch_wires_both_edges() {
        let mut fb = FunctionBuilder::new("branches");
        let b0 = fb.create_block();
        let b1 = fb.create_block();
        let b2 = fb.create_block();
        fb.switch_to_block(b0);
        fb.branch(b1, b2, []);
        fb.switch_to_block(b1);
        fb.ret([]);
        fb.switch_to_block(b2);
        fb.ret([]);
        let func = fb.seal().unwrap();

        assert_eq!(func.succs(b0), &[b1, b2]);
        assert_eq!(func.preds(b1), &[b0]);
        assert_eq!(func.preds(b2), &[b0]);
    }

    #[test]
    fn empty_function_is_rejected() {
        let fb = FunctionBuilder::new("empty");
        assert_eq!(fb.seal().unwrap_err(), BuildError::Empty);
    }

    #[test]
    fn missing_terminator_is_rejected() {
        let mut fb = FunctionBuilder::new("unterminated");
        let b0 = fb.create_block();
        fb.switch_to_block(b0);
        fb.op([]);
        assert_eq!(fb.seal().unwrap_err(), BuildError::MissingTerminator { block: b0 });
    }

    #[test]
    fn unreachable_block_is_rejected() {
        let mut fb = FunctionBuilder::new("island");
        let b0 = fb.create_block();
        let b1 = fb.create_block();
        fb.switch_to_block(b0);
        fb.ret([]);
        fb.switch_to_block(b1);
        fb.ret([]);
        assert_eq!(fb.seal().unwrap_err(), BuildError::Unreachable { block: b1 });
    }

    #[test]
    #[should_panic(expected = "already terminated")]
    fn appending_past_a_terminator_panics() {
        let mut fb = FunctionBuilder::new("overrun");
        let b0 = fb.create_block();
        fb.switch_to_block(b0);
        fb.ret([]);
        fb.op([]);
    }

    #[test]
    fn display_smoke() {
        let mut fb = FunctionBuilder::new("show");
        let v0 = fb.declare_var(StorageKind::Word64);
        let b0 = fb.create_block();
        fb.declare_param(fb.operand(v0));
        fb.switch_to_block(b0);
        fb.ret([OperandAccess::use_of(fb.operand(v0))]);
        let func = fb.seal().unwrap();

        let text = func.to_string();
        assert!(text.contains("function show"));
        assert!(text.contains("block0:"));
        assert!(text.contains("def v0:w64"));
        assert!(text.contains("ret"));
    }
}
