use alloc::{collections::VecDeque, vec::Vec};

use bitvec::{bitvec, slice::BitSlice, vec::BitVec};
use cranelift_entity::{packed_option::PackedOption, EntityRef, SecondaryMap};
use flint_lir::{AccessFlags, Block, Function, Operand, StackSlot, Variable};

use crate::{error::AnalysisError, FxHashMap};

/// Edge state accumulated for one block.
///
/// `slots` maps each value that owns a position in `incoming` to that
/// position, whether the position currently holds the concrete value or
/// the Illegal sentinel. Recording sentinel positions is what keeps a
/// value from being threaded through the same predecessor twice.
#[derive(Clone, Default)]
struct BlockData {
    slots: FxHashMap<Operand, usize>,
    incoming: Vec<Operand>,
    outgoing: Vec<Operand>,
}

/// Definition sites and edge lists built up lazily, one access at a time.
///
/// Unlike the liveness-driven builder, nothing is precomputed: the caller
/// announces definitions with [`SsiValueMap::define_operand`] and reads
/// with [`SsiValueMap::access_operand`], and each read threads the value
/// backward from the reading block to its definition, growing the
/// outgoing and incoming lists of every edge it crosses in lockstep.
#[derive(Default)]
pub struct SsiValueMap {
    var_defs: SecondaryMap<Variable, PackedOption<Block>>,
    slot_defs: SecondaryMap<StackSlot, PackedOption<Block>>,
    blocks: SecondaryMap<Block, BlockData>,
}

impl SsiValueMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// The block recorded as defining `value`, if any.
    pub fn def_block(&self, value: Operand) -> Option<Block> {
        match value {
            Operand::Var(var, _) => self.var_defs[var].expand(),
            Operand::Stack(slot, _) => self.slot_defs[slot].expand(),
            _ => None,
        }
    }

    /// The incoming list accumulated for `block` so far.
    pub fn incoming(&self, block: Block) -> &[Operand] {
        &self.blocks[block].incoming
    }

    /// The outgoing list accumulated for `block` so far.
    pub fn outgoing(&self, block: Block) -> &[Operand] {
        &self.blocks[block].outgoing
    }

    /// Record `block` as the definition site of `value`.
    ///
    /// A second definition is accepted only when the first dominates it;
    /// the first stays canonical. Anything else would let two defining
    /// blocks reach the same use, which this representation cannot
    /// express.
    pub fn define_operand(
        &mut self,
        func: &Function,
        value: Operand,
        block: Block,
    ) -> Result<(), AnalysisError> {
        debug_assert!(value.is_tracked());
        match self.def_block(value) {
            None => {
                log::trace!(target: "ssi", "{value} defined in {block}");
                self.set_def(value, block);
                Ok(())
            }
            Some(original) if func.domtree().dominates(original, block) => Ok(()),
            Some(original) => Err(AnalysisError::RedefinitionNotDominated {
                value,
                original,
                redefinition: block,
            }),
        }
    }

    /// Record a read of `value` in `block`, threading it back to its
    /// definition so that it enters every block between the two.
    pub fn access_operand(
        &mut self,
        func: &Function,
        value: Operand,
        block: Block,
    ) -> Result<(), AnalysisError> {
        debug_assert!(value.is_tracked());
        let def_block = self
            .def_block(value)
            .ok_or(AnalysisError::UndefinedValue { value, block })?;
        if !func.domtree().dominates(def_block, block) {
            return Err(AnalysisError::UseNotDominated {
                value,
                def_block,
                use_block: block,
            });
        }
        self.thread_to_definition(func, value, block, def_block);
        Ok(())
    }

    /// Walk backward from `use_block` until every path to the definition
    /// carries `value`.
    ///
    /// Popping a block that already owns a slot for `value` means the
    /// value reaches it along every path, so the walk stops there after
    /// making the slot concrete. Otherwise the block gains an incoming
    /// slot, every predecessor appends the value to its outgoing list,
    /// and every sibling successor of those predecessors pads its own
    /// incoming list with the Illegal sentinel to keep the edge lists the
    /// same length. Dominance guarantees each backward path hits the
    /// definition block, which terminates the walk without edge state.
    fn thread_to_definition(
        &mut self,
        func: &Function,
        value: Operand,
        use_block: Block,
        def_block: Block,
    ) {
        let mut worklist: Vec<Block> = alloc::vec![use_block];
        while let Some(block) = worklist.pop() {
            if block == def_block {
                continue;
            }
            if let Some(&slot) = self.blocks[block].slots.get(&value) {
                self.blocks[block].incoming[slot] = value;
                continue;
            }
            let slot = self.blocks[block].incoming.len();
            self.blocks[block].incoming.push(value);
            self.blocks[block].slots.insert(value, slot);
            log::trace!(target: "ssi", "{value} enters {block} at slot {slot}");
            for &pred in func.preds(block) {
                self.blocks[pred].outgoing.push(value);
                for &sibling in func.succs(pred) {
                    if sibling == block {
                        continue;
                    }
                    let data = &mut self.blocks[sibling];
                    let pad = data.incoming.len();
                    data.incoming.push(Operand::Illegal);
                    data.slots.insert(value, pad);
                }
                worklist.push(pred);
            }
        }
    }

    /// Install the accumulated lists into the function. Blocks no walk
    /// ever touched are left bare.
    pub fn finish(mut self, func: &mut Function) {
        let blocks: Vec<Block> = func.blocks().collect();
        for block in blocks {
            let data = core::mem::take(&mut self.blocks[block]);
            if !data.incoming.is_empty() {
                func.label_mut(block).set_incoming(data.incoming);
            }
            if !data.outgoing.is_empty() {
                func.terminator_mut(block).set_outgoing(data.outgoing);
            }
        }
    }

    fn set_def(&mut self, value: Operand, block: Block) {
        match value {
            Operand::Var(var, _) => self.var_defs[var] = block.into(),
            Operand::Stack(slot, _) => self.slot_defs[slot] = block.into(),
            _ => unreachable!("only tracked operands have definition sites"),
        }
    }
}

/// Drives [`SsiValueMap`] over a whole function.
///
/// Blocks are processed in an order where every predecessor comes first,
/// back edges exempted, so each definition is recorded before the
/// accesses it reaches. The order is found on the fly with a worklist;
/// only irreducible control flow has no such order, and is rejected.
#[derive(Default)]
pub struct SsiLazyBuilder {
    map: SsiValueMap,
}

impl SsiLazyBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn run(mut self, func: &mut Function) -> Result<(), AnalysisError> {
        self.process_blocks(func)?;
        self.map.finish(func);
        Ok(())
    }

    fn process_blocks(&mut self, func: &Function) -> Result<(), AnalysisError> {
        let mut queue: VecDeque<Block> = VecDeque::with_capacity(func.num_blocks());
        let mut processed: BitVec = bitvec![0; func.num_blocks()];
        let mut enqueued: BitVec = bitvec![0; func.num_blocks()];
        queue.push_back(func.entry());
        enqueued.set(func.entry().index(), true);
        let mut stalled = 0usize;
        while let Some(block) = queue.pop_front() {
            if !preds_ready(func, block, &processed) {
                queue.push_back(block);
                stalled += 1;
                if stalled > queue.len() {
                    // A full cycle of deferrals: no remaining block can
                    // ever become ready.
                    return Err(AnalysisError::Unschedulable { block });
                }
                continue;
            }
            stalled = 0;
            self.process_block(func, block)?;
            processed.set(block.index(), true);
            for &succ in func.succs(block) {
                if !processed[succ.index()] && !enqueued[succ.index()] {
                    enqueued.set(succ.index(), true);
                    queue.push_back(succ);
                }
            }
        }
        Ok(())
    }

    fn process_block(&mut self, func: &Function, block: Block) -> Result<(), AnalysisError> {
        for inst in func.block(block).insts() {
            for access in inst.accesses() {
                if !access.mode.is_read() || !access.operand.is_tracked() {
                    continue;
                }
                if access.flags.contains(AccessFlags::ALLOW_UNINITIALIZED) {
                    continue;
                }
                self.map.access_operand(func, access.operand, block)?;
            }
            for access in inst.accesses() {
                if access.mode.is_write() && access.operand.is_tracked() {
                    self.map.define_operand(func, access.operand, block)?;
                }
            }
        }
        Ok(())
    }
}

/// Whether all of `block`'s predecessors are processed, not counting
/// those that reach it over a loop back edge.
fn preds_ready(func: &Function, block: Block, processed: &BitSlice) -> bool {
    func.preds(block)
        .iter()
        .all(|&pred| processed[pred.index()] || func.loops().is_backedge(pred, block))
}
