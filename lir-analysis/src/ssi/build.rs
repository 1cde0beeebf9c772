use alloc::vec::Vec;

use bitvec::{bitvec, vec::BitVec};
use flint_lir::{Block, Function, Operand};

use crate::{error::AnalysisError, liveness::Liveness};

/// Materializes converged liveness as per-block edge value lists.
pub struct SsiBuilder<'a> {
    live: &'a Liveness,
}

impl<'a> SsiBuilder<'a> {
    pub fn new(live: &'a Liveness) -> Self {
        Self { live }
    }

    /// Attach an outgoing list to every terminator and an incoming list
    /// to every label, per the converged liveness. Blocks with nothing
    /// live across their edges are left bare.
    pub fn run(&self, func: &mut Function) -> Result<(), AnalysisError> {
        let blocks: Vec<Block> = func.blocks().collect();
        for block in blocks {
            let outgoing = self.outgoing_values(block)?;
            let incoming = self.incoming_values(func, block)?;
            log::trace!(
                target: "ssi",
                "{block}: {} outgoing, {} incoming",
                outgoing.len(),
                incoming.len(),
            );
            if !outgoing.is_empty() {
                func.terminator_mut(block).set_outgoing(outgoing);
            }
            if !incoming.is_empty() {
                func.label_mut(block).set_incoming(incoming);
            }
        }
        Ok(())
    }

    /// The representative operands of `liveOut(block)`, ordered by
    /// variable index.
    fn outgoing_values(&self, block: Block) -> Result<Vec<Operand>, AnalysisError> {
        let space = self.live.space();
        self.live
            .live_out(block)
            .iter_ones()
            .map(|idx| space.representative(space.var_of(idx)))
            .collect()
    }

    /// One slot per variable in the union of the predecessors' liveOut
    /// sets, ordered by variable index: the concrete operand where the
    /// variable is in this block's liveIn, the Illegal sentinel where it
    /// merely rides a sibling edge.
    ///
    /// With critical edges split, every predecessor of a join has this
    /// block as its only successor, so all predecessor liveOut sets
    /// coincide and each outgoing list lines up with the slots built
    /// here.
    fn incoming_values(&self, func: &Function, block: Block) -> Result<Vec<Operand>, AnalysisError> {
        let space = self.live.space();
        let live_in = self.live.live_in(block);
        let mut universe: BitVec = bitvec![0; space.width()];
        for &pred in func.preds(block) {
            for idx in self.live.live_out(pred).iter_ones() {
                universe.set(idx, true);
            }
        }
        let mut values = Vec::with_capacity(universe.count_ones());
        for idx in universe.iter_ones() {
            if live_in[idx] {
                values.push(space.representative(space.var_of(idx))?);
            } else {
                values.push(Operand::Illegal);
            }
        }
        Ok(values)
    }
}
