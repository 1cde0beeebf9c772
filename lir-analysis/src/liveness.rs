//! Variable liveness over LIR functions.
//!
//! Liveness is the classic backward dataflow problem, solved per block
//! over dense bit-vectors indexed by [`OperandSpace`]:
//!
//! ```text
//! liveOut(b) = union of liveIn(s) over every successor s
//! liveIn(b)  = liveGen(b) | (liveOut(b) & !liveKill(b))
//! ```
//!
//! `liveGen` holds the variables a block reads before writing, `liveKill`
//! the variables it writes. The solver sweeps blocks in reverse of the
//! function's linear order until nothing changes, then forces every value
//! live into a loop header to stay live across the whole loop body, so
//! that an interval covering the header covers the back edge too.

use core::fmt;

use alloc::vec::Vec;

use bitvec::{bitvec, slice::BitSlice, vec::BitVec};
use cranelift_entity::SecondaryMap;
use flint_lir::{AccessFlags, AccessMode, Block, Function, Operand, OperandConsumer};

use crate::{error::AnalysisError, operands::OperandSpace};

/// Sweep bound for the global fixpoint.
///
/// Liveness over monotone bit-sets converges in a handful of sweeps when
/// the linear order is loop-aware; needing more than this many means the
/// input graph or the installed order is malformed.
const MAX_SWEEPS: u32 = 50;

/// The four liveness sets of one block.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BlockLiveness {
    /// Variables read before any write in the block.
    pub live_gen: BitVec,
    /// Variables written in the block.
    pub live_kill: BitVec,
    /// Variables live at the block's entry.
    pub live_in: BitVec,
    /// Variables live at the block's exit.
    pub live_out: BitVec,
}

/// Converged liveness for one function, plus the operand space its bit
/// indices refer to.
#[derive(Debug)]
pub struct Liveness {
    space: OperandSpace,
    blocks: SecondaryMap<Block, BlockLiveness>,
}

struct RecordKills<'a> {
    space: &'a OperandSpace,
    live_gen: &'a mut BitSlice,
    live_kill: &'a mut BitSlice,
}

impl OperandConsumer for RecordKills<'_> {
    fn consume(&mut self, operand: Operand, mode: AccessMode, _flags: AccessFlags) {
        if !mode.is_write() {
            return;
        }
        if let Some(idx) = self.space.index_of(operand) {
            self.live_kill.set(idx, true);
            self.live_gen.set(idx, false);
        }
    }
}

struct RecordUses<'a> {
    space: &'a OperandSpace,
    live_gen: &'a mut BitSlice,
}

impl OperandConsumer for RecordUses<'_> {
    fn consume(&mut self, operand: Operand, mode: AccessMode, _flags: AccessFlags) {
        if !mode.is_read() {
            return;
        }
        if let Some(idx) = self.space.index_of(operand) {
            self.live_gen.set(idx, true);
        }
    }
}

impl Liveness {
    /// Compute converged liveness for `func`.
    ///
    /// Fails with [`AnalysisError::NonConvergence`] if the fixpoint does
    /// not settle within the sweep bound, and with
    /// [`AnalysisError::MalformedEntry`] if values remain live into the
    /// entry block, i.e. some path reads them before any write.
    pub fn compute(func: &Function) -> Result<Self, AnalysisError> {
        let mut live = Self::prepare(func);
        live.solve(func)?;
        Ok(live)
    }

    /// Compute the local `liveGen`/`liveKill` sets of every block.
    fn prepare(func: &Function) -> Self {
        let space = OperandSpace::compute(func);
        let width = space.width();
        let mut blocks: SecondaryMap<Block, BlockLiveness> = SecondaryMap::new();
        for block in func.blocks() {
            let mut sets = BlockLiveness {
                live_gen: bitvec![0; width],
                live_kill: bitvec![0; width],
                live_in: bitvec![0; width],
                live_out: bitvec![0; width],
            };
            // Scan instructions in reverse. Within one instruction the
            // writes are the later event, so they are replayed first: a
            // write both kills the variable and cancels any later read
            // already recorded in liveGen.
            for inst in func.block(block).insts().iter().rev() {
                let mut kills = RecordKills {
                    space: &space,
                    live_gen: sets.live_gen.as_mut_bitslice(),
                    live_kill: sets.live_kill.as_mut_bitslice(),
                };
                inst.visit_operands(&mut kills);
                let mut uses = RecordUses {
                    space: &space,
                    live_gen: sets.live_gen.as_mut_bitslice(),
                };
                inst.visit_operands(&mut uses);
            }
            log::trace!(
                target: "liveness",
                "{block}: gen={} kill={}",
                Bits(&sets.live_gen),
                Bits(&sets.live_kill),
            );
            blocks[block] = sets;
        }
        Self { space, blocks }
    }

    /// Run the global solver over the current sets.
    ///
    /// [`Liveness::compute`] calls this once; re-running it on an already
    /// converged result is a no-op.
    pub fn solve(&mut self, func: &Function) -> Result<(), AnalysisError> {
        let mut scratch: BitVec = bitvec![0; self.space.width()];
        let mut iteration_count: u32 = 0;

        loop {
            let mut change_occurred = false;
            // Reverse of the linear order visits successors first, so one
            // sweep pushes liveness across every forward edge.
            for &block in func.linear_order().iter().rev() {
                let mut change_in_block = false;

                let succs = func.succs(block);
                if !succs.is_empty() {
                    scratch.copy_from_bitslice(&self.blocks[succs[0]].live_in);
                    for &succ in &succs[1..] {
                        union_into(&mut scratch, &self.blocks[succ].live_in);
                    }
                    if scratch != self.blocks[block].live_out {
                        core::mem::swap(&mut self.blocks[block].live_out, &mut scratch);
                        change_occurred = true;
                        change_in_block = true;
                    }
                }

                // liveIn depends only on liveOut and the local sets, so it
                // needs recomputing just once plus whenever liveOut moved.
                if iteration_count == 0 || change_in_block {
                    let sets = &mut self.blocks[block];
                    sets.live_in.fill(false);
                    for idx in sets.live_out.iter_ones() {
                        if !sets.live_kill[idx] {
                            sets.live_in.set(idx, true);
                        }
                    }
                    for idx in sets.live_gen.iter_ones() {
                        sets.live_in.set(idx, true);
                    }
                }
            }
            iteration_count += 1;

            if !change_occurred {
                break;
            }
            if iteration_count > MAX_SWEEPS {
                log::error!(
                    target: "liveness",
                    "no fixpoint for {} after {iteration_count} sweeps",
                    func.name(),
                );
                return Err(AnalysisError::NonConvergence {
                    iterations: iteration_count,
                });
            }
        }
        log::debug!(
            target: "liveness",
            "{} converged after {iteration_count} sweep(s)",
            func.name(),
        );

        self.widen_loops(func);
        self.check_entry(func)
    }

    /// Force every value live into a loop header to be live throughout
    /// the loop.
    ///
    /// The plain fixpoint only keeps a value live along the paths that
    /// reach its uses, so a value read before the loop's exit but written
    /// inside it goes dead partway around the body. Interval construction
    /// wants such values to survive the back edge, so each header's
    /// `liveIn` is unioned into both sets of every member block. Member
    /// lists are transitive, which makes the pass a single walk over the
    /// loop forest in any order.
    fn widen_loops(&mut self, func: &Function) {
        let forest = func.loops();
        let mut header_live: BitVec = bitvec![0; self.space.width()];
        for id in forest.loops() {
            let header = forest.loop_data(id).header;
            header_live.copy_from_bitslice(&self.blocks[header].live_in);
            if header_live.not_any() {
                continue;
            }
            for &member in forest.members(id) {
                let sets = &mut self.blocks[member];
                union_into(sets.live_in.as_mut_bitslice(), &header_live);
                union_into(sets.live_out.as_mut_bitslice(), &header_live);
            }
            log::trace!(
                target: "liveness",
                "{id}: widened {} member(s) with liveIn({header})={}",
                forest.members(id).len(),
                Bits(&header_live),
            );
        }
    }

    /// Nothing may be live into the entry block: a variable that is means
    /// some path reads it before any write, which the producer is
    /// required to rule out.
    fn check_entry(&self, func: &Function) -> Result<(), AnalysisError> {
        let entry = func.entry();
        let live_in = &self.blocks[entry].live_in;
        if live_in.not_any() {
            return Ok(());
        }
        let mut live = Vec::new();
        for idx in live_in.iter_ones() {
            let var = self.space.var_of(idx);
            live.push(var);
            log::error!(
                target: "liveness",
                "{var} is live into entry {entry} of {}",
                func.name(),
            );
            for block in func.blocks() {
                let sets = &self.blocks[block];
                if sets.live_gen[idx] {
                    log::error!(target: "liveness", "  used in {block}");
                }
                if sets.live_kill[idx] {
                    log::error!(target: "liveness", "  defined in {block}");
                }
            }
        }
        Err(AnalysisError::MalformedEntry { entry, live })
    }

    /// The operand space the bit indices refer to.
    pub fn space(&self) -> &OperandSpace {
        &self.space
    }

    /// All four liveness sets of `block`.
    pub fn block(&self, block: Block) -> &BlockLiveness {
        &self.blocks[block]
    }

    /// Variables live at the entry of `block`.
    pub fn live_in(&self, block: Block) -> &BitSlice {
        &self.blocks[block].live_in
    }

    /// Variables live at the exit of `block`.
    pub fn live_out(&self, block: Block) -> &BitSlice {
        &self.blocks[block].live_out
    }

    /// Variables `block` reads before writing.
    pub fn live_gen(&self, block: Block) -> &BitSlice {
        &self.blocks[block].live_gen
    }

    /// Variables `block` writes.
    pub fn live_kill(&self, block: Block) -> &BitSlice {
        &self.blocks[block].live_kill
    }
}

/// Set every bit of `src` in `dst`. Both slices must have the same width.
fn union_into(dst: &mut BitSlice, src: &BitSlice) {
    for idx in src.iter_ones() {
        dst.set(idx, true);
    }
}

/// Renders a liveness set as the variables it contains.
struct Bits<'a>(&'a BitSlice);

impl fmt::Display for Bits<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (i, idx) in self.0.iter_ones().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            write!(f, "v{idx}")?;
        }
        f.write_str("}")
    }
}

#[cfg(test)]
mod tests {
    use flint_lir::{FunctionBuilder, OperandAccess, StorageKind};
    use pretty_assertions::assert_eq;

    use super::*;

    fn init_logging() {
        let _ = env_logger::Builder::from_env("FLINT_TRACE")
            .format_timestamp(None)
            .is_test(true)
            .try_init();
    }

    fn ones(bits: &BitSlice) -> Vec<usize> {
        bits.iter_ones().collect()
    }

    #[test]
    fn straight_line_sets() -> Result<(), AnalysisError> {
        init_logging();
        let mut fb = FunctionBuilder::new("straight");
        let v0 = fb.declare_var(StorageKind::Word32);
        let b0 = fb.create_block();
        let b1 = fb.create_block();
        fb.switch_to_block(b0);
        fb.op([OperandAccess::def(fb.operand(v0))]);
        fb.jump(b1);
        fb.switch_to_block(b1);
        fb.op([OperandAccess::use_of(fb.operand(v0))]);
        fb.ret([]);
        let func = fb.seal().unwrap();

        let live = Liveness::compute(&func)?;
        assert_eq!(ones(live.live_kill(b0)), [0]);
        assert_eq!(ones(live.live_gen(b1)), [0]);
        assert_eq!(ones(live.live_out(b0)), [0]);
        assert_eq!(ones(live.live_in(b1)), [0]);
        assert!(live.live_in(b0).not_any());
        assert!(live.live_out(b1).not_any());
        Ok(())
    }

    #[test]
    fn use_before_redefinition_still_generates() -> Result<(), AnalysisError> {
        let mut fb = FunctionBuilder::new("regen");
        let v0 = fb.declare_var(StorageKind::Word64);
        let b0 = fb.create_block();
        let b1 = fb.create_block();
        fb.switch_to_block(b0);
        fb.op([OperandAccess::def(fb.operand(v0))]);
        fb.jump(b1);
        fb.switch_to_block(b1);
        fb.op([OperandAccess::use_of(fb.operand(v0))]);
        fb.op([OperandAccess::def(fb.operand(v0))]);
        fb.ret([]);
        let func = fb.seal().unwrap();

        let live = Liveness::compute(&func)?;
        // The read precedes the write, so the block both generates and
        // kills the variable.
        assert_eq!(ones(live.live_gen(b1)), [0]);
        assert_eq!(ones(live.live_kill(b1)), [0]);
        assert_eq!(ones(live.live_in(b1)), [0]);
        Ok(())
    }

    #[test]
    fn state_reads_do_not_kill() -> Result<(), AnalysisError> {
        let mut fb = FunctionBuilder::new("state");
        let v0 = fb.declare_var(StorageKind::Word32);
        let b0 = fb.create_block();
        fb.switch_to_block(b0);
        fb.op([OperandAccess::def(fb.operand(v0))]);
        fb.op([OperandAccess::state(fb.operand(v0))]);
        fb.ret([]);
        let func = fb.seal().unwrap();

        let live = Liveness::compute(&func)?;
        assert!(live.live_gen(b0).not_any());
        assert_eq!(ones(live.live_kill(b0)), [0]);
        Ok(())
    }

    #[test]
    fn temp_writes_kill() -> Result<(), AnalysisError> {
        let mut fb = FunctionBuilder::new("temp");
        let v0 = fb.declare_var(StorageKind::Word32);
        let b0 = fb.create_block();
        fb.switch_to_block(b0);
        fb.op([OperandAccess::temp(fb.operand(v0))]);
        fb.ret([]);
        let func = fb.seal().unwrap();

        let live = Liveness::compute(&func)?;
        assert!(live.live_gen(b0).not_any());
        assert_eq!(ones(live.live_kill(b0)), [0]);
        Ok(())
    }

    #[test]
    fn diamond_fixpoint_equations_hold() -> Result<(), AnalysisError> {
        init_logging();
        let mut fb = FunctionBuilder::new("diamond");
        let v0 = fb.declare_var(StorageKind::Word32);
        let b0 = fb.create_block();
        let b1 = fb.create_block();
        let b2 = fb.create_block();
        let b3 = fb.create_block();
        fb.switch_to_block(b0);
        fb.op([OperandAccess::def(fb.operand(v0))]);
        fb.branch(b1, b2, []);
        fb.switch_to_block(b1);
        fb.op([OperandAccess::use_of(fb.operand(v0))]);
        fb.jump(b3);
        fb.switch_to_block(b2);
        fb.jump(b3);
        fb.switch_to_block(b3);
        fb.ret([]);
        let func = fb.seal().unwrap();

        let live = Liveness::compute(&func)?;
        assert_eq!(ones(live.live_out(b0)), [0]);
        assert_eq!(ones(live.live_in(b1)), [0]);
        assert!(live.live_in(b2).not_any());
        assert!(live.live_in(b3).not_any());
        // No loops, so the fixpoint equations hold exactly.
        for block in func.blocks() {
            let sets = live.block(block);
            let mut expected = sets.live_gen.clone();
            for idx in sets.live_out.iter_ones() {
                if !sets.live_kill[idx] {
                    expected.set(idx, true);
                }
            }
            assert_eq!(ones(&sets.live_in), ones(&expected), "block {block}");
        }
        Ok(())
    }

    /// Builds a loop whose body rewrites `v0` while the exit still reads
    /// it. The plain fixpoint leaves `v0` dead at the body's entry; the
    /// widening pass must revive it across the whole loop.
    fn loop_with_inner_kill() -> (Function, [Block; 4]) {
        let mut fb = FunctionBuilder::new("widen");
        let v0 = fb.declare_var(StorageKind::Word64);
        let v1 = fb.declare_var(StorageKind::Word64);
        let b0 = fb.create_block();
        let b1 = fb.create_block();
        let b2 = fb.create_block();
        let b3 = fb.create_block();
        fb.switch_to_block(b0);
        fb.op([OperandAccess::def(fb.operand(v0))]);
        fb.op([OperandAccess::def(fb.operand(v1))]);
        fb.jump(b1);
        fb.switch_to_block(b1);
        fb.branch(b2, b3, [OperandAccess::use_of(fb.operand(v1))]);
        fb.switch_to_block(b2);
        fb.op([OperandAccess::def(fb.operand(v0))]);
        fb.jump(b1);
        fb.switch_to_block(b3);
        fb.op([OperandAccess::use_of(fb.operand(v0))]);
        fb.ret([]);
        (fb.seal().unwrap(), [b0, b1, b2, b3])
    }

    #[test]
    fn header_liveness_widens_across_the_loop() -> Result<(), AnalysisError> {
        init_logging();
        let (func, [b0, b1, b2, b3]) = loop_with_inner_kill();
        let live = Liveness::compute(&func)?;
        assert_eq!(ones(live.live_in(b1)), [0, 1]);
        // Without widening liveIn(b2) would be just v1: the body's write
        // to v0 kills it locally.
        assert_eq!(ones(live.live_in(b2)), [0, 1]);
        assert_eq!(ones(live.live_out(b2)), [0, 1]);
        assert_eq!(ones(live.live_in(b3)), [0]);
        assert!(live.live_in(b0).not_any());
        Ok(())
    }

    #[test]
    fn solving_a_converged_result_changes_nothing() -> Result<(), AnalysisError> {
        init_logging();
        let (func, blocks) = loop_with_inner_kill();
        let mut live = Liveness::compute(&func)?;
        let before: Vec<BlockLiveness> =
            blocks.iter().map(|&b| live.block(b).clone()).collect();
        live.solve(&func)?;
        let after: Vec<BlockLiveness> =
            blocks.iter().map(|&b| live.block(b).clone()).collect();
        assert_eq!(before, after);
        Ok(())
    }

    #[test]
    fn undefined_use_is_reported_at_entry() {
        init_logging();
        let mut fb = FunctionBuilder::new("undefined");
        let v0 = fb.declare_var(StorageKind::Word32);
        let b0 = fb.create_block();
        fb.switch_to_block(b0);
        fb.op([OperandAccess::use_of(fb.operand(v0))]);
        fb.ret([]);
        let func = fb.seal().unwrap();

        let err = Liveness::compute(&func).unwrap_err();
        assert_eq!(
            err,
            AnalysisError::MalformedEntry {
                entry: b0,
                live: alloc::vec![v0],
            },
        );
    }

    /// A chain long enough that liveness must cross `len` edges, plus a
    /// two-block side branch whose sets settle in the first sweep.
    ///
    /// The installed linear order is the worst case for the solver: each
    /// sweep visits predecessors before successors along the chain, so
    /// the use at the chain's end crawls toward its definition one block
    /// per sweep. The side branch produces a first-sweep change that
    /// keeps the solver iterating while the crawl starts.
    fn slow_chain(len: usize) -> (Function, Vec<Block>) {
        let mut fb = FunctionBuilder::new("slow_chain");
        let v = fb.declare_var(StorageKind::Word64);
        let w = fb.declare_var(StorageKind::Word64);
        let entry = fb.create_block();
        let chain: Vec<Block> = (0..len).map(|_| fb.create_block()).collect();
        let c0 = fb.create_block();
        let c1 = fb.create_block();

        fb.switch_to_block(entry);
        fb.branch(chain[0], c0, []);
        for (i, &block) in chain.iter().enumerate() {
            fb.switch_to_block(block);
            if i == 0 {
                fb.op([OperandAccess::def(fb.operand(v))]);
            }
            if i + 1 == len {
                fb.op([OperandAccess::use_of(fb.operand(v))]);
                fb.ret([]);
            } else {
                fb.jump(chain[i + 1]);
            }
        }
        fb.switch_to_block(c0);
        fb.op([OperandAccess::def(fb.operand(w))]);
        fb.jump(c1);
        fb.switch_to_block(c1);
        fb.op([OperandAccess::use_of(fb.operand(w))]);
        fb.ret([]);

        let mut func = fb.seal().unwrap();
        let mut order: Vec<Block> = alloc::vec![c0, c1];
        order.extend(chain.iter().rev().copied());
        order.push(entry);
        func.set_linear_order(order);
        (func, chain)
    }

    #[test]
    fn sweep_bound_overrun_is_an_error() {
        init_logging();
        let (func, _) = slow_chain(60);
        let err = Liveness::compute(&func).unwrap_err();
        assert_eq!(err, AnalysisError::NonConvergence { iterations: 51 });
    }

    #[test]
    fn short_chain_converges_under_the_same_order() -> Result<(), AnalysisError> {
        init_logging();
        let (func, chain) = slow_chain(30);
        let live = Liveness::compute(&func)?;
        // The crawl completed: the definition block sees the distant use.
        assert_eq!(ones(live.live_out(chain[0])), [0]);
        assert!(live.live_in(chain[0]).not_any());
        Ok(())
    }
}
