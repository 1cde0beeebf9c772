use flint_lir::{AccessFlags, AccessMode, Function};

use crate::{error::AnalysisError, FxHashSet};

/// Structural checks over installed SSI form.
///
/// The builders establish these properties by construction; the verifier
/// exists to catch a producer or a later pass breaking them, since the
/// register allocator consumes the edge lists without further checks.
pub struct SsiVerifier;

impl SsiVerifier {
    pub fn run(func: &Function) -> Result<(), AnalysisError> {
        Self::check_edges(func)?;
        Self::check_use_def(func)
    }

    /// Every edge's outgoing and incoming lists have equal length, and
    /// each slot pairs move-compatible storage kinds. An Illegal incoming
    /// slot accepts anything: the value passes this block by.
    fn check_edges(func: &Function) -> Result<(), AnalysisError> {
        for from in func.blocks() {
            let outgoing = func.terminator(from).outgoing();
            for &to in func.succs(from) {
                let incoming = func.label(to).incoming();
                if outgoing.len() != incoming.len() {
                    return Err(AnalysisError::EdgeLengthMismatch {
                        from,
                        to,
                        outgoing: outgoing.len(),
                        incoming: incoming.len(),
                    });
                }
                for (index, (&out_val, &in_val)) in
                    outgoing.iter().zip(incoming.iter()).enumerate()
                {
                    if in_val.is_illegal() {
                        continue;
                    }
                    let compatible = match (out_val.kind(), in_val.kind()) {
                        (Some(from_kind), Some(to_kind)) => from_kind.is_move_compatible(to_kind),
                        _ => false,
                    };
                    if !compatible {
                        return Err(AnalysisError::EdgeKindMismatch {
                            from,
                            to,
                            index,
                            outgoing: out_val,
                            incoming: in_val,
                        });
                    }
                }
            }
        }
        Ok(())
    }

    /// Every Use or Alive read of a tracked operand is covered by an
    /// earlier write in the same block or by a concrete incoming slot.
    /// State reads are exempt, as are reads flagged allow-uninitialized.
    fn check_use_def(func: &Function) -> Result<(), AnalysisError> {
        let mut defined = FxHashSet::default();
        for block in func.blocks() {
            defined.clear();
            for &value in func.label(block).incoming() {
                if !value.is_illegal() {
                    defined.insert(value);
                }
            }
            for inst in func.block(block).insts() {
                for access in inst.accesses() {
                    if !matches!(access.mode, AccessMode::Use | AccessMode::Alive) {
                        continue;
                    }
                    if !access.operand.is_tracked()
                        || access.flags.contains(AccessFlags::ALLOW_UNINITIALIZED)
                    {
                        continue;
                    }
                    if !defined.contains(&access.operand) {
                        return Err(AnalysisError::UseWithoutDefinition {
                            value: access.operand,
                            block,
                        });
                    }
                }
                for access in inst.accesses() {
                    if access.mode.is_write() && access.operand.is_tracked() {
                        defined.insert(access.operand);
                    }
                }
            }
        }
        Ok(())
    }
}
