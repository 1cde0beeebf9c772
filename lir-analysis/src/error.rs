use alloc::vec::Vec;

use flint_lir::{Block, Operand, Variable};

/// Fatal analysis failures.
///
/// None of these arise on well-formed input. Each one means either the
/// producer handed us a malformed function or an analysis invariant was
/// broken, so callers are expected to abort the current compilation
/// rather than recover.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum AnalysisError {
    /// The global liveness fixpoint was still changing when the sweep
    /// bound was exceeded.
    #[error("liveness did not converge after {iterations} sweeps")]
    NonConvergence { iterations: u32 },
    /// Values remain live into the entry block after convergence, i.e.
    /// some path uses them before any definition.
    #[error("{} value(s) live into entry {entry}", live.len())]
    MalformedEntry { entry: Block, live: Vec<Variable> },
    /// An edge's outgoing and incoming value lists have different lengths.
    #[error("edge {from} -> {to} carries {outgoing} outgoing but {incoming} incoming values")]
    EdgeLengthMismatch {
        from: Block,
        to: Block,
        outgoing: usize,
        incoming: usize,
    },
    /// An edge slot pairs values whose storage kinds cannot be joined by
    /// a move.
    #[error("edge {from} -> {to} slot {index}: {outgoing} flows into incompatible {incoming}")]
    EdgeKindMismatch {
        from: Block,
        to: Block,
        index: usize,
        outgoing: Operand,
        incoming: Operand,
    },
    /// A value was redefined in a block its original definition does not
    /// dominate.
    #[error("{value} redefined in {redefinition}, outside the dominance region of {original}")]
    RedefinitionNotDominated {
        value: Operand,
        original: Block,
        redefinition: Block,
    },
    /// A value was accessed in a block its definition does not dominate.
    #[error("{value} accessed in {use_block}, which is not dominated by its definition in {def_block}")]
    UseNotDominated {
        value: Operand,
        def_block: Block,
        use_block: Block,
    },
    /// A value was accessed before any definition was recorded for it.
    #[error("{value} accessed in {block} but never defined")]
    UndefinedValue { value: Operand, block: Block },
    /// A block reads a value that neither an earlier instruction in the
    /// block nor the block's incoming list provides.
    #[error("{value} used in {block} with no reaching definition")]
    UseWithoutDefinition { value: Operand, block: Block },
    /// A liveness bit has no canonical operand to materialize, i.e. the
    /// variable is live without ever being written.
    #[error("no representative operand recorded for {var}")]
    MissingRepresentative { var: Variable },
    /// The lazy builder's block schedule stalled: some block's
    /// predecessors can never all be processed first. Only irreducible
    /// control flow triggers this.
    #[error("no processing order satisfies the predecessor constraints of {block}")]
    Unschedulable { block: Block },
}
