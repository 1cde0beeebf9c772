//! Register-allocation-facing analyses over [`flint_lir`] functions.
//!
//! The crate computes variable liveness and materializes it as SSI form:
//! every block's label names the values entering the block, every
//! terminator names the values leaving it, and the two lists agree
//! positionally across each edge. Two construction strategies are
//! provided:
//!
//! * [`build_ssi`] solves a global liveness fixpoint and derives the edge
//!   lists from the converged sets.
//! * [`build_ssi_lazy`] skips liveness entirely and threads each value
//!   from its uses back to its definition, relying on the dominator tree.
//!
//! Both feed the same [`SsiVerifier`], which re-checks the structural
//! guarantees downstream passes lean on.
#![no_std]

extern crate alloc;
#[cfg(test)]
extern crate std;

pub mod error;
pub mod liveness;
pub mod operands;
pub mod ssi;

#[cfg(test)]
mod proptests;

pub use self::{
    error::AnalysisError,
    liveness::{BlockLiveness, Liveness},
    operands::OperandSpace,
    ssi::{build_ssi, build_ssi_lazy, SsiBuilder, SsiLazyBuilder, SsiValueMap, SsiVerifier},
};

/// Type alias for [hashbrown::HashMap] with the Fx hasher.
pub type FxHashMap<K, V> = hashbrown::HashMap<K, V, rustc_hash::FxBuildHasher>;
/// Type alias for [hashbrown::HashSet] with the Fx hasher.
pub type FxHashSet<V> = hashbrown::HashSet<V, rustc_hash::FxBuildHasher>;
