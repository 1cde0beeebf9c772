//! SSI form construction.
//!
//! A function is in SSI form when every block's label lists the values
//! entering the block and every terminator lists the values leaving it,
//! with the two lists of each edge agreeing position by position. The
//! slot an entering value occupies may hold the Illegal operand instead:
//! the predecessor passes something at that position, but this block does
//! not consume it.
//!
//! [`SsiBuilder`] derives the lists from converged liveness.
//! [`SsiLazyBuilder`] builds the same shape without liveness by threading
//! each value from its uses back to its definition through the dominator
//! tree. [`SsiVerifier`] re-checks the invariants either way.

mod build;
mod value_map;
mod verify;


pub use self::{
    build::SsiBuilder,
    value_map::{SsiLazyBuilder, SsiValueMap},
    verify::SsiVerifier,
};

use flint_lir::Function;

use crate::{error::AnalysisError, liveness::Liveness};

/// Build SSI form from converged liveness.
///
/// Returns the liveness result so later passes can reuse it. When
/// `verify` is set the installed lists are re-checked before returning.
pub fn build_ssi(func: &mut Function, verify: bool) -> Result<Liveness, AnalysisError> {
    let live = Liveness::compute(func)?;
    SsiBuilder::new(&live).run(func)?;
    if verify {
        SsiVerifier::run(func)?;
    }
    Ok(live)
}

/// Build SSI form without computing liveness.
///
/// Threads every accessed value back to its definition through the
/// dominator tree. Cheaper than [`build_ssi`] when only the edge lists
/// are needed, but requires reducible control flow.
pub fn build_ssi_lazy(func: &mut Function, verify: bool) -> Result<(), AnalysisError> {
    SsiLazyBuilder::new().run(func)?;
    if verify {
        SsiVerifier::run(func)?;
    }
    Ok(())
}
