use core::fmt;

use alloc::vec::Vec;

use smallvec::SmallVec;

use super::{block::Block, operand::Operand};

/// How an instruction touches one of its operands.
///
/// The mode determines how liveness analysis interprets the access, so the
/// distinctions matter more than they look:
///
/// - `Use` is an ordinary read of the value.
/// - `Alive` is a read whose value must additionally survive across an
///   embedded call or side-effecting region inside the instruction; for
///   liveness it behaves exactly like `Use`.
/// - `State` is a reference from debug/deopt metadata only. It keeps the
///   value alive (the debugger must be able to observe it) but is not a
///   "real" consumer and never shadows an earlier definition.
/// - `Def` produces the value.
/// - `Temp` clobbers the value transiently; it counts as a definition for
///   liveness (the old value is gone) without being a meaningful output.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum AccessMode {
    Use,
    Alive,
    State,
    Def,
    Temp,
}

impl AccessMode {
    /// `Use`, `Alive`, and `State` observe the operand's current value.
    pub const fn is_read(self) -> bool {
        matches!(self, Self::Use | Self::Alive | Self::State)
    }

    /// `Def` and `Temp` overwrite the operand.
    pub const fn is_write(self) -> bool {
        matches!(self, Self::Def | Self::Temp)
    }
}

impl fmt::Display for AccessMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Use => f.write_str("use"),
            Self::Alive => f.write_str("alive"),
            Self::State => f.write_str("state"),
            Self::Def => f.write_str("def"),
            Self::Temp => f.write_str("temp"),
        }
    }
}

bitflags::bitflags! {
    /// Extra attributes on a single operand access.
    #[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
    pub struct AccessFlags: u8 {
        /// Reading this operand without a reaching definition is permitted.
        ///
        /// Used for values defined outside the instruction stream, such as
        /// caller-established state; the SSI verifier skips its use-def
        /// coverage check for accesses carrying this flag, and the lazy
        /// builder does not attempt to thread them.
        const ALLOW_UNINITIALIZED = 1 << 0;
    }
}

/// One mode-tagged operand position of an instruction.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct OperandAccess {
    pub operand: Operand,
    pub mode: AccessMode,
    pub flags: AccessFlags,
}

impl OperandAccess {
    pub fn new(operand: Operand, mode: AccessMode) -> Self {
        Self {
            operand,
            mode,
            flags: AccessFlags::empty(),
        }
    }

    pub fn use_of(operand: Operand) -> Self {
        Self::new(operand, AccessMode::Use)
    }

    pub fn alive(operand: Operand) -> Self {
        Self::new(operand, AccessMode::Alive)
    }

    pub fn state(operand: Operand) -> Self {
        Self::new(operand, AccessMode::State)
    }

    pub fn def(operand: Operand) -> Self {
        Self::new(operand, AccessMode::Def)
    }

    pub fn temp(operand: Operand) -> Self {
        Self::new(operand, AccessMode::Temp)
    }

    /// A read that is allowed to observe an uninitialized value.
    pub fn uninit_use(operand: Operand) -> Self {
        Self {
            operand,
            mode: AccessMode::Use,
            flags: AccessFlags::ALLOW_UNINITIALIZED,
        }
    }
}

impl fmt::Display for OperandAccess {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.mode, self.operand)
    }
}

/// The structural role of an instruction within its block.
///
/// Every block begins with exactly one `Label` and ends with exactly one
/// terminator (`Jump`, `Branch`, or `Ret`); everything in between is `Op`.
/// The label carries the SSI `incoming` value list and the terminator the
/// `outgoing` list once SSI construction has run; both start empty.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum InstKind {
    Label { incoming: Vec<Operand> },
    Op,
    Jump { target: Block, outgoing: Vec<Operand> },
    Branch { then_dest: Block, else_dest: Block, outgoing: Vec<Operand> },
    Ret { outgoing: Vec<Operand> },
}

/// Visitor over an instruction's operand accesses.
///
/// Passes that scan operands implement this on a short-lived struct holding
/// mutable borrows of exactly the state they update, which keeps ownership
/// of bit-vectors and side-tables visible at the call site.
pub trait OperandConsumer {
    fn consume(&mut self, operand: Operand, mode: AccessMode, flags: AccessFlags);
}

/// A single LIR instruction: a structural kind plus its operand accesses.
///
/// Accesses are stored in operand order as the producer declared them. The
/// reads of an instruction happen before its writes, so consumers that care
/// about intra-instruction ordering (local liveness, the verifier) visit
/// the two groups in the appropriate order rather than relying on the
/// declared interleaving.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Instruction {
    pub kind: InstKind,
    accesses: SmallVec<[OperandAccess; 4]>,
}

impl Instruction {
    pub fn new(kind: InstKind, accesses: impl IntoIterator<Item = OperandAccess>) -> Self {
        Self {
            kind,
            accesses: SmallVec::from_iter(accesses),
        }
    }

    pub fn is_label(&self) -> bool {
        matches!(self.kind, InstKind::Label { .. })
    }

    pub fn is_terminator(&self) -> bool {
        matches!(
            self.kind,
            InstKind::Jump { .. } | InstKind::Branch { .. } | InstKind::Ret { .. }
        )
    }

    pub fn accesses(&self) -> &[OperandAccess] {
        &self.accesses
    }

    pub(crate) fn push_access(&mut self, access: OperandAccess) {
        self.accesses.push(access);
    }

    /// Visit every operand access in declared order.
    pub fn visit_operands(&self, consumer: &mut impl OperandConsumer) {
        for access in self.accesses.iter() {
            consumer.consume(access.operand, access.mode, access.flags);
        }
    }

    /// The SSI incoming value list. Empty unless this is a label that has
    /// been through SSI construction.
    pub fn incoming(&self) -> &[Operand] {
        match &self.kind {
            InstKind::Label { incoming } => incoming,
            _ => &[],
        }
    }

    /// The SSI outgoing value list. Empty unless this is a terminator that
    /// has been through SSI construction.
    pub fn outgoing(&self) -> &[Operand] {
        match &self.kind {
            InstKind::Jump { outgoing, .. }
            | InstKind::Branch { outgoing, .. }
            | InstKind::Ret { outgoing } => outgoing,
            _ => &[],
        }
    }

    /// Attach the incoming value list. Panics unless this is a label.
    pub fn set_incoming(&mut self, values: Vec<Operand>) {
        match &mut self.kind {
            InstKind::Label { incoming } => *incoming = values,
            kind => panic!("incoming values only attach to labels, not {kind:?}"),
        }
    }

    /// Attach the outgoing value list. Panics unless this is a terminator.
    pub fn set_outgoing(&mut self, values: Vec<Operand>) {
        match &mut self.kind {
            InstKind::Jump { outgoing, .. }
            | InstKind::Branch { outgoing, .. }
            | InstKind::Ret { outgoing } => *outgoing = values,
            kind => panic!("outgoing values only attach to terminators, not {kind:?}"),
        }
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn write_values(f: &mut fmt::Formatter<'_>, tag: &str, values: &[Operand]) -> fmt::Result {
            if values.is_empty() {
                return Ok(());
            }
            write!(f, " {tag}[")?;
            for (i, value) in values.iter().enumerate() {
                if i > 0 {
                    f.write_str(", ")?;
                }
                write!(f, "{value}")?;
            }
            f.write_str("]")
        }

        match &self.kind {
            InstKind::Label { incoming } => {
                f.write_str("label")?;
                write_values(f, "in", incoming)?;
            }
            InstKind::Op => f.write_str("op")?,
            InstKind::Jump { target, outgoing } => {
                write!(f, "jump {target}")?;
                write_values(f, "out", outgoing)?;
            }
            InstKind::Branch {
                then_dest,
                else_dest,
                outgoing,
            } => {
                write!(f, "branch {then_dest}, {else_dest}")?;
                write_values(f, "out", outgoing)?;
            }
            InstKind::Ret { outgoing } => {
                f.write_str("ret")?;
                write_values(f, "out", outgoing)?;
            }
        }
        if !self.accesses.is_empty() {
            f.write_str(" (")?;
            for (i, access) in self.accesses.iter().enumerate() {
                if i > 0 {
                    f.write_str(", ")?;
                }
                write!(f, "{access}")?;
            }
            f.write_str(")")?;
        }
        Ok(())
    }
}
