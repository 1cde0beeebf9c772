use core::fmt;

use cranelift_entity::entity_impl;

/// A virtual register tracked by liveness analysis.
///
/// Variables are densely indexed from zero within a single function, so a
/// variable's index can be used directly as a position in a bit-vector or a
/// side-table. The identity is immutable for the life of the compilation
/// unit; the storage kind it was declared with travels on the [`Operand`]
/// instances that mention it, not on the variable itself.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Variable(u32);
entity_impl!(Variable, "v");

/// A slot in the function's frame.
///
/// Stack slots have their own dense index space, separate from variables.
/// Bit-vector liveness does not track them, but the dominance-based SSI
/// builder's value map does.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StackSlot(u32);
entity_impl!(StackSlot, "ss");

/// A fixed physical register.
///
/// Fixed registers never appear in liveness sets or edge value lists; they
/// are pinned by the instruction that mentions them and are dead at every
/// block boundary.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PhysReg(u32);
entity_impl!(PhysReg, "r");

/// The representational class of a value.
///
/// Two operands may be joined by a resolving move only when their kinds are
/// equal; the SSI verifier enforces this across every control-flow edge.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum StorageKind {
    Word32,
    Word64,
    Float32,
    Float64,
}

impl StorageKind {
    /// Width of the representation in bits.
    pub fn bits(self) -> u32 {
        match self {
            Self::Word32 | Self::Float32 => 32,
            Self::Word64 | Self::Float64 => 64,
        }
    }

    pub fn is_move_compatible(self, other: Self) -> bool {
        self == other
    }
}

impl fmt::Display for StorageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Word32 => f.write_str("w32"),
            Self::Word64 => f.write_str("w64"),
            Self::Float32 => f.write_str("f32"),
            Self::Float64 => f.write_str("f64"),
        }
    }
}

/// A single operand position in an instruction or edge value list.
///
/// This is the complete classification: every operand an IR producer can
/// hand us is one of these, and passes match on it exhaustively. `Illegal`
/// is the alignment sentinel used in edge value lists ("a slot exists here,
/// but nothing meaningful flows through it") and doubles as the "unset"
/// default in operand side-tables.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Operand {
    /// A liveness-tracked virtual register.
    Var(Variable, StorageKind),
    /// A frame slot.
    Stack(StackSlot, StorageKind),
    /// A fixed physical register.
    Reg(PhysReg, StorageKind),
    /// An immediate constant.
    Imm(i64, StorageKind),
    /// The alignment sentinel.
    Illegal,
}

impl Operand {
    pub const fn is_illegal(&self) -> bool {
        matches!(self, Self::Illegal)
    }

    pub const fn is_var(&self) -> bool {
        matches!(self, Self::Var(..))
    }

    pub fn as_var(self) -> Option<Variable> {
        match self {
            Self::Var(var, _) => Some(var),
            _ => None,
        }
    }

    pub fn as_stack(self) -> Option<StackSlot> {
        match self {
            Self::Stack(slot, _) => Some(slot),
            _ => None,
        }
    }

    /// Is this operand tracked by the dominance-based value map?
    pub const fn is_tracked(&self) -> bool {
        matches!(self, Self::Var(..) | Self::Stack(..))
    }

    /// The storage kind, or `None` for the Illegal sentinel.
    pub fn kind(self) -> Option<StorageKind> {
        match self {
            Self::Var(_, kind) | Self::Stack(_, kind) | Self::Reg(_, kind) | Self::Imm(_, kind) => {
                Some(kind)
            }
            Self::Illegal => None,
        }
    }
}

impl Default for Operand {
    fn default() -> Self {
        Self::Illegal
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Var(var, kind) => write!(f, "{var}:{kind}"),
            Self::Stack(slot, kind) => write!(f, "{slot}:{kind}"),
            Self::Reg(reg, kind) => write!(f, "{reg}:{kind}"),
            Self::Imm(value, kind) => write!(f, "{value}:{kind}"),
            Self::Illegal => f.write_str("-"),
        }
    }
}
