use cranelift_entity::{EntityRef, SecondaryMap};
use flint_lir::{AccessFlags, AccessMode, Function, Operand, OperandConsumer, Variable};

use crate::error::AnalysisError;

/// Dense index space over a function's variables.
///
/// Liveness sets are bit-vectors indexed by variable number. When the SSI
/// builder turns a bit back into an operand it must emit the operand
/// instance the producer actually wrote, because that instance carries the
/// storage kind. The space therefore records a representative operand per
/// variable: the first defining access seen in layout order.
#[derive(Debug)]
pub struct OperandSpace {
    width: usize,
    reps: SecondaryMap<Variable, Operand>,
}

struct RecordDefs<'a> {
    reps: &'a mut SecondaryMap<Variable, Operand>,
}

impl OperandConsumer for RecordDefs<'_> {
    fn consume(&mut self, operand: Operand, mode: AccessMode, _flags: AccessFlags) {
        if !mode.is_write() {
            return;
        }
        if let Some(var) = operand.as_var() {
            if self.reps[var].is_illegal() {
                self.reps[var] = operand;
            }
        }
    }
}

impl OperandSpace {
    /// Scan `func` and record a representative operand for every variable
    /// that is ever written.
    pub fn compute(func: &Function) -> Self {
        let mut reps = SecondaryMap::new();
        let mut recorder = RecordDefs { reps: &mut reps };
        for &block in func.linear_order() {
            for inst in func.block(block).insts() {
                inst.visit_operands(&mut recorder);
            }
        }
        Self {
            width: func.num_variables(),
            reps,
        }
    }

    /// The width of the liveness bit-vectors, i.e. the variable count.
    pub fn width(&self) -> usize {
        self.width
    }

    /// The liveness bit for `operand`, or `None` if liveness does not
    /// track operands of its kind.
    pub fn index_of(&self, operand: Operand) -> Option<usize> {
        operand.as_var().map(|var| var.index())
    }

    /// The variable owning liveness bit `index`.
    pub fn var_of(&self, index: usize) -> Variable {
        Variable::new(index)
    }

    /// The canonical operand for `var`.
    ///
    /// Fails if `var` is never written, since then no operand instance
    /// exists to represent it.
    pub fn representative(&self, var: Variable) -> Result<Operand, AnalysisError> {
        let rep = self.reps[var];
        if rep.is_illegal() {
            Err(AnalysisError::MissingRepresentative { var })
        } else {
            Ok(rep)
        }
    }
}
