//! Property tests over randomly generated loop-free functions.
//!
//! The generator grows a function segment by segment, either extending
//! the current chain or splitting into a diamond, and only ever reads
//! variables already written on every path, so the liveness entry
//! postcondition holds by construction.

use alloc::vec::Vec;

use proptest::prelude::*;

use flint_lir::{Function, FunctionBuilder, OperandAccess, StorageKind, Variable};

use crate::{
    liveness::{BlockLiveness, Liveness},
    ssi::{build_ssi, SsiVerifier},
};

#[derive(Debug, Clone)]
struct OpPlan {
    var: u8,
    read: bool,
}

#[derive(Debug, Clone)]
enum Segment {
    Straight {
        ops: Vec<OpPlan>,
    },
    Diamond {
        then_ops: Vec<OpPlan>,
        else_ops: Vec<OpPlan>,
        merge_ops: Vec<OpPlan>,
    },
}

#[derive(Debug, Clone)]
struct CfgPlan {
    segments: Vec<Segment>,
}

fn op_plan() -> impl Strategy<Value = OpPlan> {
    (any::<u8>(), any::<bool>()).prop_map(|(var, read)| OpPlan { var, read })
}

fn ops() -> impl Strategy<Value = Vec<OpPlan>> {
    proptest::collection::vec(op_plan(), 0..5)
}

fn segment() -> impl Strategy<Value = Segment> {
    prop_oneof![
        ops().prop_map(|ops| Segment::Straight { ops }),
        (ops(), ops(), ops()).prop_map(|(then_ops, else_ops, merge_ops)| Segment::Diamond {
            then_ops,
            else_ops,
            merge_ops,
        }),
    ]
}

fn cfg_plan() -> impl Strategy<Value = CfgPlan> {
    proptest::collection::vec(segment(), 1..6).prop_map(|segments| CfgPlan { segments })
}

/// Emit one planned instruction. Reads pick from the variables defined on
/// every path so far; a read with nothing available becomes a write.
fn emit(fb: &mut FunctionBuilder, pool: &[Variable], avail: &mut Vec<Variable>, op: &OpPlan) {
    if op.read && !avail.is_empty() {
        let var = avail[op.var as usize % avail.len()];
        fb.op([OperandAccess::use_of(fb.operand(var))]);
    } else {
        let var = pool[op.var as usize % pool.len()];
        fb.op([OperandAccess::def(fb.operand(var))]);
        if !avail.contains(&var) {
            avail.push(var);
        }
    }
}

fn materialize(plan: &CfgPlan) -> Function {
    let mut fb = FunctionBuilder::new("generated");
    let pool: Vec<Variable> = [
        StorageKind::Word64,
        StorageKind::Word32,
        StorageKind::Float64,
        StorageKind::Word64,
    ]
    .into_iter()
    .map(|kind| fb.declare_var(kind))
    .collect();
    let entry = fb.create_block();
    fb.switch_to_block(entry);
    let mut avail: Vec<Variable> = Vec::new();
    for segment in &plan.segments {
        match segment {
            Segment::Straight { ops } => {
                for op in ops {
                    emit(&mut fb, &pool, &mut avail, op);
                }
                let next = fb.create_block();
                fb.jump(next);
                fb.switch_to_block(next);
            }
            Segment::Diamond {
                then_ops,
                else_ops,
                merge_ops,
            } => {
                let then_b = fb.create_block();
                let else_b = fb.create_block();
                let merge_b = fb.create_block();
                fb.branch(then_b, else_b, []);
                fb.switch_to_block(then_b);
                let mut then_avail = avail.clone();
                for op in then_ops {
                    emit(&mut fb, &pool, &mut then_avail, op);
                }
                fb.jump(merge_b);
                fb.switch_to_block(else_b);
                let mut else_avail = avail.clone();
                for op in else_ops {
                    emit(&mut fb, &pool, &mut else_avail, op);
                }
                fb.jump(merge_b);
                fb.switch_to_block(merge_b);
                avail = then_avail
                    .into_iter()
                    .filter(|var| else_avail.contains(var))
                    .collect();
                for op in merge_ops {
                    emit(&mut fb, &pool, &mut avail, op);
                }
            }
        }
    }
    fb.ret([]);
    fb.seal().expect("generated function is well formed")
}

proptest! {
    #[test]
    fn liveness_satisfies_the_fixpoint_equations(plan in cfg_plan()) {
        let func = materialize(&plan);
        let live = Liveness::compute(&func).unwrap();
        // No loops means no widening: the equations hold exactly.
        for block in func.blocks() {
            let sets = live.block(block);
            let mut expected = sets.live_gen.clone();
            for idx in sets.live_out.iter_ones() {
                if !sets.live_kill[idx] {
                    expected.set(idx, true);
                }
            }
            prop_assert_eq!(&sets.live_in, &expected, "block {}", block);
        }
        prop_assert!(live.live_in(func.entry()).not_any());
    }

    #[test]
    fn resolving_twice_changes_nothing(plan in cfg_plan()) {
        let func = materialize(&plan);
        let mut live = Liveness::compute(&func).unwrap();
        let before: Vec<BlockLiveness> =
            func.blocks().map(|block| live.block(block).clone()).collect();
        live.solve(&func).unwrap();
        for (block, old) in func.blocks().zip(before.iter()) {
            prop_assert_eq!(live.block(block), old);
        }
    }

    #[test]
    fn built_edges_always_verify(plan in cfg_plan()) {
        let mut func = materialize(&plan);
        build_ssi(&mut func, false).unwrap();
        for from in func.blocks() {
            let outgoing = func.terminator(from).outgoing().len();
            for &to in func.succs(from) {
                prop_assert_eq!(outgoing, func.label(to).incoming().len());
            }
        }
        SsiVerifier::run(&func).unwrap();
    }
}
