//! Control-flow graph traversals.

use alloc::vec::Vec;

use bitvec::{bitvec, vec::BitVec};
use cranelift_entity::EntityRef;

use super::{block::Block, function::Function};

/// Depth-first postorder over the blocks reachable from the entry.
///
/// Successors are visited in their stored order, so the traversal is
/// deterministic for a given function.
pub fn postorder(func: &Function) -> Vec<Block> {
    let mut order = Vec::with_capacity(func.num_blocks());
    let mut visited: BitVec = bitvec![0; func.num_blocks()];
    let mut stack: Vec<(Block, usize)> = Vec::with_capacity(func.num_blocks());

    visited.set(func.entry().index(), true);
    stack.push((func.entry(), 0));

    while let Some(frame) = stack.last_mut() {
        let block = frame.0;
        let next = frame.1;
        let succs = func.succs(block);
        if next < succs.len() {
            frame.1 = next + 1;
            let succ = succs[next];
            if !visited[succ.index()] {
                visited.set(succ.index(), true);
                stack.push((succ, 0));
            }
        } else {
            stack.pop();
            order.push(block);
        }
    }

    order
}

/// Reverse postorder over the blocks reachable from the entry.
///
/// This is the default linear order of a sealed function: predecessors
/// come before successors except along loop back edges, which is the
/// shape the liveness solver's reversed sweep wants.
pub fn reverse_postorder(func: &Function) -> Vec<Block> {
    let mut order = postorder(func);
    order.reverse();
    order
}
