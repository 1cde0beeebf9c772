//! Dominator tree construction.
//!
//! Uses the Cooper/Harvey/Kennedy iterative algorithm over reverse
//! postorder, then numbers the dominator tree with a depth-first interval
//! scheme so that dominance queries are two integer comparisons.

use alloc::vec::Vec;

use cranelift_entity::{packed_option::PackedOption, SecondaryMap};

use super::{block::Block, cfg, function::Function};

#[derive(Debug, Default)]
pub struct DominatorTree {
    idom: SecondaryMap<Block, PackedOption<Block>>,
    children: SecondaryMap<Block, Vec<Block>>,
    pre: SecondaryMap<Block, u32>,
    post: SecondaryMap<Block, u32>,
    bottom_up: Vec<Block>,
}

impl DominatorTree {
    /// Build the dominator tree of `func`.
    ///
    /// Expects every block to be reachable from the entry, which sealing
    /// has already checked.
    pub fn compute(func: &Function) -> Self {
        let entry = func.entry();
        let po = cfg::postorder(func);

        // Postorder numbers, 1-based so the map default stands for "not
        // yet processed".
        let mut po_num: SecondaryMap<Block, u32> = SecondaryMap::with_capacity(func.num_blocks());
        for (i, block) in po.iter().enumerate() {
            po_num[*block] = i as u32 + 1;
        }

        let mut idom: SecondaryMap<Block, PackedOption<Block>> =
            SecondaryMap::with_capacity(func.num_blocks());
        idom[entry] = entry.into();

        let mut changed = true;
        while changed {
            changed = false;
            for &block in po.iter().rev() {
                if block == entry {
                    continue;
                }
                let mut new_idom: Option<Block> = None;
                for &pred in func.preds(block) {
                    if idom[pred].is_none() {
                        continue;
                    }
                    new_idom = Some(match new_idom {
                        None => pred,
                        Some(other) => Self::intersect(&idom, &po_num, pred, other),
                    });
                }
                let new_idom = new_idom.expect("reachable block has a processed predecessor");
                if idom[block].expand() != Some(new_idom) {
                    idom[block] = new_idom.into();
                    changed = true;
                }
            }
        }

        let mut children: SecondaryMap<Block, Vec<Block>> =
            SecondaryMap::with_capacity(func.num_blocks());
        for &block in po.iter() {
            if block != entry {
                let parent = idom[block].expand().expect("non-entry block has an immediate dominator");
                children[parent].push(block);
            }
        }

        // Interval numbering by depth-first walk of the tree. A dominates
        // B exactly when A's interval encloses B's.
        let mut pre: SecondaryMap<Block, u32> = SecondaryMap::with_capacity(func.num_blocks());
        let mut post: SecondaryMap<Block, u32> = SecondaryMap::with_capacity(func.num_blocks());
        let mut bottom_up = Vec::with_capacity(po.len());
        let mut counter = 1u32;
        let mut stack: Vec<(Block, usize)> = Vec::with_capacity(po.len());
        pre[entry] = counter;
        stack.push((entry, 0));
        while let Some(frame) = stack.last_mut() {
            let block = frame.0;
            let next = frame.1;
            if next < children[block].len() {
                frame.1 = next + 1;
                let child = children[block][next];
                counter += 1;
                pre[child] = counter;
                stack.push((child, 0));
            } else {
                stack.pop();
                counter += 1;
                post[block] = counter;
                bottom_up.push(block);
            }
        }

        log::trace!(target: "domtree", "computed dominator tree over {} blocks", po.len());

        Self {
            idom,
            children,
            pre,
            post,
            bottom_up,
        }
    }

    fn intersect(
        idom: &SecondaryMap<Block, PackedOption<Block>>,
        po_num: &SecondaryMap<Block, u32>,
        a: Block,
        b: Block,
    ) -> Block {
        let mut finger1 = a;
        let mut finger2 = b;
        while finger1 != finger2 {
            while po_num[finger1] < po_num[finger2] {
                finger1 = idom[finger1].expand().expect("processed block has an immediate dominator");
            }
            while po_num[finger2] < po_num[finger1] {
                finger2 = idom[finger2].expand().expect("processed block has an immediate dominator");
            }
        }
        finger1
    }

    /// The immediate dominator of `block`, or `None` for the entry.
    pub fn idom(&self, block: Block) -> Option<Block> {
        match self.idom[block].expand() {
            Some(parent) if parent != block => Some(parent),
            _ => None,
        }
    }

    /// Whether `a` dominates `b`. Reflexive: every block dominates itself.
    pub fn dominates(&self, a: Block, b: Block) -> bool {
        self.pre[a] <= self.pre[b] && self.post[b] <= self.post[a]
    }

    pub fn strictly_dominates(&self, a: Block, b: Block) -> bool {
        a != b && self.dominates(a, b)
    }

    /// The blocks immediately dominated by `block`.
    pub fn children(&self, block: Block) -> &[Block] {
        &self.children[block]
    }

    /// Dominator tree postorder: every block appears before its parent.
    pub fn bottom_up(&self) -> &[Block] {
        &self.bottom_up
    }
}
