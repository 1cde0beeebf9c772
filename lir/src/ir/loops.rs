//! Natural loop discovery.
//!
//! Walks the dominator tree bottom-up, treating every block with a
//! predecessor it dominates as a loop header, and traces each loop body
//! backwards from its latches. Inner loops are discovered before the loops
//! that enclose them, so nesting falls out of the traversal order.

use alloc::vec::Vec;

use cranelift_entity::{entity_impl, packed_option::PackedOption, PrimaryMap, SecondaryMap};
use smallvec::SmallVec;

use super::{block::Block, function::Function};

/// A handle to a natural loop in a [LoopForest].
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LoopId(u32);
entity_impl!(LoopId, "loop");

#[derive(Debug)]
pub struct LoopData {
    /// The single entry block of the loop.
    pub header: Block,
    /// The loop immediately enclosing this one, if any.
    pub parent: Option<LoopId>,
    /// Blocks with a back edge to the header.
    pub latches: SmallVec<[Block; 2]>,
    /// Every block of the loop, including nested loops. The header is
    /// always first.
    pub members: Vec<Block>,
    /// Nesting depth; outermost loops have depth 1.
    pub depth: u32,
}

#[derive(Debug, Default)]
pub struct LoopForest {
    loops: PrimaryMap<LoopId, LoopData>,
    innermost: SecondaryMap<Block, PackedOption<LoopId>>,
    header_of: SecondaryMap<Block, PackedOption<LoopId>>,
    latch_flag: SecondaryMap<Block, bool>,
}

impl LoopForest {
    /// Discover the natural loops of `func`.
    ///
    /// Requires the dominator tree, so sealing computes it first.
    pub fn compute(func: &Function) -> Self {
        let domtree = func.domtree();
        let mut forest = Self::default();

        for &header in domtree.bottom_up() {
            let latches: SmallVec<[Block; 2]> = func
                .preds(header)
                .iter()
                .copied()
                .filter(|&pred| domtree.dominates(header, pred))
                .collect();
            if latches.is_empty() {
                continue;
            }
            let id = forest.loops.push(LoopData {
                header,
                parent: None,
                latches,
                members: Vec::new(),
                depth: 0,
            });
            forest.header_of[header] = id.into();
            for &latch in forest.loops[id].latches.iter() {
                forest.latch_flag[latch] = true;
            }
            forest.map_loop_body(func, id);
            log::trace!(
                target: "loops",
                "{id}: header {header}, {} latch(es)",
                forest.loops[id].latches.len()
            );
        }

        // Fill member lists, innermost loop first along each chain, and
        // settle depths now that parent links are final.
        for l in forest.loops.keys() {
            let header = forest.loops[l].header;
            forest.loops[l].members.push(header);
        }
        for block in func.blocks() {
            let mut chain = forest.innermost[block].expand();
            while let Some(l) = chain {
                if forest.loops[l].header != block {
                    forest.loops[l].members.push(block);
                }
                chain = forest.loops[l].parent;
            }
        }
        for l in forest.loops.keys() {
            let mut depth = 1;
            let mut parent = forest.loops[l].parent;
            while let Some(p) = parent {
                depth += 1;
                parent = forest.loops[p].parent;
            }
            forest.loops[l].depth = depth;
        }

        forest
    }

    /// Trace the body of loop `l` backwards from its latches, claiming
    /// unmapped blocks and reparenting already discovered inner loops.
    fn map_loop_body(&mut self, func: &Function, l: LoopId) {
        let header = self.loops[l].header;
        let mut worklist: Vec<Block> = self.loops[l].latches.iter().copied().collect();
        while let Some(block) = worklist.pop() {
            match self.innermost[block].expand() {
                None => {
                    self.innermost[block] = l.into();
                    if block == header {
                        continue;
                    }
                    worklist.extend_from_slice(func.preds(block));
                }
                Some(sub) => {
                    let mut top = sub;
                    while let Some(parent) = self.loops[top].parent {
                        top = parent;
                    }
                    if top == l {
                        continue;
                    }
                    self.loops[top].parent = Some(l);
                    let sub_header = self.loops[top].header;
                    for &pred in func.preds(sub_header) {
                        if self.innermost[pred].expand() != Some(top) {
                            worklist.push(pred);
                        }
                    }
                }
            }
        }
    }

    pub fn num_loops(&self) -> usize {
        self.loops.len()
    }

    pub fn loops(&self) -> impl Iterator<Item = LoopId> + '_ {
        self.loops.keys()
    }

    pub fn loop_data(&self, l: LoopId) -> &LoopData {
        &self.loops[l]
    }

    /// The innermost loop containing `block`, if any.
    pub fn innermost(&self, block: Block) -> Option<LoopId> {
        self.innermost[block].expand()
    }

    /// The loop that `block` is the header of, if any.
    pub fn loop_of_header(&self, block: Block) -> Option<LoopId> {
        self.header_of[block].expand()
    }

    pub fn is_loop_header(&self, block: Block) -> bool {
        self.header_of[block].is_some()
    }

    /// Whether `block` ends a loop iteration, i.e. carries a back edge.
    pub fn is_loop_end(&self, block: Block) -> bool {
        self.latch_flag[block]
    }

    /// Whether the edge `from -> to` is a loop back edge: `to` heads a
    /// loop and `from` is one of its latches.
    pub fn is_backedge(&self, from: Block, to: Block) -> bool {
        match self.header_of[to].expand() {
            Some(l) => self.loops[l].latches.contains(&from),
            None => false,
        }
    }

    pub fn members(&self, l: LoopId) -> &[Block] {
        &self.loops[l].members
    }

    pub fn latches(&self, l: LoopId) -> &[Block] {
        &self.loops[l].latches
    }

    /// How many loops enclose `block`.
    pub fn loop_depth(&self, block: Block) -> usize {
        let mut depth = 0;
        let mut chain = self.innermost[block].expand();
        while let Some(l) = chain {
            depth += 1;
            chain = self.loops[l].parent;
        }
        depth
    }

    pub fn contains(&self, l: LoopId, block: Block) -> bool {
        let mut chain = self.innermost[block].expand();
        while let Some(c) = chain {
            if c == l {
                return true;
            }
            chain = self.loops[c].parent;
        }
        false
    }
}
