//! Data structures for Flint's low-level intermediate representation (LIR).
//!
//! The LIR is the instruction-level form handed to register allocation. This
//! crate defines the operand and instruction model, basic blocks and
//! functions, and the derived structure every backend pass leans on: block
//! traversal orders, the dominator tree, and the natural-loop forest. It
//! deliberately knows nothing about instruction selection or target ISAs;
//! instructions here are just ordered lists of mode-tagged operand accesses,
//! which is the only thing liveness analysis and SSI construction care about.

#![no_std]

extern crate alloc;

#[cfg(test)]
extern crate std;

pub mod ir;

pub use self::ir::*;
