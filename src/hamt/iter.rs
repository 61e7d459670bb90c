// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! Depth-first, leftmost-first iteration over a HAMT root using an
//! explicit stack rather than recursion or a coroutine, per
//! `SPEC_FULL.md` §4.3/§9. The fixed `ITER_STACK` arena region exists for
//! a cross-language bridge to drive the same cursor over raw bytes; this
//! native iterator keeps its stack as a plain `Vec` for idiomatic Rust
//! ergonomics, since the bridge itself is an external collaborator (§1).

use crate::arena::{Arena, NULL};

use super::node;

pub struct Iter<'a> {
    arena: &'a Arena,
    stack: Vec<u32>,
}

impl<'a> Iter<'a> {
    pub fn new(arena: &'a Arena, root: u32) -> Self {
        let mut stack = Vec::new();
        if root != NULL {
            stack.push(root);
        }
        Self { arena, stack }
    }

    /// Fills `out` with up to `out.len()` leaf offsets, returning the
    /// number written. Lets a caller amortise the per-call overhead of
    /// draining the iterator one leaf at a time.
    pub fn next_batch(&mut self, out: &mut [u32]) -> usize {
        let mut n = 0;
        while n < out.len() {
            match self.next() {
                Some(leaf) => {
                    out[n] = leaf;
                    n += 1;
                }
                None => break,
            }
        }
        n
    }
}

impl<'a> Iterator for Iter<'a> {
    /// A leaf offset; its key/value are read via `node::leaf_key`/`leaf_value`.
    type Item = u32;

    fn next(&mut self) -> Option<u32> {
        while let Some(n) = self.stack.pop() {
            if node::is_leaf(self.arena, n) {
                return Some(n);
            }
            let bm = node::bitmap(self.arena, n);
            let count = bm.count_ones() as usize;
            // Push in reverse slot order so popping yields leftmost first.
            for slot in (0..count).rev() {
                self.stack.push(node::child_at(self.arena, n, slot));
            }
        }
        None
    }
}
