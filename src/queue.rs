// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! FIFO adapter over [`crate::vector::Vector`]: `enqueue` appends at the
//! tail, `dequeue` advances a logical `head` index with no reclamation of
//! the dequeued prefix, per `SPEC_FULL.md` §4.5.

use crate::arena::Arena;
use crate::error::Result;
use crate::vector::{Vector, ValueKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Queue {
    vec: Vector,
    head: u32,
}

impl Queue {
    pub fn empty() -> Self {
        Self { vec: Vector::empty(), head: 0 }
    }

    pub fn from_parts(root: u32, depth: u32, size: u32, head: u32) -> Self {
        Self { vec: Vector::from_parts(root, depth, size, ValueKind::F64), head }
    }

    pub fn root(&self) -> u32 {
        self.vec.root()
    }

    pub fn depth(&self) -> u32 {
        self.vec.depth()
    }

    pub fn head(&self) -> u32 {
        self.head
    }

    pub fn len(&self) -> u32 {
        self.vec.len() - self.head
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clone_handle(&self, arena: &mut Arena) -> Result<Self> {
        Ok(Self { vec: self.vec.clone_handle(arena)?, head: self.head })
    }

    pub fn release(self, arena: &mut Arena) -> Result<()> {
        self.vec.release(arena)
    }

    pub fn enqueue(&self, arena: &mut Arena, v: f64) -> Result<Self> {
        Ok(Self { vec: self.vec.push(arena, v)?, head: self.head })
    }

    pub fn peek(&self, arena: &Arena) -> Option<f64> {
        if self.is_empty() {
            None
        } else {
            self.vec.get(arena, self.head)
        }
    }

    /// Advances `head` by one, returning the new handle and the element
    /// that was at the front, or `None` if already empty.
    ///
    /// No trie allocation happens here — only the logical `head` moves —
    /// so unlike `push`/`enqueue` the returned handle shares its root
    /// with `self` rather than pointing at a freshly copied path. Both
    /// handles are independently live afterwards, so the shared root's
    /// refcount is bumped accordingly (mirrors `Map::delete`'s
    /// absent-key branch, the same "two handles, one existing node"
    /// situation).
    pub fn dequeue(&self, arena: &mut Arena) -> Result<(Self, Option<f64>)> {
        if self.is_empty() {
            return Ok((*self, None));
        }
        let front = self.vec.get(arena, self.head);
        let vec = self.vec.clone_handle(arena)?;
        Ok((Self { vec, head: self.head + 1 }, front))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arena::ArenaConfig;

    #[test]
    fn scenario_s6_fifo_order_and_drains_to_empty() {
        let mut arena = Arena::new(ArenaConfig::default());
        let mut q = Queue::empty();
        for i in 1..=5 {
            q = q.enqueue(&mut arena, i as f64).unwrap();
        }
        let mut seen = Vec::new();
        loop {
            let (next, front) = q.dequeue(&mut arena).unwrap();
            q = next;
            match front {
                Some(v) => seen.push(v),
                None => break,
            }
        }
        assert_eq!(seen, vec![1.0, 2.0, 3.0, 4.0, 5.0]);
        assert_eq!(q.len(), 0);
        assert!(q.is_empty());
    }
}
