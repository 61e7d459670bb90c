// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! Reader-side reconstruction from a producer's exposed state
//! (`SPEC_FULL.md` §5, §6.3): a reader takes the raw bytes plus
//! `(heapEnd, freeListHead)` and a root handed to it out-of-band, and
//! walks the same nodes with no copying beyond the byte buffer itself.
//!
//! Wraps [`Arena::attach`], which refuses every mutation entry point, so
//! a misbehaving reader that calls `set`/`push`/`delete` fails with
//! [`crate::error::Error::ReadOnlyArena`] instead of corrupting the free
//! list.

use crate::arena::{Arena, ArenaConfig};
use crate::hamt::Map;
use crate::queue::Queue;
use crate::set::Set;
use crate::stack::Stack;
use crate::vector::Vector;

/// A read-only view over a producer's arena bytes.
pub struct Snapshot {
    arena: Arena,
}

impl Snapshot {
    /// `bytes` is either a shared view over the producer's buffer or a
    /// copy of it; either way this snapshot never mutates it.
    pub fn attach(bytes: Vec<u8>, heap_end: u32, free_list: u32, config: ArenaConfig) -> Self {
        Self { arena: Arena::attach(bytes, heap_end, free_list, config) }
    }

    pub fn arena(&self) -> &Arena {
        &self.arena
    }

    pub fn map(&self, root: u32, size: u32) -> Map {
        Map::from_parts(root, size)
    }

    pub fn set(&self, root: u32, size: u32) -> Set {
        Set::from_parts(root, size)
    }

    pub fn vector(&self, root: u32, depth: u32, size: u32, kind: crate::vector::ValueKind) -> Vector {
        Vector::from_parts(root, depth, size, kind)
    }

    pub fn stack(&self, root: u32, depth: u32, size: u32) -> Stack {
        Stack::from_parts(root, depth, size)
    }

    pub fn queue(&self, root: u32, depth: u32, size: u32, head: u32) -> Queue {
        Queue::from_parts(root, depth, size, head)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cross_attach_reader_recovers_producer_values() {
        let mut producer = Arena::new(ArenaConfig::default());
        let mut root = Map::empty();
        for i in 0..200u32 {
            let k = format!("k{i}");
            let v = format!("v{i}");
            root = root.set(&mut producer, k.as_bytes(), v.as_bytes()).unwrap();
        }

        let snapshot = Snapshot::attach(
            producer.bytes().to_vec(),
            producer.heap_end(),
            producer.free_list(),
            ArenaConfig::default(),
        );
        let reader_map = snapshot.map(root.root(), root.len());
        for i in 0..200u32 {
            let k = format!("k{i}");
            let v = format!("v{i}");
            assert_eq!(reader_map.get(snapshot.arena(), k.as_bytes()), Some(v.as_bytes()));
            assert_eq!(
                reader_map.get(snapshot.arena(), k.as_bytes()),
                root.get(&producer, k.as_bytes())
            );
        }
        assert!(snapshot.arena().is_readonly());
    }
}
