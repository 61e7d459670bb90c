// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! Persistent vector trie: 32-wide, path-copying, `f64`-lane or
//! packed-blob leaves, per `SPEC_FULL.md` §3.2/§4.5.
//!
//! A [`Vector`] is a small value type — `(root, depth, size)` — rather
//! than a struct owning the arena: several vectors can share structure
//! and coexist the same way [`crate::hamt::Map`] handles do, which an
//! arena-owning wrapper could not express. Refcount bookkeeping is the
//! caller's responsibility via [`Vector::clone_handle`] and
//! [`Vector::release`]; see `SPEC_FULL.md` §3.6 and §9.

pub mod engine;
pub mod node;

use crate::arena::{Arena, NULL};
use crate::error::Result;
use crate::value;

/// Which of a leaf's two storage shapes this handle's slots follow
/// (`SPEC_FULL.md` §2's "value-type tag" on every handle, §3.3/§3.2).
/// Vector nodes carry no tag of their own, so this is the one thing a
/// `Vector` handle tracks beyond `(root, depth, size)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    F64,
    Blob,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Vector {
    root: u32,
    depth: u32,
    size: u32,
    kind: ValueKind,
}

impl Vector {
    pub fn empty() -> Self {
        Self { root: NULL, depth: 0, size: 0, kind: ValueKind::F64 }
    }

    /// An empty vector of packed-blob (non-`f64`) values.
    pub fn empty_blob() -> Self {
        Self { root: NULL, depth: 0, size: 0, kind: ValueKind::Blob }
    }

    /// Reconstructs a handle from an externally-held `(root, depth, size)`
    /// triple plus its value kind, e.g. after a snapshot handoff
    /// (`SPEC_FULL.md` §6.3). Does not incref; the caller already owns
    /// the reference it is handing over.
    pub fn from_parts(root: u32, depth: u32, size: u32, kind: ValueKind) -> Self {
        Self { root, depth, size, kind }
    }

    pub fn root(&self) -> u32 {
        self.root
    }

    pub fn depth(&self) -> u32 {
        self.depth
    }

    pub fn len(&self) -> u32 {
        self.size
    }

    pub fn kind(&self) -> ValueKind {
        self.kind
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// Produces an independent handle sharing this vector's root; bumps
    /// the root's refcount so both handles may be released separately.
    pub fn clone_handle(&self, arena: &mut Arena) -> Result<Self> {
        node::incref(arena, self.root)?;
        Ok(*self)
    }

    /// Recursively decrefs this handle's root. Call exactly once per
    /// handle that will not be cloned or read again.
    pub fn release(self, arena: &mut Arena) -> Result<()> {
        node::decref_node(arena, self.root, self.depth, self.kind == ValueKind::Blob)
    }

    pub fn get(&self, arena: &Arena, idx: u32) -> Option<f64> {
        debug_assert_eq!(self.kind, ValueKind::F64, "get() on a blob-valued vector");
        if idx >= self.size {
            return None;
        }
        Some(engine::get_f64(arena, self.root, self.depth, idx))
    }

    pub fn get_bytes<'a>(&self, arena: &'a Arena, idx: u32) -> Option<&'a [u8]> {
        debug_assert_eq!(self.kind, ValueKind::Blob, "get_bytes() on an f64-valued vector");
        if idx >= self.size {
            return None;
        }
        let word = engine::get_word(arena, self.root, self.depth, idx);
        Some(value::read_blob(arena, word))
    }

    pub fn set(&self, arena: &mut Arena, idx: u32, v: f64) -> Result<Self> {
        debug_assert_eq!(self.kind, ValueKind::F64, "set() on a blob-valued vector");
        let new_root = engine::set_f64(arena, self.root, self.depth, self.size, idx, v)?;
        Ok(Self { root: new_root, depth: self.depth, size: self.size, kind: self.kind })
    }

    pub fn set_bytes(&self, arena: &mut Arena, idx: u32, v: &[u8]) -> Result<Self> {
        debug_assert_eq!(self.kind, ValueKind::Blob, "set_bytes() on an f64-valued vector");
        let word = value::alloc_blob(arena, v)?;
        let new_root = engine::set_word(arena, self.root, self.depth, self.size, idx, word)?;
        Ok(Self { root: new_root, depth: self.depth, size: self.size, kind: self.kind })
    }

    pub fn push(&self, arena: &mut Arena, v: f64) -> Result<Self> {
        debug_assert_eq!(self.kind, ValueKind::F64, "push() on a blob-valued vector");
        let (root, depth, size) = engine::push_f64(arena, self.root, self.depth, self.size, v)?;
        Ok(Self { root, depth, size, kind: self.kind })
    }

    pub fn push_bytes(&self, arena: &mut Arena, v: &[u8]) -> Result<Self> {
        debug_assert_eq!(self.kind, ValueKind::Blob, "push_bytes() on an f64-valued vector");
        let word = value::alloc_blob(arena, v)?;
        let (root, depth, size) = engine::push_word(arena, self.root, self.depth, self.size, word)?;
        Ok(Self { root, depth, size, kind: self.kind })
    }

    /// Pops the last element, returning the new handle and the popped
    /// value, or `None` if already empty (same handle, untouched).
    pub fn pop(&self, arena: &mut Arena) -> Result<(Self, Option<f64>)> {
        debug_assert_eq!(self.kind, ValueKind::F64, "pop() on a blob-valued vector");
        if self.size == 0 {
            return Ok((*self, None));
        }
        let top = self.get(arena, self.size - 1);
        let (root, depth, size) = engine::pop(arena, self.root, self.depth, self.size, false)?;
        Ok((Self { root, depth, size, kind: self.kind }, top))
    }

    /// Blob-valued counterpart of [`Vector::pop`]. Returns an owned copy
    /// of the popped value since the arena is about to be borrowed
    /// mutably to perform the structural pop itself.
    pub fn pop_bytes(&self, arena: &mut Arena) -> Result<(Self, Option<Vec<u8>>)> {
        debug_assert_eq!(self.kind, ValueKind::Blob, "pop_bytes() on an f64-valued vector");
        if self.size == 0 {
            return Ok((*self, None));
        }
        let top = self.get_bytes(arena, self.size - 1).map(|b| b.to_vec());
        let (root, depth, size) = engine::pop(arena, self.root, self.depth, self.size, true)?;
        Ok((Self { root, depth, size, kind: self.kind }, top))
    }
}
