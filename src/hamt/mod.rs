// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! The persistent associative map: a small `(root, size)` value wrapping
//! the byte-level engine in [`engine`], per `SPEC_FULL.md` §2, §3.6.
//!
//! A [`Map`] is intentionally not an owner of the arena (unlike, say, a
//! `BlockStore`-backed handle in the teacher corpus): several `Map`
//! values routinely share structure at once (`SPEC_FULL.md` §8, property
//! 7 — branch isolation), which an arena-owning wrapper could not
//! express in safe Rust. Every operation therefore takes `&Arena` or
//! `&mut Arena` explicitly, and sharing/dropping refcounts is the
//! caller's job via [`Map::clone_handle`] / [`Map::release`].

pub mod cursor;
pub mod engine;
pub mod iter;
pub mod node;
pub mod transient;

use byteorder::{ByteOrder, LittleEndian};

use crate::arena::{Arena, NULL};
use crate::error::Result;
use crate::hash::{avalanche, fnv1a};

pub use iter::Iter;
pub use transient::TransientBatch;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Map {
    root: u32,
    size: u32,
}

impl Map {
    pub fn empty() -> Self {
        Self { root: NULL, size: 0 }
    }

    /// Reconstructs a handle from an externally-held `(root, size)` pair,
    /// e.g. after a snapshot handoff (`SPEC_FULL.md` §6.3). Does not
    /// incref; the caller already owns the reference being handed over.
    pub fn from_parts(root: u32, size: u32) -> Self {
        Self { root, size }
    }

    pub fn root(&self) -> u32 {
        self.root
    }

    pub fn len(&self) -> u32 {
        self.size
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// Produces an independent handle sharing this map's root; bumps the
    /// root's refcount so both handles may be released separately.
    pub fn clone_handle(&self, arena: &mut Arena) -> Result<Self> {
        node::incref_node(arena, self.root)?;
        Ok(*self)
    }

    /// Recursively decrefs this handle's root. Call exactly once per
    /// handle that will not be cloned or read again.
    pub fn release(self, arena: &mut Arena) -> Result<()> {
        if self.root == NULL {
            return Ok(());
        }
        node::decref_node(arena, self.root)
    }

    pub fn get<'a>(&self, arena: &'a Arena, key: &[u8]) -> Option<&'a [u8]> {
        let leaf = engine::lookup(arena, self.root, fnv1a(key), key);
        if leaf == NULL {
            None
        } else {
            Some(node::leaf_value(arena, leaf))
        }
    }

    pub fn has(&self, arena: &Arena, key: &[u8]) -> bool {
        engine::lookup(arena, self.root, fnv1a(key), key) != NULL
    }

    /// Inserts or overwrites `key`. Leaves `self` untouched; returns the
    /// new handle (`SPEC_FULL.md` §8, property 2).
    pub fn set(&self, arena: &mut Arena, key: &[u8], value: &[u8]) -> Result<Self> {
        let (new_root, existed, _) = engine::insert(arena, self.root, fnv1a(key), key, value)?;
        let size = if existed { self.size } else { self.size + 1 };
        Ok(Self { root: new_root, size })
    }

    /// Removes `key` if present. If absent, returns a handle sharing the
    /// same root with the same size (`SPEC_FULL.md` §8, property 5) —
    /// the shared root's refcount is bumped since two handles now
    /// reference it independently.
    pub fn delete(&self, arena: &mut Arena, key: &[u8]) -> Result<Self> {
        match engine::remove(arena, self.root, fnv1a(key), key)? {
            engine::RemoveOutcome::NotFound => {
                node::incref_node(arena, self.root)?;
                Ok(*self)
            }
            engine::RemoveOutcome::Removed(new_root) => Ok(Self { root: new_root, size: self.size - 1 }),
        }
    }

    pub fn iter<'a>(&self, arena: &'a Arena) -> Iter<'a> {
        Iter::new(arena, self.root)
    }

    pub fn for_each<'a, F: FnMut(&'a [u8], &'a [u8])>(&self, arena: &'a Arena, mut f: F) {
        for leaf in self.iter(arena) {
            f(node::leaf_key(arena, leaf), node::leaf_value(arena, leaf));
        }
    }

    /// Reads a little-endian `i32` at `offset` within `key`'s value,
    /// without reconstructing the full value as an owned object
    /// (`SPEC_FULL.md` §4.3, field-at-offset accessors).
    pub fn get_field_i32(&self, arena: &Arena, key: &[u8], offset: usize) -> Option<i32> {
        let value = self.get(arena, key)?;
        Some(LittleEndian::read_i32(&value[offset..offset + 4]))
    }

    pub fn get_field_f64(&self, arena: &Arena, key: &[u8], offset: usize) -> Option<f64> {
        let value = self.get(arena, key)?;
        Some(LittleEndian::read_f64(&value[offset..offset + 8]))
    }

    /// Reads a 4-byte length prefix followed by that many string bytes,
    /// starting at `offset` within `key`'s value.
    pub fn get_field_str<'a>(&self, arena: &'a Arena, key: &[u8], offset: usize) -> Option<&'a [u8]> {
        let value = self.get(arena, key)?;
        let len = LittleEndian::read_u32(&value[offset..offset + 4]) as usize;
        Some(&value[offset + 4..offset + 4 + len])
    }

    /// Opens a batched (transient) mutation session over this handle's
    /// root, per `SPEC_FULL.md` §4.4.
    pub fn transient(self, arena: &mut Arena) -> Result<TransientBatch<'_>> {
        TransientBatch::with_size(arena, self.root, self.size)
    }

    /// Numeric-keyed variant of [`Map::get`] (`SPEC_FULL.md` §6.2,
    /// `getNum`): the key is `idx`'s 4-byte little-endian encoding, hashed
    /// with the integer avalanche mix rather than FNV-1a so adjacent
    /// indices spread across trie slots instead of clustering.
    pub fn get_num<'a>(&self, arena: &'a Arena, idx: u32) -> Option<&'a [u8]> {
        let key = idx.to_le_bytes();
        let leaf = engine::lookup(arena, self.root, avalanche(idx), &key);
        if leaf == NULL {
            None
        } else {
            Some(node::leaf_value(arena, leaf))
        }
    }

    pub fn has_num(&self, arena: &Arena, idx: u32) -> bool {
        engine::lookup(arena, self.root, avalanche(idx), &idx.to_le_bytes()) != NULL
    }

    /// `insertNum`.
    pub fn set_num(&self, arena: &mut Arena, idx: u32, value: &[u8]) -> Result<Self> {
        let key = idx.to_le_bytes();
        let (new_root, existed, _) = engine::insert(arena, self.root, avalanche(idx), &key, value)?;
        let size = if existed { self.size } else { self.size + 1 };
        Ok(Self { root: new_root, size })
    }

    /// `removeNum`.
    pub fn delete_num(&self, arena: &mut Arena, idx: u32) -> Result<Self> {
        let key = idx.to_le_bytes();
        match engine::remove(arena, self.root, avalanche(idx), &key)? {
            engine::RemoveOutcome::NotFound => {
                node::incref_node(arena, self.root)?;
                Ok(*self)
            }
            engine::RemoveOutcome::Removed(new_root) => Ok(Self { root: new_root, size: self.size - 1 }),
        }
    }

    /// `getNumInfo`: the stored value's length without copying it out,
    /// mirroring the byte-buffer `getInfo` op's `valLen` field.
    pub fn get_num_info(&self, arena: &Arena, idx: u32) -> Option<u32> {
        self.get_num(arena, idx).map(|v| v.len() as u32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arena::ArenaConfig;

    fn new_arena() -> Arena {
        Arena::new(ArenaConfig::default())
    }

    #[test]
    fn scenario_s1_set_then_get_on_a_fresh_map() {
        let mut arena = new_arena();
        let h0 = Map::empty();
        let h1 = h0.set(&mut arena, b"foo", b"bar").unwrap();
        assert_eq!(h1.get(&arena, b"foo"), Some(&b"bar"[..]));
        assert_eq!(h1.len(), 1);
        assert_eq!(h0.get(&arena, b"foo"), None);
    }

    #[test]
    fn scenario_s4_branch_isolation() {
        let mut arena = new_arena();
        let h1 = Map::empty();
        let h2 = h1.set(&mut arena, b"a", b"1").unwrap();
        let h3 = h2.set(&mut arena, b"b", b"2").unwrap();
        let h4 = h2.set(&mut arena, b"c", b"3").unwrap();
        assert!(h3.has(&arena, b"a"));
        assert!(h3.has(&arena, b"b"));
        assert!(!h3.has(&arena, b"c"));
        assert!(h4.has(&arena, b"a"));
        assert!(h4.has(&arena, b"c"));
        assert!(!h4.has(&arena, b"b"));
    }

    #[test]
    fn idempotent_set_does_not_grow_size() {
        let mut arena = new_arena();
        let h1 = Map::empty().set(&mut arena, b"k", b"v").unwrap();
        let h2 = h1.set(&mut arena, b"k", b"v").unwrap();
        assert_eq!(h2.len(), 1);
        assert_eq!(h2.get(&arena, b"k"), Some(&b"v"[..]));
    }

    #[test]
    fn delete_of_absent_key_preserves_root_and_size() {
        let mut arena = new_arena();
        let h1 = Map::empty().set(&mut arena, b"k", b"v").unwrap();
        let h2 = h1.delete(&mut arena, b"missing").unwrap();
        assert_eq!(h2.root(), h1.root());
        assert_eq!(h2.len(), h1.len());
    }

    #[test]
    fn delete_inverse_property() {
        let mut arena = new_arena();
        let h1 = Map::empty().set(&mut arena, b"k", b"v").unwrap();
        let h2 = h1.delete(&mut arena, b"k").unwrap();
        assert!(!h2.has(&arena, b"k"));
        assert_eq!(h2.len(), 0);
    }

    #[test]
    fn field_at_offset_accessors_read_without_full_reconstruction() {
        let mut arena = new_arena();
        let mut value = Vec::new();
        value.extend_from_slice(&42i32.to_le_bytes());
        value.extend_from_slice(&3.5f64.to_le_bytes());
        let name = b"alice";
        value.extend_from_slice(&(name.len() as u32).to_le_bytes());
        value.extend_from_slice(name);
        let h = Map::empty().set(&mut arena, b"rec", &value).unwrap();
        assert_eq!(h.get_field_i32(&arena, b"rec", 0), Some(42));
        assert_eq!(h.get_field_f64(&arena, b"rec", 4), Some(3.5));
        assert_eq!(h.get_field_str(&arena, b"rec", 12), Some(&b"alice"[..]));
    }

    #[test]
    fn transient_batch_matches_persistent_insert_for_reads() {
        let mut arena = new_arena();
        let h0 = Map::empty();
        let h1 = {
            let mut batch = h0.transient(&mut arena).unwrap();
            for i in 0..64u32 {
                let k = format!("k{i}");
                batch.insert(k.as_bytes(), format!("v{i}").as_bytes()).unwrap();
            }
            batch.finish()
        };
        assert_eq!(h1.len(), 64);
        for i in 0..64u32 {
            let k = format!("k{i}");
            let v = format!("v{i}");
            assert_eq!(h1.get(&arena, k.as_bytes()), Some(v.as_bytes()));
        }
    }

    #[test]
    fn numeric_keyed_api_round_trips_and_never_aliases_string_keys() {
        let mut arena = new_arena();
        let mut h = Map::empty();
        for i in 0..200u32 {
            h = h.set_num(&mut arena, i, &i.to_le_bytes()).unwrap();
        }
        // A string key spelled identically to a numeric key's raw bytes
        // must not collide, since numeric keys hash through `avalanche`
        // while string keys hash through `fnv1a`.
        h = h.set(&mut arena, &7u32.to_le_bytes(), b"not-the-numeric-seven").unwrap();

        for i in 0..200u32 {
            assert!(h.has_num(&arena, i));
            assert_eq!(h.get_num(&arena, i), Some(&i.to_le_bytes()[..]));
            assert_eq!(h.get_num_info(&arena, i), Some(4));
        }
        assert_eq!(h.get(&arena, &7u32.to_le_bytes()), Some(&b"not-the-numeric-seven"[..]));
        assert_eq!(h.get_num(&arena, 7), Some(&7u32.to_le_bytes()[..]));

        h = h.delete_num(&mut arena, 100).unwrap();
        assert!(!h.has_num(&arena, 100));
        assert!(h.has(&arena, &7u32.to_le_bytes()));
        assert_eq!(h.get_num_info(&arena, 100), None);
    }
}
