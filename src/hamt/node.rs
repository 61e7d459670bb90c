// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! Byte-level node layout for the HAMT: the `bitmap` word at offset 4
//! distinguishes a leaf (`bitmap == 0`) from an internal node (bitmap is a
//! 32-bit occupancy mask over child slots), per `SPEC_FULL.md` §3.1.

use crate::arena::{Arena, NULL};
use crate::error::Result;
use crate::refcount::{self, pack_header};

pub const BITS: u32 = 5;
pub const MASK: u32 = 0x1F;

const LEAF_HEADER_LEN: u32 = 20;

pub fn is_leaf(arena: &Arena, offset: u32) -> bool {
    arena.read_u32(offset + 4) == 0
}

pub fn bitmap(arena: &Arena, offset: u32) -> u32 {
    arena.read_u32(offset + 4)
}

pub fn bit_for_slice(slice: u32) -> u32 {
    1u32 << (slice & MASK)
}

pub fn slot_for_bit(bitmap: u32, bit: u32) -> usize {
    (bitmap & (bit - 1)).count_ones() as usize
}

pub fn child_at(arena: &Arena, node: u32, slot: usize) -> u32 {
    arena.read_u32(node + 8 + 4 * slot as u32)
}

fn set_child_at(arena: &mut Arena, node: u32, slot: usize, child: u32) {
    arena.write_u32(node + 8 + 4 * slot as u32, child);
}

/// Overwrites a child slot in place. Only safe to call on a node that is
/// exclusively owned by the current transient session (`SPEC_FULL.md`
/// §4.4); everywhere else, go through `copy_with_replacement`.
pub fn write_child_in_place(arena: &mut Arena, node: u32, slot: usize, child: u32) {
    set_child_at(arena, node, slot, child);
}

pub fn owner(arena: &Arena, offset: u32) -> u8 {
    refcount::header_owner(arena.read_u32(offset))
}

pub fn set_owner(arena: &mut Arena, offset: u32, owner: u8) {
    let header = arena.read_u32(offset);
    let rc = refcount::header_refcount(header);
    arena.write_u32(offset, pack_header(rc, owner));
}

// -- leaf accessors --------------------------------------------------------

pub fn leaf_key_hash(arena: &Arena, offset: u32) -> u32 {
    arena.read_u32(offset + 8)
}

pub fn leaf_key_len(arena: &Arena, offset: u32) -> u32 {
    arena.read_u32(offset + 12)
}

pub fn leaf_val_len(arena: &Arena, offset: u32) -> u32 {
    arena.read_u32(offset + 16)
}

pub fn leaf_key<'a>(arena: &'a Arena, offset: u32) -> &'a [u8] {
    arena.read_bytes(offset + LEAF_HEADER_LEN, leaf_key_len(arena, offset))
}

pub fn leaf_value<'a>(arena: &'a Arena, offset: u32) -> &'a [u8] {
    let key_len = leaf_key_len(arena, offset);
    arena.read_bytes(
        offset + LEAF_HEADER_LEN + key_len,
        leaf_val_len(arena, offset),
    )
}

pub fn leaf_matches(arena: &Arena, offset: u32, key_hash: u32, key: &[u8]) -> bool {
    leaf_key_hash(arena, offset) == key_hash
        && leaf_key_len(arena, offset) as usize == key.len()
        && leaf_key(arena, offset) == key
}

// -- allocation --------------------------------------------------------

pub fn alloc_leaf(arena: &mut Arena, key_hash: u32, key: &[u8], value: &[u8]) -> Result<u32> {
    let payload = LEAF_HEADER_LEN + key.len() as u32 + value.len() as u32;
    let offset = arena.alloc(payload)?;
    arena.write_u32(offset, pack_header(1, 0));
    arena.write_u32(offset + 4, 0);
    arena.write_u32(offset + 8, key_hash);
    arena.write_u32(offset + 12, key.len() as u32);
    arena.write_u32(offset + 16, value.len() as u32);
    arena.write_bytes(offset + LEAF_HEADER_LEN, key);
    arena.write_bytes(offset + LEAF_HEADER_LEN + key.len() as u32, value);
    Ok(offset)
}

pub fn alloc_internal(arena: &mut Arena, bitmap: u32, children: &[u32]) -> Result<u32> {
    debug_assert_eq!(bitmap.count_ones() as usize, children.len());
    let payload = 4 + 4 * children.len() as u32;
    let offset = arena.alloc(payload)?;
    arena.write_u32(offset, pack_header(1, 0));
    arena.write_u32(offset + 4, bitmap);
    for (i, &child) in children.iter().enumerate() {
        set_child_at(arena, offset, i, child);
    }
    Ok(offset)
}

/// Allocates a copy of `node`'s children with the slot at `replace_slot`
/// swapped for `new_child` (when `Some`), or with one slot removed
/// (when `replace_slot` is `None` and `remove_slot` identifies the
/// dropped bit). Every untouched child is increfed since the old node
/// keeps its own reference to it.
pub fn copy_with_replacement(
    arena: &mut Arena,
    node: u32,
    replace_slot: usize,
    new_child: u32,
) -> Result<u32> {
    let bm = bitmap(arena, node);
    let n = bm.count_ones() as usize;
    let mut children = Vec::with_capacity(n);
    for i in 0..n {
        let c = child_at(arena, node, i);
        if i == replace_slot {
            children.push(new_child);
        } else {
            refcount::incref(arena, c)?;
            children.push(c);
        }
    }
    alloc_internal(arena, bm, &children)
}

/// Allocates a copy of `node` with a new child inserted at the slot
/// implied by `bit`. All existing children are increfed.
pub fn copy_with_insertion(
    arena: &mut Arena,
    node: u32,
    bit: u32,
    new_child: u32,
) -> Result<u32> {
    let bm = bitmap(arena, node);
    let slot = slot_for_bit(bm, bit);
    let n = bm.count_ones() as usize;
    let mut children = Vec::with_capacity(n + 1);
    for i in 0..n {
        let c = child_at(arena, node, i);
        refcount::incref(arena, c)?;
        children.push(c);
    }
    children.insert(slot, new_child);
    alloc_internal(arena, bm | bit, &children)
}

/// Allocates a copy of `node` with the child at `bit` removed. All
/// surviving children are increfed.
pub fn copy_with_removal(arena: &mut Arena, node: u32, bit: u32) -> Result<u32> {
    let bm = bitmap(arena, node);
    let slot = slot_for_bit(bm, bit);
    let n = bm.count_ones() as usize;
    let mut children = Vec::with_capacity(n - 1);
    for i in 0..n {
        if i == slot {
            continue;
        }
        let c = child_at(arena, node, i);
        refcount::incref(arena, c)?;
        children.push(c);
    }
    alloc_internal(arena, bm & !bit, &children)
}

/// Splits two leaves that differ by key into one or more chained
/// internal nodes, per `SPEC_FULL.md` §4.3's *merge* rule. `existing` is
/// increfed (it is shared, unmodified structure); `inserted` is a fresh
/// leaf with refcount 1 already and is consumed.
pub fn merge_leaves(
    arena: &mut Arena,
    existing: u32,
    inserted: u32,
    mut cursor_a: crate::hamt::cursor::HashCursor,
    mut cursor_b: crate::hamt::cursor::HashCursor,
) -> Result<u32> {
    let sa = cursor_a.next();
    let sb = cursor_b.next();
    if sa == sb {
        let child = merge_leaves(arena, existing, inserted, cursor_a, cursor_b)?;
        let bit = bit_for_slice(sa);
        return alloc_internal(arena, bit, &[child]);
    }
    refcount::incref(arena, existing)?;
    let bit_a = bit_for_slice(sa);
    let bit_b = bit_for_slice(sb);
    let (children, bm) = if sa < sb {
        (vec![existing, inserted], bit_a | bit_b)
    } else {
        (vec![inserted, existing], bit_a | bit_b)
    };
    alloc_internal(arena, bm, &children)
}

/// Recursively releases a node: decrefs every child first (for internal
/// nodes), then returns the block to the arena. Called only when a
/// node's refcount has just dropped to zero.
pub fn decref_node(arena: &mut Arena, offset: u32) -> Result<()> {
    refcount::decref(arena, offset, |arena, off| {
        if !is_leaf(arena, off) {
            let bm = bitmap(arena, off);
            for i in 0..bm.count_ones() as usize {
                let child = child_at(arena, off, i);
                decref_node(arena, child)?;
            }
        }
        arena.free(off)
    })
}

pub fn incref_node(arena: &mut Arena, offset: u32) -> Result<()> {
    refcount::incref(arena, offset)
}

pub const _NULL: u32 = NULL;
