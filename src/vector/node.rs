// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! Byte-level node layout for the vector trie (`SPEC_FULL.md` §3.2):
//! fixed-width, dense 32-slot nodes rather than the HAMT's sparse
//! bitmap-indexed ones, since every slot below the logical `size` is
//! populated and the branching factor never varies with occupancy.

use crate::arena::{Arena, NULL};
use crate::error::Result;
use crate::refcount::{self, pack_header};

pub const WIDTH: u32 = 32;
pub const BITS: u32 = 5;
pub const MASK: u32 = 0x1F;

const INTERNAL_LEN: u32 = 4 + WIDTH * 4;
const LEAF_LEN: u32 = 4 + WIDTH * 8;

pub fn child_at(arena: &Arena, node: u32, slot: u32) -> u32 {
    arena.read_u32(node + 4 + 4 * slot)
}

fn set_child_at(arena: &mut Arena, node: u32, slot: u32, child: u32) {
    arena.write_u32(node + 4 + 4 * slot, child);
}

pub fn slot_word(arena: &Arena, leaf: u32, slot: u32) -> u32 {
    let lo = arena.read_u32(leaf + 4 + 8 * slot);
    lo
}

pub fn slot_f64(arena: &Arena, leaf: u32, slot: u32) -> f64 {
    arena.read_f64(leaf + 4 + 8 * slot)
}

fn set_slot_f64(arena: &mut Arena, leaf: u32, slot: u32, value: f64) {
    arena.write_f64(leaf + 4 + 8 * slot, value);
}

/// Non-`f64` leaves store a packed blob offset/length word in the low
/// four bytes of the 8-byte slot; the high four bytes are unused padding
/// kept so every leaf slot is uniformly 8 bytes wide.
fn set_slot_word(arena: &mut Arena, leaf: u32, slot: u32, word: u32) {
    arena.write_u32(leaf + 4 + 8 * slot, word);
    arena.write_u32(leaf + 4 + 8 * slot + 4, 0);
}

pub fn alloc_internal(arena: &mut Arena, children: &[u32; WIDTH as usize]) -> Result<u32> {
    let offset = arena.alloc(INTERNAL_LEN)?;
    arena.write_u32(offset, pack_header(1, 0));
    for (i, &child) in children.iter().enumerate() {
        set_child_at(arena, offset, i as u32, child);
    }
    Ok(offset)
}

pub fn alloc_empty_internal(arena: &mut Arena) -> Result<u32> {
    alloc_internal(arena, &[NULL; WIDTH as usize])
}

pub fn alloc_leaf_f64(arena: &mut Arena, values: &[f64; WIDTH as usize]) -> Result<u32> {
    let offset = arena.alloc(LEAF_LEN)?;
    arena.write_u32(offset, pack_header(1, 0));
    for (i, &v) in values.iter().enumerate() {
        set_slot_f64(arena, offset, i as u32, v);
    }
    Ok(offset)
}

pub fn alloc_empty_leaf(arena: &mut Arena) -> Result<u32> {
    alloc_leaf_f64(arena, &[0.0; WIDTH as usize])
}

pub fn copy_internal_with_child(
    arena: &mut Arena,
    node: u32,
    slot: u32,
    new_child: u32,
) -> Result<u32> {
    let mut children = [NULL; WIDTH as usize];
    for i in 0..WIDTH {
        let c = child_at(arena, node, i);
        if i == slot {
            children[i as usize] = new_child;
        } else {
            refcount::incref(arena, c)?;
            children[i as usize] = c;
        }
    }
    alloc_internal(arena, &children)
}

pub fn copy_leaf_with_f64(arena: &mut Arena, node: u32, slot: u32, value: f64) -> Result<u32> {
    let mut values = [0.0f64; WIDTH as usize];
    for i in 0..WIDTH {
        values[i as usize] = if i == slot { value } else { slot_f64(arena, node, i) };
    }
    alloc_leaf_f64(arena, &values)
}

/// Every slot carried over unchanged still points at the same blob as
/// `node`, which remains live in its own right — so, exactly like
/// `copy_internal_with_child`'s untouched children, each carried-over
/// blob is increfed for the new leaf's reference to it.
pub fn copy_leaf_with_word(arena: &mut Arena, node: u32, slot: u32, word: u32) -> Result<u32> {
    let offset = arena.alloc(LEAF_LEN)?;
    arena.write_u32(offset, pack_header(1, 0));
    for i in 0..WIDTH {
        let w = if i == slot {
            word
        } else {
            let existing = slot_word(arena, node, i);
            if existing != 0 {
                crate::value::incref_blob(arena, existing)?;
            }
            existing
        };
        set_slot_word(arena, offset, i, w);
    }
    Ok(offset)
}

/// `depth` is the structural depth of `offset` itself (0 = leaf, as in
/// `Vector::depth`); it determines both whether children are leaves or
/// further internal nodes and, at a leaf, whether `is_blob` packed-word
/// slots need their own blob decref.
pub fn decref_internal(arena: &mut Arena, offset: u32, depth: u32, is_blob: bool) -> Result<()> {
    refcount::decref(arena, offset, |arena, off| {
        for i in 0..WIDTH {
            let child = child_at(arena, off, i);
            if child != NULL {
                decref_node(arena, child, depth - 1, is_blob)?;
            }
        }
        arena.free(off)
    })
}

pub fn decref_leaf(arena: &mut Arena, offset: u32) -> Result<()> {
    refcount::decref(arena, offset, |arena, off| arena.free(off))
}

/// Releases a blob-valued leaf: every non-empty slot's blob is decrefed
/// before the leaf node itself is freed, since `copy_leaf_with_word`
/// hands out an incref per carried-over slot and `f64` leaves never do.
pub fn decref_leaf_blob(arena: &mut Arena, offset: u32) -> Result<()> {
    refcount::decref(arena, offset, |arena, off| {
        for i in 0..WIDTH {
            let word = slot_word(arena, off, i);
            if word != 0 {
                crate::value::decref_blob(arena, word)?;
            }
        }
        arena.free(off)
    })
}

/// `depth == 0` means `offset` is a leaf; vector nodes carry no kind tag
/// of their own, so the caller's `Vector::depth`/value-kind bookkeeping
/// always determines how an offset is interpreted during release.
pub fn decref_node(arena: &mut Arena, offset: u32, depth: u32, is_blob: bool) -> Result<()> {
    if offset == NULL {
        return Ok(());
    }
    if depth == 0 {
        if is_blob {
            decref_leaf_blob(arena, offset)
        } else {
            decref_leaf(arena, offset)
        }
    } else {
        decref_internal(arena, offset, depth, is_blob)
    }
}

pub fn incref(arena: &mut Arena, offset: u32) -> Result<()> {
    refcount::incref(arena, offset)
}
