// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! Path-copying `get`/`set`/`push`/`pop` over the dense vector trie node
//! layout in [`super::node`], per `SPEC_FULL.md` §4.5. Indices are
//! consumed top-down, most-significant 5-bit digit first, the mirror
//! image of the HAMT's least-significant-first hash consumption: a
//! vector's branching is driven by a fixed, known-in-advance index
//! rather than an opaque hash, so top-down radix keeps `get`/`set`
//! trivial arithmetic instead of a second cursor type.

use crate::arena::{Arena, NULL};
use crate::error::{Error, Result};

use super::node::{self, MASK, WIDTH};

fn capacity(depth: u32) -> u64 {
    (WIDTH as u64).pow(depth + 1)
}

fn digit(idx: u32, level: u32) -> u32 {
    (idx >> (node::BITS * level)) & MASK
}

pub fn get_f64(arena: &Arena, root: u32, depth: u32, idx: u32) -> f64 {
    let mut node = root;
    for level in (1..=depth).rev() {
        node = node::child_at(arena, node, digit(idx, level));
    }
    node::slot_f64(arena, node, digit(idx, 0))
}

pub fn get_word(arena: &Arena, root: u32, depth: u32, idx: u32) -> u32 {
    let mut node = root;
    for level in (1..=depth).rev() {
        node = node::child_at(arena, node, digit(idx, level));
    }
    node::slot_word(arena, node, digit(idx, 0))
}

fn rec_f64(arena: &mut Arena, n: u32, level: u32, idx: u32, value: f64) -> Result<u32> {
    if level == 0 {
        return if n == NULL {
            let mut values = [0.0f64; WIDTH as usize];
            values[digit(idx, 0) as usize] = value;
            node::alloc_leaf_f64(arena, &values)
        } else {
            node::copy_leaf_with_f64(arena, n, digit(idx, 0), value)
        };
    }
    let d = digit(idx, level);
    let child = if n == NULL { NULL } else { node::child_at(arena, n, d) };
    let new_child = rec_f64(arena, child, level - 1, idx, value)?;
    if n == NULL {
        let mut children = [NULL; WIDTH as usize];
        children[d as usize] = new_child;
        node::alloc_internal(arena, &children)
    } else {
        node::copy_internal_with_child(arena, n, d, new_child)
    }
}

fn rec_word(arena: &mut Arena, n: u32, level: u32, idx: u32, value: u32) -> Result<u32> {
    if level == 0 {
        return if n == NULL {
            let leaf = node::alloc_empty_leaf(arena)?;
            let fresh = node::copy_leaf_with_word(arena, leaf, digit(idx, 0), value)?;
            node::decref_leaf(arena, leaf)?;
            Ok(fresh)
        } else {
            node::copy_leaf_with_word(arena, n, digit(idx, 0), value)
        };
    }
    // word leaves go through the scratch-alloc-then-copy path above since
    // `copy_leaf_with_word` (unlike the f64 variant) already walks the
    // existing leaf's other slots via the arena rather than a local array.
    let d = digit(idx, level);
    let child = if n == NULL { NULL } else { node::child_at(arena, n, d) };
    let new_child = rec_word(arena, child, level - 1, idx, value)?;
    if n == NULL {
        let mut children = [NULL; WIDTH as usize];
        children[d as usize] = new_child;
        node::alloc_internal(arena, &children)
    } else {
        node::copy_internal_with_child(arena, n, d, new_child)
    }
}

pub fn set_f64(arena: &mut Arena, root: u32, depth: u32, size: u32, idx: u32, value: f64) -> Result<u32> {
    if idx >= size {
        return Err(Error::IndexOutOfRange(idx as usize, size as usize));
    }
    rec_f64(arena, root, depth, idx, value)
}

pub fn set_word(arena: &mut Arena, root: u32, depth: u32, size: u32, idx: u32, value: u32) -> Result<u32> {
    if idx >= size {
        return Err(Error::IndexOutOfRange(idx as usize, size as usize));
    }
    rec_word(arena, root, depth, idx, value)
}

/// `(new_root, new_depth, new_size)`.
pub fn push_f64(arena: &mut Arena, root: u32, depth: u32, size: u32, value: f64) -> Result<(u32, u32, u32)> {
    if (size as u64) < capacity(depth) {
        let new_root = rec_f64(arena, root, depth, size, value)?;
        return Ok((new_root, depth, size + 1));
    }
    let mut children = [NULL; WIDTH as usize];
    if root != NULL {
        node::incref(arena, root)?;
    }
    children[0] = root;
    let base = node::alloc_internal(arena, &children)?;
    let new_root = rec_f64(arena, base, depth + 1, size, value)?;
    // `base`'s own reference to `root` (the manual incref above) is
    // surplus once `new_root` has folded it into a freshly copied path;
    // `base` is never internal-beneath-a-leaf from its own point of view
    // here, it *is* the (depth+1)-deep node, so its children sit at the
    // original `depth`.
    node::decref_node(arena, base, depth + 1, false)?;
    Ok((new_root, depth + 1, size + 1))
}

pub fn push_word(arena: &mut Arena, root: u32, depth: u32, size: u32, value: u32) -> Result<(u32, u32, u32)> {
    if (size as u64) < capacity(depth) {
        let new_root = rec_word(arena, root, depth, size, value)?;
        return Ok((new_root, depth, size + 1));
    }
    let mut children = [NULL; WIDTH as usize];
    if root != NULL {
        node::incref(arena, root)?;
    }
    children[0] = root;
    let base = node::alloc_internal(arena, &children)?;
    let new_root = rec_word(arena, base, depth + 1, size, value)?;
    node::decref_node(arena, base, depth + 1, true)?;
    Ok((new_root, depth + 1, size + 1))
}

/// `(new_root, new_depth, new_size)`. Caller guarantees `size > 0`.
pub fn pop(arena: &mut Arena, root: u32, depth: u32, size: u32, is_blob: bool) -> Result<(u32, u32, u32)> {
    let new_size = size - 1;
    if depth > 0 && (new_size as u64) <= capacity(depth - 1) {
        let child0 = node::child_at(arena, root, 0);
        node::incref(arena, child0)?;
        node::decref_internal(arena, root, depth, is_blob)?;
        Ok((child0, depth - 1, new_size))
    } else {
        node::incref(arena, root)?;
        Ok((root, depth, new_size))
    }
}
