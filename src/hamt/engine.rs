// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! Path-copying lookup/insert/remove over the byte-level node layout in
//! [`super::node`]. Mirrors the teacher's `Node::get_value` /
//! `Node::modify_value` / `Node::rm_value` recursion shape (see
//! `ipld/hamt/src/node.rs`), but walks raw arena offsets instead of typed
//! `Pointer<K, V, H>` children, and never uses a small-bucket overflow
//! array: every slot holds exactly one leaf or one child subtree, and
//! colliding keys are resolved purely by chained internal nodes (`merge`).

use crate::arena::{Arena, NULL};
use crate::error::Result;

use super::cursor::HashCursor;
use super::node;

pub fn lookup(arena: &Arena, root: u32, key_hash: u32, key: &[u8]) -> u32 {
    if root == NULL {
        return NULL;
    }
    let mut cursor = HashCursor::new(key_hash, key);
    lookup_rec(arena, root, &mut cursor, key_hash, key)
}

fn lookup_rec(arena: &Arena, n: u32, cursor: &mut HashCursor, key_hash: u32, key: &[u8]) -> u32 {
    if node::is_leaf(arena, n) {
        return if node::leaf_matches(arena, n, key_hash, key) {
            n
        } else {
            NULL
        };
    }
    let bit = node::bit_for_slice(cursor.next());
    let bm = node::bitmap(arena, n);
    if bm & bit == 0 {
        return NULL;
    }
    let slot = node::slot_for_bit(bm, bit);
    lookup_rec(arena, node::child_at(arena, n, slot), cursor, key_hash, key)
}

/// `(new_root, existed, leaf_offset)`.
pub fn insert(
    arena: &mut Arena,
    root: u32,
    key_hash: u32,
    key: &[u8],
    value: &[u8],
) -> Result<(u32, bool, u32)> {
    let mut cursor = HashCursor::new(key_hash, key);
    insert_rec(arena, root, &mut cursor, key_hash, key, value)
}

fn insert_rec(
    arena: &mut Arena,
    n: u32,
    cursor: &mut HashCursor,
    key_hash: u32,
    key: &[u8],
    value: &[u8],
) -> Result<(u32, bool, u32)> {
    if n == NULL {
        let leaf = node::alloc_leaf(arena, key_hash, key, value)?;
        return Ok((leaf, false, leaf));
    }

    if node::is_leaf(arena, n) {
        if node::leaf_matches(arena, n, key_hash, key) {
            let leaf = node::alloc_leaf(arena, key_hash, key, value)?;
            return Ok((leaf, true, leaf));
        }
        let existing_hash = node::leaf_key_hash(arena, n);
        let existing_key = node::leaf_key(arena, n).to_vec();
        let new_leaf = node::alloc_leaf(arena, key_hash, key, value)?;
        let (shift, ext_round) = cursor.state();
        let cursor_existing = HashCursor::at(existing_hash, &existing_key, shift, ext_round);
        let new_root = node::merge_leaves(arena, n, new_leaf, cursor_existing, cursor.clone())?;
        return Ok((new_root, false, new_leaf));
    }

    let bit = node::bit_for_slice(cursor.next());
    let bm = node::bitmap(arena, n);
    if bm & bit == 0 {
        let leaf = node::alloc_leaf(arena, key_hash, key, value)?;
        let new_node = node::copy_with_insertion(arena, n, bit, leaf)?;
        return Ok((new_node, false, leaf));
    }

    let slot = node::slot_for_bit(bm, bit);
    let child = node::child_at(arena, n, slot);
    let (new_child, existed, leaf) = insert_rec(arena, child, cursor, key_hash, key, value)?;
    let new_node = node::copy_with_replacement(arena, n, slot, new_child)?;
    Ok((new_node, existed, leaf))
}

/// Outcome of a recursive remove: either the key was absent (the subtree
/// is returned unchanged by the caller, size untouched), or it was
/// removed and the (possibly null, on full collapse) replacement subtree
/// is carried back up.
pub enum RemoveOutcome {
    NotFound,
    Removed(u32),
}

pub fn remove(arena: &mut Arena, root: u32, key_hash: u32, key: &[u8]) -> Result<RemoveOutcome> {
    if root == NULL {
        return Ok(RemoveOutcome::NotFound);
    }
    let mut cursor = HashCursor::new(key_hash, key);
    remove_rec(arena, root, &mut cursor, key_hash, key)
}

fn remove_rec(
    arena: &mut Arena,
    n: u32,
    cursor: &mut HashCursor,
    key_hash: u32,
    key: &[u8],
) -> Result<RemoveOutcome> {
    if node::is_leaf(arena, n) {
        return if node::leaf_matches(arena, n, key_hash, key) {
            Ok(RemoveOutcome::Removed(NULL))
        } else {
            Ok(RemoveOutcome::NotFound)
        };
    }

    let bit = node::bit_for_slice(cursor.next());
    let bm = node::bitmap(arena, n);
    if bm & bit == 0 {
        return Ok(RemoveOutcome::NotFound);
    }
    let slot = node::slot_for_bit(bm, bit);
    let child = node::child_at(arena, n, slot);

    match remove_rec(arena, child, cursor, key_hash, key)? {
        RemoveOutcome::NotFound => Ok(RemoveOutcome::NotFound),
        RemoveOutcome::Removed(NULL) => {
            if bm.count_ones() == 1 {
                Ok(RemoveOutcome::Removed(NULL))
            } else {
                let new_node = node::copy_with_removal(arena, n, bit)?;
                Ok(RemoveOutcome::Removed(new_node))
            }
        }
        RemoveOutcome::Removed(new_child) => {
            let new_node = node::copy_with_replacement(arena, n, slot, new_child)?;
            Ok(RemoveOutcome::Removed(new_node))
        }
    }
}
