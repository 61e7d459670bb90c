// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! Per-node refcounts packed into the low 24 bits of every node's 4-byte
//! header word; the high 8 bits carry the transient owner tag (`§4.4`).
//!
//! This module only knows about the header word itself. Recursive child
//! release on a drop to zero is kind-specific (a HAMT internal node walks
//! its bitmap, a vector trie internal node walks its 32 fixed slots), so
//! callers supply that behaviour as `on_zero`.

use crate::arena::{Arena, NULL};
use crate::error::{Error, Result};

const REFCOUNT_MASK: u32 = 0x00FF_FFFF;
const OWNER_SHIFT: u32 = 24;

pub fn header_refcount(header: u32) -> u32 {
    header & REFCOUNT_MASK
}

pub fn header_owner(header: u32) -> u8 {
    (header >> OWNER_SHIFT) as u8
}

pub fn pack_header(refcount: u32, owner: u8) -> u32 {
    (refcount & REFCOUNT_MASK) | ((owner as u32) << OWNER_SHIFT)
}

/// Adds one reference. A no-op on the null offset, so callers can
/// unconditionally incref a possibly-absent child slot.
pub fn incref(arena: &mut Arena, offset: u32) -> Result<()> {
    if offset == NULL {
        return Ok(());
    }
    let header = arena.read_u32(offset);
    let rc = header_refcount(header);
    if rc >= REFCOUNT_MASK {
        debug_assert!(false, "refcount saturation at offset {offset}");
        return Err(Error::RefcountOverflow(offset));
    }
    arena.write_u32(offset, pack_header(rc + 1, header_owner(header)));
    Ok(())
}

/// Subtracts one reference. If the count reaches zero, `on_zero` is
/// responsible for recursively decref-ing this node's children and
/// returning the block to the arena; `decref` itself never calls
/// `arena.free`.
pub fn decref<F>(arena: &mut Arena, offset: u32, on_zero: F) -> Result<()>
where
    F: FnOnce(&mut Arena, u32) -> Result<()>,
{
    if offset == NULL {
        return Ok(());
    }
    let header = arena.read_u32(offset);
    let rc = header_refcount(header);
    debug_assert!(rc > 0, "decref on a node with zero refcount at offset {offset}");
    if rc <= 1 {
        on_zero(arena, offset)
    } else {
        arena.write_u32(offset, pack_header(rc - 1, header_owner(header)));
        Ok(())
    }
}
