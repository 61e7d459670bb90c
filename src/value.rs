// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! Packed offset/length blob slots (`SPEC_FULL.md` §3.3): a 32-bit word
//! combining a 20-bit arena offset with a 12-bit length, used by
//! non-`f64` vector-trie leaves to point at an inline byte blob allocated
//! from the same arena as every other node. The packing itself is part
//! of the binding byte contract and must never change shape.

use crate::arena::Arena;
use crate::error::{Error, Result};

const LEN_SHIFT: u32 = 20;
const PTR_MASK: u32 = (1 << LEN_SHIFT) - 1;
const MAX_LEN: u32 = (1 << (32 - LEN_SHIFT)) - 1;

pub fn pack(ptr: u32, len: u32) -> u32 {
    debug_assert!(ptr <= PTR_MASK, "blob pointer {ptr} exceeds the 20-bit address window");
    debug_assert!(len <= MAX_LEN, "blob length {len} exceeds the 12-bit length field");
    (ptr & PTR_MASK) | (len << LEN_SHIFT)
}

pub fn unpack(word: u32) -> (u32, u32) {
    (word & PTR_MASK, word >> LEN_SHIFT)
}

/// Allocates `bytes` as a standalone arena blob (a bare 4-byte refcount
/// header followed by the payload, no key/bitmap fields) and returns the
/// packed offset/length word pointing at it.
pub fn alloc_blob(arena: &mut Arena, bytes: &[u8]) -> Result<u32> {
    if bytes.len() as u32 > MAX_LEN {
        return Err(Error::IndexOutOfRange(bytes.len(), MAX_LEN as usize));
    }
    let offset = arena.alloc(4 + bytes.len() as u32)?;
    arena.write_u32(offset, crate::refcount::pack_header(1, 0));
    arena.write_bytes(offset + 4, bytes);
    Ok(pack(offset, bytes.len() as u32))
}

pub fn read_blob<'a>(arena: &'a Arena, word: u32) -> &'a [u8] {
    let (ptr, len) = unpack(word);
    arena.read_bytes(ptr + 4, len)
}

/// Bumps a blob's own refcount when a vector-leaf copy carries the same
/// packed word forward into a freshly allocated leaf.
pub fn incref_blob(arena: &mut Arena, word: u32) -> Result<()> {
    let (ptr, _) = unpack(word);
    crate::refcount::incref(arena, ptr)
}

pub fn decref_blob(arena: &mut Arena, word: u32) -> Result<()> {
    let (ptr, _) = unpack(word);
    crate::refcount::decref(arena, ptr, |arena, off| arena.free(off))
}
