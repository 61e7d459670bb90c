// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! A single contiguous byte arena: a bump pointer over freshly grown pages,
//! backed by a singly-linked, address-ordered free list for recycled blocks.
//!
//! Every allocation is prefixed by an 8-byte block header `[size:4][nextFree:4]`.
//! The header's `size` field includes the header itself and survives across
//! free/alloc cycles; `nextFree` is meaningful only while the block sits on
//! the free list. Offset `0` is reserved as the null offset, so the first
//! live byte of the arena is the fixed-region prelude (`§3.5`).

use byteorder::{ByteOrder, LittleEndian};
use tracing::{debug, trace};

use crate::error::{Error, Result};

/// Offset of the 8-byte header relative to a block's payload offset.
const BLOCK_HEADER_SIZE: u32 = 8;
/// Smallest block a `free()`'d region is ever kept as (header included).
const MIN_BLOCK_SIZE: u32 = 16;
/// All allocations are rounded up to this alignment.
const ALIGN: u32 = 8;

pub const NULL: u32 = 0;

const KEY_BUF_SIZE: u32 = 4096;
const BATCH_BUF_SIZE: u32 = 4096;
const ITER_STACK_FRAMES: u32 = 256;
const ITER_STACK_SIZE: u32 = ITER_STACK_FRAMES * 4;
const DEFAULT_ROOTS_TABLE_CAPACITY: u32 = 1024;

/// Tunable knobs that govern arena growth and the size of the optional
/// roots table. Every field defaults to the value the binary-layout
/// contract in `SPEC_FULL.md` §3.5 assumes; changing `roots_table_capacity`
/// before the first allocation shifts `heap_start` and is a caller choice
/// that both ends of a snapshot handoff must agree on.
#[derive(Debug, Clone, Copy)]
pub struct ArenaConfig {
    pub page_size: u32,
    pub initial_pages: u32,
    pub roots_table_capacity: u32,
}

impl Default for ArenaConfig {
    fn default() -> Self {
        Self {
            page_size: 64 * 1024,
            initial_pages: 1,
            roots_table_capacity: DEFAULT_ROOTS_TABLE_CAPACITY,
        }
    }
}

/// The arena. Owns the backing bytes, the bump pointer and the free list.
///
/// An `Arena` constructed via [`Arena::attach`] is read-only: it shares (a
/// copy of, or a view over) a producer's bytes and refuses mutation, per
/// the single-producer ownership model in `SPEC_FULL.md` §5.
pub struct Arena {
    bytes: Vec<u8>,
    heap_end: u32,
    free_list: u32,
    config: ArenaConfig,
    readonly: bool,
    transient_open: bool,
    next_owner_tag: u8,
    current_owner_tag: u8,
}

impl Arena {
    pub fn new(config: ArenaConfig) -> Self {
        let roots_table_size = config.roots_table_capacity * 4;
        let heap_start =
            BLOCK_HEADER_SIZE + KEY_BUF_SIZE + BATCH_BUF_SIZE + ITER_STACK_SIZE + roots_table_size;
        let initial_len = (config.page_size * config.initial_pages.max(1)).max(heap_start);
        Self {
            bytes: vec![0u8; initial_len as usize],
            heap_end: heap_start,
            free_list: NULL,
            config,
            readonly: false,
            transient_open: false,
            next_owner_tag: 1,
            current_owner_tag: 0,
        }
    }

    /// Attach to an externally-produced arena snapshot, read-only.
    pub fn attach(bytes: Vec<u8>, heap_end: u32, free_list: u32, config: ArenaConfig) -> Self {
        Self {
            bytes,
            heap_end,
            free_list,
            config,
            readonly: true,
            transient_open: false,
            next_owner_tag: 1,
            current_owner_tag: 0,
        }
    }

    pub fn is_readonly(&self) -> bool {
        self.readonly
    }

    pub fn heap_end(&self) -> u32 {
        self.heap_end
    }

    pub fn set_heap_end(&mut self, v: u32) {
        self.heap_end = v;
    }

    pub fn free_list(&self) -> u32 {
        self.free_list
    }

    pub fn set_free_list(&mut self, v: u32) {
        self.free_list = v;
    }

    pub fn key_buf_offset(&self) -> u32 {
        BLOCK_HEADER_SIZE
    }

    pub fn batch_buf_offset(&self) -> u32 {
        self.key_buf_offset() + KEY_BUF_SIZE
    }

    pub fn iter_stack_offset(&self) -> u32 {
        self.batch_buf_offset() + BATCH_BUF_SIZE
    }

    pub fn roots_table_offset(&self) -> u32 {
        self.iter_stack_offset() + ITER_STACK_SIZE
    }

    pub fn roots_table_capacity(&self) -> u32 {
        self.config.roots_table_capacity
    }

    pub fn heap_start(&self) -> u32 {
        self.roots_table_offset() + self.config.roots_table_capacity * 4
    }

    /// Clears all allocations: the free list is emptied and the bump
    /// pointer is rewound to the start of the heap. Fixed regions are
    /// left as-is (scratch, not addressable state).
    pub fn reset(&mut self) {
        self.heap_end = self.heap_start();
        self.free_list = NULL;
        debug!(heap_start = self.heap_end, "arena reset");
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Registers `offset` in the fixed `ROOTS_TABLE` region, returning the
    /// slot it landed in. An external GC anchors live roots here so a
    /// collector walking the arena from outside this crate's own
    /// refcounts can tell which structures are still reachable
    /// (`SPEC_FULL.md` §3.5); this crate itself never reads the table
    /// back, since its own liveness model is the refcounts in
    /// [`crate::refcount`].
    #[cfg(feature = "roots-table")]
    pub fn register_root(&mut self, offset: u32) -> Result<u32> {
        let cap = self.roots_table_capacity();
        let base = self.roots_table_offset();
        for slot in 0..cap {
            let addr = base + slot * 4;
            if self.read_u32(addr) == NULL {
                self.write_u32(addr, offset);
                trace!(slot, offset, "root registered");
                return Ok(slot);
            }
        }
        Err(Error::RootsTableFull(cap))
    }

    #[cfg(feature = "roots-table")]
    pub fn unregister_root(&mut self, slot: u32) {
        let addr = self.roots_table_offset() + slot * 4;
        self.write_u32(addr, NULL);
        trace!(slot, "root unregistered");
    }

    #[cfg(feature = "roots-table")]
    pub fn root_at(&self, slot: u32) -> u32 {
        self.read_u32(self.roots_table_offset() + slot * 4)
    }

    // -- raw byte access -----------------------------------------------

    /// Catches the common case of a stale handle's offset landing past
    /// `heap_end` (e.g. after `reset`), per `SPEC_FULL.md` §7. Every
    /// fixed-region offset (`KEY_BUF`/`BATCH_BUF`/`ITER_STACK`/
    /// `ROOTS_TABLE`) sits below `heap_start <= heap_end`, so this never
    /// fires for in-bounds prelude access.
    fn debug_check_offset(&self, offset: u32, len: u32) {
        debug_assert!(
            offset.checked_add(len).map_or(false, |end| end <= self.heap_end),
            "offset {offset} (len {len}) is past heap_end {}",
            self.heap_end
        );
    }

    pub fn read_u32(&self, offset: u32) -> u32 {
        self.debug_check_offset(offset, 4);
        LittleEndian::read_u32(&self.bytes[offset as usize..])
    }

    pub fn write_u32(&mut self, offset: u32, value: u32) {
        self.debug_check_offset(offset, 4);
        LittleEndian::write_u32(&mut self.bytes[offset as usize..], value);
    }

    pub fn read_u64(&self, offset: u32) -> u64 {
        self.debug_check_offset(offset, 8);
        LittleEndian::read_u64(&self.bytes[offset as usize..])
    }

    pub fn write_u64(&mut self, offset: u32, value: u64) {
        self.debug_check_offset(offset, 8);
        LittleEndian::write_u64(&mut self.bytes[offset as usize..], value);
    }

    pub fn read_f64(&self, offset: u32) -> f64 {
        f64::from_bits(self.read_u64(offset))
    }

    pub fn write_f64(&mut self, offset: u32, value: f64) {
        self.write_u64(offset, value.to_bits());
    }

    pub fn read_bytes(&self, offset: u32, len: u32) -> &[u8] {
        self.debug_check_offset(offset, len);
        &self.bytes[offset as usize..(offset + len) as usize]
    }

    pub fn write_bytes(&mut self, offset: u32, data: &[u8]) {
        self.debug_check_offset(offset, data.len() as u32);
        self.bytes[offset as usize..offset as usize + data.len()].copy_from_slice(data);
    }

    // -- allocation ------------------------------------------------------

    fn align_up(n: u32) -> u32 {
        (n + ALIGN - 1) & !(ALIGN - 1)
    }

    /// Returns an 8-byte-aligned block of at least `payload_len` usable
    /// bytes. The returned offset points at the payload, i.e. one past the
    /// block header.
    pub fn alloc(&mut self, payload_len: u32) -> Result<u32> {
        if self.readonly {
            return Err(Error::ReadOnlyArena);
        }
        let needed = Self::align_up(payload_len + BLOCK_HEADER_SIZE).max(MIN_BLOCK_SIZE);

        if let Some(offset) = self.alloc_from_free_list(needed) {
            trace!(offset, needed, "alloc: served from free list");
            return Ok(offset);
        }

        self.bump_alloc(needed)
    }

    fn bump_alloc(&mut self, needed: u32) -> Result<u32> {
        while self.heap_end as usize + needed as usize > self.bytes.len() {
            self.grow_page()?;
        }
        let block_start = self.heap_end;
        // Advance heap_end before writing the header so the header write
        // itself falls within bounds under `debug_check_offset`.
        self.heap_end += needed;
        self.write_u32(block_start, needed);
        self.write_u32(block_start + 4, NULL);
        trace!(offset = block_start + BLOCK_HEADER_SIZE, needed, "alloc: bumped heap_end");
        Ok(block_start + BLOCK_HEADER_SIZE)
    }

    fn grow_page(&mut self) -> Result<()> {
        let page = self.config.page_size;
        let new_len = self
            .bytes
            .len()
            .checked_add(page as usize)
            .ok_or(Error::ArenaExhausted { page_size: page as usize })?;
        self.bytes.resize(new_len, 0);
        debug!(new_len, page, "arena grew by one page");
        Ok(())
    }

    /// First-fit walk of the address-ordered free list.
    fn alloc_from_free_list(&mut self, needed: u32) -> Option<u32> {
        let mut prev: u32 = NULL;
        let mut cur = self.free_list;
        while cur != NULL {
            let size = self.read_u32(cur);
            let next = self.read_u32(cur + 4);
            if size >= needed {
                self.unlink_free(prev, cur, next);
                let remainder = size - needed;
                if remainder >= MIN_BLOCK_SIZE {
                    self.write_u32(cur, needed);
                    let rem_start = cur + needed;
                    self.insert_free_sorted(rem_start, remainder);
                }
                return Some(cur + BLOCK_HEADER_SIZE);
            }
            prev = cur;
            cur = next;
        }
        None
    }

    fn unlink_free(&mut self, prev: u32, cur: u32, next: u32) {
        if prev == NULL {
            self.free_list = next;
        } else {
            self.write_u32(prev + 4, next);
        }
        let _ = cur;
    }

    fn insert_free_sorted(&mut self, block_start: u32, size: u32) {
        self.write_u32(block_start, size);
        let mut prev: u32 = NULL;
        let mut cur = self.free_list;
        while cur != NULL && cur < block_start {
            prev = cur;
            cur = self.read_u32(cur + 4);
        }
        self.write_u32(block_start + 4, cur);
        if prev == NULL {
            self.free_list = block_start;
        } else {
            self.write_u32(prev + 4, block_start);
        }
    }

    /// Removes the free block starting exactly at `start`, if any, and
    /// returns its size. Used to merge with the block that immediately
    /// follows a freed one.
    fn remove_free_at(&mut self, start: u32) -> Option<u32> {
        let mut prev: u32 = NULL;
        let mut cur = self.free_list;
        while cur != NULL {
            let next = self.read_u32(cur + 4);
            if cur == start {
                let size = self.read_u32(cur);
                self.unlink_free(prev, cur, next);
                return Some(size);
            }
            if cur > start {
                return None;
            }
            prev = cur;
            cur = next;
        }
        None
    }

    /// Removes the free block whose `[start, start+size)` ends exactly at
    /// `end`, if any, and returns `(start, size)`. Used to merge with the
    /// block that immediately precedes a freed one.
    fn remove_free_ending_at(&mut self, end: u32) -> Option<(u32, u32)> {
        let mut prev: u32 = NULL;
        let mut cur = self.free_list;
        while cur != NULL {
            let size = self.read_u32(cur);
            let next = self.read_u32(cur + 4);
            if cur + size == end {
                self.unlink_free(prev, cur, next);
                return Some((cur, size));
            }
            prev = cur;
            cur = next;
        }
        None
    }

    /// Returns a block to the arena, coalescing with adjacent free
    /// neighbours so the free list stays bounded across long sessions.
    pub fn free(&mut self, offset: u32) -> Result<()> {
        if self.readonly {
            return Err(Error::ReadOnlyArena);
        }
        let mut start = offset - BLOCK_HEADER_SIZE;
        let mut size = self.read_u32(start);

        if let Some(next_size) = self.remove_free_at(start + size) {
            size += next_size;
        }
        if let Some((prev_start, prev_size)) = self.remove_free_ending_at(start) {
            start = prev_start;
            size += prev_size;
        }

        self.insert_free_sorted(start, size);
        trace!(start, size, "free: coalesced and relinked");
        Ok(())
    }

    // -- transient batch bookkeeping --------------------------------------

    /// Opens a transient batch session. Nesting is forbidden (see
    /// `SPEC_FULL.md` §4.4, §9): calling this while a session is already
    /// open is a logic error.
    pub fn begin_transient(&mut self) -> Result<u8> {
        debug_assert!(!self.transient_open, "nested transient batch");
        if self.transient_open {
            return Err(Error::TransientAlreadyOpen);
        }
        self.transient_open = true;
        self.current_owner_tag = self.next_owner_tag;
        self.next_owner_tag = if self.next_owner_tag == 255 {
            1
        } else {
            self.next_owner_tag + 1
        };
        debug!(owner = self.current_owner_tag, "transient batch opened");
        Ok(self.current_owner_tag)
    }

    /// Closes the current transient batch. Nodes stamped with the session's
    /// owner tag are no longer mutable in place after this returns.
    pub fn end_transient(&mut self) {
        debug_assert!(self.transient_open, "closing a transient batch that was never opened");
        self.transient_open = false;
        debug!(owner = self.current_owner_tag, "transient batch closed");
        self.current_owner_tag = 0;
    }

    pub fn transient_open(&self) -> bool {
        self.transient_open
    }

    /// The owner tag stamped on nodes allocated by the open transient
    /// session, or `0` if no session is open.
    pub fn current_owner_tag(&self) -> u8 {
        self.current_owner_tag
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alloc_is_aligned_and_non_overlapping() {
        let mut a = Arena::new(ArenaConfig::default());
        let o1 = a.alloc(20).unwrap();
        let o2 = a.alloc(5).unwrap();
        assert_eq!(o1 % 8, 0);
        assert_eq!(o2 % 8, 0);
        assert!(o2 >= o1 + 20);
    }

    #[test]
    fn free_then_alloc_reuses_block() {
        let mut a = Arena::new(ArenaConfig::default());
        let o1 = a.alloc(40).unwrap();
        let heap_before = a.heap_end();
        a.free(o1).unwrap();
        let o2 = a.alloc(40).unwrap();
        assert_eq!(o1, o2);
        assert_eq!(a.heap_end(), heap_before);
    }

    #[test]
    fn adjacent_frees_coalesce() {
        let mut a = Arena::new(ArenaConfig::default());
        let o1 = a.alloc(8).unwrap();
        let o2 = a.alloc(8).unwrap();
        let o3 = a.alloc(8).unwrap();
        a.free(o1).unwrap();
        a.free(o3).unwrap();
        a.free(o2).unwrap();
        // All three blocks should have merged into one free run.
        let start = o1 - 8;
        let size = a.read_u32(start);
        assert_eq!(size, (o3 - o1) + 16);
    }

    #[test]
    fn grows_by_whole_pages_on_exhaustion() {
        let cfg = ArenaConfig {
            page_size: 64,
            initial_pages: 1,
            roots_table_capacity: 0,
        };
        let mut a = Arena::new(cfg);
        let start_len = a.bytes().len();
        for _ in 0..20 {
            a.alloc(16).unwrap();
        }
        assert!(a.bytes().len() > start_len);
        assert_eq!((a.bytes().len() - start_len) % 64, 0);
    }

    #[test]
    fn reset_clears_heap_and_free_list() {
        let mut a = Arena::new(ArenaConfig::default());
        a.alloc(16).unwrap();
        a.alloc(16).unwrap();
        a.reset();
        assert_eq!(a.heap_end(), a.heap_start());
        assert_eq!(a.free_list(), NULL);
    }

    #[test]
    fn readonly_arena_rejects_mutation() {
        let mut producer = Arena::new(ArenaConfig::default());
        let _ = producer.alloc(16).unwrap();
        let reader = Arena::attach(
            producer.bytes().to_vec(),
            producer.heap_end(),
            producer.free_list(),
            ArenaConfig::default(),
        );
        assert!(reader.is_readonly());
        let mut reader = reader;
        assert!(reader.alloc(8).is_err());
    }

    #[cfg(feature = "roots-table")]
    #[test]
    fn roots_table_tracks_registrations_independent_of_refcounts() {
        let mut a = Arena::new(ArenaConfig::default());
        let n1 = a.alloc(16).unwrap();
        let n2 = a.alloc(16).unwrap();
        let s1 = a.register_root(n1).unwrap();
        let s2 = a.register_root(n2).unwrap();
        assert_ne!(s1, s2);
        assert_eq!(a.root_at(s1), n1);
        assert_eq!(a.root_at(s2), n2);
        a.unregister_root(s1);
        assert_eq!(a.root_at(s1), NULL);
        assert_eq!(a.root_at(s2), n2);
    }

    #[cfg(feature = "roots-table")]
    #[test]
    fn roots_table_reports_full_once_capacity_is_exhausted() {
        let cfg = ArenaConfig {
            page_size: 64 * 1024,
            initial_pages: 1,
            roots_table_capacity: 2,
        };
        let mut a = Arena::new(cfg);
        a.register_root(8).unwrap();
        a.register_root(16).unwrap();
        assert!(a.register_root(24).is_err());
    }
}
