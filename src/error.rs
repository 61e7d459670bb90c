// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use thiserror::Error;

/// Errors surfaced by the arena, HAMT engine, vector trie and their adapters.
///
/// Expected outcomes (missing key, pop from an empty stack, a queue drained
/// to empty) are never represented here; they are returned as `Option`/`bool`
/// per the engine's sentinel-based contract.
#[derive(Debug, Error)]
pub enum Error {
    #[error("arena exhausted: failed to grow backing memory by a {page_size}-byte page")]
    ArenaExhausted { page_size: usize },

    #[error("index {0} out of range for vector of size {1}")]
    IndexOutOfRange(usize, usize),

    #[error("refcount overflow on node at offset {0}")]
    RefcountOverflow(u32),

    #[error("arena is attached read-only; mutation requires ownership")]
    ReadOnlyArena,

    #[error("a transient batch is already open on this arena; nesting is not supported")]
    TransientAlreadyOpen,

    #[cfg(feature = "roots-table")]
    #[error("roots table is full; at most {0} roots may be registered at once")]
    RootsTableFull(u32),
}

impl PartialEq for Error {
    fn eq(&self, other: &Self) -> bool {
        use Error::*;
        match (self, other) {
            (ArenaExhausted { page_size: a }, ArenaExhausted { page_size: b }) => a == b,
            (IndexOutOfRange(a1, a2), IndexOutOfRange(b1, b2)) => a1 == b1 && a2 == b2,
            (RefcountOverflow(a), RefcountOverflow(b)) => a == b,
            (ReadOnlyArena, ReadOnlyArena) => true,
            (TransientAlreadyOpen, TransientAlreadyOpen) => true,
            #[cfg(feature = "roots-table")]
            (RootsTableFull(a), RootsTableFull(b)) => a == b,
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
