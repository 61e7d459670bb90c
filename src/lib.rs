// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! Immutable, persistent collections backed by a single contiguous byte
//! arena: a hash array-mapped trie ([`hamt::Map`]), a [`set::Set`]
//! layered over it, a 32-wide [`vector::Vector`] trie, and
//! [`stack::Stack`]/[`queue::Queue`] projections over the vector.
//!
//! Every mutation path-copies from the touched root to its leaf,
//! structurally sharing everything else; a [`snapshot::Snapshot`] lets a
//! second worker attach to the same bytes and read without copying.

pub mod arena;
pub mod error;
pub mod hamt;
pub mod hash;
pub mod queue;
pub mod refcount;
pub mod set;
pub mod snapshot;
pub mod stack;
pub mod value;
pub mod vector;

pub use arena::{Arena, ArenaConfig};
pub use error::{Error, Result};
pub use hamt::Map;
pub use queue::Queue;
pub use set::Set;
pub use snapshot::Snapshot;
pub use stack::Stack;
pub use vector::{Vector, ValueKind};
