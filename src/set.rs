// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! Persistent set, layered directly over [`crate::hamt::Map`] with a
//! zero-length value per member (`SPEC_FULL.md` §1, §2): no node shape
//! of its own, every guarantee (structural sharing, path-copy, branch
//! isolation) is inherited unchanged from the map.

use crate::arena::Arena;
use crate::error::Result;
use crate::hamt::Map;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Set {
    map: Map,
}

impl Set {
    pub fn empty() -> Self {
        Self { map: Map::empty() }
    }

    pub fn from_parts(root: u32, size: u32) -> Self {
        Self { map: Map::from_parts(root, size) }
    }

    pub fn root(&self) -> u32 {
        self.map.root()
    }

    pub fn len(&self) -> u32 {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn clone_handle(&self, arena: &mut Arena) -> Result<Self> {
        Ok(Self { map: self.map.clone_handle(arena)? })
    }

    pub fn release(self, arena: &mut Arena) -> Result<()> {
        self.map.release(arena)
    }

    pub fn contains(&self, arena: &Arena, member: &[u8]) -> bool {
        self.map.has(arena, member)
    }

    /// Adds `member`. Returns the same size if it was already present.
    pub fn insert(&self, arena: &mut Arena, member: &[u8]) -> Result<Self> {
        Ok(Self { map: self.map.set(arena, member, &[])? })
    }

    pub fn remove(&self, arena: &mut Arena, member: &[u8]) -> Result<Self> {
        Ok(Self { map: self.map.delete(arena, member)? })
    }

    pub fn iter<'a>(&self, arena: &'a Arena) -> impl Iterator<Item = &'a [u8]> {
        self.map.iter(arena).map(move |leaf| crate::hamt::node::leaf_key(arena, leaf))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arena::ArenaConfig;

    #[test]
    fn insert_then_contains_round_trip() {
        let mut arena = Arena::new(ArenaConfig::default());
        let s1 = Set::empty();
        let s2 = s1.insert(&mut arena, b"x").unwrap();
        assert!(s2.contains(&arena, b"x"));
        assert!(!s1.contains(&arena, b"x"));
        assert_eq!(s2.len(), 1);
    }

    #[test]
    fn duplicate_insert_does_not_grow_size() {
        let mut arena = Arena::new(ArenaConfig::default());
        let s = Set::empty().insert(&mut arena, b"x").unwrap();
        let s2 = s.insert(&mut arena, b"x").unwrap();
        assert_eq!(s2.len(), 1);
    }

    #[test]
    fn remove_then_contains_is_false() {
        let mut arena = Arena::new(ArenaConfig::default());
        let s = Set::empty().insert(&mut arena, b"x").unwrap();
        let s2 = s.remove(&mut arena, b"x").unwrap();
        assert!(!s2.contains(&arena, b"x"));
        assert_eq!(s2.len(), 0);
    }

    #[test]
    fn iter_yields_every_member_once() {
        let mut arena = Arena::new(ArenaConfig::default());
        let mut s = Set::empty();
        for i in 0..30u32 {
            s = s.insert(&mut arena, format!("m{i}").as_bytes()).unwrap();
        }
        let mut seen: Vec<String> = s.iter(&arena).map(|k| String::from_utf8(k.to_vec()).unwrap()).collect();
        seen.sort();
        let mut expected: Vec<String> = (0..30).map(|i| format!("m{i}")).collect();
        expected.sort();
        assert_eq!(seen, expected);
    }
}
