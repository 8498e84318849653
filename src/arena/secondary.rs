//======---------------------------------------------------------------======//
//                                                                           //
// Copyright 2022-2023 Evan Cox <evanacox00@gmail.com>. All rights reserved. //
//                                                                           //
// Use of this source code is governed by a BSD-style license that can be    //
// found in the LICENSE.txt file at the root of this project, or at the      //
// following link: https://opensource.org/licenses/BSD-3-Clause              //
//                                                                           //
//======---------------------------------------------------------------======//

use crate::arena::{ArenaKey, ArenaMap};
use std::fmt;
use std::fmt::{Debug, Formatter};
use std::marker::PhantomData;
use std::ops::{Index, IndexMut};

/// A dense secondary mapping `K -> V` for keys handed out by a primary
/// [`ArenaMap`]. Used to attach extra data to some or all of those keys
/// without touching the primary map.
///
/// Storage grows to the largest key inserted, so this is meant for mappings
/// that cover most keys of the primary.
///
/// ```
/// # use regroup::arena_key;
/// # use regroup::arena::*;
/// arena_key! { struct Player; }
///
/// let mut players = ArenaMap::new();
/// let p1: Player = players.insert("John");
/// let p2 = players.insert("Bob");
///
/// let mut health = SecondaryMap::with_primary(&players);
/// health.insert(p2, 200);
///
/// assert_eq!(health.get(p1), None);
/// assert_eq!(health[p2], 200);
/// ```
#[derive(Clone)]
pub struct SecondaryMap<K: ArenaKey, V> {
    slots: Vec<Option<V>>,
    len: usize,
    _unused: PhantomData<fn() -> K>,
}

impl<K: ArenaKey, V> SecondaryMap<K, V> {
    /// Creates an empty map.
    #[inline]
    pub fn new() -> Self {
        Self {
            slots: Vec::default(),
            len: 0,
            _unused: PhantomData,
        }
    }

    /// Creates an empty map with room for every key currently in `primary`.
    pub fn with_primary<T>(primary: &ArenaMap<K, T>) -> Self {
        let mut slots = Vec::with_capacity(primary.len());

        slots.resize_with(primary.len(), || None);

        Self {
            slots,
            len: 0,
            _unused: PhantomData,
        }
    }

    /// Maps `key` to `value`, returning whatever was there before.
    pub fn insert(&mut self, key: K, value: V) -> Option<V> {
        let index = key.key_index();

        if index >= self.slots.len() {
            self.slots.resize_with(index + 1, || None);
        }

        let old = self.slots[index].replace(value);

        if old.is_none() {
            self.len += 1;
        }

        old
    }

    /// Removes the mapping for `key`, if there is one.
    pub fn remove(&mut self, key: K) -> Option<V> {
        let old = self.slots.get_mut(key.key_index())?.take();

        if old.is_some() {
            self.len -= 1;
        }

        old
    }

    /// Checks whether `key` is mapped.
    #[inline]
    pub fn contains(&self, key: K) -> bool {
        self.get(key).is_some()
    }

    /// Gets the value `key` maps to.
    #[inline]
    pub fn get(&self, key: K) -> Option<&V> {
        self.slots.get(key.key_index()).and_then(Option::as_ref)
    }

    /// Mutable version of [`Self::get`].
    #[inline]
    pub fn get_mut(&mut self, key: K) -> Option<&mut V> {
        self.slots.get_mut(key.key_index()).and_then(Option::as_mut)
    }

    /// How many keys are mapped.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether nothing is mapped.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Iterates over the mapped `(key, value)` pairs in key order.
    pub fn iter(&self) -> impl Iterator<Item = (K, &V)> + '_ {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, slot)| slot.as_ref().map(|v| (K::key_new(i), v)))
    }
}

impl<K: ArenaKey, V> Default for SecondaryMap<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: ArenaKey, V> Index<K> for SecondaryMap<K, V> {
    type Output = V;

    #[inline]
    fn index(&self, key: K) -> &V {
        match self.get(key) {
            Some(v) => v,
            None => panic!("{key:?} is not mapped in secondary map"),
        }
    }
}

impl<K: ArenaKey, V> IndexMut<K> for SecondaryMap<K, V> {
    #[inline]
    fn index_mut(&mut self, key: K) -> &mut V {
        match self.get_mut(key) {
            Some(v) => v,
            None => panic!("{key:?} is not mapped in secondary map"),
        }
    }
}

impl<K: ArenaKey, V: Debug> Debug for SecondaryMap<K, V> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "SecondaryMap ")?;

        f.debug_map().entries(self.iter()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arena_key;

    arena_key! { struct Key; }

    #[test]
    fn sparse_insertion() {
        let mut primary = ArenaMap::new();
        let keys: Vec<Key> = (0..4).map(|i| primary.insert(i)).collect();
        let mut map = SecondaryMap::with_primary(&primary);

        assert_eq!(map.insert(keys[3], 'd'), None);
        assert_eq!(map.insert(keys[1], 'b'), None);
        assert_eq!(map.insert(keys[1], 'B'), Some('b'));
        assert_eq!(map.len(), 2);
        assert!(!map.contains(keys[0]));

        let pairs: Vec<(Key, char)> = map.iter().map(|(k, v)| (k, *v)).collect();

        assert_eq!(pairs, [(keys[1], 'B'), (keys[3], 'd')]);
    }

    #[test]
    fn grows_past_primary() {
        let mut map = SecondaryMap::new();

        map.insert(Key::key_new(10), 1);

        assert_eq!(map[Key::key_new(10)], 1);
        assert_eq!(map.remove(Key::key_new(10)), Some(1));
        assert_eq!(map.remove(Key::key_new(10)), None);
        assert!(map.is_empty());
    }
}
