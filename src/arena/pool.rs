//======---------------------------------------------------------------======//
//                                                                           //
// Copyright 2022-2023 Evan Cox <evanacox00@gmail.com>. All rights reserved. //
//                                                                           //
// Use of this source code is governed by a BSD-style license that can be    //
// found in the LICENSE.txt file at the root of this project, or at the      //
// following link: https://opensource.org/licenses/BSD-3-Clause              //
//                                                                           //
//======---------------------------------------------------------------======//

use crate::arena::ArenaKey;
use std::fmt;
use std::fmt::{Debug, Formatter};
use std::marker::PhantomData;
use std::ops::{Index, IndexMut};

/// An arena that supports removal, recycling the freed slots.
///
/// This is what graph-like structures that shrink during a pass use: every
/// entity is referred to by a stable key, and dropping the whole pool tears
/// down the entire graph at once.
///
/// Removed keys are reused by later insertions, so a key must not be held
/// past the removal of its slot.
///
/// ```
/// # use regroup::arena_key;
/// # use regroup::arena::PoolMap;
/// arena_key! { struct Node; }
///
/// let mut pool = PoolMap::new();
/// let a: Node = pool.insert("a");
/// let b = pool.insert("b");
///
/// assert_eq!(pool.remove(a), Some("a"));
/// assert_eq!(pool.len(), 1);
///
/// let c = pool.insert("c");
/// assert_eq!(c, a); // the freed slot was reused
/// assert_eq!(pool[b], "b");
/// ```
#[derive(Clone)]
pub struct PoolMap<K: ArenaKey, V> {
    slots: Vec<Option<V>>,
    free: Vec<K>,
    len: usize,
    _unused: PhantomData<fn() -> K>,
}

impl<K: ArenaKey, V> PoolMap<K, V> {
    /// Creates an empty pool.
    #[inline]
    pub fn new() -> Self {
        Self {
            slots: Vec::default(),
            free: Vec::default(),
            len: 0,
            _unused: PhantomData,
        }
    }

    /// Inserts a value, reusing a freed slot if one is available.
    pub fn insert(&mut self, value: V) -> K {
        self.len += 1;

        match self.free.pop() {
            Some(key) => {
                debug_assert!(self.slots[key.key_index()].is_none());

                self.slots[key.key_index()] = Some(value);

                key
            }
            None => {
                self.slots.push(Some(value));

                K::key_new(self.slots.len() - 1)
            }
        }
    }

    /// Removes the value at `key`, returning it if the slot was occupied.
    pub fn remove(&mut self, key: K) -> Option<V> {
        let value = self.slots.get_mut(key.key_index())?.take()?;

        self.free.push(key);
        self.len -= 1;

        Some(value)
    }

    /// Checks whether `key` currently refers to a live value.
    #[inline]
    pub fn contains(&self, key: K) -> bool {
        self.get(key).is_some()
    }

    /// Gets the value for `key` if the slot is occupied.
    #[inline]
    pub fn get(&self, key: K) -> Option<&V> {
        self.slots.get(key.key_index()).and_then(Option::as_ref)
    }

    /// Mutable version of [`Self::get`].
    #[inline]
    pub fn get_mut(&mut self, key: K) -> Option<&mut V> {
        self.slots.get_mut(key.key_index()).and_then(Option::as_mut)
    }

    /// The number of live values.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Checks if there are no live values.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Drops every value at once.
    pub fn clear(&mut self) {
        self.slots.clear();
        self.free.clear();
        self.len = 0;
    }

    /// Iterates over the live `(key, value)` pairs in key order.
    pub fn iter(&self) -> impl Iterator<Item = (K, &V)> + '_ {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, slot)| slot.as_ref().map(|v| (K::key_new(i), v)))
    }

    /// Iterates over the live keys in increasing order.
    pub fn keys(&self) -> impl Iterator<Item = K> + '_ {
        self.iter().map(|(k, _)| k)
    }
}

impl<K: ArenaKey, V> Default for PoolMap<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: ArenaKey, V> Index<K> for PoolMap<K, V> {
    type Output = V;

    #[inline]
    fn index(&self, key: K) -> &V {
        match self.get(key) {
            Some(v) => v,
            None => panic!("{key:?} refers to a removed pool slot"),
        }
    }
}

impl<K: ArenaKey, V> IndexMut<K> for PoolMap<K, V> {
    #[inline]
    fn index_mut(&mut self, key: K) -> &mut V {
        match self.get_mut(key) {
            Some(v) => v,
            None => panic!("{key:?} refers to a removed pool slot"),
        }
    }
}

impl<K: ArenaKey, V: Debug> Debug for PoolMap<K, V> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "PoolMap ")?;

        f.debug_map().entries(self.iter()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arena_key;

    arena_key! { struct Key; }

    #[test]
    fn removal_frees_slot_for_reuse() {
        let mut pool = PoolMap::new();
        let a: Key = pool.insert(1);
        let b = pool.insert(2);
        let c = pool.insert(3);

        assert_eq!(pool.remove(b), Some(2));
        assert_eq!(pool.remove(b), None);
        assert!(!pool.contains(b));
        assert_eq!(pool.len(), 2);

        let d = pool.insert(4);

        assert_eq!(d, b);
        assert_eq!(pool[a], 1);
        assert_eq!(pool[c], 3);
        assert_eq!(pool[d], 4);
    }

    #[test]
    fn iteration_skips_holes() {
        let mut pool = PoolMap::new();
        let keys: Vec<Key> = (0..5).map(|i| pool.insert(i)).collect();

        pool.remove(keys[1]);
        pool.remove(keys[3]);

        let live: Vec<i32> = pool.iter().map(|(_, v)| *v).collect();

        assert_eq!(live, [0, 2, 4]);
        assert_eq!(pool.keys().count(), 3);
    }

    #[test]
    fn clear_drops_everything() {
        let mut pool = PoolMap::<Key, String>::new();
        pool.insert("x".to_owned());
        pool.insert("y".to_owned());
        pool.clear();

        assert!(pool.is_empty());
        assert_eq!(pool.iter().count(), 0);
    }

    #[test]
    #[should_panic(expected = "removed pool slot")]
    fn indexing_removed_slot_panics() {
        let mut pool = PoolMap::new();
        let k: Key = pool.insert(0);
        pool.remove(k);

        let _ = pool[k];
    }
}
