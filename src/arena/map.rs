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

/// A primary, append-only mapping of `K -> V`.
///
/// This is effectively a typed wrapper around `Vec<V>`: it only allows indexing
/// with the correct key type and never invalidates a key it handed out. Use
/// [`PoolMap`](super::PoolMap) when entries need to be removed.
///
/// ```
/// # use regroup::arena_key;
/// # use regroup::arena::ArenaMap;
/// arena_key! {
///     struct Name;
/// }
///
/// let mut blocks = ArenaMap::new();
/// let bb: Name = blocks.insert("Hello!");
///
/// assert_eq!(blocks[bb], "Hello!");
/// ```
#[derive(Clone, PartialEq, Eq)]
pub struct ArenaMap<K: ArenaKey, V> {
    slots: Vec<V>,
    _unused: PhantomData<fn() -> K>,
}

impl<K: ArenaKey, V> ArenaMap<K, V> {
    /// Creates a new, empty arena.
    #[inline]
    pub fn new() -> Self {
        Self {
            slots: Vec::default(),
            _unused: PhantomData,
        }
    }

    /// Creates an empty arena that can hold `capacity` values without reallocating.
    #[inline]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: Vec::with_capacity(capacity),
            _unused: PhantomData,
        }
    }

    /// Checks whether `key` was returned from [`Self::insert`] at some point.
    #[inline]
    pub fn contains(&self, key: K) -> bool {
        key.key_index() < self.slots.len()
    }

    /// Gets the value for `key`, or `None` if the key is not from this arena.
    #[inline]
    pub fn get(&self, key: K) -> Option<&V> {
        self.slots.get(key.key_index())
    }

    /// Mutable version of [`Self::get`].
    #[inline]
    pub fn get_mut(&mut self, key: K) -> Option<&mut V> {
        self.slots.get_mut(key.key_index())
    }

    /// Adds a value into the arena and returns the key that refers to it.
    #[inline]
    pub fn insert(&mut self, value: V) -> K {
        self.slots.push(value);

        K::key_new(self.slots.len() - 1)
    }

    /// Gets the key that the next call to [`Self::insert`] will return.
    ///
    /// ```
    /// # use regroup::arena_key;
    /// # use regroup::arena::*;
    /// # arena_key! { struct Key; }
    /// let mut map = ArenaMap::default();
    /// let k1: Key = map.next_key();
    /// assert_eq!(map.contains(k1), false);
    ///
    /// let k2 = map.insert(0);
    /// assert_eq!(k1, k2);
    /// ```
    #[inline]
    pub fn next_key(&self) -> K {
        K::key_new(self.slots.len())
    }

    /// Gets the number of values in the arena.
    #[inline]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Checks if nothing has been inserted yet.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Iterates over every key in increasing order.
    pub fn keys(&self) -> impl Iterator<Item = K> + DoubleEndedIterator + ExactSizeIterator {
        (0..self.slots.len()).map(K::key_new)
    }

    /// Iterates over the values in key order.
    pub fn values(&self) -> std::slice::Iter<'_, V> {
        self.slots.iter()
    }

    /// Iterates over `(key, value)` pairs in key order.
    pub fn iter(&self) -> impl Iterator<Item = (K, &V)> + DoubleEndedIterator + ExactSizeIterator {
        self.slots
            .iter()
            .enumerate()
            .map(|(i, v)| (K::key_new(i), v))
    }

    /// Iterates over `(key, value)` pairs in key order, with mutable values.
    pub fn iter_mut(
        &mut self,
    ) -> impl Iterator<Item = (K, &mut V)> + DoubleEndedIterator + ExactSizeIterator {
        self.slots
            .iter_mut()
            .enumerate()
            .map(|(i, v)| (K::key_new(i), v))
    }
}

impl<K: ArenaKey, V> Default for ArenaMap<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: ArenaKey, V> Index<K> for ArenaMap<K, V> {
    type Output = V;

    #[inline]
    fn index(&self, key: K) -> &V {
        &self.slots[key.key_index()]
    }
}

impl<K: ArenaKey, V> IndexMut<K> for ArenaMap<K, V> {
    #[inline]
    fn index_mut(&mut self, key: K) -> &mut V {
        &mut self.slots[key.key_index()]
    }
}

impl<K: ArenaKey, V: Debug> Debug for ArenaMap<K, V> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "ArenaMap ")?;

        f.debug_map().entries(self.iter()).finish()
    }
}
