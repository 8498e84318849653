//======---------------------------------------------------------------======//
//                                                                           //
// Copyright 2022-2023 Evan Cox <evanacox00@gmail.com>. All rights reserved. //
//                                                                           //
// Use of this source code is governed by a BSD-style license that can be    //
// found in the LICENSE.txt file at the root of this project, or at the      //
// following link: https://opensource.org/licenses/BSD-3-Clause              //
//                                                                           //
//======---------------------------------------------------------------======//

use std::fmt::Debug;

/// Models a type that can act as a key for the arena map types.
///
/// Keys are plain indices, they carry no generation. A [`PoolMap`](crate::arena::PoolMap)
/// may hand out a key again after the slot it referred to was removed, so holders
/// of a key are responsible for not keeping it past a removal.
///
/// Prefer the [`arena_key`](crate::arena_key) macro over implementing this directly.
pub trait ArenaKey: Copy + Eq + Debug {
    /// Creates a new key from a given arena index.
    ///
    /// This panics if `index` is not representable by the key's storage type.
    fn key_new(index: usize) -> Self;

    /// Converts the key back into the `usize` index it was made from.
    fn key_index(self) -> usize;
}

/// Creates a type-safe key for an [`ArenaMap`](crate::arena::ArenaMap) or a
/// [`PoolMap`](crate::arena::PoolMap).
///
/// The storage type defaults to `u32`, which is enough for any single
/// compilation unit this crate deals with.
///
/// ```
/// # use regroup::arena_key;
/// # use regroup::arena::ArenaMap;
/// arena_key! {
///     /// Nodes in some graph.
///     pub struct Node;
///
///     // tiny keys, at most 256 entries
///     struct Lane(u8);
/// }
///
/// let mut map = ArenaMap::new();
/// let n: Node = map.insert("first");
///
/// assert_eq!(map[n], "first");
/// ```
#[macro_export(local_inner_macros)]
macro_rules! arena_key {
    ( $(#[$outer:meta])* $vis:vis struct $name:ident($ty:ty); $($rest:tt)* ) => {
        $(#[$outer])*
        #[repr(transparent)]
        #[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
        #[cfg_attr(feature = "enable-serde", derive(serde::Serialize, serde::Deserialize))]
        $vis struct $name($ty);

        impl $crate::arena::ArenaKey for $name {
            #[inline]
            fn key_new(index: usize) -> Self {
                use std::convert::TryInto;

                Self(index.try_into().expect("index is not representable with key type"))
            }

            #[inline]
            fn key_index(self) -> usize {
                self.0 as usize
            }
        }

        impl ::std::fmt::Debug for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> Result<(), std::fmt::Error> {
                std::write!(f, "{}({})", std::stringify!($name), self.0)
            }
        }

        arena_key!($($rest)*);
    };

    ( $(#[$outer:meta])* $vis:vis struct $name:ident; $($rest:tt)* ) => {
        arena_key! { $(#[$outer])* $vis struct $name(u32); $($rest)* }
    };

    () => {}
}

#[cfg(test)]
mod tests {
    use crate::arena::*;
    use static_assertions::assert_eq_size;

    #[test]
    fn arena_key_default_is_u32() {
        arena_key! { struct Key; }

        assert_eq_size!(Key, u32);
    }

    #[test]
    fn arena_key_non_default_uses_type_provided() {
        arena_key! { struct Key(u16); }

        assert_eq_size!(Key, u16);
    }

    #[test]
    fn keys_round_trip_their_index() {
        arena_key! { struct Key; }

        for i in [0usize, 1, 17, 65535, u32::MAX as usize] {
            assert_eq!(Key::key_new(i).key_index(), i);
        }
    }

    #[test]
    fn debug_names_the_key() {
        arena_key! { struct Widget; }

        assert_eq!(format!("{:?}", Widget::key_new(3)), "Widget(3)");
    }

    #[test]
    #[should_panic(expected = "index is not representable with key type")]
    fn arena_key_bounds_causes_panic() {
        std::panic::set_hook(Box::new(|_| {}));

        arena_key! { struct Key(u8); }

        let mut map = ArenaMap::new();

        // 1 past what u8 can represent
        for i in 0..=256 {
            let k: Key = map.insert(i);

            assert_eq!(map[k], i);
        }
    }

    #[cfg(feature = "enable-serde")]
    #[test]
    fn keys_serialize_as_newtypes() {
        use serde_test::{assert_tokens, Token};

        arena_key! { struct Slot; }

        assert_tokens(
            &Slot::key_new(7),
            &[Token::NewtypeStruct { name: "Slot" }, Token::U32(7)],
        );
    }
}
