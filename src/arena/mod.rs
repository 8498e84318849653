//======---------------------------------------------------------------======//
//                                                                           //
// Copyright 2022-2023 Evan Cox <evanacox00@gmail.com>. All rights reserved. //
//                                                                           //
// Use of this source code is governed by a BSD-style license that can be    //
// found in the LICENSE.txt file at the root of this project, or at the      //
// following link: https://opensource.org/licenses/BSD-3-Clause              //
//                                                                           //
//======---------------------------------------------------------------======//

//! A simple typed arena module.
//!
//! Graph-like structures inside the resolver (the instruction list, the
//! constraint chains, the per-block copy records) are stored in arenas and
//! refer to each other with small typed keys instead of pointers.
//!
//! - [`ArenaMap`] never removes anything, keys stay valid forever.
//! - [`PoolMap`] allows removal and recycles freed slots.
//! - [`SecondaryMap`] attaches extra data to keys of a primary [`ArenaMap`].
//!
//! ```
//! # use regroup::arena_key;
//! # use regroup::arena::*;
//! arena_key! {
//!     pub struct Node;
//! }
//!
//! struct Link {
//!     next: Option<Node>,
//! }
//!
//! let mut pool = PoolMap::new();
//! let tail: Node = pool.insert(Link { next: None });
//! let head = pool.insert(Link { next: Some(tail) });
//!
//! assert_eq!(pool[head].next, Some(tail));
//! ```

mod key;
mod map;
mod pool;
mod secondary;

pub use key::ArenaKey;
pub use map::ArenaMap;
pub use pool::PoolMap;
pub use secondary::SecondaryMap;
