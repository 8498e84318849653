//======---------------------------------------------------------------======//
//                                                                           //
// Copyright 2022-2023 Evan Cox <evanacox00@gmail.com>. All rights reserved. //
//                                                                           //
// Use of this source code is governed by a BSD-style license that can be    //
// found in the LICENSE.txt file at the root of this project, or at the      //
// following link: https://opensource.org/licenses/BSD-3-Clause              //
//                                                                           //
//======---------------------------------------------------------------======//

use crate::arena_key;

arena_key! {
    /// Refers to a single instruction inside of a [`Function`](crate::ir::Function).
    ///
    /// These stay valid after the instruction is removed from the layout, the
    /// data is simply no longer reachable from any block.
    pub struct Inst;

    /// Refers to a basic block. Blocks are processed independently by the
    /// grouping pass, nothing is assumed about control flow between them.
    pub struct Block;

    /// Refers to a fixed register descriptor, i.e. a set of registers pinned
    /// to a bank or an exact hardware number.
    pub struct Binding;
}
