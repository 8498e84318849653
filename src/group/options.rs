//======---------------------------------------------------------------======//
//                                                                           //
// Copyright 2022-2023 Evan Cox <evanacox00@gmail.com>. All rights reserved. //
//                                                                           //
// Use of this source code is governed by a BSD-style license that can be    //
// found in the LICENSE.txt file at the root of this project, or at the      //
// following link: https://opensource.org/licenses/BSD-3-Clause              //
//                                                                           //
//======---------------------------------------------------------------======//

/// Knobs for the grouping pass.
///
/// Every repair strategy except inserting fresh copies can be turned off,
/// which is mostly useful for testing one strategy at a time.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "enable-serde", derive(serde::Serialize, serde::Deserialize))]
pub struct GroupingOptions {
    /// Rewrite a group through an alternate swizzle when its members are
    /// already consecutive in a different order.
    pub reorder_operands: bool,
    /// Replace groups of compile-time constants with a run of the hardware
    /// constant bank.
    pub substitute_constants: bool,
    /// Ask the target for a variant of the instruction with weaker
    /// requirements.
    pub relax_encodings: bool,
    /// Read copies that already exist in the block instead of making new
    /// ones.
    pub reuse_copies: bool,
    /// Combine adjacent source copies into a single wide pack.
    pub pack_copies: bool,
    /// Put copies of uniform values into the preamble block.
    pub hoist_uniform_copies: bool,
    /// Overwrite copies that are no longer read instead of allocating new
    /// registers.
    pub recycle_dead_copies: bool,
    /// Check every number the physical allocator assigns against the chain
    /// constraints.
    pub verify_assignments: bool,
}

impl GroupingOptions {
    /// Options with every optional strategy disabled. Only fresh copies are
    /// inserted.
    pub fn copies_only() -> Self {
        Self {
            reorder_operands: false,
            substitute_constants: false,
            relax_encodings: false,
            reuse_copies: false,
            pack_copies: false,
            hoist_uniform_copies: false,
            recycle_dead_copies: false,
            ..Self::default()
        }
    }
}

impl Default for GroupingOptions {
    fn default() -> Self {
        Self {
            reorder_operands: true,
            substitute_constants: true,
            relax_encodings: true,
            reuse_copies: true,
            pack_copies: true,
            hoist_uniform_copies: true,
            recycle_dead_copies: true,
            verify_assignments: cfg!(debug_assertions),
        }
    }
}
