//======---------------------------------------------------------------======//
//                                                                           //
// Copyright 2022-2023 Evan Cox <evanacox00@gmail.com>. All rights reserved. //
//                                                                           //
// Use of this source code is governed by a BSD-style license that can be    //
// found in the LICENSE.txt file at the root of this project, or at the      //
// following link: https://opensource.org/licenses/BSD-3-Clause              //
//                                                                           //
//======---------------------------------------------------------------======//

use crate::group::{GroupRegistry, GroupingOptions};
use crate::ir::Reg;
use crate::isa::ShaderTarget;
use crate::utility::SaHashMap;
use std::fmt;

/// Counts of what the pass did, reported once per function.
#[derive(Copy, Clone, Default, Debug, PartialEq, Eq)]
pub struct RepairStats {
    /// Consecutive groups looked at.
    pub groups_checked: usize,
    /// Groups that needed any repair.
    pub groups_repaired: usize,
    /// Groups fixed by reading the operands through another order.
    pub reordered: usize,
    /// Groups moved into the constant bank.
    pub substituted: usize,
    /// Groups fixed by a weaker encoding.
    pub relaxed: usize,
    /// Members that read a copy that already existed.
    pub reused: usize,
    /// Members that overwrote a dead copy.
    pub recycled: usize,
    /// Copies inserted next to the instruction that needed them.
    pub copies_inserted: usize,
    /// Copies inserted into the preamble.
    pub hoisted: usize,
    /// Copies inserted to separate fixed bindings.
    pub seed_copies: usize,
}

impl fmt::Display for RepairStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} groups, {} repaired ({} reordered, {} substituted, {} relaxed), \
             {} reused, {} recycled, {} copies, {} hoisted, {} seed copies",
            self.groups_checked,
            self.groups_repaired,
            self.reordered,
            self.substituted,
            self.relaxed,
            self.reused,
            self.recycled,
            self.copies_inserted,
            self.hoisted,
            self.seed_copies
        )
    }
}

/// Everything the grouping pass mutates while walking one function.
pub struct GroupingContext<'t, T: ShaderTarget + ?Sized> {
    target: &'t T,
    options: GroupingOptions,
    pub(crate) registry: GroupRegistry,
    pub(crate) stats: RepairStats,
    // copies in the preamble, by the value they hold. These outlive blocks.
    pub(crate) hoisted: SaHashMap<Reg, Reg>,
}

impl<'t, T: ShaderTarget + ?Sized> GroupingContext<'t, T> {
    /// Creates a context with an empty registry sized for `target`.
    pub fn new(target: &'t T, options: GroupingOptions) -> Self {
        Self {
            target,
            options,
            registry: GroupRegistry::new(|bank| target.max_group_len(bank)),
            stats: RepairStats::default(),
            hoisted: SaHashMap::default(),
        }
    }

    /// The target being compiled for.
    #[inline]
    pub fn target(&self) -> &'t T {
        self.target
    }

    /// The options the pass was started with.
    #[inline]
    pub fn options(&self) -> &GroupingOptions {
        &self.options
    }

    /// The constraint graph built so far.
    #[inline]
    pub fn registry(&self) -> &GroupRegistry {
        &self.registry
    }

    /// Mutable version of [`Self::registry`].
    #[inline]
    pub fn registry_mut(&mut self) -> &mut GroupRegistry {
        &mut self.registry
    }

    /// What the pass has done so far.
    #[inline]
    pub fn stats(&self) -> &RepairStats {
        &self.stats
    }

    /// The preamble register holding a copy of `value`, if one was hoisted.
    #[inline]
    pub fn hoisted_copy(&self, value: Reg) -> Option<Reg> {
        self.hoisted.get(&value).copied()
    }

    pub(crate) fn into_parts(self) -> (GroupRegistry, RepairStats) {
        (self.registry, self.stats)
    }
}
