//======---------------------------------------------------------------======//
//                                                                           //
// Copyright 2022-2023 Evan Cox <evanacox00@gmail.com>. All rights reserved. //
//                                                                           //
// Use of this source code is governed by a BSD-style license that can be    //
// found in the LICENSE.txt file at the root of this project, or at the      //
// following link: https://opensource.org/licenses/BSD-3-Clause              //
//                                                                           //
//======---------------------------------------------------------------======//

use crate::error::GroupResult;
use crate::group::{
    seed_fixed_bindings, EquivalenceCache, GroupChains, GroupingContext, GroupingOptions, PendingCopy, RepairEngine,
    RepairStats,
};
use crate::ir::{Block, Function};
use crate::isa::ShaderTarget;
use log::{debug, info};
use smallvec::SmallVec;

/// What [`run_grouping`] produces.
#[derive(Debug)]
pub struct GroupingOutput {
    /// The constraints the physical allocator has to meet.
    pub chains: GroupChains,
    /// What the pass did to get there.
    pub stats: RepairStats,
}

/// Resolves every consecutive-register requirement of `func`.
///
/// Fixed bindings are seeded first. Then every block is walked in layout
/// order, and every instruction's groups are either recorded as chains or
/// repaired until they can be. The function is modified in place, and the
/// chains are returned for the physical allocator.
///
/// Only running out of registers or instruction slots (or a broken
/// invariant) makes this fail.
pub fn run_grouping<T: ShaderTarget + ?Sized>(
    func: &mut Function,
    target: &T,
    options: GroupingOptions,
) -> GroupResult<GroupingOutput> {
    let mut ctx = GroupingContext::new(target, options);

    seed_fixed_bindings(&mut ctx, func)?;

    let blocks: Vec<Block> = func.blocks().collect();

    for block in blocks {
        group_block(&mut ctx, func, block)?;
    }

    if cfg!(debug_assertions) {
        ctx.registry().check_well_formed()?;
    }

    info!("grouped {}: {}", func.name(), ctx.stats());

    let (registry, stats) = ctx.into_parts();

    Ok(GroupingOutput {
        chains: GroupChains::new(registry, options.verify_assignments),
        stats,
    })
}

fn group_block<T: ShaderTarget + ?Sized>(
    ctx: &mut GroupingContext<'_, T>,
    func: &mut Function,
    block: Block,
) -> GroupResult<()> {
    let mut cache = EquivalenceCache::new(block);
    let mut deferred: SmallVec<[PendingCopy; 4]> = SmallVec::new();
    let mut cursor = func.layout().block_first_inst(block);
    let mut ordinal = 0;

    debug!("grouping {}", func.block_name(block));

    while let Some(inst) = cursor {
        let mut engine = RepairEngine {
            ctx: &mut *ctx,
            func: &mut *func,
            cache: &mut cache,
            deferred: &mut deferred,
            ordinal,
        };

        cursor = engine.group_inst(inst)?;
        ordinal += 1;
    }

    cache.finish(ctx.registry_mut());

    Ok(())
}
