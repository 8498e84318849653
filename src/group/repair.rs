//======---------------------------------------------------------------======//
//                                                                           //
// Copyright 2022-2023 Evan Cox <evanacox00@gmail.com>. All rights reserved. //
//                                                                           //
// Use of this source code is governed by a BSD-style license that can be    //
// found in the LICENSE.txt file at the root of this project, or at the      //
// following link: https://opensource.org/licenses/BSD-3-Clause              //
//                                                                           //
//======---------------------------------------------------------------======//

use crate::error::{GroupError, GroupResult};
use crate::group::{EquivalenceCache, GroupingContext, Slot};
use crate::ir::{Bank, Function, Inst, InstData, Reg, RegKind, RegisterSource};
use crate::isa::{ConsecutiveGroup, IndexMode, OperandSide, Relaxation, ShaderTarget};
use log::{debug, trace};
use smallvec::{smallvec, SmallVec};
use std::ops::Range;

/// A copy inserted after an instruction: `value <- holder`.
#[derive(Copy, Clone, Debug)]
pub(crate) struct PendingCopy {
    pub(crate) value: Reg,
    pub(crate) holder: Reg,
    pub(crate) inst: Inst,
}

/// What happened to an instruction after one of its groups was handled.
#[derive(Debug)]
pub(crate) enum GroupFix {
    /// The group holds, possibly after rewriting operands or inserting
    /// copies in front of the instruction.
    Done,
    /// Destinations were redirected, and these copies put the values back
    /// after the instruction.
    CopiedOut(SmallVec<[PendingCopy; 4]>),
    /// The instruction changed shape, its groups have to be recomputed.
    Narrowed,
    /// The instruction no longer exists.
    Replaced { resume: Option<Inst> },
}

#[derive(Copy, Clone, Eq, PartialEq, Debug)]
enum PlanSlot {
    Keep,
    Reuse(Reg),
    Recycle(Reg),
    Fresh,
}

impl PlanSlot {
    fn needs_copy(self) -> bool {
        matches!(self, PlanSlot::Recycle(_) | PlanSlot::Fresh)
    }
}

#[derive(Clone, Debug)]
enum Batch {
    Hoist(usize),
    Local(Range<usize>),
}

// how many registers holding the right value, and how many dead copies,
// are considered for a single member
const MAX_EQUIVALENTS: usize = 4;
const MAX_RECYCLED: usize = 4;

#[derive(Debug)]
struct CopyPlan {
    slots: SmallVec<[PlanSlot; 4]>,
    batches: SmallVec<[Batch; 4]>,
}

impl CopyPlan {
    // copies in the preamble run once, and don't count against the block
    fn cost(&self) -> usize {
        self.batches.iter().filter(|b| matches!(b, Batch::Local(_))).count()
    }
}

fn list(regs: &[Reg]) -> String {
    regs.iter().map(|r| r.to_string()).collect::<Vec<_>>().join(", ")
}

/// Fixes the consecutive groups of the instructions in one block.
///
/// Strategies are tried cheapest first: reading the operands through a
/// different order, moving constants into the constant bank, a weaker
/// encoding, and finally copies. Copies prefer registers that already hold
/// the right value, then dead copies, then fresh registers.
pub(crate) struct RepairEngine<'a, 't, T: ShaderTarget + ?Sized> {
    pub(crate) ctx: &'a mut GroupingContext<'t, T>,
    pub(crate) func: &'a mut Function,
    pub(crate) cache: &'a mut EquivalenceCache,
    // copy-outs of instructions that were replaced, recorded once the
    // walk reaches the copy itself
    pub(crate) deferred: &'a mut SmallVec<[PendingCopy; 4]>,
    pub(crate) ordinal: u32,
}

struct PlanSearch {
    slots: SmallVec<[Slot; 4]>,
    plan: SmallVec<[PlanSlot; 4]>,
    best: Option<SmallVec<[PlanSlot; 4]>>,
    best_cost: usize,
}

impl<'a, 't, T: ShaderTarget + ?Sized> RepairEngine<'a, 't, T> {
    /// Handles every group of `inst` and updates the cache with what the
    /// instruction does. Returns the instruction to look at next.
    pub(crate) fn group_inst(&mut self, inst: Inst) -> GroupResult<Option<Inst>> {
        let target = self.ctx.target();
        let mut pending: SmallVec<[PendingCopy; 4]> = SmallVec::new();

        'restart: loop {
            let mut groups = target.consecutive_groups(self.func.inst(inst));

            // a destination repair may remove the instruction
            groups.sort_by_key(|g| g.side != OperandSide::Dest);

            for group in groups.iter() {
                match self.repair(inst, group)? {
                    GroupFix::Done => {}
                    GroupFix::CopiedOut(copies) => pending.extend(copies),
                    GroupFix::Narrowed => continue 'restart,
                    GroupFix::Replaced { resume } => {
                        trace!("{inst:?} was replaced, resuming at {resume:?}");

                        self.deferred.extend(pending);

                        return Ok(resume);
                    }
                }
            }

            break;
        }

        let data = self.func.inst(inst).clone();

        for &reg in data.uses() {
            self.cache.note_use(&self.ctx.registry, reg, self.ordinal);
        }

        for &reg in data.defs() {
            self.cache.note_def(&mut self.ctx.registry, reg);
            self.ctx.hoisted.retain(|&value, &mut holder| value != reg && holder != reg);
        }

        if target.is_deschedule_point(&data) {
            trace!("{inst:?} deschedules, forgetting every copy");

            self.cache.clear(&mut self.ctx.registry);
        }

        if let Some(index) = self.deferred.iter().position(|copy| copy.inst == inst) {
            let copy = self.deferred.swap_remove(index);

            self.record_pending(copy);
        }

        let mut last = inst;

        for copy in pending {
            self.record_pending(copy);

            last = copy.inst;
        }

        Ok(self.func.layout().inst_next(last))
    }

    // `copy.inst` is `value <- holder`, the two hold the same value after it
    fn record_pending(&mut self, copy: PendingCopy) {
        self.cache.note_def(&mut self.ctx.registry, copy.value);
        self.cache.record_copy(
            &mut self.ctx.registry,
            copy.value,
            copy.holder,
            Some(copy.inst),
            self.ordinal,
            false,
        );
    }

    /// Makes one group of `inst` hold, changing the instruction or the
    /// block around it if it has to.
    pub(crate) fn repair(&mut self, inst: Inst, group: &ConsecutiveGroup) -> GroupResult<GroupFix> {
        let regs: SmallVec<[Reg; 4]> = SmallVec::from_slice(group.operands(self.func.inst(inst)));

        self.ctx.stats.groups_checked += 1;

        let conflict = match self.ctx.registry.validate(&regs, group.alignment) {
            Ok(valid) => {
                self.ctx.registry.make_group(&regs, valid.alignment, true)?;

                return Ok(GroupFix::Done);
            }
            Err(conflict) => conflict,
        };

        debug!("{inst:?}: {:?} group [{}] conflicts: {conflict}", group.side, list(&regs));

        self.ctx.stats.groups_repaired += 1;

        let options = *self.ctx.options();

        if options.reorder_operands && self.try_reorder(inst, group, &regs)? {
            debug!("{inst:?}: reading the group in chain order");
            self.ctx.stats.reordered += 1;

            return Ok(GroupFix::Done);
        }

        if options.substitute_constants && self.try_constants(inst, group, &regs)? {
            debug!("{inst:?}: reading the group from the constant bank");
            self.ctx.stats.substituted += 1;

            return Ok(GroupFix::Done);
        }

        let plan = self.plan_copies(inst, group, &regs);

        if options.relax_encodings {
            if let Some(fix) = self.try_relax(inst, group, plan.cost())? {
                self.ctx.stats.relaxed += 1;

                return Ok(fix);
            }
        }

        let assigned = self.apply_plan(inst, group, &regs, &plan)?;

        match group.side {
            OperandSide::Source => {
                self.copy_in(inst, &regs, &assigned, &plan)?;

                Ok(GroupFix::Done)
            }
            OperandSide::Dest => self.copy_out(inst, &regs, &assigned, &plan).map(GroupFix::CopiedOut),
        }
    }

    fn try_reorder(&mut self, inst: Inst, group: &ConsecutiveGroup, regs: &[Reg]) -> GroupResult<bool> {
        let registry = &self.ctx.registry;
        let mut positions: SmallVec<[(usize, usize); 4]> = SmallVec::new();
        let mut head = None;

        for (i, &reg) in regs.iter().enumerate() {
            let Some(id) = registry.find(reg) else {
                return Ok(false);
            };

            let segment = registry.segment(id, true);

            if *head.get_or_insert(segment.head) != segment.head {
                return Ok(false);
            }

            positions.push((segment.position, i));
        }

        positions.sort_unstable();

        let contiguous = positions.windows(2).all(|w| w[1].0 == w[0].0 + 1);
        let order: SmallVec<[usize; 4]> = positions.iter().map(|&(_, i)| i).collect();

        if !contiguous || order.iter().enumerate().all(|(p, &i)| p == i) {
            return Ok(false);
        }

        let reordered: SmallVec<[Reg; 4]> = order.iter().map(|&i| regs[i]).collect();

        let Ok(valid) = registry.validate(&reordered, group.alignment) else {
            return Ok(false);
        };

        let target = self.ctx.target();
        let mut data = self.func.inst(inst).clone();

        if !target.is_encoding_supported(&data, group, &order) || !target.reorder_group(&mut data, group, &order) {
            return Ok(false);
        }

        *self.func.inst_mut(inst) = data;
        self.ctx.registry.make_group(&reordered, valid.alignment, true)?;

        Ok(true)
    }

    fn try_constants(&mut self, inst: Inst, group: &ConsecutiveGroup, regs: &[Reg]) -> GroupResult<bool> {
        if group.side != OperandSide::Source {
            return Ok(false);
        }

        let target = self.ctx.target();
        let values: Option<SmallVec<[u32; 4]>> = regs
            .iter()
            .map(|reg| match reg.kind() {
                RegKind::Immediate => Some(reg.number()),
                RegKind::Constant => target.constant_value(reg.number()),
                _ => None,
            })
            .collect();

        let Some(start) = values.and_then(|values| target.constant_run(&values, group.alignment)) else {
            return Ok(false);
        };

        let data = self.func.inst(inst);
        let readable = (0..regs.len()).all(|i| {
            target.can_use_operand_bank(data, OperandSide::Source, group.start + i, Bank::Constant, IndexMode::Direct)
        });

        let renumbered: SmallVec<[Reg; 4]> = (0..regs.len() as u32).map(|i| Reg::constant(start + i)).collect();

        if !readable || self.ctx.registry.validate(&renumbered, group.alignment).is_err() {
            return Ok(false);
        }

        group.operands_mut(self.func.inst_mut(inst)).copy_from_slice(&renumbered);

        Ok(true)
    }

    fn try_relax(&mut self, inst: Inst, group: &ConsecutiveGroup, cost: usize) -> GroupResult<Option<GroupFix>> {
        let target = self.ctx.target();

        let Some(relaxation) = target.relax(self.func.inst(inst), group) else {
            return Ok(None);
        };

        if relaxation.added_instructions() > cost {
            trace!(
                "{inst:?}: relaxing adds {} instructions, copying adds {cost}",
                relaxation.added_instructions()
            );

            return Ok(None);
        }

        match relaxation {
            Relaxation::Narrow(narrowed) => {
                let narrower = target
                    .consecutive_groups(&narrowed)
                    .iter()
                    .any(|g| g.side == group.side && g.count >= 1 && g.count < group.count);

                if !narrower {
                    return Ok(None);
                }

                debug!("{inst:?}: narrowed to {narrowed}");

                *self.func.inst_mut(inst) = narrowed;

                Ok(Some(GroupFix::Narrowed))
            }
            Relaxation::Expand(sequence) => {
                let next = self.func.layout().inst_next(inst);
                let inserted = self.func.replace(inst, sequence)?;

                debug!("{inst:?}: expanded into {} instructions", inserted.len());

                Ok(Some(GroupFix::Replaced {
                    resume: inserted.first().copied().or(next),
                }))
            }
        }
    }

    // registers that hold the same value as `reg` right now
    fn equivalents(&self, reg: Reg) -> SmallVec<[Reg; 4]> {
        let mut found = SmallVec::new();
        let value = self.cache.value_of(&self.ctx.registry, reg).unwrap_or(reg);

        if value != reg && value.is_virtual() {
            found.push(value);
        }

        let hoisted = self.ctx.hoisted_copy(value);
        let holders = self.cache.holders(value).map(|record| record.dest).chain(hoisted);

        for holder in holders {
            if holder != reg && !found.contains(&holder) {
                found.push(holder);
            }
        }

        found.truncate(MAX_EQUIVALENTS);
        found
    }

    // finds the plan with the fewest copies, preferring to keep members,
    // then to reuse copies, then to recycle dead ones
    fn plan_copies(&self, inst: Inst, group: &ConsecutiveGroup, regs: &[Reg]) -> CopyPlan {
        let n = regs.len();
        let candidates = self.candidates(inst, group, regs);
        let mut search = PlanSearch {
            slots: smallvec![Slot::Open; n],
            plan: smallvec![PlanSlot::Fresh; n],
            best: None,
            best_cost: usize::MAX,
        };

        self.search(group, regs, &candidates, 0, 0, &mut search);

        let slots = search.best.unwrap_or_else(|| {
            trace!("{inst:?}: no plan validates, copying every member");

            smallvec![PlanSlot::Fresh; n]
        });

        let batches = self.copy_batches(group, regs, &slots);

        CopyPlan { slots, batches }
    }

    fn fits(&self, group: &ConsecutiveGroup, slots: &[Slot]) -> bool {
        self.ctx.registry.validate_slots(slots, group.alignment).is_ok()
    }

    fn candidates(&self, inst: Inst, group: &ConsecutiveGroup, regs: &[Reg]) -> SmallVec<[SmallVec<[PlanSlot; 8]>; 4]> {
        let options = self.ctx.options();
        let reuse = options.reuse_copies && group.side == OperandSide::Source;
        let equivalents: SmallVec<[SmallVec<[Reg; 4]>; 4]> = regs
            .iter()
            .map(|&reg| if reuse { self.equivalents(reg) } else { SmallVec::new() })
            .collect();

        let mut dead: SmallVec<[Reg; 4]> = SmallVec::new();

        if options.recycle_dead_copies {
            let data = self.func.inst(inst);
            let wanted = |r: &Reg| regs.contains(r) || equivalents.iter().any(|e| e.contains(r));

            dead.extend(
                self.cache
                    .dead_copies(self.ordinal)
                    .map(|(_, record)| record.dest)
                    .filter(|r| !data.uses().contains(r) && !data.defs().contains(r) && !wanted(r))
                    .take(MAX_RECYCLED),
            );
        }

        equivalents
            .into_iter()
            .map(|holders| {
                let mut choices: SmallVec<[PlanSlot; 8]> = smallvec![PlanSlot::Keep];

                choices.extend(holders.into_iter().map(PlanSlot::Reuse));
                choices.extend(dead.iter().map(|&r| PlanSlot::Recycle(r)));
                choices.push(PlanSlot::Fresh);
                choices
            })
            .collect()
    }

    // depth-first over the members. Members not decided yet are open, and
    // a partial plan that fails can't be fixed by deciding more of them.
    fn search(
        &self,
        group: &ConsecutiveGroup,
        regs: &[Reg],
        candidates: &[SmallVec<[PlanSlot; 8]>],
        i: usize,
        cost: usize,
        state: &mut PlanSearch,
    ) {
        if cost >= state.best_cost {
            return;
        }

        if i == candidates.len() {
            state.best_cost = cost;
            state.best = Some(state.plan.clone());

            return;
        }

        for &candidate in candidates[i].iter() {
            state.slots[i] = match candidate {
                PlanSlot::Keep => Slot::Reg(regs[i]),
                PlanSlot::Reuse(r) | PlanSlot::Recycle(r) => Slot::Reg(r),
                PlanSlot::Fresh => Slot::Fresh,
            };

            if self.fits(group, &state.slots) {
                state.plan[i] = candidate;
                self.search(group, regs, candidates, i + 1, cost + candidate.needs_copy() as usize, state);
            }

            if state.best_cost == 0 {
                break;
            }
        }

        state.slots[i] = Slot::Open;
    }

    fn copy_batches(&self, group: &ConsecutiveGroup, regs: &[Reg], plan: &[PlanSlot]) -> SmallVec<[Batch; 4]> {
        let options = self.ctx.options();
        let source = group.side == OperandSide::Source;
        let width = if source && options.pack_copies {
            self.ctx.target().max_pack_width().max(1)
        } else {
            1
        };
        let hoist = source && options.hoist_uniform_copies && self.func.preamble().is_some();
        let mut batches: SmallVec<[Batch; 4]> = SmallVec::new();

        for (i, &slot) in plan.iter().enumerate() {
            if !slot.needs_copy() {
                continue;
            }

            if hoist && slot == PlanSlot::Fresh && self.func.is_uniform(regs[i]) {
                batches.push(Batch::Hoist(i));
                continue;
            }

            match batches.last_mut() {
                Some(Batch::Local(range)) if range.end == i && range.len() < width => range.end += 1,
                _ => batches.push(Batch::Local(i..i + 1)),
            }
        }

        batches
    }

    fn apply_plan(
        &mut self,
        inst: Inst,
        group: &ConsecutiveGroup,
        regs: &[Reg],
        plan: &CopyPlan,
    ) -> GroupResult<SmallVec<[Reg; 4]>> {
        let fresh_count = plan.slots.iter().filter(|&&s| s == PlanSlot::Fresh).count();
        let mut fresh = match fresh_count {
            0 => 0..0,
            count => self.func.allocate_registers(count)?,
        };

        let mut assigned: SmallVec<[Reg; 4]> = SmallVec::with_capacity(regs.len());

        for (i, &slot) in plan.slots.iter().enumerate() {
            assigned.push(match slot {
                PlanSlot::Keep => regs[i],
                PlanSlot::Reuse(reg) => {
                    self.ctx.stats.reused += 1;
                    reg
                }
                PlanSlot::Recycle(reg) => {
                    self.ctx.stats.recycled += 1;
                    reg
                }
                PlanSlot::Fresh => {
                    let number = fresh
                        .next()
                        .ok_or_else(|| GroupError::internal("register allocator returned a short range"))?;

                    Reg::temp(number)
                }
            });
        }

        let valid = self.ctx.registry.validate(&assigned, group.alignment).map_err(|conflict| {
            GroupError::internal(format!("repaired group [{}] still conflicts: {conflict}", list(&assigned)))
        })?;

        self.ctx.registry.make_group(&assigned, valid.alignment, true)?;
        group.operands_mut(self.func.inst_mut(inst)).copy_from_slice(&assigned);

        debug!("{inst:?}: repaired as [{}]", list(&assigned));

        Ok(assigned)
    }

    fn copy_in(&mut self, inst: Inst, regs: &[Reg], assigned: &[Reg], plan: &CopyPlan) -> GroupResult<()> {
        for batch in plan.batches.iter().cloned() {
            match batch {
                Batch::Hoist(i) => {
                    let preamble = self
                        .func
                        .preamble()
                        .ok_or_else(|| GroupError::internal("hoisting a copy without a preamble"))?;

                    let copy = self.func.push(preamble, InstData::mov(assigned[i], regs[i]))?;

                    self.func.export_from_preamble(assigned[i]);
                    self.ctx.stats.hoisted += 1;
                    self.ctx.hoisted.insert(regs[i], assigned[i]);
                    self.remember(regs[i], assigned[i], copy, false);
                }
                Batch::Local(range) => {
                    let data = match range.len() {
                        1 => InstData::mov(assigned[range.start], regs[range.start]),
                        _ => InstData::pack(&assigned[range.clone()], &regs[range.clone()]),
                    };

                    let copy = self.func.insert_before(inst, data)?;

                    self.ctx.stats.copies_inserted += 1;

                    for i in range {
                        self.remember(regs[i], assigned[i], copy, true);
                    }
                }
            }
        }

        Ok(())
    }

    fn copy_out(
        &mut self,
        inst: Inst,
        regs: &[Reg],
        assigned: &[Reg],
        plan: &CopyPlan,
    ) -> GroupResult<SmallVec<[PendingCopy; 4]>> {
        let mut pending = SmallVec::new();
        let mut after = inst;

        for (i, slot) in plan.slots.iter().enumerate() {
            if !slot.needs_copy() {
                continue;
            }

            let holder = assigned[i];

            after = self.func.insert_after(after, InstData::mov(regs[i], holder))?;
            self.ctx.stats.copies_inserted += 1;

            pending.push(PendingCopy {
                value: regs[i],
                holder,
                inst: after,
            });
        }

        Ok(pending)
    }

    fn remember(&mut self, value: Reg, holder: Reg, copy: Inst, owned: bool) {
        self.cache.note_def(&mut self.ctx.registry, holder);
        self.cache
            .record_copy(&mut self.ctx.registry, value, holder, Some(copy), self.ordinal, owned);
    }
}
