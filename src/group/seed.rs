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
use crate::group::{EquivalenceCache, FixedBinding, GroupingContext, NodePayload};
use crate::ir::{Alignment, Binding, BindingKind, Block, FixedRegister, Function, InstData, Reg, RegisterSource};
use crate::isa::ShaderTarget;
use log::{debug, trace};

// inputs keep contested registers, outputs give them up first
fn priority(kind: BindingKind) -> u8 {
    match kind {
        BindingKind::Input => 0,
        BindingKind::Array => 1,
        BindingKind::Output => 2,
    }
}

/// Seeds the chains of every fixed register descriptor of `func`.
///
/// Inputs are seeded first, then arrays, then outputs, each in declaration
/// order. When a register is claimed by a descriptor seeded earlier, the
/// later one is given a fresh register instead.
pub fn seed_fixed_bindings<T: ShaderTarget + ?Sized>(
    ctx: &mut GroupingContext<'_, T>,
    func: &mut Function,
) -> GroupResult<()> {
    let mut order: Vec<Binding> = func.bindings().map(|(binding, _)| binding).collect();

    order.sort_by_key(|&binding| priority(func.binding(binding).kind));

    for binding in order {
        seed_binding(ctx, func, binding)?;
    }

    Ok(())
}

/// Seeds the chain of a single descriptor. Seeding a descriptor that has
/// already been seeded does nothing.
pub fn seed_binding<T: ShaderTarget + ?Sized>(
    ctx: &mut GroupingContext<'_, T>,
    func: &mut Function,
    binding: Binding,
) -> GroupResult<()> {
    let desc = func.binding(binding).clone();
    let mut prev: Option<Reg> = None;

    for offset in 0..desc.regs.len() {
        let mut reg = desc.regs[offset];

        if !reg.is_virtual() {
            return Err(GroupError::internal(format!(
                "{reg} in {binding:?} is not a virtual register"
            )));
        }

        let wanted = FixedBinding {
            binding,
            offset: offset as u32,
            bank: desc.bank,
            physical: desc.physical_at(offset),
        };

        let existing = ctx.registry.find(reg).and_then(|id| ctx.registry.node(id).fixed());

        match existing {
            Some(fixed) if fixed == wanted => {
                prev = Some(reg);
                continue;
            }
            Some(fixed) => {
                reg = separate(ctx, func, &desc, reg, fixed)?;
                func.binding_mut(binding).regs[offset] = reg;
            }
            None => {}
        }

        bind(ctx, &desc, reg, wanted, prev)?;
        prev = Some(reg);
    }

    Ok(())
}

// gives the descriptor being seeded its own register instead of `reg`
fn separate<T: ShaderTarget + ?Sized>(
    ctx: &mut GroupingContext<'_, T>,
    func: &mut Function,
    desc: &FixedRegister,
    reg: Reg,
    owner: FixedBinding,
) -> GroupResult<Reg> {
    let owner_kind = func.binding(owner.binding).kind;

    if desc.kind == BindingKind::Array && owner_kind == BindingKind::Array {
        return Err(GroupError::internal(format!("{reg} is a member of two arrays")));
    }

    if desc.kind == BindingKind::Output {
        let exit = func
            .exit_block()
            .ok_or_else(|| GroupError::internal("output binding in a function without blocks"))?;

        if let Some(holder) = dead_on_arrival_copy(ctx, func, exit, reg) {
            debug!("{reg} is already bound as {owner_kind:?}, its copy in {holder} becomes the output");

            return Ok(holder);
        }
    }

    let fresh = Reg::temp(func.allocate_registers(1)?.start);

    match desc.kind {
        BindingKind::Output => {
            let exit = func
                .exit_block()
                .ok_or_else(|| GroupError::internal("output binding in a function without blocks"))?;

            func.push(exit, InstData::mov(fresh, reg))?;
            ctx.stats.seed_copies += 1;
        }
        BindingKind::Array => {
            let entry = func
                .entry_block()
                .ok_or_else(|| GroupError::internal("array binding in a function without blocks"))?;

            let copy = func.prepend(entry, InstData::mov(fresh, reg))?;

            func.rename_after(copy, reg, fresh);
            ctx.stats.seed_copies += 1;
        }
        // the hardware writes both
        BindingKind::Input => {}
    }

    debug!("{reg} is already bound as {owner_kind:?}, using {fresh} for {:?}", desc.kind);

    Ok(fresh)
}

// a register that still holds a copy of `value` at the end of `block`, and
// that nothing else reads, writes or binds
fn dead_on_arrival_copy<T: ShaderTarget + ?Sized>(
    ctx: &mut GroupingContext<'_, T>,
    func: &Function,
    block: Block,
    value: Reg,
) -> Option<Reg> {
    let mut cache = EquivalenceCache::new(block);

    for (at, inst) in func.insts_in_block(block).enumerate() {
        let data = func.inst(inst);
        let at = at as u32;

        for &reg in data.uses() {
            cache.note_use(&ctx.registry, reg, at);
        }

        for &reg in data.defs() {
            cache.note_def(&mut ctx.registry, reg);
        }

        if let Some((dest, source)) = data.as_copy() {
            cache.record_copy(&mut ctx.registry, source, dest, Some(inst), at, false);
        }
    }

    let found = cache
        .holders(value)
        .map(|record| record.dest)
        .find(|&holder| is_private(ctx, func, holder));

    cache.finish(&mut ctx.registry);

    found
}

fn is_private<T: ShaderTarget + ?Sized>(ctx: &GroupingContext<'_, T>, func: &Function, reg: Reg) -> bool {
    let fixed = ctx.registry.find(reg).and_then(|id| ctx.registry.node(id).fixed());
    let bound = func.bindings().any(|(_, desc)| desc.regs.contains(&reg));

    if fixed.is_some() || bound || func.preamble_exports().contains(&reg) {
        return false;
    }

    let mut defs = 0;

    for block in func.blocks() {
        for inst in func.insts_in_block(block) {
            let data = func.inst(inst);

            if data.uses().contains(&reg) {
                return false;
            }

            defs += data.defs().iter().filter(|&&d| d == reg).count();
        }
    }

    defs == 1
}

fn bind<T: ShaderTarget + ?Sized>(
    ctx: &mut GroupingContext<'_, T>,
    desc: &FixedRegister,
    reg: Reg,
    fixed: FixedBinding,
    prev: Option<Reg>,
) -> GroupResult<()> {
    let registry = &mut ctx.registry;
    let id = registry.find_or_create(reg);
    let node = registry.node_mut(id);

    node.fixed = Some(fixed);

    if desc.kind == BindingKind::Array {
        node.payload = NodePayload::ArrayMember(fixed.binding);
    }

    let numbered = fixed.physical.map_or(true, |p| registry.set_alignment(id, Alignment::of_number(p), false));
    let aligned = fixed.offset != 0 || registry.set_alignment(id, desc.alignment, true);

    if !numbered || !aligned {
        return Err(GroupError::internal(format!(
            "{reg} cannot satisfy the alignment of {:?}",
            fixed.binding
        )));
    }

    if let Some(prev) = prev {
        if !registry.link(prev, None, reg, None, !desc.advisory, false) {
            return Err(GroupError::internal(format!(
                "{reg} cannot follow {prev} in {:?}",
                fixed.binding
            )));
        }
    }

    trace!("bound {reg} as member {} of {:?}", fixed.offset, fixed.binding);

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::group::GroupingOptions;
    use crate::ir::Bank;
    use crate::isa::UscTarget;

    fn r(n: u32) -> Reg {
        Reg::temp(n)
    }

    #[test]
    fn inputs_are_seeded_with_physical_alignment() {
        let target = UscTarget::new();
        let mut ctx = GroupingContext::new(&target, GroupingOptions::default());
        let mut func = Function::new("inputs");
        let block = func.create_block("entry");

        func.append(block, InstData::fadd(r(3), r(1), r(2)));

        let binding = func.declare_binding(FixedRegister::input(Bank::Primary, Some(3), &[r(1), r(2)]));

        assert!(seed_fixed_bindings(&mut ctx, &mut func).is_ok());

        let reg = ctx.registry();
        let one = reg.find(r(1)).unwrap();
        let two = reg.find(r(2)).unwrap();

        assert_eq!(reg.node(one).next(), Some(two));
        assert_eq!(reg.node(one).alignment(), Alignment::Odd);
        assert!(!reg.node(one).is_alignment_mandatory());
        assert_eq!(reg.node(two).fixed().map(|f| f.physical), Some(Some(4)));
        assert_eq!(reg.bank_of(one), Bank::Primary);

        // a second time changes nothing
        let before = reg.len();

        assert!(seed_binding(&mut ctx, &mut func, binding).is_ok());
        assert_eq!(ctx.registry().len(), before);
        assert_eq!(ctx.stats().seed_copies, 0);
        assert!(ctx.registry().check_well_formed().is_ok());
    }

    #[test]
    fn one_register_claimed_twice() {
        // entry:
        //   r13 = fadd r12, r12
        //   r11 = fmul r12, r13
        let target = UscTarget::new();
        let mut ctx = GroupingContext::new(&target, GroupingOptions::default());
        let mut func = Function::new("claimed");
        let block = func.create_block("entry");

        func.append(block, InstData::fadd(r(13), r(12), r(12)));
        func.append(block, InstData::fmul(r(11), r(12), r(13)));

        // declared output first, the input still wins
        let output = func.declare_binding(FixedRegister::output(Bank::Output, Some(0), &[r(11), r(12)]));
        let input = func.declare_binding(FixedRegister::input(Bank::Primary, Some(0), &[r(12), r(13)]));

        assert!(seed_fixed_bindings(&mut ctx, &mut func).is_ok());
        assert_eq!(ctx.stats().seed_copies, 1);

        let out_regs = func.binding(output).regs.clone();
        let in_regs = func.binding(input).regs.clone();

        assert_eq!(in_regs.as_slice(), &[r(12), r(13)]);
        assert_eq!(out_regs[0], r(11));
        assert_ne!(out_regs[1], r(12));

        let copy = func.layout().block_last_inst(block).unwrap();

        assert_eq!(func.inst(copy), &InstData::mov(out_regs[1], r(12)));
        assert_eq!(func.insts_in_block(block).count(), 3);
        assert!(ctx.registry().check_well_formed().is_ok());
    }

    #[test]
    fn unread_copies_become_outputs() {
        // entry:
        //   r13 = fadd r12, r12
        //   r11 = fmul r12, r13
        //   mov r20 <- r12
        let target = UscTarget::new();
        let mut ctx = GroupingContext::new(&target, GroupingOptions::default());
        let mut func = Function::new("unread");
        let block = func.create_block("entry");

        func.append(block, InstData::fadd(r(13), r(12), r(12)));
        func.append(block, InstData::fmul(r(11), r(12), r(13)));
        func.append(block, InstData::mov(r(20), r(12)));

        let output = func.declare_binding(FixedRegister::output(Bank::Output, Some(0), &[r(11), r(12)]));

        func.declare_binding(FixedRegister::input(Bank::Primary, Some(0), &[r(12), r(13)]));

        assert!(seed_fixed_bindings(&mut ctx, &mut func).is_ok());

        // r20 is never read, so it can be the output without another copy
        assert_eq!(func.binding(output).regs.as_slice(), &[r(11), r(20)]);
        assert_eq!(ctx.stats().seed_copies, 0);
        assert_eq!(func.insts_in_block(block).count(), 3);

        let registry = ctx.registry();
        let holder = registry.find(r(20)).unwrap();

        assert_eq!(registry.node(holder).fixed().and_then(|f| f.physical), Some(1));
        assert_eq!(registry.node(holder).prev(), registry.find(r(11)));
        assert_eq!(registry.node(holder).payload(), NodePayload::Empty);
        assert!(registry.check_well_formed().is_ok());
    }

    #[test]
    fn read_copies_are_not_taken() {
        // entry:
        //   r13 = fadd r12, r12
        //   mov r20 <- r12
        //   r11 = fmul r20, r13
        let target = UscTarget::new();
        let mut ctx = GroupingContext::new(&target, GroupingOptions::default());
        let mut func = Function::new("read");
        let block = func.create_block("entry");

        func.append(block, InstData::fadd(r(13), r(12), r(12)));
        func.append(block, InstData::mov(r(20), r(12)));
        func.append(block, InstData::fmul(r(11), r(20), r(13)));

        let output = func.declare_binding(FixedRegister::output(Bank::Output, Some(0), &[r(11), r(12)]));

        func.declare_binding(FixedRegister::input(Bank::Primary, Some(0), &[r(12), r(13)]));

        assert!(seed_fixed_bindings(&mut ctx, &mut func).is_ok());
        assert_eq!(ctx.stats().seed_copies, 1);
        assert_ne!(func.binding(output).regs[1], r(20));
        assert_eq!(func.insts_in_block(block).count(), 4);
    }

    #[test]
    fn arrays_yield_to_inputs() {
        // entry:
        //   r5 = fadd r1, r2
        let target = UscTarget::new();
        let mut ctx = GroupingContext::new(&target, GroupingOptions::default());
        let mut func = Function::new("array");
        let block = func.create_block("entry");
        let add = func.append(block, InstData::fadd(r(5), r(1), r(2)));

        func.declare_binding(FixedRegister::input(Bank::Primary, None, &[r(1)]));

        let array = func.declare_binding(FixedRegister::array(&[r(1), r(2)]));

        assert!(seed_fixed_bindings(&mut ctx, &mut func).is_ok());

        let renamed = func.binding(array).regs[0];
        let first = func.layout().block_first_inst(block).unwrap();

        assert_ne!(renamed, r(1));
        assert_eq!(func.inst(first), &InstData::mov(renamed, r(1)));
        assert_eq!(func.inst(add), &InstData::fadd(r(5), renamed, r(2)));

        let reg = ctx.registry();
        let id = reg.find(renamed).unwrap();

        assert!(matches!(reg.node(id).payload(), NodePayload::ArrayMember(_)));
        assert_eq!(reg.node(id).next(), reg.find(r(2)));
    }

    #[test]
    fn two_arrays_cannot_share() {
        let target = UscTarget::new();
        let mut ctx = GroupingContext::new(&target, GroupingOptions::default());
        let mut func = Function::new("arrays");

        func.create_block("entry");
        func.declare_binding(FixedRegister::array(&[r(1), r(2)]));
        func.declare_binding(FixedRegister::array(&[r(2), r(3)]));

        assert!(matches!(
            seed_fixed_bindings(&mut ctx, &mut func),
            Err(GroupError::Internal(_))
        ));
    }

    #[test]
    fn explicit_alignment_is_mandatory() {
        let target = UscTarget::new();
        let mut ctx = GroupingContext::new(&target, GroupingOptions::default());
        let mut func = Function::new("aligned");

        func.create_block("entry");
        func.declare_binding(FixedRegister::array(&[r(1), r(2), r(3)]).with_alignment(Alignment::Even));

        assert!(seed_fixed_bindings(&mut ctx, &mut func).is_ok());

        let reg = ctx.registry();
        let three = reg.find(r(3)).unwrap();

        assert_eq!(reg.node(three).alignment(), Alignment::Even);
        assert!(reg.node(three).is_alignment_mandatory());
    }

    #[test]
    fn advisory_descriptors_link_optionally() {
        let target = UscTarget::new();
        let mut ctx = GroupingContext::new(&target, GroupingOptions::default());
        let mut func = Function::new("advisory");

        func.create_block("entry");
        func.declare_binding(FixedRegister::output(Bank::Output, None, &[r(1), r(2)]).advisory());

        assert!(seed_fixed_bindings(&mut ctx, &mut func).is_ok());

        let reg = ctx.registry();

        assert!(reg.node(reg.find(r(1)).unwrap()).is_optional_link());
    }
}
