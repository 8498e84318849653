//======---------------------------------------------------------------======//
//                                                                           //
// Copyright 2022-2023 Evan Cox <evanacox00@gmail.com>. All rights reserved. //
//                                                                           //
// Use of this source code is governed by a BSD-style license that can be    //
// found in the LICENSE.txt file at the root of this project, or at the      //
// following link: https://opensource.org/licenses/BSD-3-Clause              //
//                                                                           //
//======---------------------------------------------------------------======//

use crate::arena::ArenaMap;
use crate::error::{GroupError, GroupResult};
use crate::ir::*;
use crate::utility::SaHashSet;
use smallvec::SmallVec;
use std::fmt;
use std::ops::Range;

/// Hands out fresh virtual registers.
pub trait RegisterSource {
    /// Allocates `count` fresh, consecutively numbered virtual registers.
    ///
    /// Fails with [`GroupError::OutOfRegisters`] when the function has no
    /// more room.
    fn allocate_registers(&mut self, count: usize) -> GroupResult<Range<u32>>;
}

/// A shader function: blocks of instructions over virtual registers, the
/// fixed register descriptors attached to it, and an optional preamble that
/// runs once before any invocation.
#[derive(Clone, Debug)]
pub struct Function {
    name: String,
    insts: ArenaMap<Inst, InstData>,
    block_names: ArenaMap<Block, String>,
    layout: Layout,
    preamble: Option<Block>,
    exports: Vec<Reg>,
    bindings: ArenaMap<Binding, FixedRegister>,
    uniforms: SaHashSet<Reg>,
    next_temp: u32,
    temp_limit: u32,
    inst_limit: usize,
}

impl Function {
    /// Creates an empty function.
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            insts: ArenaMap::new(),
            block_names: ArenaMap::new(),
            layout: Layout::new(),
            preamble: None,
            exports: Vec::new(),
            bindings: ArenaMap::new(),
            uniforms: SaHashSet::default(),
            next_temp: 0,
            temp_limit: u32::MAX,
            inst_limit: usize::MAX,
        }
    }

    /// The function's name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Limits how many virtual registers can exist. Registers already
    /// named by the function count towards this.
    pub fn set_register_limit(&mut self, limit: u32) {
        self.temp_limit = limit;
    }

    /// Limits how many instructions the function can ever hold.
    pub fn set_instruction_limit(&mut self, limit: usize) {
        self.inst_limit = limit;
    }

    /// Creates a new block at the end of the program order.
    pub fn create_block(&mut self, name: &str) -> Block {
        let block = self.block_names.insert(name.to_owned());

        self.layout.append_block(block);

        block
    }

    /// Gets the preamble, creating it if it doesn't exist yet.
    pub fn create_preamble(&mut self) -> Block {
        match self.preamble {
            Some(block) => block,
            None => {
                let block = self.block_names.insert("preamble".to_owned());

                self.layout.add_detached_block(block);
                self.preamble = Some(block);

                block
            }
        }
    }

    /// The preamble, if the function has one.
    pub fn preamble(&self) -> Option<Block> {
        self.preamble
    }

    /// Makes a register written in the preamble visible to the shader body.
    pub fn export_from_preamble(&mut self, reg: Reg) {
        if !self.exports.contains(&reg) {
            self.exports.push(reg);
        }
    }

    /// Every register the preamble makes visible, in export order.
    pub fn preamble_exports(&self) -> &[Reg] {
        &self.exports
    }

    /// The name a block was created with.
    pub fn block_name(&self, block: Block) -> &str {
        &self.block_names[block]
    }

    /// The blocks in program order.
    pub fn blocks(&self) -> BlockIter<'_> {
        self.layout.blocks()
    }

    /// The first block in program order, where inputs arrive.
    pub fn entry_block(&self) -> Option<Block> {
        self.layout.entry_block()
    }

    /// The last block in program order, where outputs leave.
    pub fn exit_block(&self) -> Option<Block> {
        self.layout.exit_block()
    }

    /// The instruction order of the function.
    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    /// Every instruction in `block`, in order.
    pub fn insts_in_block(&self, block: Block) -> InstIter<'_> {
        self.layout.insts_in_block(block)
    }

    /// Gets the data of an instruction.
    pub fn inst(&self, inst: Inst) -> &InstData {
        &self.insts[inst]
    }

    /// Mutable version of [`Self::inst`].
    pub fn inst_mut(&mut self, inst: Inst) -> &mut InstData {
        &mut self.insts[inst]
    }

    /// Appends an instruction while the function is being built. This
    /// ignores the instruction limit.
    pub fn append(&mut self, block: Block, data: InstData) -> Inst {
        self.note_registers(data.defs().iter().chain(data.uses()).copied());

        let inst = self.insts.insert(data);

        self.layout.append_inst(inst, block);

        inst
    }

    /// Appends an instruction to the end of `block`.
    pub fn push(&mut self, block: Block, data: InstData) -> GroupResult<Inst> {
        let inst = self.create_inst(data)?;

        self.layout.append_inst(inst, block);

        Ok(inst)
    }

    /// Inserts an instruction at the start of `block`.
    pub fn prepend(&mut self, block: Block, data: InstData) -> GroupResult<Inst> {
        let inst = self.create_inst(data)?;

        self.layout.prepend_inst(inst, block);

        Ok(inst)
    }

    /// Inserts an instruction directly before `before`.
    pub fn insert_before(&mut self, before: Inst, data: InstData) -> GroupResult<Inst> {
        let inst = self.create_inst(data)?;

        self.layout.insert_inst_before(inst, before);

        Ok(inst)
    }

    /// Inserts an instruction directly after `after`.
    pub fn insert_after(&mut self, after: Inst, data: InstData) -> GroupResult<Inst> {
        let inst = self.create_inst(data)?;

        self.layout.insert_inst_after(inst, after);

        Ok(inst)
    }

    /// Replaces `inst` with a sequence of instructions at the same place.
    /// Returns the new instructions in order.
    pub fn replace(
        &mut self,
        inst: Inst,
        sequence: impl IntoIterator<Item = InstData>,
    ) -> GroupResult<SmallVec<[Inst; 4]>> {
        let mut inserted = SmallVec::new();

        for data in sequence {
            inserted.push(self.insert_before(inst, data)?);
        }

        self.layout.remove_inst(inst);

        Ok(inserted)
    }

    /// Takes an instruction out of its block.
    pub fn remove(&mut self, inst: Inst) {
        self.layout.remove_inst(inst);
    }

    /// Renames `from` to `to` in every instruction after `start`, including
    /// every block after the one `start` is in.
    pub fn rename_after(&mut self, start: Inst, from: Reg, to: Reg) {
        let block = self.layout.inst_block(start);
        let mut cursor = self.layout.inst_next(start);

        while let Some(inst) = cursor {
            self.insts[inst].rename(from, to);
            cursor = self.layout.inst_next(inst);
        }

        let later: Vec<Block> = self.layout.blocks().skip_while(|&b| b != block).skip(1).collect();

        for bb in later {
            let insts: Vec<Inst> = self.layout.insts_in_block(bb).collect();

            for inst in insts {
                self.insts[inst].rename(from, to);
            }
        }
    }

    /// Attaches a fixed register descriptor to the function.
    pub fn declare_binding(&mut self, fixed: FixedRegister) -> Binding {
        self.note_registers(fixed.regs.iter().copied());
        self.bindings.insert(fixed)
    }

    /// Gets a fixed register descriptor.
    pub fn binding(&self, binding: Binding) -> &FixedRegister {
        &self.bindings[binding]
    }

    /// Mutable version of [`Self::binding`].
    pub fn binding_mut(&mut self, binding: Binding) -> &mut FixedRegister {
        &mut self.bindings[binding]
    }

    /// Every descriptor in declaration order.
    pub fn bindings(&self) -> impl Iterator<Item = (Binding, &FixedRegister)> + '_ {
        self.bindings.iter()
    }

    /// Marks a register as holding the same value in every invocation.
    pub fn mark_uniform(&mut self, reg: Reg) {
        self.uniforms.insert(reg);
    }

    /// Whether a value can be computed once for all invocations.
    pub fn is_uniform(&self, reg: Reg) -> bool {
        reg.is_compile_time_constant() || self.uniforms.contains(&reg)
    }

    fn create_inst(&mut self, data: InstData) -> GroupResult<Inst> {
        if self.insts.len() >= self.inst_limit {
            return Err(GroupError::OutOfInstructions);
        }

        Ok(self.insts.insert(data))
    }

    fn note_registers(&mut self, regs: impl Iterator<Item = Reg>) {
        for reg in regs.filter(|r| r.is_virtual()) {
            self.next_temp = self.next_temp.max(reg.number() + 1);
        }
    }
}

impl RegisterSource for Function {
    fn allocate_registers(&mut self, count: usize) -> GroupResult<Range<u32>> {
        let start = self.next_temp;
        let end = u32::try_from(count)
            .ok()
            .and_then(|count| start.checked_add(count))
            .filter(|&end| end <= self.temp_limit)
            .ok_or(GroupError::OutOfRegisters { requested: count })?;

        self.next_temp = end;

        Ok(start..end)
    }
}

impl fmt::Display for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "fn {} {{", self.name)?;

        let blocks = self.preamble.into_iter().chain(self.layout.blocks());

        for block in blocks {
            writeln!(f, "{}:", self.block_names[block])?;

            for inst in self.layout.insts_in_block(block) {
                writeln!(f, "  {}", self.insts[inst])?;
            }
        }

        write!(f, "}}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_registers_skip_named_ones() {
        let mut func = Function::new("main");
        let bb = func.create_block("bb0");

        func.append(bb, InstData::mov(Reg::temp(7), Reg::imm(0)));

        assert_eq!(func.allocate_registers(2), Ok(8..10));
        assert_eq!(func.allocate_registers(1), Ok(10..11));
    }

    #[test]
    fn register_limit() {
        let mut func = Function::new("main");

        func.set_register_limit(4);

        assert_eq!(func.allocate_registers(3), Ok(0..3));
        assert_eq!(
            func.allocate_registers(2),
            Err(GroupError::OutOfRegisters { requested: 2 })
        );
    }

    #[test]
    fn instruction_limit() {
        let mut func = Function::new("main");
        let bb = func.create_block("bb0");
        let first = func.append(bb, InstData::wdf());

        func.set_instruction_limit(2);

        assert!(func.insert_before(first, InstData::wdf()).is_ok());
        assert_eq!(
            func.insert_after(first, InstData::wdf()),
            Err(GroupError::OutOfInstructions)
        );
    }

    #[test]
    fn replace_keeps_position() {
        let mut func = Function::new("main");
        let bb = func.create_block("bb0");
        let a = func.append(bb, InstData::wdf());
        let b = func.append(bb, InstData::vmov(&[Reg::temp(0), Reg::temp(1)], &[Reg::temp(2), Reg::temp(3)]));
        let c = func.append(bb, InstData::wdf());

        let new = func
            .replace(
                b,
                [
                    InstData::mov(Reg::temp(0), Reg::temp(2)),
                    InstData::mov(Reg::temp(1), Reg::temp(3)),
                ],
            )
            .unwrap();

        let order: Vec<Inst> = func.insts_in_block(bb).collect();

        assert_eq!(order, [a, new[0], new[1], c]);
    }

    #[test]
    fn rename_crosses_blocks() {
        let mut func = Function::new("main");
        let bb0 = func.create_block("bb0");
        let bb1 = func.create_block("bb1");
        let before = func.append(bb0, InstData::fadd(Reg::temp(2), Reg::temp(1), Reg::temp(1)));
        let copy = func.append(bb0, InstData::mov(Reg::temp(5), Reg::temp(1)));
        let after = func.append(bb1, InstData::fmul(Reg::temp(3), Reg::temp(1), Reg::temp(2)));

        func.rename_after(copy, Reg::temp(1), Reg::temp(5));

        assert_eq!(func.inst(before).uses(), &[Reg::temp(1), Reg::temp(1)]);
        assert_eq!(func.inst(copy).uses(), &[Reg::temp(1)]);
        assert_eq!(func.inst(after).uses(), &[Reg::temp(5), Reg::temp(2)]);
    }

    #[test]
    fn preamble_is_printed_first() {
        let mut func = Function::new("main");
        let bb = func.create_block("bb0");
        let pre = func.create_preamble();

        assert_eq!(func.create_preamble(), pre);

        func.push(pre, InstData::mov(Reg::temp(1), Reg::imm(0))).unwrap();
        func.push(bb, InstData::wdf()).unwrap();
        func.export_from_preamble(Reg::temp(1));
        func.export_from_preamble(Reg::temp(1));

        assert_eq!(func.preamble_exports(), &[Reg::temp(1)]);
        assert_eq!(func.blocks().count(), 1);
        assert_eq!(
            func.to_string(),
            "fn main {\npreamble:\n  mov r1 <- #0x0\nbb0:\n  wdf\n}"
        );
    }
}
